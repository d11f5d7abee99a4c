use log::info;

use crate::{
    backend::{RenderBackend, Source},
    cube::CubeFace,
    error::{IblError, Result},
    program::ProgramKind,
    texture::{validate_chain, CubemapTexture},
};

pub const IRRADIANCE_RESOLUTION: u32 = 32;
pub const DEFAULT_SAMPLE_DELTA: f32 = 0.025;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IrradianceSettings {
    pub resolution: u32,
    /// Angular step in radians of the hemisphere walk.
    pub sample_delta: f32,
}

impl Default for IrradianceSettings {
    fn default() -> Self {
        IrradianceSettings {
            resolution: IRRADIANCE_RESOLUTION,
            sample_delta: DEFAULT_SAMPLE_DELTA,
        }
    }
}

impl IrradianceSettings {
    pub fn validate(&self) -> Result<()> {
        validate_chain(self.resolution, 1)?;
        if !(self.sample_delta > 0. && self.sample_delta < std::f32::consts::FRAC_PI_2) {
            return Err(IblError::InvalidSetting(format!(
                "irradiance sample delta {} must be in (0, pi/2)",
                self.sample_delta
            )));
        }
        Ok(())
    }
}

/// Convolves mip 0 of `environment` into a single level diffuse irradiance
/// cubemap. A uniform environment of radiance `c` comes out as `c`.
pub fn convolve_irradiance<B: RenderBackend>(
    backend: &mut B,
    environment: &CubemapTexture<B::Cubemap>,
    settings: &IrradianceSettings,
) -> Result<CubemapTexture<B::Cubemap>> {
    settings.validate()?;

    let mut program = backend.link_program(ProgramKind::Irradiance)?;
    program.set_float("sample_delta", settings.sample_delta)?;
    let mut texture = backend.create_cubemap("Irradiance", settings.resolution, 1)?;

    for face in CubeFace::ALL {
        backend.render_face(&mut program, Source::Cubemap(&environment.texture), &mut texture, face, 0)?;
    }

    info!(
        "Convolved irradiance at {}x{}, sample delta {}",
        settings.resolution, settings.resolution, settings.sample_delta
    );
    Ok(CubemapTexture {
        texture,
        resolution: settings.resolution,
        mip_levels: 1,
    })
}
