use log::{debug, info};

use crate::{
    backend::{RenderBackend, Source},
    cube::CubeFace,
    error::{IblError, Result},
    program::ProgramKind,
    texture::{validate_chain, CubemapTexture},
};

pub const PREFILTER_RESOLUTION: u32 = 128;
pub const PREFILTER_MIP_LEVELS: u32 = 5;
pub const DEFAULT_SAMPLE_COUNT: u32 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefilterSettings {
    pub resolution: u32,
    pub mip_levels: u32,
    /// GGX samples per texel.
    pub sample_count: u32,
}

impl Default for PrefilterSettings {
    fn default() -> Self {
        PrefilterSettings {
            resolution: PREFILTER_RESOLUTION,
            mip_levels: PREFILTER_MIP_LEVELS,
            sample_count: DEFAULT_SAMPLE_COUNT,
        }
    }
}

impl PrefilterSettings {
    pub fn validate(&self) -> Result<()> {
        validate_chain(self.resolution, self.mip_levels)?;
        if self.sample_count == 0 {
            return Err(IblError::InvalidSetting("prefilter needs at least one sample".into()));
        }
        Ok(())
    }

    /// Roughness baked into `level`: 0 at the top, 1 at the last level.
    pub fn roughness(&self, level: u32) -> f32 {
        if self.mip_levels <= 1 {
            return 0.;
        }
        level as f32 / (self.mip_levels - 1) as f32
    }
}

/// Bakes one GGX convolution of `environment` per mip level of the output.
///
/// `environment` must carry its full mip chain: wide lobes read from its
/// lower levels, picked per sample from `environment.resolution`.
pub fn prefilter_specular<B: RenderBackend>(
    backend: &mut B,
    environment: &CubemapTexture<B::Cubemap>,
    settings: &PrefilterSettings,
) -> Result<CubemapTexture<B::Cubemap>> {
    settings.validate()?;

    let mut program = backend.link_program(ProgramKind::Prefilter)?;
    program.set_uint("source_resolution", environment.resolution)?;
    program.set_uint("sample_count", settings.sample_count)?;
    let mut texture = backend.create_cubemap("Prefiltered", settings.resolution, settings.mip_levels)?;

    for mip in 0..settings.mip_levels {
        let roughness = settings.roughness(mip);
        program.set_float("roughness", roughness)?;
        debug!("Prefiltering mip {} at roughness {}", mip, roughness);
        for face in CubeFace::ALL {
            backend.render_face(&mut program, Source::Cubemap(&environment.texture), &mut texture, face, mip)?;
        }
    }

    info!(
        "Prefiltered {} levels from {}x{}, {} samples per texel",
        settings.mip_levels, settings.resolution, settings.resolution, settings.sample_count
    );
    Ok(CubemapTexture {
        texture,
        resolution: settings.resolution,
        mip_levels: settings.mip_levels,
    })
}
