use std::{
    collections::HashSet,
    ffi::OsStr,
    path::{Path, PathBuf},
};

use log::{debug, info, warn};

use crate::{
    asset::{write_asset, CompressedAsset},
    backend::RenderBackend,
    compress::{BlockCompressor, CompressionQuality},
    cube::CubeFace,
    error::{IblError, Result},
    irradiance::{convolve_irradiance, IrradianceSettings},
    mip::is_valid_resolution,
    prefilter::{prefilter_specular, PrefilterSettings},
    projector::project_panorama,
    radiance::{load_radiance, RadianceImage},
    texture::{read_level, CubemapTexture},
};

pub const ENVIRONMENT_FILE: &str = "envmap.cubemap";
pub const IRRADIANCE_FILE: &str = "irradiance.cubemap";
pub const PREFILTERED_FILE: &str = "prefiltered.cubemap";

/// Everything a bake depends on.
#[derive(Debug, Clone, PartialEq)]
pub struct BakeConfig {
    /// Edge length of the environment cubemap, a power of two >= 4.
    pub base_resolution: u32,
    /// Radiance clamp applied at load, `<= 0` disables it.
    pub max_radiance: f32,
    pub irradiance: IrradianceSettings,
    pub prefilter: PrefilterSettings,
    pub quality: CompressionQuality,
    pub output_dir: PathBuf,
}

impl BakeConfig {
    pub fn new(base_resolution: u32) -> BakeConfig {
        BakeConfig {
            base_resolution,
            max_radiance: 0.,
            irradiance: IrradianceSettings::default(),
            prefilter: PrefilterSettings::default(),
            quality: CompressionQuality::default(),
            output_dir: PathBuf::from("."),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !is_valid_resolution(self.base_resolution) {
            return Err(IblError::InvalidResolution(self.base_resolution));
        }
        if !self.max_radiance.is_finite() {
            return Err(IblError::InvalidSetting(format!(
                "max radiance {} must be finite",
                self.max_radiance
            )));
        }
        self.irradiance.validate()?;
        self.prefilter.validate()
    }
}

/// Where a bake left its three assets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BakedAssets {
    pub environment: PathBuf,
    pub irradiance: PathBuf,
    pub prefiltered: PathBuf,
}

/// Outcome of baking several panoramas in one go.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub baked: Vec<BakedAssets>,
    /// Inputs that couldn't be decoded, with the reason.
    pub skipped: Vec<(PathBuf, IblError)>,
}

/// Drives a backend through projection, both convolutions, compression and
/// serialization of one panorama at a time.
pub struct Baker<B> {
    backend: B,
    compressor: BlockCompressor,
    config: BakeConfig,
}

impl<B: RenderBackend> Baker<B> {
    pub fn new(backend: B, config: BakeConfig) -> Result<Baker<B>> {
        config.validate()?;
        Ok(Baker {
            backend,
            compressor: BlockCompressor::new(config.quality),
            config,
        })
    }

    pub fn bake_file(&mut self, input: impl AsRef<Path>) -> Result<BakedAssets> {
        let input = input.as_ref();
        info!("Baking {}", input.display());
        let image = load_radiance(input, self.config.max_radiance)?;
        self.bake_image(&image)
    }

    /// Bakes every input in order. A batch of more than one input writes each
    /// set of assets to a subdirectory of the output directory named after the
    /// input's file stem. Inputs that fail to decode are logged and skipped.
    pub fn bake_batch<P: AsRef<Path>>(&mut self, inputs: &[P]) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        let mut used = HashSet::new();
        for (index, input) in inputs.iter().enumerate() {
            let input = input.as_ref();
            let dir = if inputs.len() > 1 {
                let mut name = input.file_stem().unwrap_or(OsStr::new("panorama")).to_os_string();
                if !used.insert(name.clone()) {
                    name.push(format!("_{index}"));
                }
                self.config.output_dir.join(name)
            } else {
                self.config.output_dir.clone()
            };

            info!("Baking {} into {}", input.display(), dir.display());
            let image = match load_radiance(input, self.config.max_radiance) {
                Ok(image) => image,
                Err(err) if err.is_input_error() => {
                    warn!("Skipping {}: {}", input.display(), err);
                    report.skipped.push((input.to_owned(), err));
                    continue;
                }
                Err(err) => return Err(err),
            };
            std::fs::create_dir_all(&dir).map_err(IblError::io(dir.clone()))?;
            report.baked.push(self.bake_image_into(&image, &dir)?);
        }
        Ok(report)
    }

    pub fn bake_image(&mut self, image: &RadianceImage) -> Result<BakedAssets> {
        let dir = self.config.output_dir.clone();
        self.bake_image_into(image, &dir)
    }

    /// Bakes `image` and writes its three assets into `dir`.
    pub fn bake_image_into(&mut self, image: &RadianceImage, dir: &Path) -> Result<BakedAssets> {
        let assets = BakedAssets {
            environment: dir.join(ENVIRONMENT_FILE),
            irradiance: dir.join(IRRADIANCE_FILE),
            prefiltered: dir.join(PREFILTERED_FILE),
        };

        let environment = project_panorama(&mut self.backend, image, self.config.base_resolution)?;
        let asset = self.compress(&environment)?;
        write_asset(&asset, &assets.environment)?;

        let prefiltered = prefilter_specular(&mut self.backend, &environment, &self.config.prefilter)?;
        let asset = self.compress(&prefiltered)?;
        write_asset(&asset, &assets.prefiltered)?;

        let irradiance = convolve_irradiance(&mut self.backend, &environment, &self.config.irradiance)?;
        let asset = self.compress(&irradiance)?;
        write_asset(&asset, &assets.irradiance)?;

        Ok(assets)
    }

    /// Reads back every (face, mip) of `cubemap` and block compresses it into
    /// a freshly sized asset.
    pub fn compress(&mut self, cubemap: &CubemapTexture<B::Cubemap>) -> Result<CompressedAsset> {
        // Sized from the same pair that drives the loop below
        let mut asset = CompressedAsset::new(cubemap.resolution, cubemap.mip_levels)?;
        for face in CubeFace::ALL {
            for level in cubemap.mip_chain() {
                let pixels = read_level(&mut self.backend, cubemap, face, level)?;
                let stride = level.resolution as usize * 4 * std::mem::size_of::<half::f16>();
                self.compressor.compress_into(
                    &pixels,
                    level.resolution,
                    level.resolution,
                    stride,
                    asset.level_mut(face.index(), level.index),
                )?;
                debug!("Compressed {:?} mip {} at {}x{}", face, level.index, level.resolution, level.resolution);
            }
        }
        Ok(asset)
    }
}
