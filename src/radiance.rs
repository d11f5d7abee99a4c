use std::{io::BufRead, path::Path};

use glam::Vec3;
use image::{
    codecs::hdr::HdrDecoder,
    error::{ParameterError, ParameterErrorKind},
    io::Reader,
    ImageBuffer, ImageError, ImageFormat, ImageResult, Rgb32FImage,
};
use log::{debug, info};

use crate::error::{IblError, Result};

/// Decoded equirectangular panorama, three f32 channels per texel.
///
/// Rows are stored bottom to top: row 0 is the lowest row of the source
/// picture, which is the orientation the cube face projection samples in.
#[derive(Debug, Clone, PartialEq)]
pub struct RadianceImage {
    width: u32,
    height: u32,
    samples: Vec<f32>,
}

impl RadianceImage {
    /// Builds an image from an in-memory raster already stored bottom to top.
    ///
    /// `max_radiance <= 0` disables clamping.
    pub fn from_raw(
        width: u32,
        height: u32,
        channels: u8,
        samples: Vec<f32>,
        max_radiance: f32,
    ) -> Result<RadianceImage> {
        if channels != 3 {
            return Err(IblError::Format { channels });
        }
        let expected = width as usize * height as usize * 3;
        if samples.len() != expected || expected == 0 {
            return Err(IblError::RasterSize {
                width,
                height,
                expected,
                actual: samples.len(),
            });
        }

        let mut image = RadianceImage { width, height, samples };
        image.clamp(max_radiance);
        Ok(image)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn texel(&self, x: u32, y: u32) -> Vec3 {
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        Vec3::from_slice(&self.samples[idx..idx + 3])
    }

    /// Bilinear lookup, wrapping horizontally and clamping vertically.
    pub fn sample(&self, u: f32, v: f32) -> Vec3 {
        let x = u * self.width as f32 - 0.5;
        let y = (v * self.height as f32 - 0.5).clamp(0., (self.height - 1) as f32);
        let x0 = x.floor();
        let y0 = y.floor();

        let w = self.width as i64;
        let wrap = |x: i64| x.rem_euclid(w) as u32;
        let (xa, xb) = (wrap(x0 as i64), wrap(x0 as i64 + 1));
        let ya = y0 as u32;
        let yb = (ya + 1).min(self.height - 1);

        let bottom = self.texel(xa, ya).lerp(self.texel(xb, ya), x - x0);
        let top = self.texel(xa, yb).lerp(self.texel(xb, yb), x - x0);
        bottom.lerp(top, y - y0)
    }

    /// Clamps every sample to `[0, max_radiance]`. Non-positive maxima leave
    /// the raster untouched.
    fn clamp(&mut self, max_radiance: f32) {
        if max_radiance <= 0. {
            return;
        }
        for sample in &mut self.samples {
            *sample = sample.max(0.).min(max_radiance);
        }
    }
}

/// Decodes the panorama at `path`, flips it vertically and clamps outliers.
pub fn load_radiance(path: impl AsRef<Path>, max_radiance: f32) -> Result<RadianceImage> {
    let path = path.as_ref();
    let decode_error = |source: ImageError| IblError::Decode {
        path: path.to_owned(),
        source,
    };

    let reader = Reader::open(path)
        .and_then(Reader::with_guessed_format)
        .map_err(|err| decode_error(err.into()))?;
    let mut raster = match reader.format() {
        // The generic path hands Radiance files back as 8 bit color
        Some(ImageFormat::Hdr) => decode_hdr(reader.into_inner()).map_err(decode_error)?,
        _ => {
            let decoded = reader.decode().map_err(decode_error)?;
            let channels = decoded.color().channel_count();
            if channels != 3 {
                return Err(IblError::Format { channels });
            }
            decoded.into_rgb32f()
        }
    };

    image::imageops::flip_vertical_in_place(&mut raster);
    let (width, height) = raster.dimensions();
    debug!("Decoded {}x{} panorama from {}", width, height, path.display());

    let image = RadianceImage::from_raw(width, height, 3, raster.into_raw(), max_radiance)?;
    if max_radiance > 0. {
        info!("Clamped radiance of {} to {}", path.display(), max_radiance);
    }
    Ok(image)
}

/// Full range RGBE decode of a Radiance file.
fn decode_hdr(reader: impl BufRead) -> ImageResult<Rgb32FImage> {
    let decoder = HdrDecoder::new(reader)?;
    let meta = decoder.metadata();
    let samples = decoder.read_image_hdr()?.into_iter().flat_map(|texel| texel.0).collect();
    ImageBuffer::from_raw(meta.width, meta.height, samples).ok_or_else(|| {
        ImageError::Parameter(ParameterError::from_kind(ParameterErrorKind::DimensionMismatch))
    })
}

#[cfg(test)]
mod tests {
    use image::{codecs::hdr::HdrEncoder, Rgb};

    use super::*;

    #[test]
    fn clamps_into_range() {
        let samples = vec![-1., 0.5, 700., f32::INFINITY, 3., f32::NAN];
        let image = RadianceImage::from_raw(2, 1, 3, samples, 500.).unwrap();
        for &s in image.samples() {
            assert!((0. ..=500.).contains(&s), "{s} escaped the clamp");
        }
        assert_eq!(image.samples(), &[0., 0.5, 500., 500., 3., 0.]);
    }

    #[test]
    fn non_positive_maximum_leaves_samples_alone() {
        let samples = vec![-1., 0.5, 700., 1e6, 3., 0.];
        for max in [0., -2.] {
            let image = RadianceImage::from_raw(2, 1, 3, samples.clone(), max).unwrap();
            assert_eq!(image.samples(), samples.as_slice());
        }
    }

    #[test]
    fn rejects_wrong_channel_count() {
        let err = RadianceImage::from_raw(2, 1, 4, vec![0.; 8], 0.).unwrap_err();
        assert!(matches!(err, IblError::Format { channels: 4 }));
    }

    #[test]
    fn rejects_short_raster() {
        let err = RadianceImage::from_raw(2, 2, 3, vec![0.; 6], 0.).unwrap_err();
        assert!(matches!(err, IblError::RasterSize { expected: 12, actual: 6, .. }));
    }

    #[test]
    fn sampling_wraps_horizontally() {
        let samples = vec![1., 1., 1., 3., 3., 3.];
        let image = RadianceImage::from_raw(2, 1, 3, samples, 0.).unwrap();
        // Halfway between the last and the first column
        assert_eq!(image.sample(0., 0.5), Vec3::splat(2.));
        assert_eq!(image.sample(0.25, 0.5), Vec3::ONE);
        assert_eq!(image.sample(0.75, 0.5), Vec3::splat(3.));
    }

    #[test]
    fn radiance_files_keep_their_range() {
        let path = std::env::temp_dir().join(format!("envbake_range_{}.hdr", std::process::id()));
        // Top row first in the file
        let pixels = [4., 100., 0.5, 1.].map(|value| Rgb([value; 3]));
        let file = std::fs::File::create(&path).unwrap();
        HdrEncoder::new(file).encode(&pixels, 2, 2).unwrap();

        let image = load_radiance(&path, 0.).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(image.texel(0, 0), Vec3::splat(0.5));
        assert_eq!(image.texel(1, 0), Vec3::ONE);
        assert_eq!(image.texel(0, 1), Vec3::splat(4.));
        assert_eq!(image.texel(1, 1), Vec3::splat(100.));
    }
}
