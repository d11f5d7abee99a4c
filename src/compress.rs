use std::{fmt, str::FromStr};

use half::f16;
use intel_tex_2::{bc6h, RgbaSurface};

use crate::{
    error::{IblError, Result},
    mip::BLOCK_BYTES,
};

const BYTES_PER_TEXEL: usize = 4 * std::mem::size_of::<f16>();

/// BC6H encoder effort.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CompressionQuality {
    VeryFast,
    Fast,
    #[default]
    Basic,
    Slow,
    VerySlow,
}

impl CompressionQuality {
    pub const NAMES: [&'static str; 5] = ["very-fast", "fast", "basic", "slow", "very-slow"];

    fn settings(self) -> bc6h::EncodeSettings {
        match self {
            CompressionQuality::VeryFast => bc6h::very_fast_settings(),
            CompressionQuality::Fast => bc6h::very_settings(),
            CompressionQuality::Basic => bc6h::basic_settings(),
            CompressionQuality::Slow => bc6h::slow_settings(),
            CompressionQuality::VerySlow => bc6h::very_slow_settings(),
        }
    }
}

impl FromStr for CompressionQuality {
    type Err = IblError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "very-fast" => Ok(CompressionQuality::VeryFast),
            "fast" => Ok(CompressionQuality::Fast),
            "basic" => Ok(CompressionQuality::Basic),
            "slow" => Ok(CompressionQuality::Slow),
            "very-slow" => Ok(CompressionQuality::VerySlow),
            _ => Err(IblError::InvalidSetting(format!(
                "unknown compression quality \"{s}\", expected one of {}",
                Self::NAMES.join(", ")
            ))),
        }
    }
}

impl fmt::Display for CompressionQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(Self::NAMES[*self as usize])
    }
}

/// Encodes half float RGBA rasters into BC6H blocks. Alpha is dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockCompressor {
    quality: CompressionQuality,
}

impl BlockCompressor {
    pub fn new(quality: CompressionQuality) -> BlockCompressor {
        BlockCompressor { quality }
    }

    /// `ceil(width / 4) * ceil(height / 4)` blocks of 16 bytes.
    pub fn compressed_size(width: u32, height: u32) -> usize {
        (width as usize).div_ceil(4) * (height as usize).div_ceil(4) * BLOCK_BYTES
    }

    /// Compresses a `width`x`height` raster whose rows start `stride` bytes
    /// apart into `dst`, which must be exactly `compressed_size` long.
    pub fn compress_into(
        &self,
        pixels: &[f16],
        width: u32,
        height: u32,
        stride: usize,
        dst: &mut [u8],
    ) -> Result<()> {
        let error = |message: String| IblError::Compression {
            width,
            height,
            message,
        };

        if width == 0 || height == 0 {
            return Err(error("empty raster".into()));
        }
        let row_bytes = width as usize * BYTES_PER_TEXEL;
        if stride < row_bytes || stride % std::mem::size_of::<f16>() != 0 {
            return Err(error(format!("stride {stride} can't hold a row of {row_bytes} bytes")));
        }
        let needed = stride * (height as usize - 1) + row_bytes;
        let bytes: &[u8] = bytemuck::cast_slice(pixels);
        if bytes.len() < needed {
            return Err(error(format!("raster holds {} bytes, needs {needed}", bytes.len())));
        }
        let expected = Self::compressed_size(width, height);
        if dst.len() != expected {
            return Err(error(format!("destination holds {} bytes, needs {expected}", dst.len())));
        }

        let settings = self.quality.settings();
        if width % 4 == 0 && height % 4 == 0 {
            let surface = RgbaSurface {
                data: bytes,
                width,
                height,
                stride: stride as u32,
            };
            bc6h::compress_blocks_into(&settings, &surface, dst);
            return Ok(());
        }

        // Partial blocks on the right and bottom edges repeat the last texel
        let padded_width = width.next_multiple_of(4);
        let padded_height = height.next_multiple_of(4);
        let padded_row = padded_width as usize * BYTES_PER_TEXEL;
        let mut padded = Vec::with_capacity(padded_row * padded_height as usize);
        for y in 0..padded_height as usize {
            let src_row = &bytes[y.min(height as usize - 1) * stride..][..row_bytes];
            padded.extend_from_slice(src_row);
            let last = &src_row[row_bytes - BYTES_PER_TEXEL..];
            for _ in width..padded_width {
                padded.extend_from_slice(last);
            }
        }

        let surface = RgbaSurface {
            data: &padded,
            width: padded_width,
            height: padded_height,
            stride: padded_row as u32,
        };
        bc6h::compress_blocks_into(&settings, &surface, dst);
        Ok(())
    }

    pub fn compress(&self, pixels: &[f16], width: u32, height: u32, stride: usize) -> Result<Vec<u8>> {
        let mut blocks = vec![0; Self::compressed_size(width, height)];
        self.compress_into(pixels, width, height, stride, &mut blocks)?;
        Ok(blocks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform(width: u32, height: u32, value: f32) -> Vec<f16> {
        let texel = [value, value, value, 1.].map(f16::from_f32);
        (0..width * height).flat_map(|_| texel).collect()
    }

    #[test]
    fn one_block_per_four_by_four() {
        assert_eq!(BlockCompressor::compressed_size(4, 4), 16);
        assert_eq!(BlockCompressor::compressed_size(128, 128), 128 * 128);
        assert_eq!(BlockCompressor::compressed_size(5, 3), 32);
        assert_eq!(BlockCompressor::compressed_size(1, 1), 16);
    }

    #[test]
    fn aligned_raster_fills_destination() {
        let compressor = BlockCompressor::default();
        let pixels = uniform(8, 4, 0.5);
        let blocks = compressor.compress(&pixels, 8, 4, 8 * BYTES_PER_TEXEL).unwrap();
        assert_eq!(blocks.len(), 32);
        // Identical blocks encode identically
        assert_eq!(blocks[..16], blocks[16..]);
    }

    #[test]
    fn unaligned_raster_is_padded() {
        let compressor = BlockCompressor::new(CompressionQuality::VeryFast);
        let pixels = uniform(5, 3, 2.);
        let blocks = compressor.compress(&pixels, 5, 3, 5 * BYTES_PER_TEXEL).unwrap();
        assert_eq!(blocks.len(), 32);
    }

    #[test]
    fn stride_skips_row_padding() {
        let compressor = BlockCompressor::new(CompressionQuality::VeryFast);
        let tight = uniform(4, 4, 1.5);
        // Same raster with two unused texels after every row
        let mut strided = Vec::new();
        for row in tight.chunks(16) {
            strided.extend_from_slice(row);
            strided.extend_from_slice(&[f16::from_f32(-7.); 8]);
        }
        let a = compressor.compress(&tight, 4, 4, 4 * BYTES_PER_TEXEL).unwrap();
        let b = compressor.compress(&strided, 4, 4, 6 * BYTES_PER_TEXEL).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn wrong_destination_size_is_rejected() {
        let compressor = BlockCompressor::default();
        let pixels = uniform(4, 4, 1.);
        let mut dst = vec![0; 15];
        let err = compressor
            .compress_into(&pixels, 4, 4, 4 * BYTES_PER_TEXEL, &mut dst)
            .unwrap_err();
        assert!(matches!(err, IblError::Compression { width: 4, height: 4, .. }));
    }

    #[test]
    fn every_quality_encodes() {
        let pixels = uniform(4, 4, 3.);
        for name in CompressionQuality::NAMES {
            let compressor = BlockCompressor::new(name.parse().unwrap());
            let block = compressor.compress(&pixels, 4, 4, 4 * BYTES_PER_TEXEL).unwrap();
            let mut rgb = [0f32; 48];
            bcdec_rs::bc6h_float(&block, &mut rgb, 12, false);
            assert!(rgb.iter().all(|c| (c - 3.).abs() < 0.05), "{name}: {rgb:?}");
        }
    }

    #[test]
    fn quality_names_round_trip() {
        for name in CompressionQuality::NAMES {
            let quality: CompressionQuality = name.parse().unwrap();
            assert_eq!(quality.to_string(), name);
        }
        assert!("ultra".parse::<CompressionQuality>().is_err());
    }
}
