use half::f16;

use crate::{
    backend::RenderBackend,
    cube::CubeFace,
    error::{IblError, Result},
    mip::{full_mip_count, is_valid_resolution, mip_chain, nominal_resolution, MipLevel},
};

/// A cubemap living in a backend together with the chain that was rendered
/// into it.
#[derive(Debug)]
pub struct CubemapTexture<C> {
    pub texture: C,
    pub resolution: u32,
    pub mip_levels: u32,
}

impl<C> CubemapTexture<C> {
    /// Levels as they're stored once compressed, never smaller than 4x4.
    pub fn mip_chain(&self) -> impl Iterator<Item = MipLevel> {
        mip_chain(self.resolution, self.mip_levels)
    }
}

/// Checks a `(resolution, levels)` pair before anything is allocated for it.
pub fn validate_chain(resolution: u32, levels: u32) -> Result<()> {
    if !is_valid_resolution(resolution) {
        return Err(IblError::InvalidResolution(resolution));
    }
    if levels == 0 || levels > full_mip_count(resolution) {
        return Err(IblError::InvalidMipCount { resolution, levels });
    }
    Ok(())
}

/// Reads back `(face, level)` and brings it to the level's storage size.
///
/// Backends shrink levels below 4x4 like any texture does; those are
/// replicated up to a full block so every stored level covers whole blocks.
pub fn read_level<B: RenderBackend>(
    backend: &mut B,
    cubemap: &CubemapTexture<B::Cubemap>,
    face: CubeFace,
    level: MipLevel,
) -> Result<Vec<f16>> {
    let nominal = nominal_resolution(cubemap.resolution, level.index);
    let pixels = backend.read_pixels(&cubemap.texture, face, level.index)?;
    let expected = (nominal * nominal * 4) as usize;
    if pixels.len() != expected {
        return Err(IblError::Backend(format!(
            "readback of {face:?} mip {} returned {} halves, expected {expected}",
            level.index,
            pixels.len()
        )));
    }
    Ok(replicate(&pixels, nominal, level.resolution))
}

/// Nearest neighbour upscale of a square RGBA raster by an integer factor.
fn replicate(pixels: &[f16], size: u32, target: u32) -> Vec<f16> {
    if size == target {
        return pixels.to_vec();
    }
    let factor = (target / size) as usize;
    let (size, target) = (size as usize, target as usize);
    let mut out = Vec::with_capacity(target * target * 4);
    for y in 0..target {
        let row = (y / factor) * size;
        for x in 0..target {
            let idx = (row + x / factor) * 4;
            out.extend_from_slice(&pixels[idx..idx + 4]);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_validation() {
        assert!(validate_chain(128, 5).is_ok());
        assert!(validate_chain(8, 4).is_ok());
        assert!(matches!(validate_chain(8, 5), Err(IblError::InvalidMipCount { .. })));
        assert!(matches!(validate_chain(8, 0), Err(IblError::InvalidMipCount { .. })));
        assert!(matches!(validate_chain(12, 1), Err(IblError::InvalidResolution(12))));
    }

    #[test]
    fn single_texel_fills_a_block() {
        let texel = [1., 2., 3., 4.].map(f16::from_f32);
        let out = replicate(&texel, 1, 4);
        assert_eq!(out.len(), 64);
        assert!(out.chunks(4).all(|c| c == texel));
    }

    #[test]
    fn quadrants_stay_in_place() {
        let pixels: Vec<f16> = (0..4)
            .flat_map(|i| [i as f32, 0., 0., 1.])
            .map(f16::from_f32)
            .collect();
        let out = replicate(&pixels, 2, 4);
        let reds: Vec<f32> = out.chunks(4).map(|c| c[0].to_f32()).collect();
        #[rustfmt::skip]
        let expected = [
            0., 0., 1., 1.,
            0., 0., 1., 1.,
            2., 2., 3., 3.,
            2., 2., 3., 3.,
        ];
        assert_eq!(reds, expected);
    }
}
