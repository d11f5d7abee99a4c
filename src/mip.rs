//! Mip chain arithmetic shared by the bakers and by asset consumers.
//!
//! Compressed faces never go below a single 4x4 block, so every level past
//! the point where the texture would shrink under 4 texels is stored at 4x4.
//! The byte size of a level is one byte per texel, the BC6H ratio.

/// Smallest edge length a compressed mip level is stored at.
pub const MIN_MIP_RESOLUTION: u32 = 4;

/// Bytes BC6H spends on one 4x4 block.
pub const BLOCK_BYTES: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MipLevel {
    pub index: u32,
    pub resolution: u32,
}

/// Storage edge length of mip `level` of a chain starting at `resolution`.
pub fn mip_resolution(resolution: u32, level: u32) -> u32 {
    resolution
        .checked_shr(level)
        .unwrap_or(0)
        .max(MIN_MIP_RESOLUTION)
}

/// Edge length the level would have without the block floor.
pub fn nominal_resolution(resolution: u32, level: u32) -> u32 {
    resolution.checked_shr(level).unwrap_or(0).max(1)
}

pub fn mip_chain(resolution: u32, levels: u32) -> impl Iterator<Item = MipLevel> {
    (0..levels).map(move |index| MipLevel {
        index,
        resolution: mip_resolution(resolution, index),
    })
}

/// `floor(log2(resolution)) + 1`.
pub fn full_mip_count(resolution: u32) -> u32 {
    if resolution == 0 {
        return 0;
    }
    u32::BITS - resolution.leading_zeros()
}

pub fn is_valid_resolution(resolution: u32) -> bool {
    resolution.is_power_of_two() && resolution >= MIN_MIP_RESOLUTION
}

/// Compressed size of a single square level.
pub fn level_size_in_bytes(resolution: u32) -> usize {
    let blocks = (resolution as usize).div_ceil(4);
    blocks * blocks * BLOCK_BYTES
}

/// Compressed size of one face with `levels` mips.
///
/// Must be fed the same `(resolution, levels)` that drives the mip loop,
/// otherwise the destination buffer is undersized.
pub fn texture_size_in_bytes(resolution: u32, levels: u32) -> usize {
    mip_chain(resolution, levels)
        .map(|mip| level_size_in_bytes(mip.resolution))
        .sum()
}

/// Byte offset of `(face, level)` inside a face-major, mip-minor payload.
pub fn mip_offset(resolution: u32, levels: u32, face: usize, level: u32) -> usize {
    face * texture_size_in_bytes(resolution, levels) + texture_size_in_bytes(resolution, level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_chain_ends_at_the_block_floor() {
        for shift in 2..=12 {
            let resolution = 1u32 << shift;
            let levels = full_mip_count(resolution);
            let chain: Vec<_> = mip_chain(resolution, levels).collect();

            assert_eq!(chain.len() as u32, levels);
            assert_eq!(chain[0].resolution, resolution);
            for pair in chain.windows(2) {
                assert_eq!(pair[1].resolution, (pair[0].resolution / 2).max(4));
                assert_eq!(pair[1].index, pair[0].index + 1);
            }
            assert_eq!(chain.last().map(|m| m.resolution), Some(4));
        }
    }

    #[test]
    fn mip_count_is_floor_log2_plus_one() {
        assert_eq!(full_mip_count(4), 3);
        assert_eq!(full_mip_count(8), 4);
        assert_eq!(full_mip_count(1024), 11);
        assert_eq!(full_mip_count(1000), 10);
    }

    #[test]
    fn prefiltered_face_size() {
        assert_eq!(
            texture_size_in_bytes(128, 5),
            128 * 128 + 64 * 64 + 32 * 32 + 16 * 16 + 8 * 8
        );
        assert_eq!(texture_size_in_bytes(128, 5), 21824);
    }

    #[test]
    fn size_grows_with_levels() {
        for resolution in [4, 16, 256] {
            let sizes: Vec<_> = (0..=full_mip_count(resolution) + 2)
                .map(|levels| texture_size_in_bytes(resolution, levels))
                .collect();
            assert!(sizes.windows(2).all(|w| w[0] <= w[1]));
        }
    }

    #[test]
    fn offsets_are_face_major() {
        let per_face = texture_size_in_bytes(32, 4);
        assert_eq!(mip_offset(32, 4, 0, 0), 0);
        assert_eq!(mip_offset(32, 4, 0, 1), 1024);
        assert_eq!(mip_offset(32, 4, 2, 0), 2 * per_face);
        assert_eq!(mip_offset(32, 4, 5, 3), 5 * per_face + 1024 + 256 + 64);
    }

    #[test]
    fn only_powers_of_two_from_four() {
        assert!(is_valid_resolution(4));
        assert!(is_valid_resolution(2048));
        assert!(!is_valid_resolution(2));
        assert!(!is_valid_resolution(0));
        assert!(!is_valid_resolution(96));
    }
}
