//! Binary cubemap container.
//!
//! ```text
//! offset 0  : [u8; 4] magic
//! offset 4  : u32     mipmap levels
//! offset 8  : u32     resolution of mip 0
//! offset 12 : payload, face major then mip minor, BC6H blocks
//! ```
//!
//! Integers are little endian. Nothing delimits faces or mips; readers
//! recompute the offsets from the header with [`crate::mip`].

use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Read, Write},
    path::Path,
};

use log::info;

use crate::{
    error::{IblError, Result},
    mip::{level_size_in_bytes, mip_chain, mip_offset, mip_resolution, BLOCK_BYTES},
    texture::validate_chain,
};

pub const CUBEMAP_MAGIC: [u8; 4] = *b"DDS ";
pub const HEADER_SIZE: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetHeader {
    pub magic: [u8; 4],
    pub mipmap_levels: u32,
    pub resolution: u32,
}

impl AssetHeader {
    pub fn new(resolution: u32, mipmap_levels: u32) -> AssetHeader {
        AssetHeader {
            magic: CUBEMAP_MAGIC,
            mipmap_levels,
            resolution,
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4..8].copy_from_slice(&self.mipmap_levels.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.resolution.to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: [u8; HEADER_SIZE]) -> Result<AssetHeader> {
        let magic = [bytes[0], bytes[1], bytes[2], bytes[3]];
        if magic != CUBEMAP_MAGIC {
            return Err(IblError::BadMagic {
                found: magic,
                expected: CUBEMAP_MAGIC,
            });
        }
        let header = AssetHeader {
            magic,
            mipmap_levels: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            resolution: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
        };
        header.validate()?;
        Ok(header)
    }

    /// Rejects resolutions and mip counts no baker produces.
    pub fn validate(&self) -> Result<()> {
        validate_chain(self.resolution, self.mipmap_levels)
    }

    /// Payload length implied by the header, all six faces.
    pub fn payload_len(&self) -> Result<usize> {
        self.validate()?;
        mip_chain(self.resolution, self.mipmap_levels)
            .try_fold(0usize, |total, mip| {
                let blocks = (mip.resolution as usize).div_ceil(4);
                blocks
                    .checked_mul(blocks)?
                    .checked_mul(BLOCK_BYTES)?
                    .checked_add(total)
            })
            .and_then(|face| face.checked_mul(6))
            .ok_or(IblError::AssetTooLarge {
                resolution: self.resolution,
                levels: self.mipmap_levels,
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedAsset {
    pub header: AssetHeader,
    pub payload: Vec<u8>,
}

impl CompressedAsset {
    /// Zeroed asset with the payload sized for `resolution` and `mipmap_levels`.
    pub fn new(resolution: u32, mipmap_levels: u32) -> Result<CompressedAsset> {
        let header = AssetHeader::new(resolution, mipmap_levels);
        Ok(CompressedAsset {
            payload: vec![0; header.payload_len()?],
            header,
        })
    }

    /// Blocks of one face at one mip level.
    pub fn level(&self, face: usize, mip: u32) -> &[u8] {
        let range = self.level_range(face, mip);
        &self.payload[range]
    }

    pub fn level_mut(&mut self, face: usize, mip: u32) -> &mut [u8] {
        let range = self.level_range(face, mip);
        &mut self.payload[range]
    }

    fn level_range(&self, face: usize, mip: u32) -> std::ops::Range<usize> {
        let AssetHeader {
            resolution,
            mipmap_levels,
            ..
        } = self.header;
        let start = mip_offset(resolution, mipmap_levels, face, mip);
        start..start + level_size_in_bytes(mip_resolution(resolution, mip))
    }

    pub fn write_to<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(&self.header.to_bytes())?;
        writer.write_all(&self.payload)?;
        writer.flush()
    }

    /// Reads a header and exactly the payload it implies.
    pub fn read_from<R: Read>(mut reader: R) -> Result<CompressedAsset> {
        let mut bytes = [0; HEADER_SIZE];
        reader.read_exact(&mut bytes)?;
        let header = AssetHeader::from_bytes(bytes)?;

        let expected = header.payload_len()?;
        let mut payload = Vec::new();
        reader.take(expected as u64).read_to_end(&mut payload)?;
        if payload.len() != expected {
            return Err(IblError::Stream(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("payload has {} bytes, header implies {expected}", payload.len()),
            )));
        }
        Ok(CompressedAsset { header, payload })
    }
}

pub fn write_asset(asset: &CompressedAsset, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(IblError::io(path))?;
    asset.write_to(BufWriter::new(file)).map_err(IblError::io(path))?;
    info!(
        "Wrote {} ({}x{}, {} mips, {} bytes)",
        path.display(),
        asset.header.resolution,
        asset.header.resolution,
        asset.header.mipmap_levels,
        HEADER_SIZE + asset.payload.len()
    );
    Ok(())
}

pub fn read_asset(path: impl AsRef<Path>) -> Result<CompressedAsset> {
    let path = path.as_ref();
    let file = File::open(path).map_err(IblError::io(path))?;
    CompressedAsset::read_from(BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterned(resolution: u32, levels: u32) -> CompressedAsset {
        let mut asset = CompressedAsset::new(resolution, levels).unwrap();
        for (i, byte) in asset.payload.iter_mut().enumerate() {
            *byte = (i % 251) as u8;
        }
        asset
    }

    #[test]
    fn header_layout() {
        let header = AssetHeader::new(0x0102_0304, 5);
        let bytes = header.to_bytes();
        assert_eq!(&bytes[..4], b"DDS ");
        assert_eq!(&bytes[4..8], &[5, 0, 0, 0]);
        assert_eq!(&bytes[8..], &[4, 3, 2, 1]);
    }

    #[test]
    fn round_trip() {
        let asset = patterned(128, 5);
        assert_eq!(asset.payload.len(), 21824 * 6);

        let mut bytes = Vec::new();
        asset.write_to(&mut bytes).unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE + asset.payload.len());

        let header = AssetHeader::from_bytes(bytes[..HEADER_SIZE].try_into().unwrap()).unwrap();
        assert_eq!(header, asset.header);
        assert_eq!(header.payload_len().unwrap(), asset.payload.len());

        let read = CompressedAsset::read_from(bytes.as_slice()).unwrap();
        assert_eq!(read, asset);
    }

    #[test]
    fn levels_are_face_major() {
        let mut asset = CompressedAsset::new(16, 3).unwrap();
        asset.level_mut(1, 2).fill(0xAB);
        // Face 0 is 256 + 64 + 16 bytes, face 1 mip 2 follows its mips 0 and 1
        let start = 336 + 256 + 64;
        assert!(asset.payload[start..start + 16].iter().all(|&b| b == 0xAB));
        assert_eq!(asset.payload.iter().filter(|&&b| b == 0xAB).count(), 16);
        assert_eq!(asset.level(1, 2), &[0xAB; 16]);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut bytes = Vec::new();
        patterned(4, 1).write_to(&mut bytes).unwrap();
        bytes[..4].copy_from_slice(b"KTX ");
        let err = CompressedAsset::read_from(bytes.as_slice()).unwrap_err();
        assert!(matches!(err, IblError::BadMagic { found, .. } if &found == b"KTX "));
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let mut bytes = Vec::new();
        patterned(8, 2).write_to(&mut bytes).unwrap();
        bytes.pop();
        let err = CompressedAsset::read_from(bytes.as_slice()).unwrap_err();
        assert!(matches!(err, IblError::Stream(ref e) if e.kind() == io::ErrorKind::UnexpectedEof));
    }

    #[test]
    fn file_round_trip() {
        let path = std::env::temp_dir().join(format!("envbake_asset_{}.cubemap", std::process::id()));
        let asset = patterned(32, 4);
        write_asset(&asset, &path).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len() as usize, HEADER_SIZE + asset.payload.len());
        assert_eq!(read_asset(&path).unwrap(), asset);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn missing_directory_reports_path() {
        let path = std::env::temp_dir().join("envbake_missing_dir/out.cubemap");
        let err = write_asset(&CompressedAsset::new(4, 1).unwrap(), &path).unwrap_err();
        assert!(matches!(err, IblError::Io { path: ref p, .. } if p == &path));
    }

    fn raw_header(levels: u32, resolution: u32) -> Vec<u8> {
        let mut bytes = b"DDS ".to_vec();
        bytes.extend_from_slice(&levels.to_le_bytes());
        bytes.extend_from_slice(&resolution.to_le_bytes());
        bytes
    }

    #[test]
    fn oversized_header_is_an_error() {
        let err = CompressedAsset::read_from(raw_header(1, 1 << 31).as_slice()).unwrap_err();
        assert!(matches!(err, IblError::AssetTooLarge { levels: 1, .. }), "{err}");
    }

    #[test]
    fn header_chain_is_validated() {
        let err = CompressedAsset::read_from(raw_header(u32::MAX, 8).as_slice()).unwrap_err();
        assert!(matches!(err, IblError::InvalidMipCount { resolution: 8, .. }));
        let err = CompressedAsset::read_from(raw_header(0, 8).as_slice()).unwrap_err();
        assert!(matches!(err, IblError::InvalidMipCount { levels: 0, .. }));
        let err = CompressedAsset::read_from(raw_header(1, 12).as_slice()).unwrap_err();
        assert!(matches!(err, IblError::InvalidResolution(12)));
    }
}
