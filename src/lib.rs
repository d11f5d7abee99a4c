//! Bakes an equirectangular HDR panorama into the three cubemaps image based
//! lighting needs: the environment with its full mip chain, diffuse
//! irradiance and GGX prefiltered specular, all BC6H compressed.

pub mod asset;
pub mod backend;
pub mod compress;
pub mod cube;
pub mod error;
pub mod irradiance;
pub mod mip;
pub mod pipeline;
pub mod prefilter;
pub mod program;
pub mod projector;
pub mod radiance;
pub mod texture;

pub use asset::{read_asset, write_asset, AssetHeader, CompressedAsset, CUBEMAP_MAGIC};
pub use backend::{CpuBackend, GpuBackend, RenderBackend};
pub use compress::{BlockCompressor, CompressionQuality};
pub use error::{IblError, Result};
pub use pipeline::{BakeConfig, BakedAssets, Baker, BatchReport};
pub use radiance::{load_radiance, RadianceImage};
