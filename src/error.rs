use std::{io, path::PathBuf};

pub type Result<T, E = IblError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum IblError {
    #[error("couldn't decode \"{}\" as a floating point image: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("radiance image must have 3 channels, found {channels}")]
    Format { channels: u8 },

    #[error("radiance raster of {width}x{height} needs {expected} samples, got {actual}")]
    RasterSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("cubemap resolution {0} must be a power of two not smaller than 4")]
    InvalidResolution(u32),

    #[error("{levels} mips don't fit a {resolution}x{resolution} cubemap")]
    InvalidMipCount { resolution: u32, levels: u32 },

    #[error("invalid bake setting: {0}")]
    InvalidSetting(String),

    #[error("couldn't initialize rendering backend: {0}")]
    BackendInit(String),

    #[error("couldn't link program `{program}`: {message}")]
    ProgramLink {
        program: &'static str,
        message: String,
    },

    #[error("program `{program}` has no uniform named `{name}`")]
    UnknownUniform {
        program: &'static str,
        name: String,
    },

    #[error("backend failure: {0}")]
    Backend(String),

    #[error("block compression of a {width}x{height} raster: {message}")]
    Compression {
        width: u32,
        height: u32,
        message: String,
    },

    #[error("a {resolution}x{resolution} asset with {levels} mips doesn't fit in memory")]
    AssetTooLarge { resolution: u32, levels: u32 },

    #[error("unexpected asset magic {found:?}, expected {expected:?}")]
    BadMagic { found: [u8; 4], expected: [u8; 4] },

    #[error("reading asset stream: {0}")]
    Stream(#[from] io::Error),

    #[error("i/o error on \"{}\": {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl IblError {
    /// Failures confined to one input file, the rest of a batch can go on.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            IblError::Decode { .. } | IblError::Format { .. } | IblError::RasterSize { .. }
        )
    }

    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| IblError::Io { path, source }
    }
}
