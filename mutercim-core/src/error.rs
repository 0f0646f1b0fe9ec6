use thiserror::Error;

use crate::client::TranslationError;

#[derive(Error, Debug)]
pub enum MutercimError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("{format} extraction failed: {reason}")]
    Extraction { format: &'static str, reason: String },

    #[error("repack failed: {0}")]
    Repack(String),

    #[error("cannot compress under ceiling: {width}x{height} already at the dimension floor")]
    CompressionExhausted { width: u32, height: u32 },

    #[error(transparent)]
    Translation(#[from] TranslationError),

    #[error("unsupported container format: {0}")]
    UnsupportedFormat(String),
}

// Convenient crate-wide result type
pub type Result<T> = std::result::Result<T, MutercimError>;
