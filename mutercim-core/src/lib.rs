#![forbid(unsafe_code)]

pub mod error;

pub mod util {
    pub mod natord;
}

pub mod compress;

pub mod codec;

pub mod batch;
pub mod client;
pub mod job;
pub mod scan;

// Re-exports: stable API surface
pub use batch::{BatchOptions, BatchResult, PageOutcome};
pub use client::{Translate, TranslationError, ToriiClient};
pub use codec::{Extraction, Format, ImageMap, PageRef};
pub use error::{MutercimError, Result};
pub use job::{JobOptions, translate_archive, translate_folder};
pub use scan::find_archives;
