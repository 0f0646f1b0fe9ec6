use std::io;
use std::path::Path;

use unrar::Archive;

use crate::codec::{Extraction, discover_pages};
use crate::error::Result;

/// Extract a cbr/rar container. The rar decoder unpacks every file entry;
/// pages are then discovered on disk with the usual image filter and
/// natural ordering.
pub fn extract(archive: &Path, dest: &Path) -> Result<Extraction> {
    let mut rar = Archive::new(archive)
        .open_for_processing()
        .map_err(|e| io::Error::other(e.to_string()))?;

    while let Some(header) = rar
        .read_header()
        .map_err(|e| io::Error::other(e.to_string()))?
    {
        rar = if header.entry().is_file() {
            header
                .extract_with_base(dest)
                .map_err(|e| io::Error::other(e.to_string()))?
        } else {
            header.skip().map_err(|e| io::Error::other(e.to_string()))?
        };
    }

    let pages = discover_pages(dest)?;
    Ok(Extraction {
        pages,
        image_map: None,
    })
}
