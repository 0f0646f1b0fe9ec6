use std::io;
use std::path::Path;

use crate::codec::{Extraction, discover_pages};
use crate::error::Result;

/// Extract a cb7/7z container. The full entry set is unpacked; filtering
/// happens when the page set is discovered on disk.
pub fn extract(archive: &Path, dest: &Path) -> Result<Extraction> {
    sevenz_rust::decompress_file(archive, dest)
        .map_err(|e| io::Error::other(e.to_string()))?;

    let pages = discover_pages(dest)?;
    Ok(Extraction {
        pages,
        image_map: None,
    })
}
