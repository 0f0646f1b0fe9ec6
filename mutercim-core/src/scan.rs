use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::Result;
use crate::util::natord::natural_cmp;

/// Container extensions the pipeline understands.
pub const ARCHIVE_EXTENSIONS: &[&str] = &["pdf", "cbz", "cbr", "cb7", "epub", "zip", "rar", "7z"];

/// Recursively list translatable containers under `root`, pruning hidden
/// directories and this tool's own working trees, in natural path order.
pub fn find_archives(root: &Path) -> Result<Vec<PathBuf>> {
    let mut found: Vec<(String, PathBuf)> = Vec::new();
    let walker = WalkDir::new(root).follow_links(false).into_iter();
    for entry in walker.filter_entry(|e| {
        !e.file_type().is_dir() || e.depth() == 0 || {
            let name = e.file_name().to_string_lossy();
            !(name.starts_with('.') || name == "error" || name.contains("_output_"))
        }
    }) {
        let entry = entry.map_err(|e| std::io::Error::other(e))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let is_archive = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| {
                let e = e.to_ascii_lowercase();
                ARCHIVE_EXTENSIONS.contains(&e.as_str())
            })
            .unwrap_or(false);
        if !is_archive {
            continue;
        }
        let key = entry.path().to_string_lossy().replace('\\', "/");
        found.push((key, entry.into_path()));
    }
    found.sort_by(|a, b| natural_cmp(&a.0, &b.0));
    Ok(found.into_iter().map(|(_, p)| p).collect())
}
