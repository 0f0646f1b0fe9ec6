use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{MutercimError, Result};
use crate::util::natord::natural_cmp;

pub mod epubc;
pub mod pdf;
pub mod rarc;
pub mod sevenzc;
pub mod zipc;

/// Extensions the translation service accepts as page images.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

/// Container family, selected by file extension at the boundary. Each
/// variant is stateless; dispatch is a plain match.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Format {
    Pdf,
    Zip,
    Rar,
    SevenZ,
    Epub,
}

impl Format {
    pub fn from_path(path: &Path) -> Option<Format> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(Format::Pdf),
            "cbz" | "zip" => Some(Format::Zip),
            "cbr" | "rar" => Some(Format::Rar),
            "cb7" | "7z" => Some(Format::SevenZ),
            "epub" => Some(Format::Epub),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Format::Pdf => "pdf",
            Format::Zip => "zip",
            Format::Rar => "rar",
            Format::SevenZ => "7z",
            Format::Epub => "epub",
        }
    }

    /// Output container extension: PDF and EPUB round-trip, the zip/rar/7z
    /// family normalizes to cbz.
    pub fn output_extension(self) -> &'static str {
        match self {
            Format::Pdf => "pdf",
            Format::Epub => "epub",
            _ => "cbz",
        }
    }
}

/// One extractable page image inside a source container.
#[derive(Clone, Debug)]
pub struct PageRef {
    /// Container-internal identity (zip entry name, epub href, pdf page).
    pub entry_name: String,
    /// Position after natural sort (PDF: native page order).
    pub index: usize,
    /// Filesystem location once materialized.
    pub path: PathBuf,
}

/// EPUB rename table: synthetic on-disk file name -> original container
/// entry name. Ordered; passed explicitly from extract to repack.
#[derive(Clone, Debug, Default)]
pub struct ImageMap(pub Vec<(String, String)>);

impl ImageMap {
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(s, o)| (s.as_str(), o.as_str()))
    }
}

/// Result of extracting a container: ordered pages, plus the rename table
/// for formats whose internal paths are not filesystem-safe.
pub struct Extraction {
    pub pages: Vec<PageRef>,
    pub image_map: Option<ImageMap>,
}

/// Extract the ordered page set of `archive` into `dest`. Any failure is
/// fatal for the whole job; there is no partial archive to salvage.
pub fn extract(format: Format, archive: &Path, dest: &Path) -> Result<Extraction> {
    let result = match format {
        Format::Pdf => pdf::extract(archive, dest),
        Format::Zip => zipc::extract(archive, dest),
        Format::Rar => rarc::extract(archive, dest),
        Format::SevenZ => sevenzc::extract(archive, dest),
        Format::Epub => epubc::extract(archive, dest),
    };
    result.map_err(|e| match e {
        e @ MutercimError::Extraction { .. } => e,
        other => MutercimError::Extraction {
            format: format.name(),
            reason: other.to_string(),
        },
    })
}

/// Re-pack translated pages from `translated_dir` into `out`. A failure
/// here means the partial output must not be trusted; callers discard it.
pub fn repack(
    format: Format,
    source: &Path,
    translated_dir: &Path,
    image_map: Option<&ImageMap>,
    out: &Path,
) -> Result<()> {
    let result = match format {
        Format::Pdf => pdf::repack(translated_dir, out),
        Format::Zip | Format::Rar | Format::SevenZ => zipc::repack(translated_dir, out),
        Format::Epub => epubc::repack(source, translated_dir, image_map, out),
    };
    result.map_err(|e| match e {
        e @ MutercimError::Repack(_) => e,
        other => MutercimError::Repack(other.to_string()),
    })
}

pub(crate) fn is_image_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| {
        lower.ends_with(ext) && lower[..lower.len() - ext.len()].ends_with('.')
    })
}

fn skip_dir(name: &str) -> bool {
    name.starts_with('.')
        || name == "__MACOSX"
        || name == "error"
        || name == "translated"
        || name.contains("_output_")
}

/// All page images under `root`, in natural order of their relative paths.
pub fn find_images(root: &Path) -> Result<Vec<PathBuf>> {
    let mut found: Vec<(String, PathBuf)> = Vec::new();
    let walker = WalkDir::new(root).follow_links(false).into_iter();
    for entry in walker.filter_entry(|e| {
        !e.file_type().is_dir() || e.depth() == 0 || {
            let name = e.file_name().to_string_lossy();
            !skip_dir(&name)
        }
    }) {
        let entry = entry.map_err(|e| std::io::Error::other(e))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if name.starts_with('.') || !is_image_name(&name) {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");
        found.push((rel, entry.into_path()));
    }
    found.sort_by(|a, b| natural_cmp(&a.0, &b.0));
    Ok(found.into_iter().map(|(_, p)| p).collect())
}

/// Build the ordered page set from images already on disk (rar/7z extract
/// everything; pages are discovered afterwards).
pub fn discover_pages(root: &Path) -> Result<Vec<PageRef>> {
    let images = find_images(root)?;
    Ok(images
        .into_iter()
        .enumerate()
        .map(|(index, path)| {
            let entry_name = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");
            PageRef {
                entry_name,
                index,
                path,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_from_extension() {
        assert_eq!(Format::from_path(Path::new("a.CBZ")), Some(Format::Zip));
        assert_eq!(Format::from_path(Path::new("b.cbr")), Some(Format::Rar));
        assert_eq!(Format::from_path(Path::new("c.cb7")), Some(Format::SevenZ));
        assert_eq!(Format::from_path(Path::new("d.pdf")), Some(Format::Pdf));
        assert_eq!(Format::from_path(Path::new("e.epub")), Some(Format::Epub));
        assert_eq!(Format::from_path(Path::new("f.txt")), None);
        assert_eq!(Format::from_path(Path::new("noext")), None);
    }

    #[test]
    fn image_name_filter() {
        assert!(is_image_name("page_1.jpg"));
        assert!(is_image_name("PAGE_2.PNG"));
        assert!(is_image_name("x.webp"));
        assert!(!is_image_name("notes.txt"));
        assert!(!is_image_name("jpg")); // extension only, no stem dot
    }

    #[test]
    fn discovery_is_naturally_ordered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["page_10.png", "page_2.png", "page_1.png", "skip.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let pages = discover_pages(dir.path()).unwrap();
        let names: Vec<_> = pages.iter().map(|p| p.entry_name.as_str()).collect();
        assert_eq!(names, vec!["page_1.png", "page_2.png", "page_10.png"]);
        assert_eq!(pages[2].index, 2);
    }

    #[test]
    fn discovery_prunes_working_dirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("page_1.png"), b"x").unwrap();
        for sub in ["error", "book_output_20250101", "__MACOSX"] {
            let d = dir.path().join(sub);
            std::fs::create_dir_all(&d).unwrap();
            std::fs::write(d.join("page_9.png"), b"x").unwrap();
        }
        let pages = discover_pages(dir.path()).unwrap();
        assert_eq!(pages.len(), 1);
    }
}
