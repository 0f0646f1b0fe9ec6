use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use log::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::codec::{Extraction, PageRef, find_images, is_image_name};
use crate::error::Result;
use crate::util::natord::natural_cmp;

/// Extract the image entries of a cbz/zip container, ordered naturally by
/// entry name. Platform metadata directories and hidden entries are skipped.
pub fn extract(archive: &Path, dest: &Path) -> Result<Extraction> {
    let file = File::open(archive)?;
    let mut zip = ZipArchive::new(file).map_err(io::Error::other)?;

    // First pass: select and order image entries without touching the disk.
    let mut selected: Vec<(usize, String, PathBuf)> = Vec::new();
    for i in 0..zip.len() {
        let entry = zip.by_index(i).map_err(io::Error::other)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        if !is_image_name(&name) || is_metadata_entry(&name) {
            continue;
        }
        let Some(rel) = entry.enclosed_name() else {
            debug!("skipping unsafe entry name: {name}");
            continue;
        };
        selected.push((i, name, rel));
    }
    selected.sort_by(|a, b| natural_cmp(&a.1, &b.1));

    let mut pages = Vec::with_capacity(selected.len());
    for (index, (zip_index, name, rel)) in selected.into_iter().enumerate() {
        let out = dest.join(&rel);
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut entry = zip.by_index(zip_index).map_err(io::Error::other)?;
        let mut f = File::create(&out)?;
        io::copy(&mut entry, &mut f)?;
        pages.push(PageRef {
            entry_name: name,
            index,
            path: out,
        });
    }

    Ok(Extraction {
        pages,
        image_map: None,
    })
}

/// Write every translated page into a fresh cbz, one entry per page, in
/// natural order of the translated filenames. Quarantined pages are simply
/// absent, so the output may be shorter than the input.
pub fn repack(translated_dir: &Path, out: &Path) -> Result<()> {
    let images = find_images(translated_dir)?;
    let file = File::create(out)?;
    let mut zip = ZipWriter::new(file);
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for path in &images {
        let name = path
            .strip_prefix(translated_dir)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        zip.start_file(name, deflated).map_err(io::Error::other)?;
        let mut src = File::open(path)?;
        io::copy(&mut src, &mut zip)?;
    }

    zip.finish().map_err(io::Error::other)?;
    Ok(())
}

fn is_metadata_entry(name: &str) -> bool {
    name.split('/').any(|part| {
        part == "__MACOSX" || part.starts_with('.') || part.starts_with("._")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_cbz(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut zip = ZipWriter::new(file);
        let opts = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for (name, bytes) in entries {
            zip.start_file(*name, opts).unwrap();
            use std::io::Write;
            zip.write_all(bytes).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn extract_filters_and_orders() {
        let dir = tempfile::tempdir().unwrap();
        let cbz = dir.path().join("book.cbz");
        make_cbz(
            &cbz,
            &[
                ("page_10.png", b"ten".as_slice()),
                ("__MACOSX/page_1.png", b"junk"),
                ("ComicInfo.xml", b"meta"),
                ("page_2.png", b"two"),
                ("page_1.png", b"one"),
            ],
        );

        let dest = dir.path().join("x");
        fs::create_dir_all(&dest).unwrap();
        let extraction = extract(&cbz, &dest).unwrap();
        let names: Vec<_> = extraction
            .pages
            .iter()
            .map(|p| p.entry_name.as_str())
            .collect();
        assert_eq!(names, vec!["page_1.png", "page_2.png", "page_10.png"]);
        assert_eq!(fs::read(&extraction.pages[0].path).unwrap(), b"one");
        assert!(extraction.image_map.is_none());
    }

    #[test]
    fn repack_preserves_count_and_order() {
        let dir = tempfile::tempdir().unwrap();
        let translated = dir.path().join("translated");
        fs::create_dir_all(&translated).unwrap();
        for name in ["page_2_translated.jpg", "page_10_translated.jpg", "page_1_translated.jpg"] {
            fs::write(translated.join(name), name.as_bytes()).unwrap();
        }

        let out = dir.path().join("out.cbz");
        repack(&translated, &out).unwrap();

        let mut zip = ZipArchive::new(File::open(&out).unwrap()).unwrap();
        assert_eq!(zip.len(), 3);
        let order: Vec<_> = (0..zip.len())
            .map(|i| zip.by_index(i).unwrap().name().to_string())
            .collect();
        assert_eq!(
            order,
            vec![
                "page_1_translated.jpg",
                "page_2_translated.jpg",
                "page_10_translated.jpg"
            ]
        );
    }

    #[test]
    fn corrupt_container_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("broken.cbz");
        fs::write(&bogus, b"this is not a zip").unwrap();
        let dest = dir.path().join("x");
        fs::create_dir_all(&dest).unwrap();
        assert!(extract(&bogus, &dest).is_err());
    }
}
