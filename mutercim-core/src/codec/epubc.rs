use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{self, Cursor, Read, Write};
use std::path::Path;

use log::{debug, warn};
use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesStart, Event};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::codec::{Extraction, ImageMap, PageRef};
use crate::error::Result;

/// Replaced page images are always re-encoded as JPEG on repack.
const CANONICAL_MEDIA_TYPE: &str = "image/jpeg";
const CANONICAL_EXTENSION: &str = "jpg";

/// Extract the image items of an EPUB. Internal hrefs are not
/// filesystem-safe, so each image is materialized under a synthetic
/// zero-padded name and the original entry name is recorded in the
/// returned [`ImageMap`].
pub fn extract(archive: &Path, dest: &Path) -> Result<Extraction> {
    let file = File::open(archive)?;
    let mut zip = ZipArchive::new(file).map_err(io::Error::other)?;

    let opf_path = parse_container(&read_entry(&mut zip, "META-INF/container.xml")?)?;
    let opf_dir = parent_dir(&opf_path);
    let opf_src = read_entry(&mut zip, &opf_path)?;
    let hrefs = manifest_image_hrefs(&opf_src)?;

    let mut pages = Vec::new();
    let mut map = Vec::new();
    let mut seq = 0usize;
    for href in hrefs {
        let entry_name = resolve_href(opf_dir, &href);
        let bytes = match read_entry_bytes(&mut zip, &entry_name) {
            Ok(b) => b,
            Err(e) => {
                // Manifest can reference entries the container lacks.
                warn!("skipping manifest image {entry_name}: {e}");
                continue;
            }
        };
        let ext = href
            .rsplit_once('.')
            .map(|(_, e)| e.to_ascii_lowercase())
            .unwrap_or_else(|| "img".to_string());
        let synthetic = format!("page_{seq:04}.{ext}");
        let out = dest.join(&synthetic);
        fs::write(&out, &bytes)?;
        debug!("materialized {entry_name} as {synthetic}");

        map.push((synthetic, entry_name.clone()));
        pages.push(PageRef {
            entry_name,
            index: seq,
            path: out,
        });
        seq += 1;
    }

    Ok(Extraction {
        pages,
        image_map: Some(ImageMap(map)),
    })
}

/// Rebuild the EPUB around the translated pages. Mapped items with a
/// translated output get their bytes swapped, their entry renamed to the
/// canonical image extension and the manifest entry rewritten to match;
/// everything else is copied through untouched (raw copy, so untranslated
/// entries stay byte-identical).
pub fn repack(
    source: &Path,
    translated_dir: &Path,
    image_map: Option<&ImageMap>,
    out: &Path,
) -> Result<()> {
    let empty = ImageMap::default();
    let map = image_map.unwrap_or(&empty);

    let file = File::open(source)?;
    let mut zip = ZipArchive::new(file).map_err(io::Error::other)?;

    let opf_path = parse_container(&read_entry(&mut zip, "META-INF/container.xml")?)?;
    let opf_dir = parent_dir(&opf_path).to_string();

    // original entry name -> (renamed entry, translated bytes)
    let mut replacements: HashMap<String, (String, Vec<u8>)> = HashMap::new();
    for (synthetic, original) in map.iter() {
        let stem = synthetic.rsplit_once('.').map(|(s, _)| s).unwrap_or(synthetic);
        let candidate = translated_dir.join(format!("{stem}_translated.{CANONICAL_EXTENSION}"));
        if candidate.is_file() {
            let renamed = swap_extension(original);
            replacements.insert(original.to_string(), (renamed, fs::read(&candidate)?));
        }
    }
    let renamed: HashSet<String> = replacements.keys().cloned().collect();

    let out_file = File::create(out)?;
    let mut writer = ZipWriter::new(out_file);
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for i in 0..zip.len() {
        let name = zip
            .by_index_raw(i)
            .map_err(io::Error::other)?
            .name()
            .to_string();

        if name == opf_path && !renamed.is_empty() {
            let opf_src = read_entry(&mut zip, &opf_path)?;
            let rewritten = rewrite_manifest(&opf_src, &opf_dir, &renamed)?;
            writer
                .start_file(name, deflated)
                .map_err(io::Error::other)?;
            writer.write_all(rewritten.as_bytes())?;
        } else if let Some((new_name, bytes)) = replacements.get(&name) {
            writer
                .start_file(new_name.clone(), deflated)
                .map_err(io::Error::other)?;
            writer.write_all(bytes)?;
        } else {
            let entry = zip.by_index_raw(i).map_err(io::Error::other)?;
            writer.raw_copy_file(entry).map_err(io::Error::other)?;
        }
    }

    writer.finish().map_err(io::Error::other)?;
    Ok(())
}

fn read_entry(zip: &mut ZipArchive<File>, name: &str) -> Result<String> {
    let bytes = read_entry_bytes(zip, name)?;
    String::from_utf8(bytes)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e).into())
}

fn read_entry_bytes(zip: &mut ZipArchive<File>, name: &str) -> Result<Vec<u8>> {
    let mut entry = zip.by_name(name).map_err(io::Error::other)?;
    let mut buf = Vec::new();
    entry.read_to_end(&mut buf)?;
    Ok(buf)
}

/// Find the OPF package path in META-INF/container.xml.
fn parse_container(xml: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    loop {
        match reader.read_event() {
            Ok(Event::Empty(e)) | Ok(Event::Start(e))
                if local_name(e.name().as_ref()) == b"rootfile" =>
            {
                for attr in e.attributes().flatten() {
                    if attr.key.as_ref() == b"full-path" {
                        return Ok(String::from_utf8_lossy(&attr.value).into_owned());
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(io::Error::other(e.to_string()).into()),
            _ => {}
        }
    }
    Err(io::Error::new(io::ErrorKind::InvalidData, "no rootfile in container.xml").into())
}

/// hrefs of manifest items typed as images, in manifest order.
fn manifest_image_hrefs(opf: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(opf);
    reader.config_mut().trim_text(true);
    let mut hrefs = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Empty(e)) | Ok(Event::Start(e))
                if local_name(e.name().as_ref()) == b"item" =>
            {
                let mut href = None;
                let mut is_image = false;
                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"href" => href = Some(String::from_utf8_lossy(&attr.value).into_owned()),
                        b"media-type" => {
                            is_image = attr.value.starts_with(b"image/");
                        }
                        _ => {}
                    }
                }
                if is_image && let Some(h) = href {
                    hrefs.push(h);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(io::Error::other(e.to_string()).into()),
            _ => {}
        }
    }
    Ok(hrefs)
}

/// Round-trip the OPF through the event stream, rewriting href and
/// media-type of manifest items whose resolved entry was replaced.
fn rewrite_manifest(opf: &str, opf_dir: &str, renamed: &HashSet<String>) -> Result<String> {
    let mut reader = Reader::from_str(opf);
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    loop {
        let event = match reader.read_event() {
            Ok(ev) => ev,
            Err(e) => return Err(io::Error::other(e.to_string()).into()),
        };
        match event {
            Event::Eof => break,
            Event::Empty(e) if local_name(e.name().as_ref()) == b"item" => {
                let ev = match rewrite_item(&e, opf_dir, renamed) {
                    Some(rewritten) => Event::Empty(rewritten),
                    None => Event::Empty(e),
                };
                writer
                    .write_event(ev)
                    .map_err(|e| io::Error::other(e.to_string()))?;
            }
            Event::Start(e) if local_name(e.name().as_ref()) == b"item" => {
                let ev = match rewrite_item(&e, opf_dir, renamed) {
                    Some(rewritten) => Event::Start(rewritten),
                    None => Event::Start(e),
                };
                writer
                    .write_event(ev)
                    .map_err(|e| io::Error::other(e.to_string()))?;
            }
            ev => {
                writer
                    .write_event(ev)
                    .map_err(|e| io::Error::other(e.to_string()))?;
            }
        }
    }
    String::from_utf8(writer.into_inner().into_inner())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e).into())
}

fn rewrite_item(
    e: &BytesStart,
    opf_dir: &str,
    renamed: &HashSet<String>,
) -> Option<BytesStart<'static>> {
    let mut href = None;
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == b"href" {
            href = Some(String::from_utf8_lossy(&attr.value).into_owned());
        }
    }
    let href = href?;
    if !renamed.contains(&resolve_href(opf_dir, &href)) {
        return None;
    }

    let new_href = swap_extension(&href);
    let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut out = BytesStart::new(tag);
    for attr in e.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        match attr.key.as_ref() {
            b"href" => out.push_attribute((key.as_str(), new_href.as_str())),
            b"media-type" => out.push_attribute((key.as_str(), CANONICAL_MEDIA_TYPE)),
            _ => {
                let value = String::from_utf8_lossy(&attr.value).into_owned();
                out.push_attribute((key.as_str(), value.as_str()));
            }
        }
    }
    Some(out)
}

fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().rposition(|&b| b == b':') {
        Some(i) => &name[i + 1..],
        None => name,
    }
}

fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Resolve an href relative to the OPF directory into a zip entry name.
fn resolve_href(opf_dir: &str, href: &str) -> String {
    let mut parts: Vec<&str> = opf_dir.split('/').filter(|s| !s.is_empty()).collect();
    for seg in href.split('/') {
        match seg {
            ".." => {
                parts.pop();
            }
            "." | "" => {}
            s => parts.push(s),
        }
    }
    parts.join("/")
}

fn swap_extension(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, _)) => format!("{stem}.{CANONICAL_EXTENSION}"),
        None => format!("{name}.{CANONICAL_EXTENSION}"),
    }
}
