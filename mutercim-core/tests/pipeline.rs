//! End-to-end pipeline tests over real cbz containers, with a stubbed
//! translation service.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use image::{Rgb, RgbImage};
use mutercim_core::batch::BatchOptions;
use mutercim_core::client::{Translate, TranslationError};
use mutercim_core::job::{JobOptions, translate_archive};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

struct Stub {
    fail_containing: Option<&'static str>,
}

impl Translate for Stub {
    fn translate(
        &self,
        _image: &[u8],
        file_name: &str,
    ) -> std::result::Result<Vec<u8>, TranslationError> {
        if let Some(needle) = self.fail_containing
            && file_name.contains(needle)
        {
            return Err(TranslationError {
                code: 413,
                message: "upload rejected".to_string(),
            });
        }
        Ok(b"TRANSLATED-PAGE".to_vec())
    }
}

fn noisy_jpeg(w: u32, h: u32) -> Vec<u8> {
    let mut img = RgbImage::new(w, h);
    let mut state: u32 = 0x1234_5678;
    for p in img.pixels_mut() {
        state = state.wrapping_mul(1664525).wrapping_add(1013904223);
        *p = Rgb([(state >> 8) as u8, (state >> 16) as u8, (state >> 24) as u8]);
    }
    let mut buf = Vec::new();
    let mut enc = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, 95);
    enc.encode_image(&img).unwrap();
    buf
}

fn make_cbz(path: &Path, entries: &[(&str, &[u8])]) {
    let file = File::create(path).unwrap();
    let mut zip = ZipWriter::new(file);
    let opts = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, bytes) in entries {
        zip.start_file(*name, opts).unwrap();
        zip.write_all(bytes).unwrap();
    }
    zip.finish().unwrap();
}

fn entry_names(path: &Path) -> Vec<String> {
    let mut zip = ZipArchive::new(File::open(path).unwrap()).unwrap();
    (0..zip.len())
        .map(|i| zip.by_index(i).unwrap().name().to_string())
        .collect()
}

// Three pages: the first is oversized (forcing the compression stage) and
// then rejected by the service; the other two translate cleanly. The batch
// must finish with a two-entry container, one quarantined input and one
// log line.
#[test]
fn mixed_batch_packs_survivors_and_quarantines_the_rest() {
    let dir = tempfile::tempdir().unwrap();
    let big = noisy_jpeg(400, 400);
    let small = noisy_jpeg(64, 64);
    let cbz = dir.path().join("chapter_5.cbz");
    make_cbz(
        &cbz,
        &[
            ("page_1.jpg", big.as_slice()),
            ("page_2.jpg", small.as_slice()),
            ("page_3.jpg", small.as_slice()),
        ],
    );
    assert!(big.len() > 20_000, "fixture must exceed the test ceiling");

    let out_dir = dir.path().join("out");
    let opts = JobOptions {
        batch: BatchOptions {
            max_bytes: 20_000,
            target_bytes: 18_000,
            ..Default::default()
        },
    };
    let stub = Stub {
        fail_containing: Some("page_1"),
    };

    let result = translate_archive(&cbz, &out_dir, &stub, Some(&opts)).unwrap();
    assert_eq!(result.total, 3);
    assert_eq!(result.translated, 2);
    assert_eq!(result.quarantined, 1);
    assert!(!result.success());

    let output = result.output.expect("survivors must be repacked");
    assert_eq!(
        entry_names(&output),
        vec!["page_2_translated.jpg", "page_3_translated.jpg"]
    );

    let quarantine = result.quarantine_root.expect("quarantine tree");
    assert!(quarantine.join("page_1.jpg").is_file());
    let log = fs::read_to_string(quarantine.join("log.txt")).unwrap();
    assert_eq!(log.lines().count(), 1);
    assert!(log.contains("page_1.jpg"));
    assert!(log.contains("413"));
}

// With no failures the repacked container preserves page count and natural
// order of the translated names.
#[test]
fn clean_batch_preserves_count_and_natural_order() {
    let dir = tempfile::tempdir().unwrap();
    let page = noisy_jpeg(64, 64);
    let cbz = dir.path().join("vol_1.cbz");
    make_cbz(
        &cbz,
        &[
            ("page_10.jpg", page.as_slice()),
            ("page_1.jpg", page.as_slice()),
            ("page_2.jpg", page.as_slice()),
        ],
    );

    let out_dir = dir.path().join("out");
    let stub = Stub {
        fail_containing: None,
    };
    let result = translate_archive(&cbz, &out_dir, &stub, None).unwrap();
    assert!(result.success());
    assert_eq!(result.total, 3);
    assert!(result.quarantine_root.is_none());

    let output = result.output.expect("output container");
    assert!(
        output
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("vol_1_output_")
    );
    assert_eq!(
        entry_names(&output),
        vec![
            "page_1_translated.jpg",
            "page_2_translated.jpg",
            "page_10_translated.jpg"
        ]
    );
}

// Parallel execution must not change outcomes or drop log lines.
#[test]
fn parallel_batch_produces_the_same_aggregate() {
    let dir = tempfile::tempdir().unwrap();
    let page = noisy_jpeg(64, 64);
    let entries: Vec<(String, &[u8])> = (1..=8)
        .map(|i| (format!("page_{i}.jpg"), page.as_slice()))
        .collect();
    let entry_refs: Vec<(&str, &[u8])> =
        entries.iter().map(|(n, b)| (n.as_str(), *b)).collect();
    let cbz = dir.path().join("burst.cbz");
    make_cbz(&cbz, &entry_refs);

    let out_dir = dir.path().join("out");
    let opts = JobOptions {
        batch: BatchOptions {
            parallel: true,
            ..Default::default()
        },
    };
    let stub = Stub {
        fail_containing: Some("page_3"),
    };

    let result = translate_archive(&cbz, &out_dir, &stub, Some(&opts)).unwrap();
    assert_eq!(result.total, 8);
    assert_eq!(result.translated, 7);
    assert_eq!(result.quarantined, 1);
    let names = entry_names(&result.output.unwrap());
    assert_eq!(names.len(), 7);
    assert!(!names.contains(&"page_3_translated.jpg".to_string()));
}
