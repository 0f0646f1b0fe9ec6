use std::fs::{self, File};
use std::io;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use log::debug;
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use pdfium_render::prelude::*;

use crate::codec::{Extraction, PageRef, find_images};
use crate::error::Result;

/// Rasterization density for source pages. 72 is the PDF native unit.
const RASTER_DPI: f32 = 300.0;

/// Rasterize every page of the document at 300 DPI into sequentially named
/// JPEGs. Page order is the document's own; no sorting needed.
pub fn extract(archive: &Path, dest: &Path) -> Result<Extraction> {
    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| io::Error::other(e.to_string()))?;
    let pdfium = Pdfium::new(bindings);

    let doc = pdfium
        .load_pdf_from_file(archive, None)
        .map_err(|e| io::Error::other(e.to_string()))?;
    let config = PdfRenderConfig::new().scale_page_by_factor(RASTER_DPI / 72.0);

    let mut pages = Vec::new();
    for (i, page) in doc.pages().iter().enumerate() {
        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| io::Error::other(e.to_string()))?;
        let rgb = bitmap.as_image().to_rgb8();

        let name = format!("page_{:04}.jpg", i + 1);
        let out = dest.join(&name);
        let mut f = File::create(&out)?;
        let mut enc = JpegEncoder::new_with_quality(&mut f, 95);
        enc.encode_image(&rgb)?;
        debug!("rasterized {} ({}x{})", name, rgb.width(), rgb.height());

        pages.push(PageRef {
            entry_name: name,
            index: i,
            path: out,
        });
    }

    Ok(Extraction {
        pages,
        image_map: None,
    })
}

/// Build a fresh PDF whose pages are the translated JPEGs, one full-bleed
/// image per page, sized so the raster maps back to 300 DPI.
pub fn repack(translated_dir: &Path, out: &Path) -> Result<()> {
    let images = find_images(translated_dir)?;

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::new();

    for path in &images {
        let (w, h) = image::image_dimensions(path)?;
        let w_pt = w as f32 * 72.0 / RASTER_DPI;
        let h_pt = h as f32 * 72.0 / RASTER_DPI;
        let jpeg = fs::read(path)?;

        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => w as i64,
                "Height" => h as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8i64,
                "Filter" => "DCTDecode",
            },
            jpeg,
        ));

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        w_pt.into(),
                        0f32.into(),
                        0f32.into(),
                        h_pt.into(),
                        0f32.into(),
                        0f32.into(),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let encoded = content
            .encode()
            .map_err(|e| io::Error::other(e.to_string()))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));

        let media_box: Vec<Object> =
            vec![0f32.into(), 0f32.into(), w_pt.into(), h_pt.into()];
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
            "MediaBox" => media_box,
            "Contents" => Object::Reference(content_id),
            "Resources" => dictionary! {
                "XObject" => dictionary! {
                    "Im0" => Object::Reference(image_id),
                },
            },
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
    });
    doc.trailer.set("Root", catalog_id);

    doc.save(out).map_err(|e| io::Error::other(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    // Rasterization needs the pdfium system library, so tests cover the
    // writer side only.
    #[test]
    fn repack_builds_a_page_per_image() {
        let dir = tempfile::tempdir().unwrap();
        let translated = dir.path().join("translated");
        fs::create_dir_all(&translated).unwrap();
        for name in ["page_0001_translated.jpg", "page_0002_translated.jpg"] {
            let img = RgbImage::from_pixel(300, 450, Rgb([90, 90, 90]));
            img.save(translated.join(name)).unwrap();
        }

        let out = dir.path().join("book.pdf");
        repack(&translated, &out).unwrap();

        let doc = Document::load(&out).unwrap();
        assert_eq!(doc.get_pages().len(), 2);
    }

    #[test]
    fn repack_empty_set_yields_zero_pages() {
        let dir = tempfile::tempdir().unwrap();
        let translated = dir.path().join("translated");
        fs::create_dir_all(&translated).unwrap();
        let out = dir.path().join("empty.pdf");
        repack(&translated, &out).unwrap();
        let doc = Document::load(&out).unwrap();
        assert_eq!(doc.get_pages().len(), 0);
    }
}
