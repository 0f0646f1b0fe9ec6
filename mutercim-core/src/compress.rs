use std::fs;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};
use log::debug;

use crate::error::{MutercimError, Result};

/// Hard upload limit of the translation service.
pub const MAX_UPLOAD_BYTES: u64 = 15 * 1024 * 1024;
/// Re-encode to just under the limit to leave headroom for request overhead.
pub const TARGET_UPLOAD_BYTES: u64 = (14.8 * 1024.0 * 1024.0) as u64;

const QUALITY_MAX: u8 = 95;
const QUALITY_MIN: u8 = 75;
const SCALE_STEP: f32 = 0.95;
const DIMENSION_FLOOR: u32 = 100;

#[derive(Clone, Debug)]
pub struct CompressionResult {
    pub bytes: Vec<u8>,
    pub size: u64,
    pub quality: u8,
    pub dimensions: (u32, u32),
    /// True when quality dropped below the initial encode or the image was
    /// rescaled; false when the first q95 encode already fit.
    pub degraded: bool,
}

/// Shrink `image` until its JPEG encoding fits `ceiling` bytes.
///
/// Degradation is staged so legibility of embedded text suffers last:
/// flatten to RGB, encode at q95, walk quality down to q75 in steps of 5,
/// then repeatedly rescale by 0.95 re-encoding at q75. Gives up with
/// `CompressionExhausted` once either dimension would fall below 100 px.
pub fn compress(image: &DynamicImage, ceiling: u64) -> Result<CompressionResult> {
    // Alpha and palette images cannot go straight to JPEG.
    let mut rgb = image.to_rgb8();

    let bytes = encode_jpeg(&rgb, QUALITY_MAX)?;
    if bytes.len() as u64 <= ceiling {
        return Ok(done(bytes, QUALITY_MAX, &rgb, false));
    }

    let mut quality = 85;
    while quality >= QUALITY_MIN {
        let bytes = encode_jpeg(&rgb, quality)?;
        if bytes.len() as u64 <= ceiling {
            return Ok(done(bytes, quality, &rgb, true));
        }
        quality -= 5;
    }

    loop {
        let (w, h) = rgb.dimensions();
        let nw = (w as f32 * SCALE_STEP) as u32;
        let nh = (h as f32 * SCALE_STEP) as u32;
        if nw < DIMENSION_FLOOR || nh < DIMENSION_FLOOR {
            return Err(MutercimError::CompressionExhausted {
                width: nw,
                height: nh,
            });
        }
        rgb = imageops::resize(&rgb, nw, nh, FilterType::Lanczos3);
        let bytes = encode_jpeg(&rgb, QUALITY_MIN)?;
        if bytes.len() as u64 <= ceiling {
            return Ok(done(bytes, QUALITY_MIN, &rgb, true));
        }
    }
}

/// Compress an on-disk image only if it exceeds `max_bytes`, replacing it
/// atomically (temp sibling + rename) on success. Returns `None` for files
/// already under the limit.
pub fn shrink_file(
    path: &Path,
    max_bytes: u64,
    target_bytes: u64,
) -> Result<Option<CompressionResult>> {
    let len = fs::metadata(path)?.len();
    if len <= max_bytes {
        return Ok(None);
    }

    debug!(
        "compressing {} ({:.2} MB over limit)",
        path.display(),
        len as f64 / (1024.0 * 1024.0)
    );

    let img = image::open(path)?;
    let result = compress(&img, target_bytes)?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!("{name}.tmp.jpg"));
    fs::write(&tmp, &result.bytes)?;
    fs::rename(&tmp, path)?;

    Ok(Some(result))
}

fn encode_jpeg(rgb: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut enc = JpegEncoder::new_with_quality(&mut buf, quality);
    enc.encode_image(rgb)?;
    Ok(buf)
}

fn done(bytes: Vec<u8>, quality: u8, rgb: &RgbImage, degraded: bool) -> CompressionResult {
    CompressionResult {
        size: bytes.len() as u64,
        quality,
        dimensions: rgb.dimensions(),
        degraded,
        bytes,
    }
}
