use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use time::OffsetDateTime;
use time::macros::format_description;

use crate::batch::{self, BatchLayout, BatchOptions, BatchResult};
use crate::client::Translate;
use crate::codec::{self, Format, discover_pages};
use crate::error::{MutercimError, Result};

#[derive(Clone, Debug, Default)]
pub struct JobOptions {
    pub batch: BatchOptions,
}

/// Translate one container end to end: extract into a scratch directory,
/// run the page batch, repack the survivors next to `out_dir`.
///
/// The scratch directory is a scoped resource: it is removed on every exit
/// path once the output container has been finalized outside it. Extraction
/// and repack failures are fatal and propagate; page failures are absorbed
/// into the quarantine tree under `out_dir`.
pub fn translate_archive(
    archive: &Path,
    out_dir: &Path,
    translator: &dyn Translate,
    opts: Option<&JobOptions>,
) -> Result<BatchResult> {
    let format = Format::from_path(archive)
        .ok_or_else(|| MutercimError::UnsupportedFormat(archive.display().to_string()))?;
    let stem = archive
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "archive".to_string());
    let stamp = run_stamp();
    let opts = opts.cloned().unwrap_or_default();

    let scratch = tempfile::tempdir()?;
    let extract_dir = scratch.path().join("extracted");
    let translated_dir = scratch.path().join("translated");
    fs::create_dir_all(&extract_dir)?;
    fs::create_dir_all(&translated_dir)?;

    info!("extracting {} ({})", archive.display(), format.name());
    let extraction = codec::extract(format, archive, &extract_dir)?;
    info!("extracted {} pages", extraction.pages.len());

    let layout = BatchLayout {
        source_root: extract_dir,
        output_root: translated_dir.clone(),
        quarantine_root: out_dir.join(format!("{stem}_errors_{stamp}")),
    };
    let mut result = batch::run(&extraction.pages, translator, &layout, Some(&opts.batch))?;

    if result.translated > 0 {
        fs::create_dir_all(out_dir)?;
        let out = out_dir.join(format!("{stem}_output_{stamp}.{}", format.output_extension()));
        info!("repacking {} pages into {}", result.translated, out.display());
        codec::repack(
            format,
            archive,
            &translated_dir,
            extraction.image_map.as_ref(),
            &out,
        )?;
        result.output = Some(out);
    }

    if let Some(q) = &result.quarantine_root {
        info!(
            "{} of {} pages quarantined; see {}",
            result.quarantined,
            result.total,
            q.join(batch::LOG_FILE).display()
        );
    }
    Ok(result)
}

/// Translate a loose folder of page images in place: pages are discovered
/// recursively, output goes to a timestamped sibling tree, failures land
/// in `<folder>/error`.
pub fn translate_folder(
    folder: &Path,
    translator: &dyn Translate,
    opts: Option<&JobOptions>,
) -> Result<BatchResult> {
    let pages = discover_pages(folder)?;
    info!("found {} pages under {}", pages.len(), folder.display());

    let name = folder
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "folder".to_string());
    let layout = BatchLayout {
        source_root: folder.to_path_buf(),
        output_root: output_sibling(folder, &name),
        quarantine_root: folder.join("error"),
    };
    let opts = opts.cloned().unwrap_or_default();
    batch::run(&pages, translator, &layout, Some(&opts.batch))
}

fn output_sibling(folder: &Path, name: &str) -> PathBuf {
    folder.with_file_name(format!("{name}_output_{}", run_stamp()))
}

fn run_stamp() -> String {
    let fmt = format_description!("[year][month][day]_[hour][minute][second]");
    OffsetDateTime::now_utc().format(fmt).unwrap_or_default()
}
