use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{info, warn};
use rayon::prelude::*;
use time::OffsetDateTime;
use time::macros::format_description;

use crate::client::Translate;
use crate::codec::PageRef;
use crate::compress::{self, MAX_UPLOAD_BYTES, TARGET_UPLOAD_BYTES};
use crate::error::Result;

/// Appended to the stem of every successfully translated page.
pub const TRANSLATED_SUFFIX: &str = "_translated";
/// Failure log inside the quarantine root, append-only.
pub const LOG_FILE: &str = "log.txt";

/// Final state of one page. Immutable once produced; one per input page.
#[derive(Clone, Debug)]
pub enum PageOutcome {
    Translated(PathBuf),
    Quarantined(String),
}

/// Aggregate over all page outcomes. The only value callers outside the
/// pipeline see.
#[derive(Debug, Default)]
pub struct BatchResult {
    pub total: usize,
    pub translated: usize,
    pub quarantined: usize,
    /// Set by the caller once the output container is finalized.
    pub output: Option<PathBuf>,
    /// Present when at least one page failed; points at the mirrored
    /// failure tree holding the log.
    pub quarantine_root: Option<PathBuf>,
    pub outcomes: Vec<PageOutcome>,
}

impl BatchResult {
    /// An empty batch is not a success: nothing to do is not "done".
    pub fn success(&self) -> bool {
        self.quarantined == 0 && self.total > 0
    }
}

#[derive(Clone, Debug)]
pub struct BatchOptions {
    /// Process pages on a worker pool instead of sequentially. The remote
    /// service rate-limits anyway, so sequential is the default.
    pub parallel: bool,
    /// Files above this size are compressed before upload.
    pub max_bytes: u64,
    /// Compression target, just under the service limit.
    pub target_bytes: u64,
}

impl Default for BatchOptions {
    fn default() -> Self {
        BatchOptions {
            parallel: false,
            max_bytes: MAX_UPLOAD_BYTES,
            target_bytes: TARGET_UPLOAD_BYTES,
        }
    }
}

/// Where a batch reads, writes and quarantines. All page paths are
/// interpreted relative to `source_root`; the other two trees mirror it.
#[derive(Clone, Debug)]
pub struct BatchLayout {
    pub source_root: PathBuf,
    pub output_root: PathBuf,
    pub quarantine_root: PathBuf,
}

/// Drive every page through compress -> submit -> write-or-quarantine.
///
/// Pages are independent; a failure is absorbed into its own quarantine
/// record and never aborts or skips siblings. Fatal errors do not exist at
/// this layer.
pub fn run(
    pages: &[PageRef],
    translator: &dyn Translate,
    layout: &BatchLayout,
    opts: Option<&BatchOptions>,
) -> Result<BatchResult> {
    let opts = opts.cloned().unwrap_or_default();
    let total = pages.len();
    if total == 0 {
        info!("batch has no pages to process");
        return Ok(BatchResult::default());
    }

    let quarantine = Quarantine {
        root: layout.quarantine_root.clone(),
        lock: Mutex::new(()),
    };

    let mut ordered: Vec<&PageRef> = pages.iter().collect();
    ordered.sort_by_key(|p| p.index);

    let outcomes: Vec<PageOutcome> = if opts.parallel {
        ordered
            .par_iter()
            .map(|page| process_page(page, translator, layout, &opts, &quarantine))
            .collect()
    } else {
        ordered
            .iter()
            .enumerate()
            .map(|(i, page)| {
                info!("[{}/{}] processing: {}", i + 1, total, page.entry_name);
                process_page(page, translator, layout, &opts, &quarantine)
            })
            .collect()
    };

    let translated = outcomes
        .iter()
        .filter(|o| matches!(o, PageOutcome::Translated(_)))
        .count();
    let quarantined = total - translated;

    Ok(BatchResult {
        total,
        translated,
        quarantined,
        output: None,
        quarantine_root: (quarantined > 0).then(|| layout.quarantine_root.clone()),
        outcomes,
    })
}

fn process_page(
    page: &PageRef,
    translator: &dyn Translate,
    layout: &BatchLayout,
    opts: &BatchOptions,
    quarantine: &Quarantine,
) -> PageOutcome {
    // Compressing
    if let Err(e) = compress::shrink_file(&page.path, opts.max_bytes, opts.target_bytes) {
        let message = format!("compression error: {e}");
        quarantine.record(&layout.source_root, page, &message);
        return PageOutcome::Quarantined(message);
    }

    // Submitting
    let bytes = match fs::read(&page.path) {
        Ok(b) => b,
        Err(e) => {
            let message = format!("read error: {e}");
            quarantine.record(&layout.source_root, page, &message);
            return PageOutcome::Quarantined(message);
        }
    };
    let file_name = page
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| page.entry_name.clone());

    match translator.translate(&bytes, &file_name) {
        Ok(translated) => match write_output(layout, page, &translated) {
            Ok(out) => PageOutcome::Translated(out),
            Err(e) => {
                let message = format!("write error: {e}");
                quarantine.record(&layout.source_root, page, &message);
                PageOutcome::Quarantined(message)
            }
        },
        Err(e) => {
            let message = e.to_string();
            quarantine.record(&layout.source_root, page, &message);
            PageOutcome::Quarantined(message)
        }
    }
}

fn write_output(layout: &BatchLayout, page: &PageRef, bytes: &[u8]) -> Result<PathBuf> {
    let rel = rel_path(&layout.source_root, &page.path);
    let stem = rel
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| page.entry_name.clone());
    let out = layout
        .output_root
        .join(rel.with_file_name(format!("{stem}{TRANSLATED_SUFFIX}.jpg")));
    if let Some(parent) = out.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&out, bytes)?;
    Ok(out)
}

fn rel_path(root: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(root)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| {
            PathBuf::from(path.file_name().map(|n| n.to_os_string()).unwrap_or_default())
        })
}

/// Mirrored failure tree. Writers are serialized: the tree and its log are
/// shared filesystem state even when pages run in parallel.
struct Quarantine {
    root: PathBuf,
    lock: Mutex<()>,
}

impl Quarantine {
    /// Best-effort: a quarantine failure must not take the batch down, so
    /// internal errors are logged and swallowed.
    fn record(&self, source_root: &Path, page: &PageRef, message: &str) {
        warn!("quarantining {}: {message}", page.entry_name);
        let _guard = match self.lock.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = self.write(source_root, page, message) {
            warn!("failed to record quarantine for {}: {e}", page.entry_name);
        }
    }

    fn write(&self, source_root: &Path, page: &PageRef, message: &str) -> Result<()> {
        let rel = rel_path(source_root, &page.path);
        let dest = self.root.join(&rel);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        // Copy, not move: the original stays available for a follow-up run.
        if page.path.is_file() {
            fs::copy(&page.path, &dest)?;
        }

        let mut log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.root.join(LOG_FILE))?;
        let rel_display = rel.to_string_lossy().replace('\\', "/");
        writeln!(log, "[{}] - {} - {}", timestamp(), rel_display, message)?;
        Ok(())
    }
}

pub(crate) fn timestamp() -> String {
    let fmt = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    OffsetDateTime::now_utc().format(fmt).unwrap_or_default()
}
