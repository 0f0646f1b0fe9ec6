use std::io;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use mutercim_core::batch::{BatchOptions, BatchResult};
use mutercim_core::error::Result;
use mutercim_core::job::{JobOptions, translate_archive, translate_folder};
use mutercim_core::{ToriiClient, find_archives};

#[derive(Parser)]
#[command(author, version, about = "batch image translation for paged containers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Translate one container (pdf, cbz/zip, cbr/rar, cb7/7z, epub)
    Archive {
        archive: PathBuf,

        /// Directory receiving the output container and any quarantine tree
        #[arg(long, default_value = "archive_outputs")]
        out_dir: PathBuf,

        /// Target language code
        #[arg(long, default_value = "en")]
        lang: String,

        /// Translator model identifier
        #[arg(long)]
        model: String,

        /// Bearer credential; falls back to the API_KEY environment variable
        #[arg(long = "api-key")]
        api_key: Option<String>,

        /// Process pages on a worker pool instead of sequentially
        #[arg(long)]
        parallel: bool,
    },

    /// Translate a loose folder of page images
    Folder {
        folder: PathBuf,

        #[arg(long, default_value = "en")]
        lang: String,

        #[arg(long)]
        model: String,

        #[arg(long = "api-key")]
        api_key: Option<String>,

        #[arg(long)]
        parallel: bool,
    },

    /// List translatable containers under a directory
    Scan {
        #[arg(default_value = ".")]
        root: PathBuf,
    },
}

fn resolve_api_key(flag: Option<String>) -> Result<String> {
    if let Some(key) = flag {
        if !key.trim().is_empty() {
            return Ok(key);
        }
    }
    match std::env::var("API_KEY") {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(io::Error::other("no API key: pass --api-key or set API_KEY").into()),
    }
}

fn job_options(parallel: bool) -> JobOptions {
    JobOptions {
        batch: BatchOptions {
            parallel,
            ..Default::default()
        },
    }
}

fn report(result: &BatchResult) {
    println!(
        "pages: {} translated, {} quarantined, {} total",
        result.translated, result.quarantined, result.total
    );
    if let Some(out) = &result.output {
        println!("output: {}", out.display());
    }
    if let Some(q) = &result.quarantine_root {
        println!("failures logged under: {}", q.display());
    }
    if !result.success() {
        std::process::exit(1);
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Archive {
            archive,
            out_dir,
            lang,
            model,
            api_key,
            parallel,
        } => {
            let key = resolve_api_key(api_key)?;
            let client = ToriiClient::new(&key, &model, &lang)?;
            let result = translate_archive(&archive, &out_dir, &client, Some(&job_options(parallel)))?;
            report(&result);
        }

        Commands::Folder {
            folder,
            lang,
            model,
            api_key,
            parallel,
        } => {
            let key = resolve_api_key(api_key)?;
            let client = ToriiClient::new(&key, &model, &lang)?;
            let result = translate_folder(&folder, &client, Some(&job_options(parallel)))?;
            report(&result);
        }

        Commands::Scan { root } => {
            let archives = find_archives(&root)?;
            if archives.is_empty() {
                eprintln!("no translatable containers under {}", root.display());
            }
            for path in archives {
                println!("{}", path.display());
            }
        }
    }

    Ok(())
}
