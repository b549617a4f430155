use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use demalign::sweep::{self, SweepConfig, DEFAULT_EXTENSION};
use demalign_cli::SweepJson;

/// Delete stale raster files from a working directory
#[derive(Parser, Debug)]
#[command(name = "demalign-sweep")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory to scan
    #[arg(short, long, default_value = ".")]
    dir: PathBuf,

    /// File extension to delete (case-insensitive)
    #[arg(short, long, default_value = DEFAULT_EXTENSION)]
    extension: String,

    /// Delete files last modified more than this many hours ago
    #[arg(long, default_value_t = 24)]
    max_age_hours: u64,

    /// Output result as JSON
    #[arg(short, long)]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    demalign_cli::init_tracing();

    let extension = cli.extension.trim_start_matches('.').to_string();
    let config = SweepConfig::new(&cli.dir)
        .with_extension(extension.clone())
        .with_max_age(Duration::from_secs(cli.max_age_hours.saturating_mul(3600)));

    let report = sweep::sweep(&config)
        .with_context(|| format!("Failed to sweep {}", cli.dir.display()))?;

    if cli.json {
        println!("{}", serde_json::to_string(&SweepJson::from(&report))?);
        return Ok(());
    }

    println!(
        "Deleted {} .{} files older than {} hours.",
        report.deleted_count(),
        extension,
        cli.max_age_hours
    );
    for path in &report.deleted {
        println!("  {}", file_name(path));
    }
    for failure in &report.failed {
        eprintln!("Failed to delete {}: {}", failure.path.display(), failure.reason);
    }

    Ok(())
}

/// The file name of `path`, or the whole path if it has none.
fn file_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned())
}
