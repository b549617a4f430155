use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use demalign::download::{DemType, DownloadConfig, Downloader, DEFAULT_ENDPOINT};
use demalign::{AlignError, Pipeline, PipelineOutcome, PipelinePaths, PipelineReport, Resampling};
use demalign_cli::{FailureJson, ProgressSource, RunJson};

/// Align a raster to the grid of a reference DEM downloaded for its extent
#[derive(Parser, Debug)]
#[command(name = "demalign")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input raster (GeoTIFF); deleted after a successful run
    input: PathBuf,

    /// Where to save the downloaded reference DEM
    dem_output: PathBuf,

    /// Where to write the resampled raster
    resampled_output: PathBuf,

    /// Terrain service API key
    #[arg(long, env = "DEMALIGN_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// DEM product to request
    #[arg(long, env = "DEMALIGN_DEM_TYPE", default_value = "AW3D30")]
    dem_type: DemType,

    /// Terrain service endpoint
    #[arg(long, env = "DEMALIGN_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Request timeout in seconds (default: HTTP client default)
    #[arg(long, env = "DEMALIGN_TIMEOUT_SECS")]
    timeout: Option<u64>,

    /// Interpolation method: bilinear or nearest
    #[arg(short, long, default_value = "bilinear")]
    resampling: Resampling,

    /// Output result as JSON
    #[arg(short, long)]
    json: bool,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(PipelineOutcome::UsageError.exit_code())
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    demalign_cli::init_tracing();

    match run(&cli) {
        Ok(report) => {
            if let Err(e) = print_report(&report, cli.json) {
                eprintln!("Error: {:#}", e);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            if cli.json {
                match serde_json::to_string(&FailureJson::from(&e)) {
                    Ok(line) => println!("{}", line),
                    Err(json_err) => eprintln!("Error: {}", json_err),
                }
            }
            eprintln!("Error: {}", e);
            ExitCode::from(e.outcome().exit_code())
        }
    }
}

fn download_config(cli: &Cli) -> Result<DownloadConfig, AlignError> {
    let api_key = cli
        .api_key
        .as_deref()
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| {
            AlignError::Config("no API key given (use --api-key or DEMALIGN_API_KEY)".to_string())
        })?;

    let mut config = DownloadConfig::new(api_key)
        .with_endpoint(&cli.endpoint)
        .with_dem_type(cli.dem_type);
    if let Some(secs) = cli.timeout {
        config = config.with_timeout(secs);
    }
    Ok(config)
}

fn run(cli: &Cli) -> Result<PipelineReport, AlignError> {
    let config = download_config(cli)?;
    tracing::debug!(?config, "download configuration");

    let show_progress = !cli.json && std::io::stderr().is_terminal();
    let source = ProgressSource::new(Downloader::new(config)?, show_progress);

    let paths = PipelinePaths::new(&cli.input, &cli.dem_output, &cli.resampled_output);
    Pipeline::builder(source)
        .resampling(cli.resampling)
        .build()
        .run(&paths)
}

fn print_report(report: &PipelineReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(&RunJson::from(report))?);
        return Ok(());
    }

    for warning in &report.warnings {
        eprintln!("Warning: {}", warning);
    }
    println!("Success: DEM and resampled file created.");
    println!("  DEM:       {}", report.dem_path.display());
    println!(
        "  Resampled: {} ({}x{}, {}, {})",
        report.output_path.display(),
        report.width,
        report.height,
        report.crs,
        report.dtype
    );
    Ok(())
}
