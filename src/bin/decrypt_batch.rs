// src/bin/decrypt_batch.rs
//! Batch decrypt from a locally mirrored bucket
//!
//! Reads a request file (JSON or TOML), runs the pipeline against
//! `LocalObjectStore` / `LocalParameterStore`, and exits with the batch status.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use batch_decryptor::logging::init_logging;
use batch_decryptor::{
    config, pipeline, BatchRequest, Collaborators, LocalObjectStore, LocalParameterStore,
    StatusCode,
};
use clap::Parser;
use tracing::{error, info};

#[derive(Parser)]
#[command(
    name = "decrypt_batch",
    about = "Download and decrypt every manifest entry matching a pattern"
)]
struct Cli {
    /// Request file (`.json` or `.toml`)
    #[arg(long)]
    request: PathBuf,
    /// Directory holding one subdirectory per bucket
    #[arg(long)]
    store_root: PathBuf,
    /// JSON object of parameter name → value
    #[arg(long)]
    parameters: Option<PathBuf>,
    /// Settings TOML
    #[arg(long, env = "BATCH_DECRYPT_CONFIG")]
    config: Option<PathBuf>,
    /// Override the request's overwrite flag
    #[arg(long)]
    overwrite: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(err) => {
            error!("{err:#}");
            eprintln!("decrypt_batch: {err:#}");
            ExitCode::from(StatusCode::PreflightFailure.code() as u8)
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let settings = match cli.config.as_deref() {
        Some(path) => config::load_from(path),
        None => config::load(),
    }
    .context("failed to load settings")?;
    init_logging(&settings.logging);

    let mut request = read_request(&cli.request)?;
    if cli.overwrite {
        request.overwrite = true;
    }

    let parameters = match cli.parameters.as_deref() {
        Some(path) => LocalParameterStore::from_file(path)
            .with_context(|| format!("failed to load parameters from {}", path.display()))?,
        None => LocalParameterStore::empty(),
    };
    let collaborators = Collaborators::new(
        Arc::new(LocalObjectStore::new(&cli.store_root)),
        Arc::new(parameters),
    );

    info!(
        request = %cli.request.display(),
        store_root = %cli.store_root.display(),
        "batch decrypt starting"
    );
    let report = pipeline::run(&request, &collaborators, &settings).await;

    if let Some(result) = report.result() {
        for failure in &result.failures {
            eprintln!("failed: {} ({}): {}", failure.name, failure.error.kind(), failure.error);
        }
        for name in &result.skipped {
            eprintln!("skipped (empty): {name}");
        }
    }
    if let Some(err) = report.preflight_error() {
        eprintln!("pre-flight failed ({}): {err}", err.kind());
    }

    let status = report.status();
    info!(%status, "batch decrypt finished");
    Ok(status.code())
}

fn read_request(path: &Path) -> Result<BatchRequest> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read request {}", path.display()))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let request = if is_toml {
        toml::from_str(&content).context("invalid request TOML")?
    } else {
        serde_json::from_str(&content).context("invalid request JSON")?
    };
    Ok(request)
}
