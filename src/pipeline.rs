// src/pipeline.rs
//! The invocation boundary: one request in, one status code out
//!
//! Pre-flight (validation, key resolution, manifest fetch) either completes
//! or aborts the whole run with status 1. Past that point every outcome is
//! per entry and folded into a [`BatchResult`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};

use crate::aggregate::{BatchResult, StatusCode};
use crate::config::Settings;
use crate::decryptor::{BatchDecryptor, BatchJob, PlannedEntry};
use crate::error::{CoreError, Result};
use crate::keys::resolve_keys;
use crate::manifest::fetch_manifest;
use crate::pattern::PatternSet;
use crate::request::BatchRequest;
use crate::retry::RetryPolicy;
use crate::storage::Collaborators;

/// Full diagnostics of one run
#[derive(Debug)]
pub enum BatchReport {
    /// The run never reached the per-entry stage
    Preflight(CoreError),
    Completed(BatchResult),
}

impl BatchReport {
    pub fn status(&self) -> StatusCode {
        match self {
            BatchReport::Preflight(_) => StatusCode::PreflightFailure,
            BatchReport::Completed(result) => result.status(),
        }
    }

    pub fn code(&self) -> i32 {
        self.status().code()
    }

    pub fn result(&self) -> Option<&BatchResult> {
        match self {
            BatchReport::Completed(result) => Some(result),
            BatchReport::Preflight(_) => None,
        }
    }

    pub fn preflight_error(&self) -> Option<&CoreError> {
        match self {
            BatchReport::Preflight(err) => Some(err),
            BatchReport::Completed(_) => None,
        }
    }
}

/// Run a batch and return its status code (0 success, 1 pre-flight, 2 all failed, 3 partial)
pub async fn decrypt(request: &BatchRequest, collaborators: &Collaborators, settings: &Settings) -> i32 {
    run(request, collaborators, settings).await.code()
}

/// Run a batch and return the full report
pub async fn run(request: &BatchRequest, collaborators: &Collaborators, settings: &Settings) -> BatchReport {
    let started = Instant::now();
    let report = match execute(request, collaborators, settings).await {
        Ok(result) => BatchReport::Completed(result),
        Err(err) => {
            error!(kind = err.kind(), error = %err, "pre-flight failed");
            BatchReport::Preflight(err)
        }
    };

    let status = report.status();
    match report.result() {
        Some(result) => info!(
            status = status.code(),
            matched = result.matched,
            succeeded = result.succeeded,
            failed = result.failed,
            skipped = result.skipped.len(),
            not_started = result.not_started,
            bytes = result.bytes_written,
            elapsed_s = started.elapsed().as_secs_f64(),
            "run complete"
        ),
        None => info!(
            status = status.code(),
            elapsed_s = started.elapsed().as_secs_f64(),
            "run aborted"
        ),
    }
    report
}

async fn execute(
    request: &BatchRequest,
    collaborators: &Collaborators,
    settings: &Settings,
) -> Result<BatchResult> {
    request.validate()?;
    let patterns = PatternSet::parse(&request.file_patterns)?;
    let destination = request.destination_dir()?;
    let retry = RetryPolicy::from_settings(&settings.retry);

    let (keys, mut manifest) = tokio::try_join!(
        resolve_keys(request, collaborators.parameters.as_ref(), &retry),
        fetch_manifest(
            collaborators.objects.as_ref(),
            &request.bucket,
            &request.organization,
            &request.manifest_key,
            &retry,
        ),
    )?;

    let listed = manifest.files.len();
    let selected = patterns.select(std::mem::take(&mut manifest.files));
    let planned: Vec<PlannedEntry> = selected
        .into_iter()
        .map(|(index, entry)| PlannedEntry {
            index,
            object_key: manifest.object_key_for(&entry, &request.organization),
            entry,
        })
        .collect();
    let matched = planned.len();
    info!(
        manifest = manifest.name.as_deref().unwrap_or(&request.manifest_key),
        listed,
        matched,
        "entries selected"
    );

    let policy = request.effective_failure_policy(settings);
    if matched == 0 {
        return Ok(BatchResult::aggregate(0, Vec::new(), policy));
    }

    tokio::fs::create_dir_all(&destination).await?;

    let job = BatchJob {
        bucket: request.bucket.clone(),
        destination: destination.clone(),
        overwrite: request.overwrite,
        concurrency: request.effective_concurrency(settings),
        policy,
    };
    let decryptor = BatchDecryptor::new(Arc::clone(&collaborators.objects), retry)
        .with_integrity_checks(settings.policy.verify_integrity);
    let output = decryptor.run(&job, Arc::new(keys), planned).await;

    let result = BatchResult::aggregate(matched, output.outcomes, policy);

    if let Some(report_path) = settings.policy.skip_report.as_deref() {
        if !result.skipped.is_empty() {
            let path = skip_report_path(&destination, report_path);
            if let Err(err) = append_skip_report(&path, &result.skipped).await {
                warn!(path = %path.display(), error = %err, "could not write skip report");
            }
        }
    }

    Ok(result)
}

/// Relative report paths live under the destination
fn skip_report_path(destination: &Path, configured: &Path) -> PathBuf {
    if configured.is_absolute() {
        configured.to_path_buf()
    } else {
        destination.join(configured)
    }
}

async fn append_skip_report(path: &Path, names: &[String]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    let mut body = names.join("\n");
    body.push('\n');
    file.write_all(body.as_bytes()).await?;
    file.flush().await?;
    info!(path = %path.display(), entries = names.len(), "skip report written");
    Ok(())
}
