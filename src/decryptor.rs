// src/decryptor.rs
//! Concurrent download + decrypt of the selected manifest entries
//!
//! A single coordinator dispatches entries in manifest order onto at most
//! `concurrency` tokio tasks. Each task streams one object from storage,
//! decrypts it into a temporary file in the destination directory, then
//! renames it into place. Missing parent directories are created only once
//! the plaintext has been verified. A target path therefore either holds a
//! complete plaintext or is left untouched, and a failed entry leaves no
//! directories behind.
//!
//! Under fail-fast, the first failure raises a shared stop flag. Entries
//! already in flight run to completion; entries not yet started are never
//! started.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::aggregate::{DecryptionOutcome, OutcomeStatus};
use crate::consts::TEMP_FILE_PREFIX;
use crate::crypto::{decrypt_stream, StreamOutcome};
use crate::error::{CoreError, Result};
use crate::keys::KeyPair;
use crate::manifest::ManifestEntry;
use crate::request::FailurePolicy;
use crate::retry::RetryPolicy;
use crate::storage::ObjectStore;

/// One selected entry together with the storage key of its object
#[derive(Debug, Clone)]
pub struct PlannedEntry {
    /// Position of the entry in the full manifest, before pattern filtering
    pub index: usize,
    pub entry: ManifestEntry,
    pub object_key: String,
}

/// Fixed parameters of one batch run
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub bucket: String,
    pub destination: PathBuf,
    pub overwrite: bool,
    pub concurrency: usize,
    pub policy: FailurePolicy,
}

/// What the coordinator hands back once every dispatched task has finished
#[derive(Debug)]
pub struct RunOutput {
    /// One outcome per started entry, completion order
    pub outcomes: Vec<DecryptionOutcome>,
    /// Matched entries that were never started
    pub not_started: usize,
}

pub struct BatchDecryptor {
    objects: Arc<dyn ObjectStore>,
    retry: RetryPolicy,
    verify_integrity: bool,
}

impl BatchDecryptor {
    pub fn new(objects: Arc<dyn ObjectStore>, retry: RetryPolicy) -> Self {
        BatchDecryptor {
            objects,
            retry,
            verify_integrity: true,
        }
    }

    /// Check plaintext size and fingerprint against the manifest (on by default)
    pub fn with_integrity_checks(mut self, verify: bool) -> Self {
        self.verify_integrity = verify;
        self
    }

    /// Process `entries` and return once every started entry has finished
    pub async fn run(&self, job: &BatchJob, keys: Arc<KeyPair>, entries: Vec<PlannedEntry>) -> RunOutput {
        let total = entries.len();
        let concurrency = job.concurrency.clamp(1, total.max(1)).min(Semaphore::MAX_PERMITS);
        info!(
            entries = total,
            concurrency,
            policy = ?job.policy,
            destination = %job.destination.display(),
            "starting batch"
        );

        let ctx = Arc::new(WorkerContext {
            objects: Arc::clone(&self.objects),
            retry: self.retry,
            verify_integrity: self.verify_integrity,
            bucket: job.bucket.clone(),
            destination: job.destination.clone(),
            overwrite: job.overwrite,
            policy: job.policy,
            keys,
            stop: AtomicBool::new(false),
        });

        let slots = Arc::new(Semaphore::new(concurrency));
        let mut tasks = JoinSet::new();
        let mut dispatched: Vec<(usize, String)> = Vec::with_capacity(total);

        for planned in entries {
            let permit = match Arc::clone(&slots).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            if ctx.stop.load(Ordering::SeqCst) {
                debug!("stop raised, no further entries dispatched");
                break;
            }
            dispatched.push((planned.index, planned.entry.name.clone()));
            let ctx = Arc::clone(&ctx);
            tasks.spawn(async move {
                let index = planned.index;
                let outcome = process_entry(&ctx, planned).await;
                drop(permit);
                (index, outcome)
            });
        }

        let mut outcomes = Vec::with_capacity(dispatched.len());
        let mut reported = HashSet::with_capacity(dispatched.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => {
                    reported.insert(index);
                    outcomes.extend(outcome);
                }
                Err(err) => error!(error = %err, "worker task aborted"),
            }
        }

        // A task that panicked never reported; its entry still counts as failed
        if reported.len() < dispatched.len() {
            for (index, name) in dispatched {
                if !reported.contains(&index) {
                    outcomes.push(DecryptionOutcome {
                        index,
                        name,
                        status: OutcomeStatus::Failed(CoreError::Io(std::io::Error::other(
                            "worker task aborted",
                        ))),
                        bytes_written: 0,
                        elapsed: Duration::ZERO,
                        attempts: 0,
                    });
                }
            }
        }

        let not_started = total - outcomes.len();
        info!(
            finished = outcomes.len(),
            not_started,
            "batch finished"
        );
        RunOutput {
            outcomes,
            not_started,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Workers
// ─────────────────────────────────────────────────────────────────────────────

struct WorkerContext {
    objects: Arc<dyn ObjectStore>,
    retry: RetryPolicy,
    verify_integrity: bool,
    bucket: String,
    destination: PathBuf,
    overwrite: bool,
    policy: FailurePolicy,
    keys: Arc<KeyPair>,
    stop: AtomicBool,
}

enum Written {
    Empty,
    File(u64),
}

/// `None` when the stop flag was already raised as the task started
async fn process_entry(ctx: &WorkerContext, planned: PlannedEntry) -> Option<DecryptionOutcome> {
    if ctx.stop.load(Ordering::SeqCst) {
        debug!(name = %planned.entry.name, "stop raised, entry not started");
        return None;
    }

    let started = Instant::now();
    let mut attempts = 0u32;
    let result = decrypt_entry(ctx, &planned, &mut attempts).await;
    let elapsed = started.elapsed();

    let name = planned.entry.name;
    let (status, bytes_written) = match result {
        Ok(Written::File(bytes)) => {
            info!(
                name = %name,
                bytes,
                attempts,
                elapsed_s = elapsed.as_secs_f64(),
                "decrypted"
            );
            (OutcomeStatus::Succeeded, bytes)
        }
        Ok(Written::Empty) => {
            warn!(name = %name, key = %planned.object_key, "object is empty, skipped");
            (OutcomeStatus::Skipped, 0)
        }
        Err(err) => {
            warn!(
                name = %name,
                kind = err.kind(),
                attempts,
                elapsed_s = elapsed.as_secs_f64(),
                error = %err,
                "entry failed"
            );
            if ctx.policy == FailurePolicy::FailFast && !ctx.stop.swap(true, Ordering::SeqCst) {
                warn!(name = %name, "fail-fast: stopping further entries");
            }
            (OutcomeStatus::Failed(err), 0)
        }
    };

    Some(DecryptionOutcome {
        index: planned.index,
        name,
        status,
        bytes_written,
        elapsed,
        attempts,
    })
}

async fn decrypt_entry(ctx: &WorkerContext, planned: &PlannedEntry, attempts: &mut u32) -> Result<Written> {
    let target = target_path(&ctx.destination, &planned.entry.name)?;

    if !ctx.overwrite && tokio::fs::try_exists(&target).await? {
        return Err(CoreError::AlreadyExists(target));
    }

    let target = &target;
    ctx.retry
        .run("decrypt_entry", |attempt| {
            *attempts = attempt;
            attempt_once(ctx, planned, target)
        })
        .await
}

/// One full download + decrypt pass into a fresh temporary file
async fn attempt_once(ctx: &WorkerContext, planned: &PlannedEntry, target: &Path) -> Result<Written> {
    let entry = &planned.entry;
    let keys = ctx.keys.decode()?;

    // staged at the destination root so nested targets need no directory yet
    let temp = tempfile::Builder::new()
        .prefix(TEMP_FILE_PREFIX)
        .tempfile_in(&ctx.destination)?;
    let mut file = tokio::fs::File::from_std(temp.as_file().try_clone()?);

    let mut reader = ctx
        .retry
        .timed(
            "get_object",
            ctx.objects.get_object(&ctx.bucket, &planned.object_key),
        )
        .await?;

    let digest = entry
        .fingerprint
        .as_ref()
        .filter(|_| ctx.verify_integrity)
        .map(|fp| fp.algorithm());

    let outcome = decrypt_stream(
        &mut reader,
        &mut file,
        &keys,
        &entry.encryption,
        digest,
        &ctx.retry,
        &planned.object_key,
    )
    .await?;
    drop(reader);

    let stats = match outcome {
        StreamOutcome::Empty => return Ok(Written::Empty),
        StreamOutcome::Decrypted(stats) => stats,
    };

    if ctx.verify_integrity {
        if stats.plaintext_len != entry.size {
            return Err(CoreError::Integrity {
                name: entry.name.clone(),
                expected: format!("{} bytes", entry.size),
                actual: format!("{} bytes", stats.plaintext_len),
            });
        }
        if let (Some(expected), Some(actual)) = (&entry.fingerprint, &stats.fingerprint) {
            if expected != actual {
                return Err(CoreError::Integrity {
                    name: entry.name.clone(),
                    expected: expected.to_string(),
                    actual: actual.to_string(),
                });
            }
        }
    }

    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let persisted = if ctx.overwrite {
        temp.persist(target)
    } else {
        temp.persist_noclobber(target)
    };
    match persisted {
        Ok(_) => Ok(Written::File(stats.plaintext_len)),
        Err(err) if !ctx.overwrite && err.error.kind() == std::io::ErrorKind::AlreadyExists => {
            Err(CoreError::AlreadyExists(target.to_path_buf()))
        }
        Err(err) => Err(CoreError::Io(err.error)),
    }
}

/// `destination/name`, refusing anything that would resolve outside `destination`
pub fn target_path(destination: &Path, name: &str) -> Result<PathBuf> {
    let relative = Path::new(name);
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return Err(CoreError::Access(format!(
            "entry `{name}` would resolve outside the destination"
        )));
    }
    Ok(destination.join(relative))
}
