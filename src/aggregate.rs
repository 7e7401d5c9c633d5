// src/aggregate.rs
//! Folding per-entry outcomes into the batch result and its status code

use std::fmt;
use std::time::Duration;

use crate::error::CoreError;
use crate::request::FailurePolicy;

/// Process-level status returned across the invocation boundary.
///
/// | Code | Meaning |
/// |---|---|
/// | 0 | every matched file decrypted (or nothing matched) |
/// | 1 | pre-flight failure: request, key resolution, or manifest |
/// | 2 | every attempted file failed |
/// | 3 | some files succeeded, some failed |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum StatusCode {
    Success = 0,
    PreflightFailure = 1,
    AllFailed = 2,
    PartialFailure = 3,
}

impl StatusCode {
    #[inline]
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StatusCode::Success => "success",
            StatusCode::PreflightFailure => "pre-flight failure",
            StatusCode::AllFailed => "all failed",
            StatusCode::PartialFailure => "partial failure",
        };
        write!(f, "{label} ({})", self.code())
    }
}

#[derive(Debug)]
pub enum OutcomeStatus {
    Succeeded,
    /// Object was empty; nothing written
    Skipped,
    Failed(CoreError),
}

/// Result of one worker processing one entry; never mutated once created
#[derive(Debug)]
pub struct DecryptionOutcome {
    /// Position of the entry in the manifest
    pub index: usize,
    pub name: String,
    pub status: OutcomeStatus,
    pub bytes_written: u64,
    pub elapsed: Duration,
    pub attempts: u32,
}

impl DecryptionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.status, OutcomeStatus::Succeeded)
    }

    pub fn error(&self) -> Option<&CoreError> {
        match &self.status {
            OutcomeStatus::Failed(err) => Some(err),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct EntryFailure {
    /// Position of the entry in the manifest
    pub index: usize,
    pub name: String,
    pub error: CoreError,
}

/// Terminal record of a run that got past pre-flight
#[derive(Debug)]
pub struct BatchResult {
    pub policy: FailurePolicy,
    /// Entries selected by the pattern
    pub matched: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Names of empty objects, manifest order
    pub skipped: Vec<String>,
    /// Entries never started because a fail-fast stop was raised
    pub not_started: usize,
    pub bytes_written: u64,
    /// All failures, manifest order
    pub failures: Vec<EntryFailure>,
    first_failure: Option<usize>,
}

impl BatchResult {
    /// Fold `outcomes` (any arrival order) into a result
    pub fn aggregate(
        matched: usize,
        outcomes: Vec<DecryptionOutcome>,
        policy: FailurePolicy,
    ) -> Self {
        let first_failed_index = outcomes
            .iter()
            .find(|o| o.error().is_some())
            .map(|o| o.index);

        let mut outcomes = outcomes;
        outcomes.sort_by_key(|o| o.index);

        let attempted = outcomes.len();
        let mut result = BatchResult {
            policy,
            matched,
            attempted,
            succeeded: 0,
            failed: 0,
            skipped: Vec::new(),
            not_started: matched.saturating_sub(attempted),
            bytes_written: 0,
            failures: Vec::new(),
            first_failure: None,
        };

        for outcome in outcomes {
            result.bytes_written += outcome.bytes_written;
            match outcome.status {
                OutcomeStatus::Succeeded => result.succeeded += 1,
                OutcomeStatus::Skipped => result.skipped.push(outcome.name),
                OutcomeStatus::Failed(error) => {
                    result.failed += 1;
                    if Some(outcome.index) == first_failed_index {
                        result.first_failure = Some(result.failures.len());
                    }
                    result.failures.push(EntryFailure {
                        index: outcome.index,
                        name: outcome.name,
                        error,
                    });
                }
            }
        }

        result
    }

    /// Failure that completed first; under fail-fast, the one that raised the stop
    pub fn first_failure(&self) -> Option<&EntryFailure> {
        self.first_failure.and_then(|i| self.failures.get(i))
    }

    pub fn status(&self) -> StatusCode {
        if self.failed == 0 {
            StatusCode::Success
        } else if self.succeeded == 0 && self.skipped.is_empty() {
            StatusCode::AllFailed
        } else {
            StatusCode::PartialFailure
        }
    }
}
