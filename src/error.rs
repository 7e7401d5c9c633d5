// src/error.rs
//! Public error type for the entire crate
//!
//! One variant per failure kind the pipeline distinguishes. Only
//! [`CoreError::Transient`] is ever retried.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    /// Bad or missing key material, or an unusable request/config.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Manifest, object, or parameter absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Permission denied by a remote collaborator or the local filesystem.
    #[error("access denied: {0}")]
    Access(String),

    /// Retryable network or service fault.
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("malformed manifest: {0}")]
    ManifestFormat(String),

    /// Destination already holds a file and overwrite is off.
    #[error("destination already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    /// Sealing an object failed on the producer side.
    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("integrity check failed for {name}: expected {expected}, got {actual}")]
    Integrity {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Transient(_))
    }

    /// Short stable label used in logs and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::Configuration(_) => "configuration",
            CoreError::NotFound(_) => "not-found",
            CoreError::Access(_) => "access",
            CoreError::Transient(_) => "transient",
            CoreError::ManifestFormat(_) => "manifest-format",
            CoreError::AlreadyExists(_) => "already-exists",
            CoreError::Encryption(_) => "encryption",
            CoreError::Decryption(_) => "decryption",
            CoreError::Integrity { .. } => "integrity",
            CoreError::Io(_) => "io",
        }
    }

    /// Classify an I/O error raised while talking to a remote collaborator.
    ///
    /// Anything that is not clearly "missing" or "forbidden" is assumed to be
    /// a network hiccup and therefore retryable.
    pub fn from_remote_io(context: &str, err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::NotFound => CoreError::NotFound(format!("{context}: {err}")),
            ErrorKind::PermissionDenied => CoreError::Access(format!("{context}: {err}")),
            _ => CoreError::Transient(format!("{context}: {err}")),
        }
    }
}

impl CoreError {
    /// The AEAD refused to seal a segment (STREAM counter exhausted).
    pub fn sealing(_: chacha20poly1305::aead::Error) -> Self {
        CoreError::Encryption("segment could not be sealed".into())
    }
}

impl From<chacha20poly1305::aead::Error> for CoreError {
    fn from(_: chacha20poly1305::aead::Error) -> Self {
        CoreError::Decryption("authentication tag mismatch".into())
    }
}
