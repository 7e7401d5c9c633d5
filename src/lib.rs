// src/lib.rs
//! batch-decryptor — manifest-driven batch download and decryption
//!
//! Features:
//! - Manifest fetched from object storage, entries selected by wildcard
//! - Key pair inline or from a parameter store (inline wins)
//! - X25519 + ChaCha20-Poly1305 STREAM envelopes, decrypted incrementally
//! - Bounded concurrency, best-effort or fail-fast
//! - Atomic writes: a target file is complete or absent
//! - Full secure-gate integration for key material

pub mod aggregate;
pub mod aliases;
pub mod config;
pub mod consts;
pub mod crypto;
pub mod decryptor;
pub mod error;
pub mod keys;
pub mod logging;
pub mod manifest;
pub mod pattern;
pub mod pipeline;
pub mod request;
pub mod retry;
pub mod storage;

// Re-export everything callers need at the crate root
pub use aggregate::{BatchResult, DecryptionOutcome, OutcomeStatus, StatusCode};
pub use config::{load as load_config, Settings};
pub use error::{CoreError, Result};
pub use keys::{resolve_keys, KeyPair, KeySource};
pub use manifest::{fetch_manifest, parse_manifest, Manifest, ManifestEntry};
pub use pattern::PatternSet;
pub use pipeline::{decrypt, run, BatchReport};
pub use request::{BatchRequest, FailurePolicy};
pub use storage::{Collaborators, LocalObjectStore, LocalParameterStore, ObjectStore, ParameterStore};
