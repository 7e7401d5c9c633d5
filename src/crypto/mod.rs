// src/crypto/mod.rs
//! Envelope cryptography: the fixed key-exchange scheme every batch object uses
//!
//! Decryption streams from any `AsyncRead`; sealing is the synchronous
//! producer-side counterpart, used to build batches and in tests.
mod envelope;
mod fingerprint;
mod stream;

pub use envelope::{derive_payload_key, generate_keypair, seal, GeneratedKeyPair, SealOptions, SealReport};
pub use crate::manifest::Compression;
pub use fingerprint::{Fingerprint, FingerprintAlgorithm, FingerprintHasher};
pub use stream::{decrypt_stream, DecryptStats, StreamOutcome};
