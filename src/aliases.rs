// src/aliases.rs
//! Secure-gate secret types used throughout batch-decryptor
//!
//! Every buffer that holds key material lives in one of these wrappers so it
//! is zeroized on drop and only reachable through `.expose_secret()`.

pub use secure_gate::{dynamic_alias, fixed_alias, random_alias, SecureRandomExt};

// Fixed-size secrets
fixed_alias!(X25519Secret32, 32); // recipient private key, decoded
fixed_alias!(PayloadKey32, 32); // HKDF output fed to ChaCha20-Poly1305

// Dynamic secrets
dynamic_alias!(KeyText, String); // key material exactly as supplied (inline or fetched)
dynamic_alias!(PlainChunk, Vec<u8>); // one decrypted segment before it hits disk

// Random secrets
random_alias!(RandomX25519Secret32, 32); // fresh recipient or ephemeral scalar
