// src/crypto/fingerprint.rs
//! Content fingerprints declared in the manifest
//!
//! Textual form is `sha256:<hex>` or `blake3:<hex>`; bare hex means SHA-256.

use std::fmt;

use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FingerprintAlgorithm {
    Sha256,
    Blake3,
}

impl FingerprintAlgorithm {
    pub fn label(self) -> &'static str {
        match self {
            FingerprintAlgorithm::Sha256 => "sha256",
            FingerprintAlgorithm::Blake3 => "blake3",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    algorithm: FingerprintAlgorithm,
    digest: [u8; 32],
}

impl Fingerprint {
    pub fn new(algorithm: FingerprintAlgorithm, digest: [u8; 32]) -> Self {
        Fingerprint { algorithm, digest }
    }

    pub fn parse(text: &str) -> Result<Self, String> {
        let text = text.trim();
        let (algorithm, hex_part) = match text.split_once(':') {
            Some((label, rest)) => {
                let algorithm = match label.to_ascii_lowercase().as_str() {
                    "sha256" | "sha-256" => FingerprintAlgorithm::Sha256,
                    "blake3" => FingerprintAlgorithm::Blake3,
                    other => return Err(format!("unknown fingerprint algorithm `{other}`")),
                };
                (algorithm, rest)
            }
            None => (FingerprintAlgorithm::Sha256, text),
        };
        let bytes = hex::decode(hex_part).map_err(|e| format!("fingerprint is not hex: {e}"))?;
        let digest: [u8; 32] = bytes
            .try_into()
            .map_err(|_| "fingerprint must be 32 bytes".to_string())?;
        Ok(Fingerprint { algorithm, digest })
    }

    pub fn algorithm(&self) -> FingerprintAlgorithm {
        self.algorithm
    }

    pub fn hasher(&self) -> FingerprintHasher {
        FingerprintHasher::new(self.algorithm)
    }

    /// Fingerprint of an in-memory buffer
    pub fn of(algorithm: FingerprintAlgorithm, data: &[u8]) -> Self {
        let mut hasher = FingerprintHasher::new(algorithm);
        hasher.update(data);
        hasher.finalize()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm.label(), hex::encode(self.digest))
    }
}

/// Incremental digest over decrypted plaintext
pub enum FingerprintHasher {
    Sha256(Sha256),
    Blake3(Box<blake3::Hasher>),
}

impl FingerprintHasher {
    pub fn new(algorithm: FingerprintAlgorithm) -> Self {
        match algorithm {
            FingerprintAlgorithm::Sha256 => FingerprintHasher::Sha256(Sha256::new()),
            FingerprintAlgorithm::Blake3 => {
                FingerprintHasher::Blake3(Box::new(blake3::Hasher::new()))
            }
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            FingerprintHasher::Sha256(h) => h.update(data),
            FingerprintHasher::Blake3(h) => {
                h.update(data);
            }
        }
    }

    pub fn finalize(self) -> Fingerprint {
        match self {
            FingerprintHasher::Sha256(h) => {
                Fingerprint::new(FingerprintAlgorithm::Sha256, h.finalize().into())
            }
            FingerprintHasher::Blake3(h) => {
                Fingerprint::new(FingerprintAlgorithm::Blake3, *h.finalize().as_bytes())
            }
        }
    }
}
