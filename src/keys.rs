// src/keys.rs
//! Key resolution: inline key text first, parameter store second
//!
//! The resolver only decides *where* the key pair comes from. Decoding the
//! text into X25519 keys happens per entry, so a malformed or mismatched pair
//! shows up as a decryption failure on each file rather than a pre-flight one.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use secure_gate::Dynamic;
use tracing::{debug, info};

use crate::aliases::{KeyText, X25519Secret32};
use crate::consts::X25519_KEY_LEN;
use crate::error::{CoreError, Result};
use crate::request::{has_param, has_text, BatchRequest};
use crate::retry::RetryPolicy;
use crate::storage::ParameterStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Inline,
    ParameterStore,
}

/// Public + private key text, zeroized on drop, shared read-only by all workers
pub struct KeyPair {
    public: KeyText,
    private: KeyText,
    source: KeySource,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &"[REDACTED]")
            .field("private", &"[REDACTED]")
            .field("source", &self.source)
            .finish()
    }
}

/// X25519 keys decoded from a [`KeyPair`]
pub struct DecodedKeys {
    pub public: [u8; X25519_KEY_LEN],
    pub private: X25519Secret32,
}

impl KeyPair {
    pub fn new(public: KeyText, private: KeyText, source: KeySource) -> Self {
        KeyPair {
            public,
            private,
            source,
        }
    }

    pub fn source(&self) -> KeySource {
        self.source
    }

    pub fn decode(&self) -> Result<DecodedKeys> {
        let public = decode_key_text(self.public.expose_secret())
            .map_err(|reason| CoreError::Decryption(format!("public key {reason}")))?;
        let private = decode_key_text(self.private.expose_secret())
            .map_err(|reason| CoreError::Decryption(format!("private key {reason}")))?;
        Ok(DecodedKeys {
            public: *public.expose_secret(),
            private,
        })
    }
}

/// Decode 32-byte key text: 64 hex chars, or base64, optionally inside `-----BEGIN/END-----` armor
pub fn decode_key_text(text: &str) -> std::result::Result<X25519Secret32, &'static str> {
    let body: String = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with("-----"))
        .collect::<Vec<_>>()
        .concat();
    let body: String = body.chars().filter(|c| !c.is_whitespace()).collect();

    if body.is_empty() {
        return Err("is empty");
    }

    let bytes: Dynamic<Vec<u8>> = Dynamic::new(
        if body.len() == X25519_KEY_LEN * 2 && body.chars().all(|c| c.is_ascii_hexdigit()) {
            hex::decode(&body).map_err(|_| "is not valid hex")?
        } else {
            STANDARD.decode(&body).map_err(|_| "is neither hex nor base64")?
        },
    );

    let mut key = [0u8; X25519_KEY_LEN];
    if bytes.expose_secret().len() != X25519_KEY_LEN {
        return Err("does not decode to 32 bytes");
    }
    key.copy_from_slice(bytes.expose_secret());
    let secret = X25519Secret32::new(key);
    key.fill(0);
    Ok(secret)
}

/// Produce the run's key pair or fail with `Configuration`
pub async fn resolve_keys(
    request: &BatchRequest,
    parameters: &dyn ParameterStore,
    retry: &RetryPolicy,
) -> Result<KeyPair> {
    if let (Some(public), Some(private)) = (&request.public_key, &request.private_key) {
        if has_text(Some(public)) && has_text(Some(private)) {
            info!("using inline key pair");
            return Ok(KeyPair::new(
                KeyText::new(public.expose_secret().clone()),
                KeyText::new(private.expose_secret().clone()),
                KeySource::Inline,
            ));
        }
    }

    match (
        request.public_key_parameter.as_deref(),
        request.private_key_parameter.as_deref(),
    ) {
        (Some(public_path), Some(private_path))
            if has_param(Some(public_path)) && has_param(Some(private_path)) =>
        {
            info!(public_path, private_path, "fetching key pair from parameter store");
            let (public, private) = tokio::try_join!(
                fetch_parameter(parameters, public_path, retry),
                fetch_parameter(parameters, private_path, retry),
            )?;
            Ok(KeyPair::new(public, private, KeySource::ParameterStore))
        }
        _ => Err(CoreError::Configuration(
            "need both inline keys or both key parameter paths".into(),
        )),
    }
}

async fn fetch_parameter(
    parameters: &dyn ParameterStore,
    name: &str,
    retry: &RetryPolicy,
) -> Result<KeyText> {
    let value = retry
        .run("get_parameter", |_| {
            retry.timed("get_parameter", parameters.get_parameter(name))
        })
        .await?;
    debug!(name, "parameter fetched");
    Ok(value)
}
