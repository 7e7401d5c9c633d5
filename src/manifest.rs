// src/manifest.rs
//! Manifest fetching and parsing
//!
//! The manifest is a JSON document listing every file of a batch. Entry
//! order is preserved; it is the order results are reported in.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use crate::consts::{
    ENCRYPTED_OBJECT_SUFFIX, ENVELOPE_ALGORITHM, MAX_MANIFEST_BYTES, STREAM_NONCE_LEN,
};
use crate::crypto::Fingerprint;
use crate::error::{CoreError, Result};
use crate::retry::RetryPolicy;
use crate::storage::{object_key, ObjectStore};

/// Parsed batch manifest
#[derive(Debug, Clone)]
pub struct Manifest {
    pub name: Option<String>,
    /// Batch folder every entry's object key lives under
    pub folder: String,
    pub organization: Option<String>,
    pub files: Vec<ManifestEntry>,
}

/// One file of the batch, immutable once parsed
#[derive(Debug, Clone)]
pub struct ManifestEntry {
    /// Relative path, `/`-separated, never absolute, never escaping upward
    pub name: String,
    /// Plaintext size in bytes
    pub size: u64,
    pub fingerprint: Option<Fingerprint>,
    pub encryption: EncryptionInfo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionInfo {
    pub algorithm: String,
    /// STREAM nonce prefix when stored in the manifest instead of the object header
    pub nonce: Option<[u8; STREAM_NONCE_LEN]>,
    pub compression: Compression,
}

impl Default for EncryptionInfo {
    fn default() -> Self {
        EncryptionInfo {
            algorithm: ENVELOPE_ALGORITHM.to_string(),
            nonce: None,
            compression: Compression::None,
        }
    }
}

/// Transform applied to the plaintext before sealing
///
/// `size` and `fingerprint` always describe the file as written to the
/// destination, i.e. after inflation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    None,
    /// Raw DEFLATE stream (RFC 1951)
    Deflate,
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire shape, validated into the types above
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RawManifest {
    #[serde(default)]
    name: Option<String>,
    folder: String,
    #[serde(default)]
    organization: Option<String>,
    files: Vec<RawEntry>,
}

#[derive(Deserialize)]
struct RawEntry {
    name: String,
    size: u64,
    #[serde(default)]
    fingerprint: Option<String>,
    #[serde(default)]
    encryption: Option<RawEncryption>,
}

#[derive(Deserialize)]
struct RawEncryption {
    algorithm: String,
    #[serde(default)]
    nonce: Option<String>,
    #[serde(default)]
    compression: Compression,
}

impl Manifest {
    /// Organization used to prefix object keys: the manifest's own, else the request's
    pub fn effective_organization<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.organization
            .as_deref()
            .filter(|org| !org.trim().is_empty())
            .unwrap_or(fallback)
    }

    /// Storage key of an entry's encrypted object
    pub fn object_key_for(&self, entry: &ManifestEntry, fallback_org: &str) -> String {
        let folder = self.folder.trim_matches('/');
        let relative = if folder.is_empty() {
            format!("{}{}", entry.name, ENCRYPTED_OBJECT_SUFFIX)
        } else {
            format!("{folder}/{}{}", entry.name, ENCRYPTED_OBJECT_SUFFIX)
        };
        object_key(self.effective_organization(fallback_org), &relative)
    }
}

/// Parse and validate a manifest body
pub fn parse_manifest(body: &[u8]) -> Result<Manifest> {
    let raw: RawManifest = serde_json::from_slice(body)
        .map_err(|e| CoreError::ManifestFormat(e.to_string()))?;

    let files = raw
        .files
        .into_iter()
        .enumerate()
        .map(|(index, entry)| validate_entry(index, entry))
        .collect::<Result<Vec<_>>>()?;

    Ok(Manifest {
        name: raw.name,
        folder: raw.folder.replace('\\', "/"),
        organization: raw.organization,
        files,
    })
}

fn validate_entry(index: usize, raw: RawEntry) -> Result<ManifestEntry> {
    let name = normalize_entry_name(&raw.name)
        .map_err(|reason| CoreError::ManifestFormat(format!("files[{index}].name {reason}")))?;

    let fingerprint = raw
        .fingerprint
        .as_deref()
        .filter(|f| !f.trim().is_empty())
        .map(Fingerprint::parse)
        .transpose()
        .map_err(|e| CoreError::ManifestFormat(format!("files[{index}].fingerprint: {e}")))?;

    let encryption = match raw.encryption {
        None => EncryptionInfo::default(),
        Some(enc) => EncryptionInfo {
            algorithm: enc.algorithm,
            nonce: enc
                .nonce
                .as_deref()
                .map(decode_nonce)
                .transpose()
                .map_err(|e| {
                    CoreError::ManifestFormat(format!("files[{index}].encryption.nonce: {e}"))
                })?,
            compression: enc.compression,
        },
    };

    Ok(ManifestEntry {
        name,
        size: raw.size,
        fingerprint,
        encryption,
    })
}

fn decode_nonce(text: &str) -> std::result::Result<[u8; STREAM_NONCE_LEN], String> {
    let bytes = STANDARD
        .decode(text.trim())
        .map_err(|e| format!("not base64: {e}"))?;
    bytes
        .try_into()
        .map_err(|_| format!("must be {STREAM_NONCE_LEN} bytes"))
}

/// Force POSIX separators and reject names that could land outside the destination
pub fn normalize_entry_name(name: &str) -> std::result::Result<String, &'static str> {
    let posix = name.replace('\\', "/");
    if posix.starts_with('/') {
        return Err("must be relative");
    }
    let parts: Vec<&str> = posix
        .split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .collect();
    if parts.is_empty() {
        return Err("is empty");
    }
    if parts.iter().any(|part| *part == "..") {
        return Err("must not contain `..`");
    }
    if parts
        .first()
        .is_some_and(|first| first.len() == 2 && first.ends_with(':'))
    {
        return Err("must not carry a drive prefix");
    }
    Ok(parts.join("/"))
}

/// Read the manifest object for `manifest_key` and parse it
pub async fn fetch_manifest(
    objects: &dyn ObjectStore,
    bucket: &str,
    organization: &str,
    manifest_key: &str,
    retry: &RetryPolicy,
) -> Result<Manifest> {
    let key = object_key(organization, manifest_key);
    info!(bucket, key = %key, "fetching manifest");

    let body = retry
        .run("get_manifest", |_| read_manifest_body(objects, bucket, &key, retry))
        .await?;

    let manifest = parse_manifest(&body)?;
    debug!(
        folder = %manifest.folder,
        entries = manifest.files.len(),
        "manifest parsed"
    );
    Ok(manifest)
}

async fn read_manifest_body(
    objects: &dyn ObjectStore,
    bucket: &str,
    key: &str,
    retry: &RetryPolicy,
) -> Result<Vec<u8>> {
    let reader = retry
        .timed("open manifest", objects.get_object(bucket, key))
        .await?;

    let mut body = Vec::new();
    let mut limited = reader.take(MAX_MANIFEST_BYTES as u64 + 1);
    retry
        .timed("read manifest", async {
            limited
                .read_to_end(&mut body)
                .await
                .map_err(|e| CoreError::from_remote_io(key, e))
        })
        .await?;

    if body.len() > MAX_MANIFEST_BYTES {
        return Err(CoreError::ManifestFormat(format!(
            "manifest exceeds {MAX_MANIFEST_BYTES} bytes"
        )));
    }
    Ok(body)
}
