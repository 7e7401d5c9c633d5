// tests/support.rs
//! Test utilities: instrumented in-memory collaborators and sealed batches

#![allow(dead_code)] // each test binary uses a different subset

use std::collections::{HashMap, VecDeque};
use std::io::{self, Cursor};
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use batch_decryptor::aliases::KeyText;
use batch_decryptor::crypto::{generate_keypair, seal, GeneratedKeyPair, SealOptions};
use batch_decryptor::error::{CoreError, Result};
use batch_decryptor::storage::{Collaborators, ObjectReader, ObjectStore, ParameterStore};
use batch_decryptor::BatchRequest;
use serde_json::json;
use tokio::io::{AsyncRead, ReadBuf};

pub const BUCKET: &str = "acme-batches";
pub const ORG: &str = "acme";
pub const FOLDER: &str = "batch-001";
pub const MANIFEST_KEY: &str = "batch-001/manifest.json";
pub const REGION: &str = "us-east-1";

/// Storage key the pipeline derives for `name` (org upper-cased, `.enc` suffix)
pub fn entry_key(name: &str) -> String {
    format!("{}/{FOLDER}/{name}.enc", ORG.to_uppercase())
}

pub fn manifest_object_key() -> String {
    format!("{}/{MANIFEST_KEY}", ORG.to_uppercase())
}

// ─────────────────────────────────────────────────────────────────────────────
// Object store
// ─────────────────────────────────────────────────────────────────────────────

/// Scripted failure returned by the next `get_object` on a key
#[derive(Debug, Clone, Copy)]
pub enum Fault {
    /// Open fails with a retryable error
    Transient,
    /// Open fails with permission denied
    Denied,
    /// Open succeeds but the stream breaks after half the body
    BrokenStream,
}

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    faults: Mutex<HashMap<String, VecDeque<Fault>>>,
    opened: Mutex<Vec<String>>,
    key_delays: Mutex<HashMap<String, Duration>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    open_delay: Duration,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every successful open for `delay` before returning the stream
    pub fn with_open_delay(delay: Duration) -> Self {
        MemoryObjectStore {
            open_delay: delay,
            ..Self::default()
        }
    }

    /// Hold successful opens of `key` for `delay`, on top of any global delay
    pub fn delay_open(&self, key: impl Into<String>, delay: Duration) {
        self.key_delays.lock().unwrap().insert(key.into(), delay);
    }

    pub fn put(&self, key: impl Into<String>, body: Vec<u8>) {
        self.objects.lock().unwrap().insert(key.into(), body);
    }

    pub fn fail_next(&self, key: impl Into<String>, fault: Fault) {
        self.faults
            .lock()
            .unwrap()
            .entry(key.into())
            .or_default()
            .push_back(fault);
    }

    /// Every key passed to `get_object`, in call order
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }

    pub fn open_count(&self, key: &str) -> usize {
        self.opened().iter().filter(|k| *k == key).count()
    }

    /// Highest number of object streams open at the same time
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectReader> {
        assert_eq!(bucket, BUCKET, "unexpected bucket");
        self.opened.lock().unwrap().push(key.to_string());

        let fault = self
            .faults
            .lock()
            .unwrap()
            .get_mut(key)
            .and_then(VecDeque::pop_front);
        match fault {
            Some(Fault::Transient) => {
                return Err(CoreError::Transient(format!("{key}: connection reset")))
            }
            Some(Fault::Denied) => return Err(CoreError::Access(format!("{key}: forbidden"))),
            Some(Fault::BrokenStream) | None => {}
        }

        let mut body = self
            .objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(key.to_string()))?;
        let break_at_end = matches!(fault, Some(Fault::BrokenStream));
        if break_at_end {
            body.truncate(body.len() / 2);
        }

        let guard = InFlightGuard::enter(&self.in_flight, &self.max_in_flight);
        let key_delay = self
            .key_delays
            .lock()
            .unwrap()
            .get(key)
            .copied()
            .unwrap_or_default();
        let delay = self.open_delay + key_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(Box::new(TrackedReader {
            inner: Cursor::new(body),
            break_at_end,
            _guard: guard,
        }))
    }
}

struct InFlightGuard {
    in_flight: Arc<AtomicUsize>,
}

impl InFlightGuard {
    fn enter(in_flight: &Arc<AtomicUsize>, max: &AtomicUsize) -> Self {
        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        max.fetch_max(now, Ordering::SeqCst);
        InFlightGuard {
            in_flight: Arc::clone(in_flight),
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

struct TrackedReader {
    inner: Cursor<Vec<u8>>,
    break_at_end: bool,
    _guard: InFlightGuard,
}

impl AsyncRead for TrackedReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) if this.break_at_end && buf.filled().len() == before => {
                Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "stream reset by peer",
                )))
            }
            other => other,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Parameter store
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingParameterStore {
    values: HashMap<String, String>,
    calls: AtomicUsize,
    transient_failures: AtomicUsize,
}

impl RecordingParameterStore {
    pub fn new(values: HashMap<String, String>) -> Self {
        RecordingParameterStore {
            values,
            ..Self::default()
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Fail the next `n` calls with a transient error
    pub fn fail_transiently(&self, n: usize) {
        self.transient_failures.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ParameterStore for RecordingParameterStore {
    async fn get_parameter(&self, name: &str) -> Result<KeyText> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let pending = self.transient_failures.load(Ordering::SeqCst);
        if pending > 0
            && self
                .transient_failures
                .compare_exchange(pending, pending - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            return Err(CoreError::Transient(format!("{name}: throttled")));
        }
        self.values
            .get(name)
            .map(|v| KeyText::new(v.clone()))
            .ok_or_else(|| CoreError::NotFound(format!("parameter `{name}`")))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sealed batches
// ─────────────────────────────────────────────────────────────────────────────

pub fn seal_bytes(recipient_public: &[u8; 32], plaintext: &[u8]) -> (Vec<u8>, String) {
    let mut out = Vec::new();
    let report = seal(recipient_public, plaintext, &mut out, SealOptions::default()).unwrap();
    (out, report.fingerprint.to_string())
}

/// A manifest plus one sealed object per file, loaded into a `MemoryObjectStore`
pub struct BatchFixture {
    pub keys: GeneratedKeyPair,
    pub store: Arc<MemoryObjectStore>,
    pub parameters: Arc<RecordingParameterStore>,
    pub files: Vec<(String, Vec<u8>)>,
}

impl BatchFixture {
    pub fn new(files: &[(&str, &[u8])]) -> Self {
        Self::with_store(files, MemoryObjectStore::new())
    }

    pub fn with_store(files: &[(&str, &[u8])], store: MemoryObjectStore) -> Self {
        let keys = generate_keypair();
        let mut entries = Vec::new();
        for (name, plaintext) in files {
            let (sealed, fingerprint) = seal_bytes(&keys.public, plaintext);
            store.put(entry_key(name), sealed);
            entries.push(json!({
                "name": name,
                "size": plaintext.len(),
                "fingerprint": fingerprint,
            }));
        }
        let manifest = json!({ "name": "nightly export", "folder": FOLDER, "files": entries });
        store.put(manifest_object_key(), serde_json::to_vec(&manifest).unwrap());

        BatchFixture {
            keys,
            store: Arc::new(store),
            parameters: Arc::new(RecordingParameterStore::empty()),
            files: files
                .iter()
                .map(|(name, data)| (name.to_string(), data.to_vec()))
                .collect(),
        }
    }

    /// Request for this batch with inline keys
    pub fn request(&self, destination: &Path) -> BatchRequest {
        BatchRequest::new(BUCKET, MANIFEST_KEY, destination, REGION)
            .with_organization(ORG)
            .with_inline_keys(self.keys.public_hex(), self.keys.private_hex())
    }

    pub fn collaborators(&self) -> Collaborators {
        let objects: Arc<dyn ObjectStore> = self.store.clone();
        let parameters: Arc<dyn ParameterStore> = self.parameters.clone();
        Collaborators::new(objects, parameters)
    }

    /// Replace an entry's object with ciphertext whose tag no longer verifies
    pub fn corrupt(&self, name: &str) {
        let key = entry_key(name);
        let mut body = self.store.objects.lock().unwrap().get(&key).cloned().unwrap();
        let last = body.len() - 1;
        body[last] ^= 0x01;
        self.store.put(key, body);
    }

    pub fn plaintext(&self, name: &str) -> &[u8] {
        &self
            .files
            .iter()
            .find(|(n, _)| n == name)
            .unwrap()
            .1
    }
}

/// Deterministic filler of `len` bytes
pub fn sample_bytes(seed: u8, len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}
