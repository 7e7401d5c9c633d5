// src/crypto/stream.rs
//! Incremental decryption of an envelope read from storage
//!
//! Holds at most two ciphertext segments in memory at a time: the one being
//! decrypted and a one-segment lookahead that tells us whether it is the last.
//! Deflated payloads are inflated segment by segment on the way to the writer.

use std::io::Write;

use chacha20poly1305::aead::generic_array::GenericArray;
use chacha20poly1305::aead::stream::DecryptorBE32;
use flate2::write::DeflateDecoder;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::aliases::PlainChunk;
use crate::consts::{
    ENCRYPTED_SEGMENT_LEN, ENVELOPE_ALGORITHM, ENVELOPE_MAGIC, STREAM_NONCE_LEN, X25519_KEY_LEN,
};
use crate::crypto::envelope::{derive_payload_key, payload_cipher};
use crate::crypto::fingerprint::{Fingerprint, FingerprintAlgorithm, FingerprintHasher};
use crate::error::{CoreError, Result};
use crate::keys::DecodedKeys;
use crate::manifest::{Compression, EncryptionInfo};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct DecryptStats {
    pub plaintext_len: u64,
    pub fingerprint: Option<Fingerprint>,
}

#[derive(Debug, Clone)]
pub enum StreamOutcome {
    /// Object had zero bytes
    Empty,
    Decrypted(DecryptStats),
}

/// Decrypt one envelope from `reader` into `writer`.
///
/// Every read is bounded by `policy`'s timeout and classified as a remote
/// failure; writes are local `Io` failures. When `digest` is set the
/// plaintext is hashed on the way through.
pub async fn decrypt_stream<R, W>(
    reader: &mut R,
    writer: &mut W,
    keys: &DecodedKeys,
    encryption: &EncryptionInfo,
    digest: Option<FingerprintAlgorithm>,
    policy: &RetryPolicy,
    object: &str,
) -> Result<StreamOutcome>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if encryption.algorithm != ENVELOPE_ALGORITHM {
        return Err(CoreError::Decryption(format!(
            "unsupported algorithm `{}`",
            encryption.algorithm
        )));
    }

    let mut magic = [0u8; 4];
    let got = read_full(reader, &mut magic, policy, object).await?;
    if got == 0 {
        return Ok(StreamOutcome::Empty);
    }
    if got < magic.len() || &magic != ENVELOPE_MAGIC {
        return Err(CoreError::Decryption("missing envelope header".into()));
    }

    let mut ephemeral_public = [0u8; X25519_KEY_LEN];
    read_exact(reader, &mut ephemeral_public, policy, object, "ephemeral key").await?;

    let nonce = match encryption.nonce {
        Some(nonce) => nonce,
        None => {
            let mut nonce = [0u8; STREAM_NONCE_LEN];
            read_exact(reader, &mut nonce, policy, object, "nonce").await?;
            nonce
        }
    };

    let key = derive_payload_key(&keys.private, &keys.public, &ephemeral_public)?;
    let mut decryptor =
        DecryptorBE32::from_aead(payload_cipher(&key), GenericArray::from_slice(&nonce));

    let mut sink = PlaintextSink {
        writer,
        hasher: digest.map(FingerprintHasher::new),
        inflater: match encryption.compression {
            Compression::None => None,
            Compression::Deflate => Some(DeflateDecoder::new(Vec::new())),
        },
        written: 0,
    };

    let mut current = vec![0u8; ENCRYPTED_SEGMENT_LEN];
    let mut next = vec![0u8; ENCRYPTED_SEGMENT_LEN];
    let mut current_len = read_full(reader, &mut current, policy, object).await?;
    if current_len == 0 {
        return Err(CoreError::Decryption("envelope has no payload".into()));
    }

    loop {
        if current_len < ENCRYPTED_SEGMENT_LEN {
            break;
        }
        let next_len = read_full(reader, &mut next, policy, object).await?;
        if next_len == 0 {
            break;
        }
        let plain = PlainChunk::new(decryptor.decrypt_next(&current[..current_len])?);
        sink.write(plain.expose_secret()).await?;
        std::mem::swap(&mut current, &mut next);
        current_len = next_len;
    }

    let plain = PlainChunk::new(decryptor.decrypt_last(&current[..current_len])?);
    sink.write(plain.expose_secret()).await?;
    sink.finish().await?;

    Ok(StreamOutcome::Decrypted(DecryptStats {
        plaintext_len: sink.written,
        fingerprint: sink.hasher.map(FingerprintHasher::finalize),
    }))
}

struct PlaintextSink<'a, W> {
    writer: &'a mut W,
    hasher: Option<FingerprintHasher>,
    inflater: Option<DeflateDecoder<Vec<u8>>>,
    written: u64,
}

impl<W: AsyncWrite + Unpin> PlaintextSink<'_, W> {
    /// Accept one authenticated segment
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        match self.inflater.as_mut() {
            None => self.emit(data).await,
            Some(inflater) => {
                inflater.write_all(data).map_err(corrupt_payload)?;
                let inflated = PlainChunk::new(std::mem::take(inflater.get_mut()));
                self.emit(inflated.expose_secret()).await
            }
        }
    }

    async fn finish(&mut self) -> Result<()> {
        if let Some(mut inflater) = self.inflater.take() {
            inflater.try_finish().map_err(corrupt_payload)?;
            let rest = PlainChunk::new(std::mem::take(inflater.get_mut()));
            self.emit(rest.expose_secret()).await?;
        }
        self.writer.flush().await?;
        Ok(())
    }

    async fn emit(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        self.writer.write_all(data).await?;
        if let Some(hasher) = self.hasher.as_mut() {
            hasher.update(data);
        }
        self.written += data.len() as u64;
        Ok(())
    }
}

fn corrupt_payload(err: std::io::Error) -> CoreError {
    CoreError::Decryption(format!("compressed payload is corrupt: {err}"))
}

async fn read_exact<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
    policy: &RetryPolicy,
    object: &str,
    part: &str,
) -> Result<()> {
    let got = read_full(reader, buf, policy, object).await?;
    if got < buf.len() {
        return Err(CoreError::Decryption(format!("truncated envelope {part}")));
    }
    Ok(())
}

/// Fill `buf` unless the stream ends first; returns bytes read
async fn read_full<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
    policy: &RetryPolicy,
    object: &str,
) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = policy
            .timed("read object", async {
                reader
                    .read(&mut buf[filled..])
                    .await
                    .map_err(|e| CoreError::from_remote_io(object, e))
            })
            .await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
