// src/crypto/envelope.rs
//! X25519 + HKDF-SHA256 + ChaCha20-Poly1305 STREAM envelope
//!
//! Object layout:
//! `[magic:4][ephemeral_pubkey:32][nonce_prefix:7]?[segment]*`
//!
//! The nonce prefix is omitted when the manifest carries it. Each segment is
//! up to 64 KiB of plaintext plus a 16-byte tag; the last one is flagged by
//! the STREAM construction, so truncation is detected. A deflated payload is
//! compressed before segmenting, so segments carry compressed bytes.

use std::io::{Read, Write};

use chacha20poly1305::aead::generic_array::GenericArray;
use chacha20poly1305::aead::stream::EncryptorBE32;
use chacha20poly1305::{ChaCha20Poly1305, Key, KeyInit};
use flate2::read::DeflateEncoder;
use hkdf::Hkdf;
use sha2::Sha256;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::aliases::{PayloadKey32, RandomX25519Secret32, SecureRandomExt, X25519Secret32};
use crate::consts::{
    ENVELOPE_MAGIC, PAYLOAD_KDF_INFO, SEGMENT_LEN, STREAM_NONCE_LEN, X25519_KEY_LEN,
};
use crate::crypto::fingerprint::{Fingerprint, FingerprintAlgorithm, FingerprintHasher};
use crate::error::{CoreError, Result};
use crate::manifest::Compression;

/// Freshly generated recipient key pair
pub struct GeneratedKeyPair {
    pub public: [u8; X25519_KEY_LEN],
    pub private: X25519Secret32,
}

impl GeneratedKeyPair {
    pub fn public_hex(&self) -> String {
        hex::encode(self.public)
    }

    pub fn private_hex(&self) -> String {
        hex::encode(self.private.expose_secret())
    }
}

#[inline]
pub fn generate_keypair() -> GeneratedKeyPair {
    let secret = StaticSecret::from(**RandomX25519Secret32::new());
    let public = PublicKey::from(&secret);
    GeneratedKeyPair {
        public: public.to_bytes(),
        private: X25519Secret32::new(secret.to_bytes()),
    }
}

/// Derive the payload key shared between the ephemeral sender key and the recipient
pub fn derive_payload_key(
    recipient_private: &X25519Secret32,
    recipient_public: &[u8; X25519_KEY_LEN],
    ephemeral_public: &[u8; X25519_KEY_LEN],
) -> Result<PayloadKey32> {
    let secret = StaticSecret::from(*recipient_private.expose_secret());
    let shared = secret.diffie_hellman(&PublicKey::from(*ephemeral_public));
    if !shared.was_contributory() {
        return Err(CoreError::Decryption(
            "ephemeral key is a low-order point".into(),
        ));
    }
    Ok(expand_payload_key(
        shared.as_bytes(),
        ephemeral_public,
        recipient_public,
    ))
}

fn expand_payload_key(
    shared: &[u8; 32],
    ephemeral_public: &[u8; X25519_KEY_LEN],
    recipient_public: &[u8; X25519_KEY_LEN],
) -> PayloadKey32 {
    let mut salt = [0u8; X25519_KEY_LEN * 2];
    salt[..X25519_KEY_LEN].copy_from_slice(ephemeral_public);
    salt[X25519_KEY_LEN..].copy_from_slice(recipient_public);

    let hk = Hkdf::<Sha256>::new(Some(&salt), shared);
    let mut okm = PayloadKey32::new([0u8; 32]);
    // 32 bytes is always a valid HKDF-SHA256 output length
    let _ = hk.expand(PAYLOAD_KDF_INFO, okm.expose_secret_mut());
    okm
}

pub(crate) fn payload_cipher(key: &PayloadKey32) -> ChaCha20Poly1305 {
    ChaCha20Poly1305::new(Key::from_slice(key.expose_secret()))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SealOptions {
    /// Leave the nonce prefix out of the object; it must then travel in the manifest
    pub detached_nonce: bool,
    pub compression: Compression,
}

/// What a producer needs to describe the sealed object in a manifest
#[derive(Debug, Clone)]
pub struct SealReport {
    pub nonce: [u8; STREAM_NONCE_LEN],
    /// Length of `input` before any compression
    pub plaintext_len: u64,
    pub fingerprint: Fingerprint,
}

/// Encrypt `input` for `recipient_public`, writing the envelope to `output`
pub fn seal<R: Read, W: Write>(
    recipient_public: &[u8; X25519_KEY_LEN],
    input: R,
    mut output: W,
    options: SealOptions,
) -> Result<SealReport> {
    let ephemeral = StaticSecret::from(**RandomX25519Secret32::new());
    let ephemeral_public = PublicKey::from(&ephemeral).to_bytes();
    let shared = ephemeral.diffie_hellman(&PublicKey::from(*recipient_public));
    if !shared.was_contributory() {
        return Err(CoreError::Configuration(
            "recipient public key is a low-order point".into(),
        ));
    }
    let key = expand_payload_key(shared.as_bytes(), &ephemeral_public, recipient_public);
    let nonce: [u8; STREAM_NONCE_LEN] = rand::random();

    output.write_all(ENVELOPE_MAGIC)?;
    output.write_all(&ephemeral_public)?;
    if !options.detached_nonce {
        output.write_all(&nonce)?;
    }

    let encryptor =
        EncryptorBE32::from_aead(payload_cipher(&key), GenericArray::from_slice(&nonce));
    let mut measured = MeasuredReader {
        inner: input,
        hasher: FingerprintHasher::new(FingerprintAlgorithm::Sha256),
        len: 0,
    };
    match options.compression {
        Compression::None => seal_segments(&mut measured, &mut output, encryptor)?,
        Compression::Deflate => seal_segments(
            DeflateEncoder::new(&mut measured, flate2::Compression::default()),
            &mut output,
            encryptor,
        )?,
    }
    output.flush()?;

    Ok(SealReport {
        nonce,
        plaintext_len: measured.len,
        fingerprint: measured.hasher.finalize(),
    })
}

/// Split `payload` into segments, the last one flagged, and write them out
fn seal_segments<R: Read, W: Write>(
    mut payload: R,
    output: &mut W,
    mut encryptor: EncryptorBE32<ChaCha20Poly1305>,
) -> Result<()> {
    let mut current = vec![0u8; SEGMENT_LEN];
    let mut next = vec![0u8; SEGMENT_LEN];
    let mut current_len = read_full(&mut payload, &mut current)?;

    loop {
        if current_len < SEGMENT_LEN {
            break;
        }
        let next_len = read_full(&mut payload, &mut next)?;
        if next_len == 0 {
            break;
        }
        let sealed = encryptor
            .encrypt_next(&current[..current_len])
            .map_err(CoreError::sealing)?;
        output.write_all(&sealed)?;
        std::mem::swap(&mut current, &mut next);
        current_len = next_len;
    }

    let sealed = encryptor
        .encrypt_last(&current[..current_len])
        .map_err(CoreError::sealing)?;
    output.write_all(&sealed)?;

    current.fill(0);
    next.fill(0);
    Ok(())
}

/// Hashes and counts the caller's bytes as they are pulled through
struct MeasuredReader<R> {
    inner: R,
    hasher: FingerprintHasher,
    len: u64,
}

impl<R: Read> Read for MeasuredReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        self.len += n as u64;
        Ok(n)
    }
}

fn read_full<R: Read>(input: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match input.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
