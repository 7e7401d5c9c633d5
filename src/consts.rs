// src/consts.rs
//! Shared constants: envelope format parameters and defaults

/// Sole supported envelope algorithm identifier
pub const ENVELOPE_ALGORITHM: &str = "x25519-chacha20poly1305-v1";

/// Header magic at the start of every sealed object
pub const ENVELOPE_MAGIC: &[u8; 4] = b"BDX1";

/// X25519 public/private key length
pub const X25519_KEY_LEN: usize = 32;

/// STREAM-BE32 nonce prefix: 12-byte ChaCha20-Poly1305 nonce minus 5 bytes of counter/flag
pub const STREAM_NONCE_LEN: usize = 7;

/// Poly1305 tag appended to every segment
pub const TAG_LEN: usize = 16;

/// Plaintext bytes per segment (64 KiB)
pub const SEGMENT_LEN: usize = 64 * 1024;

/// Ciphertext bytes per full segment
pub const ENCRYPTED_SEGMENT_LEN: usize = SEGMENT_LEN + TAG_LEN;

/// HKDF info string binding derived keys to this format version
pub const PAYLOAD_KDF_INFO: &[u8] = b"batch-decryptor v1 payload";

/// Suffix appended to an entry name to form its object key
pub const ENCRYPTED_OBJECT_SUFFIX: &str = ".enc";

/// Upper bound on manifest body size
pub const MAX_MANIFEST_BYTES: usize = 16 * 1024 * 1024;

/// Prefix of in-progress files in the destination directory
pub const TEMP_FILE_PREFIX: &str = ".bdx-partial-";

/// Default number of entries decrypted at once
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Environment variable naming the TOML settings file
pub const CONFIG_ENV_VAR: &str = "BATCH_DECRYPT_CONFIG";

/// Environment variable overriding the configured log level
pub const LOG_ENV_VAR: &str = "BATCH_DECRYPT_LOG";

/// Settings file used when `BATCH_DECRYPT_CONFIG` is unset
pub const DEFAULT_CONFIG_PATH: &str = "batch-decryptor.toml";
