// tests/manifest_tests.rs
mod support;

use std::time::Duration;

use batch_decryptor::consts::{ENVELOPE_ALGORITHM, MAX_MANIFEST_BYTES};
use batch_decryptor::crypto::{Compression, FingerprintAlgorithm};
use batch_decryptor::error::CoreError;
use batch_decryptor::manifest::{fetch_manifest, normalize_entry_name, parse_manifest};
use batch_decryptor::retry::RetryPolicy;
use serde_json::json;
use support::{Fault, MemoryObjectStore, BUCKET};

fn quick_retry() -> RetryPolicy {
    RetryPolicy::new(
        3,
        Duration::from_millis(1),
        Duration::from_millis(2),
        Duration::from_secs(5),
    )
}

#[test]
fn test_parse_manifest_preserves_order_and_defaults() {
    let body = json!({
        "name": "nightly",
        "folder": "exports\\2024-06-01",
        "files": [
            { "name": "b.csv", "size": 10 },
            { "name": "a.csv", "size": 20, "fingerprint": format!("blake3:{}", "ab".repeat(32)) },
            { "name": "sub\\c.csv", "size": 0, "encryption": {
                "algorithm": ENVELOPE_ALGORITHM, "nonce": "AAECAwQFBg==" } },
        ],
    });

    let manifest = parse_manifest(&serde_json::to_vec(&body).unwrap()).unwrap();

    assert_eq!(manifest.folder, "exports/2024-06-01");
    let names: Vec<&str> = manifest.files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["b.csv", "a.csv", "sub/c.csv"]);
    assert_eq!(manifest.files[0].encryption.algorithm, ENVELOPE_ALGORITHM);
    assert_eq!(manifest.files[0].encryption.nonce, None);
    assert_eq!(
        manifest.files[1].fingerprint.as_ref().unwrap().algorithm(),
        FingerprintAlgorithm::Blake3
    );
    assert_eq!(manifest.files[2].encryption.nonce, Some([0, 1, 2, 3, 4, 5, 6]));
    assert_eq!(manifest.files[2].encryption.compression, Compression::None);
}

#[test]
fn test_parse_manifest_compression_field() {
    let body = json!({
        "folder": "f",
        "files": [
            { "name": "a.csv", "size": 1, "encryption": {
                "algorithm": ENVELOPE_ALGORITHM, "compression": "deflate" } },
            { "name": "b.csv", "size": 1, "encryption": {
                "algorithm": ENVELOPE_ALGORITHM, "compression": "none" } },
        ],
    });
    let manifest = parse_manifest(&serde_json::to_vec(&body).unwrap()).unwrap();
    assert_eq!(manifest.files[0].encryption.compression, Compression::Deflate);
    assert_eq!(manifest.files[1].encryption.compression, Compression::None);

    let unknown = json!({ "folder": "f", "files": [{ "name": "x", "size": 1,
        "encryption": { "algorithm": ENVELOPE_ALGORITHM, "compression": "zstd" } }] });
    let err = parse_manifest(&serde_json::to_vec(&unknown).unwrap()).unwrap_err();
    assert!(matches!(err, CoreError::ManifestFormat(_)));
}

#[test]
fn test_parse_manifest_rejects_schema_violations() {
    let cases = [
        json!({ "files": [] }),
        json!({ "folder": "f", "files": [{ "size": 1 }] }),
        json!({ "folder": "f", "files": [{ "name": "x", "size": -1 }] }),
        json!({ "folder": "f", "files": [{ "name": "x", "size": 1, "fingerprint": "sha256:zz" }] }),
        json!({ "folder": "f", "files": [{ "name": "x", "size": 1,
            "encryption": { "algorithm": ENVELOPE_ALGORITHM, "nonce": "AAE=" } }] }),
    ];
    for case in cases {
        let err = parse_manifest(&serde_json::to_vec(&case).unwrap()).unwrap_err();
        assert!(matches!(err, CoreError::ManifestFormat(_)), "{case}");
    }
    assert!(matches!(
        parse_manifest(b"not json").unwrap_err(),
        CoreError::ManifestFormat(_)
    ));
}

#[test]
fn test_entry_names_cannot_escape_destination() {
    for bad in ["/etc/passwd", "../up.txt", "a/../../b", "", "./", "C:/x.txt"] {
        assert!(normalize_entry_name(bad).is_err(), "{bad:?} accepted");
    }
    assert_eq!(normalize_entry_name("a\\b/./c.txt").unwrap(), "a/b/c.txt");

    let body = json!({ "folder": "f", "files": [{ "name": "../../evil", "size": 1 }] });
    let err = parse_manifest(&serde_json::to_vec(&body).unwrap()).unwrap_err();
    assert!(err.to_string().contains("files[0].name"));
}

#[test]
fn test_object_keys_carry_organization_prefix() {
    let body = json!({ "folder": "/batch-7/", "files": [{ "name": "r/a.csv", "size": 1 }] });
    let manifest = parse_manifest(&serde_json::to_vec(&body).unwrap()).unwrap();

    assert_eq!(
        manifest.object_key_for(&manifest.files[0], "acme"),
        "ACME/batch-7/r/a.csv.enc"
    );
    assert_eq!(
        manifest.object_key_for(&manifest.files[0], ""),
        "batch-7/r/a.csv.enc"
    );

    let owned = json!({ "folder": "b", "organization": "globex",
        "files": [{ "name": "x", "size": 1 }] });
    let manifest = parse_manifest(&serde_json::to_vec(&owned).unwrap()).unwrap();
    assert_eq!(manifest.object_key_for(&manifest.files[0], "acme"), "GLOBEX/b/x.enc");
}

#[tokio::test]
async fn test_fetch_manifest_reads_prefixed_key_and_retries() {
    let store = MemoryObjectStore::new();
    let body = json!({ "folder": "b", "files": [{ "name": "x", "size": 1 }] });
    store.put("ACME/b/manifest.json", serde_json::to_vec(&body).unwrap());
    store.fail_next("ACME/b/manifest.json", Fault::Transient);

    let manifest = fetch_manifest(&store, BUCKET, "acme", "b/manifest.json", &quick_retry())
        .await
        .unwrap();

    assert_eq!(manifest.files.len(), 1);
    assert_eq!(store.open_count("ACME/b/manifest.json"), 2);
}

#[tokio::test]
async fn test_fetch_manifest_not_found_and_denied_are_permanent() {
    let store = MemoryObjectStore::new();
    let err = fetch_manifest(&store, BUCKET, "acme", "missing.json", &quick_retry())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));
    assert_eq!(store.open_count("ACME/missing.json"), 1);

    store.put("ACME/locked.json", b"{}".to_vec());
    store.fail_next("ACME/locked.json", Fault::Denied);
    let err = fetch_manifest(&store, BUCKET, "acme", "locked.json", &quick_retry())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Access(_)));
}

#[tokio::test]
async fn test_oversized_manifest_is_rejected() {
    let store = MemoryObjectStore::new();
    store.put("big.json", vec![b' '; MAX_MANIFEST_BYTES + 1]);

    let err = fetch_manifest(&store, BUCKET, "", "big.json", &quick_retry())
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::ManifestFormat(_)));
}
