// tests/common.rs
//! Shared test utilities: logging setup

#![allow(dead_code)]

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Test-friendly logging; call at the start of any test that needs logs
pub fn setup() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_test_writer()) // works with `cargo test` capture
        .with(EnvFilter::from_default_env()) // respects RUST_LOG=
        .try_init()
        .ok(); // idempotent
}

/// Force info-level logging even if RUST_LOG is not set
pub fn setup_info() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_test_writer())
        .with(EnvFilter::new("info"))
        .try_init()
        .ok();
}
