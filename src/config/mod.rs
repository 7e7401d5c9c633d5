// src/config/mod.rs
//! Configuration system for batch-decryptor
//!
//! TOML file + env overrides, falling back to built-in defaults. Settings are
//! loaded once by the caller and passed down explicitly.

pub use app::{load, load_from, LogFormat, LoggingSettings, Policy, RetrySettings, Settings};

mod app;
mod defaults;
