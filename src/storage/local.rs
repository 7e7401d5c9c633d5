// src/storage/local.rs
//! Filesystem-backed collaborators
//!
//! `LocalObjectStore` maps `bucket/key` onto `root/bucket/key`, which is the
//! layout `aws s3 sync` or `gsutil rsync` leaves on disk. `LocalParameterStore`
//! reads a flat JSON object of parameter name → value.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use super::{ObjectReader, ObjectStore, ParameterStore};
use crate::aliases::KeyText;
use crate::error::{CoreError, Result};

#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalObjectStore { root: root.into() }
    }

    fn resolve(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        let mut path = self.root.join(checked_relative(bucket)?);
        path.push(checked_relative(key)?);
        Ok(path)
    }
}

fn checked_relative(part: &str) -> Result<&Path> {
    let path = Path::new(part);
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if part.is_empty() || escapes {
        return Err(CoreError::Access(format!("refusing object path `{part}`")));
    }
    Ok(path)
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectReader> {
        let path = self.resolve(bucket, key)?;
        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| CoreError::from_remote_io(&format!("{bucket}/{key}"), e))?;
        Ok(Box::new(file))
    }
}

pub struct LocalParameterStore {
    values: HashMap<String, KeyText>,
}

impl LocalParameterStore {
    pub fn from_map(values: HashMap<String, String>) -> Self {
        LocalParameterStore {
            values: values
                .into_iter()
                .map(|(name, value)| (name, KeyText::new(value)))
                .collect(),
        }
    }

    /// Load a JSON object of `"name": "value"` pairs
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let values: HashMap<String, String> = serde_json::from_str(&content).map_err(|e| {
            CoreError::Configuration(format!("invalid parameter file {}: {e}", path.display()))
        })?;
        Ok(Self::from_map(values))
    }

    pub fn empty() -> Self {
        Self::from_map(HashMap::new())
    }
}

#[async_trait]
impl ParameterStore for LocalParameterStore {
    async fn get_parameter(&self, name: &str) -> Result<KeyText> {
        self.values
            .get(name)
            .map(|value| KeyText::new(value.expose_secret().clone()))
            .ok_or_else(|| CoreError::NotFound(format!("parameter `{name}`")))
    }
}
