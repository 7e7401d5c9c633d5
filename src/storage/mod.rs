// src/storage/mod.rs
//! Collaborator seams for object storage and the parameter store
//!
//! The pipeline only ever talks to these traits. Cloud clients live outside
//! this crate; the local backends here serve the CLI and tests.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::aliases::KeyText;
use crate::error::Result;

mod local;

pub use local::{LocalObjectStore, LocalParameterStore};

/// Streaming body of one stored object
pub type ObjectReader = Box<dyn AsyncRead + Send + Unpin>;

/// Read-only view of an object storage service
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Open `key` in `bucket` for streamed reading.
    ///
    /// Fails with `NotFound`, `Access`, or `Transient`.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectReader>;
}

/// Read-only view of a remote parameter store
#[async_trait]
pub trait ParameterStore: Send + Sync {
    /// Fetch the value stored at `name`, decrypted by the store when it is marked secret.
    async fn get_parameter(&self, name: &str) -> Result<KeyText>;
}

/// Handles to every external collaborator a run needs
#[derive(Clone)]
pub struct Collaborators {
    pub objects: Arc<dyn ObjectStore>,
    pub parameters: Arc<dyn ParameterStore>,
}

impl Collaborators {
    pub fn new(objects: Arc<dyn ObjectStore>, parameters: Arc<dyn ParameterStore>) -> Self {
        Collaborators {
            objects,
            parameters,
        }
    }
}

/// Object key as laid out by producers: `ORG/path`, org upper-cased, `/` separators
pub fn object_key(organization: &str, path: &str) -> String {
    let path = path.replace('\\', "/");
    let path = path.trim_start_matches('/');
    let org = organization.trim().trim_matches('/');
    if org.is_empty() {
        path.to_string()
    } else {
        format!("{}/{}", org.to_uppercase(), path)
    }
}
