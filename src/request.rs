// src/request.rs
//! The single structured input of a batch run
//!
//! Named fields instead of a flat positional argument list.
//! Built once per invocation and never mutated.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::aliases::KeyText;
use crate::config::Settings;
use crate::error::{CoreError, Result};

/// Whether one entry's failure stops further entries from starting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    #[default]
    BestEffort,
    FailFast,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchRequest {
    pub bucket: String,
    /// Object key of the manifest, relative to the organization prefix
    pub manifest_key: String,
    pub destination: PathBuf,
    #[serde(default)]
    pub organization: String,
    pub region: String,
    #[serde(default)]
    pub access_profile: String,

    #[serde(default, deserialize_with = "de_key_text")]
    pub public_key: Option<KeyText>,
    #[serde(default, deserialize_with = "de_key_text")]
    pub private_key: Option<KeyText>,
    #[serde(default)]
    pub public_key_parameter: Option<String>,
    #[serde(default)]
    pub private_key_parameter: Option<String>,

    #[serde(default)]
    pub overwrite: bool,
    /// 0 means "use the configured default"
    #[serde(default)]
    pub concurrency: usize,
    /// Comma-separated `*` patterns; empty selects everything
    #[serde(default)]
    pub file_patterns: String,
    #[serde(default)]
    pub failure_policy: Option<FailurePolicy>,
}

fn de_key_text<'de, D>(deserializer: D) -> std::result::Result<Option<KeyText>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.map(KeyText::new))
}

impl fmt::Debug for BatchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchRequest")
            .field("bucket", &self.bucket)
            .field("manifest_key", &self.manifest_key)
            .field("destination", &self.destination)
            .field("organization", &self.organization)
            .field("region", &self.region)
            .field("access_profile", &self.access_profile)
            .field("public_key", &self.public_key.as_ref().map(|_| "[REDACTED]"))
            .field("private_key", &self.private_key.as_ref().map(|_| "[REDACTED]"))
            .field("public_key_parameter", &self.public_key_parameter)
            .field("private_key_parameter", &self.private_key_parameter)
            .field("overwrite", &self.overwrite)
            .field("concurrency", &self.concurrency)
            .field("file_patterns", &self.file_patterns)
            .field("failure_policy", &self.failure_policy)
            .finish()
    }
}

impl BatchRequest {
    /// Minimal request; keys and options are filled in with the builder methods below
    pub fn new(
        bucket: impl Into<String>,
        manifest_key: impl Into<String>,
        destination: impl Into<PathBuf>,
        region: impl Into<String>,
    ) -> Self {
        BatchRequest {
            bucket: bucket.into(),
            manifest_key: manifest_key.into(),
            destination: destination.into(),
            organization: String::new(),
            region: region.into(),
            access_profile: String::new(),
            public_key: None,
            private_key: None,
            public_key_parameter: None,
            private_key_parameter: None,
            overwrite: false,
            concurrency: 0,
            file_patterns: String::new(),
            failure_policy: None,
        }
    }

    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = organization.into();
        self
    }

    pub fn with_access_profile(mut self, profile: impl Into<String>) -> Self {
        self.access_profile = profile.into();
        self
    }

    pub fn with_inline_keys(mut self, public_key: impl Into<String>, private_key: impl Into<String>) -> Self {
        self.public_key = Some(KeyText::new(public_key.into()));
        self.private_key = Some(KeyText::new(private_key.into()));
        self
    }

    pub fn with_key_parameters(
        mut self,
        public_key_parameter: impl Into<String>,
        private_key_parameter: impl Into<String>,
    ) -> Self {
        self.public_key_parameter = Some(public_key_parameter.into());
        self.private_key_parameter = Some(private_key_parameter.into());
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_file_patterns(mut self, patterns: impl Into<String>) -> Self {
        self.file_patterns = patterns.into();
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = Some(policy);
        self
    }

    /// Reject requests that cannot possibly succeed before any network call is made
    pub fn validate(&self) -> Result<()> {
        if self.manifest_key.trim().is_empty() {
            return Err(CoreError::Configuration(
                "a manifest key within the bucket is required".into(),
            ));
        }
        if self.bucket.trim().is_empty() {
            return Err(CoreError::Configuration("a bucket is required".into()));
        }
        if self.destination.as_os_str().is_empty() {
            return Err(CoreError::Configuration(
                "a local destination directory is required".into(),
            ));
        }
        if self.region.trim().is_empty() {
            return Err(CoreError::Configuration(
                "a storage region is required".into(),
            ));
        }
        if !has_text(self.public_key.as_ref()) && !has_param(self.public_key_parameter.as_deref()) {
            return Err(CoreError::Configuration(
                "no public key or public key parameter supplied".into(),
            ));
        }
        if !has_text(self.private_key.as_ref()) && !has_param(self.private_key_parameter.as_deref()) {
            return Err(CoreError::Configuration(
                "no private key or private key parameter supplied".into(),
            ));
        }
        Ok(())
    }

    /// Destination with a leading `~` expanded to the home directory
    pub fn destination_dir(&self) -> Result<PathBuf> {
        expand_home(&self.destination)
    }

    pub fn effective_concurrency(&self, settings: &Settings) -> usize {
        if self.concurrency == 0 {
            settings.policy.default_concurrency.max(1)
        } else {
            self.concurrency
        }
    }

    pub fn effective_failure_policy(&self, settings: &Settings) -> FailurePolicy {
        self.failure_policy
            .unwrap_or(settings.policy.failure_policy)
    }
}

pub(crate) fn has_text(text: Option<&KeyText>) -> bool {
    text.is_some_and(|t| !t.expose_secret().trim().is_empty())
}

pub(crate) fn has_param(path: Option<&str>) -> bool {
    path.is_some_and(|p| !p.trim().is_empty())
}

fn expand_home(path: &Path) -> Result<PathBuf> {
    let Ok(rest) = path.strip_prefix("~") else {
        return Ok(path.to_path_buf());
    };
    let home = dirs::home_dir().ok_or_else(|| {
        CoreError::Configuration("destination uses `~` but no home directory is known".into())
    })?;
    Ok(home.join(rest))
}
