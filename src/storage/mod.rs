// Storage providers: local file system and S3-compatible object stores
pub mod local;
pub mod naming;
pub mod registry;
pub mod s3;
pub mod upload;

use std::{fmt, str::FromStr};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{context::RequestContext, models::UploadedFile};

pub use local::{LocalProvider, LocalSettings};
pub use naming::{Destination, FileName, StorageConfig, StorageConfigPatch};
pub use registry::{FileStorage, ProviderRegistry};
pub use s3::{S3Flavor, S3Provider, S3Settings};
pub use upload::{IncomingFile, UploadEngine, accept_files};

// Storage error types
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("File not found: {0}")]
    NotFound(String), // Returned when a file cannot be found

    #[error("Io Error: {0}")]
    IoError(#[from] std::io::Error), // Wraps standard I/O errors

    #[error("Upload Error: {0}")]
    UploadError(String), // Errors during upload to storage

    #[error("Delete Error: {0}")]
    DeleteError(String), // Errors during deletion from storage

    #[error("Invalid file storage provider: {0}")]
    InvalidProvider(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Configuration Error: {0}")]
    Configuration(String),

    #[error("Backend Error: {0}")]
    Backend(String),

    #[error("Multipart Error: {0}")]
    Multipart(#[from] multer::Error),
}

/// Every storage backend this service knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Local,
    S3,
    Wasabi,
    DigitalOcean,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::Local,
        ProviderKind::S3,
        ProviderKind::Wasabi,
        ProviderKind::DigitalOcean,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Local => "local",
            ProviderKind::S3 => "s3",
            ProviderKind::Wasabi => "wasabi",
            ProviderKind::DigitalOcean => "digitalocean",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        ProviderKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == name)
            .ok_or_else(|| StorageError::InvalidProvider(s.to_string()))
    }
}

/// Deployment-wide storage settings, loaded once at start.
#[derive(Debug, Clone)]
pub struct StorageSettings {
    /// Provider used when a request does not name one.
    pub default_provider: String,
    pub local: LocalSettings,
    pub s3: S3Settings,
    pub wasabi: S3Settings,
    pub digitalocean: S3Settings,
    /// Literal prepended to object names synthesized by object-store providers.
    pub object_prefix: String,
}

/// Capability contract every storage backend implements.
///
/// Calls that touch a remote backend take the [`RequestContext`] so
/// tenant-specific settings are resolved per call instead of being
/// stored on the (shared) provider.
#[async_trait]
pub trait FileProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Consumer-facing URL for a stored key, `None` for an empty key.
    async fn url(&self, ctx: &RequestContext, key: &str) -> Option<String>;

    /// Backend-specific address for a stored key, `None` for an empty key.
    fn path(&self, key: &str) -> Option<String>;

    /// Upload strategy used while parsing a multipart request.
    fn handler(&self, ctx: &RequestContext, config: &StorageConfig) -> Box<dyn UploadEngine>;

    async fn get_file(&self, ctx: &RequestContext, key: &str) -> Result<Bytes, StorageError>;

    async fn put_file(
        &self,
        ctx: &RequestContext,
        content: Bytes,
        key: &str,
    ) -> Result<UploadedFile, StorageError>;

    async fn delete_file(&self, ctx: &RequestContext, key: &str) -> Result<(), StorageError>;

    /// Normalizes what an upload engine produced into the common descriptor.
    async fn map_uploaded_file(&self, ctx: &RequestContext, file: UploadedFile) -> UploadedFile;
}
