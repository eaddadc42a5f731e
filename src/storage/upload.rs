//! Multipart upload plumbing.
//!
//! A provider's [`UploadEngine`] decides where each file goes and writes
//! it; [`accept_files`] walks a `multer` stream and feeds it every file
//! field with the expected name.

use async_trait::async_trait;
use tracing::debug;

use super::StorageError;
use crate::{models::UploadedFile, utils::get_file_extension};

/// What is known about a file before its content has been read.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingFile {
    pub field_name: String,
    pub original_name: String,
    pub content_type: Option<String>,
}

impl IncomingFile {
    pub fn new(
        field_name: impl Into<String>,
        original_name: impl Into<String>,
        content_type: Option<String>,
    ) -> Self {
        Self {
            field_name: field_name.into(),
            original_name: original_name.into(),
            content_type,
        }
    }

    pub fn extension(&self) -> Option<String> {
        get_file_extension(&self.original_name)
    }

    /// Descriptor skeleton carrying the client-side metadata.
    pub(crate) fn descriptor(&self) -> UploadedFile {
        UploadedFile {
            field_name: self.field_name.clone(),
            original_name: self.original_name.clone(),
            mime_type: self.content_type.clone(),
            ..Default::default()
        }
    }
}

/// Per-request upload strategy supplied by a provider.
#[async_trait]
pub trait UploadEngine: Send + Sync {
    /// Stores one file field and returns its descriptor.
    async fn handle_file(
        &self,
        file: IncomingFile,
        field: multer::Field<'static>,
    ) -> Result<UploadedFile, StorageError>;
}

/// Stores every file field named `field_name`, in arrival order.
/// Plain form fields and files under other names are skipped.
pub async fn accept_files(
    engine: &dyn UploadEngine,
    mut multipart: multer::Multipart<'static>,
    field_name: &str,
) -> Result<Vec<UploadedFile>, StorageError> {
    let mut stored = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        let Some(original_name) = field.file_name().map(str::to_string) else {
            debug!(field = %name, "Skipping non-file field");
            continue;
        };
        if name != field_name {
            debug!(field = %name, "Skipping unexpected file field");
            continue;
        }

        let content_type = field.content_type().map(|mime| mime.to_string());
        let file = IncomingFile::new(name, original_name, content_type);
        stored.push(engine.handle_file(file, field).await?);
    }

    Ok(stored)
}
