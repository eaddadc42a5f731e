use serde::{Deserialize, Serialize};

/// Normalized metadata about a stored file.
///
/// Produced once a provider has written the content; callers persist
/// `key` (and optionally `url`) wherever they need a reference to the file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    /// Multipart field the file arrived in (empty for direct writes).
    pub field_name: String,
    /// Client-supplied filename.
    pub original_name: String,
    /// Name the file is stored under.
    pub filename: String,
    /// Storage-relative key, the value to persist.
    pub key: String,
    /// Backend-specific address (absolute path on disk, object key in a bucket).
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    pub mime_type: Option<String>,
    /// Consumer-facing URL, pre-signed for object stores.
    pub url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UploadQuery {
    pub provider: Option<String>,
    pub dest: Option<String>,
    pub prefix: Option<String>,
    pub filename: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ObjectQuery {
    pub key: String,
    pub provider: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UrlResponse {
    pub url: Option<String>,
}
