use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::{fs, io::AsyncWriteExt};
use tracing::{info, instrument, warn};

use super::{
    FileProvider, ProviderKind, StorageConfig, StorageError,
    upload::{IncomingFile, UploadEngine},
};
use crate::{context::RequestContext, models::UploadedFile, utils::basename};

/// Where local files live and how they are addressed over HTTP.
#[derive(Debug, Clone)]
pub struct LocalSettings {
    pub root_path: PathBuf,
    /// URL prefix under which `root_path` is served.
    pub base_url: String,
}

impl LocalSettings {
    /// Desktop builds keep files under the user's data directory,
    /// server builds under the configured public directory.
    pub fn for_deployment(
        api_base_url: &str,
        desktop_user_path: Option<&Path>,
        public_path: &Path,
    ) -> Self {
        let root_path = match desktop_user_path {
            Some(user_path) => user_path.join("public"),
            None => public_path.to_path_buf(),
        };
        Self {
            root_path,
            base_url: format!("{}/public", api_base_url.trim_end_matches('/')),
        }
    }
}

// Local filesystem storage
#[derive(Debug, Clone)]
pub struct LocalProvider {
    root_path: PathBuf,
    base_url: String,
}

impl LocalProvider {
    pub fn new(settings: &LocalSettings) -> Self {
        info!(root = ?settings.root_path, "Initializing local file storage provider");
        Self {
            root_path: settings.root_path.clone(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// Absolute path for a key; rejects keys escaping the root.
    fn resolve_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        if key.split(['/', '\\']).any(|part| part == "..") {
            return Err(StorageError::InvalidPath(key.to_string()));
        }
        Ok(self.root_path.join(key.trim_start_matches(['/', '\\'])))
    }

    /// Storage-relative key for an absolute path under the root.
    fn relative_key(&self, path: &str) -> String {
        let key = Path::new(path)
            .strip_prefix(&self.root_path)
            .map(|rel| rel.to_string_lossy().into_owned())
            .unwrap_or_else(|_| path.to_string());
        key.replace('\\', "/").trim_start_matches('/').to_string()
    }

    fn url_for(&self, key: &str) -> Option<String> {
        if key.is_empty() {
            return None;
        }
        if key.starts_with("http") {
            return Some(key.to_string());
        }
        Some(format!("{}/{}", self.base_url, key.trim_start_matches('/')))
    }

    fn map_file(&self, mut file: UploadedFile) -> UploadedFile {
        file.key = self.relative_key(&file.path);
        file.url = self.url_for(&file.key);
        file
    }
}

#[async_trait]
impl FileProvider for LocalProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Local
    }

    async fn url(&self, _ctx: &RequestContext, key: &str) -> Option<String> {
        self.url_for(key)
    }

    fn path(&self, key: &str) -> Option<String> {
        if key.is_empty() {
            return None;
        }
        Some(
            self.root_path
                .join(key.trim_start_matches(['/', '\\']))
                .to_string_lossy()
                .into_owned(),
        )
    }

    fn handler(&self, ctx: &RequestContext, config: &StorageConfig) -> Box<dyn UploadEngine> {
        Box::new(LocalUploadEngine {
            provider: self.clone(),
            tenant_id: ctx.tenant_key().to_string(),
            config: config.clone(),
        })
    }

    #[instrument(skip(self, _ctx), fields(provider = "local"))]
    async fn get_file(&self, _ctx: &RequestContext, key: &str) -> Result<Bytes, StorageError> {
        let path = self.resolve_path(key)?;
        match fs::read(&path).await {
            Ok(content) => Ok(Bytes::from(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(StorageError::IoError(e)),
        }
    }

    /// Writes `content` at `key`. Parent directories must already exist.
    #[instrument(skip(self, _ctx, content), fields(provider = "local", size = content.len()))]
    async fn put_file(
        &self,
        _ctx: &RequestContext,
        content: Bytes,
        key: &str,
    ) -> Result<UploadedFile, StorageError> {
        let path = self.resolve_path(key)?;
        fs::write(&path, &content).await?;

        tracing::info!("Saved file at {:?}", path);

        let filename = basename(key).to_string();
        Ok(self.map_file(UploadedFile {
            original_name: filename.clone(),
            filename,
            path: path.to_string_lossy().into_owned(),
            size: content.len() as u64,
            mime_type: mime_guess::from_path(key).first().map(|m| m.to_string()),
            ..Default::default()
        }))
    }

    #[instrument(skip(self, _ctx), fields(provider = "local"))]
    async fn delete_file(&self, _ctx: &RequestContext, key: &str) -> Result<(), StorageError> {
        let path = self.resolve_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("File deleted: {:?}", path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(StorageError::DeleteError(e.to_string())),
        }
    }

    async fn map_uploaded_file(&self, _ctx: &RequestContext, file: UploadedFile) -> UploadedFile {
        self.map_file(file)
    }
}

/// Streams a multipart field to `<root>/<tenant>/<dest>/<filename>`.
pub struct LocalUploadEngine {
    provider: LocalProvider,
    tenant_id: String,
    config: StorageConfig,
}

impl LocalUploadEngine {
    fn directory(&self, file: &IncomingFile) -> Result<PathBuf, StorageError> {
        let dest = self.config.dest.resolve(file);
        let mut dir = self.provider.root_path.clone();
        for segment in [self.tenant_id.as_str(), dest.as_str()] {
            let segment = segment.trim_matches(['/', '\\']);
            if segment.is_empty() {
                continue;
            }
            if segment.split(['/', '\\']).any(|part| part == "..") {
                return Err(StorageError::InvalidPath(segment.to_string()));
            }
            dir.push(segment);
        }
        Ok(dir)
    }
}

/// Filenames must name a single entry inside the upload directory.
fn entry_name(filename: String) -> Result<String, StorageError> {
    let escapes = filename.is_empty()
        || filename == "."
        || filename == ".."
        || filename.contains(['/', '\\'])
        || Path::new(&filename).is_absolute();
    if escapes {
        return Err(StorageError::InvalidPath(filename));
    }
    Ok(filename)
}

#[async_trait]
impl UploadEngine for LocalUploadEngine {
    #[instrument(skip(self, field), fields(provider = "local", original = %file.original_name))]
    async fn handle_file(
        &self,
        file: IncomingFile,
        mut field: multer::Field<'static>,
    ) -> Result<UploadedFile, StorageError> {
        let filename = entry_name(self.config.resolve_filename(&file, None))?;
        let dir = self.directory(&file)?;
        fs::create_dir_all(&dir).await?;

        let path = dir.join(&filename);

        let mut out = fs::File::create(&path).await?;
        let written = async {
            let mut size: u64 = 0;
            while let Some(chunk) = field.chunk().await? {
                size += chunk.len() as u64;
                out.write_all(&chunk).await?;
            }
            out.flush().await?;
            Ok::<u64, StorageError>(size)
        }
        .await;

        let size = match written {
            Ok(size) => size,
            Err(e) => {
                // Don't leave a truncated file behind.
                drop(out);
                if let Err(remove_err) = fs::remove_file(&path).await {
                    warn!("Failed to remove partial upload {:?}: {}", path, remove_err);
                }
                return Err(e);
            }
        };

        info!("Saved file at {:?} ({} bytes)", path, size);

        let mut descriptor = file.descriptor();
        descriptor.filename = filename;
        descriptor.path = path.to_string_lossy().into_owned();
        descriptor.size = size;
        Ok(self.provider.map_file(descriptor))
    }
}
