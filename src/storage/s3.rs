use std::time::Duration;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, meta::region::RegionProviderChain};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    Client,
    presigning::PresigningConfig,
    primitives::ByteStream,
    types::{CompletedMultipartUpload, CompletedPart},
};
use aws_types::region::Region;
use bytes::{Bytes, BytesMut};
use tracing::{error, info, instrument, warn};

use super::{
    FileProvider, ProviderKind, StorageConfig, StorageError,
    upload::{IncomingFile, UploadEngine},
};
use crate::{
    context::RequestContext,
    models::UploadedFile,
    utils::{basename, ensure_https_prefix, join_key},
};

pub const DEFAULT_REGION: &str = "us-east-1";

/// Lifetime of pre-signed download URLs.
pub const PRESIGNED_URL_TTL: Duration = Duration::from_secs(3600);

/// Uploads larger than one part are streamed as a multipart upload.
/// S3 rejects non-final parts below 5 MiB.
pub const MULTIPART_PART_SIZE: usize = 5 * 1024 * 1024;

const WASABI_REGION_SERVICE_URLS: &[(&str, &str)] = &[
    ("us-east-1", "https://s3.wasabisys.com"),
    ("us-east-2", "https://s3.us-east-2.wasabisys.com"),
    ("us-central-1", "https://s3.us-central-1.wasabisys.com"),
    ("us-west-1", "https://s3.us-west-1.wasabisys.com"),
    ("eu-central-1", "https://s3.eu-central-1.wasabisys.com"),
    ("eu-west-1", "https://s3.eu-west-1.wasabisys.com"),
    ("eu-west-2", "https://s3.eu-west-2.wasabisys.com"),
    ("ap-northeast-1", "https://s3.ap-northeast-1.wasabisys.com"),
    ("ap-northeast-2", "https://s3.ap-northeast-2.wasabisys.com"),
];

/// Wasabi service endpoint for a region, if Wasabi operates there.
pub fn wasabi_service_url(region: &str) -> Option<&'static str> {
    WASABI_REGION_SERVICE_URLS
        .iter()
        .find(|(r, _)| *r == region)
        .map(|(_, url)| *url)
}

/// Connection settings for an S3-compatible bucket.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct S3Settings {
    /// Key prefix every object is stored under.
    pub root_path: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
    pub bucket: String,
    /// Custom service endpoint (Wasabi, Spaces, MinIO).
    pub endpoint: Option<String>,
    pub force_path_style: bool,
}

/// Tenant-setting names a flavor reads its overrides from.
struct SettingKeys {
    access_key_id: &'static str,
    secret_access_key: &'static str,
    region: &'static str,
    bucket: &'static str,
    service_url: Option<&'static str>,
    force_path_style: &'static str,
}

/// S3-compatible services sharing one implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum S3Flavor {
    Aws,
    Wasabi,
    DigitalOcean,
}

impl S3Flavor {
    pub fn kind(self) -> ProviderKind {
        match self {
            S3Flavor::Aws => ProviderKind::S3,
            S3Flavor::Wasabi => ProviderKind::Wasabi,
            S3Flavor::DigitalOcean => ProviderKind::DigitalOcean,
        }
    }

    fn keys(self) -> SettingKeys {
        match self {
            S3Flavor::Aws => SettingKeys {
                access_key_id: "aws_access_key_id",
                secret_access_key: "aws_secret_access_key",
                region: "aws_default_region",
                bucket: "aws_bucket",
                service_url: None,
                force_path_style: "aws_force_path_style",
            },
            S3Flavor::Wasabi => SettingKeys {
                access_key_id: "wasabi_aws_access_key_id",
                secret_access_key: "wasabi_aws_secret_access_key",
                region: "wasabi_aws_default_region",
                bucket: "wasabi_aws_bucket",
                service_url: Some("wasabi_aws_service_url"),
                force_path_style: "wasabi_aws_force_path_style",
            },
            S3Flavor::DigitalOcean => SettingKeys {
                access_key_id: "digitalocean_access_key_id",
                secret_access_key: "digitalocean_secret_access_key",
                region: "digitalocean_default_region",
                bucket: "digitalocean_s3_bucket",
                service_url: Some("digitalocean_service_url"),
                force_path_style: "digitalocean_s3_force_path_style",
            },
        }
    }

    /// Effective settings for one call: `defaults` overlaid with the
    /// non-blank tenant settings found on `ctx`. Never mutates `defaults`.
    pub fn resolve_settings(self, defaults: &S3Settings, ctx: &RequestContext) -> S3Settings {
        let mut settings = defaults.clone();
        let tenant = &ctx.tenant_settings;
        if tenant.is_empty() {
            return settings;
        }

        let keys = self.keys();
        if let Some(v) = tenant.value(keys.access_key_id) {
            settings.access_key_id = v.to_string();
        }
        if let Some(v) = tenant.value(keys.secret_access_key) {
            settings.secret_access_key = v.to_string();
        }
        if let Some(v) = tenant.value(keys.bucket) {
            settings.bucket = v.to_string();
        }
        if let Some(v) = tenant.value(keys.force_path_style) {
            settings.force_path_style = v == "true" || v == "1";
        }
        if let Some(region) = tenant.value(keys.region) {
            settings.region = region.to_string();
            if self == S3Flavor::Wasabi {
                if let Some(url) = wasabi_service_url(region) {
                    settings.endpoint = Some(url.to_string());
                }
            }
        }
        if let Some(url) = keys.service_url.and_then(|key| tenant.value(key)) {
            settings.endpoint = Some(ensure_https_prefix(url));
        }
        settings
    }
}

// S3-compatible object storage
#[derive(Debug, Clone)]
pub struct S3Provider {
    flavor: S3Flavor,
    defaults: S3Settings,
    /// Literal placed before synthesized object names.
    object_prefix: String,
}

impl S3Provider {
    pub fn new(flavor: S3Flavor, defaults: S3Settings, object_prefix: impl Into<String>) -> Self {
        info!(
            provider = %flavor.kind(),
            bucket = %defaults.bucket,
            "Initializing object storage provider"
        );
        Self {
            flavor,
            defaults,
            object_prefix: object_prefix.into(),
        }
    }

    pub fn flavor(&self) -> S3Flavor {
        self.flavor
    }

    pub fn settings(&self, ctx: &RequestContext) -> S3Settings {
        self.flavor.resolve_settings(&self.defaults, ctx)
    }

    /// Builds a client for the given settings.
    async fn client(&self, settings: &S3Settings) -> Result<Client, StorageError> {
        if settings.access_key_id.is_empty() || settings.secret_access_key.is_empty() {
            return Err(StorageError::Configuration(format!(
                "{} credentials are missing",
                self.flavor.kind()
            )));
        }

        let region = (!settings.region.is_empty()).then(|| Region::new(settings.region.clone()));
        let region_provider =
            RegionProviderChain::first_try(region).or_else(Region::new(DEFAULT_REGION));

        let credentials = Credentials::new(
            settings.access_key_id.clone(),
            settings.secret_access_key.clone(),
            None,
            None,
            "tenant-file-storage",
        );

        let mut aws_config_builder = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .credentials_provider(credentials);

        // Custom endpoint (e.g., Wasabi, Spaces, MinIO)
        if let Some(endpoint) = &settings.endpoint {
            aws_config_builder = aws_config_builder.endpoint_url(endpoint);
        }

        let aws_config = aws_config_builder.load().await;

        Ok(Client::from_conf(
            aws_sdk_s3::config::Builder::from(&aws_config)
                .force_path_style(settings.force_path_style)
                .build(),
        ))
    }

    fn bucket<'a>(&self, settings: &'a S3Settings) -> Result<&'a str, StorageError> {
        if settings.bucket.is_empty() {
            return Err(StorageError::Configuration(format!(
                "{} bucket is not configured",
                self.flavor.kind()
            )));
        }
        Ok(&settings.bucket)
    }

    async fn presigned_url(&self, settings: &S3Settings, key: &str) -> Result<String, StorageError> {
        let client = self.client(settings).await?;
        let presigning = PresigningConfig::expires_in(PRESIGNED_URL_TTL)
            .map_err(|e| StorageError::Configuration(format!("invalid presign config: {}", e)))?;

        let request = client
            .get_object()
            .bucket(self.bucket(settings)?)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| StorageError::Backend(format!("presign failed: {}", e)))?;

        Ok(request.uri().to_string())
    }

    /// Writes `content` under `key`.
    async fn put_object(
        &self,
        client: &Client,
        settings: &S3Settings,
        key: &str,
        content: Bytes,
        content_type: Option<&str>,
        field_name: Option<&str>,
    ) -> Result<(), StorageError> {
        let mut request = client
            .put_object()
            .bucket(self.bucket(settings)?)
            .key(key)
            .body(ByteStream::from(content))
            .content_disposition(content_disposition(key));

        if let Some(content_type) = content_type {
            request = request.content_type(content_type);
        }
        if let Some(field_name) = field_name {
            request = request.metadata("fieldName", field_name);
        }

        request.send().await.map_err(|e| {
            error!("Error uploading object {}: {}", key, e);
            StorageError::UploadError(e.to_string())
        })?;
        Ok(())
    }
}

fn content_disposition(key: &str) -> String {
    format!("inline; {}", basename(key))
}

#[async_trait]
impl FileProvider for S3Provider {
    fn kind(&self) -> ProviderKind {
        self.flavor.kind()
    }

    /// Pre-signed download URL valid for one hour.
    async fn url(&self, ctx: &RequestContext, key: &str) -> Option<String> {
        if key.is_empty() {
            return None;
        }
        if key.starts_with("http") {
            return Some(key.to_string());
        }

        let settings = self.settings(ctx);
        match self.presigned_url(&settings, key).await {
            Ok(url) => Some(url),
            Err(e) => {
                error!(provider = %self.kind(), "Error while retrieving signed URL for {}: {}", key, e);
                None
            }
        }
    }

    fn path(&self, key: &str) -> Option<String> {
        if key.is_empty() {
            return None;
        }
        Some(join_key(&[self.defaults.root_path.as_str(), key]))
    }

    fn handler(&self, ctx: &RequestContext, config: &StorageConfig) -> Box<dyn UploadEngine> {
        Box::new(S3UploadEngine {
            provider: self.clone(),
            settings: self.settings(ctx),
            ctx: ctx.clone(),
            config: config.clone(),
        })
    }

    #[instrument(skip(self, ctx))]
    async fn get_file(&self, ctx: &RequestContext, key: &str) -> Result<Bytes, StorageError> {
        let settings = self.settings(ctx);
        let client = self.client(&settings).await?;

        let response = client
            .get_object()
            .bucket(self.bucket(&settings)?)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    StorageError::NotFound(key.to_string())
                } else {
                    error!("Error while fetching object {}: {}", key, e);
                    StorageError::Backend(e.to_string())
                }
            })?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(data.into_bytes())
    }

    #[instrument(skip(self, ctx, content), fields(size = content.len()))]
    async fn put_file(
        &self,
        ctx: &RequestContext,
        content: Bytes,
        key: &str,
    ) -> Result<UploadedFile, StorageError> {
        let key = key.replace('\\', "/");
        let settings = self.settings(ctx);
        let client = self.client(&settings).await?;

        let content_type = mime_guess::from_path(&key).first().map(|m| m.to_string());
        self.put_object(&client, &settings, &key, content, content_type.as_deref(), None)
            .await?;

        let head = client
            .head_object()
            .bucket(self.bucket(&settings)?)
            .key(&key)
            .send()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        info!("Stored object {}", key);

        let filename = basename(&key).to_string();
        let file = UploadedFile {
            original_name: filename.clone(),
            filename,
            path: key.clone(),
            key,
            size: head.content_length().unwrap_or_default().max(0) as u64,
            mime_type: content_type,
            ..Default::default()
        };
        Ok(self.map_uploaded_file(ctx, file).await)
    }

    #[instrument(skip(self, ctx))]
    async fn delete_file(&self, ctx: &RequestContext, key: &str) -> Result<(), StorageError> {
        let settings = self.settings(ctx);
        let client = self.client(&settings).await?;

        client
            .delete_object()
            .bucket(self.bucket(&settings)?)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::DeleteError(e.to_string()))?;

        info!("File deleted sucessfully from {}: {}", self.kind(), key);
        Ok(())
    }

    async fn map_uploaded_file(&self, ctx: &RequestContext, mut file: UploadedFile) -> UploadedFile {
        file.filename = file.original_name.clone();
        file.url = self.url(ctx, &file.key).await;
        file
    }
}

/// Uploads a multipart field to `<root>/<tenant>/<dest>/<filename>`.
///
/// Settings are resolved once when the engine is built, so every file in
/// a request goes to the same bucket.
pub struct S3UploadEngine {
    provider: S3Provider,
    settings: S3Settings,
    ctx: RequestContext,
    config: StorageConfig,
}

impl S3UploadEngine {
    fn object_key(&self, file: &IncomingFile) -> String {
        let dest = self.config.dest.resolve(file);
        let filename = self
            .config
            .resolve_filename(file, Some(&self.provider.object_prefix));
        join_key(&[
            self.settings.root_path.as_str(),
            self.ctx.tenant_key(),
            dest.as_str(),
            filename.as_str(),
        ])
    }
}

impl S3UploadEngine {
    /// Streams the rest of `field` to `key` as a multipart upload, starting
    /// with the already buffered `first_part`. Returns the total size.
    async fn multipart_upload(
        &self,
        client: &Client,
        key: &str,
        file: &IncomingFile,
        first_part: BytesMut,
        field: &mut multer::Field<'static>,
    ) -> Result<u64, StorageError> {
        let bucket = self.provider.bucket(&self.settings)?;
        let created = client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .content_disposition(content_disposition(key))
            .set_content_type(file.content_type.clone())
            .metadata("fieldName", &file.field_name)
            .send()
            .await
            .map_err(|e| {
                error!("Error starting multipart upload {}: {}", key, e);
                StorageError::UploadError(e.to_string())
            })?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| StorageError::Backend(format!("no upload id returned for {}", key)))?
            .to_string();

        match self
            .upload_parts(client, bucket, key, &upload_id, first_part, field)
            .await
        {
            Ok((parts, size)) => {
                client
                    .complete_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .multipart_upload(
                        CompletedMultipartUpload::builder()
                            .set_parts(Some(parts))
                            .build(),
                    )
                    .send()
                    .await
                    .map_err(|e| {
                        error!("Error completing multipart upload {}: {}", key, e);
                        StorageError::UploadError(e.to_string())
                    })?;
                Ok(size)
            }
            Err(e) => {
                if let Err(abort_err) = client
                    .abort_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    warn!("Failed to abort multipart upload {}: {}", key, abort_err);
                }
                Err(e)
            }
        }
    }

    async fn upload_parts(
        &self,
        client: &Client,
        bucket: &str,
        key: &str,
        upload_id: &str,
        mut buffer: BytesMut,
        field: &mut multer::Field<'static>,
    ) -> Result<(Vec<CompletedPart>, u64), StorageError> {
        let mut parts = Vec::new();
        let mut size: u64 = 0;
        let mut done = false;

        loop {
            while !done && buffer.len() < MULTIPART_PART_SIZE {
                match field.chunk().await? {
                    Some(chunk) => buffer.extend_from_slice(&chunk),
                    None => {
                        done = true;
                        break;
                    }
                }
            }
            if buffer.is_empty() {
                break;
            }

            let take = buffer.len().min(MULTIPART_PART_SIZE);
            let part = buffer.split_to(take).freeze();
            let part_number = parts.len() as i32 + 1;
            size += part.len() as u64;

            let uploaded = client
                .upload_part()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(part))
                .send()
                .await
                .map_err(|e| {
                    error!("Error uploading part {} of {}: {}", part_number, key, e);
                    StorageError::UploadError(e.to_string())
                })?;

            parts.push(
                CompletedPart::builder()
                    .set_e_tag(uploaded.e_tag().map(str::to_string))
                    .part_number(part_number)
                    .build(),
            );
        }

        Ok((parts, size))
    }
}

#[async_trait]
impl UploadEngine for S3UploadEngine {
    #[instrument(skip(self, field), fields(original = %file.original_name))]
    async fn handle_file(
        &self,
        file: IncomingFile,
        mut field: multer::Field<'static>,
    ) -> Result<UploadedFile, StorageError> {
        let key = self.object_key(&file);
        let client = self.provider.client(&self.settings).await?;

        let mut buffer = BytesMut::new();
        let mut complete = false;
        while buffer.len() < MULTIPART_PART_SIZE {
            match field.chunk().await? {
                Some(chunk) => buffer.extend_from_slice(&chunk),
                None => {
                    complete = true;
                    break;
                }
            }
        }

        let size = if complete {
            let size = buffer.len() as u64;
            self.provider
                .put_object(
                    &client,
                    &self.settings,
                    &key,
                    buffer.freeze(),
                    file.content_type.as_deref(),
                    Some(&file.field_name),
                )
                .await?;
            size
        } else {
            self.multipart_upload(&client, &key, &file, buffer, &mut field)
                .await?
        };

        info!("Uploaded object {} ({} bytes)", key, size);

        let mut descriptor = file.descriptor();
        descriptor.filename = basename(&key).to_string();
        descriptor.path = key.clone();
        descriptor.key = key;
        descriptor.size = size;
        Ok(self.provider.map_uploaded_file(&self.ctx, descriptor).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        context::TenantSettings,
        storage::{
            FileName, StorageConfigPatch,
            upload::{accept_files, tests::multipart},
        },
    };

    fn defaults() -> S3Settings {
        S3Settings {
            root_path: String::new(),
            access_key_id: "DEFAULTKEY".into(),
            secret_access_key: "defaultsecret".into(),
            region: "us-east-1".into(),
            bucket: "gauzy".into(),
            endpoint: None,
            force_path_style: false,
        }
    }

    fn tenant(settings: &[(&str, &str)]) -> RequestContext {
        RequestContext::new(Some("tenant-7".into()))
            .with_settings(settings.iter().copied().collect::<TenantSettings>())
    }

    #[test]
    fn blank_tenant_credentials_keep_defaults() {
        let ctx = tenant(&[
            ("aws_access_key_id", "   "),
            ("aws_secret_access_key", ""),
            ("aws_bucket", " "),
        ]);
        let settings = S3Flavor::Aws.resolve_settings(&defaults(), &ctx);
        assert_eq!(settings, defaults());
    }

    #[test]
    fn tenant_credentials_override_defaults_trimmed() {
        let ctx = tenant(&[
            ("aws_access_key_id", " TENANTKEY "),
            ("aws_secret_access_key", "tenantsecret"),
            ("aws_default_region", "eu-west-1"),
            ("aws_bucket", "tenant-bucket"),
            ("aws_force_path_style", "1"),
        ]);
        let settings = S3Flavor::Aws.resolve_settings(&defaults(), &ctx);
        assert_eq!(settings.access_key_id, "TENANTKEY");
        assert_eq!(settings.secret_access_key, "tenantsecret");
        assert_eq!(settings.region, "eu-west-1");
        assert_eq!(settings.bucket, "tenant-bucket");
        assert!(settings.force_path_style);
    }

    #[test]
    fn resolution_does_not_touch_shared_provider_state() {
        let provider = S3Provider::new(S3Flavor::Aws, defaults(), "gauzy");
        let ctx = tenant(&[("aws_access_key_id", "OTHER"), ("aws_secret_access_key", "x")]);

        assert_eq!(provider.settings(&ctx).access_key_id, "OTHER");
        assert_eq!(provider.settings(&RequestContext::anonymous()), defaults());
    }

    #[test]
    fn flavors_read_their_own_setting_keys() {
        let ctx = tenant(&[
            ("aws_access_key_id", "AWS"),
            ("wasabi_aws_access_key_id", "WASABI"),
            ("wasabi_aws_default_region", "eu-central-1"),
            ("digitalocean_access_key_id", "DO"),
            ("digitalocean_service_url", "nyc3.digitaloceanspaces.com"),
        ]);

        let wasabi = S3Flavor::Wasabi.resolve_settings(&defaults(), &ctx);
        assert_eq!(wasabi.access_key_id, "WASABI");
        assert_eq!(
            wasabi.endpoint.as_deref(),
            Some("https://s3.eu-central-1.wasabisys.com")
        );

        let spaces = S3Flavor::DigitalOcean.resolve_settings(&defaults(), &ctx);
        assert_eq!(spaces.access_key_id, "DO");
        assert_eq!(
            spaces.endpoint.as_deref(),
            Some("https://nyc3.digitaloceanspaces.com")
        );
    }

    #[test]
    fn wasabi_region_table_lookup() {
        assert_eq!(wasabi_service_url("us-east-1"), Some("https://s3.wasabisys.com"));
        assert_eq!(wasabi_service_url("mars-1"), None);
    }

    #[test]
    fn path_prefixes_root_and_empty_key_is_none() {
        let mut settings = defaults();
        settings.root_path = "uploads".into();
        let provider = S3Provider::new(S3Flavor::Aws, settings, "gauzy");
        assert_eq!(provider.path("a/b.png").as_deref(), Some("uploads/a/b.png"));
        assert_eq!(provider.path(""), None);
    }

    #[tokio::test]
    async fn url_passes_through_absolute_and_rejects_empty() {
        let provider = S3Provider::new(S3Flavor::Aws, defaults(), "gauzy");
        let ctx = RequestContext::anonymous();
        assert_eq!(provider.url(&ctx, "").await, None);
        assert_eq!(
            provider.url(&ctx, "https://cdn/x.png").await.as_deref(),
            Some("https://cdn/x.png")
        );
    }

    #[tokio::test]
    async fn mapped_upload_gets_presigned_url_and_original_name() {
        let provider = S3Provider::new(S3Flavor::Aws, defaults(), "gauzy");
        let file = UploadedFile {
            key: "k".into(),
            original_name: "k".into(),
            filename: "gauzy-file-1-2.png".into(),
            ..Default::default()
        };

        let mapped = provider
            .map_uploaded_file(&RequestContext::anonymous(), file)
            .await;

        assert_eq!(mapped.filename, mapped.original_name);
        let url = mapped.url.expect("presigned url");
        assert!(!url.is_empty());
        assert!(url.contains("X-Amz-Signature"), "{}", url);
        assert!(url.contains("X-Amz-Expires=3600"), "{}", url);
    }

    #[tokio::test]
    async fn missing_credentials_surface_as_configuration_error() {
        let mut settings = defaults();
        settings.access_key_id.clear();
        let provider = S3Provider::new(S3Flavor::Aws, settings, "gauzy");

        let err = provider
            .get_file(&RequestContext::anonymous(), "k")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Configuration(_)));
        assert_eq!(provider.url(&RequestContext::anonymous(), "k").await, None);
    }

    #[test]
    fn object_keys_are_namespaced_by_root_tenant_and_destination() {
        let mut settings = defaults();
        settings.root_path = "files".into();
        let provider = S3Provider::new(S3Flavor::Aws, settings, "gauzy");
        let ctx = RequestContext::new(Some("tenant-7".into()));

        let mut config = StorageConfig::new("s3");
        config.merge(StorageConfigPatch::default().dest("avatars").prefix("user"), "s3");
        let engine = S3UploadEngine {
            settings: provider.settings(&ctx),
            provider: provider.clone(),
            ctx: ctx.clone(),
            config: config.clone(),
        };
        let file = IncomingFile::new("file", "photo.png", None);

        let key = engine.object_key(&file);
        assert!(key.starts_with("files/tenant-7/avatars/gauzy-user-"), "{}", key);
        assert!(key.ends_with(".png"));

        config.filename = Some(FileName::Fixed("me.png".into()));
        let engine = S3UploadEngine { config, ..engine };
        assert_eq!(engine.object_key(&file), "files/tenant-7/avatars/me.png");
    }

    /// Minimal path-style S3 endpoint: single puts, heads and multipart uploads.
    mod endpoint {
        use std::{
            collections::HashMap,
            sync::{Arc, Mutex},
        };

        use axum::{
            Router,
            extract::{DefaultBodyLimit, Path, Query, State},
            http::{HeaderMap, StatusCode, header},
            response::{IntoResponse, Response},
            routing::put,
        };
        use bytes::Bytes;

        #[derive(Debug, Clone)]
        pub struct StoredObject {
            pub bucket: String,
            pub size: usize,
            pub parts: usize,
            pub content_disposition: Option<String>,
        }

        #[derive(Debug, Default)]
        struct PendingUpload {
            content_disposition: Option<String>,
            part_sizes: Vec<usize>,
        }

        #[derive(Debug, Default)]
        pub struct Store {
            pub objects: Mutex<HashMap<String, StoredObject>>,
            uploads: Mutex<HashMap<String, PendingUpload>>,
        }

        type Params = Query<HashMap<String, String>>;

        fn body_size(headers: &HeaderMap, body: &Bytes) -> usize {
            headers
                .get("x-amz-decoded-content-length")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(body.len())
        }

        fn content_disposition(headers: &HeaderMap) -> Option<String> {
            headers
                .get(header::CONTENT_DISPOSITION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        }

        fn xml(body: String) -> Response {
            ([(header::CONTENT_TYPE, "application/xml")], body).into_response()
        }

        async fn put_object(
            State(store): State<Arc<Store>>,
            Path((bucket, key)): Path<(String, String)>,
            Query(params): Params,
            headers: HeaderMap,
            body: Bytes,
        ) -> Response {
            let size = body_size(&headers, &body);

            if let Some(upload_id) = params.get("uploadId") {
                let mut uploads = store.uploads.lock().unwrap();
                let Some(upload) = uploads.get_mut(upload_id) else {
                    return StatusCode::NOT_FOUND.into_response();
                };
                upload.part_sizes.push(size);
                let etag = format!("\"part-{}\"", upload.part_sizes.len());
                return ([(header::ETAG, etag)], StatusCode::OK).into_response();
            }

            store.objects.lock().unwrap().insert(
                key,
                StoredObject {
                    bucket,
                    size,
                    parts: 1,
                    content_disposition: content_disposition(&headers),
                },
            );
            ([(header::ETAG, "\"etag\"")], StatusCode::OK).into_response()
        }

        async fn post_object(
            State(store): State<Arc<Store>>,
            Path((bucket, key)): Path<(String, String)>,
            Query(params): Params,
            headers: HeaderMap,
        ) -> Response {
            if params.contains_key("uploads") {
                let mut uploads = store.uploads.lock().unwrap();
                let upload_id = format!("upload-{}", uploads.len() + 1);
                uploads.insert(
                    upload_id.clone(),
                    PendingUpload {
                        content_disposition: content_disposition(&headers),
                        part_sizes: Vec::new(),
                    },
                );
                return xml(format!(
                    "<InitiateMultipartUploadResult><Bucket>{}</Bucket><Key>{}</Key><UploadId>{}</UploadId></InitiateMultipartUploadResult>",
                    bucket, key, upload_id
                ));
            }

            let Some(upload) = params
                .get("uploadId")
                .and_then(|id| store.uploads.lock().unwrap().remove(id))
            else {
                return StatusCode::BAD_REQUEST.into_response();
            };
            store.objects.lock().unwrap().insert(
                key.clone(),
                StoredObject {
                    bucket: bucket.clone(),
                    size: upload.part_sizes.iter().sum(),
                    parts: upload.part_sizes.len(),
                    content_disposition: upload.content_disposition,
                },
            );
            xml(format!(
                "<CompleteMultipartUploadResult><Bucket>{}</Bucket><Key>{}</Key><ETag>\"etag\"</ETag></CompleteMultipartUploadResult>",
                bucket, key
            ))
        }

        async fn head_object(
            State(store): State<Arc<Store>>,
            Path((_bucket, key)): Path<(String, String)>,
        ) -> Response {
            let size = store.objects.lock().unwrap().get(&key).map(|o| o.size);
            match size {
                Some(size) => (StatusCode::OK, vec![0u8; size]).into_response(),
                None => StatusCode::NOT_FOUND.into_response(),
            }
        }

        /// Serves on an ephemeral port; returns its base URL.
        pub async fn spawn() -> (String, Arc<Store>) {
            let store = Arc::new(Store::default());
            let app = Router::new()
                .route(
                    "/{bucket}/{*key}",
                    put(put_object).post(post_object).head(head_object),
                )
                .layer(DefaultBodyLimit::disable())
                .with_state(store.clone());

            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });
            (format!("http://{}", addr), store)
        }
    }

    fn local_endpoint_provider(endpoint: &str) -> S3Provider {
        let mut settings = defaults();
        settings.endpoint = Some(endpoint.to_string());
        settings.force_path_style = true;
        S3Provider::new(S3Flavor::Aws, settings, "gauzy")
    }

    #[tokio::test]
    async fn put_file_reports_size_from_head_and_inline_disposition() {
        let (endpoint, store) = endpoint::spawn().await;
        let provider = local_endpoint_provider(&endpoint);
        let ctx = RequestContext::anonymous();

        let stored = provider
            .put_file(&ctx, Bytes::from_static(b"hello world"), "docs\\notes.txt")
            .await
            .unwrap();

        assert_eq!(stored.key, "docs/notes.txt");
        assert_eq!(stored.size, 11);
        assert_eq!(stored.filename, "notes.txt");
        assert_eq!(stored.mime_type.as_deref(), Some("text/plain"));
        let url = stored.url.expect("presigned url");
        assert!(
            url.starts_with(&format!("{}/gauzy/docs/notes.txt?", endpoint)),
            "{}",
            url
        );

        let objects = store.objects.lock().unwrap();
        let object = &objects["docs/notes.txt"];
        assert_eq!(object.bucket, "gauzy");
        assert_eq!(object.content_disposition.as_deref(), Some("inline; notes.txt"));
    }

    #[tokio::test]
    async fn engine_uploads_field_and_maps_descriptor() {
        let (endpoint, store) = endpoint::spawn().await;
        let provider = local_endpoint_provider(&endpoint);
        let ctx = RequestContext::new(Some("tenant-7".into()));

        let mut config = StorageConfig::new("s3");
        config.merge(StorageConfigPatch::default().dest("avatars").prefix("user"), "s3");
        let engine = provider.handler(&ctx, &config);

        let files = accept_files(
            engine.as_ref(),
            multipart(&[("file", Some("photo.png"), "PNGDATA")]),
            "file",
        )
        .await
        .unwrap();

        assert_eq!(files.len(), 1);
        let file = &files[0];
        assert!(file.key.starts_with("tenant-7/avatars/gauzy-user-"), "{}", file.key);
        assert!(file.key.ends_with(".png"));
        assert_eq!(file.path, file.key);
        assert_eq!(file.size, 7);
        assert_eq!(file.filename, "photo.png");
        let url = file.url.as_deref().expect("presigned url");
        assert!(url.contains(&file.key), "{}", url);
        assert!(url.contains("X-Amz-Signature"), "{}", url);

        let objects = store.objects.lock().unwrap();
        let object = &objects[&file.key];
        assert_eq!(object.size, 7);
        assert_eq!(
            object.content_disposition.as_deref(),
            Some(format!("inline; {}", basename(&file.key)).as_str())
        );
    }

    #[tokio::test]
    async fn large_fields_are_streamed_as_multipart_uploads() {
        let (endpoint, store) = endpoint::spawn().await;
        let provider = local_endpoint_provider(&endpoint);
        let ctx = RequestContext::new(Some("tenant-7".into()));

        let mut config = StorageConfig::new("s3");
        config.merge(
            StorageConfigPatch::default()
                .dest("exports")
                .filename(FileName::Fixed("dump.csv".into())),
            "s3",
        );
        let engine = provider.handler(&ctx, &config);

        let content = "x".repeat(MULTIPART_PART_SIZE * 2 + 10);
        let files = accept_files(
            engine.as_ref(),
            multipart(&[("file", Some("dump.csv"), content.as_str())]),
            "file",
        )
        .await
        .unwrap();

        let file = &files[0];
        assert_eq!(file.key, "tenant-7/exports/dump.csv");
        assert_eq!(file.size, content.len() as u64);

        let objects = store.objects.lock().unwrap();
        let object = &objects["tenant-7/exports/dump.csv"];
        assert_eq!(object.parts, 3);
        assert_eq!(object.size, content.len());
        assert_eq!(object.content_disposition.as_deref(), Some("inline; dump.csv"));
    }
}
