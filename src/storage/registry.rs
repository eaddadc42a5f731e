//! Provider registry and the `FileStorage` facade consumers go through.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::debug;

use super::{
    FileProvider, LocalProvider, ProviderKind, S3Flavor, S3Provider, StorageConfig,
    StorageConfigPatch, StorageError, StorageSettings, upload::UploadEngine,
};
use crate::context::RequestContext;

/// One lazily built instance per provider kind, shared for the life of the
/// registry. Built once at startup and handed to whoever needs storage.
pub struct ProviderRegistry {
    settings: StorageSettings,
    local: OnceCell<Arc<LocalProvider>>,
    s3: OnceCell<Arc<S3Provider>>,
    wasabi: OnceCell<Arc<S3Provider>>,
    digitalocean: OnceCell<Arc<S3Provider>>,
}

impl ProviderRegistry {
    pub fn new(settings: StorageSettings) -> Self {
        Self {
            settings,
            local: OnceCell::new(),
            s3: OnceCell::new(),
            wasabi: OnceCell::new(),
            digitalocean: OnceCell::new(),
        }
    }

    pub fn settings(&self) -> &StorageSettings {
        &self.settings
    }

    pub fn default_provider(&self) -> &str {
        &self.settings.default_provider
    }

    /// The instance for `kind`, built on first use.
    pub fn instance(&self, kind: ProviderKind) -> Arc<dyn FileProvider> {
        match kind {
            ProviderKind::Local => {
                let local = self
                    .local
                    .get_or_init(|| Arc::new(LocalProvider::new(&self.settings.local)));
                Arc::clone(local) as Arc<dyn FileProvider>
            }
            ProviderKind::S3 => self.object_store(&self.s3, S3Flavor::Aws),
            ProviderKind::Wasabi => self.object_store(&self.wasabi, S3Flavor::Wasabi),
            ProviderKind::DigitalOcean => {
                self.object_store(&self.digitalocean, S3Flavor::DigitalOcean)
            }
        }
    }

    /// Instance registered under `name`.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn FileProvider>, StorageError> {
        let kind: ProviderKind = name.parse()?;
        Ok(self.instance(kind))
    }

    /// Makes sure every known provider has its instance. Idempotent.
    pub fn register_all(&self) {
        for kind in ProviderKind::ALL {
            self.instance(kind);
        }
    }

    fn object_store(&self, cell: &OnceCell<Arc<S3Provider>>, flavor: S3Flavor) -> Arc<dyn FileProvider> {
        let provider = cell.get_or_init(|| {
            let defaults = match flavor {
                S3Flavor::Aws => &self.settings.s3,
                S3Flavor::Wasabi => &self.settings.wasabi,
                S3Flavor::DigitalOcean => &self.settings.digitalocean,
            };
            Arc::new(S3Provider::new(
                flavor,
                defaults.clone(),
                self.settings.object_prefix.clone(),
            ))
        });
        Arc::clone(provider) as Arc<dyn FileProvider>
    }
}

/// Entry point for storage access: holds the upload configuration and
/// dispatches to the selected provider.
#[derive(Clone)]
pub struct FileStorage {
    registry: Arc<ProviderRegistry>,
    config: StorageConfig,
}

impl FileStorage {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        registry.register_all();
        let config = StorageConfig::new(registry.default_provider());
        Self { registry, config }
    }

    pub fn with_config(registry: Arc<ProviderRegistry>, patch: StorageConfigPatch) -> Self {
        let mut storage = Self::new(registry);
        storage.set_config(patch);
        storage
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Merges `patch` over the current configuration; without an explicit
    /// provider the deployment default is selected.
    pub fn set_config(&mut self, patch: StorageConfigPatch) -> &mut Self {
        let default_provider = self.registry.default_provider().to_string();
        self.config.merge(patch, &default_provider);
        self
    }

    /// Selects a provider; `None` or a blank name keeps the current one.
    pub fn set_provider(&mut self, name: Option<&str>) -> &mut Self {
        if let Some(name) = name.filter(|n| !n.trim().is_empty()) {
            self.config.provider = name.to_string();
        }
        self
    }

    pub fn get_provider(&mut self, name: Option<&str>) -> Result<Arc<dyn FileProvider>, StorageError> {
        self.set_provider(name);
        self.registry.resolve(&self.config.provider)
    }

    /// Upload engine of the selected provider, built for this request.
    pub fn storage(
        &mut self,
        ctx: &RequestContext,
        patch: Option<StorageConfigPatch>,
    ) -> Result<Box<dyn UploadEngine>, StorageError> {
        if let Some(patch) = patch {
            self.set_config(patch);
        }
        let provider = self.registry.resolve(&self.config.provider)?;
        debug!(provider = %provider.kind(), "Building upload engine");
        Ok(provider.handler(ctx, &self.config))
    }
}
