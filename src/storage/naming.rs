//! Upload configuration and the filename policy shared by all providers.

use std::{fmt, sync::Arc};

use chrono::Utc;
use rand::Rng;

use super::upload::IncomingFile;

pub type DestinationFn = Arc<dyn Fn(&IncomingFile) -> String + Send + Sync>;
pub type FilenameFn = Arc<dyn Fn(&IncomingFile, &str) -> String + Send + Sync>;

/// Prefix used for synthesized filenames when none is configured.
pub const DEFAULT_PREFIX: &str = "file";

/// Where an uploaded file lands, relative to the provider root and tenant.
#[derive(Clone)]
pub enum Destination {
    Path(String),
    Resolver(DestinationFn),
}

impl Destination {
    pub fn resolver<F>(f: F) -> Self
    where
        F: Fn(&IncomingFile) -> String + Send + Sync + 'static,
    {
        Destination::Resolver(Arc::new(f))
    }

    pub fn resolve(&self, file: &IncomingFile) -> String {
        match self {
            Destination::Path(path) => path.clone(),
            Destination::Resolver(f) => f(file),
        }
    }
}

impl Default for Destination {
    fn default() -> Self {
        Destination::Path(String::new())
    }
}

impl From<&str> for Destination {
    fn from(path: &str) -> Self {
        Destination::Path(path.to_string())
    }
}

impl From<String> for Destination {
    fn from(path: String) -> Self {
        Destination::Path(path)
    }
}

impl fmt::Debug for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Destination::Resolver(_) => f.write_str("Resolver(..)"),
        }
    }
}

/// Explicit name for an uploaded file, or a function computing one
/// from the file and its extension.
#[derive(Clone)]
pub enum FileName {
    Fixed(String),
    Resolver(FilenameFn),
}

impl FileName {
    pub fn resolver<F>(f: F) -> Self
    where
        F: Fn(&IncomingFile, &str) -> String + Send + Sync + 'static,
    {
        FileName::Resolver(Arc::new(f))
    }
}

impl fmt::Debug for FileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileName::Fixed(name) => f.debug_tuple("Fixed").field(name).finish(),
            FileName::Resolver(_) => f.write_str("Resolver(..)"),
        }
    }
}

/// Per-request upload configuration.
///
/// `provider` always holds a non-empty name; it is validated only when a
/// provider is actually looked up.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub dest: Destination,
    pub provider: String,
    pub prefix: String,
    pub filename: Option<FileName>,
}

impl StorageConfig {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            dest: Destination::default(),
            provider: provider.into(),
            prefix: DEFAULT_PREFIX.to_string(),
            filename: None,
        }
    }

    /// Merges `patch` over this configuration. A patch without a provider
    /// selects `default_provider`.
    pub fn merge(&mut self, patch: StorageConfigPatch, default_provider: &str) {
        if let Some(dest) = patch.dest {
            self.dest = dest;
        }
        if let Some(prefix) = patch.prefix {
            self.prefix = prefix;
        }
        if let Some(filename) = patch.filename {
            self.filename = Some(filename);
        }
        self.provider = patch
            .provider
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| default_provider.to_string());
    }

    /// Name for an uploaded file: the explicit name, the resolver's result,
    /// or `<prefix>-<unix seconds>-<0..999>.<ext>` (with `object_prefix-`
    /// in front when given).
    pub fn resolve_filename(&self, file: &IncomingFile, object_prefix: Option<&str>) -> String {
        let extension = file.extension().unwrap_or_default();
        match &self.filename {
            Some(FileName::Fixed(name)) => name.clone(),
            Some(FileName::Resolver(f)) => f(file, &extension),
            None => {
                let prefix = match object_prefix {
                    Some(object_prefix) => format!("{}-{}", object_prefix, self.prefix),
                    None => self.prefix.clone(),
                };
                synthesize_filename(&prefix, &extension)
            }
        }
    }
}

/// Partial configuration; `None` fields keep the current value.
#[derive(Debug, Clone, Default)]
pub struct StorageConfigPatch {
    pub dest: Option<Destination>,
    pub provider: Option<String>,
    pub prefix: Option<String>,
    pub filename: Option<FileName>,
}

impl StorageConfigPatch {
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn dest(mut self, dest: impl Into<Destination>) -> Self {
        self.dest = Some(dest.into());
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn filename(mut self, filename: FileName) -> Self {
        self.filename = Some(filename);
        self
    }
}

/// `<prefix>-<unix seconds>-<random 0..999>[.<ext>]`
///
/// Uniqueness is probabilistic; same-second uploads can collide.
pub fn synthesize_filename(prefix: &str, extension: &str) -> String {
    let timestamp = Utc::now().timestamp();
    let suffix: u32 = rand::rng().random_range(0..1000);
    if extension.is_empty() {
        format!("{}-{}-{}", prefix, timestamp, suffix)
    } else {
        format!("{}-{}-{}.{}", prefix, timestamp, suffix, extension)
    }
}
