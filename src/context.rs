use std::{collections::HashMap, convert::Infallible};

use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::warn;
use uuid::Uuid;

use crate::{database::load_tenant_settings, state::AppState, utils::trimmed};

/// Header carrying the caller's tenant.
pub const TENANT_HEADER: &str = "tenant-id";

/// Tenant-scoped key/value settings (`tenant_setting` rows).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TenantSettings(HashMap<String, String>);

impl TenantSettings {
    /// Trimmed value for `key`; blank values count as unset.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| trimmed(v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TenantSettings {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Request-scoped facts storage providers may depend on.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub id: Uuid,
    pub tenant_id: Option<String>,
    pub tenant_settings: TenantSettings,
}

impl RequestContext {
    pub fn new(tenant_id: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            tenant_settings: TenantSettings::default(),
        }
    }

    /// Context outside any tenant, e.g. background jobs.
    pub fn anonymous() -> Self {
        Self::new(None)
    }

    pub fn with_settings(mut self, settings: TenantSettings) -> Self {
        self.tenant_settings = settings;
        self
    }

    /// Tenant id for key/path namespacing, empty when there is none.
    pub fn tenant_key(&self) -> &str {
        self.tenant_id.as_deref().unwrap_or_default()
    }
}

impl FromRequestParts<AppState> for RequestContext {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let tenant_id = parts
            .headers
            .get(TENANT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(trimmed)
            .map(str::to_string);

        let mut ctx = RequestContext::new(tenant_id);

        if let (Some(pool), Some(tenant_id)) = (&state.pool, ctx.tenant_id.as_deref()) {
            match load_tenant_settings(pool, tenant_id).await {
                Ok(settings) => ctx.tenant_settings = settings,
                Err(e) => {
                    // Falls back to the deployment defaults.
                    warn!(tenant = %tenant_id, "Failed to load tenant settings: {}", e);
                }
            }
        }

        Ok(ctx)
    }
}
