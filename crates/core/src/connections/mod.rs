//! Tenant MLS connections and credential contracts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// Supported provider families.
///
/// Per-provider behavioral branching (auth style, query path construction)
/// is selected once at client construction from this closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderFamily {
    /// RESO Web API providers authenticating via the OAuth2
    /// client-credentials grant.
    Reso,
    /// Bridge-style providers issuing a static pre-shared server token.
    Bridge,
}

/// Tenant-scoped MLS connection record.
///
/// Created by a tenant admin, mutated by the UI (credential rotation) and by
/// the sync engine (watermark/last-sync after each run).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: String,
    pub tenant_id: String,
    pub provider: ProviderFamily,
    pub base_url: String,
    /// Opaque encrypted credential pair. Decryption happens behind
    /// [`CredentialProviderTrait`].
    pub encrypted_credentials: String,
    pub sync_enabled: bool,
    /// Highest modification timestamp observed by a completed run.
    /// Never regressed by a successful run.
    pub watermark: Option<DateTime<Utc>>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// Decrypted credentials for one connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Credentials {
    /// Client id/secret pair for the OAuth2 client-credentials grant.
    OauthClient {
        client_id: String,
        client_secret: String,
    },
    /// Static pre-issued server token.
    ServerToken { token: String },
}

/// Decrypts the credential pair stored on a connection record.
#[async_trait]
pub trait CredentialProviderTrait: Send + Sync {
    async fn decrypt(&self, connection: &Connection) -> Result<Credentials>;
}

/// Read access to the tenant's connection records.
#[async_trait]
pub trait ConnectionRepositoryTrait: Send + Sync {
    /// Load all sync-enabled connections for a tenant.
    async fn list_sync_enabled(&self, tenant_id: &str) -> Result<Vec<Connection>>;
}
