//! Sync engine, run statistics, and protocol contracts.

mod engine;

pub use engine::*;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::connections::{Connection, Credentials};
use crate::errors::Result;

/// Default number of records requested per page.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Ephemeral counters for one connection run. Returned to the caller,
/// never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRunStats {
    pub created: usize,
    pub updated: usize,
    pub errors: usize,
    pub total: usize,
}

/// Per-connection result of a tenant-level sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSyncOutcome {
    pub connection_id: String,
    pub stats: SyncRunStats,
    pub error: Option<String>,
}

/// One provider-facing query client.
///
/// Instances are run-local: token and pagination state are not safe to
/// share across concurrent runs, so each run constructs its own client
/// through [`ProtocolClientFactory`].
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    /// Re-authenticate only when no token exists or the recorded expiry has
    /// passed.
    async fn ensure_valid_token(&self) -> Result<()>;

    /// Fetch one page of vendor listing records. A page of exactly
    /// `page_size` records implies more pages may exist; fewer implies the
    /// last page.
    async fn query_listings(
        &self,
        filter: Option<&str>,
        page_size: usize,
        offset: usize,
    ) -> Result<Vec<Value>>;

    /// Fetch the media records attached to one listing. The id is validated
    /// against a restrictive allow-list before any network call.
    async fn query_media(&self, external_id: &str) -> Result<Vec<Value>>;
}

/// Builds one fresh [`ProtocolClient`] per run from a connection and its
/// decrypted credentials.
#[async_trait]
pub trait ProtocolClientFactory: Send + Sync {
    async fn build(
        &self,
        connection: &Connection,
        credentials: &Credentials,
    ) -> Result<Box<dyn ProtocolClient>>;
}

/// Persists the advanced watermark and last-sync instant on the connection
/// record at run end.
#[async_trait]
pub trait WatermarkStoreTrait: Send + Sync {
    async fn commit(
        &self,
        connection_id: &str,
        watermark: Option<DateTime<Utc>>,
        last_synced_at: DateTime<Utc>,
    ) -> Result<()>;
}

/// Fire-and-forget notification of newly created listings. Failures are
/// logged by the engine and never abort a run.
#[async_trait]
pub trait NotificationDispatcherTrait: Send + Sync {
    async fn listings_created(&self, tenant_id: &str, listing_ids: &[String]) -> Result<()>;
}
