//! Incremental, resumable sync orchestration per tenant connection.
//!
//! A run proceeds strictly sequentially: page by page, record by record.
//! Per-record failures are caught, logged, and counted; engine-level
//! failures (authentication, transport, a failed page request) abort the
//! remainder of the run and propagate to the caller.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, error, info, warn};
use serde_json::Value;
use uuid::Uuid;

use crate::connections::{Connection, ConnectionRepositoryTrait, CredentialProviderTrait};
use crate::errors::{Error, Result};
use crate::listings::{normalize_listing, normalize_media, ListingRepositoryTrait};

use super::{
    ConnectionSyncOutcome, NotificationDispatcherTrait, ProtocolClient, ProtocolClientFactory,
    SyncRunStats, WatermarkStoreTrait, DEFAULT_PAGE_SIZE,
};

/// Orchestrates incremental sync runs across a tenant's MLS connections.
pub struct SyncEngine {
    credentials: Arc<dyn CredentialProviderTrait>,
    connections: Arc<dyn ConnectionRepositoryTrait>,
    listings: Arc<dyn ListingRepositoryTrait>,
    watermarks: Arc<dyn WatermarkStoreTrait>,
    notifications: Arc<dyn NotificationDispatcherTrait>,
    clients: Arc<dyn ProtocolClientFactory>,
    page_size: usize,
}

struct RecordOutcome {
    external_id: String,
    is_new: bool,
    modified_at: Option<DateTime<Utc>>,
}

impl SyncEngine {
    pub fn new(
        credentials: Arc<dyn CredentialProviderTrait>,
        connections: Arc<dyn ConnectionRepositoryTrait>,
        listings: Arc<dyn ListingRepositoryTrait>,
        watermarks: Arc<dyn WatermarkStoreTrait>,
        notifications: Arc<dyn NotificationDispatcherTrait>,
        clients: Arc<dyn ProtocolClientFactory>,
    ) -> Self {
        Self {
            credentials,
            connections,
            listings,
            watermarks,
            notifications,
            clients,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Run one incremental sync for a connection and return its stats.
    pub async fn sync_connection(&self, connection: &Connection) -> Result<SyncRunStats> {
        let run_id = Uuid::new_v4();
        debug!(
            "sync run {}: starting for connection {} (tenant {})",
            run_id, connection.id, connection.tenant_id
        );

        let credentials = self.credentials.decrypt(connection).await?;
        let client = self.clients.build(connection, &credentials).await?;
        client.ensure_valid_token().await?;

        let filter = connection.watermark.map(incremental_filter);
        if filter.is_none() {
            debug!("sync run {}: no watermark, performing full sync", run_id);
        }

        let mut stats = SyncRunStats::default();
        let mut max_modified: Option<DateTime<Utc>> = None;
        let mut created_ids: Vec<String> = Vec::new();
        let mut offset = 0usize;

        loop {
            let page = client
                .query_listings(filter.as_deref(), self.page_size, offset)
                .await?;
            let page_len = page.len();
            debug!(
                "sync run {}: page at offset {} returned {} records",
                run_id, offset, page_len
            );

            for record in &page {
                stats.total += 1;
                match self.process_record(client.as_ref(), connection, record).await {
                    Ok(outcome) => {
                        if outcome.is_new {
                            stats.created += 1;
                            created_ids.push(outcome.external_id);
                        } else {
                            stats.updated += 1;
                        }
                        // Track the maximum, not the last seen, so
                        // intra-page ordering cannot regress the watermark.
                        if let Some(ts) = outcome.modified_at {
                            max_modified = Some(max_modified.map_or(ts, |m| m.max(ts)));
                        }
                    }
                    Err(err) => {
                        stats.errors += 1;
                        warn!(
                            "sync run {}: record {} failed: {}",
                            run_id,
                            record_key(record),
                            err
                        );
                    }
                }
            }

            if page_len < self.page_size {
                break;
            }
            offset += page_len;
        }

        // A successful run never regresses the stored watermark; last-sync
        // is updated unconditionally, even for a zero-record run.
        let next_watermark = match (max_modified, connection.watermark) {
            (Some(seen), Some(stored)) => Some(seen.max(stored)),
            (Some(seen), None) => Some(seen),
            (None, stored) => stored,
        };
        self.watermarks
            .commit(&connection.id, next_watermark, Utc::now())
            .await?;

        if !created_ids.is_empty() {
            if let Err(err) = self
                .notifications
                .listings_created(&connection.tenant_id, &created_ids)
                .await
            {
                warn!(
                    "sync run {}: created-listings notification failed: {}",
                    run_id, err
                );
            }
        }

        info!(
            "sync run {}: connection {} done: created={} updated={} errors={} total={}",
            run_id, connection.id, stats.created, stats.updated, stats.errors, stats.total
        );
        Ok(stats)
    }

    /// Sync every sync-enabled connection of a tenant, sequentially.
    ///
    /// A connection-level failure is caught and recorded on its outcome; it
    /// does not prevent remaining connections from running.
    pub async fn sync_tenant(&self, tenant_id: &str) -> Result<Vec<ConnectionSyncOutcome>> {
        let connections = self.connections.list_sync_enabled(tenant_id).await?;
        info!(
            "syncing {} connections for tenant {}",
            connections.len(),
            tenant_id
        );

        let mut outcomes = Vec::with_capacity(connections.len());
        for connection in &connections {
            match self.sync_connection(connection).await {
                Ok(stats) => outcomes.push(ConnectionSyncOutcome {
                    connection_id: connection.id.clone(),
                    stats,
                    error: None,
                }),
                Err(err) => {
                    error!("connection {} sync failed: {}", connection.id, err);
                    outcomes.push(ConnectionSyncOutcome {
                        connection_id: connection.id.clone(),
                        stats: SyncRunStats::default(),
                        error: Some(err.to_string()),
                    });
                }
            }
        }
        Ok(outcomes)
    }

    async fn process_record(
        &self,
        client: &dyn ProtocolClient,
        connection: &Connection,
        record: &Value,
    ) -> Result<RecordOutcome> {
        let mut listing = normalize_listing(record);
        if listing.external_id.is_empty() {
            return Err(Error::validation("vendor record exposes no listing key"));
        }

        let media = client.query_media(&listing.external_id).await?;
        listing.media = media.iter().map(normalize_media).collect();

        let external_id = listing.external_id.clone();
        let modified_at = listing.modified_at;
        let (_stored, is_new) = self
            .listings
            .upsert(&connection.tenant_id, &connection.id, listing)
            .await?;

        Ok(RecordOutcome {
            external_id,
            is_new,
            modified_at,
        })
    }
}

/// Incremental-sync predicate seeded from the stored watermark.
fn incremental_filter(watermark: DateTime<Utc>) -> String {
    format!(
        "ModificationTimestamp gt {}",
        watermark.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

/// Natural key of a vendor record, for log lines only.
fn record_key(record: &Value) -> &str {
    record
        .get("ListingKey")
        .and_then(Value::as_str)
        .or_else(|| record.get("ListingId").and_then(Value::as_str))
        .unwrap_or("<no key>")
}
