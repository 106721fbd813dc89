//! Canonical listing domain: models, vendor normalization, and the
//! repository contract.

mod model;
mod normalizer;

pub use model::*;
pub use normalizer::*;

use async_trait::async_trait;

use crate::errors::Result;

/// Persistence contract for canonical listings.
#[async_trait]
pub trait ListingRepositoryTrait: Send + Sync {
    /// Upsert a listing scoped to (tenant, connection). Returns the stored
    /// record and whether it was newly created.
    ///
    /// Implementations must be idempotent on (tenant, external listing id),
    /// and incoming `None` fields must leave existing stored values
    /// unchanged rather than overwriting them.
    async fn upsert(
        &self,
        tenant_id: &str,
        connection_id: &str,
        listing: CanonicalListing,
    ) -> Result<(CanonicalListing, bool)>;
}
