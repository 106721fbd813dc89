//! RESO Web API protocol client for homestream.
//!
//! Hides per-provider authentication and query differences behind the
//! core's [`homestream_core::sync::ProtocolClient`] contract: OAuth2
//! client-credentials or static server-token auth, OData filter/offset
//! pagination, and per-listing media queries.

mod client;
mod error;
mod types;

pub use client::{ResoClient, ResoClientFactory};
pub use error::{backoff_seconds, ApiRetryClass, ResoError, Result};
pub use types::*;
