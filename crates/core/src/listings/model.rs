//! Canonical listing and media models.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Closed set of canonical listing statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    Active,
    Pending,
    Sold,
    Withdrawn,
}

impl ListingStatus {
    /// Map a vendor status string into the closed set.
    ///
    /// Unmapped values deliberately resolve to `Active` rather than failing;
    /// providers add statuses without notice.
    pub fn from_vendor(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => Self::Active,
            "active under contract"
            | "activeundercontract"
            | "pending"
            | "coming soon"
            | "comingsoon"
            | "contingent" => Self::Pending,
            "closed" | "sold" => Self::Sold,
            "canceled" | "cancelled" | "withdrawn" | "expired" | "delete" => Self::Withdrawn,
            _ => Self::Active,
        }
    }
}

/// Closed set of canonical property types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    Residential,
    Condo,
    Townhouse,
    Land,
    Commercial,
    MultiFamily,
}

impl PropertyType {
    /// Map a vendor property-type string into the closed set.
    ///
    /// Unmapped values resolve to `Residential`.
    pub fn from_vendor(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "residential" | "single family" | "singlefamilyresidence" | "single family residence" => {
                Self::Residential
            }
            "condominium" | "condo" => Self::Condo,
            "townhouse" | "attached" => Self::Townhouse,
            "land" | "lots and land" | "vacantland" | "vacant land" => Self::Land,
            "commercial" | "commercialsale" | "commercial sale" => Self::Commercial,
            "multifamily" | "multi-family" | "multi family" | "duplex" | "triplex"
            | "quadruplex" => Self::MultiFamily,
            _ => Self::Residential,
        }
    }
}

/// Canonical media record attached to a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalMedia {
    pub url: String,
    pub caption: String,
    pub order: i64,
    pub media_type: String,
}

/// Canonical, vendor-independent listing record.
///
/// Unique per (tenant, external listing id); uniqueness is enforced by the
/// repository collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalListing {
    pub external_id: String,
    pub status: ListingStatus,
    pub property_type: PropertyType,
    pub street_address: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub full_address: String,
    pub price: Option<Decimal>,
    pub bedrooms: Option<i64>,
    pub bathrooms: Option<f64>,
    pub square_feet: Option<i64>,
    pub features: Vec<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Listing-contract date, when the vendor supplied a parsable one.
    pub listed_at: Option<NaiveDate>,
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub media: Vec<CanonicalMedia>,
    /// Original vendor payload, retained verbatim for forward compatibility.
    pub raw: serde_json::Value,
}
