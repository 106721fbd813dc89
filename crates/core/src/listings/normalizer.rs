//! Pure normalization of vendor resource records into canonical form.
//!
//! Both entry points are total over any input, including an empty record:
//! missing or malformed vendor fields degrade to documented defaults, never
//! to an error.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

use super::{CanonicalListing, CanonicalMedia, ListingStatus, PropertyType};

/// Normalize one vendor listing record into a [`CanonicalListing`].
///
/// The external id is taken from `ListingKey`, falling back to `ListingId`.
/// The full raw vendor record is retained unmodified on the result.
pub fn normalize_listing(vendor: &Value) -> CanonicalListing {
    let external_id = string_field(vendor, "ListingKey")
        .or_else(|| string_field(vendor, "ListingId"))
        .unwrap_or_default();

    let status = string_field(vendor, "StandardStatus")
        .or_else(|| string_field(vendor, "MlsStatus"))
        .map(|s| ListingStatus::from_vendor(&s))
        .unwrap_or(ListingStatus::Active);

    let property_type = string_field(vendor, "PropertyType")
        .map(|s| PropertyType::from_vendor(&s))
        .unwrap_or(PropertyType::Residential);

    let street_address = join_nonempty(
        &[
            string_field(vendor, "StreetNumber"),
            string_field(vendor, "StreetDirPrefix"),
            string_field(vendor, "StreetName"),
            string_field(vendor, "StreetSuffix"),
            string_field(vendor, "UnitNumber"),
        ],
        " ",
    );

    let city = string_field(vendor, "City").unwrap_or_default();
    let state = string_field(vendor, "StateOrProvince").unwrap_or_default();
    let postal_code = string_field(vendor, "PostalCode").unwrap_or_default();

    let state_zip = join_nonempty(&[Some(state.clone()), Some(postal_code.clone())], " ");
    let full_address = join_nonempty(
        &[
            Some(street_address.clone()),
            Some(city.clone()),
            Some(state_zip),
        ],
        ", ",
    );

    CanonicalListing {
        external_id,
        status,
        property_type,
        street_address,
        city,
        state,
        postal_code,
        full_address,
        price: decimal_field(vendor, "ListPrice"),
        bedrooms: i64_field(vendor, "BedroomsTotal"),
        bathrooms: f64_field(vendor, "BathroomsTotalDecimal")
            .or_else(|| f64_field(vendor, "BathroomsTotalInteger")),
        square_feet: i64_field(vendor, "LivingArea"),
        features: build_features(vendor),
        latitude: f64_field(vendor, "Latitude"),
        longitude: f64_field(vendor, "Longitude"),
        listed_at: parse_contract_date(vendor),
        modified_at: parse_modification_timestamp(vendor),
        media: Vec::new(),
        raw: vendor.clone(),
    }
}

/// Normalize one vendor media record into a [`CanonicalMedia`].
pub fn normalize_media(vendor: &Value) -> CanonicalMedia {
    CanonicalMedia {
        url: string_field(vendor, "MediaURL").unwrap_or_default(),
        caption: string_field(vendor, "ShortDescription")
            .or_else(|| string_field(vendor, "MediaCaption"))
            .unwrap_or_default(),
        order: i64_field(vendor, "Order").unwrap_or(0),
        media_type: string_field(vendor, "MediaCategory").unwrap_or_else(|| "Photo".to_string()),
    }
}

/// Feature list, in deterministic order: pool, waterfront, view,
/// appliances, garage.
fn build_features(vendor: &Value) -> Vec<String> {
    let mut features = Vec::new();

    if bool_field(vendor, "PoolPrivateYN").unwrap_or(false) {
        features.push("Pool".to_string());
    }
    if bool_field(vendor, "WaterfrontYN").unwrap_or(false) {
        features.push("Waterfront".to_string());
    }

    // View arrives as a single string from some vendors and a list from others.
    match field(vendor, "View") {
        Some(Value::String(view)) => {
            let view = view.trim();
            if !view.is_empty() {
                features.push(view.to_string());
            }
        }
        Some(Value::Array(items)) => {
            features.extend(
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(str::to_string),
            );
        }
        _ => {}
    }

    if let Some(Value::Array(items)) = field(vendor, "Appliances") {
        features.extend(
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string),
        );
    }

    if let Some(garage) = f64_field(vendor, "GarageSpaces") {
        if garage > 0.0 {
            features.push(format!("{}-Car Garage", garage as i64));
        }
    }

    features
}

/// Parse the listing-contract date from the first 10 characters of the
/// vendor timestamp string. Unparsable input yields `None`.
fn parse_contract_date(vendor: &Value) -> Option<NaiveDate> {
    let raw = string_field(vendor, "ListingContractDate")?;
    let prefix: String = raw.chars().take(10).collect();
    NaiveDate::parse_from_str(&prefix, "%Y-%m-%d").ok()
}

fn parse_modification_timestamp(vendor: &Value) -> Option<DateTime<Utc>> {
    let raw = string_field(vendor, "ModificationTimestamp")?;
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    // Some feeds omit the zone designator; treat those as UTC.
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
}

fn field<'a>(record: &'a Value, key: &str) -> Option<&'a Value> {
    record.get(key).filter(|v| !v.is_null())
}

fn string_field(record: &Value, key: &str) -> Option<String> {
    match field(record, key)? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn f64_field(record: &Value, key: &str) -> Option<f64> {
    match field(record, key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn i64_field(record: &Value, key: &str) -> Option<i64> {
    match field(record, key)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let trimmed = s.trim();
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().map(|f| f as i64))
        }
        _ => None,
    }
}

fn bool_field(record: &Value, key: &str) -> Option<bool> {
    match field(record, key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "1" => Some(true),
            "false" | "no" | "n" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn decimal_field(record: &Value, key: &str) -> Option<Decimal> {
    match field(record, key)? {
        Value::Number(n) => {
            if let Some(int) = n.as_i64() {
                return Some(Decimal::from(int));
            }
            n.as_f64().and_then(|f| Decimal::try_from(f).ok())
        }
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

fn join_nonempty(parts: &[Option<String>], separator: &str) -> String {
    parts
        .iter()
        .filter_map(|p| p.as_deref())
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(separator)
}
