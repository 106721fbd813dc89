//! Wire types for the RESO Web API.

use serde::Deserialize;
use serde_json::Value;

/// OAuth2 token endpoint response.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,
    #[serde(default)]
    pub token_type: Option<String>,
}

fn default_expires_in() -> i64 {
    3600
}

/// OData collection envelope: `{"value": [...]}`.
#[derive(Debug, Deserialize)]
pub struct ODataCollection {
    #[serde(default)]
    pub value: Vec<Value>,
}

/// OData error envelope, best-effort parsed from non-2xx bodies.
#[derive(Debug, Deserialize)]
pub struct ODataErrorResponse {
    pub error: ODataErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct ODataErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}
