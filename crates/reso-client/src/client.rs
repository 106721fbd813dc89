//! RESO Web API client: token lifecycle and paginated OData queries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::RwLock;

use homestream_core::connections::{Connection, Credentials, ProviderFamily};
use homestream_core::sync::{ProtocolClient, ProtocolClientFactory};

use crate::error::{ResoError, Result};
use crate::types::{ODataCollection, ODataErrorResponse, TokenResponse};

/// Default timeout for provider requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_LOG_BODY_CHARS: usize = 512;
/// Tokens are refreshed this many seconds before their recorded expiry.
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone)]
struct BearerToken {
    token: String,
    /// `None` for static server tokens, which never expire.
    expires_at: Option<DateTime<Utc>>,
}

impl BearerToken {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(at) => now >= at,
            None => false,
        }
    }
}

/// Client for one MLS provider connection.
///
/// Instances are run-local: token state lives on the instance, so a client
/// must not be shared across concurrent runs of the same connection.
pub struct ResoClient {
    client: reqwest::Client,
    base_url: String,
    provider: ProviderFamily,
    credentials: Credentials,
    select: Option<String>,
    token: RwLock<Option<BearerToken>>,
}

impl ResoClient {
    /// Create a client for one connection.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The provider's OData endpoint root
    ///   (e.g., "https://api.mlsgrid.example/v2")
    pub fn new(base_url: &str, provider: ProviderFamily, credentials: Credentials) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            provider,
            credentials,
            select: None,
            token: RwLock::new(None),
        }
    }

    /// Restrict listing queries to the named fields via `$select`.
    pub fn with_select(mut self, fields: &[&str]) -> Self {
        if !fields.is_empty() {
            self.select = Some(fields.join(","));
        }
        self
    }

    /// Double embedded quote characters per the OData literal-escaping rule.
    pub fn escape_literal(value: &str) -> String {
        value.replace('\'', "''")
    }

    /// Restrictive allow-list for ids interpolated into query predicates:
    /// alphanumeric, hyphen, underscore.
    pub fn is_safe_external_id(value: &str) -> bool {
        !value.is_empty()
            && value
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    }

    fn log_response(status: reqwest::StatusCode, body: &str) {
        if status.is_success() {
            debug!("provider response status: {}", status);
            return;
        }

        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        debug!("provider response error ({}): {}", status, preview);
    }

    /// Exchange the connection's credentials for a bearer token and record
    /// its expiry instant.
    ///
    /// `Reso` providers use the OAuth2 client-credentials grant against the
    /// provider token endpoint; `Bridge` providers carry a static pre-issued
    /// server token and make no network call here. Rejection yields an
    /// authentication error; the client never retries internally.
    pub async fn authenticate(&self) -> Result<()> {
        let token = match (self.provider, &self.credentials) {
            (ProviderFamily::Bridge, Credentials::ServerToken { token }) => BearerToken {
                token: token.clone(),
                expires_at: None,
            },
            (
                ProviderFamily::Reso,
                Credentials::OauthClient {
                    client_id,
                    client_secret,
                },
            ) => {
                let url = format!("{}/oauth2/token", self.base_url);
                let params = [
                    ("grant_type", "client_credentials"),
                    ("client_id", client_id.as_str()),
                    ("client_secret", client_secret.as_str()),
                ];

                let response = self.client.post(&url).form(&params).send().await?;
                let status = response.status();
                let body = response.text().await?;
                Self::log_response(status, &body);

                if !status.is_success() {
                    return Err(ResoError::authentication(format!(
                        "token endpoint returned HTTP {}: {}",
                        status.as_u16(),
                        extract_error_message(&body)
                    )));
                }

                let parsed: TokenResponse = serde_json::from_str(&body)?;
                let lifetime = (parsed.expires_in - TOKEN_EXPIRY_MARGIN_SECS).max(0);
                BearerToken {
                    token: parsed.access_token,
                    expires_at: Some(Utc::now() + chrono::Duration::seconds(lifetime)),
                }
            }
            _ => {
                return Err(ResoError::authentication(
                    "credentials do not match the connection's provider family",
                ))
            }
        };

        *self.token.write().await = Some(token);
        Ok(())
    }

    async fn ensure_valid_token_inner(&self) -> Result<()> {
        {
            let token = self.token.read().await;
            if let Some(ref current) = *token {
                if !current.is_expired(Utc::now()) {
                    return Ok(());
                }
            }
        }
        self.authenticate().await
    }

    async fn bearer(&self) -> Result<String> {
        self.token
            .read()
            .await
            .as_ref()
            .map(|t| t.token.clone())
            .ok_or_else(|| ResoError::authentication("no bearer token available"))
    }

    fn headers(&self, token: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| ResoError::authentication("Invalid access token format"))?;
        headers.insert(AUTHORIZATION, auth_value);

        Ok(headers)
    }

    /// Issue one authenticated GET and unwrap the OData collection envelope.
    async fn get_collection(&self, url: &str) -> Result<Vec<Value>> {
        self.ensure_valid_token_inner().await?;
        let token = self.bearer().await?;

        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .headers(self.headers(&token)?)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        Self::log_response(status, &body);

        if !status.is_success() {
            let message = extract_error_message(&body);
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(ResoError::authentication(format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    message
                )));
            }
            return Err(ResoError::api(status.as_u16(), message));
        }

        let collection: ODataCollection = serde_json::from_str(&body)?;
        Ok(collection.value)
    }

    fn listings_url(&self, filter: Option<&str>, page_size: usize, offset: usize) -> String {
        let mut url = format!(
            "{}/Property?$top={}&$skip={}",
            self.base_url, page_size, offset
        );
        if let Some(filter) = filter {
            url.push_str("&$filter=");
            url.push_str(&urlencoding::encode(filter));
        }
        if let Some(ref select) = self.select {
            url.push_str("&$select=");
            url.push_str(&urlencoding::encode(select));
        }
        url
    }

    fn media_url(&self, external_id: &str) -> String {
        let filter = format!(
            "ResourceRecordKey eq '{}'",
            Self::escape_literal(external_id)
        );
        format!(
            "{}/Media?$filter={}&$orderby=Order",
            self.base_url,
            urlencoding::encode(&filter)
        )
    }
}

#[async_trait]
impl ProtocolClient for ResoClient {
    async fn ensure_valid_token(&self) -> homestream_core::Result<()> {
        self.ensure_valid_token_inner().await.map_err(Into::into)
    }

    async fn query_listings(
        &self,
        filter: Option<&str>,
        page_size: usize,
        offset: usize,
    ) -> homestream_core::Result<Vec<Value>> {
        let url = self.listings_url(filter, page_size, offset);
        Ok(self.get_collection(&url).await?)
    }

    async fn query_media(&self, external_id: &str) -> homestream_core::Result<Vec<Value>> {
        if !Self::is_safe_external_id(external_id) {
            return Err(ResoError::validation(format!(
                "external id {:?} contains characters outside the allow-list",
                external_id
            ))
            .into());
        }
        let url = self.media_url(external_id);
        Ok(self.get_collection(&url).await?)
    }
}

/// Builds one run-local [`ResoClient`] per sync run.
pub struct ResoClientFactory;

#[async_trait]
impl ProtocolClientFactory for ResoClientFactory {
    async fn build(
        &self,
        connection: &Connection,
        credentials: &Credentials,
    ) -> homestream_core::Result<Box<dyn ProtocolClient>> {
        Ok(Box::new(ResoClient::new(
            &connection.base_url,
            connection.provider,
            credentials.clone(),
        )))
    }
}

/// Best-effort extraction of an error message from a provider response body.
fn extract_error_message(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ODataErrorResponse>(body) {
        if let Some(message) = parsed.error.message.filter(|m| !m.is_empty()) {
            return match parsed.error.code.filter(|c| !c.is_empty()) {
                Some(code) => format!("{}: {}", code, message),
                None => message,
            };
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        "no response body".to_string()
    } else {
        trimmed.chars().take(MAX_LOG_BODY_CHARS).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::Mutex as TokioMutex;

    #[derive(Debug, Clone)]
    struct CapturedRequest {
        method: String,
        target: String,
        authorization: Option<String>,
        body: String,
    }

    fn header_end_offset(buffer: &[u8]) -> Option<usize> {
        buffer.windows(4).position(|window| window == b"\r\n\r\n")
    }

    async fn read_http_request(stream: &mut tokio::net::TcpStream) -> Option<CapturedRequest> {
        let mut buffer = Vec::new();
        loop {
            let mut chunk = [0_u8; 2048];
            let read = stream.read(&mut chunk).await.ok()?;
            if read == 0 {
                return None;
            }
            buffer.extend_from_slice(&chunk[..read]);
            if header_end_offset(&buffer).is_some() {
                break;
            }
        }

        let header_end = header_end_offset(&buffer)?;
        let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
        let mut lines = head.lines();
        let request_line = lines.next()?.to_string();
        let mut parts = request_line.split_whitespace();
        let method = parts.next()?.to_string();
        let target = parts.next()?.to_string();

        let mut authorization = None;
        let mut content_length = 0usize;
        for line in lines {
            if let Some((name, value)) = line.split_once(':') {
                match name.trim().to_ascii_lowercase().as_str() {
                    "authorization" => authorization = Some(value.trim().to_string()),
                    "content-length" => {
                        content_length = value.trim().parse::<usize>().unwrap_or(0)
                    }
                    _ => {}
                }
            }
        }

        let mut body_bytes = buffer[header_end + 4..].to_vec();
        while body_bytes.len() < content_length {
            let mut chunk = [0_u8; 2048];
            let read = stream.read(&mut chunk).await.ok()?;
            if read == 0 {
                break;
            }
            body_bytes.extend_from_slice(&chunk[..read]);
        }

        Some(CapturedRequest {
            method,
            target,
            authorization,
            body: String::from_utf8_lossy(&body_bytes).to_string(),
        })
    }

    async fn write_http_response(
        stream: &mut tokio::net::TcpStream,
        status: u16,
        body: &str,
    ) -> std::io::Result<()> {
        let reason = match status {
            200 => "OK",
            400 => "Bad Request",
            401 => "Unauthorized",
            500 => "Internal Server Error",
            _ => "Error",
        };
        let response = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            reason,
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).await?;
        stream.flush().await
    }

    async fn start_mock_server(
        outcomes: Vec<(u16, String)>,
    ) -> (
        String,
        Arc<TokioMutex<Vec<CapturedRequest>>>,
        tokio::task::JoinHandle<()>,
    ) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener addr");
        let captured = Arc::new(TokioMutex::new(Vec::<CapturedRequest>::new()));
        let scripted = Arc::new(TokioMutex::new(VecDeque::from(outcomes)));
        let captured_clone = Arc::clone(&captured);
        let scripted_clone = Arc::clone(&scripted);

        let handle = tokio::spawn(async move {
            loop {
                let (mut stream, _) = match listener.accept().await {
                    Ok(value) => value,
                    Err(_) => break,
                };
                let captured_inner = Arc::clone(&captured_clone);
                let scripted_inner = Arc::clone(&scripted_clone);
                tokio::spawn(async move {
                    let Some(request) = read_http_request(&mut stream).await else {
                        return;
                    };
                    captured_inner.lock().await.push(request);

                    let (status, body) = scripted_inner.lock().await.pop_front().unwrap_or((
                        500,
                        r#"{"error":{"code":"Unexpected","message":"unscripted request"}}"#
                            .to_string(),
                    ));
                    let _ = write_http_response(&mut stream, status, &body).await;
                });
            }
        });

        (format!("http://{}", addr), captured, handle)
    }

    fn server_token_client(base_url: &str) -> ResoClient {
        ResoClient::new(
            base_url,
            ProviderFamily::Bridge,
            Credentials::ServerToken {
                token: "static-token".to_string(),
            },
        )
    }

    fn oauth_client(base_url: &str) -> ResoClient {
        ResoClient::new(
            base_url,
            ProviderFamily::Reso,
            Credentials::OauthClient {
                client_id: "client-1".to_string(),
                client_secret: "s3cret".to_string(),
            },
        )
    }

    fn token_body(token: &str, expires_in: i64) -> String {
        format!(
            r#"{{"access_token":"{}","token_type":"Bearer","expires_in":{}}}"#,
            token, expires_in
        )
    }

    #[test]
    fn escape_literal_doubles_embedded_quotes() {
        assert_eq!(ResoClient::escape_literal("O'Brien"), "O''Brien");
        assert_eq!(ResoClient::escape_literal("plain"), "plain");
        assert_eq!(ResoClient::escape_literal("a''b"), "a''''b");
    }

    #[test]
    fn external_id_allow_list() {
        assert!(ResoClient::is_safe_external_id("ABC-123_x"));
        assert!(!ResoClient::is_safe_external_id("'; DROP TABLE"));
        assert!(!ResoClient::is_safe_external_id(""));
        assert!(!ResoClient::is_safe_external_id("a b"));
    }

    #[tokio::test]
    async fn server_token_provider_queries_without_token_roundtrip() {
        let (base_url, captured, server) = start_mock_server(vec![(
            200,
            r#"{"value":[{"ListingKey":"A"}]}"#.to_string(),
        )])
        .await;

        let client = server_token_client(&base_url);
        let page = client.query_listings(None, 10, 0).await.expect("page");

        assert_eq!(page.len(), 1);
        let requests = captured.lock().await.clone();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "GET");
        assert_eq!(requests[0].target, "/Property?$top=10&$skip=0");
        assert_eq!(
            requests[0].authorization.as_deref(),
            Some("Bearer static-token")
        );

        server.abort();
    }

    #[tokio::test]
    async fn oauth_token_is_fetched_once_and_reused() {
        let (base_url, captured, server) = start_mock_server(vec![
            (200, token_body("tok-1", 3600)),
            (200, r#"{"value":[]}"#.to_string()),
            (200, r#"{"value":[]}"#.to_string()),
        ])
        .await;

        let client = oauth_client(&base_url);
        client.query_listings(None, 5, 0).await.expect("first page");
        client.query_listings(None, 5, 5).await.expect("second page");

        let requests = captured.lock().await.clone();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].target, "/oauth2/token");
        assert!(requests[0].body.contains("grant_type=client_credentials"));
        assert!(requests[0].body.contains("client_id=client-1"));
        assert_eq!(requests[1].authorization.as_deref(), Some("Bearer tok-1"));
        assert_eq!(requests[2].authorization.as_deref(), Some("Bearer tok-1"));

        server.abort();
    }

    #[tokio::test]
    async fn expired_token_triggers_reauthentication() {
        // expires_in below the refresh margin records an already-passed
        // expiry, so the second query must re-authenticate.
        let (base_url, captured, server) = start_mock_server(vec![
            (200, token_body("tok-1", 30)),
            (200, r#"{"value":[]}"#.to_string()),
            (200, token_body("tok-2", 3600)),
            (200, r#"{"value":[]}"#.to_string()),
        ])
        .await;

        let client = oauth_client(&base_url);
        client.query_listings(None, 5, 0).await.expect("first page");
        client.query_listings(None, 5, 5).await.expect("second page");

        let requests = captured.lock().await.clone();
        assert_eq!(requests.len(), 4);
        assert_eq!(requests[1].authorization.as_deref(), Some("Bearer tok-1"));
        assert_eq!(requests[2].target, "/oauth2/token");
        assert_eq!(requests[3].authorization.as_deref(), Some("Bearer tok-2"));

        server.abort();
    }

    #[tokio::test]
    async fn rejected_credentials_surface_as_authentication_error() {
        let (base_url, _captured, server) = start_mock_server(vec![(
            400,
            r#"{"error":{"code":"invalid_client","message":"unknown client"}}"#.to_string(),
        )])
        .await;

        let client = oauth_client(&base_url);
        let result = client.authenticate().await;

        match result {
            Err(ResoError::Authentication(message)) => {
                assert!(message.contains("invalid_client"));
                assert!(message.contains("unknown client"));
            }
            other => panic!("expected authentication error, got {:?}", other),
        }

        server.abort();
    }

    #[tokio::test]
    async fn incremental_filter_is_url_encoded() {
        let (base_url, captured, server) =
            start_mock_server(vec![(200, r#"{"value":[]}"#.to_string())]).await;

        let client = server_token_client(&base_url);
        client
            .query_listings(
                Some("ModificationTimestamp gt 2025-06-15T10:30:00Z"),
                5,
                10,
            )
            .await
            .expect("page");

        let requests = captured.lock().await.clone();
        assert_eq!(
            requests[0].target,
            "/Property?$top=5&$skip=10&$filter=ModificationTimestamp%20gt%202025-06-15T10%3A30%3A00Z"
        );

        server.abort();
    }

    #[tokio::test]
    async fn select_fields_are_appended_when_configured() {
        let (base_url, captured, server) =
            start_mock_server(vec![(200, r#"{"value":[]}"#.to_string())]).await;

        let client =
            server_token_client(&base_url).with_select(&["ListingKey", "ListPrice"]);
        client.query_listings(None, 5, 0).await.expect("page");

        let requests = captured.lock().await.clone();
        assert_eq!(
            requests[0].target,
            "/Property?$top=5&$skip=0&$select=ListingKey%2CListPrice"
        );

        server.abort();
    }

    #[tokio::test]
    async fn media_query_escapes_literal_and_orders_results() {
        let (base_url, captured, server) =
            start_mock_server(vec![(200, r#"{"value":[{"MediaURL":"u"}]}"#.to_string())])
                .await;

        let client = server_token_client(&base_url);
        let media = client.query_media("ABC-123_x").await.expect("media");

        assert_eq!(media.len(), 1);
        let requests = captured.lock().await.clone();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].target,
            "/Media?$filter=ResourceRecordKey%20eq%20%27ABC-123_x%27&$orderby=Order"
        );

        server.abort();
    }

    #[tokio::test]
    async fn unsafe_external_id_is_rejected_without_network_call() {
        let (base_url, captured, server) =
            start_mock_server(vec![(200, r#"{"value":[]}"#.to_string())]).await;

        let client = server_token_client(&base_url);
        let result = client.query_media("'; DROP TABLE").await;

        assert!(matches!(
            result,
            Err(homestream_core::Error::Validation(_))
        ));
        assert!(captured.lock().await.is_empty());

        server.abort();
    }

    #[tokio::test]
    async fn non_2xx_extracts_error_message_from_body() {
        let (base_url, _captured, server) = start_mock_server(vec![(
            500,
            r#"{"error":{"code":"InternalError","message":"replication lag"}}"#.to_string(),
        )])
        .await;

        let client = server_token_client(&base_url);
        let result = client.query_listings(None, 5, 0).await;

        match result {
            Err(homestream_core::Error::Api { status, message }) => {
                assert_eq!(status, 500);
                assert!(message.contains("replication lag"));
            }
            other => panic!("expected API error, got {:?}", other),
        }

        server.abort();
    }

    #[tokio::test]
    async fn unauthorized_query_maps_to_authentication_error() {
        let (base_url, _captured, server) =
            start_mock_server(vec![(401, r#"{"error":{"message":"expired"}}"#.to_string())])
                .await;

        let client = server_token_client(&base_url);
        let result = client.query_listings(None, 5, 0).await;

        assert!(matches!(
            result,
            Err(homestream_core::Error::Authentication(_))
        ));

        server.abort();
    }

    #[test]
    fn error_message_extraction_falls_back_to_raw_body() {
        assert_eq!(
            extract_error_message(r#"{"error":{"code":"C","message":"boom"}}"#),
            "C: boom"
        );
        assert_eq!(
            extract_error_message(r#"{"error":{"message":"boom"}}"#),
            "boom"
        );
        assert_eq!(extract_error_message("plain text failure"), "plain text failure");
        assert_eq!(extract_error_message(""), "no response body");
    }
}
