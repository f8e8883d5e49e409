//! HTTP client for the Magus REST API
//!
//! [`ApiClient`] wraps the generic GET/POST helpers and the typed endpoint
//! calls. Everything above this layer talks to the [`MagusApi`] trait so the
//! inbox controller, cache and assistant can run against a fake in tests.
//!
//! One attempt per call: no retries, no backoff, no client-side timeout
//! beyond what the transport enforces.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Client, ClientBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::models::{
    DecisionRequest, DecisionResponse, EmailRecord, Page, RouteStats, RouteStatsQuery,
    SenderStats, StatusCounts, StatusCountsResponse,
};

/// Header that tells the tunnel in front of the API to skip its browser page
pub const TUNNEL_BYPASS_HEADER: &str = "ngrok-skip-browser-warning";

/// How many characters of a non-JSON body end up in the error
const INVALID_JSON_SNIPPET: usize = 100;

/// Operations the rest of the crate needs from the backend
#[async_trait]
pub trait MagusApi: Send + Sync {
    /// `GET /email-records`
    async fn list_email_records(&self, limit: u32, offset: u32) -> Result<Page<EmailRecord>>;

    /// `GET /email-records/status-counts`
    async fn status_counts(&self) -> Result<StatusCounts>;

    /// `GET /email-records/needs-human-decision`
    async fn list_needs_human_decision(&self, limit: u32, offset: u32)
        -> Result<Page<EmailRecord>>;

    /// `POST /email-records/decision`
    async fn submit_decision(&self, request: &DecisionRequest) -> Result<DecisionResponse>;

    /// `GET /stats/senders`
    async fn sender_stats(&self) -> Result<SenderStats>;

    /// `GET /stats/routes`
    async fn route_stats(&self, query: &RouteStatsQuery) -> Result<RouteStats>;
}

/// reqwest-backed client for a single API base URL
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: Url,
    client: Client,
}

impl ApiClient {
    /// Create a client from configuration
    pub fn new(config: &ApiConfig) -> Result<Self> {
        Self::with_builder(config, Client::builder())
    }

    /// Create a client on top of a caller-provided builder
    pub fn with_builder(config: &ApiConfig, builder: ClientBuilder) -> Result<Self> {
        let base_url = Url::parse(config.base_url.trim_end_matches('/'))?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if config.tunnel_bypass {
            headers.insert(
                HeaderName::from_static(TUNNEL_BYPASS_HEADER),
                HeaderValue::from_static("true"),
            );
        }

        let client = builder.default_headers(headers).build()?;
        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{}{}", base, path))?)
    }

    /// GET `path` with query parameters; `None` values are left out
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, Option<String>)],
    ) -> Result<T> {
        let mut url = self.endpoint(path)?;
        {
            let present: Vec<_> = params
                .iter()
                .filter_map(|(k, v)| v.as_ref().map(|v| (*k, v.as_str())))
                .collect();
            if !present.is_empty() {
                url.query_pairs_mut().extend_pairs(present);
            }
        }

        debug!("[API] GET {}", url);
        let response = self.client.get(url).send().await?;
        decode_response(response).await
    }

    /// POST a JSON body to `path`
    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        debug!("[API] POST {}", url);
        let response = self.client.post(url).json(body).send().await?;
        decode_response(response).await
    }
}

/// Turn a response into `T`, or into an error carrying what went wrong
pub(crate) async fn decode_response<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    let declared_json = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.contains("application/json"))
        .unwrap_or(false);
    let text = response.text().await?;

    if !status.is_success() {
        return Err(Error::Api {
            status: status.as_u16(),
            body: text,
        });
    }

    if declared_json {
        return Ok(serde_json::from_str(&text)?);
    }

    // No JSON content type; the body may still be JSON
    serde_json::from_str(&text).map_err(|_| {
        let snippet: String = text.chars().take(INVALID_JSON_SNIPPET).collect();
        warn!("Received invalid JSON: {}", snippet);
        Error::InvalidJson { snippet }
    })
}

fn paging(limit: u32, offset: u32) -> [(&'static str, Option<String>); 2] {
    [
        ("limit", Some(limit.to_string())),
        ("offset", Some(offset.to_string())),
    ]
}

#[async_trait]
impl MagusApi for ApiClient {
    async fn list_email_records(&self, limit: u32, offset: u32) -> Result<Page<EmailRecord>> {
        self.get("/email-records", &paging(limit, offset)).await
    }

    async fn status_counts(&self) -> Result<StatusCounts> {
        let response: StatusCountsResponse =
            self.get("/email-records/status-counts", &[]).await?;
        Ok(response.into_counts())
    }

    async fn list_needs_human_decision(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<Page<EmailRecord>> {
        self.get("/email-records/needs-human-decision", &paging(limit, offset))
            .await
    }

    async fn submit_decision(&self, request: &DecisionRequest) -> Result<DecisionResponse> {
        self.post("/email-records/decision", request).await
    }

    async fn sender_stats(&self) -> Result<SenderStats> {
        self.get("/stats/senders", &[]).await
    }

    async fn route_stats(&self, query: &RouteStatsQuery) -> Result<RouteStats> {
        self.get(
            "/stats/routes",
            &[
                ("top", Some(query.top.to_string())),
                ("max_rows", Some(query.max_rows.to_string())),
                ("batch_size", Some(query.batch_size.to_string())),
            ],
        )
        .await
    }
}

/// Every record the listing endpoint returned, up to a row cap
#[derive(Debug, Clone, Default)]
pub struct FullDataset {
    pub records: Vec<EmailRecord>,
    /// Backend `count` from the last page
    pub total: u64,
    /// Stopped at the row cap with rows left on the server
    pub reached_max_rows: bool,
}

impl FullDataset {
    pub fn scanned(&self) -> usize {
        self.records.len()
    }
}

/// Page through `/email-records` until exhausted or `max_rows` is hit
pub async fn fetch_all_email_records(
    api: &dyn MagusApi,
    batch: u32,
    max_rows: usize,
) -> Result<FullDataset> {
    let batch = batch.max(1);
    let mut records: Vec<EmailRecord> = Vec::new();
    let mut offset: u32 = 0;
    let mut total: u64 = 0;

    while records.len() < max_rows {
        let remaining = u32::try_from(max_rows - records.len()).unwrap_or(u32::MAX);
        let limit = batch.min(remaining);

        let page = api.list_email_records(limit, offset).await?;
        total = page.count;
        let got = page.items.len();
        records.extend(page.items);

        if got == 0 || got < limit as usize || records.len() as u64 >= page.count {
            break;
        }
        offset = offset.saturating_add(limit);
    }

    let reached_max_rows = records.len() >= max_rows && (records.len() as u64) < total;
    info!(
        "Fetched {} of {} email records{}",
        records.len(),
        total,
        if reached_max_rows { " (row cap reached)" } else { "" }
    );

    Ok(FullDataset {
        records,
        total,
        reached_max_rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BackendStatus, Decision};
    use crate::test_support::{record, serve_once, FakeApi};

    fn client_for(base_url: &str) -> ApiClient {
        let config = ApiConfig {
            base_url: base_url.to_string(),
            tunnel_bypass: true,
        };
        ApiClient::with_builder(&config, Client::builder().no_proxy()).unwrap()
    }

    #[tokio::test]
    async fn test_get_sends_headers_and_query() {
        let (base, server) = serve_once(
            "200 OK",
            Some("application/json"),
            r#"{"items": [], "limit": 50, "offset": 100, "count": 0}"#,
        )
        .await;
        let page = client_for(&base).list_email_records(50, 100).await.unwrap();
        assert_eq!(page.offset, 100);

        let request = server.await.unwrap().to_lowercase();
        assert!(request.starts_with("get /api/v1/email-records?limit=50&offset=100 "));
        assert!(request.contains("accept: application/json"));
        assert!(request.contains("ngrok-skip-browser-warning: true"));
    }

    #[tokio::test]
    async fn test_non_2xx_carries_status_and_body() {
        let (base, _server) =
            serve_once("503 Service Unavailable", Some("text/plain"), "backend down").await;
        let err = client_for(&base).status_counts().await.unwrap_err();
        match err {
            Error::Api { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "backend down");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_undeclared_json_is_parsed() {
        let (base, _server) =
            serve_once("200 OK", None, r#"{"counts": {"unprocessed": 4}}"#).await;
        let counts = client_for(&base).status_counts().await.unwrap();
        assert_eq!(counts.get("unprocessed"), Some(&4));
    }

    #[tokio::test]
    async fn test_html_body_is_invalid_json() {
        let body = "<!DOCTYPE html><html><body>You are about to visit a tunnel page</body></html>";
        let (base, _server) = serve_once("200 OK", Some("text/html"), body).await;
        let err = client_for(&base).sender_stats().await.unwrap_err();
        match err {
            Error::InvalidJson { snippet } => assert!(snippet.starts_with("<!DOCTYPE html>")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_declared_json_with_bad_body_is_json_error() {
        let (base, _server) = serve_once("200 OK", Some("application/json"), "{oops").await;
        let err = client_for(&base).sender_stats().await.unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[tokio::test]
    async fn test_post_decision() {
        let (base, server) = serve_once(
            "200 OK",
            Some("application/json; charset=utf-8"),
            r#"{"ok": true, "id": "e1", "decision": "accept", "sent": true, "quote_text": "USD 2,328.75"}"#,
        )
        .await;
        let request = DecisionRequest::new("e1", Decision::Accept, Some("USD 2,328.75"), None);
        let response = client_for(&base).submit_decision(&request).await.unwrap();
        assert!(response.sent);

        let raw = server.await.unwrap();
        assert!(raw.starts_with("POST /api/v1/email-records/decision "));
        assert!(raw.to_lowercase().contains("content-type: application/json"));
        assert!(raw.contains(r#""refined_quote":"USD 2,328.75""#));
        assert!(raw.contains(r#""comment":null"#));
    }

    #[tokio::test]
    async fn test_route_stats_query() {
        let (base, server) = serve_once(
            "200 OK",
            Some("application/json"),
            r#"{"items": [{"route": "Shanghai → Rotterdam", "count": 12}], "unique_routes": 1, "scanned": 40, "max_rows": 20000, "reached_max_rows": false}"#,
        )
        .await;
        let stats = client_for(&base)
            .route_stats(&RouteStatsQuery::default())
            .await
            .unwrap();
        assert_eq!(stats.items[0].count, 12);
        let raw = server.await.unwrap();
        assert!(raw.starts_with("GET /api/v1/stats/routes?top=100&max_rows=20000&batch_size=1000 "));
    }

    #[tokio::test]
    async fn test_transport_failure() {
        // nothing listens on a port we just released
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client_for(&format!("http://{}/api/v1", addr))
            .sender_stats()
            .await
            .unwrap_err();
        assert!(err.is_transport());
        assert_eq!(err.code(), "TRANSPORT_ERROR");
    }

    #[tokio::test]
    async fn test_fetch_all_pages_until_exhausted() {
        let records: Vec<_> = (0..250)
            .map(|i| record(&format!("r{i}"), "2025-01-10T09:00:00", "auto_processed"))
            .collect();
        let api = FakeApi::new(records);

        let all = fetch_all_email_records(&api, 100, 20_000).await.unwrap();
        assert_eq!(all.scanned(), 250);
        assert_eq!(all.total, 250);
        assert!(!all.reached_max_rows);
        assert_eq!(
            api.calls(),
            vec!["list:100:0", "list:100:100", "list:100:200"]
        );
    }

    #[tokio::test]
    async fn test_fetch_all_stops_at_row_cap() {
        let records: Vec<_> = (0..250)
            .map(|i| record(&format!("r{i}"), "2025-01-10T09:00:00", "unprocessed"))
            .collect();
        let api = FakeApi::new(records);

        let all = fetch_all_email_records(&api, 100, 150).await.unwrap();
        assert_eq!(all.scanned(), 150);
        assert!(all.reached_max_rows);
        assert_eq!(api.calls(), vec!["list:100:0", "list:50:100"]);
        assert!(all
            .records
            .iter()
            .all(|r| r.status == BackendStatus::Unprocessed));
    }
}
