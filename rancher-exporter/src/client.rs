//! HTTP client for the Rancher metadata API.
//!
//! One GET per collection, no retries. A failed request is reported to the
//! caller immediately; the orchestrator decides what that means for the
//! scrape cycle.

use crate::metrics;
use rancher_common::{ResourceCollection, ResourceRecord};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, HeaderValue};
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Upper bound for establishing a connection, independent of the total
/// request timeout.
const MAX_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors raised while fetching a collection.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: StatusCode },

    #[error("failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl FetchError {
    pub fn url(&self) -> &str {
        match self {
            FetchError::Request { url, .. }
            | FetchError::Status { url, .. }
            | FetchError::Decode { url, .. } => url,
        }
    }
}

/// API key pair sent as HTTP basic auth.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Client for the collections of one Rancher API.
#[derive(Debug, Clone)]
pub struct MetadataClient {
    http: reqwest::Client,
    credentials: Option<Credentials>,
}

impl MetadataClient {
    /// Build a client whose requests give up after `timeout`.
    pub fn new(timeout: Duration, credentials: Option<Credentials>) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(MAX_CONNECT_TIMEOUT))
            .user_agent(format!("rancher-exporter/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { http, credentials })
    }

    /// Fetch every record of the collection at `url`.
    pub async fn fetch(&self, url: &str) -> Result<Vec<ResourceRecord>, FetchError> {
        let start = Instant::now();
        metrics::inc_function_call("client", "fetch");

        let result = self.fetch_collection(url).await;

        metrics::observe_function_duration("client", "fetch", start.elapsed().as_secs_f64());
        let collection = result?;

        if collection.is_truncated() {
            warn!(
                url,
                records = collection.data.len(),
                "collection is paginated, records beyond the first page are not exported"
            );
        }
        debug!(
            url,
            records = collection.data.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "collection fetched"
        );

        Ok(collection.data)
    }

    async fn fetch_collection(&self, url: &str) -> Result<ResourceCollection, FetchError> {
        debug!(url, "scraping");

        let mut request = self
            .http
            .get(url)
            .header(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(credentials) = &self.credentials {
            request = request.basic_auth(&credentials.access_key, Some(&credentials.secret_key));
        }

        let response = request.send().await.map_err(|source| FetchError::Request {
            url: url.to_string(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        let body = response.bytes().await.map_err(|source| FetchError::Request {
            url: url.to_string(),
            source,
        })?;

        serde_json::from_slice(&body).map_err(|source| FetchError::Decode {
            url: url.to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeRancher, init_test_logging};
    use serde_json::json;

    fn client() -> MetadataClient {
        MetadataClient::new(Duration::from_secs(5), None).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_decodes_records() {
        init_test_logging();
        let fake = FakeRancher::builder()
            .services(json!([
                {"id": "1s1", "name": "web", "state": "active", "scale": 2, "type": "service"},
                {"id": "1s2", "name": "db", "state": "inactive", "type": "service"}
            ]))
            .start()
            .await;

        let records = client()
            .fetch(&format!("{}/services/", fake.base_url()))
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].display_name(), "web");
        assert_eq!(records[0].scale(), 2);
        assert_eq!(records[1].state(), "inactive");
    }

    #[tokio::test]
    async fn test_fetch_sends_accept_header_and_basic_auth() {
        init_test_logging();
        let fake = FakeRancher::builder().hosts(json!([])).start().await;
        let credentials = Credentials {
            access_key: "access".to_string(),
            secret_key: "secret".to_string(),
        };
        let client = MetadataClient::new(Duration::from_secs(5), Some(credentials)).unwrap();

        client
            .fetch(&format!("{}/hosts/", fake.base_url()))
            .await
            .unwrap();

        let requests = fake.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].path, "/v2-beta/hosts/");
        assert_eq!(requests[0].accept.as_deref(), Some("application/json"));
        // base64("access:secret")
        assert_eq!(
            requests[0].authorization.as_deref(),
            Some("Basic YWNjZXNzOnNlY3JldA==")
        );
    }

    #[tokio::test]
    async fn test_fetch_without_credentials_sends_no_auth() {
        init_test_logging();
        let fake = FakeRancher::builder().hosts(json!([])).start().await;

        client()
            .fetch(&format!("{}/hosts/", fake.base_url()))
            .await
            .unwrap();

        assert_eq!(fake.requests()[0].authorization, None);
    }

    #[tokio::test]
    async fn test_fetch_non_success_status() {
        init_test_logging();
        let fake = FakeRancher::builder().start().await;

        let err = client()
            .fetch(&format!("{}/services/", fake.base_url()))
            .await
            .unwrap_err();

        match err {
            FetchError::Status { status, .. } => assert_eq!(status, StatusCode::NOT_FOUND),
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_malformed_body() {
        init_test_logging();
        let fake = FakeRancher::builder().raw_services("not json").start().await;

        let err = client()
            .fetch(&format!("{}/services/", fake.base_url()))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Decode { .. }));
        assert!(err.url().ends_with("/services/"));
    }

    #[tokio::test]
    async fn test_fetch_connection_refused() {
        init_test_logging();
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client()
            .fetch(&format!("http://{addr}/v2-beta/services/"))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Request { .. }));
    }

    #[test]
    fn test_credentials_debug_redacts_secret() {
        let credentials = Credentials {
            access_key: "access".to_string(),
            secret_key: "hunter2".to_string(),
        };
        let rendered = format!("{credentials:?}");
        assert!(rendered.contains("access"));
        assert!(!rendered.contains("hunter2"));
    }
}
