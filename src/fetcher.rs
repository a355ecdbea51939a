//! Raw payload fetching
//!
//! [`Fetch`] is the transport boundary: given a URL it returns the body
//! bytes or a [`NetworkError`]. [`HttpFetcher`] implements it on a blocking
//! `reqwest` client with a per-fetch timeout. No retries are performed.

use std::time::Duration;

use reqwest::blocking::Client;
use tracing::{debug, info};

use crate::catalog::QueryPlan;
use crate::error::{EliaError, NetworkError};
use crate::types::RawPayload;

/// Longest response body kept in an `HttpError`
const ERROR_BODY_LIMIT: usize = 512;

/// Retrieve raw bytes for a URL
pub trait Fetch {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, NetworkError>;
}

/// Fetch one planned request and tag the body with its encoding and wire format
pub fn fetch_payload<F: Fetch + ?Sized>(
    fetcher: &F,
    plan: &QueryPlan,
) -> Result<RawPayload, NetworkError> {
    let bytes = fetcher.fetch(&plan.url)?;
    Ok(RawPayload::new(
        bytes,
        plan.kind.encoding(),
        plan.kind.wire_format(),
    ))
}

/// Blocking HTTP fetcher
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, EliaError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| EliaError::InvalidRequest(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, timeout })
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, NetworkError> {
        info!("Fetching {}", url);

        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .map_err(|e| map_transport_error(url, e))?;

        let status = response.status();
        debug!("Response from {}: status={}", url, status);

        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(NetworkError::HttpError {
                status: status.as_u16(),
                body: body.chars().take(ERROR_BODY_LIMIT).collect(),
            });
        }

        let bytes = response.bytes().map_err(|e| map_transport_error(url, e))?;
        Ok(bytes.to_vec())
    }
}

fn map_transport_error(url: &str, err: reqwest::Error) -> NetworkError {
    if err.is_timeout() {
        NetworkError::Timeout {
            url: url.to_string(),
        }
    } else if err.is_builder() {
        NetworkError::InvalidUrl(url.to_string())
    } else {
        NetworkError::Transport(format!("GET {} failed: {}", url, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DatasetKind, DateWindow, TextEncoding, WireFormat};

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(Duration::from_secs(5), "elia-client-test").unwrap()
    }

    #[test]
    fn test_fetch_success_returns_body() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/data")
            .with_status(200)
            .with_body("payload")
            .create();

        let body = fetcher().fetch(&format!("{}/data", server.url())).unwrap();

        mock.assert();
        assert_eq!(body, b"payload".to_vec());
    }

    #[test]
    fn test_fetch_non_2xx_is_http_error() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/missing")
            .with_status(503)
            .with_body("Service Unavailable")
            .create();

        let err = fetcher()
            .fetch(&format!("{}/missing", server.url()))
            .unwrap_err();

        match err {
            NetworkError::HttpError { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "Service Unavailable");
            }
            other => panic!("Expected HttpError, got {:?}", other),
        }
    }

    #[test]
    fn test_fetch_unreachable_host_is_transport_error() {
        let err = fetcher().fetch("http://127.0.0.1:1/unreachable").unwrap_err();
        assert!(matches!(err, NetworkError::Transport(_)));
    }

    #[test]
    fn test_fetch_timeout_is_timeout_error() {
        // Accepts the connection and never answers
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            let (_stream, _) = listener.accept().unwrap();
            std::thread::sleep(Duration::from_secs(3));
        });

        let fetcher = HttpFetcher::new(Duration::from_millis(300), "elia-client-test").unwrap();
        let url = format!("http://{}/x", addr);
        let err = fetcher.fetch(&url).unwrap_err();

        assert!(matches!(err, NetworkError::Timeout { url: ref u } if *u == url), "{:?}", err);
    }

    #[test]
    fn test_fetch_payload_tags_format_and_encoding() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/vol")
            .with_status(200)
            .with_body("[]")
            .create();

        let plan = QueryPlan {
            kind: DatasetKind::ImbalanceVolume,
            window: DateWindow::Latest,
            url: format!("{}/vol", server.url()),
        };
        let payload = fetch_payload(&fetcher(), &plan).unwrap();

        assert_eq!(payload.format, WireFormat::Json);
        assert_eq!(payload.encoding, TextEncoding::Utf8);
        assert_eq!(payload.text().unwrap(), "[]");
    }
}
