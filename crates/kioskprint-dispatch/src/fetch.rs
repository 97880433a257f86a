// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Remote document fetch from object storage.
//
// Object stores hand out signed, short-lived links. An expired or revoked
// signature is reported as `AuthExpired` so the acquisition pipeline can stop
// at once instead of retrying a link that will never work again.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, instrument};

use kioskprint_core::error::{KioskError, Result};

/// Error-body markers object stores use for expired or rejected credentials.
const AUTH_EXPIRED_MARKERS: &[&str] = &[
    "ExpiredToken",
    "AuthenticationFailed",
    "AccessDenied",
    "Request has expired",
];

/// Why a single fetch attempt failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("authorisation expired: {0}")]
    AuthExpired(String),

    #[error("{0}")]
    Transient(String),

    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

/// Object-storage seam used by the acquisition pipeline.
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    /// Download `url`, giving up after `timeout`.
    async fn fetch(&self, url: &str, timeout: Duration) -> std::result::Result<Vec<u8>, FetchError>;
}

/// HTTP(S) fetcher backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("kioskprint/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| KioskError::Internal(format!("http client: {e}")))?;
        Ok(Self { client })
    }

    async fn fetch_once(&self, url: &str) -> std::result::Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transient(format!("request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            let body = response
                .bytes()
                .await
                .map_err(|e| FetchError::Transient(format!("reading body: {e}")))?;
            return Ok(body.to_vec());
        }

        // The body usually names the storage error code; a failed read just
        // leaves the status to decide.
        let body = response.text().await.unwrap_or_default();
        Err(classify_response(status, &body))
    }
}

#[async_trait]
impl DocumentFetcher for HttpFetcher {
    #[instrument(skip(self), fields(url = %redact(url)))]
    async fn fetch(&self, url: &str, timeout: Duration) -> std::result::Result<Vec<u8>, FetchError> {
        let bytes = tokio::time::timeout(timeout, self.fetch_once(url))
            .await
            .map_err(|_| FetchError::Timeout(timeout))??;
        debug!(bytes = bytes.len(), "document downloaded");
        Ok(bytes)
    }
}

/// Classify a non-success HTTP response.
pub fn classify_response(status: StatusCode, body: &str) -> FetchError {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return FetchError::AuthExpired(format!("HTTP {}", status.as_u16()));
    }
    if let Some(marker) = AUTH_EXPIRED_MARKERS.iter().find(|m| body.contains(*m)) {
        return FetchError::AuthExpired(format!("HTTP {}: {marker}", status.as_u16()));
    }
    FetchError::Transient(format!("HTTP {}", status.as_u16()))
}

/// Drop the query string so signatures never reach the logs.
pub fn redact(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Minimal HTTP responder answering every request with `status` and `body`.
    async fn serve(status: u16, body: &'static str) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {status} X\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{addr}/bucket/report.pdf?sig=abc"), hits)
    }

    #[tokio::test]
    async fn downloads_body() {
        let (url, hits) = serve(200, "%PDF-1.7 fake").await;
        let bytes = HttpFetcher::new()
            .unwrap()
            .fetch(&url, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(bytes, b"%PDF-1.7 fake");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn forbidden_is_auth_expired() {
        let (url, _) = serve(403, "").await;
        let err = HttpFetcher::new()
            .unwrap()
            .fetch(&url, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::AuthExpired(_)));
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let (url, _) = serve(503, "Slow Down").await;
        let err = HttpFetcher::new()
            .unwrap()
            .fetch(&url, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::Transient("HTTP 503".into()));
    }

    #[test]
    fn storage_error_codes_are_auth_expired() {
        let body = "<Error><Code>ExpiredToken</Code></Error>";
        assert!(matches!(
            classify_response(StatusCode::BAD_REQUEST, body),
            FetchError::AuthExpired(_)
        ));
        assert!(matches!(
            classify_response(StatusCode::BAD_REQUEST, "Request has expired"),
            FetchError::AuthExpired(_)
        ));
        assert!(matches!(
            classify_response(StatusCode::NOT_FOUND, "NoSuchKey"),
            FetchError::Transient(_)
        ));
    }

    #[test]
    fn redact_strips_signature() {
        assert_eq!(redact("https://s3/b/k.pdf?X-Amz-Signature=1"), "https://s3/b/k.pdf");
    }
}
