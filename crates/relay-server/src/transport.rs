//! Authenticated transport to the downstream aggregate-import API
//!
//! The batch execution engine consumes this as an opaque capability: one
//! `send_batch` call per batch, a fixed deadline per request, and a
//! [`FailureKind`] classification for everything that is not a 2xx.
//!
//! Mutual TLS is configured from PEM client-certificate material on disk.
//! When no identity is configured the client still speaks TLS but cannot
//! authenticate itself; that mode is for local development only and is
//! logged loudly at startup.

use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::BackendConfig;
use crate::features::imports::models::FailureKind;

/// Errors building the transport at startup
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to read client identity: {0}")]
    Identity(#[from] std::io::Error),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Outcome of one failed batch request
///
/// Carried into the failure log verbatim; `kind` drives the `errorKind`
/// classification on every failure record derived from the batch.
#[derive(Debug, Clone)]
pub struct BatchError {
    pub kind: FailureKind,
    pub message: String,
}

impl std::fmt::Display for BatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.kind.as_str())
    }
}

/// HTTP client for the aggregate-import API
#[derive(Clone)]
pub struct AggregateClient {
    client: reqwest::Client,
    import_url: String,
}

impl AggregateClient {
    /// Build the client from configuration, loading the mTLS identity if set
    pub fn new(config: &BackendConfig) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("import-relay/", env!("CARGO_PKG_VERSION")));

        match (&config.client_cert_path, &config.client_key_path) {
            (Some(cert_path), Some(key_path)) => {
                let mut pem = std::fs::read(cert_path)?;
                pem.extend_from_slice(&std::fs::read(key_path)?);
                let identity = reqwest::Identity::from_pem(&pem)?;
                builder = builder.identity(identity);
                info!(
                    cert = %cert_path.display(),
                    "Backend transport configured with client certificate"
                );
            }
            _ => {
                warn!(
                    "No client certificate configured - backend requests will not be \
                     mutually authenticated"
                );
            }
        }

        Ok(Self {
            client: builder.build()?,
            import_url: config.import_url.clone(),
        })
    }

    /// Endpoint the batches are sent to
    pub fn import_url(&self) -> &str {
        &self.import_url
    }

    /// Send one batch of objects on behalf of `owner_id`
    ///
    /// A 2xx response confirms the whole batch. Anything else is classified:
    /// `Timeout` when the request deadline elapsed (the backend may still
    /// have applied the write), `HttpError` for a non-2xx response,
    /// `NetworkError` when no response arrived, `Unknown` otherwise.
    pub async fn send_batch(&self, owner_id: &str, objects: &[Value]) -> Result<(), BatchError> {
        let payload = json!({
            "ownerId": owner_id,
            "objects": objects,
        });

        let response = self
            .client
            .post(&self.import_url)
            .json(&payload)
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status();
        if status.is_success() {
            debug!(count = objects.len(), "Batch accepted by backend");
            return Ok(());
        }

        Err(BatchError {
            kind: FailureKind::HttpError,
            message: format!("Backend responded with HTTP {}", status.as_u16()),
        })
    }
}

fn classify_request_error(err: reqwest::Error) -> BatchError {
    if err.is_timeout() {
        BatchError {
            kind: FailureKind::Timeout,
            message: format!("Request deadline exceeded: {err}"),
        }
    } else if err.is_connect() || err.is_request() {
        BatchError {
            kind: FailureKind::NetworkError,
            message: format!("No response from backend: {err}"),
        }
    } else {
        BatchError {
            kind: FailureKind::Unknown,
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> AggregateClient {
        AggregateClient::new(&BackendConfig {
            import_url: format!("{}/aggregate/import", server.uri()),
            timeout_secs: 1,
            client_cert_path: None,
            client_key_path: None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_send_batch_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/aggregate/import"))
            .and(body_partial_json(serde_json::json!({ "ownerId": "owner-1" })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let objects = vec![serde_json::json!({"id": 1})];
        assert!(client.send_batch("owner-1", &objects).await.is_ok());
    }

    #[tokio::test]
    async fn test_send_batch_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .send_batch("owner-1", &[serde_json::json!({})])
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::HttpError);
        assert!(err.message.contains("502"));
    }

    #[tokio::test]
    async fn test_send_batch_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .send_batch("owner-1", &[serde_json::json!({})])
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::Timeout);
    }

    #[tokio::test]
    async fn test_send_batch_network_error() {
        // Nothing is listening on this port.
        let client = AggregateClient::new(&BackendConfig {
            import_url: "http://127.0.0.1:1/aggregate/import".to_string(),
            timeout_secs: 1,
            client_cert_path: None,
            client_key_path: None,
        })
        .unwrap();

        let err = client
            .send_batch("owner-1", &[serde_json::json!({})])
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::NetworkError);
    }
}
