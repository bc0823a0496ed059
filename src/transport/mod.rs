// Delivery of generated payloads over HTTP
pub mod http;
pub mod otlp;

use anyhow::{Context, Result};
use reqwest::{Client, ClientBuilder, StatusCode};
use std::time::Duration;

pub use http::{HttpSink, SinkOptions};
pub use otlp::OtlpSink;

/// Which response codes count as a successful delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusPolicy {
    /// Any 2xx
    #[default]
    Success2xx,
    /// Exactly 200
    Strict200,
}

impl StatusPolicy {
    pub fn from_strict(strict: bool) -> Self {
        if strict {
            StatusPolicy::Strict200
        } else {
            StatusPolicy::Success2xx
        }
    }

    pub fn accepts(self, status: StatusCode) -> bool {
        match self {
            StatusPolicy::Success2xx => status.is_success(),
            StatusPolicy::Strict200 => status == StatusCode::OK,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("failed to serialize payload: {0}")]
    Serialization(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("endpoint rejected payload with status {status}")]
    RemoteRejected { status: u16 },
    #[error("transport failure: {0}")]
    TransportFailure(#[source] reqwest::Error),
}

impl DeliveryError {
    /// Short label used in logs and metric tags.
    pub fn kind(&self) -> &'static str {
        match self {
            DeliveryError::Serialization(_) => "serialization",
            DeliveryError::Timeout(_) => "timeout",
            DeliveryError::RemoteRejected { .. } => "remote_rejected",
            DeliveryError::TransportFailure(_) => "transport_failure",
        }
    }

    fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            DeliveryError::Timeout(timeout)
        } else {
            DeliveryError::TransportFailure(err)
        }
    }
}

impl From<serde_json::Error> for DeliveryError {
    fn from(err: serde_json::Error) -> Self {
        DeliveryError::Serialization(err.to_string())
    }
}

/// One connection pool shared by every sink.
pub fn build_client(request_timeout: Duration) -> Result<Client> {
    ClientBuilder::new()
        .timeout(request_timeout)
        .build()
        .context("Failed to build HTTP client")
}
