// Single-shot JSON POST with status classification
use crate::context::ThroughputCounter;
use crate::transport::{DeliveryError, StatusPolicy};
use anyhow::{Context, Result};
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct SinkOptions {
    pub auth_header: Option<String>,
    /// Extra static headers, e.g. `stream-name`
    pub headers: BTreeMap<String, String>,
    pub request_timeout: Duration,
    pub status_policy: StatusPolicy,
}

impl Default for SinkOptions {
    fn default() -> Self {
        Self {
            auth_header: None,
            headers: BTreeMap::new(),
            request_timeout: Duration::from_secs(10),
            status_policy: StatusPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpSink {
    client: Client,
    endpoint: String,
    headers: HeaderMap,
    request_timeout: Duration,
    status_policy: StatusPolicy,
    throughput: Arc<ThroughputCounter>,
}

impl HttpSink {
    pub fn new(
        client: Client,
        endpoint: impl Into<String>,
        options: SinkOptions,
        throughput: Arc<ThroughputCounter>,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        for (name, value) in &options.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .with_context(|| format!("Invalid header name: {}", name))?;
            let value = HeaderValue::from_str(value)
                .with_context(|| format!("Invalid value for header {}", name))?;
            headers.insert(name, value);
        }
        if let Some(auth) = options.auth_header.as_deref().filter(|a| !a.is_empty()) {
            let mut value = HeaderValue::from_str(auth).context("Invalid Authorization header")?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            headers,
            request_timeout: options.request_timeout,
            status_policy: options.status_policy,
            throughput,
        })
    }

    /// Serialise `payload` as JSON and deliver it.
    pub async fn send<T: Serialize + ?Sized>(&self, payload: &T) -> Result<u64, DeliveryError> {
        let body = serde_json::to_vec(payload)?;
        self.post(body, "application/json").await
    }

    /// POST an already-encoded body. On success the body length is added to
    /// the throughput counter and returned. Never retries.
    pub async fn post(&self, body: Vec<u8>, content_type: &'static str) -> Result<u64, DeliveryError> {
        let len = body.len() as u64;

        let response = self
            .client
            .post(&self.endpoint)
            .headers(self.headers.clone())
            .header(CONTENT_TYPE, content_type)
            .timeout(self.request_timeout)
            .body(body)
            .send()
            .await
            .map_err(|e| DeliveryError::from_reqwest(e, self.request_timeout))?;

        let status = response.status();
        if !self.status_policy.accepts(status) {
            return Err(DeliveryError::RemoteRejected {
                status: status.as_u16(),
            });
        }

        self.throughput.add(len);
        debug!("Delivered {} bytes to {} ({})", len, self.endpoint, status);
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::build_client;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sink(server: &MockServer, options: SinkOptions) -> (HttpSink, Arc<ThroughputCounter>) {
        let counter = Arc::new(ThroughputCounter::new());
        let client = build_client(Duration::from_secs(5)).unwrap();
        let sink = HttpSink::new(
            client,
            format!("{}/ingest", server.uri()),
            options,
            counter.clone(),
        )
        .unwrap();
        (sink, counter)
    }

    #[tokio::test]
    async fn test_send_success_counts_bytes() {
        let server = MockServer::start().await;
        let payload = json!([{"level": "info", "job": "user-service"}]);
        Mock::given(method("POST"))
            .and(path("/ingest"))
            .and(header("content-type", "application/json"))
            .and(body_json(&payload))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let (sink, counter) = sink(&server, SinkOptions::default());
        let sent = sink.send(&payload).await.unwrap();

        assert_eq!(sent, serde_json::to_vec(&payload).unwrap().len() as u64);
        assert_eq!(counter.total(), sent);
    }

    #[tokio::test]
    async fn test_static_headers_attached() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Basic dGVzdDp0ZXN0"))
            .and(header("stream-name", "load"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let options = SinkOptions {
            auth_header: Some("Basic dGVzdDp0ZXN0".to_string()),
            headers: BTreeMap::from([("stream-name".to_string(), "load".to_string())]),
            ..SinkOptions::default()
        };
        let (sink, _) = sink(&server, options);
        sink.send(&json!({"spans": []})).await.unwrap();
    }

    #[tokio::test]
    async fn test_any_2xx_is_success_by_default() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let (sink, counter) = sink(&server, SinkOptions::default());
        assert!(sink.send(&json!([])).await.is_ok());
        assert_eq!(counter.total(), 2);
    }

    #[tokio::test]
    async fn test_strict_policy_rejects_201() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;

        let options = SinkOptions {
            status_policy: StatusPolicy::Strict200,
            ..SinkOptions::default()
        };
        let (sink, counter) = sink(&server, options);
        let err = sink.send(&json!([])).await.unwrap_err();

        assert!(matches!(err, DeliveryError::RemoteRejected { status: 201 }));
        assert_eq!(counter.total(), 0);
    }

    #[tokio::test]
    async fn test_server_error_is_remote_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let (sink, counter) = sink(&server, SinkOptions::default());
        let err = sink.send(&json!([1, 2, 3])).await.unwrap_err();

        assert!(matches!(err, DeliveryError::RemoteRejected { status: 500 }));
        assert_eq!(err.kind(), "remote_rejected");
        assert_eq!(counter.total(), 0);
    }

    #[tokio::test]
    async fn test_slow_endpoint_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let options = SinkOptions {
            request_timeout: Duration::from_millis(200),
            ..SinkOptions::default()
        };
        let (sink, counter) = sink(&server, options);
        let err = sink.send(&json!([])).await.unwrap_err();

        assert!(matches!(err, DeliveryError::Timeout(_)), "got {:?}", err);
        assert_eq!(counter.total(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_failure() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let counter = Arc::new(ThroughputCounter::new());
        let sink = HttpSink::new(
            build_client(Duration::from_secs(2)).unwrap(),
            format!("http://{}/ingest", addr),
            SinkOptions::default(),
            counter.clone(),
        )
        .unwrap();

        let err = sink.send(&json!([])).await.unwrap_err();
        assert!(matches!(err, DeliveryError::TransportFailure(_)), "got {:?}", err);
        assert_eq!(counter.total(), 0);
    }

    #[tokio::test]
    async fn test_counter_sums_successful_batches() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let (sink, counter) = sink(&server, SinkOptions::default());
        let first = json!([{"log": "a"}]);
        let second = json!([{"log": "bb"}, {"log": "ccc"}]);
        let x = serde_json::to_vec(&first).unwrap().len() as u64;
        let y = serde_json::to_vec(&second).unwrap().len() as u64;

        sink.send(&first).await.unwrap();
        sink.send(&second).await.unwrap();

        assert_eq!(counter.total(), x + y);
    }

    #[test]
    fn test_invalid_header_rejected_at_construction() {
        let options = SinkOptions {
            headers: BTreeMap::from([("bad header".to_string(), "v".to_string())]),
            ..SinkOptions::default()
        };
        let result = HttpSink::new(
            Client::new(),
            "http://localhost:1/",
            options,
            Arc::new(ThroughputCounter::new()),
        );
        assert!(result.is_err());
    }
}
