// OTLP/HTTP protobuf export of generated traces
use crate::synth::{Span, Trace};
use crate::transport::{DeliveryError, HttpSink};
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::common::v1::{
    AnyValue, InstrumentationScope, KeyValue, any_value,
};
use opentelemetry_proto::tonic::resource::v1::Resource;
use opentelemetry_proto::tonic::trace::v1::{ResourceSpans, ScopeSpans, span};
use prost::Message;

pub const OTLP_CONTENT_TYPE: &str = "application/x-protobuf";
const SCOPE_NAME: &str = "telegen";

fn string_kv(key: &str, value: &str) -> KeyValue {
    KeyValue {
        key: key.to_string(),
        value: Some(AnyValue {
            value: Some(any_value::Value::StringValue(value.to_string())),
        }),
    }
}

fn decode_id(id: &str, len: usize) -> Result<Vec<u8>, DeliveryError> {
    let bytes = hex::decode(id)
        .map_err(|e| DeliveryError::Serialization(format!("invalid id {}: {}", id, e)))?;
    if bytes.len() != len {
        return Err(DeliveryError::Serialization(format!(
            "id {} is {} bytes, expected {}",
            id,
            bytes.len(),
            len
        )));
    }
    Ok(bytes)
}

fn span_kind(span: &Span) -> span::SpanKind {
    match span.attributes.get("span.kind").map(String::as_str) {
        Some("server") => span::SpanKind::Server,
        Some("client") => span::SpanKind::Client,
        Some("producer") => span::SpanKind::Producer,
        Some("consumer") => span::SpanKind::Consumer,
        Some("internal") => span::SpanKind::Internal,
        _ => span::SpanKind::Unspecified,
    }
}

fn to_proto_span(span: &Span) -> Result<opentelemetry_proto::tonic::trace::v1::Span, DeliveryError> {
    let parent_span_id = match &span.parent_id {
        Some(parent) => decode_id(parent, 8)?,
        None => Vec::new(),
    };

    Ok(opentelemetry_proto::tonic::trace::v1::Span {
        trace_id: decode_id(&span.trace_id, 16)?,
        span_id: decode_id(&span.span_id, 8)?,
        parent_span_id,
        name: span.name.clone(),
        kind: span_kind(span) as i32,
        start_time_unix_nano: span.start_time.max(0) as u64,
        end_time_unix_nano: span.end_time.max(0) as u64,
        attributes: span
            .attributes
            .iter()
            .filter(|(k, _)| k.as_str() != "span.kind")
            .map(|(k, v)| string_kv(k, v))
            .collect(),
        ..Default::default()
    })
}

/// One `ResourceSpans` per service, in order of first appearance.
pub fn to_export_request(trace: &Trace) -> Result<ExportTraceServiceRequest, DeliveryError> {
    let mut groups: Vec<(&str, Vec<_>)> = Vec::new();

    for span in &trace.spans {
        let proto = to_proto_span(span)?;
        match groups.iter_mut().find(|(service, _)| *service == span.service_name) {
            Some((_, spans)) => spans.push(proto),
            None => groups.push((span.service_name.as_str(), vec![proto])),
        }
    }

    let resource_spans = groups
        .into_iter()
        .map(|(service, spans)| ResourceSpans {
            resource: Some(Resource {
                attributes: vec![string_kv("service.name", service)],
                ..Default::default()
            }),
            scope_spans: vec![ScopeSpans {
                scope: Some(InstrumentationScope {
                    name: SCOPE_NAME.to_string(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    ..Default::default()
                }),
                spans,
                schema_url: String::new(),
            }],
            schema_url: String::new(),
        })
        .collect();

    Ok(ExportTraceServiceRequest { resource_spans })
}

/// Trace exporter speaking OTLP/HTTP with protobuf bodies.
#[derive(Debug, Clone)]
pub struct OtlpSink {
    inner: HttpSink,
}

impl OtlpSink {
    pub fn new(inner: HttpSink) -> Self {
        Self { inner }
    }

    pub async fn export(&self, trace: &Trace) -> Result<u64, DeliveryError> {
        let request = to_export_request(trace)?;
        self.inner.post(request.encode_to_vec(), OTLP_CONTENT_TYPE).await
    }
}
