// Two-level synthetic trace construction
use crate::shutdown::ShutdownListener;
use crate::synth::Cancelled;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Range;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

pub const DEFAULT_SERVICES: &[&str] = &[
    "user-service",
    "order-service",
    "payment-service",
    "inventory-service",
];

pub const ROOT_SPAN_NAME: &str = "API Request";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Span {
    pub trace_id: String,
    pub span_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub name: String,
    /// Unix nanoseconds
    pub start_time: i64,
    pub end_time: i64,
    pub service_name: String,
    pub attributes: BTreeMap<String, String>,
}

impl Span {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn duration(&self) -> Duration {
        Duration::from_nanos(self.end_time.saturating_sub(self.start_time).max(0) as u64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Trace {
    pub spans: Vec<Span>,
}

impl Trace {
    pub fn root(&self) -> Option<&Span> {
        self.spans.iter().find(|s| s.is_root())
    }
}

/// Timing knobs for a simulated request.
#[derive(Debug, Clone)]
pub struct TraceShape {
    /// Root span service name
    pub service_name: String,
    /// One child span per entry, in order
    pub services: Vec<String>,
    /// Child start offset from the trace start, in milliseconds
    pub start_jitter_ms: Range<u64>,
    /// Time actually waited per child before stamping its end, in milliseconds
    pub child_duration_ms: Range<u64>,
}

impl Default for TraceShape {
    fn default() -> Self {
        Self {
            service_name: "trace-generator".to_string(),
            services: DEFAULT_SERVICES.iter().map(|s| s.to_string()).collect(),
            start_jitter_ms: 0..100,
            child_duration_ms: 100..300,
        }
    }
}

pub fn trace_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    hex::encode(rng.r#gen::<[u8; 16]>())
}

pub fn span_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    hex::encode(rng.r#gen::<[u8; 8]>())
}

fn sample_ms<R: Rng + ?Sized>(rng: &mut R, range: &Range<u64>) -> u64 {
    if range.is_empty() {
        range.start
    } else {
        rng.gen_range(range.clone())
    }
}

/// Monotonic nanosecond clock anchored at the wall-clock trace start.
struct TraceClock {
    start_ns: i64,
    started: Instant,
}

impl TraceClock {
    fn start() -> Self {
        let start_ns = chrono::Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or_default();
        Self {
            start_ns,
            started: Instant::now(),
        }
    }

    fn offset(&self, by: Duration) -> i64 {
        self.start_ns
            .saturating_add(i64::try_from(by.as_nanos()).unwrap_or(i64::MAX))
    }

    fn now(&self) -> i64 {
        self.offset(self.started.elapsed())
    }
}

/// Build one root span plus one child per service, actually waiting out each
/// child's duration. Returns [`Cancelled`] as soon as shutdown is observed;
/// a partial trace is never returned.
pub async fn build_trace<R: Rng + ?Sized>(
    rng: &mut R,
    shape: &TraceShape,
    shutdown: &mut ShutdownListener,
) -> Result<Trace, Cancelled> {
    if shutdown.is_triggered() {
        return Err(Cancelled);
    }

    let trace_id = trace_id(rng);
    let root_id = span_id(rng);
    let clock = TraceClock::start();
    let mut spans = Vec::with_capacity(shape.services.len() + 1);

    for service in &shape.services {
        let jitter = Duration::from_millis(sample_ms(rng, &shape.start_jitter_ms));
        let simulated = Duration::from_millis(sample_ms(rng, &shape.child_duration_ms));
        let child_id = span_id(rng);

        tokio::select! {
            biased;
            _ = shutdown.recv() => {
                debug!("Trace {} cancelled while simulating {}", trace_id, service);
                return Err(Cancelled);
            }
            _ = tokio::time::sleep(simulated) => {}
        }

        let start_time = clock.offset(jitter);
        let end_time = clock.now().max(start_time);

        spans.push(Span {
            trace_id: trace_id.clone(),
            span_id: child_id,
            parent_id: Some(root_id.clone()),
            name: service.clone(),
            start_time,
            end_time,
            service_name: service.clone(),
            attributes: BTreeMap::from([
                ("span.kind".to_string(), "client".to_string()),
                ("operation".to_string(), "process_request".to_string()),
                ("service.name".to_string(), service.clone()),
            ]),
        });
    }

    spans.push(Span {
        trace_id,
        span_id: root_id,
        parent_id: None,
        name: ROOT_SPAN_NAME.to_string(),
        start_time: clock.start_ns,
        end_time: clock.now(),
        service_name: shape.service_name.clone(),
        attributes: BTreeMap::from([("span.kind".to_string(), "server".to_string())]),
    });

    Ok(Trace { spans })
}
