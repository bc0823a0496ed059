// Generate-then-deliver units driven by the scheduler
use crate::config::{Config, TraceFormat};
use crate::context::RunContext;
use crate::shutdown::ShutdownListener;
use crate::synth::{Cancelled, LogBatch, Trace, TraceShape, assemble, build_trace};
use crate::transport::{DeliveryError, HttpSink, OtlpSink, SinkOptions, StatusPolicy};
use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::rngs::StdRng;
use reqwest::Client;

/// One kind of synthetic traffic.
///
/// `generate` runs on the loop's own task and may be interrupted by shutdown;
/// `deliver` runs on a tracked delivery task and must not observe shutdown so
/// dispatched sends can drain.
#[async_trait]
pub trait Workload: Send + Sync + 'static {
    type Unit: Send + 'static;

    fn name(&self) -> &'static str;

    /// Number of records or spans carried by `unit`.
    fn unit_len(unit: &Self::Unit) -> usize;

    async fn generate(
        &self,
        rng: &mut StdRng,
        shutdown: &mut ShutdownListener,
    ) -> Result<Self::Unit, Cancelled>;

    async fn deliver(&self, unit: Self::Unit) -> Result<u64, DeliveryError>;
}

fn sink_options(config: &Config) -> SinkOptions {
    SinkOptions {
        auth_header: config.transport.auth_header.clone(),
        headers: config.transport.headers.clone(),
        request_timeout: config.request_timeout(),
        status_policy: StatusPolicy::from_strict(config.transport.strict_status),
    }
}

pub struct LogWorkload {
    sink: HttpSink,
    batch_size: usize,
    jobs: Vec<String>,
}

impl LogWorkload {
    pub fn new(sink: HttpSink, batch_size: usize, jobs: Vec<String>) -> Self {
        Self {
            sink,
            batch_size,
            jobs,
        }
    }

    pub fn from_context(ctx: &RunContext, client: Client) -> Result<Self> {
        let config = &ctx.config;
        let endpoint = config
            .logs
            .endpoint
            .clone()
            .context("Log endpoint not configured")?;
        let sink = HttpSink::new(client, endpoint, sink_options(config), ctx.throughput.clone())
            .context("Failed to create log sink")?;
        Ok(Self::new(sink, config.logs.batch_size, config.logs.jobs.clone()))
    }
}

#[async_trait]
impl Workload for LogWorkload {
    type Unit = LogBatch;

    fn name(&self) -> &'static str {
        "logs"
    }

    fn unit_len(unit: &LogBatch) -> usize {
        unit.len()
    }

    async fn generate(
        &self,
        rng: &mut StdRng,
        shutdown: &mut ShutdownListener,
    ) -> Result<LogBatch, Cancelled> {
        if shutdown.is_triggered() {
            return Err(Cancelled);
        }
        Ok(assemble(rng, self.batch_size, &self.jobs, chrono::Utc::now()))
    }

    async fn deliver(&self, batch: LogBatch) -> Result<u64, DeliveryError> {
        self.sink.send(&batch).await
    }
}

#[derive(Debug, Clone)]
pub enum TraceExporter {
    Json(HttpSink),
    Otlp(OtlpSink),
}

impl TraceExporter {
    pub async fn export(&self, trace: &Trace) -> Result<u64, DeliveryError> {
        match self {
            TraceExporter::Json(sink) => sink.send(trace).await,
            TraceExporter::Otlp(sink) => sink.export(trace).await,
        }
    }
}

pub struct TraceWorkload {
    exporter: TraceExporter,
    shape: TraceShape,
}

impl TraceWorkload {
    pub fn new(exporter: TraceExporter, shape: TraceShape) -> Self {
        Self { exporter, shape }
    }

    pub fn from_context(ctx: &RunContext, client: Client) -> Result<Self> {
        let config = &ctx.config;
        let mut options = sink_options(config);
        if config.traces.format == TraceFormat::Json {
            options
                .headers
                .entry("stream-name".to_string())
                .or_insert_with(|| config.traces.stream.clone());
        }

        let sink = HttpSink::new(
            client,
            config.trace_endpoint(),
            options,
            ctx.throughput.clone(),
        )
        .context("Failed to create trace sink")?;

        let exporter = match config.traces.format {
            TraceFormat::Json => TraceExporter::Json(sink),
            TraceFormat::Otlp => TraceExporter::Otlp(OtlpSink::new(sink)),
        };

        let shape = TraceShape {
            service_name: config.traces.service_name.clone(),
            services: config.traces.services.clone(),
            ..TraceShape::default()
        };

        Ok(Self::new(exporter, shape))
    }
}

#[async_trait]
impl Workload for TraceWorkload {
    type Unit = Trace;

    fn name(&self) -> &'static str {
        "traces"
    }

    fn unit_len(unit: &Trace) -> usize {
        unit.spans.len()
    }

    async fn generate(
        &self,
        rng: &mut StdRng,
        shutdown: &mut ShutdownListener,
    ) -> Result<Trace, Cancelled> {
        build_trace(rng, &self.shape, shutdown).await
    }

    async fn deliver(&self, trace: Trace) -> Result<u64, DeliveryError> {
        self.exporter.export(&trace).await
    }
}
