// Configuration management for the telemetry generator
use anyhow::{Context, Result};
use config::builder::DefaultState;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub logs: LogsConfig,
    #[serde(default)]
    pub traces: TracesConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Number of independent sender loops
    #[serde(default = "default_rate")]
    pub rate: usize,
    #[serde(default = "default_log_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    #[serde(default = "default_jobs")]
    pub jobs: Vec<String>,
}

const fn default_rate() -> usize {
    1
}
const fn default_log_batch_size() -> usize {
    100
}
const fn default_tick_interval_ms() -> u64 {
    1000
}
const fn default_max_in_flight() -> usize {
    4
}
fn default_jobs() -> Vec<String> {
    crate::synth::content::JOB_TYPES
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: None,
            rate: default_rate(),
            batch_size: default_log_batch_size(),
            tick_interval_ms: default_tick_interval_ms(),
            max_in_flight: default_max_in_flight(),
            jobs: default_jobs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TraceFormat {
    #[default]
    Json,
    Otlp,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TracesConfig {
    #[serde(default = "default_false")]
    pub enabled: bool,
    /// Defaults per format, see [`Config::trace_endpoint`]
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_stream")]
    pub stream: String,
    #[serde(default)]
    pub format: TraceFormat,
    #[serde(default = "default_rate")]
    pub rate: usize,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    #[serde(default = "default_trace_service_name")]
    pub service_name: String,
    #[serde(default = "default_services")]
    pub services: Vec<String>,
}

const DEFAULT_JSON_TRACES_ENDPOINT: &str = "http://localhost:4318/traces";
const DEFAULT_OTLP_TRACES_ENDPOINT: &str = "http://localhost:4318/v1/traces";

fn default_stream() -> String {
    "default".to_string()
}
fn default_trace_service_name() -> String {
    "trace-generator".to_string()
}
fn default_services() -> Vec<String> {
    crate::synth::trace::DEFAULT_SERVICES
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for TracesConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            stream: default_stream(),
            format: TraceFormat::default(),
            rate: default_rate(),
            tick_interval_ms: default_tick_interval_ms(),
            max_in_flight: default_max_in_flight(),
            service_name: default_trace_service_name(),
            services: default_services(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TransportConfig {
    /// Sent verbatim as the `Authorization` header
    #[serde(default)]
    pub auth_header: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Treat only `200 OK` as success instead of any 2xx
    #[serde(default = "default_false")]
    pub strict_status: bool,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

const fn default_request_timeout() -> u64 {
    10
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            auth_header: None,
            request_timeout_secs: default_request_timeout(),
            strict_status: false,
            headers: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_false")]
    pub json_logging: bool,
    #[serde(default = "default_false")]
    pub enable_prometheus: bool,
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: String,
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}
const fn default_metrics_port() -> u16 {
    9090
}
fn default_metrics_addr() -> String {
    "0.0.0.0".to_string()
}
const fn default_report_interval() -> u64 {
    1
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: false,
            enable_prometheus: false,
            metrics_port: default_metrics_port(),
            metrics_addr: default_metrics_addr(),
            report_interval_secs: default_report_interval(),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("LOG_ENDPOINT is required when log generation is enabled")]
    MissingLogEndpoint,
    #[error("{section}.{field} must be greater than zero")]
    Zero {
        section: &'static str,
        field: &'static str,
    },
    #[error("nothing to generate: both logs and traces are disabled")]
    NothingEnabled,
}

/// Flat variables kept for compatibility with existing deployments.
const LEGACY_ENV: &[(&str, &str)] = &[
    ("LOG_ENDPOINT", "logs.endpoint"),
    ("LOG_RATE", "logs.rate"),
    ("BATCH_SIZE", "logs.batch_size"),
    ("AUTH_HEADER", "transport.auth_header"),
    ("TRACES_ENDPOINT", "traces.endpoint"),
    ("TRACES_STREAM", "traces.stream"),
];

impl Config {
    pub fn load() -> Result<Self> {
        let environment =
            std::env::var("TELEGEN_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());

        let mut builder = config::ConfigBuilder::<DefaultState>::default()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Yaml),
            )
            .add_source(
                config::File::with_name(&format!("config/{}", environment))
                    .required(false)
                    .format(config::FileFormat::Yaml),
            )
            .add_source(
                config::Environment::with_prefix("TELEGEN")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        for (var, key) in LEGACY_ENV {
            let value = std::env::var(var).ok().filter(|v| !v.is_empty());
            builder = builder
                .set_override_option(*key, value)
                .with_context(|| format!("Invalid value for {}", var))?;
        }

        let config: Config = builder
            .build()?
            .try_deserialize()
            .context("Failed to load configuration")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if !self.logs.enabled && !self.traces.enabled {
            return Err(ConfigError::NothingEnabled);
        }
        if self.logs.enabled {
            if self
                .logs
                .endpoint
                .as_deref()
                .is_none_or(|e| e.trim().is_empty())
            {
                return Err(ConfigError::MissingLogEndpoint);
            }
            if self.logs.rate == 0 {
                return Err(ConfigError::Zero {
                    section: "logs",
                    field: "rate",
                });
            }
            if self.logs.tick_interval_ms == 0 {
                return Err(ConfigError::Zero {
                    section: "logs",
                    field: "tick_interval_ms",
                });
            }
        }
        if self.traces.enabled && self.traces.rate == 0 {
            return Err(ConfigError::Zero {
                section: "traces",
                field: "rate",
            });
        }
        if self.traces.enabled && self.traces.tick_interval_ms == 0 {
            return Err(ConfigError::Zero {
                section: "traces",
                field: "tick_interval_ms",
            });
        }
        if self.transport.request_timeout_secs == 0 {
            return Err(ConfigError::Zero {
                section: "transport",
                field: "request_timeout_secs",
            });
        }
        Ok(())
    }

    pub fn trace_endpoint(&self) -> String {
        match (&self.traces.endpoint, self.traces.format) {
            (Some(endpoint), _) => endpoint.clone(),
            (None, TraceFormat::Json) => DEFAULT_JSON_TRACES_ENDPOINT.to_string(),
            (None, TraceFormat::Otlp) => DEFAULT_OTLP_TRACES_ENDPOINT.to_string(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.transport.request_timeout_secs)
    }

    pub fn log_tick_interval(&self) -> Duration {
        Duration::from_millis(self.logs.tick_interval_ms)
    }

    pub fn trace_tick_interval(&self) -> Duration {
        Duration::from_millis(self.traces.tick_interval_ms)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.observability.report_interval_secs.max(1))
    }

    pub fn metrics_socket_addr(&self) -> SocketAddr {
        format!(
            "{}:{}",
            self.observability.metrics_addr, self.observability.metrics_port
        )
        .parse()
        .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 9090)))
    }
}
