// Prometheus metrics for generation and delivery
use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;

pub fn initialize_metrics(socket_addr: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(socket_addr)
        .install()
        .context("Failed to install Prometheus metrics exporter")?;
    info!("Prometheus metrics endpoint listening on {}", socket_addr);
    Ok(())
}

pub struct GeneratorMetrics;

impl GeneratorMetrics {
    pub fn unit_generated(workload: &'static str, items: usize) {
        metrics::counter!("telegen_units_generated_total", "workload" => workload).increment(1);
        metrics::counter!("telegen_items_generated_total", "workload" => workload)
            .increment(items as u64);
    }

    pub fn generation_cancelled(workload: &'static str) {
        metrics::counter!("telegen_generation_cancelled_total", "workload" => workload)
            .increment(1);
    }

    pub fn generation_duration(workload: &'static str, duration: Duration) {
        metrics::histogram!("telegen_generation_duration_seconds", "workload" => workload)
            .record(duration.as_secs_f64());
    }
}

pub struct DeliveryMetrics;

impl DeliveryMetrics {
    pub fn success(workload: &'static str, bytes: u64) {
        metrics::counter!("telegen_deliveries_total", "workload" => workload, "outcome" => "success")
            .increment(1);
        metrics::counter!("telegen_bytes_sent_total", "workload" => workload).increment(bytes);
    }

    pub fn failure(workload: &'static str, kind: &'static str) {
        metrics::counter!("telegen_deliveries_total", "workload" => workload, "outcome" => kind)
            .increment(1);
    }

    pub fn duration(workload: &'static str, duration: Duration) {
        metrics::histogram!("telegen_delivery_duration_seconds", "workload" => workload)
            .record(duration.as_secs_f64());
    }

    /// Summed over every loop of `workload`; paired with [`delivery_finished`].
    ///
    /// [`delivery_finished`]: DeliveryMetrics::delivery_finished
    pub fn delivery_started(workload: &'static str) {
        metrics::gauge!("telegen_deliveries_in_flight", "workload" => workload).increment(1.0);
    }

    pub fn delivery_finished(workload: &'static str) {
        metrics::gauge!("telegen_deliveries_in_flight", "workload" => workload).decrement(1.0);
    }

    pub fn throughput_mbps(rate: f64) {
        metrics::gauge!("telegen_throughput_mbps").set(rate);
    }
}
