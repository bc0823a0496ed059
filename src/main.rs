use anyhow::{Context, Result};
use telegen::config::Config;
use telegen::context::RunContext;
use telegen::observability::metrics::initialize_metrics;
use telegen::scheduler::{LoopSpec, Scheduler};
use telegen::shutdown::ShutdownCoordinator;
use telegen::transport::build_client;
use telegen::workload::{LogWorkload, TraceWorkload};
use tracing::info;
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn init_logging(config: &Config) {
    let filter = EnvFilter::new(&config.observability.log_level);
    if config.observability.json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    init_logging(&config);

    info!("Starting telegen v{}", VERSION);

    if config.observability.enable_prometheus {
        initialize_metrics(config.metrics_socket_addr())?;
    }

    let shutdown = ShutdownCoordinator::new();
    shutdown
        .install_handlers()
        .context("Failed to install signal handlers")?;

    let ctx = RunContext::new(config);
    let config = ctx.config.clone();
    let client = build_client(config.request_timeout())?;
    let scheduler = Scheduler::new(ctx.clone(), shutdown);

    if config.logs.enabled {
        info!(
            "Log generation: {} loops x {} records every {:?} -> {}",
            config.logs.rate,
            config.logs.batch_size,
            config.log_tick_interval(),
            config.logs.endpoint.as_deref().unwrap_or_default()
        );
        scheduler.spawn(
            LogWorkload::from_context(&ctx, client.clone())?,
            LoopSpec {
                loops: config.logs.rate,
                interval: config.log_tick_interval(),
                max_in_flight: config.logs.max_in_flight,
            },
        );
    }

    if config.traces.enabled {
        info!(
            "Trace generation: {} loops, {} services, {:?} format -> {}",
            config.traces.rate,
            config.traces.services.len(),
            config.traces.format,
            config.trace_endpoint()
        );
        scheduler.spawn(
            TraceWorkload::from_context(&ctx, client.clone())?,
            LoopSpec {
                loops: config.traces.rate,
                interval: config.trace_tick_interval(),
                max_in_flight: config.traces.max_in_flight,
            },
        );
    }

    scheduler.spawn_reporter(config.report_interval());
    let signal = scheduler.run_until_shutdown().await;

    info!("Shutdown complete ({:?})", signal);
    Ok(())
}
