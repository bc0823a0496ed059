use crate::config::Config;
use crate::context::RunContext;
use crate::scheduler::{LoopSpec, LoopState, Scheduler};
use crate::shutdown::ShutdownCoordinator;
use crate::synth::{LogBatch, Trace, TraceShape};
use crate::transport::{HttpSink, SinkOptions, build_client};
use crate::workload::{LogWorkload, TraceExporter, TraceWorkload};
use std::time::Duration;
use wiremock::matchers::method;
use wiremock::{MockServer, Request, ResponseTemplate};

fn scheduler() -> Scheduler {
    Scheduler::new(RunContext::new(Config::default()), ShutdownCoordinator::new())
}

fn sink(scheduler: &Scheduler, server: &MockServer) -> HttpSink {
    HttpSink::new(
        build_client(Duration::from_secs(5)).unwrap(),
        format!("{}/ingest", server.uri()),
        SinkOptions::default(),
        scheduler.context().throughput.clone(),
    )
    .unwrap()
}

async fn mock(server: &MockServer, status: u16) {
    wiremock::Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

async fn wait_for_requests(server: &MockServer, count: usize) -> Vec<Request> {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let received = server.received_requests().await.unwrap_or_default();
            if received.len() >= count {
                return received;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("endpoint did not receive enough requests")
}

fn spec(interval_ms: u64) -> LoopSpec {
    LoopSpec {
        loops: 1,
        interval: Duration::from_millis(interval_ms),
        max_in_flight: 4,
    }
}

#[cfg(test)]
mod log_delivery_tests {
    use super::*;

    #[tokio::test]
    async fn test_one_tick_delivers_three_record_array() {
        let server = MockServer::start().await;
        mock(&server, 200).await;

        let scheduler = scheduler();
        let workload = LogWorkload::new(sink(&scheduler, &server), 3, vec!["user-service".to_string()]);
        let stats = scheduler.spawn(workload, spec(100));

        let received = wait_for_requests(&server, 1).await;
        scheduler.shutdown().await;

        let batch: LogBatch = serde_json::from_slice(&received[0].body).unwrap();
        assert_eq!(batch.len(), 3);
        assert!(batch.records().iter().all(|r| r.job == "user-service"));
        assert!(stats.delivered() >= 1);
    }

    #[tokio::test]
    async fn test_rejected_batches_keep_loop_ticking() {
        let server = MockServer::start().await;
        mock(&server, 500).await;

        let scheduler = scheduler();
        let workload = LogWorkload::new(sink(&scheduler, &server), 2, vec!["job".to_string()]);
        let stats = scheduler.spawn(workload, spec(50));

        wait_for_requests(&server, 3).await;
        assert_eq!(scheduler.loop_states(), vec![LoopState::Running]);

        scheduler.shutdown().await;
        assert!(stats.failed() >= 3);
        assert_eq!(stats.delivered(), 0);
        assert_eq!(scheduler.context().throughput.total(), 0);
    }

    #[tokio::test]
    async fn test_counter_matches_delivered_payloads() {
        let server = MockServer::start().await;
        mock(&server, 200).await;

        let scheduler = scheduler();
        let workload = LogWorkload::new(sink(&scheduler, &server), 10, vec!["job".to_string()]);
        scheduler.spawn(workload, spec(30));

        wait_for_requests(&server, 2).await;
        scheduler.shutdown().await;

        let received = server.received_requests().await.unwrap();
        let expected: u64 = received.iter().map(|r| r.body.len() as u64).sum();
        assert_eq!(scheduler.context().throughput.total(), expected);
    }

    #[tokio::test]
    async fn test_timestamps_non_decreasing_within_loop() {
        let server = MockServer::start().await;
        mock(&server, 200).await;

        let scheduler = scheduler();
        let workload = LogWorkload::new(sink(&scheduler, &server), 1, vec!["job".to_string()]);
        scheduler.spawn(
            workload,
            LoopSpec {
                max_in_flight: 1,
                ..spec(20)
            },
        );

        wait_for_requests(&server, 4).await;
        scheduler.shutdown().await;

        let received = server.received_requests().await.unwrap();
        let stamps: Vec<_> = received
            .iter()
            .map(|r| {
                let batch: LogBatch = serde_json::from_slice(&r.body).unwrap();
                chrono::DateTime::parse_from_rfc3339(&batch.records()[0].timestamp).unwrap()
            })
            .collect();
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
    }
}

#[cfg(test)]
mod trace_delivery_tests {
    use super::*;

    fn shape(child_ms: std::ops::Range<u64>) -> TraceShape {
        TraceShape {
            child_duration_ms: child_ms,
            start_jitter_ms: 0..1,
            ..TraceShape::default()
        }
    }

    #[tokio::test]
    async fn test_trace_delivered_as_single_rooted_tree() {
        let server = MockServer::start().await;
        mock(&server, 200).await;

        let scheduler = scheduler();
        let workload = TraceWorkload::new(TraceExporter::Json(sink(&scheduler, &server)), shape(1..3));
        scheduler.spawn(workload, spec(50));

        let received = wait_for_requests(&server, 1).await;
        scheduler.shutdown().await;

        let trace: Trace = serde_json::from_slice(&received[0].body).unwrap();
        assert_eq!(trace.spans.len(), 5);
        let root = trace.root().unwrap();
        let children: Vec<_> = trace.spans.iter().filter(|s| !s.is_root()).collect();
        assert_eq!(children.len(), 4);
        assert!(
            children
                .iter()
                .all(|s| s.parent_id.as_deref() == Some(root.span_id.as_str()))
        );
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_trace_simulation() {
        let server = MockServer::start().await;
        mock(&server, 200).await;

        let scheduler = scheduler();
        let workload =
            TraceWorkload::new(TraceExporter::Json(sink(&scheduler, &server)), shape(10_000..10_001));
        let stats = scheduler.spawn(workload, spec(10));

        // Let the first tick start simulating its first child span.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let started = std::time::Instant::now();
        scheduler.shutdown().await;

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(stats.cancelled(), 1);
        assert_eq!(stats.delivered(), 0);
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}
