//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约测试
//! - 端到端测试（本地 HTTP 服务，无需外部依赖）

#[cfg(test)]
mod contract_tests {
    use config_loader::{ConfigFormat, ConfigLoader};
    use dispatcher::DispatcherConfig;

    #[test]
    fn test_settings_flow_into_dispatcher_config() {
        let settings = ConfigLoader::load_from_str(
            r#"
url = "http://localhost:8080/notify"
max_buffer_size = 10
max_concurrency = 2
"#,
            ConfigFormat::Toml,
        )
        .unwrap();

        let config = DispatcherConfig::from(&settings);
        assert_eq!(config.max_buffer_size, 10);
        assert_eq!(config.max_concurrency, 2);
        assert_eq!(config.max_rps, contracts::DEFAULT_MAX_RPS);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::{any, post};
    use axum::Router;
    use dispatcher::{DeliveryError, Dispatcher, RateLimitCause, ShutdownError};
    use observability::PrometheusMetrics;
    use timed_buffer::TimedBuffer;
    use tokio::net::TcpListener;
    use tokio::time::{sleep, timeout};

    /// Requests received by the test server
    #[derive(Clone, Default)]
    struct Received {
        hits: Arc<AtomicUsize>,
        bodies: Arc<Mutex<Vec<String>>>,
    }

    impl Received {
        fn hits(&self) -> usize {
            self.hits.load(Ordering::SeqCst)
        }
    }

    async fn notification(State(received): State<Received>, body: String) -> StatusCode {
        received.hits.fetch_add(1, Ordering::SeqCst);
        received.bodies.lock().unwrap().push(body);
        StatusCode::CREATED
    }

    async fn test_server() -> (SocketAddr, Received) {
        let received = Received::default();
        let app = Router::new()
            .route("/notification", post(notification))
            .route("/error-400", any(|| async { StatusCode::BAD_REQUEST }))
            .route(
                "/error-500",
                any(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
            )
            .route(
                "/long",
                any(|| async {
                    sleep(Duration::from_secs(3)).await;
                    StatusCode::CREATED
                }),
            )
            .with_state(received.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (addr, received)
    }

    /// Wait until `check` holds, failing after `limit`
    async fn wait_for(limit: Duration, check: impl Fn() -> bool) {
        timeout(limit, async {
            while !check() {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not met in time");
    }

    #[tokio::test]
    async fn test_e2e_single_worker_delivers() {
        let (addr, received) = test_server().await;

        let d = Dispatcher::builder(format!("http://{addr}/notification"))
            .with_max_buffer_size(1)
            .with_max_concurrency(1)
            .build();
        d.start();

        d.enqueue(["hello"]).unwrap();
        let err = d.enqueue(["hello2"]).unwrap_err();
        assert!(err.is_temporary());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));

        let errors = d.errors();
        assert!(timeout(Duration::from_secs(1), errors.recv_async()).await.is_err());
        assert_eq!(received.hits(), 1);
        assert_eq!(*received.bodies.lock().unwrap(), vec!["hello".to_string()]);

        d.stop().await.unwrap();
    }

    /// End-to-end test: TimedBuffer -> Dispatcher -> HTTP server
    #[tokio::test]
    async fn test_e2e_batched_pipeline() {
        let (addr, received) = test_server().await;

        let buffer = TimedBuffer::new(Duration::from_millis(200), 100);
        let metrics = Arc::new(PrometheusMetrics::new());
        let d = Dispatcher::builder(format!("http://{addr}/notification"))
            .with_max_concurrency(4)
            .with_metrics(metrics.clone())
            .build();
        d.start();

        let lines: Vec<String> = (0..5).map(|i| format!("line-{i}")).collect();
        buffer.append(lines.clone()).unwrap();

        let batch = timeout(Duration::from_secs(2), buffer.flush_channel().into_recv_async())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(batch, lines);

        d.enqueue(batch).unwrap();
        wait_for(Duration::from_secs(2), || received.hits() == 5).await;

        let mut bodies = received.bodies.lock().unwrap().clone();
        bodies.sort();
        assert_eq!(bodies, lines);

        buffer.close();
        d.stop().await.unwrap();

        let stats = d.stats();
        assert_eq!(stats.enqueued, 5);
        assert_eq!(stats.delivered, 5);
        assert_eq!(metrics.latency_summary().count, 5);
    }

    #[tokio::test]
    async fn test_e2e_status_classification() {
        let (addr, _) = test_server().await;

        for (path, retryable) in [("error-400", false), ("error-500", true)] {
            let d = Dispatcher::builder(format!("http://{addr}/{path}")).build();
            d.start();

            d.enqueue(["hello"]).unwrap();
            let err = timeout(Duration::from_secs(2), d.errors().into_recv_async())
                .await
                .unwrap()
                .unwrap();

            assert!(matches!(err, DeliveryError::Request { .. }));
            assert_eq!(err.is_retryable(), retryable);

            d.stop().await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_e2e_stop_times_out() {
        let (addr, _) = test_server().await;

        let d = Dispatcher::builder(format!("http://{addr}/long"))
            .with_shutdown_grace(Duration::from_secs(1))
            .build();
        d.start();

        d.enqueue(["msg1", "msg2"]).unwrap();
        sleep(Duration::from_millis(100)).await;

        let err = d.stop().await.unwrap_err();
        assert!(matches!(err, ShutdownError::GracePeriodExceeded { .. }));
    }

    #[tokio::test]
    async fn test_e2e_rate_limit_drops_excess() {
        let (addr, received) = test_server().await;

        // Two tokens up front, next refill after 500ms.
        let d = Dispatcher::builder(format!("http://{addr}/notification"))
            .with_max_rps_and_refill(2, 1)
            .with_rate_limit_retry(Duration::from_millis(100))
            .with_max_concurrency(5)
            .build();
        d.start();

        let errors = d.errors();
        let collector = tokio::spawn(async move {
            let mut causes = Vec::new();
            while let Ok(err) = errors.recv_async().await {
                if let DeliveryError::RateLimited { cause, .. } = err {
                    causes.push(cause);
                }
            }
            causes
        });

        d.enqueue(["1", "2", "3", "4", "5"]).unwrap();
        wait_for(Duration::from_secs(2), || d.stats().resolved() == 5).await;
        d.stop().await.unwrap();

        // Reports arriving while the collector is busy are dropped.
        let causes = collector.await.unwrap();
        let stats = d.stats();
        assert!(!causes.is_empty());
        assert!(causes.iter().all(|c| *c == RateLimitCause::Exhausted));
        assert_eq!(causes.len() as u64 + stats.errors_dropped, 3);
        assert_eq!(stats.rate_limited, 3);
        assert_eq!(received.hits(), 2);
    }
}
