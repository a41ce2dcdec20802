// Drives a real HTTP server through the tracking listener and checks that the
// coordinator sees its connections and races them against the grace period.
#[cfg(test)]
mod tests {
    use std::{
        net::SocketAddr,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::{Duration, Instant},
    };

    use axum::serve::Listener;
    use quiesce::{
        FnHook, ShutdownCoordinator, ShutdownError,
        adapters::{AppState, build_router, http_server, tracking_listener},
    };

    struct TestServer {
        addr: SocketAddr,
        coordinator: Arc<ShutdownCoordinator>,
        hook_calls: Arc<AtomicUsize>,
    }

    async fn start_server(timeout_ms: i64, response_delay: Duration) -> TestServer {
        let hook_calls = Arc::new(AtomicUsize::new(0));
        let counter = hook_calls.clone();
        let coordinator = Arc::new(
            ShutdownCoordinator::new(
                timeout_ms,
                vec![FnHook::boxed("count", move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })],
            )
            .unwrap(),
        );

        let listener = tracking_listener::bind("127.0.0.1:0".parse().unwrap(), coordinator.clone())
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        let router = build_router(AppState {
            coordinator: coordinator.clone(),
            response_delay,
        });
        tokio::spawn(async move {
            let _ = http_server::serve(listener, router).await;
        });

        TestServer {
            addr,
            coordinator,
            hook_calls,
        }
    }

    fn client() -> reqwest::Client {
        // No pooling: each connection closes as soon as its response is read.
        reqwest::Client::builder()
            .pool_max_idle_per_host(0)
            .build()
            .unwrap()
    }

    async fn wait_for_live(coordinator: &ShutdownCoordinator, expected: u64) {
        for _ in 0..500 {
            if coordinator.live_connections() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "expected {expected} live connection(s), found {}",
            coordinator.live_connections()
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stop_times_out_while_handler_is_busy() {
        let server = start_server(300, Duration::from_secs(5)).await;
        server.coordinator.set_accepting(true);

        let url = format!("http://{}/", server.addr);
        let request = tokio::spawn(async move { client().get(url).send().await });
        wait_for_live(&server.coordinator, 1).await;

        let started = Instant::now();
        let err = server.coordinator.on_stop().await.unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, ShutdownError::TimedOut { remaining: 1, .. }));
        assert!(elapsed >= Duration::from_millis(300), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(3), "{elapsed:?}");
        assert_eq!(server.hook_calls.load(Ordering::SeqCst), 1);

        request.abort();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stop_drains_when_handler_finishes() {
        let server = start_server(10_000, Duration::from_millis(200)).await;
        server.coordinator.set_accepting(true);

        let url = format!("http://{}/", server.addr);
        let request = tokio::spawn(async move {
            let body = client().get(url).send().await?.text().await?;
            Ok::<_, reqwest::Error>(body)
        });
        wait_for_live(&server.coordinator, 1).await;

        let started = Instant::now();
        server.coordinator.on_stop().await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(server.coordinator.live_connections(), 0);
        assert_eq!(server.hook_calls.load(Ordering::SeqCst), 1);
        assert_eq!(request.await.unwrap().unwrap(), "Hello, client\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_connections_are_refused_until_accepting() {
        let server = start_server(1000, Duration::ZERO).await;
        let url = format!("http://{}/", server.addr);

        assert!(client().get(&url).send().await.is_err());
        assert_eq!(server.coordinator.live_connections(), 0);

        server.coordinator.set_accepting(true);
        let body = client().get(&url).send().await.unwrap().text().await.unwrap();
        assert_eq!(body, "Hello, client\n");
        wait_for_live(&server.coordinator, 0).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_status_reports_coordinator_state() {
        let server = start_server(1000, Duration::ZERO).await;
        server.coordinator.set_accepting(true);

        let status: serde_json::Value = client()
            .get(format!("http://{}/status", server.addr))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(status["state"], "idle");
        assert_eq!(status["accepting"], true);
        // The status request's own connection is live while it is served.
        assert_eq!(status["live_connections"], 1);
    }
}
