//! Tests for the fallback coordinator
//!
//! Providers are mockall doubles; time is paused so backoff sleeps complete
//! instantly while keeping their ordering.

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use mockall::mock;
    use tokio_util::sync::CancellationToken;

    use crate::core::{JudgeMessage, JudgeProvider, JudgeRequest, RawReply};
    use crate::error::{JudgeError, ProviderError};
    use crate::fallback::{cache_key, FallbackCoordinator, MemoryCache, ServedBy};
    use crate::resilience::{
        CircuitBreakerConfig, CircuitState, ManualClock, RetryPolicy, TokioClock,
    };

    mock! {
        pub Provider {}

        #[async_trait]
        impl JudgeProvider for Provider {
            async fn invoke(&self, request: JudgeRequest) -> Result<RawReply, ProviderError>;
            async fn close(&self);
        }
    }

    /// Provider that never answers before being torn down
    struct HangingProvider;

    #[async_trait]
    impl JudgeProvider for HangingProvider {
        async fn invoke(&self, _request: JudgeRequest) -> Result<RawReply, ProviderError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(RawReply::new("too late", "hanging"))
        }
    }

    fn coordinator() -> FallbackCoordinator {
        FallbackCoordinator::new(
            RetryPolicy::default(),
            CircuitBreakerConfig::default(),
            Duration::from_secs(5),
            Arc::new(TokioClock),
        )
    }

    fn request(text: &str) -> JudgeRequest {
        JudgeRequest::new(vec![JudgeMessage::system("judge"), JudgeMessage::user(text)])
    }

    fn always_failing(status: u16, times: usize) -> MockProvider {
        let mut provider = MockProvider::new();
        provider
            .expect_invoke()
            .times(times)
            .returning(move |_| Err(ProviderError::http(status, "upstream failure")));
        provider
    }

    fn always_answering(name: &'static str, text: &'static str, times: usize) -> MockProvider {
        let mut provider = MockProvider::new();
        provider
            .expect_invoke()
            .times(times)
            .returning(move |_| Ok(RawReply::new(text, name)));
        provider
    }

    #[tokio::test(start_paused = true)]
    async fn test_failover_opens_breaker_on_primary() {
        // Request 1: four attempts on A. Request 2: the fifth failure opens A.
        // Request 3: A is skipped outright.
        let a_calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&a_calls);
        let mut a = MockProvider::new();
        a.expect_invoke().returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) < 5 {
                Err(ProviderError::http(500, "upstream failure"))
            } else {
                Ok(RawReply::new("{\"score\": 2}", "a"))
            }
        });
        let b = always_answering("b", "{\"score\": 4}", 3);
        let coordinator = coordinator()
            .with_provider("a", Arc::new(a))
            .with_provider("b", Arc::new(b));
        let cancel = CancellationToken::new();

        for i in 0..3 {
            let req = request(&format!("candidate {}", i));
            let key = cache_key(&req);
            let response = coordinator.execute(req, &key, &cancel).await.unwrap();
            assert_eq!(response.served_by, ServedBy::Provider("b".to_string()));
            assert!(!response.degraded);
            assert_eq!(response.confidence, 1.0);
            assert_eq!(response.payload.unwrap().text, "{\"score\": 4}");
        }
        assert_eq!(a_calls.load(Ordering::SeqCst), 5);

        let health = coordinator.health();
        assert_eq!(health[0].name, "a");
        assert_eq!(health[0].state, CircuitState::Open);
        assert!(health[0].last_opened_at.is_some());
        assert_eq!(health[1].state, CircuitState::Closed);

        // A stays untouched until its cool-down elapses, then gets one trial
        tokio::time::advance(Duration::from_secs(30)).await;
        let req = request("after cool-down");
        let key = cache_key(&req);
        let response = coordinator.execute(req, &key, &cancel).await.unwrap();

        assert_eq!(response.served_by, ServedBy::Provider("a".to_string()));
        assert_eq!(a_calls.load(Ordering::SeqCst), 6);
        assert_eq!(coordinator.health()[0].state, CircuitState::Closed);
        assert_eq!(coordinator.health()[0].consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_trial_reopens_without_backoff() {
        let a_calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&a_calls);
        let mut a = MockProvider::new();
        a.expect_invoke().returning(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(ProviderError::http(500, "upstream failure"))
        });
        let b = always_answering("b", "ok", 3);
        let coordinator = FallbackCoordinator::new(
            RetryPolicy::default(),
            CircuitBreakerConfig {
                failure_threshold: 1,
                ..CircuitBreakerConfig::default()
            },
            Duration::from_secs(5),
            Arc::new(TokioClock),
        )
        .with_provider("a", Arc::new(a))
        .with_provider("b", Arc::new(b));
        let cancel = CancellationToken::new();

        // The failure that opens A hands over to B at once
        let started = tokio::time::Instant::now();
        let req = request("first");
        let key = cache_key(&req);
        let response = coordinator.execute(req, &key, &cancel).await.unwrap();
        assert_eq!(response.served_by, ServedBy::Provider("b".to_string()));
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(a_calls.load(Ordering::SeqCst), 1);

        // The single half-open trial fails and the circuit reopens
        tokio::time::advance(Duration::from_secs(30)).await;
        let started = tokio::time::Instant::now();
        let req = request("second");
        let key = cache_key(&req);
        let response = coordinator.execute(req, &key, &cancel).await.unwrap();
        assert_eq!(response.served_by, ServedBy::Provider("b".to_string()));
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(a_calls.load(Ordering::SeqCst), 2);
        assert_eq!(coordinator.health()[0].state, CircuitState::Open);

        let req = request("third");
        let key = cache_key(&req);
        coordinator.execute(req, &key, &cancel).await.unwrap();
        assert_eq!(a_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_manual_clock_drives_coordinator() {
        let clock = Arc::new(ManualClock::new());
        let a = always_answering("a", "{\"score\": 3}", 40);
        let coordinator = FallbackCoordinator::new(
            RetryPolicy::default(),
            CircuitBreakerConfig::default(),
            Duration::from_secs(30),
            clock.clone(),
        )
        .with_provider("a", Arc::new(a))
        .with_cache(
            Arc::new(MemoryCache::with_clock(16, clock.clone())),
            Duration::from_secs(600),
        );
        let cancel = CancellationToken::new();

        for i in 0..40 {
            let req = request(&format!("candidate {}", i));
            let key = cache_key(&req);
            let response = coordinator.execute(req, &key, &cancel).await.unwrap();
            assert_eq!(response.served_by, ServedBy::Provider("a".to_string()));
            assert!(!response.degraded);
        }

        assert_eq!(clock.elapsed(), Duration::ZERO);
        assert_eq!(coordinator.health()[0].consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limits_fail_over_without_tripping() {
        // One attempt plus five rate-limit retries
        let a = always_failing(429, 6);
        let b = always_answering("b", "ok", 1);
        let coordinator = coordinator()
            .with_provider("a", Arc::new(a))
            .with_provider("b", Arc::new(b));

        let req = request("candidate");
        let key = cache_key(&req);
        let response = coordinator
            .execute(req, &key, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(response.served_by, ServedBy::Provider("b".to_string()));
        assert_eq!(coordinator.health()[0].state, CircuitState::Closed);
        assert_eq!(coordinator.health()[0].consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_authentication_error_is_fatal() {
        let a = always_failing(401, 1);
        let b = always_answering("b", "never", 0);
        let coordinator = coordinator()
            .with_provider("a", Arc::new(a))
            .with_provider("b", Arc::new(b));

        let req = request("candidate");
        let key = cache_key(&req);
        let err = coordinator
            .execute(req, &key, &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            JudgeError::Authentication { provider, .. } => assert_eq!(provider, "a"),
            other => panic!("expected authentication error, got {:?}", other),
        }
        assert_eq!(coordinator.health()[0].state, CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_reply_served_when_providers_fail() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut a = MockProvider::new();
        a.expect_invoke().returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(RawReply::new("{\"score\": 5}", "a"))
            } else {
                Err(ProviderError::connection("connection reset"))
            }
        });

        let coordinator = coordinator()
            .with_provider("a", Arc::new(a))
            .with_cache(Arc::new(MemoryCache::new(16)), Duration::from_secs(600))
            .with_degraded_confidence(0.5);
        let cancel = CancellationToken::new();

        let req = request("same candidate");
        let key = cache_key(&req);
        let live = coordinator.execute(req.clone(), &key, &cancel).await.unwrap();
        assert_eq!(live.served_by, ServedBy::Provider("a".to_string()));

        let replay = coordinator.execute(req, &key, &cancel).await.unwrap();
        assert_eq!(replay.served_by, ServedBy::Cache);
        assert!(replay.degraded);
        assert_eq!(replay.confidence, 0.5);
        let reply = replay.payload.unwrap();
        assert_eq!(reply.text, "{\"score\": 5}");
        assert_eq!(reply.provider, "a");

        // First success, then one attempt plus three transient retries
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_without_cache() {
        let a = always_failing(503, 4);
        let coordinator = coordinator().with_provider("a", Arc::new(a));

        let req = request("candidate");
        let key = cache_key(&req);
        let response = coordinator
            .execute(req, &key, &CancellationToken::new())
            .await
            .unwrap();

        assert!(response.is_unavailable());
        assert_eq!(response.served_by, ServedBy::None);
        assert_eq!(response.confidence, 0.0);
        assert!(response.degraded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_in_flight_call() {
        let coordinator = coordinator().with_provider("slow", Arc::new(HangingProvider));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let req = request("candidate");
        let key = cache_key(&req);
        let err = coordinator.execute(req, &key, &cancel).await.unwrap_err();

        assert_eq!(err, JudgeError::Cancelled);
        // Cancellation says nothing about provider health
        assert_eq!(coordinator.health()[0].consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_provider_times_out_and_fails_over() {
        let b = always_answering("b", "fine", 1);
        let coordinator = coordinator()
            .with_provider("slow", Arc::new(HangingProvider))
            .with_provider("b", Arc::new(b));

        let req = request("candidate");
        let key = cache_key(&req);
        let response = coordinator
            .execute(req, &key, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(response.served_by, ServedBy::Provider("b".to_string()));
        // Three timed out attempts: the first plus two timeout retries
        assert_eq!(coordinator.health()[0].consecutive_failures, 3);
    }

    #[test]
    fn test_cache_key_depends_on_content() {
        let a = cache_key(&request("one"));
        assert_eq!(a, cache_key(&request("one")));
        assert_ne!(a, cache_key(&request("two")));
    }

    #[tokio::test]
    async fn test_close_releases_every_provider() {
        let mut a = MockProvider::new();
        a.expect_close().times(1).returning(|| ());
        let mut b = MockProvider::new();
        b.expect_close().times(1).returning(|| ());

        let coordinator = coordinator()
            .with_provider("a", Arc::new(a))
            .with_provider("b", Arc::new(b));
        coordinator.close().await;
    }
}
