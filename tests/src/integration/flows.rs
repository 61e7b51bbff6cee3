//! # Integration Test Flows
//!
//! Tests that lm-01-publisher, lm-02-consumer-host, and lm-03-journal work
//! together correctly over the shared bus.
//!
//! ## Flows Tested
//!
//! 1. **Publisher (01) → Consumer Host (02)**: sealed envelopes are
//!    verified and dispatched to the registered handler
//! 2. **Publisher (01) → Journal (03)**: every hop of a flow is
//!    reconstructable from one correlation id
//! 3. **Key rotation**: old and new signing keys verify during the
//!    overlap window; purged keys fail closed
//! 4. **Failure paths**: forged signatures and exhausted retries land in
//!    the dead letter queue with their reason chains
//! 5. **Broadcast (05)**: threshold decisions over partially failing
//!    settlement networks

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use tokio::sync::watch;
    use tokio::time::sleep;

    // Shared infrastructure
    use shared_bus::{InMemoryBus, QueueBinding, QueueTransport, RoutingRule};
    use shared_crypto::{
        CanonicalPayload, Ed25519Scheme, EnvelopeSigner, KeyRing, KeyRingConfig, PublishedKey,
        StaticKeyServer,
    };
    use shared_types::{
        BackoffPolicy, BreakerRegistry, BroadcastConfig, CircuitBreakerConfig, ConsumerConfig,
        DetailType, EventEnvelope, HandlerError, NetworkConfig, PublisherConfig, ResourceUrn,
        TraceContext,
    };

    // Subsystems under test
    use lm_01_publisher::EventPublisher;
    use lm_02_consumer_host::{ConsumerHost, EventHandler, HandlerRegistry};
    use lm_03_journal::{InMemoryJournal, Journal, ProcessingStatus};
    use lm_05_broadcast::{BroadcastCoordinator, BroadcastOutcome, MockNetworkClient, NetworkStatus};

    const TOPIC: &str = "mesh.events";
    const QUEUE: &str = "ledger.commands";

    // =========================================================================
    // TEST FIXTURES
    // =========================================================================

    /// Generate a fresh signing identity and its published verification key.
    fn keypair(key_id: &str) -> (EnvelopeSigner, PublishedKey) {
        let scheme = Arc::new(Ed25519Scheme::generate());
        let signer = EnvelopeSigner::new(scheme, key_id);
        let key = PublishedKey {
            key_id: signer.key_id().to_string(),
            algorithm: signer.algorithm().to_string(),
            public_key: signer.public_key(),
        };
        (signer, key)
    }

    /// Seal an envelope directly, bypassing the publisher.
    fn seal(signer: &EnvelopeSigner, payload: Value) -> EventEnvelope {
        let canonical = CanonicalPayload::new(payload).unwrap();
        let signature = signer.envelope_signature(canonical.bytes()).unwrap();
        EventEnvelope::sealed(
            "payments",
            DetailType::parse("Payment.Initiated.v1").unwrap(),
            ResourceUrn::parse("urn:payments:payment:p-1").unwrap(),
            TraceContext::new(),
            canonical.into_bytes(),
            signature,
        )
        .unwrap()
    }

    /// Consumer profile tuned for test speed.
    fn fast_consumer() -> ConsumerConfig {
        ConsumerConfig {
            max_retries: 3,
            poll_wait: Duration::from_millis(50),
            visibility_timeout: Duration::from_secs(5),
            handler_timeout: Duration::from_millis(500),
            redelivery_backoff: BackoffPolicy {
                base: Duration::from_millis(10),
                cap: Duration::from_millis(50),
                max_attempts: 3,
            },
            ..ConsumerConfig::for_queue(QUEUE)
        }
    }

    /// Handler that records decoded payloads, optionally failing the first
    /// N deliveries transiently.
    #[derive(Default)]
    struct RecordingHandler {
        seen: Mutex<Vec<Value>>,
        fail_first: AtomicU32,
    }

    impl RecordingHandler {
        fn failing_first(n: u32) -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
                fail_first: AtomicU32::new(n),
            }
        }
    }

    #[async_trait]
    impl EventHandler for RecordingHandler {
        async fn handle(&self, envelope: &EventEnvelope) -> Result<(), HandlerError> {
            if self.fail_first.load(Ordering::SeqCst) > 0 {
                self.fail_first.fetch_sub(1, Ordering::SeqCst);
                return Err(HandlerError::transient("ledger busy"));
            }
            let payload: Value = serde_json::from_slice(envelope.detail_core())
                .map_err(|e| HandlerError::permanent(e.to_string()))?;
            self.seen.lock().push(payload);
            Ok(())
        }
    }

    /// Spawn a consumer host draining `QUEUE`; returns its shutdown switch.
    fn start_host(
        bus: Arc<InMemoryBus>,
        journal: Arc<InMemoryJournal>,
        keyring: Arc<KeyRing>,
        registry: HandlerRegistry,
    ) -> (watch::Sender<bool>, tokio::task::JoinHandle<()>) {
        start_host_with(bus, journal, keyring, registry, fast_consumer())
    }

    fn start_host_with(
        bus: Arc<InMemoryBus>,
        journal: Arc<InMemoryJournal>,
        keyring: Arc<KeyRing>,
        registry: HandlerRegistry,
        config: ConsumerConfig,
    ) -> (watch::Sender<bool>, tokio::task::JoinHandle<()>) {
        let host = ConsumerHost::new(
            "ledger",
            config,
            bus,
            keyring,
            Arc::new(registry),
            journal,
        );
        let (shutdown, rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let _ = host.run(rx).await;
        });
        (shutdown, task)
    }

    /// Poll until `done` holds or the budget runs out.
    async fn wait_until(mut done: impl FnMut() -> bool) {
        for _ in 0..200 {
            if done() {
                return;
            }
            sleep(Duration::from_millis(20)).await;
        }
    }

    /// Poll until the queue's DLQ is non-empty, then return its contents.
    async fn wait_for_dead_letters(bus: &InMemoryBus) -> Vec<shared_bus::DeadLetter> {
        for _ in 0..200 {
            let dead = bus.dead_letters(QUEUE).await.unwrap();
            if !dead.is_empty() {
                return dead;
            }
            sleep(Duration::from_millis(20)).await;
        }
        panic!("timed out waiting for a dead letter");
    }

    // =========================================================================
    // INTEGRATION TESTS: PUBLISH → VERIFY → DISPATCH
    // =========================================================================

    /// One published event is verified, handled, deleted, and leaves a
    /// complete journal trail under its correlation id.
    #[tokio::test]
    async fn test_published_event_reaches_handler_with_full_journal_trail() {
        mesh_telemetry::init_for_tests();
        let bus = Arc::new(InMemoryBus::new());
        bus.bind(TOPIC, QueueBinding::new(QUEUE, RoutingRule::from_source("payments")));
        let journal = Arc::new(InMemoryJournal::new());

        let (signer, key) = keypair("2026-08-primary");
        let server = Arc::new(StaticKeyServer::new(vec![key]));
        let keyring = Arc::new(KeyRing::new(server, KeyRingConfig::default()));

        let handler = Arc::new(RecordingHandler::default());
        let registry = HandlerRegistry::new().register(
            "payments",
            DetailType::parse("Payment.Initiated.v1").unwrap(),
            handler.clone(),
        );
        let (shutdown, task) = start_host(bus.clone(), journal.clone(), keyring, registry);

        let publisher = EventPublisher::new(
            PublisherConfig::new("payments", TOPIC),
            signer,
            bus.clone(),
            journal.clone(),
        );
        let envelope = publisher
            .publish(
                DetailType::parse("Payment.Initiated.v1").unwrap(),
                ResourceUrn::parse("urn:payments:payment:p-100").unwrap(),
                TraceContext::new(),
                json!({ "amount": "125.00", "currency": "EUR" }),
            )
            .await
            .unwrap();

        wait_until(|| journal.len() >= 4).await;
        shutdown.send(true).unwrap();
        task.await.unwrap();

        assert_eq!(
            handler.seen.lock().clone(),
            vec![json!({ "amount": "125.00", "currency": "EUR" })]
        );

        let trail = journal.by_correlation(envelope.correlation_id()).await.unwrap();
        // The trail comes back in recorded_at order, even though appends
        // race, and only ever uses the four hop statuses.
        assert!(trail.windows(2).all(|w| w[0].recorded_at <= w[1].recorded_at));
        let statuses: Vec<ProcessingStatus> = trail.iter().map(|e| e.status).collect();
        assert!(statuses.iter().all(|s| matches!(
            s,
            ProcessingStatus::Received
                | ProcessingStatus::Verified
                | ProcessingStatus::Rejected
                | ProcessingStatus::Dispatched
        )));
        assert!(statuses.contains(&ProcessingStatus::Received));
        assert!(statuses.contains(&ProcessingStatus::Verified));
        // One Dispatched for the publish hop, one for the handler success.
        assert_eq!(
            statuses
                .iter()
                .filter(|s| **s == ProcessingStatus::Dispatched)
                .count(),
            2
        );

        assert!(bus.dead_letters(QUEUE).await.unwrap().is_empty());
    }

    /// An envelope signed by a key the distribution endpoint never
    /// published is dead-lettered on first delivery, without retry.
    #[tokio::test]
    async fn test_forged_signature_dead_letters_without_retry() {
        mesh_telemetry::init_for_tests();
        let bus = Arc::new(InMemoryBus::new());
        bus.bind(TOPIC, QueueBinding::new(QUEUE, RoutingRule::from_source("payments")));
        let journal = Arc::new(InMemoryJournal::new());

        // The forger reuses the published key id but holds a different key.
        let (forger, _forger_key) = keypair("2026-08-primary");
        let (_legit, published) = keypair("2026-08-primary");
        let server = Arc::new(StaticKeyServer::new(vec![published]));
        let keyring = Arc::new(KeyRing::new(server, KeyRingConfig::default()));

        let handler = Arc::new(RecordingHandler::default());
        let registry = HandlerRegistry::new().register(
            "payments",
            DetailType::parse("Payment.Initiated.v1").unwrap(),
            handler.clone(),
        );
        let (shutdown, task) = start_host(bus.clone(), journal.clone(), keyring, registry);

        let publisher = EventPublisher::new(
            PublisherConfig::new("payments", TOPIC),
            forger,
            bus.clone(),
            journal.clone(),
        );
        let envelope = publisher
            .publish(
                DetailType::parse("Payment.Initiated.v1").unwrap(),
                ResourceUrn::parse("urn:payments:payment:p-666").unwrap(),
                TraceContext::new(),
                json!({ "amount": "999999.00" }),
            )
            .await
            .unwrap();

        let dead = wait_for_dead_letters(&bus).await;
        shutdown.send(true).unwrap();
        task.await.unwrap();

        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].reasons.len(), 1, "no retries for a bad signature");
        assert!(dead[0].reasons[0].starts_with("SignatureInvalid"));
        assert!(handler.seen.lock().is_empty(), "handler must never see it");

        let trail = journal.by_correlation(envelope.correlation_id()).await.unwrap();
        assert!(trail.iter().any(|e| e.status == ProcessingStatus::Rejected));
    }

    /// A handler failing the first three deliveries transiently succeeds on
    /// the fourth, well inside a retry budget of five; the message is
    /// deleted exactly once and nothing is dead-lettered.
    #[tokio::test]
    async fn test_transient_failures_redeliver_until_success() {
        mesh_telemetry::init_for_tests();
        let bus = Arc::new(InMemoryBus::new());
        bus.bind(TOPIC, QueueBinding::new(QUEUE, RoutingRule::from_source("payments")));
        let journal = Arc::new(InMemoryJournal::new());

        let (signer, key) = keypair("2026-08-primary");
        let server = Arc::new(StaticKeyServer::new(vec![key]));
        let keyring = Arc::new(KeyRing::new(server, KeyRingConfig::default()));

        let handler = Arc::new(RecordingHandler::failing_first(3));
        let registry = HandlerRegistry::new().register(
            "payments",
            DetailType::parse("Payment.Initiated.v1").unwrap(),
            handler.clone(),
        );
        let (shutdown, task) = start_host_with(
            bus.clone(),
            journal.clone(),
            keyring,
            registry,
            ConsumerConfig {
                max_retries: 5,
                ..fast_consumer()
            },
        );

        let publisher = EventPublisher::new(
            PublisherConfig::new("payments", TOPIC),
            signer,
            bus.clone(),
            journal.clone(),
        );
        publisher
            .publish(
                DetailType::parse("Payment.Initiated.v1").unwrap(),
                ResourceUrn::parse("urn:payments:payment:p-7").unwrap(),
                TraceContext::new(),
                json!({ "amount": "10.00" }),
            )
            .await
            .unwrap();

        wait_until(|| !handler.seen.lock().is_empty()).await;
        shutdown.send(true).unwrap();
        task.await.unwrap();

        assert_eq!(handler.seen.lock().len(), 1);
        assert!(bus.dead_letters(QUEUE).await.unwrap().is_empty());
    }

    /// A handler that never recovers exhausts the retry budget; the dead
    /// letter carries the reason of every attempt, oldest first.
    #[tokio::test]
    async fn test_retry_exhaustion_lands_reason_chain_in_dlq() {
        mesh_telemetry::init_for_tests();
        let bus = Arc::new(InMemoryBus::new());
        bus.bind(TOPIC, QueueBinding::new(QUEUE, RoutingRule::from_source("payments")));
        let journal = Arc::new(InMemoryJournal::new());

        let (signer, key) = keypair("2026-08-primary");
        let server = Arc::new(StaticKeyServer::new(vec![key]));
        let keyring = Arc::new(KeyRing::new(server, KeyRingConfig::default()));

        let handler = Arc::new(RecordingHandler::failing_first(u32::MAX));
        let registry = HandlerRegistry::new().register(
            "payments",
            DetailType::parse("Payment.Initiated.v1").unwrap(),
            handler.clone(),
        );
        let (shutdown, task) = start_host(bus.clone(), journal.clone(), keyring, registry);

        let publisher = EventPublisher::new(
            PublisherConfig::new("payments", TOPIC),
            signer,
            bus.clone(),
            journal.clone(),
        );
        publisher
            .publish(
                DetailType::parse("Payment.Initiated.v1").unwrap(),
                ResourceUrn::parse("urn:payments:payment:p-8").unwrap(),
                TraceContext::new(),
                json!({ "amount": "10.00" }),
            )
            .await
            .unwrap();

        let dead = wait_for_dead_letters(&bus).await;
        shutdown.send(true).unwrap();
        task.await.unwrap();

        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].reasons.len(), 3, "one reason per attempt");
        assert!(dead[0].reasons[0].starts_with("attempt 1:"));
        assert!(dead[0].reasons[2].starts_with("attempt 3:"));
    }

    /// One publish fans out to every queue whose routing rule matches.
    #[tokio::test]
    async fn test_fanout_reaches_every_bound_queue() {
        mesh_telemetry::init_for_tests();
        let bus = Arc::new(InMemoryBus::new());
        bus.bind(TOPIC, QueueBinding::new(QUEUE, RoutingRule::from_source("payments")));
        bus.bind(TOPIC, QueueBinding::new("audit.feed", RoutingRule::any()));
        let journal = Arc::new(InMemoryJournal::new());

        let (signer, key) = keypair("2026-08-primary");
        let publisher = EventPublisher::new(
            PublisherConfig::new("payments", TOPIC),
            signer,
            bus.clone(),
            journal.clone(),
        );
        publisher
            .publish(
                DetailType::parse("Payment.Initiated.v1").unwrap(),
                ResourceUrn::parse("urn:payments:payment:p-9").unwrap(),
                TraceContext::new(),
                json!({ "amount": "42.00" }),
            )
            .await
            .unwrap();

        let ledger = bus
            .receive(QUEUE, 10, Duration::from_millis(100), Duration::from_secs(5))
            .await
            .unwrap();
        let audit = bus
            .receive("audit.feed", 10, Duration::from_millis(100), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(audit.len(), 1);
        assert_eq!(
            ledger[0].envelope.correlation_id(),
            audit[0].envelope.correlation_id()
        );
    }

    // =========================================================================
    // INTEGRATION TESTS: KEY ROTATION
    // =========================================================================

    /// During rotation both the outgoing and the incoming key verify; the
    /// new key is picked up by the refresh-on-miss path without restarts.
    #[tokio::test]
    async fn test_key_rotation_overlap_verifies_old_and_new() {
        mesh_telemetry::init_for_tests();
        let (old_signer, old_key) = keypair("2026-07-key");
        let (new_signer, new_key) = keypair("2026-08-key");

        let server = Arc::new(StaticKeyServer::new(vec![old_key]));
        let keyring = KeyRing::new(server.clone(), KeyRingConfig::default());

        let old_envelope = seal(&old_signer, json!({ "amount": "1.00" }));
        keyring.verify_envelope(&old_envelope).await.unwrap();

        // Rotate: the endpoint now serves only the new key.
        server.publish(vec![new_key]);

        let new_envelope = seal(&new_signer, json!({ "amount": "2.00" }));
        keyring.verify_envelope(&new_envelope).await.unwrap();

        // Old signatures stay valid through the overlap window.
        keyring.verify_envelope(&old_envelope).await.unwrap();
    }

    /// Past the overlap window a rotated-out key fails closed.
    #[tokio::test]
    async fn test_rotated_key_fails_after_overlap_window() {
        mesh_telemetry::init_for_tests();
        let (old_signer, old_key) = keypair("2026-07-key");
        let (new_signer, new_key) = keypair("2026-08-key");

        let server = Arc::new(StaticKeyServer::new(vec![old_key]));
        let keyring = KeyRing::new(
            server.clone(),
            KeyRingConfig {
                rotation_overlap: Duration::from_millis(1),
                ..KeyRingConfig::default()
            },
        );

        let old_envelope = seal(&old_signer, json!({ "amount": "1.00" }));
        keyring.verify_envelope(&old_envelope).await.unwrap();

        server.publish(vec![new_key]);
        let new_envelope = seal(&new_signer, json!({ "amount": "2.00" }));
        // Starts the old key's retirement clock via refresh-on-miss.
        keyring.verify_envelope(&new_envelope).await.unwrap();

        sleep(Duration::from_millis(50)).await;
        assert!(keyring.verify_envelope(&old_envelope).await.is_err());
    }

    // =========================================================================
    // INTEGRATION TESTS: MULTI-NETWORK BROADCAST
    // =========================================================================

    fn fast_broadcast(networks: &[&str]) -> BroadcastConfig {
        let mut config = BroadcastConfig::default();
        for id in networks {
            config.networks.insert(
                (*id).to_string(),
                NetworkConfig {
                    confirmation_threshold: 1,
                    poll_interval: Duration::from_millis(10),
                },
            );
        }
        config
    }

    /// A signed envelope broadcast to partially failing networks still
    /// succeeds once the success threshold is met.
    #[tokio::test]
    async fn test_broadcast_meets_threshold_despite_rejection() {
        mesh_telemetry::init_for_tests();
        let (signer, _key) = keypair("2026-08-primary");
        let envelope = seal(&signer, json!({ "amount": "50.00" }));

        let breakers = Arc::new(BreakerRegistry::new(CircuitBreakerConfig::default()));
        let coordinator =
            BroadcastCoordinator::new(fast_broadcast(&["visa", "sepa", "ach"]), breakers)
                .with_network("visa", Arc::new(MockNetworkClient::confirming()))
                .with_network("sepa", Arc::new(MockNetworkClient::confirming()))
                .with_network("ach", Arc::new(MockNetworkClient::rejecting("amount cap")));

        let handle = coordinator
            .broadcast(envelope, 2, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(handle.outcome, BroadcastOutcome::Succeeded);

        wait_until(|| {
            matches!(
                handle.statuses().get("ach"),
                Some(NetworkStatus::Failed { .. })
            )
        })
        .await;
        let statuses = handle.statuses();
        assert!(matches!(statuses.get("ach"), Some(NetworkStatus::Failed { reason }) if reason.contains("amount cap")));
    }

    /// When enough networks reject, the decision fails early even though
    /// the remaining networks would eventually confirm.
    #[tokio::test]
    async fn test_broadcast_fails_early_when_threshold_unreachable() {
        mesh_telemetry::init_for_tests();
        let (signer, _key) = keypair("2026-08-primary");
        let envelope = seal(&signer, json!({ "amount": "50.00" }));

        let breakers = Arc::new(BreakerRegistry::new(CircuitBreakerConfig::default()));
        let coordinator =
            BroadcastCoordinator::new(fast_broadcast(&["visa", "sepa", "ach"]), breakers)
                .with_network("visa", Arc::new(MockNetworkClient::slow(Duration::from_secs(30))))
                .with_network("sepa", Arc::new(MockNetworkClient::rejecting("sanctions hit")))
                .with_network("ach", Arc::new(MockNetworkClient::rejecting("amount cap")));

        let handle = coordinator
            .broadcast(envelope, 2, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(handle.outcome, BroadcastOutcome::Failed);
    }
}
