//! # End-to-End Choreography Tests
//!
//! Tests the complete card-payment flow across every subsystem:
//!
//! ```text
//! [Saga Orchestrator (04)]
//!      │ reserve-funds          │ capture-funds         │ settle
//!      ▼                        ▼                       ▼
//! Payment.Reserved.v1     Payment.Captured.v1     Payment.Settled.v1
//!      │                        │                       │ + broadcast (05)
//!      └────────► [Publisher (01)] ──► [Bus] ──► [Consumer Host (02)]
//!                        │                               │
//!                        └──────► [Journal (03)] ◄───────┘
//!                                      │
//!                               [Gateway (06)]
//! ```
//!
//! ## Test Categories
//!
//! 1. **Happy Path**: every step publishes, the ledger consumes in order
//! 2. **Compensation**: a declined capture voids the reservation
//! 3. **Settlement**: the broadcast threshold gates the final step
//! 4. **Operator Views**: the gateway reconstructs the finished flow

// =============================================================================
// TEST FIXTURES (only compiled during tests)
// =============================================================================

#[cfg(test)]
use std::sync::Arc;

#[cfg(test)]
use std::time::Duration;

#[cfg(test)]
use async_trait::async_trait;

#[cfg(test)]
use parking_lot::Mutex;

#[cfg(test)]
use serde_json::{json, Value};

#[cfg(test)]
use tokio::sync::watch;

#[cfg(test)]
use shared_bus::{InMemoryBus, QueueBinding, QueueTransport, RoutingRule};

#[cfg(test)]
use shared_crypto::{Ed25519Scheme, EnvelopeSigner, KeyRing, KeyRingConfig, PublishedKey, StaticKeyServer};

#[cfg(test)]
use shared_types::{
    BackoffPolicy, BreakerRegistry, BroadcastConfig, CircuitBreakerConfig, ConsumerConfig,
    DetailType, EventEnvelope, HandlerError, NetworkConfig, PublisherConfig, ResourceUrn,
    SagaConfig, TraceContext,
};

#[cfg(test)]
use lm_01_publisher::EventPublisher;

#[cfg(test)]
use lm_02_consumer_host::{ConsumerHost, EventHandler, HandlerRegistry};

#[cfg(test)]
use lm_03_journal::{InMemoryJournal, Journal, ProcessingStatus};

#[cfg(test)]
use lm_04_saga::{InMemorySagaStore, SagaContext, SagaDefinition, SagaOrchestrator, SagaState, StepAction};

#[cfg(test)]
use lm_05_broadcast::{BroadcastCoordinator, BroadcastOutcome, MockNetworkClient};

#[cfg(test)]
const TOPIC: &str = "mesh.events";

#[cfg(test)]
const QUEUE: &str = "ledger.commands";

#[cfg(test)]
const EVENT_TYPES: [&str; 4] = [
    "Payment.Reserved.v1",
    "Payment.Captured.v1",
    "Payment.Voided.v1",
    "Payment.Settled.v1",
];

/// Records the detail type of every envelope the ledger consumes.
#[cfg(test)]
#[derive(Default)]
struct LedgerHandler {
    seen: Mutex<Vec<String>>,
}

#[cfg(test)]
#[async_trait]
impl EventHandler for LedgerHandler {
    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), HandlerError> {
        self.seen.lock().push(envelope.detail_type().to_string());
        Ok(())
    }
}

/// Everything a payment flow needs, wired over one in-memory bus.
#[cfg(test)]
struct PaymentRig {
    bus: Arc<InMemoryBus>,
    journal: Arc<InMemoryJournal>,
    store: Arc<InMemorySagaStore>,
    server: Arc<StaticKeyServer>,
    publisher: Arc<EventPublisher>,
    ledger: Arc<LedgerHandler>,
    shutdown: watch::Sender<bool>,
    host: tokio::task::JoinHandle<()>,
}

#[cfg(test)]
impl PaymentRig {
    /// Wire the full mesh: signed publisher, verifying consumer host on a
    /// FIFO ledger queue, shared journal, saga store, key server.
    fn start() -> Self {
        mesh_telemetry::init_for_tests();

        let bus = Arc::new(InMemoryBus::new());
        bus.bind(
            TOPIC,
            QueueBinding::fifo(QUEUE, RoutingRule::from_source("payments")),
        );
        let journal = Arc::new(InMemoryJournal::new());
        let store = Arc::new(InMemorySagaStore::new());

        let scheme = Arc::new(Ed25519Scheme::generate());
        let signer = EnvelopeSigner::new(scheme, "2026-08-payments");
        let server = Arc::new(StaticKeyServer::new(vec![PublishedKey {
            key_id: signer.key_id().to_string(),
            algorithm: signer.algorithm().to_string(),
            public_key: signer.public_key(),
        }]));
        let keyring = Arc::new(KeyRing::new(server.clone(), KeyRingConfig::default()));

        let ledger = Arc::new(LedgerHandler::default());
        let mut registry = HandlerRegistry::new();
        for event_type in EVENT_TYPES {
            registry = registry.register(
                "payments",
                DetailType::parse(event_type).unwrap(),
                ledger.clone(),
            );
        }

        let config = ConsumerConfig {
            poll_wait: Duration::from_millis(50),
            visibility_timeout: Duration::from_secs(5),
            handler_timeout: Duration::from_millis(500),
            redelivery_backoff: BackoffPolicy {
                base: Duration::from_millis(10),
                cap: Duration::from_millis(50),
                max_attempts: 3,
            },
            ..ConsumerConfig::for_queue(QUEUE)
        };
        let consumer = ConsumerHost::new(
            "ledger",
            config,
            bus.clone(),
            keyring,
            Arc::new(registry),
            journal.clone(),
        );
        let (shutdown, rx) = watch::channel(false);
        let host = tokio::spawn(async move {
            let _ = consumer.run(rx).await;
        });

        let publisher = Arc::new(EventPublisher::new(
            PublisherConfig::new("payments", TOPIC),
            signer,
            bus.clone(),
            journal.clone(),
        ));

        Self {
            bus,
            journal,
            store,
            server,
            publisher,
            ledger,
            shutdown,
            host,
        }
    }

    fn orchestrator(&self, definition: SagaDefinition) -> SagaOrchestrator {
        SagaOrchestrator::new(self.store.clone(), SagaConfig::default()).with_definition(definition)
    }

    /// Wait until the ledger has consumed `count` events.
    async fn wait_for_ledger(&self, count: usize) {
        for _ in 0..200 {
            if self.ledger.seen.lock().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!(
            "timed out waiting for {count} ledger events, saw {:?}",
            self.ledger.seen.lock()
        );
    }

    async fn stop(self) {
        self.shutdown.send(true).unwrap();
        self.host.await.unwrap();
    }
}

/// Saga step that announces its completion as a signed mesh event and
/// optionally announces its undo during compensation.
#[cfg(test)]
struct PublishStep {
    publisher: Arc<EventPublisher>,
    payment: ResourceUrn,
    forward: &'static str,
    undo: Option<&'static str>,
    decline: bool,
}

#[cfg(test)]
impl PublishStep {
    async fn announce(&self, ctx: &SagaContext, action: &str) -> Result<(), HandlerError> {
        let detail_type = DetailType::parse(&format!("Payment.{action}.v1"))
            .map_err(|e| HandlerError::permanent(e.to_string()))?;
        self.publisher
            .publish(
                detail_type,
                self.payment.clone(),
                ctx.trace.clone(),
                json!({ "payment": self.payment.id(), "action": action }),
            )
            .await
            .map_err(|e| HandlerError::transient(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
#[async_trait]
impl StepAction for PublishStep {
    async fn execute(&self, ctx: &SagaContext) -> Result<Value, HandlerError> {
        if self.decline {
            return Err(HandlerError::permanent("issuer declined capture"));
        }
        self.announce(ctx, self.forward).await?;
        Ok(json!({ "event": self.forward }))
    }

    async fn compensate(&self, ctx: &SagaContext) -> Result<(), HandlerError> {
        if let Some(undo) = self.undo {
            self.announce(ctx, undo).await?;
        }
        Ok(())
    }
}

/// Final saga step: publish the settlement event and broadcast it to the
/// configured settlement networks under a success threshold.
#[cfg(test)]
struct SettleStep {
    publisher: Arc<EventPublisher>,
    payment: ResourceUrn,
    coordinator: Arc<BroadcastCoordinator>,
    required: usize,
}

#[cfg(test)]
#[async_trait]
impl StepAction for SettleStep {
    async fn execute(&self, ctx: &SagaContext) -> Result<Value, HandlerError> {
        let envelope = self
            .publisher
            .publish(
                DetailType::parse("Payment.Settled.v1").unwrap(),
                self.payment.clone(),
                ctx.trace.clone(),
                json!({ "payment": self.payment.id() }),
            )
            .await
            .map_err(|e| HandlerError::transient(e.to_string()))?;

        let handle = self
            .coordinator
            .broadcast(envelope, self.required, Duration::from_secs(5))
            .await
            .map_err(|e| HandlerError::permanent(e.to_string()))?;
        match handle.outcome {
            BroadcastOutcome::Succeeded => Ok(json!({ "broadcast": "succeeded" })),
            BroadcastOutcome::Failed => {
                Err(HandlerError::transient("settlement threshold not met"))
            }
        }
    }

    async fn compensate(&self, _ctx: &SagaContext) -> Result<(), HandlerError> {
        Ok(())
    }
}

#[cfg(test)]
fn payment_urn(id: &str) -> ResourceUrn {
    ResourceUrn::new("payments", "payment", id).unwrap()
}

#[cfg(test)]
fn card_payment_definition(rig: &PaymentRig, payment: &ResourceUrn, decline_capture: bool) -> SagaDefinition {
    SagaDefinition::new("card-payment")
        .step(
            "reserve-funds",
            Arc::new(PublishStep {
                publisher: rig.publisher.clone(),
                payment: payment.clone(),
                forward: "Reserved",
                undo: Some("Voided"),
                decline: false,
            }),
        )
        .step(
            "capture-funds",
            Arc::new(PublishStep {
                publisher: rig.publisher.clone(),
                payment: payment.clone(),
                forward: "Captured",
                undo: None,
                decline: decline_capture,
            }),
        )
}

#[cfg(test)]
fn fast_networks(ids: &[&str]) -> BroadcastConfig {
    let mut config = BroadcastConfig::default();
    for id in ids {
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

// =============================================================================
// HAPPY PATH
// =============================================================================

#[cfg(test)]
mod happy_path {
    use super::*;

    /// Both forward steps publish, the ledger consumes them in order, and
    /// the whole flow is reconstructable from the saga's correlation id.
    #[tokio::test]
    async fn test_payment_saga_completes_and_ledger_consumes_in_order() {
        let rig = PaymentRig::start();
        let payment = payment_urn("p-1001");
        let orchestrator = rig.orchestrator(card_payment_definition(&rig, &payment, false));

        let trace = TraceContext::new();
        let instance = orchestrator
            .start("card-payment", trace.clone(), json!({ "amount": "50.00" }))
            .await
            .unwrap();

        assert_eq!(instance.state, SagaState::Completed);
        assert_eq!(instance.completed.len(), 2);
        assert!(instance.failure.is_none());

        rig.wait_for_ledger(2).await;
        assert_eq!(
            rig.ledger.seen.lock().clone(),
            vec!["Payment.Reserved.v1", "Payment.Captured.v1"],
            "FIFO lane must preserve per-payment order"
        );

        // Journal appends are fire-and-forget; give stragglers a beat. The
        // ledger consumer journals its own Dispatched hops, so count only
        // the publisher's.
        let mut dispatched = 0;
        for _ in 0..100 {
            let trail = rig.journal.by_correlation(trace.correlation_id).await.unwrap();
            dispatched = trail
                .iter()
                .filter(|e| e.status == ProcessingStatus::Dispatched && e.service == "payments")
                .count();
            if dispatched == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(dispatched, 2, "one publish-hop Dispatched entry per event");
        assert!(rig.bus.dead_letters(QUEUE).await.unwrap().is_empty());

        rig.stop().await;
    }
}

// =============================================================================
// COMPENSATION
// =============================================================================

#[cfg(test)]
mod compensation {
    use super::*;

    /// A declined capture compensates the reservation; the ledger sees the
    /// reservation and then its void, never a capture.
    #[tokio::test]
    async fn test_declined_capture_voids_reservation() {
        let rig = PaymentRig::start();
        let payment = payment_urn("p-2001");
        let orchestrator = rig.orchestrator(card_payment_definition(&rig, &payment, true));

        let instance = orchestrator
            .start("card-payment", TraceContext::new(), json!({ "amount": "75.00" }))
            .await
            .unwrap();

        assert_eq!(instance.state, SagaState::Compensated);
        assert!(instance.completed.is_empty(), "undo backlog fully drained");
        assert!(instance
            .failure
            .as_deref()
            .unwrap()
            .contains("issuer declined capture"));

        rig.wait_for_ledger(2).await;
        assert_eq!(
            rig.ledger.seen.lock().clone(),
            vec!["Payment.Reserved.v1", "Payment.Voided.v1"]
        );

        rig.stop().await;
    }
}

// =============================================================================
// SETTLEMENT BROADCAST
// =============================================================================

#[cfg(test)]
mod settlement {
    use super::*;

    /// The settle step only passes once enough settlement networks
    /// confirm; one rejecting network does not sink the saga.
    #[tokio::test]
    async fn test_settlement_threshold_gates_final_step() {
        let rig = PaymentRig::start();
        let payment = payment_urn("p-3001");

        let breakers = Arc::new(BreakerRegistry::new(CircuitBreakerConfig::default()));
        let coordinator = Arc::new(
            BroadcastCoordinator::new(fast_networks(&["visa", "sepa", "ach"]), breakers)
                .with_network("visa", Arc::new(MockNetworkClient::confirming()))
                .with_network("sepa", Arc::new(MockNetworkClient::confirming()))
                .with_network("ach", Arc::new(MockNetworkClient::rejecting("amount cap"))),
        );

        let definition = card_payment_definition(&rig, &payment, false).step(
            "settle",
            Arc::new(SettleStep {
                publisher: rig.publisher.clone(),
                payment: payment.clone(),
                coordinator,
                required: 2,
            }),
        );
        let orchestrator = rig.orchestrator(definition);

        let instance = orchestrator
            .start("card-payment", TraceContext::new(), json!({ "amount": "20.00" }))
            .await
            .unwrap();

        assert_eq!(instance.state, SagaState::Completed);
        assert_eq!(instance.completed.len(), 3);
        assert_eq!(
            instance.completed[2].output,
            json!({ "broadcast": "succeeded" })
        );

        rig.wait_for_ledger(3).await;
        assert_eq!(
            rig.ledger.seen.lock().clone(),
            vec![
                "Payment.Reserved.v1",
                "Payment.Captured.v1",
                "Payment.Settled.v1"
            ]
        );

        rig.stop().await;
    }
}

// =============================================================================
// OPERATOR VIEWS
// =============================================================================

#[cfg(test)]
mod operator_views {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use lm_06_gateway::{build_router, AppState};
    use tower::util::ServiceExt;

    async fn get_json(router: axum::Router, uri: &str) -> (StatusCode, Value) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    /// After a finished flow the gateway serves the journal trail, the
    /// saga instance, the published keys, and an empty DLQ.
    #[tokio::test]
    async fn test_gateway_reconstructs_finished_flow() {
        let rig = PaymentRig::start();
        let payment = payment_urn("p-4001");
        let orchestrator = rig.orchestrator(card_payment_definition(&rig, &payment, false));

        let trace = TraceContext::new();
        let instance = orchestrator
            .start("card-payment", trace.clone(), json!({ "amount": "50.00" }))
            .await
            .unwrap();
        rig.wait_for_ledger(2).await;

        let state = AppState {
            journal: rig.journal.clone(),
            sagas: rig.store.clone(),
            keys: rig.server.clone(),
            bus: rig.bus.clone(),
        };

        let (status, trail) = get_json(
            build_router(state.clone()),
            &format!("/events/{}", trace.correlation_id),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(trail.as_array().unwrap().len() >= 2);

        let (status, saga) = get_json(
            build_router(state.clone()),
            &format!("/sagas/{}", instance.saga_id),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(saga["state"], json!("Completed"));
        assert_eq!(saga["definition"], json!("card-payment"));

        let (status, keys) = get_json(build_router(state.clone()), "/keys").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(keys[0]["key_id"], json!("2026-08-payments"));

        let (status, dead) = get_json(
            build_router(state),
            &format!("/queues/{QUEUE}/dead-letters"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(dead.as_array().unwrap().is_empty());

        rig.stop().await;
    }
}
