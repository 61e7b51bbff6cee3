//! # In-Memory Bus
//!
//! Reference implementation of [`QueueTransport`] for single-node operation
//! and tests. Distributed deployments substitute a durable queue service;
//! the semantics here (leases, redelivery, lanes, DLQ) are the contract any
//! such substitute must honor.

use crate::message::{DeadLetter, LeasedMessage, Receipt};
use crate::routing::QueueBinding;
use crate::transport::{QueueTransport, TransportError};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use shared_types::EventEnvelope;
use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::Notify;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::{debug, warn};

/// How often long-pollers re-check for lease expiry and delayed redelivery.
const POLL_TICK: Duration = Duration::from_millis(25);

struct StoredMessage {
    envelope: EventEnvelope,
    receive_count: u32,
    available_at: Instant,
    lane: Option<String>,
}

struct InflightMessage {
    envelope: EventEnvelope,
    receive_count: u32,
    lease_expires: Instant,
    lane: Option<String>,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<StoredMessage>,
    inflight: HashMap<Receipt, InflightMessage>,
    dead: Vec<DeadLetter>,
}

#[derive(Default)]
struct BusState {
    queues: HashMap<String, QueueState>,
    bindings: HashMap<String, Vec<QueueBinding>>,
}

/// In-memory implementation of the queue/topic transport.
pub struct InMemoryBus {
    state: Mutex<BusState>,
    notify: Notify,
}

impl InMemoryBus {
    /// Create an empty bus. Bind queues before publishing.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BusState::default()),
            notify: Notify::new(),
        }
    }

    /// Bind a queue to a topic. Declares the queue on first binding.
    /// Bindings are resolved once at startup.
    pub fn bind(&self, topic: impl Into<String>, binding: QueueBinding) {
        let mut state = self.state.lock();
        state.queues.entry(binding.queue.clone()).or_default();
        state.bindings.entry(topic.into()).or_default().push(binding);
    }

    /// Move expired leases back to the head of the queue for redelivery.
    fn expire_leases(q: &mut QueueState, now: Instant) {
        let expired: Vec<Receipt> = q
            .inflight
            .iter()
            .filter(|(_, m)| m.lease_expires <= now)
            .map(|(r, _)| *r)
            .collect();
        for receipt in expired {
            if let Some(m) = q.inflight.remove(&receipt) {
                debug!(receive_count = m.receive_count, "Lease expired, redelivering");
                q.pending.push_front(StoredMessage {
                    envelope: m.envelope,
                    receive_count: m.receive_count,
                    available_at: now,
                    lane: m.lane,
                });
            }
        }
    }

    /// Lease up to `max` deliverable messages, honoring lane exclusivity.
    fn take_deliverable(
        q: &mut QueueState,
        max: usize,
        now: Instant,
        visibility: Duration,
    ) -> Vec<LeasedMessage> {
        let mut busy: HashSet<String> = q
            .inflight
            .values()
            .filter_map(|m| m.lane.clone())
            .collect();

        let mut leased = Vec::new();
        let mut kept = VecDeque::new();

        while let Some(msg) = q.pending.pop_front() {
            let lane_busy = msg.lane.as_ref().is_some_and(|l| busy.contains(l));
            let deliverable = leased.len() < max && !lane_busy && msg.available_at <= now;

            if deliverable {
                if let Some(lane) = &msg.lane {
                    busy.insert(lane.clone());
                }
                let receipt = Receipt::new();
                let receive_count = msg.receive_count + 1;
                q.inflight.insert(
                    receipt,
                    InflightMessage {
                        envelope: msg.envelope.clone(),
                        receive_count,
                        lease_expires: now + visibility,
                        lane: msg.lane,
                    },
                );
                leased.push(LeasedMessage {
                    envelope: msg.envelope,
                    receipt,
                    receive_count,
                });
            } else {
                // An undeliverable message blocks the rest of its lane to
                // preserve per-lane ordering.
                if let Some(lane) = &msg.lane {
                    busy.insert(lane.clone());
                }
                kept.push_back(msg);
            }
        }

        q.pending = kept;
        leased
    }

    fn settle(
        &self,
        queue: &str,
        receipt: Receipt,
    ) -> Result<InflightMessage, TransportError> {
        let mut state = self.state.lock();
        let q = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| TransportError::UnknownQueue(queue.to_string()))?;
        q.inflight
            .remove(&receipt)
            .ok_or(TransportError::UnknownReceipt)
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueTransport for InMemoryBus {
    async fn send(&self, topic: &str, envelope: EventEnvelope) -> Result<usize, TransportError> {
        let now = Instant::now();
        let mut state = self.state.lock();

        let matched: Vec<QueueBinding> = state
            .bindings
            .get(topic)
            .map(|bindings| {
                bindings
                    .iter()
                    .filter(|b| b.rule.matches(&envelope))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if matched.is_empty() {
            warn!(
                topic = topic,
                detail_type = %envelope.detail_type(),
                "Event dropped (no matching queue binding)"
            );
            return Ok(0);
        }

        let fanout = matched.len();
        for binding in matched {
            let lane = binding
                .fifo
                .then(|| envelope.resource().id().to_string());
            if let Some(q) = state.queues.get_mut(&binding.queue) {
                q.pending.push_back(StoredMessage {
                    envelope: envelope.clone(),
                    receive_count: 0,
                    available_at: now,
                    lane,
                });
            }
        }
        drop(state);

        debug!(
            topic = topic,
            detail_type = %envelope.detail_type(),
            queues = fanout,
            "Event routed"
        );
        self.notify.notify_waiters();
        Ok(fanout)
    }

    async fn receive(
        &self,
        queue: &str,
        max: usize,
        wait: Duration,
        visibility: Duration,
    ) -> Result<Vec<LeasedMessage>, TransportError> {
        let deadline = Instant::now() + wait;
        loop {
            {
                let now = Instant::now();
                let mut state = self.state.lock();
                let q = state
                    .queues
                    .get_mut(queue)
                    .ok_or_else(|| TransportError::UnknownQueue(queue.to_string()))?;
                Self::expire_leases(q, now);
                let leased = Self::take_deliverable(q, max, now, visibility);
                if !leased.is_empty() {
                    return Ok(leased);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }
            let tick = deadline.min(now + POLL_TICK);
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = sleep_until(tick) => {}
            }
        }
    }

    async fn delete(&self, queue: &str, receipt: Receipt) -> Result<(), TransportError> {
        self.settle(queue, receipt)?;
        Ok(())
    }

    async fn redeliver(
        &self,
        queue: &str,
        receipt: Receipt,
        after: Duration,
    ) -> Result<(), TransportError> {
        let msg = self.settle(queue, receipt)?;
        {
            let mut state = self.state.lock();
            let q = state
                .queues
                .get_mut(queue)
                .ok_or_else(|| TransportError::UnknownQueue(queue.to_string()))?;
            q.pending.push_front(StoredMessage {
                envelope: msg.envelope,
                receive_count: msg.receive_count,
                available_at: Instant::now() + after,
                lane: msg.lane,
            });
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn dead_letter(
        &self,
        queue: &str,
        receipt: Receipt,
        reasons: Vec<String>,
    ) -> Result<(), TransportError> {
        let msg = self.settle(queue, receipt)?;
        warn!(
            queue = queue,
            detail_type = %msg.envelope.detail_type(),
            correlation_id = %msg.envelope.correlation_id(),
            reasons = ?reasons,
            "Message dead-lettered"
        );
        let mut state = self.state.lock();
        let q = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| TransportError::UnknownQueue(queue.to_string()))?;
        q.dead.push(DeadLetter {
            envelope: msg.envelope,
            reasons,
            dead_lettered_at: Utc::now(),
        });
        Ok(())
    }

    async fn dead_letters(&self, queue: &str) -> Result<Vec<DeadLetter>, TransportError> {
        let state = self.state.lock();
        let q = state
            .queues
            .get(queue)
            .ok_or_else(|| TransportError::UnknownQueue(queue.to_string()))?;
        Ok(q.dead.clone())
    }
}
