//! # Host Loop
//!
//! One host per queue. The loop long-polls the transport, gates dispatch on
//! a concurrency semaphore, and spawns one worker task per leased message.
//! Settlement (delete, redeliver, dead-letter) always happens in the worker
//! that owns the lease.

use crate::handler::HandlerRegistry;
use lm_03_journal::{spawn_append, Journal, JournalEntry, ProcessingStatus};
use parking_lot::Mutex;
use shared_bus::{LeasedMessage, QueueTransport, Receipt, TransportError, DEFAULT_RECEIVE_BATCH};
use shared_crypto::KeyRing;
use shared_types::ConsumerConfig;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{watch, Semaphore};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// Fatal host errors. Transient transport trouble is absorbed by the loop;
/// only misconfiguration surfaces here.
#[derive(Debug, Error)]
pub enum HostError {
    /// The transport rejected the host's queue permanently.
    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),
}

/// Delay before re-polling after a transient transport outage.
const OUTAGE_BACKOFF: Duration = Duration::from_secs(1);

/// Drains one queue and dispatches verified envelopes to handlers.
pub struct ConsumerHost {
    service: String,
    config: ConsumerConfig,
    transport: Arc<dyn QueueTransport>,
    keyring: Arc<KeyRing>,
    registry: Arc<HandlerRegistry>,
    journal: Arc<dyn Journal>,
    /// Accumulated transient-failure reasons per message, keyed by the
    /// envelope's signature bytes (stable across redeliveries, unlike the
    /// receipt).
    failures: Arc<Mutex<HashMap<Vec<u8>, FailureLog>>>,
}

/// Reason chain for one in-flight message. Dropped when the message
/// settles, or by [`evict_stale`] once it has gone quiet for longer than
/// the redelivery horizon (covers messages purged outside the host).
struct FailureLog {
    reasons: Vec<String>,
    last_seen: Instant,
}

fn evict_stale(failures: &mut HashMap<Vec<u8>, FailureLog>, horizon: Duration) {
    failures.retain(|_, log| log.last_seen.elapsed() < horizon);
}

impl ConsumerHost {
    /// Wire up a host for one queue.
    #[must_use]
    pub fn new(
        service: impl Into<String>,
        config: ConsumerConfig,
        transport: Arc<dyn QueueTransport>,
        keyring: Arc<KeyRing>,
        registry: Arc<HandlerRegistry>,
        journal: Arc<dyn Journal>,
    ) -> Self {
        Self {
            service: service.into(),
            config,
            transport,
            keyring,
            registry,
            journal,
            failures: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Run until the shutdown signal flips to `true`. In-flight handlers
    /// are drained before returning.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), HostError> {
        let max_in_flight = self.config.max_in_flight;
        let semaphore = Arc::new(Semaphore::new(max_in_flight));
        info!(
            service = %self.service,
            queue = %self.config.queue,
            max_in_flight,
            "Consumer host started"
        );

        'poll: while !*shutdown.borrow() {
            let free = semaphore.available_permits().min(DEFAULT_RECEIVE_BATCH);
            if free == 0 {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break 'poll;
                        }
                    }
                    permit = semaphore.acquire() => drop(permit),
                }
                continue;
            }

            let batch = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break 'poll;
                    }
                    continue;
                }
                received = self.transport.receive(
                    &self.config.queue,
                    free,
                    self.config.poll_wait,
                    self.config.visibility_timeout,
                ) => match received {
                    Ok(batch) => batch,
                    Err(e) if e.is_transient() => {
                        warn!(queue = %self.config.queue, error = %e, "Receive failed; backing off");
                        sleep(OUTAGE_BACKOFF).await;
                        continue;
                    }
                    Err(e) => return Err(HostError::Transport(e)),
                },
            };

            for message in batch {
                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    break 'poll;
                };
                let worker = self.worker();
                tokio::spawn(async move {
                    worker.process(message).await;
                    drop(permit);
                });
            }
        }

        // Drain: reacquire every permit so no worker is still running.
        let permits = u32::try_from(max_in_flight).unwrap_or(u32::MAX);
        let _drained = semaphore.acquire_many(permits).await;
        info!(service = %self.service, queue = %self.config.queue, "Consumer host stopped");
        Ok(())
    }

    fn worker(&self) -> Worker {
        Worker {
            service: self.service.clone(),
            config: self.config.clone(),
            transport: self.transport.clone(),
            keyring: self.keyring.clone(),
            registry: self.registry.clone(),
            journal: self.journal.clone(),
            failures: self.failures.clone(),
        }
    }
}

/// Everything one message's processing needs, detached from the host loop.
struct Worker {
    service: String,
    config: ConsumerConfig,
    transport: Arc<dyn QueueTransport>,
    keyring: Arc<KeyRing>,
    registry: Arc<HandlerRegistry>,
    journal: Arc<dyn Journal>,
    failures: Arc<Mutex<HashMap<Vec<u8>, FailureLog>>>,
}

impl Worker {
    async fn process(&self, message: LeasedMessage) {
        let envelope = &message.envelope;
        let receipt = message.receipt;
        self.journal(envelope, ProcessingStatus::Received, None);

        // Verification gates everything; a failure here is fatal for the
        // envelope and is never retried.
        if let Err(e) = self.keyring.verify_envelope(envelope).await {
            let reason = format!("SignatureInvalid: {e}");
            warn!(
                queue = %self.config.queue,
                correlation_id = %envelope.correlation_id(),
                key_id = %envelope.signature().key_id,
                error = %e,
                "Envelope rejected"
            );
            self.journal(envelope, ProcessingStatus::Rejected, Some(reason.clone()));
            self.settle_dead(receipt, vec![reason]).await;
            return;
        }
        self.journal(envelope, ProcessingStatus::Verified, None);

        let Some(handler) = self.registry.resolve(envelope) else {
            let reason = format!(
                "NoHandlerRegistered: ({}, {})",
                envelope.source(),
                envelope.detail_type()
            );
            warn!(queue = %self.config.queue, reason = %reason, "Envelope unroutable");
            self.journal(envelope, ProcessingStatus::Rejected, Some(reason.clone()));
            self.settle_dead(receipt, vec![reason]).await;
            return;
        };

        match timeout(self.config.handler_timeout, handler.handle(envelope)).await {
            Ok(Ok(())) => {
                if let Err(e) = self.transport.delete(&self.config.queue, receipt).await {
                    warn!(queue = %self.config.queue, error = %e, "Delete after success failed");
                }
                self.failures
                    .lock()
                    .remove(envelope.signature().signature.as_slice());
                self.journal(
                    envelope,
                    ProcessingStatus::Dispatched,
                    Some("handler completed".to_string()),
                );
                debug!(
                    queue = %self.config.queue,
                    correlation_id = %envelope.correlation_id(),
                    "Envelope processed"
                );
            }
            Ok(Err(e)) if !e.is_transient() => {
                let reason = format!("attempt {}: permanent: {e}", message.receive_count);
                let mut reasons = self.take_reasons(envelope);
                reasons.push(reason.clone());
                self.journal(envelope, ProcessingStatus::Rejected, Some(reason));
                self.settle_dead(receipt, reasons).await;
            }
            Ok(Err(e)) => {
                let reason = format!("attempt {}: {e}", message.receive_count);
                self.transient_failure(message, reason).await;
            }
            Err(_) => {
                let reason = format!(
                    "attempt {}: handler timed out after {:?}",
                    message.receive_count, self.config.handler_timeout
                );
                self.transient_failure(message, reason).await;
            }
        }
    }

    async fn transient_failure(&self, message: LeasedMessage, reason: String) {
        let envelope = &message.envelope;
        {
            let mut failures = self.failures.lock();
            evict_stale(&mut failures, self.failure_horizon());
            let log = failures
                .entry(envelope.signature().signature.clone())
                .or_insert_with(|| FailureLog {
                    reasons: Vec::new(),
                    last_seen: Instant::now(),
                });
            log.last_seen = Instant::now();
            log.reasons.push(reason.clone());
        }

        if message.receive_count >= self.config.max_retries {
            let reasons = self.take_reasons(envelope);
            warn!(
                queue = %self.config.queue,
                correlation_id = %envelope.correlation_id(),
                attempts = message.receive_count,
                "Retries exhausted; dead-lettering"
            );
            self.journal(envelope, ProcessingStatus::Rejected, Some(reason));
            self.settle_dead(message.receipt, reasons).await;
            return;
        }

        let delay = self.config.redelivery_backoff.delay(message.receive_count);
        debug!(
            queue = %self.config.queue,
            correlation_id = %envelope.correlation_id(),
            attempt = message.receive_count,
            delay_ms = delay.as_millis() as u64,
            reason = %reason,
            "Transient handler failure; redelivering"
        );
        if let Err(e) = self
            .transport
            .redeliver(&self.config.queue, message.receipt, delay)
            .await
        {
            warn!(queue = %self.config.queue, error = %e, "Redeliver failed; lease will expire");
        }
    }

    /// A message still on the queue is redelivered at least once per
    /// visibility timeout; chains quiet for longer belong to messages that
    /// left the queue some other way.
    fn failure_horizon(&self) -> Duration {
        self.config.visibility_timeout * (self.config.max_retries + 1)
    }

    fn take_reasons(&self, envelope: &shared_types::EventEnvelope) -> Vec<String> {
        self.failures
            .lock()
            .remove(envelope.signature().signature.as_slice())
            .map(|log| log.reasons)
            .unwrap_or_default()
    }

    async fn settle_dead(&self, receipt: Receipt, reasons: Vec<String>) {
        if let Err(e) = self
            .transport
            .dead_letter(&self.config.queue, receipt, reasons)
            .await
        {
            warn!(queue = %self.config.queue, error = %e, "Dead-letter failed; lease will expire");
        }
    }

    fn journal(
        &self,
        envelope: &shared_types::EventEnvelope,
        status: ProcessingStatus,
        note: Option<String>,
    ) {
        let mut entry = JournalEntry::record(&self.service, envelope, status);
        if let Some(note) = note {
            entry = entry.with_note(note);
        }
        spawn_append(self.journal.clone(), entry);
    }
}
