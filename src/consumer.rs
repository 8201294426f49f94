//! Consumer-group membership and the record consume loop.
//!
//! Group membership is dynamic: the coordinator may revoke and reissue
//! claim assignments at any time. Each assignment generation is represented
//! by a fresh [`GroupSession`] value that is replaced whole on rebalance,
//! never mutated in place. The outer driver waits on a one-shot readiness
//! latch before declaring the consumer operational, and shuts the loop down
//! cooperatively through a cancellation token observed at record boundaries.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use clap::ValueEnum;
use rdkafka::consumer::{
    BaseConsumer, CommitMode, Consumer, ConsumerContext, Rebalance, StreamConsumer,
};
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::ClientContext;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::codec::WireCodec;
use crate::config::BrokerOpts;
use crate::error::{Error, Result};

/// What to do when a delivered record fails to decode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum DecodeErrorPolicy {
    /// Treat the record as fatal and stop the session
    #[default]
    Fail,
    /// Log the record and continue without acknowledging it
    Skip,
}

/// One partition's record stream assigned to this member for one generation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Claim {
    pub topic: String,
    pub partition: i32,
}

/// One generation of group membership: the claims granted by the
/// coordinator. Invalidated by the next rebalance and replaced, not reused.
#[derive(Debug)]
pub struct GroupSession {
    pub generation: u64,
    pub claims: Vec<Claim>,
}

/// Single-fire readiness signal, re-armed for each membership generation.
///
/// Firing is idempotent within a generation; only the first fire after a
/// rearm reports `true`. Waiters registered before the fire are woken, and
/// waiting after the fire returns immediately.
#[derive(Debug, Default)]
pub struct ReadyLatch {
    fired: std::sync::Mutex<bool>,
    notify: Notify,
}

impl ReadyLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal readiness. Returns whether this call was the one that fired.
    pub fn fire(&self) -> bool {
        let mut fired = self.fired.lock().unwrap();
        if *fired {
            return false;
        }
        *fired = true;
        drop(fired);
        self.notify.notify_waiters();
        true
    }

    /// Replace the consumed signal with a fresh one for the next generation.
    pub fn rearm(&self) {
        *self.fired.lock().unwrap() = false;
    }

    pub async fn wait(&self) {
        loop {
            // Register before checking so a fire between the check and the
            // await cannot be lost.
            let notified = self.notify.notified();
            if *self.fired.lock().unwrap() {
                return;
            }
            notified.await;
        }
    }
}

/// Client context translating broker rebalance callbacks into generation
/// bookkeeping. Callbacks arrive on librdkafka threads, hence the sync locks.
pub struct SessionContext {
    ready: Arc<ReadyLatch>,
    session: std::sync::Mutex<Option<GroupSession>>,
    generation: AtomicU64,
}

impl SessionContext {
    fn new(ready: Arc<ReadyLatch>) -> Self {
        Self {
            ready,
            session: std::sync::Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// A new assignment generation has been granted.
    fn assign(&self, claims: Vec<Claim>) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(generation, ?claims, "claims assigned");
        *self.session.lock().unwrap() = Some(GroupSession { generation, claims });
        self.ready.fire();
    }

    /// The current generation's claims are being taken away; the session
    /// value scoped to them is dead and the readiness signal is re-armed so
    /// the next assignment can be observed.
    fn revoke(&self) {
        if let Some(old) = self.session.lock().unwrap().take() {
            info!(generation = old.generation, "group rebalancing, claims revoked");
        }
        self.ready.rearm();
    }

    fn current_generation(&self) -> Option<u64> {
        self.session.lock().unwrap().as_ref().map(|s| s.generation)
    }

    fn current_claims(&self) -> Vec<Claim> {
        self.session
            .lock()
            .unwrap()
            .as_ref()
            .map(|s| s.claims.clone())
            .unwrap_or_default()
    }
}

impl ClientContext for SessionContext {}

impl ConsumerContext for SessionContext {
    fn pre_rebalance(&self, _consumer: &BaseConsumer<Self>, rebalance: &Rebalance<'_>) {
        if let Rebalance::Revoke(_) = rebalance {
            self.revoke();
        }
    }

    fn post_rebalance(&self, _consumer: &BaseConsumer<Self>, rebalance: &Rebalance<'_>) {
        match rebalance {
            Rebalance::Assign(tpl) => {
                let claims = tpl
                    .elements()
                    .iter()
                    .map(|elem| Claim {
                        topic: elem.topic().to_string(),
                        partition: elem.partition(),
                    })
                    .collect();
                self.assign(claims);
            }
            Rebalance::Revoke(_) => {}
            Rebalance::Error(err) => error!(error = %err, "rebalance failed"),
        }
    }
}

/// A consumer-group member: joins the group, decodes every delivered record
/// against the schema named in its wire header, prints the result, and
/// acknowledges the record only after the decode succeeded.
pub struct ConsumerGroupSession {
    consumer: StreamConsumer<SessionContext>,
    codec: WireCodec,
    ready: Arc<ReadyLatch>,
    policy: DecodeErrorPolicy,
}

impl ConsumerGroupSession {
    pub fn new(
        opts: &BrokerOpts,
        group: &str,
        topic: &str,
        codec: WireCodec,
        policy: DecodeErrorPolicy,
    ) -> Result<Self> {
        let ready = Arc::new(ReadyLatch::new());
        let context = SessionContext::new(Arc::clone(&ready));
        let consumer: StreamConsumer<SessionContext> = opts
            .consumer_config(group)?
            .create_with_context(context)?;
        consumer.subscribe(&[topic])?;

        Ok(Self {
            consumer,
            codec,
            ready,
            policy,
        })
    }

    /// Wait until the coordinator has granted this member an assignment.
    pub async fn wait_ready(&self) {
        self.ready.wait().await;
    }

    /// Generation of the assignment currently held, if any.
    pub fn generation(&self) -> Option<u64> {
        self.consumer.context().current_generation()
    }

    /// Claims granted to this member for the current generation.
    pub fn claims(&self) -> Vec<Claim> {
        self.consumer.context().current_claims()
    }

    /// Consume until cancelled or a fatal error occurs.
    ///
    /// The token is checked between records only; a record already being
    /// handled when cancellation arrives is finished, not aborted.
    pub async fn run(&self, token: CancellationToken) -> Result<()> {
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("consume loop stopping");
                    // Dropping the consumer leaves the group, letting the
                    // remaining members rebalance promptly.
                    return Ok(());
                }
                delivery = self.consumer.recv() => {
                    let message = delivery?;
                    self.handle(&message).await?;
                }
            }
        }
    }

    async fn handle(&self, message: &BorrowedMessage<'_>) -> Result<()> {
        let payload = message.payload().unwrap_or_default();
        match self.codec.decode(payload).await {
            Ok(text) => {
                println!("Received: {text}");
                self.ack(message)?;
                Ok(())
            }
            Err(err) if self.policy == DecodeErrorPolicy::Skip => {
                warn!(
                    partition = message.partition(),
                    offset = message.offset(),
                    error = %err,
                    "skipping record that failed to decode"
                );
                // Not acknowledged here, but redelivery only happens if no
                // later offset on this partition is committed before
                // shutdown.
                Ok(())
            }
            Err(err) => {
                error!(
                    generation = self.consumer.context().current_generation(),
                    partition = message.partition(),
                    offset = message.offset(),
                    error = %err,
                    "record failed to decode"
                );
                Err(err)
            }
        }
    }

    fn ack(&self, message: &BorrowedMessage<'_>) -> Result<()> {
        self.consumer
            .commit_message(message, CommitMode::Async)
            .map_err(Error::Kafka)
    }
}
