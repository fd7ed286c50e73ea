//! Change-detecting chain head subscriptions
//!
//! Two producers behind one consumer contract:
//! - Push: the node streams head transitions; each item is republished as is.
//!   Stream failure or end closes the subscription (the caller resubscribes).
//! - Pull: the node is polled every [`HEAD_POLL_INTERVAL`]; only heads that
//!   differ from the last emitted one are published. Poll errors are logged
//!   and retried on the next tick.
//!
//! Closing (explicitly, by drop, or through the parent token) stops the
//! producer within one cycle and ends the sequence.

use crate::capability::{CapabilitySource, HeadStream};
use crate::error::SourceError;
use crate::types::ChainHead;
use crate::{HEAD_POLL_INTERVAL, SUBSCRIPTION_CHANNEL_CAPACITY};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// How a subscription is fed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionMode {
    Push,
    Pull,
}

/// Subscribe to head changes of `source`.
///
/// Uses the node's native stream when it has one and falls back to polling
/// when the source reports it as unsupported.
pub async fn subscribe_chain_heads(
    source: Arc<dyn CapabilitySource>,
    parent: &CancellationToken,
) -> Result<ChainHeadSubscription, SourceError> {
    match source.open_head_stream().await {
        Ok(stream) => Ok(ChainHeadSubscription::from_stream(stream, parent)),
        Err(SourceError::Unsupported) => Ok(ChainHeadSubscription::poll(
            source,
            HEAD_POLL_INTERVAL,
            parent,
        )),
        Err(e) => Err(e),
    }
}

/// Remembers the last emitted head so unchanged polls are suppressed
#[derive(Debug, Default)]
pub struct HeadChangeDetector {
    last: Option<ChainHead>,
}

impl HeadChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `head` differs from the last emitted head
    pub fn is_new(&self, head: &ChainHead) -> bool {
        self.last.as_ref() != Some(head)
    }

    /// Record `head` as emitted
    pub fn mark_emitted(&mut self, head: ChainHead) {
        self.last = Some(head);
    }
}

/// A running head subscription
pub struct ChainHeadSubscription {
    receiver: mpsc::Receiver<ChainHead>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    mode: SubscriptionMode,
}

impl ChainHeadSubscription {
    /// Republish a native head stream
    pub fn from_stream(stream: HeadStream, parent: &CancellationToken) -> Self {
        let (tx, receiver) = mpsc::channel(SUBSCRIPTION_CHANNEL_CAPACITY);
        let cancel = parent.child_token();
        let task = tokio::spawn(forward_stream(stream, tx, cancel.clone()));

        Self {
            receiver,
            cancel,
            task: Some(task),
            mode: SubscriptionMode::Push,
        }
    }

    /// Poll `source` every `interval` and publish changed heads
    pub fn poll(
        source: Arc<dyn CapabilitySource>,
        interval: Duration,
        parent: &CancellationToken,
    ) -> Self {
        let (tx, receiver) = mpsc::channel(SUBSCRIPTION_CHANNEL_CAPACITY);
        let cancel = parent.child_token();
        let task = tokio::spawn(poll_heads(source, interval, tx, cancel.clone()));

        Self {
            receiver,
            cancel,
            task: Some(task),
            mode: SubscriptionMode::Pull,
        }
    }

    /// Next changed head, or `None` once the subscription has ended
    pub async fn next(&mut self) -> Option<ChainHead> {
        self.receiver.recv().await
    }

    /// Stop the producer. The sequence ends after any buffered head.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Stop the producer and wait for it to release its resources
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        self.receiver.close();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Chain head producer task failed");
            }
        }
    }

    pub fn mode(&self) -> SubscriptionMode {
        self.mode
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for ChainHeadSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Send `head` unless the subscription is cancelled first.
/// Returns false when the producer must stop.
async fn publish(
    tx: &mpsc::Sender<ChainHead>,
    head: ChainHead,
    cancel: &CancellationToken,
) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        res = tx.send(head) => res.is_ok(),
    }
}

async fn forward_stream(
    mut stream: HeadStream,
    tx: mpsc::Sender<ChainHead>,
    cancel: CancellationToken,
) {
    info!("Listening on chain head stream");

    loop {
        let item = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            item = stream.next() => item,
        };

        match item {
            Some(Ok(head)) => {
                debug!(head_slot = head.head_slot, "Got chain head");
                if !publish(&tx, head, &cancel).await {
                    break;
                }
            }
            Some(Err(e)) => {
                warn!(error = %e, "Chain head stream failed");
                break;
            }
            None => {
                info!("Chain head stream ended");
                break;
            }
        }
    }

    cancel.cancel();
    debug!("Chain head stream producer stopped");
}

async fn poll_heads(
    source: Arc<dyn CapabilitySource>,
    interval: Duration,
    tx: mpsc::Sender<ChainHead>,
    cancel: CancellationToken,
) {
    info!(interval_ms = interval.as_millis() as u64, "Polling for new heads");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut detector = HeadChangeDetector::new();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let polled = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            polled = source.chain_head() => polled,
        };

        match polled {
            Ok(head) if detector.is_new(&head) => {
                debug!(head_slot = head.head_slot, "Chain head changed");
                if !publish(&tx, head.clone(), &cancel).await {
                    break;
                }
                detector.mark_emitted(head);
            }
            Ok(head) => {
                trace!(head_slot = head.head_slot, "Chain head unchanged");
            }
            Err(e) => {
                warn!(error = %e, "Failed to poll for chain head");
            }
        }
    }

    debug!("Chain head poller stopped");
}
