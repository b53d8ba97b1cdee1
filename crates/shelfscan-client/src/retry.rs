//! Rate-limit retry countdown.
//!
//! Created when the gateway answers 429. Ticks down once per second on a
//! background task; the remaining time is observable through a watch channel
//! for live countdown UI. Reaching zero signals the caller to retry the
//! original upload exactly once; cancelling tears the timer down and the
//! scheduled retry never fires.

use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};

/// Cancellation handle for a running [`RetrySession`], detachable so the
/// session itself can be consumed by [`RetrySession::completed`].
#[derive(Clone)]
pub struct RetryCancelHandle {
    cancel_tx: mpsc::Sender<()>,
}

impl RetryCancelHandle {
    /// Stop the countdown; the pending retry will not fire.
    pub fn cancel(&self) {
        let _ = self.cancel_tx.try_send(());
    }
}

/// One live rate-limit countdown.
pub struct RetrySession {
    remaining_rx: watch::Receiver<u64>,
    cancel_tx: mpsc::Sender<()>,
    done_rx: oneshot::Receiver<bool>,
}

impl RetrySession {
    /// Start a countdown of `retry_after_seconds` ticking once per second.
    pub fn start(retry_after_seconds: u64) -> Self {
        let (remaining_tx, remaining_rx) = watch::channel(retry_after_seconds);
        let (cancel_tx, mut cancel_rx) = mpsc::channel::<()>(1);
        let (done_tx, done_rx) = oneshot::channel();

        tokio::spawn(async move {
            let mut remaining = retry_after_seconds;
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately; consume it so each loop
            // iteration waits a full second.
            ticker.tick().await;

            let finished = loop {
                if remaining == 0 {
                    break true;
                }
                tokio::select! {
                    _ = ticker.tick() => {
                        remaining -= 1;
                        let _ = remaining_tx.send(remaining);
                        tracing::debug!(remaining, "Retry countdown tick");
                    }
                    _ = cancel_rx.recv() => {
                        tracing::debug!(remaining, "Retry countdown cancelled");
                        break false;
                    }
                }
            };
            let _ = done_tx.send(finished);
        });

        Self {
            remaining_rx,
            cancel_tx,
            done_rx,
        }
    }

    /// Seconds left before the retry fires.
    pub fn remaining_seconds(&self) -> u64 {
        *self.remaining_rx.borrow()
    }

    /// Observe the countdown (one value per tick).
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.remaining_rx.clone()
    }

    pub fn canceller(&self) -> RetryCancelHandle {
        RetryCancelHandle {
            cancel_tx: self.cancel_tx.clone(),
        }
    }

    /// Stop the countdown; the pending retry will not fire.
    pub fn cancel(&self) {
        let _ = self.cancel_tx.try_send(());
    }

    /// Await the end of the countdown. Returns `true` when it reached zero
    /// (the caller should retry now) and `false` when it was cancelled.
    pub async fn completed(self) -> bool {
        self.done_rx.await.unwrap_or(false)
    }
}
