//! Message-driven exchange worker
//!
//! One worker task per channel. The handle sends commands over an mpsc
//! queue; a watch flag stops the worker, cancelling an in-progress retry
//! loop. Committed offsets are never affected by cancellation.

use crate::error::ExchangeError;
use crate::exchange::{ChannelExchange, SyncReport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

enum WorkerMessage {
    SyncNow {
        reply: oneshot::Sender<Result<SyncReport, ExchangeError>>,
    },
}

/// Control handle for a running [`ExchangeWorker`]
#[derive(Clone)]
pub struct ExchangeHandle {
    sender: mpsc::Sender<WorkerMessage>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl ExchangeHandle {
    /// Run one exchange round now and wait for its result
    pub async fn sync_now(&self) -> Result<SyncReport, ExchangeError> {
        let (reply, rx) = oneshot::channel();
        self.sender
            .send(WorkerMessage::SyncNow { reply })
            .await
            .map_err(|_| ExchangeError::Shutdown)?;
        rx.await.map_err(|_| ExchangeError::Shutdown)?
    }

    /// Stop the worker; an in-progress retry loop is abandoned
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

/// Periodic and on-demand synchronization of one channel
pub struct ExchangeWorker {
    exchange: Arc<ChannelExchange>,
    interval: Duration,
    receiver: mpsc::Receiver<WorkerMessage>,
    shutdown: watch::Receiver<bool>,
}

impl ExchangeWorker {
    /// Spawn the worker on the current runtime
    pub fn spawn(exchange: Arc<ChannelExchange>, interval: Duration) -> (ExchangeHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = Self {
            exchange,
            interval,
            receiver,
            shutdown: shutdown_rx,
        };
        let task = tokio::spawn(worker.run());
        (
            ExchangeHandle {
                sender,
                shutdown: Arc::new(shutdown_tx),
            },
            task,
        )
    }

    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let channel = self.exchange.sequencer().lock().channel_id();
        tracing::info!(%channel, "exchange worker started");

        loop {
            let request = tokio::select! {
                _ = self.shutdown.changed() => break,
                message = self.receiver.recv() => match message {
                    Some(WorkerMessage::SyncNow { reply }) => Some(reply),
                    None => break,
                },
                _ = ticker.tick() => {
                    if !self.exchange.has_work() {
                        continue;
                    }
                    None
                }
            };

            let result = tokio::select! {
                _ = self.shutdown.changed() => break,
                result = self.exchange.sync_once() => result,
            };
            match request {
                Some(reply) => {
                    let _ = reply.send(result);
                }
                None => {
                    if let Err(err) = result {
                        tracing::warn!(%channel, error = %err, "periodic exchange failed");
                    }
                }
            }
        }
        tracing::info!(%channel, "exchange worker stopped");
    }
}
