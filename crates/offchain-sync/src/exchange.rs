//! Async exchange driver for one channel
//!
//! The channel lock is taken only around the synchronous build and process
//! steps; network round-trips and backoff sleeps happen without it.

use crate::envelope::EnvelopeSigner;
use crate::error::ExchangeError;
use crate::messages::CommandRequest;
use crate::process::{build_batch, process_response, OutboundBatch, ResponseSummary};
use crate::tracker::{InFlightRequest, RequestTracker};
use crate::transport::Transport;
use offchain_core::{CommandId, ProtocolConfig};
use offchain_sequencer::SharedSequencer;
use parking_lot::Mutex;
use std::sync::Arc;
use uuid::Uuid;

/// Outcome of one successful request round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub request_id: Uuid,
    /// Envelopes carried by the request
    pub sent: usize,
    /// Sends until a response arrived
    pub attempts: u32,
    pub summary: ResponseSummary,
}

/// Pushes one channel's local sequence to the counterparty
pub struct ChannelExchange {
    sequencer: SharedSequencer,
    transport: Arc<dyn Transport>,
    signer: Arc<dyn EnvelopeSigner>,
    config: ProtocolConfig,
    tracker: Mutex<RequestTracker>,
}

impl ChannelExchange {
    pub fn new(
        sequencer: SharedSequencer,
        transport: Arc<dyn Transport>,
        signer: Arc<dyn EnvelopeSigner>,
        config: ProtocolConfig,
    ) -> Self {
        Self {
            sequencer,
            transport,
            signer,
            config,
            tracker: Mutex::new(RequestTracker::new()),
        }
    }

    pub fn sequencer(&self) -> &SharedSequencer {
        &self.sequencer
    }

    /// Requests currently awaiting a response
    pub fn in_flight(&self) -> usize {
        self.tracker.lock().in_flight()
    }

    /// Whether the channel has anything to send or confirm
    pub fn has_work(&self) -> bool {
        !self.sequencer.lock().is_settled()
    }

    /// Send one batch and process its response, retrying with backoff.
    ///
    /// Every retry resends the same envelopes, so a request that was applied
    /// but whose response was lost comes back as duplicates.
    pub async fn sync_once(&self) -> Result<SyncReport, ExchangeError> {
        let OutboundBatch {
            request,
            command_ids,
        } = {
            let sequencer = self.sequencer.lock();
            build_batch(&sequencer, self.signer.as_ref(), self.config.max_batch_size)?
        };
        let first_offset = request.envelopes.first().map_or(0, |e| e.offset);
        let request_id = request.request_id;
        self.tracker.lock().start(InFlightRequest::new(
            request_id,
            command_ids.clone(),
            first_offset,
        ));

        let result = self.drive(&request, command_ids).await;
        let mut tracker = self.tracker.lock();
        if tracker.finish(&request_id).is_none() {
            tracker.abandon(&request_id);
        }
        result
    }

    async fn drive(
        &self,
        request: &CommandRequest,
        command_ids: Vec<CommandId>,
    ) -> Result<SyncReport, ExchangeError> {
        let request_id = request.request_id;
        let retry = &self.config.retry;
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            let reason = match tokio::time::timeout(
                self.config.request_timeout(),
                self.transport.exchange(request.clone()),
            )
            .await
            {
                Ok(Ok(response)) => {
                    self.tracker.lock().update(&request_id, |r| r.acked())?;
                    let summary = {
                        let mut sequencer = self.sequencer.lock();
                        process_response(&mut sequencer, request, &response)?
                    };
                    return Ok(SyncReport {
                        request_id,
                        sent: request.envelopes.len(),
                        attempts,
                        summary,
                    });
                }
                Ok(Err(err)) => err.to_string(),
                Err(_) => format!("no response within {:?}", self.config.request_timeout()),
            };

            self.tracker
                .lock()
                .update(&request_id, |r| r.timed_out(reason.clone()))?;

            if !retry.allows_another(attempts) {
                self.tracker
                    .lock()
                    .update(&request_id, |r| r.failed(reason.clone()))?;
                tracing::error!(
                    channel = %request.channel_id,
                    peer = %request.receiver,
                    %request_id,
                    attempts,
                    commands = command_ids.len(),
                    %reason,
                    "exchange failed, retries exhausted"
                );
                return Err(ExchangeError::Failed {
                    command_ids,
                    attempts,
                    reason,
                });
            }

            let delay = retry.delay_for(attempts - 1);
            tracing::warn!(
                channel = %request.channel_id,
                peer = %request.receiver,
                %request_id,
                attempt = attempts,
                ?delay,
                %reason,
                "exchange attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
            self.tracker.lock().update(&request_id, |r| r.retried())?;
        }
    }

    /// Repeat [`Self::sync_once`] until nothing is pending and the peer holds
    /// every local offset
    pub async fn sync_until_settled(&self, max_rounds: usize) -> Result<usize, ExchangeError> {
        for round in 0..max_rounds {
            if !self.has_work() {
                return Ok(round);
            }
            let report = self.sync_once().await?;
            if report.summary.unverified {
                return Err(ExchangeError::Unverified {
                    request_id: report.request_id,
                });
            }
        }
        if self.has_work() {
            return Err(ExchangeError::NotSettled { rounds: max_rounds });
        }
        Ok(max_rounds)
    }
}
