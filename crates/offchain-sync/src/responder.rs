//! Inbound side: route requests to the right channel

use crate::envelope::EnvelopeVerifier;
use crate::error::SyncError;
use crate::messages::{CommandRequest, CommandResponse};
use crate::process::process_request;
use offchain_sequencer::ChannelRegistry;
use std::sync::Arc;

/// Answers requests addressed to the local VASP
pub struct ExchangeResponder {
    registry: Arc<ChannelRegistry>,
    verifier: Arc<dyn EnvelopeVerifier>,
}

impl ExchangeResponder {
    pub fn new(registry: Arc<ChannelRegistry>, verifier: Arc<dyn EnvelopeVerifier>) -> Self {
        Self { registry, verifier }
    }

    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    pub fn handle(&self, request: &CommandRequest) -> Result<CommandResponse, SyncError> {
        if request.receiver != self.registry.local_id() {
            return Err(SyncError::Misrouted {
                channel: request.channel_id,
                sender: request.sender,
                receiver: request.receiver,
            });
        }
        let channel = self.registry.channel(request.sender)?;
        let mut sequencer = channel.lock();
        process_request(&mut sequencer, self.verifier.as_ref(), request)
    }
}
