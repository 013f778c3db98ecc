//! Fault-injecting transport
//!
//! Calls the peer's responder directly. Faults are scripted per exchange
//! attempt; once the script is empty every attempt is delivered.

use async_trait::async_trait;
use offchain_sync::{CommandRequest, CommandResponse, ExchangeResponder, Transport, TransportError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// What happens to one exchange attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Deliver,
    /// Lost before the peer saw it
    DropRequest,
    /// Processed by the peer, answer lost
    DropResponse,
    /// Delivered twice; the second answer is returned
    Duplicate,
}

/// Counters of applied faults
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultStats {
    pub delivered: usize,
    pub dropped_requests: usize,
    pub dropped_responses: usize,
    pub duplicated: usize,
}

pub struct FaultyTransport {
    responder: Arc<ExchangeResponder>,
    script: Mutex<VecDeque<Fault>>,
    stats: Mutex<FaultStats>,
}

impl FaultyTransport {
    pub fn new(responder: Arc<ExchangeResponder>) -> Self {
        Self {
            responder,
            script: Mutex::new(VecDeque::new()),
            stats: Mutex::new(FaultStats::default()),
        }
    }

    pub fn push(&self, fault: Fault) {
        self.script.lock().push_back(fault);
    }

    pub fn extend(&self, faults: impl IntoIterator<Item = Fault>) {
        self.script.lock().extend(faults);
    }

    /// Drop any faults not yet applied
    pub fn clear(&self) {
        self.script.lock().clear();
    }

    pub fn stats(&self) -> FaultStats {
        *self.stats.lock()
    }

    fn deliver(&self, request: &CommandRequest) -> Result<CommandResponse, TransportError> {
        self.responder
            .handle(request)
            .map_err(|e| TransportError::Refused(e.to_string()))
    }
}

#[async_trait]
impl Transport for FaultyTransport {
    async fn exchange(&self, request: CommandRequest) -> Result<CommandResponse, TransportError> {
        let fault = self.script.lock().pop_front().unwrap_or(Fault::Deliver);
        tracing::trace!(request_id = %request.request_id, ?fault, "faulty transport");
        match fault {
            Fault::Deliver => {
                self.stats.lock().delivered += 1;
                self.deliver(&request)
            }
            Fault::DropRequest => {
                self.stats.lock().dropped_requests += 1;
                Err(TransportError::Dropped)
            }
            Fault::DropResponse => {
                self.stats.lock().dropped_responses += 1;
                self.deliver(&request)?;
                Err(TransportError::Dropped)
            }
            Fault::Duplicate => {
                self.stats.lock().duplicated += 1;
                self.deliver(&request)?;
                self.deliver(&request)
            }
        }
    }

    fn transport_type(&self) -> &'static str {
        "faulty"
    }
}
