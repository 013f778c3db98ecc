//! In-memory transport
//!
//! Endpoints exchange bincode-encoded requests over unbounded channels, so
//! every message crosses the same encoding a network transport would use.

use async_trait::async_trait;
use offchain_core::VaspId;
use offchain_sync::{
    decode, encode, CommandRequest, CommandResponse, ExchangeResponder, Transport, TransportError,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

struct Inbound {
    bytes: Vec<u8>,
    reply: oneshot::Sender<Result<Vec<u8>, TransportError>>,
}

/// Registry of in-process endpoints
#[derive(Default)]
pub struct MemoryNetwork {
    endpoints: RwLock<HashMap<VaspId, mpsc::UnboundedSender<Inbound>>>,
}

impl MemoryNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Serve requests addressed to `vasp` with `responder`
    pub fn attach(&self, vasp: VaspId, responder: Arc<ExchangeResponder>) -> JoinHandle<()> {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Inbound>();
        self.endpoints.write().insert(vasp, sender);
        tokio::spawn(async move {
            while let Some(inbound) = receiver.recv().await {
                let result = decode::<CommandRequest>(&inbound.bytes).and_then(|request| {
                    let response = responder
                        .handle(&request)
                        .map_err(|e| TransportError::Refused(e.to_string()))?;
                    encode(&response)
                });
                let _ = inbound.reply.send(result);
            }
            tracing::debug!(%vasp, "memory endpoint closed");
        })
    }

    /// Take `vasp` offline; its serving task ends
    pub fn detach(&self, vasp: &VaspId) -> bool {
        self.endpoints.write().remove(vasp).is_some()
    }

    pub fn is_reachable(&self, vasp: &VaspId) -> bool {
        self.endpoints.read().contains_key(vasp)
    }

    /// Transport for `local` to talk through this network
    pub fn transport(self: &Arc<Self>, local: VaspId) -> MemoryTransport {
        MemoryTransport {
            local,
            network: self.clone(),
        }
    }
}

/// [`Transport`] over a [`MemoryNetwork`]
#[derive(Clone)]
pub struct MemoryTransport {
    local: VaspId,
    network: Arc<MemoryNetwork>,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn exchange(&self, request: CommandRequest) -> Result<CommandResponse, TransportError> {
        let endpoint = self
            .network
            .endpoints
            .read()
            .get(&request.receiver)
            .cloned()
            .ok_or(TransportError::Unreachable(request.receiver))?;
        tracing::trace!(
            from = %self.local,
            to = %request.receiver,
            envelopes = request.envelopes.len(),
            "memory transport send"
        );

        let (reply, response) = oneshot::channel();
        endpoint
            .send(Inbound {
                bytes: encode(&request)?,
                reply,
            })
            .map_err(|_| TransportError::Disconnected)?;
        let bytes = response.await.map_err(|_| TransportError::Disconnected)??;
        decode(&bytes)
    }

    fn transport_type(&self) -> &'static str {
        "memory"
    }
}
