//! Two complete nodes sharing one channel
//!
//! Each side owns a registry over its own memory store, an Ed25519 signer and
//! an exchange whose [`FaultyTransport`] calls the other side's responder.
//! Steps run one at a time, so interleavings are fully determined by the
//! schedule.

use crate::faulty::{Fault, FaultyTransport};
use crate::fixtures::{alice, bob, payment, signer};
use offchain_core::{
    ObjectId, ObjectState, ObjectStatus, OffChainObject, ProtocolConfig, RetryPolicy, TieBreak,
    Validator, VaspId,
};
use offchain_effects::{Ed25519Signer, KeyRing, PaymentValidator};
use offchain_journal::MemoryCommandStore;
use offchain_sequencer::{ChannelRegistry, ProposeOutcome, SequencerError, SharedSequencer};
use offchain_sync::{ChannelExchange, ExchangeError, ExchangeResponder, SyncReport};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Alice,
    Bob,
}

impl Side {
    pub fn other(self) -> Self {
        match self {
            Side::Alice => Side::Bob,
            Side::Bob => Side::Alice,
        }
    }
}

/// One scheduled action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Create the object, or move it to `status`
    Advance {
        side: Side,
        object: ObjectId,
        status: ObjectStatus,
    },
    /// One exchange attempt from `side`, subject to `fault`
    Sync { side: Side, fault: Fault },
    /// Drop in-memory state and rebuild from the store
    Restart { side: Side },
}

#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error(transparent)]
    Sequencer(#[from] SequencerError),

    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error("not converged after {rounds} rounds")]
    NotConverged { rounds: usize },
}

struct Node {
    id: VaspId,
    registry: Arc<ChannelRegistry>,
    signer: Arc<Ed25519Signer>,
    transport: Arc<FaultyTransport>,
    exchange: ChannelExchange,
}

pub struct SimulatedPair {
    alice: Node,
    bob: Node,
    config: ProtocolConfig,
}

impl SimulatedPair {
    /// Pair validating payments, one exchange attempt per sync
    pub fn new(tie_break: TieBreak) -> Self {
        let config = ProtocolConfig {
            tie_break,
            retry: RetryPolicy::no_retry(),
            ..ProtocolConfig::default()
        };
        Self::with_validator(config, Arc::new(PaymentValidator))
    }

    pub fn with_validator(config: ProtocolConfig, validator: Arc<dyn Validator>) -> Self {
        let keys = Arc::new(KeyRing::new());
        let alice_signer = Arc::new(signer(1));
        let bob_signer = Arc::new(signer(2));
        keys.register(alice(), alice_signer.verifying_key());
        keys.register(bob(), bob_signer.verifying_key());

        let registry = |local| {
            Arc::new(ChannelRegistry::new(
                local,
                Arc::new(MemoryCommandStore::new()),
                validator.clone(),
                config.tie_break,
            ))
        };
        let alice_registry = registry(alice());
        let bob_registry = registry(bob());
        let responder = |registry: &Arc<ChannelRegistry>| {
            Arc::new(ExchangeResponder::new(registry.clone(), keys.clone()))
        };

        let alice_node = Node::new(
            alice_registry.clone(),
            bob(),
            alice_signer,
            Arc::new(FaultyTransport::new(responder(&bob_registry))),
            &config,
        );
        let bob_node = Node::new(
            bob_registry,
            alice(),
            bob_signer,
            Arc::new(FaultyTransport::new(responder(&alice_registry))),
            &config,
        );
        Self {
            alice: alice_node,
            bob: bob_node,
            config,
        }
    }

    fn node(&self, side: Side) -> &Node {
        match side {
            Side::Alice => &self.alice,
            Side::Bob => &self.bob,
        }
    }

    pub fn id(&self, side: Side) -> VaspId {
        self.node(side).id
    }

    pub fn registry(&self, side: Side) -> &Arc<ChannelRegistry> {
        &self.node(side).registry
    }

    /// Outbound transport of `side`
    pub fn transport(&self, side: Side) -> &Arc<FaultyTransport> {
        &self.node(side).transport
    }

    pub fn sequencer(&self, side: Side) -> SharedSequencer {
        self.node(side).exchange.sequencer().clone()
    }

    /// Create `object` or move it to `status` from `side`'s current view
    pub fn advance(
        &self,
        side: Side,
        object: &ObjectId,
        status: ObjectStatus,
    ) -> Result<ProposeOutcome, SequencerError> {
        let channel = self.sequencer(side);
        let mut sequencer = channel.lock();
        let state = match sequencer.object(object) {
            Some(current) => current.state.clone().with_status(status),
            None => payment(object.as_str()),
        };
        let command = sequencer.draft(object.clone(), state);
        sequencer.propose(command)
    }

    /// Propose an arbitrary next state of `object` from `side`
    pub fn propose(
        &self,
        side: Side,
        object: &ObjectId,
        state: ObjectState,
    ) -> Result<ProposeOutcome, SequencerError> {
        let channel = self.sequencer(side);
        let mut sequencer = channel.lock();
        let command = sequencer.draft(object.clone(), state);
        sequencer.propose(command)
    }

    pub async fn sync(&self, side: Side) -> Result<SyncReport, ExchangeError> {
        self.node(side).exchange.sync_once().await
    }

    /// Rebuild `side`'s channel from its store
    pub fn restart(&mut self, side: Side) -> Result<(), SequencerError> {
        let config = self.config.clone();
        let node = match side {
            Side::Alice => &mut self.alice,
            Side::Bob => &mut self.bob,
        };
        let peer = node.exchange.sequencer().lock().remote_id();
        let channel = node.registry.reopen(peer)?;
        node.exchange = node.exchange_for(channel, &config);
        tracing::debug!(vasp = %node.id, "node restarted");
        Ok(())
    }

    /// Run one scheduled step. Exhausted exchanges are expected under faults.
    pub async fn step(&mut self, step: &Step) -> Result<(), SimulationError> {
        match step {
            Step::Advance {
                side,
                object,
                status,
            } => {
                self.advance(*side, object, *status)?;
            }
            Step::Sync { side, fault } => {
                self.transport(*side).push(*fault);
                match self.sync(*side).await {
                    Ok(_) | Err(ExchangeError::Failed { .. }) => {}
                    Err(err) => return Err(err.into()),
                }
            }
            Step::Restart { side } => self.restart(*side)?,
        }
        Ok(())
    }

    /// Deliver everything until both sides are settled
    pub async fn settle(&self, max_rounds: usize) -> Result<usize, SimulationError> {
        self.alice.transport.clear();
        self.bob.transport.clear();
        for round in 0..max_rounds {
            if self.is_settled() {
                return Ok(round);
            }
            for side in [Side::Alice, Side::Bob] {
                if self.node(side).exchange.has_work() {
                    self.sync(side).await?;
                }
            }
        }
        if self.is_settled() {
            return Ok(max_rounds);
        }
        Err(SimulationError::NotConverged { rounds: max_rounds })
    }

    pub fn is_settled(&self) -> bool {
        [Side::Alice, Side::Bob]
            .iter()
            .all(|side| self.sequencer(*side).lock().is_settled())
    }

    /// Current object view of `side`
    pub fn objects(&self, side: Side) -> BTreeMap<ObjectId, OffChainObject> {
        self.sequencer(side)
            .lock()
            .state()
            .objects()
            .map(|object| (object.object_id.clone(), object.clone()))
            .collect()
    }

    /// Both settled with identical objects
    pub fn converged(&self) -> bool {
        self.is_settled() && self.objects(Side::Alice) == self.objects(Side::Bob)
    }
}

impl Node {
    fn new(
        registry: Arc<ChannelRegistry>,
        peer: VaspId,
        signer: Arc<Ed25519Signer>,
        transport: Arc<FaultyTransport>,
        config: &ProtocolConfig,
    ) -> Self {
        let channel = registry
            .channel(peer)
            .expect("empty memory store always opens");
        let exchange = ChannelExchange::new(channel, transport.clone(), signer.clone(), config.clone());
        Self {
            id: registry.local_id(),
            registry,
            signer,
            transport,
            exchange,
        }
    }

    fn exchange_for(&self, channel: SharedSequencer, config: &ProtocolConfig) -> ChannelExchange {
        ChannelExchange::new(
            channel,
            self.transport.clone(),
            self.signer.clone(),
            config.clone(),
        )
    }
}
