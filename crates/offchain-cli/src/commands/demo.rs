//! Local two-VASP demo run
//!
//! Starts two VASPs in one process, connected through the memory transport,
//! with exchange workers on both sides. The first VASP creates a batch of
//! payments as their sender; with `--conflicts` both then fill in their own
//! side of every payment at the same time so each one is decided by the
//! tie-break.

use crate::config::NodeConfig;
use anyhow::{bail, Context, Result};
use clap::Args;
use offchain_core::{now_millis, ObjectId, ObjectStatus, Party, VaspId};
use offchain_effects::{
    payment_between, role_of, Ed25519Signer, FileCommandStore, KeyRing, MemoryNetwork,
    PaymentValidator, Role,
};
use offchain_journal::{CommandStore, MemoryCommandStore};
use offchain_sequencer::{ChannelRegistry, ProposeOutcome, SharedSequencer};
use offchain_sync::{ChannelExchange, ExchangeHandle, ExchangeResponder, ExchangeWorker};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Demo command
#[derive(Args)]
pub struct DemoCommand {
    /// Payments created by the first VASP
    #[arg(short = 'n', long, default_value = "100")]
    pub payments: usize,

    /// Afterwards, update every payment from both sides concurrently
    #[arg(long)]
    pub conflicts: bool,

    /// Keep journals in memory instead of the store directory
    #[arg(long)]
    pub in_memory: bool,

    /// Rounds allowed for each phase to settle
    #[arg(long, default_value = "1000")]
    pub max_rounds: usize,
}

struct DemoNode {
    name: &'static str,
    id: VaspId,
    registry: Arc<ChannelRegistry>,
    signer: Arc<Ed25519Signer>,
}

impl DemoNode {
    fn new(name: &'static str, seed: u8, cmd: &DemoCommand, config: &NodeConfig) -> Result<Self> {
        let id = VaspId::new_from_entropy([seed; 32]);
        let store: Arc<dyn CommandStore> = if cmd.in_memory {
            Arc::new(MemoryCommandStore::new())
        } else {
            let dir = config.store_dir.join(name);
            Arc::new(
                FileCommandStore::open(&dir)
                    .with_context(|| format!("opening store {}", dir.display()))?,
            )
        };
        Ok(Self {
            name,
            id,
            registry: Arc::new(ChannelRegistry::new(
                id,
                store,
                Arc::new(PaymentValidator),
                config.protocol.tie_break,
            )),
            signer: Arc::new(Ed25519Signer::from_seed(id, [seed; 32])),
        })
    }

    fn channel(&self, peer: VaspId) -> Result<SharedSequencer> {
        Ok(self.registry.channel(peer)?)
    }
}

struct Side {
    node: DemoNode,
    peer: VaspId,
    exchange: Arc<ChannelExchange>,
    handle: ExchangeHandle,
}

/// Run the demo
pub async fn run(cmd: DemoCommand, config: &NodeConfig) -> Result<()> {
    let keys = Arc::new(KeyRing::new());
    let network = MemoryNetwork::new();
    let alice = DemoNode::new("alice", 0xA1, &cmd, config)?;
    let bob = DemoNode::new("bob", 0xB2, &cmd, config)?;

    let mut tasks = Vec::new();
    for node in [&alice, &bob] {
        keys.register(node.id, node.signer.verifying_key());
        tasks.push(network.attach(
            node.id,
            Arc::new(ExchangeResponder::new(node.registry.clone(), keys.clone())),
        ));
    }

    let (alice_id, bob_id) = (alice.id, bob.id);
    let mut sides = Vec::new();
    for (node, peer) in [(alice, bob_id), (bob, alice_id)] {
        let exchange = Arc::new(ChannelExchange::new(
            node.channel(peer)?,
            Arc::new(network.transport(node.id)),
            node.signer.clone(),
            config.protocol.clone(),
        ));
        let (handle, task) =
            ExchangeWorker::spawn(exchange.clone(), config.protocol.sync_interval());
        tasks.push(task);
        sides.push(Side {
            node,
            peer,
            exchange,
            handle,
        });
    }
    info!(alice = %alice_id, bob = %bob_id, tie_break = ?config.protocol.tie_break, "demo nodes started");

    let run_tag = now_millis();
    let ids: Vec<ObjectId> = (0..cmd.payments)
        .map(|i| ObjectId::new(format!("pay-{run_tag}-{i}")))
        .collect();

    let started = Instant::now();
    let accepted = create_payments(&sides[0], &ids)?;
    let rounds = settle(&sides, cmd.max_rounds).await?;
    let elapsed = started.elapsed();
    println!(
        "Created {accepted}/{} payments in {:.2}s over {rounds} rounds",
        ids.len(),
        elapsed.as_secs_f64()
    );
    println!(
        "Estimated throughput: {:.0} commands/s",
        accepted as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
    );

    if cmd.conflicts {
        let started = Instant::now();
        race_updates(&sides, &ids)?;
        let rounds = settle(&sides, cmd.max_rounds).await?;
        println!(
            "Resolved {} concurrent update pairs in {:.2}s over {rounds} rounds",
            ids.len(),
            started.elapsed().as_secs_f64()
        );
        report_winners(&sides[0], &ids)?;
    }

    for side in &sides {
        report(side)?;
        side.handle.shutdown();
    }
    for node in [alice_id, bob_id] {
        network.detach(&node);
    }
    for task in tasks {
        let _ = task.await;
    }
    Ok(())
}

fn create_payments(side: &Side, ids: &[ObjectId]) -> Result<usize> {
    let channel = side.node.channel(side.peer)?;
    let mut sequencer = channel.lock();
    let mut accepted = 0;
    for id in ids {
        let state = payment_between(id.as_str(), side.node.id, side.peer);
        let command = sequencer.draft(id.clone(), state);
        if let ProposeOutcome::Accepted { .. } = sequencer.propose(command)? {
            accepted += 1;
        }
    }
    Ok(accepted)
}

/// Both sides extend the same version of every payment with their own KYC
fn race_updates(sides: &[Side], ids: &[ObjectId]) -> Result<()> {
    for id in ids {
        for side in sides {
            let channel = side.node.channel(side.peer)?;
            let mut sequencer = channel.lock();
            let Some(current) = sequencer.object(id) else {
                continue;
            };
            let Some(role) = role_of(&current.state, side.node.id) else {
                continue;
            };
            let (status, role_status) = match role {
                Role::Sender => (ObjectStatus::SoftMatch, ObjectStatus::NeedsRecipientSignature),
                Role::Receiver => (ObjectStatus::NeedsRecipientSignature, ObjectStatus::SoftMatch),
            };
            let state = current
                .state
                .clone()
                .with_status(status)
                .with_field(role.kyc_field(), kyc_blob(id))
                .with_field(role.status_field(), role_status.as_str());
            let command = sequencer.draft(id.clone(), state);
            sequencer.propose(command)?;
        }
    }
    Ok(())
}

fn kyc_blob(id: &ObjectId) -> String {
    serde_json::json!({
        "payment_reference_id": id.as_str(),
        "type": "individual",
    })
    .to_string()
}

/// Trigger exchanges on both sides until neither has work left
async fn settle(sides: &[Side], max_rounds: usize) -> Result<usize> {
    for round in 0..max_rounds {
        if sides.iter().all(|side| !side.exchange.has_work()) {
            return Ok(round);
        }
        for side in sides {
            if side.exchange.has_work() {
                side.handle.sync_now().await?;
            }
        }
    }
    bail!("channel not settled after {max_rounds} rounds")
}

fn report_winners(side: &Side, ids: &[ObjectId]) -> Result<()> {
    let channel = side.node.channel(side.peer)?;
    let sequencer = channel.lock();
    let won_with = |status: ObjectStatus| {
        ids.iter()
            .filter_map(|id| sequencer.object(id))
            .filter(|object| object.status() == status)
            .count()
    };
    println!(
        "Races won: alice {}, bob {}",
        won_with(ObjectStatus::SoftMatch),
        won_with(ObjectStatus::NeedsRecipientSignature)
    );
    Ok(())
}

fn report(side: &Side) -> Result<()> {
    let channel = side.node.channel(side.peer)?;
    let sequencer = channel.lock();
    for party in [Party::Local, Party::Remote] {
        let sequence = sequencer.state().sequence(party);
        let applied = sequence.iter().filter(|e| e.disposition.is_applied()).count();
        println!(
            "{} {party} sequence: {applied}/{} applied, {} pending",
            side.node.name,
            sequence.len(),
            sequence.pending_count()
        );
    }
    Ok(())
}
