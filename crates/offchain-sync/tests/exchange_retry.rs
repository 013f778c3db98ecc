//! Retry, timeout and worker behaviour of the exchange driver

#![allow(clippy::unwrap_used)]

use assert_matches::assert_matches;
use async_trait::async_trait;
use offchain_core::{
    hash, AcceptAll, ObjectId, ObjectState, ObjectStatus, Party, ProtocolConfig, RetryPolicy,
    TieBreak, VaspId,
};
use offchain_journal::MemoryCommandStore;
use offchain_sequencer::ChannelRegistry;
use offchain_sync::{
    ChannelExchange, CommandRequest, CommandResponse, EnvelopeSigner, EnvelopeVerifier,
    ExchangeError, ExchangeResponder, ExchangeWorker, SignatureError, Transport, TransportError,
};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct DigestSigner(VaspId);
struct DigestVerifier;

fn digest(signer: VaspId, payload: &[u8]) -> Vec<u8> {
    let mut data = signer.to_bytes().to_vec();
    data.extend_from_slice(payload);
    hash(&data).as_bytes().to_vec()
}

impl EnvelopeSigner for DigestSigner {
    fn signer_id(&self) -> VaspId {
        self.0
    }

    fn sign(&self, payload: &[u8]) -> Vec<u8> {
        digest(self.0, payload)
    }
}

impl EnvelopeVerifier for DigestVerifier {
    fn verify(&self, signer: VaspId, payload: &[u8], signature: &[u8]) -> Result<(), SignatureError> {
        if digest(signer, payload) == signature {
            Ok(())
        } else {
            Err(SignatureError::BadSignature(signer))
        }
    }
}

/// Calls the peer's responder directly, with injected faults
struct DirectTransport {
    responder: ExchangeResponder,
    fail_sends: AtomicU32,
    drop_responses: AtomicU32,
    hang: AtomicBool,
}

fn take(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl Transport for DirectTransport {
    async fn exchange(&self, request: CommandRequest) -> Result<CommandResponse, TransportError> {
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if take(&self.fail_sends) {
            return Err(TransportError::Unreachable(request.receiver));
        }
        let response = self
            .responder
            .handle(&request)
            .map_err(|e| TransportError::Refused(e.to_string()))?;
        if take(&self.drop_responses) {
            return Err(TransportError::Dropped);
        }
        Ok(response)
    }

    fn transport_type(&self) -> &'static str {
        "direct"
    }
}

struct Fixture {
    alice: Arc<ChannelRegistry>,
    bob: Arc<ChannelRegistry>,
    transport: Arc<DirectTransport>,
    exchange: Arc<ChannelExchange>,
    b: VaspId,
    a: VaspId,
}

fn fixture(max_attempts: u32) -> Fixture {
    let a = VaspId::new_from_entropy([1u8; 32]);
    let b = VaspId::new_from_entropy([2u8; 32]);
    let registry = |local| {
        Arc::new(ChannelRegistry::new(
            local,
            Arc::new(MemoryCommandStore::new()),
            Arc::new(AcceptAll),
            TieBreak::default(),
        ))
    };
    let alice = registry(a);
    let bob = registry(b);
    let transport = Arc::new(DirectTransport {
        responder: ExchangeResponder::new(bob.clone(), Arc::new(DigestVerifier)),
        fail_sends: AtomicU32::new(0),
        drop_responses: AtomicU32::new(0),
        hang: AtomicBool::new(false),
    });
    let config = ProtocolConfig {
        retry: RetryPolicy {
            max_attempts,
            ..RetryPolicy::default()
        },
        ..ProtocolConfig::default()
    };
    let exchange = Arc::new(ChannelExchange::new(
        alice.channel(b).unwrap(),
        transport.clone(),
        Arc::new(DigestSigner(a)),
        config,
    ));
    Fixture {
        alice,
        bob,
        transport,
        exchange,
        a,
        b,
    }
}

fn propose(registry: &ChannelRegistry, peer: VaspId, object: &str) {
    let channel = registry.channel(peer).unwrap();
    let mut sequencer = channel.lock();
    let command = sequencer.draft(
        ObjectId::new(object),
        ObjectState::new(ObjectStatus::NeedsKycData),
    );
    sequencer.propose(command).unwrap();
}

#[tokio::test(start_paused = true)]
async fn retries_until_delivered() {
    let f = fixture(5);
    propose(&f.alice, f.b, "p1");
    f.transport.fail_sends.store(2, Ordering::SeqCst);

    let report = f.exchange.sync_once().await.unwrap();
    assert_eq!(report.attempts, 3);
    assert_eq!(report.sent, 1);
    assert_eq!(report.summary.acknowledged, 1);
    assert_eq!(f.exchange.in_flight(), 0);
    assert!(!f.exchange.has_work());
}

#[tokio::test(start_paused = true)]
async fn lost_responses_do_not_double_apply() {
    let f = fixture(5);
    propose(&f.alice, f.b, "p1");
    propose(&f.alice, f.b, "p2");
    f.transport.drop_responses.store(2, Ordering::SeqCst);

    let report = f.exchange.sync_once().await.unwrap();
    assert_eq!(report.attempts, 3);
    assert_eq!(report.summary.acknowledged, 2);

    let bob = f.bob.channel(f.a).unwrap();
    let bob = bob.lock();
    assert_eq!(bob.next_expected_offset(Party::Remote), 2);
    assert_eq!(bob.object(&ObjectId::new("p1")).unwrap().version, 1);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_surface_failed() {
    let f = fixture(3);
    propose(&f.alice, f.b, "p1");
    f.transport.fail_sends.store(u32::MAX, Ordering::SeqCst);

    let err = f.exchange.sync_once().await.unwrap_err();
    assert_matches!(
        &err,
        ExchangeError::Failed { command_ids, attempts: 3, .. } if command_ids.len() == 1
    );
    // Committed commands stay pending for a later round
    let alice = f.alice.channel(f.b).unwrap();
    assert_eq!(alice.lock().pending_local(), 1);
    assert_eq!(f.exchange.in_flight(), 0);

    f.transport.fail_sends.store(0, Ordering::SeqCst);
    assert_eq!(f.exchange.sync_until_settled(4).await.unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn unresponsive_peer_times_out() {
    let f = fixture(2);
    propose(&f.alice, f.b, "p1");
    f.transport.hang.store(true, Ordering::SeqCst);

    let started = tokio::time::Instant::now();
    let err = f.exchange.sync_once().await.unwrap_err();
    assert_matches!(err, ExchangeError::Failed { attempts: 2, .. });
    // Two timeouts plus one backoff delay
    let timeout = ProtocolConfig::default().request_timeout();
    assert!(started.elapsed() >= timeout * 2);
}

#[tokio::test(start_paused = true)]
async fn worker_syncs_on_demand_and_on_tick() {
    let f = fixture(3);
    let (handle, task) = ExchangeWorker::spawn(f.exchange.clone(), Duration::from_secs(1));

    propose(&f.alice, f.b, "p1");
    let report = handle.sync_now().await.unwrap();
    assert_eq!(report.summary.acknowledged, 1);

    propose(&f.alice, f.b, "p2");
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!f.exchange.has_work());

    handle.shutdown();
    task.await.unwrap();
    assert_matches!(handle.sync_now().await, Err(ExchangeError::Shutdown));
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_retry_loop() {
    let f = fixture(100);
    propose(&f.alice, f.b, "p1");
    f.transport.fail_sends.store(u32::MAX, Ordering::SeqCst);
    let (handle, task) = ExchangeWorker::spawn(f.exchange.clone(), Duration::from_millis(50));

    tokio::time::sleep(Duration::from_secs(1)).await;
    handle.shutdown();
    task.await.unwrap();

    let alice = f.alice.channel(f.b).unwrap();
    assert_eq!(alice.lock().next_expected_offset(Party::Local), 1);
    assert_eq!(alice.lock().pending_local(), 1);
}
