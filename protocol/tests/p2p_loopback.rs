//! Transport-level tests over real loopback sockets: two libp2p hosts,
//! ephemeral TCP ports, one-shot framed streams.

use std::sync::Arc;
use std::time::Duration;

use libp2p::identity::Keypair;
use libp2p::PeerId;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use selo_protocol::config;
use selo_protocol::ledger::Block;
use selo_protocol::network::peers::{PeerDirectory, PeerRecord};
use selo_protocol::network::protocol::ProtocolMessage;
use selo_protocol::network::service::{Envelope, Outbound, P2pService};

struct Host {
    service: P2pService,
    directory: Arc<PeerDirectory>,
    inbound_rx: mpsc::Receiver<Envelope>,
    _outbound_tx: mpsc::Sender<Outbound>,
    cancel: CancellationToken,
}

fn spawn_host() -> Host {
    let keypair = Keypair::generate_ed25519();
    let directory = Arc::new(PeerDirectory::new());
    let cancel = CancellationToken::new();
    let (inbound_tx, inbound_rx) = mpsc::channel(config::CHANNEL_CAPACITY);
    let (outbound_tx, outbound_rx) = mpsc::channel(config::CHANNEL_CAPACITY);

    let service = P2pService::spawn(
        keypair,
        "/ip4/127.0.0.1/tcp/0".parse().unwrap(),
        Arc::clone(&directory),
        inbound_tx,
        outbound_rx,
        cancel.clone(),
    )
    .expect("transport setup");

    Host {
        service,
        directory,
        inbound_rx,
        _outbound_tx: outbound_tx,
        cancel,
    }
}

async fn record_of(host: &Host) -> PeerRecord {
    let addr = timeout(Duration::from_secs(5), host.service.listen_addr())
        .await
        .expect("listen address in time")
        .expect("transport bound");
    PeerRecord {
        id: host.service.local_peer_id(),
        addr,
    }
}

#[tokio::test]
async fn one_shot_message_crosses_the_wire() {
    let host_a = spawn_host();
    let mut host_b = spawn_host();
    let record_b = record_of(&host_b).await;

    host_a.service.connect(record_b.clone()).await;

    // The dial is best-effort; wait for delivery rather than connection
    // state. GETBLOCK goes through inbound (HELLO would be absorbed).
    let wanted = [0x5E; 32];
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    let envelope = loop {
        host_a
            .service
            .send_to(record_b.id, ProtocolMessage::get_block(&wanted))
            .await;
        match timeout(Duration::from_millis(500), host_b.inbound_rx.recv()).await {
            Ok(Some(envelope)) => break envelope,
            Ok(None) => panic!("inbound queue closed"),
            Err(_) if tokio::time::Instant::now() < deadline => continue,
            Err(_) => panic!("message never arrived"),
        }
    };

    assert_eq!(envelope.from, host_a.service.local_peer_id());
    assert_eq!(envelope.msg, ProtocolMessage::get_block(&wanted));

    // Both sides observed the session.
    assert!(host_a.directory.is_connected(&record_b.id));

    host_a.cancel.cancel();
    host_b.cancel.cancel();
}

#[tokio::test]
async fn hello_is_absorbed_and_merges_peers() {
    let host_a = spawn_host();
    let mut host_b = spawn_host();
    let host_c = spawn_host();

    let record_b = record_of(&host_b).await;
    let record_c = record_of(&host_c).await;

    host_a.service.connect(record_b.clone()).await;

    // A introduces itself to B, advertising C.
    let hello = ProtocolMessage::hello(
        host_a.service.local_peer_id().to_string(),
        1,
        config::PROTOCOL_VERSION.to_owned(),
        vec![record_c.p2p_addr().to_string()],
    );

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        host_a.service.send_to(record_b.id, hello.clone()).await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        if host_b.directory.is_known(&record_c.id) {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "HELLO merge never happened"
        );
    }

    // B merged C, marked A connected, and the runtime saw nothing.
    assert!(host_b.directory.is_known(&record_c.id));
    assert!(host_b.directory.is_connected(&host_a.service.local_peer_id()));
    let nothing = timeout(Duration::from_millis(200), host_b.inbound_rx.recv()).await;
    assert!(nothing.is_err(), "HELLO must not reach the inbound queue");

    host_a.cancel.cancel();
    host_b.cancel.cancel();
    host_c.cancel.cancel();
}

#[tokio::test]
async fn broadcast_reaches_connected_peers() {
    let host_a = spawn_host();
    let mut host_b = spawn_host();
    let record_b = record_of(&host_b).await;

    host_a.service.connect(record_b.clone()).await;

    // Wait until the session is up so the broadcast has a target.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !host_a.directory.is_connected(&record_b.id) {
        assert!(
            tokio::time::Instant::now() < deadline,
            "connection never established"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let msg = ProtocolMessage::gossip(Block::genesis(), 1);
    host_a.service.broadcast(msg.clone()).await;

    let envelope = timeout(Duration::from_secs(5), host_b.inbound_rx.recv())
        .await
        .expect("broadcast delivered in time")
        .expect("inbound queue open");
    assert_eq!(envelope.msg, msg);

    host_a.cancel.cancel();
    host_b.cancel.cancel();
}

#[tokio::test]
async fn send_to_unknown_peer_is_dropped_silently() {
    let host_a = spawn_host();

    // No address for this peer anywhere — the send must fail quietly
    // without unwinding.
    host_a
        .service
        .send_to(PeerId::random(), ProtocolMessage::block(None))
        .await;

    host_a.cancel.cancel();
}
