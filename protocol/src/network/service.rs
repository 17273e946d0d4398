//! # Transport Session Manager
//!
//! Owns the node's encrypted libp2p host (TCP + Noise + yamux) and moves
//! protocol messages between the wire and the node runtime's queues.
//!
//! Three task groups run under one cancellation token:
//!
//! - the **swarm driver** polls the swarm, executes dial commands, and
//!   keeps the peer directory's connected set in sync with connection
//!   events;
//! - the **inbound acceptor** takes each accepted stream, decodes exactly
//!   one frame, and routes it — HELLO is absorbed here (peer-set merge),
//!   everything else is forwarded into the runtime's bounded inbound
//!   queue. A malformed session is dropped silently; the listener never
//!   dies because of a bad peer;
//! - the **outbound dispatcher** drains the bounded outbound queue and
//!   fans broadcasts out to every connected peer, one concurrent one-shot
//!   session each.
//!
//! Delivery is fire-and-forget: connect, open, write and decode failures
//! are logged and dropped, never propagated to the initiator. The system
//! favors availability over delivery guarantees.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use libp2p::identity::Keypair;
use libp2p::swarm::dial_opts::DialOpts;
use libp2p::swarm::{NetworkBehaviour, SwarmEvent};
use libp2p::{noise, tcp, yamux, Multiaddr, PeerId, StreamProtocol, Swarm, SwarmBuilder};
use libp2p_stream::{Control, IncomingStreams};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio_util::codec::Framed;
use tokio_util::compat::FuturesAsyncReadCompatExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config;
use crate::network::codec::MessageCodec;
use crate::network::peers::{self, PeerDirectory, PeerRecord};
use crate::network::protocol::ProtocolMessage;

/// The stream protocol negotiated on every session.
const SELO_PROTOCOL: StreamProtocol = StreamProtocol::new(config::STREAM_PROTOCOL);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One decoded inbound message together with its sender.
#[derive(Clone, Debug)]
pub struct Envelope {
    pub from: PeerId,
    pub msg: ProtocolMessage,
}

/// Outbound delivery instruction consumed by the dispatcher.
#[derive(Clone, Debug)]
pub enum Outbound {
    /// Fan the message out to every connected peer.
    Broadcast(ProtocolMessage),
    /// One-shot delivery to a single peer.
    Direct { to: PeerId, msg: ProtocolMessage },
}

enum SwarmCommand {
    Dial { id: PeerId, addr: Multiaddr },
}

/// Errors raised while setting up the transport. Everything after setup is
/// best-effort and logged instead.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("transport setup failed: {0}")]
    Setup(String),
}

#[derive(NetworkBehaviour)]
struct Behaviour {
    stream: libp2p_stream::Behaviour,
}

// ---------------------------------------------------------------------------
// P2pService
// ---------------------------------------------------------------------------

/// Handle to the running transport. Cheap to clone; all clones drive the
/// same host.
#[derive(Clone)]
pub struct P2pService {
    local_id: PeerId,
    directory: Arc<PeerDirectory>,
    control: Control,
    commands: mpsc::Sender<SwarmCommand>,
    listen_rx: watch::Receiver<Option<Multiaddr>>,
    cancel: CancellationToken,
}

impl P2pService {
    /// Builds the libp2p host bound to `listen_addr` and spawns the swarm
    /// driver, the inbound acceptor and the outbound dispatcher.
    ///
    /// Decoded non-HELLO messages are delivered through `inbound_tx`;
    /// messages queued on `outbound_rx` are delivered to peers.
    pub fn spawn(
        keypair: Keypair,
        listen_addr: Multiaddr,
        directory: Arc<PeerDirectory>,
        inbound_tx: mpsc::Sender<Envelope>,
        outbound_rx: mpsc::Receiver<Outbound>,
        cancel: CancellationToken,
    ) -> Result<Self, ServiceError> {
        let local_id = PeerId::from(keypair.public());

        let mut swarm = SwarmBuilder::with_existing_identity(keypair)
            .with_tokio()
            .with_tcp(
                tcp::Config::default(),
                noise::Config::new,
                yamux::Config::default,
            )
            .map_err(|e| ServiceError::Setup(e.to_string()))?
            .with_behaviour(|_| Behaviour {
                stream: libp2p_stream::Behaviour::new(),
            })
            .map_err(|e| ServiceError::Setup(e.to_string()))?
            .with_swarm_config(|cfg| {
                cfg.with_idle_connection_timeout(config::IDLE_CONNECTION_TIMEOUT)
            })
            .build();

        swarm
            .listen_on(listen_addr)
            .map_err(|e| ServiceError::Setup(e.to_string()))?;

        let mut control = swarm.behaviour().stream.new_control();
        let incoming = control
            .accept(SELO_PROTOCOL)
            .map_err(|e| ServiceError::Setup(format!("{e:?}")))?;

        let (cmd_tx, cmd_rx) = mpsc::channel(config::CHANNEL_CAPACITY);
        let (listen_tx, listen_rx) = watch::channel(None);

        let service = Self {
            local_id,
            directory: Arc::clone(&directory),
            control,
            commands: cmd_tx,
            listen_rx,
            cancel: cancel.clone(),
        };

        tokio::spawn(drive_swarm(swarm, cmd_rx, directory, listen_tx, cancel));
        tokio::spawn(accept_inbound(incoming, service.clone(), inbound_tx));
        tokio::spawn(dispatch_outbound(outbound_rx, service.clone()));

        info!(peer_id = %local_id, "p2p service started");
        Ok(service)
    }

    /// This host's peer id.
    pub fn local_peer_id(&self) -> PeerId {
        self.local_id
    }

    /// Waits for the host's first bound listen address. `None` if the
    /// transport shut down before binding.
    pub async fn listen_addr(&self) -> Option<Multiaddr> {
        let mut rx = self.listen_rx.clone();
        loop {
            let bound = rx.borrow().clone();
            if bound.is_some() {
                return bound;
            }
            if rx.changed().await.is_err() {
                return None;
            }
        }
    }

    /// Best-effort dial. Registers the peer as known immediately; the
    /// connected flag flips when the swarm reports the session. A failed
    /// dial is logged and never surfaces to the caller.
    pub async fn connect(&self, record: PeerRecord) {
        self.directory
            .add_known(record.id, Some(record.addr.clone()));
        let cmd = SwarmCommand::Dial {
            id: record.id,
            addr: record.addr,
        };
        if self.commands.send(cmd).await.is_err() {
            warn!("swarm driver is gone, dropping dial request");
        }
    }

    /// Opens a fresh session to `peer`, writes one framed message, and
    /// closes it. Failures are logged and dropped.
    pub async fn send_to(&self, peer: PeerId, msg: ProtocolMessage) {
        let mut control = self.control.clone();
        let stream = match control.open_stream(peer, SELO_PROTOCOL).await {
            Ok(stream) => stream,
            Err(err) => {
                warn!(%peer, ?err, "failed to open stream");
                return;
            }
        };

        let tag = msg.tag();
        let mut framed = Framed::new(stream.compat(), MessageCodec::new());
        if let Err(err) = framed.send(msg).await {
            warn!(%peer, %err, "failed to write message");
            return;
        }
        let _ = framed.close().await;
        debug!(%peer, tag, "message sent");
    }

    /// Fans `msg` out to every connected peer, one concurrent one-shot
    /// session per peer. Partial failure is not reported back.
    pub async fn broadcast(&self, msg: ProtocolMessage) {
        let targets = self.directory.connected();
        if targets.is_empty() {
            debug!(tag = msg.tag(), "no connected peers, dropping broadcast");
            return;
        }

        for peer in targets {
            let service = self.clone();
            let msg = msg.clone();
            tokio::spawn(async move {
                service.send_to(peer, msg).await;
            });
        }
    }

    /// Merges a HELLO peer list: dial every advertised peer not already
    /// known, then register the sender as known and connected.
    async fn merge_peers(&self, sender: PeerId, advertised: &[String]) {
        for addr in advertised {
            let record = match peers::split_p2p_addr(addr) {
                Ok(record) => record,
                Err(err) => {
                    debug!(%addr, %err, "ignoring malformed peer address");
                    continue;
                }
            };
            if record.id == self.local_id || self.directory.is_known(&record.id) {
                continue;
            }
            self.connect(record).await;
        }

        // The sender just proved reachable through a live inbound session.
        self.directory.mark_connected(sender);
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// Polls the swarm, executes dial commands, and mirrors connection state
/// into the peer directory.
async fn drive_swarm(
    mut swarm: Swarm<Behaviour>,
    mut commands: mpsc::Receiver<SwarmCommand>,
    directory: Arc<PeerDirectory>,
    listen_tx: watch::Sender<Option<Multiaddr>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("swarm driver stopping");
                return;
            }
            cmd = commands.recv() => {
                let Some(cmd) = cmd else { return };
                match cmd {
                    SwarmCommand::Dial { id, addr } => {
                        swarm.add_peer_address(id, addr.clone());
                        let opts = DialOpts::peer_id(id).addresses(vec![addr]).build();
                        if let Err(err) = swarm.dial(opts) {
                            warn!(peer = %id, %err, "dial failed");
                        }
                    }
                }
            }
            event = swarm.select_next_some() => match event {
                SwarmEvent::NewListenAddr { address, .. } => {
                    info!(%address, "listening");
                    let _ = listen_tx.send(Some(address));
                }
                SwarmEvent::ConnectionEstablished { peer_id, .. } => {
                    directory.mark_connected(peer_id);
                    debug!(peer = %peer_id, "connection established");
                }
                SwarmEvent::ConnectionClosed { peer_id, num_established, .. } => {
                    if num_established == 0 {
                        directory.mark_disconnected(&peer_id);
                        debug!(peer = %peer_id, "connection closed");
                    }
                }
                SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
                    warn!(?peer_id, %error, "could not connect to peer");
                }
                _ => {}
            },
        }
    }
}

/// Accepts inbound sessions and spawns a handler per stream so one slow
/// peer cannot stall the others.
async fn accept_inbound(
    mut incoming: IncomingStreams,
    service: P2pService,
    inbound_tx: mpsc::Sender<Envelope>,
) {
    loop {
        tokio::select! {
            _ = service.cancel.cancelled() => {
                info!("inbound acceptor stopping");
                return;
            }
            next = incoming.next() => {
                let Some((peer, stream)) = next else { return };
                let service = service.clone();
                let inbound_tx = inbound_tx.clone();
                tokio::spawn(handle_session(peer, stream, service, inbound_tx));
            }
        }
    }
}

/// Decodes exactly one framed message from an accepted session and routes
/// it, then lets the session close. Undecodable sessions are dropped
/// without a response.
async fn handle_session(
    peer: PeerId,
    stream: libp2p::Stream,
    service: P2pService,
    inbound_tx: mpsc::Sender<Envelope>,
) {
    let mut framed = Framed::new(stream.compat(), MessageCodec::new());
    let msg = match framed.next().await {
        Some(Ok(msg)) => msg,
        Some(Err(err)) => {
            debug!(%peer, %err, "dropping undecodable session");
            return;
        }
        None => {
            debug!(%peer, "session closed before a message arrived");
            return;
        }
    };

    debug!(%peer, tag = msg.tag(), "message received");
    match msg {
        ProtocolMessage::Hello { ref peers, .. } => {
            service.merge_peers(peer, peers).await;
        }
        msg => {
            if inbound_tx.send(Envelope { from: peer, msg }).await.is_err() {
                debug!("runtime inbound queue closed, dropping message");
            }
        }
    }
}

/// Drains the outbound queue. Broadcasts fan out through the directory;
/// direct sends get their own task so the dispatcher never blocks on I/O.
async fn dispatch_outbound(mut outbound_rx: mpsc::Receiver<Outbound>, service: P2pService) {
    loop {
        tokio::select! {
            _ = service.cancel.cancelled() => {
                info!("outbound dispatcher stopping");
                return;
            }
            item = outbound_rx.recv() => {
                let Some(item) = item else { return };
                match item {
                    Outbound::Broadcast(msg) => service.broadcast(msg).await,
                    Outbound::Direct { to, msg } => {
                        let service = service.clone();
                        tokio::spawn(async move {
                            service.send_to(to, msg).await;
                        });
                    }
                }
            }
        }
    }
}
