//! P2P networking for Meridian
//!
//! Transport is deliberately simple: one length-prefixed bincode frame per
//! TCP connection. The listener never touches ledger state; protocol
//! messages that need it (`NewTransaction`, `NewBlock`) are forwarded into
//! the node's event loop through a channel, which is what serializes all
//! state mutations. Directory messages (`Ping`, `GetPeers`) are answered on
//! the socket directly.

use crate::error::ChainError;
use crate::ledger::chain::Block;
use crate::transaction::SignedTransaction;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Maximum frame size to prevent memory-exhaustion from a hostile peer (4MB)
const MAX_FRAME_SIZE: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct PeerAddr {
    pub host: String,
    pub port: u16,
}

impl PeerAddr {
    pub fn new(host: String, port: u16) -> Self {
        PeerAddr { host, port }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Parse a `host:port` string.
    pub fn parse(s: &str) -> Result<Self, ChainError> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| ChainError::Network(format!("Invalid peer address: {}", s)))?;
        let port = port
            .parse::<u16>()
            .map_err(|e| ChainError::Network(format!("Invalid peer port in {}: {}", s, e)))?;
        Ok(PeerAddr::new(host.to_string(), port))
    }
}

/// Capability interface over the peer set. The node composes against this
/// rather than owning transport details.
pub trait PeerDirectory: Send + Sync {
    fn peers(&self) -> Vec<PeerAddr>;
    /// Returns false if the peer was already known.
    fn add_peer(&self, peer: PeerAddr) -> bool;
}

/// Wire shape of a block. Field-for-field what `Ledger` consumes; kept as a
/// distinct type so the wire format never drifts silently when the internal
/// block changes.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BlockMessage {
    pub timestamp: u64,
    pub difficulty: u32,
    pub nonce: u64,
    pub prev_hash: [u8; 32],
    pub merkle_root: [u8; 32],
    #[serde(with = "serde_bytes")]
    pub tx_payload: Vec<u8>,
    pub block_hash: [u8; 32],
}

impl From<&Block> for BlockMessage {
    fn from(block: &Block) -> Self {
        BlockMessage {
            timestamp: block.timestamp,
            difficulty: block.difficulty,
            nonce: block.nonce,
            prev_hash: block.prev_hash,
            merkle_root: block.merkle_root,
            tx_payload: block.tx_payload.clone(),
            block_hash: block.hash,
        }
    }
}

impl BlockMessage {
    pub fn into_block(self) -> Block {
        Block {
            timestamp: self.timestamp,
            difficulty: self.difficulty,
            nonce: self.nonce,
            prev_hash: self.prev_hash,
            merkle_root: self.merkle_root,
            tx_payload: self.tx_payload,
            hash: self.block_hash,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum NetworkMessage {
    NewTransaction(SignedTransaction),
    NewBlock(BlockMessage),
    GetPeers,
    Peers(Vec<PeerAddr>),
    Ping,
    Pong,
}

/// A protocol message handed to the node's event loop, tagged with the
/// socket it arrived on.
pub type InboundMessage = (SocketAddr, NetworkMessage);

pub struct Network {
    peers: RwLock<Vec<PeerAddr>>,
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerDirectory for Network {
    fn peers(&self) -> Vec<PeerAddr> {
        self.peers.read().expect("peer directory lock").clone()
    }

    fn add_peer(&self, peer: PeerAddr) -> bool {
        let mut peers = self.peers.write().expect("peer directory lock");
        if peers.iter().any(|p| p.addr() == peer.addr()) {
            return false;
        }
        info!(peer = %peer.addr(), "discovered new peer");
        peers.push(peer);
        true
    }
}

impl Network {
    pub fn new() -> Self {
        Network {
            peers: RwLock::new(Vec::new()),
        }
    }

    /// Bind the listener and forward ledger-relevant messages into
    /// `inbound`. Runs until the process exits.
    pub async fn start_listener(
        self: Arc<Self>,
        port: u16,
        inbound: mpsc::Sender<InboundMessage>,
    ) -> Result<(), ChainError> {
        let addr = format!("0.0.0.0:{}", port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ChainError::Network(format!("Failed to bind {}: {}", addr, e)))?;
        info!(%addr, "node listening");

        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    let network = self.clone();
                    let inbound = inbound.clone();
                    tokio::spawn(async move {
                        if let Err(e) = network.handle_connection(socket, peer_addr, inbound).await
                        {
                            debug!(peer = %peer_addr, error = %e, "connection error");
                        }
                    });
                }
                Err(e) => {
                    warn!(error = %e, "accept error");
                }
            }
        }
    }

    async fn handle_connection(
        &self,
        mut socket: TcpStream,
        peer_addr: SocketAddr,
        inbound: mpsc::Sender<InboundMessage>,
    ) -> Result<(), ChainError> {
        let message = read_frame(&mut socket).await?;
        match message {
            NetworkMessage::Ping => {
                write_frame(&mut socket, &NetworkMessage::Pong).await?;
            }
            NetworkMessage::GetPeers => {
                let peers = self.peers();
                write_frame(&mut socket, &NetworkMessage::Peers(peers)).await?;
            }
            NetworkMessage::Peers(list) => {
                for peer in list {
                    self.add_peer(peer);
                }
            }
            message @ (NetworkMessage::NewTransaction(_) | NetworkMessage::NewBlock(_)) => {
                inbound
                    .send((peer_addr, message))
                    .await
                    .map_err(|_| ChainError::Network("node event loop is gone".to_string()))?;
            }
            NetworkMessage::Pong => {}
        }
        Ok(())
    }

    /// Send a single message to a single peer.
    pub async fn send(&self, peer: &PeerAddr, message: &NetworkMessage) -> Result<(), ChainError> {
        send_to(peer, message).await
    }

    /// Best-effort fan-out to every known peer. Returns the number of peers
    /// the message reached.
    pub async fn broadcast(&self, message: &NetworkMessage) -> usize {
        let peers = self.peers();
        let mut delivered = 0;
        for peer in &peers {
            match send_to(peer, message).await {
                Ok(()) => delivered += 1,
                Err(e) => debug!(peer = %peer.addr(), error = %e, "broadcast delivery failed"),
            }
        }
        delivered
    }

    /// Register a peer and pull its peer list to seed the directory.
    pub async fn connect_peer(&self, peer: PeerAddr) -> Result<(), ChainError> {
        self.add_peer(peer.clone());

        let mut stream = TcpStream::connect(peer.addr())
            .await
            .map_err(|e| ChainError::Network(format!("Failed to connect {}: {}", peer.addr(), e)))?;
        write_frame(&mut stream, &NetworkMessage::GetPeers).await?;

        if let NetworkMessage::Peers(list) = read_frame(&mut stream).await? {
            for discovered in list {
                self.add_peer(discovered);
            }
        }
        Ok(())
    }
}

/// One-shot send used by the node and the CLI sender alike.
pub async fn send_to(peer: &PeerAddr, message: &NetworkMessage) -> Result<(), ChainError> {
    let mut stream = TcpStream::connect(peer.addr())
        .await
        .map_err(|e| ChainError::Network(format!("Failed to connect {}: {}", peer.addr(), e)))?;
    write_frame(&mut stream, message).await
}

async fn write_frame(stream: &mut TcpStream, message: &NetworkMessage) -> Result<(), ChainError> {
    let data = bincode::serialize(message)
        .map_err(|e| ChainError::Network(format!("Serialization failed: {}", e)))?;
    let len = data.len() as u32;
    stream
        .write_all(&len.to_be_bytes())
        .await
        .map_err(|e| ChainError::Network(format!("Write failed: {}", e)))?;
    stream
        .write_all(&data)
        .await
        .map_err(|e| ChainError::Network(format!("Write failed: {}", e)))?;
    Ok(())
}

async fn read_frame(stream: &mut TcpStream) -> Result<NetworkMessage, ChainError> {
    let mut len_bytes = [0u8; 4];
    stream
        .read_exact(&mut len_bytes)
        .await
        .map_err(|e| ChainError::Network(format!("Read failed: {}", e)))?;
    let len = u32::from_be_bytes(len_bytes) as usize;

    if len > MAX_FRAME_SIZE {
        return Err(ChainError::Network(format!(
            "Frame too large: {} bytes (max: {})",
            len, MAX_FRAME_SIZE
        )));
    }

    let mut buffer = vec![0u8; len];
    stream
        .read_exact(&mut buffer)
        .await
        .map_err(|e| ChainError::Network(format!("Read failed: {}", e)))?;

    bincode::deserialize(&buffer)
        .map_err(|e| ChainError::Network(format!("Deserialization failed: {}", e)))
}
