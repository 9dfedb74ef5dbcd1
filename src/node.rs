//! Node orchestrator
//!
//! One event loop owns the Ledger, Mempool, Balances, and the gossip
//! deduper; every mutation — transaction admission, the finalization tick,
//! incoming blocks, mining results — runs to completion inside it, so no
//! two operations ever interleave mid-way. The transport forwards protocol
//! messages into the loop over a channel and never touches state itself.
//!
//! The proof-of-work search is the one long-running CPU-bound job: it runs
//! on a blocking task with a cancellation token and reports back through a
//! channel, so the loop stays responsive to competing blocks while mining.

use crate::codec;
use crate::config::Config;
use crate::error::{ChainError, Result};
use crate::gossip::GossipDeduper;
use crate::ledger::chain::{ApplyOutcome, Block, Ledger};
use crate::ledger::state::Balances;
use crate::mempool::Mempool;
use crate::miner::{self, CancelToken, MineOutcome};
use crate::network::{BlockMessage, InboundMessage, Network, NetworkMessage, PeerAddr, PeerDirectory};
use crate::persistence::BlockSink;
use crate::transaction::SignedTransaction;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// An in-flight nonce search and the tip it extends.
struct MiningJob {
    id: u64,
    token: CancelToken,
    prev_hash: [u8; 32],
}

pub struct Node {
    config: Config,
    network: Arc<Network>,
    sink: Box<dyn BlockSink>,
    ledger: Ledger,
    mempool: Mempool,
    balances: Balances,
    deduper: GossipDeduper,
    mining: Option<MiningJob>,
    next_job_id: u64,
    mine_tx: mpsc::Sender<(u64, MineOutcome)>,
    mine_rx: Option<mpsc::Receiver<(u64, MineOutcome)>>,
}

impl Node {
    /// Build a node around a freshly derived genesis chain. The genesis
    /// block is recorded in the sink like any other accepted block.
    pub fn new(config: Config, sink: Box<dyn BlockSink>) -> Result<Self> {
        let ledger = Ledger::new(config.chain.difficulty);
        sink.append(ledger.genesis())?;
        info!(
            genesis = %ledger.genesis().hash_hex(),
            difficulty = config.chain.difficulty,
            "ledger initialized"
        );

        let (mine_tx, mine_rx) = mpsc::channel(4);
        Ok(Node {
            config,
            network: Arc::new(Network::new()),
            sink,
            ledger,
            mempool: Mempool::new(),
            balances: Balances::new(),
            deduper: GossipDeduper::new(),
            mining: None,
            next_job_id: 0,
            mine_tx,
            mine_rx: Some(mine_rx),
        })
    }

    /// Run the node: start the listener, dial bootstrap peers, then loop
    /// over inbound messages, the finalization tick, and mining results.
    pub async fn run(mut self) -> Result<()> {
        let (inbound_tx, mut inbound_rx) = mpsc::channel::<InboundMessage>(256);
        let mut mine_rx = self.mine_rx.take().ok_or_else(|| {
            ChainError::Config("Node::run may only be called once".to_string())
        })?;

        let listener = self.network.clone();
        let port = self.config.network.p2p_port;
        tokio::spawn(async move {
            if let Err(e) = listener.start_listener(port, inbound_tx).await {
                error!(error = %e, "listener failed");
            }
        });

        for peer in &self.config.network.bootstrap_peers {
            match PeerAddr::parse(peer) {
                Ok(peer) => {
                    let network = self.network.clone();
                    tokio::spawn(async move {
                        if let Err(e) = network.connect_peer(peer.clone()).await {
                            warn!(peer = %peer.addr(), error = %e, "bootstrap dial failed");
                        }
                    });
                }
                Err(e) => warn!(peer = %peer, error = %e, "skipping malformed bootstrap peer"),
            }
        }

        let mut finalize_tick =
            tokio::time::interval(Duration::from_millis(self.config.chain.finalize_interval_ms));
        let mut status_tick = tokio::time::interval(Duration::from_secs(10));

        info!(
            network_id = %self.config.network.network_id,
            height = self.ledger.len(),
            "node started"
        );

        loop {
            tokio::select! {
                Some((peer, message)) = inbound_rx.recv() => {
                    self.handle_message(peer, message).await;
                }
                Some((job_id, outcome)) = mine_rx.recv() => {
                    self.handle_mine_outcome(job_id, outcome).await;
                }
                _ = finalize_tick.tick() => {
                    if self.config.miner.enabled {
                        self.finalize_and_mine();
                    }
                }
                _ = status_tick.tick() => {
                    info!(
                        height = self.ledger.len(),
                        pending = self.mempool.pending_len(),
                        ready = self.mempool.ready_len(),
                        peers = self.network.peers().len(),
                        "node running"
                    );
                }
            }
        }
    }

    async fn handle_message(&mut self, peer: SocketAddr, message: NetworkMessage) {
        match message {
            NetworkMessage::NewTransaction(signed) => self.handle_transaction(signed).await,
            NetworkMessage::NewBlock(message) => self.handle_block(message.into_block()).await,
            other => debug!(%peer, ?other, "ignoring non-protocol message"),
        }
    }

    /// Admission path: dedup for gossip, admit to the mempool, and forward
    /// to peers exactly once on success.
    async fn handle_transaction(&mut self, signed: SignedTransaction) {
        let id = signed.id();
        if !self.deduper.check_and_mark(id) {
            debug!(tx = %hex::encode(id), "transaction already seen");
            return;
        }

        match self.mempool.admit(signed.clone(), &self.balances) {
            Ok(id) => {
                info!(
                    tx = %hex::encode(id),
                    sender = %signed.transaction.sender,
                    pending = self.mempool.pending_len(),
                    "transaction admitted"
                );
                let delivered = self
                    .network
                    .broadcast(&NetworkMessage::NewTransaction(signed))
                    .await;
                debug!(delivered, "transaction forwarded to peers");
            }
            Err(e @ ChainError::DuplicateTransaction(_)) => {
                debug!(error = %e, "transaction dropped")
            }
            Err(e) => warn!(error = %e, "transaction rejected"),
        }
    }

    /// Block path: validate and apply, then reconcile mempool, balances,
    /// the mining job and the sink with whatever the ledger decided.
    async fn handle_block(&mut self, block: Block) {
        if !self.deduper.check_and_mark(block.hash) {
            debug!(hash = %block.hash_hex(), "block already seen");
            return;
        }

        match self.ledger.apply(block.clone()) {
            Ok(ApplyOutcome::Extended) => {
                self.absorb_block(&block);
                self.cancel_stale_mining();
                self.record_block(&block);
                info!(
                    height = self.ledger.len(),
                    hash = %block.hash_hex(),
                    "chain extended by peer block"
                );
                self.network
                    .broadcast(&NetworkMessage::NewBlock(BlockMessage::from(&block)))
                    .await;
            }
            Ok(ApplyOutcome::Reorganized { fork_height }) => {
                self.reconcile_after_reorg();
                self.cancel_stale_mining();
                self.record_block(&block);
                info!(
                    fork_height,
                    height = self.ledger.len(),
                    tip = %self.ledger.tip().hash_hex(),
                    "fork resolution adopted a new chain"
                );
                self.network
                    .broadcast(&NetworkMessage::NewBlock(BlockMessage::from(&block)))
                    .await;
            }
            Ok(ApplyOutcome::Shelved) => {
                debug!(hash = %block.hash_hex(), "block shelved on a side branch");
            }
            Err(e) => warn!(hash = %block.hash_hex(), error = %e, "block rejected"),
        }
    }

    /// Periodic tick: move eligible pending transactions into the ready
    /// batch and, if there is anything to mine and no search in flight,
    /// assemble a candidate against the current tip and start searching.
    fn finalize_and_mine(&mut self) {
        if self.mining.is_some() {
            return;
        }

        if self.mempool.ready_len() == 0 {
            let moved = self
                .mempool
                .finalize_ready(self.config.chain.block_size, &mut self.balances);
            if moved > 0 {
                debug!(moved, "finalized pending transactions");
            }
        }
        if self.mempool.ready_len() == 0 {
            return;
        }

        let batch = self.mempool.ready().to_vec();
        let candidate = miner::assemble(
            &batch,
            self.ledger.tip().hash,
            self.ledger.difficulty(),
            chrono::Utc::now().timestamp() as u64,
        );

        let token = CancelToken::new();
        self.next_job_id += 1;
        let job_id = self.next_job_id;
        self.mining = Some(MiningJob {
            id: job_id,
            token: token.clone(),
            prev_hash: candidate.prev_hash,
        });

        info!(
            batch = batch.len(),
            prev = %hex::encode(candidate.prev_hash),
            "mining candidate block"
        );
        let mine_tx = self.mine_tx.clone();
        tokio::task::spawn_blocking(move || {
            let outcome = miner::search(candidate, &token);
            let _ = mine_tx.blocking_send((job_id, outcome));
        });
    }

    async fn handle_mine_outcome(&mut self, job_id: u64, outcome: MineOutcome) {
        if self.mining.as_ref().map(|job| job.id) == Some(job_id) {
            self.mining = None;
        }

        match outcome {
            MineOutcome::Cancelled => {
                debug!(job_id, "mining preempted; batch stays ready for re-assembly");
            }
            MineOutcome::Mined(block) => {
                // Cancellation may race completion: a result built against a
                // replaced tip is discarded here, and the ready batch gets
                // re-assembled against the new tip on the next tick.
                if block.prev_hash != self.ledger.tip().hash {
                    info!(reason = %ChainError::StaleMiningTarget, "discarding mined block");
                    return;
                }

                match self.ledger.apply(block.clone()) {
                    Ok(ApplyOutcome::Extended) => {
                        self.deduper.mark(block.hash);
                        self.absorb_block(&block);
                        self.record_block(&block);
                        info!(
                            height = self.ledger.len(),
                            hash = %block.hash_hex(),
                            "mined block appended"
                        );
                        let delivered = self
                            .network
                            .broadcast(&NetworkMessage::NewBlock(BlockMessage::from(&block)))
                            .await;
                        debug!(delivered, "mined block broadcast");
                    }
                    Ok(outcome) => {
                        debug!(?outcome, "mined block did not extend the tip");
                    }
                    Err(e) => warn!(error = %e, "locally mined block rejected"),
                }
            }
        }
    }

    /// Settle a block's transactions: remove them from the local queues and
    /// apply balance effects for any that were not already finalized here.
    fn absorb_block(&mut self, block: &Block) {
        let batch = match codec::decode_batch(&block.tx_payload) {
            Ok(batch) => batch,
            Err(e) => {
                // apply() validated the payload, so this cannot happen for
                // blocks that reached us through it.
                warn!(hash = %block.hash_hex(), error = %e, "accepted block payload undecodable");
                return;
            }
        };
        for signed in &batch {
            let already_applied = self.mempool.note_finalized(signed);
            if !already_applied {
                if let Err(e) = self.balances.apply_transfer(&signed.transaction) {
                    warn!(
                        tx = %signed.transaction.id_hex(),
                        error = %e,
                        "finalized transaction skipped by balance rule"
                    );
                }
            }
        }
    }

    /// After adopting a competing chain: put the ready batch back in the
    /// pending queue, rebuild balances by replaying the adopted chain, and
    /// purge everything the new chain finalized from the mempool.
    fn reconcile_after_reorg(&mut self) {
        self.mempool.requeue_ready();
        self.balances = Balances::replay(self.ledger.chain());

        let chain_batches: Vec<Vec<SignedTransaction>> = self
            .ledger
            .chain()
            .iter()
            .skip(1)
            .filter_map(|block| codec::decode_batch(&block.tx_payload).ok())
            .collect();
        for batch in &chain_batches {
            for signed in batch {
                self.mempool.note_finalized(signed);
            }
        }
    }

    /// Cancel an in-flight search whose target tip is no longer the tip.
    fn cancel_stale_mining(&mut self) {
        if let Some(job) = &self.mining {
            if job.prev_hash != self.ledger.tip().hash {
                info!(job_id = job.id, "cancelling mining against a stale tip");
                job.token.cancel();
                self.mining = None;
            }
        }
    }

    fn record_block(&self, block: &Block) {
        if let Err(e) = self.sink.append(block) {
            warn!(hash = %block.hash_hex(), error = %e, "failed to persist block");
        }
    }
}
