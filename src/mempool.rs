//! Mempool: admitted-but-not-yet-finalized transactions
//!
//! Transactions are kept in arrival order and keyed by content-derived id
//! for O(1) duplicate checks. Admission runs a full signature check and an
//! advisory balance check; finalization re-checks balances against live
//! state, because concurrent admissions can race the soft check.
//!
//! Finalized transactions move to the "ready" batch, which is what the miner
//! assembles into a block candidate. The batch survives mining preemption so
//! it can be re-assembled against a fresh tip.

use crate::error::{ChainError, Result};
use crate::ledger::state::Balances;
use crate::transaction::{Address, SignedTransaction, TxId};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxStatus {
    /// Admitted, waiting in the pending queue.
    Pending,
    /// Balance effects applied; either in the ready batch or on-chain.
    Finalized,
}

#[derive(Debug, Default)]
pub struct Mempool {
    pending: Vec<SignedTransaction>,
    ready: Vec<SignedTransaction>,
    /// Every id this node has ever admitted or seen finalized. Grows without
    /// bound; eviction is an explicit non-goal.
    statuses: HashMap<TxId, TxStatus>,
    /// (sender, nonce) pairs that have finalized. No pair may finalize
    /// twice.
    finalized_nonces: HashSet<(Address, u64)>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a signed transaction: verify its signature, reject duplicates
    /// by id and by finalized (sender, nonce) pair, soft-check the sender
    /// balance, then append to the pending queue in arrival order.
    ///
    /// The balance check here is advisory only and is re-validated at
    /// finalization time.
    pub fn admit(&mut self, signed: SignedTransaction, balances: &Balances) -> Result<TxId> {
        signed.verify()?;

        let id = signed.id();
        if self.statuses.contains_key(&id) {
            return Err(ChainError::DuplicateTransaction(hex::encode(id)));
        }
        let pair = (signed.transaction.sender.clone(), signed.transaction.nonce);
        if self.finalized_nonces.contains(&pair) {
            return Err(ChainError::DuplicateTransaction(hex::encode(id)));
        }

        let balance = balances.get_or_default(&signed.transaction.sender);
        if balance < signed.transaction.amount {
            return Err(ChainError::InsufficientBalance {
                sender: signed.transaction.sender.clone(),
                balance,
                amount: signed.transaction.amount,
            });
        }

        self.statuses.insert(id, TxStatus::Pending);
        self.pending.push(signed);
        Ok(id)
    }

    /// Finalize up to `batch_size` pending transactions in arrival order:
    /// re-check the sender balance against live state, debit and credit, and
    /// move the transaction to the ready batch.
    ///
    /// The pending queue is snapshotted before any removal; eligibility is
    /// decided over the snapshot and survivors are written back, so no entry
    /// is skipped or double-processed. Returns the number finalized.
    pub fn finalize_ready(&mut self, batch_size: usize, balances: &mut Balances) -> usize {
        let snapshot = std::mem::take(&mut self.pending);
        let mut kept = Vec::new();
        let mut moved = 0;

        for signed in snapshot {
            if moved >= batch_size {
                kept.push(signed);
                continue;
            }

            let pair = (signed.transaction.sender.clone(), signed.transaction.nonce);
            if self.finalized_nonces.contains(&pair) {
                // A transaction with this (sender, nonce) already finalized,
                // so this one never can; drop it from the queue.
                warn!(tx = %signed.transaction.id_hex(), "dropping pending transaction with reused nonce");
                continue;
            }

            match balances.apply_transfer(&signed.transaction) {
                Ok(()) => {
                    self.statuses.insert(signed.id(), TxStatus::Finalized);
                    self.finalized_nonces.insert(pair);
                    self.ready.push(signed);
                    moved += 1;
                }
                Err(e) => {
                    // The soft check at admission has gone stale; keep the
                    // transaction pending for a later tick.
                    debug!(tx = %signed.transaction.id_hex(), error = %e, "not yet finalizable");
                    kept.push(signed);
                }
            }
        }

        self.pending = kept;
        moved
    }

    /// The finalized batch awaiting inclusion in a mined block.
    pub fn ready(&self) -> &[SignedTransaction] {
        &self.ready
    }

    /// Put the ready batch back at the front of the pending queue, undoing
    /// its finalized status. Used when a reorg replays balances from the
    /// chain and the batch must re-qualify against the new state.
    pub fn requeue_ready(&mut self) {
        let mut requeued = std::mem::take(&mut self.ready);
        for signed in &requeued {
            self.statuses.insert(signed.id(), TxStatus::Pending);
            self.finalized_nonces
                .remove(&(signed.transaction.sender.clone(), signed.transaction.nonce));
        }
        // Ready transactions arrived before anything currently pending.
        requeued.append(&mut self.pending);
        self.pending = requeued;
    }

    /// Record that a transaction reached the chain. Removes it from the
    /// pending queue and the ready batch, and marks its id and (sender,
    /// nonce) pair finalized. Returns true if its balance effects had
    /// already been applied locally (it was in the ready batch or an
    /// earlier block), so the caller knows not to apply them twice.
    pub fn note_finalized(&mut self, signed: &SignedTransaction) -> bool {
        let id = signed.id();
        let previous = self.statuses.insert(id, TxStatus::Finalized);
        self.finalized_nonces
            .insert((signed.transaction.sender.clone(), signed.transaction.nonce));
        self.pending.retain(|tx| tx.id() != id);
        self.ready.retain(|tx| tx.id() != id);
        previous == Some(TxStatus::Finalized)
    }

    /// Whether this id has ever been admitted or finalized here.
    pub fn is_known(&self, id: &TxId) -> bool {
        self.statuses.contains_key(id)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn ready_len(&self) -> usize {
        self.ready.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::transaction::Transaction;

    fn signed(keypair: &KeyPair, sender: &str, receiver: &str, amount: u64, nonce: u64) -> SignedTransaction {
        let tx = Transaction::with_timestamp(
            sender.into(),
            receiver.into(),
            amount,
            nonce,
            1_700_000_000 + nonce,
        );
        SignedTransaction::sign(tx, keypair).unwrap()
    }

    #[test]
    fn test_admit_appends_in_arrival_order() {
        let keypair = KeyPair::generate().unwrap();
        let mut mempool = Mempool::new();
        let balances = Balances::new();

        mempool.admit(signed(&keypair, "alice", "bob", 10, 1), &balances).unwrap();
        mempool.admit(signed(&keypair, "alice", "carol", 10, 2), &balances).unwrap();

        assert_eq!(mempool.pending_len(), 2);
        assert_eq!(mempool.pending[0].transaction.receiver, "bob");
        assert_eq!(mempool.pending[1].transaction.receiver, "carol");
    }

    #[test]
    fn test_duplicate_admission_is_rejected_and_state_unchanged() {
        let keypair = KeyPair::generate().unwrap();
        let mut mempool = Mempool::new();
        let balances = Balances::new();

        let tx = signed(&keypair, "alice", "bob", 10, 1);
        mempool.admit(tx.clone(), &balances).unwrap();
        let result = mempool.admit(tx, &balances);

        assert!(matches!(result, Err(ChainError::DuplicateTransaction(_))));
        assert_eq!(mempool.pending_len(), 1);
    }

    #[test]
    fn test_invalid_signature_is_rejected() {
        let keypair = KeyPair::generate().unwrap();
        let mut mempool = Mempool::new();
        let balances = Balances::new();

        let mut forged = signed(&keypair, "alice", "bob", 10, 1);
        forged.transaction.amount = 999;

        assert!(matches!(
            mempool.admit(forged, &balances),
            Err(ChainError::InvalidSignature)
        ));
        assert_eq!(mempool.pending_len(), 0);
    }

    #[test]
    fn test_soft_balance_check_rejects_overdraft() {
        let keypair = KeyPair::generate().unwrap();
        let mut mempool = Mempool::new();
        let balances = Balances::new();

        let result = mempool.admit(signed(&keypair, "alice", "bob", 1001, 1), &balances);
        assert!(matches!(
            result,
            Err(ChainError::InsufficientBalance { .. })
        ));
    }

    #[test]
    fn test_finalize_moves_batch_and_applies_balances() {
        let keypair = KeyPair::generate().unwrap();
        let mut mempool = Mempool::new();
        let mut balances = Balances::new();

        for nonce in 1..=3 {
            mempool
                .admit(signed(&keypair, "alice", "bob", 10, nonce), &balances)
                .unwrap();
        }

        let moved = mempool.finalize_ready(3, &mut balances);
        assert_eq!(moved, 3);
        assert_eq!(mempool.pending_len(), 0);
        assert_eq!(mempool.ready_len(), 3);
        assert_eq!(balances.get_or_default("alice"), 970);
        assert_eq!(balances.get_or_default("bob"), 30);
    }

    #[test]
    fn test_finalize_respects_batch_size() {
        let keypair = KeyPair::generate().unwrap();
        let mut mempool = Mempool::new();
        let mut balances = Balances::new();

        for nonce in 1..=5 {
            mempool
                .admit(signed(&keypair, "alice", "bob", 10, nonce), &balances)
                .unwrap();
        }

        assert_eq!(mempool.finalize_ready(3, &mut balances), 3);
        assert_eq!(mempool.pending_len(), 2);
        // Remaining transactions kept their arrival order.
        assert_eq!(mempool.pending[0].transaction.nonce, 4);
        assert_eq!(mempool.pending[1].transaction.nonce, 5);
    }

    #[test]
    fn test_finalize_recheck_catches_stale_soft_check() {
        let keypair = KeyPair::generate().unwrap();
        let mut mempool = Mempool::new();
        let mut balances = Balances::new();

        // Both pass the advisory check against the same balance of 1000.
        mempool.admit(signed(&keypair, "alice", "bob", 600, 1), &balances).unwrap();
        mempool.admit(signed(&keypair, "alice", "carol", 600, 2), &balances).unwrap();

        let moved = mempool.finalize_ready(2, &mut balances);
        assert_eq!(moved, 1);
        assert_eq!(balances.get_or_default("alice"), 400);
        // The second stays pending; it may become eligible later.
        assert_eq!(mempool.pending_len(), 1);
        assert_eq!(mempool.pending[0].transaction.receiver, "carol");
    }

    #[test]
    fn test_requeue_ready_restores_pending_order() {
        let keypair = KeyPair::generate().unwrap();
        let mut mempool = Mempool::new();
        let mut balances = Balances::new();

        mempool.admit(signed(&keypair, "alice", "bob", 10, 1), &balances).unwrap();
        mempool.admit(signed(&keypair, "alice", "carol", 10, 2), &balances).unwrap();
        mempool.finalize_ready(1, &mut balances);
        assert_eq!(mempool.ready_len(), 1);

        mempool.requeue_ready();
        assert_eq!(mempool.ready_len(), 0);
        assert_eq!(mempool.pending_len(), 2);
        assert_eq!(mempool.pending[0].transaction.nonce, 1);
        assert_eq!(mempool.pending[1].transaction.nonce, 2);

        // Requeued transactions may finalize again.
        let mut fresh = Balances::new();
        assert_eq!(mempool.finalize_ready(2, &mut fresh), 2);
    }

    #[test]
    fn test_note_finalized_reports_prior_local_finalization() {
        let keypair = KeyPair::generate().unwrap();
        let mut mempool = Mempool::new();
        let mut balances = Balances::new();

        let mined_locally = signed(&keypair, "alice", "bob", 10, 1);
        let from_peer = signed(&keypair, "dave", "erin", 10, 1);
        mempool.admit(mined_locally.clone(), &balances).unwrap();
        mempool.finalize_ready(1, &mut balances);

        // Locally finalized: effects already applied.
        assert!(mempool.note_finalized(&mined_locally));
        assert_eq!(mempool.ready_len(), 0);

        // Never seen before: effects still owed.
        assert!(!mempool.note_finalized(&from_peer));
        assert!(mempool.is_known(&from_peer.id()));
    }

    #[test]
    fn test_finalized_nonce_pair_cannot_finalize_twice() {
        let keypair = KeyPair::generate().unwrap();
        let mut mempool = Mempool::new();
        let mut balances = Balances::new();

        mempool.admit(signed(&keypair, "alice", "bob", 10, 7), &balances).unwrap();
        mempool.finalize_ready(1, &mut balances);

        // Same (sender, nonce) with a different timestamp has a fresh id but
        // must still be refused.
        let replay = {
            let tx = Transaction::with_timestamp("alice".into(), "bob".into(), 10, 7, 1_900_000_000);
            SignedTransaction::sign(tx, &keypair).unwrap()
        };
        assert!(matches!(
            mempool.admit(replay, &balances),
            Err(ChainError::DuplicateTransaction(_))
        ));
    }
}
