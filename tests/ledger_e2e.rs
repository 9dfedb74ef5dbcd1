//! End-to-end flow: admission, finalization, mining, and block application
//! over a single node's ledger state.

use meridian::codec;
use meridian::crypto::KeyPair;
use meridian::ledger::chain::{ApplyOutcome, Ledger};
use meridian::ledger::state::Balances;
use meridian::ledger::validation;
use meridian::mempool::Mempool;
use meridian::merkle::MerkleTree;
use meridian::miner;
use meridian::transaction::{SignedTransaction, Transaction};

const DIFFICULTY: u32 = 2;
const BLOCK_SIZE: usize = 3;

fn transfer(
    keypair: &KeyPair,
    sender: &str,
    receiver: &str,
    amount: u64,
    nonce: u64,
) -> SignedTransaction {
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
fn test_three_transfers_through_one_block() -> Result<(), Box<dyn std::error::Error>> {
    let keypair = KeyPair::generate()?;
    let mut ledger = Ledger::new(DIFFICULTY);
    let mut mempool = Mempool::new();
    let mut balances = Balances::new();

    // Sender A, starting from the default spending capacity of 1000, pays
    // 10 each to B, C and D.
    for (nonce, receiver) in [(1, "B"), (2, "C"), (3, "D")] {
        mempool.admit(transfer(&keypair, "A", receiver, 10, nonce), &balances)?;
    }
    assert_eq!(mempool.pending_len(), 3);

    // One finalization tick drains the whole batch.
    let moved = mempool.finalize_ready(BLOCK_SIZE, &mut balances);
    assert_eq!(moved, 3);
    assert_eq!(balances.get_or_default("A"), 970);
    assert_eq!(balances.get_or_default("B"), 10);
    assert_eq!(balances.get_or_default("C"), 10);
    assert_eq!(balances.get_or_default("D"), 10);

    // Mine the ready batch against the genesis tip.
    let batch = mempool.ready().to_vec();
    let candidate = miner::assemble(&batch, ledger.tip().hash, DIFFICULTY, 1_700_000_500);
    let block = miner::mine(candidate);

    // The mined block commits to the batch: its Merkle root matches a tree
    // built over the canonical transaction encodings, in order.
    let mut tree = MerkleTree::new();
    for signed in &batch {
        tree.add_leaf(&codec::encode_tx(&signed.transaction), false);
    }
    assert_eq!(block.merkle_root, tree.root().unwrap());

    // Proof of work and linkage hold.
    assert!(validation::leading_zero_nibbles(&block.hash) >= DIFFICULTY);
    assert_eq!(block.prev_hash, ledger.genesis().hash);

    // The ledger accepts it as a plain extension.
    assert_eq!(ledger.apply(block.clone())?, ApplyOutcome::Extended);
    assert_eq!(ledger.len(), 2);
    assert_eq!(ledger.tip().hash, block.hash);

    // Replaying the chain reproduces the same balances the finalization
    // tick computed.
    let replayed = Balances::replay(ledger.chain());
    assert_eq!(replayed.get_or_default("A"), 970);
    assert_eq!(replayed.get_or_default("B"), 10);
    assert_eq!(replayed.get_or_default("C"), 10);
    assert_eq!(replayed.get_or_default("D"), 10);

    Ok(())
}

#[test]
fn test_duplicate_submission_is_idempotent() -> Result<(), Box<dyn std::error::Error>> {
    let keypair = KeyPair::generate()?;
    let mut mempool = Mempool::new();
    let mut balances = Balances::new();

    let signed = transfer(&keypair, "A", "B", 10, 1);
    mempool.admit(signed.clone(), &balances)?;
    assert!(mempool.admit(signed.clone(), &balances).is_err());
    assert_eq!(mempool.pending_len(), 1);

    mempool.finalize_ready(BLOCK_SIZE, &mut balances);
    assert_eq!(balances.get_or_default("A"), 990);

    // Re-submission after finalization changes nothing either.
    assert!(mempool.admit(signed, &balances).is_err());
    assert_eq!(mempool.pending_len(), 0);
    assert_eq!(balances.get_or_default("A"), 990);

    Ok(())
}

#[test]
fn test_wire_payload_feeds_a_peer_ledger() -> Result<(), Box<dyn std::error::Error>> {
    let keypair = KeyPair::generate()?;
    let mut miner_ledger = Ledger::new(DIFFICULTY);
    let mut peer_ledger = Ledger::new(DIFFICULTY);

    let batch = vec![
        transfer(&keypair, "A", "B", 25, 1),
        transfer(&keypair, "A", "C", 25, 2),
    ];
    let block = miner::mine(miner::assemble(
        &batch,
        miner_ledger.tip().hash,
        DIFFICULTY,
        1_700_000_500,
    ));
    miner_ledger.apply(block.clone())?;

    // A peer starting from the same deterministic genesis accepts the block
    // and decodes the identical batch out of the payload.
    assert_eq!(peer_ledger.apply(block)?, ApplyOutcome::Extended);
    let decoded = codec::decode_batch(&peer_ledger.tip().tx_payload)?;
    assert_eq!(decoded, batch);

    let balances = Balances::replay(peer_ledger.chain());
    assert_eq!(balances.get_or_default("A"), 950);
    assert_eq!(balances.get_or_default("B"), 25);
    assert_eq!(balances.get_or_default("C"), 25);

    Ok(())
}
