//! Sign a transfer and submit it to a node.

use clap::Parser;
use meridian::crypto::KeyPair;
use meridian::network::{self, NetworkMessage, PeerAddr};
use meridian::transaction::{SignedTransaction, Transaction};

#[derive(Parser)]
#[command(name = "meridian-send", about = "Sign and submit a transfer transaction")]
struct Args {
    /// Node to submit to (host:port)
    #[arg(long, default_value = "127.0.0.1:7440")]
    peer: String,

    /// Hex-encoded secret key; omit to sign with a fresh throwaway key
    #[arg(long)]
    key: Option<String>,

    /// Sender address
    #[arg(long)]
    from: String,

    /// Receiver address
    #[arg(long)]
    to: String,

    /// Amount to transfer
    #[arg(long)]
    amount: u64,

    /// Sender nonce; bump it for each transaction from the same address
    #[arg(long, default_value_t = 1)]
    nonce: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let keypair = match &args.key {
        Some(secret_hex) => KeyPair::from_secret_hex(secret_hex)?,
        None => KeyPair::generate()?,
    };

    let tx = Transaction::new(args.from, args.to, args.amount, args.nonce);
    let signed = SignedTransaction::sign(tx, &keypair)?;
    let id = signed.transaction.id_hex();

    let peer = PeerAddr::parse(&args.peer)?;
    network::send_to(&peer, &NetworkMessage::NewTransaction(signed)).await?;

    println!("submitted transaction {} to {}", id, peer.addr());
    Ok(())
}
