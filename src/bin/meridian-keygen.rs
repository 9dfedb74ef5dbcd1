//! Generate a signing keypair for use with meridian-send.

use meridian::crypto::KeyPair;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let keypair = KeyPair::generate()?;
    println!("secret key: {}", hex::encode(keypair.secret_key.secret_bytes()));
    println!("public key: {}", hex::encode(keypair.public_key_bytes()));
    Ok(())
}
