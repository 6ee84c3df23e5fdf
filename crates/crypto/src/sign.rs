use ed25519_dalek::{Signature, Signer, Verifier, VerifyingKey};

use crate::keys::KeyPair;

/// Sign data with a keypair
pub fn sign_data(keypair: &KeyPair, data: &[u8]) -> [u8; 64] {
    let signature: Signature = keypair.signing_key().sign(data);
    signature.to_bytes()
}

/// Verify a signature
pub fn verify_signature(pubkey: &[u8; 32], data: &[u8], signature: &[u8; 64]) -> bool {
    let verifying_key = match VerifyingKey::from_bytes(pubkey) {
        Ok(vk) => vk,
        Err(_) => return false,
    };

    let signature = Signature::from_bytes(signature);

    verifying_key.verify(data, &signature).is_ok()
}

/// Signature hint: the last four bytes of the signer's public key.
///
/// The ledger uses it to match each decorated signature to a signer.
pub fn signature_hint(pubkey: &[u8; 32]) -> [u8; 4] {
    let mut hint = [0u8; 4];
    hint.copy_from_slice(&pubkey[28..]);
    hint
}
