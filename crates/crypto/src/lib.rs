//! PiClaim Cryptography
//!
//! Key derivation from recovery phrases and ed25519 signing for the two
//! accounts the claimer operates: the claimant and the fee sponsor.

mod keys;
mod sign;

pub use keys::*;
pub use sign::*;
