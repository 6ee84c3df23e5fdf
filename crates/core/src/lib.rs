//! PiClaim Core Types
//!
//! This crate defines the domain types shared by every PiClaim crate:
//! account addresses, native amounts, claimable balances and transaction
//! hashes, plus the constants of the Pi ledger.

mod balance;
mod config;
mod error;
mod types;

pub use balance::*;
pub use config::*;
pub use error::*;
pub use types::*;
