//! PiClaim Sponsor
//!
//! Builds sponsored claim transactions: the claimant signs an inner
//! transaction that claims a balance and pays the full amount to the
//! destination, and the sponsor wraps it in a fee-paying transaction.
//!
//! The claimant account never pays anything, so it can hold a zero balance.

mod builder;
mod fee;
mod guard;

pub use builder::{compose_inner, sponsor_inner, SponsoredClaimBuilder, DEFAULT_TX_TTL};
pub use fee::FeePolicy;
pub use guard::SequenceGuard;

use piclaim_core::Address;
use piclaim_ledger::LedgerError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BuildError {
    /// The ledger reports a sequence older than one this process already
    /// consumed. A transaction built on it could never be accepted.
    #[error("Stale sequence for {account}: ledger reports {fetched}, already consumed {consumed}")]
    StaleSequence {
        account: Address,
        fetched: i64,
        consumed: i64,
    },

    #[error("Failed to load account: {0}")]
    AccountLoad(LedgerError),

    #[error("Failed to fetch base fee: {0}")]
    FeeFetch(LedgerError),

    #[error("Balance {0} is not claimable by the claimant")]
    NotClaimant(String),

    #[error("Nothing to claim in balance {0}")]
    EmptyBalance(String),

    #[error("Failed to encode transaction: {0}")]
    Encoding(LedgerError),
}

impl BuildError {
    /// Underlying ledger error, if the build failed talking to the ledger
    pub fn ledger_error(&self) -> Option<&LedgerError> {
        match self {
            Self::AccountLoad(e) | Self::FeeFetch(e) | Self::Encoding(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.ledger_error().is_some_and(LedgerError::is_rate_limited)
    }

    /// Whether rebuilding from scratch later may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::StaleSequence { .. } => true,
            Self::AccountLoad(e) | Self::FeeFetch(e) => e.is_transient(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, BuildError>;
