//! PiClaim Ledger
//!
//! Client side of the ledger service: claimable balance queries, account
//! sequence numbers, the network base fee, and transaction submission.
//!
//! ## Backends
//!
//! - **HorizonClient**: Live HTTP client for a Horizon-compatible gateway.
//! - **MockLedger**: In-memory ledger for development and tests. Validates
//!   signatures, sequence numbers, fees and time bounds on submit and answers
//!   with the same result codes the live service uses.
//!
//! ## Transactions
//!
//! A claim is an [`InnerTransaction`] signed by the claimant (fee 0) wrapped
//! in a [`SponsoredTransaction`] signed by the sponsor, which pays the fee.
//! Both encode to the ledger's XDR envelope format for submission.

mod client;
mod mock;
mod transaction;
mod types;

pub use client::{HorizonClient, LedgerConfig};
pub use mock::{MockLedger, MockOp, Payment};
pub use transaction::*;
pub use types::*;

use std::time::Duration;

use async_trait::async_trait;
use piclaim_core::{Address, ClaimableBalance, TxHash};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Rate limited by ledger service")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Transaction rejected: {codes}")]
    Rejected {
        codes: ResultCodes,
        result_xdr: Option<String>,
    },

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Encoding error: {0}")]
    Encoding(String),
}

impl LedgerError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Failures where repeating the same request later may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout | Self::RateLimited { .. } => true,
            Self::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn result_codes(&self) -> Option<&ResultCodes> {
        match self {
            Self::Rejected { codes, .. } => Some(codes),
            _ => None,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Operations the claimer needs from the ledger.
#[async_trait]
pub trait LedgerService: Send + Sync {
    /// Outstanding native claimable balances listing `claimant`, at most `limit`.
    ///
    /// An empty list is the normal idle state, not an error.
    async fn claimable_balances(&self, claimant: &Address, limit: u32) -> Result<Vec<ClaimableBalance>>;

    /// Current sequence number of an account
    async fn account_sequence(&self, account: &Address) -> Result<i64>;

    /// Current per-operation base fee in stroops
    async fn base_fee(&self) -> Result<u32>;

    /// Submit a fully signed sponsored transaction
    async fn submit(&self, tx: &SponsoredTransaction) -> Result<TxHash>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(LedgerError::Timeout.is_transient());
        assert!(LedgerError::Transport("reset".to_string()).is_transient());
        assert!(LedgerError::RateLimited { retry_after: None }.is_transient());
        assert!(LedgerError::Status { status: 503, body: String::new() }.is_transient());
        assert!(!LedgerError::Status { status: 404, body: String::new() }.is_transient());
        assert!(!LedgerError::AccountNotFound("G".to_string()).is_transient());

        let rejected = LedgerError::Rejected {
            codes: ResultCodes::transaction("tx_bad_seq"),
            result_xdr: None,
        };
        assert!(!rejected.is_transient());
        assert!(!rejected.is_rate_limited());
        assert_eq!(rejected.result_codes().unwrap().transaction, "tx_bad_seq");
    }

    #[test]
    fn test_retry_after_only_for_rate_limit() {
        let limited = LedgerError::RateLimited {
            retry_after: Some(Duration::from_secs(7)),
        };
        assert_eq!(limited.retry_after(), Some(Duration::from_secs(7)));
        assert_eq!(LedgerError::Timeout.retry_after(), None);
    }

    #[test]
    fn test_rejected_display_includes_codes() {
        let err = LedgerError::Rejected {
            codes: ResultCodes::transaction("tx_bad_seq"),
            result_xdr: Some("AAAA".to_string()),
        };
        assert_eq!(err.to_string(), "Transaction rejected: tx_bad_seq");
    }
}
