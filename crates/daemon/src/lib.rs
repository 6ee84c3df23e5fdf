//! PiClaim Daemon
//!
//! The claim loop: scan for claimable balances, build a sponsored claim for
//! each one, submit it, report the outcome, then schedule the next cycle.
//!
//! ## Components
//!
//! - **ClaimService**: runs cycles sequentially against one claimant and one
//!   sponsor account. Balances within a cycle are processed one at a time;
//!   both accounts' sequence numbers make concurrent submission unsafe.
//! - **Scheduler**: turns a [`SchedulePolicy`] and the last cycle's report
//!   into the delay before the next cycle.
//! - **AlertGate**: keeps rate-limit alerts to one per window.
//!
//! ## Recovery
//!
//! Nothing is retried in place. A failed balance is left for the next cycle,
//! which scans again and rebuilds from fresh ledger state.

mod alert;
mod outcome;
mod schedule;
mod service;

pub use alert::AlertGate;
pub use outcome::{BalanceReport, CycleAbort, CycleReport, Outcome};
pub use schedule::{SchedulePolicy, Scheduler};
pub use service::{ClaimKeys, ClaimService, LoopState, ServiceConfig};

use piclaim_crypto::KeyError;
use piclaim_ledger::LedgerError;
use piclaim_notifier::NotifyError;
use piclaim_settings::SettingsError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("Configuration error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Key derivation failed for {account}: {source}")]
    Key {
        account: &'static str,
        #[source]
        source: KeyError,
    },

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Notifier error: {0}")]
    Notifier(#[from] NotifyError),
}

pub type Result<T> = std::result::Result<T, DaemonError>;
