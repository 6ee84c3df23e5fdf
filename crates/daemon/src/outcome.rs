use std::time::Duration;

use piclaim_core::{Amount, BalanceId, TxHash};
use piclaim_ledger::ResultCodes;

/// Result of one balance's build-and-submit attempt
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Accepted by the ledger
    Success { hash: TxHash },
    /// Ledger rejected the transaction; terminal for this balance this cycle
    Rejected { codes: ResultCodes },
    /// Ledger service asked us to slow down
    RateLimited { retry_after: Option<Duration> },
    /// Transport, query or stale-state failure; the next cycle starts over
    TransientFailure { cause: String },
    /// Balance could not be turned into a valid claim
    Skipped { reason: String },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn is_failure(&self) -> bool {
        !self.is_success()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BalanceReport {
    pub balance_id: BalanceId,
    pub amount: Amount,
    pub outcome: Outcome,
}

/// Why a cycle stopped before processing every balance
#[derive(Debug, Clone, PartialEq)]
pub enum CycleAbort {
    /// Balance query failed
    Scan { cause: String },
    /// Base fee could not be fetched
    FeeFetch { cause: String },
    RateLimited { retry_after: Option<Duration> },
}

/// Summary of one scan-build-submit cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub cycle: u64,
    /// Balances returned by the scan
    pub found: usize,
    pub balances: Vec<BalanceReport>,
    pub abort: Option<CycleAbort>,
}

impl CycleReport {
    /// Nothing to claim and nothing went wrong
    pub fn is_idle(&self) -> bool {
        self.found == 0 && self.abort.is_none()
    }

    pub fn succeeded(&self) -> usize {
        self.balances.iter().filter(|b| b.outcome.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.balances.iter().filter(|b| b.outcome.is_failure()).count()
    }

    /// Balances found but never attempted because the cycle aborted
    pub fn unattempted(&self) -> usize {
        self.found.saturating_sub(self.balances.len())
    }

    /// Whether anything went wrong in this cycle
    pub fn had_failures(&self) -> bool {
        self.abort.is_some() || self.failed() > 0
    }

    /// `Some(retry_after)` when the cycle hit a rate limit
    pub fn rate_limit(&self) -> Option<Option<Duration>> {
        match self.abort {
            Some(CycleAbort::RateLimited { retry_after }) => Some(retry_after),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(outcome: Outcome) -> BalanceReport {
        BalanceReport {
            balance_id: "00000000da0d57da7d4850e7fc10d2a9d0ebc731f7afb40574c03395b17d49149b91f5be"
                .parse()
                .unwrap(),
            amount: Amount::from_stroops(1),
            outcome,
        }
    }

    #[test]
    fn test_idle_report() {
        let idle = CycleReport::default();
        assert!(idle.is_idle());
        assert!(!idle.had_failures());
        assert_eq!(idle.rate_limit(), None);
    }

    #[test]
    fn test_counts() {
        let hash = TxHash([7u8; 32]);
        let report = CycleReport {
            cycle: 3,
            found: 4,
            balances: vec![
                report(Outcome::Success { hash }),
                report(Outcome::Rejected {
                    codes: ResultCodes::transaction("tx_bad_seq"),
                }),
                report(Outcome::RateLimited { retry_after: None }),
            ],
            abort: Some(CycleAbort::RateLimited { retry_after: None }),
        };
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 2);
        assert_eq!(report.unattempted(), 1);
        assert!(report.had_failures());
        assert_eq!(report.rate_limit(), Some(None));
        assert!(!report.is_idle());
    }

    #[test]
    fn test_skipped_outcome_is_not_unattempted() {
        let report = CycleReport {
            cycle: 1,
            found: 2,
            balances: vec![
                report(Outcome::Skipped {
                    reason: "zero amount".to_string(),
                }),
                report(Outcome::Success { hash: TxHash([1u8; 32]) }),
            ],
            abort: None,
        };
        assert_eq!(report.unattempted(), 0);
        assert_eq!(report.failed(), 1);
    }
}
