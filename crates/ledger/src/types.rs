//! Ledger API wire types

use std::fmt;

use piclaim_core::{Amount, BalanceId, Claimant, ClaimableBalance};
use serde::{Deserialize, Serialize};

use crate::LedgerError;

/// Result codes the ledger attaches to a rejected transaction.
///
/// For a sponsored transaction whose inner transaction failed, `transaction`
/// is `tx_fee_bump_inner_failed` and the inner code and per-operation codes
/// carry the detail.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResultCodes {
    pub transaction: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inner_transaction: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operations: Vec<String>,
}

impl ResultCodes {
    /// Transaction-level failure without operation detail
    pub fn transaction(code: &str) -> Self {
        Self {
            transaction: code.to_string(),
            inner_transaction: None,
            operations: Vec::new(),
        }
    }

    /// Inner transaction of a sponsored transaction failed
    pub fn inner_failed(inner: &str, operations: &[&str]) -> Self {
        Self {
            transaction: "tx_fee_bump_inner_failed".to_string(),
            inner_transaction: Some(inner.to_string()),
            operations: operations.iter().map(|op| op.to_string()).collect(),
        }
    }

    /// Whether any level reports `code`
    pub fn contains(&self, code: &str) -> bool {
        self.transaction == code
            || self.inner_transaction.as_deref() == Some(code)
            || self.operations.iter().any(|op| op == code)
    }
}

impl fmt::Display for ResultCodes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.transaction)?;
        if let Some(inner) = &self.inner_transaction {
            write!(f, " (inner: {})", inner)?;
        }
        if !self.operations.is_empty() {
            write!(f, " [{}]", self.operations.join(", "))?;
        }
        Ok(())
    }
}

/// Paged collection response (`_embedded.records`)
#[derive(Debug, Deserialize)]
pub(crate) struct Page<T> {
    #[serde(rename = "_embedded")]
    pub embedded: Embedded<T>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Embedded<T> {
    pub records: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ClaimableBalanceRecord {
    pub id: String,
    pub amount: String,
    #[serde(default)]
    pub sponsor: Option<String>,
    #[serde(default)]
    pub claimants: Vec<ClaimantRecord>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ClaimantRecord {
    pub destination: String,
    #[serde(default)]
    pub predicate: serde_json::Value,
}

impl TryFrom<ClaimableBalanceRecord> for ClaimableBalance {
    type Error = LedgerError;

    fn try_from(record: ClaimableBalanceRecord) -> Result<Self, Self::Error> {
        let id: BalanceId = record
            .id
            .parse()
            .map_err(|e| LedgerError::Decode(format!("claimable balance id: {}", e)))?;
        let amount: Amount = record
            .amount
            .parse()
            .map_err(|e| LedgerError::Decode(format!("claimable balance amount: {}", e)))?;

        Ok(ClaimableBalance {
            id,
            amount,
            claimants: record
                .claimants
                .into_iter()
                .map(|c| Claimant {
                    destination: c.destination,
                    predicate: c.predicate,
                })
                .collect(),
            sponsor: record.sponsor,
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct AccountRecord {
    pub sequence: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FeeStatsRecord {
    #[serde(default)]
    pub last_ledger_base_fee: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubmitRecord {
    pub hash: String,
}

/// Problem document returned with non-success statuses
#[derive(Debug, Default, Deserialize)]
pub(crate) struct Problem {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub extras: Option<ProblemExtras>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ProblemExtras {
    #[serde(default)]
    pub result_codes: Option<ResultCodes>,
    #[serde(default)]
    pub result_xdr: Option<String>,
}
