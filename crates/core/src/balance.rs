//! Claimable balances as observed on the ledger

use serde::{Deserialize, Serialize};

use crate::{Address, Amount, BalanceId};

/// A claimant entry of a claimable balance.
///
/// The predicate is kept in the ledger API's JSON form. The ledger enforces
/// it when the claim is submitted; nothing here evaluates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claimant {
    pub destination: String,
    #[serde(default)]
    pub predicate: serde_json::Value,
}

/// Escrowed native funds redeemable by the listed claimants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimableBalance {
    pub id: BalanceId,
    pub amount: Amount,
    #[serde(default)]
    pub claimants: Vec<Claimant>,
    /// Account that reserved the balance entry, if any
    #[serde(default)]
    pub sponsor: Option<String>,
}

impl ClaimableBalance {
    pub fn new(id: BalanceId, amount: Amount) -> Self {
        Self {
            id,
            amount,
            claimants: Vec::new(),
            sponsor: None,
        }
    }

    /// Add an unconditional claimant
    pub fn with_claimant(mut self, destination: &Address) -> Self {
        self.claimants.push(Claimant {
            destination: destination.to_string(),
            predicate: serde_json::json!({ "unconditional": true }),
        });
        self
    }

    pub fn is_claimable_by(&self, address: &Address) -> bool {
        let address = address.to_string();
        self.claimants.iter().any(|c| c.destination == address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLAIMANT: &str = "GASWRHYE32A5A27TQWNRITIOZKOX7XQ6IVI4WEDGPVGX253D63UW2GJ3";
    const OTHER: &str = "GA2XRX65VZ4NRZG4FBQHREOR3Y2J3V55WW6KMUDCH64MFK2PBQB42JID";
    const BALANCE_ID: &str =
        "00000000da0d57da7d4850e7fc10d2a9d0ebc731f7afb40574c03395b17d49149b91f5be";

    #[test]
    fn test_claimable_by_listed_claimant() {
        let claimant: Address = CLAIMANT.parse().unwrap();
        let other: Address = OTHER.parse().unwrap();
        let balance = ClaimableBalance::new(
            BALANCE_ID.parse().unwrap(),
            Amount::from_stroops(1_000_000_000),
        )
        .with_claimant(&claimant);

        assert!(balance.is_claimable_by(&claimant));
        assert!(!balance.is_claimable_by(&other));
    }

    #[test]
    fn test_deserialize_without_claimants() {
        let json = format!(r#"{{"id":"{}","amount":50000000}}"#, BALANCE_ID);
        let balance: ClaimableBalance = serde_json::from_str(&json).unwrap();
        assert_eq!(balance.amount.to_string(), "5");
        assert!(balance.claimants.is_empty());
        assert!(balance.sponsor.is_none());
    }
}
