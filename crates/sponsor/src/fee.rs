use piclaim_core::MIN_BASE_FEE;

/// How much the sponsor bids per operation, relative to the network base fee.
///
/// Bidding above the base fee raises the transaction's priority when the
/// network is congested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeePolicy {
    pub multiplier: u32,
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self { multiplier: 2 }
    }
}

impl FeePolicy {
    pub fn new(multiplier: u32) -> Self {
        Self {
            multiplier: multiplier.max(1),
        }
    }

    /// Per-operation bid in stroops. Never below the network minimum.
    pub fn bid(&self, base_fee: u32) -> i64 {
        let base = i64::from(base_fee.max(MIN_BASE_FEE));
        base.saturating_mul(i64::from(self.multiplier.max(1)))
    }
}
