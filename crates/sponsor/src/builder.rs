use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use piclaim_core::{Address, ClaimableBalance};
use piclaim_crypto::KeyPair;
use piclaim_ledger::{
    InnerTransaction, LedgerError, LedgerService, Network, Operation, SponsoredTransaction,
    TimeWindow,
};
use tracing::debug;

use crate::{BuildError, FeePolicy, Result, SequenceGuard};

/// How long a built transaction stays valid
pub const DEFAULT_TX_TTL: Duration = Duration::from_secs(60);

/// Compose and sign the claimant's inner transaction.
///
/// `sequence` is the sequence number the transaction consumes (the account's
/// current sequence plus one). Operations are always claim then pay, the fee
/// is zero and the claimant is the only signer.
pub fn compose_inner(
    claimant: &KeyPair,
    balance: &ClaimableBalance,
    destination: &Address,
    sequence: i64,
    window: TimeWindow,
    network: &Network,
) -> Result<InnerTransaction> {
    if !balance.is_claimable_by(&claimant.address()) {
        return Err(BuildError::NotClaimant(balance.id.to_string()));
    }
    if balance.amount.stroops() <= 0 {
        return Err(BuildError::EmptyBalance(balance.id.to_string()));
    }

    let mut inner = InnerTransaction::new(
        claimant.address(),
        sequence,
        0,
        window,
        vec![
            Operation::ClaimBalance {
                balance_id: balance.id.clone(),
            },
            Operation::Payment {
                destination: *destination,
                amount: balance.amount,
            },
        ],
    );
    inner.sign(claimant, network).map_err(BuildError::Encoding)?;
    Ok(inner)
}

/// Wrap a signed inner transaction with the sponsor as fee source and sole
/// outer signer.
pub fn sponsor_inner(
    sponsor: &KeyPair,
    inner: InnerTransaction,
    fee_bid: i64,
    network: &Network,
) -> Result<SponsoredTransaction> {
    let mut tx = SponsoredTransaction::new(sponsor.address(), fee_bid, inner);
    tx.sign(sponsor, network).map_err(BuildError::Encoding)?;
    Ok(tx)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Builds one sponsored claim per balance from fresh ledger snapshots.
///
/// Every build fetches the claimant's sequence and the base fee anew; a
/// transaction is never rebuilt from an earlier snapshot.
pub struct SponsoredClaimBuilder {
    ledger: Arc<dyn LedgerService>,
    network: Network,
    policy: FeePolicy,
    ttl: Duration,
    guard: Mutex<SequenceGuard>,
}

impl SponsoredClaimBuilder {
    pub fn new(ledger: Arc<dyn LedgerService>, network: Network, policy: FeePolicy, ttl: Duration) -> Self {
        Self {
            ledger,
            network,
            policy,
            ttl,
            guard: Mutex::new(SequenceGuard::new()),
        }
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn policy(&self) -> FeePolicy {
        self.policy
    }

    /// Build a signed sponsored claim of `balance` paying `destination`.
    pub async fn build(
        &self,
        claimant: &KeyPair,
        sponsor: &KeyPair,
        balance: &ClaimableBalance,
        destination: &Address,
    ) -> Result<SponsoredTransaction> {
        let account = claimant.address();

        let current = self
            .ledger
            .account_sequence(&account)
            .await
            .map_err(BuildError::AccountLoad)?;
        self.check_sequence(&account, current)?;
        let next = current.checked_add(1).ok_or_else(|| {
            BuildError::Encoding(LedgerError::Encoding(format!(
                "sequence of {} is exhausted",
                account.short()
            )))
        })?;

        let window = TimeWindow::expiring_after(unix_now(), self.ttl);
        let inner = compose_inner(claimant, balance, destination, next, window, &self.network)?;

        let base_fee = self.ledger.base_fee().await.map_err(BuildError::FeeFetch)?;
        let bid = self.policy.bid(base_fee);

        debug!(
            "Built claim of {} for {} (seq {}, base fee {}, bid {})",
            balance.id.short(),
            account.short(),
            next,
            base_fee,
            bid
        );
        sponsor_inner(sponsor, inner, bid, &self.network)
    }

    /// Remember that the ledger accepted `tx`, consuming its sequence
    pub fn record_consumed(&self, tx: &SponsoredTransaction) {
        let inner = tx.inner();
        self.guard
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record(inner.source(), inner.sequence());
    }

    fn check_sequence(&self, account: &Address, fetched: i64) -> Result<()> {
        self.guard
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .check(account, fetched)
            .map_err(|consumed| BuildError::StaleSequence {
                account: *account,
                fetched,
                consumed,
            })
    }
}
