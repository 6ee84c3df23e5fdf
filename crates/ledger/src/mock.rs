//! In-memory ledger
//!
//! Holds accounts and claimable balances in memory and applies submitted
//! sponsored transactions the way the live ledger would: signatures, fees,
//! time bounds and sequence numbers are checked before the operations run,
//! and failures come back with the same result codes. Failures for any
//! operation can be scripted ahead of time with [`MockLedger::fail_next`].

use std::collections::{HashMap, VecDeque};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use piclaim_core::{Address, Amount, BalanceId, ClaimableBalance, TxHash};
use tracing::debug;

use crate::{
    LedgerError, LedgerService, Network, Operation, Result, ResultCodes, SponsoredTransaction,
};

/// Ledger calls that can be scripted to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    Scan,
    Account,
    BaseFee,
    Submit,
}

/// Native payment applied by a successful submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payment {
    pub from: Address,
    pub to: Address,
    pub amount: Amount,
    pub tx_hash: TxHash,
}

#[derive(Debug, Clone, Copy)]
struct MockAccount {
    sequence: i64,
    native: i64,
}

#[derive(Debug)]
struct MockState {
    accounts: HashMap<Address, MockAccount>,
    /// Outstanding balances in creation order
    balances: Vec<ClaimableBalance>,
    base_fee: u32,
    failures: HashMap<MockOp, VecDeque<LedgerError>>,
    calls: HashMap<MockOp, u32>,
    submitted: Vec<SponsoredTransaction>,
    payments: Vec<Payment>,
    /// Fixed clock for time bound checks; wall clock when unset
    now: Option<u64>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            accounts: HashMap::new(),
            balances: Vec::new(),
            base_fee: piclaim_core::MIN_BASE_FEE,
            failures: HashMap::new(),
            calls: HashMap::new(),
            submitted: Vec::new(),
            payments: Vec::new(),
            now: None,
        }
    }
}

impl MockState {
    fn begin(&mut self, op: MockOp) -> Result<()> {
        *self.calls.entry(op).or_insert(0) += 1;
        match self.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => {
                debug!("Mock ledger: scripted {:?} failure: {}", op, err);
                Err(err)
            }
            None => Ok(()),
        }
    }

    fn now(&self) -> u64 {
        self.now.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0)
        })
    }
}

fn rejected(codes: ResultCodes) -> LedgerError {
    LedgerError::Rejected {
        codes,
        result_xdr: None,
    }
}

/// In-memory [`LedgerService`] implementation
pub struct MockLedger {
    network: Network,
    state: RwLock<MockState>,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new(Network::pi_mainnet())
    }
}

impl MockLedger {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            state: RwLock::new(MockState::default()),
        }
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    fn state(&self) -> RwLockReadGuard<'_, MockState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn state_mut(&self) -> RwLockWriteGuard<'_, MockState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Create (or reset) an account with a sequence number and native balance
    pub fn create_account(&self, address: &Address, sequence: i64, native: Amount) {
        self.state_mut().accounts.insert(
            *address,
            MockAccount {
                sequence,
                native: native.stroops(),
            },
        );
    }

    /// Overwrite an account's sequence number, e.g. to simulate a lagging view
    pub fn set_sequence(&self, address: &Address, sequence: i64) {
        if let Some(account) = self.state_mut().accounts.get_mut(address) {
            account.sequence = sequence;
        }
    }

    pub fn sequence(&self, address: &Address) -> Option<i64> {
        self.state().accounts.get(address).map(|a| a.sequence)
    }

    pub fn native_balance(&self, address: &Address) -> Option<Amount> {
        self.state()
            .accounts
            .get(address)
            .map(|a| Amount::from_stroops(a.native))
    }

    pub fn add_balance(&self, balance: ClaimableBalance) {
        self.state_mut().balances.push(balance);
    }

    /// Remove a balance as if someone else had claimed it first
    pub fn remove_balance(&self, id: &BalanceId) -> bool {
        let mut state = self.state_mut();
        let before = state.balances.len();
        state.balances.retain(|b| &b.id != id);
        state.balances.len() != before
    }

    /// Balances still outstanding for `claimant`
    pub fn outstanding(&self, claimant: &Address) -> Vec<ClaimableBalance> {
        self.state()
            .balances
            .iter()
            .filter(|b| b.is_claimable_by(claimant))
            .cloned()
            .collect()
    }

    pub fn set_base_fee(&self, fee: u32) {
        self.state_mut().base_fee = fee;
    }

    /// Pin the clock used for time bound checks
    pub fn set_now(&self, now: u64) {
        self.state_mut().now = Some(now);
    }

    /// Make the next call of `op` fail with `err`. Calls queue up.
    pub fn fail_next(&self, op: MockOp, err: LedgerError) {
        self.state_mut()
            .failures
            .entry(op)
            .or_default()
            .push_back(err);
    }

    /// Number of times `op` has been called, failed calls included
    pub fn calls(&self, op: MockOp) -> u32 {
        self.state().calls.get(&op).copied().unwrap_or(0)
    }

    /// Every transaction accepted so far
    pub fn submitted(&self) -> Vec<SponsoredTransaction> {
        self.state().submitted.clone()
    }

    pub fn payments(&self) -> Vec<Payment> {
        self.state().payments.clone()
    }

    fn apply(&self, state: &mut MockState, tx: &SponsoredTransaction) -> Result<TxHash> {
        let inner = tx.inner();
        let source = *inner.source();
        let fee_source = *tx.fee_source();

        let sponsor = state
            .accounts
            .get(&fee_source)
            .copied()
            .ok_or_else(|| rejected(ResultCodes::transaction("tx_no_source_account")))?;
        if !tx.is_signed_by(&fee_source, &self.network) {
            return Err(rejected(ResultCodes::transaction("tx_bad_auth")));
        }

        let ops = inner.operations().len() as i64;
        let min_fee = i64::from(state.base_fee) * (ops + 1);
        if tx.total_fee() < min_fee {
            return Err(rejected(ResultCodes::transaction("tx_insufficient_fee")));
        }
        if sponsor.native < tx.total_fee() {
            return Err(rejected(ResultCodes::transaction("tx_insufficient_balance")));
        }

        let claimant = state
            .accounts
            .get(&source)
            .copied()
            .ok_or_else(|| rejected(ResultCodes::inner_failed("tx_no_source_account", &[])))?;
        if !inner.is_signed_by(&source, &self.network) {
            return Err(rejected(ResultCodes::inner_failed("tx_bad_auth", &[])));
        }
        if inner.window().is_expired_at(state.now()) {
            return Err(rejected(ResultCodes::transaction("tx_too_late")));
        }
        if inner.sequence() != claimant.sequence + 1 {
            return Err(rejected(ResultCodes::transaction("tx_bad_seq")));
        }

        let hash = TxHash(tx.hash(&self.network)?);

        // From here on the sequence is consumed and the fee charged even if
        // an operation fails.
        if let Some(account) = state.accounts.get_mut(&fee_source) {
            account.native -= tx.total_fee();
        }
        if let Some(account) = state.accounts.get_mut(&source) {
            account.sequence = inner.sequence();
        }

        let mut staged_accounts = state.accounts.clone();
        let mut staged_balances = state.balances.clone();
        let mut staged_payments = Vec::new();
        let mut codes: Vec<&str> = Vec::new();

        for op in inner.operations() {
            let outcome = match op {
                Operation::ClaimBalance { balance_id } => {
                    match staged_balances
                        .iter()
                        .position(|b| &b.id == balance_id && b.is_claimable_by(&source))
                    {
                        Some(index) => {
                            let balance = staged_balances.remove(index);
                            if let Some(account) = staged_accounts.get_mut(&source) {
                                account.native += balance.amount.stroops();
                            }
                            Ok(())
                        }
                        None => Err("op_does_not_exist"),
                    }
                }
                Operation::Payment { destination, amount } => {
                    if !staged_accounts.contains_key(destination) {
                        Err("op_no_destination")
                    } else if staged_accounts.get(&source).map(|a| a.native) < Some(amount.stroops()) {
                        Err("op_underfunded")
                    } else {
                        if let Some(account) = staged_accounts.get_mut(&source) {
                            account.native -= amount.stroops();
                        }
                        if let Some(account) = staged_accounts.get_mut(destination) {
                            account.native += amount.stroops();
                        }
                        staged_payments.push(Payment {
                            from: source,
                            to: *destination,
                            amount: *amount,
                            tx_hash: hash,
                        });
                        Ok(())
                    }
                }
            };

            match outcome {
                Ok(()) => codes.push("op_success"),
                Err(code) => {
                    codes.push(code);
                    return Err(rejected(ResultCodes::inner_failed("tx_failed", &codes)));
                }
            }
        }

        state.accounts = staged_accounts;
        state.balances = staged_balances;
        state.payments.extend(staged_payments);
        state.submitted.push(tx.clone());
        Ok(hash)
    }
}

#[async_trait]
impl LedgerService for MockLedger {
    async fn claimable_balances(&self, claimant: &Address, limit: u32) -> Result<Vec<ClaimableBalance>> {
        let mut state = self.state_mut();
        state.begin(MockOp::Scan)?;
        Ok(state
            .balances
            .iter()
            .filter(|b| b.is_claimable_by(claimant))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn account_sequence(&self, account: &Address) -> Result<i64> {
        let mut state = self.state_mut();
        state.begin(MockOp::Account)?;
        state
            .accounts
            .get(account)
            .map(|a| a.sequence)
            .ok_or_else(|| LedgerError::AccountNotFound(account.to_string()))
    }

    async fn base_fee(&self) -> Result<u32> {
        let mut state = self.state_mut();
        state.begin(MockOp::BaseFee)?;
        Ok(state.base_fee)
    }

    async fn submit(&self, tx: &SponsoredTransaction) -> Result<TxHash> {
        let mut state = self.state_mut();
        state.begin(MockOp::Submit)?;
        let result = self.apply(&mut state, tx);
        match &result {
            Ok(hash) => debug!("Mock ledger: accepted {}", hash.short()),
            Err(e) => debug!("Mock ledger: rejected: {}", e),
        }
        result
    }
}
