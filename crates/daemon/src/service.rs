//! Claim loop service

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use piclaim_core::{Address, ClaimableBalance};
use piclaim_crypto::{derive_keypair, KeyPair};
use piclaim_ledger::{HorizonClient, LedgerConfig, LedgerError, LedgerService, Network};
use piclaim_notifier::{messages, Notifier, TelegramConfig, TelegramNotifier};
use piclaim_settings::Settings;
use piclaim_sponsor::{BuildError, FeePolicy, SponsoredClaimBuilder};
use tokio::task::JoinSet;
use tracing::{debug, error, info, trace, warn};

use crate::{
    AlertGate, BalanceReport, CycleAbort, CycleReport, DaemonError, Outcome, Result, Scheduler,
};

/// How long shutdown waits for in-flight notifications
const SHUTDOWN_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// The two accounts the service signs for. Derived once at startup.
#[derive(Debug, Clone)]
pub struct ClaimKeys {
    /// Owns the balances and authorizes claim and payment
    pub claimant: KeyPair,
    /// Pays the fee and authorizes nothing else
    pub sponsor: KeyPair,
}

impl ClaimKeys {
    pub fn new(claimant: KeyPair, sponsor: KeyPair) -> Self {
        Self { claimant, sponsor }
    }

    /// Derive both keypairs. An invalid phrase is fatal.
    pub fn derive(claimant_phrase: &str, sponsor_phrase: &str) -> Result<Self> {
        let claimant = derive_keypair(claimant_phrase).map_err(|source| DaemonError::Key {
            account: "claimant",
            source,
        })?;
        let sponsor = derive_keypair(sponsor_phrase).map_err(|source| DaemonError::Key {
            account: "sponsor",
            source,
        })?;
        if claimant == sponsor {
            warn!("Claimant and sponsor phrases derive the same account");
        }
        Ok(Self { claimant, sponsor })
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Balances fetched per scan
    pub page_size: u32,
    /// Explorer prefix for links in success messages
    pub explorer_tx_url: String,
    pub rate_limit_alert_window: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            page_size: 10,
            explorer_tx_url: piclaim_core::DEFAULT_EXPLORER_TX_URL.to_string(),
            rate_limit_alert_window: Duration::from_secs(300),
        }
    }
}

/// Where the loop is within a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Scanning,
    Building,
    Submitting,
    Reporting,
    ErrorReported,
}

/// Drives the scan-build-submit cycle for one claimant/sponsor pair.
pub struct ClaimService {
    keys: ClaimKeys,
    destination: Address,
    ledger: Arc<dyn LedgerService>,
    builder: SponsoredClaimBuilder,
    notifier: Arc<dyn Notifier>,
    alerts: AlertGate,
    config: ServiceConfig,
    state: LoopState,
    cycles: u64,
    /// Notifications still being delivered
    deliveries: JoinSet<()>,
}

impl ClaimService {
    pub fn new(
        keys: ClaimKeys,
        destination: Address,
        ledger: Arc<dyn LedgerService>,
        builder: SponsoredClaimBuilder,
        notifier: Arc<dyn Notifier>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            keys,
            destination,
            ledger,
            builder,
            notifier,
            alerts: AlertGate::new(config.rate_limit_alert_window),
            config,
            state: LoopState::Idle,
            cycles: 0,
            deliveries: JoinSet::new(),
        }
    }

    /// Wire up the live ledger client and Telegram notifier from settings.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let keys = ClaimKeys::derive(&settings.claimant_phrase, &settings.sponsor_phrase)?;
        let policy = &settings.policy;

        let ledger: Arc<dyn LedgerService> = Arc::new(HorizonClient::new(
            LedgerConfig::new(&settings.horizon_url).with_timeout(policy.http_timeout()),
        )?);

        let mut telegram = TelegramConfig::new(
            settings.telegram.bot_token.clone(),
            settings.telegram.chat_id.clone(),
        );
        if let Some(api_url) = &settings.telegram.api_url {
            telegram = telegram.with_api_url(api_url);
        }
        if !telegram.is_enabled() {
            info!("Telegram credentials not set, notifications disabled");
        }
        let notifier: Arc<dyn Notifier> = Arc::new(TelegramNotifier::new(telegram)?);

        let builder = SponsoredClaimBuilder::new(
            ledger.clone(),
            Network::new(&settings.network_passphrase),
            FeePolicy::new(policy.fee_multiplier),
            policy.tx_timeout(),
        );

        Ok(Self::new(
            keys,
            settings.destination,
            ledger,
            builder,
            notifier,
            ServiceConfig {
                page_size: policy.page_size,
                explorer_tx_url: settings.explorer_tx_url.clone(),
                rate_limit_alert_window: policy.rate_limit_alert_window(),
            },
        ))
    }

    pub fn keys(&self) -> &ClaimKeys {
        &self.keys
    }

    pub fn destination(&self) -> &Address {
        &self.destination
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Cycles started so far
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    fn transition(&mut self, next: LoopState) {
        trace!("{:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Balances currently claimable by the claimant
    pub async fn scan(&self) -> std::result::Result<Vec<ClaimableBalance>, LedgerError> {
        self.ledger
            .claimable_balances(&self.keys.claimant.address(), self.config.page_size)
            .await
    }

    /// Run one full cycle: scan, then build and submit each balance in turn.
    pub async fn run_cycle(&mut self) -> CycleReport {
        self.cycles += 1;
        let mut report = CycleReport {
            cycle: self.cycles,
            ..Default::default()
        };

        self.transition(LoopState::Scanning);
        let balances = match self.scan().await {
            Ok(balances) => balances,
            Err(e) => {
                report.abort = Some(self.scan_failed(e).await);
                self.transition(LoopState::Idle);
                return report;
            }
        };

        report.found = balances.len();
        if balances.is_empty() {
            debug!("Cycle {}: no claimable balances", report.cycle);
            self.transition(LoopState::Idle);
            return report;
        }
        info!("Cycle {}: found {} claimable balance(s)", report.cycle, balances.len());

        for balance in &balances {
            let (outcome, abort) = self.process(balance).await;
            report.balances.push(BalanceReport {
                balance_id: balance.id.clone(),
                amount: balance.amount,
                outcome,
            });
            if let Some(abort) = abort {
                warn!(
                    "Cycle {} aborted, {} balance(s) left for the next cycle",
                    report.cycle,
                    report.found - report.balances.len()
                );
                report.abort = Some(abort);
                break;
            }
        }

        self.transition(LoopState::Idle);
        report
    }

    async fn scan_failed(&mut self, e: LedgerError) -> CycleAbort {
        self.transition(LoopState::ErrorReported);
        if let LedgerError::RateLimited { retry_after } = e {
            self.rate_limited(retry_after).await;
            return CycleAbort::RateLimited { retry_after };
        }
        error!("Balance scan failed: {}", e);
        CycleAbort::Scan { cause: e.to_string() }
    }

    /// Build, submit and report one balance
    async fn process(&mut self, balance: &ClaimableBalance) -> (Outcome, Option<CycleAbort>) {
        self.transition(LoopState::Building);
        let tx = match self
            .builder
            .build(&self.keys.claimant, &self.keys.sponsor, balance, &self.destination)
            .await
        {
            Ok(tx) => tx,
            Err(e) => return self.build_failed(balance, e).await,
        };

        self.transition(LoopState::Submitting);
        debug!(
            "Submitting claim of {} Pi from {} (seq {}, fee {})",
            balance.amount,
            balance.id.short(),
            tx.inner().sequence(),
            tx.total_fee()
        );
        let result = self.ledger.submit(&tx).await;

        self.transition(LoopState::Reporting);
        match result {
            Ok(hash) => {
                self.builder.record_consumed(&tx);
                info!("Claimed {} Pi from {} in {}", balance.amount, balance.id.short(), hash);
                self.announce(messages::claim_succeeded(
                    balance.amount,
                    &hash,
                    &self.config.explorer_tx_url,
                ));
                (Outcome::Success { hash }, None)
            }
            Err(LedgerError::RateLimited { retry_after }) => {
                self.transition(LoopState::ErrorReported);
                self.rate_limited(retry_after).await;
                (
                    Outcome::RateLimited { retry_after },
                    Some(CycleAbort::RateLimited { retry_after }),
                )
            }
            Err(LedgerError::Rejected { codes, result_xdr }) => {
                self.transition(LoopState::ErrorReported);
                error!(
                    "Claim of {} rejected: {} (result {})",
                    balance.id.short(),
                    codes,
                    result_xdr.as_deref().unwrap_or("-")
                );
                self.announce(messages::claim_rejected(&balance.id, balance.amount, &codes));
                (Outcome::Rejected { codes }, None)
            }
            Err(e) => {
                self.transition(LoopState::ErrorReported);
                warn!("Submitting claim of {} failed: {}", balance.id.short(), e);
                self.announce(messages::claim_failed("Claim submission failed", &e.to_string()));
                (Outcome::TransientFailure { cause: e.to_string() }, None)
            }
        }
    }

    async fn build_failed(
        &mut self,
        balance: &ClaimableBalance,
        e: BuildError,
    ) -> (Outcome, Option<CycleAbort>) {
        self.transition(LoopState::ErrorReported);

        if let Some(LedgerError::RateLimited { retry_after }) = e.ledger_error() {
            let retry_after = *retry_after;
            self.rate_limited(retry_after).await;
            return (
                Outcome::RateLimited { retry_after },
                Some(CycleAbort::RateLimited { retry_after }),
            );
        }

        match e {
            BuildError::FeeFetch(cause) => {
                error!("Base fee unavailable, aborting cycle: {}", cause);
                let cause = cause.to_string();
                (
                    Outcome::TransientFailure { cause: cause.clone() },
                    Some(CycleAbort::FeeFetch { cause }),
                )
            }
            BuildError::StaleSequence { .. } | BuildError::AccountLoad(_) => {
                warn!("Skipping {} this cycle: {}", balance.id.short(), e);
                (Outcome::TransientFailure { cause: e.to_string() }, None)
            }
            BuildError::NotClaimant(_) | BuildError::EmptyBalance(_) | BuildError::Encoding(_) => {
                error!("Cannot claim {}: {}", balance.id.short(), e);
                self.announce(messages::claim_failed("Claim skipped", &e.to_string()));
                (Outcome::Skipped { reason: e.to_string() }, None)
            }
        }
    }

    async fn rate_limited(&mut self, retry_after: Option<Duration>) {
        warn!("Rate limited by ledger service (retry after {:?})", retry_after);
        if self.alerts.allow_rate_limit_alert() {
            self.announce(messages::rate_limited(retry_after));
        } else {
            debug!("Rate-limit alert suppressed ({} so far)", self.alerts.suppressed());
        }
    }

    /// Hand `message` to the notifier without waiting for delivery
    fn announce(&mut self, message: String) {
        while let Some(done) = self.deliveries.try_join_next() {
            if let Err(e) = done {
                warn!("Notification task failed: {}", e);
            }
        }

        let notifier = self.notifier.clone();
        self.deliveries.spawn(async move {
            notifier.notify(&message).await;
        });
    }

    /// Notifications handed off but not yet delivered
    pub fn pending_notifications(&self) -> usize {
        self.deliveries.len()
    }

    /// Wait until every handed-off notification has been delivered or dropped.
    pub async fn flush_notifications(&mut self) {
        while let Some(done) = self.deliveries.join_next().await {
            if let Err(e) = done {
                warn!("Notification task failed: {}", e);
            }
        }
    }

    /// Run `count` cycles, waiting between them as `scheduler` decides.
    pub async fn run_cycles(&mut self, count: usize, scheduler: &mut Scheduler) -> Vec<CycleReport> {
        let mut reports = Vec::with_capacity(count);
        for i in 0..count {
            let report = self.run_cycle().await;
            let delay = scheduler.next_delay(&report);
            reports.push(report);
            if i + 1 < count && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
        self.flush_notifications().await;
        reports
    }

    /// Run cycles until `shutdown` resolves.
    ///
    /// A cycle's failure never stops the loop; the next one is scheduled
    /// normally.
    pub async fn run<F>(&mut self, mut scheduler: Scheduler, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(
            "Claiming for {} via sponsor {} to {} ({:?})",
            self.keys.claimant.address().short(),
            self.keys.sponsor.address().short(),
            self.destination.short(),
            scheduler.policy()
        );

        loop {
            let report = tokio::select! {
                _ = &mut shutdown => break,
                report = self.run_cycle() => report,
            };

            let delay = scheduler.next_delay(&report);
            if !report.is_idle() {
                info!(
                    "Cycle {} done: {} claimed, {} failed, {} left for the next cycle; next in {:?}",
                    report.cycle,
                    report.succeeded(),
                    report.failed(),
                    report.unattempted(),
                    delay
                );
            }

            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.transition(LoopState::Idle);
        if tokio::time::timeout(SHUTDOWN_FLUSH_TIMEOUT, self.flush_notifications())
            .await
            .is_err()
        {
            warn!("Dropped {} undelivered notification(s)", self.deliveries.len());
        }
        info!("Claim loop stopped after {} cycle(s)", self.cycles);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use piclaim_core::Amount;
    use piclaim_ledger::{MockLedger, MockOp, ResultCodes};
    use piclaim_notifier::MemoryNotifier;
    use async_trait::async_trait;
    use piclaim_sponsor::DEFAULT_TX_TTL;

    use crate::SchedulePolicy;

    const CLAIMANT: &str = "illness spike retreat truth genius clock brain pass fit cave bargain toe";
    const SPONSOR: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
    const DESTINATION: &str = "GDRXE2BQUC3AZNPVFSCEZ76NJ3WWL25FYFK6RGZGIEKWE4SOOHSUJUJ6";

    struct Harness {
        ledger: Arc<MockLedger>,
        notifier: Arc<MemoryNotifier>,
        service: ClaimService,
    }

    fn balance_id(n: u8) -> piclaim_core::BalanceId {
        format!("00000000{}", format!("{:02x}", n).repeat(32)).parse().unwrap()
    }

    fn harness() -> Harness {
        let keys = ClaimKeys::derive(CLAIMANT, SPONSOR).unwrap();
        let destination: Address = DESTINATION.parse().unwrap();

        let ledger = Arc::new(MockLedger::default());
        ledger.create_account(&keys.claimant.address(), 10, Amount::ZERO);
        ledger.create_account(&keys.sponsor.address(), 1, Amount::from_stroops(1_000_000_000));
        ledger.create_account(&destination, 1, Amount::ZERO);

        let notifier = Arc::new(MemoryNotifier::new());
        let builder = SponsoredClaimBuilder::new(
            ledger.clone(),
            Network::pi_mainnet(),
            FeePolicy::default(),
            DEFAULT_TX_TTL,
        );
        let service = ClaimService::new(
            keys,
            destination,
            ledger.clone(),
            builder,
            notifier.clone(),
            ServiceConfig::default(),
        );

        Harness {
            ledger,
            notifier,
            service,
        }
    }

    impl Harness {
        fn add_balance(&self, n: u8, stroops: i64) {
            self.ledger.add_balance(
                ClaimableBalance::new(balance_id(n), Amount::from_stroops(stroops))
                    .with_claimant(&self.service.keys().claimant.address()),
            );
        }

        /// One cycle, with its notifications delivered
        async fn cycle(&mut self) -> CycleReport {
            let report = self.service.run_cycle().await;
            self.service.flush_notifications().await;
            report
        }
    }

    /// Never finishes delivering within a test's lifetime
    struct StalledNotifier;

    #[async_trait]
    impl Notifier for StalledNotifier {
        async fn notify(&self, _message: &str) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
    }

    #[test]
    fn test_derive_rejects_bad_phrase_with_account_name() {
        let err = ClaimKeys::derive(CLAIMANT, "abandon abandon abandon").unwrap_err();
        assert!(matches!(err, DaemonError::Key { account: "sponsor", .. }));
    }

    #[tokio::test]
    async fn test_idle_cycle_touches_nothing() {
        let mut h = harness();
        let report = h.cycle().await;

        assert!(report.is_idle());
        assert_eq!(h.ledger.calls(MockOp::Scan), 1);
        assert_eq!(h.ledger.calls(MockOp::Account), 0);
        assert_eq!(h.ledger.calls(MockOp::BaseFee), 0);
        assert_eq!(h.ledger.calls(MockOp::Submit), 0);
        assert!(h.notifier.is_empty());
        assert_eq!(h.service.state(), LoopState::Idle);
    }

    #[tokio::test]
    async fn test_claims_each_balance_sequentially() {
        let mut h = harness();
        h.add_balance(1, 10_000_000);
        h.add_balance(2, 25_000_000);

        let report = h.cycle().await;
        assert_eq!(report.found, 2);
        assert_eq!(report.succeeded(), 2);

        let submitted = h.ledger.submitted();
        assert_eq!(submitted[0].inner().sequence(), 11);
        assert_eq!(submitted[1].inner().sequence(), 12);
        assert_eq!(
            h.ledger.native_balance(h.service.destination()),
            Some(Amount::from_stroops(35_000_000))
        );
        assert_eq!(h.notifier.len(), 2);
    }

    #[tokio::test]
    async fn test_rejection_is_isolated_and_alerted() {
        let mut h = harness();
        h.add_balance(1, 10_000_000);
        h.add_balance(2, 20_000_000);
        h.ledger.fail_next(
            MockOp::Submit,
            LedgerError::Rejected {
                codes: ResultCodes::transaction("tx_insufficient_fee"),
                result_xdr: None,
            },
        );

        let report = h.cycle().await;
        assert!(matches!(report.balances[0].outcome, Outcome::Rejected { .. }));
        assert!(report.balances[1].outcome.is_success());
        assert!(report.abort.is_none());

        let messages = h.notifier.messages();
        assert!(messages[0].contains("tx_insufficient_fee"));
        assert_eq!(h.ledger.calls(MockOp::Submit), 2);
    }

    #[tokio::test]
    async fn test_scan_failure_aborts_quietly() {
        let mut h = harness();
        h.add_balance(1, 10_000_000);
        h.ledger.fail_next(MockOp::Scan, LedgerError::Transport("connection reset".to_string()));

        let report = h.cycle().await;
        assert!(matches!(report.abort, Some(CycleAbort::Scan { .. })));
        assert_eq!(h.ledger.calls(MockOp::Account), 0);
        assert!(h.notifier.is_empty());

        // Next cycle recovers
        let report = h.cycle().await;
        assert_eq!(report.succeeded(), 1);
    }

    #[tokio::test]
    async fn test_fee_fetch_failure_aborts_cycle() {
        let mut h = harness();
        h.add_balance(1, 10_000_000);
        h.add_balance(2, 10_000_000);
        h.ledger.fail_next(MockOp::BaseFee, LedgerError::Timeout);

        let report = h.cycle().await;
        assert!(matches!(report.abort, Some(CycleAbort::FeeFetch { .. })));
        assert_eq!(report.balances.len(), 1);
        assert_eq!(report.unattempted(), 1);
        assert_eq!(h.ledger.calls(MockOp::Submit), 0);
    }

    #[tokio::test]
    async fn test_submit_transport_failure_continues() {
        let mut h = harness();
        h.add_balance(1, 10_000_000);
        h.add_balance(2, 10_000_000);
        h.ledger.fail_next(MockOp::Submit, LedgerError::Timeout);

        let report = h.cycle().await;
        assert!(matches!(report.balances[0].outcome, Outcome::TransientFailure { .. }));
        assert!(report.balances[1].outcome.is_success());
        assert!(h.notifier.messages()[0].contains("Request timed out"));
    }

    #[tokio::test]
    async fn test_rate_limit_aborts_and_alerts_once_per_window() {
        let mut h = harness();
        h.add_balance(1, 10_000_000);
        h.add_balance(2, 10_000_000);
        for _ in 0..3 {
            h.ledger.fail_next(
                MockOp::Submit,
                LedgerError::RateLimited {
                    retry_after: Some(Duration::from_secs(5)),
                },
            );
        }

        for _ in 0..3 {
            let report = h.cycle().await;
            assert_eq!(report.rate_limit(), Some(Some(Duration::from_secs(5))));
            assert_eq!(report.balances.len(), 1);
        }
        assert_eq!(h.notifier.len(), 1);

        let report = h.cycle().await;
        assert_eq!(report.succeeded(), 2);
    }

    #[tokio::test]
    async fn test_stale_sequence_skips_balance() {
        let mut h = harness();
        h.add_balance(1, 10_000_000);
        h.cycle().await;

        // Ledger view regresses below the consumed sequence
        h.add_balance(2, 10_000_000);
        h.ledger.set_sequence(&h.service.keys().claimant.address(), 5);
        let report = h.cycle().await;
        match &report.balances[0].outcome {
            Outcome::TransientFailure { cause } => assert!(cause.contains("Stale sequence")),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(h.ledger.calls(MockOp::Submit), 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let mut h = harness();
        h.add_balance(1, 10_000_000);

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let scheduler = Scheduler::new(SchedulePolicy::Fixed(Duration::from_millis(10)));
        let stop = async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let _ = tx.send(());
        };
        let shutdown = async move {
            let _ = rx.await;
        };

        tokio::join!(h.service.run(scheduler, shutdown), stop);
        assert!(h.service.cycles() >= 2);
        assert_eq!(h.ledger.calls(MockOp::Submit), 1);
        assert_eq!(h.service.state(), LoopState::Idle);
    }

    #[tokio::test]
    async fn test_run_cycles_bounded() {
        let mut h = harness();
        let mut scheduler = Scheduler::new(SchedulePolicy::Immediate);
        let reports = h.service.run_cycles(3, &mut scheduler).await;
        assert_eq!(reports.len(), 3);
        assert_eq!(reports[2].cycle, 3);
        assert!(reports.iter().all(CycleReport::is_idle));
    }

    #[tokio::test]
    async fn test_slow_notifier_does_not_hold_up_cycle() {
        let h = harness();
        let ledger = h.ledger.clone();
        let builder = SponsoredClaimBuilder::new(
            ledger.clone(),
            Network::pi_mainnet(),
            FeePolicy::default(),
            DEFAULT_TX_TTL,
        );
        let mut service = ClaimService::new(
            h.service.keys().clone(),
            *h.service.destination(),
            ledger.clone(),
            builder,
            Arc::new(StalledNotifier),
            ServiceConfig::default(),
        );
        h.add_balance(1, 10_000_000);
        h.add_balance(2, 10_000_000);

        let report = tokio::time::timeout(Duration::from_secs(2), service.run_cycle())
            .await
            .expect("cycle waited on notification delivery");
        assert_eq!(report.succeeded(), 2);
        assert_eq!(service.pending_notifications(), 2);
    }
}
