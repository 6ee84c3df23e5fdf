//! Horizon HTTP client
//!
//! Talks to a Horizon-compatible gateway. Non-success responses are mapped
//! onto [`LedgerError`] so callers can tell rate limiting, rejections and
//! transient failures apart without looking at HTTP details.

use std::time::Duration;

use async_trait::async_trait;
use piclaim_core::{Address, ClaimableBalance, TxHash, DEFAULT_HORIZON_URL};
use reqwest::{header::RETRY_AFTER, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::types::{AccountRecord, ClaimableBalanceRecord, FeeStatsRecord, Page, Problem, SubmitRecord};
use crate::{LedgerError, LedgerService, Result, SponsoredTransaction};

/// Base fee assumed when the fee stats endpoint does not report one
pub const FALLBACK_BASE_FEE: u32 = 100;

/// Horizon client configuration
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Gateway base URL, without trailing slash
    pub horizon_url: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            horizon_url: DEFAULT_HORIZON_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl LedgerConfig {
    pub fn new(horizon_url: &str) -> Self {
        Self {
            horizon_url: horizon_url.trim_end_matches('/').to_string(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Live ledger backend
pub struct HorizonClient {
    config: LedgerConfig,
    http: reqwest::Client,
}

impl HorizonClient {
    pub fn new(config: LedgerConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LedgerError::Transport(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { config, http })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.horizon_url.trim_end_matches('/'), path)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<T> {
        debug!("GET {}", url);
        let response = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(request_error)?;
        let response = check_status(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| LedgerError::Decode(e.to_string()))
    }
}

fn request_error(e: reqwest::Error) -> LedgerError {
    if e.is_timeout() {
        LedgerError::Timeout
    } else {
        LedgerError::Transport(e.to_string())
    }
}

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Pass successes through; turn everything else into a typed error
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = retry_after(&response);
        warn!("Ledger service rate limited (retry after {:?})", retry_after);
        return Err(LedgerError::RateLimited { retry_after });
    }

    let body = response.text().await.map_err(request_error)?;
    let problem: Problem = serde_json::from_str(&body).unwrap_or_default();

    if let Some(codes) = problem.extras.as_ref().and_then(|x| x.result_codes.clone()) {
        return Err(LedgerError::Rejected {
            codes,
            result_xdr: problem.extras.and_then(|x| x.result_xdr),
        });
    }

    let body = match problem.detail {
        Some(detail) if !problem.title.is_empty() => format!("{}: {}", problem.title, detail),
        Some(detail) => detail,
        None if !problem.title.is_empty() => problem.title,
        None => body,
    };
    Err(LedgerError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl LedgerService for HorizonClient {
    async fn claimable_balances(&self, claimant: &Address, limit: u32) -> Result<Vec<ClaimableBalance>> {
        let url = self.url("/claimable_balances");
        let page: Page<ClaimableBalanceRecord> = self
            .get_json(
                &url,
                &[
                    ("claimant", claimant.to_string()),
                    ("asset", "native".to_string()),
                    ("limit", limit.to_string()),
                    ("order", "asc".to_string()),
                ],
            )
            .await?;

        // A malformed record must not hide the rest of the page
        Ok(page
            .embedded
            .records
            .into_iter()
            .filter_map(|record| {
                let id = record.id.clone();
                match ClaimableBalance::try_from(record) {
                    Ok(balance) => Some(balance),
                    Err(e) => {
                        warn!("Dropping undecodable claimable balance {}: {}", id, e);
                        None
                    }
                }
            })
            .collect())
    }

    async fn account_sequence(&self, account: &Address) -> Result<i64> {
        let url = self.url(&format!("/accounts/{}", account));
        let record: AccountRecord = match self.get_json(&url, &[]).await {
            Err(LedgerError::Status { status: 404, .. }) => {
                return Err(LedgerError::AccountNotFound(account.to_string()))
            }
            other => other?,
        };

        record
            .sequence
            .parse()
            .map_err(|_| LedgerError::Decode(format!("account sequence {:?}", record.sequence)))
    }

    async fn base_fee(&self) -> Result<u32> {
        let url = self.url("/fee_stats");
        let stats: FeeStatsRecord = self.get_json(&url, &[]).await?;

        let fee = stats
            .last_ledger_base_fee
            .as_deref()
            .and_then(|fee| fee.parse::<u32>().ok())
            .unwrap_or(FALLBACK_BASE_FEE);
        Ok(fee)
    }

    async fn submit(&self, tx: &SponsoredTransaction) -> Result<TxHash> {
        let url = self.url("/transactions");
        let envelope = tx.to_envelope_base64()?;

        debug!("POST {} (fee {})", url, tx.total_fee());
        let response = self
            .http
            .post(&url)
            .form(&[("tx", envelope)])
            .send()
            .await
            .map_err(request_error)?;
        let response = check_status(response).await?;

        let record: SubmitRecord = response
            .json()
            .await
            .map_err(|e| LedgerError::Decode(e.to_string()))?;
        record
            .hash
            .parse()
            .map_err(|e| LedgerError::Decode(format!("transaction hash: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InnerTransaction, Network, Operation, TimeWindow};
    use piclaim_core::Amount;
    use piclaim_crypto::derive_keypair;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CLAIMANT: &str = "GASWRHYE32A5A27TQWNRITIOZKOX7XQ6IVI4WEDGPVGX253D63UW2GJ3";
    const BALANCE_ID: &str =
        "00000000da0d57da7d4850e7fc10d2a9d0ebc731f7afb40574c03395b17d49149b91f5be";

    fn client(server: &MockServer) -> HorizonClient {
        HorizonClient::new(LedgerConfig::new(&server.uri()).with_timeout(Duration::from_secs(2))).unwrap()
    }

    fn signed_tx() -> SponsoredTransaction {
        let network = Network::pi_mainnet();
        let claimant = derive_keypair(
            "illness spike retreat truth genius clock brain pass fit cave bargain toe",
        )
        .unwrap();
        let sponsor = derive_keypair(
            "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about",
        )
        .unwrap();

        let mut inner = InnerTransaction::new(
            claimant.address(),
            8,
            0,
            TimeWindow::expiring_after(1_700_000_000, Duration::from_secs(60)),
            vec![
                Operation::ClaimBalance {
                    balance_id: BALANCE_ID.parse().unwrap(),
                },
                Operation::Payment {
                    destination: sponsor.address(),
                    amount: Amount::from_stroops(10),
                },
            ],
        );
        inner.sign(&claimant, &network).unwrap();
        let mut tx = SponsoredTransaction::new(sponsor.address(), 200, inner);
        tx.sign(&sponsor, &network).unwrap();
        tx
    }

    #[tokio::test]
    async fn test_claimable_balances_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/claimable_balances"))
            .and(query_param("claimant", CLAIMANT))
            .and(query_param("asset", "native"))
            .and(query_param("limit", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "_embedded": { "records": [
                    { "id": BALANCE_ID, "amount": "3.1400000",
                      "claimants": [{ "destination": CLAIMANT, "predicate": { "unconditional": true } }] }
                ]}
            })))
            .mount(&server)
            .await;

        let claimant: Address = CLAIMANT.parse().unwrap();
        let balances = client(&server).claimable_balances(&claimant, 10).await.unwrap();
        assert_eq!(balances.len(), 1);
        assert_eq!(balances[0].amount.stroops(), 31_400_000);
        assert!(balances[0].is_claimable_by(&claimant));
    }

    #[tokio::test]
    async fn test_undecodable_record_dropped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/claimable_balances"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "_embedded": { "records": [
                    { "id": "not-a-balance-id", "amount": "1.0000000",
                      "claimants": [{ "destination": CLAIMANT }] },
                    { "id": BALANCE_ID, "amount": "12.5",
                      "claimants": [{ "destination": CLAIMANT }] },
                    { "id": BALANCE_ID, "amount": "lots",
                      "claimants": [{ "destination": CLAIMANT }] }
                ]}
            })))
            .mount(&server)
            .await;

        let claimant: Address = CLAIMANT.parse().unwrap();
        let balances = client(&server).claimable_balances(&claimant, 10).await.unwrap();
        assert_eq!(balances.len(), 1);
        assert_eq!(balances[0].amount.stroops(), 125_000_000);
    }

    #[tokio::test]
    async fn test_empty_page_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/claimable_balances"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "_embedded": { "records": [] } })))
            .mount(&server)
            .await;

        let claimant: Address = CLAIMANT.parse().unwrap();
        assert!(client(&server).claimable_balances(&claimant, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_account_sequence() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/accounts/{}", CLAIMANT)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": CLAIMANT, "sequence": "123456789012" })))
            .mount(&server)
            .await;

        let account: Address = CLAIMANT.parse().unwrap();
        assert_eq!(client(&server).account_sequence(&account).await.unwrap(), 123_456_789_012);
    }

    #[tokio::test]
    async fn test_account_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/accounts/{}", CLAIMANT)))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "title": "Resource Missing", "status": 404 })))
            .mount(&server)
            .await;

        let account: Address = CLAIMANT.parse().unwrap();
        assert!(matches!(
            client(&server).account_sequence(&account).await,
            Err(LedgerError::AccountNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_base_fee_and_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fee_stats"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "last_ledger_base_fee": "250" })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/fee_stats"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let client = client(&server);
        assert_eq!(client.base_fee().await.unwrap(), 250);
        assert_eq!(client.base_fee().await.unwrap(), FALLBACK_BASE_FEE);
    }

    #[tokio::test]
    async fn test_rate_limit_honours_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fee_stats"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
            .mount(&server)
            .await;

        let err = client(&server).base_fee().await.unwrap_err();
        assert_eq!(
            err,
            LedgerError::RateLimited {
                retry_after: Some(Duration::from_secs(7))
            }
        );
    }

    #[tokio::test]
    async fn test_server_error_is_transient_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fee_stats"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
            .mount(&server)
            .await;

        let err = client(&server).base_fee().await.unwrap_err();
        assert!(err.is_transient());
        assert!(matches!(err, LedgerError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_submit_posts_envelope() {
        let server = MockServer::start().await;
        let hash = "3389e9f0f1a65f19736cacf544c2e825313e8447f569233bb8db39aa607c8889";
        Mock::given(method("POST"))
            .and(path("/transactions"))
            .and(body_string_contains("tx="))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "hash": hash, "successful": true })))
            .expect(1)
            .mount(&server)
            .await;

        let result = client(&server).submit(&signed_tx()).await.unwrap();
        assert_eq!(result.to_hex(), hash);
    }

    #[tokio::test]
    async fn test_submit_rejection_carries_result_codes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transactions"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "title": "Transaction Failed",
                "status": 400,
                "extras": {
                    "result_codes": {
                        "transaction": "tx_fee_bump_inner_failed",
                        "inner_transaction": "tx_failed",
                        "operations": ["op_does_not_exist"]
                    },
                    "result_xdr": "AAAAAAAAAMj////zAAAAAA=="
                }
            })))
            .mount(&server)
            .await;

        let err = client(&server).submit(&signed_tx()).await.unwrap_err();
        let codes = err.result_codes().unwrap();
        assert!(codes.contains("op_does_not_exist"));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport() {
        let client = HorizonClient::new(
            LedgerConfig::new("http://127.0.0.1:1").with_timeout(Duration::from_secs(2)),
        )
        .unwrap();
        let err = client.base_fee().await.unwrap_err();
        assert!(err.is_transient());
    }
}
