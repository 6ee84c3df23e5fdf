//! Sponsored claim transactions and their XDR envelope encoding

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use piclaim_core::{Address, Amount, BalanceId, PI_NETWORK_PASSPHRASE};
use piclaim_crypto::{sign_data, signature_hint, verify_signature, KeyPair};
use sha2::{Digest, Sha256};
use stellar_xdr::curr as xdr;
use stellar_xdr::curr::{Limits, ReadXdr, WriteXdr};

use crate::{LedgerError, Result};

/// Network a transaction is valid on. Signatures cover the network id, so a
/// transaction signed for one network is invalid on every other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Network {
    passphrase: String,
    id: [u8; 32],
}

impl Network {
    pub fn new(passphrase: &str) -> Self {
        Self {
            passphrase: passphrase.to_string(),
            id: Sha256::digest(passphrase.as_bytes()).into(),
        }
    }

    pub fn pi_mainnet() -> Self {
        Self::new(PI_NETWORK_PASSPHRASE)
    }

    pub fn passphrase(&self) -> &str {
        &self.passphrase
    }

    pub fn id(&self) -> [u8; 32] {
        self.id
    }
}

/// Operations a claim transaction may carry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Redeem a claimable balance into the transaction source account
    ClaimBalance { balance_id: BalanceId },
    /// Pay native funds from the transaction source account
    Payment { destination: Address, amount: Amount },
}

impl Operation {
    fn to_xdr(&self) -> Result<xdr::Operation> {
        let body = match self {
            Self::ClaimBalance { balance_id } => {
                let balance_id = xdr::ClaimableBalanceId::from_xdr(balance_id.to_bytes(), Limits::none())
                    .map_err(|e| LedgerError::Encoding(format!("balance id {}: {}", balance_id.short(), e)))?;
                xdr::OperationBody::ClaimClaimableBalance(xdr::ClaimClaimableBalanceOp { balance_id })
            }
            Self::Payment { destination, amount } => xdr::OperationBody::Payment(xdr::PaymentOp {
                destination: muxed_account(destination),
                asset: xdr::Asset::Native,
                amount: amount.stroops(),
            }),
        };
        Ok(xdr::Operation {
            source_account: None,
            body,
        })
    }
}

/// Validity window in unix seconds; `max_time` of 0 means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub min_time: u64,
    pub max_time: u64,
}

impl TimeWindow {
    /// Valid from now until `ttl` has elapsed
    pub fn expiring_after(now: u64, ttl: Duration) -> Self {
        Self {
            min_time: 0,
            max_time: now.saturating_add(ttl.as_secs()),
        }
    }

    pub fn is_expired_at(&self, now: u64) -> bool {
        self.max_time != 0 && now > self.max_time
    }
}

/// Signature plus the hint identifying its signer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoratedSignature {
    pub hint: [u8; 4],
    pub signature: [u8; 64],
}

impl DecoratedSignature {
    fn create(keypair: &KeyPair, hash: &[u8; 32]) -> Self {
        Self {
            hint: signature_hint(&keypair.public_key_bytes()),
            signature: sign_data(keypair, hash),
        }
    }

    fn to_xdr(&self) -> Result<xdr::DecoratedSignature> {
        let signature = xdr::BytesM::<64>::try_from(self.signature)
            .map_err(|e| LedgerError::Encoding(e.to_string()))?;
        Ok(xdr::DecoratedSignature {
            hint: xdr::SignatureHint(self.hint),
            signature: xdr::Signature(signature),
        })
    }
}

fn muxed_account(address: &Address) -> xdr::MuxedAccount {
    xdr::MuxedAccount::Ed25519(xdr::Uint256(*address.public_key()))
}

fn encoding_error(e: xdr::Error) -> LedgerError {
    LedgerError::Encoding(e.to_string())
}

fn signed_by(signatures: &[DecoratedSignature], address: &Address, hash: &[u8; 32]) -> bool {
    let pubkey = address.public_key();
    let hint = signature_hint(pubkey);
    signatures
        .iter()
        .any(|s| s.hint == hint && verify_signature(pubkey, hash, &s.signature))
}

/// Transaction authorising the operations, sourced from the claimant.
///
/// Its fee is zero: the sponsor pays through the wrapping
/// [`SponsoredTransaction`]. It consumes `sequence` on the source account, so
/// once submitted it can never be valid again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerTransaction {
    source: Address,
    sequence: i64,
    fee: u32,
    window: TimeWindow,
    operations: Vec<Operation>,
    signatures: Vec<DecoratedSignature>,
}

impl InnerTransaction {
    pub fn new(
        source: Address,
        sequence: i64,
        fee: u32,
        window: TimeWindow,
        operations: Vec<Operation>,
    ) -> Self {
        Self {
            source,
            sequence,
            fee,
            window,
            operations,
            signatures: Vec::new(),
        }
    }

    pub fn source(&self) -> &Address {
        &self.source
    }

    pub fn sequence(&self) -> i64 {
        self.sequence
    }

    pub fn fee(&self) -> u32 {
        self.fee
    }

    pub fn window(&self) -> TimeWindow {
        self.window
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn signatures(&self) -> &[DecoratedSignature] {
        &self.signatures
    }

    pub fn to_xdr(&self) -> Result<xdr::Transaction> {
        let operations = self
            .operations
            .iter()
            .map(Operation::to_xdr)
            .collect::<Result<Vec<_>>>()?;

        Ok(xdr::Transaction {
            source_account: muxed_account(&self.source),
            fee: self.fee,
            seq_num: xdr::SequenceNumber(self.sequence),
            cond: xdr::Preconditions::Time(xdr::TimeBounds {
                min_time: xdr::TimePoint(self.window.min_time),
                max_time: xdr::TimePoint(self.window.max_time),
            }),
            memo: xdr::Memo::None,
            operations: operations.try_into().map_err(encoding_error)?,
            ext: xdr::TransactionExt::V0,
        })
    }

    fn to_envelope(&self) -> Result<xdr::TransactionV1Envelope> {
        let signatures = self
            .signatures
            .iter()
            .map(DecoratedSignature::to_xdr)
            .collect::<Result<Vec<_>>>()?;
        Ok(xdr::TransactionV1Envelope {
            tx: self.to_xdr()?,
            signatures: signatures.try_into().map_err(encoding_error)?,
        })
    }

    /// Hash the signers sign over
    pub fn hash(&self, network: &Network) -> Result<[u8; 32]> {
        self.to_xdr()?.hash(network.id()).map_err(encoding_error)
    }

    pub fn sign(&mut self, keypair: &KeyPair, network: &Network) -> Result<()> {
        let hash = self.hash(network)?;
        self.signatures.push(DecoratedSignature::create(keypair, &hash));
        Ok(())
    }

    pub fn is_signed_by(&self, address: &Address, network: &Network) -> bool {
        match self.hash(network) {
            Ok(hash) => signed_by(&self.signatures, address, &hash),
            Err(_) => false,
        }
    }
}

/// Fee-paying wrapper around a signed [`InnerTransaction`].
///
/// The sponsor is the fee source and the only signer of the wrapper; the
/// inner transaction and its signatures are carried unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SponsoredTransaction {
    fee_source: Address,
    fee_bid: i64,
    inner: InnerTransaction,
    signatures: Vec<DecoratedSignature>,
}

impl SponsoredTransaction {
    /// `fee_bid` is the per-operation bid in stroops
    pub fn new(fee_source: Address, fee_bid: i64, inner: InnerTransaction) -> Self {
        Self {
            fee_source,
            fee_bid,
            inner,
            signatures: Vec::new(),
        }
    }

    pub fn fee_source(&self) -> &Address {
        &self.fee_source
    }

    pub fn fee_bid(&self) -> i64 {
        self.fee_bid
    }

    /// Fee charged to the sponsor: the bid for every inner operation plus
    /// one for the wrapper itself.
    pub fn total_fee(&self) -> i64 {
        self.fee_bid
            .saturating_mul(self.inner.operations.len() as i64 + 1)
    }

    pub fn inner(&self) -> &InnerTransaction {
        &self.inner
    }

    pub fn signatures(&self) -> &[DecoratedSignature] {
        &self.signatures
    }

    pub fn to_xdr(&self) -> Result<xdr::FeeBumpTransaction> {
        Ok(xdr::FeeBumpTransaction {
            fee_source: muxed_account(&self.fee_source),
            fee: self.total_fee(),
            inner_tx: xdr::FeeBumpTransactionInnerTx::Tx(self.inner.to_envelope()?),
            ext: xdr::FeeBumpTransactionExt::V0,
        })
    }

    /// Hash identifying the submitted transaction on the ledger
    pub fn hash(&self, network: &Network) -> Result<[u8; 32]> {
        self.to_xdr()?.hash(network.id()).map_err(encoding_error)
    }

    pub fn sign(&mut self, keypair: &KeyPair, network: &Network) -> Result<()> {
        let hash = self.hash(network)?;
        self.signatures.push(DecoratedSignature::create(keypair, &hash));
        Ok(())
    }

    pub fn is_signed_by(&self, address: &Address, network: &Network) -> bool {
        match self.hash(network) {
            Ok(hash) => signed_by(&self.signatures, address, &hash),
            Err(_) => false,
        }
    }

    pub fn to_envelope(&self) -> Result<xdr::TransactionEnvelope> {
        let signatures = self
            .signatures
            .iter()
            .map(DecoratedSignature::to_xdr)
            .collect::<Result<Vec<_>>>()?;
        Ok(xdr::TransactionEnvelope::TxFeeBump(xdr::FeeBumpTransactionEnvelope {
            tx: self.to_xdr()?,
            signatures: signatures.try_into().map_err(encoding_error)?,
        }))
    }

    /// Base64 XDR envelope, the form the submission endpoint accepts
    pub fn to_envelope_base64(&self) -> Result<String> {
        let bytes = self
            .to_envelope()?
            .to_xdr(Limits::none())
            .map_err(encoding_error)?;
        Ok(BASE64.encode(bytes))
    }
}
