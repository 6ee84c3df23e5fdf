use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use stellar_strkey::ed25519::PublicKey as StrkeyPublicKey;

use crate::{CoreError, Result, STROOPS_PER_PI};

/// 32-byte ed25519 public key
pub type PublicKey = [u8; 32];

/// Account address on the ledger (`G...` StrKey form).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(PublicKey);

impl Address {
    pub fn from_public_key(bytes: PublicKey) -> Self {
        Self(bytes)
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.0
    }

    /// First characters of the address, enough to tell accounts apart in logs
    pub fn short(&self) -> String {
        let full = self.to_string();
        format!("{}...{}", &full[..6], &full[full.len() - 4..])
    }
}

impl FromStr for Address {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        StrkeyPublicKey::from_string(s.trim())
            .map(|pk| Self(pk.0))
            .map_err(|e| CoreError::InvalidAddress(format!("{}: {}", s, e)))
    }
}

impl TryFrom<String> for Address {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.to_string()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&StrkeyPublicKey(self.0).to_string())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

/// Native amount in stroops (1 Pi = 10^7 stroops).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub fn from_stroops(stroops: i64) -> Self {
        Self(stroops)
    }

    pub fn stroops(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl FromStr for Amount {
    type Err = CoreError;

    /// Parse a decimal amount as the ledger API renders it (`"100.0000000"`).
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || CoreError::InvalidAmount(s.to_string());
        let trimmed = s.trim();
        let (whole, frac) = trimmed.split_once('.').unwrap_or((trimmed, ""));

        if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if frac.len() > 7 || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let whole: i64 = whole.parse().map_err(|_| invalid())?;
        let frac: i64 = if frac.is_empty() {
            0
        } else {
            format!("{:0<7}", frac).parse().map_err(|_| invalid())?
        };

        whole
            .checked_mul(STROOPS_PER_PI)
            .and_then(|w| w.checked_add(frac))
            .map(Amount)
            .ok_or_else(invalid)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / STROOPS_PER_PI;
        let frac = (self.0 % STROOPS_PER_PI).abs();
        if frac == 0 {
            write!(f, "{}", whole)
        } else {
            let digits = format!("{:07}", frac);
            write!(f, "{}.{}", whole, digits.trim_end_matches('0'))
        }
    }
}

/// Claimable balance identifier as hex (`00000000` type tag + 32-byte hash).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BalanceId(String);

impl BalanceId {
    /// Length in bytes of the encoded identifier (type tag + hash)
    pub const ENCODED_LEN: usize = 36;

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Raw encoded bytes (type tag followed by the balance hash)
    pub fn to_bytes(&self) -> Vec<u8> {
        // Validated on construction
        hex::decode(&self.0).unwrap_or_default()
    }

    pub fn short(&self) -> &str {
        &self.0[..15.min(self.0.len())]
    }
}

impl FromStr for BalanceId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase();
        let bytes = hex::decode(&normalized)
            .map_err(|e| CoreError::InvalidBalanceId(format!("{}: {}", s, e)))?;
        if bytes.len() != Self::ENCODED_LEN {
            return Err(CoreError::InvalidBalanceId(format!(
                "{}: expected {} bytes, got {}",
                s,
                Self::ENCODED_LEN,
                bytes.len()
            )));
        }
        Ok(Self(normalized))
    }
}

impl TryFrom<String> for BalanceId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<BalanceId> for String {
    fn from(id: BalanceId) -> Self {
        id.0
    }
}

impl fmt::Display for BalanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hash of a submitted transaction
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxHash(pub [u8; 32]);

impl TxHash {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn short(&self) -> String {
        self.to_hex()[..15].to_string()
    }
}

impl FromStr for TxHash {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s.trim(), &mut bytes)
            .map_err(|e| CoreError::InvalidHash(format!("{}: {}", s, e)))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({})", self.to_hex())
    }
}
