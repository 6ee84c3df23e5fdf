//! Ledger constants

/// Passphrase identifying the Pi mainnet. Hashed into every signature payload.
pub const PI_NETWORK_PASSPHRASE: &str = "Pi Network";

/// Public Horizon-compatible gateway used when no endpoint is configured.
pub const DEFAULT_HORIZON_URL: &str = "https://apimainnet.vercel.app";

/// Block explorer prefix; the transaction hash is appended.
pub const DEFAULT_EXPLORER_TX_URL: &str = "https://blockexplorer.minepi.com/mainnet/transactions/";

/// SLIP-44 coin type registered for Pi.
pub const PI_COIN_TYPE: u32 = 314159;

/// Hardened derivation path `m/44'/314159'/0'`.
pub const PI_DERIVATION_PATH: [u32; 3] = [44, PI_COIN_TYPE, 0];

/// Smallest unit per whole Pi (seven decimal places).
pub const STROOPS_PER_PI: i64 = 10_000_000;

/// Minimum per-operation fee the network accepts, in stroops.
pub const MIN_BASE_FEE: u32 = 100;
