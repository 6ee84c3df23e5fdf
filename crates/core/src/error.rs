use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid balance id: {0}")]
    InvalidBalanceId(String),

    #[error("Invalid transaction hash: {0}")]
    InvalidHash(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
