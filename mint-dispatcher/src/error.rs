use ethers_core::types::{Address, H256};

/// Errors surfaced to the callers of the dispatcher.
///
/// Foreign errors are flattened into strings so that a single failure can be
/// cloned and delivered to every request of the batch it affected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MinterError {
    #[error("Dispatcher has not been initialized")]
    NotInitialized,
    #[error("Signer {0:?} is not allowed to mint on the configured contract")]
    MissingMintAuthority(Address),
    #[error("Failed to publish metadata: {0}")]
    PublishFailed(String),
    #[error("Failed to fetch fee estimate: {0}")]
    FeeEstimationFailed(String),
    #[error("Gas estimation failed: {0}")]
    GasEstimationFailed(String),
    #[error("Transaction error: {0}")]
    TxSubmissionError(String),
    #[error("Failed to confirm transaction: {0}")]
    ConfirmationFailed(String),
    #[error("The transaction {0:?} reverted")]
    TxReverted(H256),
    #[error("Transaction with nonce {nonce} was dropped {attempts} times, giving up")]
    RetriesExhausted { nonce: u64, attempts: u32 },
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Nonce arithmetic overflowed")]
    NonceOverflow,
    #[error("Channel closed")]
    ChannelClosed,
    #[error("{0}")]
    Other(String),
}

impl From<eyre::Report> for MinterError {
    fn from(err: eyre::Report) -> Self {
        MinterError::Other(format!("{err:?}"))
    }
}

impl From<reqwest::Error> for MinterError {
    fn from(err: reqwest::Error) -> Self {
        MinterError::NetworkError(err.to_string())
    }
}

pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for MinterError {
    fn is_retryable(&self) -> bool {
        match self {
            MinterError::NetworkError(_) | MinterError::FeeEstimationFailed(_) => true,
            MinterError::NotInitialized
            | MinterError::MissingMintAuthority(_)
            | MinterError::PublishFailed(_)
            | MinterError::GasEstimationFailed(_)
            | MinterError::TxSubmissionError(_)
            | MinterError::ConfirmationFailed(_)
            | MinterError::TxReverted(_)
            | MinterError::RetriesExhausted { .. }
            | MinterError::NonceOverflow
            | MinterError::ChannelClosed
            | MinterError::Other(_) => false,
        }
    }
}

impl MinterError {
    pub fn to_metrics_label(&self) -> String {
        match self {
            MinterError::NotInitialized => "NotInitialized",
            MinterError::MissingMintAuthority(_) => "MissingMintAuthority",
            MinterError::PublishFailed(_) => "PublishFailed",
            MinterError::FeeEstimationFailed(_) => "FeeEstimationFailed",
            MinterError::GasEstimationFailed(_) => "GasEstimationFailed",
            MinterError::TxSubmissionError(_) => "TxSubmissionError",
            MinterError::ConfirmationFailed(_) => "ConfirmationFailed",
            MinterError::TxReverted(_) => "TxReverted",
            MinterError::RetriesExhausted { .. } => "RetriesExhausted",
            MinterError::NetworkError(_) => "NetworkError",
            MinterError::NonceOverflow => "NonceOverflow",
            MinterError::ChannelClosed => "ChannelClosed",
            MinterError::Other(_) => "Other",
        }
        .to_string()
    }
}
