use std::time::Instant;

use ethers_core::types::H256;
use tokio_util::sync::CancellationToken;

use crate::adapter::FeeQuote;
use crate::request::MintRequest;

/// Lifecycle of a submitted mint transaction, logged with every state change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TransactionStatus {
    /// accepted by the node, confirmation pending
    Sent,
    /// included in a block, the caller was resolved
    Confirmed,
    /// not known to the node anymore, re-queued with a boosted fee
    DroppedRetried,
    /// not known to the node anymore and out of retries, the caller was rejected
    DroppedExhausted,
}

/// A transaction sent but not yet confirmed. Keyed by nonce in the in-flight pool.
pub(crate) struct InFlightTransaction {
    pub nonce: u64,
    pub tx_hash: H256,
    pub request: MintRequest,
    pub metadata_uri: String,
    pub fee: FeeQuote,
    pub status: TransactionStatus,
    pub sent_at: Instant,
    /// cancelled once the monitor takes this nonce over. The submission stage
    /// then moves on and keeps waiting for this transaction in the background.
    pub superseded: CancellationToken,
}

impl std::fmt::Debug for InFlightTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InFlightTransaction")
            .field("nonce", &self.nonce)
            .field("tx_hash", &self.tx_hash)
            .field("request", &self.request.details)
            .field("retry_count", &self.request.retry_count)
            .field("fee", &self.fee)
            .field("status", &self.status)
            .finish()
    }
}

impl InFlightTransaction {
    pub fn new(
        nonce: u64,
        tx_hash: H256,
        request: MintRequest,
        metadata_uri: String,
        fee: FeeQuote,
    ) -> Self {
        Self {
            nonce,
            tx_hash,
            request,
            metadata_uri,
            fee,
            status: TransactionStatus::Sent,
            sent_at: Instant::now(),
            superseded: CancellationToken::new(),
        }
    }

    pub fn retry_count(&self) -> u32 {
        self.request.retry_count
    }
}
