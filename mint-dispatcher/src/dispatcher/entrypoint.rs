use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use ethers_core::types::Address;
use tokio::sync::{oneshot, OnceCell};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, instrument, Instrument};

use crate::{
    adapter::Ledger,
    error::MinterError,
    publisher::MetadataPublisher,
    request::{Completion, MintMetadata, MintOutcome, MintRequest, RequestUuid},
};

use super::{
    stages::{call_with_bounded_retries, MonitorStage},
    state::AuthorityState,
    DispatcherMetrics, DispatcherSettings, DispatcherState,
};

#[async_trait]
pub trait Entrypoint {
    /// Queue a mint and wait for it to be confirmed or rejected
    async fn submit_mint(
        &self,
        metadata: MintMetadata,
        to: Address,
    ) -> Result<MintOutcome, MinterError>;

    /// Queue a mint, returning as soon as it is queued
    async fn enqueue(&self, metadata: MintMetadata, to: Address) -> PendingMint;
}

/// Outcome of a queued mint. Resolves exactly once.
#[derive(Debug)]
pub struct PendingMint {
    uuid: RequestUuid,
    receiver: oneshot::Receiver<Result<MintOutcome, MinterError>>,
}

impl PendingMint {
    pub fn uuid(&self) -> &RequestUuid {
        &self.uuid
    }
}

impl Future for PendingMint {
    type Output = Result<MintOutcome, MinterError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(MinterError::ChannelClosed)))
    }
}

/// Batches mint requests of a single signing account.
///
/// Construct one per account and share it behind an `Arc`. Nothing is sent
/// before `initialize` has verified the signer may mint.
pub struct MintDispatcher {
    pub(crate) inner: DispatcherState,
    initialized: OnceCell<()>,
    monitor_cancel: CancellationToken,
}

impl MintDispatcher {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        publisher: Arc<dyn MetadataPublisher>,
        settings: DispatcherSettings,
        metrics: DispatcherMetrics,
    ) -> eyre::Result<Self> {
        settings.validate()?;
        Ok(Self {
            inner: DispatcherState::new(ledger, publisher, settings, metrics),
            initialized: OnceCell::new(),
            monitor_cancel: CancellationToken::new(),
        })
    }

    /// Verifies minting authority, seeds the nonce from the node and starts
    /// the monitor. Runs once; later calls return immediately after success.
    /// A failed attempt is not cached, so it may be retried.
    pub async fn initialize(&self) -> Result<(), MinterError> {
        self.initialized
            .get_or_try_init(|| self.run_initialization())
            .await
            .map(|_| ())
    }

    #[instrument(skip(self), name = "MintDispatcher::initialize", fields(domain = %self.inner.domain))]
    async fn run_initialization(&self) -> Result<(), MinterError> {
        let state = &self.inner;
        let ledger = &state.ledger;
        let signer = ledger.signer();

        let authorized = call_with_bounded_retries(
            || ledger.has_mint_authority(signer),
            "has_mint_authority",
            state,
        )
        .await?;
        if !authorized {
            error!(?signer, "Signer has no mint authority");
            state.set_authority(AuthorityState::Missing(signer));
            // requests queued before initialization are rejected right away
            state.start_drain();
            return Err(MinterError::MissingMintAuthority(signer));
        }

        let sequence = call_with_bounded_retries(
            || ledger.account_sequence(signer),
            "account_sequence",
            state,
        )
        .await?;
        state.nonces.reset(sequence);
        state
            .metrics
            .update_next_nonce_metric(sequence, &state.domain);

        let blocks = ledger.subscribe_blocks().await?;
        let monitor = MonitorStage::new(state.clone());
        tokio::spawn(
            monitor
                .run(blocks, self.monitor_cancel.clone())
                .instrument(info_span!("MonitorStage::run")),
        );

        state.set_authority(AuthorityState::Verified);
        info!(?signer, next_nonce = sequence, "Dispatcher initialized");
        state.start_drain();
        Ok(())
    }

    /// Stops the monitor. Queued requests are still drained.
    pub fn shutdown(&self) {
        info!("Shutting down dispatcher monitor");
        self.monitor_cancel.cancel();
    }

    pub async fn queue_len(&self) -> usize {
        self.inner.queue.len().await
    }

    pub async fn in_flight_len(&self) -> usize {
        self.inner.pool.lock().await.len()
    }

    pub fn next_nonce(&self) -> u64 {
        self.inner.nonces.current()
    }

    pub fn is_processing(&self) -> bool {
        self.inner.is_processing()
    }
}

#[async_trait]
impl Entrypoint for MintDispatcher {
    async fn submit_mint(
        &self,
        metadata: MintMetadata,
        to: Address,
    ) -> Result<MintOutcome, MinterError> {
        self.enqueue(metadata, to).await.await
    }

    async fn enqueue(&self, metadata: MintMetadata, to: Address) -> PendingMint {
        let (completion, receiver) = Completion::new();
        let request = MintRequest::new(metadata, to, completion);
        let uuid = request.uuid().clone();
        info!(request = ?request.details, "Queueing mint request");
        self.inner.queue.push_back(request).await;
        self.inner.start_drain();
        PendingMint { uuid, receiver }
    }
}

impl Drop for MintDispatcher {
    fn drop(&mut self) {
        self.monitor_cancel.cancel();
    }
}
