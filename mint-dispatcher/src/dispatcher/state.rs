use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ethers_core::types::Address;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::{
    adapter::Ledger,
    error::MinterError,
    publisher::MetadataPublisher,
    request::{MintOutcome, MintRequest},
    transaction::InFlightTransaction,
};

use super::{
    stages::{RequestQueue, SubmissionStage},
    DispatcherMetrics, DispatcherSettings, NonceAllocator,
};

/// Transactions sent and not yet confirmed, keyed by nonce
pub(crate) type InFlightPool = Arc<Mutex<BTreeMap<u64, InFlightTransaction>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AuthorityState {
    Unverified,
    Verified,
    Missing(Address),
}

/// State shared by the entrypoint and every stage of one dispatcher
#[derive(Clone)]
pub(crate) struct DispatcherState {
    pub(crate) ledger: Arc<dyn Ledger>,
    pub(crate) publisher: Arc<dyn MetadataPublisher>,
    pub(crate) settings: Arc<DispatcherSettings>,
    pub(crate) metrics: DispatcherMetrics,
    pub(crate) domain: String,
    pub(crate) queue: RequestQueue,
    pub(crate) pool: InFlightPool,
    pub(crate) nonces: NonceAllocator,
    processing: Arc<AtomicBool>,
    authority: Arc<RwLock<AuthorityState>>,
}

impl DispatcherState {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        publisher: Arc<dyn MetadataPublisher>,
        settings: DispatcherSettings,
        metrics: DispatcherMetrics,
    ) -> Self {
        let domain = settings.domain.clone();
        Self {
            ledger,
            publisher,
            settings: Arc::new(settings),
            metrics,
            domain,
            queue: RequestQueue::new(),
            pool: Arc::new(Mutex::new(BTreeMap::new())),
            nonces: NonceAllocator::new(0),
            processing: Arc::new(AtomicBool::new(false)),
            authority: Arc::new(RwLock::new(AuthorityState::Unverified)),
        }
    }

    pub fn set_authority(&self, authority: AuthorityState) {
        *self.authority.write() = authority;
    }

    /// Fails unless initialization verified that the signer may mint
    pub fn check_authority(&self) -> Result<(), MinterError> {
        match *self.authority.read() {
            AuthorityState::Verified => Ok(()),
            AuthorityState::Unverified => Err(MinterError::NotInitialized),
            AuthorityState::Missing(signer) => Err(MinterError::MissingMintAuthority(signer)),
        }
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    /// Claims the drain loop. Returns `false` if a drain is already active.
    pub(crate) fn try_start_processing(&self) -> bool {
        self.processing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn stop_processing(&self) {
        self.processing.store(false, Ordering::Release);
    }

    /// Spawns a drain loop unless one is already running
    pub fn start_drain(&self) {
        if !self.try_start_processing() {
            debug!("Drain already active");
            return;
        }
        let stage = SubmissionStage::new(self.clone());
        tokio::spawn(stage.drain().instrument(info_span!("SubmissionStage::drain")));
    }

    /// Resolves the request unless it was completed before
    pub fn resolve(&self, request: &MintRequest, outcome: MintOutcome) {
        let tx_hash = outcome.transaction_hash;
        if request.completion.complete(Ok(outcome)) {
            info!(request = ?request.details, ?tx_hash, "Mint request resolved");
        } else {
            debug!(request = ?request.details, "Mint request already completed");
        }
    }

    /// Rejects the request unless it was completed before
    pub fn reject(&self, request: &MintRequest, err: MinterError) {
        let reason = err.to_metrics_label();
        if request.completion.complete(Err(err.clone())) {
            warn!(request = ?request.details, ?err, "Mint request rejected");
            self.metrics
                .update_rejected_requests_metric(&reason, &self.domain);
        } else {
            debug!(request = ?request.details, ?err, "Mint request already completed");
        }
    }

    pub fn reject_all<'a, I>(&self, requests: I, err: &MinterError)
    where
        I: IntoIterator<Item = &'a MintRequest>,
    {
        for request in requests {
            self.reject(request, err.clone());
        }
    }
}
