use std::future::Future;

use derive_new::new;
use ethers_core::types::{TransactionReceipt, H256, U64};
use futures_util::future::try_join_all;
use tokio::time::sleep;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};

use crate::{
    adapter::{apply_gas_margin, extract_result_identifier, FeeQuote, MintCall},
    error::MinterError,
    request::{MintOutcome, MintRequest, MISSING_RESULT_IDENTIFIER},
    transaction::{InFlightTransaction, TransactionStatus},
};

use super::super::{DispatcherState, NonceAllocator};
use super::utils::call_with_bounded_retries;

pub const STAGE_NAME: &str = "SubmissionStage";

/// Resets the `processing` flag when the drain loop ends, including by unwinding
struct ProcessingGuard<'a>(&'a DispatcherState);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.stop_processing();
    }
}

/// Drains the queue batch by batch, sending one transaction per request
#[derive(new)]
pub(crate) struct SubmissionStage {
    pub(crate) state: DispatcherState,
}

impl SubmissionStage {
    /// Runs until the queue is empty. Must only be spawned by the caller that
    /// claimed the `processing` flag.
    pub async fn drain(self) {
        loop {
            {
                let _guard = ProcessingGuard(&self.state);
                self.drain_queue().await;
            }
            // a request enqueued after the last pass found the flag still set
            if self.state.queue.is_empty().await || !self.state.try_start_processing() {
                return;
            }
            debug!("Requests arrived while the drain was stopping, resuming");
        }
    }

    #[instrument(skip(self), name = "SubmissionStage::drain_queue")]
    async fn drain_queue(&self) {
        loop {
            self.update_metrics().await;

            if let Err(err) = self.state.check_authority() {
                let pending = self.state.queue.take_all().await;
                error!(?err, pending = pending.len(), "Cannot mint, rejecting every queued request");
                self.state.reject_all(&pending, &err);
                return;
            }

            let batch = self.next_batch().await;
            if batch.is_empty() {
                if self.state.queue.is_empty().await {
                    return;
                }
                continue;
            }

            self.process_batch(batch).await;
            self.update_metrics().await;

            if self.state.queue.is_empty().await {
                return;
            }
            sleep(self.state.settings.inter_batch_delay()).await;
        }
    }

    /// Next batch, skipping requests that were completed while queued.
    /// That happens when a late confirmation beats the retry of a dropped transaction.
    async fn next_batch(&self) -> Vec<MintRequest> {
        let popped = self.state.queue.pop_n(self.state.settings.batch_size).await;
        popped
            .into_iter()
            .filter(|request| {
                let completed = request.completion.is_completed();
                if completed {
                    debug!(request = ?request.details, "Skipping completed request");
                }
                !completed
            })
            .collect()
    }

    #[instrument(skip_all, name = "SubmissionStage::process_batch", fields(batch_size = batch.len()))]
    async fn process_batch(&self, batch: Vec<MintRequest>) {
        info!(?batch, "Processing batch");
        self.state.metrics.update_batches_metric(&self.state.domain);

        // one quote for the whole batch: later items may pay a slightly stale fee
        let shared_fee = match self.shared_fee(&batch).await {
            Ok(fee) => fee,
            Err(err) => {
                error!(?err, "Failed to fetch fee estimate, rejecting batch");
                self.state.reject_all(&batch, &err);
                return;
            }
        };

        let uris = match self.publish_metadata(&batch).await {
            Ok(uris) => uris,
            Err(err) => {
                error!(?err, "Failed to publish metadata, rejecting batch");
                self.state.reject_all(&batch, &err);
                return;
            }
        };

        let base_nonce = self.state.nonces.current();
        let batch_len = batch.len();
        for (index, (request, metadata_uri)) in batch.into_iter().zip(uris).enumerate() {
            let nonce = match NonceAllocator::nonce_at(base_nonce, index) {
                Ok(nonce) => nonce,
                Err(err) => {
                    self.state.reject(&request, err);
                    continue;
                }
            };
            let fee = match (&request.fee_override, &shared_fee) {
                (Some(fee), _) | (None, Some(fee)) => fee.clone(),
                (None, None) => {
                    self.state
                        .reject(&request, MinterError::Other("No fee for request".to_string()));
                    continue;
                }
            };
            self.process_item(request, metadata_uri, nonce, fee).await;
        }

        // every slot of the batch is burnt, whether its item succeeded or not
        match self.state.nonces.advance(batch_len) {
            Ok(next) => self
                .state
                .metrics
                .update_next_nonce_metric(next, &self.state.domain),
            Err(err) => error!(?err, "Failed to advance nonce"),
        }
    }

    /// Fee estimate shared by the items of the batch without a fee override
    async fn shared_fee(&self, batch: &[MintRequest]) -> Result<Option<FeeQuote>, MinterError> {
        if batch.iter().all(|request| request.fee_override.is_some()) {
            return Ok(None);
        }
        let ledger = &self.state.ledger;
        let fee = call_with_bounded_retries(|| ledger.fee_estimate(), "fee_estimate", &self.state)
            .await?;
        self.state.metrics.update_fee_metrics(
            fee.max_fee,
            fee.max_priority_fee,
            &self.state.domain,
        );
        info!(?fee, "Fetched fee estimate for batch");
        Ok(Some(fee))
    }

    /// Publishes every document in parallel. Re-queued requests keep their uri.
    async fn publish_metadata(&self, batch: &[MintRequest]) -> Result<Vec<String>, MinterError> {
        let publisher = &self.state.publisher;
        let to_publish = batch
            .iter()
            .filter(|request| request.metadata_uri.is_none())
            .count();
        let uris = try_join_all(batch.iter().map(|request| async move {
            match &request.metadata_uri {
                Some(uri) => Ok(uri.clone()),
                None => publisher.publish(&request.metadata).await,
            }
        }))
        .await?;
        self.state
            .metrics
            .update_published_metadata_metric(to_publish, &self.state.domain);
        Ok(uris)
    }

    #[instrument(
        skip(self, request, fee),
        name = "SubmissionStage::process_item",
        fields(request = ?request.details, retry_count = request.retry_count)
    )]
    async fn process_item(
        &self,
        request: MintRequest,
        metadata_uri: String,
        nonce: u64,
        fee: FeeQuote,
    ) {
        let settings = &self.state.settings;
        let ledger = &self.state.ledger;
        let call = MintCall::new(settings.contract, request.details.to, metadata_uri.clone());

        let estimate = match call_with_bounded_retries(
            || ledger.estimate_gas(&call),
            "estimate_gas",
            &self.state,
        )
        .await
        {
            Ok(estimate) => estimate,
            Err(err) => {
                self.state.reject(&request, err);
                return;
            }
        };
        let gas_limit = apply_gas_margin(
            estimate,
            settings.gas_margin_numerator,
            settings.gas_margin_denominator,
        );

        let tx_hash = match ledger.submit(&call, nonce, gas_limit, &fee).await {
            Ok(tx_hash) => tx_hash,
            Err(err) => {
                self.state.reject(&request, err);
                return;
            }
        };
        info!(?tx_hash, ?gas_limit, ?fee, "Sent mint transaction");
        self.state
            .metrics
            .update_transaction_submissions_metric(&self.state.domain);

        let tx = InFlightTransaction::new(nonce, tx_hash, request.clone(), metadata_uri.clone(), fee);
        let superseded = tx.superseded.clone();
        {
            let mut pool = self.state.pool.lock().await;
            if let Some(previous) = pool.insert(nonce, tx) {
                // nonces are never handed out twice, so this is a bookkeeping bug
                error!(?previous, "Replaced an in-flight transaction with the same nonce");
            }
            self.state
                .metrics
                .update_in_flight_pool_length_metric(pool.len(), &self.state.domain);
        }

        let ledger = self.state.ledger.clone();
        let mut confirmation = Box::pin(async move { ledger.await_confirmation(tx_hash).await });
        let confirmed = tokio::select! {
            biased;
            result = &mut confirmation => Some(result),
            _ = superseded.cancelled() => None,
        };
        let Some(confirmation_result) = confirmed else {
            // the retry now owns the request, the original may still land first
            info!(?tx_hash, "Transaction was taken over by the monitor, awaiting it in the background");
            let stage = SubmissionStage::new(self.state.clone());
            tokio::spawn(
                stage
                    .await_superseded(request, tx_hash, metadata_uri, confirmation)
                    .instrument(info_span!("SubmissionStage::await_superseded", ?tx_hash)),
            );
            return;
        };

        {
            let mut pool = self.state.pool.lock().await;
            if let Some(mut tracked) = pool.remove(&nonce) {
                tracked.status = TransactionStatus::Confirmed;
                debug!(?tracked, elapsed = ?tracked.sent_at.elapsed(), "Stopped tracking transaction");
            }
            self.state
                .metrics
                .update_in_flight_pool_length_metric(pool.len(), &self.state.domain);
        }

        match confirmation_result {
            Ok(receipt) => self.handle_receipt(&request, tx_hash, metadata_uri, receipt),
            Err(err) => self.state.reject(&request, err),
        }
    }

    /// Keeps waiting for a transaction the monitor re-queued. A successful
    /// confirmation resolves the request unless its retry completed it first.
    /// Failures are left to the retry.
    async fn await_superseded<F>(
        self,
        request: MintRequest,
        tx_hash: H256,
        metadata_uri: String,
        confirmation: F,
    ) where
        F: Future<Output = Result<TransactionReceipt, MinterError>>,
    {
        match confirmation.await {
            Ok(receipt) if receipt.status != Some(U64::zero()) => {
                info!(?tx_hash, "Superseded transaction confirmed");
                self.handle_receipt(&request, tx_hash, metadata_uri, receipt);
            }
            Ok(_) => warn!(?tx_hash, "Superseded transaction reverted"),
            Err(err) => warn!(?err, ?tx_hash, "Failed to confirm superseded transaction"),
        }
    }

    fn handle_receipt(
        &self,
        request: &MintRequest,
        tx_hash: H256,
        metadata_uri: String,
        receipt: TransactionReceipt,
    ) {
        if receipt.status == Some(U64::zero()) {
            self.state.reject(request, MinterError::TxReverted(tx_hash));
            return;
        }
        self.state
            .metrics
            .update_confirmed_transactions_metric(&self.state.domain);

        let result_identifier = extract_result_identifier(&receipt, self.state.settings.contract)
            .unwrap_or_else(|| {
                warn!(?tx_hash, "No transfer event in receipt, using placeholder identifier");
                MISSING_RESULT_IDENTIFIER.to_string()
            });
        let outcome = MintOutcome {
            transaction_hash: tx_hash,
            metadata_uri,
            result_identifier,
            block_number: receipt.block_number.map(|n| n.as_u64()).unwrap_or_default(),
        };
        self.state.resolve(request, outcome);
    }

    async fn update_metrics(&self) {
        self.state
            .metrics
            .update_liveness_metric(STAGE_NAME, &self.state.domain);
        let length = self.state.queue.len().await;
        self.state
            .metrics
            .update_queue_length_metric(STAGE_NAME, length, &self.state.domain);
    }
}
