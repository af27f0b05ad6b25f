use derive_new::new;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::{
    adapter::{boost_fee, BlockStream},
    error::MinterError,
    transaction::TransactionStatus,
};

use super::super::DispatcherState;
use super::utils::call_with_bounded_retries;

pub const STAGE_NAME: &str = "MonitorStage";

/// Watches in-flight transactions on every new block and re-queues the ones
/// the node no longer knows about
#[derive(new)]
pub(crate) struct MonitorStage {
    pub(crate) state: DispatcherState,
}

impl MonitorStage {
    pub async fn run(self, mut blocks: BlockStream, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Monitor stopped");
                    return;
                }
                block = blocks.next() => match block {
                    Some(block) => self.on_new_block(block).await,
                    None => {
                        warn!("Block subscription ended, dropped transactions will no longer be retried");
                        return;
                    }
                }
            }
        }
    }

    #[instrument(skip(self), name = "MonitorStage::on_new_block")]
    pub(crate) async fn on_new_block(&self, block: u64) {
        let domain = &self.state.domain;
        self.state
            .metrics
            .update_liveness_metric(STAGE_NAME, domain);

        let nonces: Vec<u64> = self.state.pool.lock().await.keys().copied().collect();
        for nonce in nonces {
            let ledger = &self.state.ledger;
            match call_with_bounded_retries(
                || ledger.transaction_by_nonce(nonce),
                "transaction_by_nonce",
                &self.state,
            )
            .await
            {
                Ok(Some(_)) => {}
                Ok(None) => self.handle_dropped(nonce).await,
                // the nonce is checked again on the next block
                Err(err) => warn!(?err, nonce, "Failed to look up transaction by nonce"),
            }
        }

        let length = self.state.pool.lock().await.len();
        self.state
            .metrics
            .update_queue_length_metric(STAGE_NAME, length, domain);
    }

    async fn handle_dropped(&self, nonce: u64) {
        let Some(mut tx) = self.state.pool.lock().await.remove(&nonce) else {
            // confirmed since the pool was read
            return;
        };
        // on return, releases the submission stage, which keeps awaiting `tx` in the background
        let _release = tx.superseded.clone().drop_guard();

        if tx.request.completion.is_completed() {
            return;
        }

        let settings = &self.state.settings;
        let domain = &self.state.domain;
        if tx.retry_count() < settings.max_retries {
            tx.status = TransactionStatus::DroppedRetried;
            warn!(?tx, "Transaction dropped, re-queueing with a boosted fee");
            let boosted = boost_fee(
                &tx.fee,
                settings.fee_boost_numerator,
                settings.fee_boost_denominator,
            );
            let retry = tx.request.into_retry(boosted, tx.metadata_uri);
            self.state.queue.push_front(retry).await;
            self.state
                .metrics
                .update_dropped_transactions_metric("retried", domain);
            self.state.start_drain();
        } else {
            tx.status = TransactionStatus::DroppedExhausted;
            warn!(?tx, "Transaction dropped and out of retries");
            self.state
                .metrics
                .update_dropped_transactions_metric("exhausted", domain);
            let err = MinterError::RetriesExhausted {
                nonce,
                attempts: tx.retry_count().saturating_add(1),
            };
            self.state.reject(&tx.request, err);
        }
    }
}
