use std::time::UNIX_EPOCH;

use ethers_core::types::U256;
use prometheus::{
    opts, register_int_counter_vec_with_registry, register_int_gauge_vec_with_registry, Encoder,
    IntCounterVec, IntGaugeVec, Registry,
};

use super::stages::{monitor_stage, submission_stage};

const METRICS_NAMESPACE: &str = "mint_dispatcher";

fn namespaced(name: &str) -> String {
    format!("{}_{}", METRICS_NAMESPACE, name)
}

fn clamp_to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Metrics of a dispatcher, labelled by the domain it mints on
#[derive(Clone)]
pub struct DispatcherMetrics {
    /// Metrics registry for adding new metrics and gathering reports
    registry: Registry,
    // with a label for the stage, "submission" or "monitor"
    pub task_liveness: IntGaugeVec,

    pub queue_length: IntGaugeVec,
    pub in_flight_pool_length: IntGaugeVec,

    pub published_metadata: IntCounterVec,
    pub transaction_submissions: IntCounterVec,
    pub confirmed_transactions: IntCounterVec,
    pub dropped_transactions: IntCounterVec,
    // with a label for the error the request was rejected with
    pub rejected_requests: IntCounterVec,
    pub batches: IntCounterVec,

    // includes a label for the error causing the retry, and a label for the type of call
    pub call_retries: IntCounterVec,

    // max fee per gas of the latest batch
    pub gas_price: IntGaugeVec,
    pub priority_fee: IntGaugeVec,
    /// next nonce handed out to a transaction
    pub next_nonce: IntGaugeVec,
}

impl DispatcherMetrics {
    pub fn new(registry: Registry) -> eyre::Result<Self> {
        let task_liveness = register_int_gauge_vec_with_registry!(
            opts!(
                namespaced("task_liveness"),
                "The liveness of the dispatcher tasks, expressed as a timestamp since the epoch",
            ),
            &["domain", "stage",],
            registry.clone()
        )?;
        let queue_length = register_int_gauge_vec_with_registry!(
            opts!(
                namespaced("queue_length"),
                "The number of mint requests waiting to be batched",
            ),
            &["domain",],
            registry.clone()
        )?;
        let in_flight_pool_length = register_int_gauge_vec_with_registry!(
            opts!(
                namespaced("in_flight_pool_length"),
                "The number of sent transactions awaiting confirmation",
            ),
            &["domain",],
            registry.clone()
        )?;
        let published_metadata = register_int_counter_vec_with_registry!(
            opts!(
                namespaced("published_metadata"),
                "The number of metadata documents published",
            ),
            &["domain",],
            registry.clone()
        )?;
        let transaction_submissions = register_int_counter_vec_with_registry!(
            opts!(
                namespaced("transaction_submissions"),
                "The number of mint transactions sent",
            ),
            &["domain",],
            registry.clone()
        )?;
        let confirmed_transactions = register_int_counter_vec_with_registry!(
            opts!(
                namespaced("confirmed_transactions"),
                "The number of mint transactions included in a block",
            ),
            &["domain",],
            registry.clone()
        )?;
        let dropped_transactions = register_int_counter_vec_with_registry!(
            opts!(
                namespaced("dropped_transactions"),
                "The number of transactions the node no longer knew about",
            ),
            &["domain", "outcome",],
            registry.clone()
        )?;
        let rejected_requests = register_int_counter_vec_with_registry!(
            opts!(
                namespaced("rejected_requests"),
                "The number of mint requests rejected",
            ),
            &["domain", "reason",],
            registry.clone()
        )?;
        let batches = register_int_counter_vec_with_registry!(
            opts!(namespaced("batches"), "The number of batches processed",),
            &["domain",],
            registry.clone()
        )?;
        let call_retries = register_int_counter_vec_with_registry!(
            opts!(
                namespaced("call_retries"),
                "The number of times a call was retried",
            ),
            &["domain", "error_type", "call_type",],
            registry.clone()
        )?;
        let gas_price = register_int_gauge_vec_with_registry!(
            opts!(
                namespaced("gas_price"),
                "The max fee per gas of the latest batch",
            ),
            &["domain",],
            registry.clone()
        )?;
        let priority_fee = register_int_gauge_vec_with_registry!(
            opts!(
                namespaced("priority_fee"),
                "The max priority fee per gas of the latest batch",
            ),
            &["domain",],
            registry.clone()
        )?;
        let next_nonce = register_int_gauge_vec_with_registry!(
            opts!(
                namespaced("next_nonce"),
                "The nonce the next transaction will be sent with",
            ),
            &["domain",],
            registry.clone()
        )?;
        Ok(Self {
            registry: registry.clone(),
            task_liveness,
            queue_length,
            in_flight_pool_length,
            published_metadata,
            transaction_submissions,
            confirmed_transactions,
            dropped_transactions,
            rejected_requests,
            batches,
            call_retries,
            gas_price,
            priority_fee,
            next_nonce,
        })
    }

    pub fn update_liveness_metric(&self, stage: &str, domain: &str) {
        self.task_liveness.with_label_values(&[domain, stage]).set(
            UNIX_EPOCH
                .elapsed()
                .map(|d| clamp_to_i64(d.as_secs()))
                .unwrap_or(0),
        );
    }

    pub fn update_queue_length_metric(&self, stage: &str, length: usize, domain: &str) {
        match stage {
            submission_stage::STAGE_NAME => self
                .queue_length
                .with_label_values(&[domain])
                .set(clamp_to_i64(length as u64)),
            monitor_stage::STAGE_NAME => self.update_in_flight_pool_length_metric(length, domain),
            _ => {}
        }
    }

    pub fn update_in_flight_pool_length_metric(&self, length: usize, domain: &str) {
        self.in_flight_pool_length
            .with_label_values(&[domain])
            .set(clamp_to_i64(length as u64));
    }

    pub fn update_published_metadata_metric(&self, count: usize, domain: &str) {
        self.published_metadata
            .with_label_values(&[domain])
            .inc_by(count as u64);
    }

    pub fn update_transaction_submissions_metric(&self, domain: &str) {
        self.transaction_submissions
            .with_label_values(&[domain])
            .inc();
    }

    pub fn update_confirmed_transactions_metric(&self, domain: &str) {
        self.confirmed_transactions
            .with_label_values(&[domain])
            .inc();
    }

    pub fn update_dropped_transactions_metric(&self, outcome: &str, domain: &str) {
        self.dropped_transactions
            .with_label_values(&[domain, outcome])
            .inc();
    }

    pub fn update_rejected_requests_metric(&self, reason: &str, domain: &str) {
        self.rejected_requests
            .with_label_values(&[domain, reason])
            .inc();
    }

    pub fn update_batches_metric(&self, domain: &str) {
        self.batches.with_label_values(&[domain]).inc();
    }

    pub fn update_call_retries_metric(&self, error_type: &str, call_type: &str, domain: &str) {
        self.call_retries
            .with_label_values(&[domain, error_type, call_type])
            .inc();
    }

    pub fn update_fee_metrics(&self, max_fee: U256, max_priority_fee: U256, domain: &str) {
        // fees above i64::MAX wei per gas are not meaningful on any chain we mint on
        let to_gauge = |value: U256| clamp_to_i64(value.try_into().unwrap_or(u64::MAX));
        self.gas_price
            .with_label_values(&[domain])
            .set(to_gauge(max_fee));
        self.priority_fee
            .with_label_values(&[domain])
            .set(to_gauge(max_priority_fee));
    }

    pub fn update_next_nonce_metric(&self, nonce: u64, domain: &str) {
        self.next_nonce
            .with_label_values(&[domain])
            .set(clamp_to_i64(nonce));
    }

    pub fn gather(&self) -> prometheus::Result<Vec<u8>> {
        let collected_metrics = self.registry.gather();
        let mut out_buf = Vec::with_capacity(1024 * 64);
        let encoder = prometheus::TextEncoder::new();
        encoder.encode(&collected_metrics, &mut out_buf)?;
        Ok(out_buf)
    }

    #[cfg(test)]
    pub fn dummy_instance() -> Self {
        let registry = Registry::new();
        let instance = Self::new(registry.clone());
        instance.unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gathers_namespaced_metrics() {
        let metrics = DispatcherMetrics::dummy_instance();
        metrics.update_queue_length_metric(submission_stage::STAGE_NAME, 3, "test");
        metrics.update_next_nonce_metric(7, "test");
        metrics.update_rejected_requests_metric("TxReverted", "test");

        let text = String::from_utf8(metrics.gather().unwrap()).unwrap();

        assert!(text.contains("mint_dispatcher_queue_length{domain=\"test\"} 3"));
        assert!(text.contains("mint_dispatcher_next_nonce{domain=\"test\"} 7"));
        assert!(text.contains("reason=\"TxReverted\""));
    }

    #[test]
    fn huge_fees_are_clamped() {
        let metrics = DispatcherMetrics::dummy_instance();
        metrics.update_fee_metrics(U256::MAX, U256::from(5), "test");

        assert_eq!(
            metrics.gas_price.with_label_values(&["test"]).get(),
            i64::MAX
        );
        assert_eq!(metrics.priority_fee.with_label_values(&["test"]).get(), 5);
    }
}
