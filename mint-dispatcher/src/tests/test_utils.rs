use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers_core::types::{Address, TransactionReceipt, H256, U256, U64};
use futures_util::StreamExt;
use mockall::mock;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::{
    adapter::{transfer_log, BlockStream, FeeQuote, Ledger, MintCall},
    dispatcher::{DispatcherMetrics, DispatcherSettings, MintDispatcher},
    error::MinterError,
    publisher::MetadataPublisher,
    request::MintMetadata,
};

pub const CONTRACT: Address = Address::repeat_byte(0xc0);
pub const SIGNER: Address = Address::repeat_byte(0x51);

mock! {
    pub Node {}

    #[async_trait]
    impl Ledger for Node {
        fn signer(&self) -> Address;
        async fn has_mint_authority(&self, signer: Address) -> Result<bool, MinterError>;
        async fn fee_estimate(&self) -> Result<FeeQuote, MinterError>;
        async fn account_sequence(&self, address: Address) -> Result<u64, MinterError>;
        async fn estimate_gas(&self, call: &MintCall) -> Result<U256, MinterError>;
        async fn submit(
            &self,
            call: &MintCall,
            nonce: u64,
            gas_limit: U256,
            fee: &FeeQuote,
        ) -> Result<H256, MinterError>;
        async fn await_confirmation(&self, tx_hash: H256) -> Result<TransactionReceipt, MinterError>;
        async fn subscribe_blocks(&self) -> Result<BlockStream, MinterError>;
        async fn transaction_by_nonce(&self, nonce: u64) -> Result<Option<H256>, MinterError>;
    }
}

mock! {
    pub Publisher {}

    #[async_trait]
    impl MetadataPublisher for Publisher {
        async fn publish(&self, metadata: &MintMetadata) -> Result<String, MinterError>;
    }
}

/// Publisher answering `ipfs://<name>` for every document
pub fn echo_publisher() -> MockPublisher {
    let mut publisher = MockPublisher::new();
    publisher
        .expect_publish()
        .returning(|metadata| Ok(format!("ipfs://{}", metadata.name)));
    publisher
}

/// Fee every `FakeLedger` quotes
pub fn base_fee() -> FeeQuote {
    FeeQuote::new(U256::from(1_000), U256::from(100))
}

pub fn recipient(n: u64) -> Address {
    Address::from_low_u64_be(n)
}

pub fn test_settings(batch_size: usize, max_retries: u32) -> DispatcherSettings {
    DispatcherSettings {
        domain: "test".to_string(),
        contract: CONTRACT,
        batch_size,
        inter_batch_delay_ms: 10,
        max_retries,
        ..Default::default()
    }
}

pub fn dispatcher(
    ledger: Arc<dyn Ledger>,
    publisher: Arc<dyn MetadataPublisher>,
    settings: DispatcherSettings,
) -> MintDispatcher {
    MintDispatcher::new(
        ledger,
        publisher,
        settings,
        DispatcherMetrics::dummy_instance(),
    )
    .unwrap()
}

/// Polls `condition` until it holds, failing the test after a few seconds
pub async fn wait_until<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition was not met in time");
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub to: Address,
    pub metadata_uri: String,
    pub nonce: u64,
    pub gas_limit: U256,
    pub fee: FeeQuote,
    pub tx_hash: H256,
    pub dropped: bool,
}

struct FakeLedgerState {
    fee: FeeQuote,
    fee_calls: usize,
    account_sequence_calls: usize,
    drops_remaining: usize,
    hidden_lookups: usize,
    failing_fee_estimates: usize,
    stalled_nonces: HashSet<u64>,
    failing_submit: HashSet<Address>,
    submissions: Vec<Submission>,
    failing_gas: HashSet<Address>,
    reverting: HashSet<Address>,
    without_event: HashSet<Address>,
}

/// In-memory node. Dropped transactions never confirm and are unknown by nonce.
pub struct FakeLedger {
    start_nonce: u64,
    authority: bool,
    gas_estimate: U256,
    confirmation_delay: Duration,
    state: Mutex<FakeLedgerState>,
    blocks_sender: mpsc::UnboundedSender<u64>,
    blocks_receiver: Mutex<Option<mpsc::UnboundedReceiver<u64>>>,
}

impl FakeLedger {
    pub fn new(start_nonce: u64) -> Self {
        let (blocks_sender, blocks_receiver) = mpsc::unbounded_channel();
        Self {
            start_nonce,
            authority: true,
            gas_estimate: U256::from(50_000),
            confirmation_delay: Duration::from_millis(1),
            state: Mutex::new(FakeLedgerState {
                fee: base_fee(),
                fee_calls: 0,
                account_sequence_calls: 0,
                drops_remaining: 0,
                hidden_lookups: 0,
                failing_fee_estimates: 0,
                stalled_nonces: HashSet::new(),
                failing_submit: HashSet::new(),
                submissions: vec![],
                failing_gas: HashSet::new(),
                reverting: HashSet::new(),
                without_event: HashSet::new(),
            }),
            blocks_sender,
            blocks_receiver: Mutex::new(Some(blocks_receiver)),
        }
    }

    pub fn without_authority(mut self) -> Self {
        self.authority = false;
        self
    }

    pub fn with_confirmation_delay(mut self, delay: Duration) -> Self {
        self.confirmation_delay = delay;
        self
    }

    pub fn drop_next_submissions(&self, count: usize) {
        self.state.lock().drops_remaining = count;
    }

    /// The next `count` lookups by nonce miss, as a lagging node would
    pub fn hide_next_lookups(&self, count: usize) {
        self.state.lock().hidden_lookups = count;
    }

    /// Transactions with this nonce are known to the node but never confirm
    pub fn stall_nonce(&self, nonce: u64) {
        self.state.lock().stalled_nonces.insert(nonce);
    }

    pub fn fail_next_fee_estimates(&self, count: usize) {
        self.state.lock().failing_fee_estimates = count;
    }

    pub fn fail_submit_for(&self, to: Address) {
        self.state.lock().failing_submit.insert(to);
    }

    pub fn fail_gas_for(&self, to: Address) {
        self.state.lock().failing_gas.insert(to);
    }

    pub fn revert_for(&self, to: Address) {
        self.state.lock().reverting.insert(to);
    }

    pub fn omit_event_for(&self, to: Address) {
        self.state.lock().without_event.insert(to);
    }

    pub fn new_block(&self, block: u64) {
        self.blocks_sender.send(block).unwrap();
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.state.lock().submissions.clone()
    }

    pub fn fee_calls(&self) -> usize {
        self.state.lock().fee_calls
    }

    pub fn account_sequence_calls(&self) -> usize {
        self.state.lock().account_sequence_calls
    }

    fn submission(&self, tx_hash: H256) -> Option<Submission> {
        self.state
            .lock()
            .submissions
            .iter()
            .find(|s| s.tx_hash == tx_hash)
            .cloned()
    }
}

#[async_trait]
impl Ledger for FakeLedger {
    fn signer(&self) -> Address {
        SIGNER
    }

    async fn has_mint_authority(&self, _signer: Address) -> Result<bool, MinterError> {
        Ok(self.authority)
    }

    async fn fee_estimate(&self) -> Result<FeeQuote, MinterError> {
        let mut state = self.state.lock();
        state.fee_calls += 1;
        if state.failing_fee_estimates > 0 {
            state.failing_fee_estimates -= 1;
            return Err(MinterError::FeeEstimationFailed("node overloaded".to_string()));
        }
        Ok(state.fee.clone())
    }

    async fn account_sequence(&self, _address: Address) -> Result<u64, MinterError> {
        self.state.lock().account_sequence_calls += 1;
        Ok(self.start_nonce)
    }

    async fn estimate_gas(&self, call: &MintCall) -> Result<U256, MinterError> {
        if self.state.lock().failing_gas.contains(&call.to) {
            return Err(MinterError::GasEstimationFailed(
                "execution reverted".to_string(),
            ));
        }
        Ok(self.gas_estimate)
    }

    async fn submit(
        &self,
        call: &MintCall,
        nonce: u64,
        gas_limit: U256,
        fee: &FeeQuote,
    ) -> Result<H256, MinterError> {
        let mut state = self.state.lock();
        if state.failing_submit.contains(&call.to) {
            return Err(MinterError::TxSubmissionError("nonce too low".to_string()));
        }
        let dropped = state.drops_remaining > 0;
        if dropped {
            state.drops_remaining -= 1;
        }
        let tx_hash = H256::from_low_u64_be(state.submissions.len() as u64 + 1);
        state.submissions.push(Submission {
            to: call.to,
            metadata_uri: call.metadata_uri.clone(),
            nonce,
            gas_limit,
            fee: fee.clone(),
            tx_hash,
            dropped,
        });
        Ok(tx_hash)
    }

    async fn await_confirmation(&self, tx_hash: H256) -> Result<TransactionReceipt, MinterError> {
        let Some(submission) = self.submission(tx_hash) else {
            return Err(MinterError::ConfirmationFailed("unknown transaction".to_string()));
        };
        let stalled = self.state.lock().stalled_nonces.contains(&submission.nonce);
        if submission.dropped || stalled {
            return std::future::pending().await;
        }
        tokio::time::sleep(self.confirmation_delay).await;

        let (reverting, without_event) = {
            let state = self.state.lock();
            (
                state.reverting.contains(&submission.to),
                state.without_event.contains(&submission.to),
            )
        };
        let logs = if without_event {
            vec![]
        } else {
            vec![transfer_log(CONTRACT, submission.to, U256::from(submission.nonce))]
        };
        Ok(TransactionReceipt {
            transaction_hash: tx_hash,
            block_number: Some(U64::from(submission.nonce + 100)),
            status: Some(U64::from(u64::from(!reverting))),
            logs,
            ..Default::default()
        })
    }

    async fn subscribe_blocks(&self) -> Result<BlockStream, MinterError> {
        let receiver = self
            .blocks_receiver
            .lock()
            .take()
            .ok_or_else(|| MinterError::Other("already subscribed".to_string()))?;
        let stream = futures_util::stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|block| (block, receiver))
        });
        Ok(stream.boxed())
    }

    async fn transaction_by_nonce(&self, nonce: u64) -> Result<Option<H256>, MinterError> {
        let mut state = self.state.lock();
        if state.hidden_lookups > 0 {
            state.hidden_lookups -= 1;
            return Ok(None);
        }
        Ok(state
            .submissions
            .iter()
            .find(|s| s.nonce == nonce && !s.dropped)
            .map(|s| s.tx_hash))
    }
}
