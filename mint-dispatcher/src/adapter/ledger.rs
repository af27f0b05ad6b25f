use async_trait::async_trait;
use derive_new::new;
use ethers_core::abi::{self, Token};
use ethers_core::types::{Address, Bytes, TransactionReceipt, H256, U256};
use ethers_core::utils::id;
use futures_util::stream::BoxStream;

use crate::error::MinterError;

use super::FeeQuote;

/// Stream of new block numbers, ended when the node subscription closes
pub type BlockStream = BoxStream<'static, u64>;

const MINT_FUNCTION_SIGNATURE: &str = "mint(address,string)";

/// The single state-changing call the dispatcher issues
#[derive(new, Clone, Debug, PartialEq, Eq)]
pub struct MintCall {
    /// mint contract
    pub contract: Address,
    /// recipient of the token
    pub to: Address,
    pub metadata_uri: String,
}

impl MintCall {
    /// ABI-encoded `mint(address,string)` calldata
    pub fn calldata(&self) -> Bytes {
        let selector = id(MINT_FUNCTION_SIGNATURE);
        let args = abi::encode(&[
            Token::Address(self.to),
            Token::String(self.metadata_uri.clone()),
        ]);
        let mut data = Vec::with_capacity(selector.len().saturating_add(args.len()));
        data.extend_from_slice(&selector);
        data.extend_from_slice(&args);
        Bytes::from(data)
    }
}

/// Everything the dispatcher needs from the node of the chain it mints on.
/// Implementations sign with a single account, returned by `signer`.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Account every transaction is sent from
    fn signer(&self) -> Address;

    /// Whether `signer` may call `mint` on the contract
    async fn has_mint_authority(&self, signer: Address) -> Result<bool, MinterError>;

    /// Current base and priority fee estimate
    async fn fee_estimate(&self) -> Result<FeeQuote, MinterError>;

    /// Next sequence number of `address`, as known by the node
    async fn account_sequence(&self, address: Address) -> Result<u64, MinterError>;

    /// Raw gas estimate for the call, without any safety margin
    async fn estimate_gas(&self, call: &MintCall) -> Result<U256, MinterError>;

    /// Sign and broadcast the call. Returns as soon as the node accepted it.
    async fn submit(
        &self,
        call: &MintCall,
        nonce: u64,
        gas_limit: U256,
        fee: &FeeQuote,
    ) -> Result<H256, MinterError>;

    /// Wait until the transaction is included in a block
    async fn await_confirmation(&self, tx_hash: H256) -> Result<TransactionReceipt, MinterError>;

    /// Subscribe to new block notifications
    async fn subscribe_blocks(&self) -> Result<BlockStream, MinterError>;

    /// Transaction sent by the signer with this nonce, if the node still knows about it
    async fn transaction_by_nonce(&self, nonce: u64) -> Result<Option<H256>, MinterError>;
}

#[cfg(test)]
mod tests {
    use ethers_core::abi::ParamType;

    use super::*;

    #[test]
    fn calldata_encodes_recipient_and_uri() {
        let to = Address::from_low_u64_be(0xb0b);
        let call = MintCall::new(Address::from_low_u64_be(0xc0de), to, "ipfs://bafy".to_string());

        let calldata = call.calldata();

        assert_eq!(&calldata[..4], &id(MINT_FUNCTION_SIGNATURE)[..]);
        let decoded = abi::decode(&[ParamType::Address, ParamType::String], &calldata[4..]).unwrap();
        assert_eq!(
            decoded,
            vec![Token::Address(to), Token::String("ipfs://bafy".to_string())]
        );
    }
}
