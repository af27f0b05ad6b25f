use ethers_core::types::{Address, Log, TransactionReceipt, H256, U256};
use ethers_core::utils::keccak256;

pub const TRANSFER_EVENT_SIGNATURE: &str = "Transfer(address,address,uint256)";

/// ERC-721 transfer topic, emitted by the mint with `from` set to zero.
pub(crate) fn transfer_topic() -> H256 {
    H256::from(keccak256(TRANSFER_EVENT_SIGNATURE))
}

/// Token id of the first transfer event emitted by `contract` in `receipt`.
pub(crate) fn extract_result_identifier(
    receipt: &TransactionReceipt,
    contract: Address,
) -> Option<String> {
    let topic = transfer_topic();
    receipt
        .logs
        .iter()
        .filter(|log| log.address == contract)
        .filter(|log| log.topics.first() == Some(&topic))
        .find_map(token_id)
        .map(|token_id| token_id.to_string())
}

fn token_id(log: &Log) -> Option<U256> {
    // ERC-721 indexes the token id, ERC-20 style transfers carry it in data
    if let Some(indexed) = log.topics.get(3) {
        return Some(U256::from_big_endian(indexed.as_bytes()));
    }
    let word = log.data.get(..32)?;
    Some(U256::from_big_endian(word))
}

#[cfg(test)]
pub(crate) fn transfer_log(contract: Address, to: Address, token_id: U256) -> Log {
    let mut token_id_topic = [0u8; 32];
    token_id.to_big_endian(&mut token_id_topic);
    Log {
        address: contract,
        topics: vec![
            transfer_topic(),
            H256::zero(),
            H256::from(to),
            H256::from(token_id_topic),
        ],
        ..Default::default()
    }
}
