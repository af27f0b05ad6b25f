use std::fmt::Debug;
use std::ops::Deref;

use ethers_core::types::{Address, H256};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::adapter::FeeQuote;

use super::Completion;

/// Identifier returned when a confirmed receipt carries no transfer event.
pub const MISSING_RESULT_IDENTIFIER: &str = "0";

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize, PartialEq, Eq, Hash, Default)]
/// Unique identifier of a mint request
pub struct RequestUuid(Uuid);

impl RequestUuid {
    pub fn new(uuid: Uuid) -> Self {
        RequestUuid(uuid)
    }

    pub fn random() -> Self {
        RequestUuid(Uuid::new_v4())
    }
}

impl Deref for RequestUuid {
    type Target = Uuid;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for RequestUuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Token metadata document as published to the content-addressed store.
///
/// Unknown fields are preserved verbatim so callers can attach any
/// marketplace-specific keys.
#[derive(Debug, Clone, Default, serde::Deserialize, serde::Serialize, PartialEq)]
pub struct MintMetadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MintMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Lightweight reference to a request, so that logs stay readable.
#[derive(Clone, PartialEq, Eq)]
pub struct MintRequestDetails {
    pub uuid: RequestUuid,
    /// recipient of the minted token
    pub to: Address,
}

impl Debug for MintRequestDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MintRequest")
            .field("uuid", &self.uuid.to_string())
            .field("to", &self.to)
            .finish()
    }
}

/// A queued mint, owned by the queue until it is drained into a batch.
#[derive(Clone)]
pub(crate) struct MintRequest {
    pub details: MintRequestDetails,
    pub metadata: MintMetadata,
    /// set when the request is re-queued after its transaction was dropped
    pub fee_override: Option<FeeQuote>,
    /// number of times this request was re-queued after a drop
    pub retry_count: u32,
    /// metadata is content-addressed, so re-queued requests reuse the uri
    pub metadata_uri: Option<String>,
    pub completion: Completion,
}

impl Debug for MintRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MintRequest")
            .field("uuid", &self.details.uuid.to_string())
            .field("to", &self.details.to)
            .field("retry_count", &self.retry_count)
            .field("fee_override", &self.fee_override)
            .field("metadata_uri", &self.metadata_uri)
            .finish()
    }
}

impl MintRequest {
    pub fn new(metadata: MintMetadata, to: Address, completion: Completion) -> Self {
        Self {
            details: MintRequestDetails {
                uuid: RequestUuid::random(),
                to,
            },
            metadata,
            fee_override: None,
            retry_count: 0,
            metadata_uri: None,
            completion,
        }
    }

    pub fn uuid(&self) -> &RequestUuid {
        &self.details.uuid
    }

    /// Request to be re-queued after the transaction for `self` was dropped.
    /// It shares the completion handle, so the caller is still resolved once.
    pub fn into_retry(self, boosted_fee: FeeQuote, metadata_uri: String) -> Self {
        Self {
            fee_override: Some(boosted_fee),
            retry_count: self.retry_count.saturating_add(1),
            metadata_uri: Some(metadata_uri),
            ..self
        }
    }
}

/// Successful outcome of a mint, delivered to the caller.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MintOutcome {
    pub transaction_hash: H256,
    pub metadata_uri: String,
    /// token identifier taken from the transfer event, `"0"` if none was emitted
    pub result_identifier: String,
    pub block_number: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_keeps_unknown_fields() {
        let json = r#"{"name":"Badge","image":"ipfs://img","edition":7}"#;
        let metadata: MintMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(metadata.name, "Badge");
        assert_eq!(metadata.image.as_deref(), Some("ipfs://img"));
        assert_eq!(metadata.extra.get("edition"), Some(&Value::from(7)));

        let back = serde_json::to_value(&metadata).unwrap();
        assert_eq!(back["edition"], Value::from(7));
        assert!(back.get("description").is_none());
    }

    #[test]
    fn retry_keeps_identity_and_bumps_counter() {
        let (completion, _receiver) = Completion::new();
        let request = MintRequest::new(MintMetadata::new("a"), Address::from_low_u64_be(1), completion);
        let uuid = request.uuid().clone();
        let fee = FeeQuote::new(120.into(), 12.into());

        let retry = request.into_retry(fee.clone(), "ipfs://cid".to_string());

        assert_eq!(retry.uuid(), &uuid);
        assert_eq!(retry.retry_count, 1);
        assert_eq!(retry.fee_override, Some(fee));
        assert_eq!(retry.metadata_uri.as_deref(), Some("ipfs://cid"));
    }
}
