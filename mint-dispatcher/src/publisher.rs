use async_trait::async_trait;

use crate::{error::MinterError, request::MintMetadata};

pub use pinning::{PinningPublisher, PinningPublisherConf};

mod pinning;

/// Content-addressed store the token metadata is published to
#[async_trait]
pub trait MetadataPublisher: Send + Sync {
    /// Publish one document and return a uri it can be fetched from.
    /// Publishing the same document twice returns the same uri.
    async fn publish(&self, metadata: &MintMetadata) -> Result<String, MinterError>;
}
