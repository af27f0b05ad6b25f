#![deny(clippy::unwrap_used, clippy::panic)]
#![deny(clippy::arithmetic_side_effects)]

pub use adapter::{FeeQuote, Ledger, MintCall, BlockStream, TRANSFER_EVENT_SIGNATURE};
pub use dispatcher::{
    DispatcherMetrics, DispatcherSettings, Entrypoint, MintDispatcher, PendingMint,
};
pub use error::MinterError;
pub use publisher::{MetadataPublisher, PinningPublisher, PinningPublisherConf};
pub use request::{MintMetadata, MintOutcome, RequestUuid, MISSING_RESULT_IDENTIFIER};
pub use trace::{Level, Style, TracingConfig};

mod adapter;
mod dispatcher;
mod error;
mod publisher;
mod request;
mod trace;
mod transaction;
