pub use entrypoint::{Entrypoint, MintDispatcher, PendingMint};
pub use metrics::DispatcherMetrics;
pub use settings::DispatcherSettings;

pub(crate) use nonce::NonceAllocator;
pub(crate) use state::DispatcherState;

mod entrypoint;
mod metrics;
mod nonce;
mod settings;
mod stages;
mod state;
