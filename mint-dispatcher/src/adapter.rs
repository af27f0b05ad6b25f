pub(crate) use events::extract_result_identifier;
pub use events::TRANSFER_EVENT_SIGNATURE;
#[cfg(test)]
pub(crate) use events::transfer_log;
pub(crate) use fees::{apply_gas_margin, boost_fee};
pub use fees::FeeQuote;
pub use ledger::{BlockStream, Ledger, MintCall};

mod events;
mod fees;
mod ledger;
