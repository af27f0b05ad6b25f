pub(crate) use completion::Completion;
pub use types::*;

mod completion;
mod types;
