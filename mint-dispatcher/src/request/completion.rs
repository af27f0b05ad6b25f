use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::{error::MinterError, request::MintOutcome};

pub(crate) type MintResult = Result<MintOutcome, MinterError>;

/// Resolve/reject handle of a single mint request.
///
/// Clones share the same underlying sender: the monitor may hold a copy while
/// the submission stage still awaits the original transaction, and whichever
/// completes first wins. Every later attempt is a no-op.
#[derive(Clone, Debug)]
pub(crate) struct Completion {
    sender: Arc<Mutex<Option<oneshot::Sender<MintResult>>>>,
}

impl Completion {
    pub fn new() -> (Self, oneshot::Receiver<MintResult>) {
        let (sender, receiver) = oneshot::channel();
        let completion = Self {
            sender: Arc::new(Mutex::new(Some(sender))),
        };
        (completion, receiver)
    }

    /// Returns `false` if the request was already completed.
    pub fn complete(&self, result: MintResult) -> bool {
        let Some(sender) = self.sender.lock().take() else {
            return false;
        };
        // the caller may have stopped listening, which still counts as completed
        let _ = sender.send(result);
        true
    }

    pub fn is_completed(&self) -> bool {
        self.sender.lock().is_none()
    }
}
