use std::{collections::VecDeque, sync::Arc};

use tokio::sync::Mutex;

use crate::request::MintRequest;

/// FIFO of requests waiting to be drained into a batch. Re-queued requests
/// go to the front so that they are retried before any newer request.
#[derive(Debug, Clone, Default)]
pub(crate) struct RequestQueue {
    queue: Arc<Mutex<VecDeque<MintRequest>>>,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push_back(&self, request: MintRequest) {
        self.queue.lock().await.push_back(request);
    }

    pub async fn push_front(&self, request: MintRequest) {
        self.queue.lock().await.push_front(request);
    }

    /// Removes up to `n` requests from the front, in order
    pub async fn pop_n(&self, n: usize) -> Vec<MintRequest> {
        let mut queue = self.queue.lock().await;
        let count = n.min(queue.len());
        queue.drain(..count).collect()
    }

    pub async fn extend<I: IntoIterator<Item = MintRequest>>(&self, requests: I) {
        self.queue.lock().await.extend(requests);
    }

    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.queue.lock().await.is_empty()
    }

    /// Empties the queue, handing back everything that was waiting
    pub async fn take_all(&self) -> Vec<MintRequest> {
        self.queue.lock().await.drain(..).collect()
    }
}

#[cfg(test)]
mod tests;
