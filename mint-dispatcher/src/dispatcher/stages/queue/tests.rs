use ethers_core::types::Address;

use crate::request::{Completion, MintMetadata, MintRequest, RequestUuid};

use super::RequestQueue;

fn request(name: &str) -> MintRequest {
    let (completion, _receiver) = Completion::new();
    MintRequest::new(MintMetadata::new(name), Address::from_low_u64_be(0xb0b), completion)
}

fn uuids(requests: &[MintRequest]) -> Vec<RequestUuid> {
    requests.iter().map(|r| r.uuid().clone()).collect()
}

#[tokio::test]
async fn test_push_and_pop_back_and_front() {
    let queue = RequestQueue::new();
    let request1 = request("1");
    let request2 = request("2");

    queue.push_back(request1.clone()).await;
    queue.push_front(request2.clone()).await;

    // request2 should be at the front
    let popped = queue.pop_n(1).await;
    assert_eq!(uuids(&popped), vec![request2.uuid().clone()]);

    let popped = queue.pop_n(1).await;
    assert_eq!(uuids(&popped), vec![request1.uuid().clone()]);

    assert!(queue.is_empty().await);
}

#[tokio::test]
async fn test_pop_n_partial_and_empty() {
    let queue = RequestQueue::new();
    let requests: Vec<_> = (0..3).map(|i| request(&i.to_string())).collect();
    queue.extend(requests.clone()).await;

    // Try to pop more than available
    let popped = queue.pop_n(5).await;
    assert_eq!(uuids(&popped), uuids(&requests));
    assert_eq!(queue.len().await, 0);

    let popped = queue.pop_n(1).await;
    assert!(popped.is_empty());
}

#[tokio::test]
async fn test_order_is_preserved_across_batches() {
    let queue = RequestQueue::new();
    let requests: Vec<_> = (0..5).map(|i| request(&i.to_string())).collect();
    for request in &requests {
        queue.push_back(request.clone()).await;
    }

    let first = queue.pop_n(2).await;
    let rest = queue.pop_n(10).await;

    assert_eq!(uuids(&first), uuids(&requests[..2]));
    assert_eq!(uuids(&rest), uuids(&requests[2..]));
}

#[tokio::test]
async fn test_take_all_empties_queue() {
    let queue = RequestQueue::new();
    queue.extend((0..4).map(|i| request(&i.to_string()))).await;

    assert_eq!(queue.take_all().await.len(), 4);
    assert_eq!(queue.len().await, 0);
}
