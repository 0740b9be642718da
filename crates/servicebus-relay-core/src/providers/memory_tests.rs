//! Tests for the in-memory broker.

use super::*;
use std::time::Duration as StdDuration;

fn queue(name: &str) -> QueueName {
    QueueName::new(name.to_string()).unwrap()
}

fn open(broker: &InMemoryBroker) -> InMemorySession {
    broker
        .open_session(BrokerEndpoint::in_memory(), &AccessToken::new("token"))
        .unwrap()
}

#[tokio::test]
async fn test_send_and_receive_assigns_sequence_numbers() {
    let broker = InMemoryBroker::default();
    let session = open(&broker);
    let orders = queue("orders");
    let client = session.create_queue_client(&orders).await.unwrap();

    client
        .send(&OutboundMessage::from_text("first").unwrap())
        .await
        .unwrap();
    client
        .send(&OutboundMessage::from_text("second").unwrap())
        .await
        .unwrap();
    assert_eq!(broker.queue_depth(&orders), 2);

    let first = client.receive(Duration::zero()).await.unwrap().unwrap();
    let second = client.receive(Duration::zero()).await.unwrap().unwrap();

    assert_eq!(first.sequence_number, SequenceNumber::new(1));
    assert_eq!(first.body.as_ref(), b"first");
    assert!(first.enqueued_at.is_some());
    assert_eq!(second.sequence_number, SequenceNumber::new(2));
    assert_eq!(broker.queue_depth(&orders), 0);

    client.close().await.unwrap();
    Box::new(session).close().await.unwrap();
}

#[tokio::test]
async fn test_queues_are_independent() {
    let broker = InMemoryBroker::default();
    broker.enqueue_raw(&queue("a"), "for a");
    let seq = broker.enqueue_raw(&queue("b"), "for b");

    // Sequence numbers are per queue
    assert_eq!(seq, SequenceNumber::new(1));

    let session = open(&broker);
    let b = queue("b");
    let client = session.create_queue_client(&b).await.unwrap();
    let message = client.receive(Duration::zero()).await.unwrap().unwrap();

    assert_eq!(message.body.as_ref(), b"for b");
    assert_eq!(broker.queue_depth(&queue("a")), 1);
}

#[tokio::test]
async fn test_receive_on_empty_queue_waits_for_timeout() {
    let broker = InMemoryBroker::default();
    let session = open(&broker);
    let empty = queue("empty");
    let client = session.create_queue_client(&empty).await.unwrap();

    let started = std::time::Instant::now();
    let result = client.receive(Duration::milliseconds(200)).await.unwrap();
    let elapsed = started.elapsed();

    assert!(result.is_none());
    assert!(elapsed >= StdDuration::from_millis(190), "returned early: {:?}", elapsed);
    assert!(elapsed < StdDuration::from_secs(2), "waited too long: {:?}", elapsed);
}

#[tokio::test]
async fn test_receive_wakes_when_message_arrives() {
    let broker = InMemoryBroker::default();
    let late = queue("late");

    let producer = {
        let broker = broker.clone();
        let late = late.clone();
        tokio::spawn(async move {
            tokio::time::sleep(StdDuration::from_millis(100)).await;
            broker.enqueue_raw(&late, "arrived");
        })
    };

    let session = open(&broker);
    let client = session.create_queue_client(&late).await.unwrap();

    let started = std::time::Instant::now();
    let message = client.receive(Duration::seconds(10)).await.unwrap();

    assert_eq!(message.unwrap().body.as_ref(), b"arrived");
    assert!(started.elapsed() < StdDuration::from_secs(5));
    producer.await.unwrap();
}

#[tokio::test]
async fn test_full_queue_rejects_send() {
    let broker = InMemoryBroker::new(InMemoryBrokerConfig {
        max_queue_size: Some(1),
        ..Default::default()
    });
    let session = open(&broker);
    let small = queue("small");
    let client = session.create_queue_client(&small).await.unwrap();

    client
        .send(&OutboundMessage::from_text("one").unwrap())
        .await
        .unwrap();
    let result = client
        .send(&OutboundMessage::from_text("two").unwrap())
        .await;

    match result {
        Err(RelayError::Send { queue_name, message }) => {
            assert_eq!(queue_name, "small");
            assert!(message.contains("full"));
        }
        other => panic!("Expected Send error, got: {:?}", other),
    }
    assert_eq!(broker.queue_depth(&small), 1);
}

#[tokio::test]
async fn test_stats_track_acquisition_and_release() {
    let broker = InMemoryBroker::default();
    let session = open(&broker);
    let stats_queue = queue("stats");

    let client = session.create_queue_client(&stats_queue).await.unwrap();
    client
        .send(&OutboundMessage::from_text("x").unwrap())
        .await
        .unwrap();

    let during = broker.stats();
    assert_eq!(during.open_sessions(), 1);
    assert_eq!(during.open_clients(), 1);
    assert_eq!(during.sends, 1);

    client.close().await.unwrap();
    Box::new(session).close().await.unwrap();

    let after = broker.stats();
    assert_eq!(after.open_sessions(), 0);
    assert_eq!(after.open_clients(), 0);
    assert_eq!(after.receives, 0);
    assert_eq!(after.total_calls(), 3);
}

#[test]
fn test_enqueue_raw_does_not_count_as_broker_call() {
    let broker = InMemoryBroker::default();
    broker.enqueue_raw(&queue("raw"), vec![0xff, 0xfe]);

    assert_eq!(broker.stats(), BrokerStats::default());
    assert_eq!(broker.queue_depth(&queue("raw")), 1);
}
