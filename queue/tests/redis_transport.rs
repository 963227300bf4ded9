//! Redis Streams transport against a real Redis. Skips when Docker is not
//! available.

use config::{BrokerConfig, QueueConfig};
use hcp_core::{Broker, Disposition};
use queue::RedisBroker;
use testing::{redis, unique_queue};

async fn broker(consumer_name: &str) -> Option<RedisBroker> {
    let fixture = match redis().await {
        Some(f) => f,
        None => {
            eprintln!("Skipping Redis transport test: Docker not available");
            return None;
        }
    };

    let broker_config = BrokerConfig {
        url: Some(fixture.url().to_string()),
        consumer_name: consumer_name.to_string(),
        poll_interval_ms: 20,
        ..Default::default()
    };
    Some(RedisBroker::from_config(&broker_config, &QueueConfig::default()).unwrap())
}

#[tokio::test]
async fn test_probe_succeeds() {
    let Some(broker) = broker("probe").await else {
        return;
    };
    broker.probe().await.unwrap();
}

#[tokio::test]
async fn test_publish_receive_ack() {
    let Some(broker) = broker("ack").await else {
        return;
    };
    let queue = unique_queue("ack");

    let mut consumer = broker.consumer(&queue).await.unwrap();
    let publisher = broker.publisher().await.unwrap();
    publisher.publish(&queue, b"{\"n\":1}").await.unwrap();
    publisher.publish(&queue, b"{\"n\":2}").await.unwrap();

    let first = consumer.receive().await.unwrap();
    assert_eq!(first.body, b"{\"n\":1}");
    assert!(!first.redelivered);
    consumer.settle(first.tag, Disposition::Ack).await.unwrap();

    let second = consumer.receive().await.unwrap();
    assert_eq!(second.body, b"{\"n\":2}");
    consumer.settle(second.tag, Disposition::Ack).await.unwrap();
}

#[tokio::test]
async fn test_reject_routes_to_dead_letter_stream() {
    let Some(broker) = broker("dlq").await else {
        return;
    };
    let queue = unique_queue("dlq");

    let mut consumer = broker.consumer(&queue).await.unwrap();
    broker
        .publisher()
        .await
        .unwrap()
        .publish(&queue, b"not json")
        .await
        .unwrap();

    let delivery = consumer.receive().await.unwrap();
    consumer
        .settle(delivery.tag, Disposition::dead_letter())
        .await
        .unwrap();

    let dead = broker.dead_letters(&queue, 10).await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].body, b"not json");
    assert!(dead[0].reason.is_some());
}

#[tokio::test]
async fn test_unsettled_delivery_comes_back_after_restart() {
    let Some(broker) = broker("restart").await else {
        return;
    };
    let queue = unique_queue("restart");

    {
        let mut consumer = broker.consumer(&queue).await.unwrap();
        broker
            .publisher()
            .await
            .unwrap()
            .publish(&queue, b"survivor")
            .await
            .unwrap();
        let _unsettled = consumer.receive().await.unwrap();
    }

    // Same consumer name: the pending entry is ours again.
    let mut consumer = broker.consumer(&queue).await.unwrap();
    let delivery = consumer.receive().await.unwrap();
    assert_eq!(delivery.body, b"survivor");
    assert!(delivery.redelivered);
    consumer.settle(delivery.tag, Disposition::Ack).await.unwrap();
}

#[tokio::test]
async fn test_idle_consumer_claims_entry_left_by_another_replica() {
    let Some(fixture) = redis().await else {
        eprintln!("Skipping Redis transport test: Docker not available");
        return;
    };
    let replica = |name: &str| {
        let broker_config = BrokerConfig {
            url: Some(fixture.url().to_string()),
            consumer_name: name.to_string(),
            poll_interval_ms: 20,
            claim_idle_ms: 50,
            ..Default::default()
        };
        RedisBroker::from_config(&broker_config, &QueueConfig::default()).unwrap()
    };
    let queue = unique_queue("claim");
    let retired = replica("replica-a");
    let survivor = replica("replica-b");

    {
        let mut consumer = retired.consumer(&queue).await.unwrap();
        retired
            .publisher()
            .await
            .unwrap()
            .publish(&queue, b"orphan")
            .await
            .unwrap();
        let _unsettled = consumer.receive().await.unwrap();
    }

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let mut consumer = survivor.consumer(&queue).await.unwrap();
    let delivery = tokio::time::timeout(std::time::Duration::from_secs(5), consumer.receive())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(delivery.body, b"orphan");
    assert!(delivery.redelivered);
    consumer.settle(delivery.tag, Disposition::Ack).await.unwrap();
}

#[tokio::test]
async fn test_unreachable_broker_fails_probe() {
    let broker_config = BrokerConfig {
        url: Some("redis://127.0.0.1:1/0".to_string()),
        ..Default::default()
    };
    let broker = RedisBroker::from_config(&broker_config, &QueueConfig::default()).unwrap();
    assert!(broker.probe().await.is_err());
}
