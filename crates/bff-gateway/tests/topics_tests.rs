//! # Topic Relay Integration Tests
//!
//! Salted namespaces, subscription lifecycle and the drop-on-overflow
//! policy, exercised through authenticated connections.

mod common;

use bff_gateway::domain::error::codes;
use bff_gateway::{
    PublishToTopicRequest, RoomPublishRequest, RoomRequest, RpcRequest, RpcResponse,
    SubscriptionRef, SubscriptionRequest,
};
use common::{address, key, Harness, TestClient};
use shared_bus::TopicBus;
use std::time::Duration;

async fn subscribe_peer(client: &mut TestClient, topic: &str) -> u32 {
    match client
        .call(RpcRequest::SubscribeToPeerMessages(SubscriptionRequest {
            topic: topic.into(),
        }))
        .await
    {
        RpcResponse::Subscribed(result) => result.subscription_id,
        other => panic!("Expected subscription, got {:?}", other),
    }
}

async fn subscribe_system(client: &mut TestClient, topic: &str) -> u32 {
    match client
        .call(RpcRequest::SubscribeToSystemMessages(SubscriptionRequest {
            topic: topic.into(),
        }))
        .await
    {
        RpcResponse::Subscribed(result) => result.subscription_id,
        other => panic!("Expected subscription, got {:?}", other),
    }
}

async fn publish(client: &mut TestClient, topic: &str, payload: &[u8]) {
    let response = client
        .call(RpcRequest::PublishToTopic(PublishToTopicRequest {
            topic: topic.into(),
            payload: payload.to_vec(),
        }))
        .await;
    match response {
        RpcResponse::Published(result) => assert!(result.ok),
        other => panic!("Expected publish result, got {:?}", other),
    }
}

#[tokio::test]
async fn test_subscription_ids_start_at_zero() {
    let harness = Harness::new();
    let mut client = harness.connect_as(&key(1)).await;

    assert_eq!(subscribe_peer(&mut client, "a").await, 0);
    assert_eq!(subscribe_system(&mut client, "b").await, 1);
    assert_eq!(subscribe_peer(&mut client, "c").await, 2);
}

#[tokio::test]
async fn test_invalid_topic_never_reaches_broker() {
    let harness = Harness::new();
    let mut client = harness.connect_as(&key(1)).await;
    let before = harness.bus.messages_published();

    let error = client
        .call_err(RpcRequest::PublishToTopic(PublishToTopicRequest {
            topic: "a..b".into(),
            payload: b"x".to_vec(),
        }))
        .await;

    assert_eq!(error.code, codes::INVALID_PARAMS);
    assert_eq!(harness.bus.messages_published(), before);
    // The session survives the rejected call
    publish(&mut client, "a.b", b"ok").await;
}

#[tokio::test]
async fn test_peer_messages_carry_sender() {
    let harness = Harness::new();
    let alice_key = key(1);
    let mut alice = harness.connect_as(&alice_key).await;
    let mut bob = harness.connect_as(&key(2)).await;

    let subscription = subscribe_peer(&mut bob, "foo").await;
    let stream = bob
        .send(RpcRequest::GetPeerMessages(SubscriptionRef {
            subscription_id: subscription,
        }))
        .await;
    publish(&mut alice, "foo", b"hello").await;

    match bob.stream_item(stream).await {
        Some(RpcResponse::PeerMessage(message)) => {
            assert_eq!(message.sender, address(&alice_key).to_string());
            assert_eq!(message.topic, "foo");
            assert_eq!(message.payload, b"hello");
        }
        other => panic!("Expected peer message, got {:?}", other),
    }
}

#[tokio::test]
async fn test_own_messages_are_delivered() {
    let harness = Harness::new();
    let bob_key = key(2);
    let mut bob = harness.connect_as(&bob_key).await;

    let subscription = subscribe_peer(&mut bob, "foo").await;
    let stream = bob
        .send(RpcRequest::GetPeerMessages(SubscriptionRef {
            subscription_id: subscription,
        }))
        .await;
    publish(&mut bob, "foo", b"echo").await;

    match bob.stream_item(stream).await {
        Some(RpcResponse::PeerMessage(message)) => {
            assert_eq!(message.sender, address(&bob_key).to_string());
        }
        other => panic!("Expected peer message, got {:?}", other),
    }
}

#[tokio::test]
async fn test_system_subscription_ignores_peer_namespace() {
    let harness = Harness::new();
    let mut alice = harness.connect_as(&key(1)).await;
    let mut bob = harness.connect_as(&key(2)).await;

    let subscription = subscribe_system(&mut bob, "foo").await;
    let stream = bob
        .send(RpcRequest::GetSystemMessages(SubscriptionRef {
            subscription_id: subscription,
        }))
        .await;

    // Peers can only publish into their own peer namespace
    publish(&mut alice, "foo", b"from a peer").await;
    assert!(bob
        .try_next_for(stream, Duration::from_millis(200))
        .await
        .is_none());

    // A system publish on `foo` does arrive
    let subject = format!("{}.foo", harness.gateway.config().topics.salt);
    harness
        .bus
        .publish(&subject, bytes::Bytes::from_static(b"from the system"))
        .await
        .unwrap();
    match bob.stream_item(stream).await {
        Some(RpcResponse::SystemMessage(message)) => {
            assert_eq!(message.topic, "foo");
            assert_eq!(message.payload, b"from the system");
        }
        other => panic!("Expected system message, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unknown_subscription_stream_ends() {
    let harness = Harness::new();
    let mut client = harness.connect_as(&key(1)).await;

    let stream = client
        .send(RpcRequest::GetPeerMessages(SubscriptionRef {
            subscription_id: 42,
        }))
        .await;

    assert!(client.stream_item(stream).await.is_none());
    // Still usable
    assert_eq!(subscribe_peer(&mut client, "foo").await, 0);
}

#[tokio::test]
async fn test_unsubscribe_twice_is_ok() {
    let harness = Harness::new();
    let mut client = harness.connect_as(&key(1)).await;
    let subscription = subscribe_peer(&mut client, "foo").await;

    for _ in 0..2 {
        let response = client
            .call(RpcRequest::UnsubscribeToPeerMessages(SubscriptionRef {
                subscription_id: subscription,
            }))
            .await;
        match response {
            RpcResponse::Unsubscribed(result) => assert!(result.ok),
            other => panic!("Expected unsubscribe result, got {:?}", other),
        }
    }
    assert_eq!(harness.bus.subscriber_count(), 0);
}

#[tokio::test]
async fn test_unsubscribe_ends_open_stream() {
    let harness = Harness::new();
    let mut client = harness.connect_as(&key(1)).await;
    let subscription = subscribe_system(&mut client, "foo").await;
    let stream = client
        .send(RpcRequest::GetSystemMessages(SubscriptionRef {
            subscription_id: subscription,
        }))
        .await;

    client
        .call(RpcRequest::UnsubscribeToSystemMessages(SubscriptionRef {
            subscription_id: subscription,
        }))
        .await;

    assert!(client.stream_item(stream).await.is_none());
}

#[tokio::test]
async fn test_overflow_drops_without_blocking_publisher() {
    let harness = Harness::new();
    let mut alice = harness.connect_as(&key(1)).await;
    let mut bob = harness.connect_as(&key(2)).await;
    let subscription = subscribe_peer(&mut bob, "flood").await;
    let capacity = harness.gateway.config().topics.subscription_buffer;

    // Nobody drains the subscription while these are published
    for i in 0..capacity + 10 {
        publish(&mut alice, "flood", &[i as u8]).await;
    }

    let stream = bob
        .send(RpcRequest::GetPeerMessages(SubscriptionRef {
            subscription_id: subscription,
        }))
        .await;
    for i in 0..capacity {
        match bob.stream_item(stream).await {
            Some(RpcResponse::PeerMessage(message)) => assert_eq!(message.payload, [i as u8]),
            other => panic!("Expected peer message, got {:?}", other),
        }
    }
    assert!(bob
        .try_next_for(stream, Duration::from_millis(200))
        .await
        .is_none());
}

#[tokio::test]
async fn test_cancel_stream_ends_it() {
    let harness = Harness::new();
    let mut client = harness.connect_as(&key(1)).await;
    let subscription = subscribe_peer(&mut client, "foo").await;
    let stream = client
        .send(RpcRequest::GetPeerMessages(SubscriptionRef {
            subscription_id: subscription,
        }))
        .await;

    client.cancel(stream).await;

    assert!(client.stream_item(stream).await.is_none());
}

#[tokio::test]
async fn test_disconnect_is_announced() {
    let harness = Harness::new();
    let mut watcher = harness.connect_as(&key(1)).await;
    let leaving_key = key(2);
    let leaving = harness.connect_as(&leaving_key).await;

    let subscription = subscribe_system(&mut watcher, "peer.*.disconnect").await;
    let stream = watcher
        .send(RpcRequest::GetSystemMessages(SubscriptionRef {
            subscription_id: subscription,
        }))
        .await;
    drop(leaving);

    match watcher.stream_item(stream).await {
        Some(RpcResponse::SystemMessage(message)) => {
            assert_eq!(
                message.topic,
                format!("peer.{}.disconnect", address(&leaving_key))
            );
        }
        other => panic!("Expected system message, got {:?}", other),
    }
}

#[tokio::test]
async fn test_room_broadcast() {
    let harness = Harness::new();
    let alice_key = key(1);
    let mut alice = harness.connect_as(&alice_key).await;
    let mut bob = harness.connect_as(&key(2)).await;

    let stream = bob
        .send(RpcRequest::GetRoomMessages(RoomRequest {
            room: "plaza".into(),
        }))
        .await;
    // Wait until the room stream is attached before publishing
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while harness.bus.subscriber_count() == 0 {
        assert!(tokio::time::Instant::now() < deadline, "room stream not attached");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    alice
        .call(RpcRequest::PublishMessageToRoom(RoomPublishRequest {
            room: "plaza".into(),
            payload: b"hi all".to_vec(),
        }))
        .await;

    match bob.stream_item(stream).await {
        Some(RpcResponse::RoomMessage(message)) => {
            assert_eq!(message.room, "plaza");
            assert_eq!(message.sender, address(&alice_key).to_string());
            assert_eq!(message.payload, b"hi all");
        }
        other => panic!("Expected room message, got {:?}", other),
    }
}
