//! Session lifecycle scenarios
//!
//! Each test plays the gateway through a scripted transport.
//!
//! Run with: cargo test -p integration-tests --test session_tests

use std::time::Duration;

use chat_client::{GatewayMessage, OpCode, Outbound, SessionState};
use chat_common::ClientError;
use chat_core::{ClientEvent, EntityKind, EventCategories, Snowflake};
use integration_tests::{
    connect_steady, fixtures::*, next_event, scripted_client, test_config, wait_for,
    wait_for_state, ScriptedServer, STEP_TIMEOUT,
};
use serde_json::json;

// ============================================================================
// Identify
// ============================================================================

#[tokio::test]
async fn test_identify_reaches_steady() {
    let (client, _transport, mut accepted) = scripted_client(test_config()).unwrap();
    let mut events = client.subscribe(EventCategories::CONNECTION);

    let connecting = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });

    let mut server = ScriptedServer::accept(&mut accepted).await.unwrap();
    let identify = server.identify(ready("s-1")).await.unwrap();
    connecting.await.unwrap().unwrap();

    let payload = identify.as_identify().unwrap();
    assert_eq!(payload.token, "test-token");
    assert_eq!(payload.large_threshold, 250);
    assert_eq!(payload.shard, None);

    assert_eq!(client.session_state(), SessionState::Steady);
    assert!(client.state().is_ready());
    assert_eq!(client.session().unwrap().session_id(), Some("s-1"));

    let ready_event = next_event(&mut events, |e| matches!(e, ClientEvent::Ready { .. }))
        .await
        .unwrap();
    assert!(matches!(
        ready_event,
        ClientEvent::Ready { ref session_id, guild_count: 1, .. } if session_id == "s-1"
    ));
    let connected = next_event(&mut events, |e| matches!(e, ClientEvent::Connected { .. }))
        .await
        .unwrap();
    assert_eq!(
        connected,
        ClientEvent::Connected {
            epoch: 1,
            resumed: false
        }
    );
}

#[tokio::test]
async fn test_sharded_identify_carries_shard() {
    let (client, _transport, mut accepted) =
        scripted_client(test_config().with_shard(2, 4)).unwrap();

    let connecting = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });

    let mut server = ScriptedServer::accept(&mut accepted).await.unwrap();
    let identify = server.identify(ready("s-1")).await.unwrap();
    connecting.await.unwrap().unwrap();

    assert_eq!(identify.as_identify().unwrap().shard, Some([2, 4]));
    assert_eq!(identify.d.as_ref().unwrap()["shard"], json!([2, 4]));
}

#[tokio::test]
async fn test_connect_twice_rejected() {
    let (client, _transport, mut accepted) = scripted_client(test_config()).unwrap();
    let _server = connect_steady(&client, &mut accepted, ready("s-1"))
        .await
        .unwrap();

    assert!(matches!(client.connect().await, Err(ClientError::AlreadyConnected)));
}

#[tokio::test]
async fn test_authentication_failure_is_fatal() {
    let (client, transport, mut accepted) = scripted_client(test_config()).unwrap();

    let connecting = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });

    let mut server = ScriptedServer::accept(&mut accepted).await.unwrap();
    server.send(&GatewayMessage::hello(45_000)).await.unwrap();
    server.expect_op(OpCode::Identify).await.unwrap();
    server.close(Some(4004)).await.unwrap();

    let err = connecting.await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        ClientError::AuthenticationFailed {
            close_code: Some(4004),
            ..
        }
    ));
    assert!(err.is_fatal());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(transport.attempts(), 1);
    assert_eq!(client.session_state(), SessionState::Disconnected);
}

// ============================================================================
// Heartbeat
// ============================================================================

#[tokio::test]
async fn test_no_heartbeat_outside_steady() {
    let (client, _transport, mut accepted) = scripted_client(test_config()).unwrap();

    let connecting = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });

    let mut server = ScriptedServer::accept(&mut accepted).await.unwrap();
    server.send(&GatewayMessage::hello(45_000)).await.unwrap();
    server.expect_op(OpCode::Identify).await.unwrap();

    // A heartbeat request while identifying goes unanswered
    server.send(&GatewayMessage::heartbeat(None)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(server.drain().is_empty());

    server
        .send(&GatewayMessage::dispatch("READY", 1, ready("s-1")))
        .await
        .unwrap();
    connecting.await.unwrap().unwrap();

    // Once steady it is answered at once, carrying the last sequence
    server.send(&GatewayMessage::heartbeat(None)).await.unwrap();
    let beat = server.expect_op(OpCode::Heartbeat).await.unwrap();
    assert_eq!(beat.as_heartbeat_seq(), Some(Some(1)));
}

#[tokio::test]
async fn test_zombied_connection_reconnects() {
    let (client, _transport, mut accepted) = scripted_client(test_config()).unwrap();

    let connecting = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });

    let mut server = ScriptedServer::accept(&mut accepted).await.unwrap();
    server.send(&GatewayMessage::hello(60)).await.unwrap();
    server.expect_op(OpCode::Identify).await.unwrap();
    server
        .send(&GatewayMessage::dispatch("READY", 1, ready("s-1")))
        .await
        .unwrap();
    connecting.await.unwrap().unwrap();

    // Never acknowledged: the next tick finds the connection zombied
    server.expect_op(OpCode::Heartbeat).await.unwrap();
    let close = loop {
        if let Outbound::Close { code, .. } = server.next_outbound().await.unwrap() {
            break code;
        }
    };
    assert_eq!(close, 4000);

    let mut server = ScriptedServer::accept(&mut accepted).await.unwrap();
    server.send(&GatewayMessage::hello(45_000)).await.unwrap();
    let resume = server.expect_op(OpCode::Resume).await.unwrap();
    assert_eq!(resume.as_resume().unwrap().session_id, "s-1");
}

// ============================================================================
// Reconnect and resume
// ============================================================================

#[tokio::test]
async fn test_unexpected_drop_resumes_with_last_sequence() {
    let (client, transport, mut accepted) = scripted_client(test_config()).unwrap();
    let mut events = client.subscribe(EventCategories::CONNECTION);
    let server = connect_steady(&client, &mut accepted, ready("s-1"))
        .await
        .unwrap();

    server
        .send(&GatewayMessage::dispatch("CHANNEL_CREATE", 2, channel(101, Some(GUILD_ID), "news")))
        .await
        .unwrap();
    server
        .send(&GatewayMessage::dispatch("CHANNEL_CREATE", 3, channel(102, Some(GUILD_ID), "dev")))
        .await
        .unwrap();
    server.close(None).await.unwrap();

    let lost = next_event(&mut events, |e| matches!(e, ClientEvent::Disconnected { .. }))
        .await
        .unwrap();
    assert!(matches!(lost, ClientEvent::Disconnected { epoch: 1, reconnecting: true, .. }));

    let mut server = ScriptedServer::accept(&mut accepted).await.unwrap();
    assert_eq!(
        transport.urls().last().map(String::as_str),
        Some("wss://resume.gateway.test/?v=10&encoding=json")
    );

    server.send(&GatewayMessage::hello(45_000)).await.unwrap();
    let resume = server.next_message().await.unwrap();
    let payload = resume.as_resume().unwrap();
    assert_eq!(payload.session_id, "s-1");
    assert_eq!(payload.seq, 3);
    assert_eq!(payload.token, "test-token");

    server
        .send(&GatewayMessage::dispatch("RESUMED", 4, json!({})))
        .await
        .unwrap();
    assert!(wait_for_state(&client, SessionState::Steady).await);

    let restored = next_event(&mut events, |e| matches!(e, ClientEvent::Connected { .. }))
        .await
        .unwrap();
    assert_eq!(
        restored,
        ClientEvent::Connected {
            epoch: 2,
            resumed: true
        }
    );
    // Cache survives a resume
    assert!(client.get_entity(EntityKind::Channel, Snowflake::new(102)).is_some());
}

#[tokio::test]
async fn test_reconnect_survives_refused_attempts() {
    let (client, transport, mut accepted) = scripted_client(test_config()).unwrap();
    let server = connect_steady(&client, &mut accepted, ready("s-1"))
        .await
        .unwrap();

    transport.fail_next(3);
    server.close(Some(4000)).await.unwrap();

    let mut server = ScriptedServer::accept(&mut accepted).await.unwrap();
    assert_eq!(transport.attempts(), 5);

    server.send(&GatewayMessage::hello(45_000)).await.unwrap();
    server.expect_op(OpCode::Resume).await.unwrap();
    assert_eq!(client.session_state(), SessionState::Resuming);

    server
        .send(&GatewayMessage::dispatch("RESUMED", 2, json!({})))
        .await
        .unwrap();
    assert!(wait_for_state(&client, SessionState::Steady).await);
}

#[tokio::test]
async fn test_gives_up_after_max_attempts() {
    let config = test_config().with_max_reconnect_attempts(Some(2));
    let (client, transport, mut accepted) = scripted_client(config).unwrap();
    let server = connect_steady(&client, &mut accepted, ready("s-1"))
        .await
        .unwrap();

    transport.fail_next(10);
    server.close(None).await.unwrap();

    let err = tokio::time::timeout(STEP_TIMEOUT, client.closed())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(err, ClientError::SessionClosed(_)));
    // The first connection plus two retries
    assert_eq!(transport.attempts(), 3);
}

#[tokio::test]
async fn test_server_reconnect_request() {
    let (client, _transport, mut accepted) = scripted_client(test_config()).unwrap();
    let mut server = connect_steady(&client, &mut accepted, ready("s-1"))
        .await
        .unwrap();

    server.send(&GatewayMessage::reconnect()).await.unwrap();
    let close = loop {
        if let Outbound::Close { code, .. } = server.next_outbound().await.unwrap() {
            break code;
        }
    };
    assert_ne!(close, 1000);

    let mut server = ScriptedServer::accept(&mut accepted).await.unwrap();
    server.send(&GatewayMessage::hello(45_000)).await.unwrap();
    server.expect_op(OpCode::Resume).await.unwrap();
}

#[tokio::test]
async fn test_invalid_session_reidentifies() {
    let (client, transport, mut accepted) = scripted_client(test_config()).unwrap();
    let server = connect_steady(&client, &mut accepted, ready("s-1"))
        .await
        .unwrap();

    server
        .send(&GatewayMessage::invalid_session(false))
        .await
        .unwrap();

    let mut server = ScriptedServer::accept(&mut accepted).await.unwrap();
    assert_eq!(
        transport.urls().last().map(String::as_str),
        Some("wss://gateway.test/?v=10&encoding=json")
    );
    server.identify(ready("s-2")).await.unwrap();
    assert!(wait_for(STEP_TIMEOUT, || {
        client
            .session()
            .is_some_and(|s| s.session_id() == Some("s-2"))
    })
    .await);
}

#[tokio::test]
async fn test_resumable_invalid_session_resumes() {
    let (client, transport, mut accepted) = scripted_client(test_config()).unwrap();
    let server = connect_steady(&client, &mut accepted, ready("s-1"))
        .await
        .unwrap();

    server
        .send(&GatewayMessage::dispatch("CHANNEL_CREATE", 2, channel(101, Some(GUILD_ID), "news")))
        .await
        .unwrap();
    let state = client.state().clone();
    assert!(wait_for(STEP_TIMEOUT, || state.channel(Snowflake::new(101)).is_some()).await);

    server
        .send(&GatewayMessage::invalid_session(true))
        .await
        .unwrap();

    let mut server = ScriptedServer::accept(&mut accepted).await.unwrap();
    assert_eq!(
        transport.urls().last().map(String::as_str),
        Some("wss://resume.gateway.test/?v=10&encoding=json")
    );
    server.send(&GatewayMessage::hello(45_000)).await.unwrap();
    let resume = server.next_message().await.unwrap();
    let payload = resume.as_resume().unwrap();
    assert_eq!(payload.session_id, "s-1");
    assert_eq!(payload.seq, 2);

    // Resuming keeps the cache; nothing is rebuilt
    assert!(state.channel(Snowflake::new(101)).is_some());
    assert!(state.channel(Snowflake::new(CHANNEL_ID)).is_some());

    server
        .send(&GatewayMessage::dispatch("RESUMED", 3, json!({})))
        .await
        .unwrap();
    assert!(wait_for_state(&client, SessionState::Steady).await);
    assert!(state.channel(Snowflake::new(101)).is_some());
    assert_eq!(client.session().unwrap().session_id(), Some("s-1"));
}

#[tokio::test]
async fn test_invalid_sequence_close_reidentifies() {
    let (client, _transport, mut accepted) = scripted_client(test_config()).unwrap();
    let server = connect_steady(&client, &mut accepted, ready("s-1"))
        .await
        .unwrap();

    server.close(Some(4007)).await.unwrap();

    let mut server = ScriptedServer::accept(&mut accepted).await.unwrap();
    let identify = server.identify(ready("s-2")).await.unwrap();
    assert_eq!(identify.op, OpCode::Identify);
    assert!(wait_for_state(&client, SessionState::Steady).await);
}

// ============================================================================
// Frames
// ============================================================================

#[tokio::test]
async fn test_duplicate_sequence_dropped() {
    let (client, _transport, mut accepted) = scripted_client(test_config()).unwrap();
    let server = connect_steady(&client, &mut accepted, ready("s-1"))
        .await
        .unwrap();

    server
        .send(&GatewayMessage::dispatch("CHANNEL_UPDATE", 2, json!({"id": "100", "name": "first"})))
        .await
        .unwrap();
    server
        .send(&GatewayMessage::dispatch("CHANNEL_UPDATE", 2, json!({"id": "100", "name": "replayed"})))
        .await
        .unwrap();
    server
        .send(&GatewayMessage::dispatch("CHANNEL_CREATE", 3, channel(101, Some(GUILD_ID), "marker")))
        .await
        .unwrap();

    let state = client.state().clone();
    assert!(wait_for(STEP_TIMEOUT, || state.channel(Snowflake::new(101)).is_some()).await);
    assert_eq!(
        state.channel(Snowflake::new(CHANNEL_ID)).unwrap().name.as_deref(),
        Some("first")
    );
    assert_eq!(client.session().unwrap().sequence(), Some(3));
}

#[tokio::test]
async fn test_fragmented_frame_reassembled() {
    let (client, _transport, mut accepted) = scripted_client(test_config()).unwrap();
    let server = connect_steady(&client, &mut accepted, ready("s-1"))
        .await
        .unwrap();

    let guild = guild(2, "second", vec![channel(200, None, "lobby")], vec![member(SELF_ID, "me")]);
    server
        .send_fragmented(&GatewayMessage::dispatch("GUILD_CREATE", 2, guild), 4)
        .await
        .unwrap();

    let state = client.state().clone();
    assert!(wait_for(STEP_TIMEOUT, || state.channel(Snowflake::new(200)).is_some()).await);
    assert_eq!(
        state.channel(Snowflake::new(200)).unwrap().guild_id,
        Some(Snowflake::new(2))
    );
}

#[tokio::test]
async fn test_malformed_frame_is_dropped() {
    let (client, _transport, mut accepted) = scripted_client(test_config()).unwrap();
    let server = connect_steady(&client, &mut accepted, ready("s-1"))
        .await
        .unwrap();

    server.send_raw("{not json").await.unwrap();
    server
        .send(&GatewayMessage::dispatch("SOMETHING_NEW", 2, json!({"x": 1})))
        .await
        .unwrap();
    server
        .send(&GatewayMessage::dispatch("CHANNEL_CREATE", 3, channel(101, Some(GUILD_ID), "after")))
        .await
        .unwrap();

    let state = client.state().clone();
    assert!(wait_for(STEP_TIMEOUT, || state.channel(Snowflake::new(101)).is_some()).await);
    assert_eq!(client.session_state(), SessionState::Steady);
}

// ============================================================================
// Disconnect
// ============================================================================

#[tokio::test]
async fn test_disconnect_is_terminal() {
    let (client, transport, mut accepted) = scripted_client(test_config()).unwrap();
    let mut events = client.subscribe(EventCategories::CONNECTION);
    let mut server = connect_steady(&client, &mut accepted, ready("s-1"))
        .await
        .unwrap();

    client.disconnect().await.unwrap();

    let close = loop {
        if let Outbound::Close { code, .. } = server.next_outbound().await.unwrap() {
            break code;
        }
    };
    assert_eq!(close, 1000);

    let lost = next_event(&mut events, |e| matches!(e, ClientEvent::Disconnected { .. }))
        .await
        .unwrap();
    assert!(matches!(lost, ClientEvent::Disconnected { reconnecting: false, .. }));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(transport.attempts(), 1);
    assert_eq!(client.session_state(), SessionState::Disconnected);
    assert!(matches!(client.disconnect().await, Err(ClientError::NotConnected)));
}

#[tokio::test]
async fn test_reconnect_after_disconnect_identifies_fresh() {
    let (client, _transport, mut accepted) = scripted_client(test_config()).unwrap();
    let _server = connect_steady(&client, &mut accepted, ready("s-1"))
        .await
        .unwrap();
    client.disconnect().await.unwrap();

    let _server = connect_steady(&client, &mut accepted, ready("s-2"))
        .await
        .unwrap();
    assert_eq!(client.session().unwrap().session_id(), Some("s-2"));
}
