//! Cache synchronization scenarios
//!
//! Dispatch events arrive through a scripted gateway; lookups the stream
//! cannot answer go to a static hydrator.
//!
//! Run with: cargo test -p integration-tests --test cache_tests

use chat_cache::{CacheConfig, HydrationRequest, StateManager};
use chat_client::GatewayMessage;
use chat_core::{ClientEvent, EntityKind, EventCategories, Snowflake};
use chrono::{TimeZone, Utc};
use integration_tests::{
    connect_steady, fixtures::*, next_event, scripted_client, test_config, wait_for,
    StaticHydrator, STEP_TIMEOUT,
};
use serde_json::json;

// ============================================================================
// Merge through the stream
// ============================================================================

#[tokio::test]
async fn test_channel_update_preserves_unchanged_fields() {
    let (client, _transport, mut accepted) = scripted_client(test_config()).unwrap();
    let mut events = client.subscribe(EventCategories::ENTITY);
    let server = connect_steady(&client, &mut accepted, ready_with_unavailable_guild("s-1"))
        .await
        .unwrap();

    server
        .send(&GatewayMessage::dispatch(
            "CHANNEL_CREATE",
            2,
            channel(CHANNEL_ID, Some(GUILD_ID), "general"),
        ))
        .await
        .unwrap();
    server
        .send(&GatewayMessage::dispatch(
            "CHANNEL_UPDATE",
            3,
            json!({"id": CHANNEL_ID.to_string(), "name": "general-chat"}),
        ))
        .await
        .unwrap();

    let updated = next_event(&mut events, |e| {
        matches!(e, ClientEvent::Updated { after, .. } if after.id() == Snowflake::new(CHANNEL_ID))
    })
    .await
    .unwrap();
    let ClientEvent::Updated { before, after } = updated else {
        unreachable!()
    };
    assert_eq!(before.as_channel().unwrap().name.as_deref(), Some("general"));
    assert_eq!(after.as_channel().unwrap().name.as_deref(), Some("general-chat"));

    let snapshot = client
        .get_entity(EntityKind::Channel, Snowflake::new(CHANNEL_ID))
        .unwrap();
    let channel = snapshot.as_channel().unwrap();
    assert_eq!(channel.name.as_deref(), Some("general-chat"));
    assert_eq!(channel.guild_id, Some(Snowflake::new(GUILD_ID)));
}

#[tokio::test]
async fn test_unavailable_guild_filled_by_guild_create() {
    let (client, _transport, mut accepted) = scripted_client(test_config()).unwrap();
    let server = connect_steady(&client, &mut accepted, ready_with_unavailable_guild("s-1"))
        .await
        .unwrap();

    let state = client.state().clone();
    assert!(state.guild(Snowflake::new(GUILD_ID)).unwrap().unavailable);

    server
        .send(&GatewayMessage::dispatch(
            "GUILD_CREATE",
            2,
            guild(GUILD_ID, "home", vec![channel(CHANNEL_ID, None, "general")], vec![]),
        ))
        .await
        .unwrap();
    assert!(wait_for(STEP_TIMEOUT, || {
        state.guild(Snowflake::new(GUILD_ID)).is_some_and(|g| g.is_available())
    })
    .await);
    assert_eq!(state.guild_channels(Snowflake::new(GUILD_ID)).len(), 1);

    // An outage keeps the guild, flagged
    server
        .send(&GatewayMessage::dispatch(
            "GUILD_DELETE",
            3,
            json!({"id": GUILD_ID.to_string(), "unavailable": true}),
        ))
        .await
        .unwrap();
    assert!(wait_for(STEP_TIMEOUT, || {
        state.guild(Snowflake::new(GUILD_ID)).is_some_and(|g| g.unavailable)
    })
    .await);
}

#[tokio::test]
async fn test_reidentify_rebuilds_cache_from_snapshot() {
    let (client, _transport, mut accepted) = scripted_client(test_config()).unwrap();
    let server = connect_steady(&client, &mut accepted, ready("s-1"))
        .await
        .unwrap();

    server
        .send(&GatewayMessage::dispatch("CHANNEL_CREATE", 2, channel(300, Some(GUILD_ID), "temp")))
        .await
        .unwrap();
    let state = client.state().clone();
    assert!(wait_for(STEP_TIMEOUT, || state.channel(Snowflake::new(300)).is_some()).await);

    server
        .send(&GatewayMessage::invalid_session(false))
        .await
        .unwrap();
    let mut server = integration_tests::ScriptedServer::accept(&mut accepted)
        .await
        .unwrap();
    server.identify(ready("s-2")).await.unwrap();

    assert!(wait_for(STEP_TIMEOUT, || {
        client
            .session()
            .is_some_and(|s| s.session_id() == Some("s-2"))
    })
    .await);
    assert!(state.channel(Snowflake::new(300)).is_none());
    assert!(state.channel(Snowflake::new(CHANNEL_ID)).is_some());
    assert!(state
        .find(EntityKind::Channel, |c| c.id() == Snowflake::new(300))
        .is_none());
}

// ============================================================================
// Removal
// ============================================================================

#[tokio::test]
async fn test_remove_absent_raises_nothing() {
    let state = StateManager::new_shared(CacheConfig::default());
    let mut events = state.subscribe();

    assert!(state.remove(EntityKind::Channel, Snowflake::new(999)).is_none());
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_channel_delete_raises_one_removal() {
    let (client, _transport, mut accepted) = scripted_client(test_config()).unwrap();
    let mut events = client.subscribe(EventCategories::ENTITY);
    let server = connect_steady(&client, &mut accepted, ready("s-1"))
        .await
        .unwrap();

    server
        .send(&GatewayMessage::dispatch(
            "CHANNEL_DELETE",
            2,
            channel(CHANNEL_ID, Some(GUILD_ID), "general"),
        ))
        .await
        .unwrap();
    // Deleting again is a no-op
    server
        .send(&GatewayMessage::dispatch(
            "CHANNEL_DELETE",
            3,
            channel(CHANNEL_ID, Some(GUILD_ID), "general"),
        ))
        .await
        .unwrap();
    server
        .send(&GatewayMessage::dispatch("CHANNEL_CREATE", 4, channel(101, Some(GUILD_ID), "marker")))
        .await
        .unwrap();

    let removed = next_event(&mut events, |e| matches!(e, ClientEvent::Removed(_)))
        .await
        .unwrap();
    let ClientEvent::Removed(snapshot) = removed else {
        unreachable!()
    };
    assert_eq!(snapshot.id(), Snowflake::new(CHANNEL_ID));
    assert_eq!(snapshot.as_channel().unwrap().name.as_deref(), Some("general"));

    // Everything up to the marker, with no second removal in between
    let marker = next_event(&mut events, |e| {
        matches!(e, ClientEvent::Removed(_) | ClientEvent::Created(_))
    })
    .await
    .unwrap();
    assert!(matches!(marker, ClientEvent::Created(ref s) if s.id() == Snowflake::new(101)));
    assert!(client
        .get_entity(EntityKind::Channel, Snowflake::new(CHANNEL_ID))
        .is_none());
}

#[tokio::test]
async fn test_member_removal_keeps_user() {
    let (client, _transport, mut accepted) = scripted_client(test_config()).unwrap();
    let mut members = client.subscribe(EventCategories::MEMBER);
    let server = connect_steady(&client, &mut accepted, ready("s-1"))
        .await
        .unwrap();

    let mut joined = member(7, "ana");
    joined["guild_id"] = json!(GUILD_ID.to_string());
    server
        .send(&GatewayMessage::dispatch("GUILD_MEMBER_ADD", 2, joined))
        .await
        .unwrap();
    next_event(&mut members, |e| matches!(e, ClientEvent::MemberAdded(_)))
        .await
        .unwrap();

    server
        .send(&GatewayMessage::dispatch(
            "GUILD_MEMBER_REMOVE",
            3,
            json!({"guild_id": GUILD_ID.to_string(), "user": user(7, "ana")}),
        ))
        .await
        .unwrap();
    let removed = next_event(&mut members, |e| matches!(e, ClientEvent::MemberRemoved { .. }))
        .await
        .unwrap();
    assert!(matches!(
        removed,
        ClientEvent::MemberRemoved { member: Some(_), .. }
    ));

    let state = client.state();
    assert!(state.member(Snowflake::new(GUILD_ID), Snowflake::new(7)).is_none());
    assert_eq!(
        state.user(Snowflake::new(7)).unwrap().username.as_deref(),
        Some("ana")
    );
}

// ============================================================================
// Hydration
// ============================================================================

#[tokio::test]
async fn test_out_of_order_hydration_keeps_newer_activity() {
    let hydrator = StaticHydrator::new();
    let newer = message(55, CHANNEL_ID, 7, "edited", "2024-05-01T12:00:00Z");
    let older = message(55, CHANNEL_ID, 7, "original", "2024-05-01T11:00:00Z");
    // The newer response lands first
    hydrator.respond(EntityKind::Message, 55, newer);
    hydrator.respond(EntityKind::Message, 55, older);

    let state = StateManager::new_shared(CacheConfig::default());
    state.set_hydrator(hydrator.clone());

    let request = HydrationRequest::new(EntityKind::Message, Snowflake::new(55))
        .with_parent(Snowflake::new(CHANNEL_ID));
    state.hydrate(request).unwrap().await.unwrap();
    state.hydrate(request).unwrap().await.unwrap();

    assert_eq!(hydrator.requests().len(), 2);
    let author = state.user(Snowflake::new(7)).unwrap();
    assert_eq!(
        author.last_activity,
        Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
    );
    assert!(state.message(Snowflake::new(55)).is_some());
}

#[tokio::test]
async fn test_unknown_channel_is_hydrated() {
    let hydrator = StaticHydrator::new();
    hydrator.respond(EntityKind::Channel, 500, channel(500, Some(GUILD_ID), "hidden"));

    let (client, _transport, mut accepted) = scripted_client(test_config()).unwrap();
    client.state().set_hydrator(hydrator.clone());
    let server = connect_steady(&client, &mut accepted, ready("s-1"))
        .await
        .unwrap();

    let mut msg = message(9001, 500, 7, "hello", "2024-05-01T12:00:00Z");
    msg["guild_id"] = json!(GUILD_ID.to_string());
    server
        .send(&GatewayMessage::dispatch("MESSAGE_CREATE", 2, msg))
        .await
        .unwrap();

    let state = client.state().clone();
    assert!(wait_for(STEP_TIMEOUT, || {
        state
            .channel(Snowflake::new(500))
            .is_some_and(|c| c.name.as_deref() == Some("hidden"))
    })
    .await);
    assert!(hydrator
        .requests()
        .iter()
        .any(|r| r.kind == EntityKind::Channel && r.id == Snowflake::new(500)));
    assert_eq!(state.cached_messages(Snowflake::new(500)).len(), 1);
}

#[tokio::test]
async fn test_channel_history_hydrated_once() {
    let hydrator = StaticHydrator::new();
    hydrator.history(
        CHANNEL_ID,
        vec![
            message(61, CHANNEL_ID, 7, "second", "2024-05-01T12:01:00Z"),
            message(60, CHANNEL_ID, 8, "first", "2024-05-01T12:00:00Z"),
        ],
    );

    let state = StateManager::new_shared(CacheConfig::default());
    state.set_hydrator(hydrator);
    state.apply_guild_snapshot(
        &serde_json::from_value(guild(GUILD_ID, "home", vec![channel(CHANNEL_ID, None, "general")], vec![]))
            .unwrap(),
    );

    assert!(state.channel_messages(Snowflake::new(CHANNEL_ID)).is_empty());
    assert!(wait_for(STEP_TIMEOUT, || state.cached_messages(Snowflake::new(CHANNEL_ID)).len() == 2).await);

    let messages = state.channel_messages(Snowflake::new(CHANNEL_ID));
    assert_eq!(messages[0].id, Snowflake::new(60));
    assert_eq!(
        state.channel(Snowflake::new(CHANNEL_ID)).unwrap().last_message_id,
        Some(Snowflake::new(61))
    );
    // Already requested; a second read does not fetch again
    assert!(state.ensure_history(Snowflake::new(CHANNEL_ID)).is_none());
}

#[tokio::test]
async fn test_typing_advances_activity() {
    let (client, _transport, mut accepted) = scripted_client(test_config()).unwrap();
    let mut activity = client.subscribe(EventCategories::ACTIVITY);
    let server = connect_steady(&client, &mut accepted, ready("s-1"))
        .await
        .unwrap();

    server
        .send(&GatewayMessage::dispatch(
            "TYPING_START",
            2,
            json!({
                "channel_id": CHANNEL_ID.to_string(),
                "user_id": SELF_ID.to_string(),
                "timestamp": 1_714_564_800,
            }),
        ))
        .await
        .unwrap();

    let typing = next_event(&mut activity, |e| matches!(e, ClientEvent::TypingStarted { .. }))
        .await
        .unwrap();
    let ClientEvent::TypingStarted { at, user_id, .. } = typing else {
        unreachable!()
    };
    assert_eq!(user_id, Snowflake::new(SELF_ID));
    assert_eq!(at, Utc.timestamp_opt(1_714_564_800, 0).unwrap());
    assert_eq!(
        client.state().user(Snowflake::new(SELF_ID)).unwrap().last_activity,
        Some(at)
    );
}
