//! Test fixtures and frame builders
//!
//! JSON payloads shaped like the gateway's, for scripting the server side.

use serde_json::{json, Value};

pub const SELF_ID: i64 = 42;
pub const GUILD_ID: i64 = 1;
pub const CHANNEL_ID: i64 = 100;

pub fn user(id: i64, username: &str) -> Value {
    json!({
        "id": id.to_string(),
        "username": username,
        "discriminator": "0001",
    })
}

pub fn channel(id: i64, guild_id: Option<i64>, name: &str) -> Value {
    let mut channel = json!({
        "id": id.to_string(),
        "type": 0,
        "name": name,
    });
    if let Some(guild_id) = guild_id {
        channel["guild_id"] = json!(guild_id.to_string());
    }
    channel
}

/// Full guild payload as sent in GUILD_CREATE
pub fn guild(id: i64, name: &str, channels: Vec<Value>, members: Vec<Value>) -> Value {
    json!({
        "id": id.to_string(),
        "name": name,
        "owner_id": SELF_ID.to_string(),
        "channels": channels,
        "roles": [{"id": id.to_string(), "name": "@everyone", "permissions": "0"}],
        "members": members,
    })
}

pub fn member(user_id: i64, username: &str) -> Value {
    json!({
        "user": user(user_id, username),
        "roles": [],
        "joined_at": "2024-01-01T00:00:00Z",
    })
}

/// Message payload; `timestamp` is RFC 3339
pub fn message(id: i64, channel_id: i64, author_id: i64, content: &str, timestamp: &str) -> Value {
    json!({
        "id": id.to_string(),
        "channel_id": channel_id.to_string(),
        "author": user(author_id, "author"),
        "content": content,
        "timestamp": timestamp,
    })
}

/// READY with one available guild holding channel 100
pub fn ready(session_id: &str) -> Value {
    json!({
        "v": 10,
        "user": user(SELF_ID, "me"),
        "session_id": session_id,
        "resume_gateway_url": "wss://resume.gateway.test",
        "guilds": [guild(
            GUILD_ID,
            "home",
            vec![channel(CHANNEL_ID, None, "general")],
            vec![member(SELF_ID, "me")],
        )],
        "private_channels": [],
    })
}

/// READY listing the guild as an unavailable stub
pub fn ready_with_unavailable_guild(session_id: &str) -> Value {
    json!({
        "v": 10,
        "user": user(SELF_ID, "me"),
        "session_id": session_id,
        "guilds": [{"id": GUILD_ID.to_string(), "unavailable": true}],
    })
}
