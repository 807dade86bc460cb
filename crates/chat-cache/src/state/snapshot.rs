//! Initial session snapshot

use chat_core::{ChannelPartial, GuildSnapshot, UserPartial};
use serde::Deserialize;

/// Bulk state delivered right after a successful identify
///
/// Guilds usually arrive as unavailable stubs here and are filled in by
/// one full guild payload each shortly after.
#[derive(Debug, Clone, Deserialize)]
pub struct ReadySnapshot {
    #[serde(rename = "v", default)]
    pub version: u8,
    pub user: UserPartial,
    pub session_id: String,
    #[serde(default)]
    pub resume_gateway_url: Option<String>,
    #[serde(default)]
    pub guilds: Vec<GuildSnapshot>,
    #[serde(default)]
    pub private_channels: Vec<ChannelPartial>,
}
