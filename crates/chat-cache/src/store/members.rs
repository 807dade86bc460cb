//! Membership edges keyed by (guild, user)

use chat_core::{Member, MemberPartial, Snowflake};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{RelationIndex, Upsert};

/// Membership records plus the guild → users and user → guilds edges
#[derive(Debug, Default)]
pub struct MemberStore {
    members: DashMap<(Snowflake, Snowflake), Member>,
    by_guild: RelationIndex,
    by_user: RelationIndex,
}

impl MemberStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, guild_id: Snowflake, user_id: Snowflake) -> Option<Member> {
        self.members.get(&(guild_id, user_id)).map(|m| m.clone())
    }

    /// Merge a membership payload, creating the edge if needed
    pub fn upsert(&self, guild_id: Snowflake, partial: &MemberPartial) -> Upsert<Member> {
        let user_id = partial.user.id;
        let result = match self.members.entry((guild_id, user_id)) {
            Entry::Occupied(mut occupied) => {
                let before = occupied.get().clone();
                occupied.get_mut().merge(partial);
                Upsert::Updated {
                    before,
                    after: occupied.get().clone(),
                }
            }
            Entry::Vacant(vacant) => {
                let mut member = Member::new(guild_id, user_id);
                member.merge(partial);
                vacant.insert(member.clone());
                Upsert::Created(member)
            }
        };

        self.by_guild.link(guild_id, user_id);
        self.by_user.link(user_id, guild_id);
        result
    }

    /// Remove a membership. The user record itself is untouched.
    pub fn remove(&self, guild_id: Snowflake, user_id: Snowflake) -> Option<Member> {
        let removed = self.members.remove(&(guild_id, user_id)).map(|(_, m)| m);
        self.by_guild.unlink(guild_id, user_id);
        self.by_user.unlink(user_id, guild_id);
        removed
    }

    /// Memberships of one guild
    pub fn in_guild(&self, guild_id: Snowflake) -> Vec<Member> {
        self.by_guild
            .children(guild_id)
            .into_iter()
            .filter_map(|user_id| self.get(guild_id, user_id))
            .collect()
    }

    /// Guild IDs the user is a member of
    pub fn guilds_of(&self, user_id: Snowflake) -> Vec<Snowflake> {
        self.by_user.children(user_id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn clear(&self) {
        self.members.clear();
        self.by_guild.clear();
        self.by_user.clear();
    }
}
