//! ID-to-ID relationship edges
//!
//! Edges are never pruned when the entity they point at is removed.
//! Readers resolve each child ID through its entity store, so a dangling
//! edge reads as "not found" rather than stale data.

use std::collections::HashSet;

use chat_core::Snowflake;
use dashmap::DashMap;

/// One-to-many edge set (guild → channels, channel → messages, ...)
#[derive(Debug, Default)]
pub struct RelationIndex {
    edges: DashMap<Snowflake, HashSet<Snowflake>>,
}

impl RelationIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `child` belongs to `parent`
    pub fn link(&self, parent: Snowflake, child: Snowflake) {
        self.edges.entry(parent).or_default().insert(child);
    }

    /// Drop a single edge, cleaning up the parent entry when it empties
    pub fn unlink(&self, parent: Snowflake, child: Snowflake) {
        self.edges.alter(&parent, |_, mut children| {
            children.remove(&child);
            children
        });
        self.edges
            .remove_if(&parent, |_, children| children.is_empty());
    }

    /// Child IDs recorded under `parent`
    pub fn children(&self, parent: Snowflake) -> Vec<Snowflake> {
        self.edges
            .get(&parent)
            .map(|children| children.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, parent: Snowflake, child: Snowflake) -> bool {
        self.edges
            .get(&parent)
            .is_some_and(|children| children.contains(&child))
    }

    pub fn clear(&self) {
        self.edges.clear();
    }
}
