//! Field-level merge primitives
//!
//! Partial payloads only carry the fields that changed. Each helper here
//! applies one incoming field to one cached slot, leaving the slot alone
//! when the field was absent. All of them are idempotent, so replaying a
//! payload never changes the result.
//!
//! Nullable wire fields are modelled as `Option<Option<T>>`:
//!
//! | JSON            | Rust             | Effect           |
//! |-----------------|------------------|------------------|
//! | field missing   | `None`           | keep cached      |
//! | `null`          | `Some(None)`     | clear cached     |
//! | value           | `Some(Some(v))`  | overwrite cached |

use serde::{Deserialize, Deserializer};

/// Deserializer for `Option<Option<T>>` fields that keeps `null` distinct
/// from a missing field.
///
/// Use together with `#[serde(default)]`.
pub fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

/// Overwrite `slot` when the incoming value is present.
#[inline]
pub fn set<T: Clone>(slot: &mut Option<T>, incoming: Option<&T>) {
    if let Some(value) = incoming {
        *slot = Some(value.clone());
    }
}

/// Overwrite a non-optional `slot` when the incoming value is present.
#[inline]
pub fn set_value<T: Clone>(slot: &mut T, incoming: Option<&T>) {
    if let Some(value) = incoming {
        *slot = value.clone();
    }
}

/// Apply a nullable field: present values overwrite, explicit nulls clear.
#[inline]
pub fn set_nullable<T: Clone>(slot: &mut Option<T>, incoming: Option<&Option<T>>) {
    if let Some(value) = incoming {
        *slot = value.clone();
    }
}

/// Set `slot` only if it holds nothing yet.
///
/// Used for payloads that may be older than the cached state: they can
/// complete a record but never overwrite it.
#[inline]
pub fn fill<T: Clone>(slot: &mut Option<T>, incoming: Option<&T>) {
    if slot.is_none() {
        set(slot, incoming);
    }
}

/// [`fill`] for nullable fields; an incoming null never clears anything.
#[inline]
pub fn fill_nullable<T: Clone>(slot: &mut Option<T>, incoming: Option<&Option<T>>) {
    fill(slot, incoming.and_then(Option::as_ref));
}

/// Keep the greatest value ever seen.
///
/// Used for fields whose freshness is defined by their own ordering
/// (activity timestamps, last message IDs) so that late or replayed
/// payloads cannot move them backwards.
#[inline]
pub fn set_latest<T: Ord + Copy>(slot: &mut Option<T>, incoming: Option<T>) {
    if let Some(value) = incoming {
        *slot = Some(match *slot {
            Some(current) if current >= value => current,
            _ => value,
        });
    }
}
