//! Identity/key registry: decides whether a reconnecting client gets its old
//! identity back or a freshly minted one.

use log::debug;
use shared::RealmData;
use std::collections::HashMap;

/// Maps server-issued user ids to the key hash that may reclaim them. The id
/// counter itself lives in the realm so user creation and the registry stay
/// on one sequence.
#[derive(Debug, Default)]
pub struct KeyRegistry {
    keys: HashMap<u32, String>,
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves the id for an authenticating client.
    ///
    /// A requested id is reused only when it was actually issued before and
    /// the stored hash matches the presented one. Every other case (no
    /// request, unknown id, id beyond the issued range, hash mismatch) mints
    /// a new id and binds it to the presented key, so a wrong key can never
    /// take over an existing identity.
    pub fn register_or_reuse(
        &mut self,
        requested: Option<u32>,
        hashed_key: &str,
        realm: &mut RealmData,
    ) -> u32 {
        if let Some(id) = requested {
            if id <= realm.last_user_given_id && self.keys.get(&id).map(String::as_str) == Some(hashed_key) {
                debug!("user id {} reclaimed by key", id);
                return id;
            }
        }

        let id = realm.next_user_id();
        self.keys.insert(id, hashed_key.to_string());
        debug!("minted user id {}", id);
        id
    }

    /// Hash bound to `id`, if that id was ever issued. Used to resolve a
    /// key-ban target from an operator-supplied user id.
    pub fn hash_for(&self, id: u32) -> Option<&str> {
        self.keys.get(&id).map(String::as_str)
    }
}
