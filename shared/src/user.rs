use serde::{Deserialize, Serialize};
use std::time::Instant;

/// A participant in the realm.
///
/// Users are created on first successful authentication and persist across
/// disconnects, so a client can reconnect and resume its identity. The id is
/// server-assigned, unique and never reused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: u32,
    pub name: String,
    pub connected: bool,
    /// When the server last accepted a transaction-class operation (or a
    /// login) from this user. Local bookkeeping, never serialized.
    #[serde(skip)]
    pub last_transaction: Option<Instant>,
}

impl User {
    pub fn new(id: u32, name: String) -> Self {
        Self {
            id,
            name,
            connected: true,
            last_transaction: None,
        }
    }
}

// Wire identity only; the cooldown timestamp is server-side state.
impl PartialEq for User {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.name == other.name && self.connected == other.connected
    }
}

impl Eq for User {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_creation() {
        let user = User::new(3, "Ada".to_string());
        assert_eq!(user.id, 3);
        assert_eq!(user.name, "Ada");
        assert!(user.connected);
        assert!(user.last_transaction.is_none());
    }

    #[test]
    fn test_equality_ignores_cooldown_timestamp() {
        let mut a = User::new(1, "Ada".to_string());
        let b = User::new(1, "Ada".to_string());
        a.last_transaction = Some(Instant::now());
        assert_eq!(a, b);
    }
}
