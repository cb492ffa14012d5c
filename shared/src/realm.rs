//! The shared realm state every authenticated user observes and mutates.
//!
//! The realm is the single-writer model: the server applies one packet at a
//! time against it, and every consequence leaves through the emitter channel
//! as a [`RealmEvent`]. The realm itself knows nothing about live
//! connections; the session layer subscribes to the events and routes each
//! packet to the matching connection, dropping it silently when the target
//! user is offline.

use crate::packet::Packet;
use crate::user::User;
use log::debug;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Outbound notification: a packet is ready for a specific user.
#[derive(Debug)]
pub enum RealmEvent {
    Deliver { user_id: u32, packet: Packet },
}

/// Canonical list of users plus the monotonic id counter shared with the
/// key registry. Serializing a realm yields the snapshot carried by the
/// synchronization packet; the emitter never travels.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RealmData {
    pub users: Vec<User>,
    pub last_user_given_id: u32,
    #[serde(skip)]
    emitter: Option<mpsc::UnboundedSender<RealmEvent>>,
}

impl RealmData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wires the outbound channel the session layer listens on.
    pub fn set_emitter(&mut self, emitter: mpsc::UnboundedSender<RealmEvent>) {
        self.emitter = Some(emitter);
    }

    /// Creates and registers a new user. Returns None if the id is taken.
    pub fn add_user(&mut self, name: String, id: u32) -> Option<&User> {
        if self.user(id).is_some() {
            return None;
        }
        self.users.push(User::new(id, name));
        self.users.last()
    }

    pub fn user(&self, id: u32) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    pub fn user_mut(&mut self, id: u32) -> Option<&mut User> {
        self.users.iter_mut().find(|u| u.id == id)
    }

    /// Bumps and returns the id counter. Ids are never reused.
    pub fn next_user_id(&mut self) -> u32 {
        self.last_user_given_id += 1;
        self.last_user_given_id
    }

    /// Queues `packet` for every connected user.
    pub fn broadcast(&self, packet: Packet) {
        for user in self.users.iter().filter(|u| u.connected) {
            self.emit(user.id, packet.clone());
        }
    }

    /// As `broadcast`, but skips one user so the originator of an event is
    /// not told about its own action.
    pub fn broadcast_except(&self, packet: Packet, excluded_id: u32) {
        for user in self.users.iter().filter(|u| u.connected && u.id != excluded_id) {
            self.emit(user.id, packet.clone());
        }
    }

    /// Queues `packet` for a single user.
    pub fn send_to(&self, user_id: u32, packet: Packet) {
        self.emit(user_id, packet);
    }

    fn emit(&self, user_id: u32, packet: Packet) {
        match &self.emitter {
            Some(emitter) => {
                let _ = emitter.send(RealmEvent::Deliver { user_id, packet });
            }
            None => debug!("realm has no emitter, dropping packet for user {}", user_id),
        }
    }
}

impl PartialEq for RealmData {
    fn eq(&self, other: &Self) -> bool {
        self.users == other.users && self.last_user_given_id == other.last_user_given_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn realm_with_emitter() -> (RealmData, mpsc::UnboundedReceiver<RealmEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut realm = RealmData::new();
        realm.set_emitter(tx);
        (realm, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<RealmEvent>) -> Vec<u32> {
        let mut recipients = Vec::new();
        while let Ok(RealmEvent::Deliver { user_id, .. }) = rx.try_recv() {
            recipients.push(user_id);
        }
        recipients
    }

    #[test]
    fn test_add_user_rejects_duplicate_id() {
        let mut realm = RealmData::new();
        assert!(realm.add_user("Ada".to_string(), 1).is_some());
        assert!(realm.add_user("Grace".to_string(), 1).is_none());
        assert_eq!(realm.users.len(), 1);
    }

    #[test]
    fn test_next_user_id_is_monotonic() {
        let mut realm = RealmData::new();
        let first = realm.next_user_id();
        let second = realm.next_user_id();
        assert!(second > first);
        assert_eq!(realm.last_user_given_id, second);
    }

    #[test]
    fn test_broadcast_reaches_connected_users_only() {
        let (mut realm, mut rx) = realm_with_emitter();
        realm.add_user("Ada".to_string(), 1);
        realm.add_user("Grace".to_string(), 2);
        realm.add_user("Edsger".to_string(), 3);
        realm.user_mut(2).unwrap().connected = false;

        realm.broadcast(Packet::ChatMessage {
            user_id: 1,
            message: "hi".to_string(),
        });

        assert_eq!(drain(&mut rx), vec![1, 3]);
    }

    #[test]
    fn test_broadcast_except_skips_originator() {
        let (mut realm, mut rx) = realm_with_emitter();
        realm.add_user("Ada".to_string(), 1);
        realm.add_user("Grace".to_string(), 2);

        realm.broadcast_except(
            Packet::UserConnected {
                user_id: 1,
                connected: true,
            },
            1,
        );

        assert_eq!(drain(&mut rx), vec![2]);
    }

    #[test]
    fn test_send_to_targets_one_user() {
        let (mut realm, mut rx) = realm_with_emitter();
        realm.add_user("Ada".to_string(), 1);
        realm.add_user("Grace".to_string(), 2);

        realm.send_to(
            2,
            Packet::ChatMessage {
                user_id: 1,
                message: "psst".to_string(),
            },
        );

        assert_eq!(drain(&mut rx), vec![2]);
    }

    #[test]
    fn test_snapshot_equality_ignores_emitter() {
        let (mut realm, _rx) = realm_with_emitter();
        realm.add_user("Ada".to_string(), 1);

        let mut snapshot = realm.clone();
        snapshot.emitter = None;
        assert_eq!(realm, snapshot);
    }
}
