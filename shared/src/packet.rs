//! The closed set of protocol messages.
//!
//! Each realm-mutating variant carries its own `apply` behavior, so the
//! dispatch site resolves the variant exactly once at decode time instead of
//! re-inspecting it at every call site. Authentication and transaction-rate
//! policy run in the session layer before `apply` is reached.

use crate::realm::RealmData;
use crate::user::User;
use log::warn;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Packet {
    // Client -> server
    Authentication {
        version: u32,
        name: String,
        hashed_key: String,
        id: Option<u32>,
    },
    StartTransaction {
        transaction: Transaction,
    },

    // Server -> client
    AuthenticationError {
        error: String,
    },
    /// Full-state reply sent once, immediately after successful
    /// authentication. `user_id` resolves against the embedded snapshot.
    Synchronization {
        realm: RealmData,
        user_id: u32,
    },
    NewUser {
        user: User,
    },
    /// Connection-state change for an existing user; `connected` is true on
    /// reconnect and false on disconnect.
    UserConnected {
        user_id: u32,
        connected: bool,
    },

    // Either direction
    ChatMessage {
        user_id: u32,
        message: String,
    },
    ChangeNickname {
        user_id: u32,
        name: String,
    },
    ConfirmTransaction {
        transaction: Transaction,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionState {
    Pending,
    Accepted,
    TooFast,
    Declined,
}

/// A client-proposed state change subject to the cooldown policy. The server
/// stamps `state` before echoing the transaction back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: u32,
    pub sender_id: u32,
    pub receiver_id: u32,
    pub state: TransactionState,
}

impl Packet {
    /// Variant name for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Packet::Authentication { .. } => "Authentication",
            Packet::AuthenticationError { .. } => "AuthenticationError",
            Packet::Synchronization { .. } => "Synchronization",
            Packet::NewUser { .. } => "NewUser",
            Packet::UserConnected { .. } => "UserConnected",
            Packet::ChatMessage { .. } => "ChatMessage",
            Packet::ChangeNickname { .. } => "ChangeNickname",
            Packet::StartTransaction { .. } => "StartTransaction",
            Packet::ConfirmTransaction { .. } => "ConfirmTransaction",
        }
    }

    /// Applies this packet's realm mutation on behalf of the acting user and
    /// queues the resulting broadcasts. The caller holds the realm lock, so
    /// exclusive access may be assumed.
    pub fn apply(&self, acting_id: u32, realm: &mut RealmData) {
        match self {
            Packet::ChatMessage { message, .. } => {
                // The sender field is stamped server-side; clients cannot
                // speak as someone else.
                realm.broadcast(Packet::ChatMessage {
                    user_id: acting_id,
                    message: message.clone(),
                });
            }
            Packet::ChangeNickname { name, .. } => {
                if let Some(user) = realm.user_mut(acting_id) {
                    user.name = name.clone();
                }
                realm.broadcast_except(
                    Packet::ChangeNickname {
                        user_id: acting_id,
                        name: name.clone(),
                    },
                    acting_id,
                );
            }
            Packet::StartTransaction { transaction } => {
                // Rate limiting happened upstream. Forward the proposal to
                // the receiver and confirm acceptance to the sender.
                let mut proposal = transaction.clone();
                proposal.sender_id = acting_id;
                proposal.state = TransactionState::Pending;
                let mut accepted = proposal.clone();
                accepted.state = TransactionState::Accepted;
                realm.send_to(
                    proposal.receiver_id,
                    Packet::StartTransaction {
                        transaction: proposal,
                    },
                );
                realm.send_to(
                    acting_id,
                    Packet::ConfirmTransaction {
                        transaction: accepted,
                    },
                );
            }
            Packet::ConfirmTransaction { transaction } => {
                // A party answering a proposal; route the outcome to the
                // counterparty.
                let target = if transaction.receiver_id == acting_id {
                    transaction.sender_id
                } else {
                    transaction.receiver_id
                };
                realm.send_to(
                    target,
                    Packet::ConfirmTransaction {
                        transaction: transaction.clone(),
                    },
                );
            }
            other => {
                warn!(
                    "user {} sent server-side packet {}, ignoring",
                    acting_id,
                    other.kind()
                );
            }
        }
    }
}
