//! Symmetric, context-sensitive packet codec.
//!
//! Encoding and decoding both take the current realm snapshot and the acting
//! user, so user-id references can be checked against real state instead of
//! trusted blindly. The codec has no side effects and performs no I/O; a
//! packet that fails validation must not be applied.

use crate::packet::Packet;
use crate::realm::RealmData;
use crate::user::User;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed packet: {0}")]
    MalformedPacket(String),
    #[error("packet references unknown user id {0}")]
    UnknownUser(u32),
}

/// Serializes a packet destined for (or acted on by) `acting`.
pub fn encode(
    packet: &Packet,
    realm: &RealmData,
    acting: Option<&User>,
) -> Result<Vec<u8>, ProtocolError> {
    validate(packet, realm, acting)?;
    bincode::serialize(packet).map_err(|e| ProtocolError::MalformedPacket(e.to_string()))
}

/// Deserializes a byte buffer received from (or targeted at) `acting`.
pub fn decode(
    bytes: &[u8],
    realm: &RealmData,
    acting: Option<&User>,
) -> Result<Packet, ProtocolError> {
    let packet: Packet =
        bincode::deserialize(bytes).map_err(|e| ProtocolError::MalformedPacket(e.to_string()))?;
    validate(&packet, realm, acting)?;
    Ok(packet)
}

fn user_known(realm: &RealmData, acting: Option<&User>, id: u32) -> Result<(), ProtocolError> {
    if realm.user(id).is_some() || acting.map(|u| u.id == id).unwrap_or(false) {
        Ok(())
    } else {
        Err(ProtocolError::UnknownUser(id))
    }
}

fn validate(packet: &Packet, realm: &RealmData, acting: Option<&User>) -> Result<(), ProtocolError> {
    match packet {
        // Carries its own snapshot; the user reference must resolve inside it.
        Packet::Synchronization {
            realm: snapshot,
            user_id,
        } => {
            if snapshot.user(*user_id).is_none() {
                return Err(ProtocolError::UnknownUser(*user_id));
            }
        }
        Packet::UserConnected { user_id, .. }
        | Packet::ChatMessage { user_id, .. }
        | Packet::ChangeNickname { user_id, .. } => {
            user_known(realm, acting, *user_id)?;
        }
        Packet::StartTransaction { transaction } | Packet::ConfirmTransaction { transaction } => {
            user_known(realm, acting, transaction.sender_id)?;
            user_known(realm, acting, transaction.receiver_id)?;
        }
        // No user references before authentication completes, and NewUser
        // carries the not-yet-known user as its payload.
        Packet::Authentication { .. }
        | Packet::AuthenticationError { .. }
        | Packet::NewUser { .. } => {}
    }
    Ok(())
}
