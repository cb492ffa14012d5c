//! Protocol library shared between the relay server and its clients.
//!
//! Everything that travels on the wire lives here: the packet set, the realm
//! state it mutates, the context-sensitive codec, and the protocol constants.
//! The crate performs no I/O; the server owns the sockets and feeds byte
//! buffers through [`decode`]/[`encode`].

use sha2::{Digest, Sha256};
use std::time::Duration;

pub mod codec;
pub mod packet;
pub mod realm;
pub mod user;

pub use codec::{decode, encode, ProtocolError};
pub use packet::{Packet, Transaction, TransactionState};
pub use realm::{RealmData, RealmEvent};
pub use user::User;

/// Version of the wire protocol. A client presenting any other value is
/// rejected at authentication before anything else is trusted.
pub const PROTOCOL_VERSION: u32 = 7;

/// Default port the server listens on.
pub const DEFAULT_PORT: u16 = 16180;

/// Minimum delay between accepted transaction-class operations per user.
pub const TRANSACTION_COOLDOWN: Duration = Duration::from_secs(3);

/// Hashes a client-held secret into the hex digest that travels on the wire.
///
/// The server never sees the secret itself; it stores and compares these
/// digests only.
pub fn hash_key(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_key_is_stable() {
        assert_eq!(hash_key("secret"), hash_key("secret"));
        assert_ne!(hash_key("secret"), hash_key("other"));
    }

    #[test]
    fn test_hash_key_is_hex_sha256() {
        let hash = hash_key("secret");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
