//! Key-hash and network-address ban sets.
//!
//! The two sets are independent: a key ban follows the identity across
//! addresses, an address ban blocks the endpoint regardless of key. Both
//! live for the server's lifetime; only the enforcement points differ
//! (authentication time for keys, connect time for addresses).

use std::collections::HashSet;
use std::net::IpAddr;

#[derive(Debug, Default)]
pub struct BanList {
    keys: HashSet<String>,
    addresses: HashSet<IpAddr>,
}

impl BanList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the hash was already banned.
    pub fn ban_key(&mut self, hash: String) -> bool {
        self.keys.insert(hash)
    }

    /// Returns false if the hash was not banned.
    pub fn unban_key(&mut self, hash: &str) -> bool {
        self.keys.remove(hash)
    }

    pub fn is_key_banned(&self, hash: &str) -> bool {
        self.keys.contains(hash)
    }

    pub fn ban_address(&mut self, addr: IpAddr) -> bool {
        self.addresses.insert(addr)
    }

    pub fn unban_address(&mut self, addr: &IpAddr) -> bool {
        self.addresses.remove(addr)
    }

    pub fn is_address_banned(&self, addr: &IpAddr) -> bool {
        self.addresses.contains(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_ban_cycle() {
        let mut bans = BanList::new();
        assert!(!bans.is_key_banned("abc"));

        assert!(bans.ban_key("abc".to_string()));
        assert!(!bans.ban_key("abc".to_string()));
        assert!(bans.is_key_banned("abc"));

        assert!(bans.unban_key("abc"));
        assert!(!bans.unban_key("abc"));
        assert!(!bans.is_key_banned("abc"));
    }

    #[test]
    fn test_address_ban_cycle() {
        let mut bans = BanList::new();
        let addr: IpAddr = "10.0.0.7".parse().unwrap();

        assert!(bans.ban_address(addr));
        assert!(bans.is_address_banned(&addr));
        assert!(bans.unban_address(&addr));
        assert!(!bans.is_address_banned(&addr));
    }

    #[test]
    fn test_sets_are_independent() {
        let mut bans = BanList::new();
        let addr: IpAddr = "10.0.0.7".parse().unwrap();
        bans.ban_key("abc".to_string());

        assert!(!bans.is_address_banned(&addr));
        bans.ban_address(addr);
        bans.unban_key("abc");
        assert!(bans.is_address_banned(&addr));
    }
}
