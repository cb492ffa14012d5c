//! # Relay Server Library
//!
//! This library provides the authoritative relay server for the multiplayer
//! session layer. Many independent client connections share one mutable
//! realm; the server is the single writer that accepts client-issued
//! operations, validates them, mutates the shared state, and fans the
//! consequences out to every affected client.
//!
//! ## Core Responsibilities
//!
//! ### Identity Continuity
//! Connections are bound to server-assigned user identities. A client that
//! presents the key hash its identity was issued under gets its old id back
//! across reconnects; any mismatch forks a fresh identity instead of
//! overwriting someone else's credential.
//!
//! ### Serialized State Mutation
//! All packet processing runs behind a single coarse realm lock held by one
//! event loop, so at most one packet is applied to the realm at any instant
//! and broadcasts are never torn or interleaved.
//!
//! ### Abuse Resistance
//! Key bans, address bans, and a per-user cooldown on transaction-class
//! operations are enforced at the earliest point each can be decided:
//! connect time for addresses, authentication time for keys, dispatch time
//! for transactions.
//!
//! ## Module Organization
//!
//! ### Session Module (`session`)
//! The dispatch state machine: connection-to-identity binding, packet
//! routing, and the processing critical section.
//!
//! ### Transport Module (`transport`)
//! TCP listener and per-connection reader/writer tasks; frames byte buffers
//! and reports connect/message/disconnect events.
//!
//! ### Registry Module (`registry`)
//! The id-to-key-hash registry deciding reuse versus minting.
//!
//! ### Bans Module (`bans`)
//! Independent key-hash and network-address ban sets.
//!
//! ### Console Module (`console`)
//! Operator commands (ban/unban/clients/exit) driving the above.
//!
//! ### Config and Logging Modules (`config`, `logging`)
//! `key=value` file configuration with generated defaults, and leveled
//! logging to the console plus an append-only log file.

pub mod bans;
pub mod config;
pub mod console;
pub mod logging;
pub mod registry;
pub mod session;
pub mod transport;
