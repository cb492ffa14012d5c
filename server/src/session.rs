//! Session manager: binds transport connections to user identities and
//! drives the packet dispatch state machine.
//!
//! All packet processing (decode, authenticate, rate-limit, apply,
//! broadcast) is serialized behind the realm mutex, so `apply`
//! implementations see exclusive realm access and broadcasts are never
//! interleaved. The Connection→User table is a lock-striped map because the
//! operator console reads and closes connections concurrently with the
//! event loop.

use crate::bans::BanList;
use crate::registry::KeyRegistry;
use crate::transport::{ConnectionHandle, TransportEvent};
use dashmap::DashMap;
use log::{debug, error, info, warn};
use shared::{
    decode, encode, Packet, RealmData, RealmEvent, Transaction, TransactionState,
    PROTOCOL_VERSION, TRANSACTION_COOLDOWN,
};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex};

/// Lifecycle of one transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unauthenticated,
    Authenticated(u32),
    Closed,
}

/// One live transport connection and its identity binding. At most one user
/// per connection, and at most one live connection per connected user.
#[derive(Debug, Clone)]
pub struct ConnectionEntry {
    pub handle: ConnectionHandle,
    pub state: ConnectionState,
}

/// State shared between the session loop and the operator console.
pub struct ServerState {
    pub connections: DashMap<u64, ConnectionEntry>,
    pub realm: Mutex<RealmData>,
    pub registry: Mutex<KeyRegistry>,
    pub bans: Mutex<BanList>,
}

impl ServerState {
    pub fn new(realm: RealmData) -> Self {
        Self {
            connections: DashMap::new(),
            realm: Mutex::new(realm),
            registry: Mutex::new(KeyRegistry::new()),
            bans: Mutex::new(BanList::new()),
        }
    }

    fn connection_for_user(&self, user_id: u32) -> Option<ConnectionHandle> {
        self.connections
            .iter()
            .find(|entry| entry.state == ConnectionState::Authenticated(user_id))
            .map(|entry| entry.handle.clone())
    }

    /// Marks a user disconnected in the realm and notifies everyone.
    async fn release_user(&self, user_id: u32) {
        let mut realm = self.realm.lock().await;
        if let Some(user) = realm.user_mut(user_id) {
            user.connected = false;
        }
        realm.broadcast(Packet::UserConnected {
            user_id,
            connected: false,
        });
    }

    /// Forcibly closes the live connection bound to `user_id`, if any.
    /// Returns true when a connection was actually closed.
    pub async fn disconnect_user(&self, user_id: u32) -> bool {
        let mut found = false;
        for mut entry in self.connections.iter_mut() {
            if entry.state == ConnectionState::Authenticated(user_id) {
                entry.state = ConnectionState::Closed;
                entry.handle.close();
                found = true;
            }
        }
        if found {
            self.release_user(user_id).await;
            info!("closed live connection of user {}", user_id);
        }
        found
    }

    /// Forcibly closes every live connection from `addr`. Returns how many
    /// connections were closed.
    pub async fn disconnect_address(&self, addr: IpAddr) -> usize {
        let mut closed = 0;
        let mut released = Vec::new();
        for mut entry in self.connections.iter_mut() {
            if entry.handle.addr().ip() != addr || entry.state == ConnectionState::Closed {
                continue;
            }
            if let ConnectionState::Authenticated(user_id) = entry.state {
                released.push(user_id);
            }
            entry.state = ConnectionState::Closed;
            entry.handle.close();
            closed += 1;
        }
        for user_id in released {
            self.release_user(user_id).await;
        }
        if closed > 0 {
            info!("closed {} live connection(s) from {}", closed, addr);
        }
        closed
    }
}

/// The single consumer of transport and realm events. Owning both receivers
/// in one select loop is what serializes all realm mutation.
pub struct SessionServer {
    state: Arc<ServerState>,
    transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
    realm_rx: mpsc::UnboundedReceiver<RealmEvent>,
}

impl SessionServer {
    pub fn new(
        state: Arc<ServerState>,
        transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
        realm_rx: mpsc::UnboundedReceiver<RealmEvent>,
    ) -> Self {
        Self {
            state,
            transport_rx,
            realm_rx,
        }
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                event = self.transport_rx.recv() => match event {
                    Some(TransportEvent::Connected(handle)) => self.handle_connect(handle).await,
                    Some(TransportEvent::Message { id, bytes }) => self.handle_message(id, bytes).await,
                    Some(TransportEvent::Disconnected { id }) => self.handle_disconnect(id).await,
                    None => break,
                },
                event = self.realm_rx.recv() => match event {
                    Some(RealmEvent::Deliver { user_id, packet }) => self.deliver(user_id, packet).await,
                    None => break,
                },
            }
        }
        info!("session loop stopped");
    }

    /// New connection: IP-banned addresses are closed before a single
    /// message of theirs is processed.
    async fn handle_connect(&self, handle: ConnectionHandle) {
        let banned = {
            let bans = self.state.bans.lock().await;
            bans.is_address_banned(&handle.addr().ip())
        };

        let state = if banned {
            info!("refusing banned address {}", handle.addr());
            handle.close();
            ConnectionState::Closed
        } else {
            debug!("connection {} from {}", handle.id(), handle.addr());
            ConnectionState::Unauthenticated
        };

        self.state
            .connections
            .insert(handle.id(), ConnectionEntry { handle, state });
    }

    async fn handle_message(&self, id: u64, bytes: Vec<u8>) {
        // Clone out of the map so no shard lock is held across an await.
        let Some(entry) = self.state.connections.get(&id).map(|e| e.value().clone()) else {
            debug!("message from unknown connection {}", id);
            return;
        };

        match entry.state {
            ConnectionState::Closed => debug!("dropping message from closed connection {}", id),
            ConnectionState::Unauthenticated => self.process_unauthenticated(entry, bytes).await,
            ConnectionState::Authenticated(user_id) => {
                self.process_authenticated(entry, user_id, bytes).await;
            }
        }
    }

    async fn process_unauthenticated(&self, entry: ConnectionEntry, bytes: Vec<u8>) {
        let mut realm = self.state.realm.lock().await;

        let packet = match decode(&bytes, &realm, None) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("malformed packet from {}: {}", entry.handle.addr(), e);
                return;
            }
        };

        match packet {
            Packet::Authentication {
                version,
                name,
                hashed_key,
                id,
            } => {
                self.authenticate(&mut realm, &entry, version, name, hashed_key, id)
                    .await;
            }
            other => {
                // No user context exists to apply anything else against.
                warn!(
                    "unauthenticated connection {} sent {}, dropping",
                    entry.handle.id(),
                    other.kind()
                );
            }
        }
    }

    /// The Unauthenticated → Authenticated transition.
    async fn authenticate(
        &self,
        realm: &mut RealmData,
        entry: &ConnectionEntry,
        version: u32,
        name: String,
        hashed_key: String,
        requested_id: Option<u32>,
    ) {
        // Version gate first: nothing else in the packet is trusted until
        // the client speaks the same protocol.
        if version != PROTOCOL_VERSION {
            info!(
                "connection {} version mismatch (server {}, client {})",
                entry.handle.id(),
                PROTOCOL_VERSION,
                version
            );
            let reply = Packet::AuthenticationError {
                error: format!(
                    "server is running protocol version {}, client presented {}",
                    PROTOCOL_VERSION, version
                ),
            };
            match encode(&reply, realm, None) {
                Ok(reply_bytes) => entry.handle.send(reply_bytes),
                Err(e) => error!("failed to encode authentication error: {}", e),
            }
            return;
        }

        // Key-ban gate: banned keys are cut off with no reply.
        if self.state.bans.lock().await.is_key_banned(&hashed_key) {
            info!(
                "closing connection {}: banned key presented from {}",
                entry.handle.id(),
                entry.handle.addr()
            );
            if let Some(mut stored) = self.state.connections.get_mut(&entry.handle.id()) {
                stored.state = ConnectionState::Closed;
            }
            entry.handle.close();
            return;
        }

        let user_id = self
            .state
            .registry
            .lock()
            .await
            .register_or_reuse(requested_id, &hashed_key, realm);

        if realm.user(user_id).is_none() {
            if realm.add_user(name.clone(), user_id).is_none() {
                error!("user id {} collided, refusing authentication", user_id);
                return;
            }
            info!("new user {} ({}) from {}", user_id, name, entry.handle.addr());
            let user = realm.user(user_id).cloned();
            if let Some(user) = user {
                realm.broadcast_except(Packet::NewUser { user }, user_id);
            }
        } else {
            // Reconnect. If the identity is still bound to an older live
            // connection, that connection is superseded.
            if let Some(old) = self.state.connection_for_user(user_id) {
                if old.id() != entry.handle.id() {
                    info!(
                        "user {} superseded connection {} with {}",
                        user_id,
                        old.id(),
                        entry.handle.id()
                    );
                    if let Some(mut stored) = self.state.connections.get_mut(&old.id()) {
                        stored.state = ConnectionState::Closed;
                    }
                    old.close();
                }
            }
            if let Some(user) = realm.user_mut(user_id) {
                user.connected = true;
                user.name = name.clone();
            }
            info!("user {} ({}) reconnected from {}", user_id, name, entry.handle.addr());
            realm.broadcast_except(
                Packet::UserConnected {
                    user_id,
                    connected: true,
                },
                user_id,
            );
        }

        // A fresh login also starts the anti-spam cooldown window.
        if let Some(user) = realm.user_mut(user_id) {
            user.last_transaction = Some(Instant::now());
        }

        match self.state.connections.get_mut(&entry.handle.id()) {
            Some(mut stored) if stored.state != ConnectionState::Closed => {
                stored.state = ConnectionState::Authenticated(user_id);
            }
            // Closed (or removed) while authenticating, e.g. by a console
            // ban; do not resurrect the binding.
            _ => return,
        }

        realm.send_to(
            user_id,
            Packet::Synchronization {
                realm: realm.clone(),
                user_id,
            },
        );
    }

    async fn process_authenticated(&self, entry: ConnectionEntry, user_id: u32, bytes: Vec<u8>) {
        let mut realm = self.state.realm.lock().await;

        let Some(acting) = realm.user(user_id).cloned() else {
            error!("connection {} bound to unknown user {}", entry.handle.id(), user_id);
            return;
        };

        let packet = match decode(&bytes, &realm, Some(&acting)) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("malformed packet from user {}: {}", user_id, e);
                return;
            }
        };

        match packet {
            Packet::Authentication { .. } => {
                warn!("connection {} is already authenticated", entry.handle.id());
            }
            Packet::StartTransaction { transaction } => {
                self.start_transaction(&mut realm, user_id, transaction);
            }
            other => other.apply(user_id, &mut realm),
        }
    }

    /// Applies the transaction-rate policy, then the transaction itself.
    /// The cooldown timer resets only on accepted transactions, so a spammer
    /// cannot push its own window forward by being rejected.
    fn start_transaction(&self, realm: &mut RealmData, user_id: u32, transaction: Transaction) {
        let too_fast = realm
            .user(user_id)
            .and_then(|u| u.last_transaction)
            .map(|at| at.elapsed() < TRANSACTION_COOLDOWN)
            .unwrap_or(false);

        if too_fast {
            debug!("transaction from user {} rejected: too fast", user_id);
            let mut rejected = transaction;
            rejected.sender_id = user_id;
            rejected.state = TransactionState::TooFast;
            realm.send_to(
                user_id,
                Packet::ConfirmTransaction {
                    transaction: rejected,
                },
            );
            return;
        }

        if let Some(user) = realm.user_mut(user_id) {
            user.last_transaction = Some(Instant::now());
        }
        Packet::StartTransaction { transaction }.apply(user_id, realm);
    }

    /// Routes a realm delivery to the target user's live connection.
    /// Offline users do not receive queued traffic.
    async fn deliver(&self, user_id: u32, packet: Packet) {
        let Some(handle) = self.state.connection_for_user(user_id) else {
            debug!("user {} offline, dropping {}", user_id, packet.kind());
            return;
        };

        let realm = self.state.realm.lock().await;
        let target = realm.user(user_id).cloned();
        match encode(&packet, &realm, target.as_ref()) {
            Ok(bytes) => handle.send(bytes),
            Err(e) => error!("failed to encode {} for user {}: {}", packet.kind(), user_id, e),
        }
    }

    async fn handle_disconnect(&self, id: u64) {
        let Some((_, entry)) = self.state.connections.remove(&id) else {
            return;
        };

        if let ConnectionState::Authenticated(user_id) = entry.state {
            info!("user {} disconnected", user_id);
            self.state.release_user(user_id).await;
        } else {
            debug!("connection {} closed", id);
        }
    }
}
