//! Operator console: synchronous line commands driving abuse control and
//! the session table. Malformed input prints a diagnostic and touches no
//! server state.

use crate::session::{ConnectionState, ServerState};
use shared::PROTOCOL_VERSION;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Reads commands from stdin until the operator issues `exit` (or stdin
/// closes). Returning initiates server shutdown.
pub async fn run(state: Arc<ServerState>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("Type 'help' for a list of commands.");

    while let Ok(Some(line)) = lines.next_line().await {
        let mut parts = line.split_whitespace();
        match parts.next() {
            None => {}
            Some("help") => print_help(),
            Some("version") => println!(
                "server {} (protocol version {})",
                env!("CARGO_PKG_VERSION"),
                PROTOCOL_VERSION
            ),
            Some("clients") => list_clients(&state).await,
            Some("ban") => ban(&state, &parts.collect::<Vec<_>>()).await,
            Some("unban") => unban(&state, &parts.collect::<Vec<_>>()).await,
            Some("exit") => {
                println!("shutting down");
                return;
            }
            Some(command) => {
                println!("unknown command '{}'; type 'help' for a list of commands", command);
            }
        }
    }
}

fn print_help() {
    println!("Available commands:");
    println!("  help               show this message");
    println!("  version            print server and protocol versions");
    println!("  clients            list connected users");
    println!("  ban <id>           ban the key bound to a user id");
    println!("  ban ip <addr>      ban a network address");
    println!("  unban <id>         lift a key ban");
    println!("  unban ip <addr>    lift an address ban");
    println!("  exit               shut the server down");
}

async fn list_clients(state: &Arc<ServerState>) {
    // Addresses come from the connection table, names from the realm.
    let realm = state.realm.lock().await;
    let mut count = 0;
    for entry in state.connections.iter() {
        let ConnectionState::Authenticated(user_id) = entry.state else {
            continue;
        };
        let name = realm
            .user(user_id)
            .map(|u| u.name.clone())
            .unwrap_or_else(|| "<unknown>".to_string());
        println!("  {:>4}  {:<24}  {}", user_id, name, entry.handle.addr());
        count += 1;
    }
    println!("{} client(s) connected", count);
}

async fn ban(state: &Arc<ServerState>, args: &[&str]) {
    match args {
        ["ip", addr] => {
            let Ok(addr) = addr.parse::<IpAddr>() else {
                println!("'{}' is not a valid IP address", addr);
                return;
            };
            if !state.bans.lock().await.ban_address(addr) {
                println!("{} is already banned", addr);
                return;
            }
            let closed = state.disconnect_address(addr).await;
            println!("banned {} ({} live connection(s) closed)", addr, closed);
        }
        [id] => {
            let Some(user_id) = parse_user_id(id) else {
                return;
            };
            let hash = {
                let registry = state.registry.lock().await;
                registry.hash_for(user_id).map(str::to_string)
            };
            let Some(hash) = hash else {
                println!("no key was ever issued for user id {}", user_id);
                return;
            };
            if !state.bans.lock().await.ban_key(hash) {
                println!("user id {} is already banned", user_id);
                return;
            }
            state.disconnect_user(user_id).await;
            println!("banned user id {}", user_id);
        }
        _ => println!("usage: ban <id> | ban ip <addr>"),
    }
}

async fn unban(state: &Arc<ServerState>, args: &[&str]) {
    match args {
        ["ip", addr] => {
            let Ok(addr) = addr.parse::<IpAddr>() else {
                println!("'{}' is not a valid IP address", addr);
                return;
            };
            if state.bans.lock().await.unban_address(&addr) {
                println!("unbanned {}", addr);
            } else {
                println!("{} is not banned", addr);
            }
        }
        [id] => {
            let Some(user_id) = parse_user_id(id) else {
                return;
            };
            let hash = {
                let registry = state.registry.lock().await;
                registry.hash_for(user_id).map(str::to_string)
            };
            let Some(hash) = hash else {
                println!("no key was ever issued for user id {}", user_id);
                return;
            };
            if state.bans.lock().await.unban_key(&hash) {
                println!("unbanned user id {}", user_id);
            } else {
                println!("user id {} is not banned", user_id);
            }
        }
        _ => println!("usage: unban <id> | unban ip <addr>"),
    }
}

fn parse_user_id(arg: &str) -> Option<u32> {
    match arg.parse::<u32>() {
        Ok(id) if id > 0 => Some(id),
        _ => {
            println!("'{}' is not a valid user id (expected a positive integer)", arg);
            None
        }
    }
}
