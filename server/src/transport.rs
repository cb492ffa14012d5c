//! TCP socket server: accepts connections, frames messages, and forwards
//! transport events to the session layer.
//!
//! Framing is a u32 big-endian length prefix followed by the payload, one
//! inbound event per frame. The transport knows nothing about the protocol;
//! it moves byte buffers and reports connect/disconnect, exactly the contract
//! the session layer consumes. Each connection gets a reader task and a
//! writer task; sends are fire-and-forget and ordered per connection only.

use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify};

/// Upper bound on a single framed message; anything larger drops the
/// connection instead of allocating.
const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Events delivered to the session layer, arbitrarily interleaved across
/// connections.
#[derive(Debug)]
pub enum TransportEvent {
    Connected(ConnectionHandle),
    Message { id: u64, bytes: Vec<u8> },
    Disconnected { id: u64 },
}

/// Instructions for a connection's writer task.
#[derive(Debug)]
pub enum Outbound {
    Frame(Vec<u8>),
    Close,
}

/// Cheap, cloneable handle to one live connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: u64,
    addr: SocketAddr,
    outbound: mpsc::UnboundedSender<Outbound>,
    closed: Arc<Notify>,
}

impl ConnectionHandle {
    pub fn new(id: u64, addr: SocketAddr, outbound: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            id,
            addr,
            outbound,
            closed: Arc::new(Notify::new()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Queues a frame for sending. Frames reach the peer in the order they
    /// were queued; there is no delivery guarantee or completion signal.
    pub fn send(&self, bytes: Vec<u8>) {
        if self.outbound.send(Outbound::Frame(bytes)).is_err() {
            debug!("connection {} gone, dropping outbound frame", self.id);
        }
    }

    /// Tears the connection down. The disconnect event follows once the
    /// reader task winds down.
    pub fn close(&self) {
        let _ = self.outbound.send(Outbound::Close);
        self.closed.notify_one();
    }
}

/// Binds the listener and spawns the accept loop. Failure to bind is the
/// only startup-fatal condition in the server.
pub async fn start(
    addr: SocketAddr,
    events: mpsc::UnboundedSender<TransportEvent>,
) -> std::io::Result<SocketAddr> {
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    info!("listening on {}", local_addr);
    tokio::spawn(accept_loop(listener, events));
    Ok(local_addr)
}

async fn accept_loop(listener: TcpListener, events: mpsc::UnboundedSender<TransportEvent>) {
    let mut next_id: u64 = 1;

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let id = next_id;
                next_id += 1;
                debug!("accepted connection {} from {}", id, addr);
                spawn_connection(id, stream, addr, events.clone());
            }
            Err(e) => {
                error!("accept failed: {}", e);
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }

        // Session loop gone means shutdown; stop accepting.
        if events.is_closed() {
            info!("session loop closed, transport stopping");
            break;
        }
    }
}

fn spawn_connection(
    id: u64,
    stream: TcpStream,
    addr: SocketAddr,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let (read_half, write_half) = stream.into_split();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let handle = ConnectionHandle::new(id, addr, outbound_tx);
    let closed = Arc::clone(&handle.closed);

    if events.send(TransportEvent::Connected(handle)).is_err() {
        return;
    }

    tokio::spawn(writer_loop(id, write_half, outbound_rx));
    tokio::spawn(reader_loop(id, read_half, closed, events));
}

async fn writer_loop(
    id: u64,
    mut write: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    while let Some(message) = outbound.recv().await {
        match message {
            Outbound::Frame(bytes) => {
                let len = (bytes.len() as u32).to_be_bytes();
                if write.write_all(&len).await.is_err() || write.write_all(&bytes).await.is_err() {
                    debug!("write to connection {} failed", id);
                    break;
                }
            }
            Outbound::Close => break,
        }
    }
    let _ = write.shutdown().await;
}

async fn reader_loop(
    id: u64,
    mut read: OwnedReadHalf,
    closed: Arc<Notify>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    loop {
        tokio::select! {
            _ = closed.notified() => break,
            frame = read_frame(&mut read) => match frame {
                Some(bytes) => {
                    if events.send(TransportEvent::Message { id, bytes }).is_err() {
                        return;
                    }
                }
                None => break,
            },
        }
    }
    let _ = events.send(TransportEvent::Disconnected { id });
}

async fn read_frame(read: &mut OwnedReadHalf) -> Option<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    read.read_exact(&mut len_buf).await.ok()?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        warn!("oversized frame ({} bytes), dropping connection", len);
        return None;
    }
    let mut bytes = vec![0u8; len];
    read.read_exact(&mut bytes).await.ok()?;
    Some(bytes)
}
