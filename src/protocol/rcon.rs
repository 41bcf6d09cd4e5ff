use super::packet::{PacketType, RconPacket};
use super::ProtocolError;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

/// Async RCON client for a single Minecraft server.
///
/// - One TCP connection, authenticated once with the configured password
/// - Exchanges are serialized: write a request, read until the matching id
/// - Any I/O failure drops the connection; the next `command` reconnects once
///
/// Methods take `&self` so the client can be shared behind an `Arc`.
pub struct RconClient {
    host: String,
    port: u16,
    password: String,
    connect_timeout: Duration,
    stream: Mutex<Option<TcpStream>>,
    authenticated: AtomicBool,
    next_id: AtomicI32,
}

impl std::fmt::Debug for RconClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RconClient")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("authenticated", &self.is_connected())
            .finish()
    }
}

impl RconClient {
    pub fn new(host: impl Into<String>, port: u16, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            password: password.into(),
            connect_timeout: Duration::from_secs(5),
            stream: Mutex::new(None),
            authenticated: AtomicBool::new(false),
            next_id: AtomicI32::new(1),
        }
    }

    /// Timeout used by the implicit reconnect inside `command`.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_connected(&self) -> bool {
        self.authenticated.load(Ordering::Acquire)
    }

    /// Open the connection and authenticate. Returns false on refusal,
    /// timeout or a rejected password.
    pub async fn connect(&self, timeout: Duration) -> bool {
        let mut guard = self.stream.lock().await;
        self.open(&mut guard, timeout).await
    }

    /// Run a console command and return its response text.
    ///
    /// `None` means the command could not be delivered or answered in time;
    /// the session is then marked unauthenticated.
    pub async fn command(&self, text: &str, timeout: Duration) -> Option<String> {
        let mut guard = self.stream.lock().await;

        if !self.is_connected() || guard.is_none() {
            tracing::debug!("RCON session down, reconnecting to {}", self.address());
            if !self.open(&mut guard, self.connect_timeout).await {
                return None;
            }
        }

        let stream = guard.as_mut()?;
        let id = self.next_request_id();
        let request = RconPacket::new(id, PacketType::Command, text);

        let result = tokio::time::timeout(timeout, async {
            write_packet(stream, &request).await?;
            loop {
                let reply = read_packet(stream).await?;
                if reply.id == id {
                    return Ok::<_, ProtocolError>(reply.payload);
                }
                tracing::debug!("Skipping RCON packet with stale id {} (want {})", reply.id, id);
            }
        })
        .await;

        match result {
            Ok(Ok(payload)) => Some(payload),
            Ok(Err(e)) => {
                tracing::warn!("RCON command '{}' failed: {}", text, e);
                self.drop_session(&mut guard);
                None
            }
            Err(_) => {
                tracing::warn!("RCON command '{}' timed out after {:?}", text, timeout);
                self.drop_session(&mut guard);
                None
            }
        }
    }

    pub async fn disconnect(&self) {
        let mut guard = self.stream.lock().await;
        if guard.is_some() {
            tracing::info!("RCON client disconnected from {}", self.address());
        }
        self.drop_session(&mut guard);
    }

    async fn open(&self, slot: &mut Option<TcpStream>, timeout: Duration) -> bool {
        self.drop_session(slot);
        let addr = self.address();

        match tokio::time::timeout(timeout, self.handshake(&addr)).await {
            Ok(Ok(stream)) => {
                *slot = Some(stream);
                self.authenticated.store(true, Ordering::Release);
                tracing::info!("RCON client connected to {}", addr);
                true
            }
            Ok(Err(e)) => {
                tracing::warn!("RCON connect to {} failed: {}", addr, e);
                false
            }
            Err(_) => {
                tracing::warn!("RCON connect to {} timed out after {:?}", addr, timeout);
                false
            }
        }
    }

    async fn handshake(&self, addr: &str) -> Result<TcpStream, ProtocolError> {
        let mut stream = TcpStream::connect(addr)
            .await
            .map_err(|e| ProtocolError::ConnectionError(format!("{}: {}", addr, e)))?;

        let id = self.next_request_id();
        write_packet(&mut stream, &RconPacket::new(id, PacketType::Auth, self.password.as_str())).await?;

        loop {
            let reply = read_packet(&mut stream).await?;
            if reply.id == -1 {
                return Err(ProtocolError::AuthError("invalid password".to_string()));
            }
            // some servers emit an empty RESPONSE_VALUE before the auth reply
            if reply.kind == PacketType::Response && reply.payload.is_empty() && reply.id != id {
                continue;
            }
            if reply.id == id {
                return Ok(stream);
            }
            return Err(ProtocolError::AuthError(format!(
                "unexpected auth reply id {} (want {})",
                reply.id, id
            )));
        }
    }

    fn drop_session(&self, slot: &mut Option<TcpStream>) {
        self.authenticated.store(false, Ordering::Release);
        *slot = None;
    }

    /// Positive ids only; -1 is reserved for auth failure.
    fn next_request_id(&self) -> i32 {
        loop {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            if id > 0 {
                return id;
            }
            let _ = self.next_id.compare_exchange(id + 1, 1, Ordering::Relaxed, Ordering::Relaxed);
        }
    }
}

async fn write_packet(stream: &mut TcpStream, packet: &RconPacket) -> Result<(), ProtocolError> {
    stream.write_all(&packet.encode()).await?;
    stream.flush().await?;
    Ok(())
}

async fn read_packet(stream: &mut TcpStream) -> Result<RconPacket, ProtocolError> {
    let mut prefix = [0u8; 4];
    stream.read_exact(&mut prefix).await?;
    let body_len = RconPacket::body_len(prefix)?;

    let mut frame = vec![0u8; 4 + body_len];
    frame[..4].copy_from_slice(&prefix);
    stream.read_exact(&mut frame[4..]).await?;
    RconPacket::decode(&frame)
}
