//! Shared fixtures: an in-process RCON server and a shell script that
//! plays the part of a Minecraft server.

#![allow(dead_code)]

use mc_keeper::protocol::{PacketType, RconPacket};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Minimal RCON server.
///
/// Commands are answered with `reply: <command>` except:
/// - `list` answers like vanilla with no one online
/// - `drop` closes the connection without answering
/// - `slow` answers after two seconds
pub struct FakeRcon {
    pub port: u16,
    pub commands: Arc<Mutex<Vec<String>>>,
    pub connections: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl FakeRcon {
    pub async fn start(password: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let commands = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));

        let password = password.to_string();
        let cmds = commands.clone();
        let conns = connections.clone();
        let task = tokio::spawn(async move {
            loop {
                let Ok((sock, _)) = listener.accept().await else { break };
                conns.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(sock, password.clone(), cmds.clone()));
            }
        });

        Self { port, commands, connections, task }
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

impl Drop for FakeRcon {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(mut sock: TcpStream, password: String, commands: Arc<Mutex<Vec<String>>>) {
    while let Some(packet) = read_frame(&mut sock).await {
        let reply = match packet.kind {
            PacketType::Auth if packet.payload == password => {
                RconPacket::new(packet.id, PacketType::Command, "")
            }
            PacketType::Auth => RconPacket::new(-1, PacketType::Command, ""),
            _ => {
                commands.lock().unwrap().push(packet.payload.clone());
                match packet.payload.as_str() {
                    "drop" => return,
                    "slow" => {
                        tokio::time::sleep(Duration::from_secs(2)).await;
                        RconPacket::new(packet.id, PacketType::Response, "finally")
                    }
                    "list" => RconPacket::new(
                        packet.id,
                        PacketType::Response,
                        "There are 0 of a max of 20 players online: ",
                    ),
                    other => RconPacket::new(packet.id, PacketType::Response, format!("reply: {}", other)),
                }
            }
        };
        if sock.write_all(&reply.encode()).await.is_err() {
            return;
        }
    }
}

async fn read_frame(sock: &mut TcpStream) -> Option<RconPacket> {
    let mut prefix = [0u8; 4];
    sock.read_exact(&mut prefix).await.ok()?;
    let body_len = RconPacket::body_len(prefix).ok()?;
    let mut frame = vec![0u8; 4 + body_len];
    frame[..4].copy_from_slice(&prefix);
    sock.read_exact(&mut frame[4..]).await.ok()?;
    RconPacket::decode(&frame).ok()
}

/// A port nothing listens on.
pub async fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Boots for 0.3 s, prints the ready line, then follows console input.
/// Every console line is also appended to `console.log` in the working
/// directory.
pub const FAKE_SERVER: &str = r#"echo "[12:00:00] [Server thread/INFO]: Starting minecraft server version 1.20.4"
sleep 0.3
echo '[12:00:01] [Server thread/INFO]: Done (0.300s)! For help, type "help"'
while read line; do
  echo "$line" >> console.log
  case "$line" in
    stop)
      echo "[12:00:09] [Server thread/INFO]: Stopping the server"
      exit 0 ;;
    "join "*)
      echo "[12:00:02] [Server thread/INFO]: ${line#join }[/127.0.0.1:50000] logged in with entity id 7 at (0.5, 64.0, 0.5)" ;;
    "leave "*)
      echo "[12:00:03] [Server thread/INFO]: ${line#leave } left the game" ;;
    crash)
      echo "Exception in server tick loop" >&2
      exit 1 ;;
    *)
      echo "[12:00:04] [Server thread/INFO]: $line" ;;
  esac
done"#;

#[cfg(unix)]
pub fn fake_java(dir: &std::path::Path, body: &str) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join("fake-java.sh");
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}
