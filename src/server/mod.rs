//! Server records and derived status.
//!
//! A [`ServerConfig`] is owned by the external store; the manager only reads it
//! when a server becomes active and rewrites `last_started_at` on start.

pub mod java;
pub mod phase;
pub mod properties;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use phase::{PhaseMachine, ServerPhase, TransitionError};

/// Server engine flavour. Jar download lives outside the core; the manager
/// only prepares the directory before launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    #[default]
    Vanilla,
    Forge,
}

impl EngineKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Vanilla => "Vanilla",
            Self::Forge => "Forge",
        }
    }

    /// Accept the EULA and make sure `server.properties` carries the game
    /// port and the RCON settings from the record. Other keys are left alone.
    pub async fn prepare(&self, server: &ServerConfig) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&server.path).await?;
        tokio::fs::write(server.path.join("eula.txt"), "eula=true\n").await?;

        let path = server.properties_path();
        let mut props = properties::ServerProperties::load(&path).await?;
        props.set("server-port", server.port.to_string());
        props.set("enable-rcon", "true");
        props.set("rcon.port", server.rcon_port.to_string());
        props.set("rcon.password", server.rcon_password.clone());
        props.save(&path).await?;

        tracing::debug!("Prepared {} server '{}' in {}", self.display_name(), server.name, server.path.display());
        Ok(())
    }
}

/// One managed Minecraft server installation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub engine: EngineKind,
    pub mc_version: String,
    /// Installation directory, also the process working directory
    pub path: PathBuf,
    pub port: u16,
    pub ram_min: String,
    pub ram_max: String,
    #[serde(default = "default_rcon_host")]
    pub rcon_host: String,
    pub rcon_port: u16,
    pub rcon_password: String,
    pub created_at: DateTime<Local>,
    #[serde(default)]
    pub last_started_at: Option<DateTime<Local>>,
}

fn default_rcon_host() -> String {
    "127.0.0.1".to_string()
}

impl ServerConfig {
    /// Build a fresh record under `servers_dir/<name>` with a random RCON
    /// password and the RCON port placed ten above the game port.
    pub fn new(name: &str, mc_version: &str, engine: EngineKind, servers_dir: &Path) -> Self {
        let port = 25565;
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            engine,
            mc_version: mc_version.to_string(),
            path: servers_dir.join(name),
            port,
            ram_min: "4G".to_string(),
            ram_max: "10G".to_string(),
            rcon_host: default_rcon_host(),
            rcon_port: port + 10,
            rcon_password: uuid::Uuid::new_v4().simple().to_string(),
            created_at: Local::now(),
            last_started_at: None,
        }
    }

    pub fn jar_path(&self) -> PathBuf {
        self.path.join("server.jar")
    }

    pub fn world_path(&self) -> PathBuf {
        self.path.join("world")
    }

    pub fn properties_path(&self) -> PathBuf {
        self.path.join("server.properties")
    }
}

/// Point-in-time view of the active server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerStatus {
    pub phase: ServerPhase,
    pub is_running: bool,
    pub pid: Option<u32>,
    pub players_online: usize,
    pub players_max: u32,
    pub players: Vec<String>,
    pub uptime_secs: Option<u64>,
    pub memory_used_mb: Option<u64>,
    pub mc_version: Option<String>,
}

impl ServerStatus {
    pub fn inactive() -> Self {
        Self {
            phase: ServerPhase::NoActiveServer,
            is_running: false,
            pid: None,
            players_online: 0,
            players_max: properties::DEFAULT_MAX_PLAYERS,
            players: Vec::new(),
            uptime_secs: None,
            memory_used_mb: None,
            mc_version: None,
        }
    }
}
