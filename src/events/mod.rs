pub mod bus;
pub mod classifier;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

pub use bus::{EventBus, Keyed, SubscriberId};
pub use classifier::LogClassifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ServerStarting,
    ServerStarted,
    ServerStopping,
    ServerStopped,
    PlayerJoined,
    PlayerLeft,
    PlayerChat,
    PlayerDied,
    PlayerAchievement,
    RconReady,
    WorldSaved,
    Warning,
    Error,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ServerStarting => "server_starting",
            Self::ServerStarted => "server_started",
            Self::ServerStopping => "server_stopping",
            Self::ServerStopped => "server_stopped",
            Self::PlayerJoined => "player_joined",
            Self::PlayerLeft => "player_left",
            Self::PlayerChat => "player_chat",
            Self::PlayerDied => "player_died",
            Self::PlayerAchievement => "player_achievement",
            Self::RconReady => "rcon_ready",
            Self::WorldSaved => "world_saved",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One classified line of server output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerEvent {
    pub kind: EventKind,
    pub timestamp: DateTime<Local>,
    pub player: Option<String>,
    pub message: Option<String>,
    pub raw_line: String,
}

impl Keyed for ServerEvent {
    type Kind = EventKind;

    fn kind(&self) -> EventKind {
        self.kind
    }
}
