pub mod backup;
pub mod config;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod protocol;
pub mod server;
pub mod shutdown;
pub mod store;
pub mod supervisor;

pub use error::{KeeperError, Result};
pub use orchestrator::{Notification, ServerManager};
