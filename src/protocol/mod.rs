pub mod commands;
pub mod packet;
pub mod rcon;

use thiserror::Error;

pub use packet::{PacketType, RconPacket};
pub use rcon::RconClient;

/// Remote console failure
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Connection failed: {0}")]
    ConnectionError(String),

    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Timeout: {0}")]
    TimeoutError(String),

    #[error("Malformed packet: {0}")]
    Malformed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ProtocolError::AuthError("bad password".into());
        assert_eq!(err.to_string(), "Authentication failed: bad password");
        let err = ProtocolError::Malformed("too short".into());
        assert!(err.to_string().contains("too short"));
    }
}
