use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle of the active server as seen by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerPhase {
    NoActiveServer,
    Stopped,
    Starting,
    Running,
    Stopping,
}

#[derive(Error, Debug)]
pub enum TransitionError {
    #[error("invalid transition: {0:?} -> {1:?}")]
    InvalidTransition(ServerPhase, ServerPhase),
}

pub struct PhaseMachine {
    pub phase: ServerPhase,
}

impl Default for PhaseMachine {
    fn default() -> Self {
        Self { phase: ServerPhase::NoActiveServer }
    }
}

impl PhaseMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn can_transition(&self, to: ServerPhase) -> bool {
        use ServerPhase::*;
        matches!(
            (self.phase, to),
            (NoActiveServer, Stopped)
                | (Stopped, Stopped)
                | (Stopped, Starting)
                | (Starting, Running)
                | (Starting, Stopping)
                | (Starting, Stopped)
                | (Running, Stopping)
                | (Running, Stopped)
                | (Stopping, Stopped)
        )
    }

    pub fn transition(&mut self, to: ServerPhase) -> Result<(), TransitionError> {
        if self.can_transition(to) {
            if self.phase != to {
                tracing::info!("Phase transition: {:?} -> {:?}", self.phase, to);
            }
            self.phase = to;
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition(self.phase, to))
        }
    }

    /// Process exit ends every phase except the server-less one.
    pub fn exited(&mut self) {
        if self.phase != ServerPhase::NoActiveServer {
            self.phase = ServerPhase::Stopped;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_transitions() {
        let mut sm = PhaseMachine::new();
        assert_eq!(sm.phase, ServerPhase::NoActiveServer);
        assert!(sm.transition(ServerPhase::Stopped).is_ok());
        assert!(sm.transition(ServerPhase::Starting).is_ok());
        assert!(sm.transition(ServerPhase::Running).is_ok());
        assert!(sm.transition(ServerPhase::Stopping).is_ok());
        assert!(sm.transition(ServerPhase::Stopped).is_ok());
    }

    #[test]
    fn crash_while_starting_goes_to_stopped() {
        let mut sm = PhaseMachine::new();
        sm.transition(ServerPhase::Stopped).unwrap();
        sm.transition(ServerPhase::Starting).unwrap();
        assert!(sm.transition(ServerPhase::Stopped).is_ok());
    }

    #[test]
    fn invalid_transition() {
        let mut sm = PhaseMachine::new();
        // no server selected, so nothing can start
        assert!(sm.transition(ServerPhase::Starting).is_err());
        sm.transition(ServerPhase::Stopped).unwrap();
        assert!(sm.transition(ServerPhase::Running).is_err());
    }

    #[test]
    fn running_only_from_starting() {
        let mut sm = PhaseMachine::new();
        sm.transition(ServerPhase::Stopped).unwrap();
        sm.transition(ServerPhase::Starting).unwrap();
        sm.transition(ServerPhase::Stopping).unwrap();
        assert!(sm.transition(ServerPhase::Running).is_err());
        assert_eq!(sm.phase, ServerPhase::Stopping);

        sm.transition(ServerPhase::Stopped).unwrap();
        sm.transition(ServerPhase::Starting).unwrap();
        sm.transition(ServerPhase::Running).unwrap();
        // a second ready line
        assert!(sm.transition(ServerPhase::Running).is_err());
    }

    #[test]
    fn exit_keeps_serverless_phase() {
        let mut sm = PhaseMachine::new();
        sm.exited();
        assert_eq!(sm.phase, ServerPhase::NoActiveServer);
        sm.transition(ServerPhase::Stopped).unwrap();
        sm.transition(ServerPhase::Starting).unwrap();
        sm.exited();
        assert_eq!(sm.phase, ServerPhase::Stopped);
    }
}
