//! Session lifecycle state

use serde::Serialize;

/// Lifecycle of a polling session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SessionState {
    /// Created, transport attached, nothing sent yet
    #[default]
    Idle,
    /// Handshake request sent, waiting for the version tag
    AwaitingHandshake,
    /// Handshake done, polling sensors
    Running,
    /// Transport released (stop, timeout or transport error)
    Stopped,
}

impl SessionState {
    /// Check if transition to target state is valid
    pub fn can_transition_to(&self, target: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, target),
            // Normal flow
            (Idle, AwaitingHandshake)
            | (AwaitingHandshake, Running)
            // Stop from any state
            | (Idle, Stopped)
            | (AwaitingHandshake, Stopped)
            | (Running, Stopped)
            // Restart with a fresh transport
            | (Stopped, AwaitingHandshake)
        )
    }

    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::AwaitingHandshake | SessionState::Running)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::AwaitingHandshake => write!(f, "AwaitingHandshake"),
            SessionState::Running => write!(f, "Running"),
            SessionState::Stopped => write!(f, "Stopped"),
        }
    }
}
