//! `HubState` — the coordinator's own lifecycle state machine (spec §3).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum HubState {
    Starting,
    Ready,
    Restarting,
    Restarted,
    Stopping,
    Stopped,
    Error,
}

impl HubState {
    /// Transitions the hub coordinator is allowed to make. Broadcasting an
    /// illegal transition is a programming error, not a runtime one, so this
    /// is consulted by debug assertions rather than returning a `Result`.
    pub fn can_transition_to(self, next: HubState) -> bool {
        use HubState::*;
        matches!(
            (self, next),
            (Starting, Ready)
                | (Starting, Error)
                | (Ready, Restarting)
                | (Ready, Stopping)
                | (Ready, Error)
                | (Restarting, Restarted)
                | (Restarting, Error)
                | (Restarted, Ready)
                | (Stopping, Stopped)
                | (Stopping, Error)
                | (Error, Restarting)
                | (Error, Stopping)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starting_to_ready_allowed() {
        assert!(HubState::Starting.can_transition_to(HubState::Ready));
    }

    #[test]
    fn stopped_is_terminal() {
        assert!(!HubState::Stopped.can_transition_to(HubState::Ready));
        assert!(!HubState::Stopped.can_transition_to(HubState::Starting));
    }
}
