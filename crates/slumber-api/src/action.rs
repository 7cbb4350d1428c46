//! Power actions

use serde::{Deserialize, Serialize};
use std::fmt;

/// A power state transition the agent can be asked to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerAction {
    Standby,
    Hibernate,
    Restart,
    Shutdown,
}

impl PowerAction {
    /// Whether performing this action ends the current OS session (and
    /// with it this process).
    pub fn is_terminal(&self) -> bool {
        matches!(self, PowerAction::Restart | PowerAction::Shutdown)
    }
}

impl fmt::Display for PowerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PowerAction::Standby => "standby",
            PowerAction::Hibernate => "hibernate",
            PowerAction::Restart => "restart",
            PowerAction::Shutdown => "shutdown",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names() {
        assert_eq!(PowerAction::Standby.to_string(), "standby");
        assert_eq!(PowerAction::Shutdown.to_string(), "shutdown");
    }

    #[test]
    fn terminal_actions() {
        assert!(!PowerAction::Standby.is_terminal());
        assert!(!PowerAction::Hibernate.is_terminal());
        assert!(PowerAction::Restart.is_terminal());
        assert!(PowerAction::Shutdown.is_terminal());
    }
}
