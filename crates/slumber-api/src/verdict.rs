//! Policy check verdicts

use serde::{Deserialize, Serialize};

/// The result of one policy check: whether the machine must stay awake,
/// and why.
///
/// Immutable once constructed; every check produces a fresh one per tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// True means "do not sleep".
    pub suspend: bool,

    /// Human-readable justification, attached to the OS inhibition when
    /// the backend supports it.
    pub reason: String,
}

impl Verdict {
    /// The check found a reason to keep the machine awake.
    pub fn suspend(reason: impl Into<String>) -> Self {
        Self {
            suspend: true,
            reason: reason.into(),
        }
    }

    /// The check has no objection to sleeping.
    pub fn allow() -> Self {
        Self {
            suspend: false,
            reason: String::new(),
        }
    }

    /// Append an attribution suffix to the reason (used for plugin
    /// verdicts).
    pub fn attributed_to(mut self, name: &str) -> Self {
        if self.suspend {
            self.reason.push_str(" [");
            self.reason.push_str(name);
            self.reason.push(']');
        }
        self
    }
}
