//! Network share access check

use async_trait::async_trait;
use slumber_api::Verdict;
use std::process::Stdio;
use tokio::process::Command;

use super::{CheckError, CheckResult, PolicyCheck};

/// Keeps the machine awake while any SMB client has a share open.
///
/// Parses `smbstatus -b` (brief listing, one connected session per line
/// after the header).
pub struct ShareCheck {
    command: String,
}

impl ShareCheck {
    pub fn new() -> Self {
        Self {
            command: "smbstatus".into(),
        }
    }

    #[cfg(test)]
    fn with_command(command: &str) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Default for ShareCheck {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PolicyCheck for ShareCheck {
    fn name(&self) -> &'static str {
        "shares"
    }

    async fn check(&mut self) -> CheckResult {
        let output = Command::new(&self.command)
            .arg("-b")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| CheckError::CommandFailed {
                command: format!("{} -b", self.command),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(CheckError::CommandFailed {
                command: format!("{} -b", self.command),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let sessions = count_sessions(&stdout);
        Ok(if sessions > 0 {
            Verdict::suspend(format!("{} SMB session(s) connected", sessions))
        } else {
            Verdict::allow()
        })
    }
}

/// Count session lines in brief smbstatus output.
///
/// The listing starts after a dashed separator line; every non-empty line
/// after it is one connected session.
fn count_sessions(output: &str) -> usize {
    output
        .lines()
        .skip_while(|line| !line.starts_with("----"))
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .count()
}
