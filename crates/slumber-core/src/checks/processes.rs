//! Monitored-process check

use async_trait::async_trait;
use slumber_api::Verdict;
use sysinfo::{ProcessRefreshKind, RefreshKind, System};

use super::{CheckResult, PolicyCheck};

/// Keeps the machine awake while any of the configured processes is
/// running. Matching is by process name, case-insensitive.
pub struct ProcessCheck {
    names: Vec<String>,
    system: System,
}

impl ProcessCheck {
    pub fn new(names: Vec<String>) -> Self {
        Self {
            names,
            system: System::new_with_specifics(
                RefreshKind::new().with_processes(ProcessRefreshKind::new()),
            ),
        }
    }

    fn running_process(&self) -> Option<&str> {
        self.system.processes().values().find_map(|process| {
            let name = process.name();
            self.names
                .iter()
                .any(|wanted| name_matches(wanted, name))
                .then_some(name)
        })
    }
}

/// The kernel truncates comm names to 15 bytes, so a configured
/// "transmission-daemon" must still match the reported "transmission-da".
fn name_matches(wanted: &str, reported: &str) -> bool {
    if wanted.eq_ignore_ascii_case(reported) {
        return true;
    }
    reported.len() == 15 && wanted.len() > 15 && wanted[..15].eq_ignore_ascii_case(reported)
}

#[async_trait]
impl PolicyCheck for ProcessCheck {
    fn name(&self) -> &'static str {
        "processes"
    }

    async fn check(&mut self) -> CheckResult {
        self.system.refresh_processes();
        Ok(match self.running_process() {
            Some(name) => Verdict::suspend(format!("Process '{}' is running", name)),
            None => Verdict::allow(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn finds_own_test_runner() {
        // The test binary itself is always running; current_exe gives us a
        // name guaranteed to be present in the process table.
        let me = std::env::current_exe().unwrap();
        let name = me.file_name().unwrap().to_string_lossy().into_owned();

        let mut check = ProcessCheck::new(vec![name]);
        let verdict = check.check().await.unwrap();
        assert!(verdict.suspend);
        assert!(verdict.reason.contains("is running"));
    }

    #[tokio::test]
    async fn absent_process_allows() {
        let mut check = ProcessCheck::new(vec!["no-such-process-zzz".into()]);
        assert!(!check.check().await.unwrap().suspend);
    }

    #[test]
    fn truncated_comm_names_match() {
        assert!(name_matches("transmission-daemon", "transmission-da"));
        assert!(name_matches("RSYNC", "rsync"));
        assert!(!name_matches("rsync", "rsyncd"));
    }
}
