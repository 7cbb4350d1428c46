//! Network and disk throughput checks
//!
//! Both compare the byte delta since the previous tick against a KiB/s
//! threshold. The first tick only records a baseline and allows.

use async_trait::async_trait;
use slumber_api::Verdict;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;
use sysinfo::Networks;

use super::{CheckError, CheckResult, PolicyCheck};

/// Keeps the machine awake while network throughput is at or above the
/// threshold.
pub struct NetworkRateCheck {
    threshold_kbps: u64,
    devices: Vec<String>,
    networks: Networks,
    last_sample: Option<Instant>,
}

impl NetworkRateCheck {
    pub fn new(threshold_kbps: u64, devices: Vec<String>) -> Self {
        Self {
            threshold_kbps,
            devices,
            networks: Networks::new_with_refreshed_list(),
            last_sample: None,
        }
    }

    fn monitored(&self, name: &str) -> bool {
        if self.devices.is_empty() {
            name != "lo"
        } else {
            self.devices.iter().any(|d| d == name)
        }
    }
}

#[async_trait]
impl PolicyCheck for NetworkRateCheck {
    fn name(&self) -> &'static str {
        "network"
    }

    async fn check(&mut self) -> CheckResult {
        self.networks.refresh();
        let elapsed = self.last_sample.map(|t| t.elapsed());
        self.last_sample = Some(Instant::now());

        let Some(elapsed) = elapsed else {
            return Ok(Verdict::allow());
        };

        let bytes: u64 = self
            .networks
            .iter()
            .filter(|(name, _)| self.monitored(name.as_str()))
            .map(|(_, data)| data.received() + data.transmitted())
            .sum();

        let kbps = rate_kbps(bytes, elapsed.as_secs_f64());
        Ok(if kbps >= self.threshold_kbps {
            Verdict::suspend(format!(
                "Network throughput at {} KiB/s (threshold {} KiB/s)",
                kbps, self.threshold_kbps
            ))
        } else {
            Verdict::allow()
        })
    }
}

/// Keeps the machine awake while disk throughput is at or above the
/// threshold. Reads sector counters from the diskstats interface.
pub struct DiskRateCheck {
    threshold_kbps: u64,
    devices: Vec<String>,
    diskstats_path: PathBuf,
    /// Previous (sectors read, sectors written) per device
    previous: HashMap<String, (u64, u64)>,
    last_sample: Option<Instant>,
}

/// Standard sector unit used by the diskstats counters
const SECTOR_SIZE: u64 = 512;

impl DiskRateCheck {
    pub fn new(threshold_kbps: u64, devices: Vec<String>) -> Self {
        Self::with_path(threshold_kbps, devices, PathBuf::from("/proc/diskstats"))
    }

    pub fn with_path(threshold_kbps: u64, devices: Vec<String>, diskstats_path: PathBuf) -> Self {
        Self {
            threshold_kbps,
            devices,
            diskstats_path,
            previous: HashMap::new(),
            last_sample: None,
        }
    }

    fn monitored(&self, name: &str) -> bool {
        if self.devices.is_empty() {
            !name.starts_with("loop") && !name.starts_with("ram")
        } else {
            self.devices.iter().any(|d| d == name)
        }
    }

    fn read_counters(&self) -> Result<HashMap<String, (u64, u64)>, CheckError> {
        let content = std::fs::read_to_string(&self.diskstats_path)?;
        let mut counters = HashMap::new();
        for line in content.lines() {
            let fields: Vec<&str> = line.split_whitespace().collect();
            // maj min name reads _ sectors_read _ writes _ sectors_written ...
            if fields.len() < 10 {
                continue;
            }
            let name = fields[2];
            if !self.monitored(name) {
                continue;
            }
            let sectors_read = parse_counter(fields[5])?;
            let sectors_written = parse_counter(fields[9])?;
            counters.insert(name.to_string(), (sectors_read, sectors_written));
        }
        Ok(counters)
    }
}

fn parse_counter(s: &str) -> Result<u64, CheckError> {
    s.parse().map_err(|_| CheckError::Parse {
        source_name: "diskstats",
        message: format!("bad counter '{}'", s),
    })
}

fn rate_kbps(bytes: u64, elapsed_secs: f64) -> u64 {
    if elapsed_secs <= 0.0 {
        return 0;
    }
    (bytes as f64 / 1024.0 / elapsed_secs) as u64
}

#[async_trait]
impl PolicyCheck for DiskRateCheck {
    fn name(&self) -> &'static str {
        "disk"
    }

    async fn check(&mut self) -> CheckResult {
        let counters = self.read_counters()?;
        let elapsed = self.last_sample.map(|t| t.elapsed());
        self.last_sample = Some(Instant::now());

        let previous = std::mem::replace(&mut self.previous, counters);
        let Some(elapsed) = elapsed else {
            return Ok(Verdict::allow());
        };

        let bytes: u64 = self
            .previous
            .iter()
            .filter_map(|(name, (read, written))| {
                let (prev_read, prev_written) = previous.get(name)?;
                Some(
                    read.saturating_sub(*prev_read)
                        .saturating_add(written.saturating_sub(*prev_written))
                        .saturating_mul(SECTOR_SIZE),
                )
            })
            .sum();

        let kbps = rate_kbps(bytes, elapsed.as_secs_f64());
        Ok(if kbps >= self.threshold_kbps {
            Verdict::suspend(format!(
                "Disk throughput at {} KiB/s (threshold {} KiB/s)",
                kbps, self.threshold_kbps
            ))
        } else {
            Verdict::allow()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diskstats_line(name: &str, sectors_read: u64, sectors_written: u64) -> String {
        format!(
            "   8       0 {} 100 0 {} 500 200 0 {} 900 0 300 1400\n",
            name, sectors_read, sectors_written
        )
    }

    #[tokio::test]
    async fn disk_delta_above_threshold_suspends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("diskstats");
        std::fs::write(&path, diskstats_line("sda", 1000, 1000)).unwrap();

        let mut check = DiskRateCheck::with_path(1, vec!["sda".into()], path.clone());
        // Baseline tick.
        assert!(!check.check().await.unwrap().suspend);

        std::fs::write(&path, diskstats_line("sda", 2_000_000, 2_000_000)).unwrap();
        let verdict = check.check().await.unwrap();
        assert!(verdict.suspend);
        assert!(verdict.reason.contains("Disk throughput"));
    }

    #[tokio::test]
    async fn disk_idle_allows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("diskstats");
        std::fs::write(&path, diskstats_line("sda", 1000, 1000)).unwrap();

        let mut check = DiskRateCheck::with_path(u64::MAX, vec![], path.clone());
        assert!(!check.check().await.unwrap().suspend);
        assert!(!check.check().await.unwrap().suspend);
    }

    #[tokio::test]
    async fn unmonitored_device_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("diskstats");
        std::fs::write(&path, diskstats_line("loop0", 0, 0)).unwrap();

        let mut check = DiskRateCheck::with_path(1, vec![], path.clone());
        assert!(!check.check().await.unwrap().suspend);

        std::fs::write(&path, diskstats_line("loop0", 9_000_000, 9_000_000)).unwrap();
        assert!(!check.check().await.unwrap().suspend);
    }

    #[tokio::test]
    async fn missing_diskstats_is_an_error() {
        let mut check =
            DiskRateCheck::with_path(1, vec![], PathBuf::from("/nonexistent/diskstats"));
        assert!(check.check().await.is_err());
    }

    #[tokio::test]
    async fn network_baseline_tick_allows() {
        let mut check = NetworkRateCheck::new(0, vec![]);
        // First tick records the baseline regardless of threshold.
        assert!(!check.check().await.unwrap().suspend);
    }

    #[test]
    fn rate_math() {
        assert_eq!(rate_kbps(1024 * 100, 10.0), 10);
        assert_eq!(rate_kbps(0, 10.0), 0);
        assert_eq!(rate_kbps(1024, 0.0), 0);
    }
}
