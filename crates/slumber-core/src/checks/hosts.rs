//! Monitored-host reachability check

use async_trait::async_trait;
use slumber_api::Verdict;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

use super::{CheckResult, PolicyCheck};

/// Keeps the machine awake while any of the configured hosts answers a
/// TCP connect probe.
///
/// A plain connect needs no privileges, unlike an ICMP echo. The default
/// probe port is the SMB port since the monitored hosts are typically the
/// same machines that mount this one's shares.
pub struct HostReachableCheck {
    hosts: Vec<String>,
    probe_port: u16,
    timeout: Duration,
}

impl HostReachableCheck {
    pub fn new(hosts: Vec<String>, probe_port: u16, timeout: Duration) -> Self {
        Self {
            hosts,
            probe_port,
            timeout,
        }
    }

    async fn probe(&self, host: &str) -> bool {
        let addr = format!("{}:{}", host, self.probe_port);
        match tokio::time::timeout(self.timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!(host = host, error = %e, "Host probe refused");
                false
            }
            Err(_) => {
                debug!(host = host, "Host probe timed out");
                false
            }
        }
    }
}

#[async_trait]
impl PolicyCheck for HostReachableCheck {
    fn name(&self) -> &'static str {
        "hosts"
    }

    async fn check(&mut self) -> CheckResult {
        for host in &self.hosts {
            if self.probe(host).await {
                return Ok(Verdict::suspend(format!("Host '{}' is reachable", host)));
            }
        }
        Ok(Verdict::allow())
    }
}
