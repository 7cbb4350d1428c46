//! UDP listener for remote shutdown packets

use slumber_api::PowerAction;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::packet::{decode_packet, PacketError};

/// Delay between accepting a packet and emitting its action, so the
/// sender's own connection can wind down first
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(5);

/// Quiet period after any rejected packet; packets arriving during it are
/// dropped unread, which caps brute-force and probe attempts
pub const DEFAULT_REJECT_COOLDOWN: Duration = Duration::from_secs(15);

/// Where the listener learns this machine's MAC addresses
pub trait MacSource: Send + Sync {
    fn macs(&self) -> Vec<[u8; 6]>;
}

/// Reads MAC addresses from the sysfs net class, skipping loopback.
pub struct SysfsMacSource;

impl MacSource for SysfsMacSource {
    fn macs(&self) -> Vec<[u8; 6]> {
        let Ok(entries) = std::fs::read_dir("/sys/class/net") else {
            return Vec::new();
        };
        entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name() != "lo")
            .filter_map(|e| std::fs::read_to_string(e.path().join("address")).ok())
            .filter_map(|addr| parse_mac(addr.trim()))
            .collect()
    }
}

/// Fixed MAC list, for tests and configuration overrides.
pub struct StaticMacSource(pub Vec<[u8; 6]>);

impl MacSource for StaticMacSource {
    fn macs(&self) -> Vec<[u8; 6]> {
        self.0.clone()
    }
}

fn parse_mac(s: &str) -> Option<[u8; 6]> {
    let mut mac = [0u8; 6];
    let mut parts = s.split(':');
    for byte in &mut mac {
        *byte = u8::from_str_radix(parts.next()?, 16).ok()?;
    }
    parts.next().is_none().then_some(mac)
}

/// Listens for magic packets and emits the decoded power actions.
pub struct RemoteListener {
    socket: UdpSocket,
    macs: Vec<[u8; 6]>,
    password: Option<String>,
    settle_delay: Duration,
    reject_cooldown: Duration,
    actions_tx: mpsc::UnboundedSender<PowerAction>,
}

impl RemoteListener {
    pub async fn bind(
        port: u16,
        mac_source: &dyn MacSource,
        password: Option<String>,
        actions_tx: mpsc::UnboundedSender<PowerAction>,
    ) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", port)).await?;
        let macs = mac_source.macs();
        info!(
            port = socket.local_addr()?.port(),
            interfaces = macs.len(),
            "Remote shutdown listener bound"
        );
        Ok(Self {
            socket,
            macs,
            password,
            settle_delay: DEFAULT_SETTLE_DELAY,
            reject_cooldown: DEFAULT_REJECT_COOLDOWN,
            actions_tx,
        })
    }

    pub fn with_delays(mut self, settle: Duration, cooldown: Duration) -> Self {
        self.settle_delay = settle;
        self.reject_cooldown = cooldown;
        self
    }

    pub fn local_port(&self) -> std::io::Result<u16> {
        Ok(self.socket.local_addr()?.port())
    }

    /// Receive loop; runs until the cancel signal flips to true.
    pub async fn run(self, mut cancel: watch::Receiver<bool>) {
        let mut buf = [0u8; 512];
        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buf) => {
                    match result {
                        Ok((len, peer)) => self.handle(&buf[..len], peer).await,
                        Err(e) => {
                            warn!(error = %e, "UDP receive failed");
                        }
                    }
                }
                _ = cancel.changed() => {
                    if *cancel.borrow() {
                        info!("Remote shutdown listener stopping");
                        return;
                    }
                }
            }
        }
    }

    async fn handle(&self, data: &[u8], peer: std::net::SocketAddr) {
        match decode_packet(data, &self.macs, self.password.as_deref()) {
            Ok(action) => {
                info!(action = %action, peer = %peer, "Remote power command accepted");
                tokio::time::sleep(self.settle_delay).await;
                let _ = self.actions_tx.send(action);
            }
            Err(e) => {
                match e {
                    PacketError::PasswordMissing
                    | PacketError::PasswordMismatch
                    | PacketError::PasswordNotUtf8 => {
                        warn!(peer = %peer, error = %e, "Remote power command rejected");
                    }
                    _ => {
                        debug!(peer = %peer, error = %e, "Ignoring datagram");
                    }
                }
                // Sleeping here stalls the receive loop, so further
                // attempts pile up in the socket buffer and age out.
                tokio::time::sleep(self.reject_cooldown).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::encode_packet;

    const MAC: [u8; 6] = [0x00, 0x11, 0x22, 0x33, 0x44, 0x55];

    async fn start_listener(
        password: Option<String>,
    ) -> (u16, mpsc::UnboundedReceiver<PowerAction>, watch::Sender<bool>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let listener = RemoteListener::bind(0, &StaticMacSource(vec![MAC]), password, tx)
            .await
            .unwrap()
            .with_delays(Duration::ZERO, Duration::ZERO);
        let port = listener.local_port().unwrap();
        tokio::spawn(listener.run(cancel_rx));
        (port, rx, cancel_tx)
    }

    #[tokio::test]
    async fn valid_packet_emits_action() {
        let (port, mut rx, _cancel) = start_listener(None).await;

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let packet = encode_packet(PowerAction::Standby, MAC, None);
        sender
            .send_to(&packet, ("127.0.0.1", port))
            .await
            .unwrap();

        let action = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(action, PowerAction::Standby);
    }

    #[tokio::test]
    async fn wrong_password_emits_nothing() {
        let (port, mut rx, _cancel) = start_listener(Some("secret".into())).await;

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let packet = encode_packet(PowerAction::Shutdown, MAC, Some("wrong"));
        sender
            .send_to(&packet, ("127.0.0.1", port))
            .await
            .unwrap();

        let result = tokio::time::timeout(Duration::from_millis(300), rx.recv()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn rejected_datagram_delays_the_next_accept() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let listener = RemoteListener::bind(0, &StaticMacSource(vec![MAC]), None, tx)
            .await
            .unwrap()
            .with_delays(Duration::ZERO, Duration::from_millis(300));
        let port = listener.local_port().unwrap();
        tokio::spawn(listener.run(cancel_rx));

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let stranger =
            encode_packet(PowerAction::Shutdown, [0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01], None);
        let valid = encode_packet(PowerAction::Standby, MAC, None);

        let started = std::time::Instant::now();
        sender
            .send_to(&stranger, ("127.0.0.1", port))
            .await
            .unwrap();
        sender.send_to(&valid, ("127.0.0.1", port)).await.unwrap();

        let action = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(action, PowerAction::Standby);
        // The MAC-mismatch rejection holds the loop for the cooldown
        // before the valid packet is read.
        assert!(started.elapsed() >= Duration::from_millis(250));
    }

    #[tokio::test]
    async fn cancel_stops_the_loop() {
        let (port, mut rx, cancel) = start_listener(None).await;
        cancel.send(true).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let packet = encode_packet(PowerAction::Standby, MAC, None);
        sender
            .send_to(&packet, ("127.0.0.1", port))
            .await
            .unwrap();

        let result = tokio::time::timeout(Duration::from_millis(300), rx.recv()).await;
        // Channel closed or silent; either way no action arrives.
        assert!(matches!(result, Err(_) | Ok(None)));
    }

    #[test]
    fn mac_parsing() {
        assert_eq!(
            parse_mac("00:11:22:33:44:55"),
            Some([0x00, 0x11, 0x22, 0x33, 0x44, 0x55])
        );
        assert_eq!(parse_mac("00:11:22:33:44"), None);
        assert_eq!(parse_mac("00:11:22:33:44:55:66"), None);
        assert_eq!(parse_mac("zz:11:22:33:44:55"), None);
    }
}
