//! Magic packet decoding
//!
//! The wire format mirrors wake-on-LAN: a 6-byte header of one repeated
//! marker byte, the target MAC address repeated 16 times, and an optional
//! trailing UTF-8 password. The marker selects the power action.

use slumber_api::PowerAction;
use thiserror::Error;

/// Marker byte for each action, repeated 6 times as the packet header
const MARKER_STANDBY: u8 = 0xAA;
const MARKER_HIBERNATE: u8 = 0xBB;
const MARKER_RESTART: u8 = 0xCC;
const MARKER_SHUTDOWN: u8 = 0xDD;

/// Header length plus 16 MAC repetitions
pub const MIN_PACKET_LEN: usize = 6 + 16 * 6;

/// Offset of the optional password
pub const PASSWORD_OFFSET: usize = MIN_PACKET_LEN;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("Packet too short: {0} bytes")]
    TooShort(usize),

    #[error("Unknown marker byte {0:#04x}")]
    UnknownMarker(u8),

    #[error("Header bytes are not uniform")]
    InconsistentHeader,

    #[error("MAC repetitions disagree or match no local interface")]
    MacMismatch,

    #[error("Password required but not present")]
    PasswordMissing,

    #[error("Password rejected")]
    PasswordMismatch,

    #[error("Password bytes are not valid UTF-8")]
    PasswordNotUtf8,
}

/// Decode one datagram.
///
/// The packet must address one of `local_macs`, consistently in all 16
/// repetitions. When `password` is configured, the trailing bytes must
/// decode to exactly that string; without a configured password any
/// trailing bytes are ignored.
pub fn decode_packet(
    data: &[u8],
    local_macs: &[[u8; 6]],
    password: Option<&str>,
) -> Result<PowerAction, PacketError> {
    if data.len() < MIN_PACKET_LEN {
        return Err(PacketError::TooShort(data.len()));
    }

    let marker = data[0];
    if data[1..6].iter().any(|&b| b != marker) {
        return Err(PacketError::InconsistentHeader);
    }
    let action = match marker {
        MARKER_STANDBY => PowerAction::Standby,
        MARKER_HIBERNATE => PowerAction::Hibernate,
        MARKER_RESTART => PowerAction::Restart,
        MARKER_SHUTDOWN => PowerAction::Shutdown,
        other => return Err(PacketError::UnknownMarker(other)),
    };

    let mac: [u8; 6] = data[6..12].try_into().map_err(|_| PacketError::MacMismatch)?;
    for repetition in data[6..PASSWORD_OFFSET].chunks_exact(6) {
        if repetition != mac {
            return Err(PacketError::MacMismatch);
        }
    }
    if !local_macs.contains(&mac) {
        return Err(PacketError::MacMismatch);
    }

    if let Some(expected) = password {
        let trailing = &data[PASSWORD_OFFSET..];
        if trailing.is_empty() {
            return Err(PacketError::PasswordMissing);
        }
        let supplied =
            std::str::from_utf8(trailing).map_err(|_| PacketError::PasswordNotUtf8)?;
        if supplied != expected {
            return Err(PacketError::PasswordMismatch);
        }
    }

    Ok(action)
}

/// Build a packet; the counterpart of [`decode_packet`], used by the
/// companion remote and by tests.
pub fn encode_packet(action: PowerAction, mac: [u8; 6], password: Option<&str>) -> Vec<u8> {
    let marker = match action {
        PowerAction::Standby => MARKER_STANDBY,
        PowerAction::Hibernate => MARKER_HIBERNATE,
        PowerAction::Restart => MARKER_RESTART,
        PowerAction::Shutdown => MARKER_SHUTDOWN,
    };

    let mut packet = Vec::with_capacity(MIN_PACKET_LEN);
    packet.extend(std::iter::repeat(marker).take(6));
    for _ in 0..16 {
        packet.extend_from_slice(&mac);
    }
    if let Some(pw) = password {
        packet.extend_from_slice(pw.as_bytes());
    }
    packet
}
