//! Wire packet and channel log entries.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use pi0_kernel_core::{Blake3Hash, Principal};

/// An authenticated, enciphered message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    /// Principal the packet is addressed to.
    pub target: Principal,
    pub ciphertext: Bytes,
    /// Keyed digest over ciphertext, sequence and target.
    pub mac: Blake3Hash,
    /// Sender's counter value for this packet. Starts at 1.
    pub sequence: u64,
}

impl Packet {
    /// Bytes covered by the MAC.
    ///
    /// The ciphertext is length-prefixed so that its boundary with the
    /// sequence cannot shift.
    pub fn mac_input(ciphertext: &[u8], sequence: u64, target: &Principal) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 + ciphertext.len() + 8 + target.as_bytes().len());
        buf.extend_from_slice(&(ciphertext.len() as u64).to_be_bytes());
        buf.extend_from_slice(ciphertext);
        buf.extend_from_slice(&sequence.to_be_bytes());
        buf.extend_from_slice(target.as_bytes());
        buf
    }
}

/// Direction of a logged packet relative to the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Sent,
    Received,
}

/// One entry of a channel's local packet log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub direction: Direction,
    pub packet: Packet,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_input_layout() {
        let input = Packet::mac_input(b"ab", 3, &Principal::from("t"));
        let mut expected = vec![0, 0, 0, 0, 0, 0, 0, 2, b'a', b'b'];
        expected.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 3]);
        expected.push(b't');
        assert_eq!(input, expected);
    }

    #[test]
    fn test_packet_json_shape() {
        let packet = Packet {
            target: Principal::from("bob"),
            ciphertext: Bytes::from_static(&[1, 2, 3]),
            mac: Blake3Hash::ZERO,
            sequence: 1,
        };
        let json = serde_json::to_value(&packet).unwrap();
        assert_eq!(json["target"], "bob");
        assert_eq!(json["sequence"], 1);

        let back: Packet = serde_json::from_value(json).unwrap();
        assert_eq!(back, packet);
    }
}
