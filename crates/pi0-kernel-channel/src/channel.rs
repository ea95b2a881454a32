//! The secure channel: sequence-bound sealing and opening of packets.
//!
//! Sending increments the counter, enciphers, then MACs the ciphertext
//! together with the sequence and target. Receiving verifies the MAC in
//! constant time, then checks the replay window, and only then deciphers.
//!
//! A channel given a local identity with [`SecureChannel::with_local`] also
//! refuses authenticated packets addressed to anyone else, which stops a
//! peer's own packets from being reflected back to it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use subtle::ConstantTimeEq;

use pi0_kernel_core::{AuditChain, AuditEntry, Blake3Hash, Principal};

use crate::cipher::CipherSuite;
use crate::error::{ChannelError, Result};
use crate::packet::{Direction, LogEntry, Packet};
use crate::secret::{ChannelKeys, SharedSecret};

#[derive(Debug, Default)]
struct ChannelState {
    /// Last sequence issued by `send`. Zero before the first send.
    counter: u64,
    /// Highest accepted sequence per addressed principal.
    high_water: HashMap<Principal, u64>,
    log: Vec<LogEntry>,
}

/// One end of a peer relationship sharing a secret.
#[derive(Debug)]
pub struct SecureChannel {
    keys: ChannelKeys,
    suite: CipherSuite,
    state: Mutex<ChannelState>,
    audit: Option<Arc<AuditChain>>,
    local: Option<Principal>,
}

impl SecureChannel {
    /// Create a channel using the default keystream suite.
    pub fn new(secret: SharedSecret) -> Self {
        Self::with_suite(secret, CipherSuite::default())
    }

    pub fn with_suite(secret: SharedSecret, suite: CipherSuite) -> Self {
        Self {
            keys: secret.derive_keys(),
            suite,
            state: Mutex::new(ChannelState::default()),
            audit: None,
            local: None,
        }
    }

    /// Only accept packets addressed to `local`.
    pub fn with_local(mut self, local: Principal) -> Self {
        self.local = Some(local);
        self
    }

    pub fn local(&self) -> Option<&Principal> {
        self.local.as_ref()
    }

    /// Also append `channel_send` and `channel_receive` entries to `chain`.
    pub fn with_audit(mut self, chain: Arc<AuditChain>) -> Self {
        self.audit = Some(chain);
        self
    }

    pub fn suite(&self) -> CipherSuite {
        self.suite
    }

    fn lock(&self) -> MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn compute_mac(&self, ciphertext: &[u8], sequence: u64, target: &Principal) -> Blake3Hash {
        let input = Packet::mac_input(ciphertext, sequence, target);
        Blake3Hash::from_bytes(*blake3::keyed_hash(&self.keys.mac, &input).as_bytes())
    }

    /// Seal `plaintext` for `target`.
    ///
    /// The counter is advanced before anything else, so every packet from
    /// this channel carries a distinct sequence even under concurrent sends.
    pub fn send(&self, target: &Principal, plaintext: &[u8]) -> Result<Packet> {
        let mut state = self.lock();
        let sequence = state
            .counter
            .checked_add(1)
            .ok_or(ChannelError::SequenceExhausted)?;
        state.counter = sequence;

        let ciphertext = self.suite.encrypt(&self.keys, sequence, target, plaintext)?;
        let mac = self.compute_mac(&ciphertext, sequence, target);

        let packet = Packet {
            target: target.clone(),
            ciphertext: Bytes::from(ciphertext),
            mac,
            sequence,
        };

        state.log.push(LogEntry {
            direction: Direction::Sent,
            packet: packet.clone(),
        });
        if let Some(chain) = &self.audit {
            chain.append(AuditEntry::ChannelSend {
                target: target.clone(),
                sequence,
                mac,
            });
        }
        tracing::debug!(peer = %target, sequence, len = plaintext.len(), "packet sent");

        Ok(packet)
    }

    /// Verify and open a packet.
    ///
    /// Fails with [`ChannelError::Authentication`] on any MAC mismatch and
    /// with [`ChannelError::Replay`] if the sequence is not above the last
    /// accepted one for the packet's target. With a local identity set, a
    /// packet addressed elsewhere fails with [`ChannelError::Misdirected`].
    /// No failure changes state.
    pub fn receive(&self, packet: &Packet) -> Result<Vec<u8>> {
        let expected = self.compute_mac(&packet.ciphertext, packet.sequence, &packet.target);
        let valid: bool = expected.as_bytes().ct_eq(packet.mac.as_bytes()).into();
        if !valid {
            tracing::warn!(peer = %packet.target, sequence = packet.sequence, "packet failed authentication");
            return Err(ChannelError::Authentication);
        }

        if let Some(local) = &self.local {
            if &packet.target != local {
                tracing::warn!(peer = %packet.target, %local, sequence = packet.sequence, "misdirected packet rejected");
                return Err(ChannelError::Misdirected {
                    addressed: packet.target.clone(),
                    local: local.clone(),
                });
            }
        }

        let mut state = self.lock();
        let last_accepted = state.high_water.get(&packet.target).copied().unwrap_or(0);
        if packet.sequence <= last_accepted {
            tracing::warn!(
                peer = %packet.target,
                sequence = packet.sequence,
                last_accepted,
                "replayed packet rejected"
            );
            return Err(ChannelError::Replay {
                last_accepted,
                got: packet.sequence,
            });
        }

        let plaintext =
            self.suite
                .decrypt(&self.keys, packet.sequence, &packet.target, &packet.ciphertext)?;

        state.high_water.insert(packet.target.clone(), packet.sequence);
        state.log.push(LogEntry {
            direction: Direction::Received,
            packet: packet.clone(),
        });
        if let Some(chain) = &self.audit {
            chain.append(AuditEntry::ChannelReceive {
                target: packet.target.clone(),
                sequence: packet.sequence,
                mac: packet.mac,
            });
        }
        tracing::debug!(peer = %packet.target, sequence = packet.sequence, "packet received");

        Ok(plaintext)
    }

    /// Last sequence issued by this channel.
    pub fn sequence(&self) -> u64 {
        self.lock().counter
    }

    /// Highest accepted sequence for packets addressed to `target`.
    pub fn last_accepted(&self, target: &Principal) -> Option<u64> {
        self.lock().high_water.get(target).copied()
    }

    /// Copy of the local packet log in the order events happened.
    pub fn export_log(&self) -> Vec<LogEntry> {
        self.lock().log.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pair(suite: CipherSuite) -> (SecureChannel, SecureChannel) {
        let secret = SharedSecret::new(b"out-of-band secret".to_vec()).unwrap();
        (
            SecureChannel::with_suite(secret.clone(), suite),
            SecureChannel::with_suite(secret, suite),
        )
    }

    fn bob() -> Principal {
        Principal::from("bob")
    }

    #[test]
    fn test_roundtrip() {
        let (alice, bob_end) = pair(CipherSuite::Keystream);
        let packet = alice.send(&bob(), b"transfer 10").unwrap();

        assert_eq!(packet.sequence, 1);
        assert_ne!(&packet.ciphertext[..], b"transfer 10");
        assert_eq!(bob_end.receive(&packet).unwrap(), b"transfer 10");
    }

    #[test]
    fn test_empty_plaintext() {
        let (alice, bob_end) = pair(CipherSuite::Keystream);
        let packet = alice.send(&bob(), b"").unwrap();
        assert!(bob_end.receive(&packet).unwrap().is_empty());
    }

    #[test]
    fn test_replay_rejected() {
        let (alice, bob_end) = pair(CipherSuite::Keystream);
        let packet = alice.send(&bob(), b"once").unwrap();

        bob_end.receive(&packet).unwrap();
        assert_eq!(
            bob_end.receive(&packet),
            Err(ChannelError::Replay {
                last_accepted: 1,
                got: 1
            })
        );
    }

    #[test]
    fn test_out_of_order_rejected() {
        let (alice, bob_end) = pair(CipherSuite::Keystream);
        let packets: Vec<_> = (0..3)
            .map(|i| alice.send(&bob(), format!("m{}", i).as_bytes()).unwrap())
            .collect();

        let sequences: Vec<_> = packets.iter().map(|p| p.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);

        assert_eq!(bob_end.receive(&packets[2]).unwrap(), b"m2");
        assert!(matches!(
            bob_end.receive(&packets[1]),
            Err(ChannelError::Replay { last_accepted: 3, got: 2 })
        ));
    }

    #[test]
    fn test_wrong_secret_fails_authentication() {
        let alice = SecureChannel::new(SharedSecret::new(b"one".to_vec()).unwrap());
        let mallory = SecureChannel::new(SharedSecret::new(b"two".to_vec()).unwrap());

        let packet = alice.send(&bob(), b"hi").unwrap();
        assert_eq!(mallory.receive(&packet), Err(ChannelError::Authentication));
    }

    #[test]
    fn test_retargeted_packet_fails_authentication() {
        let (alice, bob_end) = pair(CipherSuite::Keystream);
        let mut packet = alice.send(&bob(), b"hi").unwrap();
        packet.target = Principal::from("carol");
        assert_eq!(bob_end.receive(&packet), Err(ChannelError::Authentication));
    }

    #[test]
    fn test_reflected_packet_rejected_by_local_identity() {
        let secret = SharedSecret::new(b"out-of-band secret".to_vec()).unwrap();
        let alice = SecureChannel::new(secret.clone()).with_local(Principal::from("alice"));
        let bob_end = SecureChannel::new(secret).with_local(bob());
        assert_eq!(bob_end.local(), Some(&bob()));

        let packet = alice.send(&bob(), b"to bob").unwrap();
        assert_eq!(
            alice.receive(&packet),
            Err(ChannelError::Misdirected {
                addressed: bob(),
                local: Principal::from("alice"),
            })
        );
        assert_eq!(alice.last_accepted(&bob()), None);
        assert_eq!(alice.export_log().len(), 1);

        assert_eq!(bob_end.receive(&packet).unwrap(), b"to bob");
    }

    #[test]
    fn test_failed_receive_does_not_advance_window() {
        let (alice, bob_end) = pair(CipherSuite::Keystream);
        let good = alice.send(&bob(), b"hi").unwrap();
        let mut forged = good.clone();
        forged.sequence = 50;

        assert_eq!(bob_end.receive(&forged), Err(ChannelError::Authentication));
        assert_eq!(bob_end.last_accepted(&bob()), None);
        assert!(bob_end.receive(&good).is_ok());
    }

    #[test]
    fn test_chacha_suite() {
        let (alice, bob_end) = pair(CipherSuite::ChaCha20Poly1305);
        let packet = alice.send(&bob(), b"sealed").unwrap();
        assert_eq!(bob_end.receive(&packet).unwrap(), b"sealed");
        assert!(bob_end.receive(&packet).is_err());
    }

    #[test]
    fn test_log_and_audit() {
        let chain = Arc::new(AuditChain::new());
        let secret = SharedSecret::new(b"s".to_vec()).unwrap();
        let alice = SecureChannel::new(secret.clone()).with_audit(Arc::clone(&chain));
        let bob_end = SecureChannel::new(secret).with_audit(Arc::clone(&chain));

        let packet = alice.send(&bob(), b"x").unwrap();
        bob_end.receive(&packet).unwrap();

        let log = alice.export_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].direction, Direction::Sent);
        assert_eq!(bob_end.export_log()[0].direction, Direction::Received);

        let actions: Vec<_> = chain.export().iter().map(|r| r.entry.action()).collect();
        assert_eq!(actions, vec!["channel_send", "channel_receive"]);
        assert!(chain.is_intact());
    }

    #[test]
    fn test_concurrent_sends_get_distinct_sequences() {
        let (alice, _) = pair(CipherSuite::Keystream);
        let alice = Arc::new(alice);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let alice = Arc::clone(&alice);
                std::thread::spawn(move || {
                    (0..50)
                        .map(|_| alice.send(&bob(), b"x").unwrap().sequence)
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();

        assert_eq!(all, (1..=400).collect::<Vec<_>>());
        assert_eq!(alice.sequence(), 400);
    }

    proptest! {
        #[test]
        fn prop_roundtrip(plaintext in prop::collection::vec(any::<u8>(), 0..512)) {
            let (alice, bob_end) = pair(CipherSuite::Keystream);
            let packet = alice.send(&bob(), &plaintext).unwrap();
            prop_assert_eq!(bob_end.receive(&packet).unwrap(), plaintext);
        }

        #[test]
        fn prop_ciphertext_bit_flip_rejected(
            plaintext in prop::collection::vec(any::<u8>(), 1..128),
            index in any::<prop::sample::Index>(),
            bit in 0u8..8,
        ) {
            let (alice, bob_end) = pair(CipherSuite::Keystream);
            let packet = alice.send(&bob(), &plaintext).unwrap();

            let mut bytes = packet.ciphertext.to_vec();
            let i = index.index(bytes.len());
            bytes[i] ^= 1 << bit;
            let tampered = Packet { ciphertext: Bytes::from(bytes), ..packet };

            prop_assert_eq!(bob_end.receive(&tampered), Err(ChannelError::Authentication));
        }

        #[test]
        fn prop_sequence_bit_flip_rejected(bit in 0u32..64) {
            let (alice, bob_end) = pair(CipherSuite::Keystream);
            let packet = alice.send(&bob(), b"payload").unwrap();

            let tampered = Packet { sequence: packet.sequence ^ (1u64 << bit), ..packet };
            prop_assert_eq!(bob_end.receive(&tampered), Err(ChannelError::Authentication));
        }
    }
}
