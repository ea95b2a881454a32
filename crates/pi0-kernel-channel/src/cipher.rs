//! Cipher suites for packet confidentiality.
//!
//! A suite only transforms payload bytes. Authentication is always the
//! channel's keyed MAC over the resulting ciphertext, checked before any
//! decryption.

use chacha20poly1305::aead::Aead;
use chacha20poly1305::{ChaCha20Poly1305, Key, KeyInit, Nonce};
use serde::{Deserialize, Serialize};

use pi0_kernel_core::Principal;

use crate::error::{ChannelError, Result};
use crate::secret::ChannelKeys;

const CHACHA_CONTEXT: &str = "pi0-kernel 2026-01 channel chacha20poly1305";

/// Payload cipher used by a channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CipherSuite {
    /// Plaintext XOR a keyed Blake3 XOF stream bound to sequence and target.
    #[default]
    Keystream,
    /// ChaCha20-Poly1305 with a per-target key and the sequence as nonce.
    #[serde(rename = "chacha20poly1305")]
    ChaCha20Poly1305,
}

impl CipherSuite {
    pub(crate) fn encrypt(
        self,
        keys: &ChannelKeys,
        sequence: u64,
        target: &Principal,
        plaintext: &[u8],
    ) -> Result<Vec<u8>> {
        match self {
            CipherSuite::Keystream => Ok(xor_keystream(keys, sequence, target, plaintext)),
            CipherSuite::ChaCha20Poly1305 => chacha(keys, target)
                .encrypt(&nonce(sequence), plaintext)
                .map_err(|e| ChannelError::Cipher(e.to_string())),
        }
    }

    pub(crate) fn decrypt(
        self,
        keys: &ChannelKeys,
        sequence: u64,
        target: &Principal,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>> {
        match self {
            CipherSuite::Keystream => Ok(xor_keystream(keys, sequence, target, ciphertext)),
            CipherSuite::ChaCha20Poly1305 => chacha(keys, target)
                .decrypt(&nonce(sequence), ciphertext)
                .map_err(|e| ChannelError::Cipher(e.to_string())),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CipherSuite::Keystream => "keystream",
            CipherSuite::ChaCha20Poly1305 => "chacha20poly1305",
        }
    }
}

/// XOR `data` with a keystream derived from the channel key, the sequence
/// and the target. The same call deciphers.
fn xor_keystream(keys: &ChannelKeys, sequence: u64, target: &Principal, data: &[u8]) -> Vec<u8> {
    let mut hasher = blake3::Hasher::new_keyed(&keys.keystream);
    hasher.update(&sequence.to_be_bytes());
    hasher.update(&(target.as_bytes().len() as u64).to_be_bytes());
    hasher.update(target.as_bytes());

    let mut stream = vec![0u8; data.len()];
    hasher.finalize_xof().fill(&mut stream);

    data.iter().zip(stream).map(|(b, k)| b ^ k).collect()
}

fn chacha(keys: &ChannelKeys, target: &Principal) -> ChaCha20Poly1305 {
    let mut hasher = blake3::Hasher::new_derive_key(CHACHA_CONTEXT);
    hasher.update(keys.secret.as_bytes());
    hasher.update(target.as_bytes());
    let key = hasher.finalize();
    ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()))
}

fn nonce(sequence: u64) -> Nonce {
    let mut bytes = [0u8; 12];
    bytes[4..].copy_from_slice(&sequence.to_be_bytes());
    *Nonce::from_slice(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::SharedSecret;

    fn keys() -> ChannelKeys {
        SharedSecret::new(b"cipher-test-secret".to_vec())
            .unwrap()
            .derive_keys()
    }

    #[test]
    fn test_keystream_is_symmetric() {
        let keys = keys();
        let target = Principal::from("bob");
        let ct = CipherSuite::Keystream
            .encrypt(&keys, 1, &target, b"hello")
            .unwrap();
        assert_ne!(ct, b"hello");
        let pt = CipherSuite::Keystream.decrypt(&keys, 1, &target, &ct).unwrap();
        assert_eq!(pt, b"hello");
    }

    #[test]
    fn test_keystream_bound_to_sequence_and_target() {
        let keys = keys();
        let bob = Principal::from("bob");
        let carol = Principal::from("carol");
        let msg = [0u8; 32];

        let a = CipherSuite::Keystream.encrypt(&keys, 1, &bob, &msg).unwrap();
        let b = CipherSuite::Keystream.encrypt(&keys, 2, &bob, &msg).unwrap();
        let c = CipherSuite::Keystream.encrypt(&keys, 1, &carol, &msg).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_chacha_roundtrip_and_tag() {
        let keys = keys();
        let target = Principal::from("bob");
        let suite = CipherSuite::ChaCha20Poly1305;

        let ct = suite.encrypt(&keys, 7, &target, b"payload").unwrap();
        assert_eq!(ct.len(), b"payload".len() + 16);
        assert_eq!(suite.decrypt(&keys, 7, &target, &ct).unwrap(), b"payload");
        assert!(matches!(
            suite.decrypt(&keys, 8, &target, &ct),
            Err(ChannelError::Cipher(_))
        ));
    }

    #[test]
    fn test_suite_serde_names() {
        let json = serde_json::to_string(&CipherSuite::ChaCha20Poly1305).unwrap();
        assert_eq!(json, "\"chacha20poly1305\"");
        let parsed: CipherSuite = serde_json::from_str("\"keystream\"").unwrap();
        assert_eq!(parsed, CipherSuite::Keystream);
    }
}
