//! Golden test vectors for deterministic verification.
//!
//! These vectors pin the audit record hash and the channel packet bytes
//! for fixed inputs, so any change to canonical encoding, hash input
//! layout or key derivation shows up as a vector mismatch.

use pi0_kernel::{AuditEntry, AuditRecord, Blake3Hash, CipherSuite, Packet, Principal, SecureChannel, SharedSecret, Value};

/// A golden audit record vector.
#[derive(Debug, Clone)]
pub struct AuditVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    pub entry: AuditEntry,
    pub prev_hash: Blake3Hash,
    /// Unix milliseconds.
    pub timestamp: i64,
    /// Expected record hash (hex).
    pub expected_hash: &'static str,
}

/// A golden channel packet vector.
#[derive(Debug, Clone)]
pub struct ChannelVector {
    pub name: &'static str,
    pub secret: &'static [u8],
    pub suite: CipherSuite,
    pub target: &'static str,
    /// Sequence of the packet to pin. Earlier packets are sent and discarded.
    pub sequence: u64,
    pub plaintext: &'static [u8],
    /// Expected ciphertext (hex).
    pub expected_ciphertext: &'static str,
    /// Expected MAC (hex).
    pub expected_mac: &'static str,
}

/// Get all audit vectors.
pub fn audit_vectors() -> Vec<AuditVector> {
    vec![
        AuditVector {
            name: "Genesis reset",
            entry: AuditEntry::Reset,
            prev_hash: Blake3Hash::ZERO,
            timestamp: 0,
            expected_hash: "4c4937eed2c8aaac6215ebe61c8e49ac464291105b702130e07343fa7b22eb6c",
        },
        AuditVector {
            name: "Approve granted",
            entry: AuditEntry::Approve {
                principal: Principal::from("alice"),
                granted: true,
            },
            prev_hash: Blake3Hash::from_bytes([0x11; 32]),
            timestamp: 1_792_065_600_000, // 2026-10-15T12:00:00Z
            expected_hash: "713a774ffff8887c985970a9f08deb37f6ea807d80092f06fc3a611ea12b4950",
        },
        AuditVector {
            name: "Apply change with int value",
            entry: AuditEntry::ApplyChange {
                key: "rate".into(),
                value: Value::Int(5),
            },
            prev_hash: Blake3Hash::from_bytes([0x22; 32]),
            timestamp: 1_792_065_601_000,
            expected_hash: "1cf0183f8e961d220372fa0c18067cc949596239d2b1b77731aa9dffa9f7d1cf",
        },
    ]
}

/// Get all channel vectors.
pub fn channel_vectors() -> Vec<ChannelVector> {
    vec![
        ChannelVector {
            name: "Keystream first packet",
            secret: b"golden-secret",
            suite: CipherSuite::Keystream,
            target: "bob",
            sequence: 1,
            plaintext: b"hello",
            expected_ciphertext: "2cd1b553bf",
            expected_mac: "41d7947257e7a02a0a20e14a2b6d069962e75ea5bf9ef858492f1b83edc263e0",
        },
        ChannelVector {
            name: "Keystream third packet",
            secret: b"golden-secret",
            suite: CipherSuite::Keystream,
            target: "bob",
            sequence: 3,
            plaintext: b"hello",
            expected_ciphertext: "0a069f54b1",
            expected_mac: "b31b5695e6c879cd0332f48f5b765c5bd251437617264332a7d2e7b88f53c748",
        },
        ChannelVector {
            name: "ChaCha20-Poly1305 empty payload",
            secret: b"golden-secret",
            suite: CipherSuite::ChaCha20Poly1305,
            target: "carol",
            sequence: 1,
            plaintext: b"",
            // Poly1305 tag only.
            expected_ciphertext: "4caddc21763b9ddf3f1cfb6f6db017de",
            expected_mac: "d6030c1984e51332d7166dc0005699b711468cf435eacc3599bce44e37baa77b",
        },
    ]
}

/// Build the record described by a vector.
pub fn record_from_vector(vector: &AuditVector) -> AuditRecord {
    AuditRecord {
        sequence: 0,
        entry: vector.entry.clone(),
        prev_hash: vector.prev_hash,
        timestamp: vector.timestamp,
        hash: AuditRecord::compute_hash(&vector.entry, &vector.prev_hash, vector.timestamp),
    }
}

/// Produce the packet described by a vector from a fresh channel.
pub fn packet_from_vector(vector: &ChannelVector) -> Packet {
    let secret = SharedSecret::new(vector.secret).expect("vector secret is non-empty");
    let channel = SecureChannel::with_suite(secret, vector.suite);
    let target = Principal::from(vector.target);

    for _ in 1..vector.sequence {
        channel.send(&target, b"").expect("filler send");
    }
    channel
        .send(&target, vector.plaintext)
        .expect("vector send")
}

/// Verify all vectors against their expected digests.
///
/// Returns `(name, matches, computed)` per vector; for channel vectors
/// `computed` is `ciphertext:mac`.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    let audit = audit_vectors().into_iter().map(|v| {
        let hex = record_from_vector(&v).hash.to_hex();
        let matches = hex == v.expected_hash;
        (v.name.to_string(), matches, hex)
    });
    let channel = channel_vectors().into_iter().map(|v| {
        let packet = packet_from_vector(&v);
        let ciphertext = hex::encode(&packet.ciphertext);
        let mac = packet.mac.to_hex();
        let matches = ciphertext == v.expected_ciphertext && mac == v.expected_mac;
        (v.name.to_string(), matches, format!("{}:{}", ciphertext, mac))
    });
    audit.chain(channel).collect()
}
