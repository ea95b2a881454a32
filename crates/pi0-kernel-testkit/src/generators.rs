//! Proptest generators for kernel types.

use std::collections::BTreeMap;

use proptest::prelude::*;

use pi0_kernel::{AuditEntry, Blake3Hash, Principal, Value};
use pi0_kernel_core::AuditChain;

/// Generate a principal identifier.
pub fn principal() -> impl Strategy<Value = Principal> {
    "[a-z][a-z0-9_]{0,15}".prop_map(Principal::from)
}

/// Generate a config key.
pub fn config_key() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_.]{0,23}".prop_map(String::from)
}

/// Generate a digest.
pub fn blake3_hash() -> impl Strategy<Value = Blake3Hash> {
    any::<[u8; 32]>().prop_map(Blake3Hash::from_bytes)
}

/// Generate a structured value, nested up to three levels.
pub fn value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        "[ -~]{0,16}".prop_map(Value::Text),
        prop::collection::vec(any::<u8>(), 0..16).prop_map(Value::Bytes),
    ];

    leaf.prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::List),
            prop::collection::btree_map("[a-z]{1,8}", inner, 0..4).prop_map(Value::Map),
        ]
    })
}

/// Generate an audit entry of any kind.
pub fn entry() -> impl Strategy<Value = AuditEntry> {
    prop_oneof![
        (principal(), any::<bool>())
            .prop_map(|(principal, granted)| AuditEntry::Approve { principal, granted }),
        principal().prop_map(|principal| AuditEntry::Reject { principal }),
        Just(AuditEntry::Reset),
        (principal(), config_key(), value()).prop_map(|(principal, key, value)| {
            AuditEntry::RequestChange {
                principal,
                key,
                value,
            }
        }),
        (config_key(), value()).prop_map(|(key, value)| AuditEntry::ApplyChange { key, value }),
        prop_oneof![
            "[a-z]{1,12}".prop_map(|name| AuditEntry::RegisterModule { name }),
            (principal(), "[a-z]{1,12}")
                .prop_map(|(principal, module)| AuditEntry::RequestActivation { principal, module }),
            "[a-z]{1,12}".prop_map(|module| AuditEntry::ActivateModule { module }),
        ],
        (value(), prop::collection::btree_map("[a-z]{1,8}", prop::option::of(value()), 0..3))
            .prop_map(|(record, results)| AuditEntry::Inspect { record, results }),
        (principal(), 1u64..1_000, blake3_hash())
            .prop_map(|(target, sequence, mac)| AuditEntry::ChannelSend { target, sequence, mac }),
        (principal(), 1u64..1_000, blake3_hash()).prop_map(|(target, sequence, mac)| {
            AuditEntry::ChannelReceive {
                target,
                sequence,
                mac,
            }
        }),
        ("[a-z]{1,12}", prop::collection::btree_map("[a-z]{1,8}", value(), 0..3))
            .prop_map(|(name, fields)| AuditEntry::External { name, fields }),
    ]
}

/// Generate a channel payload.
pub fn plaintext(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Parameters for building an audit chain.
#[derive(Debug, Clone)]
pub struct ChainParams {
    /// Entries with their (unsorted) timestamps.
    pub entries: Vec<(AuditEntry, i64)>,
}

impl Arbitrary for ChainParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        prop::collection::vec((entry(), 0i64..=1_800_000_000_000i64), 1..24)
            .prop_map(|entries| ChainParams { entries })
            .boxed()
    }
}

/// Build a chain by appending every entry at its timestamp.
pub fn chain_from_params(params: &ChainParams) -> AuditChain {
    let chain = AuditChain::new();
    for (entry, timestamp) in &params.entries {
        chain.append_at(entry.clone(), *timestamp);
    }
    chain
}

/// A map of module results with the given failing names set to `None`.
pub fn results_with_failures(ok: &[&str], failed: &[&str]) -> BTreeMap<String, Option<Value>> {
    ok.iter()
        .map(|n| (n.to_string(), Some(Value::Bool(true))))
        .chain(failed.iter().map(|n| (n.to_string(), None)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::TestFixture;
    use pi0_kernel_core::{canonical_entry_bytes, verify_records};

    proptest! {
        #[test]
        fn test_generated_chain_verifies(params: ChainParams) {
            let chain = chain_from_params(&params);

            prop_assert_eq!(chain.len(), params.entries.len());
            prop_assert!(chain.verify_chain().is_ok());
            prop_assert!(verify_records(&chain.export()).is_ok());
        }

        #[test]
        fn test_chain_is_deterministic(params: ChainParams) {
            let a = chain_from_params(&params);
            let b = chain_from_params(&params);

            prop_assert_eq!(a.head(), b.head());
        }

        #[test]
        fn test_canonical_bytes_deterministic(entry in entry()) {
            prop_assert_eq!(canonical_entry_bytes(&entry), canonical_entry_bytes(&entry.clone()));
        }

        #[test]
        fn test_reordering_detected(params: ChainParams, i in any::<prop::sample::Index>(), j in any::<prop::sample::Index>()) {
            let mut records = chain_from_params(&params).export();
            let (i, j) = (i.index(records.len()), j.index(records.len()));
            prop_assume!(i != j);

            records.swap(i, j);
            let err = verify_records(&records).unwrap_err();
            prop_assert_eq!(err.first_index(), i.min(j));
        }

        #[test]
        fn test_channel_pair_opens_any_payload(payload in plaintext(512), seed in any::<u64>()) {
            let fixture = TestFixture::new();
            let (sender, receiver) = fixture.channel_pair(seed);
            let target = fixture.principal(1).clone();

            let packet = sender.send(&target, &payload).unwrap();
            prop_assert_eq!(packet.ciphertext.len(), payload.len());
            prop_assert_eq!(receiver.receive(&packet).unwrap(), payload);
            prop_assert!(receiver.receive(&packet).is_err());
        }
    }

    #[test]
    fn test_results_with_failures() {
        let results = results_with_failures(&["a"], &["b"]);
        assert_eq!(results["a"], Some(Value::Bool(true)));
        assert_eq!(results["b"], None);
    }
}
