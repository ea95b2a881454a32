//! Canonical CBOR encoding for deterministic serialization.
//!
//! This module implements RFC 8949 Core Deterministic Encoding:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//!
//! Every audit record hash is computed over these bytes, so the encoding of
//! a given entry must never change for a given build.

use ciborium::value::Value as Cbor;
use std::collections::BTreeMap;

use crate::audit::AuditEntry;
use crate::crypto::Blake3Hash;
use crate::error::CoreError;
use crate::value::Value;

/// Entry field keys.
mod keys {
    pub const ACTION: &str = "action";
    pub const PRINCIPAL: &str = "principal";
    pub const GRANTED: &str = "granted";
    pub const KEY: &str = "key";
    pub const VALUE: &str = "value";
    pub const NAME: &str = "name";
    pub const RECORD: &str = "record";
    pub const RESULTS: &str = "results";
    pub const TARGET: &str = "target";
    pub const SEQUENCE: &str = "sequence";
    pub const MAC: &str = "mac";
    pub const FIELDS: &str = "fields";
    pub const MODULE: &str = "module";
}

/// Encode an audit entry to canonical CBOR bytes.
pub fn canonical_entry_bytes(entry: &AuditEntry) -> Vec<u8> {
    encode_cbor_value_canonical(&entry_to_cbor_value(entry))
}

/// Encode a structured value to canonical CBOR bytes.
pub fn canonical_value_bytes(value: &Value) -> Vec<u8> {
    encode_cbor_value_canonical(&value_to_cbor(value))
}

/// Construct the bytes a record hash is computed over.
///
/// Format: canonical_entry || prev_hash || timestamp (i64 big-endian)
pub fn record_hash_input(entry: &AuditEntry, prev_hash: &Blake3Hash, timestamp: i64) -> Vec<u8> {
    let mut buf = canonical_entry_bytes(entry);
    buf.extend_from_slice(prev_hash.as_bytes());
    buf.extend_from_slice(&timestamp.to_be_bytes());
    buf
}

/// Decode canonical bytes back into a generic CBOR value.
pub fn decode_canonical(bytes: &[u8]) -> Result<Cbor, CoreError> {
    ciborium::from_reader(bytes).map_err(|e| CoreError::DecodingError(e.to_string()))
}

fn text(s: &str) -> Cbor {
    Cbor::Text(s.to_string())
}

fn entry_to_cbor_value(entry: &AuditEntry) -> Cbor {
    let mut entries = vec![(text(keys::ACTION), text(entry.action()))];

    match entry {
        AuditEntry::Approve { principal, granted } => {
            entries.push((text(keys::PRINCIPAL), text(principal.as_str())));
            entries.push((text(keys::GRANTED), Cbor::Bool(*granted)));
        }
        AuditEntry::Reject { principal } => {
            entries.push((text(keys::PRINCIPAL), text(principal.as_str())));
        }
        AuditEntry::Reset => {}
        AuditEntry::RequestChange {
            principal,
            key,
            value,
        } => {
            entries.push((text(keys::PRINCIPAL), text(principal.as_str())));
            entries.push((text(keys::KEY), text(key)));
            entries.push((text(keys::VALUE), value_to_cbor(value)));
        }
        AuditEntry::ApplyChange { key, value } => {
            entries.push((text(keys::KEY), text(key)));
            entries.push((text(keys::VALUE), value_to_cbor(value)));
        }
        AuditEntry::RegisterModule { name } => {
            entries.push((text(keys::NAME), text(name)));
        }
        AuditEntry::RequestActivation { principal, module } => {
            entries.push((text(keys::PRINCIPAL), text(principal.as_str())));
            entries.push((text(keys::MODULE), text(module)));
        }
        AuditEntry::ActivateModule { module } => {
            entries.push((text(keys::MODULE), text(module)));
        }
        AuditEntry::Inspect { record, results } => {
            entries.push((text(keys::RECORD), value_to_cbor(record)));
            let results = results
                .iter()
                .map(|(name, result)| {
                    let v = result.as_ref().map(value_to_cbor).unwrap_or(Cbor::Null);
                    (text(name), v)
                })
                .collect();
            entries.push((text(keys::RESULTS), Cbor::Map(results)));
        }
        AuditEntry::ChannelSend {
            target,
            sequence,
            mac,
        }
        | AuditEntry::ChannelReceive {
            target,
            sequence,
            mac,
        } => {
            entries.push((text(keys::TARGET), text(target.as_str())));
            entries.push((text(keys::SEQUENCE), Cbor::Integer((*sequence).into())));
            entries.push((text(keys::MAC), Cbor::Bytes(mac.as_bytes().to_vec())));
        }
        AuditEntry::External { name, fields } => {
            entries.push((text(keys::NAME), text(name)));
            entries.push((text(keys::FIELDS), map_to_cbor(fields)));
        }
    }

    Cbor::Map(entries)
}

fn map_to_cbor(map: &BTreeMap<String, Value>) -> Cbor {
    Cbor::Map(
        map.iter()
            .map(|(k, v)| (text(k), value_to_cbor(v)))
            .collect(),
    )
}

fn value_to_cbor(value: &Value) -> Cbor {
    match value {
        Value::Null => Cbor::Null,
        Value::Bool(b) => Cbor::Bool(*b),
        Value::Int(i) => Cbor::Integer((*i).into()),
        Value::Text(s) => text(s),
        Value::Bytes(b) => Cbor::Bytes(b.clone()),
        Value::List(items) => Cbor::Array(items.iter().map(value_to_cbor).collect()),
        Value::Map(map) => map_to_cbor(map),
    }
}

/// Encode a CBOR Value to canonical bytes.
fn encode_cbor_value_canonical(value: &Cbor) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_value_to(&mut buf, value);
    buf
}

/// Recursively encode a CBOR value.
fn encode_value_to(buf: &mut Vec<u8>, value: &Cbor) {
    match value {
        Cbor::Integer(i) => encode_integer(buf, *i),
        Cbor::Bytes(b) => encode_bytes(buf, b),
        Cbor::Text(s) => encode_text(buf, s),
        Cbor::Array(arr) => encode_array(buf, arr),
        Cbor::Map(entries) => encode_map_canonical(buf, entries),
        Cbor::Bool(b) => buf.push(if *b { 0xf5 } else { 0xf4 }),
        Cbor::Null => buf.push(0xf6),
        Cbor::Tag(tag, inner) => {
            encode_uint(buf, 6, *tag);
            encode_value_to(buf, inner);
        }
        // Never produced by the converters above; encoded as a full-width
        // double so the function stays total.
        Cbor::Float(f) => {
            buf.push(0xfb);
            buf.extend_from_slice(&f.to_be_bytes());
        }
        // `undefined`
        _ => buf.push(0xf7),
    }
}

/// Encode a CBOR integer (major types 0 and 1).
fn encode_integer(buf: &mut Vec<u8>, i: ciborium::value::Integer) {
    let n: i128 = i.into();

    if n >= 0 {
        encode_uint(buf, 0, n as u64);
    } else {
        // CBOR encodes -1 as 0, -2 as 1, etc.
        let abs = (-1 - n) as u64;
        encode_uint(buf, 1, abs);
    }
}

/// Encode an unsigned integer with the given major type.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffffffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

/// Encode a byte string (major type 2).
fn encode_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    encode_uint(buf, 2, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

/// Encode a text string (major type 3).
fn encode_text(buf: &mut Vec<u8>, s: &str) {
    encode_uint(buf, 3, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}

/// Encode an array (major type 4).
fn encode_array(buf: &mut Vec<u8>, arr: &[Cbor]) {
    encode_uint(buf, 4, arr.len() as u64);
    for item in arr {
        encode_value_to(buf, item);
    }
}

/// Encode a map canonically (major type 5).
///
/// Keys are sorted by their encoded byte comparison.
fn encode_map_canonical(buf: &mut Vec<u8>, entries: &[(Cbor, Cbor)]) {
    let mut key_value_pairs: Vec<(Vec<u8>, &Cbor)> = entries
        .iter()
        .map(|(k, v)| {
            let mut key_buf = Vec::new();
            encode_value_to(&mut key_buf, k);
            (key_buf, v)
        })
        .collect();

    key_value_pairs.sort_by(|a, b| a.0.cmp(&b.0));

    encode_uint(buf, 5, key_value_pairs.len() as u64);

    for (key_bytes, value) in key_value_pairs {
        buf.extend_from_slice(&key_bytes);
        encode_value_to(buf, value);
    }
}
