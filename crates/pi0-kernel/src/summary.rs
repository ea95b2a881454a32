//! Read-only ASCII table projections of kernel state.

use std::fmt::Write;

use chrono::DateTime;
use pi0_kernel_core::AuditRecord;
use pi0_kernel_gate::ConfigSnapshot;

const KV_RULE: &str = "+----------------------+---------------------------+";
const AUDIT_RULE: &str = "+-------+----------------------+--------------------------------+";

/// One row per audit record: position, UTC time, and the start of the entry.
pub fn render_audit(records: &[AuditRecord]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", AUDIT_RULE);
    let _ = writeln!(out, "|  #    | Timestamp            | Entry                          |");
    let _ = writeln!(out, "{}", AUDIT_RULE);
    for (i, record) in records.iter().enumerate() {
        let entry = serde_json::to_string(&record.entry).unwrap_or_else(|_| record.entry.action().to_string());
        let _ = writeln!(
            out,
            "| {:5} | {} | {} |",
            i + 1,
            fit(&format_utc(record.timestamp), 20),
            fit(&entry, 30)
        );
    }
    let _ = writeln!(out, "{}", AUDIT_RULE);
    out
}

/// One row per config key in key order.
pub fn render_config(snapshot: &ConfigSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", KV_RULE);
    let _ = writeln!(out, "| Parameter            | Value                     |");
    let _ = writeln!(out, "{}", KV_RULE);
    for (key, value) in snapshot.iter() {
        let _ = writeln!(out, "| {} | {} |", fit(key, 20), fit(&value.to_string(), 25));
    }
    let _ = writeln!(out, "{}", KV_RULE);
    out
}

/// One row per registered module, with whether a quorum has activated it.
pub fn render_modules(modules: &[(String, bool)]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", KV_RULE);
    let _ = writeln!(out, "| Module               | Status                    |");
    let _ = writeln!(out, "{}", KV_RULE);
    for (name, active) in modules {
        let status = if *active { "Active" } else { "Loaded" };
        let _ = writeln!(out, "| {} | {} |", fit(name, 20), fit(status, 25));
    }
    let _ = writeln!(out, "{}", KV_RULE);
    out
}

/// Pad or cut `s` to exactly `width` characters.
fn fit(s: &str, width: usize) -> String {
    let cut: String = s.chars().take(width).collect();
    format!("{:<width$}", cut, width = width)
}

/// `YYYY-MM-DD HH:MM:SS` in UTC for a Unix millisecond timestamp.
///
/// Timestamps outside chrono's range fall back to the raw milliseconds.
fn format_utc(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| millis.to_string())
}
