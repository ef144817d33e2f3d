//! Output formatting.
//!
//! Two modes:
//! - **Human** (default): one block per event, see `fsjournal_durability::dump`
//! - **JSON** (`--json`): `serde_json::to_string_pretty` of the decoded events

use fsjournal_durability::{dump_records, DecodedRecord};
use serde::Serialize;

/// Output formatting mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Readable blocks, one per event
    Human,
    /// Pretty-printed JSON array of segment dumps
    Json,
}

/// Events of one segment pair.
#[derive(Debug, Serialize)]
pub struct SegmentDump {
    /// Term, when read from a log directory
    pub term: Option<u64>,
    /// Decoded events in file order
    pub records: Vec<DecodedRecord>,
}

/// Format every dumped segment pair.
pub fn format_dumps(dumps: &[SegmentDump], mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => serde_json::to_string_pretty(dumps)
            .unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e)),
        OutputMode::Human => dumps.iter().map(format_human).collect(),
    }
}

fn format_human(dump: &SegmentDump) -> String {
    let mut out = match dump.term {
        Some(term) => format!("--- term {} ({} events)\n", term, dump.records.len()),
        None => format!("--- {} events\n", dump.records.len()),
    };
    out.push_str(&dump_records(&dump.records));
    out
}

/// Format the term list.
pub fn format_terms(terms: &[u64], mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => serde_json::to_string(terms).unwrap_or_else(|_| "[]".to_string()),
        OutputMode::Human if terms.is_empty() => "(no terms)".to_string(),
        OutputMode::Human => terms
            .iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

/// Format an error.
pub fn format_error(err: &dyn std::fmt::Display, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => serde_json::to_string_pretty(&serde_json::json!({
            "error": err.to_string()
        }))
        .unwrap_or_else(|_| format!("{{\"error\": \"{}\"}}", err)),
        OutputMode::Human => format!("(error) {}", err),
    }
}
