//! The document blob (§4.2 "Blob shape") and the canonical, order-free
//! positional encoding ("compressor") that the hash in [`super::hash`]
//! is computed over.

use std::collections::HashMap;

use serde_json::Value;

use crate::id::Id;
use crate::protocol::types::{MonikerKind, MonikerVertex, RangeCoords, RangeTag};

#[derive(Debug, Clone)]
pub struct RangeData {
    pub coords: RangeCoords,
    pub tag: Option<RangeTag>,
}

#[derive(Debug, Clone, Default)]
pub struct ResultSetData {
    pub moniker: Option<Id>,
}

#[derive(Debug, Clone)]
pub struct DiagnosticEntry {
    pub range: Option<RangeCoords>,
    pub message: String,
    pub raw: Value,
}

/// A range-based document symbol resolved against the blob's ranges.
#[derive(Debug, Clone)]
pub struct ResolvedDocumentSymbol {
    pub range_id: Id,
    pub children: Vec<ResolvedDocumentSymbol>,
}

#[derive(Debug, Clone, Default)]
pub struct DocumentBlob {
    pub contents: String,
    pub ranges: HashMap<Id, RangeData>,
    pub result_sets: HashMap<Id, ResultSetData>,
    pub monikers: HashMap<Id, MonikerVertex>,
    pub hovers: HashMap<Id, Value>,
    pub folding_ranges: Vec<Value>,
    pub document_symbols: Option<Vec<ResolvedDocumentSymbol>>,
    pub diagnostics: Vec<DiagnosticEntry>,
}

/// Serializes a range into the fixed-order positional array the hash is
/// fed, eliminating property-name ordering hazards (§4.2).
pub fn compress_range(range: &RangeData) -> Value {
    let tag = range
        .tag
        .as_ref()
        .map(|t| serde_json::to_value(t).expect("range tag always serializes"))
        .unwrap_or(Value::Null);
    serde_json::json!([
        range.coords.start.line,
        range.coords.start.character,
        range.coords.end.line,
        range.coords.end.character,
        tag,
    ])
}

pub fn compress_moniker(moniker: &MonikerVertex) -> Value {
    serde_json::json!([
        moniker.identifier,
        moniker.scheme,
        moniker_kind_label(moniker.kind),
    ])
}

fn moniker_kind_label(kind: MonikerKind) -> &'static str {
    match kind {
        MonikerKind::Local => "local",
        MonikerKind::Import => "import",
        MonikerKind::Export => "export",
    }
}

/// `import < export`; an undefined/local kind sorts with `import`
/// (§4.2 "Canonical hash algorithm", step 3).
pub fn moniker_sort_key(kind: MonikerKind) -> u8 {
    match kind {
        MonikerKind::Export => 1,
        MonikerKind::Local | MonikerKind::Import => 0,
    }
}
