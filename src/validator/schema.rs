//! Static schema tables (§4.3): required properties per vertex label and
//! permitted `(outLabel, inLabel)` pairs per edge label.

use lazy_static::lazy_static;
use std::collections::{HashMap, HashSet};

lazy_static! {
    /// Required property names per vertex label, for labels this crate
    /// knows how to check (unrecognized labels pass through unchecked).
    pub static ref REQUIRED_VERTEX_PROPERTIES: HashMap<&'static str, &'static [&'static str]> = {
        let mut m = HashMap::new();
        m.insert("document", &["uri"][..]);
        m.insert("range", &["start", "end"][..]);
        m.insert("moniker", &["scheme", "identifier", "kind", "unique"][..]);
        m.insert("packageInformation", &["name", "manager"][..]);
        m.insert("hoverResult", &["result"][..]);
        m.insert("foldingRangeResult", &["result"][..]);
        m.insert("diagnosticResult", &["result"][..]);
        m.insert("documentSymbolResult", &["result"][..]);
        m.insert("$event", &["kind", "scope", "data"][..]);
        m.insert("metaData", &["version", "positionEncoding", "projectRoot"][..]);
        m
    };

    /// Permitted `(outLabel, inLabel)` pairs per edge label (§4.3 check 4).
    pub static ref PERMITTED_EDGE_ENDPOINTS: HashMap<&'static str, &'static [(&'static str, &'static str)]> = {
        let mut m = HashMap::new();
        m.insert("contains", &[("project", "document"), ("document", "range")][..]);
        m.insert("next", &[("range", "resultSet"), ("resultSet", "resultSet")][..]);
        m.insert("moniker", &[("range", "moniker"), ("resultSet", "moniker")][..]);
        m.insert("attach", &[("moniker", "moniker")][..]);
        m.insert("packageInformation", &[("moniker", "packageInformation")][..]);
        m.insert(
            "textDocument/hover",
            &[("range", "hoverResult"), ("resultSet", "hoverResult")][..],
        );
        m.insert(
            "textDocument/foldingRange",
            &[("document", "foldingRangeResult")][..],
        );
        m.insert(
            "textDocument/documentSymbol",
            &[("document", "documentSymbolResult")][..],
        );
        m.insert(
            "textDocument/diagnostic",
            &[("document", "diagnosticResult"), ("project", "diagnosticResult")][..],
        );
        m.insert(
            "item",
            &[
                ("definitionResult", "range"),
                ("referenceResult", "range"),
                ("referenceResult", "moniker"),
            ][..],
        );
        m
    };

    pub static ref MONIKER_KINDS: HashSet<&'static str> = ["local", "import", "export"].iter().copied().collect();
    pub static ref UNIQUENESS_LEVELS: HashSet<&'static str> =
        ["document", "scheme", "group", "workspace", "global"].iter().copied().collect();
    pub static ref EVENT_SCOPES: HashSet<&'static str> =
        ["project", "document", "group", "monikerAttach"].iter().copied().collect();
    pub static ref EVENT_KINDS: HashSet<&'static str> = ["begin", "end"].iter().copied().collect();
}

/// Edge labels whose `inV` is a homogeneous `inVs` array (§4.3 check 3).
pub fn is_multi_edge(label: &str) -> bool {
    matches!(label, "contains" | "item")
}
