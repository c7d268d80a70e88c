//! The wire graph (§3). Every line of input/output is a `WireElement`: an
//! `id`, a `type` ("vertex"/"edge"), a `label`, and a bag of label-specific
//! fields. Unknown labels keep their fields as raw JSON and are forwarded
//! unmodified (§4.4); labels the core inspects are additionally decoded
//! into one of the typed structs below via [`WireElement::parse_as`].
//!
//! This two-tier shape (generic envelope + typed views on demand) is what
//! lets the driver guarantee output order = input order for pass-through
//! elements without needing an exhaustive, lossless `Serialize` impl for
//! every LSIF vertex/edge label that exists in the wild.

use languageserver_types as lsp;
pub use languageserver_types::{NumberOrString, Position, Range as LspRange, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

pub use crate::id::Id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Vertex,
    Edge,
}

/// One line of the ndjson stream, decoded just enough to route it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireElement {
    pub id: Id,
    #[serde(rename = "type")]
    pub kind: ElementKind,
    pub label: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl WireElement {
    pub fn vertex(id: Id, label: impl Into<String>, payload: impl Serialize) -> Self {
        Self::new(id, ElementKind::Vertex, label, payload)
    }

    pub fn edge(id: Id, label: impl Into<String>, payload: impl Serialize) -> Self {
        Self::new(id, ElementKind::Edge, label, payload)
    }

    fn new(id: Id, kind: ElementKind, label: impl Into<String>, payload: impl Serialize) -> Self {
        let fields = match serde_json::to_value(payload).expect("payload always serializes") {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => panic!("element payload must serialize to an object, got {}", other),
        };
        WireElement {
            id,
            kind,
            label: label.into(),
            fields,
        }
    }

    /// Decodes this element's fields into a typed payload. Used for the
    /// handful of labels the core inspects; every other label is left as
    /// the raw `fields` map and passed through untouched.
    pub fn parse_as<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_value(Value::Object(self.fields.clone()))
    }

    pub fn is_vertex(&self) -> bool {
        matches!(self.kind, ElementKind::Vertex)
    }

    pub fn is_edge(&self) -> bool {
        matches!(self.kind, ElementKind::Edge)
    }
}

// ---------------------------------------------------------------------
// Vertex payloads
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentVertex {
    #[serde(with = "url_serde")]
    pub uri: lsp::Url,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contents: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RangeCoords {
    pub start: Position,
    pub end: Position,
}

impl RangeCoords {
    /// Sort key used wherever ranges must be ordered deterministically
    /// regardless of arrival order (§4.2 canonical hash algorithm).
    pub fn sort_key(&self) -> (u64, u64, u64, u64) {
        (
            self.start.line,
            self.start.character,
            self.end.line,
            self.end.character,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeVertex {
    #[serde(flatten)]
    pub coords: RangeCoords,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<RangeTag>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(tag = "type")]
pub enum RangeTag {
    Definition(DefinitionTag),
    Declaration(DefinitionTag),
    Reference(ReferenceTag),
    Unknown(ReferenceTag),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionTag {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<u32>,
    #[serde(default)]
    pub deprecated: bool,
    pub full_range: LspRange,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceTag {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResultSetVertex {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MonikerKind {
    Local,
    Import,
    Export,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UniquenessLevel {
    Document,
    Scheme,
    Group,
    Workspace,
    Global,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonikerVertex {
    pub scheme: String,
    pub identifier: String,
    pub kind: MonikerKind,
    pub unique: UniquenessLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    pub r#type: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageInformationVertex {
    pub name: String,
    pub manager: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<Repository>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "url_serde_opt")]
    pub uri: Option<lsp::Url>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoverResultVertex {
    pub result: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoldingRangeResultVertex {
    pub result: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticResultVertex {
    pub result: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSymbolResultVertex {
    pub result: DocumentSymbolResultKind,
}

/// Either a flat `DocumentSymbol[]` (unsupported for hashing, §4.2) or a
/// range-based tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocumentSymbolResultKind {
    RangeBased(Vec<RangeBasedDocumentSymbol>),
    Flat(Vec<Value>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeBasedDocumentSymbol {
    pub id: Id,
    #[serde(default)]
    pub children: Vec<RangeBasedDocumentSymbol>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaDataVertex {
    pub version: String,
    pub position_encoding: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_info: Option<ToolInfo>,
    #[serde(with = "url_serde")]
    pub project_root: lsp::Url,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventScope {
    Project,
    Document,
    Group,
    #[serde(rename = "monikerAttach")]
    MonikerAttach,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Begin,
    End,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventVertex {
    pub kind: EventKind,
    pub scope: EventScope,
    pub data: Id,
}

// ---------------------------------------------------------------------
// Edge payloads
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeData {
    pub out_v: Id,
    pub in_v: Id,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiEdgeData {
    pub out_v: Id,
    pub in_vs: Vec<Id>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ItemProperty {
    Definitions,
    References,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemEdge {
    pub out_v: Id,
    pub in_vs: Vec<Id>,
    /// The shard (document, or project for project-scoped items) this
    /// item edge belongs to. Named `document` on the wire per the LSIF
    /// schema; called `shard` in this crate's vocabulary (§ glossary).
    #[serde(rename = "document")]
    pub shard: Id,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<ItemProperty>,
}

mod url_serde_opt {
    use languageserver_types::Url;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(url: &Option<Url>, s: S) -> Result<S::Ok, S::Error> {
        match url {
            Some(u) => url_serde::serialize(u, s),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Url>, D::Error> {
        #[derive(serde::Deserialize)]
        struct Wrap(#[serde(with = "url_serde")] Url);
        Ok(Option::<Wrap>::deserialize(d)?.map(|w| w.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_range_vertex_from_fields() {
        let json = serde_json::json!({
            "id": 4,
            "type": "vertex",
            "label": "range",
            "start": {"line": 0, "character": 1},
            "end": {"line": 0, "character": 4}
        });
        let elem: WireElement = serde_json::from_value(json).unwrap();
        assert_eq!(elem.label, "range");
        let range: RangeVertex = elem.parse_as().unwrap();
        assert_eq!(range.coords.start.line, 0);
        assert_eq!(range.coords.end.character, 4);
    }

    #[test]
    fn unknown_label_round_trips_fields() {
        let json = serde_json::json!({
            "id": 9,
            "type": "edge",
            "label": "textDocument/references",
            "outV": 1,
            "inV": 2
        });
        let elem: WireElement = serde_json::from_value(json.clone()).unwrap();
        let out = serde_json::to_value(&elem).unwrap();
        assert_eq!(out["outV"], json["outV"]);
        assert_eq!(out["label"], "textDocument/references");
    }

    #[test]
    fn moniker_vertex_builder_round_trips() {
        let elem = WireElement::vertex(
            Id::Number(1),
            "moniker",
            MonikerVertex {
                scheme: "npm".into(),
                identifier: "pkg::foo".into(),
                kind: MonikerKind::Export,
                unique: UniquenessLevel::Scheme,
            },
        );
        let decoded: MonikerVertex = elem.parse_as().unwrap();
        assert_eq!(decoded.identifier, "pkg::foo");
    }
}
