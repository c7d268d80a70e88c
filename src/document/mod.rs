//! Document sharding and hashing (§4.2): accumulates all per-document
//! facts between a document's `begin`/`end` events into a single blob
//! and computes its canonical hash.

pub mod blob;
pub mod hash;

use std::collections::HashMap;

use languageserver_types::Url;
use serde_json::Value;

use crate::error::LinkError;
use crate::id::Id;
use crate::protocol::types::{
    DiagnosticResultVertex, DocumentSymbolResultKind, DocumentSymbolResultVertex, FoldingRangeResultVertex,
    HoverResultVertex, MonikerVertex, RangeVertex, ResultSetVertex,
};

use blob::{DiagnosticEntry, DocumentBlob, RangeData, ResolvedDocumentSymbol, ResultSetData};

#[derive(Debug)]
struct OpenDocument {
    uri: Url,
    blob: DocumentBlob,
    range_ids: Vec<Id>,
    pending_document_symbols: Option<DocumentSymbolResultVertex>,
}

/// Caches shared by every open document: ranges, result sets, monikers
/// and result payloads are vertices that can be ingested before the
/// `contains` edge says which document they belong to, so they're kept
/// globally until a document claims them at `end`.
#[derive(Debug, Default)]
pub struct DocumentAssembler {
    open: HashMap<Id, OpenDocument>,
    ranges: HashMap<Id, RangeVertex>,
    result_sets: HashMap<Id, ResultSetVertex>,
    monikers: HashMap<Id, MonikerVertex>,
    hover_results: HashMap<Id, Value>,
    folding_range_results: HashMap<Id, Vec<Value>>,
    document_symbol_results: HashMap<Id, DocumentSymbolResultVertex>,
    diagnostic_results: HashMap<Id, Vec<Value>>,

    /// element (range or resultSet) id -> moniker id
    moniker_links: HashMap<Id, Id>,
    /// element (range or resultSet) id -> hoverResult id
    hover_links: HashMap<Id, Id>,
    /// range id -> resultSet id
    next_links: HashMap<Id, Id>,
}

pub struct AssembledDocument {
    pub uri: Url,
    pub blob: DocumentBlob,
    pub hash: String,
}

impl DocumentAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_document_begin(&mut self, doc_id: Id, uri: Url, contents: Option<String>) {
        self.open.insert(
            doc_id,
            OpenDocument {
                uri,
                blob: DocumentBlob {
                    contents: contents.unwrap_or_default(),
                    ..Default::default()
                },
                range_ids: Vec::new(),
                pending_document_symbols: None,
            },
        );
    }

    pub fn cache_range(&mut self, id: Id, range: RangeVertex) {
        self.ranges.insert(id, range);
    }

    pub fn cache_result_set(&mut self, id: Id, result_set: ResultSetVertex) {
        self.result_sets.insert(id, result_set);
    }

    pub fn cache_moniker(&mut self, id: Id, moniker: MonikerVertex) {
        self.monikers.insert(id, moniker);
    }

    pub fn cache_hover(&mut self, id: Id, hover: HoverResultVertex) {
        self.hover_results.insert(id, hover.result);
    }

    pub fn cache_folding_ranges(&mut self, id: Id, result: FoldingRangeResultVertex) {
        self.folding_range_results.insert(id, result.result);
    }

    pub fn cache_document_symbols(&mut self, id: Id, result: DocumentSymbolResultVertex) {
        self.document_symbol_results.insert(id, result);
    }

    pub fn cache_diagnostics(&mut self, id: Id, result: DiagnosticResultVertex) {
        self.diagnostic_results.insert(id, result.result);
    }

    /// `contains` edge: `out_v` is an open document (or the project,
    /// which this assembler ignores), `in_vs` are range ids.
    pub fn ingest_contains(&mut self, doc_id: &Id, range_ids: &[Id]) {
        if let Some(doc) = self.open.get_mut(doc_id) {
            doc.range_ids.extend(range_ids.iter().cloned());
        }
    }

    /// `moniker` edge: `out_v` is a range or resultSet, `in_v` a moniker.
    pub fn ingest_moniker_edge(&mut self, out_v: Id, in_v: Id) {
        self.moniker_links.insert(out_v, in_v);
    }

    /// `next` edge: `out_v` a range, `in_v` a resultSet.
    pub fn ingest_next_edge(&mut self, out_v: Id, in_v: Id) {
        self.next_links.insert(out_v, in_v);
    }

    /// `textDocument/hover` edge: `out_v` a range or resultSet, `in_v` a
    /// hoverResult.
    pub fn ingest_hover_edge(&mut self, out_v: Id, in_v: Id) {
        self.hover_links.insert(out_v, in_v);
    }

    /// `textDocument/foldingRange` edge: `out_v` the document, `in_v` a
    /// foldingRangeResult.
    pub fn ingest_folding_range_edge(&mut self, doc_id: &Id, result_id: &Id) {
        if let (Some(doc), Some(ranges)) = (
            self.open.get_mut(doc_id),
            self.folding_range_results.get(result_id),
        ) {
            doc.blob.folding_ranges = ranges.clone();
        }
    }

    /// `textDocument/documentSymbol` edge: `out_v` the document, `in_v` a
    /// documentSymbolResult.
    pub fn ingest_document_symbol_edge(&mut self, doc_id: &Id, result_id: &Id) {
        if let (Some(doc), Some(result)) = (
            self.open.get_mut(doc_id),
            self.document_symbol_results.get(result_id),
        ) {
            doc.pending_document_symbols = Some(result.clone());
        }
    }

    /// `textDocument/diagnostic` edge: `out_v` the document, `in_v` a
    /// diagnosticResult.
    pub fn ingest_diagnostic_edge(&mut self, doc_id: &Id, result_id: &Id) {
        if let (Some(doc), Some(diagnostics)) = (
            self.open.get_mut(doc_id),
            self.diagnostic_results.get(result_id),
        ) {
            doc.blob.diagnostics = diagnostics
                .iter()
                .map(|raw| DiagnosticEntry {
                    range: extract_diagnostic_range(raw),
                    message: extract_diagnostic_message(raw),
                    raw: raw.clone(),
                })
                .collect();
        }
    }

    /// §4.2 `on_document_end`. Walks the document's ranges, resolves
    /// monikers/hovers/result-sets transitively, computes the canonical
    /// hash, and releases every cache entry owned solely by this
    /// document.
    pub fn on_document_end(&mut self, doc_id: &Id) -> anyhow::Result<Option<AssembledDocument>> {
        let mut doc = match self.open.remove(doc_id) {
            Some(d) => d,
            None => return Ok(None),
        };

        for range_id in doc.range_ids.drain(..).collect::<Vec<_>>() {
            let range = match self.ranges.get(&range_id) {
                Some(r) => r.clone(),
                None => continue,
            };
            doc.blob.ranges.insert(
                range_id.clone(),
                RangeData {
                    coords: range.coords,
                    tag: range.tag.clone(),
                },
            );

            let reachable_moniker = self.resolve_moniker_for(&range_id);
            if let Some(moniker_id) = &reachable_moniker {
                if let Some(moniker) = self.monikers.get(moniker_id) {
                    doc.blob.monikers.insert(moniker_id.clone(), moniker.clone());
                }
            }

            if let Some(resultset_id) = self.next_links.get(&range_id).cloned() {
                let moniker_for_resultset = self.moniker_links.get(&resultset_id).cloned();
                doc.blob.result_sets.insert(
                    resultset_id.clone(),
                    ResultSetData {
                        moniker: moniker_for_resultset.clone(),
                    },
                );
                if let Some(m) = moniker_for_resultset.as_ref().and_then(|id| self.monikers.get(id)) {
                    doc.blob
                        .monikers
                        .insert(moniker_for_resultset.clone().unwrap(), m.clone());
                }
            }

            let moniker_is_local_or_absent = reachable_moniker
                .as_ref()
                .and_then(|id| self.monikers.get(id))
                .map(|m| m.scheme == "$local")
                .unwrap_or(true);

            if moniker_is_local_or_absent {
                if let Some(hover) = self.hover_for(&range_id) {
                    doc.blob.hovers.insert(range_id.clone(), hover);
                }
            }
        }

        let document_symbols = match doc.pending_document_symbols.take().map(|v| v.result) {
            Some(DocumentSymbolResultKind::Flat(_)) => {
                return Err(LinkError::Assembly {
                    document: doc.uri.to_string(),
                    message: "flat DocumentSymbol[] is not supported for hashing; only the range-based form is".to_string(),
                }
                .into());
            }
            Some(DocumentSymbolResultKind::RangeBased(nodes)) => {
                Some(nodes.into_iter().map(resolve_symbol_node).collect())
            }
            None => None,
        };
        doc.blob.document_symbols = document_symbols;

        let hash = hash::canonical_hash(&doc.uri.to_string(), &doc.blob)?;

        Ok(Some(AssembledDocument {
            uri: doc.uri,
            blob: doc.blob,
            hash,
        }))
    }

    fn resolve_moniker_for(&self, element_id: &Id) -> Option<Id> {
        if let Some(id) = self.moniker_links.get(element_id) {
            return Some(id.clone());
        }
        let resultset_id = self.next_links.get(element_id)?;
        self.moniker_links.get(resultset_id).cloned()
    }

    fn hover_for(&self, element_id: &Id) -> Option<Value> {
        if let Some(id) = self.hover_links.get(element_id) {
            return self.hover_results.get(id).cloned();
        }
        let resultset_id = self.next_links.get(element_id)?;
        let hover_id = self.hover_links.get(resultset_id)?;
        self.hover_results.get(hover_id).cloned()
    }
}

fn resolve_symbol_node(
    node: crate::protocol::types::RangeBasedDocumentSymbol,
) -> ResolvedDocumentSymbol {
    ResolvedDocumentSymbol {
        range_id: node.id,
        children: node.children.into_iter().map(resolve_symbol_node).collect(),
    }
}

fn extract_diagnostic_range(raw: &Value) -> Option<crate::protocol::types::RangeCoords> {
    raw.get("range")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}

fn extract_diagnostic_message(raw: &Value) -> String {
    raw.get("message")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::{Position, RangeCoords};

    fn sample_range(line: u64) -> RangeVertex {
        RangeVertex {
            coords: RangeCoords {
                start: Position { line, character: 0 },
                end: Position { line, character: 3 },
            },
            tag: None,
        }
    }

    #[test]
    fn assembles_blob_and_hashes_deterministically() {
        let mut assembler = DocumentAssembler::new();
        let uri = Url::parse("file:///a.ts").unwrap();
        assembler.on_document_begin(Id::Number(1), uri, Some("let a = 1;".into()));
        assembler.cache_range(Id::Number(2), sample_range(0));
        assembler.ingest_contains(&Id::Number(1), &[Id::Number(2)]);

        let assembled = assembler.on_document_end(&Id::Number(1)).unwrap().unwrap();
        assert!(!assembled.hash.is_empty());
        assert_eq!(assembled.blob.ranges.len(), 1);
    }

    #[test]
    fn hash_stable_regardless_of_fact_arrival_order() {
        let uri = Url::parse("file:///a.ts").unwrap();

        let mut first = DocumentAssembler::new();
        first.on_document_begin(Id::Number(1), uri.clone(), Some("abc".into()));
        first.cache_range(Id::Number(2), sample_range(0));
        first.cache_range(Id::Number(3), sample_range(1));
        first.ingest_contains(&Id::Number(1), &[Id::Number(2), Id::Number(3)]);
        let first_hash = first.on_document_end(&Id::Number(1)).unwrap().unwrap().hash;

        let mut second = DocumentAssembler::new();
        second.on_document_begin(Id::Number(1), uri, Some("abc".into()));
        second.cache_range(Id::Number(3), sample_range(1));
        second.cache_range(Id::Number(2), sample_range(0));
        second.ingest_contains(&Id::Number(1), &[Id::Number(3)]);
        second.ingest_contains(&Id::Number(1), &[Id::Number(2)]);
        let second_hash = second.on_document_end(&Id::Number(1)).unwrap().unwrap().hash;

        assert_eq!(first_hash, second_hash);
    }

    #[test]
    fn non_local_hover_excluded_local_hover_included() {
        use crate::protocol::types::{MonikerKind, UniquenessLevel};

        let uri = Url::parse("file:///a.ts").unwrap();
        let mut assembler = DocumentAssembler::new();
        assembler.on_document_begin(Id::Number(1), uri, Some("abc".into()));
        assembler.cache_range(Id::Number(2), sample_range(0));
        assembler.cache_range(Id::Number(3), sample_range(1));
        assembler.ingest_contains(&Id::Number(1), &[Id::Number(2), Id::Number(3)]);

        assembler.cache_hover(Id::Number(100), HoverResultVertex {
            result: serde_json::json!("local hover"),
        });
        assembler.cache_hover(Id::Number(101), HoverResultVertex {
            result: serde_json::json!("non-local hover"),
        });
        assembler.ingest_hover_edge(Id::Number(2), Id::Number(100));
        assembler.ingest_hover_edge(Id::Number(3), Id::Number(101));

        assembler.cache_moniker(
            Id::Number(200),
            MonikerVertex {
                scheme: "$local".into(),
                identifier: "local-sym".into(),
                kind: MonikerKind::Local,
                unique: UniquenessLevel::Document,
            },
        );
        assembler.cache_moniker(
            Id::Number(201),
            MonikerVertex {
                scheme: "npm".into(),
                identifier: "pkg::sym".into(),
                kind: MonikerKind::Export,
                unique: UniquenessLevel::Scheme,
            },
        );
        assembler.ingest_moniker_edge(Id::Number(2), Id::Number(200));
        assembler.ingest_moniker_edge(Id::Number(3), Id::Number(201));

        let assembled = assembler.on_document_end(&Id::Number(1)).unwrap().unwrap();
        assert!(assembled.blob.hovers.contains_key(&Id::Number(2)));
        assert!(!assembled.blob.hovers.contains_key(&Id::Number(3)));
    }
}
