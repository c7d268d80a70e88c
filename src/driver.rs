//! The streaming driver (§4.4): reads ndjson lines, classifies each
//! element by `(type, label)`, forwards it to the Linker, the
//! DocumentAssembler, and the Validator, and emits every element back
//! out in input order. The linker's deferred batch is appended once,
//! strictly after the source stream ends.

use std::collections::HashMap;
use std::io::BufRead;
use std::path::PathBuf;

use crate::document::{AssembledDocument, DocumentAssembler};
use crate::error::LinkError;
use crate::id::{Id, IdAllocator};
use crate::linker::Linker;
use crate::protocol::types::{
    DiagnosticResultVertex, DocumentSymbolResultVertex, DocumentVertex, EdgeData, EventKind,
    EventScope, EventVertex, FoldingRangeResultVertex, HoverResultVertex, MonikerKind,
    MonikerVertex, MultiEdgeData, PackageInformationVertex, RangeVertex, ResultSetVertex,
    WireElement,
};
use crate::validator::{DiagnosticSink, Validator};

pub struct DriverOptions {
    pub project_root: PathBuf,
    pub package_manifest_path: PathBuf,
}

/// Owns the three components and the id allocator for one run of the
/// pipeline. Not reused across streams.
pub struct Driver {
    linker: Linker,
    assembler: DocumentAssembler,
    validator: Validator,
    allocator: IdAllocator,
    pending_documents: HashMap<Id, DocumentVertex>,
    pub assembled: Vec<AssembledDocument>,
}

impl Driver {
    pub fn new(options: DriverOptions) -> Self {
        Driver {
            linker: Linker::new(options.project_root, options.package_manifest_path),
            assembler: DocumentAssembler::new(),
            validator: Validator::new(),
            allocator: IdAllocator::new(),
            pending_documents: HashMap::new(),
            assembled: Vec::new(),
        }
    }

    /// Runs the whole pipeline over `input`, calling `emit` once per
    /// pass-through element in input order, then once per element of
    /// the linker's deferred batch.
    pub fn run<R: BufRead>(
        &mut self,
        input: R,
        sink: &mut dyn DiagnosticSink,
        mut emit: impl FnMut(&WireElement) -> anyhow::Result<()>,
    ) -> anyhow::Result<()> {
        for (line_no, line) in input.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let mut element: WireElement = serde_json::from_str(&line).map_err(|source| LinkError::Parse {
                line: line_no + 1,
                source,
            })?;
            self.allocator.observe(&element.id).map_err(LinkError::config)?;
            log::trace!("routing {} element {:?} ({})", element.label, element.id, line_no + 1);
            self.process(&mut element, sink, &mut emit)?;
            emit(&element)?;
        }

        let linker = std::mem::replace(&mut self.linker, Linker::new(PathBuf::new(), PathBuf::new()));
        for element in linker.flush(&mut self.allocator)? {
            emit(&element)?;
        }
        Ok(())
    }

    fn process(
        &mut self,
        element: &mut WireElement,
        sink: &mut dyn DiagnosticSink,
        emit: &mut dyn FnMut(&WireElement) -> anyhow::Result<()>,
    ) -> anyhow::Result<()> {
        if element.is_vertex() {
            self.validator.validate_vertex(element, sink);
            self.ingest_vertex(element)?;
        } else {
            self.validator.validate_edge(element, sink);
            self.ingest_edge(element, emit)?;
        }
        Ok(())
    }

    fn ingest_vertex(&mut self, element: &WireElement) -> anyhow::Result<()> {
        match element.label.as_str() {
            "document" => {
                if let Ok(doc) = element.parse_as::<DocumentVertex>() {
                    self.pending_documents.insert(element.id.clone(), doc);
                }
            }
            "range" => {
                if let Ok(range) = element.parse_as::<RangeVertex>() {
                    self.assembler.cache_range(element.id.clone(), range);
                }
            }
            "resultSet" => {
                if let Ok(result_set) = element.parse_as::<ResultSetVertex>() {
                    self.assembler.cache_result_set(element.id.clone(), result_set);
                }
            }
            "moniker" => {
                if let Ok(moniker) = element.parse_as::<MonikerVertex>() {
                    self.linker
                        .buffer_moniker(element.id.clone(), element.clone(), moniker.clone());
                    self.assembler.cache_moniker(element.id.clone(), moniker.clone());
                    match moniker.kind {
                        MonikerKind::Export => {
                            self.linker.handle_export_moniker(&element.id, &moniker);
                        }
                        MonikerKind::Import => {
                            self.linker.handle_import_moniker(&element.id, &moniker);
                        }
                        MonikerKind::Local => {}
                    }
                }
            }
            "packageInformation" => {
                if let Ok(package_information) = element.parse_as::<PackageInformationVertex>() {
                    self.linker.buffer_package_information(
                        element.id.clone(),
                        package_information.name,
                        package_information.version,
                    );
                }
            }
            "hoverResult" => {
                if let Ok(hover) = element.parse_as::<HoverResultVertex>() {
                    self.assembler.cache_hover(element.id.clone(), hover);
                }
            }
            "foldingRangeResult" => {
                if let Ok(result) = element.parse_as::<FoldingRangeResultVertex>() {
                    self.assembler.cache_folding_ranges(element.id.clone(), result);
                }
            }
            "documentSymbolResult" => {
                if let Ok(result) = element.parse_as::<DocumentSymbolResultVertex>() {
                    self.assembler.cache_document_symbols(element.id.clone(), result);
                }
            }
            "diagnosticResult" => {
                if let Ok(result) = element.parse_as::<DiagnosticResultVertex>() {
                    self.assembler.cache_diagnostics(element.id.clone(), result);
                }
            }
            "$event" => {
                if let Ok(event) = element.parse_as::<EventVertex>() {
                    self.handle_event(event)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn ingest_edge(
        &mut self,
        element: &WireElement,
        emit: &mut dyn FnMut(&WireElement) -> anyhow::Result<()>,
    ) -> anyhow::Result<()> {
        match element.label.as_str() {
            "contains" => {
                if let Ok(data) = element.parse_as::<MultiEdgeData>() {
                    self.assembler.ingest_contains(&data.out_v, &data.in_vs);
                }
            }
            "next" => {
                if let Ok(data) = element.parse_as::<EdgeData>() {
                    self.assembler.ingest_next_edge(data.out_v, data.in_v);
                }
            }
            "moniker" => {
                if let Ok(data) = element.parse_as::<EdgeData>() {
                    self.assembler.ingest_moniker_edge(data.out_v, data.in_v);
                }
            }
            "textDocument/hover" => {
                if let Ok(data) = element.parse_as::<EdgeData>() {
                    self.assembler.ingest_hover_edge(data.out_v, data.in_v);
                }
            }
            "textDocument/foldingRange" => {
                if let Ok(data) = element.parse_as::<EdgeData>() {
                    self.assembler.ingest_folding_range_edge(&data.out_v, &data.in_v);
                }
            }
            "textDocument/documentSymbol" => {
                if let Ok(data) = element.parse_as::<EdgeData>() {
                    self.assembler.ingest_document_symbol_edge(&data.out_v, &data.in_v);
                }
            }
            "textDocument/diagnostic" => {
                if let Ok(data) = element.parse_as::<EdgeData>() {
                    self.assembler.ingest_diagnostic_edge(&data.out_v, &data.in_v);
                }
            }
            "packageInformation" => {
                if let Ok(data) = element.parse_as::<EdgeData>() {
                    if let Some((rewritten_element, rewritten)) =
                        self.linker.handle_package_information_edge(&data)
                    {
                        emit(&rewritten_element)?;
                        self.assembler.cache_moniker(data.out_v, rewritten);
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_event(&mut self, event: EventVertex) -> anyhow::Result<()> {
        match (event.scope, event.kind) {
            (EventScope::Group, EventKind::Begin) => self.linker.on_group_begin(),
            (EventScope::Group, EventKind::End) => self.linker.on_group_end(),
            (EventScope::Document, EventKind::Begin) => {
                if let Some(doc) = self.pending_documents.get(&event.data).cloned() {
                    self.assembler.on_document_begin(event.data, doc.uri, doc.contents);
                }
            }
            (EventScope::Document, EventKind::End) => {
                if let Some(assembled) = self.assembler.on_document_end(&event.data)? {
                    log::debug!("document {} hashed to {}", assembled.uri, assembled.hash);
                    self.assembled.push(assembled);
                }
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::CollectingSink;

    fn driver() -> Driver {
        Driver::new(DriverOptions {
            project_root: std::env::temp_dir(),
            package_manifest_path: std::env::temp_dir().join("package.json"),
        })
    }

    #[test]
    fn empty_stream_produces_empty_output() {
        let mut driver = driver();
        let mut sink = CollectingSink::default();
        let mut emitted = Vec::new();
        driver
            .run(std::io::Cursor::new(""), &mut sink, |e| {
                emitted.push(e.clone());
                Ok(())
            })
            .unwrap();
        assert!(emitted.is_empty());
        assert!(!sink.has_errors());
    }

    #[test]
    fn pass_through_elements_preserve_input_order() {
        let ndjson = r#"{"id":1,"type":"vertex","label":"document","uri":"file:///a.ts"}
{"id":2,"type":"vertex","label":"range","start":{"line":0,"character":0},"end":{"line":0,"character":1}}
{"id":3,"type":"edge","label":"contains","outV":1,"inVs":[2]}
"#;
        let mut driver = driver();
        let mut sink = CollectingSink::default();
        let mut emitted = Vec::new();
        driver
            .run(std::io::Cursor::new(ndjson), &mut sink, |e| {
                emitted.push(e.id.clone());
                Ok(())
            })
            .unwrap();
        assert_eq!(emitted, vec![Id::Number(1), Id::Number(2), Id::Number(3)]);
    }

    #[test]
    fn reordered_edge_is_flagged_and_stream_continues() {
        let ndjson = r#"{"id":1,"type":"edge","label":"next","outV":5,"inV":6}
{"id":2,"type":"vertex","label":"range","start":{"line":0,"character":0},"end":{"line":0,"character":1}}
"#;
        let mut driver = driver();
        let mut sink = CollectingSink::default();
        let mut emitted = Vec::new();
        driver
            .run(std::io::Cursor::new(ndjson), &mut sink, |e| {
                emitted.push(e.id.clone());
                Ok(())
            })
            .unwrap();
        assert_eq!(emitted.len(), 2);
        assert!(sink.has_errors());
    }

    #[test]
    fn malformed_line_is_a_fatal_parse_error() {
        let mut driver = driver();
        let mut sink = CollectingSink::default();
        let result = driver.run(std::io::Cursor::new("not json\n"), &mut sink, |_| Ok(()));
        assert!(result.is_err());
    }

    #[test]
    fn document_symbol_result_is_parsed_and_hashed() {
        let ndjson = r#"{"id":1,"type":"vertex","label":"document","uri":"file:///a.ts","contents":"abc"}
{"id":2,"type":"vertex","label":"range","start":{"line":0,"character":0},"end":{"line":0,"character":1}}
{"id":3,"type":"vertex","label":"documentSymbolResult","result":[{"id":2,"children":[]}]}
{"id":4,"type":"vertex","label":"$event","kind":"begin","scope":"document","data":1}
{"id":5,"type":"edge","label":"contains","outV":1,"inVs":[2]}
{"id":6,"type":"edge","label":"textDocument/documentSymbol","outV":1,"inV":3}
{"id":7,"type":"vertex","label":"$event","kind":"end","scope":"document","data":1}
"#;
        let mut driver = driver();
        let mut sink = CollectingSink::default();
        driver.run(std::io::Cursor::new(ndjson), &mut sink, |_| Ok(())).unwrap();

        assert!(!sink.has_errors());
        assert_eq!(driver.assembled.len(), 1);
        let symbols = driver.assembled[0].blob.document_symbols.as_ref().unwrap();
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].range_id, Id::Number(2));
    }

    #[test]
    fn package_information_edge_rewrites_and_emits_moniker_before_the_edge() {
        let root = std::env::temp_dir().join(format!(
            "lsif-link-driver-pkginfo-test-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(
            root.join("package.json"),
            r#"{"name":"pkg","version":"1.0.0"}"#,
        )
        .unwrap();

        let ndjson = r#"{"id":1,"type":"vertex","label":"group","rootUri":"file:///proj"}
{"id":2,"type":"vertex","label":"$event","kind":"begin","scope":"group","data":1}
{"id":3,"type":"vertex","label":"moniker","scheme":"tsc","identifier":"src/a.ts::foo","kind":"export","unique":"document"}
{"id":4,"type":"vertex","label":"packageInformation","name":"pkg","manager":"npm","version":"1.0.0"}
{"id":5,"type":"edge","label":"packageInformation","outV":3,"inV":4}
{"id":6,"type":"vertex","label":"$event","kind":"end","scope":"group","data":1}
"#;

        let mut driver = Driver::new(DriverOptions {
            project_root: root.clone(),
            package_manifest_path: root.join("package.json"),
        });
        let mut sink = CollectingSink::default();
        let mut emitted = Vec::new();
        driver
            .run(std::io::Cursor::new(ndjson), &mut sink, |e| {
                emitted.push(e.clone());
                Ok(())
            })
            .unwrap();

        let edge_position = emitted.iter().position(|e| e.id == Id::Number(5)).unwrap();
        let rewritten_position = emitted
            .iter()
            .position(|e| e.label == "moniker" && e.fields.get("identifier").and_then(|v| v.as_str()) == Some("pkg@1.0.0/src/a.ts::foo"))
            .expect("rewritten moniker was never emitted");
        assert!(rewritten_position < edge_position, "rewritten moniker must be emitted before the packageInformation edge");

        std::fs::remove_dir_all(&root).ok();
    }
}
