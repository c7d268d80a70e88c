//! Structural validation (§4.3): per-vertex and per-edge schema checks
//! plus event open/close tracking, reported through a [`DiagnosticSink`]
//! rather than by halting the stream.

pub mod schema;

use std::collections::{HashMap, HashSet};

use log::{error, info, warn};

use crate::id::Id;
use crate::protocol::types::WireElement;
use schema::{
    is_multi_edge, EVENT_KINDS, EVENT_SCOPES, MONIKER_KINDS, PERMITTED_EDGE_ENDPOINTS,
    REQUIRED_VERTEX_PROPERTIES, UNIQUENESS_LEVELS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warn,
    Info,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub element_id: Id,
}

pub trait DiagnosticSink {
    fn report(&mut self, diagnostic: Diagnostic);
}

/// Collects diagnostics for later inspection, used by tests and by
/// `lsif-validate` to decide the process exit code.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub diagnostics: Vec<Diagnostic>,
}

impl DiagnosticSink for CollectingSink {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }
}

impl CollectingSink {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }
}

/// Routes diagnostics to the matching `log` level, used by `lsif-link`.
#[derive(Debug, Default)]
pub struct LoggingSink;

impl DiagnosticSink for LoggingSink {
    fn report(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Error => error!("{} (element {})", diagnostic.message, diagnostic.element_id),
            Severity::Warn => warn!("{} (element {})", diagnostic.message, diagnostic.element_id),
            Severity::Info => info!("{} (element {})", diagnostic.message, diagnostic.element_id),
        }
    }
}

#[derive(Debug, Default)]
pub struct Validator {
    vertex_labels: HashMap<Id, String>,
    open_events: HashSet<Id>,
    closed_events: HashSet<Id>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate_vertex(&mut self, element: &WireElement, sink: &mut dyn DiagnosticSink) {
        self.vertex_labels.insert(element.id.clone(), element.label.clone());

        if let Some(required) = REQUIRED_VERTEX_PROPERTIES.get(element.label.as_str()) {
            for prop in required.iter() {
                if !element.fields.contains_key(*prop) {
                    sink.report(Diagnostic {
                        severity: Severity::Error,
                        message: format!("vertex `{}` is missing required property `{}`", element.label, prop),
                        element_id: element.id.clone(),
                    });
                }
            }
        }

        match element.label.as_str() {
            "moniker" => {
                self.check_enum_member(element, "kind", &MONIKER_KINDS, sink);
                self.check_enum_member(element, "unique", &UNIQUENESS_LEVELS, sink);
            }
            "range" => {
                self.check_range_coordinates(element, sink);
            }
            "$event" => {
                self.check_enum_member(element, "scope", &EVENT_SCOPES, sink);
                self.check_enum_member(element, "kind", &EVENT_KINDS, sink);
                self.track_event(element, sink);
            }
            _ => {}
        }
    }

    /// §4.3 well-formedness: `start`/`end` positions must have
    /// non-negative `line`/`character` coordinates.
    fn check_range_coordinates(&self, element: &WireElement, sink: &mut dyn DiagnosticSink) {
        for endpoint in ["start", "end"] {
            let position = match element.fields.get(endpoint).and_then(|v| v.as_object()) {
                Some(position) => position,
                None => continue,
            };
            for field in ["line", "character"] {
                let is_negative = match position.get(field) {
                    Some(value) => value.as_i64().map(|n| n < 0).unwrap_or(false),
                    None => false,
                };
                if is_negative {
                    sink.report(Diagnostic {
                        severity: Severity::Error,
                        message: format!("range `{}.{}` must be non-negative", endpoint, field),
                        element_id: element.id.clone(),
                    });
                }
            }
        }
    }

    fn check_enum_member(
        &self,
        element: &WireElement,
        field: &str,
        allowed: &HashSet<&'static str>,
        sink: &mut dyn DiagnosticSink,
    ) {
        if let Some(value) = element.fields.get(field).and_then(|v| v.as_str()) {
            if !allowed.contains(value) {
                sink.report(Diagnostic {
                    severity: Severity::Error,
                    message: format!("`{}` is not a recognized `{}` value for `{}`", value, field, element.label),
                    element_id: element.id.clone(),
                });
            }
        }
    }

    fn track_event(&mut self, element: &WireElement, sink: &mut dyn DiagnosticSink) {
        let kind = match element.fields.get("kind").and_then(|v| v.as_str()) {
            Some(k) => k,
            None => return,
        };
        let data_id: Option<Id> = element
            .fields
            .get("data")
            .and_then(|v| serde_json::from_value(v.clone()).ok());
        let data_id = match data_id {
            Some(id) => id,
            None => return,
        };
        match kind {
            "begin" => {
                self.open_events.insert(data_id);
            }
            "end" => {
                if !self.open_events.remove(&data_id) {
                    sink.report(Diagnostic {
                        severity: Severity::Error,
                        message: format!("`end` event for {} has no matching open `begin`", data_id),
                        element_id: element.id.clone(),
                    });
                }
                self.closed_events.insert(data_id);
            }
            _ => {}
        }
    }

    pub fn validate_edge(&mut self, element: &WireElement, sink: &mut dyn DiagnosticSink) {
        let out_v: Option<Id> = element
            .fields
            .get("outV")
            .and_then(|v| serde_json::from_value(v.clone()).ok());
        let out_v = match out_v {
            Some(id) => id,
            None => {
                sink.report(Diagnostic {
                    severity: Severity::Error,
                    message: format!("edge `{}` is missing required property `outV`", element.label),
                    element_id: element.id.clone(),
                });
                return;
            }
        };

        let in_vs: Vec<Id> = if is_multi_edge(&element.label) {
            match element.fields.get("inVs").and_then(|v| v.as_array()) {
                Some(arr) => arr
                    .iter()
                    .filter_map(|v| serde_json::from_value(v.clone()).ok())
                    .collect(),
                None => {
                    sink.report(Diagnostic {
                        severity: Severity::Error,
                        message: format!("edge `{}` is missing required property `inVs`", element.label),
                        element_id: element.id.clone(),
                    });
                    return;
                }
            }
        } else {
            match element.fields.get("inV").and_then(|v| serde_json::from_value(v.clone()).ok()) {
                Some(id) => vec![id],
                None => {
                    sink.report(Diagnostic {
                        severity: Severity::Error,
                        message: format!("edge `{}` is missing required property `inV`", element.label),
                        element_id: element.id.clone(),
                    });
                    return;
                }
            }
        };

        let mut endpoints_known = self.vertex_labels.contains_key(&out_v);
        for in_v in &in_vs {
            endpoints_known &= self.vertex_labels.contains_key(in_v);
        }
        if !endpoints_known {
            sink.report(Diagnostic {
                severity: Severity::Error,
                message: format!(
                    "edge `{}` references vertices that are not emitted yet",
                    element.label
                ),
                element_id: element.id.clone(),
            });
            return;
        }

        if is_multi_edge(&element.label) {
            let labels: HashSet<&str> = in_vs
                .iter()
                .filter_map(|id| self.vertex_labels.get(id).map(|s| s.as_str()))
                .collect();
            if labels.len() > 1 {
                sink.report(Diagnostic {
                    severity: Severity::Error,
                    message: format!("edge `{}`'s `inVs` do not share a single vertex label", element.label),
                    element_id: element.id.clone(),
                });
            }
        }

        if let Some(permitted) = PERMITTED_EDGE_ENDPOINTS.get(element.label.as_str()) {
            let out_label = self.vertex_labels.get(&out_v).map(|s| s.as_str());
            let ok = out_label.map_or(true, |out_label| {
                in_vs.iter().all(|in_v| {
                    self.vertex_labels
                        .get(in_v)
                        .map(|in_label| permitted.iter().any(|(o, i)| *o == out_label && *i == in_label))
                        .unwrap_or(true)
                })
            });
            if !ok {
                sink.report(Diagnostic {
                    severity: Severity::Error,
                    message: format!("edge `{}` endpoint labels are not in the permitted set", element.label),
                    element_id: element.id.clone(),
                });
            }
        }

        if element.label == "item" {
            let shard: Option<Id> = element
                .fields
                .get("document")
                .and_then(|v| serde_json::from_value(v.clone()).ok());
            match shard {
                Some(shard) if self.closed_events.contains(&shard) => {
                    sink.report(Diagnostic {
                        severity: Severity::Error,
                        message: format!("item edge's shard {} is already closed", shard),
                        element_id: element.id.clone(),
                    });
                }
                Some(shard) if !self.open_events.contains(&shard) => {
                    sink.report(Diagnostic {
                        severity: Severity::Error,
                        message: format!("item edge's shard {} is not open", shard),
                        element_id: element.id.clone(),
                    });
                }
                Some(_) => {}
                None => {
                    sink.report(Diagnostic {
                        severity: Severity::Error,
                        message: "item edge is missing required property `document`".to_string(),
                        element_id: element.id.clone(),
                    });
                }
            }
        }
    }
}
