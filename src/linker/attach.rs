//! The linker's deferred emission buffer (§4.1 "Deferred emission").
//!
//! Derived vertices and edges are staged here under temporary ids so they
//! never collide with ids the source stream hasn't emitted yet. At
//! end-of-stream, [`AttachQueue::flush`] renumbers every staged element
//! (dense integers above `max_source_id`, or fresh opaque strings) and
//! brackets the batch with a `monikerAttach` event pair whose `data` is
//! the first begin event's own id.

use std::collections::HashMap;

use serde_json::Value;

use crate::id::{Id, IdAllocator};
use crate::protocol::types::{EventKind, EventScope, EventVertex, WireElement};

#[derive(Debug, Default)]
pub struct AttachQueue {
    items: Vec<WireElement>,
    next_temp: u64,
}

impl AttachQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Mints a temporary id for a queued element. Distinct from any id
    /// the renumbering pass at flush time would mint, so it's always
    /// safe to look up in the remap table.
    pub fn fresh_temp_id(&mut self) -> Id {
        let id = Id::String(format!("$attach{}", self.next_temp));
        self.next_temp += 1;
        id
    }

    pub fn push(&mut self, element: WireElement) {
        self.items.push(element);
    }

    /// Flushes the queue, renumbering temp ids via `allocator` and
    /// bracketing the batch with a `monikerAttach` begin/end pair. A no-op
    /// (returns an empty vec) if nothing was queued.
    pub fn flush(self, allocator: &mut IdAllocator) -> anyhow::Result<Vec<WireElement>> {
        if self.items.is_empty() {
            return Ok(Vec::new());
        }

        let mut id_map: HashMap<String, Id> = HashMap::new();
        for item in &self.items {
            if let Id::String(s) = &item.id {
                if !id_map.contains_key(s) {
                    let final_id = allocator
                        .mint()
                        .map_err(|e| anyhow::anyhow!("{}", e))?;
                    id_map.insert(s.clone(), final_id);
                }
            }
        }

        let begin_id = allocator.mint().map_err(|e| anyhow::anyhow!("{}", e))?;
        let mut out = Vec::with_capacity(self.items.len() + 2);
        out.push(WireElement::vertex(
            begin_id.clone(),
            "$event",
            EventVertex {
                kind: EventKind::Begin,
                scope: EventScope::MonikerAttach,
                data: begin_id.clone(),
            },
        ));

        for mut item in self.items {
            if let Id::String(s) = &item.id {
                if let Some(final_id) = id_map.get(s) {
                    item.id = final_id.clone();
                }
            }
            let mut value = Value::Object(item.fields);
            remap_json(&mut value, &id_map);
            item.fields = match value {
                Value::Object(map) => map,
                _ => unreachable!("fields always round-trips as an object"),
            };
            out.push(item);
        }

        out.push(WireElement::vertex(
            allocator.mint().map_err(|e| anyhow::anyhow!("{}", e))?,
            "$event",
            EventVertex {
                kind: EventKind::End,
                scope: EventScope::MonikerAttach,
                data: begin_id,
            },
        ));

        Ok(out)
    }
}

fn remap_json(value: &mut Value, id_map: &HashMap<String, Id>) {
    match value {
        Value::String(s) => {
            if let Some(final_id) = id_map.get(s) {
                *value = serde_json::to_value(final_id).expect("id always serializes");
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                remap_json(item, id_map);
            }
        }
        Value::Object(map) => {
            for v in map.values_mut() {
                remap_json(v, id_map);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::EdgeData;

    #[test]
    fn empty_queue_flushes_to_nothing() {
        let mut allocator = IdAllocator::new();
        allocator.observe(&Id::Number(1)).unwrap();
        assert!(AttachQueue::new().flush(&mut allocator).unwrap().is_empty());
    }

    #[test]
    fn flush_renumbers_densely_above_max_source_id() {
        let mut allocator = IdAllocator::new();
        for n in 1..=3u64 {
            allocator.observe(&Id::Number(n)).unwrap();
        }

        let mut queue = AttachQueue::new();
        let moniker_id = queue.fresh_temp_id();
        queue.push(WireElement::vertex(
            moniker_id.clone(),
            "moniker",
            serde_json::json!({"scheme": "npm", "identifier": "pkg::foo", "kind": "export", "unique": "scheme"}),
        ));
        let attach_edge_id = queue.fresh_temp_id();
        queue.push(WireElement::edge(
            attach_edge_id,
            "attach",
            EdgeData {
                out_v: moniker_id,
                in_v: Id::Number(2),
            },
        ));

        let flushed = queue.flush(&mut allocator).unwrap();
        // begin event, moniker, attach edge, end event
        assert_eq!(flushed.len(), 4);
        assert_eq!(flushed[0].label, "$event");
        assert_eq!(flushed.last().unwrap().label, "$event");
        for id in flushed.iter().map(|e| &e.id) {
            assert!(id.as_number().unwrap() > 3);
        }
        let attach_edge = &flushed[2];
        assert_eq!(attach_edge.fields["outV"], flushed[1].id.as_number().unwrap());
    }

    #[test]
    fn monikerattach_end_data_points_at_begin_id() {
        let mut allocator = IdAllocator::new();
        allocator.observe(&Id::Number(1)).unwrap();
        let mut queue = AttachQueue::new();
        let moniker_id = queue.fresh_temp_id();
        queue.push(WireElement::vertex(
            moniker_id,
            "moniker",
            serde_json::json!({"scheme": "npm", "identifier": "x", "kind": "export", "unique": "scheme"}),
        ));
        let flushed = queue.flush(&mut allocator).unwrap();
        let begin = &flushed[0];
        let end = flushed.last().unwrap();
        assert_eq!(begin.fields["data"], end.fields["data"]);
        assert_eq!(begin.id.as_number().unwrap(), end.fields["data"].as_u64().unwrap());
    }
}
