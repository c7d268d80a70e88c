//! The canonical document hash (§4.2 "Canonical hash algorithm"):
//! MD5 over contents, then sorted ranges, sorted monikers, folding
//! ranges in received order, the document-symbol tree, and sorted
//! diagnostics — each fed through the positional compressor in
//! [`super::blob`] so property-name ordering never affects the digest.

use md5::{Digest, Md5};

use crate::error::LinkError;
use crate::id::Id;

use super::blob::{compress_moniker, compress_range, moniker_sort_key, DocumentBlob, ResolvedDocumentSymbol};

pub fn canonical_hash(document_id: &str, blob: &DocumentBlob) -> anyhow::Result<String> {
    let mut hasher = Md5::new();

    hasher.update(blob.contents.as_bytes());

    let mut ranges: Vec<_> = blob.ranges.iter().collect();
    ranges.sort_by_key(|(_, r)| r.coords.sort_key());
    for (_, range) in ranges {
        hasher.update(serde_json::to_vec(&compress_range(range))?);
    }

    let mut monikers: Vec<_> = blob.monikers.values().collect();
    monikers.sort_by(|a, b| {
        (
            a.identifier.as_str(),
            a.scheme.as_str(),
            moniker_sort_key(a.kind),
        )
            .cmp(&(b.identifier.as_str(), b.scheme.as_str(), moniker_sort_key(b.kind)))
    });
    for moniker in monikers {
        hasher.update(serde_json::to_vec(&compress_moniker(moniker))?);
    }

    for folding_range in &blob.folding_ranges {
        hasher.update(serde_json::to_vec(folding_range)?);
    }

    if let Some(symbols) = &blob.document_symbols {
        let mut visited = std::collections::HashSet::new();
        for symbol in symbols {
            let tree = compress_symbol_tree(document_id, symbol, blob, &mut visited)?;
            hasher.update(serde_json::to_vec(&tree)?);
        }
    }

    let mut diagnostics: Vec<_> = blob.diagnostics.iter().collect();
    diagnostics.sort_by(|a, b| {
        let a_key = a.range.map(|r| r.sort_key());
        let b_key = b.range.map(|r| r.sort_key());
        a_key.cmp(&b_key).then_with(|| a.message.cmp(&b.message))
    });
    for diagnostic in diagnostics {
        hasher.update(serde_json::to_vec(&diagnostic.raw)?);
    }

    let digest = hasher.finalize();
    Ok(base64::encode(digest))
}

fn compress_symbol_tree(
    document_id: &str,
    symbol: &ResolvedDocumentSymbol,
    blob: &DocumentBlob,
    visited: &mut std::collections::HashSet<Id>,
) -> anyhow::Result<serde_json::Value> {
    if !visited.insert(symbol.range_id.clone()) {
        return Err(LinkError::Assembly {
            document: document_id.to_string(),
            message: format!(
                "document symbol tree revisits range {} (cycle)",
                symbol.range_id
            ),
        }
        .into());
    }
    let range = blob.ranges.get(&symbol.range_id).ok_or_else(|| LinkError::Assembly {
        document: document_id.to_string(),
        message: format!(
            "document symbol references range {} not present in the document blob",
            symbol.range_id
        ),
    })?;
    let children: Vec<serde_json::Value> = symbol
        .children
        .iter()
        .map(|child| compress_symbol_tree(document_id, child, blob, visited))
        .collect::<anyhow::Result<_>>()?;
    Ok(serde_json::json!([compress_range(range), children]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::blob::RangeData;
    use crate::protocol::types::{Position, RangeCoords};

    fn range(start: (u64, u64), end: (u64, u64)) -> RangeData {
        RangeData {
            coords: RangeCoords {
                start: Position {
                    line: start.0,
                    character: start.1,
                },
                end: Position {
                    line: end.0,
                    character: end.1,
                },
            },
            tag: None,
        }
    }

    #[test]
    fn hash_is_deterministic_for_identical_input() {
        let mut blob = DocumentBlob::default();
        blob.contents = "let a = 1;".to_string();
        blob.ranges.insert(Id::Number(1), range((0, 0), (0, 1)));

        let a = canonical_hash("doc", &blob).unwrap();
        let b = canonical_hash("doc", &blob).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn hash_is_insensitive_to_range_insertion_order() {
        let mut first = DocumentBlob::default();
        first.contents = "abc".to_string();
        first.ranges.insert(Id::Number(1), range((0, 0), (0, 1)));
        first.ranges.insert(Id::Number(2), range((1, 0), (1, 1)));

        let mut second = DocumentBlob::default();
        second.contents = "abc".to_string();
        second.ranges.insert(Id::Number(2), range((1, 0), (1, 1)));
        second.ranges.insert(Id::Number(1), range((0, 0), (0, 1)));

        assert_eq!(
            canonical_hash("doc", &first).unwrap(),
            canonical_hash("doc", &second).unwrap()
        );
    }

    #[test]
    fn document_symbol_cycle_is_fatal() {
        let mut blob = DocumentBlob::default();
        blob.contents.clear();
        blob.ranges.insert(Id::Number(1), range((0, 0), (0, 1)));
        let node = ResolvedDocumentSymbol {
            range_id: Id::Number(1),
            children: vec![ResolvedDocumentSymbol {
                range_id: Id::Number(1),
                children: vec![],
            }],
        };
        blob.document_symbols = Some(vec![node]);
        assert!(canonical_hash("doc", &blob).is_err());
    }

    #[test]
    fn document_symbol_missing_range_is_fatal() {
        let mut blob = DocumentBlob::default();
        let node = ResolvedDocumentSymbol {
            range_id: Id::Number(99),
            children: vec![],
        };
        blob.document_symbols = Some(vec![node]);
        assert!(canonical_hash("doc", &blob).is_err());
    }
}
