//! Raw, already-flattened snapshot arrays and their schema.
//!
//! [`RawSnapshot`] is the hand-off point between whatever acquired the heap
//! snapshot and the graph store. It mirrors the DevTools `.heapsnapshot`
//! JSON document: a `snapshot.meta` schema block plus flat `nodes`, `edges`,
//! `locations` and `strings` arrays. Nothing here assumes a field order; the
//! store resolves every offset from [`SnapshotMeta`] at load time.

use std::io::Read;

use serde::{Deserialize, Serialize};

use crate::error::SnapshotError;

/// Type descriptor for one field of a record.
///
/// The field named `type` carries the enumerated type-name table; every other
/// field is described by a plain string such as `"string"` or `"number"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldType {
    /// Enumerated type names, indexed by the field's numeric value.
    Enum(Vec<String>),
    /// A descriptive type name (`"string"`, `"number"`, `"node"`, ...).
    Named(String),
}

/// Field order and type tables for node, edge and location records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub node_fields: Vec<String>,
    pub node_types: Vec<FieldType>,
    pub edge_fields: Vec<String>,
    pub edge_types: Vec<FieldType>,
    #[serde(default)]
    pub location_fields: Vec<String>,
}

impl SnapshotMeta {
    /// The schema emitted by current V8 builds.
    pub fn v8_default() -> Self {
        let names = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        SnapshotMeta {
            node_fields: names(&[
                "type",
                "name",
                "id",
                "self_size",
                "edge_count",
                "trace_node_id",
                "detachedness",
            ]),
            node_types: vec![
                FieldType::Enum(names(&[
                    "hidden",
                    "array",
                    "string",
                    "object",
                    "code",
                    "closure",
                    "regexp",
                    "number",
                    "native",
                    "synthetic",
                    "concatenated string",
                    "sliced string",
                    "symbol",
                    "bigint",
                    "object shape",
                ])),
                FieldType::Named("string".into()),
                FieldType::Named("number".into()),
                FieldType::Named("number".into()),
                FieldType::Named("number".into()),
                FieldType::Named("number".into()),
                FieldType::Named("number".into()),
            ],
            edge_fields: names(&["type", "name_or_index", "to_node"]),
            edge_types: vec![
                FieldType::Enum(names(&[
                    "context", "element", "property", "internal", "hidden", "shortcut", "weak",
                ])),
                FieldType::Named("string_or_number".into()),
                FieldType::Named("node".into()),
            ],
            location_fields: names(&["object_index", "script_id", "line", "column"]),
        }
    }
}

/// Parsed snapshot arrays plus schema, not yet indexed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSnapshot {
    pub meta: SnapshotMeta,
    pub nodes: Vec<u64>,
    pub edges: Vec<u64>,
    pub locations: Vec<u64>,
    pub strings: Vec<String>,
}

// On-disk document shape. Only the pieces the engine consumes are decoded;
// allocation traces and samples are ignored.

#[derive(Deserialize)]
struct SnapshotDocument {
    snapshot: SnapshotHeader,
    nodes: Vec<u64>,
    edges: Vec<u64>,
    #[serde(default)]
    locations: Vec<u64>,
    strings: Vec<String>,
}

#[derive(Deserialize)]
struct SnapshotHeader {
    meta: SnapshotMeta,
    #[serde(default)]
    node_count: Option<usize>,
    #[serde(default)]
    edge_count: Option<usize>,
}

impl RawSnapshot {
    /// Assembles a raw snapshot from already-parsed parts.
    pub fn from_parts(
        meta: SnapshotMeta,
        nodes: Vec<u64>,
        edges: Vec<u64>,
        locations: Vec<u64>,
        strings: Vec<String>,
    ) -> Self {
        RawSnapshot {
            meta,
            nodes,
            edges,
            locations,
            strings,
        }
    }

    /// Decodes a `.heapsnapshot` JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, SnapshotError> {
        let doc: SnapshotDocument = serde_json::from_str(json)?;
        Ok(Self::from_document(doc))
    }

    /// Decodes a `.heapsnapshot` JSON document from a reader.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, SnapshotError> {
        let doc: SnapshotDocument = serde_json::from_reader(reader)?;
        Ok(Self::from_document(doc))
    }

    fn from_document(doc: SnapshotDocument) -> Self {
        let SnapshotDocument {
            snapshot,
            nodes,
            edges,
            locations,
            strings,
        } = doc;
        let node_width = snapshot.meta.node_fields.len().max(1);
        let edge_width = snapshot.meta.edge_fields.len().max(1);
        if let Some(declared) = snapshot.node_count {
            if declared != nodes.len() / node_width {
                tracing::warn!(
                    declared,
                    actual = nodes.len() / node_width,
                    "snapshot header node_count disagrees with node array"
                );
            }
        }
        if let Some(declared) = snapshot.edge_count {
            if declared != edges.len() / edge_width {
                tracing::warn!(
                    declared,
                    actual = edges.len() / edge_width,
                    "snapshot header edge_count disagrees with edge array"
                );
            }
        }
        RawSnapshot {
            meta: snapshot.meta,
            nodes,
            edges,
            locations,
            strings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{
        "snapshot": {
            "meta": {
                "node_fields": ["type","name","id","self_size","edge_count"],
                "node_types": [["synthetic","object"],"string","number","number","number"],
                "edge_fields": ["type","name_or_index","to_node"],
                "edge_types": [["element","property","weak"],"string_or_number","node"],
                "trace_function_info_fields": ["function_id","name"]
            },
            "node_count": 2,
            "edge_count": 1,
            "trace_function_count": 0
        },
        "nodes": [0,0,1,0,1, 1,1,3,16,0],
        "edges": [1,2,5],
        "trace_function_infos": [],
        "strings": ["", "Foo", "bar"]
    }"#;

    #[test]
    fn decodes_devtools_document() {
        let raw = RawSnapshot::from_json_str(DOC).unwrap();
        assert_eq!(raw.meta.node_fields.len(), 5);
        assert_eq!(raw.nodes.len(), 10);
        assert_eq!(raw.edges, vec![1, 2, 5]);
        assert!(raw.locations.is_empty());
        assert!(raw.meta.location_fields.is_empty());
        assert_eq!(raw.strings[1], "Foo");
        match &raw.meta.node_types[0] {
            FieldType::Enum(names) => assert_eq!(names, &vec!["synthetic", "object"]),
            other => panic!("expected enum type table, got {:?}", other),
        }
    }

    #[test]
    fn reader_and_str_agree() {
        let a = RawSnapshot::from_json_str(DOC).unwrap();
        let b = RawSnapshot::from_reader(DOC.as_bytes()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(RawSnapshot::from_json_str("{\"snapshot\": 1}").is_err());
    }

    #[test]
    fn v8_default_schema_shape() {
        let meta = SnapshotMeta::v8_default();
        assert_eq!(meta.node_fields.len(), meta.node_types.len());
        assert_eq!(meta.edge_fields.len(), meta.edge_types.len());
        assert_eq!(meta.location_fields.len(), 4);
    }
}
