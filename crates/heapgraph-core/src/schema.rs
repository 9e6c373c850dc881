//! Field offsets and type indices resolved from a snapshot schema.
//!
//! The heap snapshot format changes its field set across engine versions, so
//! no offset is hard-coded. [`SnapshotLayout::resolve`] looks every field up
//! by name exactly once; the rest of the engine only reads the resolved
//! offsets.

use crate::error::SnapshotError;
use crate::raw::{FieldType, SnapshotMeta};

/// Resolved node record layout.
#[derive(Debug, Clone)]
pub struct NodeLayout {
    pub width: usize,
    pub type_offset: usize,
    pub name_offset: usize,
    pub id_offset: usize,
    pub self_size_offset: usize,
    pub edge_count_offset: usize,
    pub trace_node_id_offset: Option<usize>,
    pub detachedness_offset: Option<usize>,
}

/// Resolved edge record layout.
#[derive(Debug, Clone)]
pub struct EdgeLayout {
    pub width: usize,
    pub type_offset: usize,
    pub name_or_index_offset: usize,
    pub to_node_offset: usize,
}

/// Resolved location record layout. Absent when the schema has no locations.
#[derive(Debug, Clone)]
pub struct LocationLayout {
    pub width: usize,
    pub object_index_offset: usize,
    pub script_id_offset: usize,
    pub line_offset: usize,
    pub column_offset: usize,
}

/// An enumerated type-name table (`node_types[type]` / `edge_types[type]`).
#[derive(Debug, Clone, Default)]
pub struct TypeTable {
    names: Vec<String>,
}

impl TypeTable {
    pub fn new(names: Vec<String>) -> Self {
        TypeTable { names }
    }

    /// Returns the numeric value of a type name, if declared.
    pub fn index_of(&self, name: &str) -> Option<u64> {
        self.names.iter().position(|n| n == name).map(|i| i as u64)
    }

    /// Returns the name for a numeric type value.
    pub fn name(&self, value: u64) -> &str {
        self.names
            .get(value as usize)
            .map(String::as_str)
            .unwrap_or("unknown")
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Numeric values of the node types the engine branches on.
#[derive(Debug, Clone, Default)]
pub struct NodeTypeIds {
    pub hidden: Option<u64>,
    pub native: Option<u64>,
    pub synthetic: Option<u64>,
    pub string: Option<u64>,
    pub concatenated_string: Option<u64>,
    pub sliced_string: Option<u64>,
}

/// Numeric values of the edge types the engine branches on.
#[derive(Debug, Clone, Default)]
pub struct EdgeTypeIds {
    pub element: Option<u64>,
    pub hidden: Option<u64>,
    pub property: Option<u64>,
    pub shortcut: Option<u64>,
    pub weak: Option<u64>,
    pub invisible: Option<u64>,
}

/// Everything the store needs to interpret the flat arrays.
#[derive(Debug, Clone)]
pub struct SnapshotLayout {
    pub node: NodeLayout,
    pub edge: EdgeLayout,
    pub location: Option<LocationLayout>,
    pub node_types: TypeTable,
    pub edge_types: TypeTable,
    pub node_type_ids: NodeTypeIds,
    pub edge_type_ids: EdgeTypeIds,
}

fn field_offset(
    fields: &[String],
    kind: &'static str,
    name: &str,
) -> Result<usize, SnapshotError> {
    fields
        .iter()
        .position(|f| f == name)
        .ok_or_else(|| SnapshotError::MissingField {
            kind,
            field: name.to_string(),
        })
}

fn optional_offset(fields: &[String], name: &str) -> Option<usize> {
    fields.iter().position(|f| f == name)
}

fn type_table(
    types: &[FieldType],
    type_offset: usize,
    kind: &'static str,
) -> Result<TypeTable, SnapshotError> {
    match types.get(type_offset) {
        Some(FieldType::Enum(names)) => Ok(TypeTable::new(names.clone())),
        _ => Err(SnapshotError::MissingField {
            kind,
            field: "type".to_string(),
        }),
    }
}

impl SnapshotLayout {
    /// Resolves all offsets from `meta`.
    ///
    /// Fails when a field every snapshot needs (`type`, `name`, `id`,
    /// `self_size`, `edge_count`, `name_or_index`, `to_node`) is absent.
    /// Optional fields (`detachedness`, `trace_node_id`, locations) resolve
    /// to `None` and the features that depend on them degrade.
    pub fn resolve(meta: &SnapshotMeta) -> Result<Self, SnapshotError> {
        let nf = &meta.node_fields;
        let node = NodeLayout {
            width: nf.len(),
            type_offset: field_offset(nf, "node", "type")?,
            name_offset: field_offset(nf, "node", "name")?,
            id_offset: field_offset(nf, "node", "id")?,
            self_size_offset: field_offset(nf, "node", "self_size")?,
            edge_count_offset: field_offset(nf, "node", "edge_count")?,
            trace_node_id_offset: optional_offset(nf, "trace_node_id"),
            detachedness_offset: optional_offset(nf, "detachedness"),
        };

        let ef = &meta.edge_fields;
        let edge = EdgeLayout {
            width: ef.len(),
            type_offset: field_offset(ef, "edge", "type")?,
            name_or_index_offset: field_offset(ef, "edge", "name_or_index")?,
            to_node_offset: field_offset(ef, "edge", "to_node")?,
        };

        let lf = &meta.location_fields;
        let location = if lf.is_empty() {
            None
        } else {
            Some(LocationLayout {
                width: lf.len(),
                object_index_offset: field_offset(lf, "location", "object_index")?,
                script_id_offset: field_offset(lf, "location", "script_id")?,
                line_offset: field_offset(lf, "location", "line")?,
                column_offset: field_offset(lf, "location", "column")?,
            })
        };

        let node_types = type_table(&meta.node_types, node.type_offset, "node")?;
        let edge_types = type_table(&meta.edge_types, edge.type_offset, "edge")?;

        let node_type_ids = NodeTypeIds {
            hidden: node_types.index_of("hidden"),
            native: node_types.index_of("native"),
            synthetic: node_types.index_of("synthetic"),
            string: node_types.index_of("string"),
            concatenated_string: node_types.index_of("concatenated string"),
            sliced_string: node_types.index_of("sliced string"),
        };
        let edge_type_ids = EdgeTypeIds {
            element: edge_types.index_of("element"),
            hidden: edge_types.index_of("hidden"),
            property: edge_types.index_of("property"),
            shortcut: edge_types.index_of("shortcut"),
            weak: edge_types.index_of("weak"),
            invisible: edge_types.index_of("invisible"),
        };

        Ok(SnapshotLayout {
            node,
            edge,
            location,
            node_types,
            edge_types,
            node_type_ids,
            edge_type_ids,
        })
    }

    /// Returns the detachedness offset, or an error naming the missing field.
    pub fn require_detachedness(&self) -> Result<usize, SnapshotError> {
        self.node
            .detachedness_offset
            .ok_or_else(|| SnapshotError::MissingField {
                kind: "node",
                field: "detachedness".to_string(),
            })
    }

    /// Returns the `native` node type value, or an error if undeclared.
    pub fn require_native_type(&self) -> Result<u64, SnapshotError> {
        self.node_type_ids
            .native
            .ok_or_else(|| SnapshotError::MissingType {
                kind: "node",
                name: "native".to_string(),
            })
    }
}

/// Returns true when `value` equals the (optional) resolved type id.
#[inline]
pub(crate) fn is_type(value: u64, type_id: Option<u64>) -> bool {
    type_id == Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_v8_layout() {
        let layout = SnapshotLayout::resolve(&SnapshotMeta::v8_default()).unwrap();
        assert_eq!(layout.node.width, 7);
        assert_eq!(layout.node.edge_count_offset, 4);
        assert_eq!(layout.node.detachedness_offset, Some(6));
        assert_eq!(layout.edge.to_node_offset, 2);
        assert_eq!(layout.node_type_ids.native, Some(8));
        assert_eq!(layout.edge_type_ids.weak, Some(6));
        assert_eq!(layout.edge_type_ids.invisible, None);
        assert_eq!(layout.location.as_ref().map(|l| l.width), Some(4));
    }

    #[test]
    fn field_order_is_not_assumed() {
        let mut meta = SnapshotMeta::v8_default();
        meta.node_fields.reverse();
        meta.node_types.reverse();
        let layout = SnapshotLayout::resolve(&meta).unwrap();
        assert_eq!(layout.node.type_offset, 6);
        assert_eq!(layout.node.detachedness_offset, Some(0));
        assert_eq!(layout.node_types.name(3), "object");
    }

    #[test]
    fn missing_required_field_fails() {
        let mut meta = SnapshotMeta::v8_default();
        meta.edge_fields.retain(|f| f != "to_node");
        let err = SnapshotLayout::resolve(&meta).unwrap_err();
        match err {
            SnapshotError::MissingField { kind, field } => {
                assert_eq!(kind, "edge");
                assert_eq!(field, "to_node");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn detachedness_is_optional() {
        let mut meta = SnapshotMeta::v8_default();
        meta.node_fields.pop();
        meta.node_types.pop();
        let layout = SnapshotLayout::resolve(&meta).unwrap();
        assert!(layout.node.detachedness_offset.is_none());
        assert!(layout.require_detachedness().is_err());
    }
}
