//! Versioned structured serialization of scene graphs.
//!
//! A graph is encoded as a JSON document: a version number and the roots,
//! each a node record with its parent-linked children nested inside it.
//! Only the structural state round-trips: ids, labels, transforms,
//! visibility and hierarchy. Content and render contexts belong to external
//! collaborators and are not serialized; attach edges are transient and are
//! dropped as well.

use std::collections::HashSet;

use cgmath::{Point3, Quaternion, Vector3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::graph::SceneGraph;
use crate::node::{Node, NodeId};

/// Current document version.
pub const FORMAT_VERSION: u32 = 1;

/// Errors that can occur while decoding a graph document.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("unsupported format version {0} (expected {FORMAT_VERSION})")]
    UnsupportedVersion(u32),

    #[error("duplicate node id {0}")]
    DuplicateNodeId(NodeId),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Top-level document shape.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GraphDocument {
    pub version: u32,
    pub roots: Vec<NodeRecord>,
}

/// One serialized node. `orientation` is a quaternion in xyzw order.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeRecord {
    pub id: NodeId,
    pub label: String,
    pub position: [f32; 3],
    pub orientation: [f32; 4],
    pub scale: [f32; 3],
    pub visible: bool,
    pub children: Vec<NodeRecord>,
}

/// Encodes the whole graph (every root) as a JSON document.
pub fn encode(graph: &SceneGraph) -> Result<String, FormatError> {
    let document = GraphDocument {
        version: FORMAT_VERSION,
        roots: graph
            .root_nodes()
            .iter()
            .filter_map(|&root| record_from(graph, root))
            .collect(),
    };
    Ok(serde_json::to_string_pretty(&document)?)
}

/// Encodes one subtree as a single-root document.
pub fn encode_subtree(graph: &SceneGraph, root: NodeId) -> Result<String, FormatError> {
    let document = GraphDocument {
        version: FORMAT_VERSION,
        roots: record_from(graph, root).into_iter().collect(),
    };
    Ok(serde_json::to_string_pretty(&document)?)
}

/// Decodes a document into a fresh graph, preserving node ids.
pub fn decode(text: &str) -> Result<SceneGraph, FormatError> {
    let document: GraphDocument = serde_json::from_str(text)?;
    if document.version != FORMAT_VERSION {
        return Err(FormatError::UnsupportedVersion(document.version));
    }

    let mut graph = SceneGraph::new();
    let mut seen = HashSet::new();
    for record in &document.roots {
        insert_record(&mut graph, record, None, &mut seen)?;
    }
    Ok(graph)
}

fn record_from(graph: &SceneGraph, id: NodeId) -> Option<NodeRecord> {
    let node = graph.get_node(id)?;
    let position = node.position();
    let orientation = node.orientation();
    let scale = node.scale();
    Some(NodeRecord {
        id,
        label: node.label().to_string(),
        position: [position.x, position.y, position.z],
        orientation: [
            orientation.v.x,
            orientation.v.y,
            orientation.v.z,
            orientation.s,
        ],
        scale: [scale.x, scale.y, scale.z],
        visible: node.visible(),
        children: node
            .children()
            .iter()
            .filter(|&&child| {
                graph
                    .get_node(child)
                    .is_some_and(|child_node| child_node.parent() == Some(id))
            })
            .filter_map(|&child| record_from(graph, child))
            .collect(),
    })
}

fn insert_record(
    graph: &mut SceneGraph,
    record: &NodeRecord,
    parent: Option<NodeId>,
    seen: &mut HashSet<NodeId>,
) -> Result<(), FormatError> {
    if !seen.insert(record.id) {
        return Err(FormatError::DuplicateNodeId(record.id));
    }

    let node = Node::new(record.id, record.label.clone());
    if !graph.insert_decoded(node, parent) {
        return Err(FormatError::DuplicateNodeId(record.id));
    }
    graph.store_decoded_state(
        record.id,
        Point3::new(record.position[0], record.position[1], record.position[2]),
        Quaternion::new(
            record.orientation[3],
            record.orientation[0],
            record.orientation[1],
            record.orientation[2],
        ),
        Vector3::new(record.scale[0], record.scale[1], record.scale[2]),
        record.visible,
    );

    for child in &record.children {
        insert_record(graph, child, Some(record.id), seen)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::EPSILON;

    fn sample_graph() -> (SceneGraph, NodeId, NodeId) {
        let mut graph = SceneGraph::new();
        let root = graph.add_node(None, "root").unwrap();
        graph.set_position(root, Point3::new(1.0, 2.0, 3.0));
        let child = graph.add_node(Some(root), "child").unwrap();
        graph.set_scale(child, Vector3::new(2.0, 2.0, 2.0));
        graph.set_visible(child, false);
        (graph, root, child)
    }

    #[test]
    fn test_round_trip_preserves_structure_and_state() {
        let (graph, root, child) = sample_graph();

        let text = encode(&graph).unwrap();
        let decoded = decode(&text).unwrap();

        assert_eq!(decoded.node_count(), 2);
        assert_eq!(decoded.root_nodes(), &[root]);

        let decoded_root = decoded.get_node(root).unwrap();
        assert_eq!(decoded_root.label(), "root");
        assert!((decoded_root.position().x - 1.0).abs() < EPSILON);
        assert_eq!(decoded_root.children(), &[child]);

        let decoded_child = decoded.get_node(child).unwrap();
        assert_eq!(decoded_child.parent(), Some(root));
        assert!((decoded_child.scale().x - 2.0).abs() < EPSILON);
        assert!(!decoded_child.visible());
    }

    #[test]
    fn test_decoded_graph_keeps_assigning_fresh_ids() {
        let (graph, _, child) = sample_graph();
        let text = encode(&graph).unwrap();
        let mut decoded = decode(&text).unwrap();

        let new = decoded.add_node(None, "new").unwrap();
        assert!(new > child);
    }

    #[test]
    fn test_encode_subtree_reparents_to_root() {
        let (graph, _root, child) = sample_graph();
        let text = encode_subtree(&graph, child).unwrap();
        let decoded = decode(&text).unwrap();

        assert_eq!(decoded.node_count(), 1);
        assert_eq!(decoded.get_node(child).unwrap().parent(), None);
    }

    #[test]
    fn test_unsupported_version_is_rejected() {
        let text = r#"{"version": 99, "roots": []}"#;
        match decode(text) {
            Err(FormatError::UnsupportedVersion(99)) => {}
            other => panic!("expected UnsupportedVersion, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_id_is_rejected() {
        let text = r#"{
            "version": 1,
            "roots": [
                {"id": 0, "label": "a", "position": [0,0,0],
                 "orientation": [0,0,0,1], "scale": [1,1,1],
                 "visible": true, "children": []},
                {"id": 0, "label": "b", "position": [0,0,0],
                 "orientation": [0,0,0,1], "scale": [1,1,1],
                 "visible": true, "children": []}
            ]
        }"#;
        match decode(text) {
            Err(FormatError::DuplicateNodeId(0)) => {}
            other => panic!("expected DuplicateNodeId, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_field_is_a_json_error() {
        let text = r#"{"version": 1, "roots": [{"id": 0, "label": "a"}]}"#;
        assert!(matches!(decode(text), Err(FormatError::Json(_))));
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let text = r#"{"version": 1, "roots": [], "extra": true}"#;
        assert!(matches!(decode(text), Err(FormatError::Json(_))));
    }
}
