//! File-level convenience over [`crate::format`].

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::format;
use crate::graph::SceneGraph;

/// Reads and decodes a graph document from disk.
pub fn load_graph(path: impl AsRef<Path>) -> Result<SceneGraph> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read scene graph from {}", path.display()))?;
    let graph = format::decode(&text)
        .with_context(|| format!("failed to decode scene graph from {}", path.display()))?;
    log::debug!(
        "loaded scene graph from {} ({} nodes)",
        path.display(),
        graph.node_count()
    );
    Ok(graph)
}

/// Encodes a graph and writes it to disk.
pub fn save_graph(graph: &SceneGraph, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let text = format::encode(graph).context("failed to encode scene graph")?;
    fs::write(path, text)
        .with_context(|| format!("failed to write scene graph to {}", path.display()))?;
    log::debug!(
        "saved scene graph to {} ({} nodes)",
        path.display(),
        graph.node_count()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load_round_trip() {
        let mut graph = SceneGraph::new();
        let root = graph.add_node(None, "root").unwrap();
        graph.add_node(Some(root), "child").unwrap();

        let path = std::env::temp_dir().join("trellis_loader_round_trip.json");
        save_graph(&graph, &path).unwrap();
        let loaded = load_graph(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(loaded.node_count(), 2);
        assert_eq!(loaded.get_node(root).unwrap().label(), "root");
    }

    #[test]
    fn test_load_missing_file_reports_path() {
        let err = load_graph("/nonexistent/trellis.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/trellis.json"));
    }
}
