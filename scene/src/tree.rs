use crate::graph::SceneGraph;
use crate::node::{Node, NodeId};

/// Trait for implementing tree traversal operations.
///
/// Implementors receive callbacks when entering and exiting nodes, in
/// depth-first pre-order following child insertion order.
pub trait TreeVisitor {
    /// Called when entering a node, before its children.
    ///
    /// Returns true to continue into the children, false to prune the
    /// subtree.
    fn enter_node(&mut self, node: &Node) -> bool;

    /// Called when exiting a node, after its children.
    fn exit_node(&mut self, node: &Node) {
        let _ = node;
    }
}

/// Walks the graph starting from a given node.
pub fn walk_tree<V: TreeVisitor>(graph: &SceneGraph, node_id: NodeId, visitor: &mut V) {
    let node = match graph.get_node(node_id) {
        Some(node) => node,
        None => return,
    };

    let should_visit_children = visitor.enter_node(node);

    if should_visit_children {
        for &child_id in node.children() {
            walk_tree(graph, child_id, visitor);
        }
    }

    visitor.exit_node(node);
}

/// Closure-based traversal shorthands. All run depth-first pre-order in
/// child insertion order and follow every child edge, attachments included.
impl SceneGraph {
    /// Applies `f` to the node, and to its whole subtree when `recursive`.
    pub fn apply(&self, id: NodeId, recursive: bool, f: &mut impl FnMut(NodeId)) {
        let Some(node) = self.get_node(id) else {
            return;
        };
        f(id);
        if recursive {
            for &child in node.children() {
                self.apply(child, true, f);
            }
        }
    }

    /// Applies `f` to every descendant of the node, not the node itself.
    pub fn traverse(&self, id: NodeId, f: &mut impl FnMut(NodeId)) {
        let Some(node) = self.get_node(id) else {
            return;
        };
        for &child in node.children() {
            self.apply(child, true, f);
        }
    }

    /// As [`SceneGraph::traverse`], pruning invisible subtrees. The start
    /// node itself is never visited and its own flag is not consulted.
    pub fn traverse_visible(&self, id: NodeId, f: &mut impl FnMut(NodeId)) {
        let Some(node) = self.get_node(id) else {
            return;
        };
        for &child in node.children() {
            self.visit_visible(child, f);
        }
    }

    fn visit_visible(&self, id: NodeId, f: &mut impl FnMut(NodeId)) {
        let Some(node) = self.get_node(id) else {
            return;
        };
        if !node.visible() {
            return;
        }
        f(id);
        for &child in node.children() {
            self.visit_visible(child, f);
        }
    }

    /// Applies `f` to each ancestor, nearest first, ending at the root.
    pub fn traverse_ancestors(&self, id: NodeId, f: &mut impl FnMut(NodeId)) {
        let mut current = self.get_node(id).and_then(Node::parent);
        while let Some(ancestor) = current {
            f(ancestor);
            current = self.get_node(ancestor).and_then(Node::parent);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CollectingVisitor {
        entered: Vec<NodeId>,
        exited: Vec<NodeId>,
        prune: Option<NodeId>,
    }

    impl TreeVisitor for CollectingVisitor {
        fn enter_node(&mut self, node: &Node) -> bool {
            self.entered.push(node.id);
            self.prune != Some(node.id)
        }

        fn exit_node(&mut self, node: &Node) {
            self.exited.push(node.id);
        }
    }

    fn three_level_graph() -> (SceneGraph, NodeId, NodeId, NodeId, NodeId) {
        let mut graph = SceneGraph::new();
        let root = graph.add_node(None, "root").unwrap();
        let a = graph.add_node(Some(root), "a").unwrap();
        let b = graph.add_node(Some(root), "b").unwrap();
        let leaf = graph.add_node(Some(a), "leaf").unwrap();
        (graph, root, a, b, leaf)
    }

    #[test]
    fn test_walk_tree_preorder_and_postorder() {
        let (graph, root, a, b, leaf) = three_level_graph();
        let mut visitor = CollectingVisitor {
            entered: Vec::new(),
            exited: Vec::new(),
            prune: None,
        };

        walk_tree(&graph, root, &mut visitor);

        assert_eq!(visitor.entered, vec![root, a, leaf, b]);
        assert_eq!(visitor.exited, vec![leaf, a, b, root]);
    }

    #[test]
    fn test_walk_tree_prunes_subtree() {
        let (graph, root, a, b, leaf) = three_level_graph();
        let mut visitor = CollectingVisitor {
            entered: Vec::new(),
            exited: Vec::new(),
            prune: Some(a),
        };

        walk_tree(&graph, root, &mut visitor);

        assert!(visitor.entered.contains(&b));
        assert!(!visitor.entered.contains(&leaf));
        // Pruned nodes still get their exit callback.
        assert!(visitor.exited.contains(&a));
    }

    #[test]
    fn test_apply_non_recursive_visits_only_self() {
        let (graph, root, ..) = three_level_graph();
        let mut visited = Vec::new();
        graph.apply(root, false, &mut |id| visited.push(id));
        assert_eq!(visited, vec![root]);
    }

    #[test]
    fn test_traverse_skips_self() {
        let (graph, root, a, b, leaf) = three_level_graph();
        let mut visited = Vec::new();
        graph.traverse(root, &mut |id| visited.push(id));
        assert_eq!(visited, vec![a, leaf, b]);
    }

    #[test]
    fn test_traverse_visible_prunes_invisible_subtree() {
        let (mut graph, root, a, b, leaf) = three_level_graph();
        graph.set_visible(a, false);

        let mut visited = Vec::new();
        graph.traverse_visible(root, &mut |id| visited.push(id));

        assert_eq!(visited, vec![b]);
        assert!(!visited.contains(&leaf));
    }

    #[test]
    fn test_traverse_visible_skips_start_node() {
        let (graph, root, a, b, leaf) = three_level_graph();

        let mut visited = Vec::new();
        graph.traverse_visible(root, &mut |id| visited.push(id));

        assert_eq!(visited, vec![a, leaf, b]);
        assert!(!visited.contains(&root));
    }

    #[test]
    fn test_traverse_visible_ignores_start_node_flag() {
        let (mut graph, root, a, b, leaf) = three_level_graph();
        graph.set_visible(root, false);

        let mut visited = Vec::new();
        graph.traverse_visible(root, &mut |id| visited.push(id));

        assert_eq!(visited, vec![a, leaf, b]);
    }

    #[test]
    fn test_traverse_ancestors_nearest_first() {
        let (graph, root, a, _b, leaf) = three_level_graph();
        let mut visited = Vec::new();
        graph.traverse_ancestors(leaf, &mut |id| visited.push(id));
        assert_eq!(visited, vec![a, root]);
    }

    #[test]
    fn test_children_preserve_insertion_order() {
        let mut graph = SceneGraph::new();
        let root = graph.add_node(None, "root").unwrap();
        let first = graph.add_node(Some(root), "first").unwrap();
        let third = graph.add_node(Some(root), "third").unwrap();
        let second = graph.add_node(None, "second").unwrap();
        graph.insert_child(root, second, 1).unwrap();

        let mut visited = Vec::new();
        graph.traverse(root, &mut |id| visited.push(id));
        assert_eq!(visited, vec![first, second, third]);
    }
}
