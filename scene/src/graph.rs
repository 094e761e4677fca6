use std::collections::HashMap;

use cgmath::{
    ElementWise, Matrix3, Matrix4, Point3, Quaternion, Rotation, SquareMatrix, Vector3,
};
use thiserror::Error;

use crate::common::transform_ops::{decompose_trs, local_axis_x, local_axis_y, local_axis_z};
use crate::common::transform_ops::{look_at_basis, normal_matrix as normal_from_model};
use crate::common::Aabb;
use crate::content::{NodeContent, RenderContext};
use crate::node::{Node, NodeId};
use crate::observer::{EventKinds, GraphEvent, ObserverId, Observers};

/// Violations of the membership contract.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("node {0} not found in graph")]
    NodeNotFound(NodeId),

    #[error("node {0} cannot be its own parent")]
    SelfParent(NodeId),

    #[error("adding {child} under {parent} would create a cycle")]
    Cycle { parent: NodeId, child: NodeId },
}

/// A flattened draw record: one visible content node with its resolved
/// matrices, ready for a renderer to consume.
#[derive(Debug, Clone, Copy)]
pub struct DrawTransform {
    pub node: NodeId,
    pub world_matrix: Matrix4<f32>,
    pub normal_matrix: Matrix3<f32>,
}

/// Arena-owned scene graph.
///
/// The graph owns every [`Node`]; hierarchy links are plain ids, so a node is
/// never owned twice. All mutation goes through the graph, which is what
/// keeps the per-node caches honest: local writes drop the caches they feed,
/// world-matrix staleness propagates to descendants, world-bounds staleness
/// propagates to ancestors, and both walks prune at already-stale nodes.
///
/// Reads are lazy. `world_matrix`, `world_bounds` and the other derived
/// accessors recompute exactly the stale slots on the path they need and
/// cache the results, so interleaved reads and writes never observe a stale
/// value and never recompute a clean one.
///
/// Interior mutability (`Cell`-backed caches, `RefCell`-held observers)
/// makes the graph single-threaded by construction.
pub struct SceneGraph {
    nodes: HashMap<NodeId, Node>,
    root_nodes: Vec<NodeId>,
    next_node_id: NodeId,
    observers: Observers,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            root_nodes: Vec::new(),
            next_node_id: 0,
            observers: Observers::new(),
        }
    }

    // ========== Queries ==========

    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Nodes with no parent link, in creation/detach order.
    pub fn root_nodes(&self) -> &[NodeId] {
        &self.root_nodes
    }

    /// First node whose label matches, searching depth-first from the roots.
    pub fn find_by_label(&self, label: &str) -> Option<NodeId> {
        fn search(graph: &SceneGraph, id: NodeId, label: &str) -> Option<NodeId> {
            let node = graph.nodes.get(&id)?;
            if node.label() == label {
                return Some(id);
            }
            node.children()
                .iter()
                .find_map(|&child| search(graph, child, label))
        }
        self.root_nodes
            .iter()
            .find_map(|&root| search(self, root, label))
    }

    /// Every node below `id` (excluding `id` itself), depth-first in child
    /// order, following all child edges including attachments.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        if let Some(node) = self.nodes.get(&id) {
            for &child in node.children() {
                self.collect_all_edges(child, &mut out);
            }
        }
        out
    }

    /// Effective visibility: the node's own flag AND every ancestor's.
    pub fn is_visible(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(cursor) = current {
            let Some(node) = self.nodes.get(&cursor) else {
                return false;
            };
            if !node.visible() {
                return false;
            }
            current = node.parent();
        }
        true
    }

    // ========== Membership ==========

    /// Adds a new node to the arena, parented under `parent` when given.
    pub fn add_node(
        &mut self,
        parent: Option<NodeId>,
        label: impl Into<String>,
    ) -> Result<NodeId, GraphError> {
        if let Some(parent_id) = parent {
            if !self.nodes.contains_key(&parent_id) {
                return Err(GraphError::NodeNotFound(parent_id));
            }
        }

        let id = self.next_node_id;
        self.next_node_id += 1;
        self.nodes.insert(id, Node::new(id, label.into()));
        self.root_nodes.push(id);

        if let Some(parent_id) = parent {
            self.link_child(parent_id, id, None)?;
        }
        Ok(id)
    }

    /// As [`SceneGraph::add_node`], with content installed up front.
    pub fn add_node_with_content(
        &mut self,
        parent: Option<NodeId>,
        label: impl Into<String>,
        content: Box<dyn NodeContent>,
    ) -> Result<NodeId, GraphError> {
        let id = self.add_node(parent, label)?;
        self.set_content(id, Some(content));
        Ok(id)
    }

    /// Installs or removes a node's content, refreshing its bounds caches
    /// and handing the node's render context to new content.
    pub fn set_content(&mut self, id: NodeId, content: Option<Box<dyn NodeContent>>) {
        let Some(node) = self.nodes.get_mut(&id) else {
            log::warn!("set_content: node {id} not found");
            return;
        };
        node.set_content(content);
        let context = node.context().cloned();
        if let Some(context) = context {
            if let Some(mut content) = self.nodes.get_mut(&id).and_then(Node::take_content) {
                content.context_attached(&context);
                if let Some(node) = self.nodes.get_mut(&id) {
                    node.put_content(content);
                }
            }
        }
        self.mark_content_changed(id);
    }

    /// Makes `child` a parent-linked child of `parent`, appended to the
    /// child sequence. The child is detached from any prior parent first;
    /// the parent's render context propagates into the subtree.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), GraphError> {
        self.link_child(parent, child, None)
    }

    /// As [`SceneGraph::add_child`] at a position in the child sequence
    /// (clamped to its length).
    pub fn insert_child(
        &mut self,
        parent: NodeId,
        child: NodeId,
        index: usize,
    ) -> Result<(), GraphError> {
        self.link_child(parent, child, Some(index))
    }

    /// Appends `child` to `parent`'s sequence without touching the child's
    /// parent link: a transient grouping membership. The child keeps
    /// composing its world transform through its real parent (or none); the
    /// attach point merely traverses and bounds-merges it. The caller is
    /// responsible for not attaching the same node twice.
    pub fn attach(&mut self, parent: NodeId, child: NodeId) -> Result<(), GraphError> {
        if parent == child {
            return Err(GraphError::SelfParent(child));
        }
        if !self.nodes.contains_key(&child) {
            return Err(GraphError::NodeNotFound(child));
        }
        let Some(parent_node) = self.nodes.get_mut(&parent) else {
            return Err(GraphError::NodeNotFound(parent));
        };
        parent_node.push_child(child);
        self.mark_world_bounds_dirty_up(Some(parent));
        self.observers
            .notify(&GraphEvent::ChildAdded { parent, child });
        Ok(())
    }

    /// Removes `child` from `parent`'s sequence. When the parent link points
    /// at this parent the child becomes a detached root with its world
    /// transform forced stale; when it was only attached, the link is left
    /// alone.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), GraphError> {
        let Some(parent_node) = self.nodes.get_mut(&parent) else {
            return Err(GraphError::NodeNotFound(parent));
        };
        let removed = parent_node.retain_child(child);

        let mut detached = false;
        if let Some(child_node) = self.nodes.get_mut(&child) {
            if child_node.parent() == Some(parent) {
                child_node.set_parent(None);
                detached = true;
            }
        }
        if detached {
            self.root_nodes.push(child);
            self.mark_world_dirty_down(child);
        }

        self.mark_world_bounds_dirty_up(Some(parent));
        if removed {
            self.observers
                .notify(&GraphEvent::ChildRemoved { parent, child });
        }
        Ok(())
    }

    /// Frees a node and its parent-linked subtree from the arena, releasing
    /// every observer registered on the freed nodes. Attached (non-owned)
    /// members of the subtree survive.
    pub fn destroy(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        let parent = node.parent();

        let mut doomed = Vec::new();
        self.collect_owned_subtree(id, &mut doomed);
        log::debug!("destroying node {id} ({} nodes total)", doomed.len());

        for &dead in &doomed {
            self.nodes.remove(&dead);
            self.observers.drop_node(dead);
        }
        self.root_nodes.retain(|root| !doomed.contains(root));

        // Scrub dangling attach edges and refresh the bounds of anyone who
        // held one.
        let mut attach_parents = Vec::new();
        for (&holder, node) in self.nodes.iter_mut() {
            let mut lost = false;
            for &dead in &doomed {
                lost |= node.retain_child(dead);
            }
            if lost {
                attach_parents.push(holder);
            }
        }
        for holder in attach_parents {
            self.mark_world_bounds_dirty_up(Some(holder));
        }

        if let Some(parent_id) = parent {
            self.mark_world_bounds_dirty_up(Some(parent_id));
            self.observers.notify(&GraphEvent::ChildRemoved {
                parent: parent_id,
                child: id,
            });
        }
    }

    fn link_child(
        &mut self,
        parent: NodeId,
        child: NodeId,
        index: Option<usize>,
    ) -> Result<(), GraphError> {
        if parent == child {
            return Err(GraphError::SelfParent(child));
        }
        if !self.nodes.contains_key(&parent) {
            return Err(GraphError::NodeNotFound(parent));
        }
        if !self.nodes.contains_key(&child) {
            return Err(GraphError::NodeNotFound(child));
        }
        // A node may not adopt its own ancestor.
        if self.is_ancestor(child, parent) {
            return Err(GraphError::Cycle { parent, child });
        }

        self.detach(child);
        self.root_nodes.retain(|&id| id != child);

        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            match index {
                Some(at) => parent_node.insert_child_at(at, child),
                None => parent_node.push_child(child),
            }
        }
        if let Some(child_node) = self.nodes.get_mut(&child) {
            child_node.set_parent(Some(parent));
        }

        let context = self.nodes.get(&parent).and_then(Node::context).cloned();
        if let Some(context) = context {
            self.assign_context_subtree(child, &context);
        }

        self.mark_world_dirty_down(child);
        self.mark_world_bounds_dirty_up(Some(parent));
        self.observers
            .notify(&GraphEvent::ChildAdded { parent, child });
        Ok(())
    }

    /// Severs the child's parent link (if any), returning it to root status.
    fn detach(&mut self, child: NodeId) {
        let Some(old_parent) = self.nodes.get(&child).and_then(Node::parent) else {
            return;
        };
        if let Some(parent_node) = self.nodes.get_mut(&old_parent) {
            parent_node.retain_child(child);
        }
        if let Some(child_node) = self.nodes.get_mut(&child) {
            child_node.set_parent(None);
        }
        self.root_nodes.push(child);
        self.mark_world_dirty_down(child);
        self.mark_world_bounds_dirty_up(Some(old_parent));
        self.observers.notify(&GraphEvent::ChildRemoved {
            parent: old_parent,
            child,
        });
    }

    /// True when `ancestor` is `of` or appears on `of`'s parent chain.
    fn is_ancestor(&self, ancestor: NodeId, of: NodeId) -> bool {
        let mut current = Some(of);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.nodes.get(&id).and_then(Node::parent);
        }
        false
    }

    // ========== Local transform setters ==========

    pub fn set_position(&mut self, id: NodeId, position: Point3<f32>) {
        let Some(node) = self.nodes.get_mut(&id) else {
            log::warn!("set_position: node {id} not found");
            return;
        };
        node.store_position(position);
        self.after_local_change(id);
    }

    pub fn set_orientation(&mut self, id: NodeId, orientation: Quaternion<f32>) {
        let Some(node) = self.nodes.get_mut(&id) else {
            log::warn!("set_orientation: node {id} not found");
            return;
        };
        node.store_orientation(orientation);
        self.after_local_change(id);
    }

    pub fn set_scale(&mut self, id: NodeId, scale: Vector3<f32>) {
        let Some(node) = self.nodes.get_mut(&id) else {
            log::warn!("set_scale: node {id} not found");
            return;
        };
        node.store_scale(scale);
        self.after_local_change(id);
    }

    /// Replaces the node's transform with the TRS decomposition of `matrix`.
    ///
    /// Precondition: `matrix` is a pure TRS composition (no shear, no zero
    /// scale). The decomposition is not validated.
    pub fn set_local_matrix(&mut self, id: NodeId, matrix: Matrix4<f32>) {
        let Some(node) = self.nodes.get_mut(&id) else {
            log::warn!("set_local_matrix: node {id} not found");
            return;
        };
        let (position, orientation, scale) = decompose_trs(&matrix);
        node.store_position(position);
        node.store_orientation(orientation);
        node.store_scale(scale);
        self.after_local_change(id);
    }

    /// Points the node's local +Z axis at `target`, expressed in the parent
    /// frame. Position and scale are untouched.
    pub fn look_at(&mut self, id: NodeId, target: Point3<f32>, up: Vector3<f32>) {
        let Some(node) = self.nodes.get(&id) else {
            log::warn!("look_at: node {id} not found");
            return;
        };
        let basis = look_at_basis(node.position(), target, up);
        let orientation = Quaternion::from(Matrix3::from_cols(
            basis.x.truncate(),
            basis.y.truncate(),
            basis.z.truncate(),
        ));
        self.set_orientation(id, orientation);
    }

    /// Invalidation cascade shared by every local-transform write: the node's
    /// own local caches are already stale, so stale-mark the world transform
    /// of the node and its descendants and the world bounds of its ancestors.
    fn after_local_change(&self, id: NodeId) {
        self.mark_world_dirty_down(id);
        let parent = self.nodes.get(&id).and_then(Node::parent);
        self.mark_world_bounds_dirty_up(parent);
    }

    // ========== World-space setters ==========

    /// Places the node at a world position by inverse-transforming through
    /// the parent.
    pub fn set_world_position(&mut self, id: NodeId, world_position: Point3<f32>) {
        let parent = self.nodes.get(&id).and_then(Node::parent);
        let local = match parent.and_then(|p| self.world_matrix_inverse(p)) {
            Some(inverse) => Point3::from_homogeneous(inverse * world_position.to_homogeneous()),
            None => world_position,
        };
        self.set_position(id, local);
    }

    pub fn set_world_orientation(&mut self, id: NodeId, world_orientation: Quaternion<f32>) {
        let parent = self.nodes.get(&id).and_then(Node::parent);
        let local = match parent.and_then(|p| self.world_orientation(p)) {
            Some(parent_orientation) => parent_orientation.invert() * world_orientation,
            None => world_orientation,
        };
        self.set_orientation(id, local);
    }

    pub fn set_world_scale(&mut self, id: NodeId, world_scale: Vector3<f32>) {
        let parent = self.nodes.get(&id).and_then(Node::parent);
        let local = match parent.and_then(|p| self.world_scale(p)) {
            Some(parent_scale) => world_scale.div_element_wise(parent_scale),
            None => world_scale,
        };
        self.set_scale(id, local);
    }

    /// Sets the node's world transform by pulling `matrix` back through the
    /// parent's world inverse. Same no-shear precondition as
    /// [`SceneGraph::set_local_matrix`].
    pub fn set_world_matrix(&mut self, id: NodeId, matrix: Matrix4<f32>) {
        let parent = self.nodes.get(&id).and_then(Node::parent);
        let local = match parent.and_then(|p| self.world_matrix_inverse(p)) {
            Some(inverse) => inverse * matrix,
            None => matrix,
        };
        self.set_local_matrix(id, local);
    }

    /// Points the node's world +Z axis at a world-space target.
    pub fn look_at_world(&mut self, id: NodeId, target: Point3<f32>, up: Vector3<f32>) {
        let Some(eye) = self.world_position(id) else {
            log::warn!("look_at_world: node {id} not found");
            return;
        };
        let basis = look_at_basis(eye, target, up);
        let orientation = Quaternion::from(Matrix3::from_cols(
            basis.x.truncate(),
            basis.y.truncate(),
            basis.z.truncate(),
        ));
        self.set_world_orientation(id, orientation);
    }

    // ========== Visibility & content signals ==========

    /// Flips a node's visibility. Ancestors that bounds-merge the node (its
    /// parent and any attach points) go stale so their next bounds read
    /// reflects the change.
    pub fn set_visible(&mut self, id: NodeId, visible: bool) {
        let Some(node) = self.nodes.get_mut(&id) else {
            log::warn!("set_visible: node {id} not found");
            return;
        };
        if node.visible() == visible {
            return;
        }
        node.store_visible(visible);

        let holders: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|(_, holder)| holder.children().contains(&id))
            .map(|(&holder_id, _)| holder_id)
            .collect();
        for holder in holders {
            self.mark_world_bounds_dirty_up(Some(holder));
        }
    }

    /// Signal from a content owner that the content's extents changed:
    /// drops the node's bounds caches and cascades staleness to ancestors.
    pub fn mark_content_changed(&self, id: NodeId) {
        let Some(node) = self.nodes.get(&id) else {
            log::warn!("mark_content_changed: node {id} not found");
            return;
        };
        node.mark_content_bounds_dirty();
        if node.mark_world_bounds_dirty() {
            self.observers.notify(&GraphEvent::BoundsChanged { node: id });
        }
        self.mark_world_bounds_dirty_up(node.parent());
    }

    // ========== Dirty propagation ==========

    /// Marks the world transform of `id` and every descendant stale,
    /// together with each affected node's world bounds. Prunes at nodes
    /// whose world transform is already stale: their subtree is stale too.
    fn mark_world_dirty_down(&self, id: NodeId) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        if !node.mark_world_matrix_dirty() {
            return;
        }
        self.observers
            .notify(&GraphEvent::TransformChanged { node: id });
        if node.mark_world_bounds_dirty() {
            self.observers.notify(&GraphEvent::BoundsChanged { node: id });
        }
        for &child in node.children() {
            // Attached children do not compose under this node.
            if self.nodes.get(&child).and_then(Node::parent) == Some(id) {
                self.mark_world_dirty_down(child);
            }
        }
    }

    /// Marks world bounds stale from `start` up to the root, pruning at the
    /// first already-stale ancestor (its own ancestors are stale already).
    fn mark_world_bounds_dirty_up(&self, start: Option<NodeId>) {
        let mut current = start;
        while let Some(id) = current {
            let Some(node) = self.nodes.get(&id) else {
                return;
            };
            if !node.mark_world_bounds_dirty() {
                return;
            }
            self.observers.notify(&GraphEvent::BoundsChanged { node: id });
            current = node.parent();
        }
    }

    // ========== World transform accessors ==========

    pub fn world_matrix(&self, id: NodeId) -> Option<Matrix4<f32>> {
        self.nodes.get(&id).map(|node| self.world_matrix_of(node))
    }

    pub fn world_matrix_inverse(&self, id: NodeId) -> Option<Matrix4<f32>> {
        self.nodes
            .get(&id)
            .map(|node| self.world_matrix_inverse_of(node))
    }

    /// Inverse-transpose of the world matrix's upper 3x3, identity when the
    /// world matrix is singular.
    pub fn normal_matrix(&self, id: NodeId) -> Option<Matrix3<f32>> {
        self.nodes.get(&id).map(|node| self.normal_matrix_of(node))
    }

    pub fn world_position(&self, id: NodeId) -> Option<Point3<f32>> {
        self.nodes
            .get(&id)
            .map(|node| self.world_position_of(node))
    }

    pub fn world_orientation(&self, id: NodeId) -> Option<Quaternion<f32>> {
        self.nodes
            .get(&id)
            .map(|node| self.world_orientation_of(node))
    }

    pub fn world_scale(&self, id: NodeId) -> Option<Vector3<f32>> {
        self.nodes.get(&id).map(|node| self.world_scale_of(node))
    }

    pub fn world_forward_direction(&self, id: NodeId) -> Option<Vector3<f32>> {
        self.world_orientation(id).map(local_axis_z)
    }

    pub fn world_up_direction(&self, id: NodeId) -> Option<Vector3<f32>> {
        self.world_orientation(id).map(local_axis_y)
    }

    pub fn world_right_direction(&self, id: NodeId) -> Option<Vector3<f32>> {
        self.world_orientation(id).map(local_axis_x)
    }

    fn world_matrix_of(&self, node: &Node) -> Matrix4<f32> {
        node.world_matrix_cell().get(|| {
            match node.parent().and_then(|parent| self.nodes.get(&parent)) {
                Some(parent) => self.world_matrix_of(parent) * node.local_matrix(),
                None => node.local_matrix(),
            }
        })
    }

    fn world_matrix_inverse_of(&self, node: &Node) -> Matrix4<f32> {
        node.world_matrix_inverse_cell().get(|| {
            self.world_matrix_of(node).invert().unwrap_or_else(|| {
                log::warn!(
                    "node {} has a non-invertible world matrix, using identity inverse",
                    node.id
                );
                Matrix4::identity()
            })
        })
    }

    fn normal_matrix_of(&self, node: &Node) -> Matrix3<f32> {
        node.normal_matrix_cell()
            .get(|| normal_from_model(&self.world_matrix_of(node)))
    }

    fn world_position_of(&self, node: &Node) -> Point3<f32> {
        node.world_position_cell().get(|| {
            let world = self.world_matrix_of(node);
            Point3::new(world.w.x, world.w.y, world.w.z)
        })
    }

    fn world_orientation_of(&self, node: &Node) -> Quaternion<f32> {
        node.world_orientation_cell().get(|| {
            match node.parent().and_then(|parent| self.nodes.get(&parent)) {
                Some(parent) => self.world_orientation_of(parent) * node.orientation(),
                None => node.orientation(),
            }
        })
    }

    fn world_scale_of(&self, node: &Node) -> Vector3<f32> {
        node.world_scale_cell().get(|| {
            match node.parent().and_then(|parent| self.nodes.get(&parent)) {
                Some(parent) => self.world_scale_of(parent).mul_element_wise(node.scale()),
                None => node.scale(),
            }
        })
    }

    // ========== Bounds accessors ==========

    pub fn content_bounds(&self, id: NodeId) -> Option<Aabb> {
        self.nodes.get(&id).map(Node::content_bounds)
    }

    pub fn local_bounds(&self, id: NodeId) -> Option<Aabb> {
        self.nodes.get(&id).map(Node::local_bounds)
    }

    /// World-space bounds of the node's subtree: its content carried through
    /// the world matrix, merged with the world bounds of every visible child.
    pub fn world_bounds(&self, id: NodeId) -> Option<Aabb> {
        self.nodes.get(&id).map(|node| self.world_bounds_of(node))
    }

    /// World bounds of the whole graph: every root merged.
    pub fn bounding(&self) -> Aabb {
        self.root_nodes
            .iter()
            .filter_map(|&root| self.nodes.get(&root))
            .fold(Aabb::empty(), |bounds, node| {
                bounds.merge(&self.world_bounds_of(node))
            })
    }

    fn world_bounds_of(&self, node: &Node) -> Aabb {
        node.world_bounds_cell().get(|| {
            let mut bounds = node
                .content_bounds()
                .transform(&self.world_matrix_of(node));
            for &child_id in node.children() {
                if let Some(child) = self.nodes.get(&child_id) {
                    if child.visible() {
                        bounds = bounds.merge(&self.world_bounds_of(child));
                    }
                }
            }
            bounds
        })
    }

    // ========== Per-frame update & context ==========

    /// Runs every content's per-frame hook, depth-first from the roots in
    /// child order. Each node is visited exactly once (parent-linked edges
    /// only).
    pub fn update(&mut self) {
        let mut order = Vec::new();
        for index in 0..self.root_nodes.len() {
            self.collect_owned_subtree(self.root_nodes[index], &mut order);
        }
        for id in order {
            let Some(mut content) = self.nodes.get_mut(&id).and_then(Node::take_content) else {
                continue;
            };
            content.update(self, id);
            if let Some(node) = self.nodes.get_mut(&id) {
                node.put_content(content);
            }
        }
    }

    /// Stores the opaque render context on a subtree, invoking each
    /// content's attachment hook. Nodes that already carry this exact
    /// context (by identity) are skipped.
    pub fn assign_context(&mut self, root: NodeId, context: RenderContext) {
        self.assign_context_subtree(root, &context);
    }

    fn assign_context_subtree(&mut self, root: NodeId, context: &RenderContext) {
        let mut order = vec![root];
        order.extend(self.descendants(root));
        for id in order {
            let Some(node) = self.nodes.get_mut(&id) else {
                continue;
            };
            if node.context().is_some_and(|held| held.same_as(context)) {
                continue;
            }
            node.store_context(context.clone());
            if let Some(mut content) = node.take_content() {
                content.context_attached(context);
                if let Some(node) = self.nodes.get_mut(&id) {
                    node.put_content(content);
                }
            }
        }
    }

    // ========== Draw flattening ==========

    /// Flattens the visible tree into draw records for every content node,
    /// resolving world and normal matrices along the way.
    pub fn collect_draw_transforms(&self) -> Vec<DrawTransform> {
        let mut out = Vec::new();
        for &root in &self.root_nodes {
            self.collect_draw_transforms_from(root, &mut out);
        }
        out
    }

    fn collect_draw_transforms_from(&self, id: NodeId, out: &mut Vec<DrawTransform>) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        if !node.visible() {
            return;
        }
        if node.content().is_some() {
            out.push(DrawTransform {
                node: id,
                world_matrix: self.world_matrix_of(node),
                normal_matrix: self.normal_matrix_of(node),
            });
        }
        for &child in node.children() {
            self.collect_draw_transforms_from(child, out);
        }
    }

    // ========== Observers ==========

    /// Registers a synchronous observer on a node for the given event
    /// categories. The handler runs in-line with the mutating call and must
    /// not register or remove observers, or mutate the graph, re-entrantly.
    pub fn observe(
        &self,
        node: NodeId,
        kinds: EventKinds,
        handler: impl FnMut(&GraphEvent) + 'static,
    ) -> ObserverId {
        self.observers.register(node, kinds, Box::new(handler))
    }

    /// Cancels a registration. Returns false if it was already gone.
    pub fn unobserve(&self, id: ObserverId) -> bool {
        self.observers.remove(id)
    }

    // ========== Internal walks ==========

    /// Pre-order ids of the parent-linked subtree under `id` (inclusive).
    fn collect_owned_subtree(&self, id: NodeId, out: &mut Vec<NodeId>) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        out.push(id);
        for &child in node.children() {
            if self.nodes.get(&child).and_then(Node::parent) == Some(id) {
                self.collect_owned_subtree(child, out);
            }
        }
    }

    /// Pre-order ids following every child edge, attachments included.
    fn collect_all_edges(&self, id: NodeId, out: &mut Vec<NodeId>) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        out.push(id);
        for &child in node.children() {
            self.collect_all_edges(child, out);
        }
    }

    // ========== Decode support ==========

    /// Inserts a fully-formed node under an optional parent, preserving its
    /// id. Returns false when the id is already taken.
    pub(crate) fn insert_decoded(&mut self, mut node: Node, parent: Option<NodeId>) -> bool {
        let id = node.id;
        if self.nodes.contains_key(&id) {
            return false;
        }
        node.set_parent(parent);
        self.nodes.insert(id, node);
        match parent {
            Some(parent_id) => {
                if let Some(parent_node) = self.nodes.get_mut(&parent_id) {
                    parent_node.push_child(id);
                }
            }
            None => self.root_nodes.push(id),
        }
        self.next_node_id = self.next_node_id.max(id + 1);
        true
    }

    /// Direct field write for decoding; skips the invalidation cascades,
    /// which freshly-built nodes do not need.
    pub(crate) fn store_decoded_state(
        &mut self,
        id: NodeId,
        position: Point3<f32>,
        orientation: Quaternion<f32>,
        scale: Vector3<f32>,
        visible: bool,
    ) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.store_position(position);
            node.store_orientation(orientation);
            node.store_scale(scale);
            node.store_visible(visible);
        }
    }
}

impl std::fmt::Debug for SceneGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneGraph")
            .field("node_count", &self.nodes.len())
            .field("root_nodes", &self.root_nodes)
            .finish_non_exhaustive()
    }
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}
