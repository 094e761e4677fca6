use cgmath::{EuclideanSpace, Matrix3, Matrix4, Point3, Quaternion, SquareMatrix, Vector3};

use crate::cache::CacheCell;
use crate::common::transform_ops::{local_axis_x, local_axis_y, local_axis_z};
use crate::common::Aabb;
use crate::content::{NodeContent, RenderContext};

/// Unique identifier for a node in the scene graph.
pub type NodeId = u32;

/// A node in the scene graph hierarchy.
///
/// A node owns its local transform components (position, orientation, scale)
/// and a family of memoized derived values. Values that depend only on the
/// node itself (the elementary and local matrices, content and local bounds)
/// are computed here; values that depend on the parent chain or children
/// (world matrix, world bounds and friends) are computed by
/// [`crate::graph::SceneGraph`], which owns the hierarchy, through the
/// `pub(crate)` cache accessors below.
///
/// Hierarchy links are non-owning ids. `parent` points at the node whose
/// world transform this node composes under; `children` is an ordered
/// sequence that drives traversal and draw order and may additionally hold
/// attached nodes whose `parent` points elsewhere.
pub struct Node {
    pub id: NodeId,
    label: String,
    visible: bool,

    // Local transform components
    position: Point3<f32>,
    orientation: Quaternion<f32>,
    scale: Vector3<f32>,

    // Hierarchy
    parent: Option<NodeId>,
    children: Vec<NodeId>,

    // Optional behavior beyond the transform
    content: Option<Box<dyn NodeContent>>,
    context: Option<RenderContext>,

    // Self-contained caches
    translation_matrix: CacheCell<Matrix4<f32>>,
    rotation_matrix: CacheCell<Matrix4<f32>>,
    scale_matrix: CacheCell<Matrix4<f32>>,
    local_matrix: CacheCell<Matrix4<f32>>,
    local_matrix_inverse: CacheCell<Matrix4<f32>>,
    content_bounds: CacheCell<Aabb>,
    local_bounds: CacheCell<Aabb>,

    // Graph-computed caches (depend on the parent chain or children)
    world_matrix: CacheCell<Matrix4<f32>>,
    world_matrix_inverse: CacheCell<Matrix4<f32>>,
    normal_matrix: CacheCell<Matrix3<f32>>,
    world_position: CacheCell<Point3<f32>>,
    world_orientation: CacheCell<Quaternion<f32>>,
    world_scale: CacheCell<Vector3<f32>>,
    world_bounds: CacheCell<Aabb>,
}

impl Node {
    /// Creates a detached node with identity transform and every cache empty.
    pub(crate) fn new(id: NodeId, label: String) -> Self {
        Self {
            id,
            label,
            visible: true,
            position: Point3::new(0.0, 0.0, 0.0),
            orientation: Quaternion::new(1.0, 0.0, 0.0, 0.0),
            scale: Vector3::new(1.0, 1.0, 1.0),
            parent: None,
            children: Vec::new(),
            content: None,
            context: None,
            translation_matrix: CacheCell::new(),
            rotation_matrix: CacheCell::new(),
            scale_matrix: CacheCell::new(),
            local_matrix: CacheCell::new(),
            local_matrix_inverse: CacheCell::new(),
            content_bounds: CacheCell::new(),
            local_bounds: CacheCell::new(),
            world_matrix: CacheCell::new(),
            world_matrix_inverse: CacheCell::new(),
            normal_matrix: CacheCell::new(),
            world_position: CacheCell::new(),
            world_orientation: CacheCell::new(),
            world_scale: CacheCell::new(),
            world_bounds: CacheCell::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
    }

    pub fn visible(&self) -> bool {
        self.visible
    }

    /// Flips the flag without any cache invalidation. Use
    /// [`crate::graph::SceneGraph::set_visible`], which also refreshes
    /// ancestor bounds.
    pub(crate) fn store_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    // Local transform components

    pub fn position(&self) -> Point3<f32> {
        self.position
    }

    pub fn orientation(&self) -> Quaternion<f32> {
        self.orientation
    }

    pub fn scale(&self) -> Vector3<f32> {
        self.scale
    }

    /// Writes the field and drops the caches it feeds. World-level
    /// invalidation is the graph's job.
    pub(crate) fn store_position(&mut self, position: Point3<f32>) {
        self.position = position;
        self.translation_matrix.clear();
        self.mark_local_matrix_dirty();
    }

    pub(crate) fn store_orientation(&mut self, orientation: Quaternion<f32>) {
        self.orientation = orientation;
        self.rotation_matrix.clear();
        self.mark_local_matrix_dirty();
    }

    pub(crate) fn store_scale(&mut self, scale: Vector3<f32>) {
        self.scale = scale;
        self.scale_matrix.clear();
        self.mark_local_matrix_dirty();
    }

    // Hierarchy

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub(crate) fn set_parent(&mut self, parent: Option<NodeId>) {
        self.parent = parent;
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub(crate) fn push_child(&mut self, child: NodeId) {
        self.children.push(child);
    }

    pub(crate) fn insert_child_at(&mut self, index: usize, child: NodeId) {
        let index = index.min(self.children.len());
        self.children.insert(index, child);
    }

    /// Removes `child` from the sequence. Returns false if it was absent.
    pub(crate) fn retain_child(&mut self, child: NodeId) -> bool {
        let before = self.children.len();
        self.children.retain(|&id| id != child);
        self.children.len() != before
    }

    // Content

    pub fn content(&self) -> Option<&dyn NodeContent> {
        self.content.as_deref()
    }

    pub fn content_mut(&mut self) -> Option<&mut (dyn NodeContent + 'static)> {
        self.content.as_deref_mut()
    }

    pub(crate) fn set_content(&mut self, content: Option<Box<dyn NodeContent>>) {
        self.content = content;
        self.content_bounds.clear();
        self.local_bounds.clear();
        self.world_bounds.clear();
    }

    /// Temporarily lifts the content out so the graph can hand it `&mut self`
    /// hooks alongside a shared graph borrow.
    pub(crate) fn take_content(&mut self) -> Option<Box<dyn NodeContent>> {
        self.content.take()
    }

    pub(crate) fn put_content(&mut self, content: Box<dyn NodeContent>) {
        self.content = Some(content);
    }

    pub fn context(&self) -> Option<&RenderContext> {
        self.context.as_ref()
    }

    pub(crate) fn store_context(&mut self, context: RenderContext) {
        self.context = Some(context);
    }

    // Elementary and local matrices

    pub fn translation_matrix(&self) -> Matrix4<f32> {
        self.translation_matrix
            .get(|| Matrix4::from_translation(self.position.to_vec()))
    }

    pub fn rotation_matrix(&self) -> Matrix4<f32> {
        self.rotation_matrix.get(|| Matrix4::from(self.orientation))
    }

    pub fn scale_matrix(&self) -> Matrix4<f32> {
        self.scale_matrix
            .get(|| Matrix4::from_nonuniform_scale(self.scale.x, self.scale.y, self.scale.z))
    }

    /// Local transform: translation * rotation * scale.
    pub fn local_matrix(&self) -> Matrix4<f32> {
        self.local_matrix
            .get(|| self.translation_matrix() * self.rotation_matrix() * self.scale_matrix())
    }

    pub fn local_matrix_inverse(&self) -> Matrix4<f32> {
        self.local_matrix_inverse.get(|| {
            self.local_matrix().invert().unwrap_or_else(|| {
                log::warn!(
                    "node {} has a non-invertible local matrix, using identity inverse",
                    self.id
                );
                Matrix4::identity()
            })
        })
    }

    // Local direction vectors: fixed bases +X right, +Y up, +Z forward,
    // rotated by the node's orientation.

    pub fn forward_direction(&self) -> Vector3<f32> {
        local_axis_z(self.orientation)
    }

    pub fn up_direction(&self) -> Vector3<f32> {
        local_axis_y(self.orientation)
    }

    pub fn right_direction(&self) -> Vector3<f32> {
        local_axis_x(self.orientation)
    }

    // Bounds

    /// The content's own extent in local space before any transform. Empty
    /// for pure grouping nodes.
    pub fn content_bounds(&self) -> Aabb {
        self.content_bounds.get(|| {
            self.content
                .as_deref()
                .map(NodeContent::compute_bounds)
                .unwrap_or_else(Aabb::empty)
        })
    }

    /// Content bounds carried through the local matrix.
    pub fn local_bounds(&self) -> Aabb {
        self.local_bounds
            .get(|| self.content_bounds().transform(&self.local_matrix()))
    }

    // Dirty marking. A value is dirty exactly when its cache cell is empty,
    // so marking an already-dirty node is a no-op and the transition result
    // tells the graph whether propagation must continue.

    pub(crate) fn mark_local_matrix_dirty(&self) {
        self.local_matrix.clear();
        self.local_matrix_inverse.clear();
        self.local_bounds.clear();
    }

    /// Drops the world-dependent transform caches. Returns true on the
    /// clean-to-dirty transition, false when the node was already dirty.
    pub(crate) fn mark_world_matrix_dirty(&self) -> bool {
        if !self.world_matrix.is_cached() {
            return false;
        }
        self.world_matrix.clear();
        self.world_matrix_inverse.clear();
        self.normal_matrix.clear();
        self.world_position.clear();
        self.world_orientation.clear();
        self.world_scale.clear();
        true
    }

    /// Drops the world bounds cache. Returns true on the clean-to-dirty
    /// transition.
    pub(crate) fn mark_world_bounds_dirty(&self) -> bool {
        if !self.world_bounds.is_cached() {
            return false;
        }
        self.world_bounds.clear();
        true
    }

    pub(crate) fn mark_content_bounds_dirty(&self) {
        self.content_bounds.clear();
        self.local_bounds.clear();
    }

    // Cache state probes, used by tests and by callers scheduling work.

    pub fn local_matrix_dirty(&self) -> bool {
        !self.local_matrix.is_cached()
    }

    pub fn world_matrix_dirty(&self) -> bool {
        !self.world_matrix.is_cached()
    }

    pub fn world_bounds_dirty(&self) -> bool {
        !self.world_bounds.is_cached()
    }

    // Graph-side cache access.

    pub(crate) fn world_matrix_cell(&self) -> &CacheCell<Matrix4<f32>> {
        &self.world_matrix
    }

    pub(crate) fn world_matrix_inverse_cell(&self) -> &CacheCell<Matrix4<f32>> {
        &self.world_matrix_inverse
    }

    pub(crate) fn normal_matrix_cell(&self) -> &CacheCell<Matrix3<f32>> {
        &self.normal_matrix
    }

    pub(crate) fn world_position_cell(&self) -> &CacheCell<Point3<f32>> {
        &self.world_position
    }

    pub(crate) fn world_orientation_cell(&self) -> &CacheCell<Quaternion<f32>> {
        &self.world_orientation
    }

    pub(crate) fn world_scale_cell(&self) -> &CacheCell<Vector3<f32>> {
        &self.world_scale
    }

    pub(crate) fn world_bounds_cell(&self) -> &CacheCell<Aabb> {
        &self.world_bounds
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("visible", &self.visible)
            .field("parent", &self.parent)
            .field("children", &self.children)
            .field("content", &self.content.as_deref().map(NodeContent::kind))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::EPSILON;
    use cgmath::InnerSpace;

    fn matrices_close(a: &Matrix4<f32>, b: &Matrix4<f32>) -> bool {
        let a: [[f32; 4]; 4] = (*a).into();
        let b: [[f32; 4]; 4] = (*b).into();
        a.iter()
            .flatten()
            .zip(b.iter().flatten())
            .all(|(x, y)| (x - y).abs() < EPSILON)
    }

    #[test]
    fn test_new_node_has_identity_local_matrix() {
        let node = Node::new(0, "n".to_string());
        assert!(matrices_close(&node.local_matrix(), &Matrix4::identity()));
    }

    #[test]
    fn test_new_node_starts_fully_dirty() {
        let node = Node::new(0, String::new());
        assert!(node.local_matrix_dirty());
        assert!(node.world_matrix_dirty());
        assert!(node.world_bounds_dirty());
    }

    #[test]
    fn test_local_matrix_composition_order() {
        let mut node = Node::new(0, String::new());
        node.store_position(Point3::new(1.0, 0.0, 0.0));
        node.store_scale(Vector3::new(2.0, 2.0, 2.0));

        // Scale applies before translation: a point at local x=1 lands at 3.
        let m = node.local_matrix();
        let p = m * cgmath::Vector4::new(1.0, 0.0, 0.0, 1.0);
        assert!((p.x - 3.0).abs() < EPSILON);
    }

    #[test]
    fn test_store_position_dirties_local_matrix() {
        let mut node = Node::new(0, String::new());
        node.local_matrix();
        assert!(!node.local_matrix_dirty());

        node.store_position(Point3::new(1.0, 2.0, 3.0));
        assert!(node.local_matrix_dirty());

        let m = node.local_matrix();
        assert!((m.w.x - 1.0).abs() < EPSILON);
        assert!(!node.local_matrix_dirty());
    }

    #[test]
    fn test_world_dirty_marking_reports_transition_once() {
        let node = Node::new(0, String::new());
        node.world_matrix_cell().get(Matrix4::identity);

        assert!(node.mark_world_matrix_dirty());
        assert!(!node.mark_world_matrix_dirty());
    }

    #[test]
    fn test_local_inverse_round_trip() {
        let mut node = Node::new(0, String::new());
        node.store_position(Point3::new(3.0, -1.0, 2.0));
        node.store_scale(Vector3::new(2.0, 2.0, 2.0));

        let round_trip = node.local_matrix() * node.local_matrix_inverse();
        assert!(matrices_close(&round_trip, &Matrix4::identity()));
    }

    #[test]
    fn test_default_directions_are_fixed_bases() {
        let node = Node::new(0, String::new());
        assert!((node.forward_direction() - Vector3::unit_z()).magnitude() < EPSILON);
        assert!((node.up_direction() - Vector3::unit_y()).magnitude() < EPSILON);
        assert!((node.right_direction() - Vector3::unit_x()).magnitude() < EPSILON);
    }

    #[test]
    fn test_content_bounds_empty_without_content() {
        let node = Node::new(0, String::new());
        assert!(node.content_bounds().is_empty());
        assert!(node.local_bounds().is_empty());
    }
}
