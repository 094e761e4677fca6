use std::any::Any;
use std::fmt;
use std::rc::Rc;

use cgmath::{Point3, Vector3};

use crate::common::{Aabb, Ray};
use crate::graph::SceneGraph;
use crate::node::NodeId;

/// An opaque handle to whatever backend a graph is being prepared for.
///
/// The graph itself never inspects the payload; it only hands the context to
/// node content when a subtree joins a graph that has one, and compares
/// contexts by identity to avoid redundant setup.
#[derive(Clone)]
pub struct RenderContext {
    payload: Rc<dyn Any>,
}

impl RenderContext {
    pub fn new(payload: Rc<dyn Any>) -> Self {
        Self { payload }
    }

    pub fn payload(&self) -> &Rc<dyn Any> {
        &self.payload
    }

    /// Identity comparison: two handles are the same context iff they share
    /// the same payload allocation.
    pub fn same_as(&self, other: &RenderContext) -> bool {
        Rc::ptr_eq(&self.payload, &other.payload)
    }
}

impl fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RenderContext")
    }
}

/// A narrow-phase hit reported by node content, in the node's local space.
///
/// The graph maps position and normal to world space before surfacing the
/// hit to callers.
#[derive(Debug, Clone, Copy)]
pub struct ContentHit {
    pub position: Point3<f32>,
    pub normal: Vector3<f32>,
    pub primitive_index: u32,
    /// Barycentric coordinates within the hit primitive, when meaningful.
    pub barycentric: (f32, f32),
}

/// Behavior a node can carry beyond its transform: geometry extent,
/// ray intersection, and per-frame work.
///
/// All methods have empty defaults so content types only implement what
/// they need. A bare grouping node simply has no content at all.
pub trait NodeContent {
    /// A short type tag used in logging.
    fn kind(&self) -> &str;

    /// The content's own extent in the node's local space, before any
    /// transform is applied. The default is the empty box, which drops out
    /// of every bounds merge.
    fn compute_bounds(&self) -> Aabb {
        Aabb::empty()
    }

    /// Narrow-phase intersection against `ray`, which is already expressed
    /// in the node's local space. Pushes any hits onto `hits`.
    fn intersect(&self, ray: &Ray, hits: &mut Vec<ContentHit>) {
        let _ = (ray, hits);
    }

    /// Called when the owning node joins a graph with a render context, or
    /// when a context is assigned to the graph. Invoked at most once per
    /// distinct context.
    fn context_attached(&mut self, context: &RenderContext) {
        let _ = context;
    }

    /// Per-frame work, driven by [`SceneGraph::update`].
    fn update(&mut self, graph: &SceneGraph, node: NodeId) {
        let _ = (graph, node);
    }
}
