use bitflags::bitflags;
use cgmath::{InnerSpace, Point3, Vector3};

use crate::common::Ray;
use crate::graph::SceneGraph;
use crate::node::NodeId;

bitflags! {
    /// Controls which nodes a ray query considers and when it stops.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RaycastOptions: u8 {
        /// Descend into children instead of testing only the given nodes.
        const RECURSIVE = 1 << 0;
        /// Test invisible nodes too.
        const INVISIBLE = 1 << 1;
        /// Stop at the first node that reports any hit.
        const FIRST = 1 << 2;
    }
}

/// A world-space hit returned by a ray query.
#[derive(Debug, Clone, Copy)]
pub struct RaycastHit {
    pub node: NodeId,
    pub position: Point3<f32>,
    pub normal: Vector3<f32>,
    /// Distance from the world-space ray origin to the hit position.
    pub distance: f32,
    pub primitive_index: u32,
    pub barycentric: (f32, f32),
}

/// Casts a world-space ray against every root of the graph.
///
/// Returns hits sorted nearest-first. Each node is tested in two phases:
/// a cheap world-bounds slab test that also prunes the subtree on a miss
/// (subtree bounds contain every descendant), then the content's own
/// narrow-phase intersection in local space.
pub fn raycast(graph: &SceneGraph, ray: &Ray, options: RaycastOptions) -> Vec<RaycastHit> {
    raycast_nodes(graph, graph.root_nodes(), ray, options)
}

/// Casts a ray against one subtree.
pub fn raycast_subtree(
    graph: &SceneGraph,
    root: NodeId,
    ray: &Ray,
    options: RaycastOptions,
) -> Vec<RaycastHit> {
    raycast_nodes(graph, &[root], ray, options)
}

fn raycast_nodes(
    graph: &SceneGraph,
    roots: &[NodeId],
    ray: &Ray,
    options: RaycastOptions,
) -> Vec<RaycastHit> {
    let mut hits = Vec::new();
    for &root in roots {
        if intersect_node(graph, root, ray, options, &mut hits) {
            break;
        }
    }
    hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    hits
}

/// Tests one node (and, when recursive, its subtree). Returns true when the
/// query should terminate because `FIRST` is set and hits were found.
fn intersect_node(
    graph: &SceneGraph,
    id: NodeId,
    ray: &Ray,
    options: RaycastOptions,
    hits: &mut Vec<RaycastHit>,
) -> bool {
    let Some(node) = graph.get_node(id) else {
        return false;
    };
    if !node.visible() && !options.contains(RaycastOptions::INVISIBLE) {
        return false;
    }

    // Broad phase: the subtree bounds reject the whole branch at once.
    let Some(bounds) = graph.world_bounds(id) else {
        return false;
    };
    if bounds.intersects_ray(ray).is_none() {
        return false;
    }

    let mut found = false;
    if let Some(content) = node.content() {
        let mut content_hits = Vec::new();
        if let Some(inverse) = graph.world_matrix_inverse(id) {
            let local_ray = ray.transform(&inverse);
            content.intersect(&local_ray, &mut content_hits);
        }

        if !content_hits.is_empty() {
            found = true;
            // These resolve from caches the broad phase already filled.
            let world = graph.world_matrix(id).unwrap_or_else(cgmath::SquareMatrix::identity);
            let normal_matrix = graph
                .normal_matrix(id)
                .unwrap_or_else(cgmath::SquareMatrix::identity);
            for hit in content_hits {
                let position = Point3::from_homogeneous(world * hit.position.to_homogeneous());
                let normal = (normal_matrix * hit.normal).normalize();
                hits.push(RaycastHit {
                    node: id,
                    position,
                    normal,
                    distance: (position - ray.origin).magnitude(),
                    primitive_index: hit.primitive_index,
                    barycentric: hit.barycentric,
                });
            }
        }
    }

    if found && options.contains(RaycastOptions::FIRST) {
        return true;
    }

    if options.contains(RaycastOptions::RECURSIVE) {
        for &child in node.children() {
            if intersect_node(graph, child, ray, options, hits) {
                return true;
            }
        }
    }

    found && options.contains(RaycastOptions::FIRST)
}
