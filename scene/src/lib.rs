pub mod cache;
pub mod content;
pub mod format;
pub mod graph;
pub mod loader;
pub mod node;
pub mod observer;
pub mod raycast;
pub mod tree;

pub use trellis_common as common;

pub use cache::CacheCell;
pub use content::{ContentHit, NodeContent, RenderContext};
pub use graph::{DrawTransform, GraphError, SceneGraph};
pub use node::{Node, NodeId};
pub use observer::{EventKinds, GraphEvent, ObserverId};
pub use raycast::{raycast, raycast_subtree, RaycastHit, RaycastOptions};
pub use tree::{walk_tree, TreeVisitor};
