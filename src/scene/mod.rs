//! Scene Graph
//!
//! - [`Node`]: hierarchy links, local transform, cached world matrix
//! - [`Transform`]: position / rotation / scale / pivot with dirty tracking
//! - [`Scene`]: owns nodes and their mesh, light and camera components
//! - [`transform_system`]: world matrix propagation
//! - [`traversal`]: depth-first and breadth-first walkers
//! - [`Camera`], [`Light`]: components attached to nodes

pub mod camera;
pub mod light;
pub mod node;
#[allow(clippy::module_inception)]
pub mod scene;
pub mod transform;
pub mod transform_system;
pub mod traversal;

pub use camera::{Camera, Frustum, Projection};
pub use light::{AreaLight, Light, LightKind, PointLight, SpotLight};
pub use node::{Node, NodeComponent};
pub use scene::Scene;
pub use transform::{Transform, look_at_rotation};
pub use traversal::{BreadthFirstWalk, DepthFirstWalk, TraversalControl};

use slotmap::new_key_type;

new_key_type! {
    pub struct NodeHandle;
    pub struct MeshKey;
    pub struct CameraKey;
    pub struct LightKey;
}
