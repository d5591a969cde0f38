//! Resources
//!
//! CPU-side data the renderer draws from: geometry, materials, meshes,
//! textures, and the render option sets that select shader variants.

pub mod geometry;
pub mod material;
pub mod mesh;
pub mod render_options;
pub mod texture;
pub mod version_tracker;

pub use geometry::{
    Attribute, BoundingSphere, Geometry, GeometryFeatures, GeometryRef, IndexAttribute, attribute_names,
};
pub use material::{Blending, LightModel, Material, MaterialRef, Side};
pub use mesh::Mesh;
pub use render_options::RenderOptions;
pub use texture::{Texture, TextureHandle, TextureLoader, TextureReady, TextureRegistry};
pub use version_tracker::{ChangeTracker, MutGuard};
