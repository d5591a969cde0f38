#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

pub mod errors;
pub mod renderer;
pub mod resources;
pub mod scene;
pub mod utils;

pub use errors::{Result, StrataError};
pub use renderer::{FrameOutcome, HeadlessDevice, RenderStats, Renderer, RendererSettings};
pub use resources::{Geometry, LightModel, Material, Mesh, RenderOptions, Side, Texture};
pub use scene::{Camera, Light, Node, NodeHandle, Scene, Transform};
pub use utils::interner;
