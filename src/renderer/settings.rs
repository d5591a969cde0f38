//! Renderer Settings
//!
//! [`RendererSettings`] configures one [`Renderer`](crate::renderer::Renderer).
//! Every field has a default, so partial JSON documents are accepted:
//!
//! ```rust,ignore
//! use strata::renderer::{RendererSettings, FallbackMode};
//!
//! // Debug setup: failed shader variants show up magenta.
//! let settings = RendererSettings {
//!     fallback: FallbackMode::Placeholder,
//!     ..Default::default()
//! };
//!
//! let settings = RendererSettings::from_json(r#"{ "sweep_interval": 0 }"#)?;
//! ```

use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::renderer::device::Viewport;

// ---------------------------------------------------------------------------
// FallbackMode
// ---------------------------------------------------------------------------

/// What a mesh whose shader variant failed to build draws as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackMode {
    /// Nothing is drawn; the failure is only logged and recorded.
    #[default]
    Blank,
    /// The mesh is drawn in solid magenta with a debug program.
    Placeholder,
}

// ---------------------------------------------------------------------------
// RendererSettings
// ---------------------------------------------------------------------------

/// Global renderer configuration.
///
/// | Field                 | Description                                  | Default        |
/// |-----------------------|----------------------------------------------|----------------|
/// | `clear_color`         | Framebuffer clear color (RGBA)               | `[0, 0, 0, 1]` |
/// | `viewport`            | Target rectangle in pixels                   | 800 × 600      |
/// | `frustum_culling`     | Drop meshes outside the camera frustum       | `true`         |
/// | `sweep_interval`      | Frames between cache sweeps (0 = manual)     | `1`            |
/// | `max_lights_per_type` | Cap per non-ambient light kind               | `8`            |
/// | `fallback`            | Failed-variant rendering                     | `Blank`        |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererSettings {
    pub clear_color: [f32; 4],

    pub viewport: Viewport,

    /// Meshes whose world bounding sphere lies fully outside the camera
    /// frustum are skipped. Individual meshes can opt out.
    pub frustum_culling: bool,

    /// Unreferenced GPU resources are destroyed every `sweep_interval`
    /// frames. `0` disables automatic sweeping; call
    /// [`Renderer::sweep`](crate::renderer::Renderer::sweep) instead.
    pub sweep_interval: u32,

    /// Lights beyond this count per kind are dropped with a warning.
    pub max_lights_per_type: usize,

    pub fallback: FallbackMode,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            viewport: Viewport::new(800, 600),
            frustum_culling: true,
            sweep_interval: 1,
            max_lights_per_type: 8,
            fallback: FallbackMode::Blank,
        }
    }
}

impl RendererSettings {
    /// Parses settings from JSON; missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Whether a sweep is due at the end of `frame`.
    #[inline]
    #[must_use]
    pub fn sweep_due(&self, frame: u64) -> bool {
        self.sweep_interval != 0 && frame % u64::from(self.sweep_interval) == 0
    }
}
