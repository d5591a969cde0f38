//! Materials
//!
//! A [`Material`] describes surface appearance: the light model, scalar
//! parameters uploaded as uniforms, optional texture maps, and the fixed
//! function state (depth, culling, blending) applied before drawing.
//!
//! [`Material::render_options`] is a pure function of the material state;
//! the renderer combines it with geometry and light options to select a
//! shader variant.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use glam::{Vec3, Vec4};
use parking_lot::RwLock;
use wgpu::{BlendFactor, BlendOperation, CompareFunction};

use crate::renderer::device::{BlendEquation, BlendFunc};
use crate::resources::render_options::RenderOptions;
use crate::resources::texture::TextureHandle;

/// Shared, lockable material.
pub type MaterialRef = Arc<RwLock<Material>>;

static NEXT_MATERIAL_ID: AtomicU64 = AtomicU64::new(1);

/// Shading model; selects the shader template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LightModel {
    /// Unlit; color and map only.
    Basic,
    #[default]
    Lambert,
    Phong,
    Standard,
}

impl LightModel {
    #[must_use]
    pub fn shader_name(self) -> &'static str {
        match self {
            LightModel::Basic => "mesh_basic",
            LightModel::Lambert => "mesh_lambert",
            LightModel::Phong => "mesh_phong",
            LightModel::Standard => "mesh_standard",
        }
    }

    #[must_use]
    pub fn option_name(self) -> &'static str {
        match self {
            LightModel::Basic => "LIGHT_MODEL_BASIC",
            LightModel::Lambert => "LIGHT_MODEL_LAMBERT",
            LightModel::Phong => "LIGHT_MODEL_PHONG",
            LightModel::Standard => "LIGHT_MODEL_STANDARD",
        }
    }

    /// Lit models receive light counts in their shader key.
    #[must_use]
    pub fn is_lit(self) -> bool {
        !matches!(self, LightModel::Basic)
    }
}

/// Which faces are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Side {
    #[default]
    Front,
    Back,
    Double,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Blending {
    #[default]
    None,
    Normal,
    Additive,
    Multiply,
    Custom(BlendFunc, BlendEquation),
}

impl Blending {
    /// Blend function and equation; `None` when blending is disabled.
    #[must_use]
    pub fn state(self) -> Option<(BlendFunc, BlendEquation)> {
        let add = BlendEquation::uniform(BlendOperation::Add);
        match self {
            Blending::None => None,
            Blending::Normal => Some((
                BlendFunc::separate(
                    BlendFactor::SrcAlpha,
                    BlendFactor::OneMinusSrcAlpha,
                    BlendFactor::One,
                    BlendFactor::OneMinusSrcAlpha,
                ),
                add,
            )),
            Blending::Additive => Some((BlendFunc::uniform(BlendFactor::SrcAlpha, BlendFactor::One), add)),
            Blending::Multiply => Some((BlendFunc::uniform(BlendFactor::Dst, BlendFactor::Zero), add)),
            Blending::Custom(func, equation) => Some((func, equation)),
        }
    }

    fn option_name(self) -> Option<&'static str> {
        match self {
            Blending::None => None,
            Blending::Normal => Some("BLEND_NORMAL"),
            Blending::Additive => Some("BLEND_ADDITIVE"),
            Blending::Multiply => Some("BLEND_MULTIPLY"),
            Blending::Custom(..) => Some("BLEND_CUSTOM"),
        }
    }
}

/// Surface description shared by any number of meshes.
#[derive(Debug, Clone)]
pub struct Material {
    id: u64,
    pub name: Option<String>,
    pub model: LightModel,
    /// Template name replacing the light model's built-in shader.
    pub custom_shader: Option<&'static str>,

    // Uniform parameters
    pub color: Vec4,
    pub emissive: Vec3,
    pub specular: Vec3,
    pub shininess: f32,
    pub roughness: f32,
    pub metalness: f32,
    pub opacity: f32,
    /// Fragments with alpha below this are discarded; `0.0` disables the test.
    pub alpha_test: f32,

    // Maps
    pub map: Option<TextureHandle>,
    pub normal_map: Option<TextureHandle>,
    pub emissive_map: Option<TextureHandle>,
    pub specular_map: Option<TextureHandle>,
    pub vertex_colors: bool,

    // Fixed-function state
    pub transparent: bool,
    pub blending: Blending,
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_func: CompareFunction,
    pub side: Side,
    /// Primary sort key within the opaque and transparent lists.
    pub render_order: i32,
}

impl Material {
    #[must_use]
    pub fn new(model: LightModel) -> Self {
        Self {
            id: NEXT_MATERIAL_ID.fetch_add(1, Ordering::Relaxed),
            name: None,
            model,
            custom_shader: None,
            color: Vec4::ONE,
            emissive: Vec3::ZERO,
            specular: Vec3::splat(0.067),
            shininess: 30.0,
            roughness: 1.0,
            metalness: 0.0,
            opacity: 1.0,
            alpha_test: 0.0,
            map: None,
            normal_map: None,
            emissive_map: None,
            specular_map: None,
            vertex_colors: false,
            transparent: false,
            blending: Blending::None,
            depth_test: true,
            depth_write: true,
            depth_func: CompareFunction::LessEqual,
            side: Side::Front,
            render_order: 0,
        }
    }

    #[must_use]
    pub fn basic(color: Vec4) -> Self {
        Self::new(LightModel::Basic).with_color(color)
    }

    #[must_use]
    pub fn lambert(color: Vec4) -> Self {
        Self::new(LightModel::Lambert).with_color(color)
    }

    #[must_use]
    pub fn phong(color: Vec4) -> Self {
        Self::new(LightModel::Phong).with_color(color)
    }

    #[must_use]
    pub fn standard(color: Vec4) -> Self {
        Self::new(LightModel::Standard).with_color(color)
    }

    #[must_use]
    pub fn with_color(mut self, color: Vec4) -> Self {
        self.color = color;
        self
    }

    #[must_use]
    pub fn with_map(mut self, map: TextureHandle) -> Self {
        self.map = Some(map);
        self
    }

    /// Marks the material transparent with normal alpha blending and no
    /// depth writes.
    #[must_use]
    pub fn with_transparency(mut self, opacity: f32) -> Self {
        self.transparent = true;
        self.opacity = opacity;
        self.blending = Blending::Normal;
        self.depth_write = false;
        self
    }

    #[must_use]
    pub fn with_side(mut self, side: Side) -> Self {
        self.side = side;
        self
    }

    #[must_use]
    pub fn with_render_order(mut self, order: i32) -> Self {
        self.render_order = order;
        self
    }

    #[must_use]
    pub fn with_custom_shader(mut self, shader: &'static str) -> Self {
        self.custom_shader = Some(shader);
        self
    }

    /// Template the material renders with.
    #[inline]
    #[must_use]
    pub fn shader_name(&self) -> &'static str {
        self.custom_shader.unwrap_or_else(|| self.model.shader_name())
    }

    /// Wraps the material for sharing between meshes.
    #[must_use]
    pub fn shared(self) -> MaterialRef {
        Arc::new(RwLock::new(self))
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Bound texture maps with their sampler uniform names, in unit order.
    pub fn texture_slots(&self) -> impl Iterator<Item = (&'static str, TextureHandle)> + '_ {
        [
            ("map", self.map),
            ("normalMap", self.normal_map),
            ("emissiveMap", self.emissive_map),
            ("specularMap", self.specular_map),
        ]
        .into_iter()
        .filter_map(|(name, handle)| handle.map(|h| (name, h)))
    }

    /// Shader options implied by the current material state.
    #[must_use]
    pub fn render_options(&self) -> RenderOptions {
        let mut options = RenderOptions::with_capacity(8);
        options.set_flag(self.model.option_name());

        let flags = [
            ("HAS_MAP", self.map.is_some()),
            ("HAS_NORMAL_MAP", self.normal_map.is_some()),
            ("HAS_EMISSIVE_MAP", self.emissive_map.is_some()),
            ("HAS_SPECULAR_MAP", self.specular_map.is_some()),
            ("USE_VERTEX_COLOR", self.vertex_colors),
            ("ALPHA_TEST", self.alpha_test > 0.0),
            ("TRANSPARENT", self.transparent),
            ("DOUBLE_SIDED", self.side == Side::Double),
            ("FLIP_SIDED", self.side == Side::Back),
        ];
        for (name, enabled) in flags {
            if enabled {
                options.set_flag(name);
            }
        }
        if let Some(name) = self.blending.option_name() {
            options.set_flag(name);
        }
        options
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::new(LightModel::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::KeyData;

    #[test]
    fn identical_state_gives_identical_options() {
        let a = Material::lambert(Vec4::new(1.0, 0.0, 0.0, 1.0));
        let b = Material::lambert(Vec4::new(0.0, 1.0, 0.0, 1.0));
        assert_ne!(a.id(), b.id());
        assert_eq!(a.render_options().compute_hash(), b.render_options().compute_hash());
    }

    #[test]
    fn map_toggles_option() {
        let handle = TextureHandle::from(KeyData::from_ffi(1));
        let plain = Material::phong(Vec4::ONE);
        let mapped = plain.clone().with_map(handle);

        assert!(!plain.render_options().contains("HAS_MAP"));
        assert!(mapped.render_options().contains("HAS_MAP"));
        assert_eq!(mapped.texture_slots().count(), 1);
    }
}
