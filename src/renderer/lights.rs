//! Light Aggregation
//!
//! Lights are collected in traversal order during the frame walk and packed
//! into flat `f32` arrays once the camera is known. All positions and
//! directions are uploaded in view space. Colors are premultiplied by
//! intensity, and every ambient light is summed into one RGB triple.
//!
//! Directions point from the lit surface toward the light, i.e. along the
//! owning node's world +Z axis (lights shine down their local -Z).

use glam::{Affine3A, Mat4, Vec3};

use crate::renderer::device::UniformValue;
use crate::resources::render_options::RenderOptions;
use crate::scene::light::{Light, LightKind};

/// Number of lights of each kind, as compiled into lit shader variants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct LightCounts {
    pub directional: usize,
    pub point: usize,
    pub spot: usize,
    pub area: usize,
}

impl LightCounts {
    /// Writes the `NUM_*_LIGHTS` options. All four are always present so a
    /// light appearing or disappearing always changes the variant.
    pub fn apply_to(&self, options: &mut RenderOptions) {
        options.set_count("NUM_DIR_LIGHTS", self.directional);
        options.set_count("NUM_POINT_LIGHTS", self.point);
        options.set_count("NUM_SPOT_LIGHTS", self.spot);
        options.set_count("NUM_AREA_LIGHTS", self.area);
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.directional + self.point + self.spot + self.area
    }
}

/// Packed per-frame light uniforms.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LightUniforms {
    pub ambient: Vec3,

    pub directional_direction: Vec<f32>,
    pub directional_color: Vec<f32>,

    pub point_position: Vec<f32>,
    pub point_color: Vec<f32>,
    /// `(range, decay)` pairs.
    pub point_attenuation: Vec<f32>,

    pub spot_position: Vec<f32>,
    pub spot_direction: Vec<f32>,
    pub spot_color: Vec<f32>,
    pub spot_attenuation: Vec<f32>,
    /// `(cos inner, cos outer)` pairs.
    pub spot_cone: Vec<f32>,

    pub area_position: Vec<f32>,
    pub area_color: Vec<f32>,
    pub area_half_width: Vec<f32>,
    pub area_half_height: Vec<f32>,
}

impl LightUniforms {
    fn clear(&mut self) {
        self.ambient = Vec3::ZERO;
        for array in [
            &mut self.directional_direction,
            &mut self.directional_color,
            &mut self.point_position,
            &mut self.point_color,
            &mut self.point_attenuation,
            &mut self.spot_position,
            &mut self.spot_direction,
            &mut self.spot_color,
            &mut self.spot_attenuation,
            &mut self.spot_cone,
            &mut self.area_position,
            &mut self.area_color,
            &mut self.area_half_width,
            &mut self.area_half_height,
        ] {
            array.clear();
        }
    }

    /// `(uniform name, value)` pairs for every non-empty array plus the
    /// ambient term.
    pub fn values(&self) -> impl Iterator<Item = (&'static str, UniformValue)> + '_ {
        let arrays: [(&'static str, &Vec<f32>); 14] = [
            ("directionalLightDirection", &self.directional_direction),
            ("directionalLightColor", &self.directional_color),
            ("pointLightPosition", &self.point_position),
            ("pointLightColor", &self.point_color),
            ("pointLightAttenuation", &self.point_attenuation),
            ("spotLightPosition", &self.spot_position),
            ("spotLightDirection", &self.spot_direction),
            ("spotLightColor", &self.spot_color),
            ("spotLightAttenuation", &self.spot_attenuation),
            ("spotLightCone", &self.spot_cone),
            ("areaLightPosition", &self.area_position),
            ("areaLightColor", &self.area_color),
            ("areaLightHalfWidth", &self.area_half_width),
            ("areaLightHalfHeight", &self.area_half_height),
        ];
        std::iter::once(("ambientLightColor", UniformValue::Vec3(self.ambient))).chain(
            arrays
                .into_iter()
                .filter(|(_, array)| !array.is_empty())
                .map(|(name, array)| (name, UniformValue::Floats(array.clone()))),
        )
    }
}

#[derive(Debug, Clone, Copy)]
struct CollectedLight {
    kind: LightKind,
    radiance: Vec3,
    world: Affine3A,
}

/// Per-frame light collector.
#[derive(Debug)]
pub struct LightAggregator {
    max_per_type: usize,
    collected: Vec<CollectedLight>,
    ambient: Vec3,
    counts: LightCounts,
    dropped: usize,
    uniforms: LightUniforms,
}

impl Default for LightAggregator {
    fn default() -> Self {
        Self::new(usize::MAX)
    }
}

fn push3(out: &mut Vec<f32>, v: Vec3) {
    out.extend_from_slice(&v.to_array());
}

impl LightAggregator {
    /// `max_per_type` caps each non-ambient kind; extra lights are dropped.
    #[must_use]
    pub fn new(max_per_type: usize) -> Self {
        Self {
            max_per_type,
            collected: Vec::new(),
            ambient: Vec3::ZERO,
            counts: LightCounts::default(),
            dropped: 0,
            uniforms: LightUniforms::default(),
        }
    }

    pub fn reset(&mut self) {
        self.collected.clear();
        self.ambient = Vec3::ZERO;
        self.counts = LightCounts::default();
        self.dropped = 0;
    }

    /// Records `light` owned by a node with world transform `world`.
    /// Returns `false` when the per-type limit dropped it.
    pub fn collect(&mut self, light: &Light, world: &Affine3A) -> bool {
        let slot = match light.kind {
            LightKind::Ambient => {
                self.ambient += light.radiance();
                return true;
            }
            LightKind::Directional => &mut self.counts.directional,
            LightKind::Point(_) => &mut self.counts.point,
            LightKind::Spot(_) => &mut self.counts.spot,
            LightKind::Area(_) => &mut self.counts.area,
        };
        if *slot >= self.max_per_type {
            self.dropped += 1;
            return false;
        }
        *slot += 1;
        self.collected.push(CollectedLight {
            kind: light.kind,
            radiance: light.radiance(),
            world: *world,
        });
        true
    }

    /// Packs the collected lights into view-space uniform arrays.
    pub fn finalize(&mut self, view: &Mat4) {
        if self.dropped > 0 {
            log::warn!(
                "{} light(s) dropped: more than {} of one kind in the scene",
                self.dropped,
                self.max_per_type
            );
        }

        let u = &mut self.uniforms;
        u.clear();
        u.ambient = self.ambient;

        for light in &self.collected {
            let world = light.world;
            let position = view.transform_point3(world.transform_point3(Vec3::ZERO));
            let to_light = view.transform_vector3(world.transform_vector3(Vec3::Z)).normalize_or_zero();

            match light.kind {
                LightKind::Ambient => {}
                LightKind::Directional => {
                    push3(&mut u.directional_direction, to_light);
                    push3(&mut u.directional_color, light.radiance);
                }
                LightKind::Point(point) => {
                    push3(&mut u.point_position, position);
                    push3(&mut u.point_color, light.radiance);
                    u.point_attenuation.extend_from_slice(&[point.range, point.decay]);
                }
                LightKind::Spot(spot) => {
                    push3(&mut u.spot_position, position);
                    push3(&mut u.spot_direction, to_light);
                    push3(&mut u.spot_color, light.radiance);
                    u.spot_attenuation.extend_from_slice(&[spot.range, spot.decay]);
                    u.spot_cone.extend_from_slice(&[spot.inner_cone.cos(), spot.outer_cone.cos()]);
                }
                LightKind::Area(area) => {
                    let half_width = world.transform_vector3(Vec3::X * (area.width * 0.5));
                    let half_height = world.transform_vector3(Vec3::Y * (area.height * 0.5));
                    push3(&mut u.area_position, position);
                    push3(&mut u.area_color, light.radiance);
                    push3(&mut u.area_half_width, view.transform_vector3(half_width));
                    push3(&mut u.area_half_height, view.transform_vector3(half_height));
                }
            }
        }
    }

    #[inline]
    #[must_use]
    pub fn counts(&self) -> LightCounts {
        self.counts
    }

    #[inline]
    #[must_use]
    pub fn uniforms(&self) -> &LightUniforms {
        &self.uniforms
    }

    #[inline]
    #[must_use]
    pub fn ambient(&self) -> Vec3 {
        self.ambient
    }

    pub fn set_max_per_type(&mut self, max_per_type: usize) {
        self.max_per_type = max_per_type;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    const EPSILON: f32 = 1e-5;

    #[test]
    fn ambient_lights_are_summed() {
        let mut lights = LightAggregator::default();
        lights.collect(&Light::new_ambient(Vec3::ONE, 0.25), &Affine3A::IDENTITY);
        lights.collect(&Light::new_ambient(Vec3::X, 1.0), &Affine3A::IDENTITY);
        lights.finalize(&Mat4::IDENTITY);

        assert!(lights.uniforms().ambient.abs_diff_eq(Vec3::new(1.25, 0.25, 0.25), EPSILON));
        assert_eq!(lights.counts().total(), 0);
    }

    #[test]
    fn directional_points_toward_light() {
        // Node rotated so its -Z faces straight down: light comes from above.
        let world = Affine3A::from_quat(Quat::from_rotation_x(-std::f32::consts::FRAC_PI_2));
        let mut lights = LightAggregator::default();
        lights.collect(&Light::new_directional(Vec3::ONE, 2.0), &world);
        lights.finalize(&Mat4::IDENTITY);

        let u = lights.uniforms();
        let dir = Vec3::from_slice(&u.directional_direction);
        assert!(dir.abs_diff_eq(Vec3::Y, EPSILON), "{dir}");
        assert_eq!(u.directional_color, vec![2.0, 2.0, 2.0]);
    }

    #[test]
    fn limit_drops_excess_lights() {
        let mut lights = LightAggregator::new(1);
        let light = Light::new_point(Vec3::ONE, 1.0, 10.0);
        assert!(lights.collect(&light, &Affine3A::IDENTITY));
        assert!(!lights.collect(&light, &Affine3A::IDENTITY));
        assert_eq!(lights.counts().point, 1);
    }

    #[test]
    fn positions_are_in_view_space() {
        let world = Affine3A::from_translation(Vec3::new(0.0, 0.0, -5.0));
        let view = Mat4::from_translation(Vec3::new(0.0, 0.0, -1.0));
        let mut lights = LightAggregator::default();
        lights.collect(&Light::new_point(Vec3::ONE, 1.0, 0.0), &world);
        lights.finalize(&view);

        assert_eq!(lights.uniforms().point_position, vec![0.0, 0.0, -6.0]);
    }
}
