use std::sync::atomic::{AtomicU64, Ordering};

use glam::Vec3;
use uuid::Uuid;

static NEXT_LIGHT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    /// Distance at which the contribution reaches zero; `0.0` means unbounded.
    pub range: f32,
    pub decay: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpotLight {
    pub range: f32,
    pub decay: f32,
    /// Full-intensity cone half-angle, radians.
    pub inner_cone: f32,
    /// Cutoff cone half-angle, radians.
    pub outer_cone: f32,
}

/// Rectangular emitter in the node's local XY plane, facing -Z.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AreaLight {
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightKind {
    /// Uniform, position-independent contribution.
    Ambient,
    /// Shines along the node's -Z axis.
    Directional,
    Point(PointLight),
    Spot(SpotLight),
    Area(AreaLight),
}

/// Light component. Position and direction come from the owning node.
#[derive(Debug, Clone)]
pub struct Light {
    pub uuid: Uuid,
    pub id: u64,
    pub color: Vec3,
    pub intensity: f32,
    pub kind: LightKind,
}

impl Light {
    fn with_kind(color: Vec3, intensity: f32, kind: LightKind) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            id: NEXT_LIGHT_ID.fetch_add(1, Ordering::Relaxed),
            color,
            intensity,
            kind,
        }
    }

    #[must_use]
    pub fn new_ambient(color: Vec3, intensity: f32) -> Self {
        Self::with_kind(color, intensity, LightKind::Ambient)
    }

    #[must_use]
    pub fn new_directional(color: Vec3, intensity: f32) -> Self {
        Self::with_kind(color, intensity, LightKind::Directional)
    }

    #[must_use]
    pub fn new_point(color: Vec3, intensity: f32, range: f32) -> Self {
        Self::with_kind(color, intensity, LightKind::Point(PointLight { range, decay: 2.0 }))
    }

    #[must_use]
    pub fn new_spot(color: Vec3, intensity: f32, range: f32, inner_cone: f32, outer_cone: f32) -> Self {
        Self::with_kind(
            color,
            intensity,
            LightKind::Spot(SpotLight {
                range,
                decay: 2.0,
                inner_cone,
                outer_cone,
            }),
        )
    }

    #[must_use]
    pub fn new_area(color: Vec3, intensity: f32, width: f32, height: f32) -> Self {
        Self::with_kind(color, intensity, LightKind::Area(AreaLight { width, height }))
    }

    /// Color premultiplied by intensity, as uploaded to shaders.
    #[inline]
    #[must_use]
    pub fn radiance(&self) -> Vec3 {
        self.color * self.intensity
    }
}
