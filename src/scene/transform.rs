use glam::{Affine3A, EulerRot, Mat3, Quat, Vec3};

/// Which rotation representation currently holds the authoritative value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RotationSync {
    /// Quaternion and Euler angles agree.
    Synced,
    /// The Euler angles were written last; the quaternion is derived on read.
    QuatStale,
    /// The quaternion was written last; the Euler angles are derived on read.
    EulerStale,
}

/// Local transform of a scene node.
///
/// Holds position, rotation (as a quaternion and as Euler angles, kept in
/// sync lazily), scale and an optional pivot, plus the cached local matrix.
/// Every setter marks the local matrix dirty; [`Transform::refresh_local_matrix`]
/// recomposes it only when something changed.
///
/// The local matrix is `T(position) * T(pivot) * R * S * T(-pivot)`.
#[derive(Debug, Clone)]
pub struct Transform {
    position: Vec3,
    scale: Vec3,
    pivot: Vec3,

    quaternion: Quat,
    euler: Vec3,
    euler_order: EulerRot,
    sync: RotationSync,

    local_matrix: Affine3A,
    dirty: bool,
    revision: u64,
}

impl Transform {
    #[must_use]
    pub fn new() -> Self {
        Self {
            position: Vec3::ZERO,
            scale: Vec3::ONE,
            pivot: Vec3::ZERO,
            quaternion: Quat::IDENTITY,
            euler: Vec3::ZERO,
            euler_order: EulerRot::XYZ,
            sync: RotationSync::Synced,
            local_matrix: Affine3A::IDENTITY,
            dirty: true,
            revision: 0,
        }
    }

    // ========================================================================
    // Setters
    // ========================================================================

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.dirty = true;
    }

    pub fn set_scale(&mut self, scale: Vec3) {
        self.scale = scale;
        self.dirty = true;
    }

    pub fn set_pivot(&mut self, pivot: Vec3) {
        self.pivot = pivot;
        self.dirty = true;
    }

    /// Sets the rotation from a quaternion. The Euler angles become stale.
    pub fn set_rotation(&mut self, rotation: Quat) {
        self.quaternion = rotation.normalize();
        self.sync = RotationSync::EulerStale;
        self.dirty = true;
    }

    /// Sets the rotation from Euler angles (radians) in the current order.
    /// The quaternion becomes stale.
    pub fn set_rotation_euler(&mut self, euler: Vec3) {
        self.euler = euler;
        self.sync = RotationSync::QuatStale;
        self.dirty = true;
    }

    /// Changes the Euler order, keeping the represented rotation.
    pub fn set_euler_order(&mut self, order: EulerRot) {
        let rotation = self.rotation();
        self.euler_order = order;
        self.quaternion = rotation;
        self.sync = RotationSync::EulerStale;
    }

    /// Forces the next [`Self::refresh_local_matrix`] to recompose.
    #[inline]
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    // ========================================================================
    // Getters
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn position(&self) -> Vec3 {
        self.position
    }

    #[inline]
    #[must_use]
    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    #[inline]
    #[must_use]
    pub fn pivot(&self) -> Vec3 {
        self.pivot
    }

    #[inline]
    #[must_use]
    pub fn euler_order(&self) -> EulerRot {
        self.euler_order
    }

    /// Current rotation as a quaternion, derived from the Euler angles if
    /// they were written last.
    #[must_use]
    pub fn rotation(&self) -> Quat {
        match self.sync {
            RotationSync::QuatStale => Quat::from_euler(
                self.euler_order,
                self.euler.x,
                self.euler.y,
                self.euler.z,
            ),
            RotationSync::Synced | RotationSync::EulerStale => self.quaternion,
        }
    }

    /// Current rotation as Euler angles, derived from the quaternion if it
    /// was written last.
    #[must_use]
    pub fn rotation_euler(&self) -> Vec3 {
        match self.sync {
            RotationSync::EulerStale => {
                let (x, y, z) = self.quaternion.to_euler(self.euler_order);
                Vec3::new(x, y, z)
            }
            RotationSync::Synced | RotationSync::QuatStale => self.euler,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Number of times the local matrix has been recomposed.
    #[inline]
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Cached local matrix. May be stale while [`Self::is_dirty`] is set.
    #[inline]
    #[must_use]
    pub fn local_matrix(&self) -> &Affine3A {
        &self.local_matrix
    }

    // ========================================================================
    // Matrix maintenance
    // ========================================================================

    /// Writes the stale rotation representation back so both agree.
    pub fn sync_rotation(&mut self) {
        match self.sync {
            RotationSync::Synced => {}
            RotationSync::QuatStale => self.quaternion = self.rotation(),
            RotationSync::EulerStale => self.euler = self.rotation_euler(),
        }
        self.sync = RotationSync::Synced;
    }

    /// Recomposes the local matrix if any component changed.
    ///
    /// Returns whether the matrix was recomposed.
    pub fn refresh_local_matrix(&mut self) -> bool {
        if !self.dirty {
            return false;
        }

        self.sync_rotation();
        let srt = Affine3A::from_scale_rotation_translation(
            self.scale,
            self.quaternion,
            self.position,
        );
        self.local_matrix = if self.pivot == Vec3::ZERO {
            srt
        } else {
            Affine3A::from_translation(self.pivot) * srt * Affine3A::from_translation(-self.pivot)
        };

        self.dirty = false;
        self.revision += 1;
        true
    }

    /// Replaces position, rotation and scale by decomposing `mat`.
    ///
    /// Shear is lost in the decomposition. The pivot is reset.
    pub fn apply_local_matrix(&mut self, mat: Affine3A) {
        let (scale, rotation, translation) = mat.to_scale_rotation_translation();
        self.position = translation;
        self.scale = scale;
        self.pivot = Vec3::ZERO;
        self.quaternion = rotation;
        self.sync = RotationSync::EulerStale;
        self.dirty = true;
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::new()
    }
}

/// Rotation whose -Z axis points from `eye` towards `target`.
///
/// When `forward` is parallel to `up`, world +Z and then world +X are tried
/// as the up hint. Returns `None` for a zero-length direction.
#[must_use]
pub fn look_at_rotation(eye: Vec3, target: Vec3, up: Vec3) -> Option<Quat> {
    const PARALLEL_EPSILON: f32 = 1e-6;

    let forward = (target - eye).try_normalize()?;

    let up = [up, Vec3::Z, Vec3::X]
        .into_iter()
        .filter_map(Vec3::try_normalize)
        .find(|candidate| forward.cross(*candidate).length_squared() > PARALLEL_EPSILON)?;

    let right = forward.cross(up).normalize();
    let new_up = right.cross(forward).normalize();
    Some(Quat::from_mat3(&Mat3::from_cols(right, new_up, -forward)))
}
