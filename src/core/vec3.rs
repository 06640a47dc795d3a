//! 3D Vector and View Rotation
//!
//! Plain geometric values shared by the physics, combat and match layers.
//! Nothing engine-specific crosses module boundaries; only these types do.

use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};
use serde::{Serialize, Deserialize};

/// 3D vector in world units. Y is up.
#[derive(Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    /// X component
    pub x: f32,
    /// Y component (vertical)
    pub y: f32,
    /// Z component
    pub z: f32,
}

impl Vec3 {
    /// Zero vector
    pub const ZERO: Self = Self { x: 0.0, y: 0.0, z: 0.0 };

    /// Unit up vector
    pub const UP: Self = Self { x: 0.0, y: 1.0, z: 0.0 };

    /// Unit down vector
    pub const DOWN: Self = Self { x: 0.0, y: -1.0, z: 0.0 };

    /// Create a new vector.
    #[inline]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Add two vectors.
    #[inline]
    pub fn add(self, other: Self) -> Self {
        Self::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    /// Subtract two vectors.
    #[inline]
    pub fn sub(self, other: Self) -> Self {
        Self::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    /// Multiply by scalar.
    #[inline]
    pub fn scale(self, s: f32) -> Self {
        Self::new(self.x * s, self.y * s, self.z * s)
    }

    /// Dot product.
    #[inline]
    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Squared length. Prefer this over `length` for comparisons.
    #[inline]
    pub fn length_squared(self) -> f32 {
        self.dot(self)
    }

    /// Length (magnitude).
    #[inline]
    pub fn length(self) -> f32 {
        self.length_squared().sqrt()
    }

    /// Squared distance to another point.
    #[inline]
    pub fn distance_squared(self, other: Self) -> f32 {
        self.sub(other).length_squared()
    }

    /// Euclidean distance to another point.
    #[inline]
    pub fn distance(self, other: Self) -> f32 {
        self.sub(other).length()
    }

    /// Normalize to unit length. Returns ZERO for a zero-length vector.
    #[inline]
    pub fn normalize(self) -> Self {
        let len = self.length();
        if len <= f32::EPSILON {
            return Self::ZERO;
        }
        self.scale(1.0 / len)
    }

    /// Linear interpolation. t = 0 returns self, t = 1 returns other.
    #[inline]
    pub fn lerp(self, other: Self, t: f32) -> Self {
        self.add(other.sub(self).scale(t))
    }

    /// Move from self toward `target` by at most `max_distance`.
    ///
    /// Returns `target` verbatim when it is within reach.
    pub fn move_towards(self, target: Self, max_distance: f32) -> Self {
        let distance = self.distance(target);
        if distance <= max_distance || distance <= f32::EPSILON {
            return target;
        }
        self.lerp(target, max_distance / distance)
    }

    /// True if every component is finite.
    #[inline]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Horizontal (XZ) part of the vector.
    #[inline]
    pub fn horizontal(self) -> Self {
        Self::new(self.x, 0.0, self.z)
    }

    /// Components as an array.
    #[inline]
    pub fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }
}

impl Add for Vec3 {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        Vec3::add(self, rhs)
    }
}

impl Sub for Vec3 {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Vec3::sub(self, rhs)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Self;
    #[inline]
    fn mul(self, rhs: f32) -> Self {
        self.scale(rhs)
    }
}

impl Neg for Vec3 {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        self.scale(-1.0)
    }
}

impl fmt::Debug for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vec3({:.3}, {:.3}, {:.3})", self.x, self.y, self.z)
    }
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3}, {:.3})", self.x, self.y, self.z)
    }
}

/// View rotation (radians). Pitch is clamped to straight up/down.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rotation {
    /// Vertical look angle
    pub pitch: f32,
    /// Horizontal look angle
    pub yaw: f32,
}

impl Rotation {
    /// Create a rotation, clamping pitch and wrapping yaw into [-PI, PI].
    pub fn new(pitch: f32, yaw: f32) -> Self {
        use std::f32::consts::{FRAC_PI_2, PI, TAU};
        let pitch = pitch.clamp(-FRAC_PI_2, FRAC_PI_2);
        let mut yaw = yaw % TAU;
        if yaw > PI {
            yaw -= TAU;
        } else if yaw < -PI {
            yaw += TAU;
        }
        Self { pitch, yaw }
    }

    /// True if both angles are finite.
    pub fn is_finite(self) -> bool {
        self.pitch.is_finite() && self.yaw.is_finite()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec3_arithmetic() {
        let a = Vec3::new(1.0, 2.0, 3.0);
        let b = Vec3::new(4.0, 5.0, 6.0);
        assert_eq!(a + b, Vec3::new(5.0, 7.0, 9.0));
        assert_eq!(b - a, Vec3::new(3.0, 3.0, 3.0));
        assert_eq!(a * 2.0, Vec3::new(2.0, 4.0, 6.0));
        assert_eq!(-a, Vec3::new(-1.0, -2.0, -3.0));
        assert_eq!(a.dot(b), 32.0);
    }

    #[test]
    fn test_vec3_length() {
        let v = Vec3::new(3.0, 4.0, 0.0);
        assert_eq!(v.length_squared(), 25.0);
        assert!((v.length() - 5.0).abs() < 1e-6);
        assert!((Vec3::ZERO.distance(v) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_vec3_normalize() {
        let n = Vec3::new(0.0, 0.0, 10.0).normalize();
        assert!((n.length() - 1.0).abs() < 1e-6);
        assert_eq!(Vec3::ZERO.normalize(), Vec3::ZERO);
    }

    #[test]
    fn test_move_towards_within_reach() {
        let from = Vec3::ZERO;
        let to = Vec3::new(0.5, 0.0, 0.0);
        assert_eq!(from.move_towards(to, 1.0), to);
    }

    #[test]
    fn test_move_towards_clamps() {
        let from = Vec3::ZERO;
        let to = Vec3::new(10.0, 0.0, 0.0);
        let moved = from.move_towards(to, 2.0);
        assert!((moved.x - 2.0).abs() < 1e-5);
        assert_eq!(moved.y, 0.0);
    }

    #[test]
    fn test_is_finite() {
        assert!(Vec3::new(1.0, 2.0, 3.0).is_finite());
        assert!(!Vec3::new(f32::NAN, 0.0, 0.0).is_finite());
        assert!(!Vec3::new(0.0, f32::INFINITY, 0.0).is_finite());
    }

    #[test]
    fn test_rotation_normalizes() {
        let r = Rotation::new(3.0, 4.0);
        assert!((r.pitch - std::f32::consts::FRAC_PI_2).abs() < 1e-6);
        assert!(r.yaw <= std::f32::consts::PI && r.yaw >= -std::f32::consts::PI);
    }
}
