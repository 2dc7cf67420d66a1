//! Two-dimensional vector math and infinite lines.
//!
//! [`Vector2`] wraps a [`glam::DVec2`] and keeps its Euclidean norm cached.
//! Every mutation goes through a method that recomputes the norm, so
//! [`Vector2::norm`] is never stale. [`Line`] is an infinite line in
//! implicit form `a·x + b·y + c = 0`, used by line magnets.

use std::fmt;
use std::ops::{Add, AddAssign, Mul, MulAssign, Neg, Sub, SubAssign};

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::error::{reject, SimError};

/// A 2D vector with a cached norm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Vector2 {
    v: DVec2,
    norm: f64,
}

impl Vector2 {
    /// The zero vector.
    pub const ZERO: Vector2 = Vector2 {
        v: DVec2::ZERO,
        norm: 0.0,
    };

    /// Creates a vector from its coordinates.
    pub fn new(x: f64, y: f64) -> Self {
        DVec2::new(x, y).into()
    }

    pub fn x(&self) -> f64 {
        self.v.x
    }

    pub fn y(&self) -> f64 {
        self.v.y
    }

    /// Euclidean norm, always consistent with the current coordinates.
    pub fn norm(&self) -> f64 {
        self.norm
    }

    pub fn norm_squared(&self) -> f64 {
        self.v.length_squared()
    }

    /// Replaces both coordinates.
    pub fn set(&mut self, x: f64, y: f64) {
        *self = Self::new(x, y);
    }

    pub fn set_x(&mut self, x: f64) {
        self.set(x, self.v.y);
    }

    pub fn set_y(&mut self, y: f64) {
        self.set(self.v.x, y);
    }

    pub fn dot(&self, other: Vector2) -> f64 {
        self.v.dot(other.v)
    }

    /// Component-wise product.
    pub fn mul_components(&self, other: Vector2) -> Vector2 {
        (self.v * other.v).into()
    }

    /// Unit vector with the same direction. The zero vector normalizes to zero.
    pub fn normalized(&self) -> Vector2 {
        if self.norm == 0.0 {
            return Self::ZERO;
        }
        (self.v / self.norm).into()
    }

    /// Same direction, rescaled to `magnitude`.
    pub fn with_norm(&self, magnitude: f64) -> Vector2 {
        self.normalized() * magnitude
    }

    /// Distance between two points.
    pub fn distance(&self, other: Vector2) -> f64 {
        self.v.distance(other.v)
    }

    pub fn as_dvec2(&self) -> DVec2 {
        self.v
    }
}

impl Default for Vector2 {
    fn default() -> Self {
        Self::ZERO
    }
}

impl From<DVec2> for Vector2 {
    fn from(v: DVec2) -> Self {
        Self {
            v,
            norm: v.length(),
        }
    }
}

impl From<[f64; 2]> for Vector2 {
    fn from([x, y]: [f64; 2]) -> Self {
        Self::new(x, y)
    }
}

impl From<(f64, f64)> for Vector2 {
    fn from((x, y): (f64, f64)) -> Self {
        Self::new(x, y)
    }
}

impl From<Vector2> for [f64; 2] {
    fn from(v: Vector2) -> Self {
        [v.v.x, v.v.y]
    }
}

impl fmt::Display for Vector2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.v.x, self.v.y)
    }
}

impl Add for Vector2 {
    type Output = Vector2;
    fn add(self, rhs: Vector2) -> Vector2 {
        (self.v + rhs.v).into()
    }
}

impl Sub for Vector2 {
    type Output = Vector2;
    fn sub(self, rhs: Vector2) -> Vector2 {
        (self.v - rhs.v).into()
    }
}

impl Mul<f64> for Vector2 {
    type Output = Vector2;
    fn mul(self, rhs: f64) -> Vector2 {
        (self.v * rhs).into()
    }
}

impl Neg for Vector2 {
    type Output = Vector2;
    fn neg(self) -> Vector2 {
        (-self.v).into()
    }
}

impl AddAssign for Vector2 {
    fn add_assign(&mut self, rhs: Vector2) {
        *self = *self + rhs;
    }
}

impl SubAssign for Vector2 {
    fn sub_assign(&mut self, rhs: Vector2) {
        *self = *self - rhs;
    }
}

impl MulAssign<f64> for Vector2 {
    fn mul_assign(&mut self, rhs: f64) {
        *self = *self * rhs;
    }
}

/// An infinite line `a·x + b·y + c = 0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Line {
    a: f64,
    b: f64,
    c: f64,
}

impl Line {
    /// Builds a line from its implicit coefficients.
    ///
    /// Returns `SimError::DegenerateLine` when `a` and `b` are both zero.
    pub fn from_coefficients(a: f64, b: f64, c: f64) -> Result<Self, SimError> {
        if a == 0.0 && b == 0.0 {
            return reject(SimError::DegenerateLine);
        }
        Ok(Self { a, b, c })
    }

    /// Builds the line passing through two distinct points.
    pub fn through(p1: Vector2, p2: Vector2) -> Result<Self, SimError> {
        let dir = p2 - p1;
        let a = dir.y();
        let b = -dir.x();
        Self::from_coefficients(a, b, -(a * p1.x() + b * p1.y()))
    }

    /// The vertical line `x = x0`.
    pub fn vertical(x0: f64) -> Self {
        Self {
            a: -1.0,
            b: 0.0,
            c: x0,
        }
    }

    /// The horizontal line `y = y0`.
    pub fn horizontal(y0: f64) -> Self {
        Self {
            a: 0.0,
            b: -1.0,
            c: y0,
        }
    }

    pub fn coefficients(&self) -> (f64, f64, f64) {
        (self.a, self.b, self.c)
    }

    /// Unit normal vector.
    pub fn normal(&self) -> Vector2 {
        Vector2::new(self.a, self.b).normalized()
    }

    /// Unit direction vector.
    pub fn director(&self) -> Vector2 {
        Vector2::new(-self.b, self.a).normalized()
    }

    /// Some point lying on the line.
    pub fn anchor(&self) -> Vector2 {
        if self.b != 0.0 {
            Vector2::new(0.0, -self.c / self.b)
        } else {
            Vector2::new(-self.c / self.a, 0.0)
        }
    }

    /// Signed residual of the implicit equation at `point`.
    pub fn residual(&self, point: Vector2) -> f64 {
        self.a * point.x() + self.b * point.y() + self.c
    }

    /// Orthogonal projection of `point` onto the line.
    pub fn project(&self, point: Vector2) -> Vector2 {
        let dir = self.director();
        let anchor = self.anchor();
        dir * dir.dot(point - anchor) + anchor
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.a, self.b, self.c)
    }
}
