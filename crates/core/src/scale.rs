//! Per-axis affine maps between coordinate intervals.
//!
//! A [`LinearScale`] maps `X` to `A * X + B` component-wise. The system uses
//! three of them: external blob coordinates into the simulation bounds,
//! simulation bounds into the output range, and simulation bounds into the
//! fluid solver's range.

use serde::{Deserialize, Serialize};

use crate::vector::Vector2;

/// An axis-aligned rectangle given by its lower-left and upper-right corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: Vector2,
    pub max: Vector2,
}

impl Bounds {
    pub fn new(min: Vector2, max: Vector2) -> Self {
        Self { min, max }
    }

    /// The unit square `[0, 1]²`, the default simulation space.
    pub fn unit() -> Self {
        Self::new(Vector2::new(0.0, 0.0), Vector2::new(1.0, 1.0))
    }

    /// The square `[-1, 1]²`, the default output space.
    pub fn symmetric() -> Self {
        Self::new(Vector2::new(-1.0, -1.0), Vector2::new(1.0, 1.0))
    }

    /// Extent along each axis.
    pub fn span(&self) -> Vector2 {
        self.max - self.min
    }

    pub fn center(&self) -> Vector2 {
        (self.min + self.max) * 0.5
    }

    pub fn contains(&self, p: Vector2) -> bool {
        p.x() >= self.min.x() && p.x() <= self.max.x() && p.y() >= self.min.y() && p.y() <= self.max.y()
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::unit()
    }
}

/// Affine map `Y = A * X + B`, computed independently for each axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearScale {
    a: Vector2,
    b: Vector2,
}

impl LinearScale {
    /// Builds the map sending `from` onto `to`, corner to corner.
    ///
    /// An axis with a zero-width source or destination collapses to the
    /// destination minimum.
    pub fn new(from: Bounds, to: Bounds) -> Self {
        let (ax, bx) = axis_coefficients(from.min.x(), from.max.x(), to.min.x(), to.max.x());
        let (ay, by) = axis_coefficients(from.min.y(), from.max.y(), to.min.y(), to.max.y());
        Self {
            a: Vector2::new(ax, ay),
            b: Vector2::new(bx, by),
        }
    }

    /// The identity map.
    pub fn identity() -> Self {
        Self {
            a: Vector2::new(1.0, 1.0),
            b: Vector2::ZERO,
        }
    }

    /// Applies the map to a point.
    pub fn apply(&self, x: Vector2) -> Vector2 {
        x.mul_components(self.a) + self.b
    }

    /// Applies the map to every point of a slice.
    pub fn apply_all(&self, points: &[Vector2]) -> Vec<Vector2> {
        points.iter().map(|&p| self.apply(p)).collect()
    }

    /// Slope and intercept as `(A, B)`.
    pub fn coefficients(&self) -> (Vector2, Vector2) {
        (self.a, self.b)
    }
}

impl Default for LinearScale {
    fn default() -> Self {
        Self::identity()
    }
}

fn axis_coefficients(from_min: f64, from_max: f64, to_min: f64, to_max: f64) -> (f64, f64) {
    if from_min == from_max || to_min == to_max {
        return (0.0, to_min);
    }
    let a = (to_max - to_min) / (from_max - from_min);
    (a, to_min - a * from_min)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-12;

    fn close(a: Vector2, b: Vector2) -> bool {
        (a - b).norm() < EPS
    }

    #[test]
    fn maps_corners_onto_corners() {
        let scale = LinearScale::new(Bounds::unit(), Bounds::symmetric());
        assert!(close(scale.apply(Vector2::new(0.0, 0.0)), Vector2::new(-1.0, -1.0)));
        assert!(close(scale.apply(Vector2::new(1.0, 1.0)), Vector2::new(1.0, 1.0)));
        assert!(close(scale.apply(Vector2::new(0.5, 0.25)), Vector2::new(0.0, -0.5)));
    }

    #[test]
    fn handles_nonzero_source_minimum() {
        let from = Bounds::new(Vector2::new(100.0, 200.0), Vector2::new(740.0, 680.0));
        let scale = LinearScale::new(from, Bounds::unit());
        assert!(close(scale.apply(Vector2::new(420.0, 440.0)), Vector2::new(0.5, 0.5)));
    }

    #[test]
    fn inverted_destination_flips_axis() {
        let to = Bounds::new(Vector2::new(0.0, 1.0), Vector2::new(1.0, 0.0));
        let scale = LinearScale::new(Bounds::unit(), to);
        assert!(close(scale.apply(Vector2::new(0.2, 0.2)), Vector2::new(0.2, 0.8)));
    }

    #[test]
    fn degenerate_axis_collapses_to_destination_minimum() {
        let from = Bounds::new(Vector2::new(0.0, 3.0), Vector2::new(1.0, 3.0));
        let scale = LinearScale::new(from, Bounds::symmetric());
        let y = scale.apply(Vector2::new(0.5, 42.0)).y();
        assert!((y + 1.0).abs() < EPS);
    }

    #[test]
    fn apply_all_preserves_order() {
        let scale = LinearScale::new(Bounds::unit(), Bounds::symmetric());
        let out = scale.apply_all(&[Vector2::new(0.0, 0.0), Vector2::new(1.0, 0.0)]);
        assert_eq!(out.len(), 2);
        assert!(close(out[1], Vector2::new(1.0, -1.0)));
    }

    #[test]
    fn bounds_center_and_span() {
        let b = Bounds::symmetric();
        assert!(close(b.center(), Vector2::ZERO));
        assert!(close(b.span(), Vector2::new(2.0, 2.0)));
        assert!(b.contains(Vector2::new(1.0, -1.0)));
        assert!(!b.contains(Vector2::new(1.1, 0.0)));
    }
}
