//! Persistent inverse-square force sources.
//!
//! A magnet pulls every particle with `F = -k / d² · unit(p - m)` where `m` is
//! the magnet position (or, for a line magnet, the orthogonal projection of
//! the particle onto the line). User-facing forces are divided by
//! [`FORCE_WEIGHT`] on the way in so that sensible settings are whole numbers.

use std::collections::BTreeMap;
use std::fmt;

use parking_lot::RwLock;

use crate::error::{reject, SimError};
use crate::selection::Selection;
use crate::vector::{Line, Vector2};

/// Divider applied to every user-supplied magnet force.
pub const FORCE_WEIGHT: f64 = 1000.0;

/// Below this distance the direction is undefined and no force is produced.
const SINGULARITY_EPS: f64 = 1e-10;

/// Distances are floored here so that a particle grazing a magnet does not
/// receive an unbounded kick.
const MIN_DISTANCE: f64 = 1e-3;

/// Inverse-square pull of `source` on `target` with constant `k`.
///
/// Returns zero when the two points coincide.
pub fn inverse_square(target: Vector2, source: Vector2, k: f64) -> Vector2 {
    let dir = target - source;
    let d = dir.norm();
    if d < SINGULARITY_EPS {
        return Vector2::ZERO;
    }
    let d = d.max(MIN_DISTANCE);
    dir.normalized() * (-k / (d * d))
}

// ---------------------------------------------------------------------------
// Magnet
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MagnetShape {
    Point(Vector2),
    Line(Line),
}

impl MagnetShape {
    /// The point of the shape that attracts `target`.
    pub fn pole_for(&self, target: Vector2) -> Vector2 {
        match self {
            MagnetShape::Point(p) => *p,
            MagnetShape::Line(line) => line.project(target),
        }
    }
}

/// A point or line attractor with separate strengths for grid and free
/// particles. Strengths are stored already divided by [`FORCE_WEIGHT`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Magnet {
    shape: MagnetShape,
    force_on_grid: f64,
    force_on_free: f64,
}

impl Magnet {
    /// Magnet acting with `force_on_grid` on grid particles and
    /// `force_on_free` on free ones, both in user units.
    pub fn new(shape: MagnetShape, force_on_grid: f64, force_on_free: f64) -> Self {
        Self {
            shape,
            force_on_grid: force_on_grid / FORCE_WEIGHT,
            force_on_free: force_on_free / FORCE_WEIGHT,
        }
    }

    pub fn point(position: Vector2, force: f64) -> Self {
        Self::new(MagnetShape::Point(position), force, force)
    }

    pub fn line(line: Line, force: f64) -> Self {
        Self::new(MagnetShape::Line(line), force, force)
    }

    pub fn shape(&self) -> MagnetShape {
        self.shape
    }

    /// Stored strength for grid particles, already weighted.
    pub fn force_on_grid(&self) -> f64 {
        self.force_on_grid
    }

    /// Stored strength for free particles, already weighted.
    pub fn force_on_free(&self) -> f64 {
        self.force_on_free
    }

    /// Sets both strengths, in user units.
    pub fn set_force(&mut self, force: f64) {
        self.force_on_grid = force / FORCE_WEIGHT;
        self.force_on_free = force / FORCE_WEIGHT;
    }

    /// Force exerted on a particle at `position`.
    pub fn force_on(&self, position: Vector2, grid: bool) -> Vector2 {
        let k = if grid {
            self.force_on_grid
        } else {
            self.force_on_free
        };
        inverse_square(position, self.shape.pole_for(position), k)
    }
}

impl fmt::Display for Magnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.shape {
            MagnetShape::Point(p) => write!(f, "PointMagnet {p}")?,
            MagnetShape::Line(l) => write!(f, "LineMagnet {l}")?,
        }
        write!(
            f,
            " {} {}",
            self.force_on_grid * FORCE_WEIGHT,
            self.force_on_free * FORCE_WEIGHT
        )
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Magnets {
    by_index: BTreeMap<usize, Magnet>,
    enabled: bool,
}

/// Thread-safe set of magnets keyed by index, with a global on/off switch.
#[derive(Debug)]
pub struct MagnetRegistry {
    inner: RwLock<Magnets>,
}

impl Default for MagnetRegistry {
    fn default() -> Self {
        Self {
            inner: RwLock::new(Magnets {
                by_index: BTreeMap::new(),
                enabled: true,
            }),
        }
    }
}

impl MagnetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Places `magnet` at `index`, replacing any previous one.
    pub fn set_magnet(&self, index: usize, magnet: Magnet) {
        self.inner.write().by_index.insert(index, magnet);
    }

    pub fn set_point_magnet(&self, index: usize, position: Vector2, force: f64) {
        self.set_magnet(index, Magnet::point(position, force));
    }

    pub fn set_line_magnet(&self, index: usize, line: Line, force: f64) {
        self.set_magnet(index, Magnet::line(line, force));
    }

    pub fn delete(&self, index: usize) -> Result<(), SimError> {
        match self.inner.write().by_index.remove(&index) {
            Some(_) => Ok(()),
            None => reject(SimError::UnknownMagnet(index)),
        }
    }

    /// Changes the strength of one magnet or of all of them.
    pub fn set_force(&self, selection: Selection, force: f64) -> Result<(), SimError> {
        let mut inner = self.inner.write();
        match selection {
            Selection::All => {
                for magnet in inner.by_index.values_mut() {
                    magnet.set_force(force);
                }
                Ok(())
            }
            Selection::Index(i) => match inner.by_index.get_mut(&i) {
                Some(magnet) => {
                    magnet.set_force(force);
                    Ok(())
                }
                None => reject(SimError::UnknownMagnet(i)),
            },
        }
    }

    /// Disabled magnets stay registered but exert no force.
    pub fn set_enabled(&self, enabled: bool) {
        self.inner.write().enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.read().enabled
    }

    pub fn get(&self, index: usize) -> Option<Magnet> {
        self.inner.read().by_index.get(&index).copied()
    }

    pub fn len(&self) -> usize {
        self.inner.read().by_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().by_index.is_empty()
    }

    /// Magnets to apply this tick. Empty when the registry is disabled.
    pub fn active(&self) -> Vec<Magnet> {
        let inner = self.inner.read();
        if !inner.enabled {
            return Vec::new();
        }
        inner.by_index.values().copied().collect()
    }

    /// Summed force of every active magnet on a particle at `position`.
    pub fn force_on(&self, position: Vector2, grid: bool) -> Vector2 {
        self.active()
            .iter()
            .fold(Vector2::ZERO, |acc, m| acc + m.force_on(position, grid))
    }

    pub fn info(&self, index: usize) -> String {
        match self.get(index) {
            Some(magnet) => magnet.to_string(),
            None => format!("There is no magnet n°{index}."),
        }
    }

    /// Registered indices, in ascending order.
    pub fn list(&self) -> String {
        let inner = self.inner.read();
        if inner.by_index.is_empty() {
            return "Currently, there is no magnet in this simulation.".to_string();
        }
        inner
            .by_index
            .keys()
            .fold(String::from("MagnetsIndexes"), |acc, i| format!("{acc} {i}"))
    }

    /// Removes every magnet. The enable switch is kept.
    pub fn reset(&self) {
        self.inner.write().by_index.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(x: f64, y: f64) -> Vector2 {
        Vector2::new(x, y)
    }

    #[test]
    fn point_magnet_pulls_toward_itself() {
        let m = Magnet::point(v(0.5, 0.5), 1.0);
        let f = m.force_on(v(0.7, 0.5), true);
        assert!(f.x() < 0.0);
        assert!(f.y().abs() < 1e-15);
        // k = 1/1000, d = 0.2
        assert!((f.norm() - 0.001 / 0.04).abs() < 1e-12);
    }

    #[test]
    fn negative_force_repels() {
        let m = Magnet::point(v(0.0, 0.0), -1.0);
        assert!(m.force_on(v(0.5, 0.0), false).x() > 0.0);
    }

    #[test]
    fn coincident_particle_feels_nothing() {
        let m = Magnet::point(v(0.3, 0.3), 100.0);
        assert_eq!(m.force_on(v(0.3, 0.3), true), Vector2::ZERO);
    }

    #[test]
    fn tiny_distance_is_floored() {
        let m = Magnet::point(v(0.0, 0.0), 1.0);
        let near = m.force_on(v(1e-6, 0.0), true).norm();
        let floor = m.force_on(v(MIN_DISTANCE, 0.0), true).norm();
        assert!((near - floor).abs() < 1e-9);
        assert!(near.is_finite());
    }

    #[test]
    fn grid_and_free_strengths_differ() {
        let m = Magnet::new(MagnetShape::Point(v(0.0, 0.0)), 2.0, 1.0);
        let p = v(0.1, 0.0);
        let grid = m.force_on(p, true).norm();
        let free = m.force_on(p, false).norm();
        assert!((grid - 2.0 * free).abs() < 1e-12);
    }

    #[test]
    fn line_magnet_pulls_perpendicular() {
        let m = Magnet::line(Line::vertical(0.5), 1.0);
        let f = m.force_on(v(0.8, 0.3), true);
        assert!(f.x() < 0.0);
        assert!(f.y().abs() < 1e-12);
    }

    #[test]
    fn set_force_divides_by_weight() {
        let mut m = Magnet::point(v(0.0, 0.0), 1.0);
        m.set_force(500.0);
        assert!((m.force_on_grid() - 0.5).abs() < 1e-15);
        assert!((m.force_on_free() - 0.5).abs() < 1e-15);
    }

    #[test]
    fn registry_replaces_and_deletes_by_index() {
        let reg = MagnetRegistry::new();
        reg.set_point_magnet(0, v(0.1, 0.1), 1.0);
        reg.set_point_magnet(0, v(0.9, 0.9), 1.0);
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get(0).unwrap().shape(), MagnetShape::Point(v(0.9, 0.9)));

        assert!(reg.delete(0).is_ok());
        assert_eq!(reg.delete(0), Err(SimError::UnknownMagnet(0)));
        assert!(reg.is_empty());
    }

    #[test]
    fn registry_set_force_all_and_unknown() {
        let reg = MagnetRegistry::new();
        reg.set_point_magnet(0, v(0.0, 0.0), 1.0);
        reg.set_line_magnet(2, Line::horizontal(0.5), 1.0);
        assert!(reg.set_force(Selection::All, 3000.0).is_ok());
        assert!((reg.get(2).unwrap().force_on_free() - 3.0).abs() < 1e-12);
        assert_eq!(
            reg.set_force(Selection::Index(1), 1.0),
            Err(SimError::UnknownMagnet(1))
        );
    }

    #[test]
    fn disabled_registry_applies_nothing() {
        let reg = MagnetRegistry::new();
        assert!(reg.is_enabled());
        reg.set_point_magnet(0, v(0.0, 0.0), 1.0);
        reg.set_enabled(false);
        assert!(reg.active().is_empty());
        assert_eq!(reg.force_on(v(0.5, 0.5), true), Vector2::ZERO);
        reg.set_enabled(true);
        assert_ne!(reg.force_on(v(0.5, 0.5), true), Vector2::ZERO);
    }

    #[test]
    fn info_and_list_describe_registry() {
        let reg = MagnetRegistry::new();
        assert_eq!(reg.list(), "Currently, there is no magnet in this simulation.");
        assert_eq!(reg.info(3), "There is no magnet n°3.");
        reg.set_point_magnet(2, v(0.5, 0.25), 1.0);
        reg.set_point_magnet(0, v(0.0, 0.0), 1.0);
        assert_eq!(reg.list(), "MagnetsIndexes 0 2");
        assert_eq!(reg.info(2), "PointMagnet 0.5 0.25 1 1");
        reg.reset();
        assert!(reg.is_empty());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn point_force_strictly_decreases_with_distance(
                d1 in 0.01_f64..10.0,
                gap in 0.001_f64..10.0,
                force in 0.1_f64..1000.0,
                angle in 0.0_f64..std::f64::consts::TAU,
            ) {
                let m = Magnet::point(Vector2::ZERO, force);
                let dir = Vector2::new(angle.cos(), angle.sin());
                let near = m.force_on(dir * d1, true).norm();
                let far = m.force_on(dir * (d1 + gap), true).norm();
                prop_assert!(near > far);
            }

            #[test]
            fn line_force_is_normal_to_line(
                px in -1.0_f64..1.0,
                py in -1.0_f64..1.0,
                x0 in -1.0_f64..1.0,
            ) {
                prop_assume!((px - x0).abs() > 0.01);
                let m = Magnet::line(Line::vertical(x0), 1.0);
                let f = m.force_on(Vector2::new(px, py), false);
                prop_assert!(f.y().abs() <= 1e-9 * f.norm().max(1.0));
            }
        }
    }
}
