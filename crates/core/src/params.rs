//! Process-wide simulation parameters and their JSON representation.
//!
//! [`SystemParams`] is the read-mostly bundle every particle consults during
//! integration. It is copied once per tick into the step context, so setters
//! never race with a particle mid-update. Loading from JSON is tolerant:
//! missing, mistyped, or out-of-range values fall back to defaults.

use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::brush::Brush;
use crate::error::{reject, SimError};
use crate::scale::Bounds;
use crate::vector::Vector2;

pub const DEFAULT_STIFFNESS: f64 = 0.5;
pub const DEFAULT_MOMENTUM: f64 = 0.05;
pub const DEFAULT_FRICTION: f64 = 0.1;
pub const DEFAULT_THRESHOLD_MIN: f64 = 0.001;
pub const DEFAULT_THRESHOLD_MAX: f64 = 0.1;
pub const DEFAULT_MEMORY: usize = 2;
pub const DEFAULT_MAX_FREE_PARTICLES: usize = 1000;
pub const DEFAULT_SEED: u64 = 42;

/// Largest number of cells a grid (particle or fluid) may hold.
pub const MAX_GRID_CELLS: usize = 1 << 22;

/// Movement significance window: forces at or below `min` are ignored,
/// forces above `max` are clamped to `max`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub min: f64,
    pub max: f64,
}

impl Threshold {
    /// Validated constructor. Requires `0 <= min <= max`, both finite.
    pub fn new(min: f64, max: f64) -> Result<Self, SimError> {
        if !(min >= 0.0 && min <= max && max.is_finite()) {
            return reject(SimError::InvalidThreshold { min, max });
        }
        Ok(Self { min, max })
    }

    /// Clamps `v` to the ceiling and returns it only if it clears the floor.
    /// NaN and infinite vectors never clear it.
    pub fn filter(&self, v: Vector2) -> Option<Vector2> {
        let magnitude = v.norm();
        if !magnitude.is_finite() || magnitude <= self.min {
            return None;
        }
        if magnitude > self.max {
            Some(v * (self.max / magnitude))
        } else {
            Some(v)
        }
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Self {
            min: DEFAULT_THRESHOLD_MIN,
            max: DEFAULT_THRESHOLD_MAX,
        }
    }
}

/// One side of the simulation bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Left,
    Bottom,
    Right,
    Top,
}

/// What happens to a particle crossing an edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgePolicy {
    /// Clamp to the edge and cancel the force component.
    #[default]
    Stop,
    /// Reflect about the edge and invert the force component.
    Bounce,
    /// Re-enter from the opposite edge, force unchanged.
    Wrap,
}

impl EdgePolicy {
    /// Decodes host edge codes: 0 stop, 1 bounce, 2 wrap.
    pub fn from_code(code: i64) -> Result<Self, SimError> {
        match code {
            0 => Ok(EdgePolicy::Stop),
            1 => Ok(EdgePolicy::Bounce),
            2 => Ok(EdgePolicy::Wrap),
            other => reject(SimError::UnknownEdgePolicy(other)),
        }
    }

    /// Resolves a coordinate that crossed `bound`, where `opposite` is the
    /// other bound on the same axis. Returns the new coordinate and the
    /// factor to apply to the force component on that axis.
    pub fn resolve(self, coord: f64, bound: f64, opposite: f64) -> (f64, f64) {
        match self {
            EdgePolicy::Stop => (bound, 0.0),
            EdgePolicy::Bounce => (2.0 * bound - coord, -1.0),
            EdgePolicy::Wrap => (opposite + (coord - bound), 1.0),
        }
    }
}

impl FromStr for EdgePolicy {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stop" => Ok(EdgePolicy::Stop),
            "bounce" | "bound" => Ok(EdgePolicy::Bounce),
            "wrap" | "boom" => Ok(EdgePolicy::Wrap),
            _ => Err(SimError::UnknownEdgePolicy(-1)),
        }
    }
}

/// Edge policy for each of the four sides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edges {
    pub left: EdgePolicy,
    pub bottom: EdgePolicy,
    pub right: EdgePolicy,
    pub top: EdgePolicy,
}

impl Edges {
    pub fn new(left: EdgePolicy, bottom: EdgePolicy, right: EdgePolicy, top: EdgePolicy) -> Self {
        Self {
            left,
            bottom,
            right,
            top,
        }
    }

    /// Same policy on every side.
    pub fn uniform(policy: EdgePolicy) -> Self {
        Self::new(policy, policy, policy, policy)
    }

    pub fn policy(&self, edge: Edge) -> EdgePolicy {
        match edge {
            Edge::Left => self.left,
            Edge::Bottom => self.bottom,
            Edge::Right => self.right,
            Edge::Top => self.top,
        }
    }
}

/// Parameters shared by every particle of a system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemParams {
    /// Spring constant pulling grid particles toward their rest position.
    pub stiffness: f64,
    /// Scale of the random per-tick kick.
    pub momentum: f64,
    /// Fraction of residual force removed each tick, in `[-1, 1]`.
    pub friction: f64,
    pub threshold: Threshold,
    /// History depth per particle, always at least 1.
    pub memory: usize,
    pub max_free_particles: usize,
    pub edges: Edges,
    /// Simulation space.
    pub bounds: Bounds,
    /// Shared brush for direct force injection on the grid.
    pub brush: Brush,
    /// Seed of the momentum generator.
    pub seed: u64,
}

impl Default for SystemParams {
    fn default() -> Self {
        Self {
            stiffness: DEFAULT_STIFFNESS,
            momentum: DEFAULT_MOMENTUM,
            friction: DEFAULT_FRICTION,
            threshold: Threshold::default(),
            memory: DEFAULT_MEMORY,
            max_free_particles: DEFAULT_MAX_FREE_PARTICLES,
            edges: Edges::default(),
            bounds: Bounds::default(),
            brush: Brush::default(),
            seed: DEFAULT_SEED,
        }
    }
}

impl SystemParams {
    /// Reads parameters from a JSON object, keeping defaults for anything
    /// missing or unusable.
    ///
    /// Recognized keys: `stiffness`, `momentum`, `friction`, `threshold_min`,
    /// `threshold_max`, `memory`, `max_free_particles`, `edges`, `bounds`,
    /// `brush`, `seed`. Structured keys use the same shape as
    /// [`SystemParams`] serializes to.
    pub fn from_json(params: &Value) -> Self {
        let d = Self::default();

        let threshold = Threshold::new(
            param_f64(params, "threshold_min", d.threshold.min),
            param_f64(params, "threshold_max", d.threshold.max),
        )
        .unwrap_or(d.threshold);

        Self {
            stiffness: param_f64(params, "stiffness", d.stiffness),
            momentum: param_f64(params, "momentum", d.momentum),
            friction: clamp_friction(param_f64(params, "friction", d.friction)),
            threshold,
            memory: Some(param_usize(params, "memory", d.memory))
                .filter(|&m| m > 0)
                .unwrap_or(d.memory),
            max_free_particles: param_usize(params, "max_free_particles", d.max_free_particles),
            edges: param_structured(params, "edges").unwrap_or(d.edges),
            bounds: param_structured(params, "bounds").unwrap_or(d.bounds),
            brush: param_structured(params, "brush").unwrap_or(d.brush),
            seed: param_u64(params, "seed", d.seed),
        }
    }

    /// Current values as a flat JSON object, readable back by [`Self::from_json`].
    pub fn to_json(&self) -> Value {
        json!({
            "stiffness": self.stiffness,
            "momentum": self.momentum,
            "friction": self.friction,
            "threshold_min": self.threshold.min,
            "threshold_max": self.threshold.max,
            "memory": self.memory,
            "max_free_particles": self.max_free_particles,
            "edges": self.edges,
            "bounds": self.bounds,
            "brush": self.brush,
            "seed": self.seed,
        })
    }

    /// Schema for every tunable: type, default, range, description.
    pub fn schema() -> Value {
        json!({
            "stiffness": {
                "type": "number",
                "default": DEFAULT_STIFFNESS,
                "min": 0.0,
                "max": 1.0,
                "description": "Spring constant pulling grid particles back to rest"
            },
            "momentum": {
                "type": "number",
                "default": DEFAULT_MOMENTUM,
                "min": 0.0,
                "max": 1.0,
                "description": "Magnitude of the random kick applied every tick"
            },
            "friction": {
                "type": "number",
                "default": DEFAULT_FRICTION,
                "min": -1.0,
                "max": 1.0,
                "description": "Fraction of residual force removed every tick"
            },
            "threshold_min": {
                "type": "number",
                "default": DEFAULT_THRESHOLD_MIN,
                "min": 0.0,
                "description": "Forces at or below this magnitude do not move a particle"
            },
            "threshold_max": {
                "type": "number",
                "default": DEFAULT_THRESHOLD_MAX,
                "min": 0.0,
                "description": "Per-tick force magnitude ceiling"
            },
            "memory": {
                "type": "integer",
                "default": DEFAULT_MEMORY,
                "min": 1,
                "description": "Number of past positions published per particle"
            },
            "max_free_particles": {
                "type": "integer",
                "default": DEFAULT_MAX_FREE_PARTICLES,
                "min": 0,
                "description": "Capacity of the recycled free particle pool"
            },
            "edges": {
                "type": "object",
                "default": Edges::default(),
                "description": "Per-side edge policy: stop, bounce or wrap"
            },
            "bounds": {
                "type": "object",
                "default": Bounds::default(),
                "description": "Simulation space as min and max corners"
            },
            "brush": {
                "type": "object",
                "default": Brush::default(),
                "description": "Shared brush used by direct force injection on the grid"
            },
            "seed": {
                "type": "integer",
                "default": DEFAULT_SEED,
                "description": "Seed of the momentum jitter generator"
            }
        })
    }
}

/// Friction is limited to 100% in either direction.
pub fn clamp_friction(friction: f64) -> f64 {
    friction.clamp(-1.0, 1.0)
}

/// Passes `value` through if it is finite, otherwise rejects it under `name`.
pub fn require_finite(name: &'static str, value: f64) -> Result<f64, SimError> {
    if value.is_finite() {
        Ok(value)
    } else {
        reject(SimError::NonFinite(name))
    }
}

/// Number of cells in a `width × height` grid, or `None` when the product
/// overflows or exceeds [`MAX_GRID_CELLS`].
pub fn grid_cells(width: usize, height: usize) -> Option<usize> {
    width
        .checked_mul(height)
        .filter(|&cells| cells <= MAX_GRID_CELLS)
}

/// Extracts a finite `f64` from `params[name]`, returning `default` if
/// missing, wrong type, or not finite.
pub fn param_f64(params: &Value, name: &str, default: f64) -> f64 {
    params
        .get(name)
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite())
        .unwrap_or(default)
}

/// Extracts a `u64` from `params[name]`, returning `default` if missing or wrong type.
pub fn param_u64(params: &Value, name: &str, default: u64) -> u64 {
    params.get(name).and_then(Value::as_u64).unwrap_or(default)
}

/// Extracts a `usize` from `params[name]`, returning `default` if missing,
/// wrong type, or out of range for the platform.
pub fn param_usize(params: &Value, name: &str, default: usize) -> usize {
    params
        .get(name)
        .and_then(Value::as_u64)
        .and_then(|v| usize::try_from(v).ok())
        .unwrap_or(default)
}

/// Deserializes `params[name]` into `T`, returning `None` if missing or malformed.
pub fn param_structured<T: DeserializeOwned>(params: &Value, name: &str) -> Option<T> {
    params
        .get(name)
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_rejects_inverted_window() {
        assert!(Threshold::new(0.2, 0.1).is_err());
        assert!(Threshold::new(-0.1, 0.1).is_err());
        assert!(Threshold::new(f64::NAN, 0.1).is_err());
        assert!(Threshold::new(0.0, f64::INFINITY).is_err());
        assert!(Threshold::new(0.0, f64::NAN).is_err());
        assert!(Threshold::new(0.1, 0.1).is_ok());
    }

    #[test]
    fn threshold_filter_clamps_and_drops() {
        let t = Threshold::new(0.01, 0.1).unwrap();
        assert_eq!(t.filter(Vector2::new(0.005, 0.0)), None);
        assert_eq!(t.filter(Vector2::new(0.01, 0.0)), None);
        let clamped = t.filter(Vector2::new(3.0, 4.0)).unwrap();
        assert!((clamped.norm() - 0.1).abs() < 1e-12);
        let kept = t.filter(Vector2::new(0.05, 0.0)).unwrap();
        assert_eq!(kept, Vector2::new(0.05, 0.0));
        assert_eq!(t.filter(Vector2::new(f64::NAN, 0.0)), None);
        assert_eq!(t.filter(Vector2::new(f64::INFINITY, 1.0)), None);
    }

    #[test]
    fn bounce_reflects_about_bound() {
        let (x, factor) = EdgePolicy::Bounce.resolve(1.2, 1.0, 0.0);
        assert!((x - 0.8).abs() < 1e-12);
        assert_eq!(factor, -1.0);
    }

    #[test]
    fn stop_clamps_and_cancels() {
        assert_eq!(EdgePolicy::Stop.resolve(1.3, 1.0, 0.0), (1.0, 0.0));
        assert_eq!(EdgePolicy::Stop.resolve(-0.3, 0.0, 1.0), (0.0, 0.0));
    }

    #[test]
    fn wrap_reenters_from_opposite_side() {
        let (x, factor) = EdgePolicy::Wrap.resolve(1.25, 1.0, 0.0);
        assert!((x - 0.25).abs() < 1e-12);
        assert_eq!(factor, 1.0);
        let (x, _) = EdgePolicy::Wrap.resolve(-0.1, 0.0, 1.0);
        assert!((x - 0.9).abs() < 1e-12);
    }

    #[test]
    fn edge_policy_codes_and_names() {
        assert_eq!(EdgePolicy::from_code(1), Ok(EdgePolicy::Bounce));
        assert!(EdgePolicy::from_code(3).is_err());
        assert_eq!("BOOM".parse::<EdgePolicy>(), Ok(EdgePolicy::Wrap));
        assert!("melt".parse::<EdgePolicy>().is_err());
    }

    #[test]
    fn edges_lookup_by_side() {
        let edges = Edges::new(
            EdgePolicy::Stop,
            EdgePolicy::Bounce,
            EdgePolicy::Wrap,
            EdgePolicy::Stop,
        );
        assert_eq!(edges.policy(Edge::Bottom), EdgePolicy::Bounce);
        assert_eq!(edges.policy(Edge::Right), EdgePolicy::Wrap);
    }

    #[test]
    fn from_json_empty_object_gives_defaults() {
        assert_eq!(SystemParams::from_json(&json!({})), SystemParams::default());
    }

    #[test]
    fn from_json_reads_overrides() {
        let p = SystemParams::from_json(&json!({
            "stiffness": 0.2,
            "memory": 5,
            "edges": {"left": "wrap", "bottom": "stop", "right": "wrap", "top": "bounce"},
            "brush": {"kind": "circle", "radius": 0.3},
        }));
        assert_eq!(p.stiffness, 0.2);
        assert_eq!(p.memory, 5);
        assert_eq!(p.edges.left, EdgePolicy::Wrap);
        assert_eq!(p.edges.top, EdgePolicy::Bounce);
        assert_eq!(p.brush, Brush::circle(0.3));
    }

    #[test]
    fn from_json_sanitizes_bad_values() {
        let p = SystemParams::from_json(&json!({
            "friction": 4.0,
            "memory": 0,
            "threshold_min": 0.5,
            "threshold_max": 0.1,
            "edges": "sideways",
        }));
        assert_eq!(p.friction, 1.0);
        assert_eq!(p.memory, DEFAULT_MEMORY);
        assert_eq!(p.threshold, Threshold::default());
        assert_eq!(p.edges, Edges::default());
    }

    #[test]
    fn to_json_round_trips_through_from_json() {
        let p = SystemParams {
            momentum: 0.0,
            edges: Edges::uniform(EdgePolicy::Bounce),
            seed: 9,
            ..SystemParams::default()
        };
        assert_eq!(SystemParams::from_json(&p.to_json()), p);
    }

    #[test]
    fn schema_covers_every_serialized_key() {
        let schema = SystemParams::schema();
        let values = SystemParams::default().to_json();
        for key in values.as_object().unwrap().keys() {
            assert!(schema.get(key).is_some(), "schema misses {key}");
        }
    }

    #[test]
    fn param_f64_rejects_wrong_type_and_null() {
        let params = json!({"speed": "fast", "drift": null, "count": 10});
        assert_eq!(param_f64(&params, "speed", 1.0), 1.0);
        assert_eq!(param_f64(&params, "drift", 5.0), 5.0);
        assert_eq!(param_f64(&params, "count", 0.0), 10.0);
    }

    #[test]
    fn param_usize_rejects_negative_and_float() {
        let params = json!({"neg": -3, "float": 2.5, "ok": 7});
        assert_eq!(param_usize(&params, "neg", 1), 1);
        assert_eq!(param_usize(&params, "float", 1), 1);
        assert_eq!(param_usize(&params, "ok", 1), 7);
    }

    #[test]
    fn param_structured_returns_none_when_malformed() {
        let params = json!({"edges": 3});
        assert_eq!(param_structured::<Edges>(&params, "edges"), None);
        assert_eq!(param_structured::<Edges>(&params, "missing"), None);
    }

    #[test]
    fn friction_clamps_to_unit_range() {
        assert_eq!(clamp_friction(-3.0), -1.0);
        assert_eq!(clamp_friction(0.4), 0.4);
    }

    #[test]
    fn require_finite_rejects_nan_and_infinity() {
        assert_eq!(require_finite("momentum", 0.2), Ok(0.2));
        assert_eq!(
            require_finite("momentum", f64::NAN),
            Err(SimError::NonFinite("momentum"))
        );
        assert!(require_finite("momentum", f64::NEG_INFINITY).is_err());
    }

    #[test]
    fn grid_cells_caps_and_guards_overflow() {
        assert_eq!(grid_cells(3, 4), Some(12));
        assert_eq!(grid_cells(usize::MAX, 2), None);
        assert_eq!(grid_cells(MAX_GRID_CELLS, 2), None);
        assert_eq!(grid_cells(MAX_GRID_CELLS, 1), Some(MAX_GRID_CELLS));
    }
}
