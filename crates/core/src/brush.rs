//! Geometric hit-test regions attached to blobs and to the system.
//!
//! A [`Brush`] answers one question: does a point lie inside the brush when
//! the brush is placed at an anchor? The canonical call is
//! `brush.intersect(particle_position, blob_position)` everywhere in the
//! crate.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SimError;
use crate::vector::Vector2;

/// Default circle radius and rectangle side, in simulation units.
pub const DEFAULT_BRUSH_SIZE: f64 = 0.1;

/// Which point of a rectangle brush sits on the anchor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RectAnchor {
    #[default]
    Center,
    BottomLeft,
    TopLeft,
    BottomRight,
    TopRight,
}

impl RectAnchor {
    /// Decodes the numeric anchor codes used by host messages (0..=4).
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(RectAnchor::Center),
            1 => Some(RectAnchor::BottomLeft),
            2 => Some(RectAnchor::TopLeft),
            3 => Some(RectAnchor::BottomRight),
            4 => Some(RectAnchor::TopRight),
            _ => None,
        }
    }
}

/// Brush shape family, used when a brush is selected by name or code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrushKind {
    Circle,
    Rectangle,
}

impl BrushKind {
    pub fn from_code(code: i64) -> Result<Self, SimError> {
        match code {
            0 => Ok(BrushKind::Circle),
            1 => Ok(BrushKind::Rectangle),
            other => Err(SimError::UnknownBrush(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BrushKind::Circle => "circle",
            BrushKind::Rectangle => "rectangle",
        }
    }
}

impl FromStr for BrushKind {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "circle" => Ok(BrushKind::Circle),
            "rectangle" | "rect" => Ok(BrushKind::Rectangle),
            _ => Err(SimError::UnknownBrush(s.to_string())),
        }
    }
}

/// A circle or an anchored axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Brush {
    Circle {
        radius: f64,
    },
    Rectangle {
        width: f64,
        height: f64,
        #[serde(default)]
        anchor: RectAnchor,
    },
}

impl Brush {
    pub fn circle(radius: f64) -> Self {
        Brush::Circle { radius }
    }

    pub fn rectangle(width: f64, height: f64, anchor: RectAnchor) -> Self {
        Brush::Rectangle {
            width,
            height,
            anchor,
        }
    }

    /// Default-sized brush of the given kind.
    pub fn of_kind(kind: BrushKind) -> Self {
        match kind {
            BrushKind::Circle => Brush::circle(DEFAULT_BRUSH_SIZE),
            BrushKind::Rectangle => {
                Brush::rectangle(DEFAULT_BRUSH_SIZE, DEFAULT_BRUSH_SIZE, RectAnchor::Center)
            }
        }
    }

    /// Builds a brush from a kind and its numeric parameters.
    ///
    /// Circle takes `[radius]`, rectangle takes `[width, height]` or
    /// `[width, height, anchor_code]`. Missing values fall back to defaults.
    pub fn from_params(kind: BrushKind, params: &[f64]) -> Self {
        match kind {
            BrushKind::Circle => {
                Brush::circle(params.first().copied().unwrap_or(DEFAULT_BRUSH_SIZE))
            }
            BrushKind::Rectangle => Brush::rectangle(
                params.first().copied().unwrap_or(DEFAULT_BRUSH_SIZE),
                params.get(1).copied().unwrap_or(DEFAULT_BRUSH_SIZE),
                params
                    .get(2)
                    .and_then(|&c| RectAnchor::from_code(c as i64))
                    .unwrap_or_default(),
            ),
        }
    }

    pub fn kind(&self) -> BrushKind {
        match self {
            Brush::Circle { .. } => BrushKind::Circle,
            Brush::Rectangle { .. } => BrushKind::Rectangle,
        }
    }

    /// Whether `point` lies inside this brush placed at `anchor`.
    ///
    /// Circles are closed. A centered rectangle is open on all sides.
    /// Corner-anchored rectangles include the edges through the anchor and
    /// exclude the opposite edges.
    pub fn intersect(&self, point: Vector2, anchor: Vector2) -> bool {
        match *self {
            Brush::Circle { radius } => (point - anchor).norm_squared() <= radius * radius,
            Brush::Rectangle {
                width,
                height,
                anchor: mode,
            } => {
                let dx = point.x() - anchor.x();
                let dy = point.y() - anchor.y();
                match mode {
                    RectAnchor::Center => dx.abs() < width / 2.0 && dy.abs() < height / 2.0,
                    RectAnchor::BottomLeft => extends_up(dx, width) && extends_up(dy, height),
                    RectAnchor::TopLeft => extends_up(dx, width) && extends_down(dy, height),
                    RectAnchor::BottomRight => extends_down(dx, width) && extends_up(dy, height),
                    RectAnchor::TopRight => extends_down(dx, width) && extends_down(dy, height),
                }
            }
        }
    }
}

impl Default for Brush {
    fn default() -> Self {
        Brush::of_kind(BrushKind::Circle)
    }
}

impl fmt::Display for Brush {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Brush::Circle { radius } => write!(f, "CircleBrush {radius}"),
            Brush::Rectangle {
                width,
                height,
                anchor,
            } => write!(f, "RectangleBrush {width} {height} {anchor:?}"),
        }
    }
}

/// `offset` in `[0, size)`.
fn extends_up(offset: f64, size: f64) -> bool {
    offset >= 0.0 && offset < size
}

/// `offset` in `(-size, 0]`.
fn extends_down(offset: f64, size: f64) -> bool {
    offset <= 0.0 && offset > -size
}
