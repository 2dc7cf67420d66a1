//! A single dynamical point and its per-tick integration step.
//!
//! Particles never reference the system that owns them. The orchestrator
//! stores them in plain vectors and hands the current [`SystemParams`] to
//! [`Particle::update`].

use std::collections::VecDeque;

use crate::params::{Edge, Edges, SystemParams};
use crate::prng::Xorshift64;
use crate::scale::Bounds;
use crate::vector::Vector2;

/// Grid particles are tied by a spring to their rest position; free
/// particles float.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParticleKind {
    Grid {
        /// Column and row in the grid.
        cell: (usize, usize),
        rest: Vector2,
    },
    Free,
}

#[derive(Debug, Clone)]
pub struct Particle {
    id: u64,
    kind: ParticleKind,
    position: Vector2,
    force: Vector2,
    history: VecDeque<Vector2>,
    moved: bool,
    rng: Xorshift64,
}

impl Particle {
    /// Grid particle resting at `position`.
    pub fn grid(id: u64, cell: (usize, usize), position: Vector2, memory: usize, rng: Xorshift64) -> Self {
        Self::new(
            id,
            ParticleKind::Grid {
                cell,
                rest: position,
            },
            position,
            memory,
            rng,
        )
    }

    /// Free particle spawned at `position`.
    pub fn free(id: u64, position: Vector2, memory: usize, rng: Xorshift64) -> Self {
        Self::new(id, ParticleKind::Free, position, memory, rng)
    }

    fn new(id: u64, kind: ParticleKind, position: Vector2, memory: usize, rng: Xorshift64) -> Self {
        let depth = memory.max(1);
        Self {
            id,
            kind,
            position,
            force: Vector2::ZERO,
            history: std::iter::repeat(position).take(depth).collect(),
            moved: false,
            rng,
        }
    }

    /// Identifier unique within the owning pool, increasing with creation order.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> ParticleKind {
        self.kind
    }

    pub fn is_grid(&self) -> bool {
        matches!(self.kind, ParticleKind::Grid { .. })
    }

    pub fn position(&self) -> Vector2 {
        self.position
    }

    /// Rest position for grid particles.
    pub fn rest_position(&self) -> Option<Vector2> {
        match self.kind {
            ParticleKind::Grid { rest, .. } => Some(rest),
            ParticleKind::Free => None,
        }
    }

    /// Current force accumulator.
    pub fn force(&self) -> Vector2 {
        self.force
    }

    /// Past positions, oldest first, most recent last.
    pub fn history(&self) -> &VecDeque<Vector2> {
        &self.history
    }

    /// Whether the last update cleared the movement threshold.
    pub fn has_moved(&self) -> bool {
        self.moved
    }

    /// Replaces the force accumulator.
    pub fn set_force(&mut self, force: Vector2) {
        self.force = force;
    }

    /// Adds to the force accumulator.
    pub fn add_force(&mut self, force: Vector2) {
        self.force += force;
    }

    /// Brings the history to exactly `memory` entries: the oldest are dropped
    /// when shrinking, the oldest is repeated when growing.
    pub fn resize_history(&mut self, memory: usize) {
        let depth = memory.max(1);
        while self.history.len() > depth {
            self.history.pop_front();
        }
        while self.history.len() < depth {
            let oldest = self.history.front().copied().unwrap_or(self.position);
            self.history.push_front(oldest);
        }
    }

    /// One integration step.
    pub fn update(&mut self, params: &SystemParams) {
        self.force += self.rng.jitter(params.momentum);

        if let ParticleKind::Grid { rest, .. } = self.kind {
            self.force -= (self.position - rest) * params.stiffness;
        }

        if !self.force.norm().is_finite() {
            self.force = Vector2::ZERO;
        }

        self.moved = match params.threshold.filter(self.force) {
            Some(step) => {
                self.position += step;
                self.resolve_edges(&params.edges, &params.bounds);
                true
            }
            None => false,
        };

        self.force -= self.force * params.friction;

        self.history.push_back(self.position);
        self.resize_history(params.memory);
    }

    fn resolve_edges(&mut self, edges: &Edges, bounds: &Bounds) {
        let (min, max) = (bounds.min, bounds.max);
        let (mut x, mut y) = (self.position.x(), self.position.y());
        let (mut fx, mut fy) = (self.force.x(), self.force.y());

        let crossing_x = if x < min.x() {
            Some((Edge::Left, min.x(), max.x()))
        } else if x > max.x() {
            Some((Edge::Right, max.x(), min.x()))
        } else {
            None
        };
        if let Some((edge, bound, opposite)) = crossing_x {
            let (nx, factor) = edges.policy(edge).resolve(x, bound, opposite);
            x = nx;
            fx *= factor;
        }

        let crossing_y = if y < min.y() {
            Some((Edge::Bottom, min.y(), max.y()))
        } else if y > max.y() {
            Some((Edge::Top, max.y(), min.y()))
        } else {
            None
        };
        if let Some((edge, bound, opposite)) = crossing_y {
            let (ny, factor) = edges.policy(edge).resolve(y, bound, opposite);
            y = ny;
            fy *= factor;
        }

        self.position = Vector2::new(x, y);
        self.force = Vector2::new(fx, fy);
    }
}
