//! Fluid force samplers.
//!
//! The particle system never owns a fluid solver. It is handed a
//! [`FluidSampler`] and asks it for a force at each particle position. Any
//! `Fn(Vector2) -> Vector2` closure is a sampler, which is how a host shares a
//! solver it keeps updating. Two samplers ship with the crate: [`GridFluid`] reads velocity arrays exported
//! by an external solver, [`NoiseFluid`] produces a divergence-free curl-noise
//! flow and stands in for a solver in headless runs.

use noise::{NoiseFn, Perlin};

use crate::error::{reject, SimError};
use crate::params::grid_cells;
use crate::scale::{Bounds, LinearScale};
use crate::vector::Vector2;

/// Weight applied to solver velocities before they reach a particle.
pub const DEFAULT_FLUID_FORCE: f64 = 0.6;

const SINGULARITY_EPS: f64 = 1e-10;

/// A source of fluid force at any point of the simulation space.
///
/// Implementations must be deterministic between two solver updates: the
/// same position yields the same force.
pub trait FluidSampler: Send + Sync {
    fn sample(&self, position: Vector2) -> Vector2;
}

impl<F> FluidSampler for F
where
    F: Fn(Vector2) -> Vector2 + Send + Sync,
{
    fn sample(&self, position: Vector2) -> Vector2 {
        self(position)
    }
}

// ---------------------------------------------------------------------------
// Solver grid
// ---------------------------------------------------------------------------

/// Velocity field of a `width × height` solver grid.
///
/// Particles are mapped from the simulation bounds into the unit square,
/// then into a cell. Positions outside the grid feel no force.
#[derive(Debug, Clone)]
pub struct GridFluid {
    width: usize,
    height: usize,
    u: Vec<f64>,
    v: Vec<f64>,
    force: f64,
    scale: LinearScale,
}

impl GridFluid {
    /// Still fluid of the given size covering `bounds`.
    pub fn new(width: usize, height: usize, bounds: Bounds) -> Result<Self, SimError> {
        let cells = match grid_cells(width, height) {
            Some(cells) if cells > 0 => cells,
            _ => return reject(SimError::InvalidDimensions),
        };
        Ok(Self {
            width,
            height,
            u: vec![0.0; cells],
            v: vec![0.0; cells],
            force: DEFAULT_FLUID_FORCE,
            scale: LinearScale::new(bounds, Bounds::unit()),
        })
    }

    /// Replaces the velocity arrays, row-major with `width` columns.
    pub fn update(
        &mut self,
        width: usize,
        height: usize,
        u: Vec<f64>,
        v: Vec<f64>,
    ) -> Result<(), SimError> {
        let cells = grid_cells(width, height).unwrap_or(0);
        if cells == 0 || u.len() != cells || v.len() != cells {
            return reject(SimError::InvalidDimensions);
        }
        self.width = width;
        self.height = height;
        self.u = u;
        self.v = v;
        Ok(())
    }

    pub fn set_force(&mut self, force: f64) {
        self.force = force;
    }

    pub fn force(&self) -> f64 {
        self.force
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn cell(&self, position: Vector2) -> Option<usize> {
        let p = self.scale.apply(position);
        let col = (p.x() * self.width as f64).floor();
        let row = (p.y() * self.height as f64).floor();
        if col < 0.0 || row < 0.0 || col >= self.width as f64 || row >= self.height as f64 {
            return None;
        }
        Some(row as usize * self.width + col as usize)
    }
}

impl FluidSampler for GridFluid {
    fn sample(&self, position: Vector2) -> Vector2 {
        match self.cell(position) {
            Some(i) => Vector2::new(self.u[i], self.v[i]) * self.force,
            None => Vector2::ZERO,
        }
    }
}

// ---------------------------------------------------------------------------
// Curl noise
// ---------------------------------------------------------------------------

/// Divergence-free flow derived from the curl of a Perlin potential.
pub struct NoiseFluid {
    noise: Perlin,
    scale: f64,
    strength: f64,
    eps: f64,
    time: f64,
}

impl NoiseFluid {
    /// Creates a curl noise flow with a finite-difference step of 0.001.
    pub fn new(scale: f64, strength: f64, seed: u32) -> Self {
        Self {
            noise: Perlin::new(seed),
            scale,
            strength,
            eps: 0.001,
            time: 0.0,
        }
    }

    /// Moves the potential along its third axis so the flow evolves.
    pub fn set_time(&mut self, time: f64) {
        self.time = time;
    }
}

impl FluidSampler for NoiseFluid {
    fn sample(&self, position: Vector2) -> Vector2 {
        let sx = position.x() * self.scale;
        let sy = position.y() * self.scale;
        let eps = self.eps * self.scale;
        if eps.abs() < SINGULARITY_EPS {
            return Vector2::ZERO;
        }
        let t = self.time;
        // curl of a scalar potential P: (dP/dy, -dP/dx)
        let dp_dy =
            (self.noise.get([sx, sy + eps, t]) - self.noise.get([sx, sy - eps, t])) / (2.0 * eps);
        let dp_dx =
            (self.noise.get([sx + eps, sy, t]) - self.noise.get([sx - eps, sy, t])) / (2.0 * eps);
        Vector2::new(dp_dy, -dp_dx) * self.strength
    }
}
