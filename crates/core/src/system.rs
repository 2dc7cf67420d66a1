//! The particle system orchestrator.
//!
//! [`ParticleSystem`] owns the grid and free particle pools and advances them
//! once per [`ParticleSystem::advance`]. Every method takes `&self`, so a
//! system can sit in an `Arc` shared between the thread driving ticks and the
//! threads reporting blobs or reconfiguring pools.
//!
//! Locking:
//! - parameters live behind a read-mostly lock and are cloned into a
//!   [`StepContext`] once per tick;
//! - each pool has its own mutex. A tick only `try_lock`s a pool and skips it
//!   when a mutator holds it; mutators block;
//! - the sink is locked after a pool, never before.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};

use crate::blob::{BlobFrame, BlobRegistry, Movement};
use crate::brush::{Brush, BrushKind};
use crate::error::{reject, SimError};
use crate::fluid::FluidSampler;
use crate::magnet::{Magnet, MagnetRegistry};
use crate::params::{
    clamp_friction, grid_cells, param_usize, require_finite, Edges, SystemParams, Threshold,
};
use crate::particle::Particle;
use crate::prng::Xorshift64;
use crate::scale::{Bounds, LinearScale};
use crate::sink::{MatrixSink, OutputSink, PoolKind};
use crate::vector::Vector2;

/// One pool of particles plus its pending deletions.
#[derive(Debug)]
struct ParticlePool {
    kind: PoolKind,
    particles: Vec<Particle>,
    /// Ids erased during the previous tick.
    doomed: HashSet<u64>,
    next_id: u64,
    rng: Xorshift64,
}

impl ParticlePool {
    fn new(kind: PoolKind, rng: Xorshift64) -> Self {
        Self {
            kind,
            particles: Vec::new(),
            doomed: HashSet::new(),
            next_id: 0,
            rng,
        }
    }

    fn take_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn free_particle(&mut self, position: Vector2, memory: usize) -> Particle {
        let id = self.take_id();
        let rng = self.rng.fork();
        Particle::free(id, position, memory, rng)
    }

    /// Resizes the sink to the pool and rewrites every slot.
    fn publish(&self, sink: &mut dyn OutputSink, memory: usize) {
        sink.resize(self.kind, self.particles.len(), memory);
        for (slot, particle) in self.particles.iter().enumerate() {
            sink.write(self.kind, slot, particle.history());
        }
        if self.kind == PoolKind::Grid {
            sink.write_rest(&self.rest_positions());
        }
    }

    fn rest_positions(&self) -> Vec<Vector2> {
        self.particles
            .iter()
            .filter_map(Particle::rest_position)
            .collect()
    }

    /// Drops the particles erased during the previous tick. Returns whether
    /// anything was removed.
    fn apply_deletions(&mut self) -> bool {
        if self.doomed.is_empty() {
            return false;
        }
        let doomed = std::mem::take(&mut self.doomed);
        let before = self.particles.len();
        self.particles.retain(|p| !doomed.contains(&p.id()));
        self.particles.len() != before
    }
}

#[derive(Debug)]
struct GridPool {
    dimensions: (usize, usize),
    pool: ParticlePool,
}

/// Snapshot of everything a tick reads from outside the pools.
struct StepContext {
    params: SystemParams,
    frames: Vec<BlobFrame>,
    magnets: Vec<Magnet>,
    fluid: Option<Arc<dyn FluidSampler>>,
    /// Direct force impulses for grid particles under the shared brush.
    impulses: Vec<Movement>,
}

impl StepContext {
    /// Sums every force acting on `particle` this tick and integrates it.
    /// Returns whether a blob eraser hit the particle.
    fn step_particle(&self, particle: &mut Particle) -> bool {
        let position = particle.position();
        let grid = particle.is_grid();
        let mut erased = false;

        if let Some(fluid) = &self.fluid {
            let force = fluid.sample(position);
            if force.norm() > self.params.threshold.min {
                particle.set_force(force);
            }
        }

        if grid {
            for impulse in &self.impulses {
                if self.params.brush.intersect(position, impulse.position) {
                    particle.add_force(impulse.delta);
                }
            }
        }

        for frame in &self.frames {
            for movement in &frame.movements {
                if !frame.brush.intersect(position, movement.position) {
                    continue;
                }
                if frame.modes.force {
                    particle.add_force(movement.delta);
                }
                if frame.modes.eraser {
                    erased = true;
                }
                if frame.modes.attractivity {
                    let pole = Magnet::point(movement.position, frame.attractive_force);
                    particle.add_force(pole.force_on(position, grid));
                }
            }
        }

        for magnet in &self.magnets {
            particle.add_force(magnet.force_on(position, grid));
        }

        particle.update(&self.params);
        erased
    }
}

/// Grid and free particle pools driven by blobs, magnets and an optional fluid.
pub struct ParticleSystem<S: OutputSink = MatrixSink> {
    params: RwLock<SystemParams>,
    grid: Mutex<GridPool>,
    free: Mutex<ParticlePool>,
    sink: Mutex<S>,
    blobs: Arc<BlobRegistry>,
    magnets: Arc<MagnetRegistry>,
    fluid: RwLock<Option<Arc<dyn FluidSampler>>>,
    input_scale: RwLock<LinearScale>,
    impulses: Mutex<Vec<Movement>>,
}

impl<S: OutputSink> ParticleSystem<S> {
    /// Empty system with its own blob and magnet registries.
    pub fn new(params: SystemParams, sink: S) -> Self {
        Self::with_registries(
            params,
            sink,
            Arc::new(BlobRegistry::new()),
            Arc::new(MagnetRegistry::new()),
        )
    }

    /// Empty system sharing registries with its host.
    pub fn with_registries(
        params: SystemParams,
        sink: S,
        blobs: Arc<BlobRegistry>,
        magnets: Arc<MagnetRegistry>,
    ) -> Self {
        let mut seed_rng = Xorshift64::new(params.seed);
        let grid_rng = seed_rng.fork();
        let free_rng = seed_rng.fork();
        Self {
            params: RwLock::new(params),
            grid: Mutex::new(GridPool {
                dimensions: (0, 0),
                pool: ParticlePool::new(PoolKind::Grid, grid_rng),
            }),
            free: Mutex::new(ParticlePool::new(PoolKind::Free, free_rng)),
            sink: Mutex::new(sink),
            blobs,
            magnets,
            fluid: RwLock::new(None),
            input_scale: RwLock::new(LinearScale::identity()),
            impulses: Mutex::new(Vec::new()),
        }
    }

    /// Builds a system from a JSON object of parameters.
    ///
    /// Besides the [`SystemParams`] keys, `grid_width` and `grid_height`
    /// create the initial grid. Unusable values fall back to defaults.
    pub fn from_json(params: &Value, sink: S) -> Self {
        let system = Self::new(SystemParams::from_json(params), sink);
        let width = param_usize(params, "grid_width", 0);
        let height = param_usize(params, "grid_height", 0);
        if width > 0 && height > 0 {
            // rejected sizes are logged and leave the system without a grid
            let _ = system.set_grid_dimensions(width, height);
        }
        system
    }

    // -----------------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------------

    /// Advances every available pool by one tick.
    ///
    /// A pool held by a mutator is skipped for this tick. Blob movements are
    /// only drained when both pools are stepped, so a skipped pool never
    /// misses a movement; the other pool feels it one tick later.
    pub fn advance(&self) {
        let grid = self.grid.try_lock();
        let free = self.free.try_lock();

        if grid.is_none() {
            log::debug!("grid pool busy, skipping its tick");
        }
        if free.is_none() {
            log::debug!("free pool busy, skipping its tick");
        }
        if grid.is_none() && free.is_none() {
            return;
        }

        let frames = if grid.is_some() && free.is_some() {
            self.blobs.drain()
        } else {
            Vec::new()
        };
        let ctx = StepContext {
            params: self.params.read().clone(),
            frames,
            magnets: self.magnets.active(),
            fluid: self.fluid.read().clone(),
            impulses: if grid.is_some() {
                std::mem::take(&mut *self.impulses.lock())
            } else {
                Vec::new()
            },
        };

        if let Some(mut grid) = grid {
            self.step_pool(&mut grid.pool, &ctx);
        }
        if let Some(mut free) = free {
            self.step_pool(&mut free, &ctx);
            self.spawn_from_frames(&mut free, &ctx);
        }

        log::trace!(
            "tick: {} blob frames, {} magnets, {} impulses",
            ctx.frames.len(),
            ctx.magnets.len(),
            ctx.impulses.len()
        );
    }

    fn step_pool(&self, pool: &mut ParticlePool, ctx: &StepContext) {
        let memory = ctx.params.memory;
        let mut sink = self.sink.lock();

        if pool.apply_deletions() {
            log::debug!(
                "{:?} pool: erased particles removed, {} left",
                pool.kind,
                pool.particles.len()
            );
            pool.publish(&mut *sink, memory);
        }

        let mut erased = Vec::new();
        for (slot, particle) in pool.particles.iter_mut().enumerate() {
            if ctx.step_particle(particle) {
                erased.push(particle.id());
            }
            sink.write(pool.kind, slot, particle.history());
        }
        pool.doomed.extend(erased);
    }

    fn spawn_from_frames(&self, free: &mut ParticlePool, ctx: &StepContext) {
        let positions: Vec<Vector2> = ctx
            .frames
            .iter()
            .filter(|f| f.spawn_count > 0)
            .flat_map(|f| std::iter::repeat(f.position).take(f.spawn_count))
            .collect();
        if !positions.is_empty() {
            self.admit(free, positions, &ctx.params);
        }
    }

    /// Inserts free particles, evicting the oldest ones once the pool is full.
    fn admit(&self, free: &mut ParticlePool, positions: Vec<Vector2>, params: &SystemParams) {
        let capacity = params.max_free_particles;
        if capacity == 0 {
            log::warn!(
                "cannot add {} particles: maximum number of free particles is 0",
                positions.len()
            );
            return;
        }
        if positions.len() > capacity {
            log::warn!(
                "adding {} particles to a pool of {capacity}, only the newest {capacity} are kept",
                positions.len()
            );
        }

        let overflow = (free.particles.len() + positions.len()).saturating_sub(capacity);
        let evicted = overflow.min(free.particles.len());
        free.particles.drain(..evicted);

        let skip = positions.len().saturating_sub(capacity);
        for position in positions.into_iter().skip(skip) {
            let particle = free.free_particle(position, params.memory);
            free.particles.push(particle);
        }

        free.publish(&mut *self.sink.lock(), params.memory);
    }

    // -----------------------------------------------------------------------
    // Inputs
    // -----------------------------------------------------------------------

    /// Reports blob `index` at `position`, given in input coordinates.
    pub fn report_blob(&self, index: usize, position: Vector2) {
        let position = self.input_scale.read().apply(position);
        self.blobs.report(index, position);
    }

    /// Declares the rectangle external coordinates are expressed in. Blob
    /// reports and force injections are mapped from it into the simulation
    /// bounds.
    pub fn set_input_range(&self, min: Vector2, max: Vector2) {
        let bounds = self.params.read().bounds;
        *self.input_scale.write() = LinearScale::new(Bounds::new(min, max), bounds);
    }

    /// Queues a force impulse for the grid particles under the shared brush
    /// at `position`. Impulses at or below the threshold floor are ignored.
    pub fn add_force(&self, position: Vector2, delta: Vector2) {
        let scale = *self.input_scale.read();
        let (slope, _) = scale.coefficients();
        let delta = delta.mul_components(slope);
        let magnitude = delta.norm();
        if !magnitude.is_finite() || magnitude <= self.params.read().threshold.min {
            return;
        }
        self.impulses.lock().push(Movement {
            position: scale.apply(position),
            delta,
        });
    }

    /// Couples particles to a fluid, or decouples them with `None`.
    pub fn set_fluid(&self, fluid: Option<Arc<dyn FluidSampler>>) {
        *self.fluid.write() = fluid;
    }

    pub fn blobs(&self) -> &Arc<BlobRegistry> {
        &self.blobs
    }

    pub fn magnets(&self) -> &Arc<MagnetRegistry> {
        &self.magnets
    }

    // -----------------------------------------------------------------------
    // Pools
    // -----------------------------------------------------------------------

    /// Adds `count` free particles at `position`, in simulation coordinates.
    pub fn spawn(&self, position: Vector2, count: usize) {
        if count == 0 {
            return;
        }
        let params = self.params.read().clone();
        let mut free = self.free.lock();
        self.admit(&mut free, vec![position; count], &params);
    }

    /// Replaces the free pool with particles at `positions`, keeping the
    /// first `max_free_particles` of them.
    pub fn load_particles(&self, positions: &[Vector2]) {
        let params = self.params.read().clone();
        let capacity = params.max_free_particles;
        if positions.len() > capacity {
            log::warn!(
                "loading {} particles truncated to the maximum of {capacity}",
                positions.len()
            );
        }

        let mut free = self.free.lock();
        free.particles.clear();
        free.doomed.clear();
        for &position in positions.iter().take(capacity) {
            let particle = free.free_particle(position, params.memory);
            free.particles.push(particle);
        }
        free.publish(&mut *self.sink.lock(), params.memory);
    }

    /// Rebuilds the grid with `width × height` particles evenly inset from
    /// the bounds. A zero dimension removes the grid and clears its output;
    /// a grid above [`MAX_GRID_CELLS`](crate::params::MAX_GRID_CELLS) is
    /// rejected and the current grid is kept.
    pub fn set_grid_dimensions(&self, width: usize, height: usize) -> Result<(), SimError> {
        if width == 0 || height == 0 {
            let mut grid = self.grid.lock();
            grid.dimensions = (0, 0);
            grid.pool.particles.clear();
            grid.pool.doomed.clear();
            self.sink.lock().clear(PoolKind::Grid);
            return reject(SimError::InvalidDimensions);
        }
        if grid_cells(width, height).is_none() {
            return reject(SimError::InvalidDimensions);
        }
        self.reload_grid(width, height);
        Ok(())
    }

    fn reload_grid(&self, width: usize, height: usize) {
        let params = self.params.read().clone();
        let mut grid = self.grid.lock();
        build_grid(&mut grid, width, height, &params);
        grid.pool.publish(&mut *self.sink.lock(), params.memory);
        log::debug!("grid reloaded with {width}x{height} particles");
    }

    /// Empties the free pool and puts every grid particle back at rest.
    pub fn reset(&self) {
        let params = self.params.read().clone();
        {
            let mut grid = self.grid.lock();
            let (width, height) = grid.dimensions;
            build_grid(&mut grid, width, height, &params);
            let mut sink = self.sink.lock();
            if grid.pool.particles.is_empty() {
                sink.clear(PoolKind::Grid);
            } else {
                grid.pool.publish(&mut *sink, params.memory);
            }
        }
        let mut free = self.free.lock();
        free.particles.clear();
        free.doomed.clear();
        self.sink.lock().clear(PoolKind::Free);
        self.impulses.lock().clear();
    }

    pub fn grid_dimensions(&self) -> (usize, usize) {
        self.grid.lock().dimensions
    }

    pub fn grid_len(&self) -> usize {
        self.grid.lock().pool.particles.len()
    }

    pub fn free_len(&self) -> usize {
        self.free.lock().particles.len()
    }

    /// Current grid particle positions, in slot order.
    pub fn grid_positions(&self) -> Vec<Vector2> {
        self.grid
            .lock()
            .pool
            .particles
            .iter()
            .map(Particle::position)
            .collect()
    }

    /// Current free particle positions, oldest first.
    pub fn free_positions(&self) -> Vec<Vector2> {
        self.free
            .lock()
            .particles
            .iter()
            .map(Particle::position)
            .collect()
    }

    /// Ids of the live free particles, oldest first. Ids grow with creation
    /// order.
    pub fn free_ids(&self) -> Vec<u64> {
        self.free.lock().particles.iter().map(Particle::id).collect()
    }

    /// Clones of every particle, grid first.
    pub fn particles(&self) -> Vec<Particle> {
        let mut all = self.grid.lock().pool.particles.clone();
        all.extend(self.free.lock().particles.iter().cloned());
        all
    }

    /// Runs `f` on the sink.
    pub fn with_sink<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.sink.lock())
    }

    // -----------------------------------------------------------------------
    // Parameters
    // -----------------------------------------------------------------------

    pub fn set_stiffness(&self, stiffness: f64) -> Result<(), SimError> {
        self.params.write().stiffness = require_finite("stiffness", stiffness)?;
        Ok(())
    }

    pub fn set_momentum(&self, momentum: f64) -> Result<(), SimError> {
        self.params.write().momentum = require_finite("momentum", momentum)?;
        Ok(())
    }

    /// Friction is clamped to `[-1, 1]`.
    pub fn set_friction(&self, friction: f64) -> Result<(), SimError> {
        let friction = require_finite("friction", friction)?;
        let clamped = clamp_friction(friction);
        if clamped != friction {
            log::info!("friction cannot exceed 100%, using {clamped}");
        }
        self.params.write().friction = clamped;
        Ok(())
    }

    pub fn set_threshold(&self, min: f64, max: f64) -> Result<(), SimError> {
        let threshold = Threshold::new(min, max)?;
        self.params.write().threshold = threshold;
        Ok(())
    }

    /// Changes the history depth, resizing every particle history and the
    /// sink at once.
    pub fn set_memory(&self, memory: i64) -> Result<(), SimError> {
        let memory = match usize::try_from(memory) {
            Ok(m) if m > 0 => m,
            _ => return reject(SimError::InvalidMemory(memory)),
        };
        self.params.write().memory = memory;

        let mut grid = self.grid.lock();
        for particle in &mut grid.pool.particles {
            particle.resize_history(memory);
        }
        grid.pool.publish(&mut *self.sink.lock(), memory);
        drop(grid);

        let mut free = self.free.lock();
        for particle in &mut free.particles {
            particle.resize_history(memory);
        }
        free.publish(&mut *self.sink.lock(), memory);
        Ok(())
    }

    /// Changes the free pool capacity. Shrinking below the current
    /// population keeps the newest particles.
    pub fn set_max_free_particles(&self, max: i64) -> Result<(), SimError> {
        let max = match usize::try_from(max) {
            Ok(m) => m,
            Err(_) => return reject(SimError::InvalidCapacity(max)),
        };
        let memory = {
            let mut params = self.params.write();
            params.max_free_particles = max;
            params.memory
        };

        let mut free = self.free.lock();
        let excess = free.particles.len().saturating_sub(max);
        if excess > 0 {
            free.particles.drain(..excess);
            free.publish(&mut *self.sink.lock(), memory);
        }
        Ok(())
    }

    pub fn set_edge_behavior(&self, edges: Edges) {
        self.params.write().edges = edges;
    }

    /// Replaces the shared brush used by [`Self::add_force`].
    pub fn set_brush(&self, brush: Brush) {
        self.params.write().brush = brush;
    }

    /// Selects the shared brush by name (`circle`, `rectangle`) and numeric
    /// parameters.
    pub fn set_brush_named(&self, kind: &str, params: &[f64]) -> Result<(), SimError> {
        let kind = match kind.parse::<BrushKind>() {
            Ok(kind) => kind,
            Err(err) => return reject(err),
        };
        self.set_brush(Brush::from_params(kind, params));
        Ok(())
    }

    /// Copy of the live parameters.
    pub fn current_params(&self) -> SystemParams {
        self.params.read().clone()
    }

    /// Live parameters as JSON, grid dimensions included.
    pub fn params(&self) -> Value {
        let mut value = self.params.read().to_json();
        let (width, height) = self.grid_dimensions();
        if let Some(obj) = value.as_object_mut() {
            obj.insert("grid_width".into(), json!(width));
            obj.insert("grid_height".into(), json!(height));
        }
        value
    }

    /// Schema of every tunable accepted by [`Self::from_json`].
    pub fn param_schema() -> Value {
        let mut schema = SystemParams::schema();
        if let Some(obj) = schema.as_object_mut() {
            for key in ["grid_width", "grid_height"] {
                obj.insert(
                    key.into(),
                    json!({
                        "type": "integer",
                        "default": 0,
                        "min": 0,
                        "description": "Grid particles along this axis, 0 for no grid"
                    }),
                );
            }
        }
        schema
    }
}

/// Replaces the grid with `width × height` particles at
/// `min + (i + 1) · span / (count + 1)` on each axis, column-major.
fn build_grid(grid: &mut GridPool, width: usize, height: usize, params: &SystemParams) {
    let bounds = params.bounds;
    let step = Vector2::new(
        bounds.span().x() / (width + 1) as f64,
        bounds.span().y() / (height + 1) as f64,
    );

    grid.dimensions = (width, height);
    grid.pool.particles.clear();
    grid.pool.doomed.clear();
    grid.pool.particles.reserve(width * height);
    for i in 0..width {
        for j in 0..height {
            let position = Vector2::new(
                bounds.min.x() + (i + 1) as f64 * step.x(),
                bounds.min.y() + (j + 1) as f64 * step.y(),
            );
            let id = grid.pool.take_id();
            let rng = grid.pool.rng.fork();
            grid.pool
                .particles
                .push(Particle::grid(id, (i, j), position, params.memory, rng));
        }
    }
}
