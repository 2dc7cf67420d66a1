//! Where particle positions go after each tick.
//!
//! The orchestrator is the only writer. Each pool owns a block of slots laid
//! out as `(history_depth, particle_index)`; the sink is always resized
//! before slots are written, so a write never targets a slot the sink does
//! not have.

use std::collections::VecDeque;

use serde_json::{json, Value};

use crate::scale::{Bounds, LinearScale};
use crate::vector::Vector2;

/// Which particle pool a sink call refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolKind {
    Grid,
    Free,
}

/// Consumer of per-tick particle output.
pub trait OutputSink: Send {
    /// Sets the slot count of `pool` to `count`, each `memory` deep.
    fn resize(&mut self, pool: PoolKind, count: usize, memory: usize);

    /// Writes the history of the particle in `slot`, oldest first.
    fn write(&mut self, pool: PoolKind, slot: usize, history: &VecDeque<Vector2>);

    /// Publishes the rest positions of the grid, in slot order.
    fn write_rest(&mut self, rest: &[Vector2]);

    /// Empties `pool`, signalling there is nothing to draw.
    fn clear(&mut self, pool: PoolKind);
}

/// Dense `depth × count` matrix of positions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionMatrix {
    depth: usize,
    count: usize,
    cells: Vec<Vector2>,
}

impl PositionMatrix {
    fn resize(&mut self, count: usize, depth: usize) {
        self.depth = depth;
        self.count = count;
        self.cells = vec![Vector2::ZERO; depth * count];
    }

    fn set(&mut self, depth: usize, index: usize, value: Vector2) {
        if depth < self.depth && index < self.count {
            self.cells[depth * self.count + index] = value;
        }
    }

    /// `(depth, count)`.
    pub fn dimensions(&self) -> (usize, usize) {
        (self.depth, self.count)
    }

    pub fn get(&self, depth: usize, index: usize) -> Option<Vector2> {
        if depth < self.depth && index < self.count {
            Some(self.cells[depth * self.count + index])
        } else {
            None
        }
    }

    /// Most recent position of particle `index`.
    pub fn latest(&self, index: usize) -> Option<Vector2> {
        self.depth.checked_sub(1).and_then(|d| self.get(d, index))
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    fn to_json(&self) -> Value {
        let rows: Vec<Vec<[f64; 2]>> = (0..self.depth)
            .map(|d| {
                self.cells[d * self.count..(d + 1) * self.count]
                    .iter()
                    .map(|&v| v.into())
                    .collect()
            })
            .collect();
        json!(rows)
    }
}

/// In-memory sink holding one matrix per pool plus the grid rest positions,
/// all mapped into the output range.
#[derive(Debug, Clone)]
pub struct MatrixSink {
    grid: PositionMatrix,
    free: PositionMatrix,
    rest: Vec<Vector2>,
    scale: LinearScale,
}

impl MatrixSink {
    /// Sink mapping `simulation` bounds onto `output` bounds.
    pub fn new(simulation: Bounds, output: Bounds) -> Self {
        Self {
            grid: PositionMatrix::default(),
            free: PositionMatrix::default(),
            rest: Vec::new(),
            scale: LinearScale::new(simulation, output),
        }
    }

    /// Sink writing simulation coordinates unchanged.
    pub fn identity() -> Self {
        Self {
            scale: LinearScale::identity(),
            ..Self::default()
        }
    }

    pub fn matrix(&self, pool: PoolKind) -> &PositionMatrix {
        match pool {
            PoolKind::Grid => &self.grid,
            PoolKind::Free => &self.free,
        }
    }

    pub fn rest(&self) -> &[Vector2] {
        &self.rest
    }

    /// Both matrices and the rest positions as nested `[x, y]` arrays.
    pub fn to_json(&self) -> Value {
        let rest: Vec<[f64; 2]> = self.rest.iter().map(|&v| v.into()).collect();
        json!({
            "grid": self.grid.to_json(),
            "free": self.free.to_json(),
            "rest": rest,
        })
    }

    fn matrix_mut(&mut self, pool: PoolKind) -> &mut PositionMatrix {
        match pool {
            PoolKind::Grid => &mut self.grid,
            PoolKind::Free => &mut self.free,
        }
    }
}

impl Default for MatrixSink {
    /// Unit-square simulation space drawn into `[-1, 1]²`.
    fn default() -> Self {
        Self::new(Bounds::unit(), Bounds::symmetric())
    }
}

impl OutputSink for MatrixSink {
    fn resize(&mut self, pool: PoolKind, count: usize, memory: usize) {
        self.matrix_mut(pool).resize(count, memory);
    }

    fn write(&mut self, pool: PoolKind, slot: usize, history: &VecDeque<Vector2>) {
        let scale = self.scale;
        let matrix = self.matrix_mut(pool);
        for (depth, &position) in history.iter().enumerate() {
            matrix.set(depth, slot, scale.apply(position));
        }
    }

    fn write_rest(&mut self, rest: &[Vector2]) {
        self.rest = self.scale.apply_all(rest);
    }

    fn clear(&mut self, pool: PoolKind) {
        self.matrix_mut(pool).resize(0, 0);
        if pool == PoolKind::Grid {
            self.rest.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(points: &[(f64, f64)]) -> VecDeque<Vector2> {
        points.iter().map(|&p| Vector2::from(p)).collect()
    }

    #[test]
    fn write_lays_out_depth_by_index() {
        let mut sink = MatrixSink::identity();
        sink.resize(PoolKind::Free, 3, 2);
        sink.write(PoolKind::Free, 1, &history(&[(0.1, 0.1), (0.2, 0.2)]));
        let m = sink.matrix(PoolKind::Free);
        assert_eq!(m.dimensions(), (2, 3));
        assert_eq!(m.get(0, 1), Some(Vector2::new(0.1, 0.1)));
        assert_eq!(m.latest(1), Some(Vector2::new(0.2, 0.2)));
        assert_eq!(m.get(1, 0), Some(Vector2::ZERO));
    }

    #[test]
    fn out_of_range_writes_are_dropped() {
        let mut sink = MatrixSink::identity();
        sink.resize(PoolKind::Grid, 1, 1);
        sink.write(PoolKind::Grid, 5, &history(&[(0.5, 0.5)]));
        assert_eq!(sink.matrix(PoolKind::Grid).get(0, 5), None);
        assert_eq!(sink.matrix(PoolKind::Grid).get(0, 0), Some(Vector2::ZERO));
    }

    #[test]
    fn default_sink_maps_into_symmetric_range() {
        let mut sink = MatrixSink::default();
        sink.resize(PoolKind::Grid, 1, 1);
        sink.write(PoolKind::Grid, 0, &history(&[(1.0, 0.5)]));
        let p = sink.matrix(PoolKind::Grid).latest(0).unwrap();
        assert!((p - Vector2::new(1.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn clear_empties_pool_and_rest() {
        let mut sink = MatrixSink::identity();
        sink.resize(PoolKind::Grid, 4, 2);
        sink.write_rest(&[Vector2::new(0.5, 0.5)]);
        sink.clear(PoolKind::Grid);
        assert!(sink.matrix(PoolKind::Grid).is_empty());
        assert!(sink.rest().is_empty());
        assert_eq!(sink.matrix(PoolKind::Grid).latest(0), None);
    }

    #[test]
    fn json_nests_rows_by_depth() {
        let mut sink = MatrixSink::identity();
        sink.resize(PoolKind::Free, 2, 1);
        sink.write(PoolKind::Free, 0, &history(&[(0.25, 0.75)]));
        let json = sink.to_json();
        assert_eq!(json["free"][0][0][0], 0.25);
        assert_eq!(json["free"][0][1][1], 0.0);
        assert_eq!(json["grid"].as_array().unwrap().len(), 0);
    }
}
