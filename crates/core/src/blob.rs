//! External perturbation sources and their registry.
//!
//! A [`BlobTracker`] turns a stream of reported positions into significant
//! movements, each weighted by the tracker's force. The [`BlobRegistry`] is
//! the producer/consumer boundary: any number of callers may report
//! positions or reconfigure trackers, while the orchestrator alone calls
//! [`BlobRegistry::drain`] once per tick to collect every pending movement as
//! a single batch.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::brush::Brush;
use crate::error::{reject, SimError};
use crate::params::Threshold;
use crate::selection::Selection;
use crate::vector::Vector2;

/// Pending movements kept per tracker between two drains.
pub const MAX_PENDING_MOVEMENTS: usize = 256;

/// Significance window of a freshly created tracker.
pub const DEFAULT_BLOB_THRESHOLD: Threshold = Threshold { min: 0.0, max: 1.0 };

/// One committed blob movement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Movement {
    /// Tracker position after the move.
    pub position: Vector2,
    /// Displacement weighted by the tracker's force at commit time.
    pub delta: Vector2,
}

/// Behavior switches of a tracker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobModes {
    /// Push particles under the brush along the movement.
    pub force: bool,
    /// Delete free particles under the brush.
    pub eraser: bool,
    /// Pull particles under the brush toward the blob.
    pub attractivity: bool,
}

#[derive(Debug, Clone)]
pub struct BlobTracker {
    position: Vector2,
    last_delta: Vector2,
    pending: VecDeque<Movement>,
    force: f64,
    attractive_force: f64,
    brush: Brush,
    modes: BlobModes,
    spawn_count: usize,
    threshold: Threshold,
}

impl BlobTracker {
    pub fn new(position: Vector2) -> Self {
        Self {
            position,
            last_delta: Vector2::ZERO,
            pending: VecDeque::new(),
            force: 0.0,
            attractive_force: 0.0,
            brush: Brush::default(),
            modes: BlobModes::default(),
            spawn_count: 0,
            threshold: DEFAULT_BLOB_THRESHOLD,
        }
    }

    /// Moves toward `target`, recording a movement if the displacement is
    /// significant. Displacements above the ceiling are shortened, and the
    /// tracker only advances by the shortened amount.
    ///
    /// Returns whether a movement was committed.
    pub fn move_to(&mut self, target: Vector2) -> bool {
        let Some(delta) = self.threshold.filter(target - self.position) else {
            return false;
        };

        self.position += delta;
        self.last_delta = delta;

        if self.pending.len() >= MAX_PENDING_MOVEMENTS {
            self.pending.pop_front();
            log::warn!(
                "blob movement queue full ({MAX_PENDING_MOVEMENTS}), dropping oldest movement"
            );
        }
        self.pending.push_back(Movement {
            position: self.position,
            delta: delta * self.force,
        });
        true
    }

    /// Returns every movement recorded since the previous drain and forgets them.
    pub fn drain_movements(&mut self) -> Vec<Movement> {
        self.pending.drain(..).collect()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn position(&self) -> Vector2 {
        self.position
    }

    /// Last committed displacement, unweighted.
    pub fn last_delta(&self) -> Vector2 {
        self.last_delta
    }

    pub fn force(&self) -> f64 {
        self.force
    }

    pub fn attractive_force(&self) -> f64 {
        self.attractive_force
    }

    pub fn brush(&self) -> Brush {
        self.brush
    }

    pub fn modes(&self) -> BlobModes {
        self.modes
    }

    pub fn spawn_count(&self) -> usize {
        self.spawn_count
    }

    pub fn threshold(&self) -> Threshold {
        self.threshold
    }

    pub fn set_force(&mut self, force: f64) {
        self.force = force;
    }

    pub fn set_attractive_force(&mut self, force: f64) {
        self.attractive_force = force;
    }

    pub fn set_brush(&mut self, brush: Brush) {
        self.brush = brush;
    }

    pub fn set_threshold(&mut self, threshold: Threshold) {
        self.threshold = threshold;
    }
}

impl Default for BlobTracker {
    fn default() -> Self {
        Self::new(Vector2::ZERO)
    }
}

impl fmt::Display for BlobTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Position {} Force {} AttractiveForce {} {} ApplyForce {} ApplyEraser {} ApplyAttractivity {} Spawn {} Threshold {} {}",
            self.position,
            self.force,
            self.attractive_force,
            self.brush,
            self.modes.force,
            self.modes.eraser,
            self.modes.attractivity,
            self.spawn_count,
            self.threshold.min,
            self.threshold.max,
        )
    }
}

/// Everything the orchestrator needs from one tracker for one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct BlobFrame {
    pub index: usize,
    pub modes: BlobModes,
    pub brush: Brush,
    pub attractive_force: f64,
    pub spawn_count: usize,
    /// Tracker position once all drained movements are applied.
    pub position: Vector2,
    /// Never empty.
    pub movements: Vec<Movement>,
}

#[derive(Debug, Default)]
struct Trackers {
    by_index: BTreeMap<usize, BlobTracker>,
    /// Indices reported since the last drain, in first-report order.
    updated: Vec<usize>,
}

impl Trackers {
    /// Trackers targeted by `selection`. A single index is created on demand.
    fn select(&mut self, selection: Selection) -> Vec<(usize, &mut BlobTracker)> {
        match selection {
            Selection::All => self.by_index.iter_mut().map(|(&i, t)| (i, t)).collect(),
            Selection::Index(i) => vec![(i, self.by_index.entry(i).or_default())],
        }
    }
}

/// Thread-safe set of blob trackers keyed by index.
#[derive(Debug, Default)]
pub struct BlobRegistry {
    inner: Mutex<Trackers>,
}

impl BlobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes a reported position to tracker `index`.
    ///
    /// The first report for an index creates the tracker at that position
    /// without recording a movement.
    pub fn report(&self, index: usize, position: Vector2) {
        let mut inner = self.inner.lock();
        match inner.by_index.get_mut(&index) {
            Some(tracker) => {
                tracker.move_to(position);
            }
            None => {
                inner.by_index.insert(index, BlobTracker::new(position));
            }
        }
        if !inner.updated.contains(&index) {
            inner.updated.push(index);
        }
    }

    /// Collects the pending movements of every tracker reported since the
    /// previous drain, clearing them. Trackers with nothing committed are
    /// left out.
    pub fn drain(&self) -> Vec<BlobFrame> {
        let mut inner = self.inner.lock();
        let updated = std::mem::take(&mut inner.updated);
        updated
            .into_iter()
            .filter_map(|index| {
                let tracker = inner.by_index.get_mut(&index)?;
                let movements = tracker.drain_movements();
                if movements.is_empty() {
                    return None;
                }
                Some(BlobFrame {
                    index,
                    modes: tracker.modes,
                    brush: tracker.brush,
                    attractive_force: tracker.attractive_force,
                    spawn_count: tracker.spawn_count,
                    position: tracker.position,
                    movements,
                })
            })
            .collect()
    }

    pub fn set_force(&self, selection: Selection, force: f64) {
        for (_, tracker) in self.inner.lock().select(selection) {
            tracker.force = force;
        }
    }

    pub fn set_attractive_force(&self, selection: Selection, force: f64) {
        for (_, tracker) in self.inner.lock().select(selection) {
            tracker.attractive_force = force;
        }
    }

    /// Replaces the brush.
    pub fn set_brush(&self, selection: Selection, brush: Brush) {
        for (_, tracker) in self.inner.lock().select(selection) {
            tracker.brush = brush;
        }
    }

    /// Changes the radius of circle brushes. Trackers carrying a rectangle
    /// are left alone and reported.
    pub fn set_circle_radius(&self, selection: Selection, radius: f64) -> Result<(), SimError> {
        let mut mismatch = None;
        for (index, tracker) in self.inner.lock().select(selection) {
            match &mut tracker.brush {
                Brush::Circle { radius: r } => *r = radius,
                Brush::Rectangle { .. } => {
                    mismatch.get_or_insert(SimError::BrushMismatch {
                        index,
                        expected: "circle".into(),
                    });
                }
            }
        }
        mismatch.map_or(Ok(()), reject)
    }

    /// Changes the size of rectangle brushes. Trackers carrying a circle are
    /// left alone and reported.
    pub fn set_rectangle_size(
        &self,
        selection: Selection,
        width: f64,
        height: f64,
    ) -> Result<(), SimError> {
        let mut mismatch = None;
        for (index, tracker) in self.inner.lock().select(selection) {
            match &mut tracker.brush {
                Brush::Rectangle {
                    width: w,
                    height: h,
                    ..
                } => {
                    *w = width;
                    *h = height;
                }
                Brush::Circle { .. } => {
                    mismatch.get_or_insert(SimError::BrushMismatch {
                        index,
                        expected: "rectangle".into(),
                    });
                }
            }
        }
        mismatch.map_or(Ok(()), reject)
    }

    pub fn set_threshold(&self, selection: Selection, min: f64, max: f64) -> Result<(), SimError> {
        let threshold = Threshold::new(min, max)?;
        for (_, tracker) in self.inner.lock().select(selection) {
            tracker.threshold = threshold;
        }
        Ok(())
    }

    pub fn set_apply_force(&self, selection: Selection, apply: bool) {
        for (index, tracker) in self.inner.lock().select(selection) {
            tracker.modes.force = apply;
            warn_force_and_attractivity(index, tracker);
        }
    }

    pub fn set_apply_attractivity(&self, selection: Selection, apply: bool) {
        for (index, tracker) in self.inner.lock().select(selection) {
            tracker.modes.attractivity = apply;
            warn_force_and_attractivity(index, tracker);
        }
    }

    pub fn set_apply_eraser(&self, selection: Selection, apply: bool) {
        for (index, tracker) in self.inner.lock().select(selection) {
            tracker.modes.eraser = apply;
            warn_spawn_and_erase(index, tracker);
        }
    }

    /// Number of free particles spawned at the tracker on each tick it moves.
    pub fn set_spawn_count(&self, selection: Selection, count: usize) {
        for (index, tracker) in self.inner.lock().select(selection) {
            tracker.spawn_count = count;
            warn_spawn_and_erase(index, tracker);
        }
    }

    /// Snapshot of tracker `index`, if registered.
    pub fn tracker(&self, index: usize) -> Option<BlobTracker> {
        self.inner.lock().by_index.get(&index).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().by_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().by_index.is_empty()
    }

    /// Human-readable description of tracker `index`.
    pub fn info(&self, index: usize) -> String {
        match self.inner.lock().by_index.get(&index) {
            Some(tracker) => format!("Blob n°{index} {tracker}"),
            None => format!("There is no blob n°{index}."),
        }
    }

    /// Registered indices, in ascending order.
    pub fn list(&self) -> String {
        let inner = self.inner.lock();
        if inner.by_index.is_empty() {
            return "Currently, there is no blob in this simulation.".to_string();
        }
        inner
            .by_index
            .keys()
            .fold(String::from("BlobsIndexes"), |acc, i| format!("{acc} {i}"))
    }

    /// Forgets every tracker and every pending movement.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.by_index.clear();
        inner.updated.clear();
    }
}

fn warn_force_and_attractivity(index: usize, tracker: &BlobTracker) {
    if tracker.modes.force && tracker.modes.attractivity {
        log::warn!("blob n°{index}: applying attractivity and force at the same time");
    }
}

fn warn_spawn_and_erase(index: usize, tracker: &BlobTracker) {
    if tracker.modes.eraser && tracker.spawn_count > 0 {
        log::warn!(
            "blob n°{index}: it does not seem brilliant to add and delete particles at the same time"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brush::RectAnchor;

    fn v(x: f64, y: f64) -> Vector2 {
        Vector2::new(x, y)
    }

    #[test]
    fn new_tracker_has_quiet_defaults() {
        let t = BlobTracker::default();
        assert_eq!(t.position(), Vector2::ZERO);
        assert_eq!(t.force(), 0.0);
        assert_eq!(t.modes(), BlobModes::default());
        assert_eq!(t.brush(), Brush::circle(0.1));
        assert_eq!(t.threshold(), DEFAULT_BLOB_THRESHOLD);
        assert_eq!(t.pending_len(), 0);
    }

    #[test]
    fn significance_filter_drops_small_moves() {
        let mut t = BlobTracker::new(v(0.0, 0.0));
        t.set_threshold(Threshold::new(0.05, 1.0).unwrap());
        let steps = [0.1, 0.01, 0.1, 0.02, 0.1];
        let mut x = 0.0;
        for s in steps {
            x += s;
            t.move_to(v(x, 0.0));
        }
        assert_eq!(t.pending_len(), 3);
    }

    #[test]
    fn large_move_is_clamped_to_ceiling() {
        let mut t = BlobTracker::new(v(0.0, 0.0));
        t.set_threshold(Threshold::new(0.0, 0.5).unwrap());
        t.set_force(2.0);
        assert!(t.move_to(v(3.0, 4.0)));
        assert!((t.position() - v(0.3, 0.4)).norm() < 1e-12);
        let moves = t.drain_movements();
        assert_eq!(moves.len(), 1);
        assert!((moves[0].delta.norm() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn movement_delta_is_weighted_by_force() {
        let mut t = BlobTracker::new(v(0.0, 0.0));
        t.set_force(0.5);
        t.move_to(v(0.2, 0.0));
        let moves = t.drain_movements();
        assert_eq!(moves[0].delta, v(0.1, 0.0));
        assert_eq!(moves[0].position, v(0.2, 0.0));
        assert_eq!(t.last_delta(), v(0.2, 0.0));
    }

    #[test]
    fn drain_empties_the_queue() {
        let mut t = BlobTracker::default();
        t.move_to(v(0.5, 0.0));
        assert_eq!(t.drain_movements().len(), 1);
        assert!(t.drain_movements().is_empty());
    }

    #[test]
    fn queue_is_bounded() {
        let mut t = BlobTracker::default();
        for i in 0..(MAX_PENDING_MOVEMENTS + 10) {
            let x = if i % 2 == 0 { 0.5 } else { 0.0 };
            t.move_to(v(x, 0.0));
        }
        assert_eq!(t.pending_len(), MAX_PENDING_MOVEMENTS);
    }

    #[test]
    fn first_report_creates_without_movement() {
        let reg = BlobRegistry::new();
        reg.report(4, v(0.3, 0.3));
        assert_eq!(reg.tracker(4).unwrap().position(), v(0.3, 0.3));
        assert!(reg.drain().is_empty());
    }

    #[test]
    fn drain_batches_every_updated_tracker_once() {
        let reg = BlobRegistry::new();
        reg.report(0, v(0.0, 0.0));
        reg.report(1, v(0.0, 0.0));
        reg.drain();

        reg.report(1, v(0.2, 0.0));
        reg.report(0, v(0.1, 0.0));
        reg.report(1, v(0.4, 0.0));

        let frames = reg.drain();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].index, 1);
        assert_eq!(frames[0].movements.len(), 2);
        assert_eq!(frames[0].position, v(0.4, 0.0));
        assert_eq!(frames[1].index, 0);
        assert!(reg.drain().is_empty());
    }

    #[test]
    fn setters_create_missing_tracker() {
        let reg = BlobRegistry::new();
        reg.set_force(Selection::Index(2), 0.7);
        let t = reg.tracker(2).unwrap();
        assert_eq!(t.force(), 0.7);
        assert_eq!(t.position(), Vector2::ZERO);
    }

    #[test]
    fn select_all_touches_every_tracker() {
        let reg = BlobRegistry::new();
        reg.report(0, v(0.0, 0.0));
        reg.report(5, v(0.0, 0.0));
        reg.set_apply_force(Selection::All, true);
        assert!(reg.tracker(0).unwrap().modes().force);
        assert!(reg.tracker(5).unwrap().modes().force);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn conflicting_modes_still_apply() {
        let reg = BlobRegistry::new();
        reg.set_apply_eraser(Selection::Index(0), true);
        reg.set_spawn_count(Selection::Index(0), 3);
        let t = reg.tracker(0).unwrap();
        assert!(t.modes().eraser);
        assert_eq!(t.spawn_count(), 3);
    }

    #[test]
    fn brush_resize_checks_kind() {
        let reg = BlobRegistry::new();
        reg.set_brush(Selection::Index(0), Brush::circle(0.1));
        reg.set_brush(
            Selection::Index(1),
            Brush::rectangle(0.1, 0.1, RectAnchor::Center),
        );

        assert!(reg.set_circle_radius(Selection::Index(0), 0.3).is_ok());
        assert_eq!(reg.tracker(0).unwrap().brush(), Brush::circle(0.3));

        let err = reg.set_circle_radius(Selection::Index(1), 0.3).unwrap_err();
        assert_eq!(
            err,
            SimError::BrushMismatch {
                index: 1,
                expected: "circle".into()
            }
        );

        assert!(reg.set_rectangle_size(Selection::All, 0.4, 0.2).is_err());
        assert_eq!(
            reg.tracker(1).unwrap().brush(),
            Brush::rectangle(0.4, 0.2, RectAnchor::Center)
        );
    }

    #[test]
    fn invalid_threshold_is_a_no_op() {
        let reg = BlobRegistry::new();
        reg.report(0, v(0.0, 0.0));
        assert!(reg.set_threshold(Selection::Index(0), 0.5, 0.1).is_err());
        assert_eq!(reg.tracker(0).unwrap().threshold(), DEFAULT_BLOB_THRESHOLD);
    }

    #[test]
    fn info_and_list_describe_registry() {
        let reg = BlobRegistry::new();
        assert_eq!(reg.list(), "Currently, there is no blob in this simulation.");
        assert_eq!(reg.info(3), "There is no blob n°3.");
        reg.report(2, v(0.0, 0.0));
        reg.report(0, v(0.0, 0.0));
        assert_eq!(reg.list(), "BlobsIndexes 0 2");
        assert!(reg.info(2).starts_with("Blob n°2 Position"));
    }

    #[test]
    fn reset_forgets_everything() {
        let reg = BlobRegistry::new();
        reg.report(0, v(0.0, 0.0));
        reg.report(0, v(0.5, 0.0));
        reg.reset();
        assert!(reg.is_empty());
        assert!(reg.drain().is_empty());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn pending_count_matches_significant_moves(
                steps in proptest::collection::vec(0.0_f64..0.2, 1..50),
            ) {
                let min = 0.05;
                let mut t = BlobTracker::new(Vector2::ZERO);
                t.set_threshold(Threshold::new(min, 1.0).unwrap());
                let mut expected = 0;
                let mut x = 0.0;
                for s in steps {
                    x += s;
                    if (x - t.position().x()).abs() > min {
                        expected += 1;
                    }
                    t.move_to(Vector2::new(x, 0.0));
                }
                prop_assert_eq!(t.pending_len(), expected);
            }

            #[test]
            fn committed_delta_never_exceeds_ceiling(
                x in -10.0_f64..10.0,
                y in -10.0_f64..10.0,
                max in 0.01_f64..2.0,
            ) {
                let mut t = BlobTracker::new(Vector2::ZERO);
                t.set_threshold(Threshold::new(0.0, max).unwrap());
                t.move_to(Vector2::new(x, y));
                prop_assert!(t.last_delta().norm() <= max + 1e-12);
            }
        }
    }
}
