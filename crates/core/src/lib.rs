#![deny(unsafe_code)]
//! Core of the blobfield particle-force engine.
//!
//! A [`ParticleSystem`] advances a grid of spring-anchored particles and a
//! bounded pool of free particles. Forces come from tracked blobs through
//! their [`Brush`], from [`Magnet`]s, and from an optional [`FluidSampler`].
//! Positions are published to an [`OutputSink`] after every tick.

pub mod blob;
pub mod brush;
pub mod error;
pub mod fluid;
pub mod magnet;
pub mod params;
pub mod particle;
pub mod prng;
pub mod scale;
pub mod selection;
pub mod sink;
pub mod system;
pub mod vector;

pub use blob::{BlobModes, BlobRegistry, BlobTracker};
pub use brush::{Brush, BrushKind, RectAnchor};
pub use error::SimError;
pub use fluid::{FluidSampler, GridFluid, NoiseFluid};
pub use magnet::{Magnet, MagnetRegistry, MagnetShape};
pub use params::{EdgePolicy, Edges, SystemParams, Threshold};
pub use particle::Particle;
pub use prng::Xorshift64;
pub use scale::{Bounds, LinearScale};
pub use selection::Selection;
pub use sink::{MatrixSink, OutputSink, PoolKind, PositionMatrix};
pub use system::ParticleSystem;
pub use vector::{Line, Vector2};
