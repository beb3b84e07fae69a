//! A distributed feature-tracking toolkit: extract critical points from a
//! time-varying scalar field sampled on a regular grid, link them across
//! process-local subdomains, and stitch the result into trajectories with
//! a distributed union-find.
//!
//! # Crate layout
//!
//! The pipeline is a straight line through the module tree, mirroring the
//! data flow:
//!
//! `scalar volume` → [`lattice`] / [`simplex`] (index the domain) →
//! [`field`] (gradient, Hessian) → [`detector`] (critical points) →
//! [`relation`] (link siblings) → [`unionfind`] (initial forest) →
//! [`balancer`] (optional rebalancing) → [`unionfind`] (convergence) →
//! [`trajectory`] (assemble curves) → [`io`] (write results).
//!
//! [`pipeline::Pipeline`] wires all of the above into a single entry point;
//! [`config::Options`] is the knob surface, and [`error::CritraceError`] is
//! the fatal-error taxonomy.

pub mod balancer;
pub mod block;
pub mod config;
pub mod detector;
pub mod error;
pub mod exchange;
pub mod field;
pub mod io;
pub mod lattice;
pub mod pipeline;
pub mod relation;
pub mod simplex;
pub mod trajectory;
pub mod unionfind;

/// A rank index: which process owns a given [`block::Block`].
///
/// A thin newtype over `usize` so ownership bookkeeping reads clearly at
/// call sites instead of passing bare integers around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct Rank(pub usize);

pub use config::{CriticalPointType, Options};
pub use detector::Intersection;
pub use error::{CritraceError, Result};
pub use pipeline::{Diagnostics, Pipeline, Stats};
pub use trajectory::Trajectory;
