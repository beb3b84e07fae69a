//! Typed error taxonomy for the pipeline.
//!
//! Numerical rejections (degenerate simplices, singular gradients,
//! out-of-range barycentric coordinates) are *not* represented here: they
//! are silently skipped and aggregated in [`crate::pipeline::Stats`]
//! instead, since they're routine outcomes rather than failures.

use crate::simplex::SimplexId;
use crate::Rank;

/// Fatal errors surfaced by the pipeline.
///
/// Input errors are the only category expected before the pipeline has
/// started; the rest (routing, protocol, transport) indicate corrupt
/// distributed state and are always fatal.
#[derive(Debug, thiserror::Error)]
pub enum CritraceError {
    /// Malformed dimensions, unreadable input, mismatched variable count.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A `related` id's owning block could not be located during
    /// load-balancer re-init. Indicates a feature was dropped while
    /// rebalancing.
    #[error("routing error: could not locate owner of {id:?} (coordinate {x:?}) on rank {rank:?}")]
    Routing {
        rank: Rank,
        id: SimplexId,
        x: Vec<f64>,
    },

    /// A cycle was detected in `parent`, or a message arrived for an id
    /// the receiver does not own.
    #[error("protocol error on rank {rank:?}: {reason}")]
    Protocol { rank: Rank, reason: String },

    /// The message substrate failed to deliver or flush a message.
    #[error("transport error on rank {rank:?}: {reason}")]
    Transport { rank: Rank, reason: String },
}

pub type Result<T> = std::result::Result<T, CritraceError>;
