//! Wires every phase into a single entry point: a `Pipeline` call owns its
//! blocks, mesh and stats locally instead of relying on module-level
//! statics, so concurrent runs never share mutable state.

use tracing::{info, info_span};

use crate::balancer::{LoadBalanceMessage, LoadBalancer};
use crate::block::Block;
use crate::config::Options;
use crate::detector::{CriticalPointDetector, DetectionStats};
use crate::exchange::InProcessExchange;
use crate::field::{Field, GradientField};
use crate::lattice::Lattice;
use crate::relation::RelationBuilder;
use crate::simplex::SimplexMesh;
use crate::trajectory::{Trajectory, TrajectoryAssembler};
use crate::unionfind::{DistributedUnionFind, UnionMessage};

/// Aggregate numerical-rejection diagnostics across every rank, reported
/// at finalization. Never consulted for control flow.
#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub detection: DetectionStats,
    /// The converged global state, kept around for optional debugging
    /// dumps (structured intersection dump, connected-set dump).
    /// Populated unconditionally; callers that don't need it simply
    /// ignore the field.
    pub diagnostics: Diagnostics,
}

/// Post-convergence state a caller can feed to [`crate::io::dump_intersections_json`]
/// or [`crate::io::dump_components`].
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    pub intersections: std::collections::BTreeMap<crate::simplex::SimplexId, crate::detector::Intersection>,
    pub components: std::collections::BTreeMap<crate::simplex::SimplexId, Vec<crate::simplex::SimplexId>>,
}

/// Runs the full extraction-to-trajectories pipeline over a scalar field
/// sampled on a regular lattice:
///
/// `scalar volume -> FieldOps -> CriticalPointDetector -> RelationBuilder
/// -> initial union-find forest -> [LoadBalancer -> re-init forest] ->
/// DistributedUnionFind convergence -> TrajectoryAssembler -> curves`.
pub struct Pipeline;

impl Pipeline {
    pub fn run(lattice: Lattice, values: Vec<f64>, options: &Options) -> crate::error::Result<(Vec<Trajectory>, Stats)> {
        options.validate()?;

        let global_field = Field::new(lattice.clone(), values);
        let global_mesh = SimplexMesh::new(lattice.clone());
        let partitions = lattice.partition(options.nblocks, options.ghost_margin);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.nthreads)
            .build()
            .map_err(|e| crate::error::CritraceError::InvalidInput(e.to_string()))?;

        let mut blocks = Vec::with_capacity(partitions.len());
        let mut stats = Stats::default();

        for (rank, core, ghost) in partitions {
            let _span = info_span!("detect", rank = rank.0).entered();
            let sub_field = global_field.restrict(&ghost);
            let sub_gradient = GradientField::compute(&sub_field);
            let sub_mesh = SimplexMesh::new(ghost.clone());

            let (intersections, detection_stats) = pool.install(|| {
                let detector =
                    CriticalPointDetector::new(&sub_mesh, &sub_field, &sub_gradient, options.critical_point_type);
                detector.run()
            });
            stats.detection.singular += detection_stats.singular;
            stats.detection.outside_simplex += detection_stats.outside_simplex;
            stats.detection.not_maximum += detection_stats.not_maximum;
            info!(rank = rank.0, found = intersections.len(), "detection complete");

            let mut block = Block::new(rank, core.clone(), ghost);
            for intersection in intersections {
                block.add(intersection);
            }

            RelationBuilder::new(&sub_mesh, &core).build(&mut block.intersections);
            DistributedUnionFind::seed(&mut block);

            blocks.push(block);
        }

        if options.load_balancing {
            let _span = info_span!("balance").entered();
            let peers = InProcessExchange::<LoadBalanceMessage>::simulate(blocks.len());
            LoadBalancer::rebalance(&mut blocks, &peers)?;
            for block in &mut blocks {
                DistributedUnionFind::seed(block);
            }
        }

        {
            let _span = info_span!("converge").entered();
            let peers = InProcessExchange::<UnionMessage>::simulate(blocks.len());
            DistributedUnionFind::converge(&mut blocks, &peers)?;
        }

        let trajectories = {
            let _span = info_span!("assemble").entered();
            TrajectoryAssembler::assemble(&blocks, &global_mesh, options)
        };
        stats.diagnostics.intersections = TrajectoryAssembler::merge_intersections(&blocks);
        stats.diagnostics.components = TrajectoryAssembler::components(&blocks);
        info!(trajectories = trajectories.len(), rejected = stats.detection.rejected(), "pipeline complete");

        Ok((trajectories, stats))
    }
}
