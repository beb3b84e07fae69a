//! k-d tree load balancing over intersection coordinates: redistributes
//! intersections so each rank holds roughly the same number of features,
//! independent of the original lattice decomposition.

use serde::{Deserialize, Serialize};

use crate::block::Block;
use crate::detector::Intersection;
use crate::error::{CritraceError, Result};
use crate::exchange::InProcessExchange;
use crate::simplex::SimplexId;
use crate::Rank;

/// A convex rectangular region of continuous bounds, one per rank after
/// balancing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bounds {
    lower: Vec<i64>,
    upper: Vec<i64>,
}

impl Bounds {
    fn of(points: &[Vec<i64>]) -> Self {
        let dim = points[0].len();
        let mut lower = points[0].clone();
        let mut upper = points[0].clone();
        for p in &points[1..] {
            for axis in 0..dim {
                lower[axis] = lower[axis].min(p[axis]);
                upper[axis] = upper[axis].max(p[axis]);
            }
        }
        Bounds { lower, upper }
    }

    /// Whether `point` lies within this region's closed bounds.
    pub fn contains(&self, point: &[i64]) -> bool {
        point
            .iter()
            .zip(&self.lower)
            .zip(&self.upper)
            .all(|((&p, &lo), &hi)| lo <= p && p <= hi)
    }
}

/// Serialization-friendly stand-in for [`Intersection`]: `nalgebra`'s
/// `DVector` isn't `Serialize` without an extra feature flag, and this
/// crate only needs wire serialization at this one boundary, so a plain
/// `Vec<f64>` does the job instead of widening the dependency surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireIntersection {
    pub eid: SimplexId,
    pub x: Vec<f64>,
    pub val: f64,
    pub corner: Vec<i64>,
    pub related: Vec<SimplexId>,
}

impl From<&Intersection> for WireIntersection {
    fn from(i: &Intersection) -> Self {
        WireIntersection {
            eid: i.eid.clone(),
            x: i.x.iter().copied().collect(),
            val: i.val,
            corner: i.corner.clone(),
            related: i.related.iter().cloned().collect(),
        }
    }
}

impl From<WireIntersection> for Intersection {
    fn from(w: WireIntersection) -> Self {
        Intersection {
            eid: w.eid,
            x: nalgebra::DVector::from_vec(w.x),
            val: w.val,
            corner: w.corner,
            related: w.related.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LoadBalanceMessage {
    Bounds(Bounds),
    Relocate(WireIntersection),
}

pub struct LoadBalancer;

impl LoadBalancer {
    /// Redistributes every block's intersections across `blocks.len()`
    /// ranks in four phases: gather the point cloud and build the k-d
    /// regions, broadcast them, relocate each intersection to the rank
    /// whose region contains it, then reconcile ownership of the ids its
    /// `related` edges reference.
    pub fn rebalance(blocks: &mut [Block], peers: &[InProcessExchange<LoadBalanceMessage>]) -> Result<()> {
        assert_eq!(blocks.len(), peers.len());
        let nblocks = blocks.len();

        // Phase 1: gather the point cloud and build the k-d regions.
        let mut points: Vec<(SimplexId, Vec<i64>)> = Vec::new();
        for block in blocks.iter() {
            points.extend(
                block
                    .intersections
                    .keys()
                    .map(|id| (id.clone(), id.corner())),
            );
        }

        let buckets = Self::recursive_split(points, nblocks);
        let bounds: Vec<Bounds> = buckets
            .iter()
            .map(|b| {
                if b.is_empty() {
                    Bounds {
                        lower: vec![],
                        upper: vec![],
                    }
                } else {
                    let coords: Vec<Vec<i64>> = b.iter().map(|(_, c)| c.clone()).collect();
                    Bounds::of(&coords)
                }
            })
            .collect();

        // Phase 2: broadcast every rank's new bounds. Each peer sends its
        // own region to every other peer; since the coordinator already
        // computed the full `bounds` table, every block is simply handed
        // that table once its queue has drained the (otherwise unused)
        // broadcast messages.
        for (i, peer) in peers.iter().enumerate() {
            for j in 0..nblocks {
                if i != j {
                    peer.send(Rank(j), LoadBalanceMessage::Bounds(bounds[i].clone()))?;
                }
            }
        }
        for (block, peer) in blocks.iter_mut().zip(peers) {
            peer.recv_all();
            block.all_bounds = bounds.clone();
        }

        // Phase 3: re-emit intersections to their target rank.
        for (rank_idx, block) in blocks.iter().enumerate() {
            for intersection in block.intersections.values() {
                let target = Self::resolve_target(&bounds, &intersection.corner)
                    .ok_or_else(|| CritraceError::Routing {
                        rank: Rank(rank_idx),
                        id: intersection.eid.clone(),
                        x: intersection.x.iter().copied().collect(),
                    })?;
                peers[rank_idx].send(
                    target,
                    LoadBalanceMessage::Relocate(WireIntersection::from(intersection)),
                )?;
            }
        }

        // Phase 4: rebuild each block's union-find state from what it
        // received, then resolve `gid_of` for every `related` id.
        for block in blocks.iter_mut() {
            block.intersections.clear();
            block.parent.clear();
            block.gid_of.clear();
        }
        for (block, peer) in blocks.iter_mut().zip(peers) {
            for (_, msg) in peer.recv_all() {
                if let LoadBalanceMessage::Relocate(wire) = msg {
                    block.add(Intersection::from(wire));
                }
            }
        }

        for block in blocks.iter_mut() {
            let related_ids: Vec<SimplexId> = block
                .intersections
                .values()
                .flat_map(|i| i.related.iter().cloned())
                .collect();
            for r in related_ids {
                let owner = Self::resolve_target(&bounds, &r.corner()).ok_or_else(|| {
                    CritraceError::Routing {
                        rank: block.rank(),
                        id: r.clone(),
                        x: r.corner().iter().map(|&c| c as f64).collect(),
                    }
                })?;
                block.gid_of.insert(r, owner);
            }
        }

        Ok(())
    }

    /// Highest rank whose bounds contain `point`; ties at shared region
    /// boundaries resolve to the higher rank, deterministically.
    fn resolve_target(bounds: &[Bounds], point: &[i64]) -> Option<Rank> {
        bounds
            .iter()
            .enumerate()
            .rev()
            .find(|(_, b)| !b.lower.is_empty() && b.contains(point))
            .map(|(i, _)| Rank(i))
    }

    /// Recursively bisects `points` on the longest axis by point count
    /// (a weighted-median split where every point carries equal weight),
    /// producing exactly `nblocks` buckets (possibly empty, if points run
    /// out before ranks do).
    fn recursive_split(mut points: Vec<(SimplexId, Vec<i64>)>, nblocks: usize) -> Vec<Vec<(SimplexId, Vec<i64>)>> {
        if nblocks <= 1 {
            return vec![points];
        }
        if points.len() < 2 {
            let mut out = vec![points];
            out.resize_with(nblocks, Vec::new);
            return out;
        }

        let dim = points[0].1.len();
        let axis = (0..dim)
            .max_by_key(|&a| {
                let lo = points.iter().map(|p| p.1[a]).min().unwrap();
                let hi = points.iter().map(|p| p.1[a]).max().unwrap();
                hi - lo
            })
            .unwrap();
        points.sort_by_key(|p| p.1[axis]);

        let left_count = nblocks / 2;
        let right_count = nblocks - left_count;
        let split_idx = (points.len() * left_count / nblocks).clamp(1, points.len() - 1);
        let right = points.split_off(split_idx);

        let mut out = Self::recursive_split(points, left_count);
        out.extend(Self::recursive_split(right, right_count));
        out
    }
}
