//! Trajectory assembly: collect connected union-find components,
//! decompose each into maximal simple paths, and keep the ones that clear
//! the length/value thresholds.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::block::Block;
use crate::config::Options;
use crate::detector::Intersection;
use crate::simplex::{SimplexId, SimplexMesh};

/// A single tracked feature over time: an ordered sequence of
/// `(coordinate, value)` pairs.
#[derive(Debug, Clone)]
pub struct Trajectory {
    pub points: Vec<(nalgebra::DVector<f64>, f64)>,
}

impl Trajectory {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn max_val(&self) -> f64 {
        self.points.iter().map(|(_, v)| *v).fold(f64::NEG_INFINITY, f64::max)
    }
}

pub struct TrajectoryAssembler;

impl TrajectoryAssembler {
    /// Assembles every trajectory across the whole (already converged)
    /// distributed union-find, applying the configured filters.
    pub fn assemble(blocks: &[Block], mesh: &SimplexMesh, options: &Options) -> Vec<Trajectory> {
        let intersections = Self::merge_intersections(blocks);
        let components = Self::components(blocks);

        let mut trajectories = Vec::new();
        for members in components.into_values() {
            for path in Self::decompose_component(mesh, &members) {
                if let Some(trajectory) = Self::finalize(&intersections, path, options) {
                    trajectories.push(trajectory);
                }
            }
        }
        trajectories
    }

    /// Every block's intersections, merged into one global map. Exposed for
    /// [`crate::io::dump_intersections_json`] and similar diagnostics.
    pub fn merge_intersections(blocks: &[Block]) -> BTreeMap<SimplexId, Intersection> {
        let mut intersections = BTreeMap::new();
        for block in blocks {
            for (id, i) in &block.intersections {
                intersections.insert(id.clone(), i.clone());
            }
        }
        intersections
    }

    /// Each converged union-find root mapped to the members of its
    /// component, rank-ordered by canonical id. Exposed for
    /// [`crate::io::dump_components`]; [`Self::assemble`] decomposes each
    /// component further into paths, but the raw grouping is useful on its
    /// own for the connected-set dump.
    pub fn components(blocks: &[Block]) -> BTreeMap<SimplexId, Vec<SimplexId>> {
        let mut parent: BTreeMap<SimplexId, SimplexId> = BTreeMap::new();
        let mut ids: Vec<SimplexId> = Vec::new();
        for block in blocks {
            for (id, p) in &block.parent {
                parent.insert(id.clone(), p.clone());
            }
            ids.extend(block.intersections.keys().cloned());
        }

        let mut components: BTreeMap<SimplexId, Vec<SimplexId>> = BTreeMap::new();
        for id in ids {
            let root = Self::find(&parent, &id);
            components.entry(root).or_default().push(id);
        }
        for members in components.values_mut() {
            members.sort();
        }
        components
    }

    fn find(parent: &BTreeMap<SimplexId, SimplexId>, id: &SimplexId) -> SimplexId {
        let mut current = id.clone();
        loop {
            match parent.get(&current) {
                Some(p) if *p == current => return current,
                Some(p) => current = p.clone(),
                None => return current,
            }
        }
    }

    /// Links component members sharing a coboundary hypercell — the same
    /// relation [`crate::relation::RelationBuilder`] uses — then greedily
    /// peels off maximal simple paths until every member is assigned.
    fn decompose_component(mesh: &SimplexMesh, members: &[SimplexId]) -> Vec<Vec<SimplexId>> {
        let mut hypercell_members: HashMap<SimplexId, Vec<SimplexId>> = HashMap::new();
        for id in members {
            for hypercell in mesh.side_of(id) {
                hypercell_members.entry(hypercell).or_default().push(id.clone());
            }
        }

        let mut adjacency: HashMap<SimplexId, BTreeSet<SimplexId>> = HashMap::new();
        for ids in hypercell_members.values() {
            for i in 0..ids.len() {
                for j in (i + 1)..ids.len() {
                    adjacency.entry(ids[i].clone()).or_default().insert(ids[j].clone());
                    adjacency.entry(ids[j].clone()).or_default().insert(ids[i].clone());
                }
            }
        }

        let mut remaining: HashSet<SimplexId> = members.iter().cloned().collect();
        let mut paths = Vec::new();

        while !remaining.is_empty() {
            let start = remaining
                .iter()
                .find(|id| {
                    adjacency
                        .get(*id)
                        .map(|neighbors| neighbors.iter().filter(|n| remaining.contains(*n)).count())
                        .unwrap_or(0)
                        <= 1
                })
                .cloned()
                .unwrap_or_else(|| remaining.iter().next().cloned().unwrap());

            let mut path = vec![start.clone()];
            remaining.remove(&start);
            let mut current = start;
            loop {
                let next = adjacency
                    .get(&current)
                    .and_then(|neighbors| neighbors.iter().find(|n| remaining.contains(*n)).cloned());
                match next {
                    Some(n) => {
                        remaining.remove(&n);
                        path.push(n.clone());
                        current = n;
                    }
                    None => break,
                }
            }
            paths.push(path);
        }
        paths
    }

    fn finalize(
        intersections: &BTreeMap<SimplexId, Intersection>,
        mut path: Vec<SimplexId>,
        options: &Options,
    ) -> Option<Trajectory> {
        path.sort_by(|a, b| {
            let ta = intersections[a].x[intersections[a].x.len() - 1];
            let tb = intersections[b].x[intersections[b].x.len() - 1];
            ta.partial_cmp(&tb).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.cmp(b))
        });

        if path.len() < options.length_threshold {
            return None;
        }

        let points: Vec<(nalgebra::DVector<f64>, f64)> = path
            .iter()
            .map(|id| (intersections[id].x.clone(), intersections[id].val))
            .collect();
        let trajectory = Trajectory { points };

        if !(trajectory.max_val() > options.value_threshold) {
            return None;
        }

        Some(trajectory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::Lattice;
    use crate::Rank;
    use nalgebra::DVector;

    /// A valid 2-simplex (3 vertices) inside a 3D lattice, positioned at
    /// `x = axis_value` so distinct calls don't collide.
    fn leaf(axis_value: i64) -> SimplexId {
        SimplexId::from_vertices(
            3,
            vec![
                vec![axis_value, 0, 0],
                vec![axis_value + 1, 0, 0],
                vec![axis_value + 1, 1, 0],
            ],
        )
    }

    fn intersection(eid: SimplexId, t: f64, val: f64) -> Intersection {
        let corner = eid.corner();
        Intersection {
            eid,
            x: DVector::from_vec(vec![0.0, 0.0, t]),
            val,
            corner,
            related: BTreeSet::new(),
        }
    }

    #[test]
    fn single_component_below_length_threshold_is_dropped() {
        let lattice = Lattice::new(vec![0, 0, 0], vec![4, 4, 4]);
        let mesh = SimplexMesh::new(lattice.clone());
        let mut block = Block::new(Rank(0), lattice.clone(), lattice);
        let a = leaf(0);
        block.add(intersection(a, 0.0, 5.0));

        let mut options = Options::default();
        options.length_threshold = 2;

        let trajectories = TrajectoryAssembler::assemble(&[block], &mesh, &options);
        assert!(trajectories.is_empty());
    }

    #[test]
    fn value_threshold_above_max_drops_every_trajectory() {
        let lattice = Lattice::new(vec![0, 0, 0], vec![4, 4, 4]);
        let mesh = SimplexMesh::new(lattice.clone());
        let mut block = Block::new(Rank(0), lattice.clone(), lattice);
        let a = leaf(0);
        let b = leaf(1);
        block.add(intersection(a.clone(), 0.0, 1.0));
        block.add(intersection(b.clone(), 1.0, 2.0));
        block.set_parent(b, a);

        let mut options = Options::default();
        options.length_threshold = 1;
        options.value_threshold = 100.0;

        let trajectories = TrajectoryAssembler::assemble(&[block], &mesh, &options);
        assert!(trajectories.is_empty());
    }
}
