//! Links sibling critical points that share a coboundary hypercell,
//! producing the `related` edges the initial union-find forest is seeded
//! from.

use std::collections::{BTreeMap, HashSet};

use crate::detector::Intersection;
use crate::lattice::Lattice;
use crate::simplex::{SimplexId, SimplexMesh};

/// Builds `related` edges over a block's intersection map.
pub struct RelationBuilder<'a> {
    mesh: &'a SimplexMesh,
    /// The rank's core sub-lattice (without ghost layer); distinguishes
    /// `F_in` from `F_out`.
    core: &'a Lattice,
}

impl<'a> RelationBuilder<'a> {
    pub fn new(mesh: &'a SimplexMesh, core: &'a Lattice) -> Self {
        RelationBuilder { mesh, core }
    }

    /// Populates `related` on every intersection in `intersections`.
    pub fn build(&self, intersections: &mut BTreeMap<SimplexId, Intersection>) {
        let mut visited = HashSet::new();
        let ids: Vec<SimplexId> = intersections.keys().cloned().collect();

        // (child, parent): parent is inserted into child's `related` set.
        let mut edges: Vec<(SimplexId, SimplexId)> = Vec::new();

        for id in &ids {
            for hypercell in self.mesh.side_of(id) {
                if !visited.insert(hypercell.clone()) {
                    continue;
                }

                let mut f_in: Vec<SimplexId> = Vec::new();
                let mut f_out: Vec<SimplexId> = Vec::new();
                for face in self.mesh.sides(&hypercell) {
                    if !intersections.contains_key(&face) {
                        continue;
                    }
                    if self.core.contains(&face.corner()) {
                        f_in.push(face);
                    } else {
                        f_out.push(face);
                    }
                }
                f_in.sort();
                f_out.sort();

                if f_in.len() >= 2 {
                    let a = f_in[0].clone();
                    for b in &f_in[1..] {
                        let (child, parent) = if a < *b { (b.clone(), a.clone()) } else { (a.clone(), b.clone()) };
                        edges.push((child, parent));
                    }
                }

                if !f_out.is_empty() {
                    for b in &f_out {
                        for f in &f_in {
                            if b < f {
                                edges.push((f.clone(), b.clone()));
                            }
                        }
                    }
                }
            }
        }

        for (child, parent) in edges {
            if let Some(intersection) = intersections.get_mut(&child) {
                intersection.related.insert(parent);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CriticalPointType;
    use crate::detector::CriticalPointDetector;
    use crate::field::{Field, GradientField};

    /// f(x, y, t) = -(x^2 + y^2) + t: a single moving maximum, dense enough
    /// in critical points to exercise `RelationBuilder` across several
    /// hypercells.
    fn paraboloid_intersections(n: i64, dim: usize) -> (SimplexMesh, Lattice, BTreeMap<SimplexId, Intersection>) {
        let half = n / 2;
        let lattice = Lattice::new(vec![-half; dim], vec![n; dim]);
        let size = lattice.size().to_vec();
        let mut values = Vec::with_capacity(lattice.len());
        let mut point = vec![-half; dim];
        loop {
            let spatial: f64 = point[..dim - 1].iter().map(|&c| (c * c) as f64).sum();
            let t = point[dim - 1] as f64;
            values.push(-spatial + t);

            let mut axis = dim;
            let mut done = false;
            loop {
                if axis == 0 {
                    done = true;
                    break;
                }
                axis -= 1;
                point[axis] += 1;
                if point[axis] < -half + size[axis] {
                    break;
                }
                point[axis] = -half;
            }
            if done {
                break;
            }
        }

        let field = Field::new(lattice.clone(), values);
        let gradient = GradientField::compute(&field);
        let mesh = SimplexMesh::new(lattice.clone());
        let detector = CriticalPointDetector::new(&mesh, &field, &gradient, CriticalPointType::All);
        let (found, _) = detector.run();

        let mut map = BTreeMap::new();
        for i in found {
            map.insert(i.eid.clone(), i);
        }
        (mesh, lattice, map)
    }

    #[test]
    fn related_ids_are_always_smaller_under_canonical_order() {
        let (mesh, lattice, mut map) = paraboloid_intersections(6, 3);

        let builder = RelationBuilder::new(&mesh, &lattice);
        builder.build(&mut map);

        for (id, intersection) in &map {
            for related in &intersection.related {
                assert!(related < id, "related ids must be smaller under canonical order");
            }
        }
    }
}
