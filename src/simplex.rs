//! The regular simplex mesh: canonical Kuhn triangulation of the unit
//! d-cubes inside a [`Lattice`], with position-derived, serialization-stable
//! simplex identifiers.
//!
//! A `SimplexId` is represented as the sorted list of its absolute integer
//! grid vertices. This is equivalent to, and strictly more general than, a
//! `(corner, type)` pair: `corner()` recovers the componentwise minimum
//! vertex, and the sorted vertex list itself serves as `type` for ordering
//! and equality purposes.

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::lattice::Lattice;

/// A `dim`-length integer grid coordinate.
pub type Vertex = Vec<i64>;

/// A position-derived, canonically-ordered identifier for a k-simplex.
///
/// Two simplices constructed independently (e.g. on different ranks) are
/// equal iff their vertex sets are equal, regardless of which permutation
/// of the Kuhn triangulation produced them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SimplexId {
    dim: usize,
    /// Sorted ascending (lexicographic), length `k + 1`.
    vertices: Vec<Vertex>,
}

impl SimplexId {
    pub(crate) fn from_vertices(dim: usize, mut vertices: Vec<Vertex>) -> Self {
        debug_assert!(!vertices.is_empty());
        debug_assert!(vertices.iter().all(|v| v.len() == dim));
        vertices.sort();
        vertices.dedup();
        SimplexId { dim, vertices }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// `k` such that this is a k-simplex (`k + 1` vertices).
    pub fn k(&self) -> usize {
        self.vertices.len() - 1
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    /// Human-readable canonical form for text dumps: `dim:k:v0|v1|...`,
    /// each vertex comma-separated. Not used by the wire protocol or
    /// hashing (see [`Self::pack`]) — reserved for optional text dumps
    /// only.
    pub fn to_text(&self) -> String {
        let verts = self
            .vertices
            .iter()
            .map(|v| v.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(","))
            .collect::<Vec<_>>()
            .join("|");
        format!("{}:{}:{}", self.dim, self.k(), verts)
    }

    /// The componentwise minimum over all vertices: the home cell corner
    /// recorded in `Intersection.corner`.
    pub fn corner(&self) -> Vertex {
        let mut corner = self.vertices[0].clone();
        for v in &self.vertices[1..] {
            for (c, &x) in corner.iter_mut().zip(v) {
                *c = (*c).min(x);
            }
        }
        corner
    }

    /// Axes along which every vertex shares the same coordinate value.
    fn flat_axes(&self) -> Vec<usize> {
        (0..self.dim)
            .filter(|&axis| {
                let first = self.vertices[0][axis];
                self.vertices.iter().all(|v| v[axis] == first)
            })
            .collect()
    }

    /// True iff every vertex lies inside `lattice`'s bounds.
    pub fn valid(&self, lattice: &Lattice) -> bool {
        self.vertices.iter().all(|v| lattice.contains(v))
    }

    /// Packs this id into a 128-bit key. Coordinates are biased 24-bit
    /// fields (representable range: roughly ±8.3M per axis, far beyond any
    /// grid this pipeline targets); the chain of per-vertex offset masks
    /// and `k`/`dim` round out the low bits.
    pub fn pack(&self) -> u128 {
        const COORD_BITS: u32 = 24;
        const COORD_BIAS: i64 = 1 << (COORD_BITS - 1);
        const MAX_CHAIN: usize = 5;

        let corner = self.corner();
        let mut bits: u128 = 0;
        for axis in 0..4 {
            let c = corner.get(axis).copied().unwrap_or(0);
            let biased = (c + COORD_BIAS).clamp(0, (1i64 << COORD_BITS) - 1) as u128;
            bits = (bits << COORD_BITS) | biased;
        }
        for slot in 0..MAX_CHAIN {
            let mask: u128 = match self.vertices.get(slot) {
                Some(v) => {
                    let mut m: u128 = 0;
                    for (axis, (&vc, &cc)) in v.iter().zip(&corner).enumerate().take(4) {
                        if vc != cc {
                            m |= 1 << axis;
                        }
                    }
                    m
                }
                None => 0,
            };
            bits = (bits << 4) | mask;
        }
        bits = (bits << 3) | (self.k() as u128 & 0b111);
        bits = (bits << 3) | (self.dim as u128 & 0b111);
        bits
    }
}

impl PartialOrd for SimplexId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SimplexId {
    /// Lexicographic on `(corner, vertices)`: ties between simplices
    /// sharing a corner break on their vertex lists.
    fn cmp(&self, other: &Self) -> Ordering {
        self.corner()
            .cmp(&other.corner())
            .then_with(|| self.vertices.cmp(&other.vertices))
    }
}

/// Enumerates k-simplices inside a [`Lattice`] using the canonical Kuhn
/// triangulation, and computes face/coboundary relationships between
/// them.
pub struct SimplexMesh {
    lattice: Lattice,
}

impl SimplexMesh {
    pub fn new(lattice: Lattice) -> Self {
        SimplexMesh { lattice }
    }

    pub fn dim(&self) -> usize {
        self.lattice.dim()
    }

    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    pub fn valid(&self, s: &SimplexId) -> bool {
        s.valid(&self.lattice)
    }

    /// All strictly-increasing chains of `k + 1` subsets of `{0, ..,
    /// dim-1}` (as bitmasks) that include the empty set, sorted by size
    /// then by mask value. Each chain describes one k-simplex shape
    /// relative to a cell corner.
    ///
    /// Requiring the chain to start at the empty set (i.e. the corner
    /// itself is always a member of the generating chain) is what makes
    /// `element_for`'s enumeration duplicate-free: since subsets in a
    /// chain are nested, the smallest chain entry's vertex is always the
    /// resulting simplex's true componentwise-minimum corner, so fixing
    /// it at the empty set pins that corner to the cell currently being
    /// iterated rather than to some other cell's corner.
    fn subset_chains(dim: usize, k: usize) -> Vec<Vec<u32>> {
        let universe = 1u32 << dim;
        (0..universe)
            .combinations(k + 1)
            .filter(|combo| {
                let mut sorted = combo.clone();
                sorted.sort_by_key(|m| m.count_ones());
                sorted[0] == 0
                    && sorted.windows(2).all(|w| {
                        let (a, b) = (w[0], w[1]);
                        a != b && (a & b) == a
                    })
            })
            .map(|mut combo| {
                combo.sort_by_key(|m| m.count_ones());
                combo
            })
            .sorted()
            .collect()
    }

    fn chain_to_simplex(dim: usize, corner: &[i64], chain: &[u32]) -> SimplexId {
        let vertices = chain
            .iter()
            .map(|&mask| {
                (0..dim)
                    .map(|axis| corner[axis] + i64::from((mask >> axis) & 1))
                    .collect::<Vec<_>>()
            })
            .collect();
        SimplexId::from_vertices(dim, vertices)
    }

    /// Iterates every valid k-simplex inside this mesh's lattice in
    /// canonical order. Deterministic regardless of how the caller later
    /// parallelizes over the results.
    pub fn element_for<F>(&self, k: usize, mut f: F)
    where
        F: FnMut(SimplexId),
    {
        let dim = self.dim();
        assert!(k <= dim, "k-simplex dimension must not exceed mesh dimension");
        let chains = Self::subset_chains(dim, k);

        let lower = self.lattice.lower_bound().to_vec();
        let upper = self.lattice.upper_bound();

        let mut corner = lower.clone();
        loop {
            for chain in &chains {
                let s = Self::chain_to_simplex(dim, &corner, chain);
                if s.valid(&self.lattice) {
                    f(s);
                }
            }

            // odometer increment over `corner` within [lower, upper)
            let mut axis = dim;
            loop {
                if axis == 0 {
                    return;
                }
                axis -= 1;
                corner[axis] += 1;
                if corner[axis] < upper[axis] {
                    break;
                }
                corner[axis] = lower[axis];
                if axis == 0 {
                    return;
                }
            }
        }
    }

    /// The `k + 1` faces of `s`: drop one vertex at a time.
    pub fn sides(&self, s: &SimplexId) -> Vec<SimplexId> {
        let dim = s.dim();
        (0..s.vertices().len())
            .map(|skip| {
                let vertices = s
                    .vertices()
                    .iter()
                    .enumerate()
                    .filter(|&(i, _)| i != skip)
                    .map(|(_, v)| v.clone())
                    .collect();
                SimplexId::from_vertices(dim, vertices)
            })
            .collect()
    }

    /// The d-simplices ("hypercells") whose [`Self::sides`] contains `s`.
    ///
    /// Only meaningful, and only used, for `(d-1)`-simplices (the faces
    /// the detector and [`crate::relation::RelationBuilder`] operate on).
    pub fn side_of(&self, s: &SimplexId) -> Vec<SimplexId> {
        let dim = self.dim();
        assert_eq!(s.k(), dim - 1, "side_of is only defined for (d-1)-simplices");

        let flat_axes = s.flat_axes();
        let base_corner = s.corner();

        // Each flat axis contributes two candidate cell-corner choices
        // (the cell on either side of the hyperface `s` lies on); every
        // other axis is pinned to `s`'s own corner.
        let mut candidate_corners = vec![base_corner.clone()];
        for &axis in &flat_axes {
            let shared = s.vertices()[0][axis];
            let mut next = Vec::with_capacity(candidate_corners.len() * 2);
            for c in &candidate_corners {
                let mut a = c.clone();
                a[axis] = shared - 1;
                let mut b = c.clone();
                b[axis] = shared;
                next.push(a);
                next.push(b);
            }
            candidate_corners = next;
            candidate_corners.dedup();
        }

        let top_chains = Self::subset_chains(dim, dim);
        let mut out = Vec::new();
        for corner in &candidate_corners {
            for chain in &top_chains {
                let top = Self::chain_to_simplex(dim, corner, chain);
                if !top.valid(&self.lattice) {
                    continue;
                }
                if self.sides(&top).contains(s) {
                    out.push(top);
                }
            }
        }
        out.sort();
        out.dedup();
        out
    }
}
