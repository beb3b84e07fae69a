//! Per-rank state: the intersections a rank currently owns, plus the
//! routing tables the union-find and load balancer maintain over ids it
//! merely knows about.

use std::collections::BTreeMap;

use crate::balancer::Bounds;
use crate::detector::Intersection;
use crate::lattice::Lattice;
use crate::simplex::SimplexId;
use crate::Rank;

/// One rank's share of the distributed computation.
///
/// A `Block` is created at startup and mutated by every phase; it is never
/// destroyed until shutdown. Intersections migrate between blocks exactly
/// once, during load balancing, and may be virtually forwarded thereafter
/// (a `parent` pointer referencing a remote id).
pub struct Block {
    rank: Rank,
    /// Intersections this block currently owns.
    pub intersections: BTreeMap<SimplexId, Intersection>,
    /// Union-find parent pointers, including ids not locally owned.
    pub parent: BTreeMap<SimplexId, SimplexId>,
    /// Which rank owns each id this block has ever referenced.
    pub gid_of: BTreeMap<SimplexId, Rank>,
    /// This rank's core sub-lattice (no ghost layer).
    pub core: Lattice,
    /// This rank's ghosted sub-lattice.
    pub ghost: Lattice,
    /// Every rank's current spatial bounds, populated after a balancing
    /// pass's all-to-all broadcast.
    pub all_bounds: Vec<Bounds>,
}

impl Block {
    pub fn new(rank: Rank, core: Lattice, ghost: Lattice) -> Self {
        Block {
            rank,
            intersections: BTreeMap::new(),
            parent: BTreeMap::new(),
            gid_of: BTreeMap::new(),
            core,
            ghost,
            all_bounds: Vec::new(),
        }
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    /// `add(id)`: insert with `parent[id] = id`, `gid_of[id] = self`.
    pub fn add(&mut self, intersection: Intersection) {
        let id = intersection.eid.clone();
        self.parent.insert(id.clone(), id.clone());
        self.gid_of.insert(id.clone(), self.rank);
        self.intersections.insert(id, intersection);
    }

    /// `id` is root iff it points to itself.
    pub fn is_root(&self, id: &SimplexId) -> bool {
        self.parent.get(id) == Some(id)
    }

    /// `set_parent(id, p)`: precondition `p < id` canonically.
    pub fn set_parent(&mut self, id: SimplexId, p: SimplexId) {
        debug_assert!(p < id, "parent must be strictly smaller under canonical order");
        self.parent.insert(id, p);
    }
}
