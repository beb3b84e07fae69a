//! Distributed union-find convergence: `parent`/`gid_of` sharded across
//! blocks, converging through an asynchronous Query / Pointer / Union
//! protocol driven over an [`Exchange`].

use serde::{Deserialize, Serialize};

use crate::block::Block;
use crate::exchange::InProcessExchange;
use crate::simplex::SimplexId;
use crate::Rank;

/// Wire messages for the convergence protocol. Carries the responder's
/// rank alongside the next-hop id so the asker can keep routing without a
/// separate lookup round-trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UnionMessage {
    /// `id`'s locally-known parent `p` is owned by the recipient; asking
    /// them to resolve it one step further.
    Query { id: SimplexId, p: SimplexId },
    /// `p` is itself non-root on the responder; `p_owner` is who owns
    /// `p_prime`, letting the asker compress its path without a round
    /// trip to discover it.
    Pointer {
        id: SimplexId,
        p_prime: SimplexId,
        p_owner: Rank,
    },
    /// `p` was the local root on the responder; the asker should point
    /// directly at `root` (here, `root == p`) and record its owner.
    Union { id: SimplexId, root: SimplexId },
}

/// Drives every simulated block to quiescence.
pub struct DistributedUnionFind;

impl DistributedUnionFind {
    /// Seeds each block's union-find forest from its own `related` edges
    /// (the `RelationBuilder` output feeds the initial forest). Right after
    /// `RelationBuilder` runs (before any load balancing), every related id
    /// is still present in this same block's `intersections` map, so the
    /// whole seed is purely local. After a rebalancing pass, a re-seed call
    /// may see `related` ids that migrated to a different block; those are
    /// left for [`Self::converge`] to resolve instead of being merged here
    /// (see [`Self::unite_local`]).
    pub fn seed(block: &mut Block) {
        let edges: Vec<(SimplexId, SimplexId)> = block
            .intersections
            .iter()
            .flat_map(|(id, i)| i.related.iter().cloned().map(move |r| (id.clone(), r)))
            .collect();
        for (child, parent) in edges {
            Self::unite_local(block, child, parent);
        }
    }

    /// Unions two ids by pointing the larger canonical root at the
    /// smaller — but only if this block actually owns the larger root.
    ///
    /// Writing `parent[large]` for an id this block doesn't own would
    /// fabricate a root override that conflicts with the real owner's own
    /// `parent[large] = large`: whichever block's map is merged last during
    /// trajectory assembly would silently win, disconnecting components
    /// that share a cross-rank relation. When `large` isn't locally owned,
    /// this union is left for [`Self::converge`]'s Query/Pointer/Union
    /// protocol, which is the only thing allowed to learn of it from the
    /// owning rank.
    fn unite_local(block: &mut Block, a: SimplexId, b: SimplexId) {
        let root_a = Self::find_local(block, a);
        let root_b = Self::find_local(block, b);
        if root_a == root_b {
            return;
        }
        let (small, large) = if root_a < root_b { (root_a, root_b) } else { (root_b, root_a) };
        if block.intersections.contains_key(&large) {
            block.set_parent(large, small);
        }
    }

    /// Local-only find with path compression; stops at any id whose
    /// parent is unknown locally (a genuinely remote root, to be resolved
    /// by [`Self::converge`]).
    fn find_local(block: &mut Block, id: SimplexId) -> SimplexId {
        let mut current = id;
        loop {
            match block.parent.get(&current).cloned() {
                Some(p) if p == current => return current,
                Some(p) => current = p,
                None => return current,
            }
        }
    }

    /// Runs the asynchronous convergence protocol across every simulated
    /// block until global quiescence: no rank makes local progress and no
    /// messages are in flight, checked simultaneously on all ranks.
    pub fn converge(blocks: &mut [Block], peers: &[InProcessExchange<UnionMessage>]) -> crate::error::Result<()> {
        assert_eq!(blocks.len(), peers.len());

        // Ids for which some remote rank has already confirmed a terminal
        // root via a `Union` reply. The relation graph is fixed before this
        // loop starts (seeding and rebalancing are both already done), so
        // once an id's ultimate root is confirmed it can never change
        // again; re-querying it every round would keep the loop from ever
        // reaching quiescence.
        let mut settled: Vec<std::collections::BTreeSet<SimplexId>> = vec![Default::default(); blocks.len()];

        loop {
            let mut any_progress = false;
            let mut any_traffic = false;

            for ((block, peer), settled) in blocks.iter_mut().zip(peers).zip(settled.iter_mut()) {
                let inbound = peer.recv_all();
                any_traffic |= !inbound.is_empty();

                for (sender, message) in inbound {
                    let (progressed, resolved) = Self::handle_message(block, sender, message, peer)?;
                    if progressed {
                        any_progress = true;
                    }
                    if let Some(id) = resolved {
                        settled.insert(id);
                    }
                }

                // Every locally non-root, not-yet-settled id whose parent
                // is remote gets a fresh Query this round; cheap and
                // idempotent for anything still in flight.
                let outstanding: Vec<(SimplexId, SimplexId, Rank)> = block
                    .parent
                    .iter()
                    .filter(|&(id, p)| p != id && !settled.contains(id))
                    .filter_map(|(id, p)| {
                        block
                            .gid_of
                            .get(p)
                            .filter(|&&owner| owner != block.rank())
                            .map(|&owner| (id.clone(), p.clone(), owner))
                    })
                    .collect();

                for (id, p, owner) in outstanding {
                    peer.send(owner, UnionMessage::Query { id, p })?;
                    any_traffic = true;
                }
            }

            if !any_progress && !any_traffic {
                return Ok(());
            }
        }
    }

    /// Returns whether local state changed, and `Some(id)` when `id`'s
    /// terminal root has just been confirmed and no longer needs
    /// re-querying.
    fn handle_message(
        block: &mut Block,
        sender: Rank,
        message: UnionMessage,
        peer: &InProcessExchange<UnionMessage>,
    ) -> crate::error::Result<(bool, Option<SimplexId>)> {
        match message {
            UnionMessage::Query { id, p } => {
                if !block.parent.contains_key(&p) {
                    return Err(crate::error::CritraceError::Protocol {
                        rank: block.rank(),
                        reason: format!("query for unknown id {:?}", p),
                    });
                }
                if block.is_root(&p) {
                    peer.send(sender, UnionMessage::Union { id, root: p })?;
                } else {
                    let p_prime = block.parent.get(&p).cloned().unwrap();
                    let p_owner = *block.gid_of.get(&p_prime).unwrap_or(&block.rank());
                    peer.send(
                        sender,
                        UnionMessage::Pointer {
                            id,
                            p_prime,
                            p_owner,
                        },
                    )?;
                }
                Ok((false, None))
            }
            UnionMessage::Pointer { id, p_prime, p_owner } => {
                if let Some(current) = block.parent.get(&id).cloned() {
                    if current != p_prime {
                        block.set_parent(id.clone(), p_prime.clone());
                        block.gid_of.insert(p_prime, p_owner);
                        return Ok((true, None));
                    }
                }
                Ok((false, None))
            }
            UnionMessage::Union { id, root } => {
                // Only `root`'s ownership is new information here: `sender`
                // is who just confirmed being its root. `id` is still owned
                // by whoever added it locally, regardless of where its
                // canonical root now points — overwriting `gid_of[id]` would
                // misroute a later query for any other local id whose chain
                // passes through it.
                let parent_changed = block.parent.get(&id) != Some(&root);
                let owner_changed = block.gid_of.get(&root) != Some(&sender);
                if parent_changed {
                    block.set_parent(id.clone(), root.clone());
                }
                if owner_changed {
                    block.gid_of.insert(root, sender);
                }
                Ok((parent_changed || owner_changed, Some(id)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::Lattice;
    use nalgebra::DVector;
    use std::collections::BTreeSet;

    fn leaf(n: i64) -> SimplexId {
        SimplexId::from_vertices(3, vec![vec![0, 0, 0], vec![n, 0, 0]])
    }

    fn intersection(eid: SimplexId, related: Vec<SimplexId>) -> crate::detector::Intersection {
        let corner = eid.corner();
        crate::detector::Intersection {
            eid,
            x: DVector::zeros(3),
            val: 0.0,
            corner,
            related: related.into_iter().collect::<BTreeSet<_>>(),
        }
    }

    #[test]
    fn local_seeding_unites_related_ids_to_the_smallest() {
        let lattice = Lattice::new(vec![0, 0, 0], vec![8, 8, 8]);
        let mut block = Block::new(Rank(0), lattice.clone(), lattice);

        let a = leaf(1);
        let b = leaf(2);
        let c = leaf(3);
        block.add(intersection(a.clone(), vec![]));
        block.add(intersection(b.clone(), vec![a.clone()]));
        block.add(intersection(c.clone(), vec![b.clone()]));

        DistributedUnionFind::seed(&mut block);

        assert!(block.is_root(&a));
        assert_eq!(block.parent.get(&b), Some(&a));
        // c unions with b, whose root is a.
        assert_eq!(block.parent.get(&c), Some(&a));
    }

    #[test]
    fn single_rank_converges_trivially() {
        let lattice = Lattice::new(vec![0, 0, 0], vec![8, 8, 8]);
        let mut block = Block::new(Rank(0), lattice.clone(), lattice);
        let a = leaf(1);
        block.add(intersection(a, vec![]));

        let peers = InProcessExchange::<UnionMessage>::simulate(1);
        let mut blocks = vec![block];
        DistributedUnionFind::converge(&mut blocks, &peers).unwrap();
    }
}
