use super::{Proposal, Region, SearchStrategy, finish};
use crate::space::{GridIndex, ParameterSpace};
use crate::store::ResultStore;
use std::collections::VecDeque;

/// Adaptive bisection towards class boundaries.
///
/// The grid is first cut into a coarse lattice of `seed_divisions` regions per
/// dimension. A region whose corners all share one dominant class is assumed
/// uniform and dropped. A region whose corners disagree contains a transition
/// and is split at the midpoint of its widest dimension, until no span exceeds
/// one grid step. Such unit regions are the localized boundaries.
///
/// Regions with unsampled corners compete for the next trials: the region with
/// the fewest attempts inside it wins, ties going to the region discovered first.
/// All missing corners of the winner are proposed at once.
///
/// A boundary narrower than the seed lattice can be missed when all corners of
/// its region agree. Raise `seed_divisions` when this matters.
#[derive(Clone, Debug)]
pub struct AdaptiveBisection {
    seed_divisions: u64,
}

impl Default for AdaptiveBisection {
    fn default() -> Self {
        AdaptiveBisection { seed_divisions: 1 }
    }
}

struct Frontier {
    pending: Vec<(Region, Vec<GridIndex>)>,
    boundaries: Vec<Region>,
}

impl AdaptiveBisection {
    /// Creates a strategy seeded with `seed_divisions` slices per dimension
    /// (values below one are treated as one).
    pub fn new(seed_divisions: u64) -> Self {
        AdaptiveBisection {
            seed_divisions: seed_divisions.max(1),
        }
    }

    /// Unit regions whose corners disagree, in discovery order.
    pub fn boundaries(&self, space: &ParameterSpace, store: &ResultStore) -> Vec<Region> {
        self.walk(space, store).boundaries
    }

    fn walk(&self, space: &ParameterSpace, store: &ResultStore) -> Frontier {
        let mut frontier = Frontier {
            pending: vec![],
            boundaries: vec![],
        };
        let mut queue: VecDeque<Region> = Region::lattice(space, self.seed_divisions).into();
        while let Some(region) = queue.pop_front() {
            let corners = region.corners();
            let missing: Vec<GridIndex> = corners
                .iter()
                .filter(|c| !store.visited(c))
                .cloned()
                .collect();
            if !missing.is_empty() {
                frontier.pending.push((region, missing));
                continue;
            }
            let first = store.dominant_class(&corners[0]);
            if corners[1..]
                .iter()
                .all(|c| store.dominant_class(c) == first)
            {
                continue;
            }
            if region.is_unit() {
                frontier.boundaries.push(region);
                continue;
            }
            let (left, right) = region.split();
            queue.push_back(left);
            queue.push_back(right);
        }
        frontier
    }
}

impl SearchStrategy for AdaptiveBisection {
    fn name(&self) -> &str {
        "bisection"
    }

    fn propose(
        &self,
        space: &ParameterSpace,
        store: &ResultStore,
        budget_remaining: u64,
    ) -> Proposal {
        if budget_remaining == 0 {
            return Proposal::Done;
        }
        let frontier = self.walk(space, store);
        let Some((_, missing)) = frontier
            .pending
            .into_iter()
            .enumerate()
            .min_by_key(|(order, (region, _))| {
                (store.attempts_in_box(region.lo(), region.hi()), *order)
            })
            .map(|(_, candidate)| candidate)
        else {
            return Proposal::Done;
        };
        let mut points = vec![];
        for cell in &missing {
            // neighbouring regions share corners
            if let Ok(point) = space.point_at(cell) {
                if !points.contains(&point) {
                    points.push(point);
                }
            }
        }
        finish(points, budget_remaining)
    }
}
