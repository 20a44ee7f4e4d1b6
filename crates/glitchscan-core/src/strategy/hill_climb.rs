use super::{Proposal, SearchStrategy, finish};
use crate::classifier::OutcomeClass;
use crate::space::{GridIndex, ParameterSpace};
use crate::store::ResultStore;
use itertools::Itertools;
use std::collections::HashSet;

/// Local exploration around successful cells.
///
/// Every cell with a SUCCESS trial becomes a center, in the order the hits were
/// found. Around a center, Chebyshev rings of radius `1..=max_radius` grid steps
/// are probed in lexicographic cell order. A center stops expanding once a whole
/// ring came back NO_EFFECT. Done when no SUCCESS is known or every ring is resolved.
#[derive(Clone, Debug)]
pub struct HillClimb {
    max_radius: u64,
}

impl Default for HillClimb {
    fn default() -> Self {
        HillClimb { max_radius: 2 }
    }
}

impl HillClimb {
    /// Creates a strategy exploring at most `max_radius` grid steps around each hit.
    pub fn new(max_radius: u64) -> Self {
        HillClimb { max_radius }
    }

    fn centers(store: &ResultStore) -> Vec<&GridIndex> {
        let mut seen = HashSet::new();
        store
            .by_class(OutcomeClass::Success)
            .map(|t| &t.cell)
            .filter(|cell| seen.insert(*cell))
            .collect()
    }
}

/// Cells at Chebyshev distance exactly `radius` from `center`, clipped to the
/// grid, in lexicographic order.
fn ring(shape: &[u64], center: &[u64], radius: u64) -> Vec<GridIndex> {
    center
        .iter()
        .zip(shape)
        .map(|(c, steps)| {
            c.saturating_sub(radius)..=c.saturating_add(radius).min(steps.saturating_sub(1))
        })
        .multi_cartesian_product()
        .filter(|cell| {
            cell.iter()
                .zip(center)
                .map(|(a, b)| a.abs_diff(*b))
                .max()
                == Some(radius)
        })
        .collect()
}

impl SearchStrategy for HillClimb {
    fn name(&self) -> &str {
        "hill-climb"
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
        let shape = space.grid_shape();
        for center in Self::centers(store) {
            for radius in 1..=self.max_radius {
                let cells = ring(&shape, center, radius);
                if cells.is_empty() {
                    break;
                }
                let unvisited: Vec<_> = cells
                    .iter()
                    .filter(|c| !store.visited(c))
                    .filter_map(|c| space.point_at(c).ok())
                    .collect();
                if !unvisited.is_empty() {
                    return finish(unvisited, budget_remaining);
                }
                if cells
                    .iter()
                    .all(|c| store.dominant_class(c) == Some(OutcomeClass::NoEffect))
                {
                    break;
                }
            }
        }
        Proposal::Done
    }
}
