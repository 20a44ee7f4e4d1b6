use super::{Proposal, SearchStrategy, finish};
use crate::space::ParameterSpace;
use crate::store::ResultStore;

/// Exhaustive walk over the grid in lexicographic order, first dimension slowest.
///
/// Proposes one unvisited cell per call, starting right after the most recently
/// recorded cell and wrapping around, so a raster that follows another strategy
/// (or a resumed campaign) fills the gaps instead of restarting at the origin.
#[derive(Clone, Copy, Debug, Default)]
pub struct Raster;

impl SearchStrategy for Raster {
    fn name(&self) -> &str {
        "raster"
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
        let total = space.grid_size();
        let start = store
            .last_cell()
            .map_or(0, |cell| space.linear_index(cell).saturating_add(1) % total);
        let next = (start..total)
            .chain(0..start)
            .map(|linear| space.grid_index(linear))
            .find(|cell| !store.visited(cell));
        match next.and_then(|cell| space.point_at(&cell).ok()) {
            Some(point) => finish(vec![point], budget_remaining),
            None => Proposal::Done,
        }
    }
}
