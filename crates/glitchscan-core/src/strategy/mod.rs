//! Search strategies.
//!
//! A [`SearchStrategy`] looks at the parameter space and everything recorded so
//! far and decides what to try next. Strategies hold configuration only; all
//! state they need is derived from the [`ResultStore`], which makes every
//! decision reproducible from the store alone and lets a campaign resume from a
//! previous store.
//!
//! Shipped strategies:
//!
//! - [`Raster`] - exhaustive grid walk
//! - [`AdaptiveBisection`] - recursive subdivision of regions whose corners disagree
//! - [`HillClimb`] - ring-wise exploration around successful points
//! - [`Chain`] - runs strategies one after another

mod bisection;
mod chain;
mod hill_climb;
mod raster;
mod region;

pub use self::bisection::AdaptiveBisection;
pub use self::chain::Chain;
pub use self::hill_climb::HillClimb;
pub use self::raster::Raster;
pub use self::region::Region;

use crate::space::{ParameterPoint, ParameterSpace};
use crate::store::ResultStore;

/// What a strategy wants to do next.
#[derive(Clone, Debug, PartialEq)]
pub enum Proposal {
    /// Nothing left to try
    Done,
    /// Points to try next, in order. Never empty.
    Points(Vec<ParameterPoint>),
}

/// Trait for choosing the next points of a search.
pub trait SearchStrategy {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Proposes the next points.
    ///
    /// Must return [`Proposal::Done`] when `budget_remaining` is zero and never
    /// more than `budget_remaining` points. Must be a pure function of its inputs.
    fn propose(
        &self,
        space: &ParameterSpace,
        store: &ResultStore,
        budget_remaining: u64,
    ) -> Proposal;
}

impl<S: SearchStrategy + ?Sized> SearchStrategy for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn propose(
        &self,
        space: &ParameterSpace,
        store: &ResultStore,
        budget_remaining: u64,
    ) -> Proposal {
        (**self).propose(space, store, budget_remaining)
    }
}

/// Truncates `points` to the budget. An empty result means done.
fn finish(mut points: Vec<ParameterPoint>, budget_remaining: u64) -> Proposal {
    let limit = usize::try_from(budget_remaining).unwrap_or(usize::MAX);
    points.truncate(limit);
    if points.is_empty() {
        Proposal::Done
    } else {
        Proposal::Points(points)
    }
}
