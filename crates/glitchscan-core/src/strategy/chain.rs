use super::{Proposal, SearchStrategy};
use crate::space::ParameterSpace;
use crate::store::ResultStore;

/// Runs strategies in order. The first stage that is not done proposes.
///
/// A typical chain bisects the space coarsely and then climbs around the hits
/// the bisection found.
#[derive(Default)]
pub struct Chain {
    stages: Vec<Box<dyn SearchStrategy + Send + Sync>>,
}

impl Chain {
    /// Creates an empty chain, which is immediately done.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a stage.
    pub fn then(mut self, stage: impl SearchStrategy + Send + Sync + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Appends an already boxed stage.
    pub fn then_boxed(mut self, stage: Box<dyn SearchStrategy + Send + Sync>) -> Self {
        self.stages.push(stage);
        self
    }
}

impl SearchStrategy for Chain {
    fn name(&self) -> &str {
        "chain"
    }

    fn propose(
        &self,
        space: &ParameterSpace,
        store: &ResultStore,
        budget_remaining: u64,
    ) -> Proposal {
        self.stages
            .iter()
            .map(|stage| stage.propose(space, store, budget_remaining))
            .find(|proposal| *proposal != Proposal::Done)
            .unwrap_or(Proposal::Done)
    }
}
