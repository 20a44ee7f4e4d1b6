//! Append-only result store.
//!
//! The [`ResultStore`] keeps every [`Trial`] in execution order together with two
//! secondary indexes:
//!
//! - a by-class index answering "all AMBIGUOUS trials" without a scan
//! - a grid-cell index, ordered by [`GridIndex`], answering neighbourhood and box
//!   queries
//!
//! The store only grows. Once frozen, recording fails with [`StoreError::Frozen`].

use crate::classifier::{Outcome, OutcomeClass};
use crate::space::{GridIndex, ParameterPoint, ParameterSpace, SpaceError};
use crate::translator::EncodedPoint;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Errors that can occur while recording trials.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    /// The store is frozen.
    #[error("Result store is frozen")]
    Frozen,
    /// The point does not belong to the store's parameter space.
    #[error(transparent)]
    Space(#[from] SpaceError),
}

/// One recorded trial. Immutable once recorded.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Trial {
    /// Position in execution order, starting at zero
    pub sequence: u64,
    /// Grid cell of `point`
    #[serde(skip)]
    pub cell: GridIndex,
    /// Parameters in human units
    pub point: ParameterPoint,
    /// Parameters as sent to the device
    pub encoded: EncodedPoint,
    /// Classified outcome
    pub outcome: Outcome,
    /// Time the trial was recorded
    pub timestamp: DateTime<Utc>,
    /// How many earlier trials exist at the same point
    pub attempt_index: u32,
    /// Executor retries needed for this trial
    pub retries: u32,
}

/// Ordered, indexed collection of trials over one parameter space.
#[derive(Clone, Debug)]
pub struct ResultStore {
    space: ParameterSpace,
    trials: Vec<Trial>,
    by_class: HashMap<OutcomeClass, Vec<usize>>,
    cells: BTreeMap<GridIndex, Vec<usize>>,
    frozen: bool,
}

impl ResultStore {
    /// Creates an empty store.
    pub fn new(space: ParameterSpace) -> Self {
        ResultStore {
            space,
            trials: vec![],
            by_class: HashMap::new(),
            cells: BTreeMap::new(),
            frozen: false,
        }
    }

    /// An open copy of `previous`, used to resume a campaign.
    ///
    /// New trials continue the sequence numbers and attempt indices of `previous`.
    pub fn continue_from(previous: &ResultStore) -> Self {
        ResultStore {
            frozen: false,
            ..previous.clone()
        }
    }

    /// Records a trial.
    ///
    /// The attempt index is derived from the trials already recorded at the same
    /// grid cell.
    ///
    /// # Errors
    ///
    /// Fails if the store is frozen or `point` is not a point of the store's space.
    pub fn record(
        &mut self,
        point: ParameterPoint,
        encoded: EncodedPoint,
        outcome: Outcome,
        retries: u32,
    ) -> Result<&Trial, StoreError> {
        if self.frozen {
            return Err(StoreError::Frozen);
        }
        let cell = self.space.index_of(&point)?;
        let position = self.trials.len();
        let at_cell = self.cells.entry(cell.clone()).or_default();
        let attempt_index = at_cell.len() as u32;
        at_cell.push(position);
        self.by_class
            .entry(outcome.class)
            .or_default()
            .push(position);
        self.trials.push(Trial {
            sequence: position as u64,
            cell,
            point,
            encoded,
            outcome,
            timestamp: Utc::now(),
            attempt_index,
            retries,
        });
        Ok(&self.trials[position])
    }

    /// The parameter space of the stored points.
    pub fn space(&self) -> &ParameterSpace {
        &self.space
    }

    /// All trials in execution order.
    pub fn trials(&self) -> &[Trial] {
        &self.trials
    }

    /// Number of recorded trials.
    pub fn len(&self) -> usize {
        self.trials.len()
    }

    /// Whether no trial has been recorded.
    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    /// Trials of one outcome class, in execution order.
    pub fn by_class(&self, class: OutcomeClass) -> impl Iterator<Item = &Trial> {
        self.by_class
            .get(&class)
            .into_iter()
            .flatten()
            .map(|i| &self.trials[*i])
    }

    /// Number of trials of one outcome class.
    pub fn count(&self, class: OutcomeClass) -> usize {
        self.by_class.get(&class).map_or(0, Vec::len)
    }

    /// Trial counts per class. Classes without trials are omitted.
    pub fn class_counts(&self) -> BTreeMap<OutcomeClass, usize> {
        self.by_class
            .iter()
            .filter(|(_, trials)| !trials.is_empty())
            .map(|(class, trials)| (*class, trials.len()))
            .collect()
    }

    /// Trials recorded at a grid cell, oldest first.
    pub fn trials_at(&self, cell: &[u64]) -> impl Iterator<Item = &Trial> {
        self.cells
            .get(cell)
            .into_iter()
            .flatten()
            .map(|i| &self.trials[*i])
    }

    /// Number of trials at a grid cell.
    pub fn attempts_at(&self, cell: &[u64]) -> usize {
        self.cells.get(cell).map_or(0, Vec::len)
    }

    /// Whether a grid cell has at least one trial.
    pub fn visited(&self, cell: &[u64]) -> bool {
        self.cells.contains_key(cell)
    }

    /// The majority class at a grid cell; ties go to the class seen most recently.
    pub fn dominant_class(&self, cell: &[u64]) -> Option<OutcomeClass> {
        let mut tally: HashMap<OutcomeClass, (usize, u64)> = HashMap::new();
        for trial in self.trials_at(cell) {
            let entry = tally.entry(trial.outcome.class).or_insert((0, 0));
            entry.0 += 1;
            entry.1 = trial.sequence;
        }
        tally
            .into_iter()
            .max_by_key(|(_, key)| *key)
            .map(|(class, _)| class)
    }

    /// Trials whose cell lies within `radius` resolution steps of `point` in every
    /// dimension (Chebyshev distance on the grid).
    ///
    /// # Errors
    ///
    /// Fails if `point` is not a point of the store's space.
    pub fn within(&self, point: &ParameterPoint, radius: u64) -> Result<Vec<&Trial>, StoreError> {
        let center = self.space.index_of(point)?;
        let lo: Vec<u64> = center.iter().map(|c| c.saturating_sub(radius)).collect();
        let hi: Vec<u64> = center.iter().map(|c| c.saturating_add(radius)).collect();
        Ok(self.in_box(&lo, &hi))
    }

    /// Trials whose cell lies inside the inclusive grid box `lo..=hi`, in
    /// execution order.
    pub fn in_box(&self, lo: &[u64], hi: &[u64]) -> Vec<&Trial> {
        let mut positions: Vec<usize> = self
            .cells_in_box(lo, hi)
            .flat_map(|(_, positions)| positions.iter().copied())
            .collect();
        positions.sort_unstable();
        positions.into_iter().map(|i| &self.trials[i]).collect()
    }

    /// Number of trials inside the inclusive grid box `lo..=hi`.
    pub fn attempts_in_box(&self, lo: &[u64], hi: &[u64]) -> usize {
        self.cells_in_box(lo, hi)
            .map(|(_, positions)| positions.len())
            .sum()
    }

    fn cells_in_box<'a>(
        &'a self,
        lo: &'a [u64],
        hi: &'a [u64],
    ) -> impl Iterator<Item = (&'a GridIndex, &'a Vec<usize>)> + 'a {
        let well_formed = lo.len() == hi.len() && lo.iter().zip(hi).all(|(l, h)| l <= h);
        // lexicographic range bounds the first coordinate; the rest is filtered
        well_formed
            .then(|| self.cells.range(lo.to_vec()..=hi.to_vec()))
            .into_iter()
            .flatten()
            .filter(move |(cell, _)| {
                cell.iter()
                    .zip(lo.iter().zip(hi))
                    .all(|(c, (l, h))| l <= c && c <= h)
            })
    }

    /// Grid cell of the most recent trial.
    pub fn last_cell(&self) -> Option<&GridIndex> {
        self.trials.last().map(|t| &t.cell)
    }

    /// Freezes the store. Further recording fails.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Whether the store is frozen.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// A frozen copy of the trials recorded so far.
    pub fn snapshot(&self) -> ResultStore {
        ResultStore {
            frozen: true,
            ..self.clone()
        }
    }

    /// Flattens the store into a table with one row per trial.
    ///
    /// Columns are the dimension names followed by `outcome`, `timestamp`,
    /// `attempt_index`, `retries` and `flagged`.
    pub fn export(&self) -> ExportTable {
        let columns = self
            .space
            .dimensions()
            .iter()
            .map(|d| d.name().to_string())
            .chain(
                ["outcome", "timestamp", "attempt_index", "retries", "flagged"]
                    .into_iter()
                    .map(String::from),
            )
            .collect();
        let rows = self
            .trials
            .iter()
            .map(|t| ExportRow {
                point: t.point.clone(),
                outcome: t.outcome.class,
                timestamp: t.timestamp,
                attempt_index: t.attempt_index,
                retries: t.retries,
                flagged: t.outcome.is_flagged(),
            })
            .collect();
        ExportTable { columns, rows }
    }
}

/// Flat, serializable view of a [`ResultStore`].
#[derive(Clone, Debug, Serialize)]
pub struct ExportTable {
    /// Column names in order
    pub columns: Vec<String>,
    /// One row per trial, in execution order
    pub rows: Vec<ExportRow>,
}

/// One row of an [`ExportTable`].
#[derive(Clone, Debug, Serialize)]
pub struct ExportRow {
    /// Dimension values, serialized as one column per dimension
    #[serde(flatten)]
    pub point: ParameterPoint,
    /// Outcome class
    pub outcome: OutcomeClass,
    /// Time the trial was recorded
    pub timestamp: DateTime<Utc>,
    /// Attempt index at the point
    pub attempt_index: u32,
    /// Executor retries
    pub retries: u32,
    /// Whether the outcome carries a diagnostic flag
    pub flagged: bool,
}
