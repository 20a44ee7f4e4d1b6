use crate::space::{GridIndex, ParameterSpace};
use itertools::Itertools;

/// An axis-aligned box of grid cells, bounds inclusive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Region {
    lo: GridIndex,
    hi: GridIndex,
}

/// `last * k / divisions` without overflowing; never exceeds `last`.
fn cut(last: u64, k: u64, divisions: u64) -> u64 {
    let cut = u128::from(last) * u128::from(k) / u128::from(divisions);
    u64::try_from(cut).unwrap_or(last)
}

impl Region {
    /// Creates a region. Panics in debug builds if a lower bound exceeds its upper bound.
    pub fn new(lo: GridIndex, hi: GridIndex) -> Self {
        debug_assert!(lo.len() == hi.len() && lo.iter().zip(&hi).all(|(l, h)| l <= h));
        Region { lo, hi }
    }

    /// The region covering the whole grid.
    pub fn whole(space: &ParameterSpace) -> Self {
        let hi = space.grid_shape().into_iter().map(|s| s - 1).collect();
        Region::new(vec![0; space.len()], hi)
    }

    /// Splits the whole grid into `divisions` slices per dimension.
    ///
    /// Neighbouring regions share their boundary cells. Dimensions with fewer
    /// steps than `divisions` are split at every step.
    pub fn lattice(space: &ParameterSpace, divisions: u64) -> Vec<Self> {
        space
            .grid_shape()
            .into_iter()
            .map(|steps| {
                let last = steps.saturating_sub(1);
                let divisions = divisions.clamp(1, last.max(1));
                let cuts: Vec<u64> = (0..=divisions)
                    .map(|k| cut(last, k, divisions))
                    .dedup()
                    .collect();
                cuts.into_iter().tuple_windows::<(u64, u64)>().collect::<Vec<_>>()
            })
            .multi_cartesian_product()
            .map(|slices| {
                let (lo, hi) = slices.into_iter().unzip();
                Region::new(lo, hi)
            })
            .collect()
    }

    /// Inclusive lower corner.
    pub fn lo(&self) -> &[u64] {
        &self.lo
    }

    /// Inclusive upper corner.
    pub fn hi(&self) -> &[u64] {
        &self.hi
    }

    /// Extent in grid steps per dimension.
    pub fn spans(&self) -> impl Iterator<Item = u64> + '_ {
        self.lo.iter().zip(&self.hi).map(|(l, h)| h - l)
    }

    /// Whether no span exceeds one grid step.
    pub fn is_unit(&self) -> bool {
        self.spans().all(|s| s <= 1)
    }

    /// The dimension with the largest span; the first one on ties.
    pub fn widest(&self) -> usize {
        let mut best = 0;
        for (i, span) in self.spans().enumerate() {
            if span > self.hi[best] - self.lo[best] {
                best = i;
            }
        }
        best
    }

    /// Corner cells in lexicographic order, without duplicates.
    pub fn corners(&self) -> Vec<GridIndex> {
        self.lo
            .iter()
            .zip(&self.hi)
            .map(|(l, h)| if l == h { vec![*l] } else { vec![*l, *h] })
            .multi_cartesian_product()
            .collect()
    }

    /// Splits at the midpoint of the widest dimension. Both halves contain the
    /// midpoint cell.
    pub fn split(&self) -> (Region, Region) {
        let d = self.widest();
        let mid = self.lo[d] + (self.hi[d] - self.lo[d]) / 2;
        let mut left_hi = self.hi.clone();
        left_hi[d] = mid;
        let mut right_lo = self.lo.clone();
        right_lo[d] = mid;
        (
            Region::new(self.lo.clone(), left_hi),
            Region::new(right_lo, self.hi.clone()),
        )
    }
}
