//! Parameter space model.
//!
//! A [`ParameterSpace`] is an ordered list of [`Dimension`]s, each expressed in
//! human units (microseconds, nanoseconds, percent, ...). Every dimension defines
//! a regular grid `min + k * resolution`; points handed around the engine are
//! always snapped onto that grid, which is what makes strategies, the result
//! store and the translators agree on identity without comparing raw floats.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Grid coordinates of a point, one step count per dimension.
pub type GridIndex = Vec<u64>;

/// Relative slack used when deciding whether a value lies inside its bounds.
const BOUNDS_EPSILON: f64 = 1e-9;

/// Largest number of grid steps a dimension may have (2^53, the last integer
/// an `f64` step count represents exactly).
pub const MAX_STEPS: f64 = 9_007_199_254_740_992.0;

/// Errors that can occur when building or querying a parameter space.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SpaceError {
    /// A dimension violates `min < max`, `resolution > 0` or `(max - min) >= resolution`.
    #[error("Invalid dimension '{name}': {reason}")]
    InvalidDimension {
        /// Dimension name
        name: String,
        /// What is wrong with it
        reason: String,
    },
    /// The space has no dimensions.
    #[error("Parameter space has no dimensions")]
    Empty,
    /// Two dimensions share a name.
    #[error("Duplicate dimension '{0}'")]
    DuplicateDimension(String),
    /// A dimension name is not part of the space.
    #[error("Unknown dimension '{0}'")]
    UnknownDimension(String),
    /// A value lies outside its dimension bounds.
    #[error("Value {value} for dimension '{name}' is outside [{min}, {max}]")]
    OutOfRange {
        /// Dimension name
        name: String,
        /// Offending value
        value: f64,
        /// Lower bound
        min: f64,
        /// Upper bound
        max: f64,
    },
    /// The number of values does not match the number of dimensions.
    #[error("Expected {expected} values, got {actual}")]
    Arity {
        /// Number of dimensions
        expected: usize,
        /// Number of values supplied
        actual: usize,
    },
    /// A grid index exceeds the grid of its dimension.
    #[error("Grid step {step} is outside dimension '{name}' ({steps} steps)")]
    IndexOutOfBounds {
        /// Dimension name
        name: String,
        /// Offending step
        step: u64,
        /// Number of grid steps of the dimension
        steps: u64,
    },
}

/// Human unit of a dimension.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Unit {
    /// Seconds
    Seconds,
    /// Milliseconds
    Milliseconds,
    /// Microseconds
    Microseconds,
    /// Nanoseconds
    Nanoseconds,
    /// Percent of some device-defined reference
    Percent,
    /// Clock cycles
    Cycles,
    /// Volts
    Volts,
    /// Anything else, labelled by the caller
    Other(String),
}

impl Unit {
    /// Returns how many seconds one unit represents, or `None` for non-time units.
    pub fn seconds_per_unit(&self) -> Option<f64> {
        match self {
            Unit::Seconds => Some(1.0),
            Unit::Milliseconds => Some(1e-3),
            Unit::Microseconds => Some(1e-6),
            Unit::Nanoseconds => Some(1e-9),
            _ => None,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::Seconds => write!(f, "s"),
            Unit::Milliseconds => write!(f, "ms"),
            Unit::Microseconds => write!(f, "us"),
            Unit::Nanoseconds => write!(f, "ns"),
            Unit::Percent => write!(f, "%"),
            Unit::Cycles => write!(f, "cycles"),
            Unit::Volts => write!(f, "V"),
            Unit::Other(label) => write!(f, "{}", label),
        }
    }
}

/// Whether a dimension takes arbitrary grid values or whole numbers only.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Domain {
    /// Real-valued dimension sampled at `resolution`
    #[default]
    Continuous,
    /// Integer-valued dimension (e.g. a repeat count)
    Discrete,
}

/// One axis of the parameter space.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DimensionDef")]
pub struct Dimension {
    name: String,
    unit: Unit,
    domain: Domain,
    min: f64,
    max: f64,
    resolution: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct DimensionDef {
    name: String,
    unit: Unit,
    #[serde(default)]
    domain: Domain,
    min: f64,
    max: f64,
    resolution: f64,
}

impl TryFrom<DimensionDef> for Dimension {
    type Error = SpaceError;

    fn try_from(def: DimensionDef) -> Result<Self, Self::Error> {
        Dimension::with_domain(def.name, def.unit, def.domain, def.min, def.max, def.resolution)
    }
}

impl Dimension {
    /// Creates a continuous dimension.
    ///
    /// # Errors
    ///
    /// Returns [`SpaceError::InvalidDimension`] unless `min < max`, `resolution > 0`,
    /// `(max - min) >= resolution` and all values are finite.
    pub fn new(
        name: impl Into<String>,
        unit: Unit,
        min: f64,
        max: f64,
        resolution: f64,
    ) -> Result<Self, SpaceError> {
        Self::with_domain(name, unit, Domain::Continuous, min, max, resolution)
    }

    /// Creates a discrete dimension. `min` and `resolution` must be whole numbers.
    pub fn discrete(
        name: impl Into<String>,
        unit: Unit,
        min: f64,
        max: f64,
        resolution: f64,
    ) -> Result<Self, SpaceError> {
        Self::with_domain(name, unit, Domain::Discrete, min, max, resolution)
    }

    /// Creates a dimension with an explicit [`Domain`].
    pub fn with_domain(
        name: impl Into<String>,
        unit: Unit,
        domain: Domain,
        min: f64,
        max: f64,
        resolution: f64,
    ) -> Result<Self, SpaceError> {
        let name = name.into();
        let invalid = |reason: &str| SpaceError::InvalidDimension {
            name: name.clone(),
            reason: reason.to_string(),
        };
        if name.is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if !(min.is_finite() && max.is_finite() && resolution.is_finite()) {
            return Err(invalid("bounds and resolution must be finite"));
        }
        if min >= max {
            return Err(invalid("min must be smaller than max"));
        }
        if resolution <= 0.0 {
            return Err(invalid("resolution must be positive"));
        }
        if max - min < resolution {
            return Err(invalid("range must span at least one resolution step"));
        }
        if (max - min) / resolution >= MAX_STEPS {
            return Err(invalid("resolution is too fine for the range"));
        }
        if domain == Domain::Discrete && (min.fract() != 0.0 || resolution.fract() != 0.0) {
            return Err(invalid("discrete dimensions need integral min and resolution"));
        }
        Ok(Dimension {
            name,
            unit,
            domain,
            min,
            max,
            resolution,
        })
    }

    /// Dimension name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human unit.
    pub fn unit(&self) -> &Unit {
        &self.unit
    }

    /// Value domain.
    pub fn domain(&self) -> Domain {
        self.domain
    }

    /// Lower bound (inclusive).
    pub fn min(&self) -> f64 {
        self.min
    }

    /// Upper bound (inclusive).
    pub fn max(&self) -> f64 {
        self.max
    }

    /// Smallest meaningful step in human units.
    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    /// Number of grid values of this dimension.
    pub fn steps(&self) -> u64 {
        let last = ((self.max - self.min) / self.resolution + BOUNDS_EPSILON).floor() as u64;
        last.saturating_add(1)
    }

    /// The grid value at `step`. Does not check bounds.
    pub fn value_at(&self, step: u64) -> f64 {
        self.min + step as f64 * self.resolution
    }

    /// Whether `value` lies within `[min, max]`.
    pub fn contains(&self, value: f64) -> bool {
        let slack = self.resolution * BOUNDS_EPSILON;
        value.is_finite() && value >= self.min - slack && value <= self.max + slack
    }

    /// The grid step closest to `value`, ties rounded to even, clamped to the grid.
    pub fn nearest_step(&self, value: f64) -> u64 {
        let raw = ((value - self.min) / self.resolution).round_ties_even();
        if raw <= 0.0 {
            0
        } else {
            (raw as u64).min(self.steps() - 1)
        }
    }

    /// Snaps `value` onto the grid.
    ///
    /// # Errors
    ///
    /// Returns [`SpaceError::OutOfRange`] if `value` is outside the bounds. Values are
    /// never clamped.
    pub fn snap(&self, value: f64) -> Result<f64, SpaceError> {
        self.check(value)?;
        Ok(self.value_at(self.nearest_step(value)))
    }

    fn check(&self, value: f64) -> Result<(), SpaceError> {
        if self.contains(value) {
            Ok(())
        } else {
            Err(SpaceError::OutOfRange {
                name: self.name.clone(),
                value,
                min: self.min,
                max: self.max,
            })
        }
    }
}

/// A point of the parameter space in human units, snapped to the grid.
///
/// Points are only created through a [`ParameterSpace`], so every value is a
/// grid value of its dimension and two points for the same grid cell compare equal.
#[derive(Clone, Debug, PartialEq)]
pub struct ParameterPoint {
    coords: Vec<(String, f64)>,
}

impl ParameterPoint {
    /// Value of the named dimension.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.coords
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| *value)
    }

    /// Values in dimension order.
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.coords.iter().map(|(_, value)| *value)
    }

    /// `(name, value)` pairs in dimension order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.coords.iter().map(|(name, value)| (name.as_str(), *value))
    }

    /// Number of coordinates.
    pub fn len(&self) -> usize {
        self.coords.len()
    }

    /// Whether the point has no coordinates.
    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }
}

impl fmt::Display for ParameterPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, value) in &self.coords {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", name, value)?;
            first = false;
        }
        Ok(())
    }
}

impl Serialize for ParameterPoint {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.coords.len()))?;
        for (name, value) in &self.coords {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// The set of dimensions under test.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ParameterSpace {
    dimensions: Vec<Dimension>,
}

impl ParameterSpace {
    /// Creates a space from an ordered list of dimensions.
    ///
    /// # Errors
    ///
    /// Fails if `dimensions` is empty or contains duplicate names.
    pub fn new(dimensions: Vec<Dimension>) -> Result<Self, SpaceError> {
        if dimensions.is_empty() {
            return Err(SpaceError::Empty);
        }
        for (i, dim) in dimensions.iter().enumerate() {
            if dimensions[..i].iter().any(|d| d.name == dim.name) {
                return Err(SpaceError::DuplicateDimension(dim.name.clone()));
            }
        }
        Ok(ParameterSpace { dimensions })
    }

    /// Dimensions in order.
    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    /// Looks up a dimension by name.
    pub fn dimension(&self, name: &str) -> Option<&Dimension> {
        self.dimensions.iter().find(|d| d.name == name)
    }

    /// Position of the named dimension.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.dimensions.iter().position(|d| d.name == name)
    }

    /// Number of dimensions.
    pub fn len(&self) -> usize {
        self.dimensions.len()
    }

    /// Always `false`; a space has at least one dimension.
    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty()
    }

    /// Grid steps per dimension.
    pub fn grid_shape(&self) -> Vec<u64> {
        self.dimensions.iter().map(Dimension::steps).collect()
    }

    /// Total number of grid cells, saturating at `u64::MAX`.
    pub fn grid_size(&self) -> u64 {
        self.dimensions
            .iter()
            .fold(1u64, |acc, d| acc.saturating_mul(d.steps()))
    }

    /// Builds a point from values in dimension order, snapping each to its grid.
    ///
    /// # Errors
    ///
    /// Fails on arity mismatch or if any value is out of bounds.
    pub fn point(&self, values: &[f64]) -> Result<ParameterPoint, SpaceError> {
        self.check_arity(values.len())?;
        let coords = self
            .dimensions
            .iter()
            .zip(values)
            .map(|(dim, value)| Ok((dim.name.clone(), dim.snap(*value)?)))
            .collect::<Result<Vec<_>, SpaceError>>()?;
        Ok(ParameterPoint { coords })
    }

    /// Builds a point from `(name, value)` pairs. Every dimension must be named exactly once.
    pub fn point_named(&self, pairs: &[(&str, f64)]) -> Result<ParameterPoint, SpaceError> {
        self.check_arity(pairs.len())?;
        if let Some((unknown, _)) = pairs.iter().find(|(n, _)| self.position(n).is_none()) {
            return Err(SpaceError::UnknownDimension(unknown.to_string()));
        }
        let values = self
            .dimensions
            .iter()
            .map(|dim| {
                pairs
                    .iter()
                    .find(|(n, _)| *n == dim.name)
                    .map(|(_, value)| *value)
                    .ok_or_else(|| SpaceError::UnknownDimension(dim.name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.point(&values)
    }

    /// Builds the grid point nearest to `values`, accepting values up to half a
    /// resolution step outside the bounds.
    ///
    /// Used when decoding device registers, whose rounding may land slightly past
    /// a bound.
    pub fn nearest_point(&self, values: &[f64]) -> Result<ParameterPoint, SpaceError> {
        self.check_arity(values.len())?;
        let coords = self
            .dimensions
            .iter()
            .zip(values)
            .map(|(dim, value)| {
                let half = dim.resolution / 2.0;
                if !value.is_finite() || *value < dim.min - half || *value > dim.max + half {
                    return Err(SpaceError::OutOfRange {
                        name: dim.name.clone(),
                        value: *value,
                        min: dim.min,
                        max: dim.max,
                    });
                }
                Ok((dim.name.clone(), dim.value_at(dim.nearest_step(*value))))
            })
            .collect::<Result<Vec<_>, SpaceError>>()?;
        Ok(ParameterPoint { coords })
    }

    /// The point at a grid index.
    pub fn point_at(&self, index: &[u64]) -> Result<ParameterPoint, SpaceError> {
        self.check_arity(index.len())?;
        let coords = self
            .dimensions
            .iter()
            .zip(index)
            .map(|(dim, step)| {
                if *step >= dim.steps() {
                    return Err(SpaceError::IndexOutOfBounds {
                        name: dim.name.clone(),
                        step: *step,
                        steps: dim.steps(),
                    });
                }
                Ok((dim.name.clone(), dim.value_at(*step)))
            })
            .collect::<Result<Vec<_>, SpaceError>>()?;
        Ok(ParameterPoint { coords })
    }

    /// The grid index of a point.
    ///
    /// # Errors
    ///
    /// Fails if the point's dimensions do not match this space or a value is out of bounds.
    pub fn index_of(&self, point: &ParameterPoint) -> Result<GridIndex, SpaceError> {
        self.check_arity(point.len())?;
        self.dimensions
            .iter()
            .zip(point.iter())
            .map(|(dim, (name, value))| {
                if dim.name != name {
                    return Err(SpaceError::UnknownDimension(name.to_string()));
                }
                dim.check(value)?;
                Ok(dim.nearest_step(value))
            })
            .collect()
    }

    /// Row-major position of a grid index (first dimension varies slowest).
    pub fn linear_index(&self, index: &[u64]) -> u64 {
        self.dimensions
            .iter()
            .zip(index)
            .fold(0u64, |acc, (dim, step)| {
                acc.saturating_mul(dim.steps()).saturating_add(*step)
            })
    }

    /// Inverse of [`linear_index`](Self::linear_index).
    pub fn grid_index(&self, mut linear: u64) -> GridIndex {
        let mut index = vec![0; self.dimensions.len()];
        for (slot, dim) in index.iter_mut().zip(&self.dimensions).rev() {
            let steps = dim.steps();
            *slot = linear % steps;
            linear /= steps;
        }
        index
    }

    fn check_arity(&self, actual: usize) -> Result<(), SpaceError> {
        if actual != self.dimensions.len() {
            return Err(SpaceError::Arity {
                expected: self.dimensions.len(),
                actual,
            });
        }
        Ok(())
    }
}
