//! Translation between human units and device-native encodings.
//!
//! The [`UnitTranslator`] trait is the only place in the engine that knows how a
//! device wants its parameters. Strategies and the result store only ever see
//! [`ParameterPoint`]s; the controller translates each proposed point right before
//! handing it to the [`TrialExecutor`](crate::executor::TrialExecutor).
//!
//! Translators must satisfy the round-trip law: for every valid point `p`,
//! `untranslate(translate(p)) == p`. The reverse composition may be lossy.

use crate::space::{Domain, ParameterPoint, ParameterSpace, SpaceError};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Errors that can occur while translating points.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TranslateError {
    /// A point component lies outside its dimension bounds.
    #[error("Value {value} for '{dimension}' is outside [{min}, {max}]")]
    OutOfRange {
        /// Dimension name
        dimension: String,
        /// Offending value
        value: f64,
        /// Lower bound
        min: f64,
        /// Upper bound
        max: f64,
    },
    /// An encoded point lacks a register the translator needs.
    #[error("Encoded point lacks register '{0}'")]
    MissingRegister(String),
    /// The translator cannot handle this parameter space.
    #[error("Unsupported parameter space: {0}")]
    Unsupported(String),
    /// The point does not belong to the parameter space.
    #[error(transparent)]
    Space(SpaceError),
}

impl From<SpaceError> for TranslateError {
    fn from(err: SpaceError) -> Self {
        match err {
            SpaceError::OutOfRange {
                name,
                value,
                min,
                max,
            } => TranslateError::OutOfRange {
                dimension: name,
                value,
                min,
                max,
            },
            other => TranslateError::Space(other),
        }
    }
}

/// A single device register value.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Register {
    /// Integer register (counts, cycles, raw DAC codes)
    Int(i64),
    /// Floating register (percentages, fine-tuning factors)
    Float(f64),
}

impl Register {
    /// The register value as a float.
    pub fn as_f64(&self) -> f64 {
        match self {
            Register::Int(v) => *v as f64,
            Register::Float(v) => *v,
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Register::Int(v) => write!(f, "{}", v),
            Register::Float(v) => write!(f, "{}", v),
        }
    }
}

/// Device-native representation of a [`ParameterPoint`].
///
/// An ordered list of named registers. Opaque to strategies; stored alongside
/// each trial for traceability.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EncodedPoint {
    registers: Vec<(String, Register)>,
}

impl EncodedPoint {
    /// Creates an empty encoding.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a register, replacing an existing one of the same name.
    pub fn set(&mut self, name: impl Into<String>, value: Register) {
        let name = name.into();
        match self.registers.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.registers.push((name, value)),
        }
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, name: impl Into<String>, value: Register) -> Self {
        self.set(name, value);
        self
    }

    /// Looks up a register.
    pub fn get(&self, name: &str) -> Option<Register> {
        self.registers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| *value)
    }

    /// Looks up a register, failing with [`TranslateError::MissingRegister`].
    pub fn require(&self, name: &str) -> Result<Register, TranslateError> {
        self.get(name)
            .ok_or_else(|| TranslateError::MissingRegister(name.to_string()))
    }

    /// `(name, register)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Register)> {
        self.registers.iter().map(|(n, v)| (n.as_str(), *v))
    }
}

impl fmt::Display for EncodedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, value) in &self.registers {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", name, value)?;
            first = false;
        }
        Ok(())
    }
}

impl Serialize for EncodedPoint {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.registers.len()))?;
        for (name, value) in &self.registers {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Trait for converting between human-unit points and device encodings.
///
/// Implementors isolate every device-specific quirk (non-linear registers,
/// clock-relative offsets, ...). Both directions must be pure functions.
///
/// # Errors
///
/// [`translate`](UnitTranslator::translate) must fail with
/// [`TranslateError::OutOfRange`] for points outside the space bounds and
/// must never clamp silently.
pub trait UnitTranslator {
    /// Encodes a point for the device.
    fn translate(
        &self,
        space: &ParameterSpace,
        point: &ParameterPoint,
    ) -> Result<EncodedPoint, TranslateError>;

    /// Decodes device registers back into a grid-snapped point.
    fn untranslate(
        &self,
        space: &ParameterSpace,
        encoded: &EncodedPoint,
    ) -> Result<ParameterPoint, TranslateError>;
}

/// Translator for devices that accept human units directly.
///
/// Each dimension becomes a register of the same name. Discrete dimensions
/// are emitted as integer registers.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityTranslator;

impl UnitTranslator for IdentityTranslator {
    fn translate(
        &self,
        space: &ParameterSpace,
        point: &ParameterPoint,
    ) -> Result<EncodedPoint, TranslateError> {
        let index = space.index_of(point)?;
        let mut encoded = EncodedPoint::new();
        for (dim, step) in space.dimensions().iter().zip(index) {
            let value = dim.value_at(step);
            let register = match dim.domain() {
                Domain::Discrete => Register::Int(value as i64),
                Domain::Continuous => Register::Float(value),
            };
            encoded.set(dim.name(), register);
        }
        Ok(encoded)
    }

    fn untranslate(
        &self,
        space: &ParameterSpace,
        encoded: &EncodedPoint,
    ) -> Result<ParameterPoint, TranslateError> {
        let values = space
            .dimensions()
            .iter()
            .map(|dim| encoded.require(dim.name()).map(|r| r.as_f64()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(space.nearest_point(&values)?)
    }
}

/// Affine mapping of one dimension onto an integer register.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearScale {
    /// Dimension this mapping applies to
    pub dimension: String,
    /// Register name on the device
    pub register: String,
    /// Device counts per human unit
    pub scale: f64,
    /// Device count at human value zero
    pub bias: f64,
}

impl LinearScale {
    /// Creates a mapping `register = round_half_even(value * scale + bias)`.
    pub fn new(
        dimension: impl Into<String>,
        register: impl Into<String>,
        scale: f64,
        bias: f64,
    ) -> Self {
        LinearScale {
            dimension: dimension.into(),
            register: register.into(),
            scale,
            bias,
        }
    }
}

/// Translator for devices with linear integer registers (delay counters, DAC codes).
#[derive(Clone, Debug)]
pub struct LinearTranslator {
    scales: Vec<LinearScale>,
}

impl LinearTranslator {
    /// Creates a translator covering every dimension of `space`.
    ///
    /// # Errors
    ///
    /// Fails if a dimension has no mapping, a mapping names an unknown
    /// dimension, or a scale is coarser than its dimension's resolution
    /// (one register count spanning more than one grid step breaks the round-trip law).
    pub fn new(space: &ParameterSpace, scales: Vec<LinearScale>) -> Result<Self, TranslateError> {
        if let Some(unknown) = scales.iter().find(|s| space.position(&s.dimension).is_none()) {
            return Err(TranslateError::Space(SpaceError::UnknownDimension(
                unknown.dimension.clone(),
            )));
        }
        let mut ordered = Vec::with_capacity(space.len());
        for dim in space.dimensions() {
            let scale = scales
                .iter()
                .find(|s| s.dimension == dim.name())
                .ok_or_else(|| {
                    TranslateError::Unsupported(format!("no register mapping for '{}'", dim.name()))
                })?;
            if !scale.scale.is_finite() || !scale.bias.is_finite() {
                return Err(TranslateError::Unsupported(format!(
                    "mapping for '{}' is not finite",
                    dim.name()
                )));
            }
            if scale.scale.abs() * dim.resolution() < 1.0 {
                return Err(TranslateError::Unsupported(format!(
                    "register '{}' is coarser than the resolution of '{}'",
                    scale.register,
                    dim.name()
                )));
            }
            ordered.push(scale.clone());
        }
        Ok(LinearTranslator { scales: ordered })
    }
}

impl UnitTranslator for LinearTranslator {
    fn translate(
        &self,
        space: &ParameterSpace,
        point: &ParameterPoint,
    ) -> Result<EncodedPoint, TranslateError> {
        let index = space.index_of(point)?;
        let mut encoded = EncodedPoint::new();
        for ((dim, step), scale) in space.dimensions().iter().zip(index).zip(&self.scales) {
            let counts = (dim.value_at(step) * scale.scale + scale.bias).round_ties_even();
            encoded.set(scale.register.clone(), Register::Int(counts as i64));
        }
        Ok(encoded)
    }

    fn untranslate(
        &self,
        space: &ParameterSpace,
        encoded: &EncodedPoint,
    ) -> Result<ParameterPoint, TranslateError> {
        let values = self
            .scales
            .iter()
            .map(|s| {
                encoded
                    .require(&s.register)
                    .map(|r| (r.as_f64() - s.bias) / s.scale)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(space.nearest_point(&values)?)
    }
}
