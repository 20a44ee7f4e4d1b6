use crate::config::ChipWhispererConfig;
use glitchscan_core::space::{Dimension, ParameterPoint, ParameterSpace};
use glitchscan_core::translator::{EncodedPoint, Register, TranslateError, UnitTranslator};
use log::debug;

/// Cycle counts are cleaned to this many steps per cycle before splitting them,
/// so values like 23.999999999 land on 24.
const CYCLE_PRECISION: f64 = 1e6;

/// Relative slack when comparing the glitch clock period to a resolution.
const PERIOD_SLACK: f64 = 1e-9;

#[derive(Clone, Debug)]
struct TimeAxis {
    position: usize,
    seconds_per_unit: f64,
}

impl TimeAxis {
    fn new(space: &ParameterSpace, name: &str) -> Result<Self, TranslateError> {
        let position = space.position(name).ok_or_else(|| {
            TranslateError::Unsupported(format!("no dimension named '{}'", name))
        })?;
        let dim = &space.dimensions()[position];
        let seconds_per_unit = dim.unit().seconds_per_unit().ok_or_else(|| {
            TranslateError::Unsupported(format!(
                "dimension '{}' has unit {}, a time unit is required",
                name,
                dim.unit()
            ))
        })?;
        if dim.min() < 0.0 {
            return Err(TranslateError::Unsupported(format!(
                "dimension '{}' starts before the trigger",
                name
            )));
        }
        Ok(TimeAxis {
            position,
            seconds_per_unit,
        })
    }

    fn dimension<'a>(&self, space: &'a ParameterSpace) -> &'a Dimension {
        &space.dimensions()[self.position]
    }
}

/// Translator from time offsets and pulse widths to ChipWhisperer VCC glitch
/// registers.
///
/// Emitted registers, in order:
///
/// - `ext_offset` - whole glitch clock cycles after the trigger
/// - `offset` - position inside the cycle in percent, within ±50 %. Remainders
///   above half a cycle are carried into `ext_offset` and become negative.
///   Always zero in `ext_only` mode, where the offset is rounded to whole cycles.
/// - `offset_fine` - always zero
/// - `width`, `width_fine`, `repeat` - only with a width dimension. Widths below
///   half a cycle are a single pulse (`repeat = 1`). Longer pulses merge
///   `repeat = n + 1` pulses, `n` being the width rounded to whole cycles, and
///   `width` holds the signed remainder in percent.
///
/// All other dimensions are passed through as floating registers named after
/// the dimension.
#[derive(Clone, Debug)]
pub struct VccGlitchTranslator {
    clkgen_freq: f64,
    ext_only: bool,
    offset: TimeAxis,
    width: Option<TimeAxis>,
}

impl VccGlitchTranslator {
    /// Creates a translator for `space`.
    ///
    /// # Errors
    ///
    /// Returns [`TranslateError::Unsupported`] if the clock frequency is not
    /// positive, a configured dimension is missing, is not measured in time or
    /// starts before the trigger, or if `ext_only` is set and the offset
    /// resolution is finer than one glitch clock cycle.
    pub fn new(
        space: &ParameterSpace,
        config: &ChipWhispererConfig,
    ) -> Result<Self, TranslateError> {
        if !(config.clkgen_freq.is_finite() && config.clkgen_freq > 0.0) {
            return Err(TranslateError::Unsupported(format!(
                "invalid glitch clock frequency {}",
                config.clkgen_freq
            )));
        }
        let offset = TimeAxis::new(space, &config.offset_dimension)?;
        let width = config
            .width_dimension
            .as_deref()
            .map(|name| TimeAxis::new(space, name))
            .transpose()?;
        if width.as_ref().is_some_and(|w| w.position == offset.position) {
            return Err(TranslateError::Unsupported(
                "offset and width must be different dimensions".into(),
            ));
        }
        if config.ext_only {
            let period = 1.0 / config.clkgen_freq;
            let resolution = offset.dimension(space).resolution() * offset.seconds_per_unit;
            if period > resolution * (1.0 + PERIOD_SLACK) {
                return Err(TranslateError::Unsupported(format!(
                    "offset resolution {} s is finer than one glitch clock cycle ({} s)",
                    resolution, period
                )));
            }
        }
        debug!(
            "ChipWhisperer translator at {} Hz (ext_only: {})",
            config.clkgen_freq, config.ext_only
        );
        Ok(VccGlitchTranslator {
            clkgen_freq: config.clkgen_freq,
            ext_only: config.ext_only,
            offset,
            width,
        })
    }

    fn cycles(&self, value: f64, axis: &TimeAxis) -> f64 {
        let ideal = value * axis.seconds_per_unit * self.clkgen_freq;
        (ideal * CYCLE_PRECISION).round_ties_even() / CYCLE_PRECISION
    }

    fn value(&self, cycles: f64, axis: &TimeAxis) -> f64 {
        cycles / self.clkgen_freq / axis.seconds_per_unit
    }

    fn encode_offset(&self, cycles: f64, encoded: &mut EncodedPoint) {
        let (ext_offset, offset) = if self.ext_only {
            (cycles.round_ties_even(), 0.0)
        } else {
            let whole = cycles.floor();
            let frac = cycles - whole;
            if frac > 0.5 {
                (whole + 1.0, (frac - 1.0) * 100.0)
            } else {
                (whole, frac * 100.0)
            }
        };
        encoded.set("ext_offset", Register::Int(ext_offset as i64));
        encoded.set("offset", Register::Float(offset));
        encoded.set("offset_fine", Register::Float(0.0));
    }

    fn encode_width(&self, cycles: f64, encoded: &mut EncodedPoint) {
        let merged = cycles.round_ties_even();
        encoded.set("width", Register::Float((cycles - merged) * 100.0));
        encoded.set("width_fine", Register::Float(0.0));
        encoded.set("repeat", Register::Int(merged as i64 + 1));
    }

    fn is_time_axis(&self, position: usize) -> bool {
        position == self.offset.position
            || self.width.as_ref().is_some_and(|w| w.position == position)
    }
}

impl UnitTranslator for VccGlitchTranslator {
    fn translate(
        &self,
        space: &ParameterSpace,
        point: &ParameterPoint,
    ) -> Result<EncodedPoint, TranslateError> {
        space.index_of(point)?;
        let values: Vec<f64> = point.values().collect();
        let mut encoded = EncodedPoint::new();
        self.encode_offset(self.cycles(values[self.offset.position], &self.offset), &mut encoded);
        if let Some(width) = &self.width {
            self.encode_width(self.cycles(values[width.position], width), &mut encoded);
        }
        for (position, (name, value)) in point.iter().enumerate() {
            if !self.is_time_axis(position) {
                encoded.set(name, Register::Float(value));
            }
        }
        Ok(encoded)
    }

    fn untranslate(
        &self,
        space: &ParameterSpace,
        encoded: &EncodedPoint,
    ) -> Result<ParameterPoint, TranslateError> {
        let mut values = Vec::with_capacity(space.len());
        for (position, dim) in space.dimensions().iter().enumerate() {
            let value = if position == self.offset.position {
                let cycles = encoded.require("ext_offset")?.as_f64()
                    + encoded.require("offset")?.as_f64() / 100.0;
                self.value(cycles, &self.offset)
            } else if let Some(width) = self.width.as_ref().filter(|w| w.position == position) {
                let cycles = (encoded.require("repeat")?.as_f64() - 1.0)
                    + encoded.require("width")?.as_f64() / 100.0;
                self.value(cycles, width)
            } else {
                encoded.require(dim.name())?.as_f64()
            };
            values.push(value);
        }
        Ok(space.nearest_point(&values)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glitchscan_core::space::Unit;

    fn space() -> ParameterSpace {
        ParameterSpace::new(vec![
            Dimension::new("offset", Unit::Microseconds, 0.0, 5.0, 0.01).unwrap(),
            Dimension::new("width", Unit::Nanoseconds, 0.0, 200.0, 5.0).unwrap(),
        ])
        .unwrap()
    }

    fn config(clkgen_freq: f64, ext_only: bool) -> ChipWhispererConfig {
        ChipWhispererConfig {
            clkgen_freq,
            ext_only,
            offset_dimension: "offset".into(),
            width_dimension: Some("width".into()),
        }
    }

    fn float(encoded: &EncodedPoint, name: &str) -> f64 {
        encoded.get(name).unwrap().as_f64()
    }

    #[test]
    fn test_offset_within_first_half_cycle() {
        let space = space();
        let translator = VccGlitchTranslator::new(&space, &config(10e6, false)).unwrap();
        let encoded = translator
            .translate(&space, &space.point(&[1.23, 30.0]).unwrap())
            .unwrap();
        assert_eq!(encoded.get("ext_offset"), Some(Register::Int(12)));
        assert!((float(&encoded, "offset") - 30.0).abs() < 1e-6);
        assert_eq!(encoded.get("offset_fine"), Some(Register::Float(0.0)));
    }

    #[test]
    fn test_offset_carries_into_next_cycle() {
        let space = space();
        let translator = VccGlitchTranslator::new(&space, &config(10e6, false)).unwrap();
        let encoded = translator
            .translate(&space, &space.point(&[1.27, 30.0]).unwrap())
            .unwrap();
        assert_eq!(encoded.get("ext_offset"), Some(Register::Int(13)));
        assert!((float(&encoded, "offset") + 30.0).abs() < 1e-6);
    }

    #[test]
    fn test_exact_cycles() {
        let space = space();
        let translator = VccGlitchTranslator::new(&space, &config(24e6, false)).unwrap();
        let encoded = translator
            .translate(&space, &space.point(&[1.0, 0.0]).unwrap())
            .unwrap();
        assert_eq!(encoded.get("ext_offset"), Some(Register::Int(24)));
        assert_eq!(encoded.get("offset"), Some(Register::Float(0.0)));
        assert_eq!(encoded.get("repeat"), Some(Register::Int(1)));
    }

    #[test]
    fn test_short_and_merged_widths() {
        let space = space();
        let translator = VccGlitchTranslator::new(&space, &config(10e6, false)).unwrap();
        let short = translator
            .translate(&space, &space.point(&[0.0, 30.0]).unwrap())
            .unwrap();
        assert_eq!(short.get("repeat"), Some(Register::Int(1)));
        assert!((float(&short, "width") - 30.0).abs() < 1e-6);

        let long = translator
            .translate(&space, &space.point(&[0.0, 170.0]).unwrap())
            .unwrap();
        assert_eq!(long.get("repeat"), Some(Register::Int(3)));
        assert!((float(&long, "width") + 30.0).abs() < 1e-6);
        assert_eq!(long.get("width_fine"), Some(Register::Float(0.0)));
    }

    #[test]
    fn test_round_trip_stm32_clock() {
        let space = space();
        let translator = VccGlitchTranslator::new(&space, &config(24e6, false)).unwrap();
        for linear in 0..space.grid_size() {
            let point = space.point_at(&space.grid_index(linear)).unwrap();
            let encoded = translator.translate(&space, &point).unwrap();
            assert_eq!(translator.untranslate(&space, &encoded).unwrap(), point);
        }
    }

    #[test]
    fn test_ext_only() {
        let space = ParameterSpace::new(vec![
            Dimension::new("offset", Unit::Microseconds, 0.0, 20.0, 0.1).unwrap(),
            Dimension::new("width", Unit::Nanoseconds, 10.0, 40.0, 10.0).unwrap(),
        ])
        .unwrap();
        let translator = VccGlitchTranslator::new(&space, &config(10e6, true)).unwrap();
        for linear in 0..space.grid_size() {
            let point = space.point_at(&space.grid_index(linear)).unwrap();
            let encoded = translator.translate(&space, &point).unwrap();
            assert_eq!(encoded.get("offset"), Some(Register::Float(0.0)));
            assert_eq!(translator.untranslate(&space, &encoded).unwrap(), point);
        }
        // 10 ns steps cannot be expressed in 100 ns cycles
        assert!(matches!(
            VccGlitchTranslator::new(&self::space(), &config(10e6, true)),
            Err(TranslateError::Unsupported(_))
        ));
    }

    #[test]
    fn test_pass_through_dimension() {
        let space = ParameterSpace::new(vec![
            Dimension::new("voltage", Unit::Volts, 1.0, 3.0, 0.5).unwrap(),
            Dimension::new("offset", Unit::Nanoseconds, 0.0, 1000.0, 10.0).unwrap(),
        ])
        .unwrap();
        let config = ChipWhispererConfig {
            clkgen_freq: 7384615.384615385,
            ext_only: false,
            offset_dimension: "offset".into(),
            width_dimension: None,
        };
        let translator = VccGlitchTranslator::new(&space, &config).unwrap();
        let point = space.point(&[2.5, 420.0]).unwrap();
        let encoded = translator.translate(&space, &point).unwrap();
        assert_eq!(encoded.get("voltage"), Some(Register::Float(2.5)));
        assert_eq!(encoded.get("repeat"), None);
        assert_eq!(translator.untranslate(&space, &encoded).unwrap(), point);
    }

    #[test]
    fn test_rejects_unsupported_spaces() {
        let space = ParameterSpace::new(vec![
            Dimension::new("offset", Unit::Cycles, 0.0, 100.0, 1.0).unwrap(),
        ])
        .unwrap();
        let mut cfg = config(24e6, false);
        cfg.width_dimension = None;
        assert!(matches!(
            VccGlitchTranslator::new(&space, &cfg),
            Err(TranslateError::Unsupported(_))
        ));
        assert!(matches!(
            VccGlitchTranslator::new(&self::space(), &config(0.0, false)),
            Err(TranslateError::Unsupported(_))
        ));
    }

    #[test]
    fn test_out_of_range() {
        let wide = ParameterSpace::new(vec![
            Dimension::new("offset", Unit::Microseconds, 0.0, 10.0, 0.01).unwrap(),
            Dimension::new("width", Unit::Nanoseconds, 0.0, 200.0, 5.0).unwrap(),
        ])
        .unwrap();
        let space = space();
        let translator = VccGlitchTranslator::new(&space, &config(24e6, false)).unwrap();
        let point = wide.point(&[7.5, 10.0]).unwrap();
        assert!(matches!(
            translator.translate(&space, &point),
            Err(TranslateError::OutOfRange { .. })
        ));
    }
}
