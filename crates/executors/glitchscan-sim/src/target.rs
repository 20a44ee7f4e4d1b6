use glitchscan_core::classifier::RawSignal;
use glitchscan_core::executor::{ExecutorError, TrialExecutor};
use glitchscan_core::space::{ParameterPoint, ParameterSpace};
use glitchscan_core::translator::{EncodedPoint, UnitTranslator};
use glitchscan_core::util::Rng;
use log::debug;
use rand::Rng as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// A box in human units and the signal the target produces inside it.
#[derive(Clone, Debug, PartialEq)]
pub struct ResponseRegion {
    bounds: Vec<(String, f64, f64)>,
    response: RawSignal,
}

impl ResponseRegion {
    /// A region answering `response`. Without bounds it covers the whole space.
    pub fn new(response: RawSignal) -> Self {
        ResponseRegion {
            bounds: vec![],
            response,
        }
    }

    /// Restricts the region to `lo <= value <= hi` on the named dimension.
    pub fn bound(mut self, dimension: impl Into<String>, lo: f64, hi: f64) -> Self {
        self.bounds.push((dimension.into(), lo, hi));
        self
    }

    fn contains(&self, point: &ParameterPoint) -> bool {
        self.bounds.iter().all(|(name, lo, hi)| {
            point
                .get(name)
                .is_some_and(|value| *lo <= value && value <= *hi)
        })
    }
}

/// Trial executor backed by a static response map.
///
/// The first region containing the decoded point answers; points outside all
/// regions get the default response. With a transient rate set, that fraction
/// of executions fails with [`ExecutorError::Transient`], drawn from a seeded
/// generator so runs are reproducible.
pub struct SimulatedTarget {
    space: ParameterSpace,
    translator: Arc<dyn UnitTranslator + Send + Sync>,
    regions: Vec<ResponseRegion>,
    default_response: RawSignal,
    transient_rate: f64,
    rng: Rng,
    executions: Arc<AtomicU64>,
}

impl SimulatedTarget {
    /// Creates a target answering `default_response` everywhere.
    pub fn new(
        space: ParameterSpace,
        translator: Arc<dyn UnitTranslator + Send + Sync>,
        default_response: RawSignal,
    ) -> Self {
        SimulatedTarget {
            space,
            translator,
            regions: vec![],
            default_response,
            transient_rate: 0.0,
            rng: Rng::from_seed(0),
            executions: Arc::new(AtomicU64::new(0)),
        }
    }

    /// A target that answers `above` where `dimension >= threshold` and `below`
    /// everywhere else.
    pub fn threshold(
        space: ParameterSpace,
        translator: Arc<dyn UnitTranslator + Send + Sync>,
        dimension: &str,
        threshold: f64,
        below: RawSignal,
        above: RawSignal,
    ) -> Self {
        SimulatedTarget::new(space, translator, below)
            .with_region(ResponseRegion::new(above).bound(dimension, threshold, f64::INFINITY))
    }

    /// Adds a response region. Earlier regions take precedence.
    pub fn with_region(mut self, region: ResponseRegion) -> Self {
        self.regions.push(region);
        self
    }

    /// Lets a fraction of executions fail transiently. `rate` is clamped to `[0, 1]`.
    pub fn with_transient_rate(mut self, rate: f64, seed: u64) -> Self {
        self.transient_rate = if rate.is_nan() { 0.0 } else { rate.clamp(0.0, 1.0) };
        self.rng = Rng::from_seed(seed);
        self
    }

    /// Counter of executor calls. Stays valid after the target moved into a session.
    pub fn executions(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.executions)
    }

    fn respond(&self, point: &ParameterPoint) -> RawSignal {
        self.regions
            .iter()
            .find(|region| region.contains(point))
            .map_or_else(|| self.default_response.clone(), |r| r.response.clone())
    }
}

impl TrialExecutor for SimulatedTarget {
    fn execute(
        &mut self,
        encoded: &EncodedPoint,
        _timeout: Duration,
    ) -> Result<RawSignal, ExecutorError> {
        self.executions.fetch_add(1, Ordering::Relaxed);
        if self.transient_rate > 0.0 && self.rng.random_bool(self.transient_rate) {
            debug!("Simulated sync loss at {}", encoded);
            return Err(ExecutorError::Transient("simulated sync loss".into()));
        }
        let point = self
            .translator
            .untranslate(&self.space, encoded)
            .map_err(|e| ExecutorError::DeviceFault(format!("cannot decode registers: {}", e)))?;
        let response = self.respond(&point);
        debug!("Simulated trial at {}: {:?}", point, response);
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glitchscan_core::space::{Dimension, Unit};
    use glitchscan_core::translator::{IdentityTranslator, Register};

    const TIMEOUT: Duration = Duration::from_secs(1);

    fn space() -> ParameterSpace {
        ParameterSpace::new(vec![
            Dimension::new("offset", Unit::Microseconds, 10.0, 60.0, 1.0).unwrap(),
            Dimension::new("width", Unit::Nanoseconds, 0.0, 20.0, 1.0).unwrap(),
        ])
        .unwrap()
    }

    fn encode(target: &SimulatedTarget, offset: f64, width: f64) -> EncodedPoint {
        let point = target.space.point(&[offset, width]).unwrap();
        target.translator.translate(&target.space, &point).unwrap()
    }

    #[test]
    fn test_threshold_target() {
        let mut target = SimulatedTarget::threshold(
            space(),
            Arc::new(IdentityTranslator),
            "offset",
            37.5,
            RawSignal::Response(vec![0x1f]),
            RawSignal::Response(vec![0x79]),
        );
        let below = encode(&target, 37.0, 5.0);
        let above = encode(&target, 38.0, 5.0);
        assert_eq!(
            target.execute(&below, TIMEOUT),
            Ok(RawSignal::Response(vec![0x1f]))
        );
        assert_eq!(
            target.execute(&above, TIMEOUT),
            Ok(RawSignal::Response(vec![0x79]))
        );
        assert_eq!(target.executions().load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_first_region_wins() {
        let mut target =
            SimulatedTarget::new(space(), Arc::new(IdentityTranslator), RawSignal::Silent)
                .with_region(
                    ResponseRegion::new(RawSignal::CommError("brown-out".into()))
                        .bound("offset", 20.0, 30.0)
                        .bound("width", 10.0, 20.0),
                )
                .with_region(
                    ResponseRegion::new(RawSignal::Response(vec![0x79]))
                        .bound("offset", 25.0, 40.0),
                );
        let both = encode(&target, 25.0, 15.0);
        let second = encode(&target, 25.0, 5.0);
        let neither = encode(&target, 50.0, 5.0);
        assert_eq!(
            target.execute(&both, TIMEOUT),
            Ok(RawSignal::CommError("brown-out".into()))
        );
        assert_eq!(
            target.execute(&second, TIMEOUT),
            Ok(RawSignal::Response(vec![0x79]))
        );
        assert_eq!(target.execute(&neither, TIMEOUT), Ok(RawSignal::Silent));
    }

    #[test]
    fn test_transient_errors_are_seeded() {
        let run = |seed| {
            let mut target =
                SimulatedTarget::new(space(), Arc::new(IdentityTranslator), RawSignal::Silent)
                    .with_transient_rate(0.5, seed);
            let encoded = encode(&target, 10.0, 0.0);
            (0..64)
                .map(|_| target.execute(&encoded, TIMEOUT).is_err())
                .collect::<Vec<_>>()
        };
        let a = run(7);
        assert_eq!(a, run(7));
        assert!(a.iter().any(|failed| *failed));
        assert!(a.iter().any(|failed| !*failed));
    }

    #[test]
    fn test_undecodable_registers_fault() {
        let mut target =
            SimulatedTarget::new(space(), Arc::new(IdentityTranslator), RawSignal::Silent);
        let encoded = EncodedPoint::new().with("offset", Register::Float(12.0));
        assert!(matches!(
            target.execute(&encoded, TIMEOUT),
            Err(ExecutorError::DeviceFault(_))
        ));
    }
}
