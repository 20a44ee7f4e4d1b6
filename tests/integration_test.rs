use glitchscan::classifier::{Diagnostic, MarkerClassifier, OutcomeClass, RawSignal};
use glitchscan::executor::ExecutorError;
use glitchscan::space::{Dimension, ParameterSpace, Unit};
use glitchscan::strategy::{AdaptiveBisection, Chain, HillClimb, Raster};
use glitchscan::translator::{EncodedPoint, IdentityTranslator, Register, UnitTranslator};
use glitchscan::util::CancelToken;
use glitchscan::{AbortReason, SearchConfig, Session, SessionStatus};
use glitchscan_chipwhisperer::{ChipWhispererConfig, VccGlitchTranslator};
use glitchscan_sim::{ResponseRegion, SimulatedTarget};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

const ACK: u8 = 0x79;
const NACK: u8 = 0x1f;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn bootloader() -> MarkerClassifier {
    MarkerClassifier::new()
        .success_marker([ACK])
        .no_effect_marker([NACK])
}

fn offset_space(resolution: f64) -> anyhow::Result<ParameterSpace> {
    Ok(ParameterSpace::new(vec![Dimension::new(
        "offset_us",
        Unit::Microseconds,
        10.0,
        60.0,
        resolution,
    )?])?)
}

fn budget(budget: u64) -> SearchConfig {
    SearchConfig {
        budget,
        ..Default::default()
    }
}

fn nack(_: &EncodedPoint, _: Duration) -> Result<RawSignal, ExecutorError> {
    Ok(RawSignal::Response(vec![NACK]))
}

#[test]
fn test_raster_covers_line() -> anyhow::Result<()> {
    init_logging();
    let report = Session::builder()
        .space(offset_space(5.0)?)
        .strategy(Raster)
        .executor(nack)
        .classifier(bootloader())
        .config(budget(11))
        .build()?
        .run()?;
    assert_eq!(report.status, SessionStatus::Completed);
    assert_eq!(report.abort_reason, None);
    let offsets: Vec<f64> = report
        .store
        .trials()
        .iter()
        .filter_map(|t| t.point.get("offset_us"))
        .collect();
    let expected: Vec<f64> = (0..11).map(|i| 10.0 + 5.0 * f64::from(i)).collect();
    assert_eq!(offsets, expected);
    assert_eq!(report.store.count(OutcomeClass::NoEffect), 11);
    Ok(())
}

#[test]
fn test_budget_bounds_trials() -> anyhow::Result<()> {
    init_logging();
    let report = Session::builder()
        .space(offset_space(1.0)?)
        .strategy(Raster)
        .executor(nack)
        .classifier(bootloader())
        .config(budget(7))
        .build()?
        .run()?;
    assert_eq!(report.status, SessionStatus::Completed);
    assert_eq!(report.trials_executed, 7);
    assert_eq!(report.store.len(), 7);
    Ok(())
}

#[test]
fn test_bisection_locates_threshold() -> anyhow::Result<()> {
    init_logging();
    let space = offset_space(1.0)?;
    let target = SimulatedTarget::threshold(
        space.clone(),
        Arc::new(IdentityTranslator),
        "offset_us",
        37.5,
        RawSignal::Response(vec![NACK]),
        RawSignal::Response(vec![ACK]),
    );
    let report = Session::builder()
        .space(space)
        .strategy(AdaptiveBisection::default())
        .executor(target)
        .classifier(bootloader())
        .config(budget(100))
        .build()?
        .run()?;
    assert_eq!(report.status, SessionStatus::Completed);
    // ceil(log2(50)) + 3
    assert!(report.store.len() <= 9, "{} trials", report.store.len());
    assert_eq!(report.store.dominant_class(&[27]), Some(OutcomeClass::NoEffect));
    assert_eq!(report.store.dominant_class(&[28]), Some(OutcomeClass::Success));
    Ok(())
}

#[test]
fn test_seeded_runs_are_identical() -> anyhow::Result<()> {
    init_logging();
    let run = || -> anyhow::Result<Vec<(Vec<f64>, OutcomeClass, u32)>> {
        let space = ParameterSpace::new(vec![
            Dimension::new("offset", Unit::Microseconds, 0.0, 20.0, 1.0)?,
            Dimension::new("width", Unit::Nanoseconds, 0.0, 40.0, 5.0)?,
        ])?;
        let target = SimulatedTarget::new(
            space.clone(),
            Arc::new(IdentityTranslator),
            RawSignal::Response(vec![NACK]),
        )
        .with_region(
            ResponseRegion::new(RawSignal::Response(vec![ACK]))
                .bound("offset", 11.5, 14.5)
                .bound("width", 14.0, 26.0),
        )
        .with_transient_rate(0.2, 7);
        let strategy = Chain::new()
            .then(AdaptiveBisection::new(2))
            .then(HillClimb::new(2));
        let report = Session::builder()
            .space(space)
            .strategy(strategy)
            .executor(target)
            .classifier(bootloader())
            .config(budget(80))
            .build()?
            .run()?;
        Ok(report
            .store
            .trials()
            .iter()
            .map(|t| (t.point.values().collect(), t.outcome.class, t.retries))
            .collect())
    };
    let first = run()?;
    assert!(!first.is_empty());
    assert_eq!(first, run()?);
    Ok(())
}

#[test]
fn test_cancel_keeps_recorded_trials() -> anyhow::Result<()> {
    init_logging();
    let cancel = CancelToken::new();
    let token = cancel.clone();
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let executor = move |_: &EncodedPoint, _: Duration| -> Result<RawSignal, ExecutorError> {
        if counter.fetch_add(1, Ordering::Relaxed) == 4 {
            token.cancel();
        }
        Ok(RawSignal::Response(vec![NACK]))
    };
    let report = Session::builder()
        .space(offset_space(1.0)?)
        .strategy(Raster)
        .executor(executor)
        .classifier(bootloader())
        .cancel_token(cancel)
        .build()?
        .run()?;
    assert_eq!(report.status, SessionStatus::Aborted);
    assert_eq!(report.abort_reason, Some(AbortReason::Cancelled));
    // the trial running while cancelling is still recorded
    assert_eq!(calls.load(Ordering::Relaxed), 5);
    assert_eq!(report.store.len(), 5);
    assert!(report.store.is_frozen());
    Ok(())
}

#[test]
fn test_retry_recovers() -> anyhow::Result<()> {
    init_logging();
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let executor = move |_: &EncodedPoint, _: Duration| -> Result<RawSignal, ExecutorError> {
        if counter.fetch_add(1, Ordering::Relaxed) < 2 {
            Err(ExecutorError::Transient("sync lost".into()))
        } else {
            Ok(RawSignal::Response(vec![ACK]))
        }
    };
    let report = Session::builder()
        .space(offset_space(5.0)?)
        .strategy(Raster)
        .executor(executor)
        .classifier(bootloader())
        .config(budget(1))
        .build()?
        .run()?;
    assert_eq!(calls.load(Ordering::Relaxed), 3);
    let trial = &report.store.trials()[0];
    assert_eq!(trial.outcome.class, OutcomeClass::Success);
    assert_eq!(trial.retries, 2);
    assert!(!trial.outcome.is_flagged());
    Ok(())
}

#[test]
fn test_exhausted_retries_are_flagged() -> anyhow::Result<()> {
    init_logging();
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let executor = move |_: &EncodedPoint, _: Duration| -> Result<RawSignal, ExecutorError> {
        counter.fetch_add(1, Ordering::Relaxed);
        Err(ExecutorError::Transient("target did not answer".into()))
    };
    let report = Session::builder()
        .space(offset_space(5.0)?)
        .strategy(Raster)
        .executor(executor)
        .classifier(bootloader())
        .config(budget(1))
        .build()?
        .run()?;
    assert_eq!(report.status, SessionStatus::Completed);
    assert_eq!(calls.load(Ordering::Relaxed), 3);
    assert_eq!(report.store.len(), 1);
    let trial = &report.store.trials()[0];
    assert_eq!(trial.outcome.class, OutcomeClass::Mute);
    assert!(trial.outcome.is_flagged());
    assert!(matches!(
        trial.outcome.diagnostic,
        Some(Diagnostic::RetriesExhausted { attempts: 3, .. })
    ));
    assert!(report.store.export().rows[0].flagged);
    Ok(())
}

#[test]
fn test_ambiguous_responses_are_counted() -> anyhow::Result<()> {
    init_logging();
    let space = offset_space(5.0)?;
    let target = SimulatedTarget::new(
        space.clone(),
        Arc::new(IdentityTranslator),
        RawSignal::Response(vec![NACK]),
    )
    .with_region(
        ResponseRegion::new(RawSignal::Response(vec![ACK, NACK])).bound("offset_us", 19.0, 31.0),
    );
    let report = Session::builder()
        .space(space)
        .strategy(Raster)
        .executor(target)
        .classifier(bootloader())
        .build()?
        .run()?;
    assert_eq!(report.store.len(), 11);
    assert_eq!(report.store.count(OutcomeClass::Ambiguous), 3);
    assert_eq!(report.store.count(OutcomeClass::NoEffect), 8);
    Ok(())
}

#[test]
fn test_chipwhisperer_simulation() -> anyhow::Result<()> {
    init_logging();
    let space = ParameterSpace::new(vec![
        Dimension::new("offset", Unit::Microseconds, 1.0, 3.0, 0.05)?,
        Dimension::new("width", Unit::Nanoseconds, 0.0, 200.0, 25.0)?,
    ])?;
    let config = ChipWhispererConfig {
        clkgen_freq: 24e6,
        ext_only: false,
        offset_dimension: "offset".into(),
        width_dimension: Some("width".into()),
    };
    let translator: Arc<dyn UnitTranslator + Send + Sync> =
        Arc::new(VccGlitchTranslator::new(&space, &config)?);
    let target = SimulatedTarget::new(
        space.clone(),
        Arc::clone(&translator),
        RawSignal::Response(vec![NACK]),
    )
    .with_region(
        ResponseRegion::new(RawSignal::Response(vec![ACK]))
            .bound("offset", 1.99, 2.51)
            .bound("width", 49.0, 101.0),
    );
    let executions = target.executions();
    let strategy = Chain::new()
        .then(AdaptiveBisection::new(4))
        .then(HillClimb::new(2));
    let report = Session::builder()
        .space(space)
        .strategy(strategy)
        .shared_translator(translator)
        .executor(target)
        .classifier(bootloader())
        .config(budget(400))
        .build()?
        .run()?;
    assert_eq!(report.status, SessionStatus::Completed);
    assert_eq!(executions.load(Ordering::Relaxed), report.store.len() as u64);
    assert!(report.store.count(OutcomeClass::Success) > 0);
    for trial in report.store.by_class(OutcomeClass::Success) {
        let offset = trial.point.get("offset").unwrap_or_default();
        let width = trial.point.get("width").unwrap_or_default();
        assert!((1.99..=2.51).contains(&offset), "offset {}", offset);
        assert!((49.0..=101.0).contains(&width), "width {}", width);
        assert!(matches!(trial.encoded.get("ext_offset"), Some(Register::Int(_))));
        assert!(matches!(trial.encoded.get("repeat"), Some(Register::Int(_))));
    }
    Ok(())
}

#[test]
fn test_background_session() -> anyhow::Result<()> {
    init_logging();
    let executor = |_: &EncodedPoint, _: Duration| -> Result<RawSignal, ExecutorError> {
        std::thread::sleep(Duration::from_millis(1));
        Ok(RawSignal::Response(vec![NACK]))
    };
    let mut session = Session::builder()
        .space(offset_space(1.0)?)
        .strategy(Raster)
        .executor(executor)
        .classifier(bootloader())
        .build()?;
    let handle = session.handle();
    session.start()?;
    let partial = handle.snapshot();
    assert!(partial.is_frozen());
    assert!(partial.len() <= 51);
    let report = session.join()?;
    assert_eq!(report.status, SessionStatus::Completed);
    assert_eq!(handle.status(), SessionStatus::Completed);
    assert_eq!(handle.snapshot().len(), 51);
    assert_eq!(report.store.len(), 51);
    Ok(())
}
