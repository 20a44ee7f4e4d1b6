use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufWriter, Write},
    sync::Arc,
};

use anyhow::Result;
use clap::Parser;
use glitchscan_bin::init_logging_with_progress;
use glitchscan_chipwhisperer::{ChipWhispererConfig, VccGlitchTranslator};
use glitchscan_core::classifier::{MarkerClassifier, OutcomeClass, RawSignal};
use glitchscan_core::store::ExportTable;
use glitchscan_core::translator::{IdentityTranslator, UnitTranslator};
use glitchscan_core::util::CancelToken;
use glitchscan_core::{AbortReason, CampaignConfig, Session, SessionStatus};
use indicatif::MultiProgress;
use glitchscan_sim::{ResponseRegion, SimulatedTarget};
use log::{info, warn};
use serde::Serialize;

/// Bootloader acknowledge, the glitch got through.
const ACK: u8 = 0x79;
/// Bootloader reject, the protection held.
const NACK: u8 = 0x1f;

/// CLI arguments for the `simulate` binary.
#[derive(Debug, Parser, Serialize, Clone)]
struct CliArgs {
    /// The campaign config file.
    #[clap(long = "config", default_value = "config/campaign.json")]
    config: String,
    /// ChipWhisperer config file. Without it, parameters are passed in human units.
    #[clap(long = "cw-config")]
    cw_config: Option<String>,
    /// Dimension on which the simulated target is vulnerable.
    #[clap(long = "threshold-dimension", default_value = "offset")]
    threshold_dimension: String,
    /// Glitches at or above this value succeed.
    #[clap(long = "threshold", default_value = "37.5")]
    threshold: f64,
    /// The target goes silent at or above this value.
    #[clap(long = "mute-from")]
    mute_from: Option<f64>,
    /// Fraction of trials failing with a transient error.
    #[clap(long = "transient-rate", default_value = "0.0")]
    transient_rate: f64,
    /// Seed for simulated transient errors.
    #[clap(long = "seed", default_value = "0")]
    seed: u64,
    /// Output file for results (JSON format).
    #[clap(long = "output")]
    output: Option<String>,
}

#[derive(Debug, Serialize)]
struct SimulationResults {
    args: CliArgs,
    status: SessionStatus,
    abort_reason: Option<AbortReason>,
    trials_executed: u64,
    duration_ms: u64,
    classes: BTreeMap<OutcomeClass, usize>,
    trials: ExportTable,
}

impl SimulationResults {
    fn save_to_file(&self, filename: &str) -> Result<()> {
        let file = File::create(filename)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        info!("Results saved to {}", filename);
        Ok(())
    }
}

fn main() -> Result<()> {
    let progress = init_logging_with_progress()?;
    let args = CliArgs::parse();

    let cancel = CancelToken::new();
    let token = cancel.clone();
    ctrlc::set_handler(move || {
        warn!("Interrupted. Stopping after the current trial.");
        token.cancel();
    })?;

    let results = simulate(&args, cancel, Some(progress))?;
    match &args.output {
        Some(output) => results.save_to_file(output)?,
        None => println!("{}", serde_json::to_string_pretty(&results.classes)?),
    }
    Ok(())
}

/// Runs the campaign until it ends or `cancel` fires. Interrupted runs still
/// return every trial recorded so far.
fn simulate(
    args: &CliArgs,
    cancel: CancelToken,
    progress: Option<MultiProgress>,
) -> Result<SimulationResults> {
    let campaign = CampaignConfig::from_jsonfile(&args.config)?;
    let space = campaign.space()?;
    let translator: Arc<dyn UnitTranslator + Send + Sync> = match &args.cw_config {
        Some(path) => {
            let cw_config = ChipWhispererConfig::from_jsonfile(path)?;
            info!("Using ChipWhisperer encoding at {} Hz", cw_config.clkgen_freq);
            Arc::new(VccGlitchTranslator::new(&space, &cw_config)?)
        }
        None => Arc::new(IdentityTranslator),
    };

    let mut target = SimulatedTarget::new(
        space.clone(),
        Arc::clone(&translator),
        RawSignal::Response(vec![NACK]),
    );
    if let Some(mute_from) = args.mute_from {
        target = target.with_region(
            ResponseRegion::new(RawSignal::Silent).bound(
                &args.threshold_dimension,
                mute_from,
                f64::INFINITY,
            ),
        );
    }
    let target = target
        .with_region(
            ResponseRegion::new(RawSignal::Response(vec![ACK])).bound(
                &args.threshold_dimension,
                args.threshold,
                f64::INFINITY,
            ),
        )
        .with_transient_rate(args.transient_rate, args.seed);

    let classifier = MarkerClassifier::new()
        .success_marker([ACK])
        .no_effect_marker([NACK]);

    info!(
        "Simulating campaign {} over {} dimension(s)",
        args.config,
        space.len()
    );
    let mut builder = Session::builder()
        .space(space)
        .strategy(campaign.strategy.build())
        .shared_translator(translator)
        .executor(target)
        .classifier(classifier)
        .config(campaign.search_config())
        .cancel_token(cancel);
    if let Some(progress) = progress {
        builder = builder.progress(progress);
    }
    let report = builder.build()?.run()?;

    if let Some(reason) = &report.abort_reason {
        warn!("Session aborted: {}", reason);
    }
    for trial in report.store.by_class(OutcomeClass::Success) {
        info!("Success at {} ({})", trial.point, trial.encoded);
    }

    Ok(SimulationResults {
        args: args.clone(),
        status: report.status,
        abort_reason: report.abort_reason.clone(),
        trials_executed: report.trials_executed,
        duration_ms: report.elapsed.as_millis() as u64,
        classes: report.store.class_counts(),
        trials: report.store.export(),
    })
}
