//! # glitchscan
//!
//! glitchscan searches the voltage glitch parameter space of an embedded target
//! adaptively instead of exhaustively. This crate holds the command line tools.
//!
//! ## Quickstart guide
//!
//! ```sh
//! cargo build --release
//! cargo run --release --bin=simulate -- --config config/campaign.json --output results.json
//! ```
//!
//! `simulate` runs the campaign from `config/campaign.json` against a simulated
//! target whose glitches succeed above a threshold on one dimension, and writes
//! the exported result table as JSON. Pass `--cw-config` with a ChipWhisperer
//! configuration to route every trial through the ChipWhisperer register
//! encoding. Use `--help` to see all options.
//!
//! ## Logging
//!
//! Log output goes through `env_logger` and defaults to `info`. Set `RUST_LOG`
//! to change the filter. Progress bars and log lines share the terminal
//! through `indicatif-log-bridge`.

use indicatif::MultiProgress;
use indicatif_log_bridge::LogWrapper;

/// Installs the global logger and returns the progress bar container it writes around.
pub fn init_logging_with_progress() -> anyhow::Result<MultiProgress> {
    let logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).build();
    let progress = MultiProgress::new();
    LogWrapper::new(progress.clone(), logger).try_init()?;
    Ok(progress)
}
