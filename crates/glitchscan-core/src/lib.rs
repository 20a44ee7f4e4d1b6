//! # glitchscan core
//!
//! `glitchscan-core` is the search-and-classification engine of glitchscan. It
//! decides which voltage or clock glitch parameters to try next on an embedded
//! target, classifies what each trial did and keeps a queryable map of all
//! outcomes. It never talks to hardware itself.
//!
//! ## Architecture Overview
//!
//! Four traits separate the engine from the lab bench:
//!
//! - [`translator::UnitTranslator`] - Converts points in human units (microseconds,
//!   nanoseconds, ...) into the registers a glitch device wants, and back.
//!
//! - [`executor::TrialExecutor`] - Performs one physical trial with encoded
//!   parameters and reports the raw signal the target produced.
//!
//! - [`classifier::Classifier`] - Maps a raw signal onto SUCCESS, NO_EFFECT, MUTE,
//!   RESET or AMBIGUOUS.
//!
//! - [`strategy::SearchStrategy`] - Proposes the next points given the parameter
//!   space and everything recorded so far.
//!
//! ## Main Components
//!
//! - [`Session`] - The controller that drives a strategy against an executor
//!   until the strategy is done, the budget is exhausted, the device faults or
//!   the session is cancelled.
//!
//! - [`space`] module - [`space::ParameterSpace`] and its grid model.
//!
//! - [`store`] module - The append-only [`store::ResultStore`] with class and
//!   spatial indexes and a flat export.
//!
//! - [`CampaignConfig`] - JSON campaign descriptions.

#![warn(missing_docs)]

pub mod classifier;
mod config;
pub mod executor;
mod session;
pub mod space;
pub mod store;
pub mod strategy;
pub mod translator;
pub mod util;

pub use config::{CampaignConfig, ConfigError, SearchSettings, StrategyConfig};
pub use session::{
    AbortReason, BuildError, SearchConfig, Session, SessionBuilder, SessionError, SessionHandle,
    SessionReport, SessionStatus,
};
