//! Simulated glitch target.
//!
//! This crate provides a [`SimulatedTarget`] that answers trials from a static
//! map of response regions instead of real hardware. It decodes the registers it
//! receives with the same translator the session uses, so the whole pipeline
//! from strategy to result store runs unchanged.
//!
//! Implements the [`glitchscan_core::executor::TrialExecutor`] trait.
//!
//! # Use Cases
//!
//! - Integration testing of search strategies and session control
//! - Dry runs of campaign configurations before going to the bench

#![warn(missing_docs)]

mod target;

pub use target::{ResponseRegion, SimulatedTarget};
