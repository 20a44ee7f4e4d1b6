//! # glitchscan
//!
//! Adaptive parameter search for voltage and clock glitching.
//!
//! This crate re-exports [`glitchscan_core`] and, behind features, the bundled
//! backends:
//!
//! - `sim` - [`glitchscan_sim`], a simulated target for dry runs and tests
//! - `chipwhisperer` - [`glitchscan_chipwhisperer`], ChipWhisperer VCC glitch
//!   register encoding

pub use glitchscan_core::*;

#[cfg(feature = "chipwhisperer")]
pub use glitchscan_chipwhisperer;
#[cfg(feature = "sim")]
pub use glitchscan_sim;
