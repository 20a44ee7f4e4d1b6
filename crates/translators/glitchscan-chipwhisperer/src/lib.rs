//! ChipWhisperer voltage glitch parameters.
//!
//! ChipWhisperer's glitch module does not take times. It takes a number of
//! glitch clock cycles after the trigger (`ext_offset`), a position inside a
//! cycle (`offset`, percent), a pulse width (`width`, percent of a cycle) and a
//! number of consecutive pulses (`repeat`). This crate provides a
//! [`VccGlitchTranslator`] that lets campaigns be written in microseconds and
//! nanoseconds instead.
//!
//! Implements the [`glitchscan_core::translator::UnitTranslator`] trait.

#![warn(missing_docs)]

mod config;
mod vcc;

pub use config::{ChipWhispererConfig, Error};
pub use vcc::VccGlitchTranslator;
