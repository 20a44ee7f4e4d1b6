//! Utility types used throughout glitchscan.
//!
//! - [`CancelToken`] - cooperative cancellation shared between threads
//! - [`NamedProgress`] - labelled progress bar styles
//! - [`Rng`] - seedable random number generation

mod cancel;
mod named_progress;
mod rng;

pub use self::cancel::CancelToken;
pub use self::named_progress::NamedProgress;
pub use self::rng::Rng;
