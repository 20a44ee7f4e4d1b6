//! Trial outcome classification.
//!
//! Every trial produces a [`RawSignal`] which a [`Classifier`] maps onto exactly
//! one [`OutcomeClass`]. Classification is total: signals that match no known
//! pattern become [`OutcomeClass::Ambiguous`] instead of failing, so a session
//! survives imperfect target telemetry.
//!
//! How silence and link errors map onto MUTE and RESET is target specific. The
//! engine never hard-codes it; [`MarkerClassifier`] only provides overridable
//! defaults.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;

/// The closed set of trial outcome classes.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeClass {
    /// The target behaved the way the attack wants it to
    Success,
    /// The glitch had no noticeable effect
    NoEffect,
    /// The target stopped responding
    Mute,
    /// The target reset or the link to it broke down
    Reset,
    /// The response matched no known pattern; kept for manual review
    Ambiguous,
}

impl OutcomeClass {
    /// All classes in declaration order.
    pub const ALL: [OutcomeClass; 5] = [
        OutcomeClass::Success,
        OutcomeClass::NoEffect,
        OutcomeClass::Mute,
        OutcomeClass::Reset,
        OutcomeClass::Ambiguous,
    ];

    /// Whether the glitch visibly disturbed the target.
    pub fn is_effect(self) -> bool {
        self != OutcomeClass::NoEffect
    }
}

impl fmt::Display for OutcomeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OutcomeClass::Success => "SUCCESS",
            OutcomeClass::NoEffect => "NO_EFFECT",
            OutcomeClass::Mute => "MUTE",
            OutcomeClass::Reset => "RESET",
            OutcomeClass::Ambiguous => "AMBIGUOUS",
        };
        write!(f, "{}", label)
    }
}

/// Diagnostic flag attached by the controller, never by a classifier.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Diagnostic {
    /// Every execution attempt failed with a recoverable error.
    RetriesExhausted {
        /// Number of executor calls made for this trial
        attempts: u32,
        /// The last error reported by the executor
        last_error: String,
    },
}

/// Classified result of one trial.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Outcome {
    /// Outcome class
    pub class: OutcomeClass,
    /// Free-form diagnostics (response length, timing, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    /// Set when the outcome was not produced by the classifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<Diagnostic>,
}

impl Outcome {
    /// Creates an outcome without payload.
    pub fn new(class: OutcomeClass) -> Self {
        Outcome {
            class,
            payload: None,
            diagnostic: None,
        }
    }

    /// Attaches a payload.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// MUTE outcome recorded after the executor failed on every retry.
    pub fn retries_exhausted(attempts: u32, last_error: impl Into<String>) -> Self {
        Outcome {
            class: OutcomeClass::Mute,
            payload: None,
            diagnostic: Some(Diagnostic::RetriesExhausted {
                attempts,
                last_error: last_error.into(),
            }),
        }
    }

    /// Whether a diagnostic flag is set.
    pub fn is_flagged(&self) -> bool {
        self.diagnostic.is_some()
    }
}

/// What a trial executor observed on the target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RawSignal {
    /// Nothing came back before the trial window closed
    Silent,
    /// Communication with the target broke down during the trial
    CommError(String),
    /// Bytes received from the target
    Response(Vec<u8>),
}

/// Trait for mapping raw signals onto outcome classes.
///
/// Implementations must be total and deterministic: identical signals always
/// produce identical outcomes and no signal causes a panic. Any
/// `Fn(&RawSignal) -> Outcome` is a classifier.
pub trait Classifier {
    /// Classifies one raw signal.
    fn classify(&self, signal: &RawSignal) -> Outcome;
}

impl<F> Classifier for F
where
    F: Fn(&RawSignal) -> Outcome,
{
    fn classify(&self, signal: &RawSignal) -> Outcome {
        self(signal)
    }
}

/// Classifier matching response bytes against known markers.
///
/// * Response containing a success marker: SUCCESS
/// * Response containing a no-effect marker: NO_EFFECT
/// * Both, or neither: AMBIGUOUS
/// * No response or an empty response: configurable, MUTE by default
/// * Communication error: configurable, RESET by default
#[derive(Clone, Debug)]
pub struct MarkerClassifier {
    success_markers: Vec<Vec<u8>>,
    no_effect_markers: Vec<Vec<u8>>,
    on_silence: OutcomeClass,
    on_comm_error: OutcomeClass,
}

impl Default for MarkerClassifier {
    fn default() -> Self {
        MarkerClassifier {
            success_markers: vec![],
            no_effect_markers: vec![],
            on_silence: OutcomeClass::Mute,
            on_comm_error: OutcomeClass::Reset,
        }
    }
}

impl MarkerClassifier {
    /// Creates a classifier without markers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a byte sequence whose presence means SUCCESS. Empty markers are ignored.
    pub fn success_marker(mut self, marker: impl Into<Vec<u8>>) -> Self {
        let marker = marker.into();
        if !marker.is_empty() {
            self.success_markers.push(marker);
        }
        self
    }

    /// Adds a byte sequence whose presence means NO_EFFECT. Empty markers are ignored.
    pub fn no_effect_marker(mut self, marker: impl Into<Vec<u8>>) -> Self {
        let marker = marker.into();
        if !marker.is_empty() {
            self.no_effect_markers.push(marker);
        }
        self
    }

    /// Class used when the target stays silent.
    pub fn on_silence(mut self, class: OutcomeClass) -> Self {
        self.on_silence = class;
        self
    }

    /// Class used when the link to the target fails during a trial.
    pub fn on_comm_error(mut self, class: OutcomeClass) -> Self {
        self.on_comm_error = class;
        self
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

impl Classifier for MarkerClassifier {
    fn classify(&self, signal: &RawSignal) -> Outcome {
        match signal {
            RawSignal::Silent => Outcome::new(self.on_silence),
            RawSignal::CommError(err) => {
                Outcome::new(self.on_comm_error).with_payload(json!({ "error": err }))
            }
            RawSignal::Response(bytes) if bytes.is_empty() => {
                Outcome::new(self.on_silence).with_payload(json!({ "len": 0 }))
            }
            RawSignal::Response(bytes) => {
                let success = self.success_markers.iter().any(|m| contains(bytes, m));
                let no_effect = self.no_effect_markers.iter().any(|m| contains(bytes, m));
                let class = match (success, no_effect) {
                    (true, false) => OutcomeClass::Success,
                    (false, true) => OutcomeClass::NoEffect,
                    _ => OutcomeClass::Ambiguous,
                };
                Outcome::new(class).with_payload(json!({ "len": bytes.len() }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACK: u8 = 0x79;
    const NACK: u8 = 0x1f;

    fn bootloader() -> MarkerClassifier {
        MarkerClassifier::new()
            .success_marker([ACK])
            .no_effect_marker([NACK])
    }

    #[test]
    fn test_marker_classes() {
        let classifier = bootloader();
        let class = |s: RawSignal| classifier.classify(&s).class;
        assert_eq!(class(RawSignal::Response(vec![ACK])), OutcomeClass::Success);
        assert_eq!(class(RawSignal::Response(vec![NACK])), OutcomeClass::NoEffect);
        assert_eq!(class(RawSignal::Response(vec![])), OutcomeClass::Mute);
        assert_eq!(class(RawSignal::Silent), OutcomeClass::Mute);
        assert_eq!(
            class(RawSignal::CommError("framing error".into())),
            OutcomeClass::Reset
        );
    }

    #[test]
    fn test_unknown_response_is_ambiguous() {
        let classifier = bootloader();
        for bytes in [vec![0x00], vec![0xff, 0xfe], vec![ACK, NACK]] {
            let outcome = classifier.classify(&RawSignal::Response(bytes.clone()));
            assert_eq!(outcome.class, OutcomeClass::Ambiguous, "{:?}", bytes);
            assert!(!outcome.is_flagged());
        }
    }

    #[test]
    fn test_classification_is_deterministic() {
        let classifier = bootloader();
        let signal = RawSignal::Response(vec![0x42, ACK, 0x00]);
        assert_eq!(classifier.classify(&signal), classifier.classify(&signal));
        assert_eq!(
            classifier.classify(&signal).payload,
            Some(json!({ "len": 3 }))
        );
    }

    #[test]
    fn test_overridden_defaults() {
        let classifier = bootloader()
            .on_silence(OutcomeClass::Reset)
            .on_comm_error(OutcomeClass::Mute);
        assert_eq!(classifier.classify(&RawSignal::Silent).class, OutcomeClass::Reset);
        assert_eq!(
            classifier
                .classify(&RawSignal::CommError("usb stall".into()))
                .class,
            OutcomeClass::Mute
        );
    }

    #[test]
    fn test_empty_marker_ignored() {
        let classifier = MarkerClassifier::new().success_marker(Vec::new());
        assert_eq!(
            classifier.classify(&RawSignal::Response(vec![1])).class,
            OutcomeClass::Ambiguous
        );
    }

    #[test]
    fn test_closure_classifier() {
        let classifier = |signal: &RawSignal| match signal {
            RawSignal::Response(b) if b.starts_with(b"OK") => Outcome::new(OutcomeClass::NoEffect),
            _ => Outcome::new(OutcomeClass::Ambiguous),
        };
        assert_eq!(
            classifier.classify(&RawSignal::Response(b"OK\r\n".to_vec())).class,
            OutcomeClass::NoEffect
        );
    }
}
