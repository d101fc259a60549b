//! Progress events and the sink seam consumed by the presentation layer

pub mod parser;

pub use parser::ProgressParser;

/// One normalized progress event parsed from a single output line.
///
/// Carries no ownership; purely informational.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// The operation entered a named stage; the percentage does not move.
    PhaseChanged { label: &'static str },
    /// The cumulative percentage advanced by `increment`.
    PercentAdvanced { label: &'static str, increment: u8 },
    /// The line produced no event. Unmatched lines are not errors.
    NoOp,
}

/// Receiver for phase and percentage updates.
///
/// The cumulative percentage is the sum of increments delivered so far for the
/// operation. Implemented by the host presentation layer; the crate ships an
/// `indicatif` implementation in the binary.
pub trait ProgressSink: Send + Sync {
    fn update(&self, phase: &str, increment: Option<u8>);
}
