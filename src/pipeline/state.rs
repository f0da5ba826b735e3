//! Conversion lifecycle states.

use std::fmt;

use serde::Serialize;

/// Stage reached by a single conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ConversionState {
    /// Nothing has been read yet.
    Idle,
    /// Input parsed and source codec found.
    SourceResolved,
    /// Pixel data decoded into a raster.
    Decoded,
    /// Target codec found and parameters accepted.
    TargetResolved,
    /// Raster encoded for the target syntax.
    Encoded,
    /// Output file written.
    Written,
    /// Conversion finished.
    Done,
    /// Conversion stopped with an error.
    Failed,
}

impl ConversionState {
    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::SourceResolved => "SourceResolved",
            Self::Decoded => "Decoded",
            Self::TargetResolved => "TargetResolved",
            Self::Encoded => "Encoded",
            Self::Written => "Written",
            Self::Done => "Done",
            Self::Failed => "Failed",
        }
    }
}

impl fmt::Display for ConversionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Records the states a conversion passes through.
#[derive(Debug)]
pub(crate) struct StateTrace {
    states: Vec<ConversionState>,
}

impl StateTrace {
    pub(crate) fn new() -> Self {
        Self {
            states: vec![ConversionState::Idle],
        }
    }

    pub(crate) fn current(&self) -> ConversionState {
        self.states
            .last()
            .copied()
            .unwrap_or(ConversionState::Idle)
    }

    pub(crate) fn advance(&mut self, next: ConversionState) {
        let current = self.current();
        if current.is_terminal() {
            return;
        }
        log::debug!("Conversion state {} -> {}", current, next);
        self.states.push(next);
    }

    pub(crate) fn fail(&mut self) {
        self.advance(ConversionState::Failed);
    }

    pub(crate) fn into_states(self) -> Vec<ConversionState> {
        self.states
    }
}
