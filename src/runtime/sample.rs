//! Core data types for signal processing

use std::fmt;

/// Run-length encoded level of a single capture line.
///
/// A line stream carries one `Sample` per level change rather than one per
/// capture sample, dramatically reducing bandwidth for lines that toggle
/// rarely. The value holds until the next `Sample` on the same stream; the
/// first sample of a stream establishes the line's initial level, and every
/// later one marks a transition at `position`.
///
/// Positions are sample indices into the capture, shared by all lines (all
/// lines are sampled by the same acquisition clock).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Sample {
    /// Line level from this position onward
    pub value: bool,
    /// Sample index at which this level started
    pub position: u64,
}

impl Sample {
    /// Create a new sample
    pub fn new(value: bool, position: u64) -> Self {
        Self { value, position }
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Sample[v={}, pos={}]", self.value, self.position)
    }
}
