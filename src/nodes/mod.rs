//! Node-based signal processing system
//!
//! This module provides a streaming node graph system for decoding captured
//! bus traffic:
//! - **Nodes**: Computation units that process samples
//! - **Channels**: Crossbeam channels for inter-node communication
//! - **Scheduler**: Thread-per-node runtime for parallel execution
//! - **Decoders**: The SIBO bus protocol decoder
//!
//! Source nodes produce per-line `Sample` streams, the decoder transforms
//! them into `Annotation` events, and sink nodes consume the results
//! (printers, analyzers).

pub mod capture;
pub mod decoders;

pub use capture::{CaptureFileSource, CaptureHeader, TraceSource};

// Re-export Sample from runtime
pub use crate::runtime::Sample;
