//! SIBO serial protocol decoder with a streaming node-based API
//!
//! This library decodes the two-wire synchronous serial bus (CLK + DATA,
//! optional SDIR direction pin) used by Psion sixteen-bit organiser
//! peripherals. Captured waveforms are processed in real-time using a
//! thread-per-node graph architecture.
//!
//! # Architecture
//!
//! - **CaptureFileSource**: Streams per-line samples from packed capture files
//! - **TraceSource**: Replays in-memory edge lists (tests, synthetic traces)
//! - **SiboDecoder**: Turns CLK/DATA/SDIR edge streams into protocol annotations
//! - **Scheduler**: Manages node lifecycle and parallel execution
//!
//! # Example
//!
//! ```no_run
//! use sibo::{CaptureFileSource, Pipeline};
//!
//! let mut pipeline = Pipeline::new();
//! pipeline.add_process("source", CaptureFileSource::new("capture.zip")?)?;
//! // ... connect the decoder and a sink, then build and run
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use thiserror::Error;

pub mod nodes;
pub mod runtime;

// Re-export decoder data types
pub use nodes::decoders::{Annotation, AnnotationKind, ControlOp, FrameKind, ModeBits, classify};

// Re-export data types from runtime
pub use runtime::Sample;

// Re-export streaming nodes
pub use nodes::{CaptureFileSource, TraceSource};

// Re-export streaming decoders
pub use nodes::decoders::SiboDecoder;

// Re-export streaming runtime components
pub use runtime::{
    ConnectionError, InputPort, OutputPort, Pipeline, PortDirection, PortSchema, ProcessNode,
    Scheduler, WorkError, WorkResult, register_type,
};

#[derive(Error, Debug)]
pub enum SiboError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Header parsing error: {0}")]
    ParseHeader(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Unknown capture line: {0}")]
    UnknownLine(String),
}

pub type Result<T> = std::result::Result<T, SiboError>;
