//! Protocol decoder nodes
//!
//! Decoders for live data processing using the channel-based architecture.

pub mod sibo_decoder;
pub mod tables;
pub mod types;

// Re-export common types
pub use types::{Annotation, AnnotationKind, ControlOp, FrameKind, ModeBits, classify};

// Re-export decoders
pub use sibo_decoder::SiboDecoder;
