//! Port-based API for ergonomic node connections
//!
//! Provides InputPort and OutputPort type-erased wrappers for channel
//! endpoints, plus the port schema used by the Pipeline builder.

use std::any::TypeId;
use std::fmt;
use std::sync::atomic::AtomicBool;

use crossbeam_channel::Receiver as CrossbeamReceiver;

pub use super::errors::ConnectionError;
pub use super::pipeline::Pipeline;
pub use super::receiver::Receiver;
pub use super::sender::{ChannelMessage, Sender};
pub use super::type_registry::register_type;

/// Direction of a port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    Input,
    Output,
}

/// Schema describing a port's metadata
#[derive(Debug, Clone)]
pub struct PortSchema {
    pub name: String,
    pub type_id: TypeId,
    pub index: usize,
    pub direction: PortDirection,
}

impl PortSchema {
    /// Create a new port schema with type information
    pub fn new<T: 'static>(name: impl Into<String>, index: usize, direction: PortDirection) -> Self {
        Self {
            name: name.into(),
            type_id: TypeId::of::<T>(),
            index,
            direction,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Type-erased port wrappers
// ────────────────────────────────────────────────────────────────────────────

/// Type-erased input port wrapping a crossbeam receiver.
///
/// Owns the channel's end-of-stream flag so it persists across the
/// short-lived [`Receiver`] views handed out by `get()`.
pub struct InputPort {
    channel: Box<dyn std::any::Any + Send>,
    eos: AtomicBool,
}

impl InputPort {
    /// Create a typed input port from a crossbeam receiver.
    pub fn new<T: Send + 'static>(receiver: CrossbeamReceiver<ChannelMessage<T>>) -> Self {
        Self {
            channel: Box::new(receiver),
            eos: AtomicBool::new(false),
        }
    }

    /// Create from type-erased box (for internal use by Pipeline).
    pub(crate) fn from_type_erased(channel: Box<dyn std::any::Any + Send>) -> Self {
        Self {
            channel,
            eos: AtomicBool::new(false),
        }
    }

    /// Get a Receiver view over this port with the given putback buffer.
    ///
    /// Returns None if the port doesn't contain a receiver of `T` (e.g. an
    /// unconnected optional input).
    pub fn get<'a, T: Send + 'static>(
        &'a self,
        buffer: &'a mut std::collections::VecDeque<T>,
    ) -> Option<Receiver<'a, T>> {
        let receiver = self
            .channel
            .downcast_ref::<CrossbeamReceiver<ChannelMessage<T>>>()?;
        Some(Receiver::new(receiver, buffer, &self.eos))
    }
}

/// Type-erased output port wrapping a Sender<T>
pub struct OutputPort {
    channel: Box<dyn std::any::Any + Send>,
}

impl OutputPort {
    /// Create a typed output port from a broadcast sender.
    pub fn new<T: Send + Clone + 'static>(sender: Sender<T>) -> Self {
        Self {
            channel: Box::new(sender),
        }
    }

    /// Create from type-erased box (for internal use by Pipeline).
    pub(crate) fn from_type_erased(channel: Box<dyn std::any::Any + Send>) -> Self {
        Self { channel }
    }

    /// Get a Sender for this port (cheaply cloned from internal storage).
    ///
    /// Returns None if the port doesn't contain a Sender<T>.
    pub fn get<T: Send + Clone + 'static>(&self) -> Option<Sender<T>> {
        self.channel.downcast_ref::<Sender<T>>().cloned()
    }

    /// Split the underlying broadcast Sender into individual senders (one per destination).
    ///
    /// For nodes that need per-destination parallelism (e.g. `CaptureFileSource`),
    /// this allows spawning one thread per destination. Each returned Sender
    /// sends to exactly one destination.
    ///
    /// Returns None if the port doesn't contain a Sender<T>, or if the sender
    /// has no destinations.
    pub fn split_senders<T: Send + Clone + 'static>(&self) -> Option<Vec<Sender<T>>> {
        let sender = self.channel.downcast_ref::<Sender<T>>()?;
        let splits = sender.split_senders();
        if splits.is_empty() { None } else { Some(splits) }
    }
}

impl fmt::Debug for OutputPort {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "OutputPort")
    }
}
