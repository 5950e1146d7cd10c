//! Channel receiver with a per-channel putback buffer
//!
//! [`Receiver`] wraps a single `crossbeam_channel::Receiver<ChannelMessage<T>>`
//! with a putback buffer, providing `recv`, `peek`, and `put_back`.
//! Transparently unwraps `ChannelMessage` and caches end-of-stream state so
//! subsequent calls return `Shutdown`.

use crossbeam_channel::Receiver as CrossbeamReceiver;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use super::errors::{WorkError, WorkResult};
use super::sender::ChannelMessage;

/// A single crossbeam receiver with a putback buffer.
///
/// The buffer is externally owned (passed as `&mut VecDeque<T>`) so it
/// persists across `work()` calls in the owning node's struct. The
/// end-of-stream flag is owned by the [`InputPort`](super::ports::InputPort)
/// for the same reason.
///
/// Transparently unwraps `ChannelMessage::Sample(T)` and returns the value.
/// On `ChannelMessage::EndOfStream`, sets a persistent flag so all subsequent
/// `recv()`/`peek()` calls return `WorkError::Shutdown` immediately.
pub struct Receiver<'a, T> {
    receiver: &'a CrossbeamReceiver<ChannelMessage<T>>,
    buffer: &'a mut VecDeque<T>,
    eos: &'a AtomicBool,
}

impl<'a, T> Receiver<'a, T> {
    /// Create a new receiver over an external buffer and end-of-stream flag.
    pub fn new(
        receiver: &'a CrossbeamReceiver<ChannelMessage<T>>,
        buffer: &'a mut VecDeque<T>,
        eos: &'a AtomicBool,
    ) -> Self {
        Self {
            receiver,
            buffer,
            eos,
        }
    }

    /// Blocking receive. Returns from the putback buffer first, then
    /// falls through to the underlying channel.
    ///
    /// Returns `Err(WorkError::Shutdown)` if end-of-stream has been received
    /// (either now or in a previous call).
    pub fn recv(&mut self) -> WorkResult<T> {
        if self.eos.load(Ordering::Relaxed) {
            return Err(WorkError::Shutdown);
        }

        if let Some(item) = self.buffer.pop_front() {
            return Ok(item);
        }

        match self.receiver.recv() {
            Ok(ChannelMessage::Sample(item)) => Ok(item),
            Ok(ChannelMessage::EndOfStream) => {
                self.eos.store(true, Ordering::Relaxed);
                tracing::debug!("Receiver::recv() - EndOfStream received");
                Err(WorkError::Shutdown)
            }
            Err(_) => {
                tracing::debug!("Receiver::recv() - channel disconnected, returning Shutdown");
                Err(WorkError::Shutdown)
            }
        }
    }

    /// Peek at the front item. If the buffer is empty, blocks on the channel
    /// to populate it.
    ///
    /// Returns `Err(WorkError::Shutdown)` if end-of-stream has been received.
    pub fn peek(&mut self) -> WorkResult<&T> {
        if self.eos.load(Ordering::Relaxed) {
            return Err(WorkError::Shutdown);
        }

        if self.buffer.is_empty() {
            match self.receiver.recv() {
                Ok(ChannelMessage::Sample(item)) => {
                    self.buffer.push_back(item);
                }
                Ok(ChannelMessage::EndOfStream) => {
                    self.eos.store(true, Ordering::Relaxed);
                    tracing::debug!("Receiver::peek() - EndOfStream received");
                    return Err(WorkError::Shutdown);
                }
                Err(_) => {
                    tracing::debug!("Receiver::peek() - channel disconnected, returning Shutdown");
                    return Err(WorkError::Shutdown);
                }
            }
        }
        Ok(self.buffer.front().unwrap())
    }

    /// Push an item back to the front of the buffer so the next `recv()`
    /// returns it.
    pub fn put_back(&mut self, item: T) {
        self.buffer.push_front(item);
    }

    /// Whether end-of-stream has already been observed on this channel.
    pub fn is_closed(&self) -> bool {
        self.eos.load(Ordering::Relaxed) && self.buffer.is_empty()
    }

    /// Check if there are any buffered items.
    pub fn has_buffered(&self) -> bool {
        !self.buffer.is_empty()
    }
}
