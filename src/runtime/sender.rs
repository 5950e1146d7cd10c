//! Broadcast sender with explicit end-of-stream signaling

use crossbeam_channel::{SendError, Sender as CrossbeamSender};

/// Channel message wrapper for end-of-stream signaling
///
/// Wraps data flowing through channels so sources can explicitly signal
/// when no more data will be sent. This matters for self-threading nodes
/// (like `CaptureFileSource`) where `split_senders()` creates cloned channel
/// handles: dropping a clone doesn't close the channel because the original
/// `Sender` in `OutputPort` still holds its handles.
///
/// Nodes never see this enum directly; `Sender::send()` wraps values in
/// `Sample(T)` and `Receiver::recv()` unwraps them transparently.
#[derive(Clone, Debug)]
pub enum ChannelMessage<T> {
    /// A data sample
    Sample(T),
    /// End-of-stream marker, no more data will be sent
    EndOfStream,
}

/// Broadcast sender that sends to one or more consumers
///
/// Broadcasts directly from the caller thread to all destinations. Nodes
/// that need per-destination parallelism (to avoid head-of-line blocking)
/// use `split_senders()` and spawn one thread per destination.
pub struct Sender<T> {
    destinations: Vec<CrossbeamSender<ChannelMessage<T>>>,
}

impl<T: Clone> Sender<T> {
    /// Create a new Sender from a vector of crossbeam senders
    pub fn new(destinations: Vec<CrossbeamSender<ChannelMessage<T>>>) -> Self {
        Self { destinations }
    }

    /// Split this broadcast sender into individual senders (one per destination)
    ///
    /// Each returned Sender sends to exactly one destination, so a node can
    /// spawn one worker thread per destination instead of broadcasting from
    /// a single thread.
    pub fn split_senders(&self) -> Vec<Sender<T>> {
        self.destinations
            .iter()
            .map(|dest| Sender {
                destinations: vec![dest.clone()],
            })
            .collect()
    }

    /// Get the number of broadcast destinations
    pub fn num_destinations(&self) -> usize {
        self.destinations.len()
    }

    /// Send a value to all destinations
    ///
    /// Wraps the value in `ChannelMessage::Sample` and sends to all
    /// destinations sequentially. Fails only if no destination accepted the
    /// value.
    pub fn send(&self, value: T) -> Result<(), SendError<T>> {
        if self.destinations.is_empty() {
            return Ok(());
        }

        let mut any_success = false;
        let mut last_error = None;

        for dest in &self.destinations {
            match dest.send(ChannelMessage::Sample(value.clone())) {
                Ok(()) => any_success = true,
                Err(SendError(msg)) => {
                    if let ChannelMessage::Sample(v) = msg {
                        last_error = Some(SendError(v));
                    }
                }
            }
        }

        if !any_success && let Some(e) = last_error {
            return Err(e);
        }

        Ok(())
    }

    /// Signal end-of-stream to all destinations
    ///
    /// Sends `ChannelMessage::EndOfStream` to each destination. Downstream
    /// `Receiver`s will return `WorkError::Shutdown` on subsequent
    /// `recv()`/`peek()` calls. Call this before dropping the sender when
    /// the node has finished producing data.
    pub fn close(&self) {
        for dest in &self.destinations {
            let _ = dest.send(ChannelMessage::EndOfStream);
        }
    }

    /// Check if this sender has any connected receivers
    pub fn is_connected(&self) -> bool {
        !self.destinations.is_empty()
    }
}

impl<T: Clone> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Self {
            destinations: self.destinations.clone(),
        }
    }
}
