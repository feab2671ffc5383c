//! Channel: unbounded FIFO of machine words connecting VMs and callers.
//!
//! A [`Channel`] wraps both halves of a crossbeam channel behind one cloneable
//! handle. Cloning a handle does not copy the queue: every clone pushes to and
//! pops from the same underlying buffer. Wiring one VM's output handle in as
//! another VM's input is how pipelines are built.
//!
//! Each pipeline edge is meant to have one writer and one reader. Nothing stops
//! two readers from sharing a handle, but values are then split between them,
//! not broadcast.
//!
//! # Example
//!
//! ```rust
//! use intcode_vm::Channel;
//!
//! let chan = Channel::new();
//! let upstream = chan.clone();
//! upstream.push(7);
//! assert_eq!(chan.try_pop(), Some(7));
//! assert!(chan.is_empty());
//! ```

use crossbeam_channel::{self as cb};
use std::fmt;

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

/// Cloneable handle to a shared, unbounded word queue.
#[derive(Clone)]
pub struct Channel {
    tx: cb::Sender<i64>,
    rx: cb::Receiver<i64>,
}

impl Default for Channel {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("pending", &self.rx.len())
            .finish()
    }
}

impl Channel {
    /// Create an empty channel.
    pub fn new() -> Self {
        let (tx, rx) = cb::unbounded();
        Self { tx, rx }
    }

    /// Create a channel pre-loaded with `values`, in order.
    pub fn with_values<I: IntoIterator<Item = i64>>(values: I) -> Self {
        let chan = Self::new();
        for value in values {
            chan.push(value);
        }
        chan
    }

    /// Append a value. Never blocks.
    pub fn push(&self, value: i64) {
        // The handle owns a receiver, so the channel cannot be disconnected.
        let _ = self.tx.send(value);
    }

    /// Pop the oldest value if one is buffered.
    pub fn try_pop(&self) -> Option<i64> {
        self.rx.try_recv().ok()
    }

    /// Pop the oldest value, blocking until one is pushed.
    ///
    /// Every handle keeps the channel open, so this returns `None` only if the
    /// underlying channel is somehow disconnected.
    pub fn pop(&self) -> Option<i64> {
        self.rx.recv().ok()
    }

    /// Pop the oldest value, blocking until one is pushed or `cancel` fires.
    ///
    /// Returns `None` when cancelled.
    pub fn pop_cancellable(&self, cancel: &CancelToken) -> Option<i64> {
        if cancel.is_cancelled() {
            return None;
        }
        cb::select! {
            recv(self.rx) -> msg => msg.ok(),
            recv(cancel.rx) -> _ => None,
        }
    }

    /// Discard every buffered value, returning how many were dropped.
    pub fn clear(&self) -> usize {
        self.rx.try_iter().count()
    }

    /// Remove and return every buffered value, oldest first.
    pub fn drain(&self) -> Vec<i64> {
        self.rx.try_iter().collect()
    }

    /// Number of values currently buffered.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Returns `true` if both handles refer to the same underlying queue.
    pub fn same_channel(&self, other: &Channel) -> bool {
        self.tx.same_channel(&other.tx)
    }
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Receiving side of a cancellation signal.
///
/// Nothing is ever sent on the underlying channel; cancellation is the
/// disconnect that happens when the paired [`Canceller`] fires or is dropped.
#[derive(Clone)]
pub struct CancelToken {
    rx: cb::Receiver<()>,
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        matches!(self.rx.try_recv(), Err(cb::TryRecvError::Disconnected))
    }
}

/// Sending side of a cancellation signal. Dropping it also cancels.
#[derive(Debug)]
pub struct Canceller {
    tx: Option<cb::Sender<()>>,
}

impl Canceller {
    pub fn cancel(&mut self) {
        self.tx.take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.tx.is_none()
    }
}

/// Create a linked `(Canceller, CancelToken)` pair.
pub fn cancel_pair() -> (Canceller, CancelToken) {
    let (tx, rx) = cb::bounded(0);
    (Canceller { tx: Some(tx) }, CancelToken { rx })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
