//! Render request coalescing
//!
//! Render requests issued before the backend finishes a paint pass share that
//! pass. Callbacks run in registration order, each exactly once.

use std::fmt;

type RenderCallback = Box<dyn FnOnce()>;

/// Pending render callbacks
#[derive(Default)]
pub struct RenderQueue {
    pending: Vec<RenderCallback>,
    passes: u64,
}

impl RenderQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a callback. Returns `true` when this request opens a new pass.
    pub fn schedule(&mut self, callback: RenderCallback) -> bool {
        let opens_pass = self.pending.is_empty();
        self.pending.push(callback);
        opens_pass
    }

    /// Whether a paint pass is waiting for completion
    pub fn is_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Take the callbacks of the current pass
    ///
    /// The caller must run them after releasing any borrow on the queue, so
    /// that a callback may schedule the next pass.
    pub fn take_pass(&mut self) -> Vec<RenderCallback> {
        if !self.pending.is_empty() {
            self.passes += 1;
        }
        std::mem::take(&mut self.pending)
    }

    /// Number of completed passes
    pub fn passes(&self) -> u64 {
        self.passes
    }
}

impl fmt::Debug for RenderQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderQueue")
            .field("pending", &self.pending.len())
            .field("passes", &self.passes)
            .finish()
    }
}
