//! Bounded buffer of captured records.
//!
//! Records accumulate in completion order. When a push brings the buffer to
//! its capacity, every entry is removed as one [`Batch`] and handed to the
//! [`BatchSink`]. Appending, the threshold check and the reset all happen
//! under one lock, and the sink is called after the lock is released, so a
//! slow sink never stalls other pushes.

use crate::capture::LogRecord;
use std::sync::{Arc, Mutex, MutexGuard};

/// A record together with the group key it was captured for.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferEntry {
    pub group: String,
    pub record: LogRecord,
}

/// Entries drained from the buffer in one step.
///
/// A batch owns its entries; the buffer keeps no reference to it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Batch {
    entries: Vec<BufferEntry>,
}

impl Batch {
    pub fn new(entries: Vec<BufferEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[BufferEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<BufferEntry> {
        self.entries
    }
}

/// Receives batches once the buffer lets go of them.
///
/// Implementations must not block: `dispatch` runs on the request path.
pub trait BatchSink: Send + Sync {
    fn dispatch(&self, batch: Batch);
}

/// Ordered, bounded queue of [`BufferEntry`] values.
pub struct Buffer {
    entries: Mutex<Vec<BufferEntry>>,
    capacity: usize,
    sink: Arc<dyn BatchSink>,
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}

impl Buffer {
    /// Create a buffer that flushes every `capacity` pushes.
    ///
    /// A capacity of 0 is treated as 1.
    pub fn new(capacity: usize, sink: Arc<dyn BatchSink>) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
            sink,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of entries waiting for the next threshold crossing.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append an entry; dispatch a batch if this push reached capacity.
    ///
    /// The batch includes the entry pushed by this call.
    pub fn push(&self, group: String, record: LogRecord) {
        let batch = {
            let mut entries = self.lock();
            entries.push(BufferEntry { group, record });
            if entries.len() >= self.capacity {
                let drained = std::mem::replace(&mut *entries, Vec::with_capacity(self.capacity));
                Some(Batch::new(drained))
            } else {
                None
            }
        };

        if let Some(batch) = batch {
            tracing::debug!(batch_size = batch.len(), "Buffer reached capacity");
            self.sink.dispatch(batch);
        }
    }

    /// Remove everything currently buffered, regardless of capacity.
    pub fn drain(&self) -> Option<Batch> {
        let drained = std::mem::take(&mut *self.lock());
        if drained.is_empty() {
            None
        } else {
            Some(Batch::new(drained))
        }
    }

    /// Drain whatever is buffered and hand it to the sink.
    ///
    /// Returns the number of entries dispatched.
    pub fn flush(&self) -> usize {
        match self.drain() {
            Some(batch) => {
                let n = batch.len();
                self.sink.dispatch(batch);
                n
            }
            None => 0,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<BufferEntry>> {
        // Nothing under the lock can leave the Vec half-written.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}
