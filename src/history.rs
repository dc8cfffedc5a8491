//! # History Manager
//!
//! Bounded undo/redo over whole-document snapshots.
//!
//! The history is a list of snapshots plus a cursor. Pushing truncates
//! everything after the cursor (so a push after an undo discards the redo
//! tail), appends, and advances. Continuous operations such as dragging push
//! with [`Commit::Debounced`]: consecutive pushes with the same key inside
//! the debounce window replace the tail entry instead of appending, so a
//! whole drag becomes a single undo step. [`History::flush`] closes the
//! current coalescing window without waiting for the clock.
//!
//! ```
//! use easel::history::{Commit, History};
//!
//! let mut history = History::new(0);
//! history.push(1, Commit::Immediate);
//! history.push(2, Commit::Immediate);
//! assert_eq!(history.undo(), Some(1));
//! assert_eq!(history.undo(), Some(0));
//! assert_eq!(history.undo(), None);
//! assert_eq!(history.redo(), Some(1));
//! ```

use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::config::{DEFAULT_DEBOUNCE_MS, DEFAULT_HISTORY_DEPTH};

/// How a snapshot enters the history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Commit {
    /// Always a new undo step.
    Immediate,
    /// Coalesce with the previous push of the same logical operation
    /// (e.g. `"move:title"`) if it happened within the debounce window.
    Debounced(String),
}

impl Commit {
    pub fn debounced(key: impl Into<String>) -> Self {
        Commit::Debounced(key.into())
    }
}

/// The debounced push the tail entry came from.
#[derive(Debug, Clone)]
struct OpenBatch {
    key: String,
    last_push: DateTime<Utc>,
}

pub struct History<T> {
    entries: VecDeque<T>,
    index: usize,
    max_depth: usize,
    debounce_window: Duration,
    clock: Arc<dyn Clock>,
    batch: Option<OpenBatch>,
}

impl<T: Clone> History<T> {
    /// History holding `initial` with default depth and debounce window.
    pub fn new(initial: T) -> Self {
        Self::with_options(
            initial,
            DEFAULT_HISTORY_DEPTH,
            Duration::milliseconds(DEFAULT_DEBOUNCE_MS as i64),
            Arc::new(SystemClock),
        )
    }

    pub fn with_options(
        initial: T,
        max_depth: usize,
        debounce_window: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut entries = VecDeque::new();
        entries.push_back(initial);
        Self {
            entries,
            index: 0,
            max_depth: max_depth.max(1),
            debounce_window,
            clock,
            batch: None,
        }
    }

    /// Record a new snapshot.
    pub fn push(&mut self, snapshot: T, commit: Commit) {
        let now = self.clock.now();

        if let Commit::Debounced(key) = &commit {
            let coalesce = self.batch.as_ref().is_some_and(|b| {
                b.key == *key && now - b.last_push <= self.debounce_window
            }) && self.index + 1 == self.entries.len();

            if coalesce {
                self.entries[self.index] = snapshot;
                if let Some(batch) = &mut self.batch {
                    batch.last_push = now;
                }
                return;
            }
        }

        self.entries.truncate(self.index + 1);
        self.entries.push_back(snapshot);
        self.index = self.entries.len() - 1;

        while self.entries.len() > self.max_depth {
            self.entries.pop_front();
            self.index -= 1;
        }

        self.batch = match commit {
            Commit::Debounced(key) => Some(OpenBatch {
                key,
                last_push: now,
            }),
            Commit::Immediate => None,
        };
    }

    /// End the current debounce batch; the next debounced push starts a new step.
    pub fn flush(&mut self) {
        self.batch = None;
    }

    /// Step back. Returns the snapshot now current, or `None` at the start.
    pub fn undo(&mut self) -> Option<T> {
        if self.index == 0 {
            return None;
        }
        self.batch = None;
        self.index -= 1;
        Some(self.entries[self.index].clone())
    }

    /// Step forward. Returns the snapshot now current, or `None` at the end.
    pub fn redo(&mut self) -> Option<T> {
        if self.index + 1 >= self.entries.len() {
            return None;
        }
        self.batch = None;
        self.index += 1;
        Some(self.entries[self.index].clone())
    }

    pub fn can_undo(&self) -> bool {
        self.index > 0
    }

    pub fn can_redo(&self) -> bool {
        self.index + 1 < self.entries.len()
    }

    pub fn current(&self) -> &T {
        &self.entries[self.index]
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all history and start over from `snapshot`.
    pub fn reset(&mut self, snapshot: T) {
        self.entries.clear();
        self.entries.push_back(snapshot);
        self.index = 0;
        self.batch = None;
    }
}
