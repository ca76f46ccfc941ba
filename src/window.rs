//! Per-stream sliding windows of recent readings
//!
//! The [`WindowStore`] owns one bounded FIFO window per stream key. Windows
//! are created lazily on the first reading for a key and live for the
//! process lifetime; only values inside a window are ever evicted.

use crate::reading::StreamKey;
use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Bounded FIFO of the most recent values and their arrival timestamps.
///
/// Invariant: `values` and `timestamps` always have equal length ≤ capacity;
/// the oldest pair is evicted first when a push would exceed capacity.
#[derive(Debug)]
pub struct ReadingWindow {
    capacity: usize,
    values: VecDeque<f64>,
    timestamps: VecDeque<DateTime<Utc>>,
}

impl ReadingWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            values: VecDeque::with_capacity(capacity),
            timestamps: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a value/timestamp pair, evicting the oldest pair if full.
    pub fn push(&mut self, value: f64, timestamp: DateTime<Utc>) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
            self.timestamps.pop_front();
        }
        self.values.push_back(value);
        self.timestamps.push_back(timestamp);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Point-in-time copy of the window contents.
    pub fn snapshot(&self) -> WindowSnapshot {
        WindowSnapshot {
            values: self.values.iter().copied().collect(),
            timestamps: self.timestamps.iter().copied().collect(),
        }
    }
}

/// Point-in-time copy of one stream's window, in insertion order.
///
/// Handed to the statistics functions and the watchdog so neither ever holds
/// a window lock while doing I/O.
#[derive(Debug, Clone, Default)]
pub struct WindowSnapshot {
    pub values: Vec<f64>,
    pub timestamps: Vec<DateTime<Utc>>,
}

impl WindowSnapshot {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Timestamp of the most recent reading in the window, if any.
    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamps.last().copied()
    }
}

/// Keyed store of sliding windows, safe for concurrent use.
///
/// The outer map lock only guards lazy window creation; each window has its
/// own mutex, so `record` and `snapshot` for the same key are serialized
/// while operations on different keys proceed concurrently.
pub struct WindowStore {
    capacity: usize,
    windows: RwLock<FxHashMap<StreamKey, Arc<Mutex<ReadingWindow>>>>,
}

impl WindowStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            windows: RwLock::new(FxHashMap::default()),
        }
    }

    async fn window(&self, key: &StreamKey) -> Arc<Mutex<ReadingWindow>> {
        if let Some(window) = self.windows.read().await.get(key) {
            return window.clone();
        }
        let mut windows = self.windows.write().await;
        windows
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(ReadingWindow::new(self.capacity))))
            .clone()
    }

    /// Append a reading to the key's window and return the post-update snapshot.
    pub async fn record(
        &self,
        key: &StreamKey,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> WindowSnapshot {
        let window = self.window(key).await;
        let mut guard = window.lock().await;
        guard.push(value, timestamp);
        guard.snapshot()
    }

    /// Current window for the key without mutating it. Unknown keys yield an
    /// empty snapshot.
    pub async fn snapshot(&self, key: &StreamKey) -> WindowSnapshot {
        let window = self.windows.read().await.get(key).cloned();
        match window {
            Some(window) => window.lock().await.snapshot(),
            None => WindowSnapshot::default(),
        }
    }

    /// Number of streams with a window.
    pub async fn stream_count(&self) -> usize {
        self.windows.read().await.len()
    }
}
