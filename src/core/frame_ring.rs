use std::collections::VecDeque;
use std::time::SystemTime;

use parking_lot::Mutex;

/// One JPEG-encoded frame keyed by capture timestamp.
#[derive(Debug, Clone)]
pub struct FrameRingEntry {
    pub ts: f64,
    pub jpeg: std::sync::Arc<Vec<u8>>,
}

/// Bounded rolling buffer of recent JPEG frames.
///
/// Single-producer (the capture loop), multi-consumer (HTTP handlers);
/// the oldest entry is dropped once `capacity` is reached.
pub struct FrameRingQueue {
    inner: Mutex<VecDeque<FrameRingEntry>>,
    capacity: usize,
}

impl FrameRingQueue {
    pub fn new(max_seconds: f64, fps: f64) -> Self {
        let capacity = (max_seconds * fps) as usize + 32;
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn push(&self, ts: f64, jpeg: Vec<u8>) {
        let mut entries = self.inner.lock();
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(FrameRingEntry {
            ts,
            jpeg: std::sync::Arc::new(jpeg),
        });
    }

    pub fn snapshot_last(&self, seconds: f64) -> Vec<FrameRingEntry> {
        let cutoff = now_secs() - seconds;
        let entries = self.inner.lock();
        entries
            .iter()
            .filter(|e| e.ts >= cutoff)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
