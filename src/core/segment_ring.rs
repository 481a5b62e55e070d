use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use parking_lot::Mutex;
use tracing::{trace, warn};

/// One closed segment file tracked by the ring buffer.
#[derive(Debug, Clone)]
struct SegmentEntry {
    ts: f64,
    path: PathBuf,
    pinned: bool,
}

/// Time-bounded rolling collection of closed MP4 segment files.
///
/// Entries are appended in close-time order and evicted once they fall
/// outside `keep_seconds`, unless pinned by an in-flight event.
pub struct SegmentRingBuffer {
    inner: Mutex<VecDeque<SegmentEntry>>,
    keep_seconds: f64,
}

impl SegmentRingBuffer {
    pub fn new(keep_seconds: f64) -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            keep_seconds,
        }
    }

    /// Append a newly-closed segment, then evict anything now out of window.
    pub fn add(&self, ts: f64, path: PathBuf) {
        {
            let mut entries = self.inner.lock();
            entries.push_back(SegmentEntry {
                ts,
                path,
                pinned: false,
            });
        }
        self.evict(now_secs());
    }

    /// Pin every entry whose path matches one in `paths`, preventing eviction.
    pub fn pin_many(&self, paths: &[PathBuf]) {
        let mut entries = self.inner.lock();
        for entry in entries.iter_mut() {
            if paths.iter().any(|p| p == &entry.path) {
                entry.pinned = true;
            }
        }
    }

    /// Clear the pin on every entry whose path matches one in `paths`.
    pub fn unpin_many(&self, paths: &[PathBuf]) {
        let mut entries = self.inner.lock();
        for entry in entries.iter_mut() {
            if paths.iter().any(|p| p == &entry.path) {
                entry.pinned = false;
            }
        }
    }

    /// Paths whose `ts >= now - seconds`, ordered ascending by `ts`.
    pub fn snapshot_last(&self, seconds: f64) -> Vec<PathBuf> {
        let cutoff = now_secs() - seconds;
        let entries = self.inner.lock();
        entries
            .iter()
            .filter(|e| e.ts >= cutoff)
            .map(|e| e.path.clone())
            .collect()
    }

    /// Drop entries older than `keep_seconds`, skipping (and rotating past)
    /// pinned entries at the head exactly once so eviction can continue.
    pub fn evict(&self, now: f64) {
        let cutoff = now - self.keep_seconds;
        let mut entries = self.inner.lock();
        let mut rotated: std::collections::HashSet<PathBuf> = std::collections::HashSet::new();
        let mut guard = 0usize;
        let limit = entries.len();

        while guard < limit {
            guard += 1;
            let Some(front) = entries.front() else {
                break;
            };
            if front.ts >= cutoff {
                break;
            }
            if front.pinned {
                if rotated.contains(&front.path) {
                    break;
                }
                rotated.insert(front.path.clone());
                let head = entries.pop_front().unwrap();
                entries.push_back(head);
                continue;
            }
            let stale = entries.pop_front().unwrap();
            if let Err(err) = remove_if_present(&stale.path) {
                warn!(path = %stale.path.display(), error = %err, "failed to unlink evicted segment");
            } else {
                trace!(path = %stale.path.display(), "evicted segment");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"x").unwrap();
        path
    }

    #[test]
    fn add_and_snapshot_last_orders_ascending() {
        let dir = tempdir().unwrap();
        let buffer = SegmentRingBuffer::new(1000.0);
        let a = touch(dir.path(), "a.mp4");
        let b = touch(dir.path(), "b.mp4");
        buffer.add(1.0, a.clone());
        buffer.add(2.0, b.clone());
        assert_eq!(buffer.snapshot_last(1000.0), vec![a, b]);
    }

    #[test]
    fn evict_drops_unpinned_stale_entries() {
        let dir = tempdir().unwrap();
        let buffer = SegmentRingBuffer::new(10.0);
        let old = touch(dir.path(), "old.mp4");
        buffer.add(0.0, old.clone());
        buffer.evict(100.0);
        assert!(buffer.is_empty());
        assert!(!old.exists());
    }

    #[test]
    fn evict_retains_pinned_entries_past_keep_window() {
        let dir = tempdir().unwrap();
        let buffer = SegmentRingBuffer::new(10.0);
        let pinned = touch(dir.path(), "pinned.mp4");
        buffer.add(0.0, pinned.clone());
        buffer.pin_many(&[pinned.clone()]);
        buffer.evict(100.0);
        assert_eq!(buffer.len(), 1);
        assert!(pinned.exists());
    }

    #[test]
    fn pin_then_unpin_is_a_no_op_for_evictable_set() {
        let dir = tempdir().unwrap();
        let buffer = SegmentRingBuffer::new(10.0);
        let path = touch(dir.path(), "seg.mp4");
        buffer.add(0.0, path.clone());
        buffer.pin_many(&[path.clone()]);
        buffer.unpin_many(&[path.clone()]);
        buffer.evict(100.0);
        assert!(buffer.is_empty());
    }

    #[test]
    fn evict_stops_when_all_remaining_entries_are_pinned() {
        let dir = tempdir().unwrap();
        let buffer = SegmentRingBuffer::new(10.0);
        let a = touch(dir.path(), "a.mp4");
        let b = touch(dir.path(), "b.mp4");
        buffer.add(0.0, a.clone());
        buffer.add(0.0, b.clone());
        buffer.pin_many(&[a.clone(), b.clone()]);
        buffer.evict(100.0);
        assert_eq!(buffer.len(), 2);
    }
}
