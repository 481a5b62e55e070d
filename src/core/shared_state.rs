use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::core::RoutingDecision;

/// Snapshot of the capture loop's per-tick status, published under the
/// shared lock and served verbatim as `/results.json`.
#[derive(Debug, Clone, Serialize)]
pub struct LiveSnapshot {
    pub latest_ts: f64,
    pub fps: f64,
    pub fsm_state: String,
    pub motion_streak: u32,
    pub box_count: u32,
    pub brightness: f64,
    pub blur_var: f64,
    pub cpu_pct: f64,
    pub net_latency_ms: f64,
    pub decision: Option<RoutingDecision>,
    pub active_event_id: Option<u64>,
}

impl Default for LiveSnapshot {
    fn default() -> Self {
        Self {
            latest_ts: 0.0,
            fps: 0.0,
            fsm_state: "idle".to_string(),
            motion_streak: 0,
            box_count: 0,
            brightness: -1.0,
            blur_var: -1.0,
            cpu_pct: -1.0,
            net_latency_ms: -1.0,
            decision: None,
            active_event_id: None,
        }
    }
}

struct Inner {
    latest_jpeg: Option<Arc<Vec<u8>>>,
    latest_ts: f64,
    live: LiveSnapshot,
}

/// Guards the latest-JPEG cache and live-state snapshot; everything else
/// (segment ring, frame ring, queues) carries its own lock.
pub struct SharedState {
    inner: Mutex<Inner>,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                latest_jpeg: None,
                latest_ts: 0.0,
                live: LiveSnapshot::default(),
            }),
        }
    }

    pub fn publish_frame(&self, jpeg: Arc<Vec<u8>>, ts: f64) {
        let mut inner = self.inner.lock();
        inner.latest_jpeg = Some(jpeg);
        inner.latest_ts = ts;
    }

    pub fn publish_live(&self, live: LiveSnapshot) {
        self.inner.lock().live = live;
    }

    pub fn latest_jpeg(&self) -> Option<(Arc<Vec<u8>>, f64)> {
        let inner = self.inner.lock();
        inner.latest_jpeg.clone().map(|jpeg| (jpeg, inner.latest_ts))
    }

    pub fn live_snapshot(&self) -> LiveSnapshot {
        self.inner.lock().live.clone()
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_then_read_round_trips() {
        let state = SharedState::new();
        assert!(state.latest_jpeg().is_none());
        state.publish_frame(Arc::new(vec![1, 2, 3]), 5.0);
        let (jpeg, ts) = state.latest_jpeg().unwrap();
        assert_eq!(*jpeg, vec![1, 2, 3]);
        assert_eq!(ts, 5.0);
    }

    #[test]
    fn live_snapshot_defaults_to_idle() {
        let state = SharedState::new();
        assert_eq!(state.live_snapshot().fsm_state, "idle");
    }
}
