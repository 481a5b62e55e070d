use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where inference for an event's clip should run.
///
/// Fixed at event start and immutable for the event's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoutingDecision {
    RecordOnly,
    RunLocal,
    RunCloud,
}

impl RoutingDecision {
    pub fn route_mode(&self) -> &'static str {
        match self {
            RoutingDecision::RecordOnly => "LOCAL",
            RoutingDecision::RunLocal => "LOCAL",
            RoutingDecision::RunCloud => "CLOUD",
        }
    }
}

/// Router signal averages and decision, captured once at event start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterSnapshot {
    pub brightness: f64,
    pub blur_var: f64,
    pub cpu_pct: f64,
    pub net_latency_ms: f64,
    pub decision: RoutingDecision,
    pub decision_reason: Vec<String>,
}

/// Motion statistics accumulated over an event's active lifetime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MotionStats {
    pub max_area: f64,
    pub avg_area: f64,
    pub peak_box_count: u32,
    pub motion_frames: u64,
    pub event_frames: u64,
    area_sum: f64,
}

impl MotionStats {
    pub fn observe(&mut self, total_moved_area: f64, box_count: u32, motion_seen: bool) {
        self.event_frames += 1;
        if motion_seen {
            self.motion_frames += 1;
        }
        self.area_sum += total_moved_area;
        self.avg_area = self.area_sum / self.event_frames as f64;
        if total_moved_area > self.max_area {
            self.max_area = total_moved_area;
        }
        if box_count > self.peak_box_count {
            self.peak_box_count = box_count;
        }
    }
}

/// A motion incident tracked across its idle/active/postroll lifecycle.
#[derive(Debug, Clone)]
pub struct Event {
    pub event_id: u64,
    pub start_ts: f64,
    pub end_ts: f64,
    pub preroll_segs: Vec<PathBuf>,
    pub active_segs: Vec<PathBuf>,
    pub postroll_segs: Vec<PathBuf>,
    pub motion_stats: MotionStats,
    pub router_snapshot: RouterSnapshot,
}

impl Event {
    pub fn new(event_id: u64, start_ts: f64, preroll_segs: Vec<PathBuf>, router_snapshot: RouterSnapshot) -> Self {
        Self {
            event_id,
            start_ts,
            end_ts: start_ts,
            preroll_segs,
            active_segs: Vec::new(),
            postroll_segs: Vec::new(),
            motion_stats: MotionStats::default(),
            router_snapshot,
        }
    }

    pub fn mint_id(start_ts: f64) -> u64 {
        (start_ts * 1000.0) as u64
    }

    /// `preroll_segs ++ active_segs ++ postroll_segs`, in concat order.
    pub fn concat_inputs(&self) -> Vec<PathBuf> {
        let mut paths = Vec::with_capacity(
            self.preroll_segs.len() + self.active_segs.len() + self.postroll_segs.len(),
        );
        paths.extend(self.preroll_segs.iter().cloned());
        paths.extend(self.active_segs.iter().cloned());
        paths.extend(self.postroll_segs.iter().cloned());
        paths
    }

    pub fn all_pinned_paths(&self) -> Vec<PathBuf> {
        self.concat_inputs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mint_id_derives_from_start_ts_milliseconds() {
        assert_eq!(Event::mint_id(1.234), 1234);
    }

    #[test]
    fn concat_inputs_preserves_preroll_active_postroll_order() {
        let snapshot = RouterSnapshot {
            brightness: 0.5,
            blur_var: 100.0,
            cpu_pct: 10.0,
            net_latency_ms: -1.0,
            decision: RoutingDecision::RunLocal,
            decision_reason: vec![],
        };
        let mut event = Event::new(1, 1.0, vec![PathBuf::from("pre.mp4")], snapshot);
        event.active_segs.push(PathBuf::from("act.mp4"));
        event.postroll_segs.push(PathBuf::from("post.mp4"));
        assert_eq!(
            event.concat_inputs(),
            vec![
                PathBuf::from("pre.mp4"),
                PathBuf::from("act.mp4"),
                PathBuf::from("post.mp4"),
            ]
        );
    }
}
