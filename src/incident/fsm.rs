use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::EventConfig;
use crate::core::{Event, RouterSnapshot, SegmentRingBuffer};

/// Closed set of states the event lifecycle can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsmState {
    Idle,
    Active,
    Postroll,
}

/// Side effect required once an event reaches `finalize`: concatenate its
/// segments, write the incident package, and enqueue downstream work.
///
/// Kept behind a trait so the state machine itself stays free of filesystem
/// and queue concerns — those belong to the capture loop's wiring.
pub trait EventFinalizer {
    fn finalize(&self, event: Event);
}

/// Drives idle -> active -> postroll -> finalize -> idle.
pub struct EventFsm {
    config: EventConfig,
    state: FsmState,
    motion_streak: u32,
    last_motion_ts: f64,
    postroll_until: f64,
    current: Option<Event>,
    segment_ring: Arc<SegmentRingBuffer>,
    finalizer: Arc<dyn EventFinalizer + Send + Sync>,
}

/// Inputs for a single frame's worth of FSM evaluation.
pub struct FrameSignals<'a> {
    pub now: f64,
    pub moved_area: f64,
    pub box_count: u32,
    pub motion_seen: bool,
    pub router_snapshot: &'a RouterSnapshot,
    pub target_fps: f64,
}

impl EventFsm {
    pub fn new(
        config: EventConfig,
        segment_ring: Arc<SegmentRingBuffer>,
        finalizer: Arc<dyn EventFinalizer + Send + Sync>,
    ) -> Self {
        Self {
            config,
            state: FsmState::Idle,
            motion_streak: 0,
            last_motion_ts: 0.0,
            postroll_until: 0.0,
            current: None,
            segment_ring,
            finalizer,
        }
    }

    pub fn state(&self) -> FsmState {
        self.state
    }

    pub fn current_event_id(&self) -> Option<u64> {
        self.current.as_ref().map(|e| e.event_id)
    }

    /// Evaluate one frame's transitions, in the order the design specifies.
    pub fn step(&mut self, signals: &FrameSignals) {
        self.update_motion_streak(signals.now, signals.motion_seen);

        match self.state {
            FsmState::Idle => {
                if self.motion_streak >= self.config.on_frames {
                    self.transition_to_active(signals);
                }
            }
            FsmState::Active => {
                self.accumulate(signals);
                if signals.now - self.last_motion_ts >= self.config.off_seconds {
                    self.transition_to_postroll(signals.now);
                } else if self.exceeds_safety_bound(signals.target_fps) {
                    warn!(
                        event_id = self.current_event_id(),
                        "event exceeded max_event_seconds, forcing postroll"
                    );
                    self.transition_to_postroll(signals.now);
                }
            }
            FsmState::Postroll => {
                if self.motion_streak >= self.config.on_frames {
                    info!(event_id = self.current_event_id(), "motion re-triggered during postroll, elongating event");
                    self.state = FsmState::Active;
                    self.accumulate(signals);
                } else if signals.now >= self.postroll_until {
                    self.finalize(signals.now);
                }
            }
        }
    }

    /// Record a segment closed this frame; pin it while an event is open.
    pub fn on_segment_closed(&mut self, path: PathBuf) {
        if let Some(event) = self.current.as_mut() {
            self.segment_ring.pin_many(std::slice::from_ref(&path));
            event.active_segs.push(path);
        }
    }

    fn update_motion_streak(&mut self, now: f64, motion_seen: bool) {
        if motion_seen {
            self.motion_streak += 1;
            self.last_motion_ts = now;
        } else {
            self.motion_streak = self.motion_streak.saturating_sub(1);
        }
    }

    fn transition_to_active(&mut self, signals: &FrameSignals) {
        let event_id = Event::mint_id(signals.now);
        let preroll_segs = self.segment_ring.snapshot_last(self.config.preroll_seconds);
        self.segment_ring.pin_many(&preroll_segs);

        info!(event_id, preroll = preroll_segs.len(), "event armed: idle -> active");

        self.current = Some(Event::new(
            event_id,
            signals.now,
            preroll_segs,
            signals.router_snapshot.clone(),
        ));
        self.state = FsmState::Active;
        self.accumulate(signals);
    }

    fn accumulate(&mut self, signals: &FrameSignals) {
        if let Some(event) = self.current.as_mut() {
            event.motion_stats.observe(signals.moved_area, signals.box_count, signals.motion_seen);
            event.end_ts = signals.now;
        }
    }

    fn exceeds_safety_bound(&self, target_fps: f64) -> bool {
        let Some(event) = &self.current else { return false };
        if target_fps <= 0.0 {
            return false;
        }
        let elapsed = event.motion_stats.event_frames as f64 * (1.0 / target_fps);
        elapsed > self.config.max_event_seconds
    }

    fn transition_to_postroll(&mut self, now: f64) {
        self.postroll_until = now + self.config.postroll_seconds;
        self.state = FsmState::Postroll;
        info!(event_id = self.current_event_id(), "event -> postroll");
    }

    fn finalize(&mut self, now: f64) {
        let Some(mut event) = self.current.take() else {
            self.state = FsmState::Idle;
            return;
        };

        let postroll_segs = self
            .segment_ring
            .snapshot_last(self.config.postroll_seconds + 1.0);
        self.segment_ring.pin_many(&postroll_segs);
        event.postroll_segs = postroll_segs;
        event.end_ts = now;

        let all = event.all_pinned_paths();
        info!(event_id = event.event_id, segments = all.len(), "finalizing event");

        self.finalizer.finalize(event);
        self.segment_ring.unpin_many(&all);

        self.state = FsmState::Idle;
        self.motion_streak = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RoutingDecision;
    use std::sync::Mutex;

    struct RecordingFinalizer {
        events: Mutex<Vec<Event>>,
    }

    impl EventFinalizer for RecordingFinalizer {
        fn finalize(&self, event: Event) {
            self.events.lock().unwrap().push(event);
        }
    }

    fn config() -> EventConfig {
        EventConfig {
            on_frames: 3,
            off_seconds: 2.0,
            preroll_seconds: 3.0,
            postroll_seconds: 2.0,
            segment_seconds: 1.0,
            max_event_seconds: 300.0,
            frame_ring_seconds: 35.0,
        }
    }

    fn snapshot() -> RouterSnapshot {
        RouterSnapshot {
            brightness: 0.5,
            blur_var: 100.0,
            cpu_pct: 10.0,
            net_latency_ms: -1.0,
            decision: RoutingDecision::RunLocal,
            decision_reason: vec![],
        }
    }

    #[test]
    fn idle_stays_idle_without_sustained_motion() {
        let finalizer = Arc::new(RecordingFinalizer { events: Mutex::new(vec![]) });
        let ring = Arc::new(SegmentRingBuffer::new(1000.0));
        let mut fsm = EventFsm::new(config(), ring, finalizer);
        let snap = snapshot();
        for i in 0..10 {
            fsm.step(&FrameSignals {
                now: i as f64,
                moved_area: 0.0,
                box_count: 0,
                motion_seen: false,
                router_snapshot: &snap,
                target_fps: 10.0,
            });
        }
        assert_eq!(fsm.state(), FsmState::Idle);
    }

    #[test]
    fn sustained_motion_then_quiet_runs_full_lifecycle_to_finalize() {
        let finalizer = Arc::new(RecordingFinalizer { events: Mutex::new(vec![]) });
        let ring = Arc::new(SegmentRingBuffer::new(1000.0));
        let mut fsm = EventFsm::new(config(), ring, finalizer.clone());
        let snap = snapshot();

        for i in 0..5 {
            fsm.step(&FrameSignals {
                now: i as f64,
                moved_area: 500.0,
                box_count: 1,
                motion_seen: true,
                router_snapshot: &snap,
                target_fps: 10.0,
            });
        }
        assert_eq!(fsm.state(), FsmState::Active);

        for i in 5..20 {
            fsm.step(&FrameSignals {
                now: i as f64,
                moved_area: 0.0,
                box_count: 0,
                motion_seen: false,
                router_snapshot: &snap,
                target_fps: 10.0,
            });
        }

        assert_eq!(fsm.state(), FsmState::Idle);
        assert_eq!(finalizer.events.lock().unwrap().len(), 1);
    }
}
