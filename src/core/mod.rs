//! Core data types and ring buffers shared across the pipeline.

pub mod event;
pub mod frame_ring;
pub mod segment_ring;
pub mod shared_state;

pub use event::{Event, MotionStats, RouterSnapshot, RoutingDecision};
pub use frame_ring::{FrameRingEntry, FrameRingQueue};
pub use segment_ring::SegmentRingBuffer;
pub use shared_state::{LiveSnapshot, SharedState};
