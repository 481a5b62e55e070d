//! Event lifecycle state machine: idle -> active -> postroll -> finalize.

pub mod fsm;

pub use fsm::{EventFinalizer, EventFsm, FrameSignals, FsmState};
