//! Rolling quality/compute/network signal sampling and routing decisions.

pub mod decision;
pub mod signals;

pub use decision::Router;
pub use signals::{CpuSampler, NetworkProbe, RollingAverage};
