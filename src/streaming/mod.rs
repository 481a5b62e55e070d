//! Threaded HTTP surface: live MJPEG/state, and read-only package browsing.

pub mod events;
pub mod handlers;
pub mod server;

pub use server::{ServerState, StreamServer};
