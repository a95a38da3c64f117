//! Core types and algorithms for the Lumen engine.
//!
//! This crate holds the pieces of the engine that do not touch the GPU API:
//! - Draw-range partitioning for parallel command recording
//! - Render graph (subpass list) description and validation
//! - Common error types and engine-wide constants

pub mod error;
pub mod graph;
pub mod partition;

pub use error::{Error, Result};
pub use graph::{validate_subpasses, SubpassInfo, PRESENT_ATTACHMENT};
pub use partition::{partition_draws, DrawRange};

/// Engine-wide constants
pub mod constants {
    /// Wait forever on a fence.
    pub const FENCE_TIMEOUT_INFINITE: u64 = u64::MAX;
    /// Thread index reserved for the thread driving the frame loop.
    pub const ORCHESTRATOR_THREAD: usize = 0;
    /// Size in bytes of the per-draw push constant block (one column-major `mat4`).
    pub const MODEL_PUSH_CONSTANT_SIZE: u32 = 64;
}
