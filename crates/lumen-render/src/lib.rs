//! Rendering engine for Lumen.
//!
//! This crate provides:
//! - Render techniques described as data (single pass, depth multi-pass,
//!   deferred, SSAO)
//! - Drawables, meshes, materials and frame uniforms
//! - A fixed worker pool and the parallel draw-recording orchestrator
//! - The [`Renderer`] driving acquire, wait, reset, record, submit and present
//! - Camera and view management

pub mod camera;
pub mod config;
pub mod error;
pub mod recorder;
pub mod renderer;
pub mod scene;
pub mod technique;
pub mod worker_pool;

pub use camera::Camera;
pub use config::RendererConfig;
pub use error::{RenderError, Result};
pub use recorder::{record_frame, RecordingContext, SubpassRecording};
pub use renderer::{
    create_render_pass, create_render_target_and_frames, submit, FrameContext, FrameOutcome,
    MeshHandle, Renderer, MAX_MATERIALS,
};
pub use scene::{Drawable, FrameUniforms, MaterialUniforms, MeshData, Scene, Vertex};
pub use technique::{ClearValue, RenderGraphDesc, SubpassDesc, SubpassDraws, TECHNIQUES};
pub use worker_pool::{CancelToken, WorkerPool};
