//! Application framework for the Lumen engine.
//!
//! This crate handles the boilerplate around the renderer:
//! - Window creation and event loop handling
//! - GPU context, swapchain and renderer initialization
//! - The per-frame loop: update, then acquire, wait, reset, record, submit
//!   and present through [`lumen_render::Renderer`]
//! - Logging setup and orderly shutdown
//!
//! # Example
//!
//! ```no_run
//! use lumen_app::{run_app, AppConfig, AppContext, Camera, LumenApp, Scene};
//!
//! struct Empty {
//!     scene: Scene,
//!     camera: Camera,
//! }
//!
//! impl LumenApp for Empty {
//!     fn init(_ctx: &mut AppContext) -> anyhow::Result<Self> {
//!         Ok(Self { scene: Scene::new(), camera: Camera::default() })
//!     }
//!
//!     fn update(&mut self, _ctx: &AppContext, _dt: f32) {}
//!
//!     fn scene(&self) -> &Scene {
//!         &self.scene
//!     }
//!
//!     fn camera(&self) -> &Camera {
//!         &self.camera
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     run_app::<Empty>(AppConfig::default())
//! }
//! ```

mod app;
mod context;
mod runner;

pub use app::LumenApp;
pub use context::AppContext;
pub use runner::{init_logging, run_app, AppConfig};

// Re-export commonly used types for convenience
pub use lumen_gpu::{GpuContext, GpuContextBuilder};
pub use lumen_render::{Camera, RendererConfig, Scene};
pub use winit::event::{DeviceEvent, DeviceId, WindowEvent};
