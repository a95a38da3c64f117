//! `LumenApp` trait definition.

use glam::Vec3;
use lumen_render::{Camera, Scene};
use winit::event::{DeviceEvent, DeviceId, WindowEvent};

use crate::context::AppContext;

/// Trait for Lumen applications.
///
/// The framework owns the window, GPU context and renderer, and drives the
/// frame loop. An application supplies the scene to draw and the camera to
/// draw it from.
pub trait LumenApp: Sized {
    /// Initialize the application.
    ///
    /// Called once after the window, GPU context and renderer exist. Upload
    /// meshes and create materials through `ctx.renderer` here.
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self>;

    /// Update application state.
    ///
    /// # Arguments
    /// * `ctx` - Application context
    /// * `dt` - Delta time in seconds since last frame
    fn update(&mut self, ctx: &AppContext, dt: f32);

    /// Drawables for the current frame.
    fn scene(&self) -> &Scene;

    /// Camera for the current frame.
    fn camera(&self) -> &Camera;

    /// Direction towards the light, in world space.
    fn light_direction(&self) -> Vec3 {
        Vec3::new(0.4, 1.0, 0.3)
    }

    /// Handle window events.
    ///
    /// Return `true` if the event was handled and should not be processed
    /// further.
    #[allow(unused_variables)]
    fn on_event(&mut self, event: &WindowEvent) -> bool {
        false
    }

    /// Handle raw device events.
    #[allow(unused_variables)]
    fn on_device_event(&mut self, device_id: DeviceId, event: &DeviceEvent) {}

    /// Cleanup before shutdown. The GPU is idle when this is called.
    #[allow(unused_variables)]
    fn cleanup(&mut self, ctx: &mut AppContext) {}
}
