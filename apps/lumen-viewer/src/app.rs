//! Viewer application: an animated grid of cubes under an orbiting camera.

use glam::Vec3;
use tracing::info;
use winit::event::ElementState;
use winit::keyboard::{KeyCode, PhysicalKey};

use lumen_app::{AppContext, Camera, LumenApp, Scene, WindowEvent};
use lumen_render::{MaterialUniforms, MeshData};

use crate::args::ViewerArgs;
use crate::grid::{self, Cell, PALETTE};

/// Camera orbit speed in radians per second.
const ORBIT_SPEED: f32 = 0.25;

/// Viewer application state.
pub struct Viewer {
    scene: Scene,
    camera: Camera,
    cells: Vec<Cell>,
    orbit_radius: f32,
    /// Animation clock in seconds.
    time: f32,
    paused: bool,
}

impl LumenApp for Viewer {
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self> {
        let args = ViewerArgs::from_env()?;

        let cube = ctx.renderer.upload_mesh(&ctx.gpu, &MeshData::cube(1.0))?;

        let mut materials = Vec::with_capacity(PALETTE.len());
        for (i, color) in PALETTE.iter().enumerate() {
            let roughness = 0.3 + 0.1 * i as f32;
            // SAFETY: the GPU context outlives the renderer and its materials.
            let material = unsafe {
                ctx.renderer
                    .create_material(&ctx.gpu, &MaterialUniforms::new(*color, roughness, 0.0))?
            };
            materials.push(material);
        }

        let cells = grid::layout(args.grid, materials.len());
        let mut scene = Scene::new();
        for cell in &cells {
            scene.push(cube.drawable(cell.transform(0.0), materials[cell.material]));
        }

        let orbit_radius = grid::orbit_radius(args.grid);
        let mut camera = Camera::default();
        camera.far = orbit_radius * 4.0;
        camera.set_viewport(ctx.extent().width, ctx.extent().height);
        camera.orbit(Vec3::ZERO, orbit_radius, orbit_radius * 0.5, 0.0);

        info!(
            technique = %ctx.renderer.technique().name,
            drawables = scene.len(),
            materials = ctx.renderer.material_count(),
            "Viewer initialized"
        );
        info!("Press Space to pause the animation");

        Ok(Self {
            scene,
            camera,
            cells,
            orbit_radius,
            time: 0.0,
            paused: false,
        })
    }

    fn update(&mut self, ctx: &AppContext, dt: f32) {
        if !self.paused {
            self.time += dt;
        }

        for (drawable, cell) in self.scene.drawables_mut().iter_mut().zip(&self.cells) {
            drawable.transform = cell.transform(self.time);
        }

        self.camera
            .set_viewport(ctx.extent().width, ctx.extent().height);
        self.camera.orbit(
            Vec3::ZERO,
            self.orbit_radius,
            self.orbit_radius * 0.5,
            self.time * ORBIT_SPEED,
        );
    }

    fn scene(&self) -> &Scene {
        &self.scene
    }

    fn camera(&self) -> &Camera {
        &self.camera
    }

    fn on_event(&mut self, event: &WindowEvent) -> bool {
        if let WindowEvent::KeyboardInput { event, .. } = event {
            if event.state == ElementState::Pressed
                && !event.repeat
                && event.physical_key == PhysicalKey::Code(KeyCode::Space)
            {
                self.paused = !self.paused;
                info!(paused = self.paused, "Animation toggled");
                return true;
            }
        }
        false
    }

    fn cleanup(&mut self, _ctx: &mut AppContext) {
        info!(elapsed = self.time, "Viewer shutting down");
    }
}
