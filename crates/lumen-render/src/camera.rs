//! Camera and view management.

use glam::{Mat4, Vec3};

/// Perspective camera.
#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    pub direction: Vec3,
    pub up: Vec3,
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            direction: Vec3::NEG_Z,
            up: Vec3::Y,
            fov: std::f32::consts::FRAC_PI_4,
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 500.0,
        }
    }
}

impl Camera {
    /// Camera at `position` looking at `target`.
    pub fn looking_at(position: Vec3, target: Vec3, aspect: f32) -> Self {
        Self {
            position,
            direction: (target - position).normalize(),
            aspect,
            ..Self::default()
        }
    }

    /// Look at a target position.
    pub fn look_at(&mut self, target: Vec3) {
        self.direction = (target - self.position).normalize();
    }

    /// Place the camera on a circle of `radius` around `target` at `height`,
    /// `angle` radians around the Y axis, facing the target.
    pub fn orbit(&mut self, target: Vec3, radius: f32, height: f32, angle: f32) {
        self.position = target + Vec3::new(radius * angle.cos(), height, radius * angle.sin());
        self.look_at(target);
    }

    /// Set the aspect ratio from a framebuffer size.
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        if height > 0 {
            self.aspect = width as f32 / height as f32;
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.direction, self.up)
    }

    /// Right-handed perspective with Vulkan's downward Y and `[0, 1]` depth.
    pub fn projection_matrix(&self) -> Mat4 {
        let mut projection = Mat4::perspective_rh(self.fov, self.aspect, self.near, self.far);
        projection.y_axis.y *= -1.0;
        projection
    }

    /// Get the view-projection matrix.
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::Vec4;

    #[test]
    fn looking_at_normalizes_direction() {
        let camera = Camera::looking_at(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, 1.0);
        assert_relative_eq!(camera.direction.length(), 1.0, epsilon = 1e-6);
        assert_relative_eq!(camera.direction.z, -1.0, epsilon = 1e-6);
    }

    #[test]
    fn orbit_keeps_radius_and_faces_target() {
        let mut camera = Camera::default();
        let target = Vec3::new(1.0, 0.0, -2.0);
        camera.orbit(target, 8.0, 3.0, 1.2);

        let offset = camera.position - target;
        assert_relative_eq!(Vec3::new(offset.x, 0.0, offset.z).length(), 8.0, epsilon = 1e-5);
        assert_relative_eq!(offset.y, 3.0, epsilon = 1e-6);
        assert_relative_eq!(camera.direction.dot(-offset.normalize()), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn target_projects_to_center() {
        let camera = Camera::looking_at(Vec3::new(3.0, 4.0, 5.0), Vec3::ZERO, 1.5);
        let clip = camera.view_projection_matrix() * Vec4::new(0.0, 0.0, 0.0, 1.0);
        let ndc = clip / clip.w;

        assert_relative_eq!(ndc.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(ndc.y, 0.0, epsilon = 1e-5);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }

    #[test]
    fn projection_flips_y() {
        let camera = Camera::default();
        let above = camera.projection_matrix() * Vec4::new(0.0, 1.0, -5.0, 1.0);
        assert!(above.y < 0.0);
    }

    #[test]
    fn viewport_sets_aspect() {
        let mut camera = Camera::default();
        camera.set_viewport(800, 400);
        assert_relative_eq!(camera.aspect, 2.0);
        camera.set_viewport(800, 0);
        assert_relative_eq!(camera.aspect, 2.0);
    }
}
