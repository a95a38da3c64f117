//! Cube grid layout.

use glam::{Mat4, Quat, Vec3};

/// Distance between neighbouring cube centres.
pub const SPACING: f32 = 2.5;

/// Base colours of the material palette.
pub const PALETTE: [[f32; 4]; 6] = [
    [0.85, 0.25, 0.20, 1.0],
    [0.95, 0.65, 0.15, 1.0],
    [0.30, 0.75, 0.35, 1.0],
    [0.20, 0.55, 0.90, 1.0],
    [0.55, 0.35, 0.85, 1.0],
    [0.80, 0.80, 0.80, 1.0],
];

/// One cube of the grid.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Cell {
    /// Position on the ground plane, centred on the origin.
    pub position: Vec3,
    /// Phase offset of the cube's animation.
    pub phase: f32,
    /// Palette index.
    pub material: usize,
}

impl Cell {
    /// Model transform at time `t` seconds.
    pub fn transform(&self, t: f32) -> Mat4 {
        let angle = t * 0.8 + self.phase;
        let lift = (t * 1.5 + self.phase).sin() * 0.35;
        Mat4::from_rotation_translation(
            Quat::from_rotation_y(angle),
            self.position + Vec3::Y * lift,
        )
    }
}

/// Lay out `side * side` cubes centred on the origin, in row-major order.
pub fn layout(side: u32, materials: usize) -> Vec<Cell> {
    let offset = (side as f32 - 1.0) * 0.5;
    let mut cells = Vec::with_capacity((side * side) as usize);

    for z in 0..side {
        for x in 0..side {
            cells.push(Cell {
                position: Vec3::new(
                    (x as f32 - offset) * SPACING,
                    0.0,
                    (z as f32 - offset) * SPACING,
                ),
                phase: (x + z) as f32 * 0.35,
                material: if materials == 0 { 0 } else { (x + 2 * z) as usize % materials },
            });
        }
    }

    cells
}

/// Orbit radius that keeps a grid of `side` cubes in view.
pub fn orbit_radius(side: u32) -> f32 {
    (side as f32 * SPACING).max(6.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_is_centred() {
        let cells = layout(3, PALETTE.len());
        assert_eq!(cells.len(), 9);
        assert_eq!(cells[4].position, Vec3::ZERO);
        assert_eq!(cells[0].position, Vec3::new(-SPACING, 0.0, -SPACING));
        assert_eq!(cells[8].position, Vec3::new(SPACING, 0.0, SPACING));
    }

    #[test]
    fn materials_stay_in_palette() {
        let cells = layout(7, 4);
        assert!(cells.iter().all(|c| c.material < 4));
        assert!((0..4).all(|m| cells.iter().any(|c| c.material == m)));
    }

    #[test]
    fn transform_places_cube() {
        let cell = Cell {
            position: Vec3::new(1.0, 0.0, 2.0),
            phase: 0.0,
            material: 0,
        };
        let origin = cell.transform(0.0).transform_point3(Vec3::ZERO);
        assert_eq!(origin, Vec3::new(1.0, 0.0, 2.0));
    }

    #[test]
    fn single_cube_grid() {
        let cells = layout(1, 1);
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].position, Vec3::ZERO);
    }
}
