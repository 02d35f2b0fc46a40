//! World to clip-space mapping

use glam::{Mat4, Vec2, Vec3};

use crate::sim::View;

/// Scale shared by demos and the renderer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub pixels_per_meter: f32,
    /// World point drawn at the centre of the surface
    pub centre: Vec2,
}

impl Camera {
    /// Largest scale that keeps the whole view on a `width` x `height` surface
    pub fn fit(view: &View, width: u32, height: u32) -> Self {
        let sx = width.max(1) as f32 / view.extent.x;
        let sy = height.max(1) as f32 / view.extent.y;
        Self {
            pixels_per_meter: sx.min(sy),
            centre: view.centre,
        }
    }

    /// World to clip transform. Simulation y grows downwards (gravity is +y),
    /// clip y grows upwards, so y is flipped.
    pub fn clip_transform(&self, width: u32, height: u32) -> Mat4 {
        let sx = 2.0 * self.pixels_per_meter / width.max(1) as f32;
        let sy = -2.0 * self.pixels_per_meter / height.max(1) as f32;
        Mat4::from_scale(Vec3::new(sx, sy, 1.0))
            * Mat4::from_translation(Vec3::new(-self.centre.x, -self.centre.y, 0.0))
    }

    pub fn world_to_clip(&self, point: Vec2, width: u32, height: u32) -> Vec2 {
        self.clip_transform(width, height)
            .transform_point3(point.extend(0.0))
            .truncate()
    }
}
