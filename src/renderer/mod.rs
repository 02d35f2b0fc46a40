//! Rendering boundary
//!
//! The render loop hands a renderer one `Camera` and the frame's geometry
//! views; the views are only valid until the draw buffer is flushed.
//!
//! - `pipeline`: wgpu renderer for a canvas or offscreen canvas
//! - `stats`: headless renderer that records what it would draw

pub mod camera;
pub mod pipeline;
pub mod stats;
pub mod vertex;

pub use camera::Camera;
pub use pipeline::GeometryRenderer;
pub use stats::{RenderStats, StatsRenderer};

use crate::draw::FrameGeometry;
use crate::error::RenderError;

pub trait FrameRenderer {
    /// Current drawable size in pixels
    fn surface_size(&self) -> (u32, u32);

    fn render(&mut self, camera: &Camera, geometry: FrameGeometry<'_>) -> Result<(), RenderError>;
}

impl<R: FrameRenderer + ?Sized> FrameRenderer for Box<R> {
    fn surface_size(&self) -> (u32, u32) {
        (**self).surface_size()
    }

    fn render(&mut self, camera: &Camera, geometry: FrameGeometry<'_>) -> Result<(), RenderError> {
        (**self).render(camera, geometry)
    }
}

/// Draw calls for one frame. Empty streams get no call at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrawPlan {
    /// Index count for the quad triangle list
    pub quad_indices: Option<u32>,
    /// Vertex count for the line list
    pub line_vertices: Option<u32>,
    /// Vertex count for the point list
    pub points: Option<u32>,
}

impl DrawPlan {
    pub fn for_geometry(geometry: &FrameGeometry<'_>) -> Self {
        let non_zero = |n: usize| (n > 0).then_some(n as u32);
        Self {
            quad_indices: non_zero(geometry.box_indices.len()),
            line_vertices: non_zero(geometry.line_vertex_count()),
            points: non_zero(geometry.circle_count()),
        }
    }

    pub fn draw_calls(&self) -> usize {
        [self.quad_indices, self.line_vertices, self.points]
            .iter()
            .filter(|c| c.is_some())
            .count()
    }
}
