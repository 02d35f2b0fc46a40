//! Headless renderer
//!
//! Used by the native binary and tests: it plans draw calls exactly like the
//! GPU renderer and records counts instead of touching a device.

use std::sync::{Arc, Mutex};

use super::{Camera, DrawPlan, FrameRenderer};
use crate::draw::FrameGeometry;
use crate::error::RenderError;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderStats {
    pub frames: u64,
    pub draw_calls: u64,
    pub last_quads: usize,
    pub last_line_vertices: usize,
    pub last_circles: usize,
    pub last_pixels_per_meter: f32,
}

#[derive(Debug)]
pub struct StatsRenderer {
    /// Shared like a canvas: whoever holds the handle may resize it
    size: Arc<Mutex<(u32, u32)>>,
    stats: Arc<Mutex<RenderStats>>,
    /// Log a summary every this many frames (0 disables)
    log_every: u64,
}

impl StatsRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: Arc::new(Mutex::new((width, height))),
            stats: Arc::new(Mutex::new(RenderStats::default())),
            log_every: 0,
        }
    }

    pub fn with_log_every(mut self, frames: u64) -> Self {
        self.log_every = frames;
        self
    }

    /// Drawable size, read at every frame
    pub fn size_handle(&self) -> Arc<Mutex<(u32, u32)>> {
        Arc::clone(&self.size)
    }

    /// Shared view of the counters, readable from any thread
    pub fn stats_handle(&self) -> Arc<Mutex<RenderStats>> {
        Arc::clone(&self.stats)
    }
}

impl FrameRenderer for StatsRenderer {
    fn surface_size(&self) -> (u32, u32) {
        *self.size.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn render(&mut self, camera: &Camera, geometry: FrameGeometry<'_>) -> Result<(), RenderError> {
        let plan = DrawPlan::for_geometry(&geometry);
        let mut stats = match self.stats.lock() {
            Ok(stats) => stats,
            Err(poisoned) => poisoned.into_inner(),
        };
        stats.frames += 1;
        stats.draw_calls += plan.draw_calls() as u64;
        stats.last_quads = geometry.quad_count();
        stats.last_line_vertices = geometry.line_vertex_count();
        stats.last_circles = geometry.circle_count();
        stats.last_pixels_per_meter = camera.pixels_per_meter;

        if self.log_every > 0 && stats.frames % self.log_every == 0 {
            log::info!(
                "frame {}: {} quads, {} line vertices, {} particles, {:.1} px/m",
                stats.frames,
                stats.last_quads,
                stats.last_line_vertices,
                stats.last_circles,
                stats.last_pixels_per_meter
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    #[test]
    fn test_records_counts_and_skips_empty_streams() {
        let mut renderer = StatsRenderer::new(640, 480);
        let stats = renderer.stats_handle();
        let camera = Camera {
            pixels_per_meter: 160.0,
            centre: Vec2::ZERO,
        };
        let points = [0.0, 0.0, 1.0, 1.0, 2.0, 2.0];
        let geometry = FrameGeometry {
            boxes: &[],
            box_indices: &[],
            line_vertices: &[],
            circle_centres: &points,
        };
        renderer.render(&camera, geometry).unwrap();

        let stats = stats.lock().unwrap();
        assert_eq!(stats.frames, 1);
        assert_eq!(stats.draw_calls, 1);
        assert_eq!(stats.last_circles, 3);
        assert_eq!(stats.last_pixels_per_meter, 160.0);
    }
}
