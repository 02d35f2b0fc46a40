//! Per-frame draw buffer
//!
//! Filled by the simulation's debug-draw pass, read once by the renderer,
//! then flushed. Flushing only resets logical lengths, so after the first
//! few frames appends stop allocating.

use glam::Vec2;

use crate::buffer::{GrowableBuffer, QuadBuffer, QuadIndexBuffer};
use crate::sim::DebugDraw;

#[derive(Debug, Default)]
pub struct Circles {
    pub centres: GrowableBuffer<f32>,
}

#[derive(Debug, Default)]
pub struct DrawBuffer {
    pub boxes: QuadBuffer,
    pub line_vertices: GrowableBuffer<f32>,
    pub circles: Circles,
}

/// Read-only views of one frame's geometry, valid until the next flush
#[derive(Debug, Clone, Copy)]
pub struct FrameGeometry<'a> {
    /// 8 floats per quad
    pub boxes: &'a [f32],
    /// 6 indices per quad
    pub box_indices: &'a [u32],
    /// 2 floats per vertex, 2 vertices per segment
    pub line_vertices: &'a [f32],
    /// 2 floats per point
    pub circle_centres: &'a [f32],
}

impl FrameGeometry<'_> {
    pub fn quad_count(&self) -> usize {
        self.boxes.len() / crate::buffer::FLOATS_PER_QUAD
    }

    pub fn line_vertex_count(&self) -> usize {
        self.line_vertices.len() / 2
    }

    pub fn circle_count(&self) -> usize {
        self.circle_centres.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty() && self.line_vertices.is_empty() && self.circle_centres.is_empty()
    }
}

impl DrawBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_box(&mut self, corners: [Vec2; 4]) {
        self.boxes.push(corners.map(|c| c.to_array()));
    }

    pub fn append_line_segment(&mut self, from: Vec2, to: Vec2) {
        self.line_vertices
            .extend_from_slice(&[from.x, from.y, to.x, to.y]);
    }

    pub fn append_circle_centre(&mut self, centre: Vec2) {
        self.circles.centres.extend_from_slice(&[centre.x, centre.y]);
    }

    pub fn append_circle_centres(&mut self, centres: &[Vec2]) {
        self.circles
            .centres
            .extend_from_slice(bytemuck::cast_slice(centres));
    }

    /// Make room for this many more primitives in one growth per stream,
    /// so appending past the previous peak doesn't reallocate per call
    pub fn ensure_fits(&mut self, boxes: usize, segments: usize, circles: usize) {
        self.boxes.ensure_capacity(self.boxes.len() + boxes);
        self.line_vertices
            .ensure_capacity(self.line_vertices.len() + 4 * segments);
        self.circles
            .centres
            .ensure_capacity(self.circles.centres.len() + 2 * circles);
    }

    /// Views for the renderer. `indices` must already hold this frame's
    /// triangulation (see `QuadIndexBuffer::fill`).
    pub fn geometry<'a>(&'a self, indices: &'a QuadIndexBuffer) -> FrameGeometry<'a> {
        FrameGeometry {
            boxes: self.boxes.as_slice(),
            box_indices: indices.view(),
            line_vertices: self.line_vertices.as_slice(),
            circle_centres: self.circles.centres.as_slice(),
        }
    }

    /// Reset all logical lengths to 0, keeping every allocation
    pub fn flush(&mut self) {
        self.boxes.clear();
        self.line_vertices.clear();
        self.circles.centres.clear();
    }

    pub fn reallocations(&self) -> usize {
        self.boxes.reallocations()
            + self.line_vertices.reallocations()
            + self.circles.centres.reallocations()
    }
}

impl DebugDraw for DrawBuffer {
    fn draw_box(&mut self, corners: [Vec2; 4]) {
        self.append_box(corners);
    }

    fn draw_segment(&mut self, from: Vec2, to: Vec2) {
        self.append_line_segment(from, to);
    }

    fn draw_circles(&mut self, centres: &[Vec2], _radius: f32) {
        self.append_circle_centres(centres);
    }

    fn reserve(&mut self, boxes: usize, segments: usize, circles: usize) {
        self.ensure_fits(boxes, segments, circles);
    }
}
