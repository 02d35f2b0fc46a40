//! Vertex layout and colors for 2D primitives

/// Geometry streams are tightly packed `vec2<f32>` positions
pub const POSITION_STRIDE: wgpu::BufferAddress = std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress;

pub fn position_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: POSITION_STRIDE,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &[wgpu::VertexAttribute {
            offset: 0,
            shader_location: 0,
            format: wgpu::VertexFormat::Float32x2,
        }],
    }
}

/// Colors per primitive stream
pub mod colors {
    pub const BOX: [f32; 4] = [0.15, 0.2, 0.3, 1.0];
    pub const LINE: [f32; 4] = [0.9, 0.3, 0.2, 1.0];
    pub const PARTICLE: [f32; 4] = [0.2, 0.5, 1.0, 1.0];
    pub const BACKGROUND: [f32; 4] = [0.5, 0.5, 0.5, 0.9];
}
