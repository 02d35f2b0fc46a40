//! Quad vertex and index buffers
//!
//! A quad is 4 vertices of 2 floats each. The index buffer turns quad `i`
//! into the triangles `{0,1,2}` and `{0,2,3}` offset by `4 * i`, so a single
//! index buffer covers every quad of a frame.

use super::GrowableBuffer;
use crate::error::BufferError;

pub const QUAD_VERTICES: usize = 4;
pub const FLOATS_PER_VERTEX: usize = 2;
pub const FLOATS_PER_QUAD: usize = QUAD_VERTICES * FLOATS_PER_VERTEX;
pub const INDICES_PER_QUAD: usize = 6;

/// Indices for quad `quad_index`, in draw order
#[inline]
pub fn quad_indices(quad_index: u32) -> [u32; INDICES_PER_QUAD] {
    let b = quad_index * QUAD_VERTICES as u32;
    [b, b + 1, b + 2, b, b + 2, b + 3]
}

/// Growable buffer addressed in quads rather than floats
#[derive(Debug, Default)]
pub struct QuadBuffer {
    floats: GrowableBuffer<f32>,
}

impl QuadBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of quads currently stored
    pub fn len(&self) -> usize {
        self.floats.len() / FLOATS_PER_QUAD
    }

    pub fn is_empty(&self) -> bool {
        self.floats.is_empty()
    }

    /// Capacity in quads
    pub fn capacity(&self) -> usize {
        self.floats.capacity() / FLOATS_PER_QUAD
    }

    pub fn ensure_capacity(&mut self, quads: usize) -> bool {
        self.floats.ensure_capacity(quads * FLOATS_PER_QUAD)
    }

    /// Flat float view covering exactly `quads` quads
    pub fn view(&self, quads: usize) -> Result<&[f32], BufferError> {
        self.floats.view(quads * FLOATS_PER_QUAD)
    }

    /// All stored quads as flat floats
    pub fn as_slice(&self) -> &[f32] {
        self.floats.as_slice()
    }

    pub fn push(&mut self, corners: [[f32; 2]; QUAD_VERTICES]) {
        self.floats.extend_from_slice(corners.as_flattened());
    }

    pub fn clear(&mut self) {
        self.floats.clear();
    }

    pub fn reallocations(&self) -> usize {
        self.floats.reallocations()
    }

    pub fn backing_ptr(&self) -> *const f32 {
        self.floats.backing_ptr()
    }
}

/// Index buffer holding six indices per quad
#[derive(Debug, Default)]
pub struct QuadIndexBuffer {
    indices: GrowableBuffer<u32>,
}

impl QuadIndexBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of quads whose indices are stored
    pub fn quads(&self) -> usize {
        self.indices.len() / INDICES_PER_QUAD
    }

    /// Number of index values stored
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn ensure_fits(&mut self, quads: usize) -> bool {
        self.indices.ensure_capacity(quads * INDICES_PER_QUAD)
    }

    /// Append the indices of the next quad. Never reallocates; call
    /// `ensure_fits` for the frame's quad count first.
    pub fn emplace_without_realloc(&mut self) -> Result<(), BufferError> {
        let next = self.quads() as u32;
        self.indices.extend_within_capacity(&quad_indices(next))
    }

    /// Triangulate `quads` quads, replacing whatever was stored
    pub fn fill(&mut self, quads: usize) -> Result<(), BufferError> {
        self.reset();
        self.ensure_fits(quads);
        for _ in 0..quads {
            self.emplace_without_realloc()?;
        }
        Ok(())
    }

    pub fn view(&self) -> &[u32] {
        self.indices.as_slice()
    }

    /// Back to logical length 0 after a flush
    pub fn reset(&mut self) {
        self.indices.clear();
    }

    pub fn reallocations(&self) -> usize {
        self.indices.reallocations()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_first_three_quads() {
        let mut indices = QuadIndexBuffer::new();
        indices.fill(3).unwrap();
        assert_eq!(
            indices.view(),
            &[0, 1, 2, 0, 2, 3, 4, 5, 6, 4, 6, 7, 8, 9, 10, 8, 10, 11]
        );
    }

    #[test]
    fn test_emplace_requires_room() {
        let mut indices = QuadIndexBuffer::new();
        indices.ensure_fits(1);
        indices.emplace_without_realloc().unwrap();
        assert!(matches!(
            indices.emplace_without_realloc(),
            Err(BufferError::InvariantViolation { requested: 12, capacity: 6 })
        ));
    }

    #[test]
    fn test_reset_then_refill_reuses_allocation() {
        let mut indices = QuadIndexBuffer::new();
        indices.fill(100).unwrap();
        indices.reset();
        assert_eq!(indices.len(), 0);
        indices.fill(100).unwrap();
        assert_eq!(indices.reallocations(), 1);
    }

    #[test]
    fn test_quad_buffer_counts_in_quads() {
        let mut quads = QuadBuffer::new();
        quads.ensure_capacity(2);
        assert_eq!(quads.capacity(), 2);
        assert_eq!(quads.view(2).unwrap().len(), 16);

        quads.push([[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]);
        assert_eq!(quads.len(), 1);
        assert_eq!(&quads.as_slice()[..4], &[0.0, 0.0, 1.0, 0.0]);
    }

    proptest! {
        #[test]
        fn prop_quad_indices_formula(i in 0u32..100_000) {
            let b = 4 * i;
            prop_assert_eq!(quad_indices(i), [b, b + 1, b + 2, b, b + 2, b + 3]);
        }
    }
}
