//! Frame-reused geometry storage

pub mod growable;
pub mod quad;

pub use growable::GrowableBuffer;
pub use quad::{FLOATS_PER_QUAD, INDICES_PER_QUAD, QuadBuffer, QuadIndexBuffer, quad_indices};
