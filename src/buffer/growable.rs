//! Grow-only backing store reused across frames
//!
//! Capacity is demand-driven: `ensure_capacity(n)` allocates exactly `n`
//! elements when the current backing store is smaller, and never shrinks.
//! Views borrow the buffer, so a reallocation can't leave one dangling.

use bytemuck::Pod;

use crate::error::BufferError;

#[derive(Debug)]
pub struct GrowableBuffer<T> {
    data: Box<[T]>,
    len: usize,
    reallocations: usize,
}

impl<T: Pod> Default for GrowableBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Pod> GrowableBuffer<T> {
    pub fn new() -> Self {
        Self {
            data: Vec::new().into_boxed_slice(),
            len: 0,
            reallocations: 0,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let mut buffer = Self::new();
        buffer.ensure_capacity(capacity);
        buffer
    }

    /// Physical capacity in elements
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Logical length in elements
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of times the backing store has been replaced
    pub fn reallocations(&self) -> usize {
        self.reallocations
    }

    /// Address of the backing store, for identity checks
    pub fn backing_ptr(&self) -> *const T {
        self.data.as_ptr()
    }

    /// Guarantee that views up to `capacity` elements won't reallocate.
    ///
    /// Returns `true` if the backing store was replaced. Logical contents are
    /// carried over into the new allocation.
    pub fn ensure_capacity(&mut self, capacity: usize) -> bool {
        if self.data.len() >= capacity {
            return false;
        }
        let mut grown = vec![T::zeroed(); capacity].into_boxed_slice();
        grown[..self.len].copy_from_slice(&self.data[..self.len]);
        self.data = grown;
        self.reallocations += 1;
        log::debug!(
            "growable buffer reallocated to {} elements ({} total)",
            capacity,
            self.reallocations
        );
        true
    }

    /// Window of exactly `len` elements over the backing store
    pub fn view(&self, len: usize) -> Result<&[T], BufferError> {
        self.check(len)?;
        Ok(&self.data[..len])
    }

    pub fn view_mut(&mut self, len: usize) -> Result<&mut [T], BufferError> {
        self.check(len)?;
        Ok(&mut self.data[..len])
    }

    /// The logically filled prefix
    pub fn as_slice(&self) -> &[T] {
        &self.data[..self.len]
    }

    /// Append, growing to exactly the required size if needed
    pub fn extend_from_slice(&mut self, values: &[T]) {
        self.ensure_capacity(self.len + values.len());
        self.data[self.len..self.len + values.len()].copy_from_slice(values);
        self.len += values.len();
    }

    /// Append without ever reallocating
    pub fn extend_within_capacity(&mut self, values: &[T]) -> Result<(), BufferError> {
        let end = self.len + values.len();
        self.check(end)?;
        self.data[self.len..end].copy_from_slice(values);
        self.len = end;
        Ok(())
    }

    /// Set the logical length without touching capacity
    pub fn set_len(&mut self, len: usize) -> Result<(), BufferError> {
        self.check(len)?;
        self.len = len;
        Ok(())
    }

    /// Reset the logical length to 0, keeping the allocation
    pub fn clear(&mut self) {
        self.len = 0;
    }

    fn check(&self, requested: usize) -> Result<(), BufferError> {
        if requested > self.data.len() {
            return Err(BufferError::InvariantViolation {
                requested,
                capacity: self.data.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_new_buffer_is_empty() {
        let buffer = GrowableBuffer::<f32>::new();
        assert_eq!(buffer.capacity(), 0);
        assert!(buffer.is_empty());
        assert_eq!(buffer.view(0).unwrap().len(), 0);
    }

    #[test]
    fn test_ensure_capacity_allocates_exact_size() {
        let mut buffer = GrowableBuffer::<f32>::new();
        assert!(buffer.ensure_capacity(13));
        assert_eq!(buffer.capacity(), 13);
        assert!(!buffer.ensure_capacity(5));
        assert_eq!(buffer.capacity(), 13);
    }

    #[test]
    fn test_view_past_capacity_is_invariant_violation() {
        let mut buffer = GrowableBuffer::<u32>::new();
        buffer.ensure_capacity(4);
        assert_eq!(
            buffer.view(5),
            Err(BufferError::InvariantViolation {
                requested: 5,
                capacity: 4
            })
        );
    }

    #[test]
    fn test_growth_preserves_contents() {
        let mut buffer = GrowableBuffer::<u32>::new();
        buffer.extend_from_slice(&[1, 2, 3]);
        buffer.ensure_capacity(10);
        assert_eq!(buffer.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn test_clear_keeps_allocation() {
        let mut buffer = GrowableBuffer::<f32>::new();
        buffer.extend_from_slice(&[1.0; 64]);
        let ptr = buffer.backing_ptr();
        let reallocations = buffer.reallocations();

        buffer.clear();
        assert_eq!(buffer.len(), 0);
        assert_eq!(buffer.capacity(), 64);

        buffer.extend_from_slice(&[2.0; 64]);
        assert_eq!(buffer.backing_ptr(), ptr);
        assert_eq!(buffer.reallocations(), reallocations);
    }

    #[test]
    fn test_extend_within_capacity_never_grows() {
        let mut buffer = GrowableBuffer::<u32>::with_capacity(2);
        buffer.extend_within_capacity(&[7, 8]).unwrap();
        assert!(buffer.extend_within_capacity(&[9]).is_err());
        assert_eq!(buffer.as_slice(), &[7, 8]);
    }

    proptest! {
        #[test]
        fn prop_non_decreasing_requests_reallocate_once_per_increase(
            mut sizes in proptest::collection::vec(0usize..512, 1..40)
        ) {
            sizes.sort_unstable();
            let mut buffer = GrowableBuffer::<f32>::new();
            let mut expected = 0;
            let mut high = 0;
            for size in sizes {
                let before = buffer.backing_ptr();
                let grew = buffer.ensure_capacity(size);
                if size > high {
                    expected += 1;
                    high = size;
                    prop_assert!(grew);
                } else {
                    prop_assert!(!grew);
                    prop_assert_eq!(buffer.backing_ptr(), before);
                }
            }
            prop_assert_eq!(buffer.reallocations(), expected);
        }

        #[test]
        fn prop_view_has_exact_length(capacity in 0usize..1024, frac in 0.0f64..=1.0) {
            let mut buffer = GrowableBuffer::<f32>::new();
            buffer.ensure_capacity(capacity);
            let len = (capacity as f64 * frac) as usize;
            prop_assert_eq!(buffer.view(len).unwrap().len(), len);
        }
    }
}
