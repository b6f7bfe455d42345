// SPDX-License-Identifier: GPL-3.0-only

//! Double-buffered pixel plane storage
//!
//! Two fixed-size planes plus an atomic front index. The producer writes the
//! back plane, the consumer reads the front plane, and [`DoubleBuffer::swap`]
//! exchanges the two roles in O(1) without copying data. The swap is the only
//! synchronization point on the pixel hot path: each plane sits behind its
//! own mutex, and because producer and consumer address opposite indices the
//! locks are uncontended except across a swap boundary.
//!
//! A reader must not keep a plane reference across a swap without copying;
//! the returned guards enforce this by blocking a producer that reaches the
//! plane a straggling reader still holds.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock};

/// Dimensions of an allocated plane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneDims {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
}

impl PlaneDims {
    /// Element count of one plane
    pub fn len(&self) -> usize {
        self.width as usize * self.height as usize * self.channels as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Read access to the front plane, valid until dropped
pub struct FrontGuard<'a, T>(MutexGuard<'a, Vec<T>>);

impl<T> Deref for FrontGuard<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.0.as_slice()
    }
}

/// Write access to the back plane, valid until dropped
pub struct BackGuard<'a, T>(MutexGuard<'a, Vec<T>>);

impl<T> Deref for BackGuard<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.0.as_slice()
    }
}

impl<T> DerefMut for BackGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.0.as_mut_slice()
    }
}

/// Two-slot pixel storage with atomic front/back swap
pub struct DoubleBuffer<T> {
    planes: [Mutex<Vec<T>>; 2],
    front: AtomicUsize,
    dims: OnceLock<PlaneDims>,
}

impl<T: Clone + Default> DoubleBuffer<T> {
    pub fn new() -> Self {
        Self {
            planes: [Mutex::new(Vec::new()), Mutex::new(Vec::new())],
            front: AtomicUsize::new(0),
            dims: OnceLock::new(),
        }
    }

    /// Size both planes for the given dimensions
    ///
    /// Idempotent: once a buffer is allocated, further calls are no-ops even
    /// with different dimensions. Resizing requires tearing the buffer down
    /// and creating a new one. Returns whether this call performed the
    /// allocation.
    pub fn allocate(&self, width: u32, height: u32, channels: u32) -> bool {
        let dims = PlaneDims {
            width,
            height,
            channels,
        };
        if self.dims.set(dims).is_err() {
            return false;
        }
        for plane in &self.planes {
            plane.lock().unwrap().resize(dims.len(), T::default());
        }
        true
    }

    pub fn is_allocated(&self) -> bool {
        self.dims.get().is_some()
    }

    /// Dimensions fixed by the first successful [`allocate`](Self::allocate)
    pub fn dims(&self) -> Option<PlaneDims> {
        self.dims.get().copied()
    }

    /// Read the front plane; empty until allocated
    pub fn front(&self) -> FrontGuard<'_, T> {
        let index = self.front.load(Ordering::Acquire);
        FrontGuard(self.planes[index].lock().unwrap())
    }

    /// Write the back plane; empty until allocated
    pub fn back(&self) -> BackGuard<'_, T> {
        let index = self.front.load(Ordering::Acquire) ^ 1;
        BackGuard(self.planes[index].lock().unwrap())
    }

    /// Exchange front and back roles in O(1), no data copy
    pub fn swap(&self) {
        self.front.fetch_xor(1, Ordering::AcqRel);
    }
}

impl<T: Clone + Default> Default for DoubleBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_is_idempotent() {
        let buffer: DoubleBuffer<u16> = DoubleBuffer::new();
        assert!(buffer.allocate(4, 2, 1));
        assert!(!buffer.allocate(8, 8, 3), "second allocate must be a no-op");

        let dims = buffer.dims().unwrap();
        assert_eq!((dims.width, dims.height, dims.channels), (4, 2, 1));
        assert_eq!(buffer.front().len(), 8);
    }

    #[test]
    fn test_swap_parity() {
        let buffer: DoubleBuffer<u8> = DoubleBuffer::new();
        buffer.allocate(2, 1, 1);

        for round in 0..5u8 {
            buffer.back().copy_from_slice(&[round, round]);
            buffer.swap();
            assert_eq!(
                &*buffer.front(),
                &[round, round],
                "front must expose the plane written before swap {}",
                round
            );
        }
    }

    #[test]
    fn test_front_and_back_are_distinct_planes() {
        let buffer: DoubleBuffer<u8> = DoubleBuffer::new();
        buffer.allocate(1, 1, 1);

        buffer.back().copy_from_slice(&[7]);
        assert_eq!(&*buffer.front(), &[0], "write must not be visible before swap");
        buffer.swap();
        assert_eq!(&*buffer.front(), &[7]);
    }

    #[test]
    fn test_unallocated_planes_are_empty() {
        let buffer: DoubleBuffer<u16> = DoubleBuffer::new();
        assert!(!buffer.is_allocated());
        assert!(buffer.front().is_empty());
        assert!(buffer.back().is_empty());
    }
}
