//! Mesh module - Polygonal mesh connectivity, chunking and geometry.
//!
//! The mesh owns point positions (current, start-of-cycle and predicted) and
//! every geometric quantity derived from them. The hydro core reads and writes
//! positions through it and asks it to recompute geometry chunk by chunk.

mod geometry;
mod poly;

pub use geometry::*;
pub use poly::*;

use std::fmt;
use std::ops::Range;

/// 2-D vector used for positions, velocities and forces.
pub type Vec2 = nalgebra::Vector2<f64>;

/// Rotate a vector 90 degrees counter-clockwise.
#[inline]
pub fn rotate_ccw(v: Vec2) -> Vec2 {
    Vec2::new(-v.y, v.x)
}

/// 2-D cross product (z component).
#[inline]
pub fn cross(a: Vec2, b: Vec2) -> f64 {
    a.x * b.y - a.y * b.x
}

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $tag:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u32);

        impl $name {
            #[inline]
            pub fn new(index: usize) -> Self {
                debug_assert!(index <= u32::MAX as usize, "{} index {index} exceeds u32", $tag);
                Self(index as u32)
            }

            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", $tag, self.0)
            }
        }
    };
}

entity_id!(
    /// Handle of a zone (polygonal cell).
    ZoneId,
    "z"
);
entity_id!(
    /// Handle of a side; also names the corner at the side's first point.
    SideId,
    "s"
);
entity_id!(
    /// Handle of a mesh point.
    PointId,
    "p"
);

/// A contiguous run of zones together with the sides they own.
///
/// Sides are stored zone by zone, so a zone range maps to one side range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub zones: Range<usize>,
    pub sides: Range<usize>,
}

/// Split the front `n` elements off a mutable slice, leaving the rest in place.
#[inline]
pub(crate) fn take_front<'a, T>(rest: &mut &'a mut [T], n: usize) -> &'a mut [T] {
    let (head, tail) = std::mem::take(rest).split_at_mut(n);
    *rest = tail;
    head
}

/// Split a slice into one mutable piece per range; ranges must tile the slice in order.
pub(crate) fn split_ranges_mut<'a, T>(data: &'a mut [T], ranges: &[Range<usize>]) -> Vec<&'a mut [T]> {
    let mut rest = data;
    ranges.iter().map(|r| take_front(&mut rest, r.len())).collect()
}
