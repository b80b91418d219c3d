// Copyright 2020 Xavier Gillard
//
// Permission is hereby granted, free of charge, to any person obtaining a copy of
// this software and associated documentation files (the "Software"), to deal in
// the Software without restriction, including without limitation the rights to
// use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of
// the Software, and to permit persons to whom the Software is furnished to do so,
// subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS
// FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR
// COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER
// IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN
// CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

//! This module provides the 6-d axis-aligned box delimiting the states a leg
//! may visit (its state space) or must reach (its goal space). The first three
//! dimensions are positions, the last three velocities.

use crate::common::{State6, Unit, Unit3};
use crate::implementation::grid::Range;

/// An axis-aligned 6-d box described by six parallel lattices. Kept as plain
/// begin/step/end arrays because leg geometry is assembled and reshaped
/// (offset, extended, stretch-aligned) before any `Range` is ever derived
/// from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateSpace {
    pub begin: [Unit; 6],
    pub step: [Unit; 6],
    pub end: [Unit; 6],
}

impl StateSpace {
    /// The lattice of the given dimension.
    pub fn range(&self, index: usize) -> Range {
        Range::new(self.begin[index], self.step[index], self.end[index])
    }

    /// Shifts the position dimensions so that `point` becomes the origin.
    /// Velocity dimensions are left untouched.
    pub fn offset(&mut self, point: Unit3) {
        for i in 0..3 {
            self.begin[i] -= point[i];
            self.end[i] -= point[i];
        }
    }

    /// True iff each component of `x` lies within its dimension, endpoints
    /// included.
    pub fn contains(&self, x: &State6) -> bool {
        (0..6).all(|i| self.begin[i] as f32 <= x[i] && x[i] <= self.end[i] as f32)
    }

    /// Lattice variant of [`contains`](Self::contains).
    pub fn contains_units(&self, x: &[Unit; 6]) -> bool {
        (0..6).all(|i| self.begin[i] <= x[i] && x[i] <= self.end[i])
    }

    /// Enlarges every dimension by `values[i]` on both sides. Negative values
    /// shrink the box.
    pub fn extend_absolute(&mut self, values: [Unit; 6]) {
        for i in 0..6 {
            self.begin[i] -= values[i];
            self.end[i] += values[i];
        }
    }

    /// Snaps each endpoint away from zero onto a multiple of the stretch
    /// factor of its axis, so that the coarsened lattice still has endpoints
    /// of its own.
    pub fn extend_for_stretching(&mut self, stretch_factor: Unit3) {
        for i in 0..6 {
            let factor = stretch_factor[i % 3];
            let quotient = self.begin[i] / factor;
            if quotient * factor != self.begin[i] {
                self.begin[i] = factor * (quotient + if self.begin[i] < 0 { -1 } else { 1 });
            }
            let quotient = self.end[i] / factor;
            if quotient * factor != self.end[i] {
                self.end[i] = factor * (quotient + if self.end[i] < 0 { -1 } else { 1 });
            }
        }
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_state_space {
    use crate::common::Unit3;
    use crate::implementation::space::StateSpace;

    fn unit_box() -> StateSpace {
        StateSpace {
            begin: [-2, -2, -2, -1, -1, -1],
            step: [1; 6],
            end: [2, 2, 2, 1, 1, 1],
        }
    }

    #[test]
    fn contains_is_inclusive_of_endpoints() {
        let space = unit_box();
        assert!(space.contains(&[2.0, -2.0, 0.0, 1.0, -1.0, 0.0]));
        assert!(!space.contains(&[2.1, 0.0, 0.0, 0.0, 0.0, 0.0]));
        assert!(!space.contains(&[0.0, 0.0, 0.0, 0.0, 0.0, -1.5]));
    }

    #[test]
    fn offset_shifts_positions_only() {
        let mut space = unit_box();
        space.offset(Unit3::new(1, 2, 3));
        assert_eq!([-3, -4, -5, -1, -1, -1], space.begin);
        assert_eq!([1, 0, -1, 1, 1, 1], space.end);
    }

    #[test]
    fn contains_is_monotone_under_non_negative_extension() {
        let mut space = unit_box();
        let inside = [1.0, 1.0, 1.0, 0.5, 0.5, 0.5];
        assert!(space.contains(&inside));
        space.extend_absolute([3, 0, 1, 2, 0, 0]);
        assert!(space.contains(&inside));
        assert!(space.contains(&[-5.0, 0.0, 3.0, -3.0, 0.0, 0.0]));
    }

    #[test]
    fn negative_extension_shrinks_the_box() {
        let mut space = unit_box();
        space.extend_absolute([-1, -1, -1, 0, 0, 0]);
        assert_eq!([-1, -1, -1, -1, -1, -1], space.begin);
        assert!(!space.contains(&[2.0, 0.0, 0.0, 0.0, 0.0, 0.0]));
    }

    #[test]
    fn stretching_snaps_endpoints_away_from_zero() {
        let mut space = StateSpace {
            begin: [-7, -6, 7, -1, 0, 1],
            step: [1; 6],
            end: [7, 6, 9, 1, 0, 2],
        };
        space.extend_for_stretching(Unit3::new(2, 3, 2));
        assert_eq!([-8, -6, 8, -2, 0, 2], space.begin);
        assert_eq!([8, 6, 10, 2, 0, 2], space.end);
    }
}
