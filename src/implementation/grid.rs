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

//! This module provides the 1-d uniform lattice underlying every dimension of
//! the solver's state space. A `Range` maps indices to lattice values and
//! continuous values back to indices with two distinct rounding policies.

use std::fmt;

use crate::common::Unit;

/// A 1-d uniform grid `begin, begin+step, ..., end`. The end is always snapped
/// onto the lattice, i.e. `end = begin + floor((end-begin)/step)*step`, and
/// `begin <= end` holds at all times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    begin: Unit,
    step: Unit,
    end: Unit,
}

impl Range {
    /// Creates a new range. The given end is snapped down onto the lattice.
    ///
    /// # Panics
    /// When `step <= 0` or `end < begin`.
    pub fn new(begin: Unit, step: Unit, end: Unit) -> Self {
        assert!(step > 0, "step must be greater than 0");
        assert!(end >= begin, "end must be at least as great as begin");
        Range {
            begin,
            step,
            end: begin + (end - begin) / step * step,
        }
    }

    pub fn begin(&self) -> Unit {
        self.begin
    }
    pub fn step(&self) -> Unit {
        self.step
    }
    pub fn end(&self) -> Unit {
        self.end
    }

    /// The number of lattice points of this range.
    pub fn len(&self) -> usize {
        ((self.end - self.begin) / self.step) as usize + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// The lattice value at the given index.
    ///
    /// # Panics
    /// When `i >= len()`.
    pub fn value(&self, i: usize) -> Unit {
        let value = self.begin + self.step * i as Unit;
        assert!(value <= self.end, "index {i} is out of range");
        value
    }

    /// Maps a continuous value onto the index of the lattice point reached by
    /// rounding *away from zero* (ceil for positive values, floor otherwise).
    /// This is the rounding used when propagating the dynamics: a predicted
    /// successor is conservatively placed farther from the origin rather than
    /// optimistically snapped toward the goal. An exact zero takes the floor
    /// branch and lands on the index of zero itself.
    ///
    /// Returns -1 when the value lies outside `[begin, end]`.
    pub fn search_away_from_zero(&self, value: f32) -> i32 {
        if value < self.begin as f32 || value > self.end as f32 {
            return -1;
        }
        let offset = (value - self.begin as f32) / self.step as f32;
        if value > 0.0 {
            offset.ceil() as i32
        } else {
            offset.floor() as i32
        }
    }

    /// Maps a continuous value onto the index of the nearest lattice point.
    /// This is the unbiased rounding used when projecting obstacle points into
    /// lattice coordinates.
    ///
    /// Returns -1 when the value lies outside `[begin, end]`.
    pub fn search_closest(&self, value: f32) -> i32 {
        if value < self.begin as f32 || value > self.end as f32 {
            return -1;
        }
        ((value - self.begin as f32) / self.step as f32).round() as i32
    }
}

impl Default for Range {
    fn default() -> Self {
        Range::new(0, 1, 1)
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Range({}:{}:{})", self.begin, self.step, self.end)
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################
