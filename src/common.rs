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

//! This module defines the most basic data types that are used throughout all
//! the code of our library: the integer lattice unit, the componentwise 3-d
//! vector of lattice units, the continuous 6-d state of the point-mass drone,
//! and the fixed input/disturbance families of the controller.

use std::fmt;
use std::ops::{Add, Div, DivAssign, Index, IndexMut, Mul, Sub};

/// The scalar type of the grid: all lattice coordinates (positions, velocities,
/// accelerations) are expressed as integer multiples of the step size.
pub type Unit = i32;

/// One tick of the discretized dynamics (in grid time units).
pub const DELTA_TIME: Unit = 1;
/// The resolution of the lattice (in meters per cell).
pub const STEP_SIZE: Unit = 1;
/// The drag coefficient `k` of the dynamics `v' = v + (u + d - k*v) * dt`.
pub const DRAG_COEFFICIENT: f32 = 0.0;
/// The number of simulation sub-ticks per policy stage.
pub const SUB_TICKS_PER_STAGE: i64 = 1;

/// The number of corners of the input cube `{-a, 0, +a}^3`.
pub const NUM_INPUTS: usize = 27;

/// The number of entries of the disturbance family.
pub const NUM_DISTURBANCES: usize = 5;

/// The fixed family of lattice disturbances the adversary may pick from.
/// The first entry is always the null disturbance so that running without an
/// adversary amounts to truncating this table to its first element.
pub const DISTURBANCES: [Unit3; NUM_DISTURBANCES] = [
    Unit3::new(0, 0, 0),
    Unit3::new(1, 0, 0),
    Unit3::new(-1, 0, 0),
    Unit3::new(0, 1, 0),
    Unit3::new(0, -1, 0),
];

/// A triple of lattice units with componentwise arithmetic. This is the type
/// of waypoints, obstacle points, control inputs and disturbances alike.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct Unit3 {
    pub x: Unit,
    pub y: Unit,
    pub z: Unit,
}

impl Unit3 {
    /// The null vector.
    pub const ZERO: Unit3 = Unit3::new(0, 0, 0);
    /// The all-ones vector (the identity stretch factor).
    pub const ONE: Unit3 = Unit3::new(1, 1, 1);

    pub const fn new(x: Unit, y: Unit, z: Unit) -> Self {
        Unit3 { x, y, z }
    }
}

impl Index<usize> for Unit3 {
    type Output = Unit;

    fn index(&self, index: usize) -> &Unit {
        match index {
            0 => &self.x,
            1 => &self.y,
            2 => &self.z,
            _ => panic!("index must be 0, 1, or 2"),
        }
    }
}
impl IndexMut<usize> for Unit3 {
    fn index_mut(&mut self, index: usize) -> &mut Unit {
        match index {
            0 => &mut self.x,
            1 => &mut self.y,
            2 => &mut self.z,
            _ => panic!("index must be 0, 1, or 2"),
        }
    }
}

impl Add for Unit3 {
    type Output = Unit3;
    fn add(self, rhs: Unit3) -> Unit3 {
        Unit3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}
impl Sub for Unit3 {
    type Output = Unit3;
    fn sub(self, rhs: Unit3) -> Unit3 {
        Unit3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}
impl Mul for Unit3 {
    type Output = Unit3;
    fn mul(self, rhs: Unit3) -> Unit3 {
        Unit3::new(self.x * rhs.x, self.y * rhs.y, self.z * rhs.z)
    }
}
impl Div for Unit3 {
    type Output = Unit3;
    fn div(self, rhs: Unit3) -> Unit3 {
        Unit3::new(self.x / rhs.x, self.y / rhs.y, self.z / rhs.z)
    }
}
impl DivAssign for Unit3 {
    fn div_assign(&mut self, rhs: Unit3) {
        self.x /= rhs.x;
        self.y /= rhs.y;
        self.z /= rhs.z;
    }
}

impl fmt::Display for Unit3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}, {}", self.x, self.y, self.z)
    }
}

/// The continuous state of the drone: position in the first three slots,
/// velocity in the last three.
pub type State6 = [f32; 6];

/// Creates the 27 corners of the input cube `{-a, 0, +a}^3` for the given
/// per-axis amplitude. The enumeration order (x outermost, z innermost, each
/// axis sweeping -a, 0, +a) is part of the policy encoding: the optimal input
/// table stores indices into this very ordering.
pub fn input_cube(amplitude: Unit3) -> [Unit3; NUM_INPUTS] {
    let mut dest = [Unit3::ZERO; NUM_INPUTS];
    let mut counter = 0;
    for sx in [-1, 0, 1] {
        for sy in [-1, 0, 1] {
            for sz in [-1, 0, 1] {
                dest[counter] = Unit3::new(
                    sx * amplitude.x,
                    sy * amplitude.y,
                    sz * amplitude.z,
                );
                counter += 1;
            }
        }
    }
    dest
}

/// Returns the index of the disturbance-table entry closest (in euclidean
/// distance) to the given vector.
pub fn nearest_disturbance(value: Unit3) -> usize {
    let mut min = f64::MAX;
    let mut argmin = 0;
    for (i, entry) in DISTURBANCES.iter().enumerate() {
        let dx = (entry.x - value.x) as f64;
        let dy = (entry.y - value.y) as f64;
        let dz = (entry.z - value.z) as f64;
        let distance2 = dx * dx + dy * dy + dz * dz;
        if distance2 < min {
            min = distance2;
            argmin = i;
        }
    }
    argmin
}

/// Dumps the lattice parameters at debug level. Called once at startup.
pub fn debug_parameters() {
    tracing::debug!("parameters: DELTA_TIME = {DELTA_TIME}; STEP_SIZE = {STEP_SIZE}");
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_unit3 {
    use crate::common::*;

    #[test]
    fn componentwise_arithmetic() {
        let a = Unit3::new(1, 2, 3);
        let b = Unit3::new(4, 5, 6);
        assert_eq!(Unit3::new(5, 7, 9), a + b);
        assert_eq!(Unit3::new(-3, -3, -3), a - b);
        assert_eq!(Unit3::new(4, 10, 18), a * b);
        assert_eq!(Unit3::new(4, 2, 2), b / a);
    }

    #[test]
    fn indexing_yields_the_matching_component() {
        let a = Unit3::new(7, 8, 9);
        assert_eq!(7, a[0]);
        assert_eq!(8, a[1]);
        assert_eq!(9, a[2]);
    }

    #[test]
    #[should_panic]
    fn indexing_beyond_z_panics() {
        let a = Unit3::ZERO;
        let _ = a[3];
    }
}
