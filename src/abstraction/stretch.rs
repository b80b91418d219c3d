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

//! This module defines the seam through which a leg picks the per-axis
//! coarsening of its solver grid.

use crate::common::{State6, Unit3};
use crate::implementation::space::StateSpace;

/// A policy choosing the per-axis stretch factor of one leg: every chosen
/// `factor[i]`-th lattice cell is represented in the solver grid, trading
/// resolution for memory on long legs. Each component must be >= 1.
/// Whatever a policy returns is still validated against the leg geometry and
/// replaced by the identity when it would leave the grid degenerate.
pub trait StretchPolicy {
    fn choose(
        &self,
        state_space: &StateSpace,
        goal_space: &StateSpace,
        x0: &State6,
        phase: &'static str,
    ) -> Unit3;
}
