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

//! This module provides the built-in stretch policy together with the
//! validation every chosen factor goes through before the grid is coarsened.

use tracing::{info, warn};

use crate::abstraction::StretchPolicy;
use crate::common::{State6, Unit3};
use crate::implementation::space::StateSpace;

/// The built-in policy: no coarsening, whatever the leg looks like. A live
/// heuristic can be plugged in through [`StretchPolicy`] without touching the
/// leg driver.
#[derive(Debug, Default, Copy, Clone)]
pub struct IdentityStretch;

impl StretchPolicy for IdentityStretch {
    fn choose(&self, _: &StateSpace, _: &StateSpace, _: &State6, _: &'static str) -> Unit3 {
        Unit3::ONE
    }
}

/// The outcome of validating a stretch factor against a leg geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StretchValidation {
    Valid,
    /// The coarsened grid would leave some dimension with fewer than 7 cells.
    SmallSpace,
    /// Some component exceeds the maximum factor of 10.
    TooBig,
}

/// Checks whether the given factor leaves both the state space and the goal
/// space with workable coarsened grids.
pub fn validate_stretch_factor(
    state_space: &StateSpace,
    goal_space: &StateSpace,
    stretch_factor: Unit3,
) -> StretchValidation {
    let mut result = StretchValidation::Valid;

    for (name, space) in [("state", state_space), ("goal", goal_space)] {
        for i in 0..6 {
            let factor = stretch_factor[i % 3];
            if space.end[i] / factor - space.begin[i] / factor < 6 {
                warn!("the stretch factor would result in a small {name} space (length <= 6) in dimension number {i}. dynamic programming may fail.");
                if result == StretchValidation::Valid {
                    result = StretchValidation::SmallSpace;
                }
            }
        }
    }

    for i in 0..3 {
        if stretch_factor[i] > 10 {
            result = StretchValidation::TooBig;
            info!("the stretch factor is too big: component {i} is {}", stretch_factor[i]);
        }
    }

    result
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################
