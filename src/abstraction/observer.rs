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

//! This module defines the two observer families of the controller: one
//! watching solver runs (for run statistics), one watching the simulated
//! flight (for logging and plotting). Both are called synchronously; listener
//! sets are fixed once the run starts.

use std::time::Duration;

use crate::common::{State6, Unit3};
use crate::implementation::space::StateSpace;

/// Fired when a solver starts (or restarts) a value-iteration run.
#[derive(Debug, Clone, Copy)]
pub struct SolveStartedEvent {
    /// The number of grid states per stage.
    pub num_states: usize,
    /// True when this run follows an unreachable result on an extended
    /// state space.
    pub retry: bool,
}

/// Fired when a solver finishes a value-iteration run.
#[derive(Debug, Clone, Copy)]
pub struct SolveFinishedEvent {
    pub total_duration: Duration,
    pub first_stage_duration: Duration,
    pub avg_stage_duration: Duration,
}

/// A listener on solver runs. Solvers hold their observer behind a shared
/// handle, so implementations take `&self` and manage their own interior
/// mutability.
pub trait SolveObserver {
    fn solve_started(&self, event: &SolveStartedEvent);
    fn solve_finished(&self, event: &SolveFinishedEvent);
}

/// Fired when the automaton switches phase.
#[derive(Debug, Clone, Copy)]
pub struct PhaseChangedEvent {
    pub old_phase: &'static str,
    pub new_phase: &'static str,
    /// The waypoint the new phase flies toward.
    pub new_point: Unit3,
    /// The goal box whose entry triggered the switch.
    pub old_goal_space: StateSpace,
    pub time: f64,
}

/// Fired after every simulated sub-tick.
#[derive(Debug, Clone, Copy)]
pub struct XChangedEvent {
    pub old_x: State6,
    pub new_x: State6,
    pub input: Unit3,
    pub disturbance: Unit3,
    pub time: f64,
}

/// A listener on the simulated flight. Owned by the automaton, hence `&mut`.
pub trait FlightObserver {
    fn phase_changed(&mut self, event: &PhaseChangedEvent);
    fn x_changed(&mut self, event: &XChangedEvent);
}
