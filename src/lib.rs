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

//! # DRONEDP
//! DRONEDP is a robust (min-max) dynamic-programming waypoint controller for
//! a point-mass drone flying through a field of point obstacles. The route is
//! flown as a sequence of legs by a small hybrid automaton (Starting ->
//! Cruising -> ... -> Landing -> Done); for every leg a fresh solver runs a
//! backward value iteration over a 6-d grid (3-d position + 3-d velocity)
//! and minimizes, at each state, the worst-case cost over a bounded
//! disturbance family. The resulting argmin policy steers the simulated
//! drone while a disturbance source plays the adversary.
//!
//! ## Solving a single leg by hand
//! The automaton normally assembles solver legs on its own, but the solver
//! is usable standalone. The following drives a state sitting 2 cells from
//! the goal:
//!
//! ```
//! use std::sync::Arc;
//! use dronedp::*;
//!
//! // positions within 2 cells of the origin, velocities within 2 cells/tick
//! let state_space = StateSpace {
//!     begin: [-2, -2, -2, -2, -2, -2],
//!     step:  [1; 6],
//!     end:   [2, 2, 2, 2, 2, 2],
//! };
//! // arrived means: at most one cell away, almost at rest
//! let goal_space = StateSpace {
//!     begin: [-1, -1, -1, -1, -1, -1],
//!     step:  [1; 6],
//!     end:   [1, 1, 1, 1, 1, 1],
//! };
//!
//! let spec = SolverSpecBuilder::default()
//!     .state_space(state_space)
//!     .goal_space(goal_space)
//!     .delta_time(1)
//!     .projector(Arc::new(|p| p))
//!     .stages(6)
//!     .disturbance_on(false)
//!     .workers(2)
//!     .build()
//!     .unwrap();
//! let mut solver = DpSolver::new(spec);
//!
//! let x0 = [2.0, 0.0, 0.0, 0.0, 0.0, 0.0];
//! let stage = solver.calculate_controller(&x0).expect("the goal is reachable");
//! let u = solver.get_control(&x0, stage as i64).unwrap();
//! assert!(u.x <= 0);
//! ```
//!
//! ## Flying a whole route
//! Feed a route and an obstacle cloud to [`HybridAutomaton`] and run it to
//! completion; observers receive every simulated move and phase switch. See
//! the binary for the end-to-end wiring (configuration file, output
//! directory, run log).

mod abstraction;
mod common;
mod config;
mod implementation;
mod io;

pub use abstraction::*;
pub use common::*;
pub use config::*;
pub use implementation::*;
pub use io::*;
