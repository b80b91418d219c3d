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

//! This module provides the dynamic-programming solver at the heart of the
//! controller: a backward value iteration over a 6-d grid with a min-max
//! (robust) Bellman update. Each backward stage minimizes over the control
//! inputs the worst successor cost over the disturbance family, so the
//! extracted policy is safe against any admissible disturbance. The sweep of
//! one stage is embarrassingly parallel and is partitioned among a pool of
//! scoped worker threads along the first velocity dimension.

use std::sync::Arc;
use std::time::{Duration, Instant};

use derive_builder::Builder;
use tracing::debug;

use crate::abstraction::{SolveFinishedEvent, SolveObserver, SolveStartedEvent};
use crate::common::{
    input_cube, State6, Unit, Unit3, DISTURBANCES, DRAG_COEFFICIENT, NUM_DISTURBANCES, NUM_INPUTS,
    STEP_SIZE,
};
use crate::implementation::collision::CollisionCloud;
use crate::implementation::grid::Range;
use crate::implementation::space::StateSpace;
use crate::implementation::table::{strides_for, ValueTable, INFINITE_COST, NO_INPUT};

/// The errors `get_control` may signal. Horizon exhaustion and a state that
/// fell off the solver grid are recoverable: the leg driver drops the solver
/// and rebuilds it. An invalid policy index is not: it means the value tables
/// themselves are corrupt.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("it took too many stages to reach the goal: the controller was not calculated beyond stage {stage} of {stages}")]
    OutOfHorizon { stage: i64, stages: usize },
    #[error("the current state left the solver grid")]
    OutOfStateSpace,
    #[error("the controller returned an invalid optimal input index: {0}")]
    InvalidPolicyIndex(i16),
}

impl ControlError {
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ControlError::InvalidPolicyIndex(_))
    }
}

fn default_workers() -> usize {
    num_cpus::get().min(16)
}

/// Everything one solver instance needs to know about its leg. Assembled by
/// the leg driver (or a test) through the generated `SolverSpecBuilder`.
#[derive(Builder)]
#[builder(pattern = "owned")]
pub struct SolverSpec {
    /// The box of states the leg may visit, in solver-local coordinates.
    pub state_space: StateSpace,
    /// The box of states that count as "arrived", in solver-local
    /// coordinates.
    pub goal_space: StateSpace,
    /// One tick of the discretized dynamics.
    pub delta_time: Unit,
    /// Per-axis grid coarsening; all ones disables stretching.
    #[builder(default = "Unit3::ONE")]
    pub stretch_factor: Unit3,
    /// Maps a world-frame point into solver-local coordinates (before any
    /// stretching is applied).
    pub projector: Arc<dyn Fn(Unit3) -> Unit3 + Send + Sync>,
    /// World-frame obstacle points. Retained so that a retry on an extended
    /// state space can reproject them without touching any file.
    #[builder(default)]
    pub obstacles: Vec<Unit3>,
    /// The horizon `S` of the value iteration.
    #[builder(default = "30")]
    pub stages: usize,
    /// Solve against the full disturbance family, or only its null member.
    #[builder(default = "true")]
    pub disturbance_on: bool,
    /// Weight of the obstacle-proximity term of the running cost; 0 disables
    /// the term.
    #[builder(default = "0.0")]
    pub collision_cost_factor: f32,
    /// Stop early once the finite-state count has settled for three stages.
    #[builder(default = "false")]
    pub norm_fix_point: bool,
    /// Stop early once every state around `x0` has finite cost.
    #[builder(default = "false")]
    pub initial_fix_point: bool,
    /// The number of worker threads (and sweep partitions) per stage.
    #[builder(default = "default_workers()")]
    pub workers: usize,
    /// How many stages, counted back from the horizon, use the fine input
    /// table before the sweep switches to the coarse one.
    #[builder(default = "100")]
    pub fine_input_stages: usize,
    /// Radius of the index cube around `x0` tested by the initial-region
    /// fix point.
    #[builder(default = "0")]
    pub initial_region_radius: i32,
    /// The drag coefficient `k` of the dynamics.
    #[builder(default = "DRAG_COEFFICIENT")]
    pub drag: f32,
    /// Listener on solver runs.
    #[builder(default, setter(strip_option))]
    pub observer: Option<Arc<dyn SolveObserver + Send + Sync>>,
}

/// The min-max dynamic-programming solver of one leg.
///
/// A solver owns its value tables, its collision cloud and its (stretched)
/// grids. `calculate_controller` fills the tables backward from the horizon;
/// `get_control` then reads the argmin policy during forward simulation. When
/// the initial state turns out unreachable the caller extends the state space
/// and calls `reinitialize`, which rebuilds every derived structure while
/// keeping the world obstacle set.
pub struct DpSolver {
    spec: SolverSpec,
    grids: [Range; 6],
    lengths: [usize; 6],
    num_states: usize,
    table: ValueTable,
    o_cost: Vec<f32>,
    o_cost_used: bool,
    collision: CollisionCloud,
    fine_inputs: [Unit3; NUM_INPUTS],
    coarse_inputs: [Unit3; NUM_INPUTS],
    disturbances: [Unit3; NUM_DISTURBANCES],
    num_disturbances: usize,
    stretching: bool,
}

impl DpSolver {
    pub fn new(spec: SolverSpec) -> Self {
        let mut solver = DpSolver {
            grids: [Range::default(); 6],
            lengths: [0; 6],
            num_states: 0,
            table: ValueTable::new(1, [1, 1, 1, 1, 1, 1]),
            o_cost: vec![],
            o_cost_used: false,
            collision: CollisionCloud::new([1, 1, 1], STEP_SIZE),
            fine_inputs: [Unit3::ZERO; NUM_INPUTS],
            coarse_inputs: [Unit3::ZERO; NUM_INPUTS],
            disturbances: [Unit3::ZERO; NUM_DISTURBANCES],
            num_disturbances: 1,
            stretching: false,
            spec,
        };
        solver.reset(false);
        solver
    }

    pub fn set_observer(&mut self, observer: Arc<dyn SolveObserver + Send + Sync>) {
        self.spec.observer = Some(observer);
    }

    pub fn state_space(&self) -> &StateSpace {
        &self.spec.state_space
    }
    pub fn goal_space(&self) -> &StateSpace {
        &self.spec.goal_space
    }
    pub fn num_states(&self) -> usize {
        self.num_states
    }
    pub fn stages(&self) -> usize {
        self.spec.stages
    }
    pub fn value_table(&self) -> &ValueTable {
        &self.table
    }
    pub fn collision_cloud(&self) -> &CollisionCloud {
        &self.collision
    }

    /// Rebuilds the solver for an updated (typically extended) state space,
    /// reprojecting the retained world obstacles into the new grid. No file
    /// is reloaded.
    pub fn reinitialize(&mut self, state_space: StateSpace) {
        self.spec.state_space = state_space;
        self.reset(true);
    }

    fn reset(&mut self, retry: bool) {
        let stretch = self.spec.stretch_factor;
        debug!("stretch factor: {stretch}");
        assert!(
            stretch.x >= 1 && stretch.y >= 1 && stretch.z >= 1,
            "every stretch factor component must be >= 1"
        );
        self.stretching = stretch.x > 1 || stretch.y > 1 || stretch.z > 1;

        debug!("### state space ###");
        self.num_states = 1;
        for i in 0..6 {
            let range = self.spec.state_space.range(i);
            let factor = stretch[i % 3];
            self.grids[i] = Range::new(range.begin() / factor, range.step(), range.end() / factor);
            self.lengths[i] = self.grids[i].len();
            self.num_states *= self.lengths[i];
            debug!("{i}: {} (length: {})", self.grids[i], self.lengths[i]);
        }
        debug!("total number of states per stage: {}", self.num_states);

        debug!("### goal space ###");
        for i in 0..6 {
            let range = self.spec.goal_space.range(i);
            let factor = stretch[i % 3];
            debug!("{i}: Range({}:{}:{})", range.begin() / factor, range.step(), range.end() / factor);
        }

        // Input amplitudes shrink as the stretch factor grows so that one
        // coarsened cell stays reachable within one tick.
        let mut fine = Unit3::ZERO;
        let mut coarse = Unit3::ZERO;
        for i in 0..3 {
            let factor = stretch[i];
            fine[i] = if factor > 2 { 1 } else { 2 };
            coarse[i] = if factor > 5 {
                1
            } else if factor > 3 {
                2
            } else if factor > 2 {
                3
            } else {
                4
            };
        }
        self.fine_inputs = input_cube(fine);
        self.coarse_inputs = input_cube(coarse);

        for i in 0..NUM_DISTURBANCES {
            self.disturbances[i] = DISTURBANCES[i] / stretch;
        }
        self.num_disturbances = if self.spec.disturbance_on {
            NUM_DISTURBANCES
        } else {
            1
        };

        self.table = ValueTable::new(self.spec.stages, self.lengths);

        let mut collision = CollisionCloud::new(
            [self.lengths[0], self.lengths[1], self.lengths[2]],
            STEP_SIZE,
        );
        let projected = self.spec.obstacles.iter().map(|&world| {
            let mut local = (self.spec.projector)(world);
            local /= stretch;
            Unit3::new(
                self.grids[0].search_closest(local.x as f32),
                self.grids[1].search_closest(local.y as f32),
                self.grids[2].search_closest(local.z as f32),
            )
        });
        collision.add_obstacles(projected);
        self.collision = collision;

        self.o_cost = vec![];
        self.o_cost_used = false;

        if let Some(observer) = &self.spec.observer {
            observer.solve_started(&SolveStartedEvent {
                num_states: self.num_states,
                retry,
            });
        }
    }

    /// Runs the backward value iteration from the horizon toward stage 0 and
    /// returns the first stage index at which the initial region around `x0`
    /// is entirely finite, or `None` when no such stage exists. The returned
    /// index is where the forward simulation starts reading the policy.
    pub fn calculate_controller(&mut self, x0: &State6) -> Option<usize> {
        let total_begin = Instant::now();
        let stages = self.spec.stages;
        let stretch = self.spec.stretch_factor;

        let mut i_x0 = [0i32; 6];
        for i in 0..6 {
            i_x0[i] = self.grids[i].search_away_from_zero(x0[i] / stretch[i % 3] as f32);
        }

        debug!("### final stage ###");
        let terminal_states = self.fill_terminal_costs();
        debug!("number of states in goal space: {terminal_states}");

        self.precalculate_obstacle_cost();

        let workers = self.spec.workers.max(1);
        let chunk_size = self.lengths[3] / workers;
        let rest = self.lengths[3] - chunk_size * workers;
        let row_len = strides_for(&self.lengths)[3];
        let lengths = self.lengths;

        let mut stage_durations: Vec<Duration> = vec![];
        let mut finite_states_changed = 0;
        let mut last_finite_states = 0usize;

        debug!("### recursive calculation of the optimal cost-to-go ###");
        let mut i_time: i64 = stages as i64 - 2;
        while i_time >= 0 {
            let stage_begin = Instant::now();
            let inputs = if stages as i64 - i_time > self.spec.fine_input_stages as i64 {
                &self.coarse_inputs
            } else {
                &self.fine_inputs
            };

            let (v_cur, v_next) = self.table.cost.stage_pair_mut(i_time as usize);
            let (u_cur, _) = self.table.policy.stage_pair_mut(i_time as usize);
            let ctx = SweepCtx {
                grids: &self.grids,
                lengths,
                strides: strides_for(&lengths),
                goal_space: &self.spec.goal_space,
                collision: &self.collision,
                o_cost: &self.o_cost,
                o_cost_used: self.o_cost_used,
                inputs,
                disturbances: &self.disturbances[..self.num_disturbances],
                v_next,
                delta_time: self.spec.delta_time as f32,
                drag: self.spec.drag,
                stretch,
                stretching: self.stretching,
            };

            let mut all_finite_states = 0;
            std::thread::scope(|scope| {
                let mut handles = Vec::with_capacity(workers);
                let mut v_rest = v_cur;
                let mut u_rest = u_cur;
                let mut start = 0usize;
                for i_thread in 0..workers {
                    let mut end = start + chunk_size;
                    if i_thread < rest {
                        end += 1;
                    }
                    let (v_chunk, v_tail) = v_rest.split_at_mut((end - start) * row_len);
                    let (u_chunk, u_tail) = u_rest.split_at_mut((end - start) * row_len);
                    v_rest = v_tail;
                    u_rest = u_tail;
                    let ctx = &ctx;
                    handles.push(scope.spawn(move || sweep_chunk(ctx, start, end, v_chunk, u_chunk)));
                    start = end;
                }
                debug_assert_eq!(lengths[3], start, "calculation of the worker chunk sizes failed");
                for handle in handles {
                    all_finite_states += handle.join().expect("a sweep worker panicked");
                }
            });

            let duration = stage_begin.elapsed();
            stage_durations.push(duration);
            debug!(
                "stage {i_time} took {} ms. number of states with finite cost-to-go: {all_finite_states}",
                duration.as_millis()
            );

            if all_finite_states == last_finite_states {
                finite_states_changed += 1;
            } else {
                finite_states_changed = 0;
            }

            // Unchanged for three stages in a row.
            if finite_states_changed == 2 {
                debug!("the number of finite cost states has not changed in three stages. a fix point has probably been reached.");
                if self.spec.norm_fix_point {
                    i_time -= 1;
                    break;
                }
            }
            if self.initial_region_is_covered(i_time as usize, &i_x0) {
                debug!("the initial region is covered. the shortest path has been calculated.");
                if self.spec.initial_fix_point {
                    i_time -= 1;
                    break;
                }
            }

            last_finite_states = all_finite_states;
            i_time -= 1;
        }
        i_time += 1;

        if let Some(observer) = &self.spec.observer {
            let sum: Duration = stage_durations.iter().sum();
            observer.solve_finished(&SolveFinishedEvent {
                total_duration: total_begin.elapsed(),
                first_stage_duration: stage_durations.first().copied().unwrap_or_default(),
                avg_stage_duration: sum
                    .checked_div(stage_durations.len().max(1) as u32)
                    .unwrap_or_default(),
            });
        }

        if self.initial_region_is_covered(i_time as usize, &i_x0) {
            debug!("the initial region is covered.");
            Some(i_time as usize)
        } else {
            debug!("the initial region is not covered.");
            None
        }
    }

    /// Reads the argmin policy at `(x, i_time)` and returns the matching
    /// input, scaled back into unstretched units.
    pub fn get_control(&self, x: &State6, i_time: i64) -> Result<Unit3, ControlError> {
        let stages = self.spec.stages;
        if i_time < 0 || i_time >= stages as i64 - 1 {
            return Err(ControlError::OutOfHorizon {
                stage: i_time,
                stages,
            });
        }
        let inputs = if stages as i64 - i_time > self.spec.fine_input_stages as i64 {
            &self.coarse_inputs
        } else {
            &self.fine_inputs
        };
        let index = self
            .snap(x)
            .ok_or(ControlError::OutOfStateSpace)?;
        let i_u = self.table.policy.at(i_time as usize, &index);
        if !(0..NUM_INPUTS as i16).contains(&i_u) {
            return Err(ControlError::InvalidPolicyIndex(i_u));
        }
        Ok(inputs[i_u as usize] * self.spec.stretch_factor)
    }

    /// The cost-to-go at `(x, stage)`, or `None` when `x` is off the grid.
    pub fn cost_to_go(&self, stage: usize, x: &State6) -> Option<f32> {
        self.snap(x).map(|index| self.table.cost.at(stage, &index))
    }

    fn snap(&self, x: &State6) -> Option<[usize; 6]> {
        let stretch = self.spec.stretch_factor;
        let mut index = [0usize; 6];
        for i in 0..6 {
            let found = self.grids[i].search_away_from_zero(x[i] / stretch[i % 3] as f32);
            if found < 0 {
                return None;
            }
            index[i] = found as usize;
        }
        Some(index)
    }

    fn fill_terminal_costs(&mut self) -> usize {
        let grids = self.grids;
        let lengths = self.lengths;
        let goal_space = self.spec.goal_space;
        let stretch = self.spec.stretch_factor;
        let stretching = self.stretching;
        let last = self.table.cost.stage_mut(self.spec.stages - 1);

        let mut count = 0;
        let mut cursor = 0;
        for i_v1 in 0..lengths[3] {
            let v1 = grids[3].value(i_v1) as f32;
            for i_v2 in 0..lengths[4] {
                let v2 = grids[4].value(i_v2) as f32;
                for i_v3 in 0..lengths[5] {
                    let v3 = grids[5].value(i_v3) as f32;
                    for i_c1 in 0..lengths[0] {
                        let c1 = grids[0].value(i_c1) as f32;
                        for i_c2 in 0..lengths[1] {
                            let c2 = grids[1].value(i_c2) as f32;
                            for i_c3 in 0..lengths[2] {
                                let c3 = grids[2].value(i_c3) as f32;
                                let x = [c1, c2, c3, v1, v2, v3];
                                let cost = if goal_contains(&goal_space, stretching, stretch, &x) {
                                    0.0
                                } else {
                                    INFINITE_COST
                                };
                                last[cursor] = cost;
                                if cost == 0.0 {
                                    count += 1;
                                }
                                cursor += 1;
                            }
                        }
                    }
                }
            }
        }
        count
    }

    fn precalculate_obstacle_cost(&mut self) {
        let factor = self.spec.collision_cost_factor;
        if factor == 0.0 {
            self.o_cost_used = false;
            debug!("the collision cost factor is 0. skipping the precalculation of the obstacle cost.");
            return;
        }
        if self.collision.obstacles().is_empty() {
            self.o_cost_used = false;
            debug!("the collision cloud is empty. skipping the precalculation of the obstacle cost.");
            return;
        }
        self.o_cost_used = true;
        debug!("### precalculate the obstacle cost ###");
        let [n1, n2, n3] = [self.lengths[0], self.lengths[1], self.lengths[2]];
        let mut o_cost = vec![0f32; n1 * n2 * n3];
        for i_c1 in 0..n1 {
            for i_c2 in 0..n2 {
                for i_c3 in 0..n3 {
                    let min_distance_2 = self.collision.min_distance_2([i_c1, i_c2, i_c3]);
                    o_cost[(i_c1 * n2 + i_c2) * n3 + i_c3] =
                        factor / min_distance_2.sqrt() as f32;
                }
            }
        }
        self.o_cost = o_cost;
    }

    fn initial_region_is_covered(&self, stage: usize, i_x0: &[i32; 6]) -> bool {
        if i_x0.iter().any(|&i| i < 0) {
            // x0 is not even on the grid; covering its surroundings is
            // meaningless and the caller must extend the state space.
            return false;
        }
        self.initial_region(i_x0)
            .iter()
            .all(|index| self.table.cost.at(stage, index) < INFINITE_COST)
    }

    /// The index cube of the configured radius around `i_x0`, clamped to the
    /// grid bounds.
    fn initial_region(&self, i_x0: &[i32; 6]) -> Vec<[usize; 6]> {
        let r = self.spec.initial_region_radius;
        let lo = |k: usize| (i_x0[k] - r).max(0) as usize;
        let hi = |k: usize| ((i_x0[k] + r) as usize).min(self.lengths[k] - 1);

        let mut region = vec![];
        for cx in lo(0)..=hi(0) {
            for cy in lo(1)..=hi(1) {
                for cz in lo(2)..=hi(2) {
                    for vx in lo(3)..=hi(3) {
                        for vy in lo(4)..=hi(4) {
                            for vz in lo(5)..=hi(5) {
                                region.push([cx, cy, cz, vx, vy, vz]);
                            }
                        }
                    }
                }
            }
        }
        region
    }
}

/// Everything a sweep worker reads. Shared by `&` across the scoped pool:
/// the previous stage slab is frozen, the collision cache is internally
/// atomic, everything else is plain immutable data.
struct SweepCtx<'a> {
    grids: &'a [Range; 6],
    lengths: [usize; 6],
    strides: [usize; 6],
    goal_space: &'a StateSpace,
    collision: &'a CollisionCloud,
    o_cost: &'a [f32],
    o_cost_used: bool,
    inputs: &'a [Unit3; NUM_INPUTS],
    disturbances: &'a [Unit3],
    v_next: &'a [f32],
    delta_time: f32,
    drag: f32,
    stretch: Unit3,
    stretching: bool,
}

impl SweepCtx<'_> {
    #[inline]
    fn flat(&self, index: [usize; 6]) -> usize {
        index
            .iter()
            .zip(self.strides.iter())
            .map(|(i, s)| i * s)
            .sum()
    }

    /// The one-step cost of moving out of cell `(i_c1, i_c2, i_c3)` toward
    /// the successor state `x`. Zero inside the goal; otherwise the input and
    /// state magnitudes, plus the obstacle-proximity term when enabled.
    fn running_cost(&self, x: &[f32; 6], input: Unit3, cell: [usize; 3]) -> f32 {
        if goal_contains(self.goal_space, self.stretching, self.stretch, x) {
            return 0.0;
        }
        let mut cost = (input.x * input.x + input.y * input.y + input.z * input.z) as f32;
        for value in x {
            cost += value * value;
        }
        if self.o_cost_used {
            cost += self.o_cost[(cell[0] * self.lengths[1] + cell[1]) * self.lengths[2] + cell[2]];
        }
        cost * self.delta_time
    }
}

fn goal_contains(goal_space: &StateSpace, stretching: bool, stretch: Unit3, x: &[f32; 6]) -> bool {
    if stretching {
        let mut unstretched = [0f32; 6];
        for i in 0..3 {
            unstretched[i] = x[i] * stretch[i] as f32;
            unstretched[i + 3] = x[i + 3] * stretch[i] as f32;
        }
        goal_space.contains(&unstretched)
    } else {
        goal_space.contains(x)
    }
}

/// Computes one stage for the `v1` rows `[start_v1, end_v1)`, writing the
/// worker's own contiguous slices of `V[stage]` and `U[stage]` and returning
/// its count of finite-cost cells.
///
/// The successor values and indices of each axis only depend on the loop
/// variables above them, so they are computed once per axis iteration instead
/// of once per cell.
fn sweep_chunk(
    ctx: &SweepCtx,
    start_v1: usize,
    end_v1: usize,
    v_out: &mut [f32],
    u_out: &mut [i16],
) -> usize {
    let nd = ctx.disturbances.len();
    let dt = ctx.delta_time;

    let mut new_v1 = [[0f32; NUM_DISTURBANCES]; NUM_INPUTS];
    let mut i_new_v1 = [[0i32; NUM_DISTURBANCES]; NUM_INPUTS];
    let mut new_v2 = [[0f32; NUM_DISTURBANCES]; NUM_INPUTS];
    let mut i_new_v2 = [[0i32; NUM_DISTURBANCES]; NUM_INPUTS];
    let mut new_v3 = [[0f32; NUM_DISTURBANCES]; NUM_INPUTS];
    let mut i_new_v3 = [[0i32; NUM_DISTURBANCES]; NUM_INPUTS];
    let mut new_c1 = [[0f32; NUM_DISTURBANCES]; NUM_INPUTS];
    let mut i_new_c1 = [[0i32; NUM_DISTURBANCES]; NUM_INPUTS];
    let mut new_c2 = [[0f32; NUM_DISTURBANCES]; NUM_INPUTS];
    let mut i_new_c2 = [[0i32; NUM_DISTURBANCES]; NUM_INPUTS];
    let mut new_c3 = [[0f32; NUM_DISTURBANCES]; NUM_INPUTS];
    let mut i_new_c3 = [[0i32; NUM_DISTURBANCES]; NUM_INPUTS];
    let mut valid = [[false; NUM_DISTURBANCES]; NUM_INPUTS];

    let mut finite_states = 0;
    let mut cursor = 0;

    for i_v1 in start_v1..end_v1 {
        let v1 = ctx.grids[3].value(i_v1) as f32;
        for i in 0..NUM_INPUTS {
            for j in 0..nd {
                let drag = -ctx.drag * v1;
                new_v1[i][j] =
                    v1 + ((ctx.inputs[i].x + ctx.disturbances[j].x) as f32 + drag) * dt;
                i_new_v1[i][j] = ctx.grids[3].search_away_from_zero(new_v1[i][j]);
            }
        }

        for i_v2 in 0..ctx.lengths[4] {
            let v2 = ctx.grids[4].value(i_v2) as f32;
            for i in 0..NUM_INPUTS {
                for j in 0..nd {
                    let drag = -ctx.drag * v2;
                    new_v2[i][j] =
                        v2 + ((ctx.inputs[i].y + ctx.disturbances[j].y) as f32 + drag) * dt;
                    i_new_v2[i][j] = ctx.grids[4].search_away_from_zero(new_v2[i][j]);
                }
            }

            for i_v3 in 0..ctx.lengths[5] {
                let v3 = ctx.grids[5].value(i_v3) as f32;
                for i in 0..NUM_INPUTS {
                    for j in 0..nd {
                        let drag = -ctx.drag * v3;
                        new_v3[i][j] =
                            v3 + ((ctx.inputs[i].z + ctx.disturbances[j].z) as f32 + drag) * dt;
                        i_new_v3[i][j] = ctx.grids[5].search_away_from_zero(new_v3[i][j]);
                    }
                }

                for i_c1 in 0..ctx.lengths[0] {
                    let c1 = ctx.grids[0].value(i_c1) as f32;
                    for i in 0..NUM_INPUTS {
                        for j in 0..nd {
                            new_c1[i][j] = c1 + new_v1[i][j] * dt;
                            i_new_c1[i][j] = ctx.grids[0].search_away_from_zero(new_c1[i][j]);
                        }
                    }

                    for i_c2 in 0..ctx.lengths[1] {
                        let c2 = ctx.grids[1].value(i_c2) as f32;
                        for i in 0..NUM_INPUTS {
                            for j in 0..nd {
                                new_c2[i][j] = c2 + new_v2[i][j] * dt;
                                i_new_c2[i][j] = ctx.grids[1].search_away_from_zero(new_c2[i][j]);
                            }
                        }

                        for i_c3 in 0..ctx.lengths[2] {
                            let c3 = ctx.grids[2].value(i_c3) as f32;
                            let mut any_valid = false;
                            for i in 0..NUM_INPUTS {
                                for j in 0..nd {
                                    new_c3[i][j] = c3 + new_v3[i][j] * dt;
                                    i_new_c3[i][j] =
                                        ctx.grids[2].search_away_from_zero(new_c3[i][j]);
                                    let ok = i_new_v1[i][j] != -1
                                        && i_new_v2[i][j] != -1
                                        && i_new_v3[i][j] != -1
                                        && i_new_c1[i][j] != -1
                                        && i_new_c2[i][j] != -1
                                        && i_new_c3[i][j] != -1;
                                    valid[i][j] = ok;
                                    any_valid |= ok;
                                }
                            }

                            if any_valid {
                                let mut min_cost_to_go = INFINITE_COST;
                                let mut argmin_cost_to_go = NO_INPUT;
                                for i in 0..NUM_INPUTS {
                                    let mut max_cost_to_go = f32::MIN;
                                    let mut argmax_cost_to_go = -1;
                                    for j in 0..nd {
                                        let cost_to_go = if !valid[i][j] {
                                            INFINITE_COST
                                        } else {
                                            let successor = [
                                                new_c1[i][j],
                                                new_c2[i][j],
                                                new_c3[i][j],
                                                new_v1[i][j],
                                                new_v2[i][j],
                                                new_v3[i][j],
                                            ];
                                            let colliding = ctx.collision.will_collide(
                                                [i_c1, i_c2, i_c3],
                                                [
                                                    i_new_c1[i][j] as usize,
                                                    i_new_c2[i][j] as usize,
                                                    i_new_c3[i][j] as usize,
                                                ],
                                            );
                                            let running = if colliding {
                                                INFINITE_COST
                                            } else {
                                                ctx.running_cost(
                                                    &successor,
                                                    ctx.inputs[i],
                                                    [i_c1, i_c2, i_c3],
                                                )
                                            };
                                            let next = ctx.v_next[ctx.flat([
                                                i_new_c1[i][j] as usize,
                                                i_new_c2[i][j] as usize,
                                                i_new_c3[i][j] as usize,
                                                i_new_v1[i][j] as usize,
                                                i_new_v2[i][j] as usize,
                                                i_new_v3[i][j] as usize,
                                            ])];
                                            running + next
                                        };
                                        if cost_to_go > max_cost_to_go {
                                            max_cost_to_go = cost_to_go;
                                            argmax_cost_to_go = j as i32;
                                        }
                                    }
                                    if max_cost_to_go < min_cost_to_go && argmax_cost_to_go != -1 {
                                        min_cost_to_go = max_cost_to_go;
                                        argmin_cost_to_go = i as i16;
                                    }
                                }
                                v_out[cursor] = min_cost_to_go;
                                u_out[cursor] = argmin_cost_to_go;
                                if min_cost_to_go < INFINITE_COST {
                                    finite_states += 1;
                                }
                            } else {
                                v_out[cursor] = INFINITE_COST;
                                u_out[cursor] = NO_INPUT;
                            }
                            cursor += 1;
                        }
                    }
                }
            }
        }
    }
    finite_states
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_solver {
    use std::sync::Arc;

    use crate::common::State6;
    use crate::implementation::solver::{ControlError, DpSolver, SolverSpecBuilder};
    use crate::implementation::space::StateSpace;
    use crate::implementation::table::INFINITE_COST;

    fn cube(pos: i32, vel: i32) -> StateSpace {
        StateSpace {
            begin: [-pos, -pos, -pos, -vel, -vel, -vel],
            step: [1; 6],
            end: [pos, pos, pos, vel, vel, vel],
        }
    }

    fn small_solver(stages: usize, disturbance_on: bool) -> DpSolver {
        let spec = SolverSpecBuilder::default()
            .state_space(cube(3, 2))
            .goal_space(cube(1, 1))
            .delta_time(1)
            .projector(Arc::new(|p| p))
            .stages(stages)
            .disturbance_on(disturbance_on)
            .workers(4)
            .build()
            .expect("complete solver spec");
        DpSolver::new(spec)
    }

    #[test]
    fn a_state_in_the_goal_is_immediately_covered() {
        let mut solver = small_solver(6, false);
        let x0: State6 = [0.0; 6];
        let stage = solver.calculate_controller(&x0).expect("x0 is in the goal");
        assert!(stage <= solver.stages() - 1);
        assert_eq!(Some(0.0), solver.cost_to_go(stage, &x0));
    }

    #[test]
    fn the_initial_fix_point_stops_as_soon_as_x0_is_covered() {
        let spec = SolverSpecBuilder::default()
            .state_space(cube(3, 2))
            .goal_space(cube(1, 1))
            .delta_time(1)
            .projector(Arc::new(|p| p))
            .stages(8)
            .disturbance_on(false)
            .initial_fix_point(true)
            .workers(4)
            .build()
            .expect("complete solver spec");
        let mut solver = DpSolver::new(spec);
        let x0: State6 = [3.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let stage = solver.calculate_controller(&x0).expect("x0 is reachable");
        assert!(stage >= 1, "the solver should stop before sweeping down to stage 0");
        let cost = solver.cost_to_go(stage, &x0).expect("x0 is on the grid");
        assert!(cost < INFINITE_COST);
    }

    #[test]
    fn the_value_iteration_is_deterministic() {
        let mut first = small_solver(8, true);
        let mut second = small_solver(8, true);
        let x0: State6 = [2.0, -2.0, 0.0, 0.0, 0.0, 0.0];
        assert_eq!(first.calculate_controller(&x0), second.calculate_controller(&x0));
        assert_eq!(
            first.value_table().cost.as_slice(),
            second.value_table().cost.as_slice()
        );
        assert_eq!(
            first.value_table().policy.as_slice(),
            second.value_table().policy.as_slice()
        );
    }

    #[test]
    fn get_control_rejects_the_horizon() {
        let mut solver = small_solver(6, false);
        let x0: State6 = [0.0; 6];
        solver.calculate_controller(&x0).expect("solvable");
        let err = solver.get_control(&x0, 5).unwrap_err();
        assert!(matches!(err, ControlError::OutOfHorizon { .. }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn get_control_rejects_a_state_off_the_grid() {
        let mut solver = small_solver(6, false);
        solver.calculate_controller(&[0.0; 6]).expect("solvable");
        let far: State6 = [9.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let err = solver.get_control(&far, 0).unwrap_err();
        assert!(matches!(err, ControlError::OutOfStateSpace));
        assert!(err.is_recoverable());
    }

    #[test]
    fn backward_iteration_never_grows_the_cost_to_go() {
        // more remaining stages can only open up cheaper trajectories, which
        // is exactly why the finite-state count settling indicates a fix point
        let mut solver = small_solver(8, false);
        let _ = solver.calculate_controller(&[3.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        let table = &solver.value_table().cost;
        for stage in 0..solver.stages() - 1 {
            for (earlier, later) in table.stage(stage).iter().zip(table.stage(stage + 1)) {
                assert!(earlier <= later);
            }
        }
    }

    fn graded_solver(disturbance_on: bool) -> DpSolver {
        let spec = SolverSpecBuilder::default()
            .state_space(cube(4, 3))
            .goal_space(cube(1, 1))
            .delta_time(1)
            .projector(Arc::new(|p| p))
            .stages(6)
            .disturbance_on(disturbance_on)
            .workers(4)
            .build()
            .expect("complete solver spec");
        DpSolver::new(spec)
    }

    #[test]
    fn the_robust_cost_dominates_the_nominal_cost() {
        let x0: State6 = [2.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let mut nominal = graded_solver(false);
        let mut robust = graded_solver(true);
        nominal.calculate_controller(&x0).expect("reachable");
        // the adversary can at worst make the leg unreachable, in which case
        // its cost-to-go is infinite and still dominates the nominal one
        let _ = robust.calculate_controller(&x0);
        let a = nominal.cost_to_go(0, &x0).expect("on grid");
        let b = robust.cost_to_go(0, &x0).expect("on grid");
        assert!(b >= a);
    }
}
