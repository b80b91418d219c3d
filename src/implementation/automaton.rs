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

//! This module provides the hybrid automaton driving the drone along its
//! route. The automaton sequences the flight phases (Starting, Cruising,
//! Landing, Done), instantiates one solver per leg with the geometry of that
//! phase, and consumes the solver's policy during forward simulation while a
//! disturbance source kicks the drone around.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::abstraction::{
    DisturbanceSource, FlightObserver, PhaseChangedEvent, SolveObserver, StretchPolicy,
    XChangedEvent,
};
use crate::common::{State6, Unit, Unit3, DRAG_COEFFICIENT, STEP_SIZE, SUB_TICKS_PER_STAGE};
use crate::config::Config;
use crate::implementation::solver::{ControlError, DpSolver, SolverSpecBuilder};
use crate::implementation::space::StateSpace;
use crate::implementation::stretch::{validate_stretch_factor, IdentityStretch, StretchValidation};

/// The flight phases of the automaton. A closed set of variants: each phase
/// supplies its leg geometry, its invariant and its exit test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Starting,
    Cruising,
    Landing,
    Done,
}

impl Phase {
    pub fn name(self) -> &'static str {
        match self {
            Phase::Starting => "Starting",
            Phase::Cruising => "Cruising",
            Phase::Landing => "Landing",
            Phase::Done => "Done",
        }
    }

    /// One solver tick of this phase, in grid time units.
    pub fn delta_time(self) -> Unit {
        match self {
            Phase::Done => 0,
            _ => 1,
        }
    }
}

/// The ways a waypoint list can fail the route contract.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("the route must have at least four entries")]
    TooShort,
    #[error("the first point on the route must have its z coordinate equal to 0")]
    FirstNotOnGround,
    #[error("the first and second points on the route must have the same x and y coordinates")]
    StartNotVertical,
    #[error("the last point on the route must have its z coordinate equal to 0")]
    LastNotOnGround,
    #[error("the last and second to last points on the route must have the same x and y coordinates")]
    EndNotVertical,
    #[error("every waypoint between takeoff and touchdown must have z >= 10 (waypoint {index} does not)")]
    LowWaypoint { index: usize },
}

/// Checks the route contract: at least four points, a vertical takeoff from
/// the ground, a vertical touchdown onto the ground, and every point in
/// between at cruising altitude.
pub fn validate_route(route: &[Unit3]) -> Result<(), RouteError> {
    if route.len() < 4 {
        return Err(RouteError::TooShort);
    }
    let first = route[0];
    let second = route[1];
    let second_last = route[route.len() - 2];
    let last = route[route.len() - 1];

    if first.z != 0 {
        return Err(RouteError::FirstNotOnGround);
    }
    if first.x != second.x || first.y != second.y {
        return Err(RouteError::StartNotVertical);
    }
    if last.z != 0 {
        return Err(RouteError::LastNotOnGround);
    }
    if last.x != second_last.x || last.y != second_last.y {
        return Err(RouteError::EndNotVertical);
    }
    for (index, point) in route.iter().enumerate().take(route.len() - 1).skip(1) {
        if point.z < 10 {
            return Err(RouteError::LowWaypoint { index });
        }
    }
    Ok(())
}

/// The hybrid automaton: phase state machine, per-leg solver lifecycle and
/// forward simulation.
pub struct HybridAutomaton {
    phase: Phase,
    x: State6,
    time: f64,
    route: Vec<Unit3>,
    route_counter: usize,
    solver: Option<DpSolver>,
    major_time: i64,
    minor_time: i64,
    observers: Vec<Box<dyn FlightObserver>>,
    solve_observer: Option<Arc<dyn SolveObserver + Send + Sync>>,
    disturbance: Box<dyn DisturbanceSource>,
    stretch_policy: Box<dyn StretchPolicy>,
    obstacles: Vec<Unit3>,
    config: Config,
}

impl HybridAutomaton {
    /// Creates an automaton at the start of the given route. The drone sits
    /// on the first waypoint with zero velocity; the first leg flies toward
    /// the second waypoint.
    pub fn new(
        route: Vec<Unit3>,
        obstacles: Vec<Unit3>,
        config: Config,
        disturbance: Box<dyn DisturbanceSource>,
    ) -> Result<Self, RouteError> {
        validate_route(&route)?;
        let mut x = [0f32; 6];
        for i in 0..3 {
            x[i] = route[0][i] as f32;
        }
        Ok(HybridAutomaton {
            phase: Phase::Starting,
            x,
            time: 0.0,
            route_counter: 1,
            route,
            solver: None,
            major_time: 0,
            minor_time: 0,
            observers: vec![],
            solve_observer: None,
            disturbance,
            stretch_policy: Box::new(IdentityStretch),
            obstacles,
            config,
        })
    }

    pub fn add_observer(&mut self, observer: Box<dyn FlightObserver>) {
        self.observers.push(observer);
    }

    pub fn set_solve_observer(&mut self, observer: Arc<dyn SolveObserver + Send + Sync>) {
        self.solve_observer = Some(observer);
    }

    pub fn set_stretch_policy(&mut self, policy: Box<dyn StretchPolicy>) {
        self.stretch_policy = policy;
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }
    pub fn x(&self) -> &State6 {
        &self.x
    }
    pub fn time(&self) -> f64 {
        self.time
    }
    pub fn route(&self) -> &[Unit3] {
        &self.route
    }

    /// Advances the simulation by one sub-tick: flow, time bookkeeping,
    /// invariant check and phase-transition test.
    pub fn run_once(&mut self) -> Result<(), ControlError> {
        let delta_time_sim = self.phase.delta_time() as f32 / SUB_TICKS_PER_STAGE as f32;
        self.flow(delta_time_sim)?;
        self.minor_time += 1;
        if self.minor_time >= SUB_TICKS_PER_STAGE {
            self.minor_time = 0;
            if self.config.use_single_stage_controller {
                self.major_time += 1;
            }
        }
        if !self.invariant_holds() {
            error!("invariant does not hold!");
        }
        self.check_transition();
        Ok(())
    }

    /// Runs sub-ticks until the route is flown.
    pub fn run_until_end(&mut self) -> Result<(), ControlError> {
        while self.phase != Phase::Done {
            self.run_once()?;
        }
        Ok(())
    }

    /// One explicit Euler step of the dynamics, with the phase's control and
    /// a fresh disturbance.
    fn flow(&mut self, delta_time_sim: f32) -> Result<(), ControlError> {
        if self.phase == Phase::Done {
            return Ok(());
        }
        let u = self.control()?;
        let d = self.disturbance.next_disturbance();
        let old_x = self.x;
        for i in 0..3 {
            let drag = -DRAG_COEFFICIENT * self.x[i + 3];
            self.x[i + 3] += ((u[i] + d[i]) as f32 + drag) * delta_time_sim;
            self.x[i] += self.x[i + 3] * delta_time_sim;
        }
        self.time += delta_time_sim as f64;
        self.notify_x_changed(old_x, u, d);
        Ok(())
    }

    /// The control of the current sub-tick. Builds the leg's solver on first
    /// use; on a recoverable policy error the solver is dropped and rebuilt
    /// right away, because this sub-tick still needs a control value.
    fn control(&mut self) -> Result<Unit3, ControlError> {
        if self.phase == Phase::Done {
            return Ok(Unit3::ZERO);
        }
        loop {
            let point = self.current_route_point();
            let x0 = self.local_state(point);
            if self.solver.is_none() {
                let (state_space, goal_space, stretch) = self.leg_geometry(point, &x0);
                self.build_solver(state_space, goal_space, stretch, point, &x0);
            }
            let solver = self.solver.as_ref().expect("the solver was just built");
            match solver.get_control(&x0, self.major_time) {
                Ok(u) => return Ok(u),
                Err(err) if err.is_recoverable() => {
                    error!("error while getting the control: {err}");
                    self.major_time = 0;
                    self.minor_time = 0;
                    self.solver = None;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// The state space, goal space and stretch factor of the current leg, in
    /// solver-local coordinates.
    fn leg_geometry(&self, point: Unit3, x0: &State6) -> (StateSpace, StateSpace, Unit3) {
        match self.phase {
            Phase::Starting => {
                let mut state_space = starting_state_space(point);
                let next_x0 = waypoint_state(point);
                let mut goal_space =
                    cruising_state_space(&next_x0, self.route[self.route_counter + 1]);
                // make the goal smaller to allow for some rounding or other
                // errors but still accept the final state in the simulation
                goal_space.extend_absolute([-2, -2, -2, -1, -1, -1]);
                state_space.offset(point);
                goal_space.offset(point);
                (state_space, goal_space, Unit3::ONE)
            }
            Phase::Cruising => {
                let mut state_space = cruising_state_space(x0, Unit3::ZERO);
                let next = self.route[self.route_counter + 1];
                let next_x0 = waypoint_state(point);
                let mut goal_space = if next.z != 0 {
                    cruising_state_space(&next_x0, next)
                } else {
                    landing_state_space(&next_x0, next)
                };
                goal_space.offset(point);
                goal_space.extend_absolute([-1; 6]);

                // long legs may fly faster
                let mut extension = [0; 6];
                for i in 0..3 {
                    extension[i + 3] = (state_space.range(i).len() as Unit / 20).min(10);
                }
                state_space.extend_absolute(extension);

                let mut stretch =
                    self.stretch_policy
                        .choose(&state_space, &goal_space, x0, self.phase.name());
                if stretch != Unit3::ONE
                    && validate_stretch_factor(&state_space, &goal_space, stretch)
                        != StretchValidation::Valid
                {
                    warn!("the stretch factor {stretch} was rejected; falling back to the identity");
                    stretch = Unit3::ONE;
                }
                if stretch != Unit3::ONE {
                    state_space.extend_for_stretching(stretch);
                    goal_space.extend_for_stretching(stretch);
                }
                (state_space, goal_space, stretch)
            }
            Phase::Landing => {
                let mut state_space = landing_state_space(&self.x, point);
                // the landing goal is tight already and must not be shrunk
                let mut goal_space = landing_goal_space(point);
                state_space.offset(point);
                goal_space.offset(point);
                (state_space, goal_space, Unit3::ONE)
            }
            Phase::Done => unreachable!("the Done phase has no leg"),
        }
    }

    /// Builds the leg's solver and computes its policy, extending the state
    /// space and retrying for as long as the initial state is unreachable.
    fn build_solver(
        &mut self,
        state_space: StateSpace,
        goal_space: StateSpace,
        stretch: Unit3,
        point: Unit3,
        x0: &State6,
    ) {
        let mut state_space = state_space;
        let mut builder = SolverSpecBuilder::default()
            .state_space(state_space)
            .goal_space(goal_space)
            .delta_time(self.phase.delta_time())
            .stretch_factor(stretch)
            .projector(Arc::new(move |world: Unit3| world - point))
            .obstacles(self.obstacles.clone())
            .stages(self.config.number_of_stages)
            .disturbance_on(self.config.disturbance_on)
            .collision_cost_factor(self.config.collision_cost_factor)
            .norm_fix_point(self.config.enable_norm_fix_point)
            .initial_fix_point(self.config.enable_initial_fix_point);
        if let Some(observer) = &self.solve_observer {
            builder = builder.observer(observer.clone());
        }
        let mut solver = DpSolver::new(builder.build().expect("complete solver spec"));

        loop {
            match solver.calculate_controller(x0) {
                Some(stage) => {
                    debug!("calculation stopped at stage {stage}");
                    self.major_time = stage as i64;
                    break;
                }
                None => {
                    warn!("could not find a path from x0 to the goal. recalculating the controller with an extended state space.");
                    state_space.extend_absolute([2, 2, 2, 0, 0, 0]);
                    if stretch != Unit3::ONE {
                        state_space.extend_for_stretching(stretch);
                    }
                    // the grid must never reach below the ground plane
                    if state_space.begin[2] < -point.z {
                        state_space.begin[2] = -point.z;
                    }
                    solver.reinitialize(state_space);
                }
            }
        }
        self.solver = Some(solver);
    }

    /// True while the continuous state sits inside the declared state space
    /// of the current phase. Violations are observed, not enforced.
    fn invariant_holds(&self) -> bool {
        let point = self.current_route_point();
        match self.phase {
            Phase::Starting => starting_state_space(point).contains(&self.x),
            Phase::Cruising => cruising_state_space(&self.x, point).contains(&self.x),
            Phase::Landing => landing_state_space(&self.x, point).contains(&self.x),
            Phase::Done => false,
        }
    }

    /// Fires the phase transition when the continuous state entered the goal
    /// box of the current leg.
    fn check_transition(&mut self) {
        let point = self.current_route_point();
        match self.phase {
            Phase::Starting => {
                let next_x0 = waypoint_state(point);
                let goal_space = cruising_state_space(&next_x0, self.route[self.route_counter + 1]);
                if goal_space.contains(&self.x) {
                    self.do_transition(Phase::Cruising, goal_space);
                }
            }
            Phase::Cruising => {
                let next = self.route[self.route_counter + 1];
                let next_x0 = waypoint_state(point);
                if next.z != 0 {
                    let goal_space = cruising_state_space(&next_x0, next);
                    if goal_space.contains(&self.x) {
                        self.do_transition(Phase::Cruising, goal_space);
                    }
                } else if self.route_counter + 1 == self.route.len() - 1 {
                    let goal_space = landing_state_space(&next_x0, next);
                    if goal_space.contains(&self.x) {
                        self.do_transition(Phase::Landing, goal_space);
                    }
                } else {
                    unreachable!("route validation admits a ground waypoint only at the end");
                }
            }
            Phase::Landing => {
                let goal_space = landing_goal_space(point);
                if goal_space.contains(&self.x) {
                    self.do_transition(Phase::Done, goal_space);
                }
            }
            Phase::Done => {}
        }
    }

    fn do_transition(&mut self, new_phase: Phase, old_goal_space: StateSpace) {
        let old_phase = self.phase;
        self.phase = new_phase;
        self.route_counter += 1;
        self.major_time = 0;
        self.minor_time = 0;
        let new_point = self.current_route_point();
        self.notify_phase_changed(old_phase, new_phase, new_point, old_goal_space);
        self.solver = None;
    }

    fn current_route_point(&self) -> Unit3 {
        if self.route_counter < self.route.len() {
            self.route[self.route_counter]
        } else {
            self.route[0]
        }
    }

    fn local_state(&self, point: Unit3) -> State6 {
        [
            self.x[0] - point.x as f32,
            self.x[1] - point.y as f32,
            self.x[2] - point.z as f32,
            self.x[3],
            self.x[4],
            self.x[5],
        ]
    }

    fn notify_phase_changed(
        &mut self,
        old_phase: Phase,
        new_phase: Phase,
        new_point: Unit3,
        old_goal_space: StateSpace,
    ) {
        let event = PhaseChangedEvent {
            old_phase: old_phase.name(),
            new_phase: new_phase.name(),
            new_point,
            old_goal_space,
            time: self.time,
        };
        for observer in self.observers.iter_mut() {
            observer.phase_changed(&event);
        }
    }

    fn notify_x_changed(&mut self, old_x: State6, input: Unit3, disturbance: Unit3) {
        let event = XChangedEvent {
            old_x,
            new_x: self.x,
            input,
            disturbance,
            time: self.time,
        };
        for observer in self.observers.iter_mut() {
            observer.x_changed(&event);
        }
    }
}

/// The world-frame state sitting on a waypoint with zero velocity.
fn waypoint_state(point: Unit3) -> State6 {
    [point.x as f32, point.y as f32, point.z as f32, 0.0, 0.0, 0.0]
}

/// The takeoff box: a small column above the launch pad.
fn starting_state_space(point: Unit3) -> StateSpace {
    StateSpace {
        begin: [point.x - 3, point.y - 3, 0, -5, -5, -5],
        step: [STEP_SIZE; 6],
        end: [point.x + 3, point.y + 3, point.z + 1, 5, 5, 5],
    }
}

/// The cruising box: the axis-aligned hull of the current state and the
/// target waypoint, padded by 5 on every position axis.
fn cruising_state_space(x: &State6, point: Unit3) -> StateSpace {
    StateSpace {
        begin: [
            point.x.min(x[0] as Unit) - 5,
            point.y.min(x[1] as Unit) - 5,
            point.z.min(x[2] as Unit) - 5,
            -5,
            -5,
            -5,
        ],
        step: [STEP_SIZE; 6],
        end: [
            point.x.max(x[0] as Unit) + 5,
            point.y.max(x[1] as Unit) + 5,
            point.z.max(x[2] as Unit) + 5,
            5,
            5,
            5,
        ],
    }
}

/// The landing box: a column over the touchdown pad, reaching up to the
/// current altitude.
fn landing_state_space(x: &State6, point: Unit3) -> StateSpace {
    if x[2] <= 0.0 {
        warn!("the z coordinate of the current state given to the landing state space is less or equal to 0. this will most likely result in a fatal crash.");
    }
    StateSpace {
        begin: [point.x - 4, point.y - 4, 0, -5, -5, -5],
        step: [STEP_SIZE; 6],
        end: [
            point.x + 4,
            point.y + 4,
            (x[2] as Unit).max(point.z) + 1,
            5,
            5,
            5,
        ],
    }
}

/// The touchdown box: nearly on the pad, nearly at rest.
fn landing_goal_space(point: Unit3) -> StateSpace {
    StateSpace {
        begin: [point.x - 3, point.y - 3, 0, -3, -3, -3],
        step: [STEP_SIZE; 6],
        end: [point.x + 3, point.y + 3, 3, 3, 3, 3],
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_route {
    use crate::common::Unit3;
    use crate::implementation::automaton::{validate_route, RouteError};

    fn valid_route() -> Vec<Unit3> {
        vec![
            Unit3::new(0, 0, 0),
            Unit3::new(0, 0, 10),
            Unit3::new(8, 0, 12),
            Unit3::new(8, 0, 0),
        ]
    }

    #[test]
    fn a_valid_route_passes() {
        assert!(validate_route(&valid_route()).is_ok());
    }

    #[test]
    fn a_route_needs_four_points() {
        let mut route = valid_route();
        route.truncate(3);
        assert!(matches!(validate_route(&route), Err(RouteError::TooShort)));
    }

    #[test]
    fn takeoff_must_start_on_the_ground() {
        let mut route = valid_route();
        route[0].z = 1;
        assert!(matches!(
            validate_route(&route),
            Err(RouteError::FirstNotOnGround)
        ));
    }

    #[test]
    fn takeoff_must_be_vertical() {
        let mut route = valid_route();
        route[1].x = 2;
        assert!(matches!(
            validate_route(&route),
            Err(RouteError::StartNotVertical)
        ));
    }

    #[test]
    fn touchdown_must_end_on_the_ground() {
        let mut route = valid_route();
        route[3].z = 2;
        assert!(matches!(
            validate_route(&route),
            Err(RouteError::LastNotOnGround)
        ));
    }

    #[test]
    fn touchdown_must_be_vertical() {
        let mut route = valid_route();
        route[2].x = 9;
        assert!(matches!(
            validate_route(&route),
            Err(RouteError::EndNotVertical)
        ));
    }

    #[test]
    fn interior_waypoints_must_cruise_high_enough() {
        let mut route = valid_route();
        route[2].z = 5;
        assert!(matches!(
            validate_route(&route),
            Err(RouteError::LowWaypoint { index: 2 })
        ));
    }
}

#[cfg(test)]
mod test_geometry {
    use crate::common::Unit3;
    use crate::implementation::automaton::*;

    #[test]
    fn the_takeoff_box_is_a_column_over_the_pad() {
        let space = starting_state_space(Unit3::new(4, -2, 10));
        assert_eq!([1, -5, 0, -5, -5, -5], space.begin);
        assert_eq!([7, 1, 11, 5, 5, 5], space.end);
    }

    #[test]
    fn the_cruising_box_hulls_state_and_waypoint() {
        let x = [-3.0, 2.0, 12.0, 0.0, 0.0, 0.0];
        let space = cruising_state_space(&x, Unit3::new(6, 0, 10));
        assert_eq!([-8, -5, 5, -5, -5, -5], space.begin);
        assert_eq!([11, 7, 17, 5, 5, 5], space.end);
    }

    #[test]
    fn the_landing_box_reaches_up_to_the_current_altitude() {
        let x = [6.0, 0.0, 12.0, 0.0, 0.0, 0.0];
        let space = landing_state_space(&x, Unit3::new(6, 0, 0));
        assert_eq!([2, -4, 0, -5, -5, -5], space.begin);
        assert_eq!([10, 4, 13, 5, 5, 5], space.end);
    }

    #[test]
    fn the_touchdown_box_is_nearly_at_rest() {
        let space = landing_goal_space(Unit3::new(6, 0, 0));
        assert_eq!([3, -3, 0, -3, -3, -3], space.begin);
        assert_eq!([9, 3, 3, 3, 3, 3], space.end);
    }

    #[test]
    fn phases_expose_their_names() {
        assert_eq!("Starting", Phase::Starting.name());
        assert_eq!("Done", Phase::Done.name());
        assert_eq!(1, Phase::Landing.delta_time());
        assert_eq!(0, Phase::Done.delta_time());
    }
}
