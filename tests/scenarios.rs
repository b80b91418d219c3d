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

//! End-to-end scenarios: solve a leg, then fly the extracted policy forward
//! and check what actually happens.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use dronedp::*;

fn box6(position: i32, velocity: i32) -> StateSpace {
    StateSpace {
        begin: [
            -position, -position, -position, -velocity, -velocity, -velocity,
        ],
        step: [1; 6],
        end: [position, position, position, velocity, velocity, velocity],
    }
}

/// Flies the policy forward on the integer lattice (no disturbance, no drag),
/// advancing the policy stage on every tick. Returns the tick at which the
/// goal box was entered.
fn simulate(
    solver: &DpSolver,
    goal: &StateSpace,
    mut x: State6,
    start_stage: usize,
    max_ticks: usize,
    mut inspect: impl FnMut(&State6, &State6),
) -> Option<usize> {
    let mut i_time = start_stage as i64;
    for tick in 0..=max_ticks {
        if goal.contains(&x) {
            return Some(tick);
        }
        let u = solver.get_control(&x, i_time).expect("the policy must cover the flown path");
        let old = x;
        for i in 0..3 {
            x[i + 3] += u[i] as f32;
            x[i] += x[i + 3];
        }
        inspect(&old, &x);
        i_time += 1;
    }
    if goal.contains(&x) {
        return Some(max_ticks + 1);
    }
    None
}

#[test]
fn s1_a_trivial_goal_is_reached_within_the_horizon() {
    let spec = SolverSpecBuilder::default()
        .state_space(box6(5, 2))
        .goal_space(box6(1, 1))
        .delta_time(1)
        .projector(Arc::new(|p| p))
        .stages(10)
        .disturbance_on(false)
        .workers(4)
        .build()
        .expect("complete solver spec");
    let mut solver = DpSolver::new(spec);

    let x0: State6 = [5.0, 0.0, 0.0, 0.0, 0.0, 0.0];
    let stage = solver.calculate_controller(&x0).expect("the goal is reachable");
    assert!(stage <= 6);

    let goal = box6(1, 1);
    let entered = simulate(&solver, &goal, x0, stage, 8, |_, _| {});
    assert!(entered.is_some(), "the simulated flight must enter the goal box");
}

#[test]
fn s2_the_wall_is_avoided_with_clearance() {
    let mut obstacles = vec![];
    for y in -3..=3 {
        obstacles.push(Unit3::new(2, y, 0));
    }
    let goal = StateSpace {
        begin: [3, -1, -1, -1, -1, -1],
        step: [1; 6],
        end: [5, 1, 1, 1, 1, 1],
    };
    let spec = SolverSpecBuilder::default()
        .state_space(box6(5, 2))
        .goal_space(goal)
        .delta_time(1)
        .projector(Arc::new(|p| p))
        .obstacles(obstacles.clone())
        .stages(16)
        .disturbance_on(false)
        .workers(4)
        .build()
        .expect("complete solver spec");
    let mut solver = DpSolver::new(spec);

    let x0: State6 = [-4.0, 0.0, 0.0, 0.0, 0.0, 0.0];
    let stage = solver.calculate_controller(&x0).expect("a way around the wall exists");

    let cell = |x: &State6| {
        [
            (x[0] as i32 + 5) as usize,
            (x[1] as i32 + 5) as usize,
            (x[2] as i32 + 5) as usize,
        ]
    };
    let cloud = solver.collision_cloud();
    let mut collided = false;
    let mut too_close = false;
    let entered = simulate(&solver, &goal, x0, stage, 14, |old, new| {
        collided |= cloud.will_collide(cell(old), cell(new));
        too_close |= cloud.min_distance_2(cell(new)) < 1.5 * 1.5;
    });
    assert!(entered.is_some(), "the simulated flight must enter the goal box");
    assert!(!collided, "no simulated step may trigger the collision predicate");
    assert!(!too_close, "no visited cell may violate the obstacle clearance");
}

#[test]
fn s3_the_adversary_can_only_make_things_worse() {
    let build = |disturbance_on: bool| {
        let spec = SolverSpecBuilder::default()
            .state_space(box6(5, 3))
            .goal_space(box6(1, 1))
            .delta_time(1)
            .projector(Arc::new(|p| p))
            .stages(12)
            .disturbance_on(disturbance_on)
            .workers(4)
            .build()
            .expect("complete solver spec");
        DpSolver::new(spec)
    };
    let x0: State6 = [3.0, 0.0, 0.0, 0.0, 0.0, 0.0];

    let mut nominal = build(false);
    nominal.calculate_controller(&x0).expect("nominally reachable");
    let a = nominal.cost_to_go(0, &x0).expect("on grid");
    assert!(a < INFINITE_COST);

    let mut robust = build(true);
    let _ = robust.calculate_controller(&x0);
    let b = robust.cost_to_go(0, &x0).expect("on grid");
    assert!(b >= a);
}

#[test]
fn s4_the_norm_fix_point_stops_a_long_horizon_early() {
    let spec = SolverSpecBuilder::default()
        .state_space(box6(3, 2))
        .goal_space(box6(1, 1))
        .delta_time(1)
        .projector(Arc::new(|p| p))
        .stages(200)
        .disturbance_on(false)
        .norm_fix_point(true)
        .workers(4)
        .build()
        .expect("complete solver spec");
    let mut solver = DpSolver::new(spec);

    let x0: State6 = [3.0, 0.0, 0.0, 0.0, 0.0, 0.0];
    let stage = solver.calculate_controller(&x0).expect("reachable");
    assert!(stage > 0, "200 stages on a tiny grid must hit the fix point early");
    assert!(solver.cost_to_go(stage, &x0).expect("on grid") < INFINITE_COST);
}

#[test]
fn s5_an_unreachable_leg_recovers_after_one_extension() {
    let goal = StateSpace {
        begin: [4, 4, 4, -1, -1, -1],
        step: [1; 6],
        end: [5, 5, 5, 1, 1, 1],
    };
    let spec = SolverSpecBuilder::default()
        .state_space(box6(3, 2))
        .goal_space(goal)
        .delta_time(1)
        .projector(Arc::new(|p| p))
        .stages(12)
        .disturbance_on(false)
        .workers(4)
        .build()
        .expect("complete solver spec");
    let mut solver = DpSolver::new(spec);

    let x0: State6 = [0.0; 6];
    assert_eq!(None, solver.calculate_controller(&x0), "the goal lies outside the grid");

    // what the leg driver does on an unreachable result
    let mut extended = *solver.state_space();
    extended.extend_absolute([2, 2, 2, 0, 0, 0]);
    solver.reinitialize(extended);
    let stage = solver
        .calculate_controller(&x0)
        .expect("one extension suffices");
    assert!(solver.cost_to_go(stage, &x0).expect("on grid") < INFINITE_COST);
}

#[test]
fn s6_the_cached_predicate_matches_an_uncached_reference() {
    let mut rng = StdRng::seed_from_u64(2024);
    let mut cloud = CollisionCloud::new([8, 8, 8], 1);
    let mut obstacles = vec![];
    for _ in 0..50 {
        let point = Unit3::new(rng.gen_range(0..8), rng.gen_range(0..8), rng.gen_range(0..8));
        obstacles.push(point);
        cloud.add_obstacle(point);
    }

    for _ in 0..10_000 {
        let a = [rng.gen_range(0..8), rng.gen_range(0..8), rng.gen_range(0..8)];
        let b = [rng.gen_range(0..8), rng.gen_range(0..8), rng.gen_range(0..8)];
        let forward = cloud.will_collide(a, b);
        let backward = cloud.will_collide(b, a);
        assert_eq!(forward, backward);
        assert_eq!(forward, reference_will_collide(&obstacles, a, b));
    }
}

/// Straightforward, cache-free rendition of the segment-vs-points predicate.
fn reference_will_collide(obstacles: &[Unit3], a: [usize; 3], b: [usize; 3]) -> bool {
    let min_dist_2 = 1.5f64 * 1.5;
    let a = [a[0] as f64, a[1] as f64, a[2] as f64];
    let b = [b[0] as f64, b[1] as f64, b[2] as f64];
    obstacles.iter().any(|obstacle| {
        let o = [obstacle.x as f64, obstacle.y as f64, obstacle.z as f64];
        let d = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
        let len_2 = d[0] * d[0] + d[1] * d[1] + d[2] * d[2];
        let distance_2 = if len_2 == 0.0 {
            (0..3).map(|i| (o[i] - a[i]) * (o[i] - a[i])).sum::<f64>()
        } else {
            let t = ((0..3).map(|i| (o[i] - a[i]) * d[i]).sum::<f64>() / len_2).clamp(0.0, 1.0);
            (0..3)
                .map(|i| {
                    let closest = a[i] + t * d[i];
                    (o[i] - closest) * (o[i] - closest)
                })
                .sum::<f64>()
        };
        distance_2 < min_dist_2
    })
}

#[test]
fn a_whole_route_is_flown_to_completion() {
    let route = vec![
        Unit3::new(0, 0, 0),
        Unit3::new(0, 0, 10),
        Unit3::new(6, 0, 10),
        Unit3::new(6, 0, 0),
    ];
    let config = Config {
        number_of_stages: 16,
        disturbance_on: false,
        apply_disturbance: false,
        ..Default::default()
    };
    let disturbance = RandomWalkDisturbance::new(false, 10, 1);
    let mut automaton = HybridAutomaton::new(route, vec![], config, Box::new(disturbance))
        .expect("a valid route");
    automaton.run_until_end().expect("the route is flyable");

    assert_eq!(Phase::Done, automaton.phase());
    let x = automaton.x();
    assert!((x[0] - 6.0).abs() <= 3.0, "touchdown near the last waypoint");
    assert!((x[1]).abs() <= 3.0, "touchdown near the last waypoint");
    assert!(x[2] <= 3.0, "touchdown on the ground");
}
