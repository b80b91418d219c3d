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

//! This module provides the obstacle set of one solver instance together with
//! the memoised "will this move collide?" predicate. The predicate asks
//! whether the straight segment between two lattice cells passes within a
//! safety distance of any obstacle; its answers are cached per cell pair
//! because successor cells repeat massively across the 6-d sweep.

use std::sync::atomic::{AtomicI8, Ordering};

use fxhash::FxHashSet;

use crate::common::{Unit, Unit3};

/// The clearance that must be kept around every obstacle, in meters.
pub const MIN_DISTANCE_TO_COLLISION: f64 = 1.5;

const UNKNOWN: i8 = -1;
const NO: i8 = 0;
const YES: i8 = 1;

/// The obstacle set of one solver instance, in solver-local lattice
/// coordinates, plus the decision cache of the segment-vs-points predicate.
///
/// The cache is a dense array of tri-state bytes indexed by the pair of cells.
/// All sweep workers share it behind a plain `&`: each entry is written at
/// most once per distinct answer, the answer is a pure function of the
/// immutable obstacle set, and relaxed atomics make the concurrent
/// populate race-free without ever blocking the sweep.
pub struct CollisionCloud {
    obstacles: Vec<Unit3>,
    lengths: [usize; 3],
    min_dist: f64,
    min_dist_2: f64,
    cache: Vec<AtomicI8>,
}

impl CollisionCloud {
    /// Creates an empty cloud for a position grid of the given dimensions.
    /// All cache entries start out unknown.
    pub fn new(lengths: [usize; 3], step_size: Unit) -> Self {
        let min_dist = MIN_DISTANCE_TO_COLLISION / step_size as f64;
        let cells = lengths[0] * lengths[1] * lengths[2];
        let mut cache = Vec::with_capacity(cells * cells);
        cache.resize_with(cells * cells, || AtomicI8::new(UNKNOWN));
        CollisionCloud {
            obstacles: vec![],
            lengths,
            min_dist,
            min_dist_2: min_dist * min_dist,
            cache,
        }
    }

    /// Adds a single obstacle cell.
    pub fn add_obstacle(&mut self, cell: Unit3) {
        self.obstacles.push(cell);
    }

    /// Adds a batch of obstacle cells, dropping duplicates: distinct world
    /// points routinely project onto the same lattice cell and the predicate
    /// cost is linear in the obstacle count.
    pub fn add_obstacles<I: IntoIterator<Item = Unit3>>(&mut self, cells: I) {
        let mut seen: FxHashSet<Unit3> = self.obstacles.iter().copied().collect();
        for cell in cells {
            if seen.insert(cell) {
                self.obstacles.push(cell);
            }
        }
    }

    pub fn obstacles(&self) -> &[Unit3] {
        &self.obstacles
    }

    /// The squared lattice distance from `cell` to the closest obstacle, or
    /// `f64::MAX` when the cloud is empty.
    pub fn min_distance_2(&self, cell: [usize; 3]) -> f64 {
        let mut min = f64::MAX;
        for obstacle in &self.obstacles {
            let dx = cell[0] as f64 - obstacle.x as f64;
            let dy = cell[1] as f64 - obstacle.y as f64;
            let dz = cell[2] as f64 - obstacle.z as f64;
            let distance_2 = dx * dx + dy * dy + dz * dz;
            if distance_2 < min {
                min = distance_2;
            }
        }
        min
    }

    /// Does the straight segment from `i_old` to `i_new` pass within the
    /// safety distance of any obstacle?
    pub fn will_collide(&self, i_old: [usize; 3], i_new: [usize; 3]) -> bool {
        let entry = &self.cache[self.cache_index(i_old, i_new)];
        match entry.load(Ordering::Relaxed) {
            NO => return false,
            YES => return true,
            _ => {}
        }

        let answer = self.segment_hits_an_obstacle(i_old, i_new);
        entry.store(if answer { YES } else { NO }, Ordering::Relaxed);
        answer
    }

    fn cache_index(&self, i_old: [usize; 3], i_new: [usize; 3]) -> usize {
        let [_, ny, nz] = self.lengths;
        let cells = self.lengths[0] * ny * nz;
        let old = (i_old[0] * ny + i_old[1]) * nz + i_old[2];
        let new = (i_new[0] * ny + i_new[1]) * nz + i_new[2];
        old * cells + new
    }

    fn segment_hits_an_obstacle(&self, i_old: [usize; 3], i_new: [usize; 3]) -> bool {
        let a = [i_old[0] as f64, i_old[1] as f64, i_old[2] as f64];
        let b = [i_new[0] as f64, i_new[1] as f64, i_new[2] as f64];
        let lo = [a[0].min(b[0]), a[1].min(b[1]), a[2].min(b[2])];
        let hi = [a[0].max(b[0]), a[1].max(b[1]), a[2].max(b[2])];
        let margin = self.min_dist * 2.0;

        for obstacle in &self.obstacles {
            let o = [obstacle.x as f64, obstacle.y as f64, obstacle.z as f64];
            if o[0] < lo[0] - margin
                || o[0] > hi[0] + margin
                || o[1] < lo[1] - margin
                || o[1] > hi[1] + margin
                || o[2] < lo[2] - margin
                || o[2] > hi[2] + margin
            {
                continue;
            }
            // https://mathworld.wolfram.com/Point-LineDistance3-Dimensional.html
            let distance_2 = if i_old == i_new {
                norm_2(sub(o, a))
            } else {
                let d = sub(b, a);
                let w = sub(a, o);
                let t = -dot(w, d) / norm_2(d);
                if t <= 0.0 || t >= 1.0 {
                    // distance to the nearest endpoint rather than the line
                    norm_2(sub(if t <= 0.0 { a } else { b }, o))
                } else {
                    norm_2(w) + 2.0 * t * dot(d, w) + t * t * norm_2(d)
                }
            };
            if distance_2 < self.min_dist_2 {
                return true;
            }
        }
        false
    }
}

#[inline]
fn sub(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}
#[inline]
fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}
#[inline]
fn norm_2(a: [f64; 3]) -> f64 {
    dot(a, a)
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_collision_cloud {
    use crate::common::Unit3;
    use crate::implementation::collision::CollisionCloud;

    #[test]
    fn an_empty_cloud_never_collides() {
        let cloud = CollisionCloud::new([5, 5, 5], 1);
        for x in 0..5 {
            assert!(!cloud.will_collide([0, 0, 0], [x, 4, 2]));
        }
    }

    #[test]
    fn passing_through_an_obstacle_collides() {
        let mut cloud = CollisionCloud::new([7, 7, 7], 1);
        cloud.add_obstacle(Unit3::new(3, 3, 3));
        assert!(cloud.will_collide([0, 3, 3], [6, 3, 3]));
        assert!(cloud.will_collide([3, 3, 3], [3, 3, 3]));
    }

    #[test]
    fn clearance_is_one_and_a_half_cells() {
        let mut cloud = CollisionCloud::new([7, 7, 7], 1);
        cloud.add_obstacle(Unit3::new(3, 3, 0));
        // sliding past at distance 1 violates the clearance, at distance 2 not
        assert!(cloud.will_collide([0, 4, 0], [6, 4, 0]));
        assert!(!cloud.will_collide([0, 5, 0], [6, 5, 0]));
    }

    #[test]
    fn the_predicate_is_symmetric() {
        let mut cloud = CollisionCloud::new([6, 6, 6], 1);
        cloud.add_obstacles([Unit3::new(2, 2, 2), Unit3::new(4, 1, 5), Unit3::new(0, 5, 3)]);
        for a in [[0, 0, 0], [5, 5, 5], [2, 3, 1], [4, 0, 5]] {
            for b in [[1, 1, 1], [5, 0, 2], [3, 3, 3]] {
                assert_eq!(cloud.will_collide(a, b), cloud.will_collide(b, a));
            }
        }
    }

    #[test]
    fn cached_and_fresh_answers_agree() {
        let mut cloud = CollisionCloud::new([6, 6, 6], 1);
        cloud.add_obstacle(Unit3::new(2, 2, 2));
        let first = cloud.will_collide([0, 0, 0], [5, 5, 5]);
        let second = cloud.will_collide([0, 0, 0], [5, 5, 5]);
        assert_eq!(first, second);
    }

    #[test]
    fn duplicate_obstacles_are_dropped() {
        let mut cloud = CollisionCloud::new([4, 4, 4], 1);
        cloud.add_obstacles([Unit3::new(1, 1, 1), Unit3::new(1, 1, 1), Unit3::new(2, 2, 2)]);
        assert_eq!(2, cloud.obstacles().len());
    }
}
