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

//! This module provides the built-in disturbance source: a random walk over
//! the disturbance table whose dwell time grows with the configured change
//! factor.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::abstraction::DisturbanceSource;
use crate::common::{Unit3, DISTURBANCES, NUM_DISTURBANCES};

/// A random walk over the disturbance table. On every draw the source gets
/// more likely to hop to a neighbouring table entry the longer it has dwelled
/// on the current one; the expected dwell time is governed by the change
/// factor. Deterministic for a given seed.
pub struct RandomWalkDisturbance {
    enabled: bool,
    change_factor: u32,
    last_index: i64,
    turns_since_change: i64,
    rng: StdRng,
}

impl RandomWalkDisturbance {
    /// Creates a source with an explicit seed (replayable).
    ///
    /// # Panics
    /// When `change_factor` is 0.
    pub fn new(enabled: bool, change_factor: u32, seed: u64) -> Self {
        assert!(change_factor > 0, "the change factor must be positive");
        RandomWalkDisturbance {
            enabled,
            change_factor,
            last_index: 0,
            turns_since_change: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Creates a source seeded from the operating system.
    pub fn from_entropy(enabled: bool, change_factor: u32) -> Self {
        let seed = rand::thread_rng().gen();
        Self::new(enabled, change_factor, seed)
    }
}

impl DisturbanceSource for RandomWalkDisturbance {
    fn next_disturbance(&mut self) -> Unit3 {
        if !self.enabled {
            return DISTURBANCES[0];
        }
        let will_change = self.rng.gen_range(0..self.change_factor as i64);
        let mut index = self.last_index;
        if will_change < self.turns_since_change {
            index += if self.rng.gen_bool(0.5) { -1 } else { 1 };
            index = index.rem_euclid(NUM_DISTURBANCES as i64);
            self.turns_since_change = 0;
        }
        self.last_index = index;
        self.turns_since_change += 1;
        DISTURBANCES[index as usize]
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_disturbance {
    use crate::abstraction::DisturbanceSource;
    use crate::common::{Unit3, DISTURBANCES};
    use crate::implementation::disturbance::RandomWalkDisturbance;

    #[test]
    fn a_disabled_source_is_silent() {
        let mut source = RandomWalkDisturbance::new(false, 10, 42);
        for _ in 0..100 {
            assert_eq!(Unit3::ZERO, source.next_disturbance());
        }
    }

    #[test]
    fn the_same_seed_replays_the_same_stream() {
        let mut first = RandomWalkDisturbance::new(true, 3, 7);
        let mut second = RandomWalkDisturbance::new(true, 3, 7);
        for _ in 0..1000 {
            assert_eq!(first.next_disturbance(), second.next_disturbance());
        }
    }

    #[test]
    fn every_draw_comes_from_the_table() {
        let mut source = RandomWalkDisturbance::new(true, 2, 123);
        for _ in 0..1000 {
            let drawn = source.next_disturbance();
            assert!(DISTURBANCES.contains(&drawn));
        }
    }

    #[test]
    fn the_walk_eventually_moves() {
        let mut source = RandomWalkDisturbance::new(true, 5, 99);
        let moved = (0..1000).any(|_| source.next_disturbance() != DISTURBANCES[0]);
        assert!(moved);
    }

    #[test]
    #[should_panic]
    fn a_zero_change_factor_is_rejected() {
        let _ = RandomWalkDisturbance::new(true, 0, 1);
    }
}
