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

//! This module provides the dense storage of the value iteration: one
//! contiguous slab per stage holding the cost-to-go of every grid state, and
//! its twin holding the index of the optimal input.

/// The cost marking a state from which the horizon cannot be reached. Costs
/// are accumulated as plain additions, so a sum involving this value may
/// saturate to `f32::INFINITY`; both compare `>= INFINITE_COST`.
pub const INFINITE_COST: f32 = f32::MAX;

/// The policy entry marking a state with no finite input option.
pub const NO_INPUT: i16 = -1;

/// The element strides of the state-order dimensions `(c1, c2, c3, v1, v2,
/// v3)` within one stage slab laid out in `(v1, v2, v3, c1, c2, c3)` memory
/// order.
pub fn strides_for(lengths: &[usize; 6]) -> [usize; 6] {
    let cells = lengths[0] * lengths[1] * lengths[2];
    [
        lengths[1] * lengths[2],           // c1
        lengths[2],                        // c2
        1,                                 // c3
        lengths[4] * lengths[5] * cells,   // v1
        lengths[5] * cells,                // v2
        cells,                             // v3
    ]
}

/// A contiguous `(stages x 6-d)` array with precomputed strides.
///
/// Indices are always given in state order `(c1, c2, c3, v1, v2, v3)`, but the
/// per-stage memory layout is `(v1, v2, v3, c1, c2, c3)`: the backward sweep
/// is partitioned among workers along `v1`, and making `v1` the outermost
/// dimension turns every worker's share of a stage into one contiguous
/// sub-slice. Disjoint mutable chunks then come straight out of
/// `split_at_mut`, without any shared mutable aliasing.
#[derive(Debug, Clone, PartialEq)]
pub struct StageTable<T> {
    stages: usize,
    /// state-order dimensions `(n_c1, n_c2, n_c3, n_v1, n_v2, n_v3)`
    lengths: [usize; 6],
    /// element strides of the state-order dimensions within one stage
    strides: [usize; 6],
    stage_len: usize,
    data: Vec<T>,
}

impl<T: Copy> StageTable<T> {
    /// Allocates a table of the given shape, every cell set to `fill`.
    ///
    /// # Panics
    /// When `stages` is zero.
    pub fn new(stages: usize, lengths: [usize; 6], fill: T) -> Self {
        assert!(stages > 0, "the table needs at least one stage");
        let stage_len = lengths.iter().product();
        let strides = strides_for(&lengths);
        StageTable {
            stages,
            lengths,
            strides,
            stage_len,
            data: vec![fill; stages * stage_len],
        }
    }

    pub fn stages(&self) -> usize {
        self.stages
    }
    pub fn stage_len(&self) -> usize {
        self.stage_len
    }
    pub fn lengths(&self) -> &[usize; 6] {
        &self.lengths
    }

    /// The flat offset of a state within one stage slab.
    #[inline]
    pub fn flat(&self, index: &[usize; 6]) -> usize {
        index
            .iter()
            .zip(self.strides.iter())
            .map(|(i, s)| i * s)
            .sum()
    }

    /// The number of cells of one `v1` row of a stage slab (the granularity
    /// of the worker partition).
    pub fn v1_row_len(&self) -> usize {
        self.strides[3]
    }

    #[inline]
    pub fn at(&self, stage: usize, index: &[usize; 6]) -> T {
        self.data[stage * self.stage_len + self.flat(index)]
    }

    #[inline]
    pub fn set(&mut self, stage: usize, index: &[usize; 6], value: T) {
        let flat = stage * self.stage_len + self.flat(index);
        self.data[flat] = value;
    }

    /// The slab of one stage.
    pub fn stage(&self, stage: usize) -> &[T] {
        &self.data[stage * self.stage_len..(stage + 1) * self.stage_len]
    }

    /// The slab of one stage, mutable.
    pub fn stage_mut(&mut self, stage: usize) -> &mut [T] {
        &mut self.data[stage * self.stage_len..(stage + 1) * self.stage_len]
    }

    /// The slab of `stage` mutable together with the slab of `stage + 1`
    /// shared: exactly the borrows of one backward step.
    pub fn stage_pair_mut(&mut self, stage: usize) -> (&mut [T], &[T]) {
        let (lo, hi) = self.data.split_at_mut((stage + 1) * self.stage_len);
        (&mut lo[stage * self.stage_len..], &hi[..self.stage_len])
    }

    /// The whole backing storage, in memory order.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }
}

/// The outcome of one solve: the cost-to-go `V` and the argmin input table `U`
/// over the same shape.
#[derive(Debug, Clone)]
pub struct ValueTable {
    pub cost: StageTable<f32>,
    pub policy: StageTable<i16>,
}

impl ValueTable {
    pub fn new(stages: usize, lengths: [usize; 6]) -> Self {
        ValueTable {
            cost: StageTable::new(stages, lengths, INFINITE_COST),
            policy: StageTable::new(stages, lengths, NO_INPUT),
        }
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_stage_table {
    use crate::implementation::table::*;

    #[test]
    fn every_index_maps_to_a_distinct_cell() {
        let lengths = [2, 3, 2, 2, 2, 3];
        let mut table = StageTable::new(1, lengths, 0u32);
        let mut counter = 0u32;
        for c1 in 0..lengths[0] {
            for c2 in 0..lengths[1] {
                for c3 in 0..lengths[2] {
                    for v1 in 0..lengths[3] {
                        for v2 in 0..lengths[4] {
                            for v3 in 0..lengths[5] {
                                table.set(0, &[c1, c2, c3, v1, v2, v3], counter);
                                counter += 1;
                            }
                        }
                    }
                }
            }
        }
        let mut seen = table.as_slice().to_vec();
        seen.sort_unstable();
        assert_eq!((0..counter).collect::<Vec<_>>(), seen);
    }

    #[test]
    fn v1_rows_are_contiguous_in_memory() {
        let lengths = [3, 2, 2, 4, 2, 2];
        let mut table = StageTable::new(1, lengths, -1i32);
        let row = 2;
        for c1 in 0..lengths[0] {
            for c2 in 0..lengths[1] {
                for c3 in 0..lengths[2] {
                    for v2 in 0..lengths[4] {
                        for v3 in 0..lengths[5] {
                            table.set(0, &[c1, c2, c3, row, v2, v3], 7);
                        }
                    }
                }
            }
        }
        let row_len = table.v1_row_len();
        let slab = table.stage(0);
        assert!(slab[row * row_len..(row + 1) * row_len].iter().all(|&x| x == 7));
        assert!(slab[..row * row_len].iter().all(|&x| x == -1));
        assert!(slab[(row + 1) * row_len..].iter().all(|&x| x == -1));
    }

    #[test]
    fn stage_pair_borrows_the_right_slabs() {
        let lengths = [1, 1, 1, 2, 1, 1];
        let mut table = StageTable::new(3, lengths, 0i16);
        table.set(1, &[0, 0, 0, 0, 0, 0], 11);
        table.set(2, &[0, 0, 0, 1, 0, 0], 22);
        let (cur, next) = table.stage_pair_mut(1);
        assert_eq!(11, cur[0]);
        assert_eq!(22, next[1]);
        cur[0] = 33;
        assert_eq!(33, table.at(1, &[0, 0, 0, 0, 0, 0]));
    }

    #[test]
    fn value_table_starts_infinite_and_unassigned() {
        let table = ValueTable::new(2, [2, 2, 2, 2, 2, 2]);
        assert!(table.cost.as_slice().iter().all(|&v| v >= INFINITE_COST));
        assert!(table.policy.as_slice().iter().all(|&u| u == NO_INPUT));
    }
}
