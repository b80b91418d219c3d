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

//! This module provides the run-statistics sink of the solver: a
//! `SolveObserver` appending `key=value` lines about every solve to a text
//! file, ready for later scripting.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use parking_lot::Mutex;

use crate::abstraction::{SolveFinishedEvent, SolveObserver, SolveStartedEvent};

/// Writes one block of `key=value` statistics per solve. The solver holds its
/// observer behind a shared handle, so the writer sits behind a mutex; writes
/// happen once per solve, never inside the sweep.
pub struct DpStats {
    file: Mutex<BufWriter<File>>,
}

impl DpStats {
    pub fn create<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        Ok(DpStats {
            file: Mutex::new(BufWriter::new(File::create(path)?)),
        })
    }
}

impl SolveObserver for DpStats {
    fn solve_started(&self, event: &SolveStartedEvent) {
        let mut file = self.file.lock();
        if event.retry {
            let _ = writeln!(file, "DP started (retry)");
        } else {
            let _ = writeln!(file, "##################################################");
            let _ = writeln!(file, "DP started");
        }
        let _ = writeln!(file, "num_states={}", event.num_states);
        let _ = file.flush();
    }

    fn solve_finished(&self, event: &SolveFinishedEvent) {
        let mut file = self.file.lock();
        let _ = writeln!(file, "DP finished");
        let _ = writeln!(file, "total_duration_s={}", event.total_duration.as_secs());
        let _ = writeln!(file, "total_duration_m={}", event.total_duration.as_secs() / 60);
        let _ = writeln!(
            file,
            "first_stage_duration_ms={}",
            event.first_stage_duration.as_millis()
        );
        let _ = writeln!(
            file,
            "first_stage_duration_s={}",
            event.first_stage_duration.as_secs()
        );
        let _ = writeln!(
            file,
            "avg_stage_duration_ms={}",
            event.avg_stage_duration.as_millis()
        );
        let _ = writeln!(
            file,
            "avg_stage_duration_s={}",
            event.avg_stage_duration.as_secs()
        );
        let _ = file.flush();
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_stats {
    use std::time::Duration;

    use crate::abstraction::{SolveFinishedEvent, SolveObserver, SolveStartedEvent};
    use crate::implementation::stats::DpStats;

    #[test]
    fn a_solve_leaves_a_key_value_block() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("dp_stats.txt");
        let stats = DpStats::create(&path).expect("stats file");

        stats.solve_started(&SolveStartedEvent {
            num_states: 1234,
            retry: false,
        });
        stats.solve_started(&SolveStartedEvent {
            num_states: 2345,
            retry: true,
        });
        stats.solve_finished(&SolveFinishedEvent {
            total_duration: Duration::from_secs(90),
            first_stage_duration: Duration::from_millis(1500),
            avg_stage_duration: Duration::from_millis(250),
        });

        let content = std::fs::read_to_string(&path).expect("readable stats");
        assert!(content.contains("DP started\nnum_states=1234"));
        assert!(content.contains("DP started (retry)\nnum_states=2345"));
        assert!(content.contains("total_duration_s=90"));
        assert!(content.contains("total_duration_m=1"));
        assert!(content.contains("first_stage_duration_ms=1500"));
        assert!(content.contains("avg_stage_duration_ms=250"));
    }
}
