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

//! This module provides the human-readable trace of the simulated flight:
//! a `FlightObserver` narrating every move and phase change through the
//! logging infrastructure and, optionally, into a per-run file.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::info;

use crate::abstraction::{FlightObserver, PhaseChangedEvent, XChangedEvent};

/// Narrates the flight. Each event becomes one line like
/// `  12.00 : Drone moved with input [ 0, 0, 2 ] to coordinates [ ... ]`.
#[derive(Default)]
pub struct FlightLogger {
    file: Option<BufWriter<File>>,
}

impl FlightLogger {
    /// A logger that only talks to the logging infrastructure.
    pub fn new() -> Self {
        FlightLogger { file: None }
    }

    /// A logger that additionally appends every line to the given file.
    pub fn with_file<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        Ok(FlightLogger {
            file: Some(BufWriter::new(
                File::options().create(true).append(true).open(path)?,
            )),
        })
    }

    fn emit(&mut self, line: String) {
        info!("{line}");
        if let Some(file) = self.file.as_mut() {
            let _ = writeln!(file, "{line}");
            let _ = file.flush();
        }
    }
}

impl FlightObserver for FlightLogger {
    fn phase_changed(&mut self, event: &PhaseChangedEvent) {
        self.emit(format!(
            "{:7.2} : State changed from {{ {} }} to {{ {} }}. Next waypoint: [ {} ]",
            event.time, event.old_phase, event.new_phase, event.new_point
        ));
    }

    fn x_changed(&mut self, event: &XChangedEvent) {
        self.emit(format!(
            "{:7.2} : Drone moved with input [ {} ] to coordinates [ {:.2}, {:.2}, {:.2} ] and velocity [ {:.2}, {:.2}, {:.2} ]. Disturbance is: [ {} ]",
            event.time,
            event.input,
            event.new_x[0],
            event.new_x[1],
            event.new_x[2],
            event.new_x[3],
            event.new_x[4],
            event.new_x[5],
            event.disturbance
        ));
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################
