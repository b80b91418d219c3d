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

//! This module parses the point-list text files feeding the controller: the
//! waypoint route and the obstacle cloud share one syntax. One `x y z` triple
//! per line, blank lines and lines starting with `#` or a space are comments,
//! a literal `end` line terminates the list.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::common::{Unit, Unit3};

/// The ways reading a point file can fail.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// There was an io related error
    #[error("io error {0}")]
    Io(#[from] std::io::Error),
    /// The parser expected a number but got something else
    #[error("parse float {0}")]
    ParseFloat(#[from] std::num::ParseFloatError),
    /// A point line did not hold three values
    #[error("ill formed point line '{0}'")]
    Format(String),
}

/// Reads a point list from file. Coordinates are parsed as floats and
/// truncated onto the lattice, like the rest of the pipeline does.
pub fn read_points<P: AsRef<Path>>(path: P) -> Result<Vec<Unit3>, ParseError> {
    let file = BufReader::new(File::open(path)?);
    let mut points = vec![];
    for line in file.lines() {
        let line = line?;
        if line.is_empty() || line.starts_with(' ') || line.starts_with('#') {
            continue;
        }
        if line == "end" {
            break;
        }
        let mut values = line.split_ascii_whitespace();
        let mut component = || -> Result<Unit, ParseError> {
            let token = values.next().ok_or_else(|| ParseError::Format(line.clone()))?;
            Ok(token.parse::<f32>()? as Unit)
        };
        points.push(Unit3::new(component()?, component()?, component()?));
    }
    Ok(points)
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################
