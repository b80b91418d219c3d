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

//! This module provides the run configuration: an immutable value assembled
//! once at startup from a `key=value` text file and command-line overrides,
//! then passed explicitly to whoever needs it. Unrecognized file keys are
//! ignored.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use fxhash::FxHashMap;

/// The ways assembling or validating a configuration can fail. All of them
/// are fatal: the process reports and exits before any solve.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error {0}")]
    Io(#[from] std::io::Error),
    #[error("{key} is required but not set")]
    MissingKey { key: &'static str },
    #[error("{key} is not an int: '{value}'")]
    NotAnInt { key: &'static str, value: String },
    #[error("{key} is not a float: '{value}'")]
    NotAFloat { key: &'static str, value: String },
    #[error("{key} is not a bool: '{value}'")]
    NotABool { key: &'static str, value: String },
    #[error("{key} must be positive: '{value}'")]
    NotPositive { key: &'static str, value: String },
    #[error("{} does not exist or is not a regular file", .0.display())]
    NotAFile(PathBuf),
}

/// The effective configuration of one run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Appended to the name of the output directory.
    pub description: String,
    /// The obstacle source file.
    pub collision_cloud_file: PathBuf,
    /// The waypoint source file.
    pub route_file: PathBuf,
    /// The horizon of every solve.
    pub number_of_stages: usize,
    /// Weight of the obstacle-proximity cost term; 0 disables it.
    pub collision_cost_factor: f32,
    /// Solve against the disturbance family rather than its null member.
    pub disturbance_on: bool,
    /// Inject disturbances during the simulation.
    pub apply_disturbance: bool,
    /// Expected dwell time of the disturbance source.
    pub disturbance_change_factor: u32,
    /// Stop a solve once the finite-state count has settled.
    pub enable_norm_fix_point: bool,
    /// Stop a solve once the region around x0 is covered.
    pub enable_initial_fix_point: bool,
    /// Advance the policy stage once per period of sub-ticks instead of
    /// pinning it.
    pub use_single_stage_controller: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            description: String::new(),
            collision_cloud_file: PathBuf::new(),
            route_file: PathBuf::new(),
            number_of_stages: 30,
            collision_cost_factor: 0.0,
            disturbance_on: true,
            apply_disturbance: true,
            disturbance_change_factor: 10,
            enable_norm_fix_point: false,
            enable_initial_fix_point: false,
            use_single_stage_controller: false,
        }
    }
}

impl Config {
    /// Parses a `key=value` file into a raw string map. Blank lines and lines
    /// starting with `#` or a space are skipped; a line splits at its first
    /// `=`.
    pub fn load_raw<P: AsRef<Path>>(path: P) -> Result<FxHashMap<String, String>, ConfigError> {
        let content = fs::read_to_string(path)?;
        let mut map = FxHashMap::default();
        for line in content.lines() {
            if line.is_empty() || line.starts_with(' ') || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                map.insert(key.to_string(), value.to_string());
            }
        }
        Ok(map)
    }

    /// Builds a typed configuration from a raw map, falling back to the
    /// defaults for absent keys. Unknown keys are ignored.
    pub fn from_map(map: &FxHashMap<String, String>) -> Result<Self, ConfigError> {
        let mut config = Config::default();
        if let Some(value) = map.get("description") {
            config.description = value.clone();
        }
        if let Some(value) = map.get("collision_cloud_file") {
            config.collision_cloud_file = PathBuf::from(value);
        }
        if let Some(value) = map.get("route_file") {
            config.route_file = PathBuf::from(value);
        }
        if let Some(value) = map.get("number_of_stages") {
            config.number_of_stages = value.parse().map_err(|_| ConfigError::NotAnInt {
                key: "number_of_stages",
                value: value.clone(),
            })?;
        }
        if let Some(value) = map.get("collision_cost_factor") {
            config.collision_cost_factor =
                value.parse().map_err(|_| ConfigError::NotAFloat {
                    key: "collision_cost_factor",
                    value: value.clone(),
                })?;
        }
        if let Some(value) = map.get("disturbance_on") {
            config.disturbance_on = parse_bool(value, "disturbance_on")?;
        }
        if let Some(value) = map.get("apply_disturbance") {
            config.apply_disturbance = parse_bool(value, "apply_disturbance")?;
        }
        if let Some(value) = map.get("disturbance_change_factor") {
            config.disturbance_change_factor =
                value.parse().map_err(|_| ConfigError::NotAnInt {
                    key: "disturbance_change_factor",
                    value: value.clone(),
                })?;
        }
        if let Some(value) = map.get("enable_norm_fix_point") {
            config.enable_norm_fix_point = parse_bool(value, "enable_norm_fix_point")?;
        }
        if let Some(value) = map.get("enable_initial_fix_point") {
            config.enable_initial_fix_point = parse_bool(value, "enable_initial_fix_point")?;
        }
        if let Some(value) = map.get("use_single_stage_controller") {
            config.use_single_stage_controller =
                parse_bool(value, "use_single_stage_controller")?;
        }
        Ok(config)
    }

    /// Checks the cross-field constraints: the input files must exist, the
    /// horizon must allow at least one backward stage, and the disturbance
    /// dwell must be drawable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.route_file.as_os_str().is_empty() {
            return Err(ConfigError::MissingKey { key: "route_file" });
        }
        if self.collision_cloud_file.as_os_str().is_empty() {
            return Err(ConfigError::MissingKey {
                key: "collision_cloud_file",
            });
        }
        for path in [&self.route_file, &self.collision_cloud_file] {
            if !path.is_file() {
                return Err(ConfigError::NotAFile(path.clone()));
            }
        }
        if self.number_of_stages < 2 {
            return Err(ConfigError::NotPositive {
                key: "number_of_stages",
                value: self.number_of_stages.to_string(),
            });
        }
        if self.disturbance_change_factor == 0 {
            return Err(ConfigError::NotPositive {
                key: "disturbance_change_factor",
                value: self.disturbance_change_factor.to_string(),
            });
        }
        Ok(())
    }

    /// Writes the effective configuration back out as `key=value` lines.
    pub fn save<W: Write>(&self, mut out: W) -> std::io::Result<()> {
        writeln!(out, "description={}", self.description)?;
        writeln!(
            out,
            "collision_cloud_file={}",
            self.collision_cloud_file.display()
        )?;
        writeln!(out, "route_file={}", self.route_file.display())?;
        writeln!(out, "number_of_stages={}", self.number_of_stages)?;
        writeln!(out, "collision_cost_factor={}", self.collision_cost_factor)?;
        writeln!(out, "disturbance_on={}", self.disturbance_on)?;
        writeln!(out, "apply_disturbance={}", self.apply_disturbance)?;
        writeln!(
            out,
            "disturbance_change_factor={}",
            self.disturbance_change_factor
        )?;
        writeln!(out, "enable_norm_fix_point={}", self.enable_norm_fix_point)?;
        writeln!(
            out,
            "enable_initial_fix_point={}",
            self.enable_initial_fix_point
        )?;
        writeln!(
            out,
            "use_single_stage_controller={}",
            self.use_single_stage_controller
        )?;
        Ok(())
    }
}

fn parse_bool(value: &str, key: &'static str) -> Result<bool, ConfigError> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(ConfigError::NotABool {
            key,
            value: value.to_string(),
        }),
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_config {
    use std::io::Write;

    use fxhash::FxHashMap;

    use crate::config::{Config, ConfigError};

    #[test]
    fn defaults_match_the_documented_table() {
        let config = Config::default();
        assert_eq!(30, config.number_of_stages);
        assert_eq!(0.0, config.collision_cost_factor);
        assert!(config.disturbance_on);
        assert!(config.apply_disturbance);
        assert_eq!(10, config.disturbance_change_factor);
        assert!(!config.enable_norm_fix_point);
        assert!(!config.enable_initial_fix_point);
        assert!(!config.use_single_stage_controller);
    }

    #[test]
    fn comments_and_unknown_keys_are_ignored() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("config.txt");
        let mut file = std::fs::File::create(&path).expect("config file");
        writeln!(file, "# a comment").unwrap();
        writeln!(file, " indented lines are comments too").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "number_of_stages=42").unwrap();
        writeln!(file, "some_unknown_key=whatever").unwrap();
        drop(file);

        let raw = Config::load_raw(&path).expect("parsable");
        let config = Config::from_map(&raw).expect("typed");
        assert_eq!(42, config.number_of_stages);
    }

    #[test]
    fn booleans_are_strictly_true_or_false() {
        let mut map = FxHashMap::default();
        map.insert("disturbance_on".to_string(), "yes".to_string());
        assert!(matches!(
            Config::from_map(&map),
            Err(ConfigError::NotABool { key: "disturbance_on", .. })
        ));
    }

    #[test]
    fn a_malformed_int_is_reported() {
        let mut map = FxHashMap::default();
        map.insert("number_of_stages".to_string(), "thirty".to_string());
        assert!(matches!(
            Config::from_map(&map),
            Err(ConfigError::NotAnInt { key: "number_of_stages", .. })
        ));
    }

    #[test]
    fn validation_requires_the_input_files() {
        let config = Config::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingKey { key: "route_file" })
        ));
    }

    #[test]
    fn a_value_may_contain_an_equals_sign() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("config.txt");
        std::fs::write(&path, "description=a=b\n").expect("config file");
        let raw = Config::load_raw(&path).expect("parsable");
        assert_eq!("a=b", raw["description"]);
    }

    #[test]
    fn save_round_trips_through_load() {
        let mut config = Config::default();
        config.description = "demo".to_string();
        config.number_of_stages = 12;
        let mut buffer = vec![];
        config.save(&mut buffer).expect("writable");

        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("config.txt");
        std::fs::write(&path, &buffer).expect("file");
        let reloaded = Config::from_map(&Config::load_raw(&path).expect("parsable")).expect("typed");
        assert_eq!("demo", reloaded.description);
        assert_eq!(12, reloaded.number_of_stages);
    }
}
