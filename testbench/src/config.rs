// Copyright (C) 2024 Ethan Uppal.
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

//! `goatgate.toml`.
//!
//! Every key is optional and the defaults reproduce the fixed parameters of
//! the testbench. Relative paths are resolved against the directory holding
//! the file.
//!
//! ```toml
//! top_module = "tt_um_ccu_goatgate"
//! sources = ["src/project.v"]
//! include_directories = ["src"]
//! artifact_directory = "artifacts"
//! clock_period_ns = 40
//! reset_cycles = 2
//! settle_ns = 40
//! trace = "tb.vcd"
//!
//! [verilator]
//! executable = "verilator"
//! optimization = 2
//! force_rebuild = false
//! ignored_warnings = ["UNUSEDSIGNAL"]
//! log = true
//! ```

use std::{fs, io};

use camino::{Utf8Path, Utf8PathBuf};
use goatgate_verilator::VerilatorRuntimeOptions;
use snafu::{OptionExt, ResultExt, Snafu, ensure};
use toml::{Table, Value};

use crate::sequencer::SequenceTiming;

pub const DEFAULT_CONFIG_FILE_NAME: &str = "goatgate.toml";
pub const DEFAULT_TOP_MODULE: &str = "tt_um_ccu_goatgate";

#[derive(Debug, Snafu)]
pub enum ConfigError {
    #[snafu(display("Failed to read configuration file {path}"))]
    Read { path: Utf8PathBuf, source: io::Error },

    #[snafu(display("Failed to parse configuration as TOML"))]
    Syntax { source: toml::de::Error },

    #[snafu(display("Key `{key}` must be {expected}"))]
    WrongType { key: String, expected: &'static str },

    #[snafu(display("Unknown configuration key `{key}`"))]
    UnknownKey { key: String },

    #[snafu(display("Key `{key}` {reason}, got {value}"))]
    OutOfRange {
        key: String,
        value: i64,
        reason: &'static str,
    },

    #[snafu(display("No Verilog sources configured"))]
    NoSources,

    #[snafu(display(
        "Source file {path} does not exist or is not a file"
    ))]
    MissingSource { path: Utf8PathBuf },
}

#[derive(Debug, Clone)]
pub struct TestbenchConfig {
    pub top_module: String,
    /// The first source defines [`TestbenchConfig::top_module`].
    pub sources: Vec<Utf8PathBuf>,
    pub include_directories: Vec<Utf8PathBuf>,
    pub artifact_directory: Utf8PathBuf,
    pub timing: SequenceTiming,
    /// VCD output, if any.
    pub trace: Option<Utf8PathBuf>,
    pub verilator: VerilatorRuntimeOptions,
}

impl Default for TestbenchConfig {
    fn default() -> Self {
        Self {
            top_module: DEFAULT_TOP_MODULE.into(),
            sources: vec!["src/project.v".into()],
            include_directories: vec![],
            artifact_directory: "artifacts".into(),
            timing: SequenceTiming::default(),
            trace: None,
            verilator: VerilatorRuntimeOptions::default_logging(),
        }
    }
}

fn expect_str<'a>(key: &str, value: &'a Value) -> Result<&'a str, ConfigError> {
    value.as_str().context(WrongTypeSnafu {
        key,
        expected: "a string",
    })
}

fn expect_bool(key: &str, value: &Value) -> Result<bool, ConfigError> {
    value.as_bool().context(WrongTypeSnafu {
        key,
        expected: "a boolean",
    })
}

fn expect_integer(
    key: &str,
    value: &Value,
    min: i64,
    max: i64,
) -> Result<i64, ConfigError> {
    let integer = value.as_integer().context(WrongTypeSnafu {
        key,
        expected: "an integer",
    })?;
    ensure!(
        (min..=max).contains(&integer),
        OutOfRangeSnafu {
            key,
            value: integer,
            reason: "is out of range",
        }
    );
    Ok(integer)
}

fn expect_paths(
    key: &str,
    value: &Value,
) -> Result<Vec<Utf8PathBuf>, ConfigError> {
    expect_strings(key, value)
        .map(|strings| strings.into_iter().map(Utf8PathBuf::from).collect())
}

fn expect_strings(key: &str, value: &Value) -> Result<Vec<String>, ConfigError> {
    let array = value.as_array().context(WrongTypeSnafu {
        key,
        expected: "an array of strings",
    })?;
    array
        .iter()
        .map(|element| {
            element.as_str().map(str::to_string).context(WrongTypeSnafu {
                key,
                expected: "an array of strings",
            })
        })
        .collect()
}

fn apply_verilator_table(
    options: &mut VerilatorRuntimeOptions,
    table: &Table,
) -> Result<(), ConfigError> {
    for (key, value) in table {
        let qualified = format!("verilator.{key}");
        match key.as_str() {
            "executable" => {
                options.verilator_executable =
                    expect_str(&qualified, value)?.into();
            }
            "optimization" => {
                options.verilator_optimization =
                    Some(expect_integer(&qualified, value, 0, 3)? as usize);
            }
            "force_rebuild" => {
                options.force_verilator_rebuild =
                    expect_bool(&qualified, value)?;
            }
            "ignored_warnings" => {
                options.ignored_warnings = expect_strings(&qualified, value)?;
            }
            "log" => {
                options.log = expect_bool(&qualified, value)?;
            }
            _ => return UnknownKeySnafu { key: qualified }.fail(),
        }
    }
    Ok(())
}

impl TestbenchConfig {
    /// Parses a configuration, leaving relative paths untouched.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let table: Table = contents.parse().context(SyntaxSnafu)?;
        let mut config = Self::default();

        for (key, value) in &table {
            match key.as_str() {
                "top_module" => {
                    config.top_module = expect_str(key, value)?.to_string();
                }
                "sources" => config.sources = expect_paths(key, value)?,
                "include_directories" => {
                    config.include_directories = expect_paths(key, value)?;
                }
                "artifact_directory" => {
                    config.artifact_directory = expect_str(key, value)?.into();
                }
                "clock_period_ns" => {
                    let period = expect_integer(key, value, 1, i64::MAX)?;
                    ensure!(
                        period % 2 == 0,
                        OutOfRangeSnafu {
                            key,
                            value: period,
                            reason: "must be an even number of nanoseconds",
                        }
                    );
                    config.timing.clock_period_ns = period as u64;
                }
                "reset_cycles" => {
                    config.timing.reset_cycles =
                        expect_integer(key, value, 0, u32::MAX.into())? as u32;
                }
                "settle_ns" => {
                    config.timing.settle_ns =
                        expect_integer(key, value, 0, i64::MAX)? as u64;
                }
                "trace" => config.trace = Some(expect_str(key, value)?.into()),
                "verilator" => {
                    let verilator = value.as_table().context(WrongTypeSnafu {
                        key,
                        expected: "a table",
                    })?;
                    apply_verilator_table(&mut config.verilator, verilator)?;
                }
                _ => return UnknownKeySnafu { key }.fail(),
            }
        }

        Ok(config)
    }

    /// Reads and parses `path`, resolving relative paths against its parent
    /// directory.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        log::info!("Loading testbench configuration from {}", path);
        let contents = fs::read_to_string(path).context(ReadSnafu {
            path: path.to_path_buf(),
        })?;
        let mut config = Self::from_toml_str(&contents)?;
        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        Ok(config)
    }

    pub fn resolve_relative_to(&mut self, base: &Utf8Path) {
        let resolve = |path: &mut Utf8PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        self.sources.iter_mut().for_each(resolve);
        self.include_directories.iter_mut().for_each(resolve);
        resolve(&mut self.artifact_directory);
        if let Some(trace) = &mut self.trace {
            resolve(trace);
        }
    }

    /// The file defining the top module.
    pub fn top_source(&self) -> Result<&Utf8Path, ConfigError> {
        self.sources
            .first()
            .map(Utf8PathBuf::as_path)
            .context(NoSourcesSnafu)
    }

    /// Checks that every configured source exists, without invoking
    /// Verilator.
    pub fn check_sources(&self) -> Result<(), ConfigError> {
        self.top_source()?;
        for source in &self.sources {
            ensure!(
                source.is_file(),
                MissingSourceSnafu {
                    path: source.clone()
                }
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() -> Result<(), ConfigError> {
        let config = TestbenchConfig::from_toml_str("")?;
        assert_eq!(config.top_module, "tt_um_ccu_goatgate");
        assert_eq!(config.timing, SequenceTiming::default());
        assert_eq!(config.timing.clock_period_ns, 40);
        assert_eq!(config.timing.reset_cycles, 2);
        assert_eq!(config.timing.settle_ns, 40);
        assert!(config.trace.is_none());
        assert!(config.verilator.log);
        Ok(())
    }

    #[test]
    fn reads_every_key() -> Result<(), ConfigError> {
        let config = TestbenchConfig::from_toml_str(
            r#"
            top_module = "tt_um_other"
            sources = ["src/project.v", "src/cells.v"]
            include_directories = ["src"]
            artifact_directory = "build"
            clock_period_ns = 100
            reset_cycles = 10
            settle_ns = 5
            trace = "tb.vcd"

            [verilator]
            executable = "/opt/verilator/bin/verilator"
            optimization = 2
            force_rebuild = true
            ignored_warnings = ["UNUSEDSIGNAL", "WIDTHEXPAND"]
            log = false
            "#,
        )?;

        assert_eq!(config.top_module, "tt_um_other");
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.top_source()?, Utf8Path::new("src/project.v"));
        assert_eq!(config.include_directories, [Utf8PathBuf::from("src")]);
        assert_eq!(config.artifact_directory, Utf8PathBuf::from("build"));
        assert_eq!(
            config.timing,
            SequenceTiming {
                clock_period_ns: 100,
                reset_cycles: 10,
                settle_ns: 5,
            }
        );
        assert_eq!(config.trace.as_deref(), Some(Utf8Path::new("tb.vcd")));
        assert_eq!(
            config.verilator.verilator_executable,
            "/opt/verilator/bin/verilator"
        );
        assert_eq!(config.verilator.verilator_optimization, Some(2));
        assert!(config.verilator.force_verilator_rebuild);
        assert_eq!(config.verilator.ignored_warnings.len(), 2);
        assert!(!config.verilator.log);
        Ok(())
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(matches!(
            TestbenchConfig::from_toml_str("clock_period = 40"),
            Err(ConfigError::UnknownKey { key }) if key == "clock_period"
        ));
        assert!(matches!(
            TestbenchConfig::from_toml_str("[verilator]\nthreads = 4"),
            Err(ConfigError::UnknownKey { key }) if key == "verilator.threads"
        ));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            TestbenchConfig::from_toml_str("clock_period_ns = \"40\""),
            Err(ConfigError::WrongType { .. })
        ));
        assert!(matches!(
            TestbenchConfig::from_toml_str("clock_period_ns = 41"),
            Err(ConfigError::OutOfRange { value: 41, .. })
        ));
        assert!(matches!(
            TestbenchConfig::from_toml_str("clock_period_ns = 0"),
            Err(ConfigError::OutOfRange { value: 0, .. })
        ));
        assert!(matches!(
            TestbenchConfig::from_toml_str("sources = [\"a.v\", 3]"),
            Err(ConfigError::WrongType { .. })
        ));
        assert!(matches!(
            TestbenchConfig::from_toml_str("[verilator]\noptimization = 4"),
            Err(ConfigError::OutOfRange { value: 4, .. })
        ));
        assert!(matches!(
            TestbenchConfig::from_toml_str("reset_cycles = "),
            Err(ConfigError::Syntax { .. })
        ));
    }

    #[test]
    fn resolves_paths_against_config_directory() -> Result<(), ConfigError> {
        let mut config = TestbenchConfig::from_toml_str(
            r#"
            sources = ["src/project.v", "/abs/cells.v"]
            trace = "tb.vcd"
            "#,
        )?;
        config.resolve_relative_to(Utf8Path::new("test"));

        assert_eq!(
            config.sources,
            [
                Utf8PathBuf::from("test/src/project.v"),
                Utf8PathBuf::from("/abs/cells.v")
            ]
        );
        assert_eq!(
            config.artifact_directory,
            Utf8PathBuf::from("test/artifacts")
        );
        assert_eq!(config.trace.as_deref(), Some(Utf8Path::new("test/tb.vcd")));
        Ok(())
    }

    #[test]
    fn missing_sources_are_reported() -> Result<(), ConfigError> {
        let config = TestbenchConfig::from_toml_str(
            "sources = [\"definitely/not/here.v\"]",
        )?;
        assert!(matches!(
            config.check_sources(),
            Err(ConfigError::MissingSource { .. })
        ));

        let empty = TestbenchConfig::from_toml_str("sources = []")?;
        assert!(matches!(empty.check_sources(), Err(ConfigError::NoSources)));
        Ok(())
    }
}
