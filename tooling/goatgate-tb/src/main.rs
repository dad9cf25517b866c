// Copyright (C) 2024 Ethan Uppal.
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

use std::env;

use argh::FromArgs;
use camino::{Utf8Path, Utf8PathBuf};
use goatgate_testbench::{config::DEFAULT_CONFIG_FILE_NAME, prelude::*};
use goatgate_verilator::VerilatorRuntime;
use owo_colors::OwoColorize;
use snafu::{ResultExt, Whatever, whatever};

/// Run the tt_um_ccu_goatgate testbench
#[derive(FromArgs)]
struct GoatgateCommand {
    #[argh(subcommand)]
    subcommand: Subcommand,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Subcommand {
    Run(RunSubcommand),
    Check(CheckSubcommand),
}

/// build the design with Verilator and apply the recorded test vectors
#[derive(FromArgs)]
#[argh(subcommand, name = "run")]
struct RunSubcommand {
    /// testbench configuration file (defaults to goatgate.toml when present)
    #[argh(option, short = 'c')]
    config: Option<Utf8PathBuf>,

    /// verilog source file; repeat for several, the first defines the top
    /// module. Replaces the configured sources
    #[argh(option, short = 's')]
    source: Vec<Utf8PathBuf>,

    /// write a VCD waveform to this path
    #[argh(option)]
    trace: Option<Utf8PathBuf>,

    /// invoke Verilator even if the build artifacts are up to date
    #[argh(switch)]
    force_rebuild: bool,
}

/// validate the configuration and sources without invoking Verilator
#[derive(FromArgs)]
#[argh(subcommand, name = "check")]
struct CheckSubcommand {
    /// testbench configuration file (defaults to goatgate.toml when present)
    #[argh(option, short = 'c')]
    config: Option<Utf8PathBuf>,
}

fn load_config(path: Option<&Utf8Path>) -> Result<TestbenchConfig, Whatever> {
    let path = match path {
        Some(path) => path,
        None if Utf8Path::new(DEFAULT_CONFIG_FILE_NAME).is_file() => {
            Utf8Path::new(DEFAULT_CONFIG_FILE_NAME)
        }
        None => {
            log::info!("No configuration file, using defaults");
            return Ok(TestbenchConfig::default());
        }
    };
    TestbenchConfig::load(path)
        .whatever_context(format!("Failed to load configuration {path}"))
}

fn run(options: RunSubcommand) -> Result<(), Whatever> {
    let mut config = load_config(options.config.as_deref())?;
    if !options.source.is_empty() {
        config.sources = options.source;
    }
    if options.trace.is_some() {
        config.trace = options.trace;
    }
    config.verilator.force_verilator_rebuild |= options.force_rebuild;
    config
        .check_sources()
        .whatever_context("Invalid testbench configuration")?;
    let top_source = config
        .top_source()
        .whatever_context("Invalid testbench configuration")?
        .to_path_buf();

    let sources: Vec<&Utf8Path> =
        config.sources.iter().map(|path| path.as_path()).collect();
    let include_directories: Vec<&Utf8Path> = config
        .include_directories
        .iter()
        .map(|path| path.as_path())
        .collect();
    let mut runtime = VerilatorRuntime::new(
        &config.artifact_directory,
        &sources,
        &include_directories,
        config.verilator.clone(),
    )?;
    let dut = VerilatedTinyTapeout::create(
        &mut runtime,
        &config.top_module,
        &top_source,
        config.trace.as_deref(),
    )?;

    println!(
        "{} {} [{} case{}]",
        "     STARTING".bold().bright_cyan(),
        config.top_module,
        ENCRYPTION_CASES.len(),
        if ENCRYPTION_CASES.len() == 1 { "" } else { "s" },
    );

    let mut sim = Simulator::new(dut);
    let result = run_encryption_sequence_with(
        &mut sim,
        &config.timing,
        &ENCRYPTION_CASES,
        |outcome| println!("{}", case_status(outcome)),
    );
    match result {
        Ok(report) => {
            println!(
                "{} at {} ns",
                "     FINISHED".bold().bright_cyan(),
                report.finished_at
            );
            Ok(())
        }
        Err(error) => {
            println!(
                "{} [{}]\n{}",
                "       FAILED".bold().bright_red(),
                config.top_module,
                error
            );
            whatever!("Exiting due to failure")
        }
    }
}

/// One PASS or FAIL line for a sampled case.
fn case_status(outcome: &CaseOutcome) -> String {
    if outcome.passed() {
        format!("         {} [{}]", "PASS".bold().bright_green(), outcome)
    } else {
        format!(
            "         {} [{}, expected 0b{:04b}]",
            "FAIL".bold().bright_red(),
            outcome,
            outcome.expected
        )
    }
}

fn check(options: CheckSubcommand) -> Result<(), Whatever> {
    let config = load_config(options.config.as_deref())?;
    config
        .check_sources()
        .whatever_context("Invalid testbench configuration")?;
    println!("Everything looks good!");
    Ok(())
}

#[snafu::report]
fn main() -> Result<(), Whatever> {
    if env::var("RUST_LOG").is_ok() {
        env_logger::init();
    }

    let command: GoatgateCommand = argh::from_env();
    match command.subcommand {
        Subcommand::Run(run_subcommand) => run(run_subcommand),
        Subcommand::Check(check_subcommand) => check(check_subcommand),
    }
}
