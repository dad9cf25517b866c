// Copyright (C) 2024 Ethan Uppal.
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

//! Reset followed by one pass over the test vectors.

use std::fmt;

use snafu::ensure;

use crate::{
    dut::{Input, Output, TinyTapeoutDut},
    error::{MismatchSnafu, TestbenchError},
    signal::{InputVector, Nibble},
    sim::{SimTime, Simulator},
    vectors::TestCase,
};

/// Clocking parameters of the sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceTiming {
    /// 25 MHz by default.
    pub clock_period_ns: SimTime,
    /// Rising edges spent with `rst_n` low.
    pub reset_cycles: u32,
    /// Delay after the capturing edge before `uo_out` is sampled.
    pub settle_ns: SimTime,
}

impl Default for SequenceTiming {
    fn default() -> Self {
        Self {
            clock_period_ns: 40,
            reset_cycles: 2,
            settle_ns: 40,
        }
    }
}

/// What one case observed when `uo_out` was sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaseOutcome {
    /// 1-based.
    pub case: usize,
    pub input: InputVector,
    pub expected: Nibble,
    pub observed: u8,
    pub sampled_at: SimTime,
}

impl CaseOutcome {
    /// The whole `uo_out` byte must match, so set upper bits fail the case.
    pub fn passed(&self) -> bool {
        self.observed == u8::from(self.expected)
    }
}

impl fmt::Display for CaseOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Test Case {}: {} -> 0b{:04b} @ {} ns",
            self.case, self.input, self.observed, self.sampled_at
        )
    }
}

/// The passing cases of a complete run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequenceReport {
    pub outcomes: Vec<CaseOutcome>,
    pub finished_at: SimTime,
}

/// Resets the design, then applies each case and checks `uo_out` one rising
/// edge plus [`SequenceTiming::settle_ns`] later. Stops at the first
/// mismatch.
///
/// `ena` is raised before anything else and never lowered; `uio_in` stays
/// zero.
pub fn run_encryption_sequence<D: TinyTapeoutDut>(
    sim: &mut Simulator<D>,
    timing: &SequenceTiming,
    cases: &[TestCase],
) -> Result<SequenceReport, TestbenchError> {
    run_encryption_sequence_with(sim, timing, cases, |_| {})
}

/// [`run_encryption_sequence`], handing every sampled case to `on_case` as
/// soon as it is checked, including the one that fails.
///
/// The trace of the last instant is flushed before returning, whether the
/// run passed or not.
pub fn run_encryption_sequence_with<D, F>(
    sim: &mut Simulator<D>,
    timing: &SequenceTiming,
    cases: &[TestCase],
    on_case: F,
) -> Result<SequenceReport, TestbenchError>
where
    D: TinyTapeoutDut,
    F: FnMut(&CaseOutcome),
{
    let result = apply_cases(sim, timing, cases, on_case);
    sim.flush_trace();
    result
}

fn apply_cases<D, F>(
    sim: &mut Simulator<D>,
    timing: &SequenceTiming,
    cases: &[TestCase],
    mut on_case: F,
) -> Result<SequenceReport, TestbenchError>
where
    D: TinyTapeoutDut,
    F: FnMut(&CaseOutcome),
{
    sim.drive(Input::Ena, 1)?;
    sim.drive(Input::UiIn, 0)?;
    sim.drive(Input::UioIn, 0)?;

    log::info!("Applying reset");
    sim.drive(Input::RstN, 0)?;

    log::info!("Starting the clock");
    sim.start_clock(timing.clock_period_ns)?;
    sim.clock_cycles(timing.reset_cycles)?;
    sim.drive(Input::RstN, 1)?;

    let mut outcomes = Vec::with_capacity(cases.len());
    for (index, case) in cases.iter().enumerate() {
        let number = index + 1;

        sim.drive(Input::UiIn, case.input.pack())?;
        log::info!("Test Case {}: {}", number, case.input);
        sim.rising_edge()?;
        sim.timer(timing.settle_ns)?;

        let outcome = CaseOutcome {
            case: number,
            input: case.input,
            expected: case.expected,
            observed: sim.sample(Output::UoOut)?,
            sampled_at: sim.now(),
        };
        on_case(&outcome);
        ensure!(
            outcome.passed(),
            MismatchSnafu {
                case: number,
                input: case.input,
                expected: case.expected,
                actual: outcome.observed,
            }
        );
        log::debug!("Test Case {} observed 0b{:04b}", number, outcome.observed);

        outcomes.push(outcome);
    }

    log::info!("All test cases passed successfully");
    Ok(SequenceReport {
        outcomes,
        finished_at: sim.now(),
    })
}
