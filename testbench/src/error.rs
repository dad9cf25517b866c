// Copyright (C) 2024 Ethan Uppal.
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

use snafu::Snafu;

use crate::{
    dut::{DutError, Input},
    signal::{InputVector, Nibble},
    sim::SimTime,
};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TestbenchError {
    /// The sampled output differs from the recorded expectation. `actual` is
    /// the whole `uo_out` byte.
    #[snafu(display(
        "Test Case {case} failed: Expected 0b{expected:04b}, got 0b{actual:04b} ({input})"
    ))]
    Mismatch {
        case: usize,
        input: InputVector,
        expected: Nibble,
        actual: u8,
    },

    #[snafu(display("Cannot wait for {operation} without a running clock"))]
    NoClock { operation: &'static str },

    #[snafu(display(
        "Clock period must be a non-zero even number of nanoseconds, got {period}"
    ))]
    InvalidClockPeriod { period: SimTime },

    #[snafu(display(
        "Value {value:#x} does not fit in {width}-bit input {input}"
    ))]
    ValueTooWide { input: Input, width: u32, value: u8 },

    #[snafu(display("Input {input} is driven by the running clock"))]
    ClockOwned { input: Input },

    #[snafu(display("The design under test stopped responding"))]
    Port { source: DutError },
}
