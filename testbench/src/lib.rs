// Copyright (C) 2024 Ethan Uppal.
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

//! Testbench for the `tt_um_ccu_goatgate` Tiny Tapeout module.
//!
//! ```no_run
//! use goatgate_testbench::prelude::*;
//! use goatgate_verilator::VerilatorRuntime;
//! # fn main() -> Result<(), snafu::Whatever> {
//! # use snafu::ResultExt;
//! let config = TestbenchConfig::default();
//! let mut runtime = VerilatorRuntime::new(
//!     &config.artifact_directory,
//!     &[config.sources[0].as_path()],
//!     &[],
//!     config.verilator.clone(),
//! )?;
//! let dut = VerilatedTinyTapeout::create(
//!     &mut runtime,
//!     &config.top_module,
//!     &config.sources[0],
//!     None,
//! )?;
//! let mut sim = Simulator::new(dut);
//! run_encryption_sequence(&mut sim, &config.timing, &ENCRYPTION_CASES)
//!     .whatever_context("Sequence failed")?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dut;
pub mod error;
pub mod sequencer;
pub mod signal;
pub mod sim;
pub mod vectors;

pub mod prelude {
    pub use crate::{
        config::{ConfigError, TestbenchConfig},
        dut::{Input, Output, TinyTapeoutDut, VerilatedTinyTapeout},
        error::TestbenchError,
        sequencer::{
            CaseOutcome, SequenceReport, SequenceTiming,
            run_encryption_sequence, run_encryption_sequence_with,
        },
        signal::{InputVector, Nibble},
        sim::{SimTime, Simulator},
        vectors::{ENCRYPTION_CASES, TestCase},
    };
}
