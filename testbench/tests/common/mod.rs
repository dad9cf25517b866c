// Copyright (C) 2024 Ethan Uppal.
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

#![allow(dead_code)]

use std::{collections::HashMap, env};

use goatgate_testbench::{dut::DutError, prelude::*};

pub fn init_logging() {
    if env::var("RUST_LOG").is_ok() {
        let _ = env_logger::builder().is_test(true).try_init();
    }
}

/// Stands in for the Verilog: answers each recorded `ui_in` byte with its
/// recorded output, registered on the rising edge of `clk` and cleared while
/// `rst_n` is low. Bytes outside the table answer zero.
#[derive(Debug, Clone)]
pub struct RecordedGate {
    answers: HashMap<u8, u8>,
    clk: u8,
    last_clk: u8,
    rst_n: u8,
    ena: u8,
    ui_in: u8,
    uo_out: u8,
}

impl RecordedGate {
    pub fn new(cases: &[TestCase]) -> Self {
        Self {
            answers: cases
                .iter()
                .map(|case| (case.input.pack(), u8::from(case.expected)))
                .collect(),
            clk: 0,
            last_clk: 0,
            rst_n: 1,
            ena: 0,
            ui_in: 0,
            uo_out: 0,
        }
    }

    /// Overrides the answer for one input byte.
    pub fn answering(mut self, input: InputVector, output: u8) -> Self {
        self.answers.insert(input.pack(), output);
        self
    }
}

impl TinyTapeoutDut for RecordedGate {
    fn pin(&mut self, input: Input, value: u8) -> Result<(), DutError> {
        match input {
            Input::Clk => self.clk = value,
            Input::RstN => self.rst_n = value,
            Input::Ena => self.ena = value,
            Input::UiIn => self.ui_in = value,
            Input::UioIn => {}
        }
        Ok(())
    }

    fn read(&self, output: Output) -> Result<u8, DutError> {
        Ok(match output {
            Output::UoOut => self.uo_out,
            Output::UioOut | Output::UioOe => 0,
        })
    }

    fn eval(&mut self) {
        if self.clk == 1 && self.last_clk == 0 {
            self.uo_out = if self.rst_n == 0 || self.ena == 0 {
                0
            } else {
                self.answers.get(&self.ui_in).copied().unwrap_or(0)
            };
        }
        self.last_clk = self.clk;
    }
}

/// The inputs of a design as seen after one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub time: SimTime,
    pub clk: u8,
    pub rst_n: u8,
    pub ena: u8,
    pub ui_in: u8,
}

/// Wraps a design and records its inputs at every evaluation. Evaluations are
/// stamped with their time when that instant is traced.
///
/// `dumps` keeps what a VCD writer would: one snapshot per traced instant,
/// dropping any trace not later than the previous one.
#[derive(Debug)]
pub struct SignalProbe<D> {
    inner: D,
    current: Snapshot,
    unstamped: Vec<Snapshot>,
    pub history: Vec<Snapshot>,
    pub dumps: Vec<Snapshot>,
    pub dropped_dumps: usize,
}

impl<D> SignalProbe<D> {
    pub fn new(inner: D) -> Self {
        Self {
            inner,
            current: Snapshot {
                time: 0,
                clk: 0,
                rst_n: 1,
                ena: 0,
                ui_in: 0,
            },
            unstamped: vec![],
            history: vec![],
            dumps: vec![],
            dropped_dumps: 0,
        }
    }

    /// Evaluations right after `clk` rose.
    pub fn rising_edges(&self) -> Vec<Snapshot> {
        rising(&self.history)
    }

    /// Instants whose dump shows `clk` newly high.
    pub fn dumped_rising_edges(&self) -> Vec<Snapshot> {
        rising(&self.dumps)
    }
}

fn rising(snapshots: &[Snapshot]) -> Vec<Snapshot> {
    snapshots
        .windows(2)
        .filter(|pair| pair[0].clk == 0 && pair[1].clk == 1)
        .map(|pair| pair[1])
        .collect()
}

impl<D: TinyTapeoutDut> TinyTapeoutDut for SignalProbe<D> {
    fn pin(&mut self, input: Input, value: u8) -> Result<(), DutError> {
        match input {
            Input::Clk => self.current.clk = value,
            Input::RstN => self.current.rst_n = value,
            Input::Ena => self.current.ena = value,
            Input::UiIn => self.current.ui_in = value,
            Input::UioIn => {}
        }
        self.inner.pin(input, value)
    }

    fn read(&self, output: Output) -> Result<u8, DutError> {
        self.inner.read(output)
    }

    fn eval(&mut self) {
        self.inner.eval();
        self.unstamped.push(self.current);
    }

    fn trace(&mut self, time: SimTime) {
        self.history.extend(
            self.unstamped
                .drain(..)
                .map(|snapshot| Snapshot { time, ..snapshot }),
        );
        if self.dumps.last().is_some_and(|last| time <= last.time) {
            self.dropped_dumps += 1;
        } else {
            self.dumps.push(Snapshot {
                time,
                ..self.current
            });
        }
        self.inner.trace(time);
    }
}
