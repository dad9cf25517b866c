// Copyright (C) 2024 Ethan Uppal.
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

//! The Tiny Tapeout user-module interface and its Verilator-backed
//! implementation.

use std::fmt;

use camino::Utf8Path;
use goatgate_verilator::{
    PortDirection, PortSignature, VerilatedModelConfig, VerilatorRuntime,
    dynamic::{
        AsDynamicVerilatedModel, DynamicVerilatedModel,
        DynamicVerilatedModelError,
    },
    vcd::Vcd,
};
use snafu::{ResultExt, Snafu, Whatever};

use crate::sim::SimTime;

/// Every port of a Tiny Tapeout user module, in declaration order.
pub const TINY_TAPEOUT_PORTS: &[PortSignature<'static>] = &[
    ("clk", 0, 0, PortDirection::Input),
    ("rst_n", 0, 0, PortDirection::Input),
    ("ena", 0, 0, PortDirection::Input),
    ("ui_in", 7, 0, PortDirection::Input),
    ("uio_in", 7, 0, PortDirection::Input),
    ("uo_out", 7, 0, PortDirection::Output),
    ("uio_out", 7, 0, PortDirection::Output),
    ("uio_oe", 7, 0, PortDirection::Output),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Input {
    Clk,
    RstN,
    Ena,
    UiIn,
    UioIn,
}

impl Input {
    pub fn port_name(self) -> &'static str {
        match self {
            Input::Clk => "clk",
            Input::RstN => "rst_n",
            Input::Ena => "ena",
            Input::UiIn => "ui_in",
            Input::UioIn => "uio_in",
        }
    }

    pub fn width(self) -> u32 {
        match self {
            Input::Clk | Input::RstN | Input::Ena => 1,
            Input::UiIn | Input::UioIn => 8,
        }
    }
}

impl fmt::Display for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.port_name().fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Output {
    UoOut,
    UioOut,
    UioOe,
}

impl Output {
    pub fn port_name(self) -> &'static str {
        match self {
            Output::UoOut => "uo_out",
            Output::UioOut => "uio_out",
            Output::UioOe => "uio_oe",
        }
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.port_name().fmt(f)
    }
}

/// Failure to reach a port of the design under test.
#[derive(Debug, Snafu)]
#[snafu(display("Failed to access port {port} of the design under test"))]
pub struct DutError {
    port: &'static str,
    source: DynamicVerilatedModelError,
}

/// A design exposing the Tiny Tapeout user-module interface.
///
/// Implementors only latch values in [`TinyTapeoutDut::pin`]; nothing may
/// propagate until [`TinyTapeoutDut::eval`] is called.
pub trait TinyTapeoutDut {
    fn pin(&mut self, input: Input, value: u8) -> Result<(), DutError>;

    fn read(&self, output: Output) -> Result<u8, DutError>;

    fn eval(&mut self);

    /// Called once per simulated instant, with strictly increasing times,
    /// after the design has settled for that instant.
    fn trace(&mut self, _time: SimTime) {}
}

/// A Tiny Tapeout design compiled by Verilator.
pub struct VerilatedTinyTapeout<'ctx> {
    // declared first so the trace closes before the model it observes is
    // deleted
    vcd: Option<Vcd<'ctx>>,
    model: DynamicVerilatedModel<'ctx>,
}

impl<'ctx> VerilatedTinyTapeout<'ctx> {
    /// Builds (or reuses) the Verilator library for `top_module`, defined in
    /// `source_path`, and instantiates it. When `trace` is given, every
    /// simulated instant is recorded to that VCD file.
    pub fn create(
        runtime: &'ctx mut VerilatorRuntime,
        top_module: &str,
        source_path: &Utf8Path,
        trace: Option<&Utf8Path>,
    ) -> Result<Self, Whatever> {
        let log = runtime.options().log;
        let mut model = runtime.create_dyn_model(
            top_module,
            source_path.as_str(),
            TINY_TAPEOUT_PORTS,
            VerilatedModelConfig {
                enable_tracing: trace.is_some(),
            },
        )?;

        let vcd = match trace {
            Some(path) => {
                if log {
                    log::info!("Tracing {} to {}", top_module, path);
                }
                Some(model.open_vcd(path).whatever_context(format!(
                    "Failed to open VCD trace {path}"
                ))?)
            }
            None => None,
        };

        Ok(Self { vcd, model })
    }
}

impl TinyTapeoutDut for VerilatedTinyTapeout<'_> {
    fn pin(&mut self, input: Input, value: u8) -> Result<(), DutError> {
        self.model
            .pin(input.port_name(), value)
            .context(DutSnafu {
                port: input.port_name(),
            })
    }

    fn read(&self, output: Output) -> Result<u8, DutError> {
        let value =
            self.model.read(output.port_name()).context(DutSnafu {
                port: output.port_name(),
            })?;
        // every output port is eight bits wide, so the truncation is exact
        Ok(value.as_u64() as u8)
    }

    fn eval(&mut self) {
        self.model.eval();
    }

    fn trace(&mut self, time: SimTime) {
        if let Some(vcd) = &mut self.vcd {
            vcd.dump(time);
        }
    }
}
