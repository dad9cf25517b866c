// Copyright (C) 2024 Ethan Uppal.
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

//! Simulated-time scheduling for a clocked design.
//!
//! Waiting never sleeps. Each wait advances simulated time event by event,
//! toggling the clock and re-evaluating the design as it goes, and returns
//! once the requested point in simulated time has been reached.
//!
//! Traces are dumped once per instant, with the state the design settled to
//! by the end of that instant, when simulated time moves past it. Call
//! [`Simulator::flush_trace`] (or [`Simulator::into_dut`]) to dump the last
//! instant.

use snafu::{ResultExt, ensure};

use crate::{
    dut::{Input, Output, TinyTapeoutDut},
    error::{
        ClockOwnedSnafu, InvalidClockPeriodSnafu, NoClockSnafu, PortSnafu,
        TestbenchError, ValueTooWideSnafu,
    },
};

/// Simulated time in nanoseconds.
pub type SimTime = u64;

#[derive(Debug, Clone, Copy)]
struct Clock {
    half_period: SimTime,
    high: bool,
    next_toggle: SimTime,
}

/// Owns a design and the simulated time it has reached.
pub struct Simulator<D> {
    dut: D,
    now: SimTime,
    clock: Option<Clock>,
    untraced: bool,
}

impl<D: TinyTapeoutDut> Simulator<D> {
    pub fn new(dut: D) -> Self {
        Self {
            dut,
            now: 0,
            clock: None,
            untraced: false,
        }
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    pub fn dut(&self) -> &D {
        &self.dut
    }

    /// Dumps the current instant, then hands back the design.
    pub fn into_dut(mut self) -> D {
        self.flush_trace();
        self.dut
    }

    /// Dumps the current instant if the design was evaluated since the last
    /// dump. Meant for the end of a run: evaluations at the same instant after
    /// a flush would be dumped at that instant a second time.
    pub fn flush_trace(&mut self) {
        if self.untraced {
            self.dut.trace(self.now);
            self.untraced = false;
        }
    }

    /// Starts a free-running clock on `clk`. The clock is driven low now and
    /// toggles every half `period`, so the first rising edge comes half a
    /// period from now. A running clock is replaced.
    pub fn start_clock(&mut self, period: SimTime) -> Result<(), TestbenchError> {
        ensure!(
            period != 0 && period % 2 == 0,
            InvalidClockPeriodSnafu { period }
        );

        let half_period = period / 2;
        self.clock = Some(Clock {
            half_period,
            high: false,
            next_toggle: self.now + half_period,
        });
        self.dut.pin(Input::Clk, 0).context(PortSnafu)?;
        self.settle();
        Ok(())
    }

    /// Drives `input` to `value` and propagates it through the design at the
    /// current time.
    pub fn drive(
        &mut self,
        input: Input,
        value: u8,
    ) -> Result<(), TestbenchError> {
        ensure!(
            !(input == Input::Clk && self.clock.is_some()),
            ClockOwnedSnafu { input }
        );
        let width = input.width();
        ensure!(
            width >= u8::BITS || value >> width == 0,
            ValueTooWideSnafu {
                input,
                width,
                value
            }
        );

        self.dut.pin(input, value).context(PortSnafu)?;
        self.settle();
        Ok(())
    }

    pub fn sample(&self, output: Output) -> Result<u8, TestbenchError> {
        self.dut.read(output).context(PortSnafu)
    }

    /// Waits for the next low-to-high transition of the clock.
    pub fn rising_edge(&mut self) -> Result<(), TestbenchError> {
        ensure!(
            self.clock.is_some(),
            NoClockSnafu {
                operation: "a rising edge"
            }
        );
        while !self.toggle_clock()? {}
        Ok(())
    }

    /// Waits for `cycles` rising edges.
    pub fn clock_cycles(&mut self, cycles: u32) -> Result<(), TestbenchError> {
        ensure!(
            self.clock.is_some(),
            NoClockSnafu {
                operation: "clock cycles"
            }
        );
        for _ in 0..cycles {
            self.rising_edge()?;
        }
        Ok(())
    }

    /// Waits `duration` nanoseconds. Clock toggles falling strictly inside
    /// the interval are applied; a toggle due exactly at the deadline happens
    /// after this returns, so a sample taken right away sees the values from
    /// before that edge.
    pub fn timer(&mut self, duration: SimTime) -> Result<(), TestbenchError> {
        let deadline = self.now.saturating_add(duration);
        while let Some(clock) = self.clock {
            if clock.next_toggle >= deadline {
                break;
            }
            self.toggle_clock()?;
        }
        self.advance_to(deadline);
        self.settle();
        Ok(())
    }

    /// Applies the next clock toggle. Returns whether the clock rose.
    fn toggle_clock(&mut self) -> Result<bool, TestbenchError> {
        let Some(clock) = self.clock else {
            return NoClockSnafu {
                operation: "a clock toggle",
            }
            .fail();
        };
        self.advance_to(clock.next_toggle);
        let rose = !clock.high;
        self.clock = Some(Clock {
            high: rose,
            next_toggle: clock.next_toggle + clock.half_period,
            ..clock
        });

        self.dut.pin(Input::Clk, u8::from(rose)).context(PortSnafu)?;
        self.settle();
        Ok(rose)
    }

    /// Moves simulated time forward, dumping the instant being left.
    fn advance_to(&mut self, time: SimTime) {
        if time > self.now {
            self.flush_trace();
            self.now = time;
        }
    }

    fn settle(&mut self) {
        self.dut.eval();
        self.untraced = true;
    }
}
