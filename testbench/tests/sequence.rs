// Copyright (C) 2024 Ethan Uppal.
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

mod common;

use common::{RecordedGate, SignalProbe, init_logging};
use goatgate_testbench::prelude::*;
use snafu::{OptionExt, ResultExt, Whatever};

fn recorded_design() -> Simulator<SignalProbe<RecordedGate>> {
    Simulator::new(SignalProbe::new(RecordedGate::new(&ENCRYPTION_CASES)))
}

#[test]
#[snafu::report]
fn passes_all_documented_cases() -> Result<(), Whatever> {
    init_logging();

    let mut sim = recorded_design();
    let report = run_encryption_sequence(
        &mut sim,
        &SequenceTiming::default(),
        &ENCRYPTION_CASES,
    )
    .whatever_context("Sequence failed against the recorded gate")?;

    let observed: Vec<u8> =
        report.outcomes.iter().map(|outcome| outcome.observed).collect();
    assert_eq!(observed, [0b0110, 0b0101, 0b1110, 0b1110]);
    assert_eq!(
        report.outcomes.iter().map(|outcome| outcome.case).collect::<Vec<_>>(),
        [1, 2, 3, 4]
    );
    Ok(())
}

#[test]
#[snafu::report]
fn samples_one_edge_plus_settle_after_each_drive() -> Result<(), Whatever> {
    let mut sim = recorded_design();
    let report = run_encryption_sequence(
        &mut sim,
        &SequenceTiming::default(),
        &ENCRYPTION_CASES,
    )
    .whatever_context("Sequence failed against the recorded gate")?;

    // rising edges fall on 20, 60, 100, ...; reset releases at 60
    let sampled_at: Vec<SimTime> = report
        .outcomes
        .iter()
        .map(|outcome| outcome.sampled_at)
        .collect();
    assert_eq!(sampled_at, [140, 180, 220, 260]);
    assert_eq!(report.finished_at, 260);

    let probe = sim.into_dut();
    for outcome in &report.outcomes {
        let capture = probe
            .rising_edges()
            .into_iter()
            .filter(|edge| edge.time < outcome.sampled_at)
            .last()
            .whatever_context("No edge before the sample")?;
        assert_eq!(capture.ui_in, outcome.input.pack());
        assert_eq!(outcome.sampled_at - capture.time, 40);
    }
    Ok(())
}

#[test]
#[snafu::report]
fn holds_reset_low_for_two_cycles() -> Result<(), Whatever> {
    let mut sim = recorded_design();
    run_encryption_sequence(
        &mut sim,
        &SequenceTiming::default(),
        &ENCRYPTION_CASES,
    )
    .whatever_context("Sequence failed against the recorded gate")?;

    let edges = sim.into_dut().rising_edges();
    let in_reset: Vec<SimTime> = edges
        .iter()
        .filter(|edge| edge.rst_n == 0)
        .map(|edge| edge.time)
        .collect();
    assert_eq!(in_reset, [20, 60]);
    assert!(edges[2..].iter().all(|edge| edge.rst_n == 1));
    Ok(())
}

#[test]
#[snafu::report]
fn reset_length_follows_timing() -> Result<(), Whatever> {
    let mut sim = recorded_design();
    let timing = SequenceTiming {
        reset_cycles: 5,
        ..Default::default()
    };
    run_encryption_sequence(&mut sim, &timing, &ENCRYPTION_CASES)
        .whatever_context("Sequence failed against the recorded gate")?;

    let in_reset = sim
        .into_dut()
        .rising_edges()
        .iter()
        .filter(|edge| edge.rst_n == 0)
        .count();
    assert_eq!(in_reset, 5);
    Ok(())
}

#[test]
#[snafu::report]
fn keeps_enable_asserted() -> Result<(), Whatever> {
    let mut sim = recorded_design();
    run_encryption_sequence(
        &mut sim,
        &SequenceTiming::default(),
        &ENCRYPTION_CASES,
    )
    .whatever_context("Sequence failed against the recorded gate")?;

    let history = &sim.dut().history;
    assert!(!history.is_empty());
    assert!(history.iter().all(|snapshot| snapshot.ena == 1));
    Ok(())
}

#[test]
fn stops_at_first_mismatch() {
    let second = ENCRYPTION_CASES[1];
    let third = ENCRYPTION_CASES[2];
    let gate = RecordedGate::new(&ENCRYPTION_CASES).answering(second.input, 0);
    let mut sim = Simulator::new(SignalProbe::new(gate));

    let error = run_encryption_sequence(
        &mut sim,
        &SequenceTiming::default(),
        &ENCRYPTION_CASES,
    )
    .expect_err("second case answers zero");

    assert!(matches!(
        error,
        TestbenchError::Mismatch {
            case: 2,
            actual: 0,
            ..
        }
    ));
    assert_eq!(
        error.to_string(),
        "Test Case 2 failed: Expected 0b0101, got 0b0000 (data_in = 4'b0011, key = 4'b0110)"
    );
    assert!(
        sim.dut()
            .history
            .iter()
            .all(|snapshot| snapshot.ui_in != third.input.pack())
    );
}

#[test]
fn unused_output_bits_must_be_zero() {
    let first = ENCRYPTION_CASES[0];
    let gate =
        RecordedGate::new(&ENCRYPTION_CASES).answering(first.input, 0b1000_0110);
    let mut sim = Simulator::new(gate);

    let error = run_encryption_sequence(
        &mut sim,
        &SequenceTiming::default(),
        &ENCRYPTION_CASES,
    )
    .expect_err("upper bit of uo_out is set");

    assert!(matches!(
        error,
        TestbenchError::Mismatch {
            case: 1,
            actual: 0b1000_0110,
            ..
        }
    ));
    assert_eq!(
        error.to_string(),
        "Test Case 1 failed: Expected 0b0110, got 0b10000110 (data_in = 4'b1101, key = 4'b1011)"
    );
}

#[test]
#[snafu::report]
fn waveform_shows_every_capturing_edge() -> Result<(), Whatever> {
    let mut sim = recorded_design();
    run_encryption_sequence(
        &mut sim,
        &SequenceTiming::default(),
        &ENCRYPTION_CASES,
    )
    .whatever_context("Sequence failed against the recorded gate")?;

    let probe = sim.into_dut();
    assert_eq!(probe.dropped_dumps, 0);
    assert_eq!(probe.dumps.last().map(|dump| dump.time), Some(260));

    let edges = probe.dumped_rising_edges();
    let edge_times: Vec<SimTime> = edges.iter().map(|edge| edge.time).collect();
    assert_eq!(edge_times, [20, 60, 100, 140, 180, 220]);

    // each case is on ui_in at the edge that captures it
    let captured: Vec<u8> = edges[2..].iter().map(|edge| edge.ui_in).collect();
    let packed: Vec<u8> =
        ENCRYPTION_CASES.iter().map(|case| case.input.pack()).collect();
    assert_eq!(captured, packed);
    Ok(())
}

#[test]
fn reports_each_sampled_case_in_order() {
    let third = ENCRYPTION_CASES[2];
    let gate = RecordedGate::new(&ENCRYPTION_CASES).answering(third.input, 0);
    let mut sim = Simulator::new(SignalProbe::new(gate));

    let mut seen = vec![];
    let error = run_encryption_sequence_with(
        &mut sim,
        &SequenceTiming::default(),
        &ENCRYPTION_CASES,
        |outcome| seen.push(*outcome),
    )
    .expect_err("third case answers zero");

    assert!(matches!(error, TestbenchError::Mismatch { case: 3, .. }));
    assert_eq!(
        seen.iter().map(CaseOutcome::passed).collect::<Vec<_>>(),
        [true, true, false]
    );
    assert_eq!(
        seen[0].to_string(),
        "Test Case 1: data_in = 4'b1101, key = 4'b1011 -> 0b0110 @ 140 ns"
    );
    assert_eq!(
        seen[2].to_string(),
        "Test Case 3: data_in = 4'b0001, key = 4'b1111 -> 0b0000 @ 220 ns"
    );

    // the failing run still dumps its last instant
    assert_eq!(sim.dut().dumps.last().map(|dump| dump.time), Some(220));
}

#[test]
fn rejects_odd_clock_period() {
    let mut sim = recorded_design();
    let timing = SequenceTiming {
        clock_period_ns: 25,
        ..Default::default()
    };
    assert!(matches!(
        run_encryption_sequence(&mut sim, &timing, &ENCRYPTION_CASES),
        Err(TestbenchError::InvalidClockPeriod { period: 25 })
    ));
}
