// Copyright (C) 2024 Ethan Uppal.
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

//! Recorded input/output pairs for `tt_um_ccu_goatgate`.
//!
//! The expected outputs are black-box observations of the gate, not values
//! computed here.

use crate::signal::{InputVector, Nibble};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestCase {
    pub input: InputVector,
    pub expected: Nibble,
}

impl TestCase {
    /// Returns `None` if any argument is wider than four bits.
    pub const fn try_new(data: u8, key: u8, expected: u8) -> Option<Self> {
        match (Nibble::new(data), Nibble::new(key), Nibble::new(expected)) {
            (Some(data), Some(key), Some(expected)) => Some(Self {
                input: InputVector::new(data, key),
                expected,
            }),
            _ => None,
        }
    }

    /// # Panics
    ///
    /// If any argument is wider than four bits.
    pub(crate) const fn new(data: u8, key: u8, expected: u8) -> Self {
        match Self::try_new(data, key, expected) {
            Some(case) => case,
            None => panic!("test case fields must fit in four bits"),
        }
    }
}

pub const ENCRYPTION_CASES: [TestCase; 4] = [
    TestCase::new(0b1101, 0b1011, 0b0110),
    TestCase::new(0b0011, 0b0110, 0b0101),
    TestCase::new(0b0001, 0b1111, 0b1110),
    TestCase::new(0b0110, 0b1000, 0b1110),
];
