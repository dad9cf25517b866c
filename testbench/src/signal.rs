// Copyright (C) 2024 Ethan Uppal.
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

//! Fixed-width values carried on the `ui_in` and `uo_out` buses.

use std::fmt;

use snafu::Snafu;

/// A 4-bit value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Nibble(u8);

/// Returned when a byte does not fit in a [`Nibble`].
#[derive(Debug, Snafu)]
#[snafu(display("{value:#010b} does not fit in four bits"))]
pub struct NibbleOutOfRange {
    value: u8,
}

impl Nibble {
    pub const MAX: Nibble = Nibble(0xF);

    /// `None` if `value` has any of its upper four bits set.
    pub const fn new(value: u8) -> Option<Self> {
        if value <= Self::MAX.0 {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Keeps the low four bits of `value`.
    pub const fn truncate(value: u8) -> Self {
        Self(value & Self::MAX.0)
    }

    pub const fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Nibble {
    type Error = NibbleOutOfRange;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(NibbleOutOfRange { value })
    }
}

impl From<Nibble> for u8 {
    fn from(value: Nibble) -> Self {
        value.0
    }
}

impl fmt::Binary for Nibble {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Binary::fmt(&self.0, f)
    }
}

/// Verilog-literal form, e.g. `4'b0110`.
impl fmt::Display for Nibble {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "4'b{:04b}", self.0)
    }
}

/// The byte driven onto `ui_in`: data in bits [3:0], key in bits [7:4].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct InputVector {
    pub data: Nibble,
    pub key: Nibble,
}

impl InputVector {
    /// Width of each field in bits.
    pub const FIELD_WIDTH: u32 = 4;

    pub const fn new(data: Nibble, key: Nibble) -> Self {
        Self { data, key }
    }

    pub const fn pack(self) -> u8 {
        self.data.0 | (self.key.0 << Self::FIELD_WIDTH)
    }

    pub const fn unpack(byte: u8) -> Self {
        Self {
            data: Nibble::truncate(byte),
            key: Nibble::truncate(byte >> Self::FIELD_WIDTH),
        }
    }
}

impl fmt::Display for InputVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "data_in = {}, key = {}", self.data, self.key)
    }
}
