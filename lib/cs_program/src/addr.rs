//! Code and data address representation.

use crate::errors::ProgramError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A 32 bits address, either of an instruction or of a memory cell.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Addr(pub u32);

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

impl From<u32> for Addr {
    fn from(a: u32) -> Self {
        Self(a)
    }
}

impl Addr {
    #[inline]
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Address `offset` bytes after this one (wrapping around the address space).
    #[inline]
    #[must_use]
    pub const fn offset(self, offset: u32) -> Self {
        Self(self.0.wrapping_add(offset))
    }
}

impl FromStr for Addr {
    type Err = ProgramError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_number(s)
            .map(Self)
            .ok_or_else(|| ProgramError::BadNumber(s.to_string()))
    }
}

/// Parses a decimal or `0x`-prefixed hexadecimal number.
pub(crate) fn parse_number(s: &str) -> Option<u32> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else {
        s.parse().ok()
    }
}
