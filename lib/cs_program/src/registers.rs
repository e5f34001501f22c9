//! Platform registers.
//!
//! Registers are addressed by their platform number, so that register sets can
//! be represented as fixed-width bit sets by the analyses. The [`Platform`]
//! gives the register bank size and the register names.

use crate::errors::{ProgramError, ProgramResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The register type, a platform register number.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Reg(u16);

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u16> for Reg {
    fn from(r: u16) -> Self {
        Self(r)
    }
}

impl Reg {
    /// Returns the platform number of the register.
    #[inline]
    #[must_use]
    pub const fn value(self) -> u16 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Register bank description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Platform {
    names: Vec<String>,
}

impl Platform {
    #[must_use]
    pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// A platform with `count` registers named `r0`, `r1`, ...
    #[must_use]
    pub fn numbered(count: u16) -> Self {
        Self::new((0..count).map(|i| format!("r{i}")))
    }

    #[inline]
    #[must_use]
    pub fn reg_count(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn name(&self, reg: Reg) -> &str {
        self.names.get(reg.index()).map_or("?", String::as_str)
    }

    #[must_use]
    pub fn find(&self, name: &str) -> Option<Reg> {
        self.names
            .iter()
            .position(|n| n == name)
            .and_then(|i| u16::try_from(i).ok())
            .map(Reg)
    }

    /// Same as [`Platform::find`], but fails on unknown names.
    pub fn lookup(&self, name: &str) -> ProgramResult<Reg> {
        self.find(name)
            .ok_or_else(|| ProgramError::UnknownRegister(name.to_string()))
    }

    pub fn registers(&self) -> impl Iterator<Item = Reg> + '_ {
        (0..self.names.len()).filter_map(|i| u16::try_from(i).ok().map(Reg))
    }
}
