//! Circular linear progression values.
//!
//! A CLP `(lower, delta, mtimes)` denotes the set
//! `{ lower + i * delta | 0 <= i <= mtimes }` computed modulo 2^32. It is the
//! value domain used by the replay interpreter to resolve load and store
//! addresses.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Clp {
    /// No value (bottom).
    None,
    /// Any value (top).
    All,
    #[serde(rename = "value")]
    Val { lower: u32, delta: u32, mtimes: u32 },
}

impl fmt::Display for Clp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::None => write!(f, "_"),
            Self::All => write!(f, "T"),
            Self::Val {
                lower,
                delta: 0,
                mtimes: _,
            }
            | Self::Val {
                lower,
                delta: _,
                mtimes: 0,
            } => write!(f, "{lower:#x}"),
            Self::Val {
                lower,
                delta,
                mtimes,
            } => write!(f, "({lower:#x}, {delta:#x}, {mtimes})"),
        }
    }
}

impl Clp {
    #[inline]
    #[must_use]
    pub const fn constant(v: u32) -> Self {
        Self::Val {
            lower: v,
            delta: 0,
            mtimes: 0,
        }
    }

    #[must_use]
    pub const fn strided(lower: u32, delta: u32, mtimes: u32) -> Self {
        if delta == 0 || mtimes == 0 {
            Self::constant(lower)
        } else {
            Self::Val {
                lower,
                delta,
                mtimes,
            }
        }
    }

    /// Returns the single value denoted, if any.
    #[must_use]
    pub const fn as_constant(&self) -> Option<u32> {
        match self {
            Self::Val { lower, delta, mtimes } if *delta == 0 || *mtimes == 0 => Some(*lower),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_constant(&self) -> bool {
        self.as_constant().is_some()
    }

    /// Number of repetitions of the stride, zero for constants.
    #[must_use]
    pub const fn repeat(&self) -> u32 {
        match self {
            Self::Val { delta: 0, .. } => 0,
            Self::Val { mtimes, .. } => *mtimes,
            _ => 0,
        }
    }

    #[must_use]
    pub fn add(&self, other: &Self) -> Self {
        match (self, other) {
            (Self::None, _) | (_, Self::None) => Self::None,
            (Self::All, _) | (_, Self::All) => Self::All,
            _ => match (self.as_constant(), other.as_constant()) {
                (Some(a), Some(b)) => Self::constant(a.wrapping_add(b)),
                (Some(k), None) => other.shifted(k),
                (None, Some(k)) => self.shifted(k),
                (None, None) => match (self, other) {
                    (
                        Self::Val {
                            lower: l1,
                            delta: d1,
                            mtimes: m1,
                        },
                        Self::Val {
                            lower: l2,
                            delta: d2,
                            mtimes: m2,
                        },
                    ) if d1 == d2 => m1
                        .checked_add(*m2)
                        .map_or(Self::All, |m| Self::strided(l1.wrapping_add(*l2), *d1, m)),
                    _ => Self::All,
                },
            },
        }
    }

    #[must_use]
    pub fn sub(&self, other: &Self) -> Self {
        match (self, other) {
            (Self::None, _) | (_, Self::None) => Self::None,
            (Self::All, _) | (_, Self::All) => Self::All,
            _ => match other.as_constant() {
                Some(k) => self.shifted(k.wrapping_neg()),
                None => Self::All,
            },
        }
    }

    fn shifted(&self, k: u32) -> Self {
        match self {
            Self::Val {
                lower,
                delta,
                mtimes,
            } => Self::strided(lower.wrapping_add(k), *delta, *mtimes),
            other => *other,
        }
    }

    /// Enumerates the denoted values, `None` when the set is unbounded.
    pub fn values(&self) -> Option<impl Iterator<Item = u32>> {
        match *self {
            Self::Val {
                lower,
                delta,
                mtimes,
            } => {
                let count = if delta == 0 { 0 } else { mtimes };
                Some((0..=count).map(move |i| lower.wrapping_add(i.wrapping_mul(delta))))
            }
            Self::None | Self::All => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_fold() {
        assert_eq!(
            Clp::constant(0x1000).add(&Clp::constant(8)),
            Clp::constant(0x1008)
        );
        assert_eq!(
            Clp::constant(0x1000).sub(&Clp::constant(0x10)),
            Clp::constant(0xff0)
        );
        assert_eq!(Clp::constant(4).add(&Clp::All), Clp::All);
        assert_eq!(Clp::None.add(&Clp::All), Clp::None);
    }

    #[test]
    fn strided_shift() {
        let s = Clp::strided(0x1000, 4, 3);
        assert_eq!(s.add(&Clp::constant(4)), Clp::strided(0x1004, 4, 3));
        assert_eq!(s.add(&Clp::strided(0, 4, 2)), Clp::strided(0x1000, 4, 5));
        assert_eq!(s.add(&Clp::strided(0, 8, 2)), Clp::All);
        assert_eq!(s.sub(&s), Clp::All);
        assert_eq!(s.repeat(), 3);
    }

    #[test]
    fn enumerate_values() {
        let v: Vec<u32> = Clp::strided(0x10, 4, 2).values().unwrap().collect();
        assert_eq!(v, vec![0x10, 0x14, 0x18]);
        assert!(Clp::All.values().is_none());
        assert!(Clp::strided(7, 0, 9).is_constant());
    }
}
