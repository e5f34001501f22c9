//! Address-range sets.
//!
//! A [`MemorySet`] is a finite union of byte ranges of the 32 bits address
//! space, kept as a sorted list of disjoint and non-adjacent [`MemArea`]s.
//! Bounds are stored on 64 bits so that the whole address space is
//! representable as the half-open range `[0, 2^32)`.

use cs_program::Addr;
use serde::Serialize;
use std::fmt;

const ADDR_SPACE_END: u64 = 1 << 32;

/// Half-open byte range `[lo, hi)`, never empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct MemArea {
    lo: u64,
    hi: u64,
}

impl fmt::Display for MemArea {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{:#010x}, {:#x})", self.lo, self.hi)
    }
}

impl MemArea {
    /// Area of `size` bytes starting at `base`, clipped to the address space.
    /// Returns `None` for zero-sized accesses.
    #[must_use]
    pub fn new(base: Addr, size: u32) -> Option<Self> {
        let lo = u64::from(base.value());
        let hi = (lo + u64::from(size)).min(ADDR_SPACE_END);
        if hi > lo {
            Some(Self { lo, hi })
        } else {
            None
        }
    }

    /// The whole address space.
    #[must_use]
    pub const fn full() -> Self {
        Self {
            lo: 0,
            hi: ADDR_SPACE_END,
        }
    }

    #[inline]
    #[must_use]
    pub const fn lo(&self) -> u64 {
        self.lo
    }

    #[inline]
    #[must_use]
    pub const fn hi(&self) -> u64 {
        self.hi
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.hi - self.lo
    }

    #[inline]
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.lo == 0 && self.hi == ADDR_SPACE_END
    }

    #[inline]
    #[must_use]
    pub fn contains_addr(&self, addr: Addr) -> bool {
        let a = u64::from(addr.value());
        self.lo <= a && a < self.hi
    }

    #[inline]
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.lo < other.hi && other.lo < self.hi
    }

    #[must_use]
    pub fn meet(&self, other: &Self) -> Option<Self> {
        let lo = self.lo.max(other.lo);
        let hi = self.hi.min(other.hi);
        if lo < hi {
            Some(Self { lo, hi })
        } else {
            None
        }
    }
}

/// A set of memory addresses, as a union of areas.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct MemorySet {
    areas: Vec<MemArea>,
}

impl fmt::Display for MemorySet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{{")?;
        for (i, area) in self.areas.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{area}")?;
        }
        write!(f, "}}")
    }
}

impl From<MemArea> for MemorySet {
    fn from(area: MemArea) -> Self {
        Self { areas: vec![area] }
    }
}

impl FromIterator<MemArea> for MemorySet {
    fn from_iter<I: IntoIterator<Item = MemArea>>(iter: I) -> Self {
        let mut set = Self::empty();
        for area in iter {
            set.add(area);
        }
        set
    }
}

impl MemorySet {
    #[inline]
    #[must_use]
    pub const fn empty() -> Self {
        Self { areas: Vec::new() }
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn areas(&self) -> &[MemArea] {
        &self.areas
    }

    /// Number of addresses in the set.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.areas.iter().map(MemArea::len).sum()
    }

    /// Adds an area, merging it with overlapping or adjacent ones.
    pub fn add(&mut self, area: MemArea) {
        // first area that may overlap or touch the new one
        let start = self.areas.partition_point(|a| a.hi < area.lo);
        let mut end = start;
        let mut merged = area;
        while end < self.areas.len() && self.areas[end].lo <= merged.hi {
            merged.lo = merged.lo.min(self.areas[end].lo);
            merged.hi = merged.hi.max(self.areas[end].hi);
            end += 1;
        }
        self.areas.splice(start..end, [merged]);
    }

    /// Removes every address of `area` from the set.
    pub fn remove(&mut self, area: &MemArea) {
        let mut res = Vec::with_capacity(self.areas.len() + 1);
        for a in &self.areas {
            if !a.overlaps(area) {
                res.push(*a);
                continue;
            }
            if a.lo < area.lo {
                res.push(MemArea {
                    lo: a.lo,
                    hi: area.lo,
                });
            }
            if area.hi < a.hi {
                res.push(MemArea {
                    lo: area.hi,
                    hi: a.hi,
                });
            }
        }
        self.areas = res;
    }

    /// In-place union.
    pub fn join(&mut self, other: &Self) {
        for area in &other.areas {
            self.add(*area);
        }
    }

    /// Intersection of both sets.
    #[must_use]
    pub fn meet(&self, other: &Self) -> Self {
        let mut res = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < self.areas.len() && j < other.areas.len() {
            let (a, b) = (&self.areas[i], &other.areas[j]);
            if let Some(m) = a.meet(b) {
                res.push(m);
            }
            if a.hi < b.hi {
                i += 1;
            } else {
                j += 1;
            }
        }
        Self { areas: res }
    }

    /// Returns `true` if the whole `area` belongs to the set.
    #[must_use]
    pub fn contains(&self, area: &MemArea) -> bool {
        let i = self.areas.partition_point(|a| a.hi <= area.lo);
        self.areas
            .get(i)
            .map_or(false, |a| a.lo <= area.lo && area.hi <= a.hi)
    }

    #[must_use]
    pub fn contains_addr(&self, addr: Addr) -> bool {
        let a = u64::from(addr.value());
        let i = self.areas.partition_point(|area| area.hi <= a);
        self.areas.get(i).map_or(false, |area| area.lo <= a)
    }

    /// Returns `true` if `other` is a subset of `self`.
    #[must_use]
    pub fn includes(&self, other: &Self) -> bool {
        other.areas.iter().all(|a| self.contains(a))
    }

    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        !self.meet(other).is_empty()
    }
}
