//! Liveness domain.
//!
//! A [`LiveState`] pairs a register bit set, one bit per platform register,
//! with a set of memory areas. States are joined by union and only grow
//! during a propagation.

use crate::memaccess::BlockAccesses;
use cs_dfa::MemorySet;
use cs_program::{Addr, Inst, Platform, Reg};
use fixedbitset::FixedBitSet;
use std::fmt;

fn reg_set(regs: &[Reg], reg_count: usize) -> FixedBitSet {
    let mut set = FixedBitSet::with_capacity(reg_count);
    for r in regs {
        if r.index() >= set.len() {
            set.grow(r.index() + 1);
        }
        set.insert(r.index());
    }
    set
}

/// Registers and memory an instruction reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Footprint {
    pub reads: FixedBitSet,
    pub writes: FixedBitSet,
    pub mem_reads: MemorySet,
    /// Addresses the instruction may write.
    pub mem_writes: MemorySet,
    /// Addresses the instruction certainly writes.
    pub mem_kills: MemorySet,
}

impl Footprint {
    #[must_use]
    pub fn of(inst: &Inst, index: usize, accesses: &BlockAccesses, reg_count: usize) -> Self {
        let mut mem_reads = MemorySet::empty();
        for access in accesses.reads_of(index) {
            mem_reads.join(&access.areas());
        }
        let mut mem_writes = MemorySet::empty();
        let mut mem_kills = MemorySet::empty();
        for access in accesses.writes_of(index) {
            let areas = access.areas();
            if access.is_exact() {
                mem_kills.join(&areas);
            }
            mem_writes.join(&areas);
        }
        Self {
            reads: reg_set(inst.read_regs(), reg_count),
            writes: reg_set(inst.written_regs(), reg_count),
            mem_reads,
            mem_writes,
            mem_kills,
        }
    }
}

/// Registers and memory whose values may still be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveState {
    regs: FixedBitSet,
    mem: MemorySet,
}

impl fmt::Display for LiveState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "regs {{")?;
        for (i, r) in self.regs.ones().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "#{r}")?;
        }
        write!(f, "}} mem {}", self.mem)
    }
}

impl LiveState {
    #[must_use]
    pub fn new(reg_count: usize) -> Self {
        Self {
            regs: FixedBitSet::with_capacity(reg_count),
            mem: MemorySet::empty(),
        }
    }

    /// The state demanded by an instruction: what it reads.
    #[must_use]
    pub fn demand_of(footprint: &Footprint) -> Self {
        Self {
            regs: footprint.reads.clone(),
            mem: footprint.mem_reads.clone(),
        }
    }

    #[inline]
    #[must_use]
    pub fn regs(&self) -> &FixedBitSet {
        &self.regs
    }

    #[inline]
    #[must_use]
    pub fn mem(&self) -> &MemorySet {
        &self.mem
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regs.count_ones(..) == 0 && self.mem.is_empty()
    }

    #[must_use]
    pub fn contains_reg(&self, reg: Reg) -> bool {
        self.regs.contains(reg.index())
    }

    #[must_use]
    pub fn contains_addr(&self, addr: Addr) -> bool {
        self.mem.contains_addr(addr)
    }

    pub fn live_regs(&self) -> impl Iterator<Item = Reg> + '_ {
        self.regs
            .ones()
            .filter_map(|i| u16::try_from(i).ok().map(Reg::from))
    }

    /// Names of the live registers.
    #[must_use]
    pub fn reg_names<'p>(&self, platform: &'p Platform) -> Vec<&'p str> {
        self.live_regs().map(|r| platform.name(r)).collect()
    }

    /// Kill then gen: moves the state from after an instruction to before it.
    pub fn update(&mut self, footprint: &Footprint) {
        self.regs.difference_with(&footprint.writes);
        self.regs.union_with(&footprint.reads);
        for area in footprint.mem_kills.areas() {
            self.mem.remove(area);
        }
        self.mem.join(&footprint.mem_reads);
    }

    /// Returns `true` if the instruction may write something of the state.
    #[must_use]
    pub fn is_demanded_by(&self, footprint: &Footprint) -> bool {
        !self.regs.is_disjoint(&footprint.writes) || self.mem.intersects(&footprint.mem_writes)
    }

    /// Returns `true` if `other` is included in `self`.
    #[must_use]
    pub fn includes(&self, other: &Self) -> bool {
        self.regs.is_superset(&other.regs) && self.mem.includes(&other.mem)
    }

    pub fn join(&mut self, other: &Self) {
        self.regs.union_with(&other.regs);
        self.mem.join(&other.mem);
    }
}
