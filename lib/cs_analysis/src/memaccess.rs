//! Per-block cache of resolved memory accesses.
//!
//! The first time a block is asked for, the abstract interpreter replays it
//! from its head and every load and store gets its address resolved. Results
//! are kept for the whole analysis run: replaying a block is done at most once.

use crate::errors::{AnalysisError, AnalysisResult};
use crate::state::Footprint;
use cs_dfa::{MemArea, MemorySet};
use cs_program::{
    Addr, BlockId, BlockKind, CfgCollection, Clp, Cursor, InstRef, Interpreter, SemOp,
};
use std::collections::HashMap;
use std::fmt;

/// Resolved address of a memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessRange {
    /// A single known address.
    Exact(Addr),
    /// Addresses `base + i * stride` for `0 <= i <= repeat`.
    Strided { base: Addr, stride: u32, repeat: u32 },
    /// Any address.
    Full,
}

impl fmt::Display for AccessRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Exact(a) => write!(f, "{a}"),
            Self::Strided {
                base,
                stride,
                repeat,
            } => write!(f, "{base} + {stride:#x} * [0..{repeat}]"),
            Self::Full => write!(f, "*"),
        }
    }
}

impl AccessRange {
    /// Widens unknown values and progressions repeated more than `threshold`
    /// times to the whole address space.
    #[must_use]
    pub fn resolve(value: Clp, threshold: u32) -> Self {
        match value {
            Clp::Val {
                lower,
                delta,
                mtimes,
            } => {
                if delta == 0 || mtimes == 0 {
                    Self::Exact(Addr(lower))
                } else if mtimes > threshold {
                    Self::Full
                } else {
                    Self::Strided {
                        base: Addr(lower),
                        stride: delta,
                        repeat: mtimes,
                    }
                }
            }
            Clp::All | Clp::None => Self::Full,
        }
    }
}

/// One load or store of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemAccess {
    index: usize,
    range: AccessRange,
    size: u32,
}

impl fmt::Display for MemAccess {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{} {} ({} bytes)", self.index, self.range, self.size)
    }
}

impl MemAccess {
    /// Index of the accessing instruction in its block.
    #[inline]
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    #[must_use]
    pub fn range(&self) -> AccessRange {
        self.range
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> u32 {
        self.size
    }

    #[inline]
    #[must_use]
    pub fn is_exact(&self) -> bool {
        matches!(self.range, AccessRange::Exact(_))
    }

    /// Addresses possibly touched by the access.
    #[must_use]
    pub fn areas(&self) -> MemorySet {
        match self.range {
            AccessRange::Exact(a) => MemArea::new(a, self.size).into_iter().collect(),
            AccessRange::Strided {
                base,
                stride,
                repeat,
            } => Clp::strided(base.value(), stride, repeat)
                .values()
                .map(|values| {
                    values
                        .filter_map(|v| MemArea::new(Addr(v), self.size))
                        .collect::<MemorySet>()
                })
                .unwrap_or_else(|| MemorySet::from(MemArea::full())),
            AccessRange::Full => MemorySet::from(MemArea::full()),
        }
    }
}

/// Loads and stores of a block, in instruction order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockAccesses {
    reads: Vec<MemAccess>,
    writes: Vec<MemAccess>,
}

impl BlockAccesses {
    #[inline]
    #[must_use]
    pub fn reads(&self) -> &[MemAccess] {
        &self.reads
    }

    #[inline]
    #[must_use]
    pub fn writes(&self) -> &[MemAccess] {
        &self.writes
    }

    pub fn reads_of(&self, index: usize) -> impl Iterator<Item = &MemAccess> {
        self.reads.iter().filter(move |a| a.index == index)
    }

    pub fn writes_of(&self, index: usize) -> impl Iterator<Item = &MemAccess> {
        self.writes.iter().filter(move |a| a.index == index)
    }
}

pub struct MemAccessCache<'a, I: Interpreter> {
    cfgs: &'a CfgCollection,
    interp: &'a I,
    threshold: u32,
    blocks: HashMap<BlockId, BlockAccesses>,
}

impl<'a, I: Interpreter> MemAccessCache<'a, I> {
    pub fn new(cfgs: &'a CfgCollection, interp: &'a I, threshold: u32) -> Self {
        Self {
            cfgs,
            interp,
            threshold,
            blocks: HashMap::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn cfgs(&self) -> &'a CfgCollection {
        self.cfgs
    }

    /// Returns `true` if the accesses of `block` were already identified.
    #[must_use]
    pub fn is_identified(&self, block: BlockId) -> bool {
        self.blocks.contains_key(&block)
    }

    /// Identifies the memory accesses of `block`, replaying it only on
    /// the first call.
    pub fn ensure(&mut self, block: BlockId) -> AnalysisResult<&BlockAccesses> {
        if !self.blocks.contains_key(&block) {
            let accesses = self.identify(block)?;
            self.blocks.insert(block, accesses);
        }
        self.blocks
            .get(&block)
            .ok_or_else(|| AnalysisError::Internal(format!("no accesses for {block:?}")))
    }

    fn identify(&self, block: BlockId) -> AnalysisResult<BlockAccesses> {
        let cfgs = self.cfgs;
        let mut accesses = BlockAccesses::default();
        match cfgs.block(block).kind() {
            BlockKind::Basic(_) => (),
            BlockKind::Entry | BlockKind::Exit | BlockKind::Synth(_) | BlockKind::Phony => {
                return Ok(accesses)
            }
        }
        log::trace!("identifying memory accesses of {}", cfgs.label(block));

        let Some(mut cursor) = self.interp.start(cfgs, block) else {
            return Ok(accesses);
        };
        loop {
            match cursor.sem() {
                SemOp::Load { addr, ty, .. } => {
                    let access = MemAccess {
                        index: cursor.index(),
                        range: AccessRange::resolve(cursor.address(*addr), self.threshold),
                        size: ty.size(),
                    };
                    log::trace!("  read  {access}");
                    accesses.reads.push(access);
                }
                SemOp::Store { addr, ty, .. } => {
                    let access = MemAccess {
                        index: cursor.index(),
                        range: AccessRange::resolve(cursor.address(*addr), self.threshold),
                        size: ty.size(),
                    };
                    log::trace!("  write {access}");
                    accesses.writes.push(access);
                }
                _ => (),
            }
            if !cursor.next() {
                break;
            }
        }
        Ok(accesses)
    }

    /// Register and memory footprint of the instruction at `at`.
    pub fn footprint(&mut self, at: InstRef) -> AnalysisResult<Footprint> {
        let cfgs = self.cfgs;
        let inst = cfgs.inst(at).ok_or_else(|| {
            AnalysisError::MalformedCfg(format!(
                "no instruction {} in block {}",
                at.index,
                cfgs.label(at.block)
            ))
        })?;
        let reg_count = cfgs.platform().reg_count();
        let accesses = self.ensure(at.block)?;
        Ok(Footprint::of(inst, at.index, accesses, reg_count))
    }
}
