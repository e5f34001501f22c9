//! Program slicing.
//!
//! Starting from a set of interesting instructions, a backward propagation
//! keeps every instruction that may write something the retained instructions
//! read, directly or transitively. Instructions not kept are dropped by the
//! CFG reconstruction ([`rebuild`]), which also removes the basic blocks
//! left without instruction.

use crate::config::AnalysisConfig;
use crate::dataflow::{backward, BackwardTransfer, Dataflow, WorkItem};
use crate::errors::AnalysisResult;
use crate::memaccess::MemAccessCache;
use crate::state::{Footprint, LiveState};
use cs_program::{BlockId, CfgCollection, InstRef, Interpreter};
use std::collections::{BTreeMap, BTreeSet};

mod rebuild;

pub use rebuild::{rebuild, Rebuilt};

/// Slicing decision: the instructions to retain in every block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Slice {
    seeds: BTreeSet<InstRef>,
    retained: BTreeMap<BlockId, BTreeSet<usize>>,
    flow: Dataflow,
}

impl Slice {
    #[must_use]
    pub fn seeds(&self) -> &BTreeSet<InstRef> {
        &self.seeds
    }

    #[must_use]
    pub fn is_retained(&self, at: InstRef) -> bool {
        self.retained
            .get(&at.block)
            .map_or(false, |set| set.contains(&at.index))
    }

    /// Indexes of the retained instructions of `block`, `None` when none is.
    #[must_use]
    pub fn retained(&self, block: BlockId) -> Option<&BTreeSet<usize>> {
        self.retained.get(&block).filter(|set| !set.is_empty())
    }

    #[must_use]
    pub fn retained_count(&self) -> usize {
        self.retained.values().map(BTreeSet::len).sum()
    }

    /// Demand accumulated at block boundaries by the slicing propagation.
    #[must_use]
    pub fn dataflow(&self) -> &Dataflow {
        &self.flow
    }
}

struct Slicer<'s> {
    seeds: &'s BTreeSet<InstRef>,
    retained: BTreeMap<BlockId, BTreeSet<usize>>,
}

impl<'s> BackwardTransfer for Slicer<'s> {
    fn transfer(&mut self, at: InstRef, footprint: &Footprint, state: &mut LiveState) {
        if self.seeds.contains(&at) || state.is_demanded_by(footprint) {
            log::trace!("      keep #{}", at.index);
            self.retained.entry(at.block).or_default().insert(at.index);
            state.update(footprint);
        } else {
            log::trace!("      drop #{}", at.index);
        }
    }
}

/// Computes the instructions `interesting` depends on.
///
/// # Errors
///
/// Fails on malformed CFGs and seeds not referencing an instruction.
pub fn compute_slice<I: Interpreter>(
    cfgs: &CfgCollection,
    interp: &I,
    config: &AnalysisConfig,
    interesting: &[InstRef],
) -> AnalysisResult<Slice> {
    let mut cache = MemAccessCache::new(cfgs, interp, config.widening_threshold);
    let seeds: BTreeSet<InstRef> = interesting.iter().copied().collect();

    let mut items = Vec::with_capacity(seeds.len());
    for at in &seeds {
        let footprint = cache.footprint(*at)?;
        items.push(WorkItem::new(
            at.block,
            Some(at.index),
            LiveState::demand_of(&footprint),
        ));
    }

    let mut slicer = Slicer {
        seeds: &seeds,
        retained: BTreeMap::new(),
    };
    let mut flow = Dataflow::new();
    backward(
        &mut cache,
        config.unresolved_calls,
        &mut slicer,
        items,
        &mut flow,
    )?;
    let retained = slicer.retained;

    let total: usize = cfgs.basic_blocks().map(|(_, bb)| bb.len()).sum();
    let kept: usize = retained.values().map(BTreeSet::len).sum();
    log::info!(
        "slicing: {} seeds, {kept}/{total} instructions retained",
        seeds.len()
    );

    Ok(Slice {
        seeds,
        retained,
        flow,
    })
}
