//! Interprocedural dataflow framework.

use crate::state::LiveState;
use cs_program::BlockId;
use std::collections::BTreeMap;

mod backward;

pub use backward::{backward, BackwardTransfer, KillGen, WorkItem};

/// Dataflow analysis result object.
///
/// Contains the accumulated entry and exit states of every block reached by
/// a propagation. Blocks never reached have no state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dataflow {
    pub entries: BTreeMap<BlockId, LiveState>,
    pub exits: BTreeMap<BlockId, LiveState>,
}

impl Dataflow {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if every state of `other` is included in the matching
    /// state of `self`.
    #[must_use]
    pub fn includes(&self, other: &Self) -> bool {
        let covers = |mine: &BTreeMap<BlockId, LiveState>, theirs: &BTreeMap<BlockId, LiveState>| {
            theirs.iter().all(|(id, s)| {
                mine.get(id)
                    .map_or_else(|| s.is_empty(), |m| m.includes(s))
            })
        };
        covers(&self.entries, &other.entries) && covers(&self.exits, &other.exits)
    }
}
