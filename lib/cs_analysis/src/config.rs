//! Analysis parameters.

use serde::{Deserialize, Serialize};

/// Repeat count above which a strided memory access is widened to the whole
/// address space.
pub const DEFAULT_WIDENING_THRESHOLD: u32 = 0xCAFE;

/// Handling of call blocks whose callee could not be resolved, when looking
/// for the blocks control returns from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnresolvedCalls {
    /// The call is a dead end: nothing flows back through it.
    #[default]
    Skip,
    /// Any basic block of the program may flow back through the call.
    AllBlocks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub widening_threshold: u32,
    pub unresolved_calls: UnresolvedCalls,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            widening_threshold: DEFAULT_WIDENING_THRESHOLD,
            unresolved_calls: UnresolvedCalls::Skip,
        }
    }
}
