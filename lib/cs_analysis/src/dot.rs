//! Graphviz rendering of slicing decisions and sliced programs.

use crate::slicing::{Rebuilt, Slice};
use cs_program::{BlockId, CfgCollection, DotStyle, InstRef};
use std::collections::BTreeSet;

const DROPPED: &str = "red";
const SEED: &str = "blue";

struct SliceStyle<'a> {
    cfgs: &'a CfgCollection,
    slice: &'a Slice,
}

impl DotStyle for SliceStyle<'_> {
    fn inst_color(&self, at: InstRef) -> Option<&str> {
        if self.slice.seeds().contains(&at) {
            Some(SEED)
        } else if self.slice.is_retained(at) {
            None
        } else {
            Some(DROPPED)
        }
    }

    fn block_color(&self, id: BlockId) -> Option<&str> {
        (self.cfgs.block(id).is_basic() && self.slice.retained(id).is_none()).then_some(DROPPED)
    }
}

/// Renders `cfgs` with the instructions dropped by `slice` in red, and the
/// seeds in blue. Basic blocks about to be removed are framed in red.
#[must_use]
pub fn slicing_to_dot(cfgs: &CfgCollection, slice: &Slice) -> String {
    cfgs.to_dot_styled(&SliceStyle { cfgs, slice })
}

struct BypassStyle(BTreeSet<(BlockId, BlockId)>);

impl DotStyle for BypassStyle {
    fn dashed_edge(&self, src: BlockId, dst: BlockId) -> bool {
        self.0.contains(&(src, dst))
    }
}

/// Renders a sliced program, bypass edges dashed.
#[must_use]
pub fn rebuilt_to_dot(rebuilt: &Rebuilt) -> String {
    let bypasses = rebuilt
        .bypasses
        .iter()
        .filter_map(|(p, s)| Some((*rebuilt.block_map.get(p)?, *rebuilt.block_map.get(s)?)))
        .collect();
    rebuilt.cfgs.to_dot_styled(&BypassStyle(bypasses))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::fixtures::*;
    use crate::slicing::{compute_slice, rebuild};
    use cs_program::ClpManager;

    #[test]
    fn colored_decision() {
        let d = diamond();
        let manager = ClpManager::new();
        let seed = InstRef {
            block: d.d,
            index: 0,
        };
        let slice = compute_slice(&d.cfgs, &manager, &AnalysisConfig::default(), &[seed]).unwrap();
        let dot = slicing_to_dot(&d.cfgs, &slice);

        assert!(dot.contains("<font color=\"red\">0x00000200: str r2, [0x2000]</font>"));
        assert!(dot.contains("<font color=\"blue\">0x00000400: ldr r0, [0x1000]</font>"));
        assert!(dot.contains("0x00000300: str r2, [0x1000]<br"));
        assert_eq!(dot.matches("color=red").count(), 2);
    }

    #[test]
    fn dashed_bypasses() {
        let d = diamond();
        let manager = ClpManager::new();
        let seed = InstRef {
            block: d.d,
            index: 0,
        };
        let slice = compute_slice(&d.cfgs, &manager, &AnalysisConfig::default(), &[seed]).unwrap();
        let rebuilt = rebuild(&d.cfgs, &slice).unwrap();
        let dot = rebuilt_to_dot(&rebuilt);

        assert_eq!(dot.matches("style=dashed").count(), 1);
        assert!(dot.contains("color=green,xlabel=\"taken\",style=dashed"));
        assert!(!rebuilt.cfgs.to_dot().contains("dashed"));
    }
}
