//! Interprocedural predecessors.
//!
//! Backward propagations only stop on blocks holding instructions (basic and
//! phony blocks). Every other block met while going up an edge is expanded:
//!
//! - the entry of a CFG is replaced by the predecessors of its call sites;
//! - a call block is replaced by the blocks flowing into the exit of its
//!   callee (control returns into the caller from there);
//! - a call to an unknown CFG follows the [`UnresolvedCalls`] policy.

use crate::config::UnresolvedCalls;
use crate::errors::{AnalysisError, AnalysisResult};
use cs_program::{BlockId, BlockKind, CfgCollection};
use std::collections::HashSet;

/// Outcome of a predecessor resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Basic and phony blocks the propagation goes on from.
    pub stops: Vec<BlockId>,
    /// Entry, exit and call blocks expanded on the way. They hold no
    /// instruction, so the state flowing through them is their entry and
    /// exit state at once.
    pub crossed: Vec<BlockId>,
}

impl Resolution {
    fn stop(&mut self, id: BlockId, found: &mut HashSet<BlockId>) {
        if found.insert(id) {
            self.stops.push(id);
        }
    }

    fn cross(&mut self, id: BlockId, crossed: &mut HashSet<BlockId>) {
        if crossed.insert(id) {
            self.crossed.push(id);
        }
    }
}

/// Blocks whose exit flows into the entry of `block`.
///
/// # Errors
///
/// Fails on an exit block used as an edge source.
pub fn predecessors(
    cfgs: &CfgCollection,
    block: BlockId,
    policy: UnresolvedCalls,
) -> AnalysisResult<Vec<BlockId>> {
    Ok(resolve(cfgs, block, policy)?.stops)
}

/// Same as [`predecessors`], also reporting the blocks crossed to reach
/// them.
///
/// # Errors
///
/// Fails on an exit block used as an edge source.
pub fn resolve(
    cfgs: &CfgCollection,
    block: BlockId,
    policy: UnresolvedCalls,
) -> AnalysisResult<Resolution> {
    let mut res = Resolution::default();
    let mut found = HashSet::new();
    let mut crossed = HashSet::new();
    let mut visited = HashSet::new();
    let mut stack: Vec<BlockId> = Vec::new();

    push_sources(cfgs, block, &mut stack, &mut res, &mut crossed);

    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        match cfgs.block(id).kind() {
            BlockKind::Basic(_) | BlockKind::Phony => res.stop(id, &mut found),
            BlockKind::Entry => {
                res.cross(id, &mut crossed);
                push_sources(cfgs, id, &mut stack, &mut res, &mut crossed);
            }
            BlockKind::Synth(Some(callee)) => {
                let exit = cfgs.cfg(*callee).exit();
                res.cross(id, &mut crossed);
                res.cross(exit, &mut crossed);
                stack.extend(cfgs.in_edges(exit).map(|(_, src)| src));
            }
            BlockKind::Synth(None) => {
                res.cross(id, &mut crossed);
                match policy {
                    UnresolvedCalls::Skip => {
                        log::warn!(
                            "unresolved call {}: nothing flows back through it",
                            cfgs.label(id)
                        );
                    }
                    UnresolvedCalls::AllBlocks => {
                        log::debug!(
                            "unresolved call {}: every basic block is a predecessor",
                            cfgs.label(id)
                        );
                        for (bb, _) in cfgs.basic_blocks() {
                            res.stop(bb, &mut found);
                        }
                    }
                }
            }
            BlockKind::Exit => {
                return Err(AnalysisError::MalformedCfg(format!(
                    "exit block {} used as a predecessor",
                    cfgs.label(id)
                )))
            }
        }
    }
    Ok(res)
}

// Sources of the edges entering `id`; for an entry block, sources of the
// edges entering its call sites.
fn push_sources(
    cfgs: &CfgCollection,
    id: BlockId,
    stack: &mut Vec<BlockId>,
    res: &mut Resolution,
    crossed: &mut HashSet<BlockId>,
) {
    match cfgs.block(id).kind() {
        BlockKind::Entry => {
            let cfg = cfgs.block(id).cfg();
            for site in cfgs.call_sites(cfg) {
                res.cross(site, crossed);
                stack.extend(cfgs.in_edges(site).map(|(_, src)| src));
            }
        }
        _ => stack.extend(cfgs.in_edges(id).map(|(_, src)| src)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::*;
    use cs_program::{Branch, CollectionBuilder};

    #[test]
    fn plain_edges() {
        let d = diamond();
        let mut preds = predecessors(&d.cfgs, d.d, UnresolvedCalls::Skip).unwrap();
        preds.sort();
        assert_eq!(preds, vec![d.b, d.c]);
        assert!(predecessors(&d.cfgs, d.a, UnresolvedCalls::Skip)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn through_calls_and_returns() {
        let t = two_calls();
        // returning from f into the block after the first call
        assert_eq!(
            predecessors(&t.cfgs, t.after1, UnresolvedCalls::Skip).unwrap(),
            vec![t.body]
        );
        // entering f from both call sites
        let mut preds = predecessors(&t.cfgs, t.body, UnresolvedCalls::Skip).unwrap();
        preds.sort();
        assert_eq!(preds, vec![t.before1, t.before2]);
    }

    #[test]
    fn self_loop() {
        let p = platform();
        let mut b = CollectionBuilder::new(p.clone());
        let main = b.add_cfg("main");
        let x = b.add_basic(main, vec![mov(&p, 0x0, 1, 1)]).unwrap();
        b.add_edge(b.entry(main), x, Branch::Seq);
        b.add_edge(x, x, Branch::Taken);
        b.add_edge(x, b.exit(main), Branch::NotTaken);
        let cfgs = b.build().unwrap();
        assert_eq!(predecessors(&cfgs, x, UnresolvedCalls::Skip).unwrap(), vec![x]);
    }

    #[test]
    fn unresolved_call_policy() {
        let p = platform();
        let mut b = CollectionBuilder::new(p.clone());
        let main = b.add_cfg("main");
        let x = b.add_basic(main, vec![mov(&p, 0x0, 1, 1)]).unwrap();
        let call = b.add_synth(main, None);
        let y = b.add_basic(main, vec![use_reg(&p, 0x4, 1)]).unwrap();
        b.add_edge(b.entry(main), x, Branch::Seq);
        b.add_edge(x, call, Branch::Seq);
        b.add_edge(call, y, Branch::Seq);
        b.add_edge(y, b.exit(main), Branch::Seq);
        let cfgs = b.build().unwrap();

        assert!(predecessors(&cfgs, y, UnresolvedCalls::Skip)
            .unwrap()
            .is_empty());
        let mut preds = predecessors(&cfgs, y, UnresolvedCalls::AllBlocks).unwrap();
        preds.sort();
        assert_eq!(preds, vec![x, y]);
    }

    #[test]
    fn call_of_empty_function() {
        let p = platform();
        let mut b = CollectionBuilder::new(p.clone());
        let main = b.add_cfg("main");
        let f = b.add_cfg("f");
        let call = b.add_synth(main, Some(f));
        let after = b.add_basic(main, vec![use_reg(&p, 0x0, 0)]).unwrap();
        b.add_edge(b.entry(main), call, Branch::Seq);
        b.add_edge(call, after, Branch::Seq);
        b.add_edge(after, b.exit(main), Branch::Seq);
        // f returns straight from its entry
        b.add_edge(b.entry(f), b.exit(f), Branch::Seq);
        let cfgs = b.build().unwrap();
        // the entry of f expands to the (empty) callers of main
        assert!(predecessors(&cfgs, after, UnresolvedCalls::Skip)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn crossed_blocks() {
        let t = two_calls();
        let f = t.cfgs.cfg(t.f);
        let res = resolve(&t.cfgs, t.after1, UnresolvedCalls::Skip).unwrap();
        assert_eq!(res.stops, vec![t.body]);
        assert_eq!(res.crossed, vec![t.call1, f.exit()]);

        let mut res = resolve(&t.cfgs, t.body, UnresolvedCalls::Skip).unwrap();
        res.crossed.sort();
        let mut expected = vec![f.entry(), t.call1, t.call2];
        expected.sort();
        assert_eq!(res.crossed, expected);

        // main is never called: its entry is crossed, nothing found above it
        let main = t.cfgs.entry_cfg();
        let res = resolve(&t.cfgs, t.before1, UnresolvedCalls::Skip).unwrap();
        assert!(res.stops.is_empty());
        assert_eq!(res.crossed, vec![main.entry()]);
    }

    #[test]
    fn phony_blocks_stop_the_walk() {
        let p = platform();
        let mut b = CollectionBuilder::new(p.clone());
        let main = b.add_cfg("main");
        let x = b.add_basic(main, vec![mov(&p, 0x0, 1, 1)]).unwrap();
        let phony = b.add_phony(main);
        let y = b.add_basic(main, vec![use_reg(&p, 0x4, 1)]).unwrap();
        b.add_edge(b.entry(main), x, Branch::Seq);
        b.add_edge(x, phony, Branch::Seq);
        b.add_edge(phony, y, Branch::Seq);
        b.add_edge(y, b.exit(main), Branch::Seq);
        let cfgs = b.build().unwrap();

        let res = resolve(&cfgs, y, UnresolvedCalls::Skip).unwrap();
        assert_eq!(res.stops, vec![phony]);
        assert!(res.crossed.is_empty());
        assert_eq!(predecessors(&cfgs, phony, UnresolvedCalls::Skip).unwrap(), vec![x]);
    }
}
