//! Interprocedural liveness of registers and memory.

use crate::config::AnalysisConfig;
use crate::dataflow::{backward, Dataflow, KillGen, WorkItem};
use crate::errors::{AnalysisError, AnalysisResult};
use crate::memaccess::MemAccessCache;
use crate::predecessors::predecessors;
use crate::state::LiveState;
use cs_program::{Addr, BlockId, BlockKind, CfgCollection, InstRef, Interpreter, Reg};

/// Liveness analysis result.
///
/// Holds the entry and exit states of the blocks reached by the analysis.
/// States before each instruction are recomputed on demand from the exit
/// state of their block.
pub struct Liveness<'a, I: Interpreter> {
    cache: MemAccessCache<'a, I>,
    flow: Dataflow,
}

/// Program points the liveness of a whole program is computed from: the last
/// instruction of every block returning from the entry CFG.
///
/// # Errors
///
/// Fails on malformed CFGs.
pub fn exit_points(cfgs: &CfgCollection, config: &AnalysisConfig) -> AnalysisResult<Vec<InstRef>> {
    let exit = cfgs.entry_cfg().exit();
    let mut points: Vec<InstRef> = predecessors(cfgs, exit, config.unresolved_calls)?
        .into_iter()
        .filter_map(|block| {
            cfgs.block(block).as_basic().map(|bb| InstRef {
                block,
                index: bb.len() - 1,
            })
        })
        .collect();
    points.sort();
    Ok(points)
}

impl<'a, I: Interpreter> Liveness<'a, I> {
    /// Computes the liveness of the whole program, seeded at its exit points.
    ///
    /// # Errors
    ///
    /// Fails on malformed CFGs.
    pub fn compute(
        cfgs: &'a CfgCollection,
        interp: &'a I,
        config: &AnalysisConfig,
    ) -> AnalysisResult<Self> {
        let seeds = exit_points(cfgs, config)?;
        if seeds.is_empty() {
            log::warn!("'{}' never returns", cfgs.entry_cfg().name());
        }
        Self::compute_from(cfgs, interp, config, &seeds)
    }

    /// Computes the liveness demanded by the instructions of `seeds`.
    ///
    /// # Errors
    ///
    /// Fails on malformed CFGs and seeds not referencing an instruction.
    pub fn compute_from(
        cfgs: &'a CfgCollection,
        interp: &'a I,
        config: &AnalysisConfig,
        seeds: &[InstRef],
    ) -> AnalysisResult<Self> {
        let mut cache = MemAccessCache::new(cfgs, interp, config.widening_threshold);
        let mut flow = Dataflow::new();

        let mut items = Vec::with_capacity(seeds.len());
        for at in seeds {
            let footprint = cache.footprint(*at)?;
            items.push(WorkItem::new(
                at.block,
                Some(at.index),
                LiveState::demand_of(&footprint),
            ));
        }
        log::info!("liveness: {} seeds", items.len());
        backward(&mut cache, config.unresolved_calls, &mut KillGen, items, &mut flow)?;
        log::info!("liveness: {} blocks reached", flow.entries.len());

        Ok(Self { cache, flow })
    }

    #[must_use]
    pub fn cfgs(&self) -> &'a CfgCollection {
        self.cache.cfgs()
    }

    #[must_use]
    pub fn dataflow(&self) -> &Dataflow {
        &self.flow
    }

    /// State demanded at the entry of `block`, `None` if never reached.
    #[must_use]
    pub fn entry(&self, block: BlockId) -> Option<&LiveState> {
        self.flow.entries.get(&block)
    }

    /// State demanded at the exit of `block`, `None` if never reached.
    #[must_use]
    pub fn exit(&self, block: BlockId) -> Option<&LiveState> {
        self.flow.exits.get(&block)
    }

    /// States live before every instruction of `block`, in program order.
    ///
    /// # Errors
    ///
    /// Fails on malformed CFGs.
    pub fn instruction_states(&mut self, block: BlockId) -> AnalysisResult<Vec<(InstRef, LiveState)>> {
        let cfgs = self.cache.cfgs();
        let BlockKind::Basic(bb) = cfgs.block(block).kind() else {
            return Ok(Vec::new());
        };
        let mut state = self
            .flow
            .exits
            .get(&block)
            .cloned()
            .unwrap_or_else(|| LiveState::new(cfgs.platform().reg_count()));
        let mut res = Vec::with_capacity(bb.len());
        for (index, _) in bb.rev_insts() {
            let at = InstRef { block, index };
            let footprint = self.cache.footprint(at)?;
            state.update(&footprint);
            res.push((at, state.clone()));
        }
        res.reverse();
        Ok(res)
    }

    fn state_before(&mut self, at: InstRef) -> AnalysisResult<LiveState> {
        self.instruction_states(at.block)?
            .into_iter()
            .find_map(|(i, s)| (i == at).then_some(s))
            .ok_or_else(|| {
                AnalysisError::InstructionNotFound(format!(
                    "{} in block {}",
                    at.index,
                    self.cfgs().label(at.block)
                ))
            })
    }

    /// Returns `true` if `reg` is live right before the instruction at `at`.
    ///
    /// # Errors
    ///
    /// Fails if `at` does not reference an instruction.
    pub fn is_reg_alive(&mut self, at: InstRef, reg: Reg) -> AnalysisResult<bool> {
        Ok(self.state_before(at)?.contains_reg(reg))
    }

    /// Returns `true` if the byte at `addr` is live right before the
    /// instruction at `at`.
    ///
    /// # Errors
    ///
    /// Fails if `at` does not reference an instruction.
    pub fn is_mem_alive(&mut self, at: InstRef, addr: Addr) -> AnalysisResult<bool> {
        Ok(self.state_before(at)?.contains_addr(addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::*;
    use cs_program::{Branch, ClpManager, CollectionBuilder};

    #[test]
    fn straight_line_trace() {
        // r1 = 1; r2 = 2; r3 = r1 + r2; r1 = r3 + r4; bx r1
        let p = platform();
        let mut b = CollectionBuilder::new(p.clone());
        let main = b.add_cfg("main");
        let bb = b
            .add_basic(
                main,
                vec![
                    mov(&p, 0x0, 1, 1),
                    mov(&p, 0x4, 2, 2),
                    add(&p, 0x8, 3, 1, 2),
                    add(&p, 0xc, 1, 3, 4),
                    use_reg(&p, 0x10, 1),
                ],
            )
            .unwrap();
        b.add_edge(b.entry(main), bb, Branch::Seq);
        b.add_edge(bb, b.exit(main), Branch::Seq);
        let cfgs = b.build().unwrap();
        let manager = ClpManager::new();
        let mut live = Liveness::compute(&cfgs, &manager, &AnalysisConfig::default()).unwrap();

        let regs = |s: &LiveState| s.live_regs().map(Reg::value).collect::<Vec<_>>();
        let trace: Vec<Vec<u16>> = live
            .instruction_states(bb)
            .unwrap()
            .iter()
            .map(|(_, s)| regs(s))
            .collect();
        assert_eq!(
            trace,
            vec![vec![4], vec![1, 4], vec![1, 2, 4], vec![3, 4], vec![1]]
        );
        assert_eq!(regs(live.entry(bb).unwrap()), vec![4]);
        assert!(live
            .is_reg_alive(InstRef { block: bb, index: 3 }, Reg::from(4))
            .unwrap());
        assert!(!live
            .is_reg_alive(InstRef { block: bb, index: 3 }, Reg::from(1))
            .unwrap());
        assert!(live
            .is_reg_alive(InstRef { block: bb, index: 9 }, Reg::from(1))
            .is_err());
    }

    #[test]
    fn liveness_crosses_calls_once() {
        let t = two_calls();
        let manager = ClpManager::new();
        let seed = InstRef {
            block: t.after1,
            index: 0,
        };
        let mut live =
            Liveness::compute_from(&t.cfgs, &manager, &AnalysisConfig::default(), &[seed])
                .unwrap();

        // r0 read after the first call is demanded at the end of f
        assert!(live.exit(t.body).unwrap().contains_reg(Reg::from(0)));
        // and killed by the write inside f
        assert!(!live.entry(t.body).unwrap().contains_reg(Reg::from(0)));
        let write = InstRef {
            block: t.body,
            index: 0,
        };
        assert!(!live.is_reg_alive(write, Reg::from(0)).unwrap());
        // the block before the second call never sees it
        assert!(live
            .exit(t.before2)
            .map_or(true, |s| !s.contains_reg(Reg::from(0))));
        assert!(live
            .exit(t.before1)
            .map_or(true, |s| !s.contains_reg(Reg::from(0))));
        // call and exit blocks merge what crosses them
        assert!(live.entry(t.call1).unwrap().contains_reg(Reg::from(0)));
        assert!(!live.entry(t.call2).unwrap().contains_reg(Reg::from(0)));
        let f = t.cfgs.cfg(t.f);
        assert_eq!(f.name(), "f");
        assert!(live.exit(f.exit()).unwrap().contains_reg(Reg::from(0)));
        assert!(live.entry(f.entry()).unwrap().is_empty());
        // main is never called, so its entry is reached but nothing above
        let main = t.cfgs.entry_cfg();
        assert!(live.entry(main.entry()).unwrap().is_empty());
        assert!(live.entry(main.exit()).is_none());
    }

    #[test]
    fn memory_liveness() {
        let d = diamond();
        let manager = ClpManager::new();
        let mut live = Liveness::compute(&d.cfgs, &manager, &AnalysisConfig::default()).unwrap();

        // the load in D demands 0x1000, killed by the exact store of C
        assert!(live.entry(d.d).unwrap().contains_addr(Addr(0x1003)));
        assert!(live.exit(d.c).unwrap().contains_addr(Addr(0x1000)));
        assert!(!live.entry(d.c).unwrap().contains_addr(Addr(0x1000)));
        assert!(live.entry(d.b).unwrap().contains_addr(Addr(0x1000)));
        assert!(live.exit(d.a).unwrap().contains_addr(Addr(0x1000)));
        // B's store is not killing anything demanded, but it reads r2
        assert!(live.exit(d.a).unwrap().contains_reg(Reg::from(2)));
        assert!(!live
            .is_mem_alive(InstRef { block: d.b, index: 0 }, Addr(0x2000))
            .unwrap());
        assert!(live
            .is_mem_alive(InstRef { block: d.d, index: 0 }, Addr(0x1000))
            .unwrap());
        assert_eq!(
            exit_points(&d.cfgs, &AnalysisConfig::default()).unwrap(),
            vec![InstRef { block: d.d, index: 0 }]
        );
    }
}
