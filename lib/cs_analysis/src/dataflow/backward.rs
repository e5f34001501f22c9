use crate::config::UnresolvedCalls;
use crate::dataflow::Dataflow;
use crate::errors::{AnalysisError, AnalysisResult};
use crate::memaccess::MemAccessCache;
use crate::predecessors::resolve;
use crate::state::{Footprint, LiveState};
use cs_program::{BlockId, BlockKind, InstRef, Interpreter};

/// The instruction transfer function of a backward propagation.
pub trait BackwardTransfer {
    /// Moves `state` from after the instruction at `at` to before it.
    fn transfer(&mut self, at: InstRef, footprint: &Footprint, state: &mut LiveState);
}

/// Plain liveness transfer: every instruction kills what it writes and
/// generates what it reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct KillGen;

impl BackwardTransfer for KillGen {
    fn transfer(&mut self, _at: InstRef, footprint: &Footprint, state: &mut LiveState) {
        state.update(footprint);
    }
}

/// A pending backward walk: `state` is demanded at the end of `block`, or
/// right after the instruction `resume` when given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub block: BlockId,
    pub resume: Option<usize>,
    pub state: LiveState,
}

impl WorkItem {
    #[must_use]
    pub fn new(block: BlockId, resume: Option<usize>, state: LiveState) -> Self {
        Self {
            block,
            resume,
            state,
        }
    }
}

/// Performs a backward interprocedural propagation from `seeds`, accumulating
/// block states into `flow`.
///
/// Work items are processed last in, first out. A block is (re)walked each
/// time the state flowing out of it grows, or the first time a propagation
/// reaches it. Entry, exit and call blocks are never walked: the state
/// crossing them is merged into both their entry and exit states.
///
/// # Errors
///
/// Fails on malformed CFGs: a resume index out of its block, or an exit block
/// used as a predecessor.
pub fn backward<I, T>(
    cache: &mut MemAccessCache<'_, I>,
    policy: UnresolvedCalls,
    transfer: &mut T,
    seeds: Vec<WorkItem>,
    flow: &mut Dataflow,
) -> AnalysisResult<()>
where
    I: Interpreter,
    T: BackwardTransfer,
{
    let cfgs = cache.cfgs();
    let reg_count = cfgs.platform().reg_count();
    let mut worklist = seeds;
    let mut steps = 0usize;

    while let Some(WorkItem {
        block,
        resume,
        mut state,
    }) = worklist.pop()
    {
        steps += 1;
        log::debug!("    ---- {} (resume: {resume:?})", cfgs.label(block));
        log::debug!("      exit:  {state}");

        match cfgs.block(block).kind() {
            BlockKind::Basic(bb) => {
                let last = bb.len() - 1;
                let start = match resume {
                    Some(i) if i > last => {
                        return Err(AnalysisError::MalformedCfg(format!(
                            "no instruction {i} in block {}",
                            cfgs.label(block)
                        )))
                    }
                    Some(i) => i,
                    None => last,
                };
                for (index, inst) in bb.rev_insts().skip(last - start) {
                    let at = InstRef { block, index };
                    let footprint = cache.footprint(at)?;
                    transfer.transfer(at, &footprint, &mut state);
                    log::trace!("      {inst}");
                    log::trace!("        before: {state}");
                }
            }
            BlockKind::Entry | BlockKind::Exit | BlockKind::Synth(_) | BlockKind::Phony => (),
        }

        log::debug!("      entry: {state}");
        flow.entries
            .entry(block)
            .or_insert_with(|| LiveState::new(reg_count))
            .join(&state);

        let resolution = resolve(cfgs, block, policy)?;
        for id in resolution.crossed {
            for states in [&mut flow.entries, &mut flow.exits] {
                states
                    .entry(id)
                    .or_insert_with(|| LiveState::new(reg_count))
                    .join(&state);
            }
        }
        for pred in resolution.stops {
            match flow.exits.get_mut(&pred) {
                Some(exit) if exit.includes(&state) => {
                    log::trace!("      {} already includes it", cfgs.label(pred));
                }
                Some(exit) => {
                    exit.join(&state);
                    log::debug!("      -> {}", cfgs.label(pred));
                    worklist.push(WorkItem::new(pred, None, state.clone()));
                }
                None => {
                    flow.exits.insert(pred, state.clone());
                    log::debug!("      -> {} (first visit)", cfgs.label(pred));
                    worklist.push(WorkItem::new(pred, None, state.clone()));
                }
            }
        }
    }

    log::debug!("fixpoint reached after {steps} steps");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::*;
    use cs_program::{Branch, CfgCollection, ClpManager, CollectionBuilder, Reg};

    fn seed(cfgs: &CfgCollection, block: BlockId) -> WorkItem {
        WorkItem::new(block, None, LiveState::new(cfgs.platform().reg_count()))
    }

    #[test]
    fn monotone_accumulation() {
        let t = two_calls();
        let manager = ClpManager::new();
        let mut cache = MemAccessCache::new(&t.cfgs, &manager, 0xCAFE);
        let mut flow = Dataflow::new();

        backward(
            &mut cache,
            UnresolvedCalls::Skip,
            &mut KillGen,
            vec![seed(&t.cfgs, t.after1)],
            &mut flow,
        )
        .unwrap();
        let first = flow.clone();

        backward(
            &mut cache,
            UnresolvedCalls::Skip,
            &mut KillGen,
            vec![seed(&t.cfgs, t.after2)],
            &mut flow,
        )
        .unwrap();
        assert!(flow.includes(&first));
        assert!(flow.entries.len() >= first.entries.len());

        // nothing grows when propagating the same demand again
        let second = flow.clone();
        backward(
            &mut cache,
            UnresolvedCalls::Skip,
            &mut KillGen,
            vec![seed(&t.cfgs, t.after2)],
            &mut flow,
        )
        .unwrap();
        assert_eq!(flow, second);
    }

    #[test]
    fn terminates_on_loops_and_recursion() {
        let p = platform();
        let mut b = CollectionBuilder::new(p.clone());
        let main = b.add_cfg("main");
        let f = b.add_cfg("f");
        // main: head -> body -> head (loop), head -> call f -> tail
        let head = b.add_basic(main, vec![use_reg(&p, 0x0, 1)]).unwrap();
        let body = b.add_basic(main, vec![add(&p, 0x4, 1, 1, 2)]).unwrap();
        let call = b.add_synth(main, Some(f));
        let tail = b.add_basic(main, vec![use_reg(&p, 0x8, 3)]).unwrap();
        // f: recursive on itself
        let fb = b.add_basic(f, vec![add(&p, 0x100, 3, 3, 4)]).unwrap();
        let rec = b.add_synth(f, Some(f));
        b.add_edge(b.entry(main), head, Branch::Seq);
        b.add_edge(head, body, Branch::Taken);
        b.add_edge(body, head, Branch::Seq);
        b.add_edge(head, call, Branch::NotTaken);
        b.add_edge(call, tail, Branch::Seq);
        b.add_edge(tail, b.exit(main), Branch::Seq);
        b.add_edge(b.entry(f), fb, Branch::Seq);
        b.add_edge(fb, rec, Branch::Taken);
        b.add_edge(rec, b.exit(f), Branch::Seq);
        b.add_edge(fb, b.exit(f), Branch::NotTaken);
        let cfgs = b.build().unwrap();

        let manager = ClpManager::new();
        let mut cache = MemAccessCache::new(&cfgs, &manager, 0xCAFE);
        let mut flow = Dataflow::new();
        backward(
            &mut cache,
            UnresolvedCalls::Skip,
            &mut KillGen,
            vec![seed(&cfgs, tail)],
            &mut flow,
        )
        .unwrap();

        // r3 flows through the recursion, r4 is generated by f, r2 by the loop
        assert!(flow.entries[&fb].contains_reg(Reg::from(3)));
        assert!(flow.entries[&fb].contains_reg(Reg::from(4)));
        assert!(flow.exits[&head].contains_reg(Reg::from(4)));
        assert!(flow.entries[&head].contains_reg(Reg::from(1)));
        assert!(flow.exits[&body].contains_reg(Reg::from(1)));
        assert!(flow.entries[&body].contains_reg(Reg::from(2)));
    }

    #[test]
    fn resume_out_of_block() {
        let d = diamond();
        let manager = ClpManager::new();
        let mut cache = MemAccessCache::new(&d.cfgs, &manager, 0xCAFE);
        let item = WorkItem::new(d.a, Some(3), LiveState::new(8));
        assert!(matches!(
            backward(
                &mut cache,
                UnresolvedCalls::Skip,
                &mut KillGen,
                vec![item],
                &mut Dataflow::new()
            ),
            Err(AnalysisError::MalformedCfg(_))
        ));
    }

    #[test]
    fn phony_blocks_pass_states_through() {
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

        let manager = ClpManager::new();
        let mut cache = MemAccessCache::new(&cfgs, &manager, 0xCAFE);
        let mut flow = Dataflow::new();
        backward(
            &mut cache,
            UnresolvedCalls::Skip,
            &mut KillGen,
            vec![seed(&cfgs, y)],
            &mut flow,
        )
        .unwrap();

        assert!(flow.exits[&phony].contains_reg(Reg::from(1)));
        assert_eq!(flow.entries[&phony], flow.exits[&phony]);
        assert!(flow.exits[&x].contains_reg(Reg::from(1)));
        assert!(!flow.entries[&x].contains_reg(Reg::from(1)));
        // the entry of main gets what is live-in to the program
        let entry = cfgs.entry_cfg().entry();
        assert!(flow.entries[&entry].is_empty());
        assert_eq!(flow.entries[&entry], flow.exits[&entry]);
    }
}
