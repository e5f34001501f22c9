use crate::errors::AnalysisResult;
use crate::slicing::Slice;
use cs_program::{BlockId, BlockKind, Branch, CfgCollection, CfgId, CollectionBuilder};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// A sliced program.
#[derive(Debug, Clone)]
pub struct Rebuilt {
    pub cfgs: CfgCollection,
    /// Surviving blocks of the original collection and their counterpart.
    pub block_map: BTreeMap<BlockId, BlockId>,
    /// Basic blocks left without instruction.
    pub removed: BTreeSet<BlockId>,
    /// Edges synthesized around removed blocks, between original blocks.
    pub bypasses: BTreeSet<(BlockId, BlockId)>,
}

// Bypass edges around the removed blocks, with their tag.
#[derive(Debug, Default)]
struct Adjacency {
    preds: BTreeMap<BlockId, Branch>,
    succs: BTreeMap<BlockId, Branch>,
}

// Tag of a single edge standing for two links between the same blocks.
fn merge(a: Branch, b: Branch) -> Branch {
    if a == b {
        a
    } else {
        Branch::Seq
    }
}

/// Builds the collection made of the retained instructions of `slice`.
///
/// Basic blocks without retained instruction are removed; every path going
/// through removed blocks only is replaced by a bypass edge tagged like the
/// edge it leaves its source block by. When that source already has an
/// edge to the same target, the two tags are merged instead. A removed
/// block spinning on itself is bypassed to the exit of its CFG.
/// Other blocks are kept with their edges.
///
/// # Errors
///
/// Fails if the new collection is inconsistent.
pub fn rebuild(cfgs: &CfgCollection, slice: &Slice) -> AnalysisResult<Rebuilt> {
    let removed: BTreeSet<BlockId> = cfgs
        .basic_blocks()
        .filter(|(id, _)| slice.retained(*id).is_none())
        .map(|(id, _)| id)
        .collect();

    let mut adjacency: BTreeMap<BlockId, Adjacency> = BTreeMap::new();
    // original edges whose tag absorbed a bypass
    let mut merged: BTreeMap<(BlockId, BlockId), Branch> = BTreeMap::new();
    let mut done: HashSet<BlockId> = HashSet::new();
    let mut worklist: Vec<BlockId> = removed.iter().rev().copied().collect();

    while let Some(r) = worklist.pop() {
        log::debug!("removing {}", cfgs.label(r));
        let own = adjacency.remove(&r).unwrap_or_default();

        let entering: Vec<(BlockId, Branch)> = cfgs
            .in_edges(r)
            .map(|(e, src)| (src, merged.get(&(src, r)).copied().unwrap_or(cfgs.branch(e))))
            .chain(own.preds)
            .collect();
        let mut preds: BTreeMap<BlockId, Branch> = BTreeMap::new();
        for (p, branch) in entering {
            if p != r && !done.contains(&p) {
                preds
                    .entry(p)
                    .and_modify(|b| *b = merge(*b, branch))
                    .or_insert(branch);
            }
        }

        let mut succs: BTreeSet<BlockId> = cfgs
            .out_edges(r)
            .map(|(_, dst)| dst)
            .chain(own.succs.into_keys())
            .filter(|s| *s != r && !done.contains(s))
            .collect();
        let mut real = cfgs.out_edges(r).peekable();
        if real.peek().is_some() && real.all(|(_, dst)| dst == r) {
            let exit = cfgs.cfg(cfgs.block(r).cfg()).exit();
            log::debug!("  {} only loops on itself", cfgs.label(r));
            succs.insert(exit);
        }

        for (p, branch) in &preds {
            for s in &succs {
                let existing = cfgs
                    .out_edges(*p)
                    .find_map(|(e, dst)| (dst == *s).then_some(cfgs.branch(e)));
                if let Some(existing) = existing {
                    let tag = merged.entry((*p, *s)).or_insert(existing);
                    *tag = merge(*tag, *branch);
                } else if let Some(tag) = adjacency.get_mut(p).and_then(|a| a.succs.get_mut(s)) {
                    *tag = merge(*tag, *branch);
                    let tag = *tag;
                    adjacency.entry(*s).or_default().preds.insert(*p, tag);
                } else {
                    log::debug!(
                        "  bypass {} -> {} {branch}",
                        cfgs.label(*p),
                        cfgs.label(*s)
                    );
                    adjacency.entry(*p).or_default().succs.insert(*s, *branch);
                    adjacency.entry(*s).or_default().preds.insert(*p, *branch);
                }
            }
        }
        for p in preds.keys() {
            if let Some(a) = adjacency.get_mut(p) {
                a.succs.remove(&r);
            }
        }
        for s in &succs {
            if let Some(a) = adjacency.get_mut(s) {
                a.preds.remove(&r);
            }
        }
        done.insert(r);
    }

    let mut builder = CollectionBuilder::new(cfgs.platform().clone());
    let mut block_map = BTreeMap::new();
    let mut cfg_map: BTreeMap<CfgId, CfgId> = BTreeMap::new();
    for (id, cfg) in cfgs.cfgs() {
        let new = builder.add_cfg(cfg.name());
        block_map.insert(cfg.entry(), builder.entry(new));
        block_map.insert(cfg.exit(), builder.exit(new));
        cfg_map.insert(id, new);
    }
    for (id, cfg) in cfgs.cfgs() {
        let new_cfg = cfg_map[&id];
        for &old in cfg.blocks() {
            if removed.contains(&old) {
                continue;
            }
            let new = match cfgs.block(old).kind() {
                BlockKind::Entry | BlockKind::Exit => continue,
                BlockKind::Basic(bb) => {
                    let insts = slice
                        .retained(old)
                        .into_iter()
                        .flatten()
                        .filter_map(|i| bb.insts().get(*i).cloned())
                        .collect();
                    builder.add_basic(new_cfg, insts)?
                }
                BlockKind::Synth(callee) => {
                    builder.add_synth(new_cfg, callee.and_then(|c| cfg_map.get(&c).copied()))
                }
                BlockKind::Phony => builder.add_phony(new_cfg),
            };
            block_map.insert(old, new);
        }
    }

    let mut edges: Vec<(BlockId, BlockId, Branch)> = cfgs
        .edges()
        .filter_map(|(src, dst, branch)| {
            let branch = merged.get(&(src, dst)).copied().unwrap_or(branch);
            Some((*block_map.get(&src)?, *block_map.get(&dst)?, branch))
        })
        .collect();
    let mut bypasses = BTreeSet::new();
    for (p, a) in &adjacency {
        for (s, branch) in &a.succs {
            if let (Some(np), Some(ns)) = (block_map.get(p), block_map.get(s)) {
                edges.push((*np, *ns, *branch));
                bypasses.insert((*p, *s));
            }
        }
    }
    edges.sort();
    for (src, dst, branch) in edges {
        builder.add_edge(src, dst, branch);
    }

    log::info!(
        "rebuild: {} blocks removed, {} bypass edges",
        removed.len(),
        bypasses.len()
    );
    Ok(Rebuilt {
        cfgs: builder.build()?,
        block_map,
        removed,
        bypasses,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::fixtures::*;
    use crate::slicing::compute_slice;
    use cs_program::{ClpManager, InstRef};

    fn reslice(cfgs: &CfgCollection, seeds: &[InstRef]) -> Rebuilt {
        let manager = ClpManager::new();
        let slice = compute_slice(cfgs, &manager, &AnalysisConfig::default(), seeds).unwrap();
        rebuild(cfgs, &slice).unwrap()
    }

    fn remap(from: &CfgCollection, to: &CfgCollection, seeds: &[InstRef]) -> Vec<InstRef> {
        seeds
            .iter()
            .map(|at| to.find_inst(from.inst(*at).unwrap().addr()).unwrap())
            .collect()
    }

    #[test]
    fn diamond_bypass() {
        let d = diamond();
        let seed = InstRef {
            block: d.d,
            index: 0,
        };
        let out = reslice(&d.cfgs, &[seed]);
        assert_eq!(out.removed, BTreeSet::from([d.b]));
        assert_eq!(out.bypasses, BTreeSet::from([(d.a, d.d)]));
        assert!(!out.block_map.contains_key(&d.b));

        let (a, c, dd) = (out.block_map[&d.a], out.block_map[&d.c], out.block_map[&d.d]);
        let main = out.cfgs.entry_cfg();
        let inner: BTreeSet<(BlockId, BlockId)> = out
            .cfgs
            .edges()
            .map(|(s, t, _)| (s, t))
            .filter(|(s, t)| *s != main.entry() && *t != main.exit())
            .collect();
        assert_eq!(inner, BTreeSet::from([(a, c), (c, dd), (a, dd)]));
        assert_eq!(out.cfgs.block_count(), 5);
        // the bypass stands for the taken side of A's branch
        let tags: Vec<(BlockId, Branch)> = out
            .cfgs
            .out_edges(a)
            .map(|(e, t)| (t, out.cfgs.branch(e)))
            .collect();
        assert_eq!(tags.len(), 2);
        assert!(tags.contains(&(dd, Branch::Taken)));
        assert!(tags.contains(&(c, Branch::NotTaken)));
    }

    #[test]
    fn idempotent_slicing() {
        let d = diamond();
        let seeds = [InstRef {
            block: d.d,
            index: 0,
        }];
        let once = reslice(&d.cfgs, &seeds);
        let twice = reslice(&once.cfgs, &remap(&d.cfgs, &once.cfgs, &seeds));
        assert!(twice.removed.is_empty());
        assert!(twice.bypasses.is_empty());
        assert_eq!(once.cfgs.to_dot(), twice.cfgs.to_dot());

        let t = two_calls();
        let seeds = [InstRef {
            block: t.after2,
            index: 0,
        }];
        let once = reslice(&t.cfgs, &seeds);
        let twice = reslice(&once.cfgs, &remap(&t.cfgs, &once.cfgs, &seeds));
        assert_eq!(once.cfgs.to_dot(), twice.cfgs.to_dot());
    }

    #[test]
    fn chains_of_removed_blocks() {
        // entry -> a -> r1 -> r2 -> d -> exit, a -> r2
        let p = platform();
        let mut b = CollectionBuilder::new(p.clone());
        let main = b.add_cfg("main");
        let a = b.add_basic(main, vec![mov(&p, 0x0, 1, 1)]).unwrap();
        let r1 = b.add_basic(main, vec![mov(&p, 0x4, 5, 5)]).unwrap();
        let r2 = b.add_basic(main, vec![mov(&p, 0x8, 6, 6)]).unwrap();
        let d = b.add_basic(main, vec![use_reg(&p, 0xc, 1)]).unwrap();
        b.add_edge(b.entry(main), a, Branch::Seq);
        b.add_edge(a, r1, Branch::Taken);
        b.add_edge(a, r2, Branch::NotTaken);
        b.add_edge(r1, r2, Branch::Seq);
        b.add_edge(r2, d, Branch::Seq);
        b.add_edge(d, b.exit(main), Branch::Seq);
        let cfgs = b.build().unwrap();

        let out = reslice(&cfgs, &[InstRef { block: d, index: 0 }]);
        assert_eq!(out.removed, BTreeSet::from([r1, r2]));
        assert_eq!(out.bypasses, BTreeSet::from([(a, d)]));
        assert!(out.cfgs.has_edge(out.block_map[&a], out.block_map[&d]));
        // one bypass only, even with two removed paths, and both sides of
        // the branch of a lead to d
        assert_eq!(out.cfgs.edge_count(), 3);
        let tags: Vec<Branch> = out
            .cfgs
            .out_edges(out.block_map[&a])
            .map(|(e, _)| out.cfgs.branch(e))
            .collect();
        assert_eq!(tags, vec![Branch::Seq]);
    }

    #[test]
    fn bypass_merged_into_existing_edge() {
        // entry -> a -> r -> d -> exit, a -> d
        let p = platform();
        let mut b = CollectionBuilder::new(p.clone());
        let main = b.add_cfg("main");
        let a = b.add_basic(main, vec![mov(&p, 0x0, 1, 1)]).unwrap();
        let r = b.add_basic(main, vec![mov(&p, 0x4, 5, 5)]).unwrap();
        let d = b.add_basic(main, vec![use_reg(&p, 0x8, 1)]).unwrap();
        b.add_edge(b.entry(main), a, Branch::Seq);
        b.add_edge(a, r, Branch::Taken);
        b.add_edge(a, d, Branch::NotTaken);
        b.add_edge(r, d, Branch::Seq);
        b.add_edge(d, b.exit(main), Branch::Seq);
        let cfgs = b.build().unwrap();

        let out = reslice(&cfgs, &[InstRef { block: d, index: 0 }]);
        assert_eq!(out.removed, BTreeSet::from([r]));
        assert!(out.bypasses.is_empty());
        let (na, nd) = (out.block_map[&a], out.block_map[&d]);
        let tags: Vec<(BlockId, Branch)> = out
            .cfgs
            .out_edges(na)
            .map(|(e, t)| (t, out.cfgs.branch(e)))
            .collect();
        assert_eq!(tags, vec![(nd, Branch::Seq)]);
    }

    #[test]
    fn removed_spin_block_leads_to_exit() {
        // entry -> a -> spin, spin -> spin
        let p = platform();
        let mut b = CollectionBuilder::new(p.clone());
        let main = b.add_cfg("main");
        let a = b.add_basic(main, vec![mov(&p, 0x0, 1, 1)]).unwrap();
        let spin = b.add_basic(main, vec![mov(&p, 0x4, 5, 5)]).unwrap();
        b.add_edge(b.entry(main), a, Branch::Seq);
        b.add_edge(a, spin, Branch::Seq);
        b.add_edge(spin, spin, Branch::Seq);
        let exit = b.exit(main);
        let cfgs = b.build().unwrap();

        let out = reslice(&cfgs, &[InstRef { block: a, index: 0 }]);
        assert_eq!(out.removed, BTreeSet::from([spin]));
        assert_eq!(out.bypasses, BTreeSet::from([(a, exit)]));
        assert!(out
            .cfgs
            .has_edge(out.block_map[&a], out.cfgs.entry_cfg().exit()));
        assert_eq!(out.cfgs.edge_count(), 2);
    }

    #[test]
    fn phony_blocks_survive() {
        // entry -> x -> phony -> y -> exit
        let p = platform();
        let mut b = CollectionBuilder::new(p.clone());
        let main = b.add_cfg("main");
        let x = b.add_basic(main, vec![mov(&p, 0x0, 5, 5)]).unwrap();
        let phony = b.add_phony(main);
        let y = b.add_basic(main, vec![use_reg(&p, 0x4, 1)]).unwrap();
        let entry = b.entry(main);
        b.add_edge(entry, x, Branch::Seq);
        b.add_edge(x, phony, Branch::Seq);
        b.add_edge(phony, y, Branch::Seq);
        b.add_edge(y, b.exit(main), Branch::Seq);
        let cfgs = b.build().unwrap();

        let out = reslice(&cfgs, &[InstRef { block: y, index: 0 }]);
        assert_eq!(out.removed, BTreeSet::from([x]));
        assert_eq!(out.bypasses, BTreeSet::from([(entry, phony)]));
        let np = out.block_map[&phony];
        assert_eq!(out.cfgs.block(np).kind(), &BlockKind::Phony);
        assert!(out.cfgs.has_edge(out.cfgs.entry_cfg().entry(), np));
        assert!(out.cfgs.has_edge(np, out.block_map[&y]));
    }

    #[test]
    fn removed_loop_body_becomes_self_loop() {
        let p = platform();
        let mut b = CollectionBuilder::new(p.clone());
        let main = b.add_cfg("main");
        let head = b.add_basic(main, vec![use_reg(&p, 0x0, 1)]).unwrap();
        let body = b.add_basic(main, vec![mov(&p, 0x4, 5, 5)]).unwrap();
        let call = b.add_synth(main, None);
        b.add_edge(b.entry(main), head, Branch::Seq);
        b.add_edge(head, body, Branch::Taken);
        b.add_edge(body, head, Branch::Seq);
        b.add_edge(head, call, Branch::NotTaken);
        b.add_edge(call, b.exit(main), Branch::Seq);
        let cfgs = b.build().unwrap();

        let out = reslice(&cfgs, &[InstRef { block: head, index: 0 }]);
        assert_eq!(out.removed, BTreeSet::from([body]));
        let h = out.block_map[&head];
        assert!(out.cfgs.has_edge(h, h));
        // call blocks are kept even when nothing flows through them
        assert!(out.block_map.contains_key(&call));
        assert_eq!(out.cfgs.callee(out.block_map[&call]), None);
    }
}
