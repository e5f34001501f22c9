//! Interprocedural control flow graphs.
//!
//! All the CFGs of a program live in a single graph arena: blocks are nodes,
//! edges are control flow links, and every cross reference (predecessor,
//! successor, callee) is a [`BlockId`] or [`CfgId`] handle. A call is
//! represented in the caller by a [`BlockKind::Synth`] block referencing the
//! callee CFG; callers of a CFG are obtained by scanning synthetic blocks.

use crate::errors::{ProgramError, ProgramResult};
use crate::instrs::Inst;
use crate::registers::Platform;
use crate::Addr;
use petgraph::dot::{Config, Dot};
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::{EdgeRef, NodeRef};
use petgraph::Direction;
use std::fmt;
use std::fmt::Write;

/// Handle of a block in a [`CfgCollection`].
pub type BlockId = NodeIndex;

/// Handle of an edge in a [`CfgCollection`].
pub type EdgeId = EdgeIndex;

/// Handle of a CFG in a [`CfgCollection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CfgId(pub usize);

impl fmt::Display for CfgId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "cfg{}", self.0)
    }
}

/// Position of an instruction: its block and its index inside the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstRef {
    pub block: BlockId,
    pub index: usize,
}

/// A straight-line, non-empty sequence of instructions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    insts: Vec<Inst>,
}

impl BasicBlock {
    fn new(insts: Vec<Inst>) -> Option<Self> {
        if insts.is_empty() {
            None
        } else {
            Some(Self { insts })
        }
    }

    #[inline]
    #[must_use]
    pub fn insts(&self) -> &[Inst] {
        &self.insts
    }

    #[inline]
    pub fn rev_insts(&self) -> impl Iterator<Item = (usize, &Inst)> {
        self.insts.iter().enumerate().rev()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.insts.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }

    #[must_use]
    pub fn first(&self) -> &Inst {
        &self.insts[0]
    }

    #[must_use]
    pub fn last(&self) -> &Inst {
        &self.insts[self.insts.len() - 1]
    }

    #[must_use]
    pub fn addr(&self) -> Addr {
        self.first().addr()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockKind {
    Entry,
    Exit,
    Basic(BasicBlock),
    /// A call to another CFG, `None` when the callee could not be resolved.
    Synth(Option<CfgId>),
    Phony,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    cfg: CfgId,
    index: usize,
    kind: BlockKind,
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.kind {
            BlockKind::Entry => write!(f, "ENTRY"),
            BlockKind::Exit => write!(f, "EXIT"),
            BlockKind::Basic(bb) => write!(f, "BB{} @ {}", self.index, bb.addr()),
            BlockKind::Synth(Some(callee)) => write!(f, "call {callee}"),
            BlockKind::Synth(None) => write!(f, "call ?"),
            BlockKind::Phony => write!(f, "phony{}", self.index),
        }
    }
}

impl Block {
    #[inline]
    #[must_use]
    pub fn cfg(&self) -> CfgId {
        self.cfg
    }

    /// Index of the block inside its CFG.
    #[inline]
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> &BlockKind {
        &self.kind
    }

    #[inline]
    #[must_use]
    pub fn as_basic(&self) -> Option<&BasicBlock> {
        match &self.kind {
            BlockKind::Basic(bb) => Some(bb),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_basic(&self) -> bool {
        matches!(self.kind, BlockKind::Basic(_))
    }
}

/// Control flow edge tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Branch {
    Seq,
    Taken,
    NotTaken,
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Seq => write!(f, "<seq>"),
            Self::Taken => write!(f, "<taken>"),
            Self::NotTaken => write!(f, "<not taken>"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cfg {
    name: String,
    entry: BlockId,
    exit: BlockId,
    blocks: Vec<BlockId>,
}

impl Cfg {
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn entry(&self) -> BlockId {
        self.entry
    }

    #[inline]
    #[must_use]
    pub fn exit(&self) -> BlockId {
        self.exit
    }

    /// Blocks of the CFG, in creation order (entry and exit first).
    #[inline]
    #[must_use]
    pub fn blocks(&self) -> &[BlockId] {
        &self.blocks
    }
}

/// The set of CFGs involved in an analysis. The first CFG is the program
/// entry point.
#[derive(Debug, Clone)]
pub struct CfgCollection {
    graph: DiGraph<Block, Branch>,
    cfgs: Vec<Cfg>,
    platform: Platform,
}

impl CfgCollection {
    #[inline]
    #[must_use]
    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    #[inline]
    pub fn cfgs(&self) -> impl Iterator<Item = (CfgId, &Cfg)> {
        self.cfgs.iter().enumerate().map(|(i, cfg)| (CfgId(i), cfg))
    }

    #[inline]
    #[must_use]
    pub fn cfg_count(&self) -> usize {
        self.cfgs.len()
    }

    #[inline]
    #[must_use]
    pub fn cfg(&self, id: CfgId) -> &Cfg {
        &self.cfgs[id.0]
    }

    #[must_use]
    pub fn find_cfg(&self, name: &str) -> Option<CfgId> {
        self.cfgs.iter().position(|c| c.name == name).map(CfgId)
    }

    /// The program entry CFG.
    #[inline]
    #[must_use]
    pub fn entry_cfg(&self) -> &Cfg {
        &self.cfgs[0]
    }

    #[inline]
    #[must_use]
    pub fn block(&self, id: BlockId) -> &Block {
        &self.graph[id]
    }

    #[inline]
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.graph.node_count()
    }

    #[inline]
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    #[inline]
    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.graph.node_indices()
    }

    #[inline]
    pub fn basic_blocks(&self) -> impl Iterator<Item = (BlockId, &BasicBlock)> {
        self.graph
            .node_indices()
            .filter_map(move |id| self.graph[id].as_basic().map(|bb| (id, bb)))
    }

    /// Incoming edges of `id`, as `(edge, source)` pairs.
    pub fn in_edges(&self, id: BlockId) -> impl Iterator<Item = (EdgeId, BlockId)> + '_ {
        self.graph
            .edges_directed(id, Direction::Incoming)
            .map(|e| (e.id(), e.source()))
    }

    /// Outgoing edges of `id`, as `(edge, sink)` pairs.
    pub fn out_edges(&self, id: BlockId) -> impl Iterator<Item = (EdgeId, BlockId)> + '_ {
        self.graph
            .edges_directed(id, Direction::Outgoing)
            .map(|e| (e.id(), e.target()))
    }

    /// Every edge of the collection, as `(source, sink, branch)` triples.
    pub fn edges(&self) -> impl Iterator<Item = (BlockId, BlockId, Branch)> + '_ {
        self.graph
            .edge_references()
            .map(|e| (e.source(), e.target(), *e.weight()))
    }

    #[inline]
    #[must_use]
    pub fn branch(&self, edge: EdgeId) -> Branch {
        self.graph[edge]
    }

    #[must_use]
    pub fn edge_endpoints(&self, edge: EdgeId) -> Option<(BlockId, BlockId)> {
        self.graph.edge_endpoints(edge)
    }

    #[inline]
    #[must_use]
    pub fn has_edge(&self, from: BlockId, to: BlockId) -> bool {
        self.graph.find_edge(from, to).is_some()
    }

    /// Callee of a synthetic block, `None` for other blocks and unresolved calls.
    #[must_use]
    pub fn callee(&self, id: BlockId) -> Option<CfgId> {
        match self.graph[id].kind {
            BlockKind::Synth(callee) => callee,
            _ => None,
        }
    }

    /// Synthetic blocks calling `cfg`.
    pub fn call_sites(&self, cfg: CfgId) -> impl Iterator<Item = BlockId> + '_ {
        self.graph
            .node_indices()
            .filter(move |id| self.callee(*id) == Some(cfg))
    }

    #[must_use]
    pub fn inst(&self, at: InstRef) -> Option<&Inst> {
        self.graph
            .node_weight(at.block)
            .and_then(Block::as_basic)
            .and_then(|bb| bb.insts().get(at.index))
    }

    /// Looks for the instruction at the given address.
    #[must_use]
    pub fn find_inst(&self, addr: Addr) -> Option<InstRef> {
        self.basic_blocks().find_map(|(block, bb)| {
            bb.insts()
                .iter()
                .position(|i| i.addr() == addr)
                .map(|index| InstRef { block, index })
        })
    }

    #[must_use]
    pub fn label(&self, id: BlockId) -> String {
        let block = &self.graph[id];
        format!("{}_{}", self.cfgs[block.cfg.0].name, block.index)
    }

    #[must_use]
    pub fn to_dot(&self) -> String {
        self.to_dot_styled(&PlainStyle)
    }

    /// Renders the collection in graphviz format, instructions and blocks
    /// colored by `style`.
    pub fn to_dot_styled<S: DotStyle>(&self, style: &S) -> String {
        let mut res = String::new();
        res.push_str("digraph {\n");
        res.push_str("  node [shape=box, fontname=monospace, fontsize=10];\n");
        let _ = write!(
            res,
            "{}",
            Dot::with_attr_getters(
                &self.graph,
                &[Config::GraphContentOnly, Config::EdgeNoLabel, Config::NodeNoLabel],
                &|_, edge| {
                    let attrs = match edge.weight() {
                        Branch::Seq => "color=black",
                        Branch::Taken => "color=green,xlabel=\"taken\"",
                        Branch::NotTaken => "color=red",
                    };
                    if style.dashed_edge(edge.source(), edge.target()) {
                        format!("{attrs},style=dashed")
                    } else {
                        attrs.to_string()
                    }
                },
                &|_, node| {
                    let label = self.dot_label(node.id(), style);
                    match style.block_color(node.id()) {
                        Some(color) => format!("label=<{label}>,color={color}"),
                        None => format!("label=<{label}>"),
                    }
                },
            )
        );
        res.push('}');
        res
    }

    fn dot_label<S: DotStyle>(&self, id: BlockId, style: &S) -> String {
        const BR: &str = "<br align=\"left\"/>";
        let block = &self.graph[id];
        let mut label = format!("{}{BR}", self.label(id));
        match &block.kind {
            BlockKind::Basic(bb) => {
                for (index, inst) in bb.insts().iter().enumerate() {
                    let line = format!(
                        "{}: {}",
                        inst.addr(),
                        html_escape::encode_text(inst.asm())
                    );
                    match style.inst_color(InstRef { block: id, index }) {
                        Some(color) => {
                            let _ = write!(label, "<font color=\"{color}\">{line}</font>{BR}");
                        }
                        None => {
                            let _ = write!(label, "{line}{BR}");
                        }
                    }
                }
            }
            BlockKind::Synth(Some(callee)) => {
                let _ = write!(label, "call {}{BR}", self.cfgs[callee.0].name);
            }
            BlockKind::Synth(None) => {
                let _ = write!(label, "call ?{BR}");
            }
            BlockKind::Entry => {
                let _ = write!(label, "ENTRY{BR}");
            }
            BlockKind::Exit => {
                let _ = write!(label, "EXIT{BR}");
            }
            BlockKind::Phony => {
                let _ = write!(label, "PHONY{BR}");
            }
        }
        label
    }
}

/// Styling of a graphviz rendering.
pub trait DotStyle {
    fn inst_color(&self, _at: InstRef) -> Option<&str> {
        None
    }

    fn block_color(&self, _id: BlockId) -> Option<&str> {
        None
    }

    /// Edges drawn dashed, such as the ones synthesized by a transformation.
    fn dashed_edge(&self, _src: BlockId, _dst: BlockId) -> bool {
        false
    }
}

struct PlainStyle;

impl DotStyle for PlainStyle {}

/// Incremental construction of a [`CfgCollection`].
///
/// CFGs are declared first ([`CollectionBuilder::add_cfg`] creates their
/// entry and exit blocks), so that synthetic blocks may reference any CFG
/// before it is filled.
#[derive(Debug)]
pub struct CollectionBuilder {
    graph: DiGraph<Block, Branch>,
    cfgs: Vec<Cfg>,
    platform: Platform,
}

impl CollectionBuilder {
    #[must_use]
    pub fn new(platform: Platform) -> Self {
        Self {
            graph: DiGraph::new(),
            cfgs: Vec::new(),
            platform,
        }
    }

    #[must_use]
    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn add_cfg(&mut self, name: impl Into<String>) -> CfgId {
        let id = CfgId(self.cfgs.len());
        let entry = self.graph.add_node(Block {
            cfg: id,
            index: 0,
            kind: BlockKind::Entry,
        });
        let exit = self.graph.add_node(Block {
            cfg: id,
            index: 1,
            kind: BlockKind::Exit,
        });
        self.cfgs.push(Cfg {
            name: name.into(),
            entry,
            exit,
            blocks: vec![entry, exit],
        });
        id
    }

    #[must_use]
    pub fn entry(&self, cfg: CfgId) -> BlockId {
        self.cfgs[cfg.0].entry
    }

    #[must_use]
    pub fn exit(&self, cfg: CfgId) -> BlockId {
        self.cfgs[cfg.0].exit
    }

    fn add_block(&mut self, cfg: CfgId, kind: BlockKind) -> BlockId {
        let c = &mut self.cfgs[cfg.0];
        let id = self.graph.add_node(Block {
            cfg,
            index: c.blocks.len(),
            kind,
        });
        c.blocks.push(id);
        id
    }

    /// Adds a basic block made of the given instructions.
    ///
    /// # Errors
    ///
    /// Basic blocks cannot be empty.
    pub fn add_basic(&mut self, cfg: CfgId, insts: Vec<Inst>) -> ProgramResult<BlockId> {
        let bb = BasicBlock::new(insts)
            .ok_or_else(|| ProgramError::EmptyBlock(self.cfgs[cfg.0].name.clone()))?;
        Ok(self.add_block(cfg, BlockKind::Basic(bb)))
    }

    pub fn add_synth(&mut self, cfg: CfgId, callee: Option<CfgId>) -> BlockId {
        self.add_block(cfg, BlockKind::Synth(callee))
    }

    pub fn add_phony(&mut self, cfg: CfgId) -> BlockId {
        self.add_block(cfg, BlockKind::Phony)
    }

    pub fn add_edge(&mut self, from: BlockId, to: BlockId, branch: Branch) -> EdgeId {
        self.graph.add_edge(from, to, branch)
    }

    /// Checks the structural invariants and freezes the collection.
    ///
    /// # Errors
    ///
    /// Fails when an edge crosses CFGs, enters an entry block, leaves an exit
    /// block, or when a call references an unknown CFG.
    pub fn build(self) -> ProgramResult<CfgCollection> {
        if self.cfgs.is_empty() {
            return Err(ProgramError::Malformed("no cfg".to_string()));
        }
        for edge in self.graph.edge_references() {
            let src = &self.graph[edge.source()];
            let dst = &self.graph[edge.target()];
            if src.cfg != dst.cfg {
                return Err(ProgramError::CrossCfgEdge(format!(
                    "{}_{} -> {}_{}",
                    self.cfgs[src.cfg.0].name,
                    src.index,
                    self.cfgs[dst.cfg.0].name,
                    dst.index
                )));
            }
            if matches!(dst.kind, BlockKind::Entry) {
                return Err(ProgramError::Malformed(format!(
                    "edge entering the entry of '{}'",
                    self.cfgs[dst.cfg.0].name
                )));
            }
            if matches!(src.kind, BlockKind::Exit) {
                return Err(ProgramError::Malformed(format!(
                    "edge leaving the exit of '{}'",
                    self.cfgs[src.cfg.0].name
                )));
            }
        }
        for block in self.graph.node_weights() {
            if let BlockKind::Synth(Some(callee)) = block.kind {
                if callee.0 >= self.cfgs.len() {
                    return Err(ProgramError::UnknownCfg(callee.to_string()));
                }
            }
        }
        Ok(CfgCollection {
            graph: self.graph,
            cfgs: self.cfgs,
            platform: self.platform,
        })
    }
}
