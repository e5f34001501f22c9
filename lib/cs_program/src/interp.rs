//! Abstract interpretation replay of basic blocks.
//!
//! Analyses that need the addresses of memory accesses do not interpret
//! instructions themselves: they start a [`Cursor`] at the head of a block and
//! step through its semantic operations, asking the cursor to resolve the
//! address operand of each load and store.

use crate::cfg::{BlockId, BlockKind, CfgCollection};
use crate::clp::Clp;
use crate::instrs::{Inst, SemOp, SemReg};
use crate::registers::Reg;
use std::collections::{BTreeMap, HashMap};

/// Replay interface of an abstract address interpreter.
pub trait Interpreter {
    type Cursor<'a>: Cursor<'a>
    where
        Self: 'a;

    /// Starts the replay at the head of `block`. Returns `None` when the block
    /// has no semantic operation to replay (non-basic blocks included).
    fn start<'a>(&'a self, cfgs: &'a CfgCollection, block: BlockId) -> Option<Self::Cursor<'a>>;
}

/// Position of a replay inside a block.
pub trait Cursor<'a> {
    /// Instruction owning the current semantic operation.
    fn inst(&self) -> &'a Inst;

    /// Index of the current instruction in its block.
    fn index(&self) -> usize;

    /// Current semantic operation.
    fn sem(&self) -> &'a SemOp;

    /// Executes the current operation and moves to the next one. Returns
    /// `false` once the end of the block is reached.
    fn next(&mut self) -> bool;

    /// Value of `reg` in the state preceding the current operation.
    fn address(&self, reg: SemReg) -> Clp;
}

/// CLP replay interpreter.
///
/// Every block replay starts from the same initial state: the registers given
/// to [`ClpManager::with_init`] hold their configured value, every other
/// register and temporary is unknown.
#[derive(Debug, Clone, Default)]
pub struct ClpManager {
    init: BTreeMap<Reg, Clp>,
}

impl ClpManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_init(init: BTreeMap<Reg, Clp>) -> Self {
        Self { init }
    }

    pub fn set_init(&mut self, reg: Reg, value: Clp) {
        self.init.insert(reg, value);
    }

    #[must_use]
    pub fn init(&self) -> &BTreeMap<Reg, Clp> {
        &self.init
    }
}

impl Interpreter for ClpManager {
    type Cursor<'a> = ClpCursor<'a>;

    fn start<'a>(&'a self, cfgs: &'a CfgCollection, block: BlockId) -> Option<ClpCursor<'a>> {
        let insts = match cfgs.block(block).kind() {
            BlockKind::Basic(bb) => bb.insts(),
            BlockKind::Entry
            | BlockKind::Exit
            | BlockKind::Synth(_)
            | BlockKind::Phony => return None,
        };
        let mut cursor = ClpCursor {
            manager: self,
            insts,
            inst: 0,
            op: 0,
            state: HashMap::new(),
        };
        if cursor.skip_empty() {
            Some(cursor)
        } else {
            None
        }
    }
}

#[derive(Debug)]
pub struct ClpCursor<'a> {
    manager: &'a ClpManager,
    insts: &'a [Inst],
    inst: usize,
    op: usize,
    state: HashMap<SemReg, Clp>,
}

impl<'a> ClpCursor<'a> {
    // moves forward until a semantic operation is available
    fn skip_empty(&mut self) -> bool {
        while self.inst < self.insts.len() {
            if self.op < self.insts[self.inst].sem().len() {
                return true;
            }
            self.inst += 1;
            self.op = 0;
            // temporaries do not survive their instruction
            self.state.retain(|r, _| matches!(r, SemReg::Reg(_)));
        }
        false
    }

    fn get(&self, reg: SemReg) -> Clp {
        if let Some(v) = self.state.get(&reg) {
            return *v;
        }
        match reg {
            SemReg::Reg(r) => self.manager.init.get(&r).copied().unwrap_or(Clp::All),
            SemReg::Tmp(_) => Clp::All,
        }
    }

    fn execute(&mut self, op: &SemOp) {
        match op {
            SemOp::Nop | SemOp::Store { .. } | SemOp::Branch { .. } => (),
            SemOp::Seti { dst, imm } => {
                self.state.insert(*dst, Clp::constant(*imm));
            }
            SemOp::Set { dst, src } => {
                let v = self.get(*src);
                self.state.insert(*dst, v);
            }
            SemOp::Add { dst, a, b } => {
                let v = self.get(*a).add(&self.get(*b));
                self.state.insert(*dst, v);
            }
            SemOp::Sub { dst, a, b } => {
                let v = self.get(*a).sub(&self.get(*b));
                self.state.insert(*dst, v);
            }
            SemOp::Scratch { dst } | SemOp::Load { dst, .. } => {
                self.state.insert(*dst, Clp::All);
            }
        }
    }
}

impl<'a> Cursor<'a> for ClpCursor<'a> {
    fn inst(&self) -> &'a Inst {
        let insts = self.insts;
        &insts[self.inst]
    }

    fn index(&self) -> usize {
        self.inst
    }

    fn sem(&self) -> &'a SemOp {
        &self.inst().sem()[self.op]
    }

    fn next(&mut self) -> bool {
        let op = self.sem();
        self.execute(op);
        self.op += 1;
        self.skip_empty()
    }

    fn address(&self, reg: SemReg) -> Clp {
        self.get(reg)
    }
}
