//! Program model shared by the cfgslice analyses.
//!
//! A program is a [`CfgCollection`]: the CFGs of all its functions stored in
//! one graph arena, whose basic blocks hold decoded instructions ([`Inst`])
//! with their declared register uses and the semantic operations replayed by
//! the [`ClpManager`] interpreter to resolve memory addresses.

mod addr;
pub mod cfg;
pub mod clp;
pub mod errors;
pub mod instrs;
pub mod interp;
pub mod loader;
pub mod registers;

pub use crate::addr::Addr;
pub use crate::cfg::{
    BasicBlock, Block, BlockId, BlockKind, Branch, Cfg, CfgCollection, CfgId, CollectionBuilder,
    DotStyle, EdgeId, InstRef,
};
pub use crate::clp::Clp;
pub use crate::errors::{ProgramError, ProgramResult};
pub use crate::instrs::{Inst, InstKind, MemType, SemOp, SemReg};
pub use crate::interp::{ClpCursor, ClpManager, Cursor, Interpreter};
pub use crate::loader::Program;
pub use crate::registers::{Platform, Reg};
