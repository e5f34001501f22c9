//! Interprocedural liveness and program slicing over the binary CFGs of the
//! `cfgslice` project.
//!
//! Both analyses share one backward propagation engine
//! ([`dataflow::backward`]) over register and memory demand states
//! ([`state::LiveState`]). Going up a CFG edge is resolved by
//! [`predecessors::resolve`]: entering a function leads to its call sites,
//! and a call block leads to the blocks returning from the callee.
//!
//! ## Liveness
//!
//! [`Liveness::compute`] starts from the exit points of the entry CFG,
//! [`Liveness::compute_from`] from chosen instructions. The result gives
//! the state at the boundaries of every reached block
//! ([`Liveness::entry`], [`Liveness::exit`]), and before any of their
//! instructions ([`Liveness::is_reg_alive`], [`Liveness::is_mem_alive`]).
//! The entry state of the entry CFG is what the program needs live-in.
//!
//! ## Slicing
//!
//! [`slicing::compute_slice`] keeps the interesting instructions and every
//! instruction that may write what they transitively read. The decision is
//! rendered by [`dot::slicing_to_dot`]. [`slicing::rebuild`] then builds
//! the sliced program: emptied basic blocks are removed, and bypass edges
//! keep whatever the removed blocks connected.
//!
//! ```rust
//! use cs_analysis::config::AnalysisConfig;
//! use cs_analysis::collector::{collect_interesting, Interest};
//! use cs_program::{loader, Addr, Reg};
//!
//! let program = loader::from_str(r#"{
//!     "registers": ["r0", "r1"],
//!     "cfgs": [{
//!         "name": "main",
//!         "blocks": [{"id": "a", "insts": [
//!             {"addr": "0x10", "asm": "mov r0, #1", "writes": ["r0"], "sem": ["seti r0 1"]},
//!             {"addr": "0x14", "asm": "mov r1, #2", "writes": ["r1"], "sem": ["seti r1 2"]},
//!             {"addr": "0x18", "kind": "branch", "asm": "bx r0", "reads": ["r0"]}
//!         ]}],
//!         "edges": [["entry", "a"], ["a", "exit"]]
//!     }]
//! }"#)?;
//! let config = AnalysisConfig::default();
//!
//! let mut live = cs_analysis::liveness(&program.cfgs, &program.manager, &config)?;
//! let branch = program.cfgs.find_inst(Addr(0x18)).unwrap();
//! assert!(live.is_reg_alive(branch, Reg::from(0))?);
//! assert!(!live.is_reg_alive(branch, Reg::from(1))?);
//!
//! let seeds = collect_interesting(&program.cfgs, &[Interest::Branches], &config)?;
//! let (slice, rebuilt) = cs_analysis::slice(&program.cfgs, &program.manager, &config, &seeds)?;
//! assert_eq!(slice.retained_count(), 2);
//! assert!(rebuilt.cfgs.find_inst(Addr(0x14)).is_none());
//! # Ok::<(), cs_analysis::errors::AnalysisError>(())
//! ```

pub mod collector;
pub mod config;
pub mod dataflow;
pub mod dot;
pub mod errors;
pub mod liveness;
pub mod memaccess;
pub mod predecessors;
pub mod slicing;
pub mod state;

#[cfg(test)]
mod fixtures;

use crate::config::AnalysisConfig;
use crate::errors::AnalysisResult;
use cs_program::{CfgCollection, InstRef, Interpreter};

pub use crate::liveness::Liveness;
pub use crate::slicing::{Rebuilt, Slice};

/// Liveness of the whole program, see [`Liveness::compute`].
pub fn liveness<'a, I: Interpreter>(
    cfgs: &'a CfgCollection,
    interp: &'a I,
    config: &AnalysisConfig,
) -> AnalysisResult<Liveness<'a, I>> {
    Liveness::compute(cfgs, interp, config)
}

/// Slices `cfgs` on `interesting` and rebuilds the sliced program.
pub fn slice<I: Interpreter>(
    cfgs: &CfgCollection,
    interp: &I,
    config: &AnalysisConfig,
    interesting: &[InstRef],
) -> AnalysisResult<(Slice, Rebuilt)> {
    let slice = slicing::compute_slice(cfgs, interp, config, interesting)?;
    let rebuilt = slicing::rebuild(cfgs, &slice)?;
    Ok((slice, rebuilt))
}
