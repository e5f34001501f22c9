//! # `cfgslice`
//!
//! `cfgslice` is the main crate of the project. It hosts the command line
//! tools and re-exports the sub-crates the analyses are made of, most of the
//! commonly used items being gathered in the `cfgslice::prelude` namespace.
//!
//! ## Library basics
//!
//! A program is loaded from its json description, then analyzed:
//!
//! ```rust
//! use cfgslice::analysis;
//! use cfgslice::prelude::*;
//!
//! let program = loader::from_str(r#"{
//!     "registers": ["r0", "r1"],
//!     "cfgs": [{
//!         "name": "main",
//!         "blocks": [{"id": "a", "insts": [
//!             {"addr": "0x10", "asm": "mov r0, #1", "writes": ["r0"], "sem": ["seti r0 1"]},
//!             {"addr": "0x14", "kind": "branch", "asm": "bx r1", "reads": ["r1"]}
//!         ]}],
//!         "edges": [["entry", "a"], ["a", "exit"]]
//!     }]
//! }"#)?;
//! let config = AnalysisConfig::default();
//! let live = analysis::liveness(&program.cfgs, &program.manager, &config)?;
//! let (slice, rebuilt) = analysis::slice(
//!     &program.cfgs,
//!     &program.manager,
//!     &config,
//!     &collect_interesting(&program.cfgs, &[Interest::Branches], &config)?,
//! )?;
//! assert_eq!(slice.retained_count(), 1);
//! assert_eq!(rebuilt.cfgs.block_count(), 3);
//! # let _ = live;
//! # Ok::<(), CsError>(())
//! ```
//!
//! `live` tells which registers and memory bytes are needed before any
//! instruction, and at the boundaries of every block reached, call and
//! entry blocks included. `rebuilt` is the program keeping the retained
//! instructions only; [`analysis::dot::rebuilt_to_dot`] draws its bypass
//! edges dashed.
//!
//! ## Tools
//!
//!  - `cs-dumpcfg` renders the CFGs of a program in dot format,
//!  - `cs-liveness` prints the live state at block boundaries, and before
//!    each instruction with `--insts`,
//!  - `cs-slice` slices on `--at` addresses and `--interest` families.
//!
//! They are also subcommands of the `cfgslice` binary.
//!
//! ## Sub-crates
//!
//!  - [`cs_program`] contains the program model: instructions, the CFG
//!    collection, the CLP replay interpreter and the json loader,
//!  - [`cs_dfa`] contains the abstract domains, such as memory area sets,
//!  - [`cs_analysis`] contains the liveness and slicing algorithms and relies
//!    heavily on the previously cited crates.

mod errors;

pub mod cli;
pub mod cs_dumpcfg;
pub mod cs_liveness;
pub mod cs_slice;
pub mod input;

pub use cs_analysis as analysis;
pub use cs_dfa as dfa;
pub use cs_program as program;

/// Reexport module of commonly used structures and functions from the
/// project sub-crates:
///
/// ```rust
/// use cfgslice::prelude::*;
/// ```
pub mod prelude {
    pub use crate::errors::{CsError, CsResult};

    pub use cs_analysis::collector::{collect, collect_interesting, Interest};
    pub use cs_analysis::config::{AnalysisConfig, UnresolvedCalls};
    pub use cs_analysis::dot::{rebuilt_to_dot, slicing_to_dot};
    pub use cs_analysis::slicing::{Rebuilt, Slice};
    pub use cs_analysis::state::LiveState;
    pub use cs_analysis::Liveness;

    pub use cs_dfa::{MemArea, MemorySet};

    pub use cs_program::{
        loader, Addr, BlockId, BlockKind, CfgCollection, CfgId, InstRef, Platform, Program, Reg,
    };

    use clap::ArgMatches;

    /// Sets up logging for the command line tools.
    ///
    /// `CS_LOG` takes an `env_logger` filter and defaults to `info`.
    /// `--debug` shows the work items of the backward propagations and the
    /// bypasses of the CFG reconstruction, `--verbose` also traces the state
    /// before every instruction walked. Both only raise the level of the
    /// workspace crates. `--ecslog` emits ECS json lines instead.
    pub fn init_logger(args: &ArgMatches) {
        let env = env_logger::Env::new()
            .filter_or("CS_LOG", "info")
            .write_style("CS_LOG_STYLE");
        let mut builder = env_logger::Builder::from_env(env);

        let level = if args.get_flag("verbose") {
            Some(log::LevelFilter::Trace)
        } else if args.get_flag("debug") {
            Some(log::LevelFilter::Debug)
        } else {
            None
        };
        if let Some(level) = level {
            for module in ["cfgslice", "cs_analysis", "cs_dfa", "cs_program"] {
                builder.filter_module(module, level);
            }
        }

        if args.get_flag("ecslog") {
            builder.format(ecs_logger::format);
        } else {
            builder.format_timestamp(None);
        }
        builder.init();
    }
}
