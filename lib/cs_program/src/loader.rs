//! JSON program descriptions.
//!
//! A description lists the platform registers, the initial values of some
//! registers, and the CFGs of the program (the first one being the entry
//! point):
//!
//! ```json
//! {
//!   "registers": ["r0", "r1", "r2", "sp"],
//!   "init": { "sp": "0x8000" },
//!   "cfgs": [
//!     {
//!       "name": "main",
//!       "blocks": [
//!         { "id": "A", "insts": [
//!           { "addr": "0x100", "kind": "alu", "asm": "mov r1, #4",
//!             "writes": ["r1"], "sem": ["seti r1 4"] } ] },
//!         { "id": "C", "call": "f" }
//!       ],
//!       "edges": [["entry", "A"], ["A", "C"], ["C", "exit", "seq"]]
//!     }
//!   ]
//! }
//! ```
//!
//! Block names `entry` and `exit` are reserved for the CFG entry and exit.

use crate::addr::parse_number;
use crate::cfg::{BlockId, Branch, CfgCollection, CfgId, CollectionBuilder};
use crate::clp::Clp;
use crate::errors::{ProgramError, ProgramResult};
use crate::instrs::{Inst, InstKind, SemOp};
use crate::interp::ClpManager;
use crate::registers::Platform;
use crate::Addr;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

/// A loaded program: its CFGs and the interpreter replaying them.
#[derive(Debug, Clone)]
pub struct Program {
    pub cfgs: CfgCollection,
    pub manager: ClpManager,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Number {
    Int(u32),
    Text(String),
}

impl Number {
    fn value(&self) -> ProgramResult<u32> {
        match self {
            Self::Int(v) => Ok(*v),
            Self::Text(s) => parse_number(s).ok_or_else(|| ProgramError::BadNumber(s.clone())),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InitDesc {
    Constant(Number),
    Strided {
        lower: Number,
        delta: Number,
        mtimes: Number,
    },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProgramDesc {
    registers: Vec<String>,
    #[serde(default)]
    init: BTreeMap<String, InitDesc>,
    cfgs: Vec<CfgDesc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CfgDesc {
    name: String,
    #[serde(default)]
    blocks: Vec<BlockDesc>,
    #[serde(default)]
    edges: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BlockDesc {
    id: String,
    #[serde(default)]
    insts: Vec<InstDesc>,
    /// Name of the called CFG, `"?"` for an unresolved call.
    #[serde(default)]
    call: Option<String>,
    #[serde(default)]
    phony: bool,
}

fn default_size() -> u32 {
    4
}

fn default_kind() -> InstKind {
    InstKind::Alu
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct InstDesc {
    addr: Number,
    #[serde(default = "default_size")]
    size: u32,
    #[serde(default = "default_kind")]
    kind: InstKind,
    #[serde(default)]
    asm: String,
    #[serde(default)]
    reads: Vec<String>,
    #[serde(default)]
    writes: Vec<String>,
    #[serde(default)]
    sem: Vec<String>,
}

/// Loads a JSON program description from a file.
///
/// # Errors
///
/// Fails on I/O errors, invalid JSON, and inconsistent descriptions
/// (unknown registers, blocks or CFGs, malformed semantic operations, etc.).
pub fn load<P: AsRef<Path>>(path: P) -> ProgramResult<Program> {
    let text = fs::read_to_string(path)?;
    from_str(&text)
}

/// Builds a program from a JSON description.
///
/// # Errors
///
/// See [`load`].
pub fn from_str(text: &str) -> ProgramResult<Program> {
    let desc: ProgramDesc = serde_json::from_str(text)?;
    let platform = Platform::new(desc.registers);

    let mut manager = ClpManager::new();
    for (name, init) in &desc.init {
        let reg = platform.lookup(name)?;
        let value = match init {
            InitDesc::Constant(n) => Clp::constant(n.value()?),
            InitDesc::Strided {
                lower,
                delta,
                mtimes,
            } => Clp::strided(lower.value()?, delta.value()?, mtimes.value()?),
        };
        manager.set_init(reg, value);
    }

    let mut builder = CollectionBuilder::new(platform);
    let mut cfg_ids: HashMap<&str, CfgId> = HashMap::new();
    for cfg in &desc.cfgs {
        if cfg_ids.contains_key(cfg.name.as_str()) {
            return Err(ProgramError::Duplicated(cfg.name.clone()));
        }
        cfg_ids.insert(&cfg.name, builder.add_cfg(cfg.name.clone()));
    }

    for cfg in &desc.cfgs {
        let id = cfg_ids[cfg.name.as_str()];
        let mut blocks: HashMap<&str, BlockId> = HashMap::new();
        blocks.insert("entry", builder.entry(id));
        blocks.insert("exit", builder.exit(id));

        for block in &cfg.blocks {
            if blocks.contains_key(block.id.as_str()) {
                return Err(ProgramError::Duplicated(format!("{}:{}", cfg.name, block.id)));
            }
            let bid = if let Some(callee) = &block.call {
                let callee = if callee == "?" {
                    None
                } else {
                    Some(
                        *cfg_ids
                            .get(callee.as_str())
                            .ok_or_else(|| ProgramError::UnknownCfg(callee.clone()))?,
                    )
                };
                builder.add_synth(id, callee)
            } else if block.phony {
                builder.add_phony(id)
            } else {
                let insts = block
                    .insts
                    .iter()
                    .map(|i| build_inst(i, builder.platform()))
                    .collect::<ProgramResult<Vec<_>>>()?;
                builder.add_basic(id, insts)?
            };
            blocks.insert(&block.id, bid);
        }

        for edge in &cfg.edges {
            let lookup = |name: &String| {
                blocks
                    .get(name.as_str())
                    .copied()
                    .ok_or_else(|| ProgramError::UnknownBlock {
                        cfg: cfg.name.clone(),
                        block: name.clone(),
                    })
            };
            let (src, dst, branch) = match edge.as_slice() {
                [src, dst] => (lookup(src)?, lookup(dst)?, Branch::Seq),
                [src, dst, tag] => (lookup(src)?, lookup(dst)?, parse_branch(tag)?),
                _ => {
                    return Err(ProgramError::Malformed(format!(
                        "bad edge {edge:?} in cfg '{}'",
                        cfg.name
                    )))
                }
            };
            builder.add_edge(src, dst, branch);
        }
    }

    let cfgs = builder.build()?;
    log::debug!(
        "program loaded: {} cfgs, {} blocks, {} edges",
        cfgs.cfg_count(),
        cfgs.block_count(),
        cfgs.edge_count()
    );
    Ok(Program { cfgs, manager })
}

fn parse_branch(tag: &str) -> ProgramResult<Branch> {
    match tag {
        "seq" => Ok(Branch::Seq),
        "taken" => Ok(Branch::Taken),
        "not-taken" | "nottaken" => Ok(Branch::NotTaken),
        _ => Err(ProgramError::Malformed(format!("unknown edge tag '{tag}'"))),
    }
}

fn build_inst(desc: &InstDesc, platform: &Platform) -> ProgramResult<Inst> {
    let reads = desc
        .reads
        .iter()
        .map(|r| platform.lookup(r))
        .collect::<ProgramResult<Vec<_>>>()?;
    let writes = desc
        .writes
        .iter()
        .map(|r| platform.lookup(r))
        .collect::<ProgramResult<Vec<_>>>()?;
    let sem = desc
        .sem
        .iter()
        .map(|s| SemOp::parse(s, platform))
        .collect::<ProgramResult<Vec<_>>>()?;
    Ok(
        Inst::new(Addr(desc.addr.value()?), desc.size, desc.kind, desc.asm.clone())
            .with_reads(reads)
            .with_writes(writes)
            .with_sem(sem),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::BlockKind;
    use crate::registers::Reg;

    const PROGRAM: &str = r#"{
        "registers": ["r0", "r1", "r2", "sp"],
        "init": { "sp": "0x8000", "r2": { "lower": 16, "delta": 4, "mtimes": 3 } },
        "cfgs": [
            { "name": "main",
              "blocks": [
                { "id": "A", "insts": [
                    { "addr": "0x100", "asm": "mov r1, #4", "writes": ["r1"], "sem": ["seti r1 4"] },
                    { "addr": 260, "kind": "store", "asm": "str r1, [sp]", "reads": ["r1", "sp"],
                      "sem": ["store r1 sp u32"] } ] },
                { "id": "C", "call": "f" },
                { "id": "U", "call": "?" }
              ],
              "edges": [["entry", "A"], ["A", "C", "taken"], ["A", "U", "not-taken"],
                        ["C", "exit"], ["U", "exit"]] },
            { "name": "f",
              "blocks": [ { "id": "B", "insts": [ { "addr": "0x200", "asm": "ret", "kind": "return" } ] } ],
              "edges": [["entry", "B"], ["B", "exit"]] }
        ]
    }"#;

    #[test]
    fn load_description() {
        let program = from_str(PROGRAM).unwrap();
        let cfgs = &program.cfgs;
        assert_eq!(cfgs.cfg_count(), 2);
        assert_eq!(cfgs.block_count(), 8);
        let at = cfgs.find_inst(Addr(0x104)).unwrap();
        let inst = cfgs.inst(at).unwrap();
        assert_eq!(inst.kind(), InstKind::Store);
        assert_eq!(inst.read_regs(), &[Reg::from(1), Reg::from(3)]);
        assert!(inst.is_store());

        let f = cfgs.find_cfg("f").unwrap();
        assert_eq!(cfgs.call_sites(f).count(), 1);
        let unresolved = cfgs
            .block_ids()
            .filter(|b| matches!(cfgs.block(*b).kind(), BlockKind::Synth(None)))
            .count();
        assert_eq!(unresolved, 1);

        assert_eq!(program.manager.init()[&Reg::from(3)], Clp::constant(0x8000));
        assert_eq!(
            program.manager.init()[&Reg::from(2)],
            Clp::strided(16, 4, 3)
        );
    }

    #[test]
    fn reject_bad_descriptions() {
        let unknown_reg = PROGRAM.replace(r#""writes": ["r1"]"#, r#""writes": ["r7"]"#);
        assert!(matches!(
            from_str(&unknown_reg),
            Err(ProgramError::UnknownRegister(_))
        ));
        let unknown_block = PROGRAM.replace(r#"["C", "exit"]"#, r#"["Z", "exit"]"#);
        assert!(matches!(
            from_str(&unknown_block),
            Err(ProgramError::UnknownBlock { .. })
        ));
        let unknown_callee = PROGRAM.replace(r#""call": "f""#, r#""call": "g""#);
        assert!(matches!(
            from_str(&unknown_callee),
            Err(ProgramError::UnknownCfg(_))
        ));
        assert!(matches!(from_str("{"), Err(ProgramError::Json(_))));
    }
}
