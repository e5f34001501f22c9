//! Machine instructions and their semantic micro-operations.
//!
//! An [`Inst`] is immutable once decoded: it exposes its address, its
//! declared read and written registers, and the list of semantic operations
//! ([`SemOp`]) that an abstract interpreter replays to resolve memory
//! accesses.

use crate::addr::{parse_number, Addr};
use crate::errors::{ProgramError, ProgramResult};
use crate::registers::{Platform, Reg};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse instruction classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstKind {
    Alu,
    Load,
    Store,
    Branch,
    Call,
    Return,
    Other,
}

impl fmt::Display for InstKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Alu => write!(f, "alu"),
            Self::Load => write!(f, "load"),
            Self::Store => write!(f, "store"),
            Self::Branch => write!(f, "branch"),
            Self::Call => write!(f, "call"),
            Self::Return => write!(f, "return"),
            Self::Other => write!(f, "other"),
        }
    }
}

impl InstKind {
    #[inline]
    #[must_use]
    pub fn is_control(self) -> bool {
        matches!(self, Self::Branch | Self::Call | Self::Return)
    }
}

/// Type of the data moved by a load or a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemType {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
}

impl MemType {
    /// Size in bytes of the accessed data.
    #[must_use]
    pub const fn size(self) -> u32 {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "i8" => Self::I8,
            "i16" => Self::I16,
            "i32" => Self::I32,
            "i64" => Self::I64,
            "u8" => Self::U8,
            "u16" => Self::U16,
            "u32" => Self::U32,
            "u64" => Self::U64,
            "f32" => Self::F32,
            "f64" => Self::F64,
            _ => return None,
        })
    }
}

impl fmt::Display for MemType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::F32 => "f32",
            Self::F64 => "f64",
        };
        f.write_str(s)
    }
}

/// Operand of a semantic operation: either a platform register or a
/// temporary local to one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SemReg {
    Reg(Reg),
    Tmp(u8),
}

impl fmt::Display for SemReg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Reg(r) => write!(f, "{r}"),
            Self::Tmp(t) => write!(f, "t{t}"),
        }
    }
}

impl SemReg {
    fn parse(s: &str, platform: &Platform) -> ProgramResult<Self> {
        if let Some(reg) = platform.find(s) {
            return Ok(Self::Reg(reg));
        }
        s.strip_prefix('t')
            .and_then(|n| n.parse().ok())
            .map(Self::Tmp)
            .ok_or_else(|| ProgramError::UnknownRegister(s.to_string()))
    }
}

/// Semantic micro-operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SemOp {
    Nop,
    Seti { dst: SemReg, imm: u32 },
    Set { dst: SemReg, src: SemReg },
    Add { dst: SemReg, a: SemReg, b: SemReg },
    Sub { dst: SemReg, a: SemReg, b: SemReg },
    /// The destination receives an unknown value.
    Scratch { dst: SemReg },
    Load { dst: SemReg, addr: SemReg, ty: MemType },
    Store { src: SemReg, addr: SemReg, ty: MemType },
    Branch { target: SemReg },
}

impl fmt::Display for SemOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Nop => write!(f, "nop"),
            Self::Seti { dst, imm } => write!(f, "seti {dst}, {imm:#x}"),
            Self::Set { dst, src } => write!(f, "set {dst}, {src}"),
            Self::Add { dst, a, b } => write!(f, "add {dst}, {a}, {b}"),
            Self::Sub { dst, a, b } => write!(f, "sub {dst}, {a}, {b}"),
            Self::Scratch { dst } => write!(f, "scratch {dst}"),
            Self::Load { dst, addr, ty } => write!(f, "load {dst}, {addr}, {ty}"),
            Self::Store { src, addr, ty } => write!(f, "store {src}, {addr}, {ty}"),
            Self::Branch { target } => write!(f, "branch {target}"),
        }
    }
}

impl SemOp {
    /// Parses the compact textual form used by program descriptions, e.g.
    /// `seti t1 0x1000` or `store r2 t1 u32`. Operands may be separated by
    /// spaces or commas.
    pub fn parse(text: &str, platform: &Platform) -> ProgramResult<Self> {
        let words: Vec<&str> = text
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|w| !w.is_empty())
            .collect();
        let bad = || ProgramError::BadSemOp(text.to_string());
        let reg = |i: usize| -> ProgramResult<SemReg> {
            SemReg::parse(words.get(i).ok_or_else(bad)?, platform)
        };
        let ty = |i: usize| -> ProgramResult<MemType> {
            words
                .get(i)
                .and_then(|w| MemType::parse(w))
                .ok_or_else(bad)
        };
        let expect = |n: usize| -> ProgramResult<()> {
            if words.len() == n {
                Ok(())
            } else {
                Err(bad())
            }
        };

        match words.first().copied() {
            Some("nop") => expect(1).map(|()| Self::Nop),
            Some("seti") => {
                expect(3)?;
                let imm = parse_number(words[2]).ok_or_else(bad)?;
                Ok(Self::Seti { dst: reg(1)?, imm })
            }
            Some("set") => {
                expect(3)?;
                Ok(Self::Set {
                    dst: reg(1)?,
                    src: reg(2)?,
                })
            }
            Some("add") => {
                expect(4)?;
                Ok(Self::Add {
                    dst: reg(1)?,
                    a: reg(2)?,
                    b: reg(3)?,
                })
            }
            Some("sub") => {
                expect(4)?;
                Ok(Self::Sub {
                    dst: reg(1)?,
                    a: reg(2)?,
                    b: reg(3)?,
                })
            }
            Some("scratch") => {
                expect(2)?;
                Ok(Self::Scratch { dst: reg(1)? })
            }
            Some("load") => {
                expect(4)?;
                Ok(Self::Load {
                    dst: reg(1)?,
                    addr: reg(2)?,
                    ty: ty(3)?,
                })
            }
            Some("store") => {
                expect(4)?;
                Ok(Self::Store {
                    src: reg(1)?,
                    addr: reg(2)?,
                    ty: ty(3)?,
                })
            }
            Some("branch") => {
                expect(2)?;
                Ok(Self::Branch { target: reg(1)? })
            }
            _ => Err(bad()),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_memory_access(&self) -> bool {
        matches!(self, Self::Load { .. } | Self::Store { .. })
    }
}

/// A decoded machine instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inst {
    addr: Addr,
    size: u32,
    kind: InstKind,
    asm: String,
    reads: Vec<Reg>,
    writes: Vec<Reg>,
    sem: Vec<SemOp>,
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.addr, self.asm)
    }
}

impl Inst {
    pub fn new(addr: Addr, size: u32, kind: InstKind, asm: impl Into<String>) -> Self {
        Self {
            addr,
            size,
            kind,
            asm: asm.into(),
            reads: Vec::new(),
            writes: Vec::new(),
            sem: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_reads(mut self, regs: impl IntoIterator<Item = Reg>) -> Self {
        self.reads.extend(regs);
        self
    }

    #[must_use]
    pub fn with_writes(mut self, regs: impl IntoIterator<Item = Reg>) -> Self {
        self.writes.extend(regs);
        self
    }

    #[must_use]
    pub fn with_sem(mut self, ops: impl IntoIterator<Item = SemOp>) -> Self {
        self.sem.extend(ops);
        self
    }

    #[inline]
    #[must_use]
    pub fn addr(&self) -> Addr {
        self.addr
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> u32 {
        self.size
    }

    #[inline]
    #[must_use]
    pub fn next_addr(&self) -> Addr {
        self.addr.offset(self.size)
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> InstKind {
        self.kind
    }

    #[inline]
    #[must_use]
    pub fn asm(&self) -> &str {
        &self.asm
    }

    /// Registers declared as read by the instruction.
    #[inline]
    #[must_use]
    pub fn read_regs(&self) -> &[Reg] {
        &self.reads
    }

    /// Registers declared as written by the instruction.
    #[inline]
    #[must_use]
    pub fn written_regs(&self) -> &[Reg] {
        &self.writes
    }

    #[inline]
    #[must_use]
    pub fn sem(&self) -> &[SemOp] {
        &self.sem
    }

    #[must_use]
    pub fn is_load(&self) -> bool {
        self.sem.iter().any(|op| matches!(op, SemOp::Load { .. }))
    }

    #[must_use]
    pub fn is_store(&self) -> bool {
        self.sem.iter().any(|op| matches!(op, SemOp::Store { .. }))
    }
}
