//! Small programs shared by the analysis tests.

use cs_program::{
    Addr, BlockId, Branch, CfgCollection, CfgId, CollectionBuilder, Inst, InstKind, Platform,
    Reg, SemOp,
};

pub(crate) fn platform() -> Platform {
    Platform::numbered(8)
}

pub(crate) fn sem(p: &Platform, text: &str) -> SemOp {
    SemOp::parse(text, p).unwrap()
}

pub(crate) fn mov(p: &Platform, addr: u32, dst: u16, imm: u32) -> Inst {
    Inst::new(Addr(addr), 4, InstKind::Alu, format!("mov r{dst}, #{imm}"))
        .with_writes([Reg::from(dst)])
        .with_sem([sem(p, &format!("seti r{dst} {imm}"))])
}

pub(crate) fn add(p: &Platform, addr: u32, dst: u16, a: u16, b: u16) -> Inst {
    Inst::new(Addr(addr), 4, InstKind::Alu, format!("add r{dst}, r{a}, r{b}"))
        .with_reads([Reg::from(a), Reg::from(b)])
        .with_writes([Reg::from(dst)])
        .with_sem([sem(p, &format!("add r{dst} r{a} r{b}"))])
}

pub(crate) fn use_reg(p: &Platform, addr: u32, src: u16) -> Inst {
    Inst::new(Addr(addr), 4, InstKind::Branch, format!("bx r{src}"))
        .with_reads([Reg::from(src)])
        .with_sem([sem(p, &format!("branch r{src}"))])
}

pub(crate) fn store_abs(p: &Platform, addr: u32, src: u16, target: u32) -> Inst {
    Inst::new(
        Addr(addr),
        4,
        InstKind::Store,
        format!("str r{src}, [{target:#x}]"),
    )
    .with_reads([Reg::from(src)])
    .with_sem([
        sem(p, &format!("seti t1 {target}")),
        sem(p, &format!("store r{src} t1 u32")),
    ])
}

pub(crate) fn load_abs(p: &Platform, addr: u32, dst: u16, target: u32) -> Inst {
    Inst::new(
        Addr(addr),
        4,
        InstKind::Load,
        format!("ldr r{dst}, [{target:#x}]"),
    )
    .with_writes([Reg::from(dst)])
    .with_sem([
        sem(p, &format!("seti t1 {target}")),
        sem(p, &format!("load r{dst} t1 u32")),
    ])
}

/// `A -> B -> D` and `A -> C -> D`: `B` stores `r2` to 0x2000, never read;
/// `C` stores `r2` to 0x1000, read back by `D`; `A` defines `r2`.
pub(crate) struct Diamond {
    pub cfgs: CfgCollection,
    pub a: BlockId,
    pub b: BlockId,
    pub c: BlockId,
    pub d: BlockId,
}

pub(crate) fn diamond() -> Diamond {
    let p = platform();
    let mut bld = CollectionBuilder::new(p.clone());
    let main = bld.add_cfg("main");
    let a = bld.add_basic(main, vec![mov(&p, 0x100, 2, 5)]).unwrap();
    let b = bld
        .add_basic(main, vec![store_abs(&p, 0x200, 2, 0x2000)])
        .unwrap();
    let c = bld
        .add_basic(main, vec![store_abs(&p, 0x300, 2, 0x1000)])
        .unwrap();
    let d = bld
        .add_basic(main, vec![load_abs(&p, 0x400, 0, 0x1000)])
        .unwrap();
    bld.add_edge(bld.entry(main), a, Branch::Seq);
    bld.add_edge(a, b, Branch::Taken);
    bld.add_edge(a, c, Branch::NotTaken);
    bld.add_edge(b, d, Branch::Seq);
    bld.add_edge(c, d, Branch::Seq);
    bld.add_edge(d, bld.exit(main), Branch::Seq);
    Diamond {
        cfgs: bld.build().unwrap(),
        a,
        b,
        c,
        d,
    }
}

/// `main` calls `f` twice; `f` writes `r0`, which is read after each call.
pub(crate) struct TwoCalls {
    pub cfgs: CfgCollection,
    pub f: CfgId,
    pub before1: BlockId,
    pub call1: BlockId,
    pub after1: BlockId,
    pub before2: BlockId,
    pub call2: BlockId,
    pub after2: BlockId,
    pub body: BlockId,
}

pub(crate) fn two_calls() -> TwoCalls {
    let p = platform();
    let mut bld = CollectionBuilder::new(p.clone());
    let main = bld.add_cfg("main");
    let f = bld.add_cfg("f");
    let before1 = bld.add_basic(main, vec![mov(&p, 0x100, 5, 0)]).unwrap();
    let call1 = bld.add_synth(main, Some(f));
    let after1 = bld
        .add_basic(main, vec![store_abs(&p, 0x104, 0, 0x3000)])
        .unwrap();
    let before2 = bld.add_basic(main, vec![mov(&p, 0x108, 6, 1)]).unwrap();
    let call2 = bld.add_synth(main, Some(f));
    let after2 = bld
        .add_basic(main, vec![store_abs(&p, 0x10c, 0, 0x3004)])
        .unwrap();
    let body = bld.add_basic(f, vec![mov(&p, 0x200, 0, 1)]).unwrap();

    bld.add_edge(bld.entry(main), before1, Branch::Seq);
    bld.add_edge(before1, call1, Branch::Seq);
    bld.add_edge(call1, after1, Branch::Seq);
    bld.add_edge(after1, before2, Branch::Seq);
    bld.add_edge(before2, call2, Branch::Seq);
    bld.add_edge(call2, after2, Branch::Seq);
    bld.add_edge(after2, bld.exit(main), Branch::Seq);
    bld.add_edge(bld.entry(f), body, Branch::Seq);
    bld.add_edge(body, bld.exit(f), Branch::Seq);
    TwoCalls {
        cfgs: bld.build().unwrap(),
        f,
        before1,
        call1,
        after1,
        before2,
        call2,
        after2,
        body,
    }
}
