use crate::input;
use crate::prelude::*;
use clap::ArgMatches;
use cs_program::Interpreter;
use nu_ansi_term::Color;
use regex::Regex;
use serde::Serialize;
use std::fmt::{self, Write as _};
use std::fs::File;
use std::io::{self, Write};

#[derive(Debug, Serialize)]
struct StateReport {
    regs: Vec<String>,
    mem: MemorySet,
}

impl StateReport {
    fn new(state: &LiveState, platform: &Platform) -> Self {
        Self {
            regs: state
                .reg_names(platform)
                .into_iter()
                .map(str::to_string)
                .collect(),
            mem: state.mem().clone(),
        }
    }
}

impl fmt::Display for StateReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{{{}}} mem {}", self.regs.join(", "), self.mem)
    }
}

#[derive(Debug, Serialize)]
struct InstReport {
    addr: Addr,
    asm: String,
    live: StateReport,
}

#[derive(Debug, Serialize)]
struct BlockReport {
    cfg: String,
    block: String,
    entry: Option<StateReport>,
    exit: Option<StateReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    insts: Vec<InstReport>,
}

pub fn run(args: &ArgMatches) -> CsResult<()> {
    init_logger(args);

    let program = input::open(args)?;
    let config = input::config(args);
    let filter = input::cfg_filter(args)?;
    let seeds = input::seeds_at(args, &program.cfgs)?;

    let mut live = if seeds.is_empty() {
        Liveness::compute(&program.cfgs, &program.manager, &config)?
    } else {
        Liveness::compute_from(&program.cfgs, &program.manager, &config, &seeds)?
    };
    let reports = report(&mut live, filter.as_ref(), args.get_flag("insts"))?;

    let output = args.get_one::<String>("output");
    let text = if args.get_flag("json") {
        serde_json::to_string_pretty(&reports)?
    } else {
        render(&reports, output.is_none())
    };
    if let Some(filename) = output {
        let mut file = File::create(filename)?;
        file.write_all(text.as_bytes())?;
        log::info!("liveness report written in {:?}", filename);
    } else {
        io::stdout().write_all(text.as_bytes())?;
    }

    Ok(())
}

fn report<I: Interpreter>(
    live: &mut Liveness<'_, I>,
    filter: Option<&Regex>,
    insts: bool,
) -> CsResult<Vec<BlockReport>> {
    let cfgs = live.cfgs();
    let platform = cfgs.platform();
    let mut reports = Vec::new();

    for (_, cfg) in cfgs
        .cfgs()
        .filter(|(_, cfg)| input::selected(filter, cfg.name()))
    {
        for &block in cfg.blocks() {
            let insts = if insts {
                live.instruction_states(block)?
                    .into_iter()
                    .filter_map(|(at, state)| {
                        cfgs.inst(at).map(|inst| InstReport {
                            addr: inst.addr(),
                            asm: inst.asm().to_string(),
                            live: StateReport::new(&state, platform),
                        })
                    })
                    .collect()
            } else {
                Vec::new()
            };
            reports.push(BlockReport {
                cfg: cfg.name().to_string(),
                block: cfgs.label(block),
                entry: live.entry(block).map(|s| StateReport::new(s, platform)),
                exit: live.exit(block).map(|s| StateReport::new(s, platform)),
                insts,
            });
        }
    }
    Ok(reports)
}

fn render(reports: &[BlockReport], colored: bool) -> String {
    let paint = |color: Color, text: String| {
        if colored {
            color.paint(text).to_string()
        } else {
            text
        }
    };
    let state = |s: &Option<StateReport>| {
        s.as_ref()
            .map_or_else(|| paint(Color::DarkGray, "unreached".to_string()), ToString::to_string)
    };

    let mut res = String::new();
    for report in reports {
        let _ = writeln!(res, "{}", paint(Color::Blue, format!("{}:", report.block)));
        let _ = writeln!(res, "  entry: {}", state(&report.entry));
        for inst in &report.insts {
            let _ = writeln!(
                res,
                "    {}: {:<24} {}",
                inst.addr,
                inst.asm,
                paint(Color::Green, inst.live.to_string())
            );
        }
        let _ = writeln!(res, "  exit:  {}", state(&report.exit));
    }
    res
}
