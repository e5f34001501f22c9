use crate::analysis::slicing;
use crate::input;
use crate::prelude::*;
use clap::ArgMatches;
use regex::Regex;
use serde::Serialize;
use std::fs::File;
use std::io::{self, Write};

#[derive(Debug, Serialize)]
struct SliceReport {
    seeds: Vec<Addr>,
    retained: usize,
    total: usize,
    removed: Vec<String>,
    bypasses: Vec<(String, String)>,
}

impl SliceReport {
    fn new(cfgs: &CfgCollection, slice: &Slice, rebuilt: &Rebuilt) -> Self {
        Self {
            seeds: slice
                .seeds()
                .iter()
                .filter_map(|at| cfgs.inst(*at).map(|inst| inst.addr()))
                .collect(),
            retained: slice.retained_count(),
            total: cfgs.basic_blocks().map(|(_, bb)| bb.len()).sum(),
            removed: rebuilt.removed.iter().map(|id| cfgs.label(*id)).collect(),
            bypasses: rebuilt
                .bypasses
                .iter()
                .map(|(p, s)| (cfgs.label(*p), cfgs.label(*s)))
                .collect(),
        }
    }
}

pub fn run(args: &ArgMatches) -> CsResult<()> {
    init_logger(args);

    let program = input::open(args)?;
    let config = input::config(args);
    let filter = input::cfg_filter(args)?;
    let seeds = seeds(args, &program.cfgs, &config, filter.as_ref())?;
    if seeds.is_empty() {
        return Err(CsError::BadArguments(
            "no instruction to slice on, see --at and --interest".to_string(),
        ));
    }

    let slice = slicing::compute_slice(&program.cfgs, &program.manager, &config, &seeds)?;
    if let Some(dot_filename) = args.get_one::<String>("slicing-dot") {
        let mut file = File::create(dot_filename)?;
        file.write_all(slicing_to_dot(&program.cfgs, &slice).as_bytes())?;
        log::info!("slicing decision written in {:?}", dot_filename);
    }

    let rebuilt = slicing::rebuild(&program.cfgs, &slice)?;
    let report = SliceReport::new(&program.cfgs, &slice, &rebuilt);
    log::info!(
        "{}/{} instructions retained, {} blocks removed",
        report.retained,
        report.total,
        report.removed.len()
    );
    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    let dot = rebuilt_to_dot(&rebuilt);
    if let Some(dot_filename) = args.get_one::<String>("output") {
        let mut file = File::create(dot_filename)?;
        file.write_all(dot.as_bytes())?;
        log::info!("sliced program written in {:?}", dot_filename);
    } else if !args.get_flag("json") {
        io::stdout().write_all(dot.as_bytes())?;
    }

    Ok(())
}

/// Instructions given with `--at`, plus the instructions of the selected
/// CFGs matching an `--interest` family.
fn seeds(
    args: &ArgMatches,
    cfgs: &CfgCollection,
    config: &AnalysisConfig,
    filter: Option<&Regex>,
) -> CsResult<Vec<InstRef>> {
    let interests = args
        .get_many::<String>("interest")
        .into_iter()
        .flatten()
        .map(|s| s.parse::<Interest>())
        .collect::<Result<Vec<_>, _>>()?;

    let mut seeds = input::seeds_at(args, cfgs)?;
    seeds.extend(
        collect_interesting(cfgs, &interests, config)?
            .into_iter()
            .filter(|at| input::selected(filter, cfgs.cfg(cfgs.block(at.block).cfg()).name())),
    );
    seeds.sort();
    seeds.dedup();
    log::debug!("{} seeds", seeds.len());
    Ok(seeds)
}
