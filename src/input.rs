//! Command line inputs shared by the tools: program loading, analysis
//! configuration and seed selection.

use crate::prelude::*;
use clap::ArgMatches;
use regex::Regex;

/// Loads the program given with `--input`.
pub fn open(args: &ArgMatches) -> CsResult<Program> {
    let fname = args
        .get_one::<String>("input")
        .ok_or_else(|| CsError::BadArguments("--input needed".to_string()))?;
    let program = loader::load(fname)?;
    log::info!(
        "{fname}: {} cfgs, {} blocks, {} edges",
        program.cfgs.cfg_count(),
        program.cfgs.block_count(),
        program.cfgs.edge_count()
    );
    Ok(program)
}

#[must_use]
pub fn config(args: &ArgMatches) -> AnalysisConfig {
    let mut config = AnalysisConfig::default();
    if let Some(threshold) = args.get_one::<u32>("threshold") {
        config.widening_threshold = *threshold;
    }
    if args.get_flag("conservative-calls") {
        config.unresolved_calls = UnresolvedCalls::AllBlocks;
    }
    log::debug!("{config:?}");
    config
}

/// Compiles the `--filter-cfg` pattern, if any.
pub fn cfg_filter(args: &ArgMatches) -> CsResult<Option<Regex>> {
    let pattern = args
        .get_one::<String>("filter-cfg")
        .map(|r| Regex::new(r))
        .transpose()?;
    if let Some(pattern) = &pattern {
        log::debug!("filtering cfgs on pattern {pattern:?}");
    }
    Ok(pattern)
}

/// Returns `true` if the CFG named `name` passes `filter`.
#[must_use]
pub fn selected(filter: Option<&Regex>, name: &str) -> bool {
    filter.map_or(true, |pattern| pattern.is_match(name))
}

/// Instructions given with `--at`.
pub fn seeds_at(args: &ArgMatches, cfgs: &CfgCollection) -> CsResult<Vec<InstRef>> {
    args.get_many::<String>("at")
        .into_iter()
        .flatten()
        .map(|text| -> CsResult<InstRef> {
            let addr: Addr = text.parse()?;
            cfgs.find_inst(addr)
                .ok_or_else(|| CsError::BadArguments(format!("no instruction at {addr}")))
        })
        .collect()
}
