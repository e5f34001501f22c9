use crate::input;
use crate::prelude::*;
use clap::ArgMatches;
use std::fs::File;
use std::io::{self, Write};

pub fn run(args: &ArgMatches) -> CsResult<()> {
    init_logger(args);

    let program = input::open(args)?;
    for (id, cfg) in program.cfgs.cfgs() {
        let calls = program.cfgs.call_sites(id).count();
        log::info!(
            "cfg {id} '{}': {} blocks, called from {calls} sites",
            cfg.name(),
            cfg.blocks().len()
        );
    }

    let dot = program.cfgs.to_dot();
    if let Some(dot_filename) = args.get_one::<String>("output") {
        let mut file = File::create(dot_filename)?;
        file.write_all(dot.as_bytes())?;
        log::info!("dot output written in {:?}", dot_filename);
    } else {
        io::stdout().write_all(dot.as_bytes())?;
    }

    Ok(())
}
