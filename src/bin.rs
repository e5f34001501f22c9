use cfgslice::prelude::*;
use cfgslice::{cli, cs_dumpcfg, cs_liveness, cs_slice};
use clap::ArgMatches;
use clap_complete::{generate, Shell};
use std::io;
use std::process::ExitCode;

type Tool = fn(&ArgMatches) -> CsResult<()>;

const TOOLS: [(&str, Tool); 3] = [
    ("dumpcfg", cs_dumpcfg::run),
    ("liveness", cs_liveness::run),
    ("slice", cs_slice::run),
];

fn main() -> ExitCode {
    let args = cli::cfgslice().get_matches();
    match dispatch(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("cfgslice: {err}");
            ExitCode::FAILURE
        }
    }
}

fn dispatch(args: &ArgMatches) -> CsResult<()> {
    let Some((name, sub_args)) = args.subcommand() else {
        return Err(CsError::BadArguments("missing subcommand".to_string()));
    };
    if name == "gen-completions" {
        return gen_completions(sub_args);
    }
    let (_, run) = TOOLS
        .iter()
        .find(|(tool, _)| *tool == name)
        .ok_or_else(|| CsError::BadArguments(format!("unknown subcommand '{name}'")))?;
    run(sub_args)
}

fn gen_completions(sub_args: &ArgMatches) -> CsResult<()> {
    let shell = *sub_args
        .get_one::<Shell>("shell")
        .ok_or_else(|| CsError::BadArguments("--shell needed".to_string()))?;
    let mut cmd = cli::cfgslice();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
    Ok(())
}
