//! Main `cfgslice` binary command line arguments options.
//!
//! This module declares a function to build `clap` command line arguments
//! parser, so that it can be used from other places than the main binary,
//! such as from bash completion file generator.

use clap::{value_parser, Arg, ArgAction, Command};
use clap_complete::Shell;

const NAME: &str = env!("CARGO_PKG_NAME");
const VERSION: &str = env!("CARGO_PKG_VERSION");
const AUTHORS: &str = env!("CARGO_PKG_AUTHORS");
const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

fn arg_debug() -> Arg {
    Arg::new("debug")
        .short('d')
        .long("debug")
        .action(ArgAction::SetTrue)
        .help("Activate debug mode")
}

fn arg_verbose() -> Arg {
    Arg::new("verbose")
        .short('v')
        .long("verbose")
        .action(ArgAction::SetTrue)
        .help("Activate verbose mode")
}

fn arg_ecslog() -> Arg {
    Arg::new("ecslog")
        .short('e')
        .long("ecslog")
        .action(ArgAction::SetTrue)
        .help("Output logs in ECS format")
}

fn arg_input() -> Arg {
    Arg::new("input")
        .short('i')
        .long("input")
        .action(ArgAction::Set)
        .required(true)
        .help("Input program description (json)")
}

fn arg_output(help: &str) -> Arg {
    Arg::new("output")
        .short('o')
        .long("output")
        .action(ArgAction::Set)
        .help(help.to_string())
}

fn arg_threshold() -> Arg {
    Arg::new("threshold")
        .long("threshold")
        .action(ArgAction::Set)
        .value_parser(value_parser!(u32))
        .help("Repeat count above which strided memory accesses are widened")
}

fn arg_conservative_calls() -> Arg {
    Arg::new("conservative-calls")
        .long("conservative-calls")
        .action(ArgAction::SetTrue)
        .help("Consider that any block may return through unresolved calls")
}

fn arg_at() -> Arg {
    Arg::new("at")
        .long("at")
        .action(ArgAction::Append)
        .help("Address of an instruction to start the analysis from")
}

fn arg_filter_cfg() -> Arg {
    Arg::new("filter-cfg")
        .long("filter-cfg")
        .action(ArgAction::Set)
        .help("CFG(s) regex filter")
}

fn arg_json() -> Arg {
    Arg::new("json")
        .long("json")
        .action(ArgAction::SetTrue)
        .help("Print the report as json")
}

#[must_use]
pub fn cfgslice() -> Command {
    Command::new(NAME)
        .version(VERSION)
        .author(AUTHORS)
        .about(DESCRIPTION)
        .subcommand(dumpcfg())
        .subcommand(liveness())
        .subcommand(slice())
        .subcommand(
            Command::new("gen-completions")
                .about("Generates completions file")
                .arg(
                    Arg::new("shell")
                        .short('s')
                        .long("shell")
                        .action(ArgAction::Set)
                        .value_parser(value_parser!(Shell))
                        .required(true)
                        .help("Shell type for completion generation"),
                ),
        )
}

#[must_use]
pub fn dumpcfg() -> Command {
    Command::new("dumpcfg")
        .bin_name("cs-dumpcfg")
        .version(VERSION)
        .author(AUTHORS)
        .about("Renders program CFGs in dot format")
        .arg(arg_debug())
        .arg(arg_verbose())
        .arg(arg_ecslog())
        .arg(arg_input())
        .arg(arg_output("Output dot file"))
}

#[must_use]
pub fn liveness() -> Command {
    Command::new("liveness")
        .bin_name("cs-liveness")
        .version(VERSION)
        .author(AUTHORS)
        .about("Computes live registers and memory at block boundaries")
        .arg(arg_debug())
        .arg(arg_verbose())
        .arg(arg_ecslog())
        .arg(arg_input())
        .arg(arg_output("Output report file"))
        .arg(arg_threshold())
        .arg(arg_conservative_calls())
        .arg(arg_at())
        .arg(arg_filter_cfg())
        .arg(arg_json())
        .arg(
            Arg::new("insts")
                .long("insts")
                .action(ArgAction::SetTrue)
                .help("Also print the live state before every instruction"),
        )
}

#[must_use]
pub fn slice() -> Command {
    Command::new("slice")
        .bin_name("cs-slice")
        .version(VERSION)
        .author(AUTHORS)
        .about("Slices a program on interesting instructions")
        .after_help("Example:\n $ cs-slice -i prog.json --interest stores --at 0x104 -o sliced.dot")
        .arg(arg_debug())
        .arg(arg_verbose())
        .arg(arg_ecslog())
        .arg(arg_input())
        .arg(arg_output("Output dot file of the sliced program"))
        .arg(arg_threshold())
        .arg(arg_conservative_calls())
        .arg(arg_at())
        .arg(arg_filter_cfg())
        .arg(arg_json())
        .arg(
            Arg::new("interest")
                .long("interest")
                .action(ArgAction::Append)
                .value_parser(["branches", "loads", "stores", "calls", "exits"])
                .help("Family of instructions to slice on"),
        )
        .arg(
            Arg::new("slicing-dot")
                .long("slicing-dot")
                .action(ArgAction::Set)
                .help("Output dot file of the slicing decision"),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_are_consistent() {
        cfgslice().debug_assert();
        dumpcfg().debug_assert();
        liveness().debug_assert();
        slice().debug_assert();
    }

    #[test]
    fn repeated_seeds() {
        let args = slice()
            .try_get_matches_from([
                "cs-slice", "-i", "p.json", "--at", "0x104", "--at", "0x200", "--interest",
                "stores",
            ])
            .unwrap();
        let at: Vec<&String> = args.get_many::<String>("at").unwrap().collect();
        assert_eq!(at, ["0x104", "0x200"]);
        assert!(slice()
            .try_get_matches_from(["cs-slice", "-i", "p.json", "--interest", "jumps"])
            .is_err());
    }
}
