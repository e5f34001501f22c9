use cfgslice::prelude::CsResult;
use cfgslice::{cli, cs_dumpcfg};

fn main() -> CsResult<()> {
    let args = cli::dumpcfg().get_matches();
    cs_dumpcfg::run(&args)
}
