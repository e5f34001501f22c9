use cfgslice::prelude::CsResult;
use cfgslice::{cli, cs_liveness};

fn main() -> CsResult<()> {
    let args = cli::liveness().get_matches();
    cs_liveness::run(&args)
}
