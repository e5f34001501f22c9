use cfgslice::prelude::CsResult;
use cfgslice::{cli, cs_slice};

fn main() -> CsResult<()> {
    let args = cli::slice().get_matches();
    cs_slice::run(&args)
}
