use builtin_pack::{Pack, logging};
use clap::Parser;

fn main() {
    let pack = Pack::parse();
    logging::set_up_logging(pack.verbose);

    if let Err(e) = pack.execute() {
        eprintln!("error: {e:?}");
        std::process::exit(1);
    }
}
