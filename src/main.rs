// Allow dead code for items that are part of the public API but only used in tests
#![allow(dead_code)]

mod balanced;
mod cmd;
mod importer;
mod input;
mod normalize;
mod sanitizer;
mod schema;
mod tsql;

use clap::Parser;
use cmd::Cli;

fn main() {
    let cli = Cli::parse();

    if let Err(e) = cmd::run(cli) {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
