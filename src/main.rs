//! batchqc CLI: run the configured pipeline over the given inputs.

use anyhow::Result;
use batchqc::engine::arg_parser::Cli;
use batchqc::engine::handle_run;
use clap::{CommandFactory, Parser};
use std::time::Instant;

fn main() -> Result<()> {
    if std::env::args_os().len() == 1 {
        let _ = Cli::command().write_help(&mut std::io::stderr());
        std::process::exit(1);
    }
    let start_time = Instant::now();
    let cli = Cli::parse();
    handle_run(&cli)?;
    log::debug!("Total time: {:?}", start_time.elapsed());
    Ok(())
}
