//! CLI parse tests.

use clap::Parser;

use super::{Cli, CliCommand};

mod add_run;

fn parse(args: &[&str]) -> CliCommand {
    Cli::try_parse_from(args).expect("args should parse").command
}
