//! `mdm completions <shell>` – emit shell completion scripts.

use anyhow::Result;
use clap::CommandFactory;
use clap_complete::{generate, Shell};

use crate::cli::Cli;

pub fn run_completions(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "mdm", &mut std::io::stdout());
    Ok(())
}
