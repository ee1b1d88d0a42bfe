use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use subpipe_core::consts::LEDGER_FILE_NAME;
use subpipe_core::pipeline::BatchLedger;

use crate::summary::print_ledger;

#[derive(Args)]
pub struct ReportArgs {
    /// Work directory of a previous run
    pub workdir: PathBuf,
}

pub fn run(args: &ReportArgs) -> Result<()> {
    let path = args.workdir.join(LEDGER_FILE_NAME);
    if !path.is_file() {
        bail!("No ledger found at {}", path.display());
    }
    let ledger = BatchLedger::load(&path)
        .with_context(|| format!("Failed to read ledger {}", path.display()))?;
    print_ledger(&ledger);
    Ok(())
}
