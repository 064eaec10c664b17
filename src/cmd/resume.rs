//! The `resume` subcommand.

use clap::Args;
use tokio_util::sync::CancellationToken;

use crate::{io::RunDir, prelude::*, ui::Ui};

use super::{RunDirOpts, report_outcome};

/// Resume command line arguments.
#[derive(Debug, Args)]
pub struct ResumeOpts {
    #[clap(flatten)]
    pub run: RunDirOpts,
}

/// The `resume` subcommand.
#[instrument(level = "debug", skip_all, fields(run_dir = %opts.run.run_dir.display()))]
pub async fn cmd_resume(
    ui: Ui,
    cancel: CancellationToken,
    opts: &ResumeOpts,
) -> Result<()> {
    let run_dir = RunDir::open(&opts.run.run_dir)?;
    let pipeline = opts.run.config.pipeline(ui, cancel).await?;
    let outcome = pipeline.resume(&run_dir).await?;
    report_outcome(&outcome);
    Ok(())
}
