//! The `run` subcommand.

use clap::Args;
use tokio_util::sync::CancellationToken;

use crate::{io::RunDir, prelude::*, ui::Ui};

use super::{RunDirOpts, report_outcome};

/// Run command line arguments.
#[derive(Debug, Args)]
pub struct RunOpts {
    /// Scanned form. PNG, JPEG, TIFF or PDF.
    pub image_path: PathBuf,

    #[clap(flatten)]
    pub run: RunDirOpts,
}

/// The `run` subcommand.
#[instrument(level = "debug", skip_all, fields(image = %opts.image_path.display()))]
pub async fn cmd_run(ui: Ui, cancel: CancellationToken, opts: &RunOpts) -> Result<()> {
    let pipeline = opts.run.config.pipeline(ui, cancel).await?;
    let run_dir = RunDir::create(&opts.run.run_dir).await?;
    let outcome = pipeline.run(&opts.image_path, &run_dir).await?;
    report_outcome(&outcome);
    Ok(())
}
