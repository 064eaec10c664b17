//! The `analyze` subcommand.

use clap::Args;
use tokio_util::sync::CancellationToken;

use crate::{analysis::InputImage, io::RunDir, prelude::*, ui::Ui};

use super::RunDirOpts;

/// Analyze command line arguments.
#[derive(Debug, Args)]
pub struct AnalyzeOpts {
    /// Scanned form. PNG, JPEG, TIFF or PDF.
    pub image_path: PathBuf,

    #[clap(flatten)]
    pub run: RunDirOpts,
}

/// The `analyze` subcommand.
#[instrument(level = "debug", skip_all, fields(image = %opts.image_path.display()))]
pub async fn cmd_analyze(
    ui: Ui,
    cancel: CancellationToken,
    opts: &AnalyzeOpts,
) -> Result<()> {
    let pipeline = opts.run.config.pipeline(ui, cancel).await?;
    let run_dir = RunDir::create(&opts.run.run_dir).await?;
    let image = InputImage::load(&opts.image_path).await?;
    let tables = pipeline.analyze(&image, &run_dir).await?;
    println!(
        "Extracted {} header rows and {} line items into {}",
        tables.header.len(),
        tables.line_items.len(),
        opts.run.run_dir.display()
    );
    Ok(())
}
