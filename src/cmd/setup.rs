//! The `setup` subcommand.

use clap::Args;
use tokio_util::sync::CancellationToken;

use crate::{prelude::*, ui::Ui};

use super::ConfigOpts;

/// Setup command line arguments.
#[derive(Debug, Args)]
pub struct SetupOpts {
    #[clap(flatten)]
    pub config: ConfigOpts,
}

/// The `setup` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_setup(ui: Ui, cancel: CancellationToken, opts: &SetupOpts) -> Result<()> {
    let pipeline = opts.config.pipeline(ui, cancel).await?;
    let flow_arn = pipeline.setup().await?;
    println!("{flow_arn}");
    Ok(())
}
