//! Command-line entry points.

use clap::Args;
use tokio_util::sync::CancellationToken;

use crate::{
    config::Config,
    pipeline::{Pipeline, RunOutcome, Services},
    prelude::*,
    ui::Ui,
};

pub mod analyze;
pub mod resume;
pub mod run;
pub mod schema;
pub mod setup;
pub mod template;

/// Where to find our configuration.
#[derive(Debug, Clone, Args)]
pub struct ConfigOpts {
    /// Config file, in TOML or JSON format.
    #[clap(short = 'c', long = "config")]
    pub config_path: PathBuf,
}

impl ConfigOpts {
    /// Load our config and connect to AWS.
    pub async fn pipeline(&self, ui: Ui, cancel: CancellationToken) -> Result<Pipeline> {
        let config = Config::load(&self.config_path).await?;
        let services = Services::aws(&config).await?;
        Ok(Pipeline::new(config, services, ui, cancel))
    }
}

/// Options for subcommands that keep files in a run directory.
#[derive(Debug, Clone, Args)]
pub struct RunDirOpts {
    #[clap(flatten)]
    pub config: ConfigOpts,

    /// Directory for intermediate files. `resume` reads them back.
    #[clap(short = 'd', long = "run-dir")]
    pub run_dir: PathBuf,
}

/// Print a short summary of a finished run.
fn report_outcome(outcome: &RunOutcome) {
    println!("Wrote {} records to table {}", outcome.records, outcome.table);
}
