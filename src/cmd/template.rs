//! The `template` subcommand.

use clap::Args;

use crate::{io::write_text, prelude::*, review::template::TASK_UI_TEMPLATE};

/// Template command line arguments.
#[derive(Debug, Args)]
pub struct TemplateOpts {
    /// The output path to write the template to.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,
}

/// The `template` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_template(opts: &TemplateOpts) -> Result<()> {
    write_text(opts.output_path.as_deref(), TASK_UI_TEMPLATE).await
}
