use std::str::FromStr;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{
    EnvFilter, Layer as _, filter::Directive, fmt::format::FmtSpan, layer::SubscriberExt,
    util::SubscriberInitExt as _,
};

use self::{prelude::*, ui::Ui};

mod analysis;
mod aws;
mod cmd;
mod config;
mod error;
mod interchange;
mod io;
mod merge;
mod pipeline;
mod poll;
mod prelude;
mod projection;
mod records;
mod review;
mod storage;
#[cfg(test)]
mod testing;
mod ui;

/// Extract tables and form fields from scanned forms, have a human review
/// them, and store the corrected rows.
#[derive(Debug, Parser)]
#[clap(
    version,
    after_help = r#"
Environment Variables:
  Standard AWS environment variables and credential files are used for
  Textract, S3, SageMaker, Augmented AI and DynamoDB.

  RUST_LOG (optional): Log filter, for example `form_review=debug`.

  These variables may be set in a standard `.env` file.
"#
)]
struct Opts {
    #[clap(subcommand)]
    subcmd: Cmd,
}

/// The subcommands we support.
#[derive(Debug, Subcommand)]
enum Cmd {
    /// Create the review task UI and flow definition, and wait for it to
    /// become active.
    Setup(cmd::setup::SetupOpts),
    /// Analyze an image and write the extracted tables as CSV.
    Analyze(cmd::analyze::AnalyzeOpts),
    /// Analyze an image, send it for review, and store the corrected rows.
    Run(cmd::run::RunOpts),
    /// Finish a run whose review wasn't complete yet.
    Resume(cmd::resume::ResumeOpts),
    /// Print the review task UI template.
    Template(cmd::template::TemplateOpts),
    /// Print schemas for config and data formats.
    Schema(cmd::schema::SchemaOpts),
}

impl Cmd {
    /// Are we using stdout for output?
    fn using_stdout_for_output(&self) -> bool {
        match self {
            Cmd::Template(opts) => opts.output_path.is_none(),
            Cmd::Schema(opts) => opts.output_path.is_none(),
            Cmd::Setup(_) | Cmd::Analyze(_) | Cmd::Run(_) | Cmd::Resume(_) => false,
        }
    }
}

/// Our entry point, which can return an error. [`anyhow::Result`] will
/// automatically print a nice error message with optional backtrace.
#[tokio::main]
async fn main() -> Result<()> {
    let ui = Ui::init();

    // Initialize tracing.
    let directive =
        Directive::from_str("info").expect("built-in directive should be valid");
    let env_filter = EnvFilter::builder()
        .with_default_directive(directive)
        .from_env_lossy();
    let subscriber = tracing_subscriber::fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(ui.get_stderr_writer())
        .with_filter(env_filter);
    tracing_subscriber::registry().with(subscriber).init();

    real_main(ui).await
}

/// Our real entry point.
#[instrument(level = "debug", name = "main", skip_all)]
async fn real_main(ui: Ui) -> Result<()> {
    // Load environment variables from a `.env` file, if it exists.
    dotenvy::dotenv().ok();

    let opts = Opts::parse();
    debug!("Parsed options: {:?}", opts);

    if opts.subcmd.using_stdout_for_output() {
        ui.hide_progress_bars();
    }

    // Ctrl-C stops any polling in progress.
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted; stopping");
                cancel.cancel();
            }
        }
    });

    match &opts.subcmd {
        Cmd::Setup(opts) => cmd::setup::cmd_setup(ui, cancel, opts).await?,
        Cmd::Analyze(opts) => cmd::analyze::cmd_analyze(ui, cancel, opts).await?,
        Cmd::Run(opts) => cmd::run::cmd_run(ui, cancel, opts).await?,
        Cmd::Resume(opts) => cmd::resume::cmd_resume(ui, cancel, opts).await?,
        Cmd::Template(opts) => cmd::template::cmd_template(opts).await?,
        Cmd::Schema(opts) => cmd::schema::cmd_schema(opts).await?,
    }
    Ok(())
}
