//! The `schema` subcommand.

use clap::{Args, ValueEnum};
use schemars::schema_for;

use crate::{
    analysis::DocumentAnalysisResult, config::Config, io::write_json, prelude::*,
    records::PersistedRecord, review::ReviewTask,
};

/// The different schema types we support.
///
/// We parse these as PascalCase, because they represent type names.
#[derive(Debug, Clone, Copy, ValueEnum)]
#[clap(rename_all = "PascalCase")]
pub enum SchemaType {
    /// The config file.
    Config,
    /// Raw document analysis, as saved in a run directory.
    DocumentAnalysisResult,
    /// Human loop input content.
    ReviewTask,
    /// One persisted row.
    PersistedRecord,
}

/// Schema command line arguments.
#[derive(Debug, Args)]
pub struct SchemaOpts {
    /// The schema type to generate.
    #[clap(value_enum, value_name = "TYPE")]
    pub schema_type: SchemaType,

    /// The output path to write the schema to.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,
}

/// The `schema` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_schema(schema_opts: &SchemaOpts) -> Result<()> {
    let schema = match schema_opts.schema_type {
        SchemaType::Config => schema_for!(Config),
        SchemaType::DocumentAnalysisResult => schema_for!(DocumentAnalysisResult),
        SchemaType::ReviewTask => schema_for!(ReviewTask),
        SchemaType::PersistedRecord => schema_for!(PersistedRecord),
    };
    write_json(schema_opts.output_path.as_deref(), &schema).await
}
