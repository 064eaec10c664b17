//! The review pipeline, from scanned image to persisted rows.
//!
//! Each stage runs to completion before the next starts, and the first failure
//! stops the run. Intermediate files go into a [`RunDir`], so a run whose
//! reviewer hasn't finished yet can be picked up later with
//! [`Pipeline::resume`].

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    analysis::{AnalysisFeature, DocumentAnalyzer, InputImage, textract::TextractAnalyzer},
    aws::AwsContext,
    config::Config,
    interchange::{header_from_csv, header_to_csv, line_items_from_csv, line_items_to_csv},
    io::RunDir,
    merge::MergedRecordSet,
    prelude::*,
    projection::{
        HeaderRecord, LineItemRecord, project_header, project_line_items,
        validate_line_items,
    },
    records::{PersistenceWriter, RecordStore, dynamodb::DynamoDbRecordStore},
    review::{
        HumanLoopHandle, HumanReviewService, ReviewTask, answer::CorrectionAnswer,
        dispatch::ReviewDispatcher, sagemaker::SageMakerReviewService,
    },
    storage::{ObjectStore, S3Uri, s3::S3ObjectStore},
    ui::Ui,
};

/// The remote services the pipeline talks to.
#[derive(Clone)]
pub struct Services {
    pub analyzer: Arc<dyn DocumentAnalyzer>,
    pub objects: Arc<dyn ObjectStore>,
    pub review: Arc<dyn HumanReviewService>,
    pub records: Arc<dyn RecordStore>,
}

impl Services {
    /// Connect to the real AWS services.
    pub async fn aws(config: &Config) -> Result<Self> {
        let aws = AwsContext::load(config.region.as_deref()).await?;
        Ok(Self {
            analyzer: Arc::new(TextractAnalyzer::new(&aws)),
            objects: Arc::new(S3ObjectStore::new(&aws)),
            review: Arc::new(SageMakerReviewService::new(&aws)),
            records: Arc::new(DynamoDbRecordStore::new(&aws)),
        })
    }
}

/// The two projected tables, as reloaded from CSV.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectedTables {
    pub header: Vec<HeaderRecord>,
    pub line_items: Vec<LineItemRecord>,
}

/// What we record about a dispatched review, so that we can resume.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct RunInfo {
    /// The human loop we're waiting on.
    pub human_loop: HumanLoopHandle,
    /// Where the reviewer sees the image.
    pub image_uri: String,
    /// The flow definition the loop runs under.
    pub flow_arn: String,
}

/// The result of a complete run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunOutcome {
    /// The table we created.
    pub table: String,
    /// How many records we wrote to it.
    pub records: usize,
}

/// Runs the pipeline stages against a set of services.
pub struct Pipeline {
    config: Config,
    services: Services,
    dispatcher: ReviewDispatcher,
    ui: Ui,
    cancel: CancellationToken,
}

impl Pipeline {
    /// Create a new pipeline.
    pub fn new(config: Config, services: Services, ui: Ui, cancel: CancellationToken) -> Self {
        let dispatcher = ReviewDispatcher::new(
            services.review.clone(),
            config.review.clone(),
            config.storage.clone(),
        );
        Self {
            config,
            services,
            dispatcher,
            ui,
            cancel,
        }
    }

    /// Create the task UI and flow definition. Returns the flow ARN.
    pub async fn setup(&self) -> Result<String> {
        self.dispatcher.setup(&self.ui, &self.cancel).await
    }

    /// Analyze an image and project it into our two tables. Writes the raw
    /// analysis and both CSV files into `run_dir`, and returns the tables as
    /// read back from CSV.
    #[instrument(level = "info", skip_all, fields(image = %image.file_name))]
    pub async fn analyze(
        &self,
        image: &InputImage,
        run_dir: &RunDir,
    ) -> Result<ProjectedTables> {
        let result = self
            .services
            .analyzer
            .analyze(image, AnalysisFeature::ALL)
            .await
            .with_context(|| format!("Failed to analyze {:?}", image.file_name))?;
        run_dir.write_json(RunDir::ANALYSIS, &result).await?;

        let line_items_config = &self.config.line_items;
        let header = project_header(&result);
        let line_items = project_line_items(&result, line_items_config)
            .with_context(|| format!("Failed to project {:?}", image.file_name))?;
        validate_line_items(&line_items, line_items_config)
            .with_context(|| format!("Unexpected table layout in {:?}", image.file_name))?;
        info!(
            header_rows = header.len(),
            line_items = line_items.len(),
            "Projected tables"
        );

        let columns = &line_items_config.columns;
        run_dir
            .write(RunDir::HEADER_CSV, &header_to_csv(&header)?)
            .await?;
        run_dir
            .write(RunDir::LINE_ITEMS_CSV, &line_items_to_csv(columns, &line_items)?)
            .await?;
        self.load_tables(run_dir).await
    }

    /// Read both tables back from a run directory.
    pub async fn load_tables(&self, run_dir: &RunDir) -> Result<ProjectedTables> {
        let header = header_from_csv(&run_dir.read(RunDir::HEADER_CSV).await?)
            .context("Failed to load header table")?;
        let line_items = line_items_from_csv(
            &self.config.line_items.columns,
            &run_dir.read(RunDir::LINE_ITEMS_CSV).await?,
        )
        .context("Failed to load line item table")?;
        Ok(ProjectedTables { header, line_items })
    }

    /// Publish the image, then start a human loop to review `tables`. Records
    /// the loop in `run_dir` before returning.
    #[instrument(level = "info", skip_all, fields(image = %image.file_name))]
    pub async fn dispatch(
        &self,
        image: &InputImage,
        tables: &ProjectedTables,
        run_dir: &RunDir,
    ) -> Result<RunInfo> {
        let image_uri = self.publish_image(image).await?;
        let flow_arn = self
            .dispatcher
            .wait_for_active_flow(&self.ui, &self.cancel)
            .await
            .context("Flow definition is not usable; try running `setup`")?;

        let task = ReviewTask::new(
            image_uri.to_string(),
            &self.config.review,
            &self.config.line_items.columns,
            &tables.header,
            &tables.line_items,
        );
        let human_loop = self.dispatcher.submit(&flow_arn, &task).await?;
        let run_info = RunInfo {
            human_loop,
            image_uri: image_uri.to_string(),
            flow_arn,
        };
        run_dir.write_json(RunDir::RUN_INFO, &run_info).await?;
        Ok(run_info)
    }

    /// Upload the image where reviewers can see it.
    async fn publish_image(&self, image: &InputImage) -> Result<S3Uri> {
        let storage = &self.config.storage;
        let uri = S3Uri::new(
            &storage.bucket,
            format!("{}{}-{}", storage.input_prefix, Uuid::new_v4(), image.file_name),
        );
        self.services
            .objects
            .put(&uri, image.data.clone(), &image.mime_type)
            .await
            .with_context(|| format!("Failed to publish image to {uri}"))?;
        info!(%uri, "Published image");
        Ok(uri)
    }

    /// Wait for the review, merge the corrections, and persist the result.
    #[instrument(level = "info", skip_all, fields(human_loop = %run_info.human_loop.name))]
    pub async fn collect(
        &self,
        tables: ProjectedTables,
        run_info: &RunInfo,
    ) -> Result<RunOutcome> {
        let output_uri = self
            .dispatcher
            .wait_for_completion(&self.ui, &run_info.human_loop, &self.cancel)
            .await?;
        let answer = self.fetch_answer(&output_uri).await?;

        let columns = &self.config.line_items.columns;
        let merged = MergedRecordSet::merge(
            tables.header,
            tables.line_items,
            &answer,
            &self.config.review,
            columns,
        );
        let records = merged.to_persisted(columns);

        let writer =
            PersistenceWriter::new(self.services.records.clone(), self.config.table.clone());
        let table = writer
            .write(&records, &self.ui, &self.cancel)
            .await
            .context("Failed to persist merged records")?;
        info!(%table, records = records.len(), "Run complete");
        Ok(RunOutcome {
            table,
            records: records.len(),
        })
    }

    /// Download and parse the reviewer's answers.
    async fn fetch_answer(&self, output_uri: &str) -> Result<CorrectionAnswer> {
        let uri = output_uri.parse::<S3Uri>()?;
        let data = self
            .services
            .objects
            .get(&uri)
            .await
            .with_context(|| format!("Failed to fetch review output {uri}"))?;
        let answer = CorrectionAnswer::from_output_json(&data)
            .with_context(|| format!("Bad review output in {uri}"))?;
        debug!(answers = answer.len(), "Fetched review answers");
        if answer.is_empty() {
            warn!(%uri, "Reviewer submitted no corrections");
        }
        Ok(answer)
    }

    /// Run every stage for one image.
    pub async fn run(&self, image_path: &Path, run_dir: &RunDir) -> Result<RunOutcome> {
        let image = InputImage::load(image_path).await?;
        let tables = self.analyze(&image, run_dir).await?;
        let run_info = self.dispatch(&image, &tables, run_dir).await?;
        self.collect(tables, &run_info).await
    }

    /// Pick up a run whose review was dispatched earlier.
    pub async fn resume(&self, run_dir: &RunDir) -> Result<RunOutcome> {
        let run_info: RunInfo = run_dir
            .read_json(RunDir::RUN_INFO)
            .await
            .context("Nothing to resume; was this run dispatched?")?;
        info!(human_loop = %run_info.human_loop.name, "Resuming run");
        let tables = self.load_tables(run_dir).await?;
        self.collect(tables, &run_info).await
    }
}
