//! In-memory versions of our service traits, for tests.

use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
};

use crate::{
    analysis::{AnalysisFeature, DocumentAnalysisResult, DocumentAnalyzer, InputImage},
    error::{PipelineError, Stage},
    prelude::*,
    records::{PersistedRecord, RecordStore, TableState},
    review::{
        FlowDefinitionRequest, FlowStatus, HumanLoopHandle, HumanLoopState,
        HumanLoopStatus, HumanReviewService,
    },
    storage::{ObjectStore, S3Uri},
};

/// Where [`FakeReviewService`] claims to have written answers.
pub const FAKE_OUTPUT_URI: &str = "s3://forms/form-review/output/loop/output.json";

/// Always returns the same analysis.
pub struct FakeAnalyzer {
    result: DocumentAnalysisResult,
    calls: AtomicU32,
}

impl FakeAnalyzer {
    pub fn new(result: DocumentAnalysisResult) -> Self {
        Self {
            result,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentAnalyzer for FakeAnalyzer {
    async fn analyze(
        &self,
        _image: &InputImage,
        features: &[AnalysisFeature],
    ) -> Result<DocumentAnalysisResult, PipelineError> {
        assert_eq!(features, AnalysisFeature::ALL);
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.result.clone())
    }
}

/// Objects in a hash map.
#[derive(Default)]
pub struct FakeObjectStore {
    objects: Mutex<HashMap<S3Uri, (Vec<u8>, String)>>,
}

impl FakeObjectStore {
    /// Pre-load an object.
    pub fn insert(&self, uri: &str, data: impl Into<Vec<u8>>) {
        let uri = uri.parse::<S3Uri>().unwrap();
        self.objects
            .lock()
            .unwrap()
            .insert(uri, (data.into(), "application/json".to_owned()));
    }

    /// Every stored object whose key starts with `prefix`, with its content
    /// type.
    pub fn with_prefix(&self, prefix: &str) -> Vec<(S3Uri, String)> {
        self.objects
            .lock()
            .unwrap()
            .iter()
            .filter(|(uri, _)| uri.key.starts_with(prefix))
            .map(|(uri, (_, content_type))| (uri.clone(), content_type.clone()))
            .collect()
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn put(
        &self,
        uri: &S3Uri,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<(), PipelineError> {
        self.objects
            .lock()
            .unwrap()
            .insert(uri.clone(), (data, content_type.to_owned()));
        Ok(())
    }

    async fn get(&self, uri: &S3Uri) -> Result<Vec<u8>, PipelineError> {
        self.objects
            .lock()
            .unwrap()
            .get(uri)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| PipelineError::Service {
                stage: Stage::Storage,
                message: format!("NoSuchKey: {uri}"),
            })
    }
}

/// A review service that reports scripted statuses.
///
/// Each status queue is consumed front to back, and the last status repeats
/// forever.
pub struct FakeReviewService {
    flow_statuses: Mutex<VecDeque<FlowStatus>>,
    loop_statuses: Mutex<VecDeque<HumanLoopStatus>>,
    started: Mutex<Vec<(String, String)>>,
    loop_checks: AtomicU32,
    omit_output: AtomicBool,
}

impl FakeReviewService {
    pub fn new(
        flow_statuses: impl IntoIterator<Item = FlowStatus>,
        loop_statuses: impl IntoIterator<Item = HumanLoopStatus>,
    ) -> Self {
        Self {
            flow_statuses: Mutex::new(flow_statuses.into_iter().collect()),
            loop_statuses: Mutex::new(loop_statuses.into_iter().collect()),
            started: Mutex::new(Vec::new()),
            loop_checks: AtomicU32::new(0),
            omit_output: AtomicBool::new(false),
        }
    }

    /// Report completed loops without an output location.
    pub fn omit_output_uri(&self) {
        self.omit_output.store(true, Ordering::SeqCst);
    }

    /// Replace the remaining human loop statuses.
    pub fn set_loop_statuses(&self, statuses: impl IntoIterator<Item = HumanLoopStatus>) {
        *self.loop_statuses.lock().unwrap() = statuses.into_iter().collect();
    }

    /// `(name, input)` for every human loop started.
    pub fn started(&self) -> Vec<(String, String)> {
        self.started.lock().unwrap().clone()
    }

    /// How many times we were asked about a human loop.
    pub fn loop_checks(&self) -> u32 {
        self.loop_checks.load(Ordering::SeqCst)
    }

    fn next<T: Clone>(queue: &Mutex<VecDeque<T>>) -> T {
        let mut queue = queue.lock().unwrap();
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().expect("no scripted status")
        }
    }
}

#[async_trait]
impl HumanReviewService for FakeReviewService {
    async fn create_task_ui(
        &self,
        name: &str,
        template: &str,
    ) -> Result<String, PipelineError> {
        assert!(template.contains("crowd-form"));
        Ok(format!("arn:aws:sagemaker:::human-task-ui/{name}"))
    }

    async fn create_flow_definition(
        &self,
        request: &FlowDefinitionRequest,
    ) -> Result<String, PipelineError> {
        Ok(format!("arn:aws:sagemaker:::flow-definition/{}", request.name))
    }

    async fn describe_flow_definition(
        &self,
        name: &str,
    ) -> Result<(String, FlowStatus), PipelineError> {
        Ok((
            format!("arn:aws:sagemaker:::flow-definition/{name}"),
            Self::next(&self.flow_statuses),
        ))
    }

    async fn start_human_loop(
        &self,
        name: &str,
        _flow_arn: &str,
        input: &str,
    ) -> Result<HumanLoopHandle, PipelineError> {
        self.started
            .lock()
            .unwrap()
            .push((name.to_owned(), input.to_owned()));
        Ok(HumanLoopHandle {
            name: name.to_owned(),
            arn: Some(format!("arn:aws:sagemaker:::human-loop/{name}")),
        })
    }

    async fn describe_human_loop(
        &self,
        _name: &str,
    ) -> Result<HumanLoopState, PipelineError> {
        self.loop_checks.fetch_add(1, Ordering::SeqCst);
        let status = Self::next(&self.loop_statuses);
        let has_output =
            status == HumanLoopStatus::Completed && !self.omit_output.load(Ordering::SeqCst);
        let output_uri = has_output.then(|| FAKE_OUTPUT_URI.to_owned());
        Ok(HumanLoopState {
            status,
            output_uri,
            failure_reason: None,
        })
    }
}

/// Tables in memory. New tables report as pending for a configurable number
/// of checks before becoming active.
#[derive(Default)]
pub struct FakeRecordStore {
    pending_checks: u32,
    tables: Mutex<BTreeMap<String, (u32, BTreeMap<u64, PersistedRecord>)>>,
    state_checks: AtomicU32,
    puts: AtomicU32,
}

impl FakeRecordStore {
    pub fn with_pending_checks(pending_checks: u32) -> Self {
        Self {
            pending_checks,
            ..Self::default()
        }
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.lock().unwrap().keys().cloned().collect()
    }

    pub fn records(&self, table: &str) -> Vec<PersistedRecord> {
        self.tables.lock().unwrap()[table].1.values().cloned().collect()
    }

    pub fn state_checks(&self) -> u32 {
        self.state_checks.load(Ordering::SeqCst)
    }

    pub fn put_count(&self) -> u32 {
        self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordStore for FakeRecordStore {
    async fn create_table(&self, name: &str) -> Result<(), PipelineError> {
        let mut tables = self.tables.lock().unwrap();
        assert!(!tables.contains_key(name), "table {name} already exists");
        tables.insert(name.to_owned(), (0, BTreeMap::new()));
        Ok(())
    }

    async fn table_state(&self, name: &str) -> Result<TableState, PipelineError> {
        self.state_checks.fetch_add(1, Ordering::SeqCst);
        let mut tables = self.tables.lock().unwrap();
        let (checks, _) = tables.get_mut(name).expect("no such table");
        if *checks >= self.pending_checks {
            Ok(TableState::Active)
        } else {
            *checks += 1;
            Ok(TableState::Pending("CREATING".to_owned()))
        }
    }

    async fn put_item(
        &self,
        table: &str,
        record: &PersistedRecord,
    ) -> Result<(), PipelineError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        let mut tables = self.tables.lock().unwrap();
        let (_, rows) = tables.get_mut(table).expect("no such table");
        rows.insert(record.line_nr, record.clone());
        Ok(())
    }

    async fn get_item(
        &self,
        table: &str,
        line_nr: u64,
    ) -> Result<Option<PersistedRecord>, PipelineError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .get(table)
            .and_then(|(_, rows)| rows.get(&line_nr).cloned()))
    }
}
