//! Setting up review flows, dispatching review tasks, and waiting for answers.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    config::{ReviewConfig, StorageConfig},
    error::{PipelineError, Stage},
    poll::{PollError, Probe, poll_until},
    prelude::*,
    ui::{ProgressConfig, Ui},
};

use super::{
    FlowDefinitionRequest, FlowStatus, HumanLoopHandle, HumanLoopStatus,
    HumanReviewService, ReviewTask, template::TASK_UI_TEMPLATE,
};

/// Talks to the human-loop service on behalf of the pipeline.
#[derive(Clone)]
pub struct ReviewDispatcher {
    service: Arc<dyn HumanReviewService>,
    review: ReviewConfig,
    storage: StorageConfig,
}

impl ReviewDispatcher {
    /// Create a new dispatcher.
    pub fn new(
        service: Arc<dyn HumanReviewService>,
        review: ReviewConfig,
        storage: StorageConfig,
    ) -> Self {
        Self {
            service,
            review,
            storage,
        }
    }

    /// Create the task UI and flow definition, then wait for the flow to become
    /// active. Returns the flow definition ARN.
    #[instrument(level = "debug", skip_all, fields(flow = %self.review.flow_definition_name))]
    pub async fn setup(&self, ui: &Ui, cancel: &CancellationToken) -> Result<String> {
        let task_ui_arn = self
            .service
            .create_task_ui(&self.review.task_ui_name, TASK_UI_TEMPLATE)
            .await
            .with_context(|| {
                format!("Failed to create task UI {:?}", self.review.task_ui_name)
            })?;
        info!(%task_ui_arn, "Created task UI");

        let request = FlowDefinitionRequest {
            name: self.review.flow_definition_name.clone(),
            role_arn: self.review.role_arn.clone(),
            workforce_arn: self.review.workforce_arn.clone(),
            task_ui_arn,
            task_count: self.review.task_count,
            title: self.review.task_title.clone(),
            description: self.review.task_description.clone(),
            output_path: self.storage.output_path(),
        };
        let flow_arn = self
            .service
            .create_flow_definition(&request)
            .await
            .with_context(|| {
                format!("Failed to create flow definition {:?}", request.name)
            })?;
        info!(%flow_arn, "Created flow definition");

        Ok(self.wait_for_active_flow(ui, cancel).await?)
    }

    /// Wait until the flow definition is active, returning its ARN.
    ///
    /// Newly created flow definitions take a little while to become usable.
    pub async fn wait_for_active_flow(
        &self,
        ui: &Ui,
        cancel: &CancellationToken,
    ) -> Result<String, PipelineError> {
        let name = &self.review.flow_definition_name;
        let spinner = ui.new_spinner(&ProgressConfig {
            emoji: "⏳",
            msg: "Waiting for flow definition",
            done_msg: "Flow definition active",
        });
        let policy = self.review.flow_activation.to_policy();
        let result = poll_until("flow definition", &policy, cancel, |attempt| async move {
            let (arn, status) = self.service.describe_flow_definition(name).await?;
            match status {
                FlowStatus::Active => Ok(Probe::Ready(arn)),
                FlowStatus::Failed(_) | FlowStatus::Deleting => {
                    Err(PipelineError::Dispatch {
                        flow: name.clone(),
                        attempts: attempt,
                        status: status.to_string(),
                    })
                }
                other => Ok(Probe::Pending(other.to_string())),
            }
        })
        .await;
        spinner.finish();
        match result {
            Ok(arn) => Ok(arn),
            Err(PollError::Exhausted {
                attempts,
                last_status,
            }) => Err(PipelineError::Dispatch {
                flow: name.clone(),
                attempts,
                status: last_status,
            }),
            Err(PollError::Cancelled { .. }) => Err(PipelineError::Cancelled {
                waiting_for: format!("flow definition {name:?}"),
            }),
            Err(PollError::Failed(err)) => Err(err),
        }
    }

    /// Start a human loop for a review task.
    #[instrument(level = "debug", skip_all)]
    pub async fn submit(
        &self,
        flow_arn: &str,
        task: &ReviewTask,
    ) -> Result<HumanLoopHandle> {
        let name = format!("{}-{}", self.review.human_loop_prefix, Uuid::new_v4());
        let input = task.to_input_content()?;
        debug!(%input, "Human loop input");
        let handle = self
            .service
            .start_human_loop(&name, flow_arn, &input)
            .await
            .with_context(|| format!("Failed to start human loop {name:?}"))?;
        info!(
            human_loop = %handle.name,
            header_rows = task.header.len(),
            line_items = task.line_items.len(),
            answer_fields = task.answer_keys().len(),
            "Started human loop"
        );
        Ok(handle)
    }

    /// Wait for a human loop to complete, returning the output URI.
    pub async fn wait_for_completion(
        &self,
        ui: &Ui,
        handle: &HumanLoopHandle,
        cancel: &CancellationToken,
    ) -> Result<String, PipelineError> {
        let name = &handle.name;
        let spinner = ui.new_spinner(&ProgressConfig {
            emoji: "🧑",
            msg: "Waiting for reviewer",
            done_msg: "Review complete",
        });
        let policy = self.review.completion.to_policy();
        let result = poll_until("human loop", &policy, cancel, |attempt| async move {
            let state = self.service.describe_human_loop(name).await?;
            debug!(attempt, status = %state.status, "Human loop status");
            match state.status {
                HumanLoopStatus::Completed => match state.output_uri {
                    Some(uri) => Ok(Probe::Ready(uri)),
                    None => Err(PipelineError::Service {
                        stage: Stage::HumanLoop,
                        message: format!(
                            "human loop {name:?} completed without an output location"
                        ),
                    }),
                },
                HumanLoopStatus::Stopped | HumanLoopStatus::Failed => {
                    Err(PipelineError::ReviewFailed {
                        human_loop: name.clone(),
                        status: state.status.to_string(),
                        reason: state.failure_reason,
                    })
                }
                other => Ok(Probe::Pending(other.to_string())),
            }
        })
        .await;
        spinner.finish();
        match result {
            Ok(uri) => {
                info!(human_loop = %name, output = %uri, "Human loop complete");
                Ok(uri)
            }
            Err(PollError::Exhausted { attempts, .. }) => {
                warn!(
                    human_loop = %name,
                    "Review not available yet; run `resume` later to pick it up"
                );
                Err(PipelineError::Timeout {
                    human_loop: name.clone(),
                    attempts,
                })
            }
            Err(PollError::Cancelled { .. }) => Err(PipelineError::Cancelled {
                waiting_for: format!("human loop {name:?}"),
            }),
            Err(PollError::Failed(err)) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeReviewService;

    fn dispatcher(service: Arc<FakeReviewService>) -> ReviewDispatcher {
        let review = ReviewConfig {
            completion: crate::config::PollConfig {
                max_attempts: 2,
                interval_secs: 5,
            },
            ..ReviewConfig::default()
        };
        ReviewDispatcher::new(service, review, StorageConfig::default())
    }

    fn handle() -> HumanLoopHandle {
        HumanLoopHandle {
            name: "form-review-1".to_owned(),
            arn: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_without_output_is_service_error() {
        let service = Arc::new(FakeReviewService::new(
            [FlowStatus::Active],
            [HumanLoopStatus::Completed],
        ));
        service.omit_output_uri();
        let err = dispatcher(service)
            .wait_for_completion(&Ui::init_for_tests(), &handle(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Service {
                stage: Stage::HumanLoop,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_status_keeps_polling() {
        let service = Arc::new(FakeReviewService::new(
            [FlowStatus::Active],
            [
                HumanLoopStatus::Other("UNKNOWN".to_owned()),
                HumanLoopStatus::Completed,
            ],
        ));
        let uri = dispatcher(service.clone())
            .wait_for_completion(&Ui::init_for_tests(), &handle(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(uri, crate::testing::FAKE_OUTPUT_URI);
        assert_eq!(service.loop_checks(), 2);
    }
}
