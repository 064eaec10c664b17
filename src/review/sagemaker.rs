//! Human review using SageMaker flow definitions and Augmented AI human loops.

use aws_sdk_sagemaker::types::{
    FlowDefinitionOutputConfig, FlowDefinitionStatus, HumanLoopConfig, UiTemplate,
};
use aws_sdk_sagemakera2iruntime::types::{
    HumanLoopInput, HumanLoopOutput, HumanLoopStatus as A2iStatus,
};

use crate::{
    aws::AwsContext,
    error::{PipelineError, ServiceResultExt as _, Stage},
    prelude::*,
};

use super::{
    FlowDefinitionRequest, FlowStatus, HumanLoopHandle, HumanLoopState, HumanLoopStatus,
    HumanReviewService,
};

/// Human review backed by SageMaker (for setup) and the A2I runtime (for
/// human loops).
pub struct SageMakerReviewService {
    /// Flow definitions and task UIs.
    sagemaker: aws_sdk_sagemaker::Client,
    /// Human loops.
    a2i: aws_sdk_sagemakera2iruntime::Client,
}

impl SageMakerReviewService {
    /// Create a new review service.
    pub fn new(aws: &AwsContext) -> Self {
        Self {
            sagemaker: aws_sdk_sagemaker::Client::new(aws.sdk_config()),
            a2i: aws_sdk_sagemakera2iruntime::Client::new(aws.sdk_config()),
        }
    }
}

#[async_trait]
impl HumanReviewService for SageMakerReviewService {
    #[instrument(level = "debug", skip(self, template))]
    async fn create_task_ui(
        &self,
        name: &str,
        template: &str,
    ) -> Result<String, PipelineError> {
        let ui_template = UiTemplate::builder().content(template).build();
        let output = self
            .sagemaker
            .create_human_task_ui()
            .human_task_ui_name(name)
            .ui_template(ui_template)
            .send()
            .await
            .for_stage(Stage::FlowSetup)?;
        required(Stage::FlowSetup, "human task UI ARN", output.human_task_ui_arn())
    }

    #[instrument(level = "debug", skip_all, fields(name = %request.name))]
    async fn create_flow_definition(
        &self,
        request: &FlowDefinitionRequest,
    ) -> Result<String, PipelineError> {
        let human_loop_config = HumanLoopConfig::builder()
            .workteam_arn(&request.workforce_arn)
            .human_task_ui_arn(&request.task_ui_arn)
            .task_count(request.task_count)
            .task_title(&request.title)
            .task_description(&request.description)
            .build();
        let output_config = FlowDefinitionOutputConfig::builder()
            .s3_output_path(&request.output_path)
            .build();
        let output = self
            .sagemaker
            .create_flow_definition()
            .flow_definition_name(&request.name)
            .role_arn(&request.role_arn)
            .human_loop_config(human_loop_config)
            .output_config(output_config)
            .send()
            .await
            .for_stage(Stage::FlowSetup)?;
        required(Stage::FlowSetup, "flow definition ARN", output.flow_definition_arn())
    }

    #[instrument(level = "trace", skip(self))]
    async fn describe_flow_definition(
        &self,
        name: &str,
    ) -> Result<(String, FlowStatus), PipelineError> {
        let output = self
            .sagemaker
            .describe_flow_definition()
            .flow_definition_name(name)
            .send()
            .await
            .for_stage(Stage::FlowSetup)?;
        let arn = required(
            Stage::FlowSetup,
            "flow definition ARN",
            output.flow_definition_arn(),
        )?;
        let status = flow_status(output.flow_definition_status(), output.failure_reason());
        Ok((arn, status))
    }

    #[instrument(level = "debug", skip(self, input))]
    async fn start_human_loop(
        &self,
        name: &str,
        flow_arn: &str,
        input: &str,
    ) -> Result<HumanLoopHandle, PipelineError> {
        let loop_input = HumanLoopInput::builder().input_content(input).build();
        let output = self
            .a2i
            .start_human_loop()
            .human_loop_name(name)
            .flow_definition_arn(flow_arn)
            .human_loop_input(loop_input)
            .send()
            .await
            .for_stage(Stage::HumanLoop)?;
        Ok(HumanLoopHandle {
            name: name.to_owned(),
            arn: output.human_loop_arn().map(str::to_owned),
        })
    }

    #[instrument(level = "trace", skip(self))]
    async fn describe_human_loop(
        &self,
        name: &str,
    ) -> Result<HumanLoopState, PipelineError> {
        let output = self
            .a2i
            .describe_human_loop()
            .human_loop_name(name)
            .send()
            .await
            .for_stage(Stage::HumanLoop)?;
        trace!("Human loop: {output:#?}");
        Ok(human_loop_state(
            output.human_loop_status(),
            output.human_loop_output(),
            output.failure_reason(),
        ))
    }
}

/// Status name used when the service doesn't report one. We keep polling.
const UNKNOWN_STATUS: &str = "UNKNOWN";

/// Insist on a value the service should always return.
fn required(stage: Stage, what: &str, value: Option<&str>) -> Result<String, PipelineError> {
    value.map(str::to_owned).ok_or_else(|| PipelineError::Service {
        stage,
        message: format!("response did not include a {what}"),
    })
}

/// Convert a flow definition status.
fn flow_status(status: Option<&FlowDefinitionStatus>, reason: Option<&str>) -> FlowStatus {
    match status {
        Some(FlowDefinitionStatus::Active) => FlowStatus::Active,
        Some(FlowDefinitionStatus::Initializing) => FlowStatus::Initializing,
        Some(FlowDefinitionStatus::Deleting) => FlowStatus::Deleting,
        Some(FlowDefinitionStatus::Failed) => FlowStatus::Failed(reason.map(str::to_owned)),
        Some(other) => FlowStatus::Other(other.as_str().to_owned()),
        None => FlowStatus::Other(UNKNOWN_STATUS.to_owned()),
    }
}

/// Convert a human loop description.
fn human_loop_state(
    status: Option<&A2iStatus>,
    output: Option<&HumanLoopOutput>,
    reason: Option<&str>,
) -> HumanLoopState {
    let status = match status {
        Some(A2iStatus::InProgress) => HumanLoopStatus::InProgress,
        Some(A2iStatus::Stopping) => HumanLoopStatus::Stopping,
        Some(A2iStatus::Completed) => HumanLoopStatus::Completed,
        Some(A2iStatus::Stopped) => HumanLoopStatus::Stopped,
        Some(A2iStatus::Failed) => HumanLoopStatus::Failed,
        Some(other) => HumanLoopStatus::Other(other.as_str().to_owned()),
        None => HumanLoopStatus::Other(UNKNOWN_STATUS.to_owned()),
    };
    HumanLoopState {
        status,
        output_uri: output
            .and_then(|out| out.output_s3_uri())
            .map(str::to_owned),
        failure_reason: reason.map(str::to_owned),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flow_status_mapping() {
        assert_eq!(
            flow_status(Some(&FlowDefinitionStatus::Active), None),
            FlowStatus::Active
        );
        assert_eq!(
            flow_status(Some(&FlowDefinitionStatus::Failed), Some("bad role")),
            FlowStatus::Failed(Some("bad role".to_owned()))
        );
        assert_eq!(
            flow_status(Some(&FlowDefinitionStatus::Initializing), None),
            FlowStatus::Initializing
        );
    }

    #[test]
    fn test_missing_flow_status_keeps_polling() {
        assert_eq!(
            flow_status(None, None),
            FlowStatus::Other("UNKNOWN".to_owned())
        );
    }

    #[test]
    fn test_completed_loop_carries_output_uri() {
        let output = HumanLoopOutput::builder()
            .output_s3_uri("s3://forms/form-review/output/loop/output.json")
            .build();
        let state = human_loop_state(Some(&A2iStatus::Completed), Some(&output), None);
        assert_eq!(state.status, HumanLoopStatus::Completed);
        assert_eq!(
            state.output_uri.as_deref(),
            Some("s3://forms/form-review/output/loop/output.json")
        );
    }

    #[test]
    fn test_failed_loop_carries_reason() {
        let state = human_loop_state(Some(&A2iStatus::Failed), None, Some("expired"));
        assert_eq!(state.status, HumanLoopStatus::Failed);
        assert_eq!(state.output_uri, None);
        assert_eq!(state.failure_reason.as_deref(), Some("expired"));
    }

    #[test]
    fn test_missing_loop_status_keeps_polling() {
        let state = human_loop_state(None, None, None);
        assert_eq!(state.status, HumanLoopStatus::Other("UNKNOWN".to_owned()));
    }

    #[test]
    fn test_missing_arn_is_service_error() {
        let err = required(Stage::FlowSetup, "flow definition ARN", None).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Service {
                stage: Stage::FlowSetup,
                ..
            }
        ));
        assert_eq!(
            required(Stage::FlowSetup, "flow definition ARN", Some("arn:flow")).unwrap(),
            "arn:flow"
        );
    }
}
