//! Typed pipeline errors.
//!
//! Most of our code uses [`anyhow`], but the pipeline stages report one of a
//! small number of failure kinds, and callers (and tests) need to tell them
//! apart. In particular, [`PipelineError::Timeout`] means "the review isn't
//! ready yet", not "something broke".

use std::{error, fmt};

use aws_smithy_runtime_api::client::result::SdkError;
use aws_smithy_types::error::display::DisplayErrorContext;

use crate::prelude::*;

/// Which pipeline stage talked to which service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Textract `AnalyzeDocument`.
    Analysis,
    /// S3 reads and writes.
    Storage,
    /// SageMaker task UI and flow definition calls.
    FlowSetup,
    /// A2I human loop calls.
    HumanLoop,
    /// DynamoDB calls.
    Persistence,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Analysis => "document analysis",
            Stage::Storage => "object storage",
            Stage::FlowSetup => "flow setup",
            Stage::HumanLoop => "human loop",
            Stage::Persistence => "persistence",
        };
        f.write_str(name)
    }
}

/// Errors reported by pipeline stages.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A remote API rejected or failed the call. Not retried.
    #[error("{stage} call failed: {message}")]
    Service {
        /// The stage making the call.
        stage: Stage,
        /// The full error chain, as text.
        message: String,
    },

    /// The flow definition never became active.
    #[error(
        "flow definition {flow:?} not active after {attempts} attempts (last status: {status})"
    )]
    Dispatch {
        /// Flow definition name.
        flow: String,
        /// How many times we asked.
        attempts: u32,
        /// The last status we saw.
        status: String,
    },

    /// The poll budget ran out before the human loop completed. The loop may
    /// still complete later, and can be picked up with `resume`.
    #[error("human loop {human_loop:?} not complete after {attempts} attempts")]
    Timeout {
        /// Human loop name.
        human_loop: String,
        /// How many times we asked.
        attempts: u32,
    },

    /// The human loop reached a terminal state without output.
    #[error("human loop {human_loop:?} ended with status {status}{}", reason_suffix(.reason))]
    ReviewFailed {
        /// Human loop name.
        human_loop: String,
        /// Terminal status.
        status: String,
        /// Failure reason reported by the service, if any.
        reason: Option<String>,
    },

    /// The analysis response did not have the shape we need.
    #[error("projection failed: {0}")]
    Projection(String),

    /// Somebody cancelled us while we were waiting.
    #[error("cancelled while waiting for {waiting_for}")]
    Cancelled {
        /// What we were waiting for.
        waiting_for: String,
    },
}

fn reason_suffix(reason: &Option<String>) -> String {
    match reason {
        Some(reason) => format!(": {reason}"),
        None => String::new(),
    }
}

impl PipelineError {
    /// Build a [`PipelineError::Service`] from any error, keeping the whole
    /// source chain in the message.
    pub fn service<E>(stage: Stage, err: E) -> Self
    where
        E: error::Error,
    {
        PipelineError::Service {
            stage,
            message: DisplayErrorContext(&err).to_string(),
        }
    }

    /// Build a [`PipelineError::Projection`].
    pub fn projection(msg: impl Into<String>) -> Self {
        PipelineError::Projection(msg.into())
    }
}

/// Convert AWS SDK errors into [`PipelineError::Service`] for a given stage.
pub trait ServiceResultExt<T> {
    /// Tag this error with the stage that produced it.
    fn for_stage(self, stage: Stage) -> Result<T, PipelineError>;
}

impl<T, E, R> ServiceResultExt<T> for Result<T, SdkError<E, R>>
where
    E: error::Error + 'static,
    R: fmt::Debug,
{
    fn for_stage(self, stage: Stage) -> Result<T, PipelineError> {
        self.map_err(|err| {
            let kind = match &err {
                SdkError::ConstructionFailure(_) => "request construction failed",
                SdkError::TimeoutError(_) => "timed out",
                SdkError::DispatchFailure(_) => "dispatch failed",
                SdkError::ResponseError(_) => "unreadable response",
                SdkError::ServiceError(_) => "service error",
                _ => "unknown error",
            };
            warn!(%stage, kind, "AWS call failed");
            PipelineError::Service {
                stage,
                message: format!("{kind}: {}", DisplayErrorContext(&err)),
            }
        })
    }
}
