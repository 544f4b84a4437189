//! Request-scoped dispatch: classify, resolve, decode, execute.

use std::sync::Arc;
use std::time::Instant;

use axum::http::StatusCode;
use thiserror::Error;

use super::classifier::{Classification, ClassificationError, Classifier};
use crate::config::Config;
use crate::llm::{AiProxyClient, LlmClient};
use crate::tools::{ArgumentError, DataRoot, TaskContext, TaskError, ToolRegistry};

/// Result of a successfully executed task.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    pub task: String,
    pub message: String,
    /// What the task reported, if anything.
    pub output: Option<String>,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("task description is empty")]
    EmptyTask,

    #[error(transparent)]
    Classification(#[from] ClassificationError),

    #[error("unknown task `{0}`")]
    UnknownTask(String),

    #[error("task `{task}`: {source}")]
    Arguments {
        task: String,
        #[source]
        source: ArgumentError,
    },

    #[error("task `{task}` failed: {source}")]
    Task {
        task: String,
        #[source]
        source: TaskError,
    },
}

impl DispatchError {
    /// HTTP status reported to the caller.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::EmptyTask | Self::UnknownTask(_) | Self::Arguments { .. } => {
                StatusCode::BAD_REQUEST
            }
            Self::Classification(e) if e.is_dependency_failure() => StatusCode::BAD_GATEWAY,
            Self::Classification(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Task { source, .. } => match source {
                TaskError::PathNotAllowed(_) | TaskError::InvalidArguments(_) => {
                    StatusCode::BAD_REQUEST
                }
                TaskError::Upstream(_) | TaskError::Model(_) => StatusCode::BAD_GATEWAY,
                TaskError::Unsupported(_) => StatusCode::UNPROCESSABLE_ENTITY,
                TaskError::Io { .. }
                | TaskError::InvalidData(_)
                | TaskError::Command(_)
                | TaskError::Database(_)
                | TaskError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

/// Owns the classifier, the registry and the shared task context.
pub struct Dispatcher {
    classifier: Classifier,
    registry: Arc<ToolRegistry>,
    context: TaskContext,
}

impl Dispatcher {
    pub fn new(classifier: Classifier, registry: Arc<ToolRegistry>, context: TaskContext) -> Self {
        Self {
            classifier,
            registry,
            context,
        }
    }

    /// Wire up the proxy client, the built-in registry and the task context.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let llm: Arc<dyn LlmClient> = Arc::new(AiProxyClient::from_config(config)?);
        let registry = Arc::new(ToolRegistry::new()?);
        let context = TaskContext::from_config(config, llm.clone())?;
        let classifier = Classifier::new(
            llm,
            config.classifier_model.clone(),
            &registry,
            &context.data_root,
        );

        tracing::info!(tasks = registry.len(), "Task registry ready");
        Ok(Self::new(classifier, registry, context))
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn data_root(&self) -> &DataRoot {
        &self.context.data_root
    }

    /// Classify `text` and run the selected task.
    pub async fn run(&self, text: &str) -> Result<DispatchOutcome, DispatchError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(DispatchError::EmptyTask);
        }

        let classification = self.classifier.classify(text).await?;
        self.execute(classification).await
    }

    /// Resolve, decode and execute an already classified task.
    pub async fn execute(
        &self,
        classification: Classification,
    ) -> Result<DispatchOutcome, DispatchError> {
        let Classification { task, arguments } = classification;

        let definition = self
            .registry
            .lookup(&task)
            .ok_or_else(|| DispatchError::UnknownTask(task.clone()))?;

        let mut args = definition
            .schema()
            .decode(&arguments)
            .map_err(|source| DispatchError::Arguments {
                task: task.clone(),
                source,
            })?;
        args.confine_paths(&self.context.data_root)
            .map_err(|violation| DispatchError::Task {
                task: task.clone(),
                source: violation.into(),
            })?;

        tracing::info!(task = %task, "Executing task");
        let started = Instant::now();

        match definition.execute(args, &self.context).await {
            Ok(output) => {
                tracing::info!(
                    task = %task,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Task completed"
                );
                Ok(DispatchOutcome {
                    message: format!("Task `{}` executed successfully", task),
                    output: (!output.is_empty()).then_some(output),
                    task,
                })
            }
            Err(source) => {
                tracing::warn!(task = %task, error = %source, "Task failed");
                Err(DispatchError::Task { task, source })
            }
        }
    }
}
