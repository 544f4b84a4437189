//! Task registry and the operations it dispatches to.
//!
//! Every operation implements [`Tool`]: a stable name, an LLM-facing
//! description, a typed argument schema, and an async `execute`. The
//! [`ToolRegistry`] is built once at startup and is read-only afterwards.

mod data_root;
mod datagen;
mod files;
mod git;
mod media;
mod process;
mod schema;
mod sql;
mod tabular;
mod vision;
mod web;

pub use data_root::{DataRoot, PathViolation};
pub use schema::{ArgSchema, ArgumentError, DecodedArgs, Param, ParamKind, SchemaError};

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::config::{Config, DEFAULT_DATAGEN_SCRIPT_URL};
use crate::llm::{LlmClient, LlmError, ToolSchema};

/// Shared resources handed to every task.
#[derive(Clone)]
pub struct TaskContext {
    pub data_root: DataRoot,
    pub llm: Arc<dyn LlmClient>,
    pub http: reqwest::Client,
    /// Chat model for vision extraction
    pub chat_model: String,
    pub embedding_model: String,
    pub command_timeout: Duration,
    pub datagen_script_url: String,
}

impl TaskContext {
    pub fn new(data_root: DataRoot, llm: Arc<dyn LlmClient>) -> Self {
        Self {
            data_root,
            llm,
            http: reqwest::Client::new(),
            chat_model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            command_timeout: Duration::from_secs(120),
            datagen_script_url: DEFAULT_DATAGEN_SCRIPT_URL.to_string(),
        }
    }

    pub fn from_config(config: &Config, llm: Arc<dyn LlmClient>) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent("Mozilla/5.0 (compatible; AutomationAgent/1.0)")
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            data_root: DataRoot::new(&config.data_root),
            llm,
            http,
            chat_model: config.classifier_model.clone(),
            embedding_model: config.embedding_model.clone(),
            command_timeout: config.command_timeout,
            datagen_script_url: config.datagen_script_url.clone(),
        })
    }
}

/// Failure of a task while executing.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    PathNotAllowed(#[from] PathViolation),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid input data: {0}")]
    InvalidData(String),

    #[error("unsupported input: {0}")]
    Unsupported(String),

    #[error("remote request failed: {0}")]
    Upstream(String),

    #[error("command failed: {0}")]
    Command(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("model service error: {0}")]
    Model(#[from] LlmError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl TaskError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

impl From<serde_json::Error> for TaskError {
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidArguments(e.to_string())
    }
}

impl From<tokio::task::JoinError> for TaskError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Internal(e.to_string())
    }
}

/// A single registered operation.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// Documentation shown to the model when it picks a task.
    fn description(&self) -> &str;

    fn parameters(&self) -> Vec<Param>;

    /// Run the task. Path arguments are already confined to the data root.
    async fn execute(&self, args: DecodedArgs, ctx: &TaskContext) -> Result<String, TaskError>;
}

/// A tool together with its compiled schema.
pub struct TaskDefinition {
    tool: Arc<dyn Tool>,
    schema: ArgSchema,
}

impl TaskDefinition {
    pub fn name(&self) -> &str {
        self.tool.name()
    }

    pub fn description(&self) -> &str {
        self.tool.description()
    }

    pub fn schema(&self) -> &ArgSchema {
        &self.schema
    }

    pub fn tool_schema(&self) -> ToolSchema {
        ToolSchema::function(self.name(), self.description(), self.schema.to_json_schema())
    }

    pub async fn execute(&self, args: DecodedArgs, ctx: &TaskContext) -> Result<String, TaskError> {
        self.tool.execute(args, ctx).await
    }
}

/// Name and description of a registered task.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("task `{0}` is registered twice")]
    DuplicateTask(String),

    #[error("task `{task}` has an invalid schema: {source}")]
    InvalidSchema {
        task: String,
        #[source]
        source: SchemaError,
    },
}

/// Read-only lookup table from task identifier to definition.
pub struct ToolRegistry {
    tasks: HashMap<String, TaskDefinition>,
    order: Vec<String>,
}

impl ToolRegistry {
    /// Registry with every built-in task.
    pub fn new() -> Result<Self, RegistryError> {
        Self::from_tools(builtin_tools())
    }

    /// Compile every tool's schema and reject duplicate names.
    pub fn from_tools(tools: Vec<Arc<dyn Tool>>) -> Result<Self, RegistryError> {
        let mut tasks = HashMap::with_capacity(tools.len());
        let mut order = Vec::with_capacity(tools.len());

        for tool in tools {
            let name = tool.name().to_string();
            if tasks.contains_key(&name) {
                return Err(RegistryError::DuplicateTask(name));
            }
            let schema = ArgSchema::compile(tool.parameters()).map_err(|source| {
                RegistryError::InvalidSchema {
                    task: name.clone(),
                    source,
                }
            })?;
            order.push(name.clone());
            tasks.insert(name, TaskDefinition { tool, schema });
        }

        Ok(Self { tasks, order })
    }

    pub fn lookup(&self, name: &str) -> Option<&TaskDefinition> {
        self.tasks.get(name)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Definitions in registration order.
    pub fn definitions(&self) -> impl Iterator<Item = &TaskDefinition> {
        self.order.iter().filter_map(|name| self.tasks.get(name))
    }

    pub fn list_tools(&self) -> Vec<ToolInfo> {
        self.definitions()
            .map(|d| ToolInfo {
                name: d.name().to_string(),
                description: d.description().to_string(),
            })
            .collect()
    }

    /// Tool declarations for the model, in registration order.
    pub fn get_tool_schemas(&self) -> Vec<ToolSchema> {
        self.definitions().map(TaskDefinition::tool_schema).collect()
    }
}

fn builtin_tools() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(datagen::GenerateData),
        Arc::new(datagen::FormatMarkdown),
        Arc::new(files::CountWeekdays),
        Arc::new(files::SortContacts),
        Arc::new(files::RecentLogLines),
        Arc::new(files::IndexMarkdownDocs),
        Arc::new(files::ExtractEmailSender),
        Arc::new(vision::ExtractCreditCard),
        Arc::new(vision::SimilarComments),
        Arc::new(sql::TicketSales),
        Arc::new(web::FetchUrl),
        Arc::new(git::GitCommit),
        Arc::new(sql::RunSqlQuery),
        Arc::new(web::ScrapeWebsite),
        Arc::new(media::ProcessImage),
        Arc::new(media::MarkdownToHtml),
        Arc::new(tabular::FilterCsv),
    ]
}

/// Read a UTF-8 file, naming it in the error.
pub(crate) async fn read_text(path: &Path) -> Result<String, TaskError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| TaskError::io(format!("Failed to read {}", path.display()), e))
}

/// Write `contents`, creating missing parent directories.
pub(crate) async fn write_output(path: &Path, contents: impl AsRef<[u8]>) -> Result<(), TaskError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| TaskError::io(format!("Failed to create {}", parent.display()), e))?;
    }
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| TaskError::io(format!("Failed to write {}", path.display()), e))?;
    tracing::debug!(path = %path.display(), "Wrote task output");
    Ok(())
}
