//! Tool-calling classification of free-text tasks.

use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;

use super::prompt::build_system_prompt;
use crate::llm::{ChatMessage, ChatRequest, LlmClient, LlmError, ToolCall, ToolChoice, ToolSchema};
use crate::tools::{DataRoot, ToolRegistry};

/// The task the model picked and its raw, undecoded arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub task: String,
    pub arguments: Map<String, Value>,
}

#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error("classifier unavailable: {0}")]
    Unavailable(#[from] LlmError),

    #[error("the model did not select a task")]
    NoSelection,

    #[error("the model selected {0} tasks, expected exactly one")]
    AmbiguousSelection(usize),

    #[error("arguments for `{task}` are not a JSON object: {reason}")]
    MalformedArguments { task: String, reason: String },
}

impl ClassificationError {
    /// True when the model service itself failed, as opposed to the input
    /// being unclassifiable.
    pub fn is_dependency_failure(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Asks the model to pick one registered task for a piece of text.
pub struct Classifier {
    llm: Arc<dyn LlmClient>,
    model: String,
    system_prompt: String,
    tools: Vec<ToolSchema>,
}

impl Classifier {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        model: impl Into<String>,
        registry: &ToolRegistry,
        data_root: &DataRoot,
    ) -> Self {
        Self {
            llm,
            model: model.into(),
            system_prompt: build_system_prompt(data_root, registry),
            tools: registry.get_tool_schemas(),
        }
    }

    pub async fn classify(&self, text: &str) -> Result<Classification, ClassificationError> {
        let mut request = ChatRequest::new(
            self.model.clone(),
            vec![
                ChatMessage::system(self.system_prompt.clone()),
                ChatMessage::user(text),
            ],
        );
        request.tools = Some(self.tools.clone());
        request.tool_choice = Some(ToolChoice::Required);
        request.parallel_tool_calls = Some(false);
        request.temperature = Some(0.0);

        let response = self.llm.chat_completion(&request).await?;
        let calls = response.tool_calls.unwrap_or_default();

        let call = match calls.as_slice() {
            [] => {
                tracing::warn!(reply = ?response.content, "Model replied without selecting a task");
                return Err(ClassificationError::NoSelection);
            }
            [call] => call,
            many => return Err(ClassificationError::AmbiguousSelection(many.len())),
        };

        let classification = parse_call(call)?;
        let arguments = serde_json::Value::Object(classification.arguments.clone());
        tracing::debug!(
            task = %classification.task,
            arguments = %arguments,
            "Classified task"
        );
        Ok(classification)
    }
}

fn parse_call(call: &ToolCall) -> Result<Classification, ClassificationError> {
    let task = call.function.name.clone();
    let raw = call.function.arguments.trim();

    // Some models send an empty string for a call without arguments.
    let arguments = if raw.is_empty() {
        Map::new()
    } else {
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                return Err(ClassificationError::MalformedArguments {
                    task,
                    reason: format!("got {}", json_kind(&other)),
                })
            }
            Err(e) => {
                return Err(ClassificationError::MalformedArguments {
                    task,
                    reason: e.to_string(),
                })
            }
        }
    };

    Ok(Classification { task, arguments })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::scripted::ScriptedLlm;
    use crate::llm::{ChatResponse, FunctionCall, MessageContent};
    use serde_json::json;

    fn classifier(llm: Arc<ScriptedLlm>) -> Classifier {
        let registry = ToolRegistry::new().unwrap();
        Classifier::new(llm, "gpt-4o-mini", &registry, &DataRoot::new("/data"))
    }

    fn call(name: &str, arguments: &str) -> ToolCall {
        ToolCall {
            id: format!("call_{}", name),
            kind: "function".to_string(),
            function: FunctionCall {
                name: name.to_string(),
                arguments: arguments.to_string(),
            },
        }
    }

    #[tokio::test]
    async fn request_offers_every_task_and_requires_one_call() {
        let llm = Arc::new(ScriptedLlm::new().with_tool_call(
            "sort_contacts",
            json!({"input_file": "/data/contacts.json"}),
        ));
        let classifier = classifier(llm.clone());

        let result = classifier.classify("Sort the contacts").await.unwrap();
        assert_eq!(result.task, "sort_contacts");
        assert_eq!(result.arguments["input_file"], "/data/contacts.json");

        let requests = llm.requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.model, "gpt-4o-mini");
        assert_eq!(request.tools.as_ref().map(Vec::len), Some(17));
        assert_eq!(request.tool_choice, Some(ToolChoice::Required));
        assert_eq!(request.parallel_tool_calls, Some(false));
        match &request.messages[1].content {
            Some(MessageContent::Text(text)) => assert_eq!(text, "Sort the contacts"),
            other => panic!("unexpected user content {:?}", other),
        }
    }

    #[tokio::test]
    async fn empty_arguments_become_an_empty_object() {
        let llm = Arc::new(ScriptedLlm::new().with_raw_tool_call("ticket_sales", ""));
        let result = classifier(llm).classify("gold ticket sales").await.unwrap();
        assert_eq!(result.task, "ticket_sales");
        assert!(result.arguments.is_empty());
    }

    #[tokio::test]
    async fn prose_reply_is_no_selection() {
        let llm = Arc::new(ScriptedLlm::new().with_text("I am not sure what you mean."));
        let err = classifier(llm).classify("hello").await.unwrap_err();
        assert!(matches!(err, ClassificationError::NoSelection));
        assert!(!err.is_dependency_failure());
    }

    #[tokio::test]
    async fn several_calls_are_ambiguous() {
        let llm = Arc::new(ScriptedLlm::new().with_response(ChatResponse {
            content: None,
            tool_calls: Some(vec![call("sort_contacts", "{}"), call("ticket_sales", "{}")]),
        }));
        let err = classifier(llm).classify("do both").await.unwrap_err();
        assert!(matches!(err, ClassificationError::AmbiguousSelection(2)));
    }

    #[tokio::test]
    async fn non_object_arguments_are_malformed() {
        let llm = Arc::new(ScriptedLlm::new().with_raw_tool_call("ticket_sales", "[1, 2]"));
        let err = classifier(llm).classify("x").await.unwrap_err();
        assert!(matches!(
            err,
            ClassificationError::MalformedArguments { ref task, .. } if task == "ticket_sales"
        ));

        let llm = Arc::new(ScriptedLlm::new().with_raw_tool_call("ticket_sales", "{not json"));
        let err = classifier(llm).classify("x").await.unwrap_err();
        assert!(matches!(err, ClassificationError::MalformedArguments { .. }));
    }

    #[tokio::test]
    async fn service_failure_is_a_dependency_failure() {
        let llm = Arc::new(ScriptedLlm::new().with_error(LlmError::Timeout));
        let err = classifier(llm).classify("x").await.unwrap_err();
        assert!(err.is_dependency_failure());
    }
}
