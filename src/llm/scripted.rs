//! In-process [`LlmClient`] that replays canned responses.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use super::{ChatRequest, ChatResponse, FunctionCall, LlmClient, LlmError, ToolCall};

#[derive(Default)]
pub struct ScriptedLlm {
    responses: Mutex<VecDeque<Result<ChatResponse, LlmError>>>,
    embeddings: Mutex<Option<Vec<Vec<f32>>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response selecting `name` with `arguments` serialized as the model would.
    pub fn with_tool_call(self, name: &str, arguments: Value) -> Self {
        self.with_raw_tool_call(name, &arguments.to_string())
    }

    pub fn with_raw_tool_call(self, name: &str, arguments: &str) -> Self {
        self.with_response(ChatResponse {
            content: None,
            tool_calls: Some(vec![ToolCall {
                id: "call_0".to_string(),
                kind: "function".to_string(),
                function: FunctionCall {
                    name: name.to_string(),
                    arguments: arguments.to_string(),
                },
            }]),
        })
    }

    pub fn with_text(self, content: &str) -> Self {
        self.with_response(ChatResponse {
            content: Some(content.to_string()),
            tool_calls: None,
        })
    }

    pub fn with_response(self, response: ChatResponse) -> Self {
        self.responses.lock().unwrap().push_back(Ok(response));
        self
    }

    pub fn with_error(self, error: LlmError) -> Self {
        self.responses.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn with_embeddings(self, vectors: Vec<Vec<f32>>) -> Self {
        *self.embeddings.lock().unwrap() = Some(vectors);
        self
    }

    /// Every chat request received so far.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn chat_completion(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::InvalidResponse("no scripted response left".to_string())))
    }

    async fn embeddings(&self, _model: &str, input: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        let vectors = self
            .embeddings
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| LlmError::InvalidResponse("no scripted embeddings".to_string()))?;
        assert_eq!(vectors.len(), input.len(), "scripted embeddings must match input");
        Ok(vectors)
    }
}
