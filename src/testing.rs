//! Test infrastructure: a scripted mock of the upstream chat backend.
//!
//! Lets orchestrator and server tests exercise the real loop, real tool
//! execution, and real response adaptation without a network.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::conversation::ToolCall;
use crate::providers::{BufferedTurn, ChatBackend, UpstreamStream};

/// A recorded buffered call.
#[derive(Debug, Clone)]
pub struct MockChatCall {
    pub model: String,
    pub messages: Vec<Value>,
    pub tools: Vec<Value>,
    pub temperature: Option<f64>,
}

/// A recorded streaming call.
#[derive(Debug, Clone)]
pub struct MockStreamCall {
    pub model: String,
    pub messages: Vec<Value>,
    pub temperature: Option<f64>,
}

/// Upstream backend that returns scripted turns in FIFO order and records
/// every call it receives.
pub struct MockBackend {
    turns: Mutex<Vec<BufferedTurn>>,
    failure: Option<(u16, String)>,
    pub chat_log: Mutex<Vec<MockChatCall>>,
    pub stream_log: Mutex<Vec<MockStreamCall>>,
    pub stream_payload: Vec<&'static str>,
}

impl MockBackend {
    pub fn with_turns(turns: Vec<BufferedTurn>) -> Self {
        Self {
            turns: Mutex::new(turns),
            failure: None,
            chat_log: Mutex::new(Vec::new()),
            stream_log: Mutex::new(Vec::new()),
            stream_payload: vec![
                "data: {\"choices\":[{\"delta\":{\"content\":\"mock\"}}]}\n\n",
                "data: [DONE]\n\n",
            ],
        }
    }

    /// A backend whose every call fails with the given upstream status/body.
    pub fn failing(status: u16, body: &str) -> Self {
        let mut mock = Self::with_turns(Vec::new());
        mock.failure = Some((status, body.to_string()));
        mock
    }

    /// A text-only assistant turn, with a realistic raw body.
    pub fn text_turn(text: &str) -> BufferedTurn {
        let raw = json!({
            "id": "chatcmpl-mock",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": text},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 4, "total_tokens": 16}
        });
        BufferedTurn {
            content: Some(text.to_string()),
            tool_calls: Vec::new(),
            raw,
        }
    }

    /// An assistant turn requesting the given `(id, name, arguments)` calls.
    pub fn tool_call_turn(calls: &[(&str, &str, &str)]) -> BufferedTurn {
        let tool_calls: Vec<ToolCall> = calls
            .iter()
            .map(|(id, name, args)| ToolCall::new(id, name, args))
            .collect();
        let raw = json!({
            "id": "chatcmpl-mock",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": &tool_calls,
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 9, "total_tokens": 21}
        });
        BufferedTurn {
            content: None,
            tool_calls,
            raw,
        }
    }
}

#[async_trait]
impl ChatBackend for MockBackend {
    async fn chat(
        &self,
        model: &str,
        messages: &[Value],
        tools: &[Value],
        temperature: Option<f64>,
    ) -> anyhow::Result<BufferedTurn> {
        self.chat_log.lock().await.push(MockChatCall {
            model: model.to_string(),
            messages: messages.to_vec(),
            tools: tools.to_vec(),
            temperature,
        });

        if let Some((status, body)) = &self.failure {
            return Err(crate::providers::UpstreamError::from_status(*status, body).into());
        }

        let mut turns = self.turns.lock().await;
        if turns.is_empty() {
            Ok(MockBackend::text_turn("mock answer"))
        } else {
            Ok(turns.remove(0))
        }
    }

    async fn chat_stream(
        &self,
        model: &str,
        messages: &[Value],
        temperature: Option<f64>,
    ) -> anyhow::Result<UpstreamStream> {
        self.stream_log.lock().await.push(MockStreamCall {
            model: model.to_string(),
            messages: messages.to_vec(),
            temperature,
        });

        if let Some((status, body)) = &self.failure {
            return Err(crate::providers::UpstreamError::from_status(*status, body).into());
        }

        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("text/event-stream"));

        let chunks: Vec<Result<Bytes, Box<dyn std::error::Error + Send + Sync>>> = self
            .stream_payload
            .iter()
            .map(|chunk| Ok(Bytes::from_static(chunk.as_bytes())))
            .collect();

        Ok(UpstreamStream {
            status: 200,
            headers,
            body: futures::stream::iter(chunks).boxed(),
        })
    }
}
