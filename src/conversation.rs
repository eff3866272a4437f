//! Wire-shaped chat messages and the per-request conversation buffer.
//!
//! A `Conversation` is created for each inbound request, grows append-only
//! while the reasoning loop runs, and is discarded when the response has been
//! emitted. Nothing here survives across requests.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A message in the OpenAI chat-completions shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String, // "system", "user", "assistant", "tool"
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl Message {
    pub fn system(content: &str) -> Self {
        Self {
            role: "system".to_string(),
            content: Some(content.to_string()),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    pub fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: Some(content.to_string()),
            tool_call_id: None,
            tool_calls: None,
        }
    }
}

/// A single tool call as returned by the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "default_call_kind")]
    pub kind: String,
    pub function: ToolCallFunction,
}

fn default_call_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallFunction {
    pub name: String,
    /// JSON object encoded as a string, possibly empty.
    #[serde(default)]
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: &str, name: &str, arguments: &str) -> Self {
        Self {
            id: id.to_string(),
            kind: default_call_kind(),
            function: ToolCallFunction {
                name: name.to_string(),
                arguments: arguments.to_string(),
            },
        }
    }
}

/// Append-only message sequence for one request turn.
///
/// The first message is always the injected steering prompt; `trace()` strips
/// it so the prompt never leaves the process. Every assistant message that
/// carries tool calls must be followed by exactly one tool message per call,
/// in call order — the loop in `agent` maintains this, `tool_pairing_intact`
/// checks it.
#[derive(Debug)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    /// Start a conversation from the client's messages, with the steering
    /// prompt prepended as the first entry.
    pub fn with_steering(steering_prompt: &str, client_messages: Vec<Message>) -> Self {
        let mut messages = Vec::with_capacity(client_messages.len() + 1);
        messages.push(Message::system(steering_prompt));
        messages.extend(client_messages);
        Self { messages }
    }

    /// Append an assistant turn that requested tool calls.
    pub fn push_assistant_turn(&mut self, content: Option<String>, tool_calls: Vec<ToolCall>) {
        self.messages.push(Message {
            role: "assistant".to_string(),
            content,
            tool_call_id: None,
            tool_calls: Some(tool_calls),
        });
    }

    /// Append a plain-text assistant turn (the final answer).
    pub fn push_assistant_text(&mut self, content: Option<String>) {
        self.messages.push(Message {
            role: "assistant".to_string(),
            content,
            tool_call_id: None,
            tool_calls: None,
        });
    }

    /// Append the result of one tool call, keyed by the call id the model chose.
    pub fn push_tool_result(&mut self, tool_call_id: &str, content: String) {
        self.messages.push(Message {
            role: "tool".to_string(),
            content: Some(content),
            tool_call_id: Some(tool_call_id.to_string()),
            tool_calls: None,
        });
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The full sequence as JSON values for an upstream request body.
    pub fn wire_messages(&self) -> Vec<Value> {
        self.messages
            .iter()
            .map(|m| serde_json::to_value(m).unwrap_or(Value::Null))
            .collect()
    }

    /// The conversation minus the injected steering prompt, as emitted to the
    /// client in the trace field.
    pub fn trace(&self) -> Vec<Value> {
        self.messages
            .iter()
            .skip(1)
            .map(|m| serde_json::to_value(m).unwrap_or(Value::Null))
            .collect()
    }

    /// Whether every assistant message with k tool calls is followed by
    /// exactly k tool messages with matching ids, in order.
    pub fn tool_pairing_intact(&self) -> bool {
        let mut i = 0;
        while i < self.messages.len() {
            let msg = &self.messages[i];
            if msg.role == "assistant" {
                if let Some(calls) = &msg.tool_calls {
                    for (offset, call) in calls.iter().enumerate() {
                        match self.messages.get(i + 1 + offset) {
                            Some(follow)
                                if follow.role == "tool"
                                    && follow.tool_call_id.as_deref() == Some(&call.id) => {}
                            _ => return false,
                        }
                    }
                    i += calls.len();
                }
            } else if msg.role == "tool" {
                // A tool message not consumed by the assistant scan above is orphaned.
                return false;
            }
            i += 1;
        }
        true
    }
}
