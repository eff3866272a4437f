//! The tool-augmented reasoning loop.
//!
//! Each inbound chat turn runs a bounded loop: call the upstream LLM with the
//! tool catalog, execute whatever tool calls come back, feed the results in,
//! repeat. The loop always runs buffered, because tool-call decisions need a
//! complete `tool_calls` field and a partial SSE stream cannot provide one.
//! Only the final turn is streamed, when the client asked for streaming.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::conversation::{Conversation, Message};
use crate::providers::{ChatBackend, UpstreamStream};
use crate::tools;

/// Upper bound on tool-advertising upstream calls per inbound request.
pub const MAX_ITERATIONS: usize = 10;

/// Injected as the first system message of every conversation and stripped
/// from everything the client sees. This text is a correctness-bearing
/// artifact: loosening it makes models fabricate host state. Wording changes
/// are prompt changes and need the same scrutiny as code.
pub(crate) const STEERING_PROMPT: &str = "\
You are an assistant running on a real host machine, not in a sandbox or a \
simulation. You have tools that observe this machine: the working directory, \
file listings, a project overview, the current time, disk usage, the \
operating system identity, the installed toolchain version, and git status.\n\
\n\
For any question that depends on the state of this machine (which directory \
you are in, which files exist, what time it is, what the git status is) you \
MUST call the matching tool and answer from its output. Never guess, assume, \
or fabricate host state. If a tool returns an error, report it or try a \
different tool; do not invent the missing information.\n\
\n\
Questions that do not depend on host state should be answered directly, \
without tools.";

/// Decoded client request for the chat-completions endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatTurnRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub temperature: Option<f64>,
}

/// What the loop hands to the response adapter.
pub enum FinalTurn {
    /// The upstream's final JSON verbatim, plus the realized conversation
    /// trace (steering prompt already stripped).
    Buffered { upstream: Value, trace: Vec<Value> },
    /// The final upstream SSE response, relayed opaquely.
    Streaming(UpstreamStream),
}

pub struct Orchestrator {
    backend: Arc<dyn ChatBackend>,
}

impl Orchestrator {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self { backend }
    }

    /// Run the reasoning loop for one inbound request.
    pub async fn run(&self, req: ChatTurnRequest) -> anyhow::Result<FinalTurn> {
        let ChatTurnRequest {
            model,
            messages,
            stream,
            temperature,
        } = req;

        let mut conversation = Conversation::with_steering(STEERING_PROMPT, messages);
        let tool_defs = tools::descriptors();

        for iteration in 0..MAX_ITERATIONS {
            let turn = self
                .backend
                .chat(&model, &conversation.wire_messages(), tool_defs, temperature)
                .await?;

            info!(
                iteration,
                model = %model,
                has_content = turn.content.is_some(),
                tool_calls = turn.tool_calls.len(),
                "LLM turn received"
            );

            if turn.tool_calls.is_empty() {
                // Model-decided finish.
                if stream {
                    return self.finish_streaming(&model, &conversation, temperature).await;
                }
                conversation.push_assistant_text(turn.content);
                return Ok(FinalTurn::Buffered {
                    upstream: turn.raw,
                    trace: conversation.trace(),
                });
            }

            // An empty content string alongside tool calls is normal — the
            // turn is appended unconditionally and every call is answered, in
            // the model's order, before the next upstream call.
            let calls = turn.tool_calls.clone();
            conversation.push_assistant_turn(turn.content, turn.tool_calls);
            for call in &calls {
                let args = parse_arguments(&call.function.arguments);
                let output = tools::exec::execute(&call.function.name, &args).await;
                conversation.push_tool_result(&call.id, output);
            }
        }

        // Forced finish: the model was still asking for tools at the cap.
        // One more call with no tools advertised elicits a plain-text answer.
        warn!(model = %model, "Iteration cap reached; forcing a text answer");
        if stream {
            return self.finish_streaming(&model, &conversation, temperature).await;
        }
        let turn = self
            .backend
            .chat(&model, &conversation.wire_messages(), &[], temperature)
            .await?;
        conversation.push_assistant_text(turn.content);
        Ok(FinalTurn::Buffered {
            upstream: turn.raw,
            trace: conversation.trace(),
        })
    }

    /// Final streamed turn: fresh `stream:true` call over the accumulated
    /// conversation, no tools advertised, body relayed untouched.
    async fn finish_streaming(
        &self,
        model: &str,
        conversation: &Conversation,
        temperature: Option<f64>,
    ) -> anyhow::Result<FinalTurn> {
        let stream = self
            .backend
            .chat_stream(model, &conversation.wire_messages(), temperature)
            .await?;
        Ok(FinalTurn::Streaming(stream))
    }
}

/// A tool call's `arguments` string parsed to a JSON object; anything that is
/// empty or not an object becomes the empty object.
fn parse_arguments(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Value::Object(map),
        _ => json!({}),
    }
}
