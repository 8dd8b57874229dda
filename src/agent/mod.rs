pub mod tools;

use tracing::{debug, info, warn};

use crate::gateway::ChatGateway;
use crate::model::{ChatReply, ChatRequest, ToolCall, ToolExchange, ToolResult};
use crate::providers::ProviderError;
use tools::ToolRunner;

const MAX_TOOL_ROUNDS: usize = 4;
pub const DECLINED_TOOL_RESULT: &str =
    "The tool call was not successful. Please try again or ask for instructions!";

/// Runs one chat turn, resolving tool calls until the model answers in text.
pub struct Agent<'a, G: ?Sized> {
    gateway: &'a G,
    runner: &'a dyn ToolRunner,
    approve: &'a mut dyn FnMut(&ToolCall) -> bool,
}

impl<'a, G> Agent<'a, G>
where
    G: ChatGateway + ?Sized,
{
    pub fn new(
        gateway: &'a G,
        runner: &'a dyn ToolRunner,
        approve: &'a mut dyn FnMut(&ToolCall) -> bool,
    ) -> Self {
        Self {
            gateway,
            runner,
            approve,
        }
    }

    pub async fn run_turn(&mut self, mut request: ChatRequest) -> Result<ChatReply, ProviderError> {
        let mut token_count = 0;

        for round in 0..=MAX_TOOL_ROUNDS {
            let reply = self.gateway.chat(&request).await?;
            token_count += reply.token_count;

            if reply.tool_calls.is_empty() {
                return Ok(ChatReply {
                    token_count,
                    ..reply
                });
            }
            if round == MAX_TOOL_ROUNDS {
                break;
            }

            debug!(
                round,
                tool_calls = reply.tool_calls.len(),
                "model requested tool calls"
            );
            let assistant = reply.echo.ok_or_else(|| {
                ProviderError::response(request.provider, "tool calls without an assistant message")
            })?;

            let mut results = Vec::with_capacity(reply.tool_calls.len());
            for call in &reply.tool_calls {
                results.push(ToolResult {
                    call_id: call.id.clone(),
                    content: self.run_tool(call).await,
                });
            }
            request.exchanges.push(ToolExchange { assistant, results });
        }

        warn!(max_rounds = MAX_TOOL_ROUNDS, "tool round limit reached");
        Err(ProviderError::response(
            request.provider,
            format!("model still requested tools after {MAX_TOOL_ROUNDS} rounds"),
        ))
    }

    async fn run_tool(&mut self, call: &ToolCall) -> String {
        if !(self.approve)(call) {
            info!(tool_name = %call.name, "tool call declined");
            return DECLINED_TOOL_RESULT.to_string();
        }

        match self.runner.execute(call).await {
            Ok(output) => output.content,
            Err(err) => format!("ERROR: {err}"),
        }
    }
}
