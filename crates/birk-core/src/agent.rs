// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use birk_config::AgentConfig;
use birk_model::{Message, ModelProvider};
use birk_tools::{parse_response, ToolCallError, ToolContext, ToolOutput, ToolRegistry};

use crate::{
    assembler::assemble,
    compact::ContextManager,
    conversation::ConversationMemory,
    events::{Event, EventBus, EventPayload},
    headless::retry_hint,
    prompts,
};

/// Injected into the error-context prompt section after a response without
/// a tool call.
const NO_TOOL_CALL_NOTE: &str =
    "Your previous response did not contain a tool call. You must end every \
     response with exactly one <tool> block. If the task is finished, call \
     task_completion.";

/// How a turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// A loop-breaking tool fired; carries its name and output text
    Finished { tool: String, output: String },
    /// Cooperative cancellation; the turn ended cleanly
    Cancelled,
    /// Too many consecutive responses without a usable tool call
    Stalled,
    /// The iteration cap or a headless limit stopped the turn
    CapReached,
}

/// The agent loop.  Owns the conversation and the in-flight event stream;
/// drives prompt → provider → parse → dispatch until a loop-breaking tool
/// fires or a terminal condition trips.
pub struct Agent {
    conversation: ConversationMemory,
    tools: Arc<ToolRegistry>,
    provider: Arc<dyn ModelProvider>,
    context_mgr: ContextManager,
    config: Arc<AgentConfig>,
    bus: EventBus,
    tool_ctx: ToolContext,
    headless: bool,
}

impl Agent {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        tools: Arc<ToolRegistry>,
        config: Arc<AgentConfig>,
        tool_ctx: ToolContext,
    ) -> Self {
        let window = provider.info().max_tokens;
        let context_mgr = ContextManager::new(
            Arc::clone(&provider),
            window,
            config.context_budget,
            config.summary_margin,
            config.keep_recent,
        );
        Self {
            conversation: ConversationMemory::new(),
            tools,
            provider,
            context_mgr,
            config,
            bus: EventBus::default(),
            tool_ctx,
            headless: false,
        }
    }

    /// Switch the loop into unattended mode: previews are never consulted
    /// and tool failures carry retry guidance.  The caller is responsible
    /// for registering the headless tool set (no ask_question/converse) and
    /// for placing a constraint handle into the tool context.
    pub fn headless(mut self) -> Self {
        self.headless = true;
        self
    }

    /// Use a distinct (usually cheaper) model for summarisation.
    pub fn with_summarizer(mut self, summarizer: Arc<dyn ModelProvider>) -> Self {
        self.context_mgr.set_summarizer(summarizer);
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    pub fn conversation(&self) -> &ConversationMemory {
        &self.conversation
    }

    pub fn conversation_mut(&mut self) -> &mut ConversationMemory {
        &mut self.conversation
    }

    /// Run one user turn to completion.
    pub async fn submit(&mut self, user_input: &str) -> anyhow::Result<TurnOutcome> {
        // Keep the sender alive for the whole turn so the receiver never
        // reads "closed" as a cancellation.
        let (_cancel_tx, cancel_rx) = oneshot::channel::<()>();
        self.submit_with_cancel(user_input, cancel_rx).await
    }

    /// Like [`submit`](Self::submit) but cancellable.
    ///
    /// Both an explicit `send(())` and a dropped sender count as
    /// cancellation.  Cancellation short-circuits every suspension point,
    /// emits a clean `TurnEnded`, and never appends a partial assistant
    /// message.
    pub async fn submit_with_cancel(
        &mut self,
        user_input: &str,
        mut cancel: oneshot::Receiver<()>,
    ) -> anyhow::Result<TurnOutcome> {
        // Already cancelled on entry: skip without touching history.
        if !matches!(cancel.try_recv(), Err(oneshot::error::TryRecvError::Empty)) {
            self.bus.emit(EventPayload::TurnEnded);
            return Ok(TurnOutcome::Cancelled);
        }

        self.bus.emit(EventPayload::BusyChanged(true));
        self.conversation.add(Message::user(user_input));
        let outcome = self.run_loop(&mut cancel).await;
        // TurnEnded is always the final event of a turn, on success, abort,
        // and cancellation alike.
        self.bus.emit(EventPayload::BusyChanged(false));
        self.bus.emit(EventPayload::TurnEnded);
        outcome
    }

    async fn run_loop(
        &mut self,
        cancel: &mut oneshot::Receiver<()>,
    ) -> anyhow::Result<TurnOutcome> {
        let mut iterations = 0u32;
        // Consecutive responses the loop could not act on (no tool call,
        // parse failure).  Reset on every successfully parsed call so a
        // long turn with occasional slips is not killed.
        let mut consecutive_failures = 0u32;
        let mut error_context: Option<String> = None;

        let window = self.provider.info().max_tokens;
        let budget = (window as f32 * self.config.context_budget) as usize;
        let provider_timeout = Duration::from_secs(self.config.provider_timeout_secs);
        let tool_timeout = Duration::from_secs(self.config.tool_timeout_secs);

        loop {
            // Cooperative cancel gate at the top of every iteration.
            if !matches!(cancel.try_recv(), Err(oneshot::error::TryRecvError::Empty)) {
                return Ok(TurnOutcome::Cancelled);
            }

            // Headless limits (token ceiling, wall clock) between iterations.
            if let Some(constraints) = &self.tool_ctx.constraints {
                if let Some(violation) = constraints.violation() {
                    warn!(%violation, "stopping turn");
                    self.bus.emit(EventPayload::Error(violation));
                    return Ok(TurnOutcome::CapReached);
                }
            }

            iterations += 1;
            if iterations > self.config.max_iterations {
                warn!(cap = self.config.max_iterations, "iteration cap reached");
                return Ok(TurnOutcome::CapReached);
            }

            // 1. Build the prompt from the current transcript.
            let schemas = self.tools.visible_schemas(&self.tool_ctx);
            let system = prompts::system_prompt(
                &schemas,
                self.config.custom_instructions.as_deref(),
                error_context.as_deref(),
            );
            let mut prompt = prompts::build_turn(&system, self.conversation.messages(), None);
            let mut prompt_tokens = approx_prompt_tokens(&prompt);

            // 2. Token budget gate: summarise, rebuild, recount.
            if prompt_tokens > budget {
                match self
                    .context_mgr
                    .evaluate_and_summarize(&mut self.conversation, prompt_tokens)
                    .await
                {
                    Ok(0) => {}
                    Ok(n) => {
                        debug!(summarized = n, "conversation prefix summarised");
                        prompt = prompts::build_turn(&system, self.conversation.messages(), None);
                        prompt_tokens = approx_prompt_tokens(&prompt);
                    }
                    Err(e) => {
                        warn!(error = %e, "summarisation failed; continuing uncompacted");
                    }
                }
            }

            // 3. Request the stream.
            self.bus
                .emit(EventPayload::ApiCallStarted { prompt_tokens, budget });
            let mut stream = tokio::select! {
                biased;
                _ = &mut *cancel => {
                    return Ok(TurnOutcome::Cancelled);
                }
                res = tokio::time::timeout(
                    provider_timeout,
                    self.provider.stream_completion(prompt),
                ) => match res {
                    Err(_) => {
                        self.bus.emit(EventPayload::Error("TimeoutError: provider request".into()));
                        anyhow::bail!("provider request timed out");
                    }
                    Ok(Err(e)) => {
                        self.bus.emit(EventPayload::Error(format!("provider request failed: {e}")));
                        return Err(e).context("provider request failed");
                    }
                    Ok(Ok(stream)) => stream,
                },
            };

            // 4. Assemble, re-emitting region events.
            let assembled = tokio::select! {
                biased;
                _ = &mut *cancel => {
                    // No partial assistant message is appended on cancel.
                    return Ok(TurnOutcome::Cancelled);
                }
                res = tokio::time::timeout(provider_timeout, assemble(&mut stream, &self.bus)) => {
                    match res {
                        Err(_) => {
                            self.bus.emit(EventPayload::Error("TimeoutError: provider stream".into()));
                            anyhow::bail!("provider stream timed out");
                        }
                        // The assembler already emitted the error event.
                        Ok(Err(e)) => return Err(e),
                        Ok(Ok(assembled)) => assembled,
                    }
                }
            };
            self.bus.emit(EventPayload::ApiCallEnded);

            // 5. Usage accounting, then commit the assistant message with
            //    the tool markup preserved inline.
            if let Some(usage) = assembled.usage {
                if let Some(constraints) = &self.tool_ctx.constraints {
                    constraints.record_completion_tokens(usage.completion_tokens as u64);
                }
                self.bus.emit(EventPayload::TokenUsage {
                    prompt: usage.prompt_tokens,
                    completion: usage.completion_tokens,
                    total: usage.total(),
                });
            }

            if assembled.errored {
                // Stream died mid-response; the partial regions are not
                // committed to the transcript.
                anyhow::bail!("provider stream errored mid-response");
            }

            let assistant_text = format!("{}{}", assembled.message, assembled.tool_call);
            if !assistant_text.is_empty() {
                self.conversation.add(Message::assistant(assistant_text.clone()));
            }

            // 6. Parse and dispatch.
            let parsed = match parse_response(&assistant_text) {
                Ok(parsed) => parsed,
                Err(e) => {
                    consecutive_failures += 1;
                    self.bus.emit(EventPayload::ToolError {
                        name: String::new(),
                        error: e.to_string(),
                    });
                    if consecutive_failures >= self.config.max_no_tool_failures {
                        return Ok(TurnOutcome::Stalled);
                    }
                    self.conversation.add(Message::tool(parse_failure_note(&e)));
                    error_context = Some(format!("Your previous tool call failed to parse: {e}"));
                    continue;
                }
            };

            let Some(call) = parsed.call else {
                consecutive_failures += 1;
                self.bus.emit(EventPayload::NoToolCall);
                if consecutive_failures >= self.config.max_no_tool_failures {
                    return Ok(TurnOutcome::Stalled);
                }
                error_context = Some(NO_TOOL_CALL_NOTE.to_string());
                continue;
            };
            consecutive_failures = 0;
            error_context = None;

            if !self.tools.contains(&call.name) {
                self.bus.emit(EventPayload::ToolError {
                    name: call.name.clone(),
                    error: "unknown tool".into(),
                });
                let mut text = format!("Tool '{}' error: unknown tool", call.name);
                if self.headless {
                    text.push('\n');
                    text.push_str(&retry_hint(&call.name, "unknown tool"));
                }
                self.conversation
                    .add(Message::tool(text).with_meta("tool", call.name.clone()));
                continue;
            }

            // Attach the approval preview (if any) to the tool-call event;
            // deciding on it is the embedding UI's job.  Headless runs
            // auto-approve by never consulting it.
            let mut call_event = Event::new(EventPayload::ToolCall {
                server: call.server.clone(),
                name: call.name.clone(),
            });
            if !self.headless {
                if let Some(preview) = self
                    .tools
                    .get(&call.name)
                    .and_then(|t| t.generate_preview(&call.args))
                {
                    call_event = call_event
                        .with_meta("preview_title", preview.title)
                        .with_meta("preview", preview.body);
                }
            }
            self.bus.emit_event(call_event);

            let output = tokio::select! {
                biased;
                _ = &mut *cancel => {
                    return Ok(TurnOutcome::Cancelled);
                }
                res = tokio::time::timeout(
                    tool_timeout,
                    self.tools.execute(&self.tool_ctx, &call),
                ) => match res {
                    Err(_) => {
                        self.bus.emit(EventPayload::Error(format!(
                            "TimeoutError: tool '{}'", call.name
                        )));
                        ToolOutput::err(format!(
                            "timed out after {}s", self.config.tool_timeout_secs
                        ))
                    }
                    Ok(output) => output,
                },
            };

            if output.is_error {
                self.bus.emit(EventPayload::ToolError {
                    name: call.name.clone(),
                    error: output.content.clone(),
                });
                let mut text = format!("Tool '{}' error: {}", call.name, output.content);
                if self.headless {
                    text.push('\n');
                    text.push_str(&retry_hint(&call.name, &output.content));
                }
                self.conversation
                    .add(Message::tool(text).with_meta("tool", call.name.clone()));
                continue;
            }

            self.bus.emit(EventPayload::ToolResult {
                name: call.name.clone(),
                output: output.content.clone(),
            });
            let stored = truncate_result(&output.content, self.config.tool_result_char_cap);
            self.conversation
                .add(Message::tool(stored).with_meta("tool", call.name.clone()));

            if self.tools.is_loop_breaking(&call.name) {
                debug!(tool = %call.name, iterations, "loop-breaking tool fired");
                return Ok(TurnOutcome::Finished {
                    tool: call.name,
                    output: output.content,
                });
            }
        }
    }
}

fn approx_prompt_tokens(messages: &[Message]) -> usize {
    messages.iter().map(|m| m.approx_tokens()).sum()
}

fn parse_failure_note(err: &ToolCallError) -> String {
    match err {
        ToolCallError::OversizeInput(_) => format!(
            "Tool call error: {err}. Produce a far smaller tool call; move \
             bulk content into multiple steps."
        ),
        ToolCallError::MissingToolName => format!(
            "Tool call error: {err}. The <tool> block must contain a \
             non-empty <tool_name> element."
        ),
        ToolCallError::Malformed(_) => format!(
            "Tool call error: {err}. Emit exactly one well-formed <tool> \
             block: <tool><tool_name>NAME</tool_name><arguments>...\
             </arguments></tool>."
        ),
    }
}

/// Cap a tool result before it enters the transcript, cutting at a line
/// boundary with an explicit omission notice.  `cap_chars == 0` disables
/// the cap.
fn truncate_result(content: &str, cap_chars: usize) -> String {
    if cap_chars == 0 || content.len() <= cap_chars {
        return content.to_string();
    }
    let mut cap = cap_chars.min(content.len());
    while !content.is_char_boundary(cap) {
        cap -= 1;
    }
    let cut = content[..cap].rfind('\n').map(|p| p + 1).unwrap_or(cap);
    let omitted = content.len() - cut;
    format!(
        "{}\n[... {omitted} bytes omitted; output truncated to fit the context budget ...]",
        &content[..cut]
    )
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_result_short_content_unchanged() {
        assert_eq!(truncate_result("short", 100), "short");
    }

    #[test]
    fn truncate_result_zero_cap_disables() {
        let long = "x".repeat(1000);
        assert_eq!(truncate_result(&long, 0), long);
    }

    #[test]
    fn truncate_result_cuts_at_line_boundary_with_notice() {
        let content = "line one\nline two\nline three";
        let out = truncate_result(content, 12);
        assert!(out.starts_with("line one\n"));
        assert!(!out.contains("line two"));
        assert!(out.contains("omitted"));
    }

    #[test]
    fn truncate_result_respects_char_boundaries() {
        let content = "ääääää";
        let out = truncate_result(content, 7);
        assert!(out.contains("omitted"));
    }

    #[test]
    fn parse_failure_notes_carry_hints() {
        assert!(parse_failure_note(&ToolCallError::MissingToolName).contains("<tool_name>"));
        assert!(parse_failure_note(&ToolCallError::Malformed("x".into())).contains("well-formed"));
        assert!(parse_failure_note(&ToolCallError::OversizeInput(99)).contains("smaller"));
    }
}
