use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_stream::try_stream;
use async_trait::async_trait;
use futures::stream::BoxStream;
use tracing::{debug, info, warn};

use crate::{
    truncate_chars, AgentError, AgentMessage, AgentToolCall, AgentUpdate, ArcadeError,
    AuthorizationResponse, Checkpoint, Checkpointer, Interrupt, InterruptId, InterruptPayload,
    ModelError, Resume, SessionConfig, ToolSpec, TurnInput,
};

pub(crate) const MODEL_NODE: &str = "model";
pub(crate) const TOOLS_NODE: &str = "tools";

/// A conversational agent that can suspend itself mid-turn.
///
/// Each call consumes one turn input and yields updates lazily. A stream that
/// ends with an [`AgentUpdate::Interrupts`] batch expects the next call to
/// carry a [`TurnInput::Resume`] answering every interrupt in it.
pub(crate) trait Agent: Send + Sync {
    fn stream<'a>(
        &'a self,
        input: TurnInput,
        session: &'a SessionConfig,
    ) -> BoxStream<'a, Result<AgentUpdate, AgentError>>;
}

#[derive(Debug, Clone)]
pub(crate) struct ChatRequest {
    pub(crate) model: String,
    pub(crate) messages: Vec<AgentMessage>,
    pub(crate) tools: Vec<serde_json::Value>,
}

#[async_trait]
pub(crate) trait ChatModel: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<AgentMessage, ModelError>;
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ToolOutcome {
    pub(crate) output: String,
    pub(crate) is_error: bool,
}

/// Remote side of tool calls: per-user authorization and execution.
#[async_trait]
pub(crate) trait ToolGateway: Send + Sync {
    async fn authorize(
        &self,
        tool_name: &str,
        user_id: &str,
    ) -> Result<AuthorizationResponse, ArcadeError>;

    async fn execute(
        &self,
        tool_name: &str,
        input: &serde_json::Value,
        user_id: &str,
    ) -> Result<ToolOutcome, ArcadeError>;
}

pub(crate) trait AgentHooks: Send + Sync {
    fn on_start(&self, _agent: &str) {}
    fn on_end(&self, _agent: &str) {}
    fn on_tool_start(&self, _agent: &str, _tool: &str) {}
    fn on_tool_end(&self, _agent: &str, _tool: &str, _is_error: bool) {}
}

/// Lifecycle hooks that log through `tracing` with a running event number.
#[derive(Default)]
pub(crate) struct TracingHooks {
    event_counter: AtomicUsize,
}

impl TracingHooks {
    fn next(&self) -> usize {
        self.event_counter.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl AgentHooks for TracingHooks {
    fn on_start(&self, agent: &str) {
        info!(event = self.next(), agent, "agent started");
    }

    fn on_end(&self, agent: &str) {
        info!(event = self.next(), agent, "agent ended");
    }

    fn on_tool_start(&self, agent: &str, tool: &str) {
        info!(event = self.next(), agent, tool, "tool started");
    }

    fn on_tool_end(&self, agent: &str, tool: &str, is_error: bool) {
        info!(event = self.next(), agent, tool, is_error, "tool ended");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    Authorization,
    Approval,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Denial {
    Authorization,
    Rejected,
    Cancelled,
}

impl Denial {
    fn message(self, tool: &str) -> String {
        match self {
            Denial::Authorization => {
                format!("Authorization for {tool} was not granted, so the tool did not run.")
            }
            Denial::Rejected => format!(
                "The user declined the call to {tool}; it was not run. Ask what they would like to do instead."
            ),
            Denial::Cancelled => format!("The call to {tool} was cancelled before it could run."),
        }
    }
}

#[derive(Debug, Clone)]
struct PendingCall {
    call: AgentToolCall,
    authorized: bool,
    approved: bool,
    denial: Option<Denial>,
    waiting: Option<(InterruptId, Gate)>,
}

/// Tool calls from one model reply that have not run yet.
#[derive(Debug, Clone, Default)]
pub(crate) struct PendingToolCalls {
    calls: Vec<PendingCall>,
}

impl PendingToolCalls {
    pub(crate) fn new(calls: Vec<AgentToolCall>) -> Self {
        Self {
            calls: calls
                .into_iter()
                .map(|call| PendingCall {
                    call,
                    authorized: false,
                    approved: false,
                    denial: None,
                    waiting: None,
                })
                .collect(),
        }
    }

    pub(crate) fn waiting_ids(&self) -> Vec<InterruptId> {
        self.calls
            .iter()
            .filter_map(|c| c.waiting.as_ref().map(|(id, _)| id.clone()))
            .collect()
    }

    /// Apply decisions by interrupt id. Nothing changes unless the decisions
    /// answer exactly the waiting interrupts.
    pub(crate) fn apply(&mut self, resume: Resume) -> Result<(), AgentError> {
        let decisions = resume.into_decisions();
        let waiting = self.waiting_ids();
        if decisions.len() != waiting.len() {
            return Err(AgentError::ResumeCount {
                expected: waiting.len(),
                got: decisions.len(),
            });
        }
        let mut answers: HashMap<InterruptId, bool> = HashMap::new();
        for decision in decisions {
            if !waiting.contains(&decision.interrupt_id) {
                return Err(AgentError::ResumeMismatch(decision.interrupt_id));
            }
            answers.insert(decision.interrupt_id, decision.authorized);
        }
        if let Some(missing) = waiting.iter().find(|id| !answers.contains_key(*id)) {
            return Err(AgentError::ResumeUnanswered(missing.clone()));
        }

        for pending in &mut self.calls {
            let Some((id, gate)) = pending.waiting.take() else {
                continue;
            };
            match (gate, answers.get(&id).copied().unwrap_or(false)) {
                (Gate::Authorization, true) => pending.authorized = true,
                (Gate::Approval, true) => pending.approved = true,
                (Gate::Authorization, false) => pending.denial = Some(Denial::Authorization),
                (Gate::Approval, false) => pending.denial = Some(Denial::Rejected),
            }
        }
        Ok(())
    }

    /// Close every call with a cancellation result so the history stays
    /// well formed when a new message supersedes a suspended turn.
    pub(crate) fn cancel(self) -> Vec<AgentMessage> {
        self.calls
            .into_iter()
            .map(|p| AgentMessage::tool(&p.call, Denial::Cancelled.message(&p.call.name), true))
            .collect()
    }
}

/// Construction parameters for [`ToolAgent`].
#[derive(Debug, Clone)]
pub(crate) struct AgentSpec {
    pub(crate) name: String,
    pub(crate) instructions: String,
    pub(crate) model: String,
    pub(crate) tools: Vec<ToolSpec>,
    pub(crate) user_id: String,
    pub(crate) approval_tools: Vec<String>,
    pub(crate) max_steps: usize,
}

/// Tool-calling agent: model step, gate step, tool step, repeat.
pub(crate) struct ToolAgent {
    spec: AgentSpec,
    tools: HashMap<String, ToolSpec>,
    schemas: Vec<serde_json::Value>,
    approval: HashSet<String>,
    model: Arc<dyn ChatModel>,
    gateway: Arc<dyn ToolGateway>,
    checkpointer: Arc<dyn Checkpointer>,
    hooks: Arc<dyn AgentHooks>,
}

impl ToolAgent {
    pub(crate) fn new(
        spec: AgentSpec,
        model: Arc<dyn ChatModel>,
        gateway: Arc<dyn ToolGateway>,
        checkpointer: Arc<dyn Checkpointer>,
    ) -> Self {
        let tools = spec
            .tools
            .iter()
            .map(|tool| (tool.name.clone(), tool.clone()))
            .collect();
        let schemas = spec.tools.iter().map(ToolSpec::function_schema).collect();
        let approval = spec.approval_tools.iter().cloned().collect();
        Self {
            spec,
            tools,
            schemas,
            approval,
            model,
            gateway,
            checkpointer,
            hooks: Arc::new(TracingHooks::default()),
        }
    }

    pub(crate) fn with_hooks(mut self, hooks: Arc<dyn AgentHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    fn request(&self, history: &[AgentMessage]) -> ChatRequest {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(AgentMessage::system(self.spec.instructions.clone()));
        messages.extend(history.iter().cloned());
        ChatRequest {
            model: self.spec.model.clone(),
            messages,
            tools: self.schemas.clone(),
        }
    }

    /// Check every unsettled call against its gates. Returns the interrupts
    /// raised; calls behind them are marked as waiting.
    async fn gate(&self, batch: &mut PendingToolCalls) -> Result<Vec<Interrupt>, AgentError> {
        let mut interrupts = Vec::new();
        for pending in &mut batch.calls {
            if pending.denial.is_some() || pending.waiting.is_some() {
                continue;
            }
            let Some(tool) = self.tools.get(&pending.call.name) else {
                continue;
            };

            if tool.requires_authorization && !pending.authorized {
                let auth = self
                    .gateway
                    .authorize(&tool.qualified_name, &self.spec.user_id)
                    .await?;
                if auth.is_completed() {
                    pending.authorized = true;
                } else if auth.is_failed() {
                    warn!(tool = %tool.name, "authorization failed at the broker");
                    pending.denial = Some(Denial::Authorization);
                    continue;
                } else {
                    let id = InterruptId::generate();
                    pending.waiting = Some((id.clone(), Gate::Authorization));
                    interrupts.push(Interrupt {
                        id,
                        payload: InterruptPayload::AuthorizationRequired {
                            tool_name: tool.name.clone(),
                            authorization: auth,
                        },
                    });
                    continue;
                }
            }

            if self.approval.contains(&tool.name) && !pending.approved {
                let id = InterruptId::generate();
                pending.waiting = Some((id.clone(), Gate::Approval));
                interrupts.push(Interrupt {
                    id,
                    payload: InterruptPayload::HumanApprovalRequired {
                        tool_name: tool.name.clone(),
                        input: pending.call.args.clone(),
                    },
                });
            }
        }
        Ok(interrupts)
    }

    async fn run_tools(&self, batch: PendingToolCalls) -> Vec<AgentMessage> {
        let mut results = Vec::with_capacity(batch.calls.len());
        for pending in batch.calls {
            let call = &pending.call;
            self.hooks.on_tool_start(&self.spec.name, &call.name);
            let (output, is_error) = match (pending.denial, self.tools.get(&call.name)) {
                (Some(denial), _) => (denial.message(&call.name), true),
                (None, None) => (format!("Error: unknown tool {}", call.name), true),
                (None, Some(tool)) => {
                    match self
                        .gateway
                        .execute(&tool.qualified_name, &call.args, &self.spec.user_id)
                        .await
                    {
                        Ok(outcome) => (outcome.output, outcome.is_error),
                        Err(err) => {
                            warn!(tool = %call.name, error = %err, "tool execution failed");
                            (format!("Error: {err}"), true)
                        }
                    }
                }
            };
            debug!(tool = %call.name, is_error, output = %truncate_chars(&output, 200), "tool result");
            self.hooks.on_tool_end(&self.spec.name, &call.name, is_error);
            results.push(AgentMessage::tool(call, output, is_error));
        }
        results
    }
}

impl Agent for ToolAgent {
    fn stream<'a>(
        &'a self,
        input: TurnInput,
        session: &'a SessionConfig,
    ) -> BoxStream<'a, Result<AgentUpdate, AgentError>> {
        Box::pin(try_stream! {
            let thread = session.thread_id.as_str();
            let mut checkpoint: Checkpoint = self.checkpointer.load(thread).unwrap_or_default();

            let mut pending = match input {
                TurnInput::Message(text) => {
                    if let Some(stale) = checkpoint.pending.take() {
                        warn!(thread, "discarding tool calls left suspended by an earlier turn");
                        checkpoint.messages.extend(stale.cancel());
                    }
                    checkpoint.messages.push(AgentMessage::user(text));
                    self.checkpointer.save(thread, checkpoint.clone());
                    self.hooks.on_start(&self.spec.name);
                    None
                }
                TurnInput::Resume(resume) => {
                    let mut batch = checkpoint
                        .pending
                        .take()
                        .ok_or_else(|| AgentError::NothingToResume(thread.to_string()))?;
                    batch.apply(resume)?;
                    Some(batch)
                }
            };

            let mut steps = 0usize;
            loop {
                if let Some(mut batch) = pending.take() {
                    let interrupts = self.gate(&mut batch).await?;
                    if !interrupts.is_empty() {
                        debug!(thread, count = interrupts.len(), "suspending on interrupts");
                        checkpoint.pending = Some(batch);
                        self.checkpointer.save(thread, checkpoint.clone());
                        yield AgentUpdate::Interrupts(interrupts);
                        break;
                    }
                    let results = self.run_tools(batch).await;
                    checkpoint.messages.extend(results.iter().cloned());
                    checkpoint.pending = None;
                    self.checkpointer.save(thread, checkpoint.clone());
                    yield AgentUpdate::Content {
                        node: TOOLS_NODE.to_string(),
                        messages: results,
                    };
                }

                if steps >= self.spec.max_steps {
                    Err::<(), AgentError>(AgentError::StepLimit(self.spec.max_steps))?;
                }
                steps += 1;

                let reply = self
                    .model
                    .complete(&self.request(&checkpoint.messages))
                    .await
                    .map_err(AgentError::from)?;
                let tool_calls = reply.tool_calls.clone();
                checkpoint.messages.push(reply.clone());
                // The reply's calls stay pending until each has a tool message.
                checkpoint.pending =
                    (!tool_calls.is_empty()).then(|| PendingToolCalls::new(tool_calls));
                self.checkpointer.save(thread, checkpoint.clone());
                yield AgentUpdate::Content {
                    node: MODEL_NODE.to_string(),
                    messages: vec![reply],
                };

                if checkpoint.pending.is_none() {
                    self.hooks.on_end(&self.spec.name);
                    break;
                }
                pending = checkpoint.pending.clone();
            }
        })
    }
}
