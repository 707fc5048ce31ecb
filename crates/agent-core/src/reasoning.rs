//! Reasoning Loop
//!
//! Implements the ReAct (Reason + Act) pattern as a bounded state machine:
//!
//! ```text
//! THINKING ──► ANSWER ───────────────────────────► DONE
//!    │  ▲
//!    │  └── TOOL_EXECUTING ◄── TOOL_CALL ◄──┘
//!    │
//!    ├─ budget spent ─────────────────────────────► EXHAUSTED
//!    └─ model timeout / unavailable / cancelled ──► FAILED
//! ```
//!
//! `max_iterations` caps the THINKING steps charged to a run, so every run
//! terminates no matter what the model or the tools do. Tool failures of any
//! kind are folded back into the conversation as observations; only
//! loop-level faults end a run with an error.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::error::{AgentError, Result};
use crate::message::{ChatMessage, Conversation, Message};
use crate::protocol::{self, ModelReply, ReplyPrefix};
use crate::provider::{GenerationOptions, LlmProvider, TokenUsage};
use crate::tool::{Tool, ToolCall, ToolCallResult, ToolRegistry};

/// Where answer fragments go when a run is streamed
pub(crate) type FragmentSink = mpsc::Sender<String>;

/// Agent configuration
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// System prompt (instructions plus any store context)
    pub system_prompt: String,

    /// Maximum THINKING steps per run
    pub max_iterations: usize,

    /// Generation options (model, temperature, max tokens per completion)
    pub generation: GenerationOptions,

    /// Whether to append tool descriptions to system prompt
    pub inject_tool_descriptions: bool,

    /// Consecutive malformed replies tolerated before the run fails
    pub max_reparse_attempts: usize,

    /// Context budget in estimated tokens
    pub max_context_tokens: u32,

    /// Limit for one model completion
    pub model_timeout: Option<Duration>,

    /// Limit for one tool invocation
    pub tool_timeout: Option<Duration>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            max_iterations: 5,
            generation: GenerationOptions::default(),
            inject_tool_descriptions: true,
            max_reparse_attempts: 1,
            max_context_tokens: 8192,
            model_timeout: Some(Duration::from_secs(120)),
            tool_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl AgentConfig {
    /// Check the invariants a run depends on
    pub fn validate(&self) -> Result<()> {
        if self.generation.model.trim().is_empty() {
            return Err(AgentError::Config("model must not be empty".into()));
        }
        if !self.generation.temperature.is_finite() || self.generation.temperature < 0.0 {
            return Err(AgentError::Config(format!(
                "temperature must be >= 0, got {}",
                self.generation.temperature
            )));
        }
        if self.generation.max_tokens == 0 {
            return Err(AgentError::Config("max_tokens must be > 0".into()));
        }
        if self.max_iterations == 0 {
            return Err(AgentError::Config("max_iterations must be > 0".into()));
        }
        if self.max_context_tokens == 0 {
            return Err(AgentError::Config("max_context_tokens must be > 0".into()));
        }
        Ok(())
    }
}

const DEFAULT_SYSTEM_PROMPT: &str = r"You are a helpful AI assistant.

After receiving tool results, synthesize them into a helpful response.
If you can answer directly without tools, do so.
Be concise and accurate.";

const EXHAUSTED_FALLBACK: &str = "I wasn't able to finish working through your request within the allowed number of steps. Please try again or ask a more specific question.";

/// Loop states, in the order a run enters them
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Thinking,
    ToolCall,
    ToolExecuting,
    Done,
    Exhausted,
    Failed,
}

/// How a successful run ended
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The model produced a final answer
    Done,
    /// The iteration budget ran out; the answer is best-effort
    Exhausted,
}

/// One recorded step of a run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceEntry {
    ModelReply { content: String },
    ToolCall(ToolCallResult),
    ProtocolError { reason: String },
}

/// Ordered record of one run. Owned by the run and handed back with the
/// outcome; never shared between runs.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AgentTrace {
    entries: Vec<TraceEntry>,
    states: Vec<AgentState>,
}

impl AgentTrace {
    fn enter(&mut self, state: AgentState) {
        tracing::debug!(?state, "Agent state");
        self.states.push(state);
    }

    fn record(&mut self, entry: TraceEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    /// States entered, in order
    pub fn states(&self) -> &[AgentState] {
        &self.states
    }

    /// Tool invocations, in completion order
    pub fn tool_calls(&self) -> impl DoubleEndedIterator<Item = &ToolCallResult> {
        self.entries.iter().filter_map(|e| match e {
            TraceEntry::ToolCall(result) => Some(result),
            _ => None,
        })
    }
}

/// Result of a run that reached DONE or EXHAUSTED
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentOutcome {
    pub answer: String,
    pub status: RunStatus,
    /// THINKING steps charged against the budget
    pub iterations: usize,
    pub trace: AgentTrace,
    pub usage: Option<TokenUsage>,
}

impl AgentOutcome {
    pub fn is_exhausted(&self) -> bool {
        self.status == RunStatus::Exhausted
    }
}

/// Raw model reply for one THINKING step
struct Thought {
    content: String,
    usage: Option<TokenUsage>,
    /// Fragments of this reply were already forwarded to a stream
    streamed: bool,
}

/// The main Agent struct
#[derive(Clone)]
pub struct Agent {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    config: AgentConfig,
}

impl Agent {
    /// Create a new agent
    pub fn new(provider: Arc<dyn LlmProvider>, tools: Arc<ToolRegistry>, config: AgentConfig) -> Self {
        Self {
            provider,
            tools,
            config,
        }
    }

    /// Create with default configuration
    pub fn with_defaults(provider: Arc<dyn LlmProvider>, tools: Arc<ToolRegistry>) -> Self {
        Self::new(provider, tools, AgentConfig::default())
    }

    /// Build the full system prompt including tool descriptions
    fn build_system_prompt(&self) -> String {
        let mut prompt = self.config.system_prompt.clone();

        if self.config.inject_tool_descriptions && !self.tools.is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(&self.tools.prompt_section());
        }

        prompt
    }

    /// Answer a question given prior history (oldest first)
    pub async fn ask(&self, question: &str, history: &[ChatMessage]) -> Result<AgentOutcome> {
        self.ask_with_cancel(question, history, &CancellationToken::new())
            .await
    }

    /// Answer a question; the run stops at the next suspension point once
    /// `cancel` fires
    pub async fn ask_with_cancel(
        &self,
        question: &str,
        history: &[ChatMessage],
        cancel: &CancellationToken,
    ) -> Result<AgentOutcome> {
        let conversation = self.prepare(question, history)?;
        let span = tracing::info_span!(
            "agent_run",
            provider = self.provider.name(),
            model = %self.config.generation.model,
        );
        self.drive(conversation, cancel, None).instrument(span).await
    }

    /// Validate input and seed the conversation: system context, history,
    /// then the question.
    pub(crate) fn prepare(&self, question: &str, history: &[ChatMessage]) -> Result<Conversation> {
        self.config.validate()?;

        let question = question.trim();
        if question.is_empty() {
            return Err(AgentError::Validation("question must not be empty".into()));
        }

        let system = Message::system(self.build_system_prompt());
        let question = Message::user(question);
        let required = system.estimate_tokens().saturating_add(question.estimate_tokens());
        if required > self.config.max_context_tokens {
            return Err(AgentError::ContextOverflow {
                used: required,
                max: self.config.max_context_tokens,
            });
        }

        let mut conversation =
            Conversation::new().with_max_context_tokens(self.config.max_context_tokens);
        conversation.push(system);
        for message in history {
            conversation.push(message.into());
        }
        conversation.push(question);
        fit_context(&mut conversation)?;

        Ok(conversation)
    }

    /// Run the loop to a terminal state.
    ///
    /// With a sink, THINKING steps stream from the provider and the final
    /// answer is forwarded as fragments; tool cycles stay silent.
    pub(crate) async fn drive(
        &self,
        mut conversation: Conversation,
        cancel: &CancellationToken,
        sink: Option<&FragmentSink>,
    ) -> Result<AgentOutcome> {
        let mut trace = AgentTrace::default();
        let mut usage: Option<TokenUsage> = None;
        let mut iterations = 0;
        let mut reparse_attempts = 0;
        let mut charge = true;
        let mut commentary = String::new();

        loop {
            if charge {
                if iterations >= self.config.max_iterations {
                    trace.enter(AgentState::Exhausted);
                    tracing::warn!(iterations, "Iteration budget exhausted");

                    let answer = best_effort_answer(&commentary, &trace);
                    if let Some(sink) = sink {
                        forward(sink, answer.clone()).await?;
                    }
                    return Ok(AgentOutcome {
                        answer,
                        status: RunStatus::Exhausted,
                        iterations,
                        trace,
                        usage,
                    });
                }
                iterations += 1;
            }
            charge = true;

            trace.enter(AgentState::Thinking);
            let thought = match self.think(&conversation, cancel, sink).await {
                Ok(thought) => thought,
                Err(e) => return Err(fail(&mut trace, e)),
            };

            if let Some(step_usage) = &thought.usage {
                usage.get_or_insert_with(TokenUsage::default).add(step_usage);
            }
            trace.record(TraceEntry::ModelReply {
                content: thought.content.clone(),
            });

            match protocol::interpret(&thought.content) {
                ModelReply::Answer(answer) => {
                    trace.enter(AgentState::Done);
                    if let Some(sink) = sink {
                        if !thought.streamed {
                            forward(sink, answer.clone()).await?;
                        }
                    }
                    return Ok(AgentOutcome {
                        answer,
                        status: RunStatus::Done,
                        iterations,
                        trace,
                        usage,
                    });
                }

                ModelReply::Malformed(reason) => {
                    reparse_attempts += 1;
                    tracing::warn!(%reason, attempt = reparse_attempts, "Could not interpret model reply");
                    trace.record(TraceEntry::ProtocolError {
                        reason: reason.clone(),
                    });

                    if reparse_attempts > self.config.max_reparse_attempts {
                        return Err(fail(
                            &mut trace,
                            AgentError::MalformedOutput {
                                attempts: reparse_attempts,
                                reason,
                            },
                        ));
                    }

                    conversation.push(Message::assistant(thought.content));
                    conversation.push(
                        Message::tool(
                            format!(
                                "[Protocol error]\nYour last reply could not be used: {reason}. \
                                 Either answer the user directly, or reply with only a valid tool block."
                            ),
                            None,
                        )
                        .with_name("protocol"),
                    );
                    charge = false;

                    if let Err(e) = fit_context(&mut conversation) {
                        return Err(fail(&mut trace, e));
                    }
                }

                ModelReply::ToolRequest {
                    call,
                    commentary: trailing,
                } => {
                    reparse_attempts = 0;
                    trace.enter(AgentState::ToolCall);
                    conversation.push(Message::assistant(thought.content));

                    trace.enter(AgentState::ToolExecuting);
                    let result = match self.execute_tool(&call, cancel).await {
                        Ok(result) => result,
                        Err(e) => return Err(fail(&mut trace, e)),
                    };

                    conversation.push(
                        Message::tool(format_observation(&result), call.id.clone())
                            .with_name(&call.name),
                    );
                    trace.record(TraceEntry::ToolCall(result));
                    commentary = trailing;

                    if let Err(e) = fit_context(&mut conversation) {
                        return Err(fail(&mut trace, e));
                    }
                }
            }
        }
    }

    /// One model completion, bounded by the model timeout and the cancel token
    async fn think(
        &self,
        conversation: &Conversation,
        cancel: &CancellationToken,
        sink: Option<&FragmentSink>,
    ) -> Result<Thought> {
        let messages = conversation.messages();
        let options = &self.config.generation;

        let completion = async {
            match sink {
                Some(sink) => self.think_streaming(messages, sink).await,
                None => {
                    let completion = self.provider.complete(messages, options).await?;
                    Ok(Thought {
                        content: completion.content,
                        usage: completion.usage,
                        streamed: false,
                    })
                }
            }
        };

        let bounded = async {
            match self.config.model_timeout {
                Some(limit) => match tokio::time::timeout(limit, completion).await {
                    Ok(result) => result,
                    Err(_) => Err(AgentError::ModelTimeout(limit)),
                },
                None => completion.await,
            }
        };

        cancellable(cancel, bounded).await
    }

    /// Stream one completion, forwarding it as soon as it is known to be an
    /// answer
    async fn think_streaming(&self, messages: &[Message], sink: &FragmentSink) -> Result<Thought> {
        let mut stream = self
            .provider
            .complete_stream(messages, &self.config.generation)
            .await?;

        let mut content = String::new();
        let mut usage = None;
        let mut forwarding = false;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if chunk.usage.is_some() {
                usage = chunk.usage;
            }

            content.push_str(&chunk.delta);
            if forwarding {
                if !chunk.delta.is_empty() {
                    forward(sink, chunk.delta).await?;
                }
            } else if protocol::classify_prefix(&content) == ReplyPrefix::Answer {
                forwarding = true;
                forward(sink, content.clone()).await?;
            }

            if chunk.done {
                break;
            }
        }

        Ok(Thought {
            content,
            usage,
            streamed: forwarding,
        })
    }

    /// Execute a tool call. Every tool-level problem becomes a failed result;
    /// only cancellation is an error.
    async fn execute_tool(&self, call: &ToolCall, cancel: &CancellationToken) -> Result<ToolCallResult> {
        tracing::debug!(tool = %call.name, "Executing tool");

        let invocation = async {
            let invoked = match self.config.tool_timeout {
                Some(limit) => {
                    self.tools
                        .invoke_with_timeout(&call.name, call.arguments.clone(), limit)
                        .await
                }
                None => self.tools.invoke(&call.name, call.arguments.clone()).await,
            };

            let result = match invoked {
                Ok(result) => result,
                Err(AgentError::UnknownTool(name)) => {
                    tracing::warn!(tool = %name, "Model requested an unknown tool");
                    let available = if self.tools.is_empty() {
                        "none".to_string()
                    } else {
                        self.tools.names().join(", ")
                    };
                    ToolCallResult::failure(
                        name.as_str(),
                        call.arguments.clone(),
                        format!("Unknown tool '{name}'. Available tools: {available}"),
                    )
                }
                Err(e) => ToolCallResult::failure(call.name.as_str(), call.arguments.clone(), e.to_string()),
            };

            Ok(result.with_call_id(call.id.clone()))
        };

        cancellable(cancel, invocation).await
    }

    /// Get the tool registry
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Get configuration
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }
}

/// Race a suspension point against cancellation
async fn cancellable<T>(cancel: &CancellationToken, work: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(AgentError::Cancelled),
        result = work => result,
    }
}

async fn forward(sink: &FragmentSink, fragment: String) -> Result<()> {
    // A closed channel means the consumer went away
    sink.send(fragment).await.map_err(|_| AgentError::Cancelled)
}

/// Truncate, then refuse a conversation that still exceeds the budget
fn fit_context(conversation: &mut Conversation) -> Result<()> {
    conversation.truncate_to_fit();
    if conversation.fits() {
        return Ok(());
    }
    Err(AgentError::ContextOverflow {
        used: conversation.estimate_tokens(),
        max: conversation.max_context_tokens(),
    })
}

fn fail(trace: &mut AgentTrace, error: AgentError) -> AgentError {
    trace.enter(AgentState::Failed);
    tracing::error!(code = error.code(), error = %error, "Agent run failed");
    error
}

/// Format tool result for conversation
fn format_observation(result: &ToolCallResult) -> String {
    if result.success {
        format!("[Tool '{}' returned]\n{}", result.tool_name, result.output)
    } else {
        format!("[Tool '{}' failed]\n{}", result.tool_name, result.output)
    }
}

fn best_effort_answer(commentary: &str, trace: &AgentTrace) -> String {
    if !commentary.is_empty() {
        return commentary.to_string();
    }

    match trace.tool_calls().rev().find(|r| r.success) {
        Some(last) => format!(
            "I ran out of steps before finishing, but here is what I found so far:\n\n{}",
            last.output
        ),
        None => EXHAUSTED_FALLBACK.into(),
    }
}

/// Builder for Agent configuration
pub struct AgentBuilder {
    provider: Option<Arc<dyn LlmProvider>>,
    tools: ToolRegistry,
    config: AgentConfig,
    error: Option<AgentError>,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            tools: ToolRegistry::new(),
            config: AgentConfig::default(),
            error: None,
        }
    }

    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn tool<T: Tool + 'static>(mut self, tool: T) -> Self {
        if let Err(e) = self.tools.register(tool) {
            self.error.get_or_insert(e);
        }
        self
    }

    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = prompt.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.generation.model = model.into();
        self
    }

    pub fn temperature(mut self, temp: f32) -> Self {
        self.config.generation.temperature = temp;
        self
    }

    pub fn max_tokens(mut self, max: u32) -> Self {
        self.config.generation.max_tokens = max;
        self
    }

    pub fn max_iterations(mut self, max: usize) -> Self {
        self.config.max_iterations = max;
        self
    }

    pub fn model_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.model_timeout = timeout;
        self
    }

    pub fn tool_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.tool_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<Agent> {
        if let Some(e) = self.error {
            return Err(e);
        }
        let provider = self
            .provider
            .ok_or_else(|| AgentError::Config("Provider is required".into()))?;
        self.config.validate()?;

        Ok(Agent::new(provider, Arc::new(self.tools), self.config))
    }
}
