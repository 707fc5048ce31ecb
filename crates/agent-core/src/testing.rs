//! Scripted provider for agent tests

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{AgentError, Result};
use crate::message::{Message, Role};
use crate::provider::{Completion, CompletionStream, GenerationOptions, LlmProvider, ModelInfo, StreamChunk};

/// One scripted model turn
pub(crate) enum Turn {
    /// Complete normally; streamed in small chunks
    Reply(String),
    /// Fail with `ModelUnavailable`
    Unavailable,
    /// Never respond
    Hang,
    /// Stream this text, then fail
    BreakAfter(String),
    /// Stream these chunks with a pause before each one
    Slow(Vec<String>, Duration),
}

pub(crate) fn reply(text: &str) -> Turn {
    Turn::Reply(text.to_string())
}

pub(crate) fn tool_request(tool: &str, arguments: serde_json::Value) -> Turn {
    Turn::Reply(format!(
        "```tool\n{}\n```",
        serde_json::json!({"tool": tool, "arguments": arguments})
    ))
}

pub(crate) struct ScriptedProvider {
    turns: Mutex<VecDeque<Turn>>,
    /// Scripts keyed by the latest user message, for concurrent runs
    routes: Mutex<HashMap<String, VecDeque<Turn>>>,
    calls: AtomicUsize,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedProvider {
    pub(crate) fn new(turns: Vec<Turn>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            routes: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// One script per question; runs asking different questions never
    /// consume each other's turns
    pub(crate) fn routed(routes: Vec<(&str, Vec<Turn>)>) -> Self {
        let provider = Self::new(Vec::new());
        *provider.routes.lock().unwrap() = routes
            .into_iter()
            .map(|(question, turns)| (question.to_string(), turns.into()))
            .collect();
        provider
    }

    /// Number of completions requested so far
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Messages sent with each completion request
    pub(crate) fn seen(&self) -> Vec<Vec<Message>> {
        self.seen.lock().unwrap().clone()
    }

    fn next_turn(&self, messages: &[Message]) -> Result<Turn> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(messages.to_vec());

        let question = messages.iter().rev().find(|m| m.role == Role::User);
        let routed = question.and_then(|q| {
            self.routes
                .lock()
                .unwrap()
                .get_mut(&q.content)
                .and_then(VecDeque::pop_front)
        });
        routed
            .or_else(|| self.turns.lock().unwrap().pop_front())
            .ok_or_else(|| AgentError::Provider("script exhausted".into()))
    }
}

fn chunks(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(7).map(|c| c.iter().collect()).collect()
}

fn delta(text: impl Into<String>) -> Result<StreamChunk> {
    Ok(StreamChunk {
        delta: text.into(),
        done: false,
        usage: None,
    })
}

fn finished() -> Result<StreamChunk> {
    Ok(StreamChunk {
        delta: String::new(),
        done: true,
        usage: None,
    })
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    async fn complete(&self, messages: &[Message], options: &GenerationOptions) -> Result<Completion> {
        match self.next_turn(messages)? {
            Turn::Reply(text) => Ok(Completion::text(text, &options.model)),
            Turn::Slow(parts, pause) => {
                tokio::time::sleep(pause * u32::try_from(parts.len()).unwrap()).await;
                Ok(Completion::text(parts.concat(), &options.model))
            }
            Turn::Unavailable => Err(AgentError::ModelUnavailable("connection refused".into())),
            Turn::BreakAfter(_) => Err(AgentError::ModelUnavailable("connection reset".into())),
            Turn::Hang => std::future::pending().await,
        }
    }

    async fn complete_stream(
        &self,
        messages: &[Message],
        _options: &GenerationOptions,
    ) -> Result<CompletionStream> {
        match self.next_turn(messages)? {
            Turn::Reply(text) => {
                let mut items: Vec<Result<StreamChunk>> = chunks(&text).into_iter().map(delta).collect();
                items.push(finished());
                Ok(Box::pin(futures::stream::iter(items)))
            }
            Turn::BreakAfter(text) => {
                let mut items: Vec<Result<StreamChunk>> = chunks(&text).into_iter().map(delta).collect();
                items.push(Err(AgentError::ModelUnavailable("connection reset".into())));
                Ok(Box::pin(futures::stream::iter(items)))
            }
            Turn::Slow(parts, pause) => Ok(Box::pin(async_stream::stream! {
                for part in parts {
                    tokio::time::sleep(pause).await;
                    yield delta(part);
                }
                yield finished();
            })),
            Turn::Unavailable => Err(AgentError::ModelUnavailable("connection refused".into())),
            Turn::Hang => std::future::pending().await,
        }
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        Ok(Vec::new())
    }
}
