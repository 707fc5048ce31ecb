//! Streaming Adapter
//!
//! Runs the agent loop and exposes the final answer as an ordered stream of
//! text fragments. Tool cycles produce no fragments. Every stream ends with
//! exactly one terminal item: [`AnswerEvent::Completed`] or an error.
//!
//! Fragments are forwarded through a small bounded channel, so a slow
//! consumer applies backpressure to the model stream. The run lives inside
//! the stream: dropping the stream drops the run, and firing the cancel
//! token ends it at its next suspension point.

use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::error::{AgentError, Result};
use crate::message::ChatMessage;
use crate::reasoning::{Agent, RunStatus};

/// Fragments buffered between the loop and the consumer
const FRAGMENT_BUFFER: usize = 32;

/// One item of an answer stream
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum AnswerEvent {
    /// Next piece of the answer text
    Fragment(String),

    /// The run finished; no further items follow
    Completed { status: RunStatus, iterations: usize },
}

/// Stream of answer events
pub type AnswerStream = Pin<Box<dyn Stream<Item = Result<AnswerEvent>> + Send>>;

enum Step {
    Fragment(String),
    Finished(Result<(RunStatus, usize)>),
    Drained,
    Cancelled,
}

impl Agent {
    /// Answer a question as a stream of fragments.
    ///
    /// Input is validated before the stream is returned, so an empty
    /// question fails here and the model is never called. Concatenating the
    /// fragments yields the same answer [`Agent::ask`] would return for the
    /// same model output.
    ///
    /// A failure before any fragment is yielded as the original error; a
    /// failure after fragments were delivered is reported as
    /// [`AgentError::StreamAborted`].
    pub fn ask_stream(
        &self,
        question: &str,
        history: &[ChatMessage],
        cancel: CancellationToken,
    ) -> Result<AnswerStream> {
        let conversation = self.prepare(question, history)?;
        let agent = self.clone();
        let span = tracing::info_span!("agent_stream", model = %agent.config().generation.model);

        let stream = async_stream::stream! {
            let (tx, mut rx) = mpsc::channel::<String>(FRAGMENT_BUFFER);
            let drive_cancel = cancel.clone();
            let mut run = Box::pin(
                async move {
                    let outcome = agent.drive(conversation, &drive_cancel, Some(&tx)).await;
                    outcome.map(|o| (o.status, o.iterations))
                }
                .instrument(span),
            );

            let mut delivered = 0usize;
            let mut result: Option<Result<(RunStatus, usize)>> = None;

            loop {
                let step = tokio::select! {
                    biased;
                    () = cancel.cancelled() => Step::Cancelled,
                    fragment = rx.recv() => match fragment {
                        Some(fragment) => Step::Fragment(fragment),
                        None => Step::Drained,
                    },
                    finished = &mut run, if result.is_none() => Step::Finished(finished),
                };

                match step {
                    Step::Fragment(fragment) => {
                        delivered += 1;
                        yield Ok(AnswerEvent::Fragment(fragment));
                    }
                    Step::Finished(finished) => {
                        // The sender lives in the finished future; once it is
                        // gone, recv drains what is left and then reports None.
                        result = Some(finished);
                    }
                    Step::Drained => {
                        if result.is_none() {
                            result = Some((&mut run).await);
                        }
                        break;
                    }
                    Step::Cancelled => {
                        result = Some(Err(AgentError::Cancelled));
                        break;
                    }
                }
            }

            match result {
                Some(Ok((status, iterations))) => {
                    yield Ok(AnswerEvent::Completed { status, iterations });
                }
                Some(Err(e)) if delivered > 0 => {
                    tracing::warn!(error = %e, delivered, "Answer stream aborted");
                    yield Err(AgentError::StreamAborted(e.to_string()));
                }
                Some(Err(e)) => yield Err(e),
                None => yield Err(AgentError::Cancelled),
            }
        };

        Ok(Box::pin(stream))
    }
}
