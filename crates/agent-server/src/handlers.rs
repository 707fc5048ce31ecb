//! HTTP/WebSocket Handlers

use axum::{
    Json,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt, stream::SplitSink};
use serde::{Deserialize, Serialize};
use tracing::Instrument;
use uuid::Uuid;

use agent_core::{AgentError, AnswerEvent, CancellationToken, ChatHistoryItem, ChatMessage, RunStatus, SessionId};
use agent_guard::GuardError;

use crate::state::AppState;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskRequest {
    pub question: String,
    /// Prior turns, oldest first. Takes precedence over stored session history.
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub verification_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub question: String,
    pub answer: String,
    pub timestamp: DateTime<Utc>,
    pub exhausted: bool,
    pub iterations: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub model: String,
    pub context_loaded: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoResponse {
    pub model: String,
    pub context_size: u32,
    pub max_tokens: u32,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// ============================================================================
// Errors
// ============================================================================

/// Failure of an ask request, rendered as `{error, code}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn verification_failed() -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            code: "VERIFICATION_FAILED",
            message: "Verification failed. Please refresh the page and try again.".into(),
        }
    }
}

impl From<AgentError> for ApiError {
    fn from(err: AgentError) -> Self {
        let status = match &err {
            AgentError::Validation(_) | AgentError::ContextOverflow { .. } => StatusCode::BAD_REQUEST,
            AgentError::ModelTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AgentError::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        match &err {
            AgentError::Cancelled => tracing::debug!("Request cancelled"),
            _ if status.is_server_error() => tracing::error!(code = err.code(), error = %err, "Request failed"),
            _ => tracing::warn!(code = err.code(), error = %err, "Request rejected"),
        }

        Self {
            status,
            code: err.code(),
            message: err.user_message(),
        }
    }
}

/// The verification check itself could not run
impl From<GuardError> for ApiError {
    fn from(err: GuardError) -> Self {
        tracing::error!(error = %err, "Bot verification unavailable");
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            code: "VERIFICATION_UNAVAILABLE",
            message: err.user_message().into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.message,
            code: self.code.into(),
        };
        (self.status, Json(body)).into_response()
    }
}

// ============================================================================
// Request Flow
// ============================================================================

/// Pass the challenge-token gate
async fn admit(state: &AppState, token: Option<&str>, remote_ip: Option<&str>) -> Result<(), ApiError> {
    if state.verifier.verify(token, remote_ip).await? {
        Ok(())
    } else {
        tracing::info!(verifier = state.verifier.name(), "Request failed verification");
        Err(ApiError::verification_failed())
    }
}

/// History the agent sees: the caller's own, else the stored session's
fn resolve_history(
    state: &AppState,
    session: Option<&SessionId>,
    supplied: Vec<ChatMessage>,
) -> Result<Vec<ChatMessage>, ApiError> {
    match session {
        Some(id) if supplied.is_empty() => Ok(state.history.recent(id, state.config.history_limit)?),
        _ => Ok(supplied),
    }
}

/// Record a finished exchange; failures are logged, the answer still stands
fn remember(state: &AppState, session: Option<&SessionId>, question: &str, answer: &str) {
    let Some(id) = session else { return };

    let result = state
        .history
        .append(id, ChatHistoryItem::now(ChatMessage::user(question)))
        .and_then(|()| state.history.append(id, ChatHistoryItem::now(ChatMessage::assistant(answer))));

    if let Err(e) = result {
        tracing::warn!(session = %id, error = %e, "Failed to record history");
    }
}

/// Client address as reported by the fronting proxy
fn client_ip(headers: &HeaderMap) -> Option<String> {
    ["cf-connecting-ip", "x-real-ip", "x-forwarded-for"]
        .iter()
        .find_map(|name| {
            let value = headers.get(*name)?.to_str().ok()?;
            value
                .split(',')
                .next()
                .map(str::trim)
                .filter(|ip| !ip.is_empty())
                .map(String::from)
        })
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let connected = state.provider.health_check().await.unwrap_or(false);

    Json(HealthResponse {
        status: if connected { "healthy" } else { "degraded" },
        model: state.config.model.clone(),
        context_loaded: state.knowledge.is_loaded(),
        timestamp: Utc::now(),
    })
}

pub async fn info(State(state): State<AppState>) -> Json<InfoResponse> {
    Json(InfoResponse {
        model: state.config.model.clone(),
        context_size: state.knowledge.estimated_tokens(),
        max_tokens: state.config.max_tokens,
    })
}

/// Answer one question (non-streaming)
pub async fn ask_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<AskRequest>,
) -> Result<Json<AskResponse>, ApiError> {
    let span = tracing::info_span!(
        "ask",
        request_id = %Uuid::new_v4(),
        category = payload.category.as_deref().unwrap_or("general"),
    );

    async move {
        admit(&state, payload.verification_token.as_deref(), client_ip(&headers).as_deref()).await?;

        let session = payload.session_id.map(SessionId::from_string);
        let history = resolve_history(&state, session.as_ref(), payload.history)?;

        let outcome = state
            .agent(payload.category.as_deref())
            .ask(&payload.question, &history)
            .await?;

        remember(&state, session.as_ref(), payload.question.trim(), &outcome.answer);

        Ok(Json(AskResponse {
            question: payload.question,
            exhausted: outcome.is_exhausted(),
            iterations: outcome.iterations,
            answer: outcome.answer,
            timestamp: Utc::now(),
        }))
    }
    .instrument(span)
    .await
}

// ============================================================================
// WebSocket Streaming
// ============================================================================

/// Client control frame
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ControlFrame {
    Cancel,
}

/// Frame sent to the client
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ServerFrame {
    Chunk { content: String },
    Done { exhausted: bool, iterations: usize },
    Error { code: String, error: String },
}

impl From<ApiError> for ServerFrame {
    fn from(err: ApiError) -> Self {
        Self::Error {
            code: err.code.into(),
            error: err.message,
        }
    }
}

/// What the client just sent
enum Incoming {
    Ask(Box<AskRequest>),
    Cancel,
    Invalid(String),
    Ignored,
    Closed,
}

fn parse_frame(text: &str) -> Incoming {
    if let Ok(ControlFrame::Cancel) = serde_json::from_str(text) {
        return Incoming::Cancel;
    }
    match serde_json::from_str::<AskRequest>(text) {
        Ok(request) => Incoming::Ask(Box::new(request)),
        Err(e) => Incoming::Invalid(e.to_string()),
    }
}

fn read_frame(message: Option<Result<Message, axum::Error>>) -> Incoming {
    match message {
        Some(Ok(Message::Text(text))) => parse_frame(text.as_str()),
        Some(Ok(Message::Close(_))) | None => Incoming::Closed,
        Some(Err(e)) => {
            tracing::debug!(error = %e, "WebSocket receive failed");
            Incoming::Closed
        }
        Some(Ok(_)) => Incoming::Ignored,
    }
}

type Sender = SplitSink<WebSocket, Message>;

/// `false` once the client is gone
async fn send(sender: &mut Sender, frame: &ServerFrame) -> bool {
    match serde_json::to_string(frame) {
        Ok(text) => sender.send(Message::Text(text.into())).await.is_ok(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode frame");
            true
        }
    }
}

/// WebSocket streaming ask
pub async fn ask_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    let remote_ip = client_ip(&headers);
    ws.on_upgrade(move |socket| handle_stream(socket, state, remote_ip))
}

async fn handle_stream(socket: WebSocket, state: AppState, remote_ip: Option<String>) {
    let (mut sender, mut receiver) = socket.split();

    loop {
        match read_frame(receiver.next().await) {
            Incoming::Ask(request) => {
                let span = tracing::info_span!("ask_stream", request_id = %Uuid::new_v4());
                let open = run_stream(&state, *request, remote_ip.as_deref(), &mut sender, &mut receiver)
                    .instrument(span)
                    .await;
                if !open {
                    break;
                }
            }
            Incoming::Invalid(reason) => {
                let frame = ServerFrame::Error {
                    code: "INVALID_REQUEST".into(),
                    error: reason,
                };
                if !send(&mut sender, &frame).await {
                    break;
                }
            }
            // nothing is running
            Incoming::Cancel | Incoming::Ignored => {}
            Incoming::Closed => break,
        }
    }

    tracing::debug!("WebSocket closed");
}

/// Stream one answer while watching the socket for a cancel.
///
/// Returns whether the connection is still open.
async fn run_stream(
    state: &AppState,
    request: AskRequest,
    remote_ip: Option<&str>,
    sender: &mut Sender,
    receiver: &mut futures::stream::SplitStream<WebSocket>,
) -> bool {
    let AskRequest {
        question,
        history,
        category,
        session_id,
        verification_token,
    } = request;
    let cancel = CancellationToken::new();

    let started = async {
        admit(state, verification_token.as_deref(), remote_ip).await?;
        let session = session_id.map(SessionId::from_string);
        let history = resolve_history(state, session.as_ref(), history)?;
        let stream = state
            .agent(category.as_deref())
            .ask_stream(&question, &history, cancel.clone())?;
        Ok::<_, ApiError>((stream, session))
    }
    .await;

    let (mut stream, session) = match started {
        Ok(started) => started,
        Err(e) => return send(sender, &ServerFrame::from(e)).await,
    };

    let mut answer = String::new();
    loop {
        tokio::select! {
            event = stream.next() => {
                let frame = match event {
                    Some(Ok(AnswerEvent::Fragment(content))) => {
                        answer.push_str(&content);
                        ServerFrame::Chunk { content }
                    }
                    Some(Ok(AnswerEvent::Completed { status, iterations })) => {
                        remember(state, session.as_ref(), question.trim(), &answer);
                        ServerFrame::Done {
                            exhausted: status == RunStatus::Exhausted,
                            iterations,
                        }
                    }
                    Some(Err(e)) => ApiError::from(e).into(),
                    None => return true,
                };

                let last = !matches!(frame, ServerFrame::Chunk { .. });
                if !send(sender, &frame).await {
                    cancel.cancel();
                    return false;
                }
                if last {
                    return true;
                }
            }
            incoming = receiver.next() => match read_frame(incoming) {
                Incoming::Cancel => {
                    tracing::info!("Client cancelled the stream");
                    cancel.cancel();
                }
                Incoming::Closed => {
                    cancel.cancel();
                    return false;
                }
                Incoming::Ask(_) => {
                    let busy = ServerFrame::Error {
                        code: "BUSY".into(),
                        error: "An answer is already streaming. Cancel it first.".into(),
                    };
                    if !send(sender, &busy).await {
                        cancel.cancel();
                        return false;
                    }
                }
                Incoming::Invalid(_) | Incoming::Ignored => {}
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use agent_core::provider::{Completion, CompletionStream, ModelInfo, StreamChunk};
    use agent_core::{GenerationOptions, LlmProvider, MemoryHistoryStore, Message, ToolRegistry};
    use agent_guard::{BotVerifier, DisabledVerifier};
    use async_trait::async_trait;
    use axum::{Router, body::Body, http::Request};
    use serde_json::{Value, json};
    use storefront_assistant::{MockCommerceClient, StoreKnowledge};
    use tower::ServiceExt;

    use super::*;
    use crate::config::ServerConfig;

    /// Replies with fixed text, or fails as unreachable when `reply` is `None`
    struct CannedProvider {
        reply: Option<String>,
        calls: AtomicUsize,
        last_len: AtomicUsize,
    }

    impl CannedProvider {
        fn new(reply: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.map(String::from),
                calls: AtomicUsize::new(0),
                last_len: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for CannedProvider {
        fn name(&self) -> &str {
            "canned"
        }

        async fn health_check(&self) -> agent_core::Result<bool> {
            Ok(self.reply.is_some())
        }

        async fn complete(&self, messages: &[Message], _options: &GenerationOptions) -> agent_core::Result<Completion> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.last_len.store(messages.len(), Ordering::SeqCst);
            match &self.reply {
                Some(text) => Ok(Completion::text(text.clone(), "canned")),
                None => Err(AgentError::ModelUnavailable("connection refused".into())),
            }
        }

        async fn complete_stream(
            &self,
            messages: &[Message],
            options: &GenerationOptions,
        ) -> agent_core::Result<CompletionStream> {
            let completion = self.complete(messages, options).await?;
            let chunks = vec![
                Ok(StreamChunk {
                    delta: completion.content,
                    done: false,
                    usage: None,
                }),
                Ok(StreamChunk {
                    delta: String::new(),
                    done: true,
                    usage: None,
                }),
            ];
            Ok(Box::pin(futures::stream::iter(chunks)))
        }

        async fn list_models(&self) -> agent_core::Result<Vec<ModelInfo>> {
            Ok(Vec::new())
        }
    }

    struct RejectAll;

    #[async_trait]
    impl BotVerifier for RejectAll {
        async fn verify(&self, _token: Option<&str>, _remote_ip: Option<&str>) -> agent_guard::Result<bool> {
            Ok(false)
        }

        fn name(&self) -> &str {
            "reject-all"
        }
    }

    fn state(provider: Arc<CannedProvider>, verifier: Arc<dyn BotVerifier>) -> AppState {
        let mut tools = ToolRegistry::new();
        storefront_assistant::register_tools(&mut tools, Arc::new(MockCommerceClient::new())).unwrap();

        AppState {
            provider,
            tools: Arc::new(tools),
            knowledge: Arc::new(StoreKnowledge::defaults()),
            config: Arc::new(ServerConfig::default()),
            verifier,
            history: Arc::new(MemoryHistoryStore::new()),
        }
    }

    async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn post_ask(app: &Router, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/api/ask")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        call(app, request).await
    }

    #[tokio::test]
    async fn test_ask_returns_answer() {
        let provider = CannedProvider::new(Some("Your order #1001 is being packed."));
        let app = crate::app(state(provider.clone(), Arc::new(DisabledVerifier::new())));

        let (status, body) = post_ask(&app, json!({"question": "Where is order 1001?"})).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["question"], "Where is order 1001?");
        assert_eq!(body["answer"], "Your order #1001 is being packed.");
        assert_eq!(body["exhausted"], false);
        assert_eq!(body["iterations"], 1);
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_empty_question_is_bad_request() {
        let provider = CannedProvider::new(Some("unused"));
        let app = crate::app(state(provider.clone(), Arc::new(DisabledVerifier::new())));

        let (status, body) = post_ask(&app, json!({"question": "   "})).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unverified_request_is_forbidden() {
        let provider = CannedProvider::new(Some("unused"));
        let app = crate::app(state(provider.clone(), Arc::new(RejectAll)));

        let (status, body) = post_ask(&app, json!({"question": "Hi", "verificationToken": "bogus"})).await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "VERIFICATION_FAILED");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unreachable_model_is_service_unavailable() {
        let app = crate::app(state(CannedProvider::new(None), Arc::new(DisabledVerifier::new())));

        let (status, body) = post_ask(&app, json!({"question": "Hi"})).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["code"], "MODEL_UNAVAILABLE");
    }

    #[tokio::test]
    async fn test_session_history_is_recorded_and_replayed() {
        let provider = CannedProvider::new(Some("Happy to help."));
        let state = state(provider.clone(), Arc::new(DisabledVerifier::new()));
        let app = crate::app(state.clone());

        post_ask(&app, json!({"question": "Hello", "sessionId": "s-1"})).await;
        let first_len = provider.last_len.load(Ordering::SeqCst);

        post_ask(&app, json!({"question": "Do you ship to Canada?", "sessionId": "s-1"})).await;
        assert_eq!(provider.last_len.load(Ordering::SeqCst), first_len + 2);

        let stored = state.history.load(&SessionId::from_string("s-1")).unwrap();
        assert_eq!(stored.len(), 4);
        assert_eq!(stored[0].message, ChatMessage::user("Hello"));
        assert_eq!(stored[3].message, ChatMessage::assistant("Happy to help."));
    }

    #[tokio::test]
    async fn test_health_and_info() {
        let app = crate::app(state(CannedProvider::new(None), Arc::new(DisabledVerifier::new())));

        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, body) = call(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["model"], "llama3.2");
        assert_eq!(body["contextLoaded"], true);

        let request = Request::builder().uri("/api/info").body(Body::empty()).unwrap();
        let (_, body) = call(&app, request).await;
        assert_eq!(body["maxTokens"], 2048);
        assert!(body["contextSize"].as_u64().unwrap() > 0);
    }

    #[test]
    fn test_frame_parsing() {
        assert!(matches!(parse_frame(r#"{"type":"cancel"}"#), Incoming::Cancel));
        assert!(matches!(parse_frame("not json"), Incoming::Invalid(_)));

        let Incoming::Ask(request) = parse_frame(
            r#"{"question":"Any boots on sale?","category":"products","history":[{"role":"user","content":"hi"}]}"#,
        ) else {
            panic!("expected an ask frame");
        };
        assert_eq!(request.category.as_deref(), Some("products"));
        assert_eq!(request.history, vec![ChatMessage::user("hi")]);
    }

    #[test]
    fn test_server_frames() {
        let done = serde_json::to_value(ServerFrame::Done {
            exhausted: true,
            iterations: 5,
        })
        .unwrap();
        assert_eq!(done, json!({"type": "done", "exhausted": true, "iterations": 5}));

        let error: ServerFrame = ApiError::from(AgentError::ModelTimeout(std::time::Duration::from_secs(1))).into();
        let error = serde_json::to_value(error).unwrap();
        assert_eq!(error["type"], "error");
        assert_eq!(error["code"], "MODEL_TIMEOUT");
    }

    #[test]
    fn test_client_ip_prefers_proxy_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        assert_eq!(client_ip(&headers).as_deref(), Some("203.0.113.7"));

        headers.insert("cf-connecting-ip", "198.51.100.2".parse().unwrap());
        assert_eq!(client_ip(&headers).as_deref(), Some("198.51.100.2"));

        assert_eq!(client_ip(&HeaderMap::new()), None);
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AgentError::Validation("empty".into()), StatusCode::BAD_REQUEST),
            (AgentError::ContextOverflow { used: 10, max: 5 }, StatusCode::BAD_REQUEST),
            (AgentError::ModelTimeout(std::time::Duration::from_secs(1)), StatusCode::GATEWAY_TIMEOUT),
            (AgentError::ModelUnavailable("down".into()), StatusCode::SERVICE_UNAVAILABLE),
            (AgentError::Cancelled, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
        assert_eq!(ApiError::verification_failed().status, StatusCode::FORBIDDEN);
    }
}
