//! The chat session — one serialized conversation per agent instance.
//!
//! The session owns the History and the response cache behind a single
//! mutex held for the whole chat operation, so concurrent calls against
//! the same session cannot interleave their history mutations. Within a
//! call the two-phase tool protocol runs:
//!
//! - INITIAL: submit the assembled messages with the tool schema list
//! - TOOL_RESOLVED: if the model requested tools, resolve each one
//!   sequentially, append the results, and run a second, summarizing
//!   completion with no tool schemas
//!
//! Either phase can fail; a transient remote error (429, 5xx, timeout)
//! resolves to a soft `{error}` payload when the soft-fail policy is
//! configured, and propagates otherwise.

use crate::assembler::{self, AssembledPrompt, ChatOptions};
use crate::normalize::ResponseNormalizer;
use deva_config::{ChatTuning, DevaConfig, PolicyConfig, TransientErrorPolicy, UnknownToolPolicy};
use deva_core::error::{Result, ToolError};
use deva_core::event::{DevaEvent, EventBus, MemoryEvent};
use deva_core::message::{ChatResult, History, Message, Role};
use deva_core::provider::{Completion, CompletionRequest, Provider};
use deva_core::tool::{ToolCall, ToolContext, ToolRegistry};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// The tool-result content when a tool returns an empty answer.
const NO_DATA: &str = "no-data";

/// A chat call: the question text plus caller identity and options.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// The question text
    pub text: String,

    /// Client profile of the caller, attached to the memory event
    pub client: serde_json::Value,

    /// Agent profile answering, attached to the memory event
    pub agent: serde_json::Value,

    /// Per-call configuration bag
    pub options: ChatOptions,
}

impl ChatRequest {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// What a chat call resolves to.
#[derive(Debug, Clone)]
pub enum ChatOutcome {
    /// The normalized completion
    Reply(ChatResult),

    /// A transient remote error absorbed under the soft-fail policy
    SoftError { error: String },
}

impl ChatOutcome {
    /// The reply, when there is one.
    pub fn reply(self) -> Option<ChatResult> {
        match self {
            Self::Reply(result) => Some(result),
            Self::SoftError { .. } => None,
        }
    }
}

/// Conversation state owned by the session, guarded by one mutex.
#[derive(Default)]
struct SessionState {
    history: History,
    last_response: Option<ChatResult>,
    topic: Option<String>,
    location: Option<String>,
}

/// A single serialized conversation against one provider.
pub struct ChatSession {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    events: Arc<EventBus>,
    tuning: ChatTuning,
    policy: PolicyConfig,
    normalizer: ResponseNormalizer,
    default_model: String,
    notext_message: String,
    state: Mutex<SessionState>,
}

impl ChatSession {
    pub fn new(
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        events: Arc<EventBus>,
        config: &DevaConfig,
    ) -> Result<Self> {
        Ok(Self {
            provider,
            tools,
            events,
            tuning: config.chat.clone(),
            policy: config.policy,
            normalizer: ResponseNormalizer::from_patterns(&config.normalize.patterns)?,
            default_model: config.default_model().to_string(),
            notext_message: config.messages.notext.clone(),
            state: Mutex::new(SessionState::default()),
        })
    }

    /// Run one chat call to completion.
    ///
    /// Holds the session lock for the full operation — at most one chat is
    /// in flight per session, and back-to-back calls complete in issue
    /// order (the mutex queue is FIFO).
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatOutcome> {
        if request.text.trim().is_empty() {
            debug!("Chat called without text, returning sentinel");
            let model = request
                .options
                .model
                .clone()
                .unwrap_or_else(|| self.default_model.clone());
            return Ok(ChatOutcome::Reply(ChatResult::sentinel(
                &self.notext_message,
                model,
            )));
        }

        let mut state = self.state.lock().await;

        let prompt = assembler::assemble(
            &mut state.history,
            &request.text,
            &request.options,
            self.tuning.history_window,
            &self.default_model,
        );
        let max_tokens = request.options.max_tokens.or(self.tuning.max_tokens);

        info!(
            model = %prompt.model,
            messages = prompt.messages.len(),
            "Processing chat"
        );

        // ── Phase INITIAL ──
        let first_request = self.completion_request(
            &prompt,
            prompt.messages.clone(),
            max_tokens,
            /* with_tools = */ true,
        );
        let first = match self.complete_or_soften(first_request).await? {
            Ok(completion) => completion,
            Err(error) => return Ok(ChatOutcome::SoftError { error }),
        };
        self.publish_usage(&first);

        // ── Phase TOOL_RESOLVED, when the model asked for tools ──
        let completion = if first.message.tool_calls.is_empty() {
            first
        } else {
            let ctx = ToolContext {
                memory_key: request.options.memory.clone(),
            };
            let mut working = prompt.messages.clone();
            self.resolve_tool_calls(&mut working, &first.message, &ctx)
                .await?;

            // Summarizing round: extended message list, no tool schemas
            let second_request =
                self.completion_request(&prompt, working, max_tokens, /* with_tools = */ false);
            let second = match self.complete_or_soften(second_request).await? {
                Ok(completion) => completion,
                Err(error) => return Ok(ChatOutcome::SoftError { error }),
            };
            self.publish_usage(&second);
            second
        };

        // ── Record ──
        let text = self.normalizer.apply(&completion.message.content);
        let result = ChatResult {
            id: completion.id.clone(),
            model: completion.model.clone(),
            usage: completion.usage.clone(),
            role: Role::Assistant,
            text: text.clone(),
            created: completion.created,
        };

        if !prompt.override_history {
            state.history.push(Message::assistant(&text));
        }
        state.last_response = Some(result.clone());

        let event = MemoryEvent::record(
            &completion.id,
            request.client.clone(),
            request.agent.clone(),
            &request.text,
            &text,
            completion.raw.clone(),
        )?;
        self.events.publish(DevaEvent::MemoryRecorded(event));

        Ok(ChatOutcome::Reply(result))
    }

    fn completion_request(
        &self,
        prompt: &AssembledPrompt,
        messages: Vec<Message>,
        max_tokens: Option<u32>,
        with_tools: bool,
    ) -> CompletionRequest {
        CompletionRequest {
            model: prompt.model.clone(),
            messages,
            temperature: self.tuning.temperature,
            top_p: self.tuning.top_p,
            frequency_penalty: self.tuning.frequency_penalty,
            presence_penalty: self.tuning.presence_penalty,
            n: self.tuning.n,
            max_tokens,
            tools: if with_tools {
                self.tools.schemas()
            } else {
                Vec::new()
            },
        }
    }

    /// Run a completion, absorbing transient errors under the soft-fail
    /// policy. The outer Result propagates hard failures; the inner one
    /// carries the soft error message.
    async fn complete_or_soften(
        &self,
        request: CompletionRequest,
    ) -> Result<std::result::Result<Completion, String>> {
        match self.provider.complete(request).await {
            Ok(completion) => Ok(Ok(completion)),
            Err(e)
                if e.is_transient()
                    && self.policy.transient_errors == TransientErrorPolicy::SoftFail =>
            {
                warn!(error = %e, "Transient provider error, soft-failing");
                Ok(Err(e.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Resolve the requested tool calls sequentially, in response order,
    /// appending the assistant tool-call message and one tool-result
    /// message per call to the working list.
    async fn resolve_tool_calls(
        &self,
        working: &mut Vec<Message>,
        assistant: &Message,
        ctx: &ToolContext,
    ) -> Result<()> {
        working.push(assistant.clone());

        for tc in &assistant.tool_calls {
            let arguments: serde_json::Value =
                serde_json::from_str(&tc.arguments).map_err(|e| {
                    ToolError::InvalidArguments(format!("{}: {e}", tc.name))
                })?;
            let call = ToolCall {
                id: tc.id.clone(),
                name: tc.name.clone(),
                arguments,
            };

            debug!(tool = %tc.name, call_id = %tc.id, "Resolving tool call");
            let start = std::time::Instant::now();
            let outcome = self.tools.execute(&call, ctx).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            self.events.publish(DevaEvent::ToolExecuted {
                tool_name: tc.name.clone(),
                success: outcome.is_ok(),
                duration_ms,
                timestamp: chrono::Utc::now(),
            });

            let content = match outcome {
                Ok(answer) if answer.trim().is_empty() => NO_DATA.to_string(),
                Ok(answer) => answer,
                Err(ToolError::Unknown(name))
                    if self.policy.unknown_tool == UnknownToolPolicy::Report =>
                {
                    warn!(tool = %name, "Unknown tool requested, reporting to model");
                    format!("error: unknown tool '{name}'")
                }
                Err(e) => {
                    warn!(tool = %tc.name, error = %e, "Tool resolution failed, aborting chat");
                    return Err(e.into());
                }
            };

            working.push(Message::tool_result(&tc.id, &tc.name, content));
        }

        Ok(())
    }

    fn publish_usage(&self, completion: &Completion) {
        if let Some(usage) = &completion.usage {
            self.events.publish(DevaEvent::ResponseGenerated {
                completion_id: completion.id.clone(),
                model: completion.model.clone(),
                tokens_used: usage.total_tokens,
                timestamp: chrono::Utc::now(),
            });
        }
    }

    // ── State accessors ──

    /// The most recent ChatResult, cloned out of the cache slot.
    pub async fn last_response(&self) -> Option<ChatResult> {
        self.state.lock().await.last_response.clone()
    }

    /// A snapshot of the full history.
    pub async fn history(&self) -> Vec<Message> {
        self.state.lock().await.history.messages().to_vec()
    }

    pub async fn topic(&self) -> Option<String> {
        self.state.lock().await.topic.clone()
    }

    pub async fn set_topic(&self, topic: impl Into<String>) {
        self.state.lock().await.topic = Some(topic.into());
    }

    pub async fn location(&self) -> Option<String> {
        self.state.lock().await.location.clone()
    }

    pub async fn set_location(&self, location: impl Into<String>) {
        self.state.lock().await.location = Some(location.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deva_core::error::ProviderError;
    use deva_core::message::{ToolCallRequest, Usage};
    use deva_core::tool::Tool;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A provider scripted with a fixed sequence of results.
    struct ScriptedProvider {
        script: StdMutex<Vec<std::result::Result<Completion, ProviderError>>>,
        requests: StdMutex<Vec<CompletionRequest>>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(script: Vec<std::result::Result<Completion, ProviderError>>) -> Self {
            Self {
                script: StdMutex::new(script),
                requests: StdMutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            }
        }

        fn text_completion(id: &str, text: &str) -> Completion {
            Completion {
                id: id.into(),
                model: "mock-model".into(),
                created: 1_700_000_000,
                message: Message::assistant(text),
                usage: Some(Usage {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                    total_tokens: 15,
                }),
                raw: serde_json::json!({"id": id}),
            }
        }

        fn tool_completion(id: &str, calls: Vec<ToolCallRequest>) -> Completion {
            let mut message = Message::assistant("");
            message.tool_calls = calls;
            Completion {
                id: id.into(),
                model: "mock-model".into(),
                created: 1_700_000_000,
                message,
                usage: None,
                raw: serde_json::json!({"id": id}),
            }
        }
    }

    #[async_trait::async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> std::result::Result<Completion, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request);
            self.script.lock().unwrap().remove(0)
        }
    }

    /// A tool answering with fixed text.
    struct FixedTool {
        name: &'static str,
        answer: &'static str,
    }

    #[async_trait::async_trait]
    impl Tool for FixedTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "test tool"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }
        async fn execute(
            &self,
            _arguments: serde_json::Value,
            _ctx: &ToolContext,
        ) -> std::result::Result<String, ToolError> {
            Ok(self.answer.to_string())
        }
    }

    fn session_with(
        provider: Arc<ScriptedProvider>,
        tools: ToolRegistry,
        config: &DevaConfig,
    ) -> ChatSession {
        ChatSession::new(
            provider,
            Arc::new(tools),
            Arc::new(EventBus::default()),
            config,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn simple_text_flow_records_everything() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(
            ScriptedProvider::text_completion("cmpl-1", "Hello there"),
        )]));
        let session = session_with(provider.clone(), ToolRegistry::new(), &DevaConfig::default());

        let outcome = session.chat(&ChatRequest::text("Hi")).await.unwrap();
        let result = outcome.reply().unwrap();

        assert_eq!(result.id, "cmpl-1");
        assert_eq!(result.text, "Hello there");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        // history holds user + assistant turns
        let history = session.history().await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "Hi");
        assert_eq!(history[1].content, "Hello there");

        // cache holds the result
        assert_eq!(session.last_response().await.unwrap().id, "cmpl-1");
    }

    #[tokio::test]
    async fn empty_text_short_circuits_without_remote_call() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let session = session_with(provider.clone(), ToolRegistry::new(), &DevaConfig::default());

        let outcome = session.chat(&ChatRequest::text("   ")).await.unwrap();
        let result = outcome.reply().unwrap();

        assert_eq!(result.text, "no text provided");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert!(session.history().await.is_empty());
        assert!(session.last_response().await.is_none());
    }

    #[tokio::test]
    async fn cache_read_is_idempotent() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(
            ScriptedProvider::text_completion("cmpl-1", "answer"),
        )]));
        let session = session_with(provider, ToolRegistry::new(), &DevaConfig::default());
        session.chat(&ChatRequest::text("q")).await.unwrap();

        let a = session.last_response().await.unwrap();
        let b = session.last_response().await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn tool_round_trip_returns_second_completion() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(ScriptedProvider::tool_completion(
                "cmpl-first",
                vec![ToolCallRequest {
                    id: "call_1".into(),
                    name: "search_memory".into(),
                    arguments: r#"{"text":"history"}"#.into(),
                }],
            )),
            Ok(ScriptedProvider::text_completion(
                "cmpl-second",
                "Summarized answer",
            )),
        ]));
        let mut tools = ToolRegistry::new();
        tools.register(Box::new(FixedTool {
            name: "search_memory",
            answer: "a remembered fact",
        }));
        let session = session_with(provider.clone(), tools, &DevaConfig::default());

        let result = session
            .chat(&ChatRequest::text("What do you remember?"))
            .await
            .unwrap()
            .reply()
            .unwrap();

        // the final result originates from the second completion
        assert_eq!(result.id, "cmpl-second");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);

        let requests = provider.requests.lock().unwrap();
        let first = &requests[0];
        let second = &requests[1];

        // second-phase list = first-phase messages + assistant tool-call
        // message + one tool result per call
        assert_eq!(second.messages.len(), first.messages.len() + 2);
        let assistant = &second.messages[first.messages.len()];
        assert_eq!(assistant.tool_calls.len(), 1);
        let tool_result = &second.messages[first.messages.len() + 1];
        assert_eq!(tool_result.role, Role::Tool);
        assert_eq!(tool_result.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(tool_result.content, "a remembered fact");

        // tool schemas only go out on the first round
        assert!(!first.tools.is_empty());
        assert!(second.tools.is_empty());
    }

    #[tokio::test]
    async fn empty_tool_answer_becomes_no_data() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(ScriptedProvider::tool_completion(
                "cmpl-1",
                vec![ToolCallRequest {
                    id: "call_1".into(),
                    name: "search_laws".into(),
                    arguments: "{}".into(),
                }],
            )),
            Ok(ScriptedProvider::text_completion("cmpl-2", "done")),
        ]));
        let mut tools = ToolRegistry::new();
        tools.register(Box::new(FixedTool {
            name: "search_laws",
            answer: "",
        }));
        let session = session_with(provider.clone(), tools, &DevaConfig::default());

        session.chat(&ChatRequest::text("laws?")).await.unwrap();

        let requests = provider.requests.lock().unwrap();
        let tool_result = requests[1].messages.last().unwrap();
        assert_eq!(tool_result.content, NO_DATA);
    }

    #[tokio::test]
    async fn unknown_tool_fails_fast_by_default() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(
            ScriptedProvider::tool_completion(
                "cmpl-1",
                vec![ToolCallRequest {
                    id: "call_1".into(),
                    name: "search_weather".into(),
                    arguments: "{}".into(),
                }],
            ),
        )]));
        let session = session_with(provider.clone(), ToolRegistry::new(), &DevaConfig::default());

        let err = session.chat(&ChatRequest::text("weather?")).await.unwrap_err();
        assert!(err.to_string().contains("search_weather"));
        // the second round never ran
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_tool_reported_under_report_policy() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(ScriptedProvider::tool_completion(
                "cmpl-1",
                vec![ToolCallRequest {
                    id: "call_1".into(),
                    name: "search_weather".into(),
                    arguments: "{}".into(),
                }],
            )),
            Ok(ScriptedProvider::text_completion("cmpl-2", "recovered")),
        ]));
        let mut config = DevaConfig::default();
        config.policy.unknown_tool = UnknownToolPolicy::Report;
        let session = session_with(provider.clone(), ToolRegistry::new(), &config);

        let result = session
            .chat(&ChatRequest::text("weather?"))
            .await
            .unwrap()
            .reply()
            .unwrap();
        assert_eq!(result.text, "recovered");

        let requests = provider.requests.lock().unwrap();
        let tool_result = requests[1].messages.last().unwrap();
        assert!(tool_result.content.contains("unknown tool 'search_weather'"));
    }

    #[tokio::test]
    async fn transient_error_propagates_in_strict_mode() {
        let provider = Arc::new(ScriptedProvider::new(vec![Err(
            ProviderError::RateLimited {
                retry_after_secs: 5,
            },
        )]));
        let session = session_with(provider, ToolRegistry::new(), &DevaConfig::default());

        let err = session.chat(&ChatRequest::text("q")).await.unwrap_err();
        assert!(err.to_string().contains("Rate limited"));
    }

    #[tokio::test]
    async fn transient_error_softens_under_soft_fail() {
        let provider = Arc::new(ScriptedProvider::new(vec![Err(ProviderError::ApiError {
            status_code: 500,
            message: "internal error".into(),
        })]));
        let mut config = DevaConfig::default();
        config.policy.transient_errors = TransientErrorPolicy::SoftFail;
        let session = session_with(provider, ToolRegistry::new(), &config);

        match session.chat(&ChatRequest::text("q")).await.unwrap() {
            ChatOutcome::SoftError { error } => assert!(error.contains("internal error")),
            ChatOutcome::Reply(_) => panic!("expected soft error"),
        }
    }

    #[tokio::test]
    async fn non_transient_error_propagates_even_under_soft_fail() {
        let provider = Arc::new(ScriptedProvider::new(vec![Err(
            ProviderError::AuthenticationFailed("bad key".into()),
        )]));
        let mut config = DevaConfig::default();
        config.policy.transient_errors = TransientErrorPolicy::SoftFail;
        let session = session_with(provider, ToolRegistry::new(), &config);

        assert!(session.chat(&ChatRequest::text("q")).await.is_err());
    }

    #[tokio::test]
    async fn override_history_skips_shared_history_updates() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(
            ScriptedProvider::text_completion("cmpl-1", "reply"),
        )]));
        let session = session_with(provider, ToolRegistry::new(), &DevaConfig::default());

        let mut request = ChatRequest::text("q");
        request.options.history = Some(vec![Message::user("supplied")]);
        let result = session.chat(&request).await.unwrap().reply().unwrap();

        assert_eq!(result.text, "reply");
        assert!(session.history().await.is_empty());
        // the cache still updates
        assert!(session.last_response().await.is_some());
    }

    #[tokio::test]
    async fn memory_event_emitted_after_chat() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(
            ScriptedProvider::text_completion("cmpl-1", "the answer"),
        )]));
        let events = Arc::new(EventBus::default());
        let session = ChatSession::new(
            provider,
            Arc::new(ToolRegistry::new()),
            events.clone(),
            &DevaConfig::default(),
        )
        .unwrap();
        let mut rx = events.subscribe();

        let mut request = ChatRequest::text("the question");
        request.agent = serde_json::json!({"key": "deva"});
        session.chat(&request).await.unwrap();

        // first event is the usage notification, then the memory event
        loop {
            let event = rx.recv().await.unwrap();
            if let DevaEvent::MemoryRecorded(mem) = event.as_ref() {
                assert_eq!(mem.q, "the question");
                assert_eq!(mem.a, "the answer");
                assert_eq!(mem.id, "cmpl-1");
                assert_eq!(mem.sha256.len(), 64);
                break;
            }
        }
    }

    #[tokio::test]
    async fn topic_and_location_state() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let session = session_with(provider, ToolRegistry::new(), &DevaConfig::default());

        assert!(session.topic().await.is_none());
        session.set_topic("rust").await;
        session.set_location("the workshop").await;
        assert_eq!(session.topic().await.as_deref(), Some("rust"));
        assert_eq!(session.location().await.as_deref(), Some("the workshop"));
    }
}
