//! Transport-neutral message handling.
//!
//! A transport (the HTTP relay, a chat adapter) hands every inbound text to
//! `Dispatcher::handle_message` and sends back whatever `Reply` comes out.
//! Slash commands are answered directly; anything else is a conversation turn:
//! record it, summarize when the threshold is crossed, ask the chat's provider
//! with the memory context and record the answer.
//!
//! `/spec` switches a chat into the specification-writing agent mode. Those
//! turns go to the agent provider with their own short-lived log and never
//! touch conversation memory; the mode ends on `/exit` or when the agent
//! reports `TASK_COMPLETE_MARKER`.

use crate::core_types::Message;
use crate::errors::BotError;
use crate::format::ResponseFormat;
use crate::llm::ProviderRegistry;
use crate::memory::{ConversationLocks, ConversationMemoryManager};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

pub const NO_ANSWER_REPLY: &str = "No answer from the model.";
pub const PROVIDER_ERROR_REPLY: &str = "Error while contacting the model provider.";

/// Answers containing this line end the spec session.
pub const TASK_COMPLETE_MARKER: &str = "Task complete. Stopping now";

const FORMAT_CHOICES: &str = "/format json | /format markdown | /format default";

const SPEC_AGENT_PROMPT: &str = "You are a requirements analyst. Help the user turn a project idea into a \
complete technical specification. Ask short clarifying questions, one topic at a time, about goals, users, \
features, constraints, integrations and acceptance criteria. Once you have enough detail, write the full \
specification as a structured document with numbered sections, then end your message with the line \
\"✅ Task complete. Stopping now.\" Never write that line before the specification is finished.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reply {
    pub text: String,
    pub format: ResponseFormat,
}

impl Reply {
    fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            format: ResponseFormat::Default,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChatMode {
    #[default]
    Default,
    Spec,
}

/// Per-chat settings. An entry equal to the default is dropped from the map.
#[derive(Debug, Clone, Default, PartialEq)]
struct ChatPreferences {
    format: Option<ResponseFormat>,
    provider: Option<String>,
    mode: ChatMode,
    spec_turns: Vec<Message>,
}

enum Command<'a> {
    Start,
    Format(Option<&'a str>),
    Provider(Option<&'a str>),
    Stats,
    Clear,
    Spec,
    Exit,
}

impl<'a> Command<'a> {
    /// Recognizes `/name [arg]`, tolerating a `@botname` suffix on the name.
    fn parse(text: &'a str) -> Option<Self> {
        let rest = text.strip_prefix('/')?;
        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, Some(arg.trim()).filter(|a| !a.is_empty())),
            None => (rest, None),
        };
        let name = name.split('@').next().unwrap_or(name);

        match name.to_ascii_lowercase().as_str() {
            "start" => Some(Command::Start),
            "format" => Some(Command::Format(arg)),
            "provider" => Some(Command::Provider(arg)),
            "stats" => Some(Command::Stats),
            "clear" => Some(Command::Clear),
            "spec" => Some(Command::Spec),
            "exit" => Some(Command::Exit),
            _ => None,
        }
    }
}

pub struct Dispatcher {
    memory: Arc<ConversationMemoryManager>,
    providers: ProviderRegistry,
    locks: ConversationLocks,
    preferences: Mutex<HashMap<String, ChatPreferences>>,
    default_format: ResponseFormat,
    agent_provider: String,
}

impl Dispatcher {
    pub fn new(
        memory: Arc<ConversationMemoryManager>,
        providers: ProviderRegistry,
        default_format: ResponseFormat,
    ) -> Self {
        let agent_provider = providers.default_provider().to_string();
        Self {
            memory,
            providers,
            locks: ConversationLocks::new(),
            preferences: Mutex::new(HashMap::new()),
            default_format,
            agent_provider,
        }
    }

    /// Provider answering `/spec` sessions. Defaults to the registry default.
    pub fn with_agent_provider(mut self, name: impl Into<String>) -> Self {
        self.agent_provider = name.into();
        self
    }

    pub fn memory(&self) -> &Arc<ConversationMemoryManager> {
        &self.memory
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    pub fn locks(&self) -> &ConversationLocks {
        &self.locks
    }

    pub fn format_for(&self, chat_id: &str) -> ResponseFormat {
        self.preferences()
            .get(chat_id)
            .and_then(|p| p.format)
            .unwrap_or(self.default_format)
    }

    pub fn provider_for(&self, chat_id: &str) -> String {
        self.preferences()
            .get(chat_id)
            .and_then(|p| p.provider.clone())
            .unwrap_or_else(|| self.providers.default_provider().to_string())
    }

    pub fn mode_for(&self, chat_id: &str) -> ChatMode {
        self.preferences()
            .get(chat_id)
            .map(|p| p.mode)
            .unwrap_or_default()
    }

    /// Handle one inbound text. Blank input produces no reply.
    pub async fn handle_message(&self, chat_id: &str, text: &str) -> Option<Reply> {
        let text = text.trim();
        if text.is_empty() {
            debug!("Ignoring empty message from chat {}", chat_id);
            return None;
        }

        let reply = match Command::parse(text) {
            Some(Command::Start) => self.welcome(chat_id),
            Some(Command::Format(arg)) => self.switch_format(chat_id, arg),
            Some(Command::Provider(arg)) => self.switch_provider(chat_id, arg),
            Some(Command::Stats) => self.stats(chat_id),
            Some(Command::Clear) => self.clear(chat_id).await,
            Some(Command::Spec) => self.enter_spec(chat_id),
            Some(Command::Exit) => self.exit_spec(chat_id),
            None if self.mode_for(chat_id) == ChatMode::Spec => {
                self.spec_turn(chat_id, text).await
            }
            None => self.answer(chat_id, text).await,
        };
        Some(reply)
    }

    fn welcome(&self, chat_id: &str) -> Reply {
        Reply::plain(format!(
            "Hi! Ask me anything and I will answer with the active model.\n\n\
             Choose how answers are formatted:\n\
             - /format json\n\
             - /format markdown\n\
             - /format default\n\n\
             The active provider is {}. Send /provider to change it.\n\
             /stats shows what I remember about this chat, /clear forgets it.\n\
             /spec starts the specification agent, /exit leaves it.",
            self.provider_for(chat_id).to_uppercase()
        ))
    }

    fn switch_format(&self, chat_id: &str, arg: Option<&str>) -> Reply {
        let Some(arg) = arg else {
            return Reply::plain(format!(
                "Current format: {}\nAvailable: {}",
                self.format_for(chat_id).as_str().to_uppercase(),
                FORMAT_CHOICES
            ));
        };

        match arg.parse::<ResponseFormat>() {
            Ok(format) => {
                self.update_preferences(chat_id, |p| p.format = Some(format));
                info!("Chat {} switched format to {}", chat_id, format);
                Reply::plain(format!("Response format set to: {}", format.describe()))
            }
            Err(_) => Reply::plain(format!(
                "Unknown format '{}'. Available: {}",
                arg, FORMAT_CHOICES
            )),
        }
    }

    fn switch_provider(&self, chat_id: &str, arg: Option<&str>) -> Reply {
        let current = self.provider_for(chat_id);

        let Some(name) = arg else {
            let listing = self
                .providers
                .names()
                .into_iter()
                .map(|name| {
                    if name == current {
                        format!("- {} (active)", name)
                    } else {
                        format!("- {}", name)
                    }
                })
                .collect::<Vec<String>>()
                .join("\n");
            return Reply::plain(format!(
                "Available providers:\n{}\n\nSend /provider <name> to switch.",
                listing
            ));
        };

        let name = name.to_ascii_lowercase();
        if !self.providers.contains(&name) {
            return Reply::plain(format!(
                "Unknown provider '{}'. Available: {}",
                name,
                self.providers.names().join(", ")
            ));
        }

        self.update_preferences(chat_id, |p| p.provider = Some(name.clone()));
        info!("Chat {} switched provider to {}", chat_id, name);
        Reply::plain(format!("Provider switched to {}.", name.to_uppercase()))
    }

    fn stats(&self, chat_id: &str) -> Reply {
        match self.memory.get_stats(chat_id) {
            Some(stats) => {
                let summary = if stats.has_summary {
                    format!("yes ({} chars)", stats.summary_length)
                } else {
                    "no".to_string()
                };
                Reply::plain(format!(
                    "Conversation stats:\n\
                     - user turns since last summary: {}\n\
                     - stored turns: {}\n\
                     - summary: {}",
                    stats.message_count, stats.messages_length, summary
                ))
            }
            None => Reply::plain("No conversation history yet."),
        }
    }

    async fn clear(&self, chat_id: &str) -> Reply {
        let _guard = self.locks.lock(chat_id).await;
        self.memory.clear_conversation(chat_id).await;
        self.preferences().remove(chat_id);
        Reply::plain("Conversation memory cleared.")
    }

    fn enter_spec(&self, chat_id: &str) -> Reply {
        self.update_preferences(chat_id, |p| {
            p.mode = ChatMode::Spec;
            p.spec_turns.clear();
        });
        info!("Chat {} entered spec mode", chat_id);
        Reply::plain(
            "Spec mode is on. Describe your project and I will collect the details \
             and write a finished specification.\n\nSend /exit to leave this mode.",
        )
    }

    fn exit_spec(&self, chat_id: &str) -> Reply {
        self.update_preferences(chat_id, |p| {
            p.mode = ChatMode::Default;
            p.spec_turns.clear();
        });
        info!("Chat {} left spec mode", chat_id);
        Reply::plain("Back to normal chat mode.")
    }

    async fn spec_turn(&self, chat_id: &str, text: &str) -> Reply {
        let _guard = self.locks.lock(chat_id).await;

        let mut request = vec![Message::system(SPEC_AGENT_PROMPT)];
        self.update_preferences(chat_id, |p| {
            if p.mode == ChatMode::Spec {
                p.spec_turns.push(Message::user(text));
            }
            request.extend(p.spec_turns.iter().cloned());
        });
        debug!(
            "Asking agent provider '{}' for chat {} with {} spec turns",
            self.agent_provider,
            chat_id,
            request.len() - 1
        );

        let llm = match self.providers.get(&self.agent_provider) {
            Ok(llm) => llm,
            Err(e) => {
                error!("Chat {}: {}", chat_id, e);
                return Reply::plain(PROVIDER_ERROR_REPLY);
            }
        };

        let text = match llm.generate(request).await {
            Ok(response) => match answer_text(response.content) {
                Some(answer) => {
                    let finished = answer.contains(TASK_COMPLETE_MARKER);
                    self.update_preferences(chat_id, |p| {
                        if finished {
                            p.mode = ChatMode::Default;
                            p.spec_turns.clear();
                        } else if p.mode == ChatMode::Spec {
                            p.spec_turns.push(Message::assistant(answer.clone()));
                        }
                    });
                    if finished {
                        info!("Agent finished the spec session for chat {}", chat_id);
                    }
                    answer
                }
                None => {
                    warn!(
                        "Agent provider '{}' returned an empty answer for chat {}",
                        self.agent_provider, chat_id
                    );
                    NO_ANSWER_REPLY.to_string()
                }
            },
            Err(e) => fallback_text(&self.agent_provider, chat_id, e),
        };

        Reply::plain(text)
    }

    async fn answer(&self, chat_id: &str, text: &str) -> Reply {
        let _guard = self.locks.lock(chat_id).await;
        let format = self.format_for(chat_id);
        let provider = self.provider_for(chat_id);

        if self.memory.add_user_message(chat_id, text).await {
            info!("Conversation {} reached the summary threshold", chat_id);
            self.memory.create_summary(chat_id).await;
        }

        let context: Vec<Message> = format.apply(self.memory.get_context_for_provider(chat_id));
        debug!(
            "Asking provider '{}' for chat {} with {} context turns",
            provider,
            chat_id,
            context.len()
        );

        let llm = match self.providers.get(&provider) {
            Ok(llm) => llm,
            Err(e) => {
                error!("Chat {}: {}", chat_id, e);
                return Reply {
                    text: PROVIDER_ERROR_REPLY.to_string(),
                    format,
                };
            }
        };

        let text = match llm.generate(context).await {
            Ok(response) => match answer_text(response.content) {
                Some(answer) => {
                    self.memory.add_assistant_message(chat_id, &answer).await;
                    answer
                }
                None => {
                    warn!("Provider '{}' returned an empty answer for chat {}", provider, chat_id);
                    NO_ANSWER_REPLY.to_string()
                }
            },
            Err(e) => fallback_text(&provider, chat_id, e),
        };

        Reply { text, format }
    }

    fn preferences(&self) -> MutexGuard<'_, HashMap<String, ChatPreferences>> {
        self.preferences
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn update_preferences(&self, chat_id: &str, update: impl FnOnce(&mut ChatPreferences)) {
        let mut preferences = self.preferences();
        let entry = preferences.entry(chat_id.to_string()).or_default();
        update(entry);
        if *entry == ChatPreferences::default() {
            preferences.remove(chat_id);
        }
    }

    #[cfg(test)]
    fn tracked_chats(&self) -> usize {
        self.preferences().len()
    }
}

fn answer_text(content: Option<String>) -> Option<String> {
    content
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}

fn fallback_text(provider: &str, chat_id: &str, error: BotError) -> String {
    match error {
        BotError::Timeout(secs) => format!(
            "The model took too long to answer (more than {} s). Please try again.",
            secs
        ),
        e => {
            error!("Provider '{}' failed for chat {}: {}", provider, chat_id, e);
            PROVIDER_ERROR_REPLY.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::{LLMResponse, Role};
    use crate::llm::{Summarizer, LLM};
    use crate::memory::MemoryStore;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use tempfile::TempDir;

    #[derive(Default)]
    struct ScriptedLLM {
        replies: Mutex<VecDeque<Result<LLMResponse, BotError>>>,
        requests: Mutex<Vec<Vec<Message>>>,
    }

    impl ScriptedLLM {
        fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn push(&self, reply: Result<LLMResponse, BotError>) {
            self.replies.lock().unwrap().push_back(reply);
        }

        fn last_request(&self) -> Vec<Message> {
            self.requests.lock().unwrap().last().cloned().unwrap_or_default()
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LLM for ScriptedLLM {
        async fn generate(&self, messages: Vec<Message>) -> Result<LLMResponse, BotError> {
            self.requests.lock().unwrap().push(messages);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(LLMResponse::text("ok")))
        }
    }

    struct Fixture {
        _dir: TempDir,
        dispatcher: Dispatcher,
        openai: Arc<ScriptedLLM>,
        yandex: Arc<ScriptedLLM>,
        agent: Arc<ScriptedLLM>,
        summarizer: Arc<ScriptedLLM>,
    }

    fn fixture(max: usize, keep: usize) -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new(dir.path().join("memory.json")));
        let summarizer = ScriptedLLM::new();
        let memory = Arc::new(
            ConversationMemoryManager::new(store, Summarizer::new(summarizer.clone()))
                .with_thresholds(max, keep),
        );

        let openai = ScriptedLLM::new();
        let yandex = ScriptedLLM::new();
        let agent = ScriptedLLM::new();
        let mut registry = ProviderRegistry::new("openai");
        registry.register("openai", openai.clone());
        registry.register("yandex", yandex.clone());
        registry.register("kimi", agent.clone());

        Fixture {
            _dir: dir,
            dispatcher: Dispatcher::new(memory, registry, ResponseFormat::Default)
                .with_agent_provider("kimi"),
            openai,
            yandex,
            agent,
            summarizer,
        }
    }

    #[tokio::test]
    async fn test_blank_message_gets_no_reply() {
        let f = fixture(5, 2);
        assert!(f.dispatcher.handle_message("1", "  \n ").await.is_none());
        assert_eq!(f.openai.calls(), 0);
    }

    #[tokio::test]
    async fn test_turn_is_recorded_on_both_sides() {
        let f = fixture(5, 2);
        f.openai.push(Ok(LLMResponse::text("  Paris  ")));

        let reply = f.dispatcher.handle_message("1", "Capital of France?").await.unwrap();
        assert_eq!(reply.text, "Paris");
        assert_eq!(reply.format, ResponseFormat::Default);

        assert_eq!(
            f.dispatcher.memory().get_context_for_provider("1"),
            vec![Message::user("Capital of France?"), Message::assistant("Paris")]
        );
        assert_eq!(f.openai.last_request(), vec![Message::user("Capital of France?")]);
    }

    #[tokio::test]
    async fn test_format_prompt_is_sent_and_reported() {
        let f = fixture(5, 2);

        let reply = f.dispatcher.handle_message("1", "/format JSON").await.unwrap();
        assert!(reply.text.contains("JSON (strict)"));

        let reply = f.dispatcher.handle_message("1", "hello").await.unwrap();
        assert_eq!(reply.format, ResponseFormat::Json);

        let request = f.openai.last_request();
        assert_eq!(request[0].role, Role::System);
        assert!(request[0].content.contains("strict JSON"));
        assert_eq!(request[1], Message::user("hello"));

        // the prompt is never stored as a turn
        assert_eq!(f.dispatcher.memory().get_stats("1").unwrap().messages_length, 2);
    }

    #[tokio::test]
    async fn test_format_without_argument_shows_current_and_bad_value_is_rejected() {
        let f = fixture(5, 2);

        let reply = f.dispatcher.handle_message("1", "/format").await.unwrap();
        assert!(reply.text.contains("Current format: DEFAULT"));

        let reply = f.dispatcher.handle_message("1", "/format yaml").await.unwrap();
        assert!(reply.text.starts_with("Unknown format 'yaml'"));
        assert_eq!(f.dispatcher.format_for("1"), ResponseFormat::Default);
    }

    #[tokio::test]
    async fn test_provider_switch_is_per_chat() {
        let f = fixture(5, 2);

        let listing = f.dispatcher.handle_message("1", "/provider").await.unwrap();
        assert!(listing.text.contains("- openai (active)"));
        assert!(listing.text.contains("- yandex"));

        let reply = f.dispatcher.handle_message("1", "/provider yandex").await.unwrap();
        assert_eq!(reply.text, "Provider switched to YANDEX.");

        f.dispatcher.handle_message("1", "hi").await;
        f.dispatcher.handle_message("2", "hi").await;
        assert_eq!(f.yandex.calls(), 1);
        assert_eq!(f.openai.calls(), 1);

        let reply = f.dispatcher.handle_message("1", "/provider nope").await.unwrap();
        assert!(reply.text.starts_with("Unknown provider 'nope'"));
        assert_eq!(f.dispatcher.provider_for("1"), "yandex");
    }

    #[tokio::test]
    async fn test_provider_failures_become_fallback_replies() {
        let f = fixture(5, 2);
        f.openai.push(Err(BotError::LLMError("connection refused".into())));
        f.openai.push(Err(BotError::Timeout(60)));
        f.openai.push(Ok(LLMResponse {
            content: None,
            finish_reason: None,
            usage: None,
        }));

        let reply = f.dispatcher.handle_message("1", "one").await.unwrap();
        assert_eq!(reply.text, PROVIDER_ERROR_REPLY);

        let reply = f.dispatcher.handle_message("1", "two").await.unwrap();
        assert!(reply.text.contains("took too long"));

        let reply = f.dispatcher.handle_message("1", "three").await.unwrap();
        assert_eq!(reply.text, NO_ANSWER_REPLY);

        // fallbacks are not remembered as assistant turns
        let context = f.dispatcher.memory().get_context_for_provider("1");
        assert!(context.iter().all(|m| m.role == Role::User));
        assert_eq!(context.len(), 3);
    }

    #[tokio::test]
    async fn test_threshold_summarizes_before_asking() {
        let f = fixture(2, 1);
        f.summarizer.push(Ok(LLMResponse::text("GOAL: weather chat")));

        f.dispatcher.handle_message("1", "Is it sunny?").await;
        f.dispatcher.handle_message("1", "And tomorrow?").await;

        assert_eq!(f.summarizer.calls(), 1);
        let request = f.openai.last_request();
        assert_eq!(request.len(), 2);
        assert!(request[0].content.contains("GOAL: weather chat"));
        assert_eq!(request[1], Message::user("And tomorrow?"));
    }

    #[tokio::test]
    async fn test_stats_and_clear_commands() {
        let f = fixture(5, 2);

        let reply = f.dispatcher.handle_message("1", "/stats").await.unwrap();
        assert_eq!(reply.text, "No conversation history yet.");

        f.dispatcher.handle_message("1", "hello").await;
        let reply = f.dispatcher.handle_message("1", "/stats").await.unwrap();
        assert!(reply.text.contains("user turns since last summary: 1"));
        assert!(reply.text.contains("stored turns: 2"));
        assert!(reply.text.contains("summary: no"));

        let reply = f.dispatcher.handle_message("1", "/clear").await.unwrap();
        assert_eq!(reply.text, "Conversation memory cleared.");
        assert!(f.dispatcher.memory().get_stats("1").is_none());
    }

    #[tokio::test]
    async fn test_commands_tolerate_bot_suffix_and_unknown_ones_are_text() {
        let f = fixture(5, 2);

        let reply = f.dispatcher.handle_message("1", "/start@relay_bot").await.unwrap();
        assert!(reply.text.contains("OPENAI"));
        assert_eq!(f.openai.calls(), 0);

        f.dispatcher.handle_message("1", "/weather Paris").await;
        assert_eq!(f.openai.last_request(), vec![Message::user("/weather Paris")]);
    }

    #[tokio::test]
    async fn test_clear_also_forgets_chat_preferences() {
        let f = fixture(5, 2);

        f.dispatcher.handle_message("1", "/format json").await;
        f.dispatcher.handle_message("1", "/provider yandex").await;
        f.dispatcher.handle_message("2", "/format markdown").await;
        assert_eq!(f.dispatcher.tracked_chats(), 2);

        f.dispatcher.handle_message("1", "/clear").await;
        assert_eq!(f.dispatcher.format_for("1"), ResponseFormat::Default);
        assert_eq!(f.dispatcher.provider_for("1"), "openai");
        assert_eq!(f.dispatcher.format_for("2"), ResponseFormat::Markdown);
        assert_eq!(f.dispatcher.tracked_chats(), 1);
    }

    #[tokio::test]
    async fn test_spec_mode_routes_turns_to_the_agent_provider() {
        let f = fixture(5, 2);

        let reply = f.dispatcher.handle_message("1", "/spec").await.unwrap();
        assert!(reply.text.contains("/exit"));
        assert_eq!(f.dispatcher.mode_for("1"), ChatMode::Spec);

        f.agent.push(Ok(LLMResponse::text("Who are the users?")));
        let reply = f.dispatcher.handle_message("1", "A todo app").await.unwrap();
        assert_eq!(reply.text, "Who are the users?");

        f.dispatcher.handle_message("1", "Small teams").await;
        let request = f.agent.last_request();
        assert_eq!(request[0].role, Role::System);
        assert!(request[0].content.contains(TASK_COMPLETE_MARKER));
        assert_eq!(
            request[1..].to_vec(),
            vec![
                Message::user("A todo app"),
                Message::assistant("Who are the users?"),
                Message::user("Small teams"),
            ]
        );

        // spec turns stay out of conversation memory and other chats
        assert_eq!(f.openai.calls(), 0);
        assert!(f.dispatcher.memory().get_stats("1").is_none());
        assert_eq!(f.dispatcher.mode_for("2"), ChatMode::Default);
    }

    #[tokio::test]
    async fn test_exit_returns_to_normal_chat() {
        let f = fixture(5, 2);

        f.dispatcher.handle_message("1", "/spec").await;
        f.dispatcher.handle_message("1", "A todo app").await;

        let reply = f.dispatcher.handle_message("1", "/exit").await.unwrap();
        assert_eq!(reply.text, "Back to normal chat mode.");
        assert_eq!(f.dispatcher.mode_for("1"), ChatMode::Default);
        assert_eq!(f.dispatcher.tracked_chats(), 0);

        f.dispatcher.handle_message("1", "hello").await;
        assert_eq!(f.openai.last_request(), vec![Message::user("hello")]);
        assert_eq!(f.agent.calls(), 1);

        // a new session starts with an empty log
        f.dispatcher.handle_message("1", "/spec").await;
        f.dispatcher.handle_message("1", "A chat bot").await;
        assert_eq!(f.agent.last_request().len(), 2);
    }

    #[tokio::test]
    async fn test_spec_mode_stops_when_the_agent_reports_completion() {
        let f = fixture(5, 2);
        f.dispatcher.handle_message("1", "/spec").await;

        f.agent.push(Ok(LLMResponse::text(
            "# Spec\n1. Goals\n\n✅ Task complete. Stopping now.",
        )));
        let reply = f.dispatcher.handle_message("1", "Write it up").await.unwrap();
        assert!(reply.text.starts_with("# Spec"));
        assert_eq!(f.dispatcher.mode_for("1"), ChatMode::Default);

        f.dispatcher.handle_message("1", "thanks").await;
        assert_eq!(f.agent.calls(), 1);
        assert_eq!(f.openai.last_request(), vec![Message::user("thanks")]);
    }

    #[tokio::test]
    async fn test_spec_mode_failures_use_fallback_replies() {
        let f = fixture(5, 2);
        f.dispatcher.handle_message("1", "/spec").await;

        f.agent.push(Err(BotError::LLMError("connection refused".into())));
        let reply = f.dispatcher.handle_message("1", "A todo app").await.unwrap();
        assert_eq!(reply.text, PROVIDER_ERROR_REPLY);
        assert_eq!(f.dispatcher.mode_for("1"), ChatMode::Spec);

        f.agent.push(Ok(LLMResponse::text("   ")));
        let reply = f.dispatcher.handle_message("1", "still there?").await.unwrap();
        assert_eq!(reply.text, NO_ANSWER_REPLY);
    }
}
