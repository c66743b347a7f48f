//! LLM-based dialogue summarization
use crate::config::BotConfig;
use crate::core_types::{Message, Role};
use crate::errors::BotError;
use crate::llm::providers::create_llm_client;
use crate::llm::{TimeoutLLM, LLM};
use log::{debug, info, warn};
use std::sync::Arc;

const SUMMARY_INSTRUCTION: &str = "You are an expert at writing short, meaningful summaries of dialogues.\n\
\n\
Write a structured summary of the dialogue that covers:\n\
\n\
GOAL: the main topic or task of the conversation\n\
KEY FACTS: important information the participants shared\n\
OPEN QUESTIONS: what still needs to be discussed or resolved\n\
DECISIONS: what was agreed on or found out\n\
\n\
Be brief and to the point. 100-150 words at most.";

/// Turns a raw dialogue into a compact digest through one completion call.
///
/// The summarizer holds no conversation state; the memory manager decides
/// when to call it and what to do with the result. Any failure, whether
/// transport, malformed response or an empty answer, is logged and reported
/// as `None` so the caller can keep its un-summarized turns.
#[derive(Clone)]
pub struct Summarizer {
    llm: Arc<dyn LLM>,
}

impl Summarizer {
    pub fn new(llm: Arc<dyn LLM>) -> Self {
        Self { llm }
    }

    /// Builds a dedicated client for the summarizer provider using the
    /// `summarizer` section's output cap and temperature instead of the chat
    /// parameters.
    pub fn from_config(config: &BotConfig) -> Result<Self, BotError> {
        let provider = config.summarizer_llm_config().ok_or_else(|| {
            BotError::ProviderNotFound(config.summarizer_provider().to_string())
        })?;
        info!(
            "Summarizer uses provider '{}' (max_tokens {}, temperature {})",
            provider.name, provider.parameters.max_tokens, provider.parameters.temperature
        );
        let client = create_llm_client(&provider)?;
        Ok(Self::new(Arc::new(TimeoutLLM::new(
            client,
            config.request_timeout(),
        ))))
    }

    pub async fn summarize(&self, turns: &[Message]) -> Option<String> {
        if turns.is_empty() {
            return None;
        }

        let request = vec![
            Message::system(SUMMARY_INSTRUCTION),
            Message::user(format!(
                "Summarize this dialogue:\n\n{}",
                format_dialogue(turns)
            )),
        ];

        debug!("Requesting summary of {} turns", turns.len());

        match self.llm.generate(request).await {
            Ok(response) => {
                let summary = response.content.unwrap_or_default().trim().to_string();
                if summary.is_empty() {
                    warn!("Summarization call returned no content");
                    None
                } else {
                    Some(summary)
                }
            }
            Err(e) => {
                warn!("Summarization call failed: {}", e);
                None
            }
        }
    }
}

/// Renders turns as `Speaker: text` blocks separated by blank lines.
pub fn format_dialogue(turns: &[Message]) -> String {
    turns
        .iter()
        .map(|m| {
            let speaker = match m.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
                Role::System => "System",
            };
            format!("{}: {}", speaker, m.content)
        })
        .collect::<Vec<String>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::LLMResponse;
    use crate::errors::BotError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingLLM {
        reply: Result<Option<String>, BotError>,
        seen: Mutex<Vec<Vec<Message>>>,
    }

    impl RecordingLLM {
        fn new(reply: Result<Option<String>, BotError>) -> Arc<Self> {
            Arc::new(Self {
                reply,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LLM for RecordingLLM {
        async fn generate(&self, messages: Vec<Message>) -> Result<LLMResponse, BotError> {
            self.seen.lock().unwrap().push(messages);
            self.reply.clone().map(|content| LLMResponse {
                content,
                finish_reason: None,
                usage: None,
            })
        }
    }

    #[test]
    fn test_format_dialogue() {
        let text = format_dialogue(&[Message::user("Hi"), Message::assistant("Hello")]);
        assert_eq!(text, "User: Hi\n\nAssistant: Hello");
    }

    #[tokio::test]
    async fn test_summary_is_trimmed_and_request_is_structured() {
        let llm = RecordingLLM::new(Ok(Some("  GOAL: plan a trip  \n".to_string())));
        let summarizer = Summarizer::new(llm.clone());

        let summary = summarizer
            .summarize(&[Message::user("Let's plan a trip"), Message::assistant("Sure")])
            .await;
        assert_eq!(summary.as_deref(), Some("GOAL: plan a trip"));

        let seen = llm.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].len(), 2);
        assert_eq!(seen[0][0].role, Role::System);
        assert!(seen[0][0].content.contains("OPEN QUESTIONS"));
        assert_eq!(seen[0][1].role, Role::User);
        assert!(seen[0][1].content.contains("User: Let's plan a trip"));
        assert!(seen[0][1].content.contains("Assistant: Sure"));
    }

    #[tokio::test]
    async fn test_failures_become_none() {
        let failing = Summarizer::new(RecordingLLM::new(Err(BotError::LLMError("503".into()))));
        assert!(failing.summarize(&[Message::user("x")]).await.is_none());

        let blank = Summarizer::new(RecordingLLM::new(Ok(Some("   ".to_string()))));
        assert!(blank.summarize(&[Message::user("x")]).await.is_none());

        let missing = Summarizer::new(RecordingLLM::new(Ok(None)));
        assert!(missing.summarize(&[Message::user("x")]).await.is_none());
    }

    #[test]
    fn test_from_config_requires_a_usable_provider() {
        let mut config = BotConfig::default();
        config.providers[0].auth.api_key = Some("sk-test".to_string());
        assert!(Summarizer::from_config(&config).is_ok());

        config.providers[0].auth.api_key = None;
        assert!(Summarizer::from_config(&config).is_err());

        config.summarizer.provider = Some("missing".to_string());
        assert!(matches!(
            Summarizer::from_config(&config),
            Err(BotError::ProviderNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_dialogue_skips_the_call() {
        let llm = RecordingLLM::new(Ok(Some("unused".to_string())));
        let summarizer = Summarizer::new(llm.clone());

        assert!(summarizer.summarize(&[]).await.is_none());
        assert!(llm.seen.lock().unwrap().is_empty());
    }
}
