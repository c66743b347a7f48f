//! Bounded provider calls.
//!
//! Providers are reached over plain HTTP and a hung connection would otherwise
//! stall the chat's turn forever. `TimeoutLLM` wraps any client and turns an
//! overrun into `BotError::Timeout`, which the dispatcher reports to the user.

use crate::core_types::{LLMResponse, Message};
use crate::errors::BotError;
use crate::llm::LLM;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct TimeoutLLM {
    inner: Arc<dyn LLM>,
    timeout: Duration,
}

impl TimeoutLLM {
    pub fn new(inner: Arc<dyn LLM>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl LLM for TimeoutLLM {
    async fn generate(&self, messages: Vec<Message>) -> Result<LLMResponse, BotError> {
        match tokio::time::timeout(self.timeout, self.inner.generate(messages)).await {
            Ok(result) => result,
            Err(_) => {
                log::error!("Provider call exceeded {:?}, abandoning it", self.timeout);
                Err(BotError::Timeout(self.timeout.as_secs()))
            }
        }
    }
}
