//! The classification oracle: one prompt in, one free-text reply out.

use anyhow::Result;

use crate::openrouter::{ChatOptions, Message, OpenRouterClient};

const SYSTEM_PROMPT: &str = "You are a helpful assistant that categorizes questions.";

/// One classification call.
#[derive(Debug, Clone, PartialEq)]
pub struct OracleRequest {
    pub prompt: String,
    pub options: ChatOptions,
}

/// External text-classification service.
#[async_trait::async_trait]
pub trait Oracle: Send + Sync {
    async fn classify(&self, request: &OracleRequest) -> Result<String>;
}

#[async_trait::async_trait]
impl Oracle for OpenRouterClient {
    async fn classify(&self, request: &OracleRequest) -> Result<String> {
        let messages = vec![
            Message::system(SYSTEM_PROMPT),
            Message::user(request.prompt.clone()),
        ];
        self.chat(messages, request.options).await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted oracle shared by tests across the crate.

    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Answers every call with `reply`, failing on the listed call numbers
    /// (1-based). Records every prompt it receives.
    pub struct ScriptedOracle {
        reply: String,
        fail_on: HashSet<usize>,
        pub requests: Mutex<Vec<OracleRequest>>,
    }

    impl ScriptedOracle {
        pub fn replying(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                fail_on: HashSet::new(),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn failing_on(mut self, calls: &[usize]) -> Self {
            self.fail_on.extend(calls.iter().copied());
            self
        }

        pub fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait::async_trait]
    impl Oracle for ScriptedOracle {
        async fn classify(&self, request: &OracleRequest) -> Result<String> {
            let call = {
                let mut requests = self.requests.lock().unwrap();
                requests.push(request.clone());
                requests.len()
            };
            if self.fail_on.contains(&call) {
                anyhow::bail!("oracle unavailable for call {}", call);
            }
            Ok(self.reply.clone())
        }
    }
}
