use std::fmt;

use tracing::warn;

use crate::rag::Assistant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    User,
    Bot,
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sender::User => write!(f, "user"),
            Sender::Bot => write!(f, "bot"),
        }
    }
}

/// Ordered history of one chat session.
#[derive(Debug, Default)]
pub struct Conversation {
    messages: Vec<(Sender, String)>,
}

impl Conversation {
    pub fn new() -> Self { Self::default() }

    pub fn messages(&self) -> &[(Sender, String)] {
        &self.messages
    }

    pub fn push(&mut self, sender: Sender, message: impl Into<String>) {
        self.messages.push((sender, message.into()));
    }

    /// Records the query and the reply; failures become `Error:` replies so the
    /// session can continue.
    pub async fn ask(&mut self, assistant: &Assistant, query: &str) -> &str {
        self.push(Sender::User, query);
        let reply = match assistant.answer_question(query).await {
            Ok(answer) => answer.text,
            Err(err) => {
                warn!(%err, "question failed");
                format!("Error: {err:#}")
            }
        };
        self.push(Sender::Bot, reply);
        self.messages.last().map(|(_, m)| m.as_str()).unwrap_or_default()
    }
}
