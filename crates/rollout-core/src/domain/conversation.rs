use crate::domain::message::{AuditEntry, Message};
use crate::error::{AgentError, Result};

/// Private conversation of one rollout.
///
/// Two parallel views are kept: `messages` is exactly what the model sees on
/// the next call, `audit` is the display history with parsed tool calls and
/// tool-role results. Both are append-only, and nothing may be appended once
/// the conversation is terminated.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationState {
    messages: Vec<Message>,
    audit: Vec<AuditEntry>,
    terminated: bool,
    round_count: u32,
}

impl ConversationState {
    /// Start from the prompt builder's initial messages.
    pub fn new(initial: Vec<Message>) -> Self {
        let audit = initial.iter().cloned().map(AuditEntry::from).collect();
        Self {
            messages: initial,
            audit,
            terminated: false,
            round_count: 0,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn audit(&self) -> &[AuditEntry] {
        &self.audit
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn round_count(&self) -> u32 {
        self.round_count
    }

    pub(crate) fn push_message(&mut self, message: Message) -> Result<()> {
        if self.terminated {
            return Err(AgentError::ConversationClosed { role: message.role });
        }
        self.messages.push(message);
        Ok(())
    }

    pub(crate) fn push_audit(&mut self, entry: AuditEntry) -> Result<()> {
        if self.terminated {
            return Err(AgentError::ConversationClosed { role: entry.role });
        }
        self.audit.push(entry);
        Ok(())
    }

    pub(crate) fn mark_terminated(&mut self) {
        self.terminated = true;
    }

    pub(crate) fn finish_round(&mut self) {
        self.round_count += 1;
    }

    /// Content of the last assistant entry with visible text, if any.
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.audit
            .iter()
            .rev()
            .filter(|e| e.role == crate::domain::Role::Assistant)
            .map(|e| e.content.as_str())
            .find(|c| !c.trim().is_empty())
    }
}
