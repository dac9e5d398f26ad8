use crate::lead_filter::{FilteredView, LeadFilter};
use crate::reconcile::{ConversationDelta, ConversationReconciler, MessageDelta, MessageReconciler};
use crate::types::{Conversation, LeadSnapshot, Message};
use std::collections::HashMap;

/// What the console currently shows: selection, filters and the
/// last-rendered signatures.
#[derive(Debug, Default)]
pub struct ConsoleState {
    channel_filter: Option<String>,
    open_conversation: Option<String>,
    conversations: Vec<Conversation>,
    directory: HashMap<String, Conversation>,
    lead_filter: LeadFilter,
    conversation_reconciler: ConversationReconciler,
    message_reconciler: MessageReconciler,
}

impl ConsoleState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channel_filter(&self) -> Option<&str> {
        self.channel_filter.as_deref()
    }

    pub fn open_conversation(&self) -> Option<&str> {
        self.open_conversation.as_deref()
    }

    pub fn conversation(&self, id: &str) -> Option<&Conversation> {
        self.directory.get(id)
    }

    pub fn current_view(&self) -> FilteredView {
        self.lead_filter.apply(&self.conversations)
    }

    pub fn set_channel_filter(&mut self, channel: Option<String>) {
        self.channel_filter = channel
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty());
        self.conversation_reconciler.reset();
    }

    pub fn open(&mut self, conversation_id: Option<String>) {
        self.open_conversation = conversation_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());
        self.message_reconciler.reset();
    }

    /// Applies a lead event and returns the view to publish right away.
    pub fn set_lead(&mut self, snapshot: LeadSnapshot) -> FilteredView {
        self.lead_filter.on_lead(snapshot);
        self.publish()
    }

    pub fn show_all(&mut self) -> FilteredView {
        self.lead_filter.show_all();
        self.publish()
    }

    /// Drops the lead context so the full list shows again.
    pub fn clear_lead(&mut self) -> FilteredView {
        self.lead_filter.clear();
        self.publish()
    }

    fn publish(&mut self) -> FilteredView {
        let view = self.current_view();
        self.conversation_reconciler.mark_rendered(&view.conversations);
        view
    }

    /// Keeps conversations resolvable for sending without touching the view.
    pub fn remember(&mut self, conversations: &[Conversation]) {
        for conv in conversations {
            self.directory.insert(conv.id.clone(), conv.clone());
        }
    }

    /// Records a fetched list and returns the view to render, or `None` when
    /// the visible list did not change.
    pub fn ingest_conversations(&mut self, conversations: Vec<Conversation>) -> Option<FilteredView> {
        self.remember(&conversations);
        self.conversations = conversations;

        let view = self.current_view();
        match self.conversation_reconciler.reconcile(&view.conversations) {
            ConversationDelta::Unchanged => None,
            ConversationDelta::Replace(_) => Some(view),
        }
    }

    /// Messages for a conversation that is no longer open are discarded.
    pub fn ingest_messages(&mut self, conversation_id: &str, messages: &[Message]) -> Option<MessageDelta> {
        if self.open_conversation.as_deref() != Some(conversation_id) {
            return None;
        }
        match self.message_reconciler.reconcile(conversation_id, messages) {
            MessageDelta::Unchanged => None,
            delta => Some(delta),
        }
    }
}
