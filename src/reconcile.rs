//! Diffing of freshly fetched lists against what the console last rendered.
//!
//! An unchanged signature means the tick produces no render at all.

use crate::types::{Conversation, Message};
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollIntent {
    Bottom,
    Preserve,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConversationDelta {
    Unchanged,
    Replace(Vec<Conversation>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessageDelta {
    Unchanged,
    /// First load for the open conversation.
    Replace(Vec<Message>),
    /// Only messages whose id was never rendered before.
    Append(Vec<Message>),
}

impl MessageDelta {
    pub fn scroll(&self) -> ScrollIntent {
        match self {
            Self::Unchanged => ScrollIntent::Preserve,
            Self::Replace(_) | Self::Append(_) => ScrollIntent::Bottom,
        }
    }

    pub fn mode(&self) -> Option<&'static str> {
        match self {
            Self::Unchanged => None,
            Self::Replace(_) => Some("replace"),
            Self::Append(_) => Some("append"),
        }
    }

    pub fn messages(&self) -> &[Message] {
        match self {
            Self::Unchanged => &[],
            Self::Replace(items) | Self::Append(items) => items,
        }
    }
}

#[derive(Debug, Default)]
pub struct ConversationReconciler {
    signature: Option<(usize, Option<String>)>,
}

impl ConversationReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reconcile(&mut self, conversations: &[Conversation]) -> ConversationDelta {
        let signature = (conversations.len(), conversations.first().map(|c| c.id.clone()));
        if self.signature.as_ref() == Some(&signature) {
            return ConversationDelta::Unchanged;
        }
        self.signature = Some(signature);
        ConversationDelta::Replace(conversations.to_vec())
    }

    /// Records a list that was already pushed outside the polling path.
    pub fn mark_rendered(&mut self, conversations: &[Conversation]) {
        self.signature = Some((conversations.len(), conversations.first().map(|c| c.id.clone())));
    }

    /// Forces the next reconcile to render.
    pub fn reset(&mut self) {
        self.signature = None;
    }
}

#[derive(Debug, Default)]
pub struct MessageReconciler {
    conversation_id: Option<String>,
    signature: Option<(usize, Option<String>)>,
    rendered: HashSet<String>,
}

impl MessageReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn rendered_count(&self) -> usize {
        self.rendered.len()
    }

    pub fn reconcile(&mut self, conversation_id: &str, messages: &[Message]) -> MessageDelta {
        if self.conversation_id.as_deref() != Some(conversation_id) {
            self.reset();
            self.conversation_id = Some(conversation_id.to_string());
        }

        let signature = (messages.len(), messages.last().map(|m| m.id.clone()));
        if self.signature.as_ref() == Some(&signature) {
            return MessageDelta::Unchanged;
        }
        self.signature = Some(signature);

        if self.rendered.is_empty() {
            self.rendered = messages.iter().map(|m| m.id.clone()).collect();
            return MessageDelta::Replace(messages.to_vec());
        }

        let fresh: Vec<Message> = messages
            .iter()
            .filter(|m| !self.rendered.contains(&m.id))
            .cloned()
            .collect();
        if fresh.is_empty() {
            return MessageDelta::Unchanged;
        }
        self.rendered.extend(fresh.iter().map(|m| m.id.clone()));
        MessageDelta::Append(fresh)
    }

    pub fn reset(&mut self) {
        self.conversation_id = None;
        self.signature = None;
        self.rendered.clear();
    }
}

/// Pixel model of the message pane, used to check scroll behaviour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub scroll_offset: f64,
    pub content_height: f64,
    pub view_height: f64,
}

const BOTTOM_TOLERANCE: f64 = 4.0;

impl Viewport {
    pub fn max_offset(&self) -> f64 {
        (self.content_height - self.view_height).max(0.0)
    }

    pub fn is_at_bottom(&self) -> bool {
        self.max_offset() - self.scroll_offset <= BOTTOM_TOLERANCE
    }

    /// Grows the content by `added_height` and moves the offset as the intent asks.
    pub fn apply(&mut self, intent: ScrollIntent, added_height: f64) {
        self.content_height += added_height.max(0.0);
        if intent == ScrollIntent::Bottom {
            self.scroll_offset = self.max_offset();
        }
    }
}
