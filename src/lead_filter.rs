use crate::types::{Conversation, LeadSnapshot};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViewState {
    Unfiltered,
    Filtered,
    /// Nothing matched the lead although conversations exist.
    FilteredEmpty,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilteredView {
    pub state: ViewState,
    pub conversations: Vec<Conversation>,
    pub total: usize,
}

fn digits(value: &str) -> String {
    value.chars().filter(char::is_ascii_digit).collect()
}

pub fn phone_matches(a: &str, b: &str) -> bool {
    let (a, b) = (digits(a), digits(b));
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a.contains(&b) || b.contains(&a)
}

pub fn email_matches(a: &str, b: &str) -> bool {
    let (a, b) = (a.trim(), b.trim());
    !a.is_empty() && a.eq_ignore_ascii_case(b)
}

pub fn lead_matches(lead: &LeadSnapshot, conv: &Conversation) -> bool {
    let phone = match (lead.phone.as_deref(), conv.phone_number.as_deref()) {
        (Some(a), Some(b)) => phone_matches(a, b),
        _ => false,
    };
    let email = match (lead.email.as_deref(), conv.email.as_deref()) {
        (Some(a), Some(b)) => email_matches(a, b),
        _ => false,
    };
    phone || email
}

/// Current lead context plus the user's "show all" override.
#[derive(Debug, Clone, Default)]
pub struct LeadFilter {
    snapshot: Option<LeadSnapshot>,
    show_all: bool,
}

impl LeadFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new lead always starts filtered, even after "show all".
    pub fn on_lead(&mut self, snapshot: LeadSnapshot) {
        self.snapshot = Some(snapshot);
        self.show_all = false;
    }

    pub fn show_all(&mut self) {
        self.show_all = true;
    }

    pub fn clear(&mut self) {
        self.snapshot = None;
        self.show_all = false;
    }

    pub fn apply(&self, conversations: &[Conversation]) -> FilteredView {
        let total = conversations.len();
        let lead = match self.snapshot.as_ref() {
            Some(lead) if !self.show_all && lead.has_identity() => lead,
            _ => {
                return FilteredView {
                    state: ViewState::Unfiltered,
                    conversations: conversations.to_vec(),
                    total,
                }
            }
        };

        let matched: Vec<Conversation> = conversations
            .iter()
            .filter(|conv| lead_matches(lead, conv))
            .cloned()
            .collect();
        let state = if matched.is_empty() && total > 0 {
            ViewState::FilteredEmpty
        } else {
            ViewState::Filtered
        };
        FilteredView {
            state,
            conversations: matched,
            total,
        }
    }
}
