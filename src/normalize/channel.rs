use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DisplayChannel {
    WhatsApp,
    Instagram,
    Facebook,
    Sms,
    Line,
    WeChat,
    Web,
    /// Carries the raw tag so it can still be shown.
    Unknown(String),
}

impl DisplayChannel {
    pub fn label(&self) -> &str {
        match self {
            Self::WhatsApp => "WhatsApp",
            Self::Instagram => "Instagram",
            Self::Facebook => "Facebook",
            Self::Sms => "SMS",
            Self::Line => "LINE",
            Self::WeChat => "WeChat",
            Self::Web => "Web",
            Self::Unknown(raw) => raw,
        }
    }

    /// Channel name the send endpoint expects.
    pub fn wire_name(&self) -> &str {
        match self {
            Self::WhatsApp => "whatsapp",
            Self::Instagram => "instagram",
            Self::Facebook => "facebook",
            Self::Sms => "sms",
            Self::Line => "line",
            Self::WeChat => "wechat",
            Self::Web => "web",
            Self::Unknown(raw) => raw,
        }
    }

    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "whatsapp" => Self::WhatsApp,
            "instagram" => Self::Instagram,
            "facebook" => Self::Facebook,
            "sms" => Self::Sms,
            "line" => Self::Line,
            "wechat" => Self::WeChat,
            "web" => Self::Web,
            _ => Self::Unknown(label.trim().to_string()),
        }
    }
}

impl fmt::Display for DisplayChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for DisplayChannel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for DisplayChannel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Ok(Self::from_label(&label))
    }
}

/// Filter keyword table; a filter value outside it matches on itself.
fn filter_keywords(target: &str) -> Vec<&str> {
    match target {
        "whatsapp" => vec!["whatsapp", "whatsapp360dialog", "whatsappcloudapi"],
        "instagram" => vec!["instagram"],
        "facebook" => vec!["facebook"],
        "sms" => vec!["sms"],
        "line" => vec!["line"],
        "wechat" => vec!["wechat", "weixin"],
        "web" => vec!["web", "webclient"],
        other => vec![other],
    }
}

/// Instagram beats everything, WhatsApp beats the rest, then
/// Facebook > SMS > LINE > WeChat > Web. No tags at all means the
/// deployment default, WhatsApp.
pub fn resolve_display_channel(tags: &[String]) -> DisplayChannel {
    let Some(first) = tags.first() else {
        return DisplayChannel::WhatsApp;
    };
    let any = |needles: &[&str]| tags.iter().any(|t| needles.iter().any(|n| t.contains(n)));

    if any(&["instagram"]) {
        DisplayChannel::Instagram
    } else if any(&["whatsapp"]) {
        DisplayChannel::WhatsApp
    } else if any(&["facebook"]) {
        DisplayChannel::Facebook
    } else if any(&["sms"]) {
        DisplayChannel::Sms
    } else if any(&["line"]) {
        DisplayChannel::Line
    } else if any(&["wechat", "weixin"]) {
        DisplayChannel::WeChat
    } else if any(&["web"]) {
        DisplayChannel::Web
    } else {
        DisplayChannel::Unknown(first.clone())
    }
}

/// Keyword containment against the tags. A non-WhatsApp filter excludes any
/// conversation that also carries a WhatsApp tag.
pub fn matches_channel_filter(tags: &[String], filter: &str) -> bool {
    let target = filter.trim().to_lowercase();
    if target.is_empty() {
        return true;
    }
    let haystack = tags.join(" ").to_lowercase();
    if target != "whatsapp" && haystack.contains("whatsapp") {
        return false;
    }
    filter_keywords(&target)
        .iter()
        .any(|keyword| haystack.contains(keyword))
}
