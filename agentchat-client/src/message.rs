//! Chat message data model.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::execution::MetaStep;

pub const GREETING: &str = "Hello! I'm your AI assistant. How can I help you today?";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// User rating of an assistant reply. On the wire: `true`, `false` or `null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<bool>", into = "Option<bool>")]
pub enum Feedback {
    #[default]
    Unset,
    Good,
    Bad,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vote {
    Up,
    Down,
}

impl Feedback {
    /// Rating after clicking `vote`: clicking the active vote again clears it.
    pub fn toggle(self, vote: Vote) -> Feedback {
        match (self, vote) {
            (Feedback::Good, Vote::Up) | (Feedback::Bad, Vote::Down) => Feedback::Unset,
            (_, Vote::Up) => Feedback::Good,
            (_, Vote::Down) => Feedback::Bad,
        }
    }

    pub fn as_option(self) -> Option<bool> {
        self.into()
    }
}

impl From<Option<bool>> for Feedback {
    fn from(value: Option<bool>) -> Self {
        match value {
            Some(true) => Feedback::Good,
            Some(false) => Feedback::Bad,
            None => Feedback::Unset,
        }
    }
}

impl From<Feedback> for Option<bool> {
    fn from(value: Feedback) -> Self {
        match value {
            Feedback::Good => Some(true),
            Feedback::Bad => Some(false),
            Feedback::Unset => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionQuestion {
    pub question: String,
    pub choices: Vec<Choice>,
}

/// Forced-choice questions attached to a reply, in the order the backend
/// sent them. Serialized as a JSON object of question to choices.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OptionSet(pub Vec<OptionQuestion>);

impl OptionSet {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn questions(&self) -> impl Iterator<Item = &OptionQuestion> {
        self.0.iter()
    }

    pub fn question(&self, question: &str) -> Option<&OptionQuestion> {
        self.0.iter().find(|q| q.question == question)
    }
}

impl Serialize for OptionSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for q in &self.0 {
            map.serialize_entry(&q.question, &q.choices)?;
        }
        map.end()
    }
}

pub(crate) struct OptionSetVisitor;

impl<'de> Visitor<'de> for OptionSetVisitor {
    type Value = OptionSet;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of question to choices")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<OptionSet, A::Error> {
        let mut questions = Vec::new();
        while let Some((question, raw)) = access.next_entry::<String, serde_json::Value>()? {
            // Non-list entries carry no choices
            let choices = match raw {
                serde_json::Value::Array(items) => items
                    .into_iter()
                    .filter_map(|item| serde_json::from_value::<Choice>(item).ok())
                    .collect(),
                _ => Vec::new(),
            };
            questions.push(OptionQuestion { question, choices });
        }
        Ok(OptionSet(questions))
    }
}

impl<'de> Deserialize<'de> for OptionSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(OptionSetVisitor)
    }
}

/// Locally attached image shown in the user's bubble.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentImage {
    pub url: Option<String>,
    pub name: String,
    pub size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    /// HTML for assistant messages, plain text for user messages.
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub meta_data: Vec<MetaStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_taken_seconds: Option<u64>,
    #[serde(default)]
    pub good_response: Feedback,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_response_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<OptionSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_image: Option<SentImage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sent_image_urls: Vec<String>,
}

impl ChatMessage {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            meta_data: Vec::new(),
            time_taken_seconds: None,
            good_response: Feedback::Unset,
            response_id: None,
            request_id: None,
            model_name: None,
            system_response_time: None,
            options: None,
            sent_image: None,
            sent_image_urls: Vec::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// The synthesized opening message of every session.
    pub fn greeting() -> Self {
        Self::assistant(GREETING)
    }

    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }

    pub fn is_greeting(&self) -> bool {
        self.is_assistant() && self.content.trim() == GREETING
    }

    pub fn has_options(&self) -> bool {
        self.options.as_ref().is_some_and(|o| !o.is_empty())
    }

    /// Replacement copy with a new rating.
    pub fn with_feedback(&self, feedback: Feedback) -> Self {
        Self {
            good_response: feedback,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feedback_toggle() {
        assert_eq!(Feedback::Unset.toggle(Vote::Down), Feedback::Bad);
        assert_eq!(Feedback::Bad.toggle(Vote::Down), Feedback::Unset);
        assert_eq!(Feedback::Good.toggle(Vote::Down), Feedback::Bad);
        assert_eq!(Feedback::Good.toggle(Vote::Up), Feedback::Unset);
        assert_eq!(Feedback::Bad.toggle(Vote::Up), Feedback::Good);
    }

    #[test]
    fn test_feedback_wire_shape() {
        assert_eq!(serde_json::to_string(&Feedback::Unset).unwrap(), "null");
        assert_eq!(
            serde_json::from_str::<Feedback>("false").unwrap(),
            Feedback::Bad
        );
    }

    #[test]
    fn test_options_keep_source_order() {
        let json = r#"{"Zone?":[{"key":"a","value":"North"},{"key":"b","value":"South"}],"Period?":[{"key":"x","value":"Q1"}],"Bad?":"nope"}"#;
        let options: OptionSet = serde_json::from_str(json).unwrap();
        let names: Vec<&str> = options.questions().map(|q| q.question.as_str()).collect();
        assert_eq!(names, vec!["Zone?", "Period?", "Bad?"]);
        assert_eq!(options.question("Zone?").unwrap().choices[1].value, "South");
        assert!(options.question("Bad?").unwrap().choices.is_empty());
    }
}
