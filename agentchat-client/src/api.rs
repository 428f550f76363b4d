//! Agent backend contract: the [`ChatApi`] trait and its wire types.
//!
//! Backends are loose about types (ids arrive as numbers or strings, optional
//! lists arrive as `null` or objects), so the response types deserialize
//! leniently and never fail on a single odd field.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::execution::MetaStep;
use crate::message::{Feedback, OptionSet};

/// An image attached to a send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    pub fn is_image(&self) -> bool {
        self.mime.starts_with("image/")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendMessageRequest {
    pub session_id: String,
    pub query: String,
    pub model_name: Option<String>,
    pub image: Option<ImageUpload>,
}

/// Reply to a send. `response` is HTML or base64-encoded HTML.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct AgentReply {
    #[serde(default, deserialize_with = "de::opt_string")]
    pub response: Option<String>,
    #[serde(default, deserialize_with = "de::steps")]
    pub meta_data: Vec<MetaStep>,
    #[serde(default, deserialize_with = "de::opt_stringish")]
    pub response_id: Option<String>,
    #[serde(default, deserialize_with = "de::opt_stringish")]
    pub request_id: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub model_name: Option<String>,
    #[serde(default, deserialize_with = "de::opt_stringish")]
    pub system_response_time: Option<String>,
    #[serde(default, deserialize_with = "de::options")]
    pub options: Option<OptionSet>,
    #[serde(default, deserialize_with = "de::feedback")]
    pub good_response: Feedback,
    #[serde(default, deserialize_with = "de::truthy")]
    pub token_limit_reached: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionSummary {
    #[serde(default, deserialize_with = "de::opt_stringish", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, deserialize_with = "de::opt_stringish", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl SessionSummary {
    /// `session_id`, falling back to `id`.
    pub fn key(&self) -> Option<&str> {
        self.session_id
            .as_deref()
            .or(self.id.as_deref())
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct SessionList {
    #[serde(default, deserialize_with = "de::list")]
    pub sessions: Vec<SessionSummary>,
}

/// One question/answer exchange of a stored session.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct HistoryItem {
    #[serde(default, deserialize_with = "de::opt_stringish")]
    pub user_query: Option<String>,
    #[serde(default, deserialize_with = "de::opt_stringish")]
    pub system_response: Option<String>,
    #[serde(default, deserialize_with = "de::steps")]
    pub meta_data: Vec<MetaStep>,
    #[serde(default, deserialize_with = "de::opt_number")]
    pub time_taken_seconds: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_number")]
    pub time_taken: Option<f64>,
    #[serde(default, deserialize_with = "de::feedback")]
    pub good_response: Feedback,
    #[serde(default, deserialize_with = "de::opt_stringish")]
    pub response_id: Option<String>,
    #[serde(default, deserialize_with = "de::opt_stringish")]
    pub request_id: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub model_name: Option<String>,
    #[serde(default, deserialize_with = "de::opt_stringish")]
    pub system_response_time: Option<String>,
    #[serde(default, deserialize_with = "de::options")]
    pub options: Option<OptionSet>,
    #[serde(default, deserialize_with = "de::urls")]
    pub input_image_urls: Vec<String>,
}

impl HistoryItem {
    pub fn elapsed_seconds(&self) -> Option<u64> {
        self.time_taken_seconds
            .or(self.time_taken)
            .filter(|t| t.is_finite() && *t >= 0.0)
            .map(|t| t.round() as u64)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct SessionHistoryDetail {
    #[serde(default, deserialize_with = "de::opt_stringish")]
    pub session_id: Option<String>,
    #[serde(default, deserialize_with = "de::list")]
    pub session_history: Vec<HistoryItem>,
    #[serde(default, deserialize_with = "de::truthy")]
    pub token_limit_reached: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedbackBody {
    pub good_response: Feedback,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenameBody<'a> {
    pub title: &'a str,
}

/// The agent backend.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn send_message(&self, request: SendMessageRequest) -> ApiResult<AgentReply>;

    async fn session_history(&self) -> ApiResult<SessionList>;

    async fn session_history_by_id(&self, session_id: &str) -> ApiResult<SessionHistoryDetail>;

    async fn rename_session(&self, session_id: &str, title: &str) -> ApiResult<()>;

    async fn delete_session(&self, session_id: &str) -> ApiResult<()>;

    async fn send_feedback(&self, response_id: &str, body: FeedbackBody) -> ApiResult<()>;
}

mod de {
    use serde::de::{DeserializeOwned, IgnoredAny, MapAccess, SeqAccess, Visitor};
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;
    use std::fmt;

    use crate::execution::MetaStep;
    use crate::message::{Feedback, OptionSet, OptionSetVisitor};

    pub fn opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::String(s) => Some(s),
            _ => None,
        })
    }

    /// Strings as-is, numbers and booleans stringified.
    pub fn opt_stringish<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Null => None,
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        })
    }

    pub fn opt_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        Ok(Value::deserialize(d)?.as_f64())
    }

    pub fn truthy<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Null => false,
            Value::Bool(b) => b,
            Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) => true,
        })
    }

    pub fn feedback<'de, D: Deserializer<'de>>(d: D) -> Result<Feedback, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Bool(b) => Feedback::from(Some(b)),
            _ => Feedback::Unset,
        })
    }

    pub fn steps<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<MetaStep>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(map) => Some(MetaStep(map)),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        })
    }

    pub fn urls<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        })
    }

    /// Elements that fail to deserialize are skipped; a non-list is empty.
    pub fn list<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        Ok(match Value::deserialize(d)? {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|item| serde_json::from_value(item).ok())
                .collect(),
            _ => Vec::new(),
        })
    }

    struct LenientOptions;

    impl<'de> Visitor<'de> for LenientOptions {
        type Value = Option<OptionSet>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("an options map or anything else")
        }

        fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<Self::Value, A::Error> {
            OptionSetVisitor.visit_map(map).map(Some)
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            while seq.next_element::<IgnoredAny>()?.is_some() {}
            Ok(None)
        }

        fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Self::Value, D::Error> {
            d.deserialize_any(LenientOptions)
        }

        fn visit_none<E>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_bool<E>(self, _: bool) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_i64<E>(self, _: i64) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_u64<E>(self, _: u64) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_f64<E>(self, _: f64) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_str<E>(self, _: &str) -> Result<Self::Value, E> {
            Ok(None)
        }
    }

    /// Question order is kept as sent; anything but an object means no options.
    pub fn options<'de, D: Deserializer<'de>>(d: D) -> Result<Option<OptionSet>, D::Error> {
        let options = d.deserialize_any(LenientOptions)?;
        Ok(options.filter(|o| !o.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_is_lenient() {
        let reply: AgentReply = serde_json::from_str(
            r#"{"response":"PHA+aGk8L3A+","meta_data":{"oops":1},"response_id":42,"request_id":null,
                "system_response_time":"3.2s","options":[],"good_response":null,"token_limit_reached":1}"#,
        )
        .unwrap();
        assert_eq!(reply.response.as_deref(), Some("PHA+aGk8L3A+"));
        assert!(reply.meta_data.is_empty());
        assert_eq!(reply.response_id.as_deref(), Some("42"));
        assert_eq!(reply.request_id, None);
        assert_eq!(reply.options, None);
        assert_eq!(reply.good_response, Feedback::Unset);
        assert!(reply.token_limit_reached);
    }

    #[test]
    fn test_session_summary_key() {
        let list: SessionList = serde_json::from_str(
            r#"{"sessions":[{"session_id":"a","title":"First"},{"id":7},{"title":"no id"},"junk"]}"#,
        )
        .unwrap();
        let keys: Vec<Option<&str>> = list.sessions.iter().map(|s| s.key()).collect();
        assert_eq!(keys, vec![Some("a"), Some("7"), None]);
    }

    #[test]
    fn test_history_item_time_fallback() {
        let item: HistoryItem =
            serde_json::from_str(r#"{"user_query":"q","system_response":"<p>a</p>","time_taken":4.4}"#)
                .unwrap();
        assert_eq!(item.elapsed_seconds(), Some(4));
        let item: HistoryItem = serde_json::from_str(
            r#"{"time_taken_seconds":9,"time_taken":4,"input_image_urls":["u1","",null]}"#,
        )
        .unwrap();
        assert_eq!(item.elapsed_seconds(), Some(9));
        assert_eq!(item.input_image_urls, vec!["u1"]);
    }

    #[test]
    fn test_feedback_body_wire_shape() {
        let body = FeedbackBody {
            good_response: Feedback::Unset,
            feedback: None,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({"good_response": null})
        );
    }
}
