//! Conversation state for one chat session.
//!
//! All mutation goes through [`Session`]; message records are never edited
//! in place, a changed message is replaced by an updated copy.

use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

use crate::api::{AgentReply, HistoryItem, ImageUpload, SendMessageRequest, SessionHistoryDetail};
use crate::decode::decode_maybe_base64;
use crate::error::SendRejected;
use crate::message::{ChatMessage, Feedback, SentImage};

pub const EMPTY_REPLY_MESSAGE: &str =
    "I apologize, but I couldn't process your request at the moment.";
pub const TECHNICAL_DIFFICULTIES_MESSAGE: &str =
    "I'm sorry, but I'm experiencing some technical difficulties. Please try again later.";
pub const TIME_LIMIT_MESSAGE: &str =
    "Time limit reached. Please revisit the page in some time to get your answer.";

/// Identifies one send; completions for any other ticket are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SendTicket(u64);

/// What the user is about to send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    pub text: String,
    pub image: Option<ImageUpload>,
    /// Local preview URL for the attached image, if the host made one.
    pub image_preview_url: Option<String>,
}

impl Draft {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSend {
    pub ticket: SendTicket,
    pub request: SendMessageRequest,
}

#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    messages: Vec<ChatMessage>,
    in_flight: Option<SendTicket>,
    next_ticket: u64,
    token_limit_reached: bool,
    /// Chosen option keys per message index, by question.
    selections: BTreeMap<usize, BTreeMap<String, String>>,
}

pub fn new_session_id() -> String {
    Uuid::new_v4().to_string()
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            messages: vec![ChatMessage::greeting()],
            in_flight: None,
            next_ticket: 0,
            token_limit_reached: false,
            selections: BTreeMap::new(),
        }
    }

    /// A new session with a random id.
    pub fn fresh() -> Self {
        Self::new(new_session_id())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn token_limit_reached(&self) -> bool {
        self.token_limit_reached
    }

    /// True once any assistant message other than the opening greeting exists.
    pub fn has_assistant_responded(&self) -> bool {
        self.messages
            .iter()
            .enumerate()
            .any(|(idx, m)| m.is_assistant() && !(idx == 0 && m.is_greeting()))
    }

    pub fn can_start_new_chat(&self) -> bool {
        self.has_assistant_responded() && !self.is_loading()
    }

    pub fn latest_assistant_index(&self) -> Option<usize> {
        self.messages.iter().rposition(ChatMessage::is_assistant)
    }

    /// Options are only interactive on the most recent assistant message.
    pub fn is_latest_options_message(&self, idx: usize) -> bool {
        self.latest_assistant_index() == Some(idx)
            && self.messages.get(idx).is_some_and(ChatMessage::has_options)
    }

    /// Chart download is offered on the most recent assistant message only.
    pub fn can_download_charts(&self, idx: usize) -> bool {
        self.latest_assistant_index() == Some(idx)
    }

    pub fn selections(&self, idx: usize) -> Option<&BTreeMap<String, String>> {
        self.selections.get(&idx)
    }

    /// Validate a draft, append the user's message and mark the session busy.
    pub fn begin_send(
        &mut self,
        draft: Draft,
        model_name: Option<String>,
    ) -> Result<PendingSend, SendRejected> {
        let text = draft.text.trim().to_string();
        let image = draft.image.filter(ImageUpload::is_image);
        if text.is_empty() && image.is_none() {
            return Err(SendRejected::Empty);
        }
        if self.in_flight.is_some() {
            return Err(SendRejected::Busy);
        }
        if self.token_limit_reached {
            return Err(SendRejected::TokenLimitReached);
        }

        let image_name = image.as_ref().map(|i| i.name.clone());
        let (content, query) = match &image_name {
            Some(name) if text.is_empty() => (
                format!("Uploaded image: {}", name),
                format!("[Image: {}]", name),
            ),
            _ => (text.clone(), text),
        };

        let mut user = ChatMessage::user(content);
        user.sent_image = image.as_ref().map(|i| SentImage {
            url: draft.image_preview_url.clone(),
            name: i.name.clone(),
            size: Some(i.bytes.len() as u64),
        });
        self.messages.push(user);

        self.next_ticket += 1;
        let ticket = SendTicket(self.next_ticket);
        self.in_flight = Some(ticket);
        tracing::debug!(session = %self.id, ticket = ticket.0, "send started");

        Ok(PendingSend {
            ticket,
            request: SendMessageRequest {
                session_id: self.id.clone(),
                query,
                model_name,
                image,
            },
        })
    }

    fn settle(&mut self, ticket: SendTicket) -> bool {
        if self.in_flight != Some(ticket) {
            tracing::debug!(session = %self.id, ticket = ticket.0, "stale send result ignored");
            return false;
        }
        self.in_flight = None;
        true
    }

    /// Append the assistant reply for `ticket`. Returns false if the ticket
    /// is no longer current (cancelled or superseded).
    pub fn complete_send(&mut self, ticket: SendTicket, reply: AgentReply, elapsed: Duration) -> bool {
        if !self.settle(ticket) {
            return false;
        }
        self.token_limit_reached = reply.token_limit_reached;
        let mut message = assistant_message(
            reply.response.as_deref().unwrap_or(""),
            reply.meta_data,
            reply.good_response,
        );
        if message.content.is_empty() {
            message.content = EMPTY_REPLY_MESSAGE.to_string();
        }
        message.time_taken_seconds = Some(elapsed.as_secs_f64().round() as u64);
        message.response_id = reply.response_id;
        message.request_id = reply.request_id;
        message.model_name = reply.model_name;
        message.system_response_time = reply.system_response_time;
        message.options = reply.options;
        self.messages.push(message);
        true
    }

    /// Append the inline error message for a failed send.
    pub fn fail_send(&mut self, ticket: SendTicket, elapsed: Duration, time_limit: Duration) -> bool {
        if !self.settle(ticket) {
            return false;
        }
        let text = if elapsed >= time_limit {
            TIME_LIMIT_MESSAGE
        } else {
            TECHNICAL_DIFFICULTIES_MESSAGE
        };
        let mut message = ChatMessage::assistant(text);
        message.time_taken_seconds = Some(elapsed.as_secs_f64().round() as u64);
        self.messages.push(message);
        true
    }

    /// Release the busy state without appending anything.
    pub fn cancel_send(&mut self, ticket: SendTicket) -> bool {
        let cancelled = self.settle(ticket);
        if cancelled {
            tracing::debug!(session = %self.id, ticket = ticket.0, "send cancelled");
        }
        cancelled
    }

    pub fn find_by_response_id(&self, response_id: &str) -> Option<&ChatMessage> {
        self.messages
            .iter()
            .find(|m| m.response_id.as_deref() == Some(response_id))
    }

    /// Replace the message with `response_id` by a copy carrying `feedback`.
    pub fn set_feedback(&mut self, response_id: &str, feedback: Feedback) -> bool {
        let Some(idx) = self
            .messages
            .iter()
            .position(|m| m.response_id.as_deref() == Some(response_id))
        else {
            return false;
        };
        self.messages[idx] = self.messages[idx].with_feedback(feedback);
        true
    }

    /// Record an option choice on message `idx`. Once every question of that
    /// message has an answer, returns the follow-up text to send: one
    /// `(key): value` line per question, in question order.
    pub fn select_option(&mut self, idx: usize, question: &str, key: &str) -> Option<String> {
        if self.is_loading() || !self.is_latest_options_message(idx) {
            return None;
        }
        let options = self.messages[idx].options.as_ref()?;
        options
            .question(question)?
            .choices
            .iter()
            .find(|c| c.key == key)?;

        let chosen = self.selections.entry(idx).or_default();
        chosen.insert(question.to_string(), key.to_string());

        let mut lines = Vec::new();
        for q in options.questions() {
            let selected = chosen.get(&q.question)?;
            if let Some(choice) = q.choices.iter().find(|c| &c.key == selected) {
                lines.push(format!("({}): {}", choice.key, choice.value.trim()));
            }
        }
        let text = lines.join("\n").trim().to_string();
        (!text.is_empty()).then_some(text)
    }

    /// Replace the conversation with a stored one.
    pub fn rehydrate(&mut self, requested_id: &str, detail: SessionHistoryDetail) {
        self.id = detail
            .session_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| requested_id.to_string());
        self.messages = rebuild_messages(detail.session_history);
        self.token_limit_reached = detail.token_limit_reached;
        self.in_flight = None;
        self.selections.clear();
    }

    /// Start over with a new id and only the greeting. Tickets keep counting
    /// up, so a result for a send from before the reset stays stale.
    pub fn reset(&mut self, id: impl Into<String>) {
        let next_ticket = self.next_ticket;
        *self = Session::new(id);
        self.next_ticket = next_ticket;
    }
}

fn assistant_message(
    raw: &str,
    meta_data: Vec<crate::execution::MetaStep>,
    feedback: Feedback,
) -> ChatMessage {
    let mut message = ChatMessage::assistant(decode_maybe_base64(raw));
    message.meta_data = meta_data;
    message.good_response = feedback;
    message
}

/// Greeting, then for each stored exchange the user query (with its images)
/// and the decoded assistant reply. Empty halves are skipped.
pub fn rebuild_messages(items: Vec<HistoryItem>) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::greeting()];
    for item in items {
        let elapsed = item.elapsed_seconds();
        let user_text = item.user_query.unwrap_or_default();
        if !user_text.is_empty() {
            let mut user = ChatMessage::user(user_text);
            user.sent_image_urls = item.input_image_urls;
            messages.push(user);
        }

        let raw = item.system_response.unwrap_or_default();
        let mut assistant = assistant_message(&raw, item.meta_data, item.good_response);
        if assistant.content.is_empty() {
            continue;
        }
        assistant.time_taken_seconds = elapsed;
        assistant.response_id = item.response_id;
        assistant.request_id = item.request_id;
        assistant.model_name = item.model_name;
        assistant.system_response_time = item.system_response_time;
        assistant.options = item.options;
        messages.push(assistant);
    }
    messages
}
