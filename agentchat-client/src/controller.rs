//! Drives a [`Session`] against the agent API and the host capabilities.
//!
//! State lives behind std mutexes that are never held across an await.

use agentchat_render::{extract_plain_text, FrameId};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::api::{ChatApi, FeedbackBody, SessionSummary};
use crate::capabilities::{
    Clipboard, Downloader, FrameChannel, HostChannel, KeyValueStore, MemoryStore, Notifier,
    SpeechRecognizer, Unsupported, MODEL_KEY, SESSION_ID_KEY,
};
use crate::charts::ChartBridge;
use crate::config::WidgetConfig;
use crate::error::{CapabilityError, ExportError, SendRejected};
use crate::history::{rename_title, SessionSidebar};
use crate::message::{ChatMessage, Feedback, Role, Vote};
use crate::session::{new_session_id, Draft, SendTicket, Session};
use crate::speech::{dictate, Dictation};

pub const READY_EVENT: &str = "hb-chatbot-ready";
pub const RESIZE_EVENT: &str = "hb-chatbot-resize";
pub const CLOSE_EVENT: &str = "hb-chatbot-close";

pub const CHART_DOWNLOAD_FAILED: &str = "Failed to download chart";

/// Host services handed to the controller.
#[derive(Clone)]
pub struct Capabilities {
    pub store: Arc<dyn KeyValueStore>,
    pub clipboard: Arc<dyn Clipboard>,
    pub downloader: Arc<dyn Downloader>,
    pub notifier: Arc<dyn Notifier>,
    pub frames: Arc<dyn FrameChannel>,
    pub host: Arc<dyn HostChannel>,
    pub speech: Arc<dyn SpeechRecognizer>,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            store: Arc::new(MemoryStore::default()),
            clipboard: Arc::new(Unsupported),
            downloader: Arc::new(Unsupported),
            notifier: Arc::new(Unsupported),
            frames: Arc::new(Unsupported),
            host: Arc::new(Unsupported),
            speech: Arc::new(Unsupported),
        }
    }
}

/// How a send ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The reply was appended at this index.
    Replied { index: usize },
    /// The inline error message was appended at this index.
    Failed { index: usize },
    /// Aborted by the user; nothing was appended.
    Cancelled,
}

pub struct ChatController {
    api: Arc<dyn ChatApi>,
    config: WidgetConfig,
    caps: Capabilities,
    session: Mutex<Session>,
    sidebar: Mutex<SessionSidebar>,
    model: Mutex<Option<String>>,
    cancel: Mutex<Option<(SendTicket, oneshot::Sender<()>)>>,
    charts: ChartBridge,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ChatController {
    /// Session id: the configured one, else the persisted one, else new.
    pub fn new(api: Arc<dyn ChatApi>, mut config: WidgetConfig, caps: Capabilities) -> Self {
        config.sync_token(caps.store.as_ref());
        let session_id = config
            .initial_session_id
            .clone()
            .or_else(|| caps.store.get(SESSION_ID_KEY).filter(|s| !s.is_empty()))
            .unwrap_or_else(new_session_id);
        caps.store.set(SESSION_ID_KEY, &session_id);
        let model = caps.store.get(MODEL_KEY).filter(|m| !m.is_empty());
        let charts = ChartBridge::new(caps.frames.clone());
        tracing::info!(session = %session_id, "chat session ready");

        Self {
            api,
            config,
            caps,
            session: Mutex::new(Session::new(session_id)),
            sidebar: Mutex::new(SessionSidebar::default()),
            model: Mutex::new(model),
            cancel: Mutex::new(None),
            charts,
        }
    }

    pub fn config(&self) -> &WidgetConfig {
        &self.config
    }

    pub fn charts(&self) -> &ChartBridge {
        &self.charts
    }

    /// Copy of the current conversation state.
    pub fn session(&self) -> Session {
        lock(&self.session).clone()
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        lock(&self.session).messages().to_vec()
    }

    pub fn session_id(&self) -> String {
        lock(&self.session).id().to_string()
    }

    pub fn is_loading(&self) -> bool {
        lock(&self.session).is_loading()
    }

    pub fn sessions(&self) -> Vec<SessionSummary> {
        lock(&self.sidebar).sessions().to_vec()
    }

    pub fn model(&self) -> Option<String> {
        lock(&self.model).clone()
    }

    pub fn set_model(&self, model: Option<String>) {
        let model = model.filter(|m| !m.trim().is_empty());
        match &model {
            Some(m) => self.caps.store.set(MODEL_KEY, m),
            None => self.caps.store.remove(MODEL_KEY),
        }
        *lock(&self.model) = model;
    }

    fn persist_session_id(&self, id: &str) {
        self.caps.store.set(SESSION_ID_KEY, id);
    }

    // --- Sending ---

    /// Send a draft and wait for the reply, a failure, or [`cancel`](Self::cancel).
    pub async fn send(&self, draft: Draft) -> Result<SendOutcome, SendRejected> {
        if self.config.api_base.is_empty() {
            return Err(SendRejected::MissingApiBase);
        }
        let model = self.model();
        let pending = lock(&self.session).begin_send(draft, model)?;
        let ticket = pending.ticket;
        let (cancel_tx, cancel_rx) = oneshot::channel();
        *lock(&self.cancel) = Some((ticket, cancel_tx));

        let started = Instant::now();
        let result = tokio::select! {
            result = self.api.send_message(pending.request) => Some(result),
            Ok(()) = cancel_rx => None,
        };
        let elapsed = started.elapsed();

        {
            let mut cancel = lock(&self.cancel);
            if cancel.as_ref().is_some_and(|(t, _)| *t == ticket) {
                *cancel = None;
            }
        }

        let outcome = {
            let mut session = lock(&self.session);
            match result {
                None => {
                    session.cancel_send(ticket);
                    SendOutcome::Cancelled
                }
                Some(Ok(reply)) => {
                    if session.complete_send(ticket, reply, elapsed) {
                        SendOutcome::Replied {
                            index: session.messages().len() - 1,
                        }
                    } else {
                        SendOutcome::Cancelled
                    }
                }
                Some(Err(err)) => {
                    tracing::warn!(error = %err, elapsed_ms = elapsed.as_millis() as u64, "send failed");
                    if session.fail_send(ticket, elapsed, self.config.time_limit) {
                        SendOutcome::Failed {
                            index: session.messages().len() - 1,
                        }
                    } else {
                        SendOutcome::Cancelled
                    }
                }
            }
        };

        if let SendOutcome::Replied { index } = outcome {
            tracing::info!(index, elapsed_ms = elapsed.as_millis() as u64, "reply received");
            self.refresh_history().await;
        }
        Ok(outcome)
    }

    /// Abort the in-flight send. Returns false when nothing was in flight.
    pub fn cancel(&self) -> bool {
        let Some((ticket, tx)) = lock(&self.cancel).take() else {
            return false;
        };
        let cancelled = tx.send(()).is_ok();
        if !cancelled {
            // The send already finished; make sure the session is not left busy.
            lock(&self.session).cancel_send(ticket);
        }
        cancelled
    }

    /// Choose an option on the latest reply; once every question is answered
    /// the composed answer is sent.
    pub async fn select_option(
        &self,
        index: usize,
        question: &str,
        key: &str,
    ) -> Result<Option<SendOutcome>, SendRejected> {
        let composed = lock(&self.session).select_option(index, question, key);
        match composed {
            Some(text) => self.send(Draft::text(text)).await.map(Some),
            None => Ok(None),
        }
    }

    // --- Feedback ---

    /// Thumbs up/down on the reply with `response_id`. Voting the active
    /// rating again clears it. A thumbs-down may carry free text. Returns the
    /// new rating, or `None` if the message is unknown or the call failed.
    pub async fn vote(
        &self,
        response_id: &str,
        vote: Vote,
        feedback_text: Option<&str>,
    ) -> Option<Feedback> {
        let current = lock(&self.session)
            .find_by_response_id(response_id)?
            .good_response;
        let next = current.toggle(vote);
        let feedback = match next {
            Feedback::Bad => feedback_text
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string),
            _ => None,
        };
        let body = FeedbackBody {
            good_response: next,
            feedback,
        };
        if let Err(err) = self.api.send_feedback(response_id, body).await {
            tracing::warn!(error = %err, response_id, "feedback not recorded");
            return None;
        }
        lock(&self.session).set_feedback(response_id, next);
        Some(next)
    }

    // --- History ---

    /// Reload the session list; failures keep the previous list.
    pub async fn refresh_history(&self) {
        if self.config.api_base.is_empty() {
            return;
        }
        match self.api.session_history().await {
            Ok(list) => lock(&self.sidebar).replace(list.sessions),
            Err(err) => tracing::debug!(error = %err, "history refresh failed"),
        }
    }

    /// Load a past session into the view. No-op while loading or when it is
    /// already open.
    pub async fn open_session(&self, session_id: &str) -> bool {
        {
            let session = lock(&self.session);
            if session.is_loading() || session.id() == session_id {
                return false;
            }
        }
        match self.api.session_history_by_id(session_id).await {
            Ok(detail) => {
                let mut session = lock(&self.session);
                if session.is_loading() {
                    return false;
                }
                session.rehydrate(session_id, detail);
                self.persist_session_id(session.id());
                tracing::info!(session = %session.id(), messages = session.messages().len(), "session opened");
                true
            }
            Err(err) => {
                tracing::warn!(error = %err, session_id, "could not open session");
                false
            }
        }
    }

    /// Rename a past session. Blank or unchanged titles are not sent.
    pub async fn rename_session(&self, session_id: &str, title: &str) -> bool {
        let current = lock(&self.sidebar).title(session_id).map(str::to_string);
        let Some(title) = rename_title(current.as_deref(), title) else {
            return false;
        };
        match self.api.rename_session(session_id, &title).await {
            Ok(()) => {
                lock(&self.sidebar).set_title(session_id, &title);
                true
            }
            Err(err) => {
                tracing::warn!(error = %err, session_id, "rename failed");
                false
            }
        }
    }

    /// Delete a past session; deleting the open one starts a new chat.
    pub async fn delete_session(&self, session_id: &str) -> bool {
        if let Err(err) = self.api.delete_session(session_id).await {
            tracing::warn!(error = %err, session_id, "delete failed");
            return false;
        }
        lock(&self.sidebar).remove(session_id);
        if self.session_id() == session_id {
            self.reset_session();
        }
        true
    }

    /// Start a new chat once the assistant has replied and nothing is loading.
    pub fn new_chat(&self) -> bool {
        if !lock(&self.session).can_start_new_chat() {
            return false;
        }
        self.reset_session();
        true
    }

    fn reset_session(&self) {
        if let Some((_, tx)) = lock(&self.cancel).take() {
            let _ = tx.send(());
        }
        let id = new_session_id();
        lock(&self.session).reset(id.clone());
        self.persist_session_id(&id);
        tracing::info!(session = %id, "new chat started");
    }

    // --- Message actions ---

    /// Copy a message as plain text.
    pub fn copy_message(&self, index: usize) -> Result<(), CapabilityError> {
        let Some(message) = lock(&self.session).messages().get(index).cloned() else {
            return Ok(());
        };
        let text = match message.role {
            Role::Assistant => extract_plain_text(&message.content),
            Role::User => message.content.trim().to_string(),
        };
        if text.is_empty() {
            return Ok(());
        }
        if !self.caps.clipboard.is_supported() {
            return Err(CapabilityError::Unsupported("clipboard"));
        }
        self.caps.clipboard.write_text(&text)
    }

    /// Export a chart of message `index` as PNG and hand it to the downloader.
    /// Failures raise a toast.
    pub async fn download_chart(&self, index: usize, frame: FrameId) -> Result<(), ExportError> {
        let result = self.try_download_chart(index, frame).await;
        if let Err(err) = &result {
            tracing::warn!(error = %err, %frame, "chart download failed");
            self.caps.notifier.toast(CHART_DOWNLOAD_FAILED);
        }
        result
    }

    async fn try_download_chart(&self, index: usize, frame: FrameId) -> Result<(), ExportError> {
        if !lock(&self.session).can_download_charts(index) {
            return Err(ExportError::NotLatest);
        }
        let png = self
            .charts
            .export_png(frame, self.config.export_timeout)
            .await?;
        let file_name = format!("chart-{}.png", chrono::Local::now().format("%Y%m%d-%H%M%S"));
        self.caps
            .downloader
            .save(&file_name, "image/png", &png)
            .map_err(|e| ExportError::Download(e.to_string()))
    }

    /// Dictate into the input box; `on_transcript` receives the running text.
    pub async fn dictate<F>(&self, on_transcript: F) -> Result<Dictation, CapabilityError>
    where
        F: FnMut(&str, bool),
    {
        let result = dictate(self.caps.speech.as_ref(), on_transcript).await;
        if let Err(err) = &result {
            self.caps.notifier.toast(&err.to_string());
        }
        result
    }

    // --- Embedding page ---

    pub fn announce_ready(&self) {
        self.caps.host.post(
            &serde_json::json!({ "type": READY_EVENT }),
            self.config.target_origin(),
        );
    }

    pub fn report_height(&self, height: u32) {
        self.caps.host.post(
            &serde_json::json!({ "type": RESIZE_EVENT, "height": height }),
            self.config.target_origin(),
        );
    }

    /// Ask the embedding page to close the widget, when it allows that.
    pub fn request_close(&self) -> bool {
        if !self.config.allow_close {
            return false;
        }
        self.caps.host.post(
            &serde_json::json!({ "type": CLOSE_EVENT }),
            self.config.target_origin(),
        );
        true
    }
}
