//! # agentchat client core
//!
//! Everything behind the chat widget that is not pixels: the message and
//! session model, the agent API client, option and feedback flows, history
//! management and the chart export orchestration.
//!
//! Browser services (storage, clipboard, downloads, toasts, iframe and parent
//! messaging, speech recognition) are reached through the traits in
//! [`capabilities`], so the core runs the same under a host shell or in tests.
//!
//! ## Example
//! ```ignore
//! use agentchat_client::capabilities::MemoryStore;
//! use agentchat_client::{Capabilities, ChatController, Draft, HttpChatApi, WidgetConfig};
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::default());
//! let mut config = WidgetConfig::from_env()?.with_query(embed_url)?;
//! config.sync_token(store.as_ref());
//!
//! let api = Arc::new(HttpChatApi::new(config.api_base.clone(), config.token.clone()));
//! let caps = Capabilities { store, ..Capabilities::default() };
//! let chat = ChatController::new(api, config, caps);
//!
//! chat.announce_ready();
//! let outcome = chat.send(Draft::text("Show revenue by month")).await?;
//! for message in chat.messages() {
//!     println!("{:?}: {}", message.role, message.content);
//! }
//! ```

pub mod api;
pub mod capabilities;
pub mod charts;
pub mod config;
pub mod controller;
pub mod decode;
pub mod error;
pub mod execution;
pub mod history;
pub mod http;
pub mod message;
pub mod session;
pub mod speech;

// --- Controller ---
pub use controller::{Capabilities, ChatController, SendOutcome};

// --- Model ---
pub use execution::{format_sql, format_timestamp, visible_steps, MetaStep, StepKind};
pub use message::{ChatMessage, Choice, Feedback, OptionQuestion, OptionSet, Role, Vote};
pub use session::{Draft, Session};

// --- API ---
pub use api::{AgentReply, ChatApi, HistoryItem, SessionHistoryDetail, SessionSummary};
pub use config::WidgetConfig;
pub use error::{ApiError, ApiResult, CapabilityError, ConfigError, ExportError, SendRejected};
pub use http::HttpChatApi;

// --- Charts ---
pub use charts::ChartBridge;
