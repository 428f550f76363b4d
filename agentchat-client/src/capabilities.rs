//! Host environment capabilities the widget core is given rather than
//! reaching for directly: storage, clipboard, downloads, toasts, speech
//! capture and message channels to chart frames and the embedding page.
//!
//! Every capability has an `is_supported` probe, and [`Unsupported`]
//! implements all of them as no-ops for environments that lack them.

use agentchat_render::FrameId;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;

use crate::error::CapabilityError;

pub const TOKEN_KEY: &str = "hb-chatbot-token";
pub const SESSION_ID_KEY: &str = "hb-admin-chatbot-session-id";
pub const MODEL_KEY: &str = "hb-admin-chatbot-model";

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    /// Best effort; failures are swallowed.
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

/// In-process store, used where no persistent storage exists.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        if let Ok(mut values) = self.values.lock() {
            values.insert(key.to_string(), value.to_string());
        }
    }

    fn remove(&self, key: &str) {
        if let Ok(mut values) = self.values.lock() {
            values.remove(key);
        }
    }
}

pub trait Clipboard: Send + Sync {
    fn is_supported(&self) -> bool;
    fn write_text(&self, text: &str) -> Result<(), CapabilityError>;
}

pub trait Downloader: Send + Sync {
    fn is_supported(&self) -> bool;
    fn save(&self, file_name: &str, mime: &str, bytes: &[u8]) -> Result<(), CapabilityError>;
}

/// Transient status messages (toasts).
pub trait Notifier: Send + Sync {
    fn toast(&self, message: &str);
}

/// Posts bridge messages into a chart iframe.
pub trait FrameChannel: Send + Sync {
    fn post(&self, frame: FrameId, message: &serde_json::Value) -> Result<(), CapabilityError>;
}

/// Posts messages to the page embedding the widget.
pub trait HostChannel: Send + Sync {
    fn post(&self, message: &serde_json::Value, target_origin: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechEvent {
    /// The full transcript so far.
    Transcript { text: String, is_final: bool },
    /// Recognition error other than no-speech / aborted.
    Error(String),
    End,
}

pub trait SpeechRecognizer: Send + Sync {
    fn is_supported(&self) -> bool;
    /// Begin capture; events arrive on the returned channel until `stop`.
    fn start(&self) -> Result<mpsc::Receiver<SpeechEvent>, CapabilityError>;
    fn stop(&self);
}

/// No-op fallback for every capability.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unsupported;

impl Clipboard for Unsupported {
    fn is_supported(&self) -> bool {
        false
    }

    fn write_text(&self, _text: &str) -> Result<(), CapabilityError> {
        Err(CapabilityError::Unsupported("clipboard"))
    }
}

impl Downloader for Unsupported {
    fn is_supported(&self) -> bool {
        false
    }

    fn save(&self, _file_name: &str, _mime: &str, _bytes: &[u8]) -> Result<(), CapabilityError> {
        Err(CapabilityError::Unsupported("download"))
    }
}

impl Notifier for Unsupported {
    fn toast(&self, message: &str) {
        tracing::info!(message, "toast");
    }
}

impl FrameChannel for Unsupported {
    fn post(&self, _frame: FrameId, _message: &serde_json::Value) -> Result<(), CapabilityError> {
        Err(CapabilityError::Unsupported("frame messaging"))
    }
}

impl HostChannel for Unsupported {
    fn post(&self, _message: &serde_json::Value, _target_origin: &str) {}
}

impl SpeechRecognizer for Unsupported {
    fn is_supported(&self) -> bool {
        false
    }

    fn start(&self) -> Result<mpsc::Receiver<SpeechEvent>, CapabilityError> {
        Err(CapabilityError::Unsupported("speech recognition"))
    }

    fn stop(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::default();
        assert_eq!(store.get("k"), None);
        store.set("k", "v");
        assert_eq!(store.get("k").as_deref(), Some("v"));
        store.remove("k");
        assert_eq!(store.get("k"), None);
    }

    #[test]
    fn test_unsupported_fallbacks() {
        assert!(!Clipboard::is_supported(&Unsupported));
        assert_eq!(
            Unsupported.write_text("x"),
            Err(CapabilityError::Unsupported("clipboard"))
        );
        assert!(Unsupported.start().is_err());
    }
}
