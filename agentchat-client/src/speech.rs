//! Voice dictation into the input box.

use std::time::Duration;
use tokio::time::{timeout_at, Instant};

use crate::capabilities::{SpeechEvent, SpeechRecognizer};
use crate::error::CapabilityError;

/// Silence allowed before anything was heard.
pub const INITIAL_SILENCE: Duration = Duration::from_millis(4000);
/// Silence after speech that ends the dictation.
pub const AFTER_SPEECH_SILENCE: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DictationEnd {
    Silence,
    /// The recognizer finished on its own.
    Ended,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dictation {
    pub transcript: String,
    pub end: DictationEnd,
}

/// Capture speech until the speaker goes quiet. `on_transcript` sees the
/// running transcript as it grows; the recognizer is always stopped.
pub async fn dictate<F>(
    recognizer: &dyn SpeechRecognizer,
    mut on_transcript: F,
) -> Result<Dictation, CapabilityError>
where
    F: FnMut(&str, bool),
{
    if !recognizer.is_supported() {
        return Err(CapabilityError::Unsupported("speech recognition"));
    }
    let mut events = recognizer.start()?;
    let mut transcript = String::new();
    let mut deadline = Instant::now() + INITIAL_SILENCE;

    let end = loop {
        match timeout_at(deadline, events.recv()).await {
            Err(_) => break DictationEnd::Silence,
            Ok(None) | Ok(Some(SpeechEvent::End)) => break DictationEnd::Ended,
            Ok(Some(SpeechEvent::Error(reason))) => {
                tracing::debug!(%reason, "speech recognition error");
                break DictationEnd::Error(reason);
            }
            Ok(Some(SpeechEvent::Transcript { text, is_final })) => {
                let text = text.trim();
                if text.is_empty() {
                    continue;
                }
                transcript = text.to_string();
                on_transcript(&transcript, is_final);
                deadline = Instant::now() + AFTER_SPEECH_SILENCE;
            }
        }
    };
    recognizer.stop();
    Ok(Dictation { transcript, end })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    struct ScriptedRecognizer {
        events: Mutex<Option<mpsc::Receiver<SpeechEvent>>>,
        stopped: AtomicBool,
    }

    impl SpeechRecognizer for ScriptedRecognizer {
        fn is_supported(&self) -> bool {
            true
        }

        fn start(&self) -> Result<mpsc::Receiver<SpeechEvent>, CapabilityError> {
            self.events
                .lock()
                .unwrap()
                .take()
                .ok_or(CapabilityError::Failed {
                    capability: "speech recognition",
                    reason: "already started".into(),
                })
        }

        fn stop(&self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_silence_after_speech_ends_dictation() {
        let (tx, rx) = mpsc::channel(8);
        let recognizer = ScriptedRecognizer {
            events: Mutex::new(Some(rx)),
            stopped: AtomicBool::new(false),
        };
        tx.send(SpeechEvent::Transcript {
            text: " show sales ".into(),
            is_final: false,
        })
        .await
        .unwrap();
        tx.send(SpeechEvent::Transcript {
            text: "show sales by region".into(),
            is_final: true,
        })
        .await
        .unwrap();

        let mut seen = Vec::new();
        let result = dictate(&recognizer, |text, _| seen.push(text.to_string()))
            .await
            .unwrap();
        assert_eq!(result.transcript, "show sales by region");
        assert_eq!(result.end, DictationEnd::Silence);
        assert_eq!(seen, vec!["show sales", "show sales by region"]);
        assert!(recognizer.stopped.load(Ordering::SeqCst));
        drop(tx);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_heard() {
        let (_tx, rx) = mpsc::channel(1);
        let recognizer = ScriptedRecognizer {
            events: Mutex::new(Some(rx)),
            stopped: AtomicBool::new(false),
        };
        let result = dictate(&recognizer, |_, _| {}).await.unwrap();
        assert_eq!(result.transcript, "");
        assert_eq!(result.end, DictationEnd::Silence);
    }
}
