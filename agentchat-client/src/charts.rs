//! Host side of chart frames for the client: wraps the render crate's
//! [`BridgeHub`] with async export requests.

use agentchat_render::{BridgeEvent, BridgeHub, FrameId, RenderResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;

use crate::capabilities::FrameChannel;
use crate::decode::decode_png_data_url;
use crate::error::ExportError;

type ExportReply = Result<String, String>;

#[derive(Default)]
struct Inner {
    hub: BridgeHub,
    waiters: HashMap<FrameId, oneshot::Sender<ExportReply>>,
}

/// Every chart frame on the page and the exports waiting on them.
pub struct ChartBridge {
    inner: Mutex<Inner>,
    frames: Arc<dyn FrameChannel>,
}

impl ChartBridge {
    pub fn new(frames: Arc<dyn FrameChannel>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            frames,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock leaves plain data behind; keep going.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn mount(&self, chart_html: impl Into<String>) -> FrameId {
        self.lock().hub.mount(chart_html)
    }

    /// The `srcdoc` document for the frame.
    pub fn render(&self, frame: FrameId) -> RenderResult<String> {
        self.lock().hub.render(frame)
    }

    pub fn height(&self, frame: FrameId) -> Option<u32> {
        self.lock().hub.frame(frame).map(|f| f.height())
    }

    /// Remove a frame; an export waiting on it fails with [`ExportError::FrameGone`].
    pub fn unmount(&self, frame: FrameId) {
        let mut inner = self.lock();
        inner.hub.unmount(frame);
        inner.waiters.remove(&frame);
    }

    /// Feed a message received from `source` through the hub.
    pub fn on_message(&self, source: FrameId, data: &serde_json::Value) -> BridgeEvent {
        let mut inner = self.lock();
        let event = inner.hub.dispatch(source, data);
        let reply = match &event {
            BridgeEvent::ExportResolved { data_url, .. } => Some(Ok(data_url.clone())),
            BridgeEvent::ExportFailed { reason, .. } => Some(Err(reason.clone())),
            _ => None,
        };
        if let Some(reply) = reply {
            if let Some(waiter) = inner.waiters.remove(&source) {
                // Receiver may have timed out already
                let _ = waiter.send(reply);
            }
        }
        event
    }

    /// Ask the frame for a PNG of its chart and wait up to `timeout`.
    pub async fn export_png(&self, frame: FrameId, timeout: Duration) -> Result<Vec<u8>, ExportError> {
        let (tx, rx) = oneshot::channel();
        let request = {
            let mut inner = self.lock();
            let request = inner.hub.request_export(frame)?;
            inner.waiters.insert(frame, tx);
            request
        };

        let posted = request
            .to_value()
            .map_err(ExportError::from)
            .and_then(|value| {
                self.frames
                    .post(frame, &value)
                    .map_err(|e| ExportError::Failed(e.to_string()))
            });
        if let Err(err) = posted {
            self.abandon(frame);
            return Err(err);
        }

        match tokio::time::timeout(timeout, rx).await {
            Err(_) => {
                self.abandon(frame);
                tracing::warn!(%frame, "chart export timed out");
                Err(ExportError::TimedOut)
            }
            Ok(Err(_)) => Err(ExportError::FrameGone),
            Ok(Ok(Err(reason))) => {
                tracing::warn!(%frame, %reason, "chart export failed");
                Err(ExportError::Failed(reason))
            }
            Ok(Ok(Ok(data_url))) => {
                decode_png_data_url(&data_url).map_err(ExportError::InvalidImage)
            }
        }
    }

    fn abandon(&self, frame: FrameId) {
        let mut inner = self.lock();
        inner.hub.cancel_export(frame);
        inner.waiters.remove(&frame);
    }
}
