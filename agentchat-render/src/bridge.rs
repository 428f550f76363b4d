//! Host side of the chart iframe bridge.
//!
//! Every chart iframe and the export flow share one message channel. The
//! [`BridgeHub`] is the single dispatcher: it filters messages by shape,
//! routes them by source frame and keeps each frame's lifecycle state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::chart::{build_chart_document, initial_height, ChartKind, HeightBand};
use crate::error::{RenderError, RenderResult};

pub const HEIGHT_REPORT_TYPE: &str = "chart-height-report";
pub const SCRIPT_ERROR_TYPE: &str = "chart-script-error";
pub const EXPORT_REQUEST_TYPE: &str = "chart-export-request";
pub const EXPORT_RESULT_TYPE: &str = "chart-export-result";

/// Identifies one mounted chart iframe (the message source).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FrameId(pub u64);

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame-{}", self.0)
    }
}

/// Messages exchanged between the host page and chart iframes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BridgeMessage {
    ChartHeightReport {
        height: f64,
    },
    ChartScriptError {
        #[serde(default)]
        error: String,
        #[serde(default)]
        src: String,
        #[serde(default)]
        line: Option<u32>,
        #[serde(default)]
        col: Option<u32>,
    },
    ChartExportRequest {},
    ChartExportResult {
        #[serde(rename = "dataUrl", default, skip_serializing_if = "Option::is_none")]
        data_url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl BridgeMessage {
    /// Parse an incoming message; anything without a known `type` or with
    /// the wrong shape yields `None`.
    pub fn parse(data: &serde_json::Value) -> Option<Self> {
        let kind = data.get("type")?.as_str()?;
        if ![
            HEIGHT_REPORT_TYPE,
            SCRIPT_ERROR_TYPE,
            EXPORT_REQUEST_TYPE,
            EXPORT_RESULT_TYPE,
        ]
        .contains(&kind)
        {
            return None;
        }
        serde_json::from_value(data.clone()).ok()
    }

    pub fn to_value(&self) -> RenderResult<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Diagnostics forwarded by a chart's error handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptErrorReport {
    pub error: String,
    pub src: String,
    pub line: Option<u32>,
    pub col: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    Unrendered,
    Loading,
    /// At least one height report accepted or seen.
    Reported { reports: u32 },
    Unmounted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportState {
    Idle,
    Pending,
}

/// Lifecycle state of one chart iframe.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartFrame {
    id: FrameId,
    chart_html: String,
    kind: ChartKind,
    height: u32,
    phase: FramePhase,
    export: ExportState,
}

impl ChartFrame {
    pub fn new(id: FrameId, chart_html: impl Into<String>) -> Self {
        let chart_html = chart_html.into();
        let kind = ChartKind::detect(&chart_html);
        let height = initial_height(&chart_html, kind);
        Self {
            id,
            chart_html,
            kind,
            height,
            phase: FramePhase::Unrendered,
            export: ExportState::Idle,
        }
    }

    pub fn id(&self) -> FrameId {
        self.id
    }

    pub fn kind(&self) -> ChartKind {
        self.kind
    }

    pub fn band(&self) -> HeightBand {
        self.kind.height_band()
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    pub fn export_state(&self) -> ExportState {
        self.export
    }

    pub fn chart_html(&self) -> &str {
        &self.chart_html
    }

    /// The iframe document at the current height.
    pub fn document(&self) -> String {
        build_chart_document(&self.chart_html, self.height as f64, self.kind)
    }

    /// Apply a reported content height. The height only ever grows, and is
    /// kept inside the kind's band. Returns true when it changed.
    pub fn apply_height_report(&mut self, reported: f64) -> bool {
        self.phase = match self.phase {
            FramePhase::Reported { reports } => FramePhase::Reported {
                reports: reports.saturating_add(1),
            },
            _ => FramePhase::Reported { reports: 1 },
        };
        let clamped = self.band().clamp(reported);
        if clamped > self.height {
            self.height = clamped;
            true
        } else {
            false
        }
    }
}

/// What a dispatched message did.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// Not a bridge message, unknown source, or nothing waiting for it.
    Ignored,
    HeightChanged { frame: FrameId, height: u32 },
    HeightUnchanged { frame: FrameId, height: u32 },
    ScriptError { frame: FrameId, report: ScriptErrorReport },
    ExportResolved { frame: FrameId, data_url: String },
    ExportFailed { frame: FrameId, reason: String },
}

/// Dispatcher and registry for every mounted chart iframe on the page.
#[derive(Debug, Default)]
pub struct BridgeHub {
    frames: BTreeMap<FrameId, ChartFrame>,
    next_id: u64,
}

impl BridgeHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mount(&mut self, chart_html: impl Into<String>) -> FrameId {
        self.next_id += 1;
        let id = FrameId(self.next_id);
        self.frames.insert(id, ChartFrame::new(id, chart_html));
        tracing::debug!(frame = %id, "chart frame mounted");
        id
    }

    pub fn frame(&self, id: FrameId) -> Option<&ChartFrame> {
        self.frames.get(&id)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Produce the document to load into the frame's iframe.
    pub fn render(&mut self, id: FrameId) -> RenderResult<String> {
        let frame = self
            .frames
            .get_mut(&id)
            .ok_or(RenderError::UnknownFrame(id))?;
        if frame.phase == FramePhase::Unrendered {
            frame.phase = FramePhase::Loading;
        }
        Ok(frame.document())
    }

    /// Route one message received from `source`.
    pub fn dispatch(&mut self, source: FrameId, data: &serde_json::Value) -> BridgeEvent {
        let Some(message) = BridgeMessage::parse(data) else {
            return BridgeEvent::Ignored;
        };
        let Some(frame) = self.frames.get_mut(&source) else {
            tracing::trace!(frame = %source, "bridge message from unknown source dropped");
            return BridgeEvent::Ignored;
        };

        match message {
            BridgeMessage::ChartHeightReport { height } => {
                let changed = frame.apply_height_report(height);
                let current = frame.height();
                tracing::debug!(frame = %source, reported = height, height = current, changed, "chart height report");
                if changed {
                    BridgeEvent::HeightChanged {
                        frame: source,
                        height: current,
                    }
                } else {
                    BridgeEvent::HeightUnchanged {
                        frame: source,
                        height: current,
                    }
                }
            }
            BridgeMessage::ChartScriptError {
                error,
                src,
                line,
                col,
            } => {
                tracing::warn!(frame = %source, %error, %src, ?line, ?col, "chart iframe script error");
                BridgeEvent::ScriptError {
                    frame: source,
                    report: ScriptErrorReport {
                        error,
                        src,
                        line,
                        col,
                    },
                }
            }
            // Host-to-iframe only
            BridgeMessage::ChartExportRequest {} => BridgeEvent::Ignored,
            BridgeMessage::ChartExportResult { data_url, error } => {
                if frame.export != ExportState::Pending {
                    tracing::debug!(frame = %source, "export result with no pending request dropped");
                    return BridgeEvent::Ignored;
                }
                frame.export = ExportState::Idle;
                match (data_url, error) {
                    (Some(data_url), _) if !data_url.is_empty() => BridgeEvent::ExportResolved {
                        frame: source,
                        data_url,
                    },
                    (_, Some(reason)) => BridgeEvent::ExportFailed {
                        frame: source,
                        reason,
                    },
                    _ => BridgeEvent::ExportFailed {
                        frame: source,
                        reason: "empty export result".to_string(),
                    },
                }
            }
        }
    }

    /// Register a pending export for `id` and return the message to post
    /// into its iframe.
    pub fn request_export(&mut self, id: FrameId) -> RenderResult<BridgeMessage> {
        let frame = self
            .frames
            .get_mut(&id)
            .ok_or(RenderError::UnknownFrame(id))?;
        if frame.export == ExportState::Pending {
            return Err(RenderError::ExportInFlight(id));
        }
        frame.export = ExportState::Pending;
        Ok(BridgeMessage::ChartExportRequest {})
    }

    /// Tear down a pending export that will not be answered. Returns true if
    /// one was pending.
    pub fn cancel_export(&mut self, id: FrameId) -> bool {
        match self.frames.get_mut(&id) {
            Some(frame) if frame.export == ExportState::Pending => {
                frame.export = ExportState::Idle;
                true
            }
            _ => false,
        }
    }

    /// Remove a frame; later messages from it are ignored.
    pub fn unmount(&mut self, id: FrameId) -> Option<ChartFrame> {
        let mut frame = self.frames.remove(&id)?;
        frame.phase = FramePhase::Unmounted;
        frame.export = ExportState::Idle;
        tracing::debug!(frame = %id, "chart frame unmounted");
        Some(frame)
    }
}
