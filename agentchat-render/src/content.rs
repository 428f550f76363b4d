//! Turns one assistant reply into the blocks a view mounts.

use serde::{Deserialize, Serialize};

use crate::chart::{build_chart_document, initial_height, ChartKind, IFRAME_SANDBOX};
use crate::segment::{segment, ContentSegment};
use crate::tables::prepare_plain_html;

/// A chart block ready to be mounted in a sandboxed iframe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartBlock {
    pub chart_html: String,
    pub kind: ChartKind,
    pub initial_height: u32,
}

impl ChartBlock {
    pub fn from_markup(chart_html: impl Into<String>) -> Self {
        let chart_html = chart_html.into();
        let kind = ChartKind::detect(&chart_html);
        let initial_height = initial_height(&chart_html, kind);
        Self {
            chart_html,
            kind,
            initial_height,
        }
    }

    /// Document for the iframe `srcdoc` at the initial height.
    pub fn document(&self) -> String {
        build_chart_document(&self.chart_html, self.initial_height as f64, self.kind)
    }

    pub fn sandbox(&self) -> &'static str {
        IFRAME_SANDBOX
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "block", rename_all = "snake_case")]
pub enum RenderedBlock {
    /// Sanitized host HTML with wrapped tables.
    Html { html: String },
    Chart(ChartBlock),
}

/// Segment an assistant reply and prepare each segment for display. Plain
/// segments that sanitize to nothing visible are skipped.
pub fn render_assistant_html(html: &str) -> Vec<RenderedBlock> {
    let blocks: Vec<RenderedBlock> = segment(html)
        .into_iter()
        .filter_map(|seg| match seg {
            ContentSegment::PlainHtml { html } => {
                let prepared = prepare_plain_html(&html);
                if prepared.trim().is_empty() {
                    None
                } else {
                    Some(RenderedBlock::Html { html: prepared })
                }
            }
            ContentSegment::Chart { chart_html } => {
                Some(RenderedBlock::Chart(ChartBlock::from_markup(chart_html)))
            }
        })
        .collect();
    tracing::trace!(blocks = blocks.len(), "assistant reply rendered");
    blocks
}
