//! # agentchat rich-content rendering
//!
//! Turns the HTML an assistant agent replies with into blocks a chat view can
//! mount safely.
//!
//! ## Features
//! - Lenient HTML tokenizer and fragment tree with a nesting limit
//! - Segmentation of replies into plain HTML and self-contained ECharts blocks
//! - Allowlist sanitizer for the plain segments
//! - Scrollable wrappers around tables
//! - Standalone sandboxed documents for chart blocks, with embedded
//!   height/error/export scripts
//! - Host-side bridge hub that tracks chart frames and routes their messages
//!
//! ## Example
//! ```ignore
//! use agentchat_render::{render_assistant_html, RenderedBlock};
//!
//! let html = r#"
//! <p>Sales by region</p>
//! <div id="chart-sales" style="height:400px"></div>
//! <script>echarts.init(document.getElementById('chart-sales')).setOption({});</script>
//! "#;
//!
//! for block in render_assistant_html(html) {
//!     match block {
//!         RenderedBlock::Html { html } => println!("{html}"),
//!         RenderedBlock::Chart(chart) => println!("{}", chart.document()),
//!     }
//! }
//! ```
//!
//! ## Example: Bridge
//! ```ignore
//! use agentchat_render::{BridgeEvent, BridgeHub};
//! use serde_json::json;
//!
//! let mut hub = BridgeHub::new();
//! let frame = hub.mount(chart_html);
//! let srcdoc = hub.render(frame)?;
//! let event = hub.dispatch(frame, &json!({"type": "chart-height-report", "height": 640}));
//! ```

pub mod bridge;
pub mod chart;
pub mod content;
pub mod error;
pub mod html;
pub mod plain_text;
pub mod sanitize;
pub mod scripts;
pub mod segment;
pub mod tables;

// --- Pipeline ---
pub use content::{render_assistant_html, ChartBlock, RenderedBlock};
pub use error::{RenderError, RenderResult};
pub use sanitize::sanitize;
pub use segment::{segment, ContentSegment};
pub use tables::{prepare_plain_html, wrap_tables, TABLE_WRAPPER_CLASS};

// --- Chart documents ---
pub use chart::{build_chart_document, ChartKind, HeightBand, IFRAME_SANDBOX};

// --- Bridge ---
pub use bridge::{
    BridgeEvent, BridgeHub, BridgeMessage, ChartFrame, ExportState, FrameId, FramePhase,
    ScriptErrorReport,
};

// --- Plain text ---
pub use plain_text::{
    extract_image_urls, extract_plain_text, extract_plain_text_for_analytics,
    has_image_content, normalize_plain_text,
};
