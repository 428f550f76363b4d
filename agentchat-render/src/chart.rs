//! Builds the standalone document a chart block runs in.
//!
//! The document is loaded through an iframe `srcdoc` with the
//! [`IFRAME_SANDBOX`] permissions; scripts inside it reach the host only via
//! the bridge messages.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::html::parse_fragment;
use crate::scripts::{ERROR_REPORT_SCRIPT, EXPORT_SCRIPT, HEIGHT_REPORT_SCRIPT};
use crate::segment::{is_chart_id, is_chart_root_id};

/// Height used when the chart markup carries no height hint.
pub const DEFAULT_CHART_HEIGHT: u32 = 520;
pub const DEFAULT_MIN_WIDTH: u32 = 600;

pub const MIN_HEIGHT: u32 = 280;
pub const MAX_HEIGHT: u32 = 1200;
pub const PIE_MIN_HEIGHT: u32 = 320;
pub const PIE_MAX_HEIGHT: u32 = 520;

/// Room under the chart for legends and data-zoom controls.
pub const BOTTOM_PADDING_PX: u32 = 160;
pub const PIE_BOTTOM_PADDING_PX: u32 = 80;

pub const IFRAME_SANDBOX: &str = "allow-scripts allow-same-origin";

const CHART_ONLY_SELECTOR: &str = r#"[id^="chart-"]:not([id*="-wrap"]):not([id*="-hint"])"#;
const WRAP_SELECTOR: &str = r#"[id^="chart-"][id$="-wrap"]"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    General,
    Pie,
}

/// Inclusive height range a chart iframe may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeightBand {
    pub min: u32,
    pub max: u32,
}

impl HeightBand {
    /// Clamp a (possibly fractional or non-finite) height into the band.
    pub fn clamp(&self, height: f64) -> u32 {
        if !height.is_finite() {
            return self.min;
        }
        let h = height.ceil().clamp(self.min as f64, self.max as f64);
        h as u32
    }
}

fn series_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?:"series"|'series'|\bseries)\s*:"#).expect("valid regex"))
}

fn pie_type_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^(?:type|"type"|'type')\s*:\s*["']pie["']"#).expect("valid regex")
    })
}

fn height_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:^|[;\s])height\s*:\s*(\d+(?:\.\d+)?)px").expect("valid regex")
    })
}

fn width_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:^|[;\s])(?:min-)?width\s*:\s*(\d+(?:\.\d+)?)px").expect("valid regex")
    })
}

impl ChartKind {
    /// Pie when a `series` option of an inline script has an entry of
    /// `type: 'pie'`. Comments and string contents are not considered.
    pub fn detect(chart_html: &str) -> Self {
        if inline_scripts(chart_html)
            .into_iter()
            .any(declares_pie_series)
        {
            ChartKind::Pie
        } else {
            ChartKind::General
        }
    }

    pub fn height_band(self) -> HeightBand {
        match self {
            ChartKind::General => HeightBand {
                min: MIN_HEIGHT,
                max: MAX_HEIGHT,
            },
            ChartKind::Pie => HeightBand {
                min: PIE_MIN_HEIGHT,
                max: PIE_MAX_HEIGHT,
            },
        }
    }

    pub fn bottom_padding(self) -> u32 {
        match self {
            ChartKind::General => BOTTOM_PADDING_PX,
            ChartKind::Pie => PIE_BOTTOM_PADDING_PX,
        }
    }
}

fn inline_scripts(chart_html: &str) -> Vec<&str> {
    let Ok(fragment) = parse_fragment(chart_html) else {
        return vec![chart_html];
    };
    (0..fragment.elements.len())
        .filter(|&idx| fragment.elements[idx].name == "script")
        .map(|idx| fragment.inner(idx))
        .collect()
}

/// Script source with `//` and `/* */` comments blanked; strings are kept.
fn strip_js_comments(js: &str) -> String {
    let b = js.as_bytes();
    let mut out = String::with_capacity(js.len());
    let mut copy_from = 0;
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < b.len() {
        if let Some(q) = quote {
            match b[i] {
                b'\\' => i += 1,
                c if c == q => quote = None,
                b'\n' if q != b'`' => quote = None,
                _ => {}
            }
            i += 1;
            continue;
        }
        let end = match (b[i], b.get(i + 1).copied()) {
            (b'"' | b'\'' | b'`', _) => {
                quote = Some(b[i]);
                i += 1;
                continue;
            }
            (b'/', Some(b'/')) => js[i..].find('\n').map_or(b.len(), |n| i + n),
            (b'/', Some(b'*')) => js[i + 2..].find("*/").map_or(b.len(), |n| i + n + 4),
            _ => {
                i += 1;
                continue;
            }
        };
        out.push_str(&js[copy_from..i]);
        out.push(' ');
        i = end;
        copy_from = end;
    }
    out.push_str(&js[copy_from.min(b.len())..]);
    out
}

/// True when byte `pos` of `code` is not inside a string literal.
fn outside_strings(code: &str, pos: usize) -> bool {
    let b = code.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < pos.min(b.len()) {
        match (quote, b[i]) {
            (Some(_), b'\\') => i += 1,
            (Some(q), c) if c == q => quote = None,
            (None, c @ (b'"' | b'\'' | b'`')) => quote = Some(c),
            _ => {}
        }
        i += 1;
    }
    quote.is_none()
}

fn starts_pie_type(value: &str, i: usize) -> bool {
    let b = value.as_bytes();
    let after_ident = i > 0 && (b[i - 1].is_ascii_alphanumeric() || b[i - 1] == b'_' || b[i - 1] == b'$');
    !after_ident && value.is_char_boundary(i) && pie_type_re().is_match(&value[i..])
}

/// Scan one `series` value (text after the colon) for a pie entry.
fn series_value_has_pie(value: &str) -> bool {
    let b = value.as_bytes();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < b.len() {
        let c = b[i];
        if let Some(q) = quote {
            if c == b'\\' {
                i += 1;
            } else if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        if depth > 0 && starts_pie_type(value, i) {
            return true;
        }
        match c {
            b'"' | b'\'' | b'`' => quote = Some(c),
            b'[' | b'{' | b'(' => depth += 1,
            b']' | b'}' | b')' => {
                if depth <= 1 {
                    return false;
                }
                depth -= 1;
            }
            b',' | b';' if depth == 0 => return false,
            _ => {}
        }
        i += 1;
    }
    false
}

fn declares_pie_series(js: &str) -> bool {
    let code = strip_js_comments(js);
    series_key_re()
        .find_iter(&code)
        .any(|m| outside_strings(&code, m.start()) && series_value_has_pie(&code[m.end()..]))
}

/// Inline `style` values of the chart root first, then its `-wrap`/`-hint` companions.
fn chart_styles(chart_html: &str) -> Vec<String> {
    let Ok(fragment) = parse_fragment(chart_html) else {
        return Vec::new();
    };
    let mut roots = Vec::new();
    let mut companions = Vec::new();
    for idx in 0..fragment.elements.len() {
        let Some(id) = fragment.attr(idx, "id") else {
            continue;
        };
        let Some(style) = fragment.attr(idx, "style") else {
            continue;
        };
        if is_chart_root_id(id) {
            roots.push(style.to_string());
        } else if is_chart_id(id) {
            companions.push(style.to_string());
        }
    }
    roots.extend(companions);
    roots
}

fn first_px(re: &Regex, styles: &[String]) -> Option<u32> {
    styles.iter().find_map(|style| {
        re.captures_iter(style)
            .filter_map(|c| c.get(1)?.as_str().parse::<f64>().ok())
            .map(|v| v.ceil() as u32)
            .max()
    })
}

/// Height in px declared by the chart markup, if any.
pub fn extract_chart_height(chart_html: &str) -> Option<u32> {
    first_px(height_re(), &chart_styles(chart_html)).filter(|&h| h > 0)
}

/// Width (or min-width) in px declared by the chart markup, if any.
pub fn extract_chart_width(chart_html: &str) -> Option<u32> {
    first_px(width_re(), &chart_styles(chart_html)).filter(|&w| w > 0)
}

/// Starting iframe height for a chart before any report arrives.
pub fn initial_height(chart_html: &str, kind: ChartKind) -> u32 {
    let declared = extract_chart_height(chart_html).unwrap_or(DEFAULT_CHART_HEIGHT);
    kind.height_band().clamp(declared as f64)
}

/// Build the full iframe document for a chart block.
///
/// The chart container is pinned to `target_height` clamped to the kind's
/// band; the body gets a minimum width so narrow viewports scroll
/// horizontally instead of squashing the chart.
pub fn build_chart_document(chart_html: &str, target_height: f64, kind: ChartKind) -> String {
    let height = kind.height_band().clamp(target_height);
    let min_width = DEFAULT_MIN_WIDTH.max(extract_chart_width(chart_html).unwrap_or(0));
    let bottom_pad = kind.bottom_padding();
    let total_height = height + bottom_pad;

    let styles = format!(
        "{chart}{{height:{h}px!important;max-height:{h}px!important}}\
         {wrap}{{height:{h}px!important;max-height:{h}px!important}}\
         body{{margin:0;padding:0;padding-bottom:{pad}px;overflow-x:auto;overflow-y:auto;min-width:{w}px;min-height:{total}px;height:auto}}\
         {chart}{{min-width:{w}px!important;width:100%!important;overflow:visible!important}}\
         {wrap}{{overflow:visible!important}}",
        chart = CHART_ONLY_SELECTOR,
        wrap = WRAP_SELECTOR,
        h = height,
        pad = bottom_pad,
        w = min_width,
        total = total_height,
    );

    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\">\
         <meta name=\"viewport\" content=\"width=device-width,initial-scale=1\">\
         <style>{styles}</style></head><body>\
         <script>{errors}</script>{chart_html}\
         <script>{heights}</script><script>{export}</script>\
         </body></html>",
        styles = styles,
        errors = ERROR_REPORT_SCRIPT,
        chart_html = chart_html,
        heights = HEIGHT_REPORT_SCRIPT,
        export = EXPORT_SCRIPT,
    )
}
