//! Splits assistant HTML into plain segments and self-contained chart blocks.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::html::{parse_fragment, Fragment};

/// Reserved id prefix of chart containers.
pub const CHART_ID_PREFIX: &str = "chart-";

/// One contiguous unit of an assistant message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ContentSegment {
    PlainHtml {
        html: String,
    },
    Chart {
        #[serde(rename = "chartHtml")]
        chart_html: String,
    },
}

impl ContentSegment {
    /// The source markup this segment was cut from.
    pub fn raw(&self) -> &str {
        match self {
            ContentSegment::PlainHtml { html } => html,
            ContentSegment::Chart { chart_html } => chart_html,
        }
    }

    pub fn is_chart(&self) -> bool {
        matches!(self, ContentSegment::Chart { .. })
    }
}

fn echarts_init_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\becharts\s*\.\s*init\s*\(").expect("valid regex"))
}

fn chart_id_ref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"["'](chart-[A-Za-z0-9_-]+)["']"#).expect("valid regex"))
}

/// True for ids of the form `chart-<id>`, including `-wrap` / `-hint` variants.
pub fn is_chart_id(id: &str) -> bool {
    id.len() > CHART_ID_PREFIX.len() && id.starts_with(CHART_ID_PREFIX)
}

/// True for the chart root itself, i.e. not a `-wrap` or `-hint` companion.
pub fn is_chart_root_id(id: &str) -> bool {
    is_chart_id(id) && !id.contains("-wrap") && !id.contains("-hint")
}

/// `chart-abc-wrap` and `chart-abc-hint` both belong to `chart-abc`.
pub fn chart_base_id(id: &str) -> &str {
    id.strip_suffix("-wrap")
        .or_else(|| id.strip_suffix("-hint"))
        .unwrap_or(id)
}

/// Parse `html` into ordered segments.
///
/// Without chart blocks the whole input is a single plain segment (none for
/// empty input). With charts, whitespace-only gaps between blocks are dropped.
pub fn segment(html: &str) -> Vec<ContentSegment> {
    if html.is_empty() {
        return Vec::new();
    }
    let whole = || {
        vec![ContentSegment::PlainHtml {
            html: html.to_string(),
        }]
    };

    let fragment = match parse_fragment(html) {
        Ok(f) => f,
        Err(err) => {
            tracing::debug!(%err, "segmenter fell back to a single plain segment");
            return whole();
        }
    };

    let blocks = locate_chart_blocks(&fragment);
    if blocks.is_empty() {
        return whole();
    }

    let mut segments = Vec::with_capacity(blocks.len() * 2 + 1);
    let mut cursor = 0;
    for (start, end) in blocks {
        push_plain(&mut segments, &html[cursor..start]);
        segments.push(ContentSegment::Chart {
            chart_html: html[start..end].to_string(),
        });
        cursor = end;
    }
    push_plain(&mut segments, &html[cursor..]);
    segments
}

fn push_plain(segments: &mut Vec<ContentSegment>, html: &str) {
    if !html.trim().is_empty() {
        segments.push(ContentSegment::PlainHtml {
            html: html.to_string(),
        });
    }
}

/// Byte ranges of every chart block, sorted and non-overlapping.
fn locate_chart_blocks(fragment: &Fragment<'_>) -> Vec<(usize, usize)> {
    let mut ranges: Vec<(usize, usize)> = Vec::new();

    for script in 0..fragment.elements.len() {
        if fragment.elements[script].name != "script" || fragment.attr(script, "src").is_some() {
            continue;
        }
        let body = fragment.inner(script);
        if !echarts_init_re().is_match(body) {
            continue;
        }
        let Some(container) = find_container(fragment, script, body) else {
            tracing::debug!("chart init script without a chart container, kept as plain html");
            continue;
        };
        let (first, last) = lift_to_siblings(fragment, container, script);
        let start = include_loader_scripts(fragment, first);
        let end = fragment.elements[last].end;

        if ranges.iter().any(|&(s, e)| start < e && s < end) {
            continue;
        }
        ranges.push((start, end));
    }

    ranges.sort_unstable();
    ranges
}

/// The outermost chart element the init script renders into.
fn find_container(fragment: &Fragment<'_>, script: usize, body: &str) -> Option<usize> {
    let mut ids: Vec<&str> = chart_id_ref_re()
        .captures_iter(body)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .collect();
    // Root ids first so a `-hint` lookup earlier in the script does not win.
    ids.sort_by_key(|id| !is_chart_root_id(id));
    let referenced = ids
        .into_iter()
        .find_map(|id| fragment.find_by_id(id).filter(|&el| el != script));

    let container = referenced.or_else(|| {
        (0..script).rev().find(|&i| {
            fragment
                .attr(i, "id")
                .is_some_and(is_chart_id)
        })
    })?;

    // Prefer the `-wrap` element when it encloses the container.
    let id = fragment.attr(container, "id").unwrap_or("");
    let wrap_id = format!("{}-wrap", chart_base_id(id));
    let wrapped = fragment
        .ancestors(container)
        .find(|&a| fragment.attr(a, "id") == Some(wrap_id.as_str()));
    Some(wrapped.unwrap_or(container))
}

/// Lift two elements to the children of their lowest common ancestor so the
/// block never cuts through an enclosing element. Returns (first, last) in
/// document order.
fn lift_to_siblings(fragment: &Fragment<'_>, container: usize, script: usize) -> (usize, usize) {
    if fragment.is_ancestor_or_self(container, script) {
        return (container, container);
    }
    let script_chain: Vec<usize> = fragment.ancestors(script).collect();
    let lca = fragment
        .ancestors(container)
        .find(|a| script_chain.contains(a));

    let lift = |idx: usize| {
        fragment
            .ancestors(idx)
            .find(|&a| fragment.elements[a].parent == lca)
            .unwrap_or(idx)
    };
    let a = lift(container);
    let b = lift(script);
    if fragment.elements[a].start <= fragment.elements[b].start {
        (a, b)
    } else {
        (b, a)
    }
}

/// Extend the block start over directly preceding `<script src=...echarts...>`
/// siblings separated only by whitespace.
fn include_loader_scripts(fragment: &Fragment<'_>, first: usize) -> usize {
    let mut current = first;
    while let Some(prev) = fragment.previous_sibling(current) {
        let is_loader = fragment.elements[prev].name == "script"
            && fragment
                .attr(prev, "src")
                .is_some_and(|src| src.to_ascii_lowercase().contains("echarts"));
        let gap = fragment
            .source
            .get(fragment.elements[prev].end..fragment.elements[current].start)
            .unwrap_or("");
        if !is_loader || !gap.trim().is_empty() {
            break;
        }
        current = prev;
    }
    fragment.elements[current].start
}
