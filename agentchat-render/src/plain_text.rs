//! Plain-text views of assistant HTML, used for copy-to-clipboard and
//! analytics payloads.

use regex::Regex;
use std::sync::OnceLock;

use crate::html::{attr, decode_entities, is_void, tokenize, TokenKind};

/// Tags whose boundaries become line breaks.
const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "caption", "dd", "details", "div", "dl",
    "dt", "figcaption", "figure", "footer", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr",
    "li", "main", "nav", "ol", "p", "pre", "section", "summary", "table", "tbody", "tfoot",
    "thead", "tr", "ul",
];

/// Cells are separated by a space instead of a newline.
const CELL_TAGS: &[&str] = &["td", "th"];

const SKIPPED: &[&str] = &["script", "style", "noscript", "template", "head", "title"];
const SKIPPED_FOR_ANALYTICS: &[&str] = &[
    "script", "style", "noscript", "template", "head", "title", "a", "link",
];

fn url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bhttps?://\S+").expect("valid regex"))
}

/// Collapse runs of whitespace inside each line, trim lines and drop empty
/// ones. With `strip_urls`, `http(s)://` links are removed first.
pub fn normalize_plain_text(raw: &str, strip_urls: bool) -> String {
    let text = if strip_urls {
        url_re().replace_all(raw, "").into_owned()
    } else {
        raw.to_string()
    };
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn collect_text(html: &str, skipped: &[&str]) -> String {
    let mut out = String::with_capacity(html.len());
    // (tag, nesting) of the skipped element we are inside
    let mut skipping: Option<(String, usize)> = None;

    for tok in tokenize(html) {
        if let Some((tag, depth)) = skipping.as_mut() {
            match &tok.kind {
                TokenKind::StartTag {
                    name, self_closing, ..
                } if *name == *tag && !*self_closing && !is_void(name) => *depth += 1,
                TokenKind::EndTag { name } if *name == *tag => {
                    *depth -= 1;
                    if *depth == 0 {
                        skipping = None;
                    }
                }
                _ => {}
            }
            continue;
        }

        match &tok.kind {
            TokenKind::Text => out.push_str(&decode_entities(tok.raw(html))),
            TokenKind::StartTag {
                name, self_closing, ..
            } => {
                if skipped.contains(&name.as_str()) {
                    if !*self_closing && !is_void(name) {
                        skipping = Some((name.clone(), 1));
                    }
                } else if BLOCK_TAGS.contains(&name.as_str()) {
                    out.push('\n');
                } else if CELL_TAGS.contains(&name.as_str()) {
                    out.push(' ');
                }
            }
            TokenKind::EndTag { name } => {
                if BLOCK_TAGS.contains(&name.as_str()) {
                    out.push('\n');
                } else if CELL_TAGS.contains(&name.as_str()) {
                    out.push(' ');
                }
            }
            TokenKind::Comment | TokenKind::Doctype => {}
        }
    }
    out
}

/// Readable text of an HTML message: scripts and styles skipped, block
/// elements on their own lines.
pub fn extract_plain_text(html: &str) -> String {
    normalize_plain_text(&collect_text(html, SKIPPED), false)
}

/// Like [`extract_plain_text`] but also without links or bare URLs.
pub fn extract_plain_text_for_analytics(html: &str) -> String {
    normalize_plain_text(&collect_text(html, SKIPPED_FOR_ANALYTICS), true)
}

/// Unique `<img src>` values in document order.
pub fn extract_image_urls(html: &str) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    for tok in tokenize(html) {
        let TokenKind::StartTag { name, attrs, .. } = &tok.kind else {
            continue;
        };
        if name != "img" {
            continue;
        }
        if let Some(src) = attr(attrs, "src").map(str::trim).filter(|s| !s.is_empty()) {
            if !urls.iter().any(|u| u == src) {
                urls.push(src.to_string());
            }
        }
    }
    urls
}

pub fn has_image_content(html: &str) -> bool {
    !extract_image_urls(html).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_drops_blank_lines() {
        assert_eq!(
            normalize_plain_text("  a   b \n\n \t\n c ", false),
            "a b\nc"
        );
    }

    #[test]
    fn test_normalize_strips_urls() {
        assert_eq!(
            normalize_plain_text("see https://x.io/a?b=1 now\nHTTP://y.io", true),
            "see now"
        );
    }

    #[test]
    fn test_block_tags_break_lines() {
        let html = "<p>One</p><p>Two &amp; <b>three</b></p><script>x()</script><ul><li>a</li><li>b</li></ul>";
        assert_eq!(extract_plain_text(html), "One\nTwo & three\na\nb");
    }

    #[test]
    fn test_analytics_drops_links() {
        let html = r#"<p>Read <a href="https://x.io">the docs</a> at https://x.io today</p>"#;
        assert_eq!(extract_plain_text_for_analytics(html), "Read at today");
    }

    #[test]
    fn test_image_urls_are_unique() {
        let html = r#"<img src="a.png"><p><img src="b.png"><img src=" a.png "></p><img>"#;
        assert_eq!(extract_image_urls(html), vec!["a.png", "b.png"]);
        assert!(has_image_content(html));
        assert!(!has_image_content("<p>none</p>"));
    }
}
