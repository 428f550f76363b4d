//! Allowlist sanitizer for plain (non-chart) assistant HTML.
//!
//! Output is rebuilt from tokens: allowed tags are re-serialized with only
//! their allowed attributes, text is escaped, everything else is dropped.
//! Running it twice gives the same result as running it once.

use crate::html::{decode_entities, is_raw_text, is_void, tokenize, Attribute, TokenKind};

/// Tags kept in sanitized output.
const ALLOWED_TAGS: &[&str] = &[
    "a", "abbr", "address", "article", "aside", "b", "bdi", "bdo", "blockquote", "br", "caption",
    "center", "cite", "code", "col", "colgroup", "data", "dd", "del", "details", "dfn", "div",
    "dl", "dt", "em", "figcaption", "figure", "font", "footer", "h1", "h2", "h3", "h4", "h5", "h6",
    "header", "hr", "i", "img", "ins", "kbd", "li", "main", "mark", "nav", "ol", "p", "pre", "q",
    "rp", "rt", "ruby", "s", "samp", "section", "small", "span", "strike", "strong", "sub",
    "summary", "sup", "table", "tbody", "td", "tfoot", "th", "thead", "time", "tr", "tt", "u",
    "ul", "var", "wbr",
];

/// Tags removed together with everything inside them.
const DROP_WITH_CONTENT: &[&str] = &[
    "script", "style", "iframe", "object", "embed", "applet", "noscript", "noembed", "noframes",
    "template", "svg", "math", "title", "textarea", "xmp", "frame", "frameset", "base", "meta",
    "link",
];

const GLOBAL_ATTRS: &[&str] = &[
    "class", "id", "title", "lang", "dir", "role", "style", "align", "valign", "width", "height",
];

const URL_ATTRS: &[&str] = &["href", "src", "cite"];

const SAFE_SCHEMES: &[&str] = &["http", "https", "mailto", "tel", "ftp"];

fn tag_attrs(tag: &str) -> &'static [&'static str] {
    match tag {
        "a" => &["href", "target", "rel", "name", "hreflang"],
        "img" => &["src", "alt", "loading", "border"],
        "td" | "th" => &["colspan", "rowspan", "scope", "headers", "nowrap", "bgcolor"],
        "col" | "colgroup" => &["span"],
        "table" => &["border", "cellpadding", "cellspacing", "summary", "bgcolor"],
        "ol" => &["start", "type", "reversed"],
        "ul" => &["type"],
        "li" | "data" => &["value"],
        "blockquote" | "q" | "del" | "ins" => &["cite"],
        "details" => &["open"],
        "time" => &["datetime"],
        "font" => &["color", "face", "size"],
        "tr" => &["bgcolor"],
        _ => &[],
    }
}

/// Strip script-capable markup from `html`. Never fails.
pub fn sanitize(html: &str) -> String {
    let tokens = tokenize(html);
    let mut out = String::with_capacity(html.len());
    // (tag, nesting) of the dropped element we are currently inside
    let mut dropping: Option<(String, usize)> = None;

    for tok in &tokens {
        if let Some((tag, depth)) = dropping.as_mut() {
            match &tok.kind {
                TokenKind::StartTag {
                    name, self_closing, ..
                } if *name == *tag && !*self_closing && !is_void(name) => *depth += 1,
                TokenKind::EndTag { name } if *name == *tag => {
                    *depth -= 1;
                    if *depth == 0 {
                        dropping = None;
                    }
                }
                _ => {}
            }
            continue;
        }

        match &tok.kind {
            TokenKind::Text => escape_text_into(&mut out, tok.raw(html)),
            TokenKind::Comment | TokenKind::Doctype => {}
            TokenKind::StartTag {
                name,
                attrs,
                self_closing,
            } => {
                if DROP_WITH_CONTENT.contains(&name.as_str()) {
                    let opens = is_raw_text(name) || !(*self_closing || is_void(name));
                    if opens {
                        dropping = Some((name.clone(), 1));
                    }
                    continue;
                }
                if ALLOWED_TAGS.contains(&name.as_str()) {
                    write_start_tag(&mut out, name, attrs);
                }
            }
            TokenKind::EndTag { name } => {
                if ALLOWED_TAGS.contains(&name.as_str()) && !is_void(name) {
                    out.push_str("</");
                    out.push_str(name);
                    out.push('>');
                }
            }
        }
    }
    out
}

fn write_start_tag(out: &mut String, tag: &str, attrs: &[Attribute]) {
    out.push('<');
    out.push_str(tag);
    for a in attrs {
        if !attr_allowed(tag, a) {
            continue;
        }
        out.push(' ');
        out.push_str(&a.name);
        if let Some(value) = &a.value {
            out.push_str("=\"");
            out.push_str(&escape_attr(value));
            out.push('"');
        }
    }
    out.push('>');
}

fn attr_allowed(tag: &str, attr: &Attribute) -> bool {
    let name = attr.name.as_str();
    if name.starts_with("on") || !name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-') {
        return false;
    }
    let known = GLOBAL_ATTRS.contains(&name)
        || tag_attrs(tag).contains(&name)
        || name.starts_with("aria-")
        || name.starts_with("data-");
    if !known {
        return false;
    }
    let value = attr.value.as_deref().unwrap_or("");
    if URL_ATTRS.contains(&name) {
        return is_safe_url(tag, name, value);
    }
    if name == "style" {
        return is_safe_style(value);
    }
    true
}

/// Scheme allowlist check on the entity-decoded, whitespace-stripped value.
fn is_safe_url(tag: &str, attr: &str, value: &str) -> bool {
    let normalized: String = decode_entities(value)
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase();
    let Some(colon) = normalized.find(':') else {
        return true;
    };
    let scheme = &normalized[..colon];
    if scheme.contains(['/', '?', '#']) {
        // "path/with:colon" or "?q=a:b" are relative references
        return true;
    }
    if SAFE_SCHEMES.contains(&scheme) {
        return true;
    }
    scheme == "data" && tag == "img" && attr == "src" && normalized.starts_with("data:image/")
}

fn is_safe_style(value: &str) -> bool {
    let lower = decode_entities(value).to_ascii_lowercase();
    !["expression(", "javascript:", "url(", "behavior:", "-moz-binding"]
        .iter()
        .any(|bad| lower.contains(bad))
}

fn escape_text_into(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
}

fn escape_attr(value: &str) -> String {
    value
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_urls() {
        assert!(is_safe_url("a", "href", "https://example.com/a:b"));
        assert!(is_safe_url("a", "href", "/reports?range=a:b"));
        assert!(is_safe_url("a", "href", "#top"));
        assert!(!is_safe_url("a", "href", " java\tscript:alert(1)"));
        assert!(!is_safe_url("a", "href", "&#106;avascript:alert(1)"));
        assert!(!is_safe_url("a", "href", "data:text/html,<script>"));
        assert!(is_safe_url("img", "src", "data:image/png;base64,AAAA"));
    }

    #[test]
    fn test_unsafe_styles() {
        assert!(is_safe_style("color:red;width:100px"));
        assert!(!is_safe_style("background:url(javascript:x)"));
        assert!(!is_safe_style("width:expression(alert(1))"));
    }
}
