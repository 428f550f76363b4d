//! Lenient HTML tokenizer and fragment tree.
//!
//! Assistant responses are arbitrary, frequently broken HTML. The tokenizer
//! never fails: anything it cannot read as markup is returned as text. Every
//! token boundary falls on an ASCII delimiter, so spans always slice the
//! source on a char boundary.

use crate::error::{RenderError, RenderResult};

/// Deepest element nesting the fragment tree accepts.
pub const MAX_NESTING_DEPTH: usize = 256;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements whose content is raw text up to the matching end tag.
const RAW_TEXT_ELEMENTS: &[&str] = &[
    "script", "style", "textarea", "title", "xmp", "iframe", "noembed", "noframes", "noscript",
];

/// Elements whose end tag may be omitted when a sibling of the same name opens.
const SELF_CLOSING_SIBLINGS: &[&str] = &["li", "p", "tr", "td", "th", "dt", "dd", "option"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Text,
    Comment,
    Doctype,
    StartTag {
        name: String,
        attrs: Vec<Attribute>,
        self_closing: bool,
    },
    EndTag {
        name: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

impl Token {
    /// The exact source text of this token.
    pub fn raw<'a>(&self, source: &'a str) -> &'a str {
        source.get(self.start..self.end).unwrap_or("")
    }
}

pub fn is_void(name: &str) -> bool {
    VOID_ELEMENTS.contains(&name)
}

pub fn is_raw_text(name: &str) -> bool {
    RAW_TEXT_ELEMENTS.contains(&name)
}

/// Look up an attribute value by (lowercase) name.
pub fn attr<'a>(attrs: &'a [Attribute], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|a| a.name == name)
        .map(|a| a.value.as_deref().unwrap_or(""))
}

// ─── Tokenizer ───────────────────────────────────────────────────────────────

pub fn tokenize(html: &str) -> Vec<Token> {
    let bytes = html.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    let mut text_start = 0;

    while i < bytes.len() {
        if bytes[i] != b'<' {
            i += 1;
            continue;
        }
        let Some((kind, end)) = read_markup(html, i) else {
            i += 1;
            continue;
        };
        push_text(&mut tokens, text_start, i);

        let raw_text_name = match &kind {
            TokenKind::StartTag { name, .. } if is_raw_text(name) => Some(name.clone()),
            _ => None,
        };
        tokens.push(Token { kind, start: i, end });
        i = end;
        text_start = i;

        if let Some(name) = raw_text_name {
            i = read_raw_text(html, i, &name, &mut tokens);
            text_start = i;
        }
    }
    push_text(&mut tokens, text_start, bytes.len());
    tokens
}

fn push_text(tokens: &mut Vec<Token>, start: usize, end: usize) {
    if end > start {
        tokens.push(Token {
            kind: TokenKind::Text,
            start,
            end,
        });
    }
}

/// Consume raw text after `<name>` up to and including `</name ...>`.
/// Returns the position after the consumed input.
fn read_raw_text(html: &str, from: usize, name: &str, tokens: &mut Vec<Token>) -> usize {
    let bytes = html.as_bytes();
    let Some(close) = find_end_tag(bytes, from, name) else {
        push_text(tokens, from, bytes.len());
        return bytes.len();
    };
    push_text(tokens, from, close);
    match find_byte(bytes, close, b'>') {
        Some(gt) => {
            tokens.push(Token {
                kind: TokenKind::EndTag {
                    name: name.to_string(),
                },
                start: close,
                end: gt + 1,
            });
            gt + 1
        }
        None => {
            push_text(tokens, close, bytes.len());
            bytes.len()
        }
    }
}

/// Case-insensitive search for `</name` followed by a delimiter.
fn find_end_tag(bytes: &[u8], from: usize, name: &str) -> Option<usize> {
    let needle = name.as_bytes();
    let mut i = from;
    while i + 2 + needle.len() <= bytes.len() {
        if bytes[i] == b'<'
            && bytes[i + 1] == b'/'
            && bytes[i + 2..i + 2 + needle.len()].eq_ignore_ascii_case(needle)
        {
            let after = bytes.get(i + 2 + needle.len()).copied();
            if matches!(after, None | Some(b'>') | Some(b'/')) || after.is_some_and(is_space) {
                return Some(i);
            }
        }
        i += 1;
    }
    None
}

fn find_byte(bytes: &[u8], from: usize, needle: u8) -> Option<usize> {
    bytes
        .get(from..)?
        .iter()
        .position(|&b| b == needle)
        .map(|p| from + p)
}

fn find_seq(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    if from + needle.len() > bytes.len() {
        return None;
    }
    bytes[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| from + p)
}

fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r' | b'\x0c')
}

/// Try to read a markup construct starting at `<`. `None` means the `<` is text.
fn read_markup(html: &str, start: usize) -> Option<(TokenKind, usize)> {
    let bytes = html.as_bytes();
    let next = *bytes.get(start + 1)?;

    if bytes[start..].starts_with(b"<!--") {
        let end = find_seq(bytes, start + 4, b"-->")
            .map(|p| p + 3)
            .unwrap_or(bytes.len());
        return Some((TokenKind::Comment, end));
    }
    if next == b'!' || next == b'?' {
        let end = find_byte(bytes, start, b'>')
            .map(|p| p + 1)
            .unwrap_or(bytes.len());
        let is_doctype = bytes
            .get(start + 2..start + 9)
            .is_some_and(|s| s.eq_ignore_ascii_case(b"doctype"));
        let kind = if is_doctype {
            TokenKind::Doctype
        } else {
            TokenKind::Comment
        };
        return Some((kind, end));
    }
    if next == b'/' {
        if !bytes.get(start + 2)?.is_ascii_alphabetic() {
            return None;
        }
        let (name, after) = read_name(html, start + 2);
        let gt = find_byte(bytes, after, b'>')?;
        return Some((TokenKind::EndTag { name }, gt + 1));
    }
    if next.is_ascii_alphabetic() {
        return read_start_tag(html, start);
    }
    None
}

fn read_name(html: &str, from: usize) -> (String, usize) {
    let bytes = html.as_bytes();
    let mut i = from;
    while i < bytes.len() && !is_space(bytes[i]) && bytes[i] != b'/' && bytes[i] != b'>' {
        i += 1;
    }
    (html.get(from..i).unwrap_or("").to_ascii_lowercase(), i)
}

fn read_start_tag(html: &str, start: usize) -> Option<(TokenKind, usize)> {
    let bytes = html.as_bytes();
    let (name, mut i) = read_name(html, start + 1);
    let mut attrs: Vec<Attribute> = Vec::new();
    let mut self_closing = false;

    loop {
        while i < bytes.len() && (is_space(bytes[i]) || bytes[i] == b'/') {
            self_closing = bytes[i] == b'/';
            i += 1;
        }
        if i >= bytes.len() {
            return None;
        }
        if bytes[i] == b'>' {
            let kind = TokenKind::StartTag {
                name,
                attrs,
                self_closing,
            };
            return Some((kind, i + 1));
        }
        self_closing = false;

        let name_start = i;
        while i < bytes.len()
            && !is_space(bytes[i])
            && !matches!(bytes[i], b'=' | b'>' | b'/')
        {
            i += 1;
        }
        if i == name_start {
            // A stray '=' with no attribute name
            i += 1;
            continue;
        }
        let attr_name = html.get(name_start..i).unwrap_or("").to_ascii_lowercase();

        let mut j = i;
        while j < bytes.len() && is_space(bytes[j]) {
            j += 1;
        }
        let mut value = None;
        if j < bytes.len() && bytes[j] == b'=' {
            j += 1;
            while j < bytes.len() && is_space(bytes[j]) {
                j += 1;
            }
            if j >= bytes.len() {
                return None;
            }
            if bytes[j] == b'"' || bytes[j] == b'\'' {
                let quote = bytes[j];
                let close = find_byte(bytes, j + 1, quote)?;
                value = Some(html.get(j + 1..close).unwrap_or("").to_string());
                i = close + 1;
            } else {
                let v_start = j;
                while j < bytes.len() && !is_space(bytes[j]) && bytes[j] != b'>' {
                    j += 1;
                }
                value = Some(html.get(v_start..j).unwrap_or("").to_string());
                i = j;
            }
        }

        if !attrs.iter().any(|a| a.name == attr_name) {
            attrs.push(Attribute {
                name: attr_name,
                value,
            });
        }
    }
}

// ─── Entities ────────────────────────────────────────────────────────────────

/// Decode numeric character references and the handful of named entities
/// that matter for text extraction and URL scheme checks.
pub fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        match decode_one(rest) {
            Some((ch, used)) => {
                out.push(ch);
                rest = &rest[used..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_one(s: &str) -> Option<(char, usize)> {
    let body = &s[1..];
    if let Some(num) = body.strip_prefix('#') {
        let (digits, radix, prefix) = match num.strip_prefix(['x', 'X']) {
            Some(hex) => (hex, 16, 2),
            None => (num, 10, 1),
        };
        let len = digits
            .bytes()
            .take_while(|b| b.is_ascii_hexdigit() && (radix == 16 || b.is_ascii_digit()))
            .count();
        if len == 0 {
            return None;
        }
        let code = u32::from_str_radix(&digits[..len], radix).ok()?;
        let ch = char::from_u32(code).unwrap_or('\u{fffd}');
        let semi = usize::from(digits[len..].starts_with(';'));
        return Some((ch, 1 + prefix + len + semi));
    }
    const NAMED: &[(&str, char)] = &[
        ("amp;", '&'),
        ("lt;", '<'),
        ("gt;", '>'),
        ("quot;", '"'),
        ("apos;", '\''),
        ("nbsp;", ' '),
        ("colon;", ':'),
        ("tab;", '\t'),
        ("newline;", '\n'),
    ];
    NAMED.iter().find_map(|(name, ch)| {
        let candidate = body.get(..name.len())?;
        candidate
            .eq_ignore_ascii_case(name)
            .then_some((*ch, 1 + name.len()))
    })
}

// ─── Fragment tree ───────────────────────────────────────────────────────────

/// An element located in the source, with byte offsets of its tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    /// Index of the start tag in [`Fragment::tokens`].
    pub token: usize,
    pub start: usize,
    pub open_end: usize,
    /// Start of the end tag; equals `end` when the element is void or unclosed.
    pub close_start: usize,
    pub end: usize,
    pub parent: Option<usize>,
    pub depth: usize,
}

/// A parsed fragment: tokens plus the element tree built over them.
/// Elements are stored in document order of their start tags.
#[derive(Debug, Clone)]
pub struct Fragment<'a> {
    pub source: &'a str,
    pub tokens: Vec<Token>,
    pub elements: Vec<Element>,
}

pub fn parse_fragment(html: &str) -> RenderResult<Fragment<'_>> {
    let tokens = tokenize(html);
    let mut elements: Vec<Element> = Vec::new();
    let mut stack: Vec<usize> = Vec::new();

    for (ti, tok) in tokens.iter().enumerate() {
        match &tok.kind {
            TokenKind::StartTag {
                name, self_closing, ..
            } => {
                if SELF_CLOSING_SIBLINGS.contains(&name.as_str()) {
                    if let Some(&top) = stack.last() {
                        if elements[top].name == *name {
                            stack.pop();
                            elements[top].close_start = tok.start;
                            elements[top].end = tok.start;
                        }
                    }
                }
                if stack.len() >= MAX_NESTING_DEPTH {
                    return Err(RenderError::MaxNestingDepthExceeded {
                        max_depth: MAX_NESTING_DEPTH,
                    });
                }
                let idx = elements.len();
                let leaf = is_void(name) || (*self_closing && !is_raw_text(name));
                elements.push(Element {
                    name: name.clone(),
                    token: ti,
                    start: tok.start,
                    open_end: tok.end,
                    close_start: tok.end,
                    end: tok.end,
                    parent: stack.last().copied(),
                    depth: stack.len(),
                });
                if !leaf {
                    stack.push(idx);
                }
            }
            TokenKind::EndTag { name } => {
                let Some(pos) = stack.iter().rposition(|&e| elements[e].name == *name) else {
                    continue;
                };
                for &open in &stack[pos + 1..] {
                    elements[open].close_start = tok.start;
                    elements[open].end = tok.start;
                }
                let matched = stack[pos];
                elements[matched].close_start = tok.start;
                elements[matched].end = tok.end;
                stack.truncate(pos);
            }
            _ => {}
        }
    }

    for open in stack {
        elements[open].close_start = html.len();
        elements[open].end = html.len();
    }

    Ok(Fragment {
        source: html,
        tokens,
        elements,
    })
}

impl<'a> Fragment<'a> {
    pub fn attrs(&self, idx: usize) -> &[Attribute] {
        match &self.tokens[self.elements[idx].token].kind {
            TokenKind::StartTag { attrs, .. } => attrs,
            _ => &[],
        }
    }

    pub fn attr(&self, idx: usize, name: &str) -> Option<&str> {
        attr(self.attrs(idx), name)
    }

    /// Source text between the start and end tags.
    pub fn inner(&self, idx: usize) -> &'a str {
        let el = &self.elements[idx];
        self.source.get(el.open_end..el.close_start).unwrap_or("")
    }

    /// Full source text of the element, tags included.
    pub fn outer(&self, idx: usize) -> &'a str {
        let el = &self.elements[idx];
        self.source.get(el.start..el.end).unwrap_or("")
    }

    /// `idx` followed by each of its ancestors, innermost first.
    pub fn ancestors(&self, idx: usize) -> impl Iterator<Item = usize> + '_ {
        std::iter::successors(Some(idx), move |&i| self.elements[i].parent)
    }

    pub fn is_ancestor_or_self(&self, ancestor: usize, idx: usize) -> bool {
        self.ancestors(idx).any(|a| a == ancestor)
    }

    pub fn find_by_id(&self, id: &str) -> Option<usize> {
        (0..self.elements.len()).find(|&i| self.attr(i, "id") == Some(id))
    }

    /// The sibling element ending closest before `idx` starts.
    pub fn previous_sibling(&self, idx: usize) -> Option<usize> {
        let el = &self.elements[idx];
        (0..idx)
            .rev()
            .find(|&i| self.elements[i].parent == el.parent && self.elements[i].end <= el.start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unterminated_tag_is_text() {
        let tokens = tokenize("a <b");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Text);
    }

    #[test]
    fn test_script_content_is_raw_text() {
        let html = "<script>if (a < b) { x = '<p>'; }</script><p>x</p>";
        let tokens = tokenize(html);
        assert!(matches!(&tokens[0].kind, TokenKind::StartTag { name, .. } if name == "script"));
        assert_eq!(tokens[1].raw(html), "if (a < b) { x = '<p>'; }");
        assert!(matches!(&tokens[2].kind, TokenKind::EndTag { name } if name == "script"));
    }

    #[test]
    fn test_attributes_quoted_and_bare() {
        let tokens = tokenize(r#"<img SRC='a.png' alt="x > y" hidden data-n=3>"#);
        let TokenKind::StartTag { name, attrs, .. } = &tokens[0].kind else {
            panic!("expected start tag");
        };
        assert_eq!(name, "img");
        assert_eq!(attr(attrs, "src"), Some("a.png"));
        assert_eq!(attr(attrs, "alt"), Some("x > y"));
        assert_eq!(attr(attrs, "hidden"), Some(""));
        assert_eq!(attr(attrs, "data-n"), Some("3"));
    }

    #[test]
    fn test_fragment_closes_unbalanced_elements() {
        let html = "<div><span>a</div>b";
        let fragment = parse_fragment(html).unwrap();
        let span = &fragment.elements[1];
        assert_eq!(span.name, "span");
        assert_eq!(&html[span.start..span.end], "<span>a");
        assert_eq!(fragment.outer(0), "<div><span>a</div>");
    }

    #[test]
    fn test_depth_limit() {
        let html = "<div>".repeat(MAX_NESTING_DEPTH + 1);
        assert_eq!(
            parse_fragment(&html).unwrap_err(),
            RenderError::MaxNestingDepthExceeded {
                max_depth: MAX_NESTING_DEPTH
            }
        );
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(decode_entities("&#106;ava&#x73;cript&colon;"), "javascript:");
        assert_eq!(decode_entities("a &amp; b &unknown;"), "a & b &unknown;");
        assert_eq!(decode_entities("&#106ava"), "java");
    }

    #[test]
    fn test_non_ascii_text_survives() {
        let html = "héllo <b>wörld</b> ✓";
        let tokens = tokenize(html);
        let text: String = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Text)
            .map(|t| t.raw(html))
            .collect();
        assert_eq!(text, "héllo wörld ✓");
    }
}
