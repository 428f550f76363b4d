use crate::html::parse_fragment;
use crate::sanitize::sanitize;

/// Class of the container inserted around every table.
pub const TABLE_WRAPPER_CLASS: &str = "assistant-table-scroll-wrapper";

const WRAPPER_OPEN: &str = "<div class=\"assistant-table-scroll-wrapper\">";
const WRAPPER_CLOSE: &str = "</div>";

/// Wrap each `<table>` in a horizontally scrollable container.
///
/// The table markup itself is copied byte for byte. If the fragment cannot be
/// parsed the input is returned unchanged.
pub fn wrap_tables(html: &str) -> String {
    let fragment = match parse_fragment(html) {
        Ok(f) => f,
        Err(err) => {
            tracing::debug!(%err, "table wrapping skipped");
            return html.to_string();
        }
    };

    // (position, order, text); closes sort before opens at the same position
    let mut inserts: Vec<(usize, u8, &str)> = Vec::new();
    for el in fragment.elements.iter().filter(|e| e.name == "table") {
        inserts.push((el.start, 1, WRAPPER_OPEN));
        inserts.push((el.end, 0, WRAPPER_CLOSE));
    }
    if inserts.is_empty() {
        return html.to_string();
    }
    inserts.sort_by_key(|&(pos, order, _)| (pos, order));

    let extra: usize = inserts.iter().map(|(_, _, s)| s.len()).sum();
    let mut out = String::with_capacity(html.len() + extra);
    let mut cursor = 0;
    for (pos, _, text) in inserts {
        out.push_str(&html[cursor..pos]);
        out.push_str(text);
        cursor = pos;
    }
    out.push_str(&html[cursor..]);
    out
}

/// Sanitize a plain segment and wrap its tables, ready for the host DOM.
pub fn prepare_plain_html(html: &str) -> String {
    wrap_tables(&sanitize(html))
}
