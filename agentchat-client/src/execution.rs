//! Execution details attached to assistant replies: the agent's steps, their
//! timing, and the SQL it ran.

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// One step record as sent by the backend. Field types vary between
/// backends, so the raw object is kept and read through accessors.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetaStep(pub Map<String, Value>);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    ToolCall,
    Query,
    Reasoning,
    DataProcessing,
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

impl MetaStep {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// `step` or `step_name`, else a label derived from the step's content.
    pub fn label(&self) -> String {
        if let Some(name) = non_empty_str(self.get("step")).or_else(|| non_empty_str(self.get("step_name"))) {
            return name.to_string();
        }
        if self.query().is_some() {
            "Query".to_string()
        } else if self.function().is_some() {
            "Tool Call".to_string()
        } else {
            "Step".to_string()
        }
    }

    pub fn kind(&self) -> StepKind {
        let label = self.label().to_lowercase();
        if label.contains("tool") {
            StepKind::ToolCall
        } else if label.contains("query") {
            StepKind::Query
        } else if label.contains("reasoning") {
            StepKind::Reasoning
        } else if label.contains("process") || label.contains("data") {
            StepKind::DataProcessing
        } else {
            StepKind::ToolCall
        }
    }

    /// `is_hidden` of `1` or `true`.
    pub fn is_hidden(&self) -> bool {
        match self.get("is_hidden") {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64() == Some(1.0),
            _ => false,
        }
    }

    pub fn query(&self) -> Option<&str> {
        non_empty_str(self.get("Query")).or_else(|| non_empty_str(self.get("query")))
    }

    pub fn function(&self) -> Option<&str> {
        self.get("function").and_then(Value::as_str)
    }

    /// Tool arguments pretty-printed as JSON (`{}` when absent).
    pub fn args_pretty(&self) -> String {
        let args = self.get("args").cloned().unwrap_or_else(|| Value::Object(Map::new()));
        serde_json::to_string_pretty(&args).unwrap_or_else(|_| args.to_string())
    }

    pub fn start_time(&self) -> Option<DateTime<FixedOffset>> {
        self.get("start_time").and_then(Value::as_str).and_then(parse_timestamp)
    }

    pub fn end_time(&self) -> Option<DateTime<FixedOffset>> {
        self.get("end_time").and_then(Value::as_str).and_then(parse_timestamp)
    }

    /// Explicit `duration`, else whole seconds between start and end.
    pub fn duration_seconds(&self) -> Option<f64> {
        if let Some(d) = self.get("duration").and_then(Value::as_f64) {
            if d.is_finite() {
                return Some(d);
            }
        }
        let (start, end) = (self.start_time()?, self.end_time()?);
        let millis = (end - start).num_milliseconds();
        if millis < 0 {
            return None;
        }
        Some((millis as f64 / 1000.0).round())
    }
}

/// RFC 3339, or a naive `YYYY-MM-DD[ T]HH:MM:SS[.fff]` taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt);
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc().fixed_offset())
}

/// `HH:MM • Mon DD, YYYY`, or the input when it is not a timestamp.
pub fn format_timestamp(raw: &str) -> String {
    match parse_timestamp(raw) {
        Some(dt) => dt.format("%H:%M • %b %d, %Y").to_string(),
        None => raw.to_string(),
    }
}

/// Steps shown in the execution details view.
pub fn visible_steps(steps: &[MetaStep]) -> Vec<&MetaStep> {
    steps.iter().filter(|s| !s.is_hidden()).collect()
}

pub fn has_visible_steps(steps: &[MetaStep]) -> bool {
    steps.iter().any(|s| !s.is_hidden())
}

const SQL_KEYWORDS: &[&str] = &[
    "SELECT", "FROM", "WHERE", "GROUP BY", "ORDER BY", "HAVING", "INNER JOIN", "LEFT JOIN",
    "RIGHT JOIN", "FULL JOIN", "CROSS JOIN", "JOIN", "ON", "AND", "OR", "LIMIT", "OFFSET",
    "VALUES", "SET", "RETURNING",
];

const SQL_LINE_STARTS: &[&str] = &[
    "SELECT", "FROM", "WHERE", "GROUP BY", "ORDER BY", "HAVING", "INNER JOIN", "LEFT JOIN",
    "RIGHT JOIN", "FULL JOIN", "CROSS JOIN", "JOIN", "LIMIT", "OFFSET", "RETURNING",
];

fn keyword_alternation(keywords: &[&str]) -> String {
    keywords
        .iter()
        .map(|kw| kw.replace(' ', r"\s+"))
        .collect::<Vec<_>>()
        .join("|")
}

fn sql_keyword_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"(?i)\b(?:{})\b", keyword_alternation(SQL_KEYWORDS)))
            .expect("valid regex")
    })
}

fn sql_line_start_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"\s({})\b", keyword_alternation(SQL_LINE_STARTS)))
            .expect("valid regex")
    })
}

fn sql_and_or_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s(AND|OR)\b").expect("valid regex"))
}

fn sql_comma_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",\s*").expect("valid regex"))
}

fn sql_literal_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"'(?:[^']|'')*'|"(?:[^"]|"")*""#).expect("valid regex"))
}

fn sql_placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("\x01([0-9]+)\x01").expect("valid regex"))
}

/// Upper-case SQL clauses and put each major clause on its own line, with
/// `AND` / `OR` conditions indented. Quoted literals and identifiers are
/// left exactly as written.
pub fn format_sql(sql: &str) -> String {
    let mut literals = Vec::new();
    let masked = sql_literal_re().replace_all(sql, |caps: &regex::Captures| {
        literals.push(caps[0].to_string());
        format!("\x01{}\x01", literals.len() - 1)
    });
    let collapsed = masked.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return String::new();
    }
    let upper = sql_keyword_re().replace_all(&collapsed, |caps: &regex::Captures| {
        caps[0].split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase()
    });
    let lines = sql_line_start_re().replace_all(&upper, "\n$1");
    let conditions = sql_and_or_re().replace_all(&lines, "\n  $1");
    let spaced = sql_comma_re().replace_all(&conditions, ", ");
    sql_placeholder_re()
        .replace_all(spaced.trim(), |caps: &regex::Captures| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|idx| literals.get(idx))
                .cloned()
                .unwrap_or_default()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step(value: Value) -> MetaStep {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_step_labels() {
        assert_eq!(step(json!({"step": " Reasoning "})).label(), "Reasoning");
        assert_eq!(step(json!({"step_name": "Fetch data"})).label(), "Fetch data");
        assert_eq!(step(json!({"Query": "select 1"})).label(), "Query");
        assert_eq!(step(json!({"function": "lookup", "args": {}})).label(), "Tool Call");
        assert_eq!(step(json!({"step": 3})).label(), "Step");
    }

    #[test]
    fn test_step_kinds() {
        assert_eq!(step(json!({"step": "Tool call"})).kind(), StepKind::ToolCall);
        assert_eq!(step(json!({"query": "select 1"})).kind(), StepKind::Query);
        assert_eq!(step(json!({"step": "Data processing"})).kind(), StepKind::DataProcessing);
        assert_eq!(step(json!({})).kind(), StepKind::ToolCall);
    }

    #[test]
    fn test_hidden_flag() {
        assert!(step(json!({"is_hidden": 1})).is_hidden());
        assert!(step(json!({"is_hidden": true})).is_hidden());
        assert!(!step(json!({"is_hidden": 0})).is_hidden());
        assert!(!step(json!({"is_hidden": "true"})).is_hidden());
        let steps = vec![step(json!({"is_hidden": 1})), step(json!({"step": "A"}))];
        assert_eq!(visible_steps(&steps).len(), 1);
        assert!(has_visible_steps(&steps));
    }

    #[test]
    fn test_durations() {
        assert_eq!(step(json!({"duration": 2.5})).duration_seconds(), Some(2.5));
        let timed = step(json!({
            "start_time": "2024-05-01T10:00:00Z",
            "end_time": "2024-05-01T10:00:03.600Z"
        }));
        assert_eq!(timed.duration_seconds(), Some(4.0));
        let naive = step(json!({
            "start_time": "2024-05-01 10:00:00",
            "end_time": "2024-05-01 10:01:00"
        }));
        assert_eq!(naive.duration_seconds(), Some(60.0));
        let backwards = step(json!({
            "start_time": "2024-05-01T10:00:05Z",
            "end_time": "2024-05-01T10:00:00Z"
        }));
        assert_eq!(backwards.duration_seconds(), None);
    }

    #[test]
    fn test_format_sql() {
        let sql = "select a,b  from orders o left join items i on i.order_id = o.id where a > 1 and b < 2 or c = 3 group by a order by b limit 10";
        assert_eq!(
            format_sql(sql),
            "SELECT a, b\nFROM orders o\nLEFT JOIN items i ON i.order_id = o.id\nWHERE a > 1\n  AND b < 2\n  OR c = 3\nGROUP BY a\nORDER BY b\nLIMIT 10"
        );
        assert_eq!(format_sql("   "), "");
    }

    #[test]
    fn test_format_sql_leaves_literals_alone() {
        let sql = "select name from t where note = 'join us, or  select from here' and tag = 'it''s on' and \"order by\" > 1";
        assert_eq!(
            format_sql(sql),
            "SELECT name\nFROM t\nWHERE note = 'join us, or  select from here'\n  AND tag = 'it''s on'\n  AND \"order by\" > 1"
        );
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp("2024-05-01T09:05:00Z"), "09:05 • May 01, 2024");
        assert_eq!(format_timestamp("yesterday"), "yesterday");
    }
}
