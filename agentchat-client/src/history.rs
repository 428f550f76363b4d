//! Past sessions shown in the history sidebar.

use crate::api::SessionSummary;

/// Shown for sessions the backend has not titled.
pub const UNTITLED: &str = "Previous Chat";

/// The title to send for a rename, or `None` when it would change nothing.
pub fn rename_title(current: Option<&str>, requested: &str) -> Option<String> {
    let requested = requested.trim();
    let current = current.map(str::trim).filter(|t| !t.is_empty()).unwrap_or(UNTITLED);
    if requested.is_empty() || requested == current {
        return None;
    }
    Some(requested.to_string())
}

/// Last known session list. `None` until the first successful refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSidebar {
    sessions: Option<Vec<SessionSummary>>,
}

impl SessionSidebar {
    pub fn sessions(&self) -> &[SessionSummary] {
        self.sessions.as_deref().unwrap_or(&[])
    }

    pub fn is_loaded(&self) -> bool {
        self.sessions.is_some()
    }

    pub fn replace(&mut self, sessions: Vec<SessionSummary>) {
        self.sessions = Some(sessions);
    }

    pub fn get(&self, session_id: &str) -> Option<&SessionSummary> {
        self.sessions().iter().find(|s| s.key() == Some(session_id))
    }

    pub fn title(&self, session_id: &str) -> Option<&str> {
        self.get(session_id).and_then(|s| s.title.as_deref())
    }

    pub fn display_title(&self, session_id: &str) -> &str {
        self.title(session_id)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(UNTITLED)
    }

    pub fn set_title(&mut self, session_id: &str, title: &str) {
        if let Some(sessions) = self.sessions.as_mut() {
            for s in sessions.iter_mut().filter(|s| s.key() == Some(session_id)) {
                s.title = Some(title.to_string());
            }
        }
    }

    pub fn remove(&mut self, session_id: &str) {
        if let Some(sessions) = self.sessions.as_mut() {
            sessions.retain(|s| s.key() != Some(session_id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(id: &str, title: Option<&str>) -> SessionSummary {
        SessionSummary {
            session_id: Some(id.to_string()),
            id: None,
            title: title.map(str::to_string),
        }
    }

    #[test]
    fn test_rename_title_rules() {
        assert_eq!(rename_title(Some("Sales"), "  "), None);
        assert_eq!(rename_title(Some("Sales"), " Sales "), None);
        assert_eq!(rename_title(None, "Sales"), Some("Sales".to_string()));
        assert_eq!(rename_title(None, "Previous Chat"), None);
        assert_eq!(rename_title(Some("Sales"), "Revenue "), Some("Revenue".to_string()));
    }

    #[test]
    fn test_sidebar_updates() {
        let mut sidebar = SessionSidebar::default();
        assert!(!sidebar.is_loaded());
        sidebar.replace(vec![summary("a", Some("First")), summary("b", None)]);
        assert_eq!(sidebar.display_title("b"), UNTITLED);
        sidebar.set_title("b", "Second");
        assert_eq!(sidebar.title("b"), Some("Second"));
        sidebar.remove("a");
        assert_eq!(sidebar.sessions().len(), 1);
    }
}
