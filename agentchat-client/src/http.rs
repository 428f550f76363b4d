//! [`ChatApi`] over HTTP.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;

use crate::api::{
    AgentReply, ChatApi, FeedbackBody, RenameBody, SendMessageRequest, SessionHistoryDetail,
    SessionList,
};
use crate::error::{ApiError, ApiResult};

const AGENT_PATH: &str = "v3/dashboard_management/ai-admin-agent";

pub struct HttpChatApi {
    client: Client,
    api_base: String,
    token: Option<String>,
}

impl HttpChatApi {
    pub fn new(api_base: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.into(),
            token: token.filter(|t| !t.is_empty()),
        }
    }

    pub fn with_client(client: Client, api_base: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client,
            api_base: api_base.into(),
            token: token.filter(|t| !t.is_empty()),
        }
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token.filter(|t| !t.is_empty());
    }

    /// Endpoint URL: the API base, the agent path, then `segments`, each
    /// percent-encoded as a single path segment.
    fn url(&self, segments: &[&str]) -> ApiResult<Url> {
        let invalid = |reason: String| ApiError::InvalidUrl(format!("{}: {}", self.api_base, reason));
        let mut url = Url::parse(&self.api_base).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| invalid("cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(AGENT_PATH.split('/'))
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn checked(operation: &'static str, response: Response) -> ApiResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(operation, status = status.as_u16(), "agent API request failed");
        Err(ApiError::Status {
            operation,
            status: status.as_u16(),
            body,
        })
    }

    async fn json<T: DeserializeOwned>(operation: &'static str, response: Response) -> ApiResult<T> {
        let bytes = Self::checked(operation, response).await?.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode {
            operation,
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn send_message(&self, request: SendMessageRequest) -> ApiResult<AgentReply> {
        let mut form = Form::new()
            .text("session_id", request.session_id)
            .text("query", request.query)
            .text("html_response", "true");
        if let Some(model) = request.model_name.filter(|m| !m.is_empty()) {
            form = form.text("model_name", model);
        }
        if let Some(image) = request.image {
            let part = Part::bytes(image.bytes)
                .file_name(image.name)
                .mime_str(&image.mime)?;
            form = form.part("image", part);
        }

        tracing::debug!("sending message to agent");
        let response = self
            .authorized(self.client.post(self.url(&[])?))
            .multipart(form)
            .send()
            .await?;
        Self::json("send_message", response).await
    }

    async fn session_history(&self) -> ApiResult<SessionList> {
        let response = self
            .authorized(self.client.get(self.url(&["history"])?))
            .send()
            .await?;
        Self::json("session_history", response).await
    }

    async fn session_history_by_id(&self, session_id: &str) -> ApiResult<SessionHistoryDetail> {
        let url = self.url(&["history", session_id])?;
        let response = self.authorized(self.client.get(url)).send().await?;
        Self::json("session_history_by_id", response).await
    }

    async fn rename_session(&self, session_id: &str, title: &str) -> ApiResult<()> {
        let url = self.url(&["history", session_id])?;
        let response = self
            .authorized(self.client.put(url))
            .json(&RenameBody { title })
            .send()
            .await?;
        Self::checked("rename_session", response).await?;
        Ok(())
    }

    async fn delete_session(&self, session_id: &str) -> ApiResult<()> {
        let url = self.url(&["history", session_id])?;
        let response = self.authorized(self.client.delete(url)).send().await?;
        Self::checked("delete_session", response).await?;
        Ok(())
    }

    async fn send_feedback(&self, response_id: &str, body: FeedbackBody) -> ApiResult<()> {
        let url = self.url(&["feedback", response_id])?;
        let response = self
            .authorized(self.client.post(url))
            .json(&body)
            .send()
            .await?;
        Self::checked("send_feedback", response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_urls() {
        let api = HttpChatApi::new("https://x.io/api", None);
        assert_eq!(
            api.url(&[]).unwrap().as_str(),
            "https://x.io/api/v3/dashboard_management/ai-admin-agent"
        );
        assert_eq!(
            api.url(&["history"]).unwrap().as_str(),
            "https://x.io/api/v3/dashboard_management/ai-admin-agent/history"
        );
    }

    #[test]
    fn test_trailing_slash_on_base() {
        let api = HttpChatApi::new("https://x.io/api/", None);
        assert_eq!(
            api.url(&["feedback", "r-1"]).unwrap().as_str(),
            "https://x.io/api/v3/dashboard_management/ai-admin-agent/feedback/r-1"
        );
    }

    #[test]
    fn test_ids_are_single_encoded_segments() {
        let api = HttpChatApi::new("https://x.io/api", None);
        assert_eq!(
            api.url(&["history", "a b/c?d#e"]).unwrap().as_str(),
            "https://x.io/api/v3/dashboard_management/ai-admin-agent/history/a%20b%2Fc%3Fd%23e"
        );
    }

    #[test]
    fn test_relative_base_is_rejected() {
        let api = HttpChatApi::new("/api", None);
        assert!(matches!(api.url(&["history"]), Err(ApiError::InvalidUrl(_))));
    }
}
