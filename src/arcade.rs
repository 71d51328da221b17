use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::{
    truncate_chars, ArcadeConfig, ArcadeError, AuthBroker, AuthorizationResponse, ToolCatalog,
    ToolDefinition, ToolGateway, ToolOutcome,
};

/// Grace on top of the server-side long-poll before the client gives up.
const STATUS_TIMEOUT_GRACE_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
struct ToolsPage {
    #[serde(default)]
    items: Vec<ToolDefinition>,
    #[serde(default)]
    total_count: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ExecuteResponse {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    output: Option<ExecuteOutput>,
}

#[derive(Debug, Default, Deserialize)]
struct ExecuteOutput {
    #[serde(default)]
    value: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<ExecuteFailure>,
}

#[derive(Debug, Deserialize)]
struct ExecuteFailure {
    message: String,
    #[serde(default)]
    developer_message: Option<String>,
}

fn execution_outcome(response: ExecuteResponse) -> ToolOutcome {
    let output = response.output.unwrap_or_default();
    if let Some(failure) = output.error {
        if let Some(detail) = &failure.developer_message {
            debug!(detail = %detail, "tool reported developer message");
        }
        return ToolOutcome {
            output: format!("Error: {}", failure.message),
            is_error: true,
        };
    }
    if response.success == Some(false) {
        return ToolOutcome {
            output: "Error: tool execution failed".to_string(),
            is_error: true,
        };
    }
    let text = match output.value {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s,
        Some(other) => other.to_string(),
    };
    ToolOutcome {
        output: text,
        is_error: false,
    }
}

/// HTTP client for the Arcade tool and auth API.
pub(crate) struct ArcadeClient {
    http: reqwest::Client,
    base: Url,
    api_key: String,
    auth_wait_secs: u64,
}

impl ArcadeClient {
    pub(crate) fn new(config: &ArcadeConfig) -> Result<Self, ArcadeError> {
        Ok(Self {
            http: reqwest::Client::builder().build()?,
            base: Url::parse(&config.base_url)?,
            api_key: config.api_key.clone(),
            auth_wait_secs: config.auth_wait_secs,
        })
    }

    /// Appends `path` to the base URL, keeping any path prefix it has.
    fn url(&self, path: &str) -> Result<Url, ArcadeError> {
        let base = self.base.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}{path}"))?)
    }

    fn tools_url(&self, toolkit: &str, user_id: &str, limit: usize, offset: usize) -> Result<Url, ArcadeError> {
        let mut url = self.url("/v1/tools")?;
        url.query_pairs_mut()
            .append_pair("toolkit", toolkit)
            .append_pair("user_id", user_id)
            .append_pair("limit", &limit.to_string())
            .append_pair("offset", &offset.to_string());
        Ok(url)
    }

    fn status_url(&self, id: &str) -> Result<Url, ArcadeError> {
        let mut url = self.url("/v1/auth/status")?;
        url.query_pairs_mut()
            .append_pair("id", id)
            .append_pair("wait", &self.auth_wait_secs.to_string());
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T, ArcadeError> {
        let resp = request.bearer_auth(&self.api_key).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ArcadeError::Api {
                status: status.as_u16(),
                body: truncate_chars(&body, 2000),
            });
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl ToolCatalog for ArcadeClient {
    async fn list_toolkit(
        &self,
        toolkit: &str,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ToolDefinition>, ArcadeError> {
        let mut tools = Vec::new();
        while tools.len() < limit {
            let url = self.tools_url(toolkit, user_id, limit - tools.len(), tools.len())?;
            let page: ToolsPage = self.send(self.http.get(url)).await?;
            if page.items.is_empty() {
                break;
            }
            tools.extend(page.items);
            if page.total_count.is_some_and(|total| tools.len() >= total) {
                break;
            }
        }
        tools.truncate(limit);
        Ok(tools)
    }

    async fn get_tool(&self, name: &str, user_id: &str) -> Result<ToolDefinition, ArcadeError> {
        let mut url = self.url(&format!("/v1/tools/{name}"))?;
        url.query_pairs_mut().append_pair("user_id", user_id);
        self.send(self.http.get(url)).await
    }
}

#[async_trait]
impl ToolGateway for ArcadeClient {
    async fn authorize(
        &self,
        tool_name: &str,
        user_id: &str,
    ) -> Result<AuthorizationResponse, ArcadeError> {
        let url = self.url("/v1/tools/authorize")?;
        let body = serde_json::json!({"tool_name": tool_name, "user_id": user_id});
        let auth: AuthorizationResponse = self.send(self.http.post(url).json(&body)).await?;
        debug!(tool = tool_name, status = %auth.status, "authorization checked");
        Ok(auth)
    }

    async fn execute(
        &self,
        tool_name: &str,
        input: &serde_json::Value,
        user_id: &str,
    ) -> Result<ToolOutcome, ArcadeError> {
        let url = self.url("/v1/tools/execute")?;
        let body = serde_json::json!({
            "tool_name": tool_name,
            "input": input,
            "user_id": user_id,
        });
        let response: ExecuteResponse = self.send(self.http.post(url).json(&body)).await?;
        Ok(execution_outcome(response))
    }
}

#[async_trait]
impl AuthBroker for ArcadeClient {
    async fn wait_for_completion(
        &self,
        authorization: &AuthorizationResponse,
    ) -> Result<AuthorizationResponse, ArcadeError> {
        let id = authorization
            .id
            .clone()
            .ok_or(ArcadeError::MissingAuthorizationId)?;
        let mut current = authorization.clone();
        loop {
            if current.is_completed() {
                info!(id = %id, "authorization completed");
                return Ok(current);
            }
            if current.is_failed() {
                return Err(ArcadeError::AuthorizationFailed { id });
            }
            debug!(id = %id, status = %current.status, "polling authorization status");
            let request = self
                .http
                .get(self.status_url(&id)?)
                .timeout(Duration::from_secs(self.auth_wait_secs + STATUS_TIMEOUT_GRACE_SECS));
            current = self.send(request).await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ArcadeClient {
        ArcadeClient::new(&ArcadeConfig {
            base_url: "https://api.arcade.dev".to_string(),
            api_key: "arc_test".to_string(),
            auth_wait_secs: 59,
        })
        .unwrap()
    }

    fn response(value: serde_json::Value) -> ExecuteResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn string_output_is_passed_through() {
        let outcome = execution_outcome(response(serde_json::json!({
            "success": true,
            "output": {"value": "Folder created"}
        })));
        assert_eq!(
            outcome,
            ToolOutcome {
                output: "Folder created".to_string(),
                is_error: false
            }
        );
    }

    #[test]
    fn structured_output_is_serialized() {
        let outcome = execution_outcome(response(serde_json::json!({
            "success": true,
            "output": {"value": {"email": "me@example.com"}}
        })));
        assert_eq!(outcome.output, "{\"email\":\"me@example.com\"}");
    }

    #[test]
    fn tool_error_becomes_error_result() {
        let outcome = execution_outcome(response(serde_json::json!({
            "success": false,
            "output": {"error": {"message": "File not found", "developer_message": "404"}}
        })));
        assert!(outcome.is_error);
        assert_eq!(outcome.output, "Error: File not found");
    }

    #[test]
    fn unsuccessful_without_detail_is_still_an_error() {
        let outcome = execution_outcome(response(serde_json::json!({"success": false})));
        assert!(outcome.is_error);
    }

    #[test]
    fn urls_carry_query_parameters() {
        let client = client();
        let url = client.tools_url("GoogleDrive", "me@example.com", 100, 25).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.arcade.dev/v1/tools?toolkit=GoogleDrive&user_id=me%40example.com&limit=100&offset=25"
        );
        let url = client.status_url("ac_123").unwrap();
        assert_eq!(url.as_str(), "https://api.arcade.dev/v1/auth/status?id=ac_123&wait=59");
    }

    #[test]
    fn base_url_path_prefix_is_kept() {
        for base in ["https://gw.example/arcade", "https://gw.example/arcade/"] {
            let client = ArcadeClient::new(&ArcadeConfig {
                base_url: base.to_string(),
                api_key: "arc_test".to_string(),
                auth_wait_secs: 59,
            })
            .unwrap();
            assert_eq!(
                client.url("/v1/tools/execute").unwrap().as_str(),
                "https://gw.example/arcade/v1/tools/execute"
            );
        }
    }

    #[tokio::test]
    async fn completed_authorization_needs_no_polling() {
        let auth = AuthorizationResponse {
            id: Some("ac_1".to_string()),
            status: "completed".to_string(),
            url: None,
            scopes: Vec::new(),
        };
        let done = client().wait_for_completion(&auth).await.unwrap();
        assert!(done.is_completed());
    }

    #[tokio::test]
    async fn failed_or_anonymous_authorization_is_an_error() {
        let failed = AuthorizationResponse {
            id: Some("ac_2".to_string()),
            status: "failed".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            client().wait_for_completion(&failed).await,
            Err(ArcadeError::AuthorizationFailed { .. })
        ));
        let anonymous = AuthorizationResponse {
            status: "pending".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            client().wait_for_completion(&anonymous).await,
            Err(ArcadeError::MissingAuthorizationId)
        ));
    }
}
