use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::{
    is_retryable_status, jitter_ratio, parse_retry_after, retry_delay, truncate_chars,
    AgentMessage, AgentToolCall, ChatModel, ChatRequest, ModelError, OpenAiConfig,
};

pub(crate) fn to_openai_messages(messages: &[AgentMessage]) -> Vec<serde_json::Value> {
    let mut out = Vec::with_capacity(messages.len());
    for msg in messages {
        match msg.role.as_str() {
            "assistant" => {
                let mut entry = serde_json::json!({
                    "role": "assistant",
                    "content": msg.content,
                });
                if !msg.tool_calls.is_empty() {
                    let calls: Vec<serde_json::Value> = msg
                        .tool_calls
                        .iter()
                        .map(|call| {
                            serde_json::json!({
                                "id": call.id,
                                "type": "function",
                                "function": {
                                    "name": call.name,
                                    "arguments": call.args.to_string(),
                                }
                            })
                        })
                        .collect();
                    entry["tool_calls"] = serde_json::json!(calls);
                }
                out.push(entry);
            }
            "tool" => out.push(serde_json::json!({
                "role": "tool",
                "tool_call_id": msg.tool_call_id.clone().unwrap_or_default(),
                "content": msg.content.clone().unwrap_or_default(),
            })),
            role => out.push(serde_json::json!({
                "role": role,
                "content": msg.content.clone().unwrap_or_default(),
            })),
        }
    }
    out
}

pub(crate) fn build_payload(
    request: &ChatRequest,
    temperature: Option<f64>,
) -> serde_json::Value {
    let mut payload = serde_json::json!({
        "model": request.model,
        "messages": to_openai_messages(&request.messages),
    });
    if !request.tools.is_empty() {
        payload["tools"] = serde_json::json!(request.tools);
    }
    if let Some(temp) = temperature {
        payload["temperature"] = serde_json::json!(temp);
    }
    payload
}

pub(crate) fn parse_openai_response(payload: &serde_json::Value) -> Result<AgentMessage, ModelError> {
    let message = payload
        .get("choices")
        .and_then(|v| v.as_array())
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .ok_or(ModelError::Malformed("choices[0].message"))?;

    let content = message
        .get("content")
        .and_then(|v| v.as_str())
        .filter(|text| !text.is_empty())
        .map(str::to_string);

    let mut tool_calls = Vec::new();
    for call in message
        .get("tool_calls")
        .and_then(|v| v.as_array())
        .into_iter()
        .flatten()
    {
        let id = call
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let function = call.get("function");
        let name = function
            .and_then(|f| f.get("name"))
            .and_then(|v| v.as_str())
            .ok_or(ModelError::Malformed("tool_calls[].function.name"))?
            .to_string();
        let raw_args = function
            .and_then(|f| f.get("arguments"))
            .and_then(|v| v.as_str())
            .unwrap_or("{}");
        let args = match serde_json::from_str(raw_args) {
            Ok(args) => args,
            Err(err) => {
                warn!(tool = %name, error = %err, "model sent unparseable tool arguments");
                serde_json::json!({})
            }
        };
        tool_calls.push(AgentToolCall { id, name, args });
    }

    Ok(AgentMessage::assistant(content, tool_calls))
}

/// Chat-completions client with capped exponential retries.
pub(crate) struct OpenAiClient {
    http: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiClient {
    pub(crate) fn new(config: OpenAiConfig) -> Result<Self, ModelError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { http, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn backoff(&self, attempt: usize, retry_after: Option<f64>) -> Duration {
        retry_delay(
            attempt,
            self.config.retry_base,
            self.config.retry_max,
            retry_after,
            jitter_ratio(),
        )
    }
}

#[async_trait]
impl ChatModel for OpenAiClient {
    async fn complete(&self, request: &ChatRequest) -> Result<AgentMessage, ModelError> {
        let payload = build_payload(request, self.config.temperature);
        let url = self.endpoint();
        let max_retries = self.config.max_retries;

        let mut attempt = 0;
        let body: serde_json::Value = loop {
            let sent = self
                .http
                .post(&url)
                .bearer_auth(&self.config.api_key)
                .json(&payload)
                .send()
                .await;
            match sent {
                Ok(resp) if resp.status().is_success() => break resp.json().await?,
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    let retry_after = parse_retry_after(resp.headers());
                    let text = resp.text().await.unwrap_or_default();
                    if attempt < max_retries && is_retryable_status(status) {
                        let delay = self.backoff(attempt, retry_after);
                        warn!(status, attempt, delay_ms = delay.as_millis() as u64, "retrying model call");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(ModelError::Api {
                        status,
                        body: truncate_chars(&text, 2000),
                    });
                }
                Err(err) => {
                    if attempt < max_retries && (err.is_connect() || err.is_timeout()) {
                        let delay = self.backoff(attempt, None);
                        warn!(error = %err, attempt, "model transport error, retrying");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(err.into());
                }
            }
        };

        if let Some(usage) = body.get("usage") {
            debug!(usage = %usage, "model usage");
        }
        parse_openai_response(&body)
    }
}
