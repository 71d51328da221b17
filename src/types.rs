use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub(crate) struct AgentMessage {
    pub(crate) role: String,
    #[serde(default)]
    pub(crate) content: Option<String>,
    #[serde(default)]
    pub(crate) tool_calls: Vec<AgentToolCall>,
    #[serde(default)]
    pub(crate) name: Option<String>,
    #[serde(default)]
    pub(crate) tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) is_error: Option<bool>,
}

impl AgentMessage {
    fn with_role(role: &str, content: Option<String>) -> Self {
        Self {
            role: role.to_string(),
            content,
            tool_calls: Vec::new(),
            name: None,
            tool_call_id: None,
            is_error: None,
        }
    }

    pub(crate) fn system(text: impl Into<String>) -> Self {
        Self::with_role("system", Some(text.into()))
    }

    pub(crate) fn user(text: impl Into<String>) -> Self {
        Self::with_role("user", Some(text.into()))
    }

    pub(crate) fn assistant(text: Option<String>, tool_calls: Vec<AgentToolCall>) -> Self {
        let mut msg = Self::with_role("assistant", text);
        msg.tool_calls = tool_calls;
        msg
    }

    pub(crate) fn tool(call: &AgentToolCall, output: impl Into<String>, is_error: bool) -> Self {
        let mut msg = Self::with_role("tool", Some(output.into()));
        msg.name = Some(call.name.clone());
        msg.tool_call_id = Some(call.id.clone());
        msg.is_error = Some(is_error);
        msg
    }

    /// Banner-style rendering used for console output.
    pub(crate) fn formatted(&self) -> String {
        let title = match self.role.as_str() {
            "user" => "Human Message",
            "assistant" => "Ai Message",
            "tool" => "Tool Message",
            "system" => "System Message",
            other => other,
        };
        let mut out = format!("{:=^80}\n", format!(" {title} "));
        if let Some(name) = &self.name {
            out.push_str(&format!("Name: {name}\n"));
        }
        out.push('\n');
        if let Some(content) = &self.content {
            out.push_str(content);
        }
        if !self.tool_calls.is_empty() {
            out.push_str("\nTool Calls:");
            for call in &self.tool_calls {
                out.push_str(&format!("\n  {} ({})\n  Args:", call.name, call.id));
                match call.args.as_object() {
                    Some(obj) if !obj.is_empty() => {
                        for (key, value) in obj {
                            out.push_str(&format!("\n    {key}: {value}"));
                        }
                    }
                    _ => out.push_str(&format!(" {}", call.args)),
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub(crate) struct AgentToolCall {
    pub(crate) id: String,
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) args: serde_json::Value,
}

/// An invocable tool resolved from the catalog for one user.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ToolSpec {
    /// LLM-facing name, e.g. `GoogleDrive_CreateFolder`.
    pub(crate) name: String,
    /// Broker-facing name, e.g. `GoogleDrive.CreateFolder`.
    pub(crate) qualified_name: String,
    pub(crate) toolkit: String,
    pub(crate) description: String,
    pub(crate) parameters: serde_json::Value,
    pub(crate) requires_authorization: bool,
}

impl ToolSpec {
    pub(crate) fn function_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// Broker response describing an authorization attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub(crate) struct AuthorizationResponse {
    #[serde(default)]
    pub(crate) id: Option<String>,
    #[serde(default)]
    pub(crate) status: String,
    #[serde(default)]
    pub(crate) url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub(crate) scopes: Vec<String>,
}

impl AuthorizationResponse {
    pub(crate) fn is_completed(&self) -> bool {
        self.status == "completed"
    }

    pub(crate) fn is_failed(&self) -> bool {
        self.status == "failed"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub(crate) struct InterruptId(pub(crate) String);

impl InterruptId {
    pub(crate) fn generate() -> Self {
        Self(format!("int_{}", uuid::Uuid::new_v4().simple()))
    }
}

impl fmt::Display for InterruptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Interrupt {
    pub(crate) id: InterruptId,
    pub(crate) payload: InterruptPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum InterruptPayload {
    AuthorizationRequired {
        tool_name: String,
        authorization: AuthorizationResponse,
    },
    HumanApprovalRequired {
        tool_name: String,
        input: serde_json::Value,
    },
    #[serde(other)]
    Unknown,
}

impl InterruptPayload {
    pub(crate) fn tool_name(&self) -> Option<&str> {
        match self {
            InterruptPayload::AuthorizationRequired { tool_name, .. }
            | InterruptPayload::HumanApprovalRequired { tool_name, .. } => Some(tool_name),
            InterruptPayload::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Decision {
    pub(crate) interrupt_id: InterruptId,
    pub(crate) authorized: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Resume {
    Single(Decision),
    Batch(Vec<Decision>),
}

impl Resume {
    /// One decision resumes with a bare decision, several with the ordered
    /// list. `None` when there is nothing to resume.
    pub(crate) fn from_decisions(mut decisions: Vec<Decision>) -> Option<Self> {
        match decisions.len() {
            0 => None,
            1 => decisions.pop().map(Resume::Single),
            _ => Some(Resume::Batch(decisions)),
        }
    }

    pub(crate) fn into_decisions(self) -> Vec<Decision> {
        match self {
            Resume::Single(decision) => vec![decision],
            Resume::Batch(decisions) => decisions,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TurnInput {
    Message(String),
    Resume(Resume),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum AgentUpdate {
    Content {
        node: String,
        messages: Vec<AgentMessage>,
    },
    Interrupts(Vec<Interrupt>),
}

#[derive(Debug, Clone)]
pub(crate) struct SessionConfig {
    pub(crate) thread_id: String,
}
