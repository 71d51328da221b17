use async_trait::async_trait;
use tracing::warn;

use crate::{ArcadeError, AuthorizationResponse, Console, Decision, Interrupt, InterruptPayload};

/// Completion signal for a pending authorization.
#[async_trait]
pub(crate) trait AuthBroker: Send + Sync {
    /// Resolves once the authorization completes. Denial, failure and
    /// transport problems are all errors.
    async fn wait_for_completion(
        &self,
        authorization: &AuthorizationResponse,
    ) -> Result<AuthorizationResponse, ArcadeError>;
}

/// Turn one interrupt into a decision. Never fails: anything that cannot be
/// confirmed is a deny.
pub(crate) async fn resolve_interrupt(
    interrupt: &Interrupt,
    broker: &dyn AuthBroker,
    console: &mut dyn Console,
) -> Decision {
    let authorized = match &interrupt.payload {
        InterruptPayload::AuthorizationRequired {
            tool_name,
            authorization,
        } => {
            console.notice(&format!("Authorization required for tool call {tool_name}"));
            console.notice(&format!(
                "Please authorize in your browser {}",
                authorization.url.as_deref().unwrap_or("")
            ));
            console.notice("Waiting for you to complete authorization...");
            match broker.wait_for_completion(authorization).await {
                Ok(_) => {
                    console.notice("Authorization granted. Resuming execution...");
                    true
                }
                Err(err) => {
                    warn!(tool = %tool_name, error = %err, "authorization wait failed");
                    console.error(&format!("Error waiting for authorization to complete: {err}"));
                    false
                }
            }
        }
        InterruptPayload::HumanApprovalRequired { tool_name, input } => {
            console.notice(&format!("Human in the loop required for tool call {tool_name}"));
            let pretty = serde_json::to_string_pretty(input).unwrap_or_else(|_| input.to_string());
            console.notice(&format!("Please approve the tool call {pretty}"));
            match console.confirm("Do you approve this tool call?").await {
                Ok(answer) => answer,
                Err(err) => {
                    warn!(tool = %tool_name, error = %err, "could not read approval");
                    false
                }
            }
        }
        InterruptPayload::Unknown => {
            warn!(interrupt = %interrupt.id, "unrecognised interrupt, denying");
            false
        }
    };
    Decision {
        interrupt_id: interrupt.id.clone(),
        authorized,
    }
}
