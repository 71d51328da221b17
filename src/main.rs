// Module declarations
mod agent;
mod arcade;
mod catalog;
mod checkpoint;
mod cli;
mod config;
mod console;
mod driver;
mod error;
mod interrupt;
mod openai;
mod transcript;
mod types;
mod util;

// Items are re-exported at the crate root so modules can refer to each other
// through `crate::Name`.
#[allow(unused_imports)]
pub(crate) use agent::*;
#[allow(unused_imports)]
pub(crate) use arcade::*;
#[allow(unused_imports)]
pub(crate) use catalog::*;
#[allow(unused_imports)]
pub(crate) use checkpoint::*;
#[allow(unused_imports)]
pub(crate) use cli::*;
#[allow(unused_imports)]
pub(crate) use config::*;
#[allow(unused_imports)]
pub(crate) use console::*;
#[allow(unused_imports)]
pub(crate) use driver::*;
#[allow(unused_imports)]
pub(crate) use error::*;
#[allow(unused_imports)]
pub(crate) use interrupt::*;
#[allow(unused_imports)]
pub(crate) use openai::*;
#[allow(unused_imports)]
pub(crate) use transcript::*;
#[allow(unused_imports)]
pub(crate) use types::*;
#[allow(unused_imports)]
pub(crate) use util::*;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

const AGENT_NAME: &str = "Google Drive Assistant";

pub(crate) struct Startup<C> {
    pub(crate) config: AppConfig,
    pub(crate) client: C,
    pub(crate) tools: Vec<ToolSpec>,
}

/// Load configuration, then connect and resolve the tool catalog. A
/// configuration error returns before `connect` is called.
pub(crate) async fn bootstrap<C, F>(env: &dyn EnvSource, connect: F) -> anyhow::Result<Startup<C>>
where
    C: ToolCatalog,
    F: FnOnce(&AppConfig) -> Result<C, ArcadeError>,
{
    let config = AppConfig::from_env(env)?;
    let client = connect(&config).context("failed to build Arcade client")?;
    let tools = resolve_tools(&client, &config.tool_request())
        .await
        .context("failed to load tools from Arcade")?;
    Ok(Startup {
        config,
        client,
        tools,
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let _cli = Cli::parse();
    init_tracing();

    let Startup {
        config,
        client,
        tools,
    } = bootstrap(&ProcessEnv, |config: &AppConfig| ArcadeClient::new(&config.arcade)).await?;
    info!(tools = tools.len(), model = %config.model, "starting session");

    let arcade = Arc::new(client);
    let model = OpenAiClient::new(config.openai.clone()).context("failed to build model client")?;
    let agent = ToolAgent::new(
        AgentSpec {
            name: AGENT_NAME.to_string(),
            instructions: config.system_prompt.clone(),
            model: config.model.clone(),
            tools,
            user_id: config.user_id.clone(),
            approval_tools: config.approval_tools.clone(),
            max_steps: config.max_steps,
        },
        Arc::new(model),
        arcade.clone(),
        Arc::new(MemoryCheckpointer::default()),
    );

    let mut console = TerminalConsole::new();
    let session = SessionConfig {
        thread_id: config.thread_id.clone(),
    };
    let transcript = Transcript::new(config.session_log_dir.clone(), config.thread_id.clone());
    Driver::new(&agent, arcade.as_ref(), &mut console, session, transcript)
        .run()
        .await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;

    #[derive(Clone, Default)]
    struct CountingCatalog {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ToolCatalog for CountingCatalog {
        async fn list_toolkit(
            &self,
            _toolkit: &str,
            _user_id: &str,
            _limit: usize,
        ) -> Result<Vec<ToolDefinition>, ArcadeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }

        async fn get_tool(&self, name: &str, _user_id: &str) -> Result<ToolDefinition, ArcadeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ArcadeError::Api {
                status: 404,
                body: format!("{name} not found"),
            })
        }
    }

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn complete_env() -> HashMap<String, String> {
        env(&[
            ("ARCADE_USER_ID", "me@example.com"),
            ("OPENAI_MODEL", "gpt-4o"),
            ("ARCADE_API_KEY", "arc_key"),
            ("OPENAI_API_KEY", "sk-key"),
        ])
    }

    async fn attempt(
        env: &HashMap<String, String>,
        catalog: &CountingCatalog,
        connects: &AtomicUsize,
    ) -> anyhow::Result<usize> {
        let startup = bootstrap(env, |_config: &AppConfig| {
            connects.fetch_add(1, Ordering::SeqCst);
            Ok(catalog.clone())
        })
        .await?;
        Ok(startup.tools.len())
    }

    #[tokio::test]
    async fn missing_user_id_aborts_before_any_catalog_call() {
        let catalog = CountingCatalog::default();
        let connects = AtomicUsize::new(0);
        let mut env = complete_env();
        env.remove("ARCADE_USER_ID");

        let err = attempt(&env, &catalog, &connects).await.unwrap_err();
        assert!(err.to_string().contains("Missing ARCADE_USER_ID"));
        assert_eq!(connects.load(Ordering::SeqCst), 0);
        assert_eq!(catalog.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_model_aborts_before_any_catalog_call() {
        let catalog = CountingCatalog::default();
        let connects = AtomicUsize::new(0);
        let mut env = complete_env();
        env.remove("OPENAI_MODEL");

        let err = attempt(&env, &catalog, &connects).await.unwrap_err();
        assert!(err.to_string().contains("Missing OPENAI_MODEL"));
        assert_eq!(connects.load(Ordering::SeqCst), 0);
        assert_eq!(catalog.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn complete_env_resolves_the_catalog() {
        let catalog = CountingCatalog::default();
        let connects = AtomicUsize::new(0);
        let tools = attempt(&complete_env(), &catalog, &connects).await.unwrap();
        assert_eq!(tools, 0);
        assert_eq!(connects.load(Ordering::SeqCst), 1);
        assert_eq!(catalog.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn catalog_failure_is_fatal_at_startup() {
        let catalog = CountingCatalog::default();
        let connects = AtomicUsize::new(0);
        let mut env = complete_env();
        env.insert("AGENT_TOOLS".to_string(), "Slack.SendMessage".to_string());
        let err = attempt(&env, &catalog, &connects).await.unwrap_err();
        assert!(format!("{err:#}").contains("failed to load tools"));
    }
}
