use clap::Parser;

/// Interactive Google Drive assistant.
///
/// Configuration is read from the environment: `ARCADE_USER_ID`,
/// `OPENAI_MODEL`, `ARCADE_API_KEY` and `OPENAI_API_KEY` are required. Type
/// `exit` at the prompt to quit.
#[derive(Parser)]
#[command(name = "drive-agent")]
#[command(about = "Chat with an agent that manages your Google Drive", long_about = None)]
#[command(version)]
pub(crate) struct Cli {}
