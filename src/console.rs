use std::io::{self, Write};

use async_trait::async_trait;
use crossterm::style::Stylize;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use crate::AgentMessage;

pub(crate) const PROMPT: &str = "> ";
const ASSISTANT_PREFIX: &str = "🤖: ";
const SYSTEM_PREFIX: &str = "⚙️: ";

/// `y` or `yes` in any case; anything else is a no.
pub(crate) fn parse_confirmation(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Operator-facing terminal surface.
#[async_trait]
pub(crate) trait Console: Send {
    /// `Ok(None)` at end of input.
    async fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>>;

    async fn confirm(&mut self, question: &str) -> io::Result<bool> {
        let answer = self.read_line(&format!("{question} (y/n) ")).await?;
        Ok(answer.as_deref().is_some_and(parse_confirmation))
    }

    fn assistant(&mut self, message: &AgentMessage);
    fn notice(&mut self, text: &str);
    fn error(&mut self, text: &str);
    fn banner(&mut self);
    fn farewell(&mut self);
}

pub(crate) struct TerminalConsole {
    lines: Lines<BufReader<Stdin>>,
}

impl TerminalConsole {
    pub(crate) fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

#[async_trait]
impl Console for TerminalConsole {
    async fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        {
            let mut out = io::stdout().lock();
            write!(out, "{prompt}")?;
            out.flush()?;
        }
        self.lines.next_line().await
    }

    fn assistant(&mut self, message: &AgentMessage) {
        println!("{ASSISTANT_PREFIX}{}", message.formatted());
    }

    fn notice(&mut self, text: &str) {
        println!("{SYSTEM_PREFIX}{text}");
    }

    fn error(&mut self, text: &str) {
        eprintln!("{SYSTEM_PREFIX}{}", text.red());
    }

    fn banner(&mut self) {
        println!("{}", "Welcome to the chatbot! Type 'exit' to quit.".green());
    }

    fn farewell(&mut self) {
        println!("{}", "👋 Bye...".red());
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedConsole;
    use super::*;

    #[test]
    fn confirmation_accepts_y_and_yes_in_any_case() {
        for answer in ["y", "Y", "yes", " YES ", "Yes"] {
            assert!(parse_confirmation(answer), "{answer}");
        }
        for answer in ["", "n", "no", "yep", "sure"] {
            assert!(!parse_confirmation(answer), "{answer}");
        }
    }

    #[tokio::test]
    async fn confirm_reads_one_line_with_question_prompt() {
        let mut console = ScriptedConsole::new(&["yes"]);
        assert!(console.confirm("Do you approve this tool call?").await.unwrap());
        assert_eq!(console.output, vec!["prompt:Do you approve this tool call? (y/n) "]);
    }

    #[tokio::test]
    async fn confirm_at_end_of_input_is_a_no() {
        let mut console = ScriptedConsole::new(&[]);
        assert!(!console.confirm("ok?").await.unwrap());
    }

    #[tokio::test]
    async fn confirm_propagates_read_failure() {
        let mut console = ScriptedConsole::new(&[]);
        console.push_failure();
        assert!(console.confirm("ok?").await.is_err());
    }
}
