use anyhow::Context;
use futures::StreamExt;
use tracing::{debug, error, warn};

use crate::{
    resolve_interrupt, Agent, AgentUpdate, AuthBroker, Console, Interrupt, Resume,
    SessionConfig, Transcript, TurnInput, PROMPT,
};

pub(crate) fn is_exit(input: &str) -> bool {
    input.trim().eq_ignore_ascii_case("exit")
}

/// The REPL: one turn at a time, each turn streamed to completion and resumed
/// until the agent stops raising interrupts.
pub(crate) struct Driver<'a> {
    agent: &'a dyn Agent,
    broker: &'a dyn AuthBroker,
    console: &'a mut dyn Console,
    session: SessionConfig,
    transcript: Transcript,
}

impl<'a> Driver<'a> {
    pub(crate) fn new(
        agent: &'a dyn Agent,
        broker: &'a dyn AuthBroker,
        console: &'a mut dyn Console,
        session: SessionConfig,
        transcript: Transcript,
    ) -> Self {
        Self {
            agent,
            broker,
            console,
            session,
            transcript,
        }
    }

    pub(crate) async fn run(&mut self) {
        self.console.banner();
        loop {
            let line = match self.console.read_line(PROMPT).await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, "operator input closed");
                    break;
                }
            };
            if is_exit(&line) {
                break;
            }
            self.transcript.record("user", &line, None);
            if let Err(err) = self.run_turn(TurnInput::Message(line)).await {
                error!(error = %format!("{err:#}"), "turn failed");
                self.console.error(&format!("{err:#}"));
            }
        }
        self.console.farewell();
    }

    pub(crate) async fn run_turn(&mut self, first: TurnInput) -> anyhow::Result<()> {
        let mut input = first;
        loop {
            let interrupts = self.stream_once(input).await?;
            if interrupts.is_empty() {
                return Ok(());
            }
            debug!(count = interrupts.len(), "resolving interrupts");

            let mut decisions = Vec::with_capacity(interrupts.len());
            for interrupt in &interrupts {
                let decision = resolve_interrupt(interrupt, self.broker, &mut *self.console).await;
                self.transcript.record(
                    "decision",
                    interrupt.payload.tool_name().unwrap_or("unknown"),
                    Some(serde_json::json!({
                        "interrupt_id": decision.interrupt_id,
                        "authorized": decision.authorized,
                    })),
                );
                decisions.push(decision);
            }
            let Some(resume) = Resume::from_decisions(decisions) else {
                return Ok(());
            };
            input = TurnInput::Resume(resume);
        }
    }

    async fn stream_once(&mut self, input: TurnInput) -> anyhow::Result<Vec<Interrupt>> {
        let agent = self.agent;
        let mut stream = agent.stream(input, &self.session);
        let mut interrupts = Vec::new();
        while let Some(update) = stream.next().await {
            match update.context("agent stream failed")? {
                AgentUpdate::Content { messages, .. } => {
                    for message in &messages {
                        self.console.assistant(message);
                        if message.role == "assistant" {
                            if let Some(text) = &message.content {
                                self.transcript.record("assistant", text, None);
                            }
                        }
                    }
                }
                AgentUpdate::Interrupts(batch) => interrupts.extend(batch),
            }
        }
        Ok(interrupts)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use futures::stream::{self, BoxStream};

    use super::*;
    use crate::console::testing::ScriptedConsole;
    use crate::{
        AgentError, AgentMessage, ArcadeError, AuthorizationResponse, Decision, InterruptId,
        InterruptPayload,
    };

    type Step = Vec<Result<AgentUpdate, AgentError>>;

    struct ScriptedAgent {
        steps: Mutex<VecDeque<Step>>,
        inputs: Mutex<Vec<TurnInput>>,
    }

    impl ScriptedAgent {
        fn new(steps: Vec<Step>) -> Self {
            Self {
                steps: Mutex::new(steps.into()),
                inputs: Mutex::new(Vec::new()),
            }
        }

        fn inputs(&self) -> Vec<TurnInput> {
            self.inputs.lock().unwrap().clone()
        }
    }

    impl Agent for ScriptedAgent {
        fn stream<'a>(
            &'a self,
            input: TurnInput,
            _session: &'a SessionConfig,
        ) -> BoxStream<'a, Result<AgentUpdate, AgentError>> {
            self.inputs.lock().unwrap().push(input);
            let step = self.steps.lock().unwrap().pop_front().unwrap_or_default();
            stream::iter(step).boxed()
        }
    }

    struct GrantingBroker;

    #[async_trait]
    impl AuthBroker for GrantingBroker {
        async fn wait_for_completion(
            &self,
            authorization: &AuthorizationResponse,
        ) -> Result<AuthorizationResponse, ArcadeError> {
            Ok(authorization.clone())
        }
    }

    fn reply(text: &str) -> Result<AgentUpdate, AgentError> {
        Ok(AgentUpdate::Content {
            node: "model".to_string(),
            messages: vec![AgentMessage::assistant(Some(text.to_string()), Vec::new())],
        })
    }

    fn approval(id: &str) -> Interrupt {
        Interrupt {
            id: InterruptId(id.to_string()),
            payload: InterruptPayload::HumanApprovalRequired {
                tool_name: "GoogleDrive_CreateFolder".to_string(),
                input: serde_json::json!({"folder_name": id}),
            },
        }
    }

    fn decision(id: &str, authorized: bool) -> Decision {
        Decision {
            interrupt_id: InterruptId(id.to_string()),
            authorized,
        }
    }

    async fn run(agent: &ScriptedAgent, console: &mut ScriptedConsole) {
        let session = SessionConfig {
            thread_id: "1".to_string(),
        };
        Driver::new(agent, &GrantingBroker, console, session, Transcript::new(None, "1"))
            .run()
            .await;
    }

    #[test]
    fn exit_matches_in_any_case() {
        for input in ["exit", "EXIT", "Exit", "  eXiT \t"] {
            assert!(is_exit(input), "{input:?}");
        }
        for input in ["exit now", "quit", ""] {
            assert!(!is_exit(input), "{input:?}");
        }
    }

    #[tokio::test]
    async fn exit_terminates_without_calling_the_agent() {
        let agent = ScriptedAgent::new(Vec::new());
        let mut console = ScriptedConsole::new(&["ExIt", "never read"]);
        run(&agent, &mut console).await;
        assert!(agent.inputs().is_empty());
        assert_eq!(console.output, vec!["banner", "prompt:> ", "farewell"]);
    }

    #[tokio::test]
    async fn end_of_input_terminates() {
        let agent = ScriptedAgent::new(Vec::new());
        let mut console = ScriptedConsole::new(&[]);
        run(&agent, &mut console).await;
        assert_eq!(console.output.last().map(String::as_str), Some("farewell"));
    }

    #[tokio::test]
    async fn messages_are_printed_in_arrival_order() {
        let agent = ScriptedAgent::new(vec![vec![reply("one"), reply("two")]]);
        let mut console = ScriptedConsole::new(&["hi", "exit"]);
        run(&agent, &mut console).await;
        assert_eq!(agent.inputs(), vec![TurnInput::Message("hi".to_string())]);
        assert_eq!(console.printed("assistant:"), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn failing_turn_keeps_the_session_alive() {
        let agent = ScriptedAgent::new(vec![
            vec![reply("partial"), Err(AgentError::StepLimit(25))],
            vec![reply("recovered")],
        ]);
        let mut console = ScriptedConsole::new(&["first", "second", "exit"]);
        run(&agent, &mut console).await;
        assert_eq!(agent.inputs().len(), 2);
        let errors = console.printed("error:");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("25"));
        assert_eq!(console.printed("assistant:"), vec!["partial", "recovered"]);
        assert_eq!(console.output.last().map(String::as_str), Some("farewell"));
    }

    #[tokio::test]
    async fn single_interrupt_resumes_with_bare_decision() {
        let agent = ScriptedAgent::new(vec![
            vec![reply("asking"), Ok(AgentUpdate::Interrupts(vec![approval("a")]))],
            vec![reply("done")],
        ]);
        let mut console = ScriptedConsole::new(&["make it", "y", "exit"]);
        run(&agent, &mut console).await;
        assert_eq!(
            agent.inputs()[1],
            TurnInput::Resume(Resume::Single(decision("a", true)))
        );
        assert_eq!(console.printed("assistant:"), vec!["asking", "done"]);
    }

    #[tokio::test]
    async fn several_interrupts_resume_with_ordered_batch() {
        let agent = ScriptedAgent::new(vec![
            vec![Ok(AgentUpdate::Interrupts(vec![
                approval("a"),
                approval("b"),
                approval("c"),
            ]))],
            vec![reply("done")],
        ]);
        let mut console = ScriptedConsole::new(&["go", "y", "n", "yes", "exit"]);
        run(&agent, &mut console).await;
        assert_eq!(
            agent.inputs()[1],
            TurnInput::Resume(Resume::Batch(vec![
                decision("a", true),
                decision("b", false),
                decision("c", true),
            ]))
        );
    }

    #[tokio::test]
    async fn resumption_repeats_until_no_interrupts_remain() {
        let agent = ScriptedAgent::new(vec![
            vec![Ok(AgentUpdate::Interrupts(vec![approval("a")]))],
            vec![Ok(AgentUpdate::Interrupts(vec![approval("b")]))],
            vec![reply("done")],
        ]);
        let mut console = ScriptedConsole::new(&["go", "y", "n", "exit"]);
        run(&agent, &mut console).await;
        let inputs = agent.inputs();
        assert_eq!(inputs.len(), 3);
        assert_eq!(inputs[2], TurnInput::Resume(Resume::Single(decision("b", false))));
    }

    #[tokio::test]
    async fn unknown_interrupt_is_denied_without_prompting() {
        let unknown = Interrupt {
            id: InterruptId("u".to_string()),
            payload: InterruptPayload::Unknown,
        };
        let agent = ScriptedAgent::new(vec![
            vec![Ok(AgentUpdate::Interrupts(vec![unknown]))],
            vec![reply("ok")],
        ]);
        let mut console = ScriptedConsole::new(&["go", "exit"]);
        run(&agent, &mut console).await;
        assert_eq!(
            agent.inputs()[1],
            TurnInput::Resume(Resume::Single(decision("u", false)))
        );
    }
}
