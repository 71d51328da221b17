use thiserror::Error;

use crate::InterruptId;

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("Missing {name}. {hint}")]
    Missing {
        name: &'static str,
        hint: &'static str,
    },
    #[error("Invalid {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
    #[error("failed to read {path}: {source}")]
    PromptFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub(crate) enum ArcadeError {
    #[error("arcade transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("arcade API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("invalid arcade URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("authorization {id} failed")]
    AuthorizationFailed { id: String },
    #[error("authorization response has no id")]
    MissingAuthorizationId,
}

#[derive(Debug, Error)]
pub(crate) enum ModelError {
    #[error("model transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("model API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("model response missing {0}")]
    Malformed(&'static str),
}

#[derive(Debug, Error)]
pub(crate) enum AgentError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Tool(#[from] ArcadeError),
    #[error("nothing to resume: thread {0} has no pending interrupts")]
    NothingToResume(String),
    #[error("resume supplied {got} decision(s) but {expected} interrupt(s) are pending")]
    ResumeCount { expected: usize, got: usize },
    #[error("resume decision answers unknown interrupt {0}")]
    ResumeMismatch(InterruptId),
    #[error("resume leaves interrupt {0} unanswered")]
    ResumeUnanswered(InterruptId),
    #[error("agent exceeded {0} model steps without finishing")]
    StepLimit(usize),
}
