use std::io;
use thiserror::Error;
use tokio::task::JoinError;

pub type Result<T> = std::result::Result<T, QuorumErr>;

#[derive(Error, Debug)]
pub enum QuorumErr {
    /// The agent executable could not be started at all. Never retried: a
    /// missing binary will still be missing one second from now.
    #[error("failed to spawn `{cmd}`: {err}")]
    Spawn { cmd: String, err: io::Error },

    /// The call exceeded the effective timeout (the larger of the caller's
    /// timeout and the agent's declared one).
    #[error("agent call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The child exited with a nonzero status.
    #[error("agent exited with status {exit_code}: {stderr}")]
    NonzeroExit { exit_code: i32, stderr: String },

    /// The child exited cleanly but printed nothing usable.
    #[error("agent produced no output")]
    EmptyOutput,

    /// Stdout could not be reduced to a decodable JSON object of the
    /// expected shape.
    #[error("could not decode agent response: {0}")]
    Parse(String),

    /// Cancellation was observed. Surfaces as a terminal state, not as a
    /// user-facing error.
    #[error("interrupted")]
    Interrupted,

    /// Zero agents produced a valid response during a phase.
    #[error("no agent produced a valid {phase} response")]
    PhaseStarved { phase: String },

    #[error("invalid agent roster: {0}")]
    Roster(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    TokioJoin(#[from] JoinError),
}

impl QuorumErr {
    /// Whether the retry policy may attempt the call again. Spawn failures
    /// and cancellation are final; everything transient is retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            QuorumErr::Timeout { .. }
            | QuorumErr::NonzeroExit { .. }
            | QuorumErr::EmptyOutput
            | QuorumErr::Parse(_)
            | QuorumErr::Io(_) => true,
            QuorumErr::Spawn { .. }
            | QuorumErr::Interrupted
            | QuorumErr::PhaseStarved { .. }
            | QuorumErr::Roster(_)
            | QuorumErr::Config(_)
            | QuorumErr::Json(_)
            | QuorumErr::TokioJoin(_) => false,
        }
    }
}
