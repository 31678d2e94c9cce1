//! Root of the `quorum-core` library: a debate orchestrator that drives a
//! fixed panel of external agent CLIs through propose → critique → revise →
//! vote rounds until they reach quantitative consensus.

// Prevent accidental direct writes to stdout/stderr in library code. All
// user-visible output must go through the CLI front end or the tracing
// stack.
#![deny(clippy::print_stdout, clippy::print_stderr)]

mod action;
pub mod approval;
pub mod config;
pub mod consensus;
pub mod debate;
pub mod error;
pub mod exec;
pub mod parse;
pub mod phase;
pub mod prompt;
pub mod registry;
pub mod retry;
pub mod roster;
pub mod sink;
pub mod tally;

pub use config::Config;
pub use config::ConsensusMode;
pub use config::DebateConfig;
pub use config::load_config;
pub use debate::Debate;
pub use debate::DebateOutcome;
pub use error::QuorumErr;
pub use error::Result;
pub use registry::ProcessRegistry;
pub use roster::AgentSpec;
