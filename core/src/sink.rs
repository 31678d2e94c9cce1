//! Logging seam between the orchestrator and whatever renders a session.
//!
//! The orchestrator emits line events and section markers through this trait
//! and makes no assumption about the backing store; the default
//! implementation routes everything into the tracing stack.

use tracing::debug;
use tracing::info;

use crate::phase::Phase;

pub trait DebateSink: Send + Sync {
    /// One line of session output attributed to an agent. `file_only` lines
    /// are transcript detail that should not reach an interactive surface.
    fn line(&self, agent: &str, phase: Phase, text: &str, file_only: bool);

    /// A section marker, e.g. the start of a round.
    fn block_title(&self, title: &str);
}

/// Default sink: tracing events, with `file_only` lines demoted to debug.
#[derive(Debug, Default)]
pub struct TracingSink;

impl DebateSink for TracingSink {
    fn line(&self, agent: &str, phase: Phase, text: &str, file_only: bool) {
        if file_only {
            debug!(agent, %phase, "{text}");
        } else {
            info!(agent, %phase, "{text}");
        }
    }

    fn block_title(&self, title: &str) {
        info!("== {title} ==");
    }
}
