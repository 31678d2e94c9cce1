//! Process-wide registry of live agent child processes.
//!
//! Every spawn registers its child here keyed by agent id, and every exit
//! path removes it exactly once (the runner holds a [`RegistryGuard`] for
//! that). The cancellation handler iterates the registry to deliver the
//! two-phase kill: SIGTERM to everything, a short grace period, then SIGKILL
//! to whatever is still registered.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use tracing::debug;

/// Grace period between SIGTERM and SIGKILL.
pub const KILL_GRACE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Term,
    Kill,
}

#[derive(Debug, Default)]
pub struct ProcessRegistry {
    procs: Mutex<HashMap<String, u32>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, u32>> {
        // A panic while holding this lock leaves the map intact, so
        // recovering from poisoning is sound.
        self.procs.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add(&self, agent_id: &str, pid: u32) {
        self.lock().insert(agent_id.to_string(), pid);
    }

    pub fn remove(&self, agent_id: &str) {
        self.lock().remove(agent_id);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Consistent snapshot of the currently registered pids.
    pub fn pids(&self) -> Vec<u32> {
        self.lock().values().copied().collect()
    }

    /// Deliver `signal` to every registered process. Idempotent: signalling
    /// an already-dead pid is a no-op.
    pub fn kill_all(&self, signal: Signal) {
        for pid in self.pids() {
            send_signal(pid, signal);
        }
    }

    /// Two-phase kill of everything registered: SIGTERM, wait the grace
    /// period, SIGKILL whatever is still around.
    pub async fn terminate_all(&self) {
        if self.is_empty() {
            return;
        }
        debug!("terminating {} live agent process(es)", self.len());
        self.kill_all(Signal::Term);
        tokio::time::sleep(KILL_GRACE).await;
        self.kill_all(Signal::Kill);
    }
}

/// Removes its agent from the registry exactly once, on every exit path of
/// the runner, including early returns and cancellation.
pub(crate) struct RegistryGuard<'a> {
    registry: &'a ProcessRegistry,
    agent_id: &'a str,
}

impl<'a> RegistryGuard<'a> {
    pub(crate) fn register(registry: &'a ProcessRegistry, agent_id: &'a str, pid: u32) -> Self {
        registry.add(agent_id, pid);
        Self { registry, agent_id }
    }
}

impl Drop for RegistryGuard<'_> {
    fn drop(&mut self) {
        self.registry.remove(self.agent_id);
    }
}

#[cfg(unix)]
pub(crate) fn send_signal(pid: u32, signal: Signal) {
    let signo = match signal {
        Signal::Term => libc::SIGTERM,
        Signal::Kill => libc::SIGKILL,
    };
    // ESRCH (no such process) is the idempotent-kill case and is ignored.
    unsafe {
        libc::kill(pid as libc::pid_t, signo);
    }
}

#[cfg(not(unix))]
pub(crate) fn send_signal(_pid: u32, _signal: Signal) {
    // Children are spawned with kill_on_drop; graceful termination is a
    // unix-only refinement.
}
