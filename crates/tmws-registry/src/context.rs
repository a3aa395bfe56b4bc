use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;

use tmws_core::AGENT_HISTORY_LIMIT;

/// One recorded agent switch.
#[derive(Debug, Clone, Serialize)]
pub struct SwitchEntry {
    pub from_agent: String,
    pub to_agent: String,
    pub at: DateTime<Utc>,
}

/// The per-session "current agent" slot.
///
/// Owned by exactly one session and mutated under that session's
/// single-writer rule; there is no process-wide current agent.
#[derive(Debug, Clone)]
pub struct AgentContext {
    current: String,
    history: VecDeque<SwitchEntry>,
    switch_count: u64,
    session_start: DateTime<Utc>,
}

impl AgentContext {
    pub fn new(initial_agent_id: impl Into<String>) -> Self {
        Self {
            current: initial_agent_id.into(),
            history: VecDeque::new(),
            switch_count: 0,
            session_start: Utc::now(),
        }
    }

    pub fn current(&self) -> &str {
        &self.current
    }

    pub fn switch_count(&self) -> u64 {
        self.switch_count
    }

    pub fn session_start(&self) -> DateTime<Utc> {
        self.session_start
    }

    /// Replace the slot, appending the prior agent to the history
    /// (dropping the oldest entry past the bound).
    pub fn switch(&mut self, to_agent_id: impl Into<String>) {
        let to = to_agent_id.into();
        self.history.push_back(SwitchEntry {
            from_agent: std::mem::replace(&mut self.current, to.clone()),
            to_agent: to,
            at: Utc::now(),
        });
        while self.history.len() > AGENT_HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.switch_count += 1;
    }

    /// The most recent `n` switches, oldest first.
    pub fn recent_history(&self, n: usize) -> Vec<SwitchEntry> {
        self.history
            .iter()
            .rev()
            .take(n)
            .rev()
            .cloned()
            .collect()
    }

    /// Swap the slot for a scoped invocation without recording a switch.
    /// Returns the prior agent; callers must hand it back to
    /// [`AgentContext::restore`] on every exit path.
    pub fn swap(&mut self, temp_agent_id: impl Into<String>) -> String {
        std::mem::replace(&mut self.current, temp_agent_id.into())
    }

    /// Undo a [`AgentContext::swap`].
    pub fn restore(&mut self, prior_agent_id: String) {
        self.current = prior_agent_id;
    }

    /// Run `f` with the slot temporarily pointing at `temp_agent_id`,
    /// restoring the prior agent afterwards, also when `f` fails.
    pub fn execute_as<R, E>(
        &mut self,
        temp_agent_id: impl Into<String>,
        f: impl FnOnce(&mut Self) -> std::result::Result<R, E>,
    ) -> std::result::Result<R, E> {
        let prior = self.swap(temp_agent_id);
        let result = f(self);
        self.restore(prior);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switch_records_history() {
        let mut ctx = AgentContext::new("athena-conductor");
        ctx.switch("hestia-auditor");
        ctx.switch("artemis-optimizer");

        assert_eq!(ctx.current(), "artemis-optimizer");
        assert_eq!(ctx.switch_count(), 2);
        let history = ctx.recent_history(5);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].from_agent, "athena-conductor");
        assert_eq!(history[1].to_agent, "artemis-optimizer");
    }

    #[test]
    fn history_is_bounded() {
        let mut ctx = AgentContext::new("agent-0");
        for i in 1..=20 {
            ctx.switch(format!("agent-{i}"));
        }
        assert_eq!(ctx.recent_history(100).len(), AGENT_HISTORY_LIMIT);
        // The oldest entries were dropped.
        assert_eq!(ctx.recent_history(100)[0].from_agent, "agent-4");
        assert_eq!(ctx.switch_count(), 20);
    }

    #[test]
    fn execute_as_restores_on_success_and_failure() {
        let mut ctx = AgentContext::new("athena-conductor");

        let ok: Result<&str, &str> = ctx.execute_as("hestia-auditor", |inner| {
            assert_eq!(inner.current(), "hestia-auditor");
            Ok("done")
        });
        assert_eq!(ok.unwrap(), "done");
        assert_eq!(ctx.current(), "athena-conductor");

        let err: Result<(), &str> = ctx.execute_as("hestia-auditor", |_| Err("boom"));
        assert!(err.is_err());
        assert_eq!(ctx.current(), "athena-conductor");
    }

    #[test]
    fn scoped_swap_does_not_count_as_switch() {
        let mut ctx = AgentContext::new("athena-conductor");
        let prior = ctx.swap("hestia-auditor");
        assert_eq!(ctx.current(), "hestia-auditor");
        ctx.restore(prior);
        assert_eq!(ctx.current(), "athena-conductor");
        assert_eq!(ctx.switch_count(), 0);
        assert!(ctx.recent_history(5).is_empty());
    }
}
