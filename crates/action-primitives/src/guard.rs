//! Loop protection for agents that keep issuing the same action.

use std::collections::VecDeque;
use std::fmt;
use std::time::Instant;

use crate::types::{ActionKind, ActionPayload, RepeatGuardConfig};

/// Identity of an action for repeat detection: what was done, to which
/// element, with which input.
#[derive(Debug, Clone, PartialEq)]
pub struct Fingerprint {
    pub kind: ActionKind,
    pub locator: String,
    pub payload: Option<ActionPayload>,
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.locator)?;
        if let Some(payload) = &self.payload {
            write!(f, " {payload}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    /// One more identical action will be refused.
    Warn { count: usize },
    /// Refused; the action is not recorded.
    Block { count: usize },
}

/// Bounded history of recent fingerprints for one page.
#[derive(Debug)]
pub struct RepeatGuard {
    cfg: RepeatGuardConfig,
    history: VecDeque<(Fingerprint, Instant)>,
}

impl RepeatGuard {
    pub fn new(cfg: RepeatGuardConfig) -> Self {
        Self {
            history: VecDeque::with_capacity(cfg.capacity),
            cfg,
        }
    }

    pub fn check(&mut self, fingerprint: &Fingerprint) -> GuardDecision {
        self.check_at(fingerprint, Instant::now())
    }

    /// Count the run of identical fingerprints ending at `now` and decide.
    pub fn check_at(&mut self, fingerprint: &Fingerprint, now: Instant) -> GuardDecision {
        if !self.cfg.enabled || self.cfg.max_repeats == 0 {
            return GuardDecision::Allow;
        }
        let window = self.cfg.window();
        let previous = self
            .history
            .iter()
            .rev()
            .take_while(|(seen, at)| seen == fingerprint && now.duration_since(*at) <= window)
            .count();
        let count = previous + 1;

        if count >= self.cfg.max_repeats {
            return GuardDecision::Block { count };
        }
        self.record(fingerprint.clone(), now);
        if count + 1 == self.cfg.max_repeats {
            GuardDecision::Warn { count }
        } else {
            GuardDecision::Allow
        }
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    fn record(&mut self, fingerprint: Fingerprint, at: Instant) {
        if self.cfg.capacity == 0 {
            return;
        }
        while self.history.len() >= self.cfg.capacity {
            self.history.pop_front();
        }
        self.history.push_back((fingerprint, at));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn click(locator: &str) -> Fingerprint {
        Fingerprint {
            kind: ActionKind::Click,
            locator: locator.into(),
            payload: None,
        }
    }

    #[test]
    fn warns_then_blocks() {
        let mut guard = RepeatGuard::new(RepeatGuardConfig::default());
        let fp = click("//button[@id='next']");
        let t0 = Instant::now();

        assert_eq!(guard.check_at(&fp, t0), GuardDecision::Allow);
        assert_eq!(guard.check_at(&fp, t0), GuardDecision::Warn { count: 2 });
        assert_eq!(guard.check_at(&fp, t0), GuardDecision::Block { count: 3 });
        // blocked attempts are not recorded, so the next one is refused too
        assert_eq!(guard.check_at(&fp, t0), GuardDecision::Block { count: 3 });
        assert_eq!(guard.len(), 2);
    }

    #[test]
    fn other_actions_break_the_run() {
        let mut guard = RepeatGuard::new(RepeatGuardConfig::default());
        let next = click("//button[@id='next']");
        let t0 = Instant::now();

        guard.check_at(&next, t0);
        guard.check_at(&click("//a[@id='home']"), t0);
        assert_eq!(guard.check_at(&next, t0), GuardDecision::Allow);

        let typed = Fingerprint {
            kind: ActionKind::Type,
            locator: "//input[@name='q']".into(),
            payload: Some(ActionPayload::Text("shoes".into())),
        };
        let retyped = Fingerprint {
            payload: Some(ActionPayload::Text("boots".into())),
            ..typed.clone()
        };
        guard.check_at(&typed, t0);
        assert_eq!(guard.check_at(&retyped, t0), GuardDecision::Allow);
    }

    #[test]
    fn old_entries_fall_out_of_the_window() {
        let mut guard = RepeatGuard::new(RepeatGuardConfig::default());
        let fp = click("//button");
        let t0 = Instant::now();

        guard.check_at(&fp, t0);
        guard.check_at(&fp, t0 + Duration::from_secs(1));
        let later = t0 + Duration::from_secs(45);
        assert_eq!(guard.check_at(&fp, later), GuardDecision::Allow);
    }

    #[test]
    fn history_is_bounded_and_can_be_disabled() {
        let cfg = RepeatGuardConfig {
            capacity: 4,
            ..RepeatGuardConfig::default()
        };
        let mut guard = RepeatGuard::new(cfg.clone());
        let t0 = Instant::now();
        for i in 0..10 {
            guard.check_at(&click(&format!("//li[{i}]")), t0);
        }
        assert_eq!(guard.len(), 4);

        let mut off = RepeatGuard::new(RepeatGuardConfig {
            enabled: false,
            ..cfg
        });
        let fp = click("//button");
        for _ in 0..5 {
            assert_eq!(off.check_at(&fp, t0), GuardDecision::Allow);
        }
        assert!(off.is_empty());
    }
}
