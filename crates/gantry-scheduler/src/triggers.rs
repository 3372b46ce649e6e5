//! Trigger matching: does an incoming event start a run?

use chrono::{DateTime, Timelike, Utc};
use cron::Schedule;
use gantry_core::pattern;
use gantry_core::pipeline::{TriggerKind, TriggerRule};
use gantry_core::run::TriggerInfo;
use std::collections::HashSet;
use std::str::FromStr;
use tracing::{debug, warn};

/// An event that can start a pipeline run.
#[derive(Debug, Clone)]
pub enum TriggerEvent {
    Push {
        branch: String,
        commit: Option<String>,
    },
    PullRequest {
        source_branch: String,
        target_branch: String,
    },
    Manual {
        actor: Option<String>,
    },
    /// A clock tick for schedule evaluation.
    Tick {
        at: DateTime<Utc>,
    },
}

impl TriggerEvent {
    pub fn kind(&self) -> TriggerKind {
        match self {
            TriggerEvent::Push { .. } => TriggerKind::Push,
            TriggerEvent::PullRequest { .. } => TriggerKind::PullRequest,
            TriggerEvent::Manual { .. } => TriggerKind::Manual,
            TriggerEvent::Tick { .. } => TriggerKind::Schedule,
        }
    }

    /// Trigger record for the run this event starts.
    pub fn to_trigger_info(&self) -> TriggerInfo {
        match self {
            TriggerEvent::Push { branch, commit } => TriggerInfo {
                kind: TriggerKind::Push,
                branch: Some(branch.clone()),
                commit: commit.clone(),
                actor: None,
            },
            TriggerEvent::PullRequest {
                source_branch,
                target_branch,
            } => TriggerInfo {
                kind: TriggerKind::PullRequest,
                branch: Some(target_branch.clone()),
                commit: None,
                actor: Some(source_branch.clone()),
            },
            TriggerEvent::Manual { actor } => TriggerInfo {
                kind: TriggerKind::Manual,
                branch: None,
                commit: None,
                actor: actor.clone(),
            },
            TriggerEvent::Tick { .. } => TriggerInfo {
                kind: TriggerKind::Schedule,
                branch: None,
                commit: None,
                actor: None,
            },
        }
    }
}

/// Matches events against a pipeline's trigger rules. Holds the set of
/// schedule ticks already consumed so one tick starts at most one run even
/// when the clock source fires twice.
pub struct TriggerMatcher {
    consumed_ticks: HashSet<(String, DateTime<Utc>)>,
}

impl TriggerMatcher {
    pub fn new() -> Self {
        Self {
            consumed_ticks: HashSet::new(),
        }
    }

    /// Whether the event should start a run. For schedule ticks this
    /// consumes the tick, so the call is not idempotent by design.
    pub fn matches(&mut self, rules: &[TriggerRule], event: &TriggerEvent) -> bool {
        if rules.is_empty() {
            // Default: start on push to any branch.
            return matches!(event, TriggerEvent::Push { .. });
        }

        // Collect first so every cron rule sees the tick consumed at once.
        let mut matched = false;
        for rule in rules {
            if self.rule_matches(rule, event) {
                matched = true;
            }
        }
        matched
    }

    fn rule_matches(&mut self, rule: &TriggerRule, event: &TriggerEvent) -> bool {
        match event {
            TriggerEvent::Push { branch, .. } => {
                rule.event == TriggerKind::Push && pattern::any_match(&rule.branches, branch)
            }
            TriggerEvent::PullRequest { target_branch, .. } => {
                rule.event == TriggerKind::PullRequest
                    && pattern::any_match(&rule.branches, target_branch)
            }
            TriggerEvent::Manual { .. } => rule.event == TriggerKind::Manual,
            TriggerEvent::Tick { at } => {
                rule.event == TriggerKind::Schedule
                    && match &rule.cron {
                        Some(expr) => self.cron_fires(expr, *at),
                        None => {
                            warn!("Schedule trigger without a cron expression never fires");
                            false
                        }
                    }
            }
        }
    }

    /// Evaluate a five-field cron expression at minute resolution,
    /// deduplicating by tick timestamp.
    fn cron_fires(&mut self, expr: &str, at: DateTime<Utc>) -> bool {
        let Some(minute) = truncate_to_minute(at) else {
            return false;
        };

        let schedule = match Schedule::from_str(&format!("0 {}", expr)) {
            Ok(s) => s,
            Err(e) => {
                warn!(cron = %expr, error = %e, "Invalid cron expression");
                return false;
            }
        };

        if !schedule.includes(minute) {
            return false;
        }

        let key = (expr.to_string(), minute);
        if !self.consumed_ticks.insert(key) {
            debug!(cron = %expr, tick = %minute, "Tick already consumed");
            return false;
        }
        true
    }
}

impl Default for TriggerMatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn truncate_to_minute(at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    at.with_second(0).and_then(|t| t.with_nanosecond(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn push_rule(branches: &[&str]) -> TriggerRule {
        TriggerRule {
            event: TriggerKind::Push,
            branches: branches.iter().map(|s| s.to_string()).collect(),
            cron: None,
        }
    }

    fn cron_rule(expr: &str) -> TriggerRule {
        TriggerRule {
            event: TriggerKind::Schedule,
            branches: vec![],
            cron: Some(expr.to_string()),
        }
    }

    fn push(branch: &str) -> TriggerEvent {
        TriggerEvent::Push {
            branch: branch.to_string(),
            commit: None,
        }
    }

    #[test]
    fn test_push_branch_match() {
        let mut matcher = TriggerMatcher::new();
        let rules = vec![push_rule(&["main", "release/*"])];

        assert!(matcher.matches(&rules, &push("main")));
        assert!(matcher.matches(&rules, &push("release/v2")));
        assert!(!matcher.matches(&rules, &push("feature/x")));
    }

    #[test]
    fn test_no_rules_default_push() {
        let mut matcher = TriggerMatcher::new();
        assert!(matcher.matches(&[], &push("anything")));
        assert!(!matcher.matches(&[], &TriggerEvent::Manual { actor: None }));
    }

    #[test]
    fn test_pull_request_targets() {
        let mut matcher = TriggerMatcher::new();
        let rules = vec![TriggerRule {
            event: TriggerKind::PullRequest,
            branches: vec!["main".to_string()],
            cron: None,
        }];

        let pr = TriggerEvent::PullRequest {
            source_branch: "feature/x".to_string(),
            target_branch: "main".to_string(),
        };
        assert!(matcher.matches(&rules, &pr));

        let pr_elsewhere = TriggerEvent::PullRequest {
            source_branch: "feature/x".to_string(),
            target_branch: "develop".to_string(),
        };
        assert!(!matcher.matches(&rules, &pr_elsewhere));
    }

    #[test]
    fn test_cron_fires_on_matching_minute() {
        let mut matcher = TriggerMatcher::new();
        let rules = vec![cron_rule("30 4 * * *")];

        let at = Utc.with_ymd_and_hms(2026, 3, 14, 4, 30, 17).unwrap();
        assert!(matcher.matches(&rules, &TriggerEvent::Tick { at }));

        let off = Utc.with_ymd_and_hms(2026, 3, 14, 4, 31, 0).unwrap();
        assert!(!matcher.matches(&rules, &TriggerEvent::Tick { at: off }));
    }

    #[test]
    fn test_same_tick_consumed_once() {
        let mut matcher = TriggerMatcher::new();
        let rules = vec![cron_rule("* * * * *")];
        let at = Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 2).unwrap();

        assert!(matcher.matches(&rules, &TriggerEvent::Tick { at }));
        // Second delivery of the same tick, e.g. under clock drift.
        let drifted = Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 41).unwrap();
        assert!(!matcher.matches(&rules, &TriggerEvent::Tick { at: drifted }));

        // The next minute is a fresh tick.
        let next = Utc.with_ymd_and_hms(2026, 3, 14, 9, 1, 0).unwrap();
        assert!(matcher.matches(&rules, &TriggerEvent::Tick { at: next }));
    }

    #[test]
    fn test_invalid_cron_never_fires() {
        let mut matcher = TriggerMatcher::new();
        let rules = vec![cron_rule("not a cron")];
        let at = Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 0).unwrap();
        assert!(!matcher.matches(&rules, &TriggerEvent::Tick { at }));
    }
}
