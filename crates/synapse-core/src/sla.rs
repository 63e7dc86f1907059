//! SLA evaluation.
//!
//! Compares elapsed time since a phase (or assignment) started against a
//! configured threshold. Thresholds come from [`SlaPolicy`], built from the
//! `sla` config section.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::enums::{PhaseName, Priority, SlaState};

/// Thresholds and escalation limits used by the SLA monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlaPolicy {
    pub phase_hours: BTreeMap<PhaseName, u32>,
    pub priority_hours: BTreeMap<Priority, u32>,
    /// Fraction of the threshold after which a target is `at_risk`.
    pub warning_ratio: f64,
    pub max_escalation_level: u32,
}

impl Default for SlaPolicy {
    fn default() -> Self {
        Self {
            phase_hours: default_phase_hours(),
            priority_hours: default_priority_hours(),
            warning_ratio: 0.8,
            max_escalation_level: 3,
        }
    }
}

#[must_use]
pub fn default_phase_hours() -> BTreeMap<PhaseName, u32> {
    BTreeMap::from([
        (PhaseName::Planning, 72),
        (PhaseName::Scoping, 48),
        (PhaseName::SampleSelection, 48),
        (PhaseName::DataOwnerId, 48),
        (PhaseName::RequestInfo, 120),
        (PhaseName::TestExecution, 120),
        (PhaseName::Observations, 72),
        (PhaseName::TestReport, 48),
    ])
}

#[must_use]
pub fn default_priority_hours() -> BTreeMap<Priority, u32> {
    BTreeMap::from([
        (Priority::Low, 168),
        (Priority::Medium, 72),
        (Priority::High, 24),
        (Priority::Critical, 8),
    ])
}

/// Outcome of one SLA comparison.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SlaEvaluation {
    pub state: SlaState,
    pub elapsed_hours: f64,
    pub threshold_hours: f64,
    /// 0 unless breached; otherwise `floor(elapsed / threshold)`, capped.
    pub escalation_level: u32,
}

impl SlaEvaluation {
    #[must_use]
    pub fn is_breached(&self) -> bool {
        self.state == SlaState::Breached
    }
}

/// Hours between `from` and `to`. Negative spans count as zero.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn hours_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let secs = (to - from).num_seconds().max(0);
    secs as f64 / 3600.0
}

impl SlaPolicy {
    /// Threshold for a phase. Phases missing from the map never breach.
    #[must_use]
    pub fn phase_threshold(&self, phase: PhaseName) -> Option<f64> {
        self.phase_hours.get(&phase).map(|h| f64::from(*h))
    }

    /// Threshold for an assignment: the span to `due_at` when set, else the
    /// priority default.
    #[must_use]
    pub fn assignment_threshold(
        &self,
        created_at: DateTime<Utc>,
        due_at: Option<DateTime<Utc>>,
        priority: Priority,
    ) -> Option<f64> {
        match due_at {
            Some(due) => Some(hours_between(created_at, due)),
            None => self.priority_hours.get(&priority).map(|h| f64::from(*h)),
        }
    }

    /// Evaluates a target that started at `started_at`.
    #[must_use]
    pub fn evaluate(
        &self,
        started_at: DateTime<Utc>,
        now: DateTime<Utc>,
        threshold_hours: f64,
    ) -> SlaEvaluation {
        let mut eval = evaluate(started_at, now, threshold_hours, self.warning_ratio);
        eval.escalation_level = eval.escalation_level.min(self.max_escalation_level);
        eval
    }
}

/// Compares elapsed time against `threshold_hours`.
///
/// `breached` when `elapsed >= threshold`, `at_risk` when
/// `elapsed >= threshold * warning_ratio`. A zero threshold is breached
/// immediately at level 1.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn evaluate(
    started_at: DateTime<Utc>,
    now: DateTime<Utc>,
    threshold_hours: f64,
    warning_ratio: f64,
) -> SlaEvaluation {
    let elapsed_hours = hours_between(started_at, now);
    let (state, escalation_level) = if threshold_hours <= 0.0 {
        (SlaState::Breached, 1)
    } else if elapsed_hours >= threshold_hours {
        let level = (elapsed_hours / threshold_hours).floor();
        (SlaState::Breached, level.min(f64::from(u32::MAX)) as u32)
    } else if elapsed_hours >= threshold_hours * warning_ratio {
        (SlaState::AtRisk, 0)
    } else {
        (SlaState::OnTrack, 0)
    };
    SlaEvaluation {
        state,
        elapsed_hours,
        threshold_hours,
        escalation_level,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rstest::rstest;

    #[rstest]
    #[case(10, 48.0, SlaState::OnTrack, 0)]
    #[case(40, 48.0, SlaState::AtRisk, 0)]
    #[case(48, 48.0, SlaState::Breached, 1)]
    #[case(100, 48.0, SlaState::Breached, 2)]
    #[case(1, 0.0, SlaState::Breached, 1)]
    fn evaluate_states(
        #[case] elapsed: i64,
        #[case] threshold: f64,
        #[case] state: SlaState,
        #[case] level: u32,
    ) {
        let start = Utc::now();
        let eval = evaluate(start, start + Duration::hours(elapsed), threshold, 0.8);
        assert_eq!(eval.state, state);
        assert_eq!(eval.escalation_level, level);
    }

    #[test]
    fn policy_caps_escalation() {
        let policy = SlaPolicy::default();
        let start = Utc::now();
        let eval = policy.evaluate(start, start + Duration::hours(1000), 8.0);
        assert!(eval.is_breached());
        assert_eq!(eval.escalation_level, policy.max_escalation_level);
    }

    #[test]
    fn clock_skew_counts_as_zero_elapsed() {
        let now = Utc::now();
        let eval = evaluate(now + Duration::hours(5), now, 24.0, 0.8);
        assert_eq!(eval.state, SlaState::OnTrack);
        assert!(eval.elapsed_hours.abs() < f64::EPSILON);
    }

    #[test]
    fn assignment_threshold_prefers_due_date() {
        let policy = SlaPolicy::default();
        let created = Utc::now();
        let due = created + Duration::hours(6);
        assert_eq!(
            policy.assignment_threshold(created, Some(due), Priority::Low),
            Some(6.0)
        );
        assert_eq!(
            policy.assignment_threshold(created, None, Priority::Critical),
            Some(8.0)
        );
    }

    #[test]
    fn default_covers_every_phase() {
        let policy = SlaPolicy::default();
        for phase in PhaseName::ALL {
            assert!(policy.phase_threshold(phase).is_some());
        }
    }
}
