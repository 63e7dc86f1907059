use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::enums::{PhaseName, SlaTarget};

/// A flagged SLA breach. At most one open violation exists per target.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct SlaViolation {
    pub id: String,
    pub target: SlaTarget,
    pub target_id: String,
    pub cycle_id: Option<String>,
    pub report_id: Option<String>,
    pub phase: Option<PhaseName>,
    pub threshold_hours: f64,
    pub elapsed_hours: f64,
    pub escalation_level: u32,
    pub detected_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl SlaViolation {
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.resolved_at.is_none()
    }
}
