use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A data element of a report that may be scoped into testing.
///
/// `scoping` is `None` until a decision is recorded. Critical data elements
/// and primary keys can never be scoped out.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ReportAttribute {
    pub id: String,
    pub report_id: String,
    pub name: String,
    pub description: Option<String>,
    pub is_cde: bool,
    pub is_primary_key: bool,
    pub scoping: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReportAttribute {
    /// CDEs and primary keys are always in scope.
    #[must_use]
    pub const fn is_mandatory(&self) -> bool {
        self.is_cde || self.is_primary_key
    }
}
