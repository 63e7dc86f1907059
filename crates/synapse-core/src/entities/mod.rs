//! Entity structs for every SynapseDTE domain object.
//!
//! Each entity maps to a table in the libSQL database. All structs derive
//! `Serialize`, `Deserialize`, and `JsonSchema` for JSON roundtrip and schema
//! validation.

mod assignment;
mod attribute;
mod audit;
mod cycle;
mod observation;
mod permission;
mod phase;
mod report;
mod sla;
mod user;

pub use assignment::{Assignment, AssignmentContext};
pub use attribute::ReportAttribute;
pub use audit::AuditEntry;
pub use cycle::TestCycle;
pub use observation::Observation;
pub use permission::PermissionGrant;
pub use phase::{PhaseStep, WorkflowPhase};
pub use report::{CycleReport, Report};
pub use sla::SlaViolation;
pub use user::User;
