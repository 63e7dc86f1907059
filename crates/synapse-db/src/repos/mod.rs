//! Repository modules implementing every SynapseDTE operation.
//!
//! Each module adds methods to `SynapseService` via `impl SynapseService`
//! blocks. Public mutations take the write lock and run in one transaction;
//! `*_tx` helpers assume the caller already holds it.

pub mod assignment;
pub mod attribute;
pub mod audit;
pub mod cycle;
pub mod dashboard;
pub mod observation;
pub mod permission;
pub mod report;
pub mod sla;
pub mod user;
pub mod workflow;
