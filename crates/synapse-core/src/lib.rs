//! # synapse-core
//!
//! Domain types for SynapseDTE, the regulatory data-testing workflow service.
//!
//! This crate holds everything that does not touch I/O:
//! - Entity structs (cycles, reports, attributes, phases, assignments, ...)
//! - Status enums with state machine transitions
//! - The eight-phase workflow graph and its step definitions
//! - The RBAC permission matrix
//! - SLA threshold evaluation
//! - ID prefix constants, error types, audit detail and response shapes

pub mod audit_detail;
pub mod entities;
pub mod enums;
pub mod errors;
pub mod identity;
pub mod ids;
pub mod rbac;
pub mod responses;
pub mod sla;
pub mod workflow;
