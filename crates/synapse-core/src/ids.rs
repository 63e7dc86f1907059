//! ID prefix constants.
//!
//! Every entity ID is `<prefix>-<8 hex chars>`, generated in SQL from
//! `randomblob(4)` (see `SynapseDb::generate_id`).

pub const PREFIX_USER: &str = "usr";
pub const PREFIX_CYCLE: &str = "cyc";
pub const PREFIX_REPORT: &str = "rpt";
pub const PREFIX_ATTRIBUTE: &str = "att";
pub const PREFIX_PHASE: &str = "phs";
pub const PREFIX_ASSIGNMENT: &str = "asg";
pub const PREFIX_OBSERVATION: &str = "obs";
pub const PREFIX_SLA: &str = "sla";
pub const PREFIX_AUDIT: &str = "aud";

pub const ALL_PREFIXES: [&str; 9] = [
    PREFIX_USER,
    PREFIX_CYCLE,
    PREFIX_REPORT,
    PREFIX_ATTRIBUTE,
    PREFIX_PHASE,
    PREFIX_ASSIGNMENT,
    PREFIX_OBSERVATION,
    PREFIX_SLA,
    PREFIX_AUDIT,
];

/// Returns true when `id` has the `<prefix>-<8 hex>` shape for `prefix`.
#[must_use]
pub fn has_prefix(id: &str, prefix: &str) -> bool {
    id.strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('-'))
        .is_some_and(|hex| hex.len() == 8 && hex.chars().all(|c| c.is_ascii_hexdigit()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn prefixes_are_unique() {
        let set: HashSet<_> = ALL_PREFIXES.iter().collect();
        assert_eq!(set.len(), ALL_PREFIXES.len());
    }

    #[test]
    fn has_prefix_checks_shape() {
        assert!(has_prefix("cyc-0a1b2c3d", PREFIX_CYCLE));
        assert!(!has_prefix("cyc-0a1b2c3", PREFIX_CYCLE));
        assert!(!has_prefix("rpt-0a1b2c3d", PREFIX_CYCLE));
        assert!(!has_prefix("cyc0a1b2c3d", PREFIX_CYCLE));
    }
}
