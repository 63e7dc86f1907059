//! Command-line spellings of core enums.

use clap::ValueEnum;
use synapse_core::enums::{Action, Resource, Role};

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum RoleArg {
    Admin,
    TestExecutive,
    Tester,
    ReportOwner,
    ReportOwnerExecutive,
    DataOwner,
    DataExecutive,
}

impl From<RoleArg> for Role {
    fn from(value: RoleArg) -> Self {
        match value {
            RoleArg::Admin => Self::Admin,
            RoleArg::TestExecutive => Self::TestExecutive,
            RoleArg::Tester => Self::Tester,
            RoleArg::ReportOwner => Self::ReportOwner,
            RoleArg::ReportOwnerExecutive => Self::ReportOwnerExecutive,
            RoleArg::DataOwner => Self::DataOwner,
            RoleArg::DataExecutive => Self::DataExecutive,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ResourceArg {
    Cycle,
    Report,
    Attribute,
    Workflow,
    Assignment,
    Observation,
    Audit,
    Sla,
    User,
    Permission,
}

impl From<ResourceArg> for Resource {
    fn from(value: ResourceArg) -> Self {
        match value {
            ResourceArg::Cycle => Self::Cycle,
            ResourceArg::Report => Self::Report,
            ResourceArg::Attribute => Self::Attribute,
            ResourceArg::Workflow => Self::Workflow,
            ResourceArg::Assignment => Self::Assignment,
            ResourceArg::Observation => Self::Observation,
            ResourceArg::Audit => Self::Audit,
            ResourceArg::Sla => Self::Sla,
            ResourceArg::User => Self::User,
            ResourceArg::Permission => Self::Permission,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ActionArg {
    Create,
    Read,
    Update,
    Delete,
    Start,
    Complete,
    Approve,
    Assign,
}

impl From<ActionArg> for Action {
    fn from(value: ActionArg) -> Self {
        match value {
            ActionArg::Create => Self::Create,
            ActionArg::Read => Self::Read,
            ActionArg::Update => Self::Update,
            ActionArg::Delete => Self::Delete,
            ActionArg::Start => Self::Start,
            ActionArg::Complete => Self::Complete,
            ActionArg::Approve => Self::Approve,
            ActionArg::Assign => Self::Assign,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::ValueEnum;
    use synapse_core::enums::Role;

    use super::RoleArg;

    #[test]
    fn every_role_spelling_matches_core_serde_name() {
        for arg in RoleArg::value_variants() {
            let spelled = arg
                .to_possible_value()
                .map(|value| value.get_name().replace('-', "_"))
                .expect("role has a name");
            assert_eq!(spelled, Role::from(*arg).as_str());
        }
    }
}
