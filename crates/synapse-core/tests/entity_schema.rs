//! JsonSchema validation for the entity and response payloads the API returns.

use chrono::{NaiveDate, Utc};
use schemars::schema_for;
use synapse_core::entities::*;
use synapse_core::enums::*;
use synapse_core::responses::*;

fn validate_against_schema(
    schema: &serde_json::Value,
    instance: &serde_json::Value,
) -> Vec<String> {
    let validator = jsonschema::validator_for(schema).expect("schema should be valid");
    validator
        .iter_errors(instance)
        .map(|e| format!("{e}"))
        .collect()
}

macro_rules! validate_schema {
    ($name:ident, $ty:ty, $instance:expr) => {
        #[test]
        fn $name() {
            let val: $ty = $instance;
            let schema = serde_json::to_value(schema_for!($ty)).unwrap();
            let instance = serde_json::to_value(&val).unwrap();
            let errors = validate_against_schema(&schema, &instance);
            assert!(
                errors.is_empty(),
                "Schema validation failed for {}: {:?}",
                stringify!($ty),
                errors
            );
            let recovered: $ty = serde_json::from_value(instance).unwrap();
            assert_eq!(recovered, val);
        }
    };
}

fn sample_cycle() -> TestCycle {
    TestCycle {
        id: "cyc-1a2b3c4d".into(),
        name: "2026 Q3 FR Y-14M".into(),
        description: Some("Quarterly regulatory testing".into()),
        status: CycleStatus::Active,
        start_date: NaiveDate::from_ymd_opt(2026, 7, 1),
        end_date: NaiveDate::from_ymd_opt(2026, 9, 30),
        test_executive_id: Some("usr-00000002".into()),
        created_by: "usr-00000001".into(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

validate_schema!(cycle_schema, TestCycle, sample_cycle());

validate_schema!(
    attribute_schema,
    ReportAttribute,
    ReportAttribute {
        id: "att-0f0e0d0c".into(),
        report_id: "rpt-11223344".into(),
        name: "Current Credit Limit".into(),
        description: None,
        is_cde: true,
        is_primary_key: false,
        scoping: Some(true),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
);

validate_schema!(
    assignment_schema,
    Assignment,
    Assignment {
        id: "asg-deadbeef".into(),
        kind: AssignmentKind::ScopingApproval,
        title: "Approve scoping".into(),
        description: None,
        from_role: Role::Tester,
        to_role: Role::ReportOwner,
        from_user_id: "usr-00000003".into(),
        to_user_id: None,
        context: AssignmentContext {
            cycle_id: Some("cyc-1a2b3c4d".into()),
            report_id: Some("rpt-11223344".into()),
            phase: Some(PhaseName::Scoping),
            step_key: Some("approve_scoping".into()),
        },
        status: AssignmentStatus::Assigned,
        priority: Priority::High,
        due_at: None,
        created_at: Utc::now(),
        acknowledged_at: None,
        started_at: None,
        completed_at: None,
        completed_by: None,
        completion_notes: None,
        escalated: false,
    }
);

validate_schema!(
    violation_schema,
    SlaViolation,
    SlaViolation {
        id: "sla-01020304".into(),
        target: SlaTarget::Phase,
        target_id: "phs-0a0b0c0d".into(),
        cycle_id: Some("cyc-1a2b3c4d".into()),
        report_id: Some("rpt-11223344".into()),
        phase: Some(PhaseName::RequestInfo),
        threshold_hours: 120.0,
        elapsed_hours: 130.5,
        escalation_level: 1,
        detected_at: Utc::now(),
        resolved_at: None,
    }
);

validate_schema!(
    summary_schema,
    CycleSummary,
    CycleSummary {
        cycle: sample_cycle(),
        reports: 2,
        phases: PhaseCounts {
            not_started: 12,
            in_progress: 2,
            on_hold: 0,
            complete: 2,
        },
        open_assignments: 3,
        open_violations: 1,
        open_observations: 0,
    }
);

#[test]
fn user_schema_has_no_token_field() {
    let schema = serde_json::to_value(schema_for!(User)).unwrap();
    let props = schema["properties"].as_object().unwrap();
    assert!(props.contains_key("role"));
    assert!(!props.keys().any(|k| k.contains("token")));
}
