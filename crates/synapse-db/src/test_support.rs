//! Shared test utilities for synapse-db unit tests.

#[cfg(test)]
pub(crate) mod helpers {
    use synapse_core::enums::{CycleStatus, Role};
    use synapse_core::identity::Actor;

    use crate::SynapseDb;
    use crate::repos::cycle::NewCycle;
    use crate::repos::report::NewReport;
    use crate::service::SynapseService;

    /// In-memory service with an empty permission table.
    pub async fn test_service() -> SynapseService {
        let db = SynapseDb::open_local(":memory:").await.unwrap();
        SynapseService::from_db(db).await.unwrap()
    }

    /// One active user per role.
    pub struct TestUsers {
        pub admin: Actor,
        pub executive: Actor,
        pub tester: Actor,
        pub owner: Actor,
        pub owner_exec: Actor,
        pub data_owner: Actor,
        pub data_exec: Actor,
    }

    async fn user(svc: &SynapseService, email: &str, role: Role) -> Actor {
        let created = svc
            .create_user(&Actor::system(), email, email, role)
            .await
            .unwrap();
        Actor::new(created.user.id, role)
    }

    pub async fn users(svc: &SynapseService) -> TestUsers {
        TestUsers {
            admin: user(svc, "admin@example.com", Role::Admin).await,
            executive: user(svc, "exec@example.com", Role::TestExecutive).await,
            tester: user(svc, "tester@example.com", Role::Tester).await,
            owner: user(svc, "owner@example.com", Role::ReportOwner).await,
            owner_exec: user(svc, "owner.exec@example.com", Role::ReportOwnerExecutive).await,
            data_owner: user(svc, "data.owner@example.com", Role::DataOwner).await,
            data_exec: user(svc, "data.exec@example.com", Role::DataExecutive).await,
        }
    }

    /// Active cycle holding one report owned by `u.owner` and tested by
    /// `u.tester`. Returns `(cycle_id, report_id)`.
    pub async fn active_cycle_report(svc: &SynapseService, u: &TestUsers) -> (String, String) {
        let cycle = svc
            .create_cycle(
                &u.executive,
                &NewCycle {
                    name: "2026 Q3".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        svc.transition_cycle(&u.executive, &cycle.id, CycleStatus::Active, None)
            .await
            .unwrap();
        let report = svc
            .create_report(
                &u.executive,
                &NewReport {
                    name: "FR Y-14M Schedule A".into(),
                    report_owner_id: Some(u.owner.user_id.clone()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        svc.add_report_to_cycle(&u.executive, &cycle.id, &report.id, &u.tester.user_id)
            .await
            .unwrap();
        (cycle.id, report.id)
    }
}
