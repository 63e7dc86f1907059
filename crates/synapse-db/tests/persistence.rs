//! File-backed database tests: state survives reopening.

use tempfile::TempDir;

use synapse_core::enums::{Action, Resource, Role};
use synapse_core::identity::Actor;
use synapse_core::rbac::PermissionMatrix;
use synapse_db::service::SynapseService;

#[tokio::test]
async fn users_and_permissions_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("synapse.db");
    let path = path.to_str().unwrap();

    let token = {
        let svc = SynapseService::new_local(path).await.unwrap();
        svc.seed_permissions(&Actor::system(), &PermissionMatrix::default())
            .await
            .unwrap();
        svc.create_user(&Actor::system(), "lead@bank.example", "Lead", Role::TestExecutive)
            .await
            .unwrap()
            .api_token
    };

    let svc = SynapseService::new_local(path).await.unwrap();
    assert!(svc.permissions_seeded().await.unwrap());
    let user = svc.authenticate(&token).await.unwrap();
    assert_eq!(user.role, Role::TestExecutive);

    let actor = Actor::new(user.id, user.role);
    svc.check_permission(&actor, Resource::Cycle, Action::Create)
        .await
        .unwrap();
    assert!(
        svc.check_permission(&actor, Resource::Permission, Action::Update)
            .await
            .is_err()
    );
}

#[tokio::test]
async fn reseeding_is_a_noop() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("seed.db");
    let path = path.to_str().unwrap();

    let svc = SynapseService::new_local(path).await.unwrap();
    let matrix = PermissionMatrix::default();
    let first = svc.seed_permissions(&Actor::system(), &matrix).await.unwrap();
    assert!(first > 0);
    drop(svc);

    let svc = SynapseService::new_local(path).await.unwrap();
    assert_eq!(svc.seed_permissions(&Actor::system(), &matrix).await.unwrap(), 0);
    assert_eq!(svc.load_permissions().await.unwrap(), matrix);
}
