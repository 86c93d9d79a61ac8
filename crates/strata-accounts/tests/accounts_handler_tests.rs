//! Command and query tests for the Accounts context.

use std::sync::Arc;

use strata_accounts::application::command_handlers::{
    handle_add_member, handle_change_member_role, handle_delete_user,
    handle_destroy_organization, handle_register_user, handle_remove_member,
    handle_rename_organization, handle_restore_user,
};
use strata_accounts::application::query_handlers::{
    get_organization_by_id, get_user_by_id, is_owner, membership_projection,
    organizations_founded_by,
};
use strata_accounts::domain::commands::{
    AddMember, ChangeMemberRole, DeleteUser, DestroyOrganization, RegisterUser, RemoveMember,
    RenameOrganization, RestoreUser,
};
use strata_accounts::domain::events::{OrganizationEvent, Role};
use strata_core::broker::InMemoryBroker;
use strata_core::context::Clock;
use strata_core::error::EventStoreError;
use strata_core::memory::InMemoryRepository;
use strata_core::store::EventStore;
use strata_test_support::{FixedClock, test_instant};
use uuid::Uuid;

type Store = EventStore<InMemoryRepository, InMemoryBroker<()>>;

fn linked_store() -> Store {
    let store = EventStore::new(InMemoryRepository::new(), InMemoryBroker::new());
    let _linking = store.enable_stream_linking();
    store
}

fn clock() -> Arc<dyn Clock> {
    Arc::new(FixedClock(test_instant()))
}

struct Registered {
    user_id: Uuid,
    organization_id: Uuid,
}

async fn register(store: &Store) -> Registered {
    let command = RegisterUser {
        correlation_id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        email: "ada@example.com".to_owned(),
        name: "Ada".to_owned(),
        organization_id: Uuid::new_v4(),
        organization_name: "Acme".to_owned(),
    };
    handle_register_user(&command, clock(), store, &()).await.unwrap();
    Registered {
        user_id: command.user_id,
        organization_id: command.organization_id,
    }
}

async fn add(store: &Store, actor: Uuid, organization_id: Uuid, user_id: Uuid, role: Role) {
    let command = AddMember {
        correlation_id: Uuid::new_v4(),
        actor,
        organization_id,
        user_id,
        role,
    };
    handle_add_member(&command, clock(), store, &()).await.unwrap();
}

// --- registration and linking ---

#[tokio::test]
async fn test_registration_links_organization_created_into_organization_stream() {
    // Arrange
    let store = linked_store();

    // Act
    let registered = register(&store).await;

    // Assert
    let organization_stream = format!("Organization${}", registered.organization_id);
    let linked = store
        .read::<OrganizationEvent>()
        .stream(organization_stream.as_str())
        .to_vec(&())
        .await
        .unwrap();
    assert_eq!(linked.len(), 1);
    match &linked[0].data {
        OrganizationEvent::OrganizationCreated(e) => {
            assert_eq!(e.organization_id, registered.organization_id);
            assert_eq!(e.owner_id, registered.user_id);
        }
        other => panic!("expected OrganizationCreated, got {other:?}"),
    }
    assert_eq!(
        store.streams_of(&(), linked[0].event_id).await.unwrap(),
        vec![
            organization_stream.clone(),
            format!("User${}", registered.user_id)
        ]
    );
    assert_eq!(store.stream_version(&(), &organization_stream).await.unwrap(), 1);
}

#[tokio::test]
async fn test_registered_user_and_organization_are_queryable() {
    let store = linked_store();

    let registered = register(&store).await;

    let user = get_user_by_id(registered.user_id, &store, &()).await.unwrap();
    let organization = get_organization_by_id(registered.organization_id, &store, &())
        .await
        .unwrap();
    assert_eq!(user.name, "Ada");
    assert!(!user.deleted);
    assert_eq!(organization.name, "Acme");
    assert_eq!(organization.members.len(), 1);
    assert_eq!(organization.members[0].user_id, registered.user_id);
    assert_eq!(organization.members[0].role, Role::Owner);
    assert!(is_owner(registered.organization_id, registered.user_id, &store, &())
        .await
        .unwrap());
    assert_eq!(
        organizations_founded_by(registered.user_id, &store, &())
            .await
            .unwrap(),
        vec![registered.organization_id]
    );
}

#[tokio::test]
async fn test_without_linking_the_organization_stream_stays_empty() {
    let store: Store = EventStore::new(InMemoryRepository::new(), InMemoryBroker::new());

    let registered = register(&store).await;

    match get_organization_by_id(registered.organization_id, &store, &()).await {
        Err(EventStoreError::NotFound(_)) => {}
        other => panic!("expected NotFound, got {other:?}"),
    }
}

// --- users ---

#[tokio::test]
async fn test_deleting_a_user_twice_reports_user_not_found() {
    // Arrange
    let store = linked_store();
    let registered = register(&store).await;
    let delete = DeleteUser {
        correlation_id: Uuid::new_v4(),
        actor: registered.user_id,
        user_id: registered.user_id,
    };
    handle_delete_user(&delete, clock(), &store, &()).await.unwrap();

    // Act
    let result = handle_delete_user(&delete, clock(), &store, &()).await;

    // Assert
    match result {
        Err(EventStoreError::InvariantViolation(msg)) => assert_eq!(msg, "User not found"),
        other => panic!("expected InvariantViolation, got {other:?}"),
    }
    assert!(get_user_by_id(registered.user_id, &store, &()).await.unwrap().deleted);
}

#[tokio::test]
async fn test_another_actor_cannot_delete_a_user() {
    let store = linked_store();
    let registered = register(&store).await;
    let delete = DeleteUser {
        correlation_id: Uuid::new_v4(),
        actor: Uuid::new_v4(),
        user_id: registered.user_id,
    };

    let result = handle_delete_user(&delete, clock(), &store, &()).await;

    assert!(result.unwrap_err().is_invariant_violation());
    assert!(!get_user_by_id(registered.user_id, &store, &()).await.unwrap().deleted);
}

#[tokio::test]
async fn test_deleted_user_can_be_restored() {
    let store = linked_store();
    let registered = register(&store).await;
    let delete = DeleteUser {
        correlation_id: Uuid::new_v4(),
        actor: registered.user_id,
        user_id: registered.user_id,
    };
    handle_delete_user(&delete, clock(), &store, &()).await.unwrap();

    let restore = RestoreUser {
        correlation_id: Uuid::new_v4(),
        actor: registered.user_id,
        user_id: registered.user_id,
    };
    let result = handle_restore_user(&restore, clock(), &store, &()).await.unwrap();

    assert_eq!(result.stream_version, 4);
    assert!(result.entity.unwrap().deleted_at.is_none());
}

// --- organizations ---

#[tokio::test]
async fn test_removing_the_last_owner_is_rejected_and_membership_unchanged() {
    // Arrange
    let store = linked_store();
    let registered = register(&store).await;
    let member = Uuid::new_v4();
    add(&store, registered.user_id, registered.organization_id, member, Role::Member).await;
    let remove = RemoveMember {
        correlation_id: Uuid::new_v4(),
        actor: registered.user_id,
        organization_id: registered.organization_id,
        user_id: registered.user_id,
    };

    // Act
    let result = handle_remove_member(&remove, clock(), &store, &()).await;

    // Assert
    match result {
        Err(EventStoreError::InvariantViolation(msg)) => {
            assert_eq!(msg, "cannot remove the last owner");
        }
        other => panic!("expected InvariantViolation, got {other:?}"),
    }
    let organization = get_organization_by_id(registered.organization_id, &store, &())
        .await
        .unwrap();
    let members: Vec<(Uuid, Role)> = organization
        .members
        .iter()
        .map(|m| (m.user_id, m.role))
        .collect();
    assert_eq!(
        members,
        vec![(registered.user_id, Role::Owner), (member, Role::Member)]
    );
}

#[tokio::test]
async fn test_ownership_hand_over() {
    // Arrange
    let store = linked_store();
    let registered = register(&store).await;
    let successor = Uuid::new_v4();
    add(&store, registered.user_id, registered.organization_id, successor, Role::Admin).await;

    // Act
    let promote = ChangeMemberRole {
        correlation_id: Uuid::new_v4(),
        actor: registered.user_id,
        organization_id: registered.organization_id,
        user_id: successor,
        role: Role::Owner,
    };
    handle_change_member_role(&promote, clock(), &store, &()).await.unwrap();
    let leave = RemoveMember {
        correlation_id: Uuid::new_v4(),
        actor: registered.user_id,
        organization_id: registered.organization_id,
        user_id: registered.user_id,
    };
    handle_remove_member(&leave, clock(), &store, &()).await.unwrap();

    // Assert
    assert!(!is_owner(registered.organization_id, registered.user_id, &store, &())
        .await
        .unwrap());
    assert!(is_owner(registered.organization_id, successor, &store, &())
        .await
        .unwrap());
}

#[tokio::test]
async fn test_membership_projection_reads_only_membership_events() {
    let store = linked_store();
    let registered = register(&store).await;
    let rename = RenameOrganization {
        correlation_id: Uuid::new_v4(),
        actor: registered.user_id,
        organization_id: registered.organization_id,
        name: "Acme Ltd".to_owned(),
    };
    handle_rename_organization(&rename, clock(), &store, &()).await.unwrap();

    let projection = membership_projection(registered.organization_id);
    let roles = projection.run(&store, &()).await.unwrap();

    assert!(!projection
        .registered_types()
        .contains(&"OrganizationNameSet".to_owned()));
    assert_eq!(roles.len(), 1);
    assert_eq!(roles.get(&registered.user_id), Some(&Role::Owner));
}

#[tokio::test]
async fn test_non_owner_cannot_rename_organization() {
    let store = linked_store();
    let registered = register(&store).await;
    let rename = RenameOrganization {
        correlation_id: Uuid::new_v4(),
        actor: Uuid::new_v4(),
        organization_id: registered.organization_id,
        name: "Hijacked".to_owned(),
    };

    let result = handle_rename_organization(&rename, clock(), &store, &()).await;

    assert!(result.unwrap_err().is_invariant_violation());
    let organization = get_organization_by_id(registered.organization_id, &store, &())
        .await
        .unwrap();
    assert_eq!(organization.name, "Acme");
}

#[tokio::test]
async fn test_destroyed_organization_has_no_owners() {
    let store = linked_store();
    let registered = register(&store).await;
    let destroy = DestroyOrganization {
        correlation_id: Uuid::new_v4(),
        actor: registered.user_id,
        organization_id: registered.organization_id,
    };

    let result = handle_destroy_organization(&destroy, clock(), &store, &())
        .await
        .unwrap();

    assert!(result.entity.is_none());
    assert!(!is_owner(registered.organization_id, registered.user_id, &store, &())
        .await
        .unwrap());
    assert!(get_organization_by_id(registered.organization_id, &store, &())
        .await
        .unwrap_err()
        .is_not_found());
}
