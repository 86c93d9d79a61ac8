//! Query handlers for the Accounts context.
//!
//! Views are rebuilt from the aggregates' streams; membership questions are
//! answered by a projection that only reads membership events.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use strata_core::aggregate::{Aggregate, AggregateRoot, stream_name_for};
use strata_core::broker::Broker;
use strata_core::context::EventContext;
use strata_core::error::EventStoreError;
use strata_core::projection::{Projection, create_projection};
use strata_core::repository::Repository;
use strata_core::store::EventStore;
use uuid::Uuid;

use crate::domain::aggregates::{Organization, User};
use crate::domain::events::{
    ORGANIZATION_CREATED, ORGANIZATION_DESTROYED, OrganizationEvent, Role,
    USER_ADDED_TO_ORGANIZATION, USER_REMOVED_FROM_ORGANIZATION, USER_ROLE_CHANGED, UserEvent,
};

/// Read-only view of a user.
#[derive(Debug, Serialize)]
pub struct UserView {
    /// The user identifier.
    pub user_id: Uuid,
    /// Login email.
    pub email: String,
    /// Display name.
    pub name: String,
    /// Whether the account is deleted.
    pub deleted: bool,
}

/// One member in an organization view.
#[derive(Debug, Serialize)]
pub struct MemberView {
    /// The member.
    pub user_id: Uuid,
    /// The member's role.
    pub role: Role,
}

/// Read-only view of an organization.
#[derive(Debug, Serialize)]
pub struct OrganizationView {
    /// The organization identifier.
    pub organization_id: Uuid,
    /// Display name.
    pub name: String,
    /// Members in joining order.
    pub members: Vec<MemberView>,
    /// Whether the organization is deleted.
    pub deleted: bool,
    /// When the organization last changed.
    pub updated_at: DateTime<Utc>,
}

async fn load<A, R, B>(
    id: Uuid,
    store: &EventStore<R, B>,
    db: &R::Db,
) -> Result<A, EventStoreError>
where
    A: Aggregate,
    R: Repository,
    B: Broker<R::Db>,
{
    let mut root = AggregateRoot::<A>::new(id.to_string(), EventContext::default());
    store.load_aggregate(db, &mut root).await?;
    root.require_entity().cloned()
}

/// Retrieves a user by id, including deleted accounts.
///
/// # Errors
///
/// Returns `EventStoreError::NotFound` if no such user exists, or any store
/// error.
pub async fn get_user_by_id<R, B>(
    user_id: Uuid,
    store: &EventStore<R, B>,
    db: &R::Db,
) -> Result<UserView, EventStoreError>
where
    R: Repository,
    B: Broker<R::Db>,
{
    let user: User = load(user_id, store, db).await?;
    Ok(UserView {
        user_id: user.id,
        email: user.email,
        name: user.name,
        deleted: user.deleted_at.is_some(),
    })
}

/// Retrieves an organization by id, including deleted ones.
///
/// # Errors
///
/// Returns `EventStoreError::NotFound` if the organization never existed or
/// was destroyed, or any store error.
pub async fn get_organization_by_id<R, B>(
    organization_id: Uuid,
    store: &EventStore<R, B>,
    db: &R::Db,
) -> Result<OrganizationView, EventStoreError>
where
    R: Repository,
    B: Broker<R::Db>,
{
    let organization: Organization = load(organization_id, store, db).await?;
    Ok(OrganizationView {
        organization_id: organization.id,
        name: organization.name,
        members: organization
            .members
            .iter()
            .map(|m| MemberView {
                user_id: m.user_id,
                role: m.role,
            })
            .collect(),
        deleted: organization.deleted_at.is_some(),
        updated_at: organization.updated_at,
    })
}

/// Current roles by member, folded from the organization's membership
/// events.
#[must_use]
pub fn membership_projection(
    organization_id: Uuid,
) -> Projection<HashMap<Uuid, Role>, OrganizationEvent> {
    let stream_name = stream_name_for(Organization::NAME, &organization_id.to_string());
    create_projection::<HashMap<Uuid, Role>, OrganizationEvent>(stream_name, HashMap::new)
        .when(&[ORGANIZATION_CREATED], |mut roles, event| {
            if let OrganizationEvent::OrganizationCreated(e) = &event.data {
                roles.insert(e.owner_id, Role::Owner);
            }
            Ok(roles)
        })
        .when(&[USER_ADDED_TO_ORGANIZATION], |mut roles, event| {
            if let OrganizationEvent::UserAddedToOrganization(e) = &event.data {
                roles.insert(e.user_id, e.role);
            }
            Ok(roles)
        })
        .when(&[USER_ROLE_CHANGED], |mut roles, event| {
            if let OrganizationEvent::UserRoleChanged(e) = &event.data {
                roles.insert(e.user_id, e.role);
            }
            Ok(roles)
        })
        .when(&[USER_REMOVED_FROM_ORGANIZATION], |mut roles, event| {
            if let OrganizationEvent::UserRemovedFromOrganization(e) = &event.data {
                roles.remove(&e.user_id);
            }
            Ok(roles)
        })
        .when(&[ORGANIZATION_DESTROYED], |_, _| Ok(HashMap::new()))
}

/// Whether `user_id` currently owns `organization_id`.
///
/// # Errors
///
/// Returns any store or decoding error.
pub async fn is_owner<R, B>(
    organization_id: Uuid,
    user_id: Uuid,
    store: &EventStore<R, B>,
    db: &R::Db,
) -> Result<bool, EventStoreError>
where
    R: Repository,
    B: Broker<R::Db>,
{
    let roles = membership_projection(organization_id).run(store, db).await?;
    Ok(roles.get(&user_id) == Some(&Role::Owner))
}

/// Organizations founded by `user_id`, in founding order.
///
/// # Errors
///
/// Returns any store or decoding error.
pub async fn organizations_founded_by<R, B>(
    user_id: Uuid,
    store: &EventStore<R, B>,
    db: &R::Db,
) -> Result<Vec<Uuid>, EventStoreError>
where
    R: Repository,
    B: Broker<R::Db>,
{
    let founded = store
        .read::<UserEvent>()
        .stream(stream_name_for(User::NAME, &user_id.to_string()))
        .of_type([ORGANIZATION_CREATED])
        .map(db, |event| {
            Ok(match event.data {
                UserEvent::OrganizationCreated(e) => Some(e.organization_id),
                _ => None,
            })
        })
        .await?;
    Ok(founded.into_iter().flatten().collect())
}
