//! Command handlers for the Accounts context.
//!
//! Each handler loads one aggregate, runs the domain operation, and
//! publishes the resulting events through the store.

use std::sync::Arc;

use strata_core::aggregate::{Aggregate, AggregateRoot};
use strata_core::broker::Broker;
use strata_core::context::{Clock, Command, EventContext};
use strata_core::error::EventStoreError;
use strata_core::repository::Repository;
use strata_core::store::EventStore;
use uuid::Uuid;

use crate::domain::aggregates::{self, Organization, User};
use crate::domain::commands::{
    AddMember, ChangeMemberRole, DeleteOrganization, DeleteUser, DestroyOrganization,
    RegisterUser, RemoveMember, RenameOrganization, RenameUser, RestoreOrganization, RestoreUser,
};

/// Result of a successfully handled command.
#[derive(Debug)]
pub struct AccountsCommandResult<A> {
    /// The aggregate affected by the command.
    pub aggregate_id: Uuid,
    /// Stream version after the command's events were stored.
    pub stream_version: u64,
    /// The entity as reduced after the command; `None` once destroyed.
    pub entity: Option<A>,
}

async fn execute<A, R, B>(
    command: &dyn Command,
    aggregate_id: Uuid,
    clock: Arc<dyn Clock>,
    store: &EventStore<R, B>,
    db: &R::Db,
    operation: impl FnOnce(&mut AggregateRoot<A>) -> Result<(), EventStoreError> + Send,
) -> Result<AccountsCommandResult<A>, EventStoreError>
where
    A: Aggregate,
    R: Repository,
    B: Broker<R::Db>,
{
    tracing::info!(
        command = command.command_type(),
        correlation_id = %command.correlation_id(),
        aggregate = A::NAME,
        %aggregate_id,
        "handling command"
    );
    let context = EventContext::for_command(command, clock);
    let mut root = AggregateRoot::<A>::new(aggregate_id.to_string(), context);
    store.with_aggregate(db, &mut root, operation).await?;
    Ok(AccountsCommandResult {
        aggregate_id,
        stream_version: root.version(),
        entity: root.entity().cloned(),
    })
}

/// Handles the `RegisterUser` command: creates the user, founds their first
/// organization, and persists both events to the user's stream.
///
/// The organization's stream only receives its `OrganizationCreated` event
/// if `store` has stream linking enabled.
///
/// # Errors
///
/// Returns `EventStoreError::InvariantViolation` if the user already exists
/// or the input is invalid, or any store error.
pub async fn handle_register_user<R, B>(
    command: &RegisterUser,
    clock: Arc<dyn Clock>,
    store: &EventStore<R, B>,
    db: &R::Db,
) -> Result<AccountsCommandResult<User>, EventStoreError>
where
    R: Repository,
    B: Broker<R::Db>,
{
    execute(command, command.user_id, clock, store, db, |root| {
        aggregates::register_user(
            root,
            command.user_id,
            &command.email,
            &command.name,
            command.organization_id,
            &command.organization_name,
        )
    })
    .await
}

/// Handles the `RenameUser` command.
///
/// # Errors
///
/// Returns `EventStoreError::InvariantViolation` if the user is missing or
/// deleted, or any store error.
pub async fn handle_rename_user<R, B>(
    command: &RenameUser,
    clock: Arc<dyn Clock>,
    store: &EventStore<R, B>,
    db: &R::Db,
) -> Result<AccountsCommandResult<User>, EventStoreError>
where
    R: Repository,
    B: Broker<R::Db>,
{
    execute(command, command.user_id, clock, store, db, |root| {
        aggregates::rename_user(root, &command.name)
    })
    .await
}

/// Handles the `DeleteUser` command: soft-deletes the account.
///
/// # Errors
///
/// Returns `EventStoreError::InvariantViolation` if the account is missing or
/// already deleted, or the actor is not the account's user.
pub async fn handle_delete_user<R, B>(
    command: &DeleteUser,
    clock: Arc<dyn Clock>,
    store: &EventStore<R, B>,
    db: &R::Db,
) -> Result<AccountsCommandResult<User>, EventStoreError>
where
    R: Repository,
    B: Broker<R::Db>,
{
    execute(command, command.user_id, clock, store, db, aggregates::delete_user).await
}

/// Handles the `RestoreUser` command.
///
/// # Errors
///
/// Returns `EventStoreError::InvariantViolation` if the account is missing or
/// not deleted, or any store error.
pub async fn handle_restore_user<R, B>(
    command: &RestoreUser,
    clock: Arc<dyn Clock>,
    store: &EventStore<R, B>,
    db: &R::Db,
) -> Result<AccountsCommandResult<User>, EventStoreError>
where
    R: Repository,
    B: Broker<R::Db>,
{
    execute(command, command.user_id, clock, store, db, aggregates::restore_user).await
}

/// Handles the `RenameOrganization` command.
///
/// # Errors
///
/// Returns `EventStoreError::InvariantViolation` if the actor is not an
/// owner or the organization is not live, or any store error.
pub async fn handle_rename_organization<R, B>(
    command: &RenameOrganization,
    clock: Arc<dyn Clock>,
    store: &EventStore<R, B>,
    db: &R::Db,
) -> Result<AccountsCommandResult<Organization>, EventStoreError>
where
    R: Repository,
    B: Broker<R::Db>,
{
    execute(command, command.organization_id, clock, store, db, |root| {
        aggregates::rename_organization(root, &command.name)
    })
    .await
}

/// Handles the `AddMember` command.
///
/// # Errors
///
/// Returns `EventStoreError::InvariantViolation` if the actor is not an
/// owner or the user is already a member, or any store error.
pub async fn handle_add_member<R, B>(
    command: &AddMember,
    clock: Arc<dyn Clock>,
    store: &EventStore<R, B>,
    db: &R::Db,
) -> Result<AccountsCommandResult<Organization>, EventStoreError>
where
    R: Repository,
    B: Broker<R::Db>,
{
    execute(command, command.organization_id, clock, store, db, |root| {
        aggregates::add_member(root, command.user_id, command.role)
    })
    .await
}

/// Handles the `RemoveMember` command.
///
/// # Errors
///
/// Returns `EventStoreError::InvariantViolation` if the user is not a member,
/// is the last owner, or the actor may not remove them.
pub async fn handle_remove_member<R, B>(
    command: &RemoveMember,
    clock: Arc<dyn Clock>,
    store: &EventStore<R, B>,
    db: &R::Db,
) -> Result<AccountsCommandResult<Organization>, EventStoreError>
where
    R: Repository,
    B: Broker<R::Db>,
{
    execute(command, command.organization_id, clock, store, db, |root| {
        aggregates::remove_member(root, command.user_id)
    })
    .await
}

/// Handles the `ChangeMemberRole` command.
///
/// # Errors
///
/// Returns `EventStoreError::InvariantViolation` if the actor is not an
/// owner, the user is not a member, or no owner would remain.
pub async fn handle_change_member_role<R, B>(
    command: &ChangeMemberRole,
    clock: Arc<dyn Clock>,
    store: &EventStore<R, B>,
    db: &R::Db,
) -> Result<AccountsCommandResult<Organization>, EventStoreError>
where
    R: Repository,
    B: Broker<R::Db>,
{
    execute(command, command.organization_id, clock, store, db, |root| {
        aggregates::change_member_role(root, command.user_id, command.role)
    })
    .await
}

/// Handles the `DeleteOrganization` command.
///
/// # Errors
///
/// Returns `EventStoreError::InvariantViolation` if the organization is not
/// live or the actor is not an owner.
pub async fn handle_delete_organization<R, B>(
    command: &DeleteOrganization,
    clock: Arc<dyn Clock>,
    store: &EventStore<R, B>,
    db: &R::Db,
) -> Result<AccountsCommandResult<Organization>, EventStoreError>
where
    R: Repository,
    B: Broker<R::Db>,
{
    execute(
        command,
        command.organization_id,
        clock,
        store,
        db,
        aggregates::delete_organization,
    )
    .await
}

/// Handles the `RestoreOrganization` command.
///
/// # Errors
///
/// Returns `EventStoreError::InvariantViolation` if the organization is not
/// deleted or the actor is not an owner.
pub async fn handle_restore_organization<R, B>(
    command: &RestoreOrganization,
    clock: Arc<dyn Clock>,
    store: &EventStore<R, B>,
    db: &R::Db,
) -> Result<AccountsCommandResult<Organization>, EventStoreError>
where
    R: Repository,
    B: Broker<R::Db>,
{
    execute(
        command,
        command.organization_id,
        clock,
        store,
        db,
        aggregates::restore_organization,
    )
    .await
}

/// Handles the `DestroyOrganization` command.
///
/// # Errors
///
/// Returns `EventStoreError::InvariantViolation` if the organization is
/// missing or the actor is not an owner.
pub async fn handle_destroy_organization<R, B>(
    command: &DestroyOrganization,
    clock: Arc<dyn Clock>,
    store: &EventStore<R, B>,
    db: &R::Db,
) -> Result<AccountsCommandResult<Organization>, EventStoreError>
where
    R: Repository,
    B: Broker<R::Db>,
{
    execute(
        command,
        command.organization_id,
        clock,
        store,
        db,
        aggregates::destroy_organization,
    )
    .await
}
