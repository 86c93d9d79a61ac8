//! Aggregate roots for the Accounts context.

use chrono::{DateTime, Utc};
use strata_core::aggregate::{Aggregate, AggregateRoot, stream_name_for};
use strata_core::ensure;
use strata_core::error::EventStoreError;
use strata_core::event::{Event, EventInit};
use strata_core::lifecycle::{self, SoftDelete, Transition};
use uuid::Uuid;

use super::events::{
    OrganizationCreated, OrganizationDeleted, OrganizationDestroyed, OrganizationEvent,
    OrganizationNameSet, OrganizationRestored, Role, UserAddedToOrganization, UserCreated,
    UserDeleted, UserEvent, UserNameSet, UserRemovedFromOrganization, UserRestored,
    UserRoleChanged,
};

fn not_found(aggregate_name: &str) -> EventStoreError {
    EventStoreError::InvariantViolation(format!("{aggregate_name} not found"))
}

// --- User ---

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Unique identifier.
    pub id: Uuid,
    /// Login email.
    pub email: String,
    /// Display name.
    pub name: String,
    /// When the user registered.
    pub created_at: DateTime<Utc>,
    /// When the user last changed.
    pub updated_at: DateTime<Utc>,
    /// When the account was deleted, if it is.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl SoftDelete for User {
    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }
}

impl Aggregate for User {
    type Event = UserEvent;
    const NAME: &'static str = "User";

    fn id(&self) -> String {
        self.id.to_string()
    }

    fn apply(
        entity: Option<&Self>,
        event: &Event<UserEvent>,
    ) -> Result<Option<Self>, EventStoreError> {
        let transition = match &event.data {
            UserEvent::UserCreated(_) => Transition::Create,
            UserEvent::UserNameSet(_) => Transition::Mutate,
            UserEvent::UserDeleted(_) => Transition::SoftDelete,
            UserEvent::UserRestored(_) => Transition::Restore,
            // Belongs to the organization; recorded here only as the founder's history.
            UserEvent::OrganizationCreated(_) => return Ok(entity.cloned()),
        };
        lifecycle::guard(Self::NAME, entity, transition)?;
        let at = event.metadata.occurred_at;

        match (&event.data, entity) {
            (UserEvent::UserCreated(e), _) => {
                ensure!(e.email.contains('@'), "invalid email address: {}", e.email);
                Ok(Some(User {
                    id: e.user_id,
                    email: e.email.clone(),
                    name: e.name.clone(),
                    created_at: at,
                    updated_at: at,
                    deleted_at: None,
                }))
            }
            (UserEvent::UserNameSet(e), Some(user)) => {
                ensure!(!e.name.trim().is_empty(), "user name must not be empty");
                Ok(Some(User {
                    name: e.name.clone(),
                    updated_at: at,
                    ..user.clone()
                }))
            }
            (UserEvent::UserDeleted(_), Some(user)) => {
                ensure!(
                    event.metadata.actor == Some(user.id),
                    "a user may only delete their own account"
                );
                Ok(Some(User {
                    deleted_at: Some(at),
                    updated_at: at,
                    ..user.clone()
                }))
            }
            (UserEvent::UserRestored(_), Some(user)) => Ok(Some(User {
                deleted_at: None,
                updated_at: at,
                ..user.clone()
            })),
            (_, None) | (UserEvent::OrganizationCreated(_), Some(_)) => Err(not_found(Self::NAME)),
        }
    }
}

fn live_user_id(root: &AggregateRoot<User>) -> Result<Uuid, EventStoreError> {
    root.live_entity().map(|user| user.id)
}

/// Registers a user and founds their first organization.
///
/// The `OrganizationCreated` event is recorded on the user's stream and
/// carries a link request to the organization's stream, so stream linking
/// must be enabled on the store that publishes it.
///
/// # Errors
///
/// Returns `EventStoreError::InvariantViolation` if the user already exists
/// or the email is malformed.
pub fn register_user(
    root: &mut AggregateRoot<User>,
    user_id: Uuid,
    email: &str,
    name: &str,
    organization_id: Uuid,
    organization_name: &str,
) -> Result<(), EventStoreError> {
    root.apply_event(UserEvent::UserCreated(UserCreated {
        user_id,
        email: email.to_owned(),
        name: name.to_owned(),
    }))?;
    let organization_stream = stream_name_for(Organization::NAME, &organization_id.to_string());
    root.apply_event(
        EventInit::new(UserEvent::OrganizationCreated(OrganizationCreated {
            organization_id,
            name: organization_name.to_owned(),
            owner_id: user_id,
        }))
        .link_to(organization_stream),
    )?;
    Ok(())
}

/// Renames a live user.
///
/// # Errors
///
/// Returns `EventStoreError::InvariantViolation` if the user is missing or
/// deleted, or the name is blank.
pub fn rename_user(root: &mut AggregateRoot<User>, name: &str) -> Result<(), EventStoreError> {
    let user_id = live_user_id(root)?;
    root.apply_event(UserEvent::UserNameSet(UserNameSet {
        user_id,
        name: name.to_owned(),
    }))?;
    Ok(())
}

/// Soft-deletes a user's account. Only the user themselves may do this.
///
/// # Errors
///
/// Returns `EventStoreError::InvariantViolation` if the user is missing or
/// already deleted, or the actor is someone else.
pub fn delete_user(root: &mut AggregateRoot<User>) -> Result<(), EventStoreError> {
    let user_id = live_user_id(root)?;
    root.apply_event(UserEvent::UserDeleted(UserDeleted { user_id }))?;
    Ok(())
}

/// Restores a deleted account.
///
/// # Errors
///
/// Returns `EventStoreError::InvariantViolation` if the user is missing or
/// not deleted.
pub fn restore_user(root: &mut AggregateRoot<User>) -> Result<(), EventStoreError> {
    let user_id = live_user_id(root)?;
    root.apply_event(UserEvent::UserRestored(UserRestored { user_id }))?;
    Ok(())
}

// --- Organization ---

/// One user's membership of an organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Membership {
    /// The member.
    pub user_id: Uuid,
    /// The member's role.
    pub role: Role,
}

/// An organization and its members.
///
/// An organization always has at least one owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Organization {
    /// Unique identifier.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Members in joining order.
    pub members: Vec<Membership>,
    /// When the organization was founded.
    pub created_at: DateTime<Utc>,
    /// When the organization last changed.
    pub updated_at: DateTime<Utc>,
    /// When the organization was deleted, if it is.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Organization {
    /// The role `user_id` holds, if they are a member.
    #[must_use]
    pub fn role_of(&self, user_id: Uuid) -> Option<Role> {
        self.members
            .iter()
            .find(|m| m.user_id == user_id)
            .map(|m| m.role)
    }

    /// Number of members with the `Owner` role.
    #[must_use]
    pub fn owner_count(&self) -> usize {
        self.members.iter().filter(|m| m.role == Role::Owner).count()
    }

    fn is_owner(&self, user_id: Option<Uuid>) -> bool {
        user_id.is_some_and(|id| self.role_of(id) == Some(Role::Owner))
    }

    fn require_owner(&self, actor: Option<Uuid>) -> Result<(), EventStoreError> {
        ensure!(
            self.is_owner(actor),
            "only an owner may change organization {}",
            self.id
        );
        Ok(())
    }
}

impl SoftDelete for Organization {
    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }
}

fn organization_transition(event: &OrganizationEvent) -> Transition {
    match event {
        OrganizationEvent::OrganizationCreated(_) => Transition::Create,
        OrganizationEvent::OrganizationNameSet(_)
        | OrganizationEvent::UserAddedToOrganization(_)
        | OrganizationEvent::UserRemovedFromOrganization(_)
        | OrganizationEvent::UserRoleChanged(_) => Transition::Mutate,
        OrganizationEvent::OrganizationDeleted(_) => Transition::SoftDelete,
        OrganizationEvent::OrganizationRestored(_) => Transition::Restore,
        OrganizationEvent::OrganizationDestroyed(_) => Transition::Destroy,
    }
}

impl Aggregate for Organization {
    type Event = OrganizationEvent;
    const NAME: &'static str = "Organization";

    fn id(&self) -> String {
        self.id.to_string()
    }

    fn apply(
        entity: Option<&Self>,
        event: &Event<OrganizationEvent>,
    ) -> Result<Option<Self>, EventStoreError> {
        lifecycle::guard(Self::NAME, entity, organization_transition(&event.data))?;
        let at = event.metadata.occurred_at;
        let actor = event.metadata.actor;

        let Some(current) = entity else {
            let OrganizationEvent::OrganizationCreated(e) = &event.data else {
                return Err(not_found(Self::NAME));
            };
            ensure!(!e.name.trim().is_empty(), "organization name must not be empty");
            return Ok(Some(Organization {
                id: e.organization_id,
                name: e.name.clone(),
                members: vec![Membership {
                    user_id: e.owner_id,
                    role: Role::Owner,
                }],
                created_at: at,
                updated_at: at,
                deleted_at: None,
            }));
        };

        let mut next = current.clone();
        match &event.data {
            OrganizationEvent::OrganizationCreated(_) => {
                return Err(EventStoreError::InvariantViolation(format!(
                    "{} already exists",
                    Self::NAME
                )));
            }
            OrganizationEvent::OrganizationDestroyed(_) => {
                current.require_owner(actor)?;
                return Ok(None);
            }
            OrganizationEvent::OrganizationNameSet(e) => {
                current.require_owner(actor)?;
                ensure!(!e.name.trim().is_empty(), "organization name must not be empty");
                next.name = e.name.clone();
            }
            OrganizationEvent::UserAddedToOrganization(e) => {
                current.require_owner(actor)?;
                ensure!(
                    current.role_of(e.user_id).is_none(),
                    "user {} is already a member",
                    e.user_id
                );
                next.members.push(Membership {
                    user_id: e.user_id,
                    role: e.role,
                });
            }
            OrganizationEvent::UserRemovedFromOrganization(e) => {
                // Members may leave; removing anyone else takes an owner.
                ensure!(
                    actor == Some(e.user_id) || current.is_owner(actor),
                    "only an owner may remove other members"
                );
                ensure!(
                    current.role_of(e.user_id) == Some(e.role),
                    "user {} is not a member with role {}",
                    e.user_id,
                    e.role
                );
                ensure!(
                    e.role != Role::Owner || current.owner_count() > 1,
                    "cannot remove the last owner"
                );
                next.members.retain(|m| m.user_id != e.user_id);
            }
            OrganizationEvent::UserRoleChanged(e) => {
                current.require_owner(actor)?;
                let Some(role) = current.role_of(e.user_id) else {
                    return Err(EventStoreError::InvariantViolation(format!(
                        "user {} is not a member",
                        e.user_id
                    )));
                };
                ensure!(
                    role != Role::Owner || e.role == Role::Owner || current.owner_count() > 1,
                    "cannot demote the last owner"
                );
                for member in &mut next.members {
                    if member.user_id == e.user_id {
                        member.role = e.role;
                    }
                }
            }
            OrganizationEvent::OrganizationDeleted(_) => {
                current.require_owner(actor)?;
                next.deleted_at = Some(at);
            }
            OrganizationEvent::OrganizationRestored(_) => {
                current.require_owner(actor)?;
                next.deleted_at = None;
            }
        }
        next.updated_at = at;
        Ok(Some(next))
    }
}

fn live_organization_id(root: &AggregateRoot<Organization>) -> Result<Uuid, EventStoreError> {
    root.live_entity().map(|organization| organization.id)
}

/// Renames a live organization.
///
/// # Errors
///
/// Returns `EventStoreError::InvariantViolation` if the organization is
/// missing or deleted, the actor is not an owner, or the name is blank.
pub fn rename_organization(
    root: &mut AggregateRoot<Organization>,
    name: &str,
) -> Result<(), EventStoreError> {
    let organization_id = live_organization_id(root)?;
    root.apply_event(OrganizationEvent::OrganizationNameSet(OrganizationNameSet {
        organization_id,
        name: name.to_owned(),
    }))?;
    Ok(())
}

/// Adds `user_id` to the organization with `role`.
///
/// # Errors
///
/// Returns `EventStoreError::InvariantViolation` if the actor is not an
/// owner or the user is already a member.
pub fn add_member(
    root: &mut AggregateRoot<Organization>,
    user_id: Uuid,
    role: Role,
) -> Result<(), EventStoreError> {
    let organization_id = live_organization_id(root)?;
    root.apply_event(OrganizationEvent::UserAddedToOrganization(
        UserAddedToOrganization {
            organization_id,
            user_id,
            role,
        },
    ))?;
    Ok(())
}

/// Removes `user_id` from the organization.
///
/// # Errors
///
/// Returns `EventStoreError::InvariantViolation` if the user is not a member,
/// is the last owner, or the actor may not remove them.
pub fn remove_member(
    root: &mut AggregateRoot<Organization>,
    user_id: Uuid,
) -> Result<(), EventStoreError> {
    let organization = root.live_entity()?;
    let organization_id = organization.id;
    let Some(role) = organization.role_of(user_id) else {
        return Err(EventStoreError::InvariantViolation(format!(
            "user {user_id} is not a member"
        )));
    };
    root.apply_event(OrganizationEvent::UserRemovedFromOrganization(
        UserRemovedFromOrganization {
            organization_id,
            user_id,
            role,
        },
    ))?;
    Ok(())
}

/// Changes the role of an existing member.
///
/// # Errors
///
/// Returns `EventStoreError::InvariantViolation` if the actor is not an
/// owner, the user is not a member, or the change would leave no owner.
pub fn change_member_role(
    root: &mut AggregateRoot<Organization>,
    user_id: Uuid,
    role: Role,
) -> Result<(), EventStoreError> {
    let organization_id = live_organization_id(root)?;
    root.apply_event(OrganizationEvent::UserRoleChanged(UserRoleChanged {
        organization_id,
        user_id,
        role,
    }))?;
    Ok(())
}

/// Soft-deletes the organization.
///
/// # Errors
///
/// Returns `EventStoreError::InvariantViolation` if the organization is
/// missing or already deleted, or the actor is not an owner.
pub fn delete_organization(root: &mut AggregateRoot<Organization>) -> Result<(), EventStoreError> {
    let organization_id = live_organization_id(root)?;
    root.apply_event(OrganizationEvent::OrganizationDeleted(OrganizationDeleted {
        organization_id,
    }))?;
    Ok(())
}

/// Restores a soft-deleted organization.
///
/// # Errors
///
/// Returns `EventStoreError::InvariantViolation` if the organization is not
/// deleted or the actor is not an owner.
pub fn restore_organization(
    root: &mut AggregateRoot<Organization>,
) -> Result<(), EventStoreError> {
    let organization_id = live_organization_id(root)?;
    root.apply_event(OrganizationEvent::OrganizationRestored(
        OrganizationRestored { organization_id },
    ))?;
    Ok(())
}

/// Permanently removes the organization.
///
/// # Errors
///
/// Returns `EventStoreError::InvariantViolation` if the organization is
/// missing or the actor is not an owner.
pub fn destroy_organization(
    root: &mut AggregateRoot<Organization>,
) -> Result<(), EventStoreError> {
    let organization_id = live_organization_id(root)?;
    root.apply_event(OrganizationEvent::OrganizationDestroyed(
        OrganizationDestroyed { organization_id },
    ))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::context::EventContext;
    use strata_core::event::EventMetadata;
    use strata_test_support::{fixed_context, test_instant};

    fn registered(user_id: Uuid, organization_id: Uuid) -> AggregateRoot<User> {
        let mut root = AggregateRoot::new(user_id.to_string(), fixed_context(user_id));
        register_user(&mut root, user_id, "ada@example.com", "Ada", organization_id, "Acme")
            .unwrap();
        root
    }

    fn founded(organization_id: Uuid, owner_id: Uuid) -> Organization {
        let event = Event::new(
            OrganizationEvent::OrganizationCreated(OrganizationCreated {
                organization_id,
                name: "Acme".to_owned(),
                owner_id,
            }),
            EventMetadata {
                actor: Some(owner_id),
                ..EventMetadata::at(test_instant())
            },
        );
        Organization::apply(None, &event).unwrap().unwrap()
    }

    fn organization_root(organization: Organization, actor: Uuid) -> AggregateRoot<Organization> {
        let mut root =
            AggregateRoot::<Organization>::new(organization.id.to_string(), fixed_context(actor));
        root.apply_event(OrganizationEvent::OrganizationCreated(OrganizationCreated {
            organization_id: organization.id,
            name: organization.name.clone(),
            owner_id: organization.members[0].user_id,
        }))
        .unwrap();
        root
    }

    #[test]
    fn test_register_records_user_and_linked_organization_event() {
        // Arrange
        let user_id = Uuid::new_v4();
        let organization_id = Uuid::new_v4();

        // Act
        let root = registered(user_id, organization_id);

        // Assert
        let events = root.unpublished_events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].metadata.link_to, None);
        assert_eq!(
            events[1].metadata.link_to,
            Some(format!("Organization${organization_id}"))
        );
        assert_eq!(root.entity().unwrap().name, "Ada");
    }

    #[test]
    fn test_user_ignores_organization_created() {
        let user_id = Uuid::new_v4();
        let root = registered(user_id, Uuid::new_v4());
        let user = root.entity().cloned();

        let event = Event::new(
            root.unpublished_events()[1].data.clone(),
            EventMetadata::at(Utc::now()),
        );

        assert_eq!(User::apply(user.as_ref(), &event).unwrap(), user);
    }

    #[test]
    fn test_delete_twice_reports_user_not_found() {
        // Arrange
        let user_id = Uuid::new_v4();
        let mut root = registered(user_id, Uuid::new_v4());
        delete_user(&mut root).unwrap();

        // Act
        let result = delete_user(&mut root);

        // Assert
        match result {
            Err(EventStoreError::InvariantViolation(msg)) => assert_eq!(msg, "User not found"),
            other => panic!("expected InvariantViolation, got {other:?}"),
        }
    }

    #[test]
    fn test_only_the_user_may_delete_their_account() {
        let user_id = Uuid::new_v4();
        let mut root = registered(user_id, Uuid::new_v4());
        let mut other =
            AggregateRoot::<User>::new(user_id.to_string(), fixed_context(Uuid::new_v4()));
        for event in root.unpublished_events() {
            other.apply_event(EventInit::new(event.data.clone())).unwrap();
        }

        let result = delete_user(&mut other);

        assert!(result.unwrap_err().is_invariant_violation());
        assert!(other.entity().unwrap().deleted_at.is_none());
        assert!(delete_user(&mut root).is_ok());
    }

    #[test]
    fn test_invalid_email_is_rejected() {
        let user_id = Uuid::new_v4();
        let mut root = AggregateRoot::<User>::new(user_id.to_string(), EventContext::default());

        let result =
            register_user(&mut root, user_id, "not-an-email", "Ada", Uuid::new_v4(), "Acme");

        assert!(result.unwrap_err().is_invariant_violation());
        assert!(root.unpublished_events().is_empty());
    }

    #[test]
    fn test_founder_is_sole_owner() {
        let owner = Uuid::new_v4();

        let organization = founded(Uuid::new_v4(), owner);

        assert_eq!(organization.role_of(owner), Some(Role::Owner));
        assert_eq!(organization.owner_count(), 1);
    }

    #[test]
    fn test_removing_last_owner_is_rejected_and_membership_unchanged() {
        // Arrange
        let owner = Uuid::new_v4();
        let mut root = organization_root(founded(Uuid::new_v4(), owner), owner);
        let before = root.entity().unwrap().members.clone();

        // Act
        let result = remove_member(&mut root, owner);

        // Assert
        match result {
            Err(EventStoreError::InvariantViolation(msg)) => {
                assert_eq!(msg, "cannot remove the last owner");
            }
            other => panic!("expected InvariantViolation, got {other:?}"),
        }
        assert_eq!(root.entity().unwrap().members, before);
    }

    #[test]
    fn test_owner_can_leave_once_another_owner_exists() {
        let owner = Uuid::new_v4();
        let second = Uuid::new_v4();
        let mut root = organization_root(founded(Uuid::new_v4(), owner), owner);
        add_member(&mut root, second, Role::Owner).unwrap();

        remove_member(&mut root, owner).unwrap();

        let organization = root.entity().unwrap();
        assert_eq!(organization.role_of(owner), None);
        assert_eq!(organization.role_of(second), Some(Role::Owner));
    }

    #[test]
    fn test_demoting_last_owner_is_rejected() {
        let owner = Uuid::new_v4();
        let mut root = organization_root(founded(Uuid::new_v4(), owner), owner);

        let result = change_member_role(&mut root, owner, Role::Admin);

        match result {
            Err(EventStoreError::InvariantViolation(msg)) => {
                assert_eq!(msg, "cannot demote the last owner");
            }
            other => panic!("expected InvariantViolation, got {other:?}"),
        }
    }

    #[test]
    fn test_non_owner_cannot_add_members() {
        let owner = Uuid::new_v4();
        let outsider = Uuid::new_v4();
        let organization = founded(Uuid::new_v4(), owner);
        let mut root = organization_root(organization, outsider);

        let result = add_member(&mut root, Uuid::new_v4(), Role::Member);

        assert!(result.unwrap_err().is_invariant_violation());
        assert_eq!(root.entity().unwrap().members.len(), 1);
    }

    #[test]
    fn test_adding_existing_member_is_rejected() {
        let owner = Uuid::new_v4();
        let mut root = organization_root(founded(Uuid::new_v4(), owner), owner);

        match add_member(&mut root, owner, Role::Member) {
            Err(EventStoreError::InvariantViolation(msg)) => {
                assert_eq!(msg, format!("user {owner} is already a member"));
            }
            other => panic!("expected InvariantViolation, got {other:?}"),
        }
    }

    #[test]
    fn test_destroyed_organization_reduces_to_none() {
        let owner = Uuid::new_v4();
        let mut root = organization_root(founded(Uuid::new_v4(), owner), owner);
        delete_organization(&mut root).unwrap();

        destroy_organization(&mut root).unwrap();

        assert!(root.entity().is_none());
        match rename_organization(&mut root, "Phoenix") {
            Err(EventStoreError::InvariantViolation(msg)) => {
                assert_eq!(msg, "Organization is destroyed");
            }
            other => panic!("expected InvariantViolation, got {other:?}"),
        }
    }
}
