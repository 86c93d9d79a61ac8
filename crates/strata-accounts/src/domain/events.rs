//! Domain events for the Accounts context.

use std::fmt;

use serde::{Deserialize, Serialize};
use strata_core::event::DomainEvent;
use uuid::Uuid;

/// Event type constant for user creation.
pub const USER_CREATED: &str = "UserCreated";
/// Event type constant for user renaming.
pub const USER_NAME_SET: &str = "UserNameSet";
/// Event type constant for user soft deletion.
pub const USER_DELETED: &str = "UserDeleted";
/// Event type constant for user restoration.
pub const USER_RESTORED: &str = "UserRestored";
/// Event type constant for organization creation.
pub const ORGANIZATION_CREATED: &str = "OrganizationCreated";
/// Event type constant for organization renaming.
pub const ORGANIZATION_NAME_SET: &str = "OrganizationNameSet";
/// Event type constant for adding a member.
pub const USER_ADDED_TO_ORGANIZATION: &str = "UserAddedToOrganization";
/// Event type constant for removing a member.
pub const USER_REMOVED_FROM_ORGANIZATION: &str = "UserRemovedFromOrganization";
/// Event type constant for a member's role change.
pub const USER_ROLE_CHANGED: &str = "UserRoleChanged";
/// Event type constant for organization soft deletion.
pub const ORGANIZATION_DELETED: &str = "OrganizationDeleted";
/// Event type constant for organization restoration.
pub const ORGANIZATION_RESTORED: &str = "OrganizationRestored";
/// Event type constant for permanent organization removal.
pub const ORGANIZATION_DESTROYED: &str = "OrganizationDestroyed";

/// A member's role within an organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Full control, including membership and deletion.
    Owner,
    /// Day-to-day administration.
    Admin,
    /// Ordinary member.
    Member,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::Member => "member",
        };
        f.write_str(name)
    }
}

/// Emitted when a user registers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCreated {
    /// The user identifier.
    pub user_id: Uuid,
    /// Login email.
    pub email: String,
    /// Display name.
    pub name: String,
}

/// Emitted when a user changes their name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserNameSet {
    /// The user identifier.
    pub user_id: Uuid,
    /// New display name.
    pub name: String,
}

/// Emitted when a user deletes their account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDeleted {
    /// The user identifier.
    pub user_id: Uuid,
}

/// Emitted when a deleted account is restored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRestored {
    /// The user identifier.
    pub user_id: Uuid,
}

/// Emitted when an organization is founded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationCreated {
    /// The organization identifier.
    pub organization_id: Uuid,
    /// Display name.
    pub name: String,
    /// The founding owner.
    pub owner_id: Uuid,
}

/// Emitted when an organization is renamed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationNameSet {
    /// The organization identifier.
    pub organization_id: Uuid,
    /// New display name.
    pub name: String,
}

/// Emitted when a user joins an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAddedToOrganization {
    /// The organization identifier.
    pub organization_id: Uuid,
    /// The new member.
    pub user_id: Uuid,
    /// The member's role.
    pub role: Role,
}

/// Emitted when a user leaves or is removed from an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRemovedFromOrganization {
    /// The organization identifier.
    pub organization_id: Uuid,
    /// The removed member.
    pub user_id: Uuid,
    /// The role the member held.
    pub role: Role,
}

/// Emitted when a member's role changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRoleChanged {
    /// The organization identifier.
    pub organization_id: Uuid,
    /// The member.
    pub user_id: Uuid,
    /// The new role.
    pub role: Role,
}

/// Emitted when an organization is soft-deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationDeleted {
    /// The organization identifier.
    pub organization_id: Uuid,
}

/// Emitted when a soft-deleted organization is restored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationRestored {
    /// The organization identifier.
    pub organization_id: Uuid,
}

/// Emitted when an organization is permanently removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationDestroyed {
    /// The organization identifier.
    pub organization_id: Uuid,
}

/// Events found in a `User` stream.
///
/// `OrganizationCreated` appears here because registration founds the user's
/// first organization from the user's own stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum UserEvent {
    /// A user has registered.
    UserCreated(UserCreated),
    /// A user has been renamed.
    UserNameSet(UserNameSet),
    /// A user has deleted their account.
    UserDeleted(UserDeleted),
    /// A deleted account has been restored.
    UserRestored(UserRestored),
    /// The user founded an organization.
    OrganizationCreated(OrganizationCreated),
}

impl DomainEvent for UserEvent {
    const EVENT_TYPES: &'static [&'static str] = &[
        USER_CREATED,
        USER_NAME_SET,
        USER_DELETED,
        USER_RESTORED,
        ORGANIZATION_CREATED,
    ];

    fn event_type(&self) -> &'static str {
        match self {
            Self::UserCreated(_) => USER_CREATED,
            Self::UserNameSet(_) => USER_NAME_SET,
            Self::UserDeleted(_) => USER_DELETED,
            Self::UserRestored(_) => USER_RESTORED,
            Self::OrganizationCreated(_) => ORGANIZATION_CREATED,
        }
    }
}

/// Events found in an `Organization` stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrganizationEvent {
    /// The organization was founded.
    OrganizationCreated(OrganizationCreated),
    /// The organization was renamed.
    OrganizationNameSet(OrganizationNameSet),
    /// A user joined.
    UserAddedToOrganization(UserAddedToOrganization),
    /// A user left or was removed.
    UserRemovedFromOrganization(UserRemovedFromOrganization),
    /// A member's role changed.
    UserRoleChanged(UserRoleChanged),
    /// The organization was soft-deleted.
    OrganizationDeleted(OrganizationDeleted),
    /// The organization was restored.
    OrganizationRestored(OrganizationRestored),
    /// The organization was destroyed.
    OrganizationDestroyed(OrganizationDestroyed),
}

impl DomainEvent for OrganizationEvent {
    const EVENT_TYPES: &'static [&'static str] = &[
        ORGANIZATION_CREATED,
        ORGANIZATION_NAME_SET,
        USER_ADDED_TO_ORGANIZATION,
        USER_REMOVED_FROM_ORGANIZATION,
        USER_ROLE_CHANGED,
        ORGANIZATION_DELETED,
        ORGANIZATION_RESTORED,
        ORGANIZATION_DESTROYED,
    ];

    fn event_type(&self) -> &'static str {
        match self {
            Self::OrganizationCreated(_) => ORGANIZATION_CREATED,
            Self::OrganizationNameSet(_) => ORGANIZATION_NAME_SET,
            Self::UserAddedToOrganization(_) => USER_ADDED_TO_ORGANIZATION,
            Self::UserRemovedFromOrganization(_) => USER_REMOVED_FROM_ORGANIZATION,
            Self::UserRoleChanged(_) => USER_ROLE_CHANGED,
            Self::OrganizationDeleted(_) => ORGANIZATION_DELETED,
            Self::OrganizationRestored(_) => ORGANIZATION_RESTORED,
            Self::OrganizationDestroyed(_) => ORGANIZATION_DESTROYED,
        }
    }
}
