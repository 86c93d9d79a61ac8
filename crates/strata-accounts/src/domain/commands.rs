//! Commands for the Accounts context.

use strata_core::context::Command;
use uuid::Uuid;

use super::events::Role;

/// Command to register a user together with their first organization.
#[derive(Debug, Clone)]
pub struct RegisterUser {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The new user's identifier; also the acting user.
    pub user_id: Uuid,
    /// Login email.
    pub email: String,
    /// Display name.
    pub name: String,
    /// Identifier for the founded organization.
    pub organization_id: Uuid,
    /// Name of the founded organization.
    pub organization_name: String,
}

impl Command for RegisterUser {
    fn command_type(&self) -> &'static str {
        "accounts.register_user"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn actor(&self) -> Option<Uuid> {
        Some(self.user_id)
    }
}

/// Command to rename a user.
#[derive(Debug, Clone)]
pub struct RenameUser {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The acting user.
    pub actor: Uuid,
    /// The user to rename.
    pub user_id: Uuid,
    /// New display name.
    pub name: String,
}

/// Command to delete a user's account.
#[derive(Debug, Clone)]
pub struct DeleteUser {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The acting user.
    pub actor: Uuid,
    /// The account to delete.
    pub user_id: Uuid,
}

/// Command to restore a deleted account.
#[derive(Debug, Clone)]
pub struct RestoreUser {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The acting user.
    pub actor: Uuid,
    /// The account to restore.
    pub user_id: Uuid,
}

/// Command to rename an organization.
#[derive(Debug, Clone)]
pub struct RenameOrganization {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The acting user.
    pub actor: Uuid,
    /// The organization.
    pub organization_id: Uuid,
    /// New display name.
    pub name: String,
}

/// Command to add a member to an organization.
#[derive(Debug, Clone)]
pub struct AddMember {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The acting user.
    pub actor: Uuid,
    /// The organization.
    pub organization_id: Uuid,
    /// The user joining.
    pub user_id: Uuid,
    /// The role granted.
    pub role: Role,
}

/// Command to remove a member from an organization.
#[derive(Debug, Clone)]
pub struct RemoveMember {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The acting user.
    pub actor: Uuid,
    /// The organization.
    pub organization_id: Uuid,
    /// The member leaving.
    pub user_id: Uuid,
}

/// Command to change a member's role.
#[derive(Debug, Clone)]
pub struct ChangeMemberRole {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The acting user.
    pub actor: Uuid,
    /// The organization.
    pub organization_id: Uuid,
    /// The member.
    pub user_id: Uuid,
    /// The new role.
    pub role: Role,
}

/// Command to soft-delete an organization.
#[derive(Debug, Clone)]
pub struct DeleteOrganization {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The acting user.
    pub actor: Uuid,
    /// The organization.
    pub organization_id: Uuid,
}

/// Command to restore a soft-deleted organization.
#[derive(Debug, Clone)]
pub struct RestoreOrganization {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The acting user.
    pub actor: Uuid,
    /// The organization.
    pub organization_id: Uuid,
}

/// Command to permanently remove an organization.
#[derive(Debug, Clone)]
pub struct DestroyOrganization {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The acting user.
    pub actor: Uuid,
    /// The organization.
    pub organization_id: Uuid,
}

macro_rules! impl_command {
    ($($command:ty => $name:literal),+ $(,)?) => {
        $(
            impl Command for $command {
                fn command_type(&self) -> &'static str {
                    $name
                }

                fn correlation_id(&self) -> Uuid {
                    self.correlation_id
                }

                fn actor(&self) -> Option<Uuid> {
                    Some(self.actor)
                }
            }
        )+
    };
}

impl_command! {
    RenameUser => "accounts.rename_user",
    DeleteUser => "accounts.delete_user",
    RestoreUser => "accounts.restore_user",
    RenameOrganization => "accounts.rename_organization",
    AddMember => "accounts.add_member",
    RemoveMember => "accounts.remove_member",
    ChangeMemberRole => "accounts.change_member_role",
    DeleteOrganization => "accounts.delete_organization",
    RestoreOrganization => "accounts.restore_organization",
    DestroyOrganization => "accounts.destroy_organization",
}
