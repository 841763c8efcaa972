//! License error types.

use thiserror::Error;

use crate::db::RepositoryError;

/// Roster operation that failed, for operation-specific messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberAction {
    Add,
    Remove,
}

/// Errors that can occur during license operations.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// Requested license type is not `individual` or `team`.
    #[error("invalid license type: {0}")]
    InvalidType(String),

    /// No license with that id (owned by the caller, for additions).
    #[error("license not found")]
    NotFound,

    /// Roster operations need a team license.
    #[error("not a team license")]
    NotTeam(MemberAction),

    /// Only the owner may change the roster.
    #[error("caller does not own the license")]
    NotOwner(MemberAction),

    /// Roster is at capacity.
    #[error("team is full")]
    TeamFull,

    /// No account with the target email.
    #[error("member account not found")]
    MemberNotFound(MemberAction),

    #[error("user is already a member")]
    AlreadyMember,

    /// The owner is a permanent member.
    #[error("owner cannot be removed")]
    OwnerImmutable,

    #[error("user is not a member")]
    NotMember,

    /// Caller's own account disappeared.
    #[error("account not found")]
    AccountNotFound,

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}
