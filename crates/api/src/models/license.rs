//! License domain types.

use chrono::{DateTime, Utc};

use insider_core::{LicenseId, LicenseType, UserId};

/// A license (domain type).
///
/// `members` is the full roster in insertion order and always contains the
/// owner. A user's licenses are exactly the licenses whose roster contains
/// them; there is no second copy of that relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct License {
    pub id: LicenseId,
    pub license_type: LicenseType,
    pub owner_id: UserId,
    /// Roster capacity, owner included.
    pub max_team_size: i32,
    /// Stored and reported, not evaluated.
    pub is_active: bool,
    /// Stored and reported, not evaluated.
    pub is_lifetime: bool,
    pub members: Vec<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl License {
    #[must_use]
    pub fn is_owner(&self, user_id: UserId) -> bool {
        self.owner_id == user_id
    }

    #[must_use]
    pub fn has_member(&self, user_id: UserId) -> bool {
        self.members.contains(&user_id)
    }

    #[must_use]
    pub fn member_count(&self) -> i32 {
        i32::try_from(self.members.len()).unwrap_or(i32::MAX)
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.member_count() >= self.max_team_size
    }

    /// Free seats on a team license; individual licenses report 0.
    #[must_use]
    pub fn available_slots(&self) -> i32 {
        if self.license_type.is_team() {
            (self.max_team_size - self.member_count()).max(0)
        } else {
            0
        }
    }
}

/// Result of an atomic roster mutation.
///
/// The store re-validates every precondition under the license lock and
/// reports the first one that no longer holds instead of writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipOutcome {
    Applied,
    LicenseMissing,
    NotTeam,
    NotOwner,
    Full,
    AlreadyMember,
    NotMember,
    OwnerImmutable,
}
