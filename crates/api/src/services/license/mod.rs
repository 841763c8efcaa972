//! License service.
//!
//! Activation, listing with owner-only roster visibility, and team roster
//! changes. Every roster change is checked here for a precise error and then
//! applied by the store, which re-checks under its own lock.

mod error;

pub use error::{LicenseError, MemberAction};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::instrument;

use insider_core::{Email, LicenseId, LicenseType, UserId};

use crate::config::LicensePolicy;
use crate::db::{RepositoryError, Store};
use crate::models::{License, MembershipOutcome, User};
use crate::services::notify::Notifier;

/// A roster entry as shown to the license owner.
#[derive(Debug, Clone, Serialize)]
pub struct TeamMemberView {
    pub id: UserId,
    pub email: Email,
    pub name: Option<String>,
}

/// A license as returned to one particular caller.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseView {
    pub id: LicenseId,
    #[serde(rename = "type")]
    pub license_type: LicenseType,
    pub owner: UserId,
    pub max_team_size: i32,
    pub is_active: bool,
    pub is_lifetime: bool,
    /// Present only for team licenses viewed by their owner.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_members: Option<Vec<TeamMemberView>>,
    pub available_team_slots: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LicenseView {
    #[must_use]
    pub fn new(license: &License, team_members: Option<Vec<TeamMemberView>>) -> Self {
        Self {
            id: license.id,
            license_type: license.license_type,
            owner: license.owner_id,
            max_team_size: license.max_team_size,
            is_active: license.is_active,
            is_lifetime: license.is_lifetime,
            team_members,
            available_team_slots: license.available_slots(),
            created_at: license.created_at,
            updated_at: license.updated_at,
        }
    }
}

/// Licenses visible to a caller, plus their display name.
#[derive(Debug, Clone)]
pub struct LicenseListing {
    pub licenses: Vec<LicenseView>,
    pub user_name: Option<String>,
}

/// Whether a user holds any license.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveStatus {
    pub has_active_license: bool,
    pub license_count: usize,
}

/// License service.
pub struct LicenseService<'a> {
    store: &'a dyn Store,
    policy: LicensePolicy,
    notifier: Notifier<'a>,
}

impl<'a> LicenseService<'a> {
    #[must_use]
    pub fn new(store: &'a dyn Store, policy: LicensePolicy, notifier: Notifier<'a>) -> Self {
        Self {
            store,
            policy,
            notifier,
        }
    }

    /// Create a license owned by `owner` with the policy capacity for its type.
    ///
    /// # Errors
    ///
    /// Returns `LicenseError::InvalidType` for anything but `individual`/`team`.
    #[instrument(skip(self))]
    pub async fn activate(&self, owner: UserId, license_type: &str) -> Result<License, LicenseError> {
        let license_type: LicenseType = license_type
            .parse()
            .map_err(|_| LicenseError::InvalidType(license_type.to_string()))?;

        let license = self
            .store
            .create_license(owner, license_type, self.policy.max_size_for(license_type))
            .await?;

        tracing::info!(license_id = %license.id, %license_type, "License activated");
        Ok(license)
    }

    /// Every license `caller` belongs to, newest first.
    ///
    /// # Errors
    ///
    /// Returns `LicenseError::AccountNotFound` if the caller no longer exists.
    pub async fn list(&self, caller: UserId) -> Result<LicenseListing, LicenseError> {
        let user = self
            .store
            .get_user(caller)
            .await?
            .ok_or(LicenseError::AccountNotFound)?;

        let licenses = self.store.licenses_for_user(caller).await?;
        let mut views = Vec::with_capacity(licenses.len());

        for license in &licenses {
            let team_members = if license.license_type.is_team() && license.is_owner(caller) {
                let members = self.store.get_users(&license.members).await?;
                Some(
                    members
                        .into_iter()
                        .map(|m| TeamMemberView {
                            id: m.id,
                            email: m.email,
                            name: m.name,
                        })
                        .collect(),
                )
            } else {
                None
            };
            views.push(LicenseView::new(license, team_members));
        }

        views.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.as_i32().cmp(&a.id.as_i32()))
        });

        Ok(LicenseListing {
            licenses: views,
            user_name: user.name,
        })
    }

    /// # Errors
    ///
    /// Returns `LicenseError` on storage failure.
    pub async fn check_active(&self, user: UserId) -> Result<ActiveStatus, LicenseError> {
        let count = self.store.licenses_for_user(user).await?.len();
        Ok(ActiveStatus {
            has_active_license: count > 0,
            license_count: count,
        })
    }

    /// Add the account at `member_email` to a team license owned by `caller`.
    ///
    /// # Errors
    ///
    /// In order: `NotFound`, `NotTeam`, `TeamFull`, `MemberNotFound`,
    /// `AlreadyMember`.
    #[instrument(skip(self, caller), fields(caller = %caller.id))]
    pub async fn add_member(
        &self,
        caller: &User,
        license_id: LicenseId,
        member_email: &str,
    ) -> Result<(), LicenseError> {
        let license = self
            .store
            .get_license(license_id)
            .await?
            .filter(|l| l.is_owner(caller.id))
            .ok_or(LicenseError::NotFound)?;

        if !license.license_type.is_team() {
            return Err(LicenseError::NotTeam(MemberAction::Add));
        }
        if license.is_full() {
            return Err(LicenseError::TeamFull);
        }

        let member = self
            .find_member(member_email)
            .await?
            .ok_or(LicenseError::MemberNotFound(MemberAction::Add))?;

        if license.has_member(member.id) {
            return Err(LicenseError::AlreadyMember);
        }

        let outcome = self
            .store
            .add_member(license.id, caller.id, member.id)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => LicenseError::MemberNotFound(MemberAction::Add),
                other => LicenseError::Repository(other),
            })?;
        outcome_to_result(outcome, MemberAction::Add)?;

        tracing::info!(license_id = %license.id, member_id = %member.id, "Team member added");

        if let Err(e) = self.notifier.team_added(&member.email, &caller.email).await {
            tracing::warn!(error = %e, "Failed to notify added team member");
        }

        Ok(())
    }

    /// Remove the account at `member_email` from a team license owned by `caller`.
    ///
    /// # Errors
    ///
    /// In order: `NotFound`, `NotTeam`, `NotOwner`, `MemberNotFound`,
    /// `OwnerImmutable`, `NotMember`.
    #[instrument(skip(self, caller), fields(caller = %caller.id))]
    pub async fn remove_member(
        &self,
        caller: &User,
        license_id: LicenseId,
        member_email: &str,
    ) -> Result<(), LicenseError> {
        let license = self
            .store
            .get_license(license_id)
            .await?
            .ok_or(LicenseError::NotFound)?;

        if !license.license_type.is_team() {
            return Err(LicenseError::NotTeam(MemberAction::Remove));
        }
        if !license.is_owner(caller.id) {
            return Err(LicenseError::NotOwner(MemberAction::Remove));
        }

        let member = self
            .find_member(member_email)
            .await?
            .ok_or(LicenseError::MemberNotFound(MemberAction::Remove))?;

        if license.is_owner(member.id) {
            return Err(LicenseError::OwnerImmutable);
        }
        if !license.has_member(member.id) {
            return Err(LicenseError::NotMember);
        }

        let outcome = self
            .store
            .remove_member(license.id, caller.id, member.id)
            .await?;
        outcome_to_result(outcome, MemberAction::Remove)?;

        tracing::info!(license_id = %license.id, member_id = %member.id, "Team member removed");

        if let Err(e) = self.notifier.team_removed(&member.email, &caller.email).await {
            tracing::warn!(error = %e, "Failed to notify removed team member");
        }

        Ok(())
    }

    async fn find_member(&self, email: &str) -> Result<Option<User>, LicenseError> {
        let Ok(email) = Email::parse(email) else {
            return Ok(None);
        };
        Ok(self.store.get_user_by_email(&email).await?)
    }
}

/// Map a store verdict reached under lock to the matching error.
fn outcome_to_result(outcome: MembershipOutcome, action: MemberAction) -> Result<(), LicenseError> {
    match outcome {
        MembershipOutcome::Applied => Ok(()),
        MembershipOutcome::LicenseMissing => Err(LicenseError::NotFound),
        MembershipOutcome::NotTeam => Err(LicenseError::NotTeam(action)),
        MembershipOutcome::NotOwner => match action {
            // Additions scope the lookup to the owner.
            MemberAction::Add => Err(LicenseError::NotFound),
            MemberAction::Remove => Err(LicenseError::NotOwner(action)),
        },
        MembershipOutcome::Full => Err(LicenseError::TeamFull),
        MembershipOutcome::AlreadyMember => Err(LicenseError::AlreadyMember),
        MembershipOutcome::NotMember => Err(LicenseError::NotMember),
        MembershipOutcome::OwnerImmutable => Err(LicenseError::OwnerImmutable),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::{MemoryStore, NewUser};
    use crate::testing::FakeMailer;

    struct Harness {
        store: MemoryStore,
        mailer: FakeMailer,
        policy: LicensePolicy,
    }

    impl Harness {
        fn new(team_max_size: i32) -> Self {
            Self {
                store: MemoryStore::new(),
                mailer: FakeMailer::default(),
                policy: LicensePolicy {
                    team_max_size,
                    individual_max_size: 1,
                },
            }
        }

        fn licenses(&self) -> LicenseService<'_> {
            LicenseService::new(
                &self.store,
                self.policy,
                Notifier::new(&self.mailer, "http://localhost:3000/signin".to_string()),
            )
        }

        async fn user(&self, email: &str) -> User {
            self.store
                .create_user(NewUser {
                    email: Email::parse(email).unwrap(),
                    password_hash: "hash".to_string(),
                    stripe_customer_id: format!("cus_{email}"),
                })
                .await
                .unwrap()
        }

        /// `L.id in licenses_for_user(U)` iff `U` is on `L`'s roster.
        async fn assert_consistent(&self, license: LicenseId, users: &[&User]) {
            let l = self.store.get_license(license).await.unwrap().unwrap();
            for user in users {
                let listed = self
                    .store
                    .licenses_for_user(user.id)
                    .await
                    .unwrap()
                    .iter()
                    .any(|x| x.id == license);
                assert_eq!(listed, l.has_member(user.id), "user {}", user.email);
            }
            assert!(l.member_count() <= l.max_team_size);
        }
    }

    #[tokio::test]
    async fn test_activate() {
        let h = Harness::new(11);
        let a = h.user("a@x.com").await;

        let team = h.licenses().activate(a.id, "team").await.unwrap();
        assert_eq!(team.max_team_size, 11);
        assert_eq!(team.members, vec![a.id]);

        let solo = h.licenses().activate(a.id, "individual").await.unwrap();
        assert_eq!(solo.max_team_size, 1);

        assert!(matches!(
            h.licenses().activate(a.id, "enterprise").await,
            Err(LicenseError::InvalidType(_))
        ));

        let status = h.licenses().check_active(a.id).await.unwrap();
        assert!(status.has_active_license);
        assert_eq!(status.license_count, 2);
    }

    #[tokio::test]
    async fn test_capacity_scenario() {
        let h = Harness::new(5);
        let a = h.user("a@x.com").await;
        let b = h.user("b@x.com").await;
        let c = h.user("c@x.com").await;
        let d = h.user("d@x.com").await;
        let e = h.user("e@x.com").await;
        let f = h.user("f@x.com").await;
        let svc = h.licenses();

        let license = svc.activate(a.id, "team").await.unwrap();
        for member in ["b@x.com", "c@x.com", "d@x.com", "e@x.com"] {
            svc.add_member(&a, license.id, member).await.unwrap();
        }
        assert!(matches!(
            svc.add_member(&a, license.id, "f@x.com").await,
            Err(LicenseError::TeamFull)
        ));
        let full = h.store.get_license(license.id).await.unwrap().unwrap();
        assert_eq!(full.member_count(), 5);

        svc.remove_member(&a, license.id, "b@x.com").await.unwrap();
        svc.add_member(&a, license.id, "f@x.com").await.unwrap();

        h.assert_consistent(license.id, &[&a, &b, &c, &d, &e, &f])
            .await;
        assert_eq!(h.mailer.sent_to("f@x.com").len(), 1);
        assert_eq!(h.mailer.sent_to("b@x.com").len(), 2);
    }

    #[tokio::test]
    async fn test_add_error_order() {
        let h = Harness::new(2);
        let a = h.user("a@x.com").await;
        let b = h.user("b@x.com").await;
        let outsider = h.user("o@x.com").await;
        let svc = h.licenses();

        let solo = svc.activate(a.id, "individual").await.unwrap();
        let team = svc.activate(a.id, "team").await.unwrap();

        assert!(matches!(
            svc.add_member(&a, LicenseId::new(999), "b@x.com").await,
            Err(LicenseError::NotFound)
        ));
        // Not the owner: the license is invisible to the caller.
        assert!(matches!(
            svc.add_member(&outsider, team.id, "b@x.com").await,
            Err(LicenseError::NotFound)
        ));
        assert!(matches!(
            svc.add_member(&a, solo.id, "b@x.com").await,
            Err(LicenseError::NotTeam(MemberAction::Add))
        ));
        assert!(matches!(
            svc.add_member(&a, team.id, "ghost@x.com").await,
            Err(LicenseError::MemberNotFound(MemberAction::Add))
        ));
        assert!(matches!(
            svc.add_member(&a, team.id, "a@x.com").await,
            Err(LicenseError::AlreadyMember)
        ));

        svc.add_member(&a, team.id, "b@x.com").await.unwrap();
        // Full is reported before the member lookup.
        assert!(matches!(
            svc.add_member(&a, team.id, "ghost@x.com").await,
            Err(LicenseError::TeamFull)
        ));
        h.assert_consistent(team.id, &[&a, &b, &outsider]).await;
    }

    #[tokio::test]
    async fn test_remove_guards() {
        let h = Harness::new(5);
        let a = h.user("a@x.com").await;
        let b = h.user("b@x.com").await;
        let c = h.user("c@x.com").await;
        let svc = h.licenses();

        let team = svc.activate(a.id, "team").await.unwrap();
        let solo = svc.activate(a.id, "individual").await.unwrap();
        svc.add_member(&a, team.id, "b@x.com").await.unwrap();

        assert!(matches!(
            svc.remove_member(&a, LicenseId::new(999), "b@x.com").await,
            Err(LicenseError::NotFound)
        ));
        assert!(matches!(
            svc.remove_member(&a, solo.id, "b@x.com").await,
            Err(LicenseError::NotTeam(MemberAction::Remove))
        ));
        assert!(matches!(
            svc.remove_member(&b, team.id, "b@x.com").await,
            Err(LicenseError::NotOwner(MemberAction::Remove))
        ));
        assert!(matches!(
            svc.remove_member(&a, team.id, "ghost@x.com").await,
            Err(LicenseError::MemberNotFound(MemberAction::Remove))
        ));
        assert!(matches!(
            svc.remove_member(&a, team.id, "a@x.com").await,
            Err(LicenseError::OwnerImmutable)
        ));
        assert!(matches!(
            svc.remove_member(&a, team.id, "c@x.com").await,
            Err(LicenseError::NotMember)
        ));

        let roster = h.store.get_license(team.id).await.unwrap().unwrap().members;
        assert_eq!(roster, vec![a.id, b.id]);
        h.assert_consistent(team.id, &[&a, &b, &c]).await;
    }

    #[tokio::test]
    async fn test_roster_visible_to_owner_only() {
        let h = Harness::new(5);
        let a = h.user("a@x.com").await;
        let b = h.user("b@x.com").await;
        let svc = h.licenses();

        let team = svc.activate(a.id, "team").await.unwrap();
        svc.add_member(&a, team.id, "b@x.com").await.unwrap();

        let owner_view = svc.list(a.id).await.unwrap();
        let roster = owner_view.licenses[0].team_members.as_ref().unwrap();
        let emails: Vec<&str> = roster.iter().map(|m| m.email.as_str()).collect();
        assert_eq!(emails, vec!["a@x.com", "b@x.com"]);
        assert_eq!(owner_view.licenses[0].available_team_slots, 3);

        let member_view = svc.list(b.id).await.unwrap();
        assert_eq!(member_view.licenses.len(), 1);
        assert!(member_view.licenses[0].team_members.is_none());
        let json = serde_json::to_value(&member_view.licenses[0]).unwrap();
        assert!(json.get("teamMembers").is_none());
        assert_eq!(json["type"], "team");
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let h = Harness::new(5);
        let a = h.user("a@x.com").await;
        let svc = h.licenses();

        let first = svc.activate(a.id, "individual").await.unwrap();
        let second = svc.activate(a.id, "team").await.unwrap();

        let listing = svc.list(a.id).await.unwrap();
        let ids: Vec<LicenseId> = listing.licenses.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
        assert!(listing.licenses[1].team_members.is_none());
    }

    #[tokio::test]
    async fn test_membership_survives_notify_failure() {
        let h = Harness::new(5);
        let a = h.user("a@x.com").await;
        let b = h.user("b@x.com").await;
        h.mailer.fail_sends(true);
        let svc = h.licenses();

        let team = svc.activate(a.id, "team").await.unwrap();
        svc.add_member(&a, team.id, "b@x.com").await.unwrap();
        h.assert_consistent(team.id, &[&a, &b]).await;
    }
}
