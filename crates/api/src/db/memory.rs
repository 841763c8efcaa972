//! In-memory storage backend.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use insider_core::{Email, LicenseId, LicenseType, PaymentId, UserId};

use super::{NewUser, RepositoryError, Store};
use crate::models::{License, MembershipOutcome, Payment, Provisioned, Purchase, User};

/// Storage backend holding everything behind one mutex.
///
/// Every operation takes the lock once and never awaits while holding it,
/// so each call is atomic with respect to every other call.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    users: HashMap<UserId, UserRecord>,
    licenses: HashMap<LicenseId, License>,
    payments: Vec<Payment>,
    claims: HashMap<String, DateTime<Utc>>,
    last_user_id: i32,
    last_license_id: i32,
    last_payment_id: i32,
}

#[derive(Debug, Clone)]
struct UserRecord {
    user: User,
    password_hash: String,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl State {
    fn find_by_email(&self, email: &Email) -> Option<&UserRecord> {
        self.users.values().find(|r| &r.user.email == email)
    }

    fn insert_user(&mut self, new: NewUser) -> User {
        self.last_user_id += 1;
        let now = Utc::now();
        let user = User {
            id: UserId::new(self.last_user_id),
            email: new.email,
            name: None,
            stripe_customer_id: new.stripe_customer_id,
            is_verified: false,
            created_at: now,
            updated_at: now,
        };
        self.users.insert(
            user.id,
            UserRecord {
                user: user.clone(),
                password_hash: new.password_hash,
            },
        );
        user
    }

    fn insert_license(
        &mut self,
        owner: UserId,
        license_type: LicenseType,
        max_team_size: i32,
    ) -> License {
        self.last_license_id += 1;
        let now = Utc::now();
        let license = License {
            id: LicenseId::new(self.last_license_id),
            license_type,
            owner_id: owner,
            max_team_size,
            is_active: true,
            is_lifetime: true,
            members: vec![owner],
            created_at: now,
            updated_at: now,
        };
        self.licenses.insert(license.id, license.clone());
        license
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }

    async fn create_user(&self, user: NewUser) -> Result<User, RepositoryError> {
        let mut state = self.state.lock();
        if state.find_by_email(&user.email).is_some() {
            return Err(RepositoryError::Conflict("email already exists".to_owned()));
        }
        Ok(state.insert_user(user))
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.state.lock().users.get(&id).map(|r| r.user.clone()))
    }

    async fn get_user_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        Ok(self.state.lock().find_by_email(email).map(|r| r.user.clone()))
    }

    async fn get_users(&self, ids: &[UserId]) -> Result<Vec<User>, RepositoryError> {
        let state = self.state.lock();
        Ok(ids
            .iter()
            .filter_map(|id| state.users.get(id).map(|r| r.user.clone()))
            .collect())
    }

    async fn get_credentials(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError> {
        Ok(self
            .state
            .lock()
            .find_by_email(email)
            .map(|r| (r.user.clone(), r.password_hash.clone())))
    }

    async fn get_password_hash(&self, id: UserId) -> Result<Option<String>, RepositoryError> {
        Ok(self
            .state
            .lock()
            .users
            .get(&id)
            .map(|r| r.password_hash.clone()))
    }

    async fn set_password_hash(&self, id: UserId, hash: &str) -> Result<(), RepositoryError> {
        let mut state = self.state.lock();
        let record = state.users.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        hash.clone_into(&mut record.password_hash);
        record.user.updated_at = Utc::now();
        Ok(())
    }

    async fn set_name(&self, id: UserId, name: &str) -> Result<User, RepositoryError> {
        let mut state = self.state.lock();
        let record = state.users.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        record.user.name = Some(name.to_owned());
        record.user.updated_at = Utc::now();
        Ok(record.user.clone())
    }

    async fn create_license(
        &self,
        owner: UserId,
        license_type: LicenseType,
        max_team_size: i32,
    ) -> Result<License, RepositoryError> {
        let mut state = self.state.lock();
        if !state.users.contains_key(&owner) {
            return Err(RepositoryError::NotFound);
        }
        Ok(state.insert_license(owner, license_type, max_team_size))
    }

    async fn get_license(&self, id: LicenseId) -> Result<Option<License>, RepositoryError> {
        Ok(self.state.lock().licenses.get(&id).cloned())
    }

    async fn licenses_for_user(&self, user: UserId) -> Result<Vec<License>, RepositoryError> {
        let state = self.state.lock();
        let mut licenses: Vec<License> = state
            .licenses
            .values()
            .filter(|l| l.has_member(user))
            .cloned()
            .collect();
        licenses.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.as_i32().cmp(&a.id.as_i32()))
        });
        Ok(licenses)
    }

    async fn add_member(
        &self,
        license: LicenseId,
        owner: UserId,
        member: UserId,
    ) -> Result<MembershipOutcome, RepositoryError> {
        let mut state = self.state.lock();
        if !state.users.contains_key(&member) {
            return Err(RepositoryError::NotFound);
        }
        let Some(license) = state.licenses.get_mut(&license) else {
            return Ok(MembershipOutcome::LicenseMissing);
        };
        let outcome = if !license.is_owner(owner) {
            MembershipOutcome::NotOwner
        } else if !license.license_type.is_team() {
            MembershipOutcome::NotTeam
        } else if license.is_full() {
            MembershipOutcome::Full
        } else if license.has_member(member) {
            MembershipOutcome::AlreadyMember
        } else {
            license.members.push(member);
            license.updated_at = Utc::now();
            MembershipOutcome::Applied
        };
        Ok(outcome)
    }

    async fn remove_member(
        &self,
        license: LicenseId,
        owner: UserId,
        member: UserId,
    ) -> Result<MembershipOutcome, RepositoryError> {
        let mut state = self.state.lock();
        let Some(license) = state.licenses.get_mut(&license) else {
            return Ok(MembershipOutcome::LicenseMissing);
        };
        let outcome = if !license.license_type.is_team() {
            MembershipOutcome::NotTeam
        } else if !license.is_owner(owner) {
            MembershipOutcome::NotOwner
        } else if license.is_owner(member) {
            MembershipOutcome::OwnerImmutable
        } else if !license.has_member(member) {
            MembershipOutcome::NotMember
        } else {
            license.members.retain(|m| *m != member);
            license.updated_at = Utc::now();
            MembershipOutcome::Applied
        };
        Ok(outcome)
    }

    async fn get_payment_by_session(
        &self,
        session_id: &str,
    ) -> Result<Option<Payment>, RepositoryError> {
        Ok(self
            .state
            .lock()
            .payments
            .iter()
            .find(|p| p.session_id == session_id)
            .cloned())
    }

    async fn payments_for_user(&self, user: UserId) -> Result<Vec<Payment>, RepositoryError> {
        Ok(self
            .state
            .lock()
            .payments
            .iter()
            .filter(|p| p.user_id == user)
            .cloned()
            .collect())
    }

    async fn claim_checkout_session(
        &self,
        session_id: &str,
        stale_before: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.state.lock();
        if state
            .claims
            .get(session_id)
            .is_some_and(|claimed_at| *claimed_at >= stale_before)
        {
            return Ok(false);
        }
        state.claims.insert(session_id.to_string(), Utc::now());
        Ok(true)
    }

    async fn release_checkout_session(&self, session_id: &str) -> Result<(), RepositoryError> {
        self.state.lock().claims.remove(session_id);
        Ok(())
    }

    async fn provision_purchase(
        &self,
        purchase: &Purchase,
    ) -> Result<Provisioned, RepositoryError> {
        let mut state = self.state.lock();

        if let Some(payment) = state
            .payments
            .iter()
            .find(|p| p.session_id == purchase.session_id)
        {
            return Ok(Provisioned::Duplicate {
                payment: payment.clone(),
            });
        }

        let (user, account_created) = match state.find_by_email(&purchase.email) {
            Some(record) => (record.user.clone(), false),
            None => {
                let account = purchase
                    .new_account
                    .clone()
                    .ok_or(RepositoryError::NotFound)?;
                let user = state.insert_user(NewUser {
                    email: purchase.email.clone(),
                    password_hash: account.password_hash,
                    stripe_customer_id: account.stripe_customer_id,
                });
                (user, true)
            }
        };

        let license = state.insert_license(user.id, purchase.license_type, purchase.max_team_size);

        state.last_payment_id += 1;
        let payment = Payment {
            id: PaymentId::new(state.last_payment_id),
            user_id: user.id,
            amount: purchase.amount,
            currency: purchase.currency.clone(),
            product_id: purchase.product_id.clone(),
            session_id: purchase.session_id.clone(),
            is_paid: true,
            license_id: Some(license.id),
            paid_at: purchase.paid_at,
        };
        state.payments.push(payment);

        Ok(Provisioned::Granted {
            user,
            license,
            account_created,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::models::NewAccount;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: Email::parse(email).unwrap(),
            password_hash: "hash".to_string(),
            stripe_customer_id: "cus_test".to_string(),
        }
    }

    fn purchase(email: &str, session_id: &str) -> Purchase {
        Purchase {
            email: Email::parse(email).unwrap(),
            session_id: session_id.to_string(),
            amount: 4900,
            currency: "usd".to_string(),
            product_id: "prod_team".to_string(),
            license_type: LicenseType::Team,
            max_team_size: 11,
            paid_at: Utc::now(),
            new_account: Some(NewAccount {
                password_hash: "temp-hash".to_string(),
                stripe_customer_id: "cus_new".to_string(),
            }),
        }
    }

    #[tokio::test]
    async fn test_create_user_rejects_duplicate_email() {
        let store = MemoryStore::new();
        store.create_user(new_user("a@x.com")).await.unwrap();
        let err = store.create_user(new_user("a@x.com")).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_license_owner_is_first_member() {
        let store = MemoryStore::new();
        let owner = store.create_user(new_user("a@x.com")).await.unwrap();
        let license = store
            .create_license(owner.id, LicenseType::Team, 5)
            .await
            .unwrap();
        assert_eq!(license.members, vec![owner.id]);

        let listed = store.licenses_for_user(owner.id).await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn test_licenses_newest_first() {
        let store = MemoryStore::new();
        let owner = store.create_user(new_user("a@x.com")).await.unwrap();
        let first = store
            .create_license(owner.id, LicenseType::Individual, 1)
            .await
            .unwrap();
        let second = store
            .create_license(owner.id, LicenseType::Team, 5)
            .await
            .unwrap();

        let listed = store.licenses_for_user(owner.id).await.unwrap();
        let ids: Vec<_> = listed.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[tokio::test]
    async fn test_add_member_respects_capacity() {
        let store = MemoryStore::new();
        let owner = store.create_user(new_user("a@x.com")).await.unwrap();
        let b = store.create_user(new_user("b@x.com")).await.unwrap();
        let c = store.create_user(new_user("c@x.com")).await.unwrap();
        let license = store
            .create_license(owner.id, LicenseType::Team, 2)
            .await
            .unwrap();

        let added = store.add_member(license.id, owner.id, b.id).await.unwrap();
        assert_eq!(added, MembershipOutcome::Applied);
        let full = store.add_member(license.id, owner.id, c.id).await.unwrap();
        assert_eq!(full, MembershipOutcome::Full);

        let stored = store.get_license(license.id).await.unwrap().unwrap();
        assert_eq!(stored.members, vec![owner.id, b.id]);
    }

    #[tokio::test]
    async fn test_remove_member_guards_owner_and_non_members() {
        let store = MemoryStore::new();
        let owner = store.create_user(new_user("a@x.com")).await.unwrap();
        let b = store.create_user(new_user("b@x.com")).await.unwrap();
        let license = store
            .create_license(owner.id, LicenseType::Team, 5)
            .await
            .unwrap();

        assert_eq!(
            store
                .remove_member(license.id, owner.id, owner.id)
                .await
                .unwrap(),
            MembershipOutcome::OwnerImmutable
        );
        assert_eq!(
            store.remove_member(license.id, owner.id, b.id).await.unwrap(),
            MembershipOutcome::NotMember
        );
        assert_eq!(
            store.remove_member(license.id, b.id, owner.id).await.unwrap(),
            MembershipOutcome::NotOwner
        );
    }

    #[tokio::test]
    async fn test_provision_purchase_is_idempotent() {
        let store = MemoryStore::new();
        let first = store
            .provision_purchase(&purchase("buyer@x.com", "cs_1"))
            .await
            .unwrap();
        let Provisioned::Granted {
            user,
            account_created,
            ..
        } = first
        else {
            panic!("first delivery should grant");
        };
        assert!(account_created);

        let second = store
            .provision_purchase(&purchase("buyer@x.com", "cs_1"))
            .await
            .unwrap();
        assert!(matches!(second, Provisioned::Duplicate { .. }));

        assert_eq!(store.licenses_for_user(user.id).await.unwrap().len(), 1);
        assert_eq!(store.payments_for_user(user.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_provision_purchase_reuses_existing_user() {
        let store = MemoryStore::new();
        let existing = store.create_user(new_user("buyer@x.com")).await.unwrap();

        let result = store
            .provision_purchase(&purchase("buyer@x.com", "cs_2"))
            .await
            .unwrap();
        let Provisioned::Granted {
            user,
            license,
            account_created,
        } = result
        else {
            panic!("expected grant");
        };
        assert_eq!(user.id, existing.id);
        assert!(!account_created);
        assert!(license.is_owner(existing.id));

        let payment = store.get_payment_by_session("cs_2").await.unwrap().unwrap();
        assert!(payment.is_paid);
        assert_eq!(payment.license_id, Some(license.id));
    }

    #[tokio::test]
    async fn test_checkout_claim_is_exclusive_until_released() {
        let store = MemoryStore::new();
        let stale_before = Utc::now() - chrono::Duration::minutes(10);

        assert!(store.claim_checkout_session("cs_1", stale_before).await.unwrap());
        assert!(!store.claim_checkout_session("cs_1", stale_before).await.unwrap());
        assert!(store.claim_checkout_session("cs_2", stale_before).await.unwrap());

        store.release_checkout_session("cs_1").await.unwrap();
        assert!(store.claim_checkout_session("cs_1", stale_before).await.unwrap());
    }

    #[tokio::test]
    async fn test_stale_checkout_claim_is_taken_over() {
        let store = MemoryStore::new();
        assert!(
            store
                .claim_checkout_session("cs_1", Utc::now() - chrono::Duration::minutes(10))
                .await
                .unwrap()
        );

        let after_claim = Utc::now() + chrono::Duration::seconds(1);
        assert!(store.claim_checkout_session("cs_1", after_claim).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adds_never_exceed_capacity() {
        const CAPACITY: i32 = 5;
        const CANDIDATES: usize = 12;

        let store = std::sync::Arc::new(MemoryStore::new());
        let owner = store.create_user(new_user("owner@x.com")).await.unwrap();
        let license = store
            .create_license(owner.id, LicenseType::Team, CAPACITY)
            .await
            .unwrap();

        let mut candidates = Vec::with_capacity(CANDIDATES);
        for i in 0..CANDIDATES {
            let user = store
                .create_user(new_user(&format!("member{i}@x.com")))
                .await
                .unwrap();
            candidates.push(user.id);
        }

        let (license_id, owner_id) = (license.id, owner.id);
        let mut tasks = tokio::task::JoinSet::new();
        for member in candidates.clone() {
            let store = std::sync::Arc::clone(&store);
            tasks.spawn(async move {
                let outcome = store.add_member(license_id, owner_id, member).await.unwrap();
                (member, outcome)
            });
        }

        let mut applied = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let (member, outcome) = joined.unwrap();
            match outcome {
                MembershipOutcome::Applied => applied.push(member),
                MembershipOutcome::Full => {}
                other => panic!("unexpected outcome {other:?}"),
            }
        }
        assert_eq!(applied.len(), usize::try_from(CAPACITY - 1).unwrap());

        let stored = store.get_license(license.id).await.unwrap().unwrap();
        assert_eq!(stored.members.len(), usize::try_from(CAPACITY).unwrap());
        assert!(stored.is_full());

        for member in candidates {
            let licenses = store.licenses_for_user(member).await.unwrap();
            let on_roster = stored.has_member(member);
            assert_eq!(on_roster, applied.contains(&member));
            assert_eq!(licenses.iter().any(|l| l.id == license.id), on_roster);
        }
    }
}
