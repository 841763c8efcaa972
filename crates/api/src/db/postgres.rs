//! `PostgreSQL` storage backend.
//!
//! Queries are checked at runtime (`query_as` with `FromRow` rows) so the
//! crate builds without a live database. Roster mutations lock the license
//! row with `SELECT ... FOR UPDATE` and re-validate inside the transaction.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use insider_core::{Email, LicenseId, LicenseType, PaymentId, UserId};

use super::{NewUser, RepositoryError, Store};
use crate::models::{License, MembershipOutcome, Payment, Provisioned, Purchase, User};

const USER_COLUMNS: &str =
    "id, email, name, stripe_customer_id, is_verified, created_at, updated_at";
const LICENSE_COLUMNS: &str = "id, type AS license_type, owner_id, max_team_size, is_active, \
                               is_lifetime, created_at, updated_at";
const PAYMENT_COLUMNS: &str =
    "id, user_id, amount, currency, product_id, session_id, is_paid, license_id, paid_at";

/// Storage backend over a `PostgreSQL` pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// =============================================================================
// Row types
// =============================================================================

#[derive(sqlx::FromRow)]
struct UserRow {
    id: UserId,
    email: String,
    name: Option<String>,
    stripe_customer_id: String,
    is_verified: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;
        Ok(Self {
            id: row.id,
            email,
            name: row.name,
            stripe_customer_id: row.stripe_customer_id,
            is_verified: row.is_verified,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CredentialRow {
    #[sqlx(flatten)]
    user: UserRow,
    password_hash: String,
}

#[derive(sqlx::FromRow)]
struct LicenseRow {
    id: LicenseId,
    license_type: LicenseType,
    owner_id: UserId,
    max_team_size: i32,
    is_active: bool,
    is_lifetime: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl LicenseRow {
    fn into_license(self, members: Vec<UserId>) -> License {
        License {
            id: self.id,
            license_type: self.license_type,
            owner_id: self.owner_id,
            max_team_size: self.max_team_size,
            is_active: self.is_active,
            is_lifetime: self.is_lifetime,
            members,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct MemberRow {
    license_id: LicenseId,
    user_id: UserId,
}

#[derive(sqlx::FromRow)]
struct LockedLicenseRow {
    license_type: LicenseType,
    owner_id: UserId,
    max_team_size: i32,
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: PaymentId,
    user_id: UserId,
    amount: i64,
    currency: String,
    product_id: String,
    session_id: String,
    is_paid: bool,
    license_id: Option<LicenseId>,
    paid_at: DateTime<Utc>,
}

impl From<PaymentRow> for Payment {
    fn from(row: PaymentRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            amount: row.amount,
            currency: row.currency,
            product_id: row.product_id,
            session_id: row.session_id,
            is_paid: row.is_paid,
            license_id: row.license_id,
            paid_at: row.paid_at,
        }
    }
}

// =============================================================================
// Query helpers
// =============================================================================

fn map_unique_violation(e: sqlx::Error, what: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(format!("{what} already exists"));
    }
    RepositoryError::Database(e)
}

fn map_foreign_key_violation(e: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_foreign_key_violation()
    {
        return RepositoryError::NotFound;
    }
    RepositoryError::Database(e)
}

/// Attach rosters to license rows, keeping row order.
async fn with_members(
    conn: &mut PgConnection,
    rows: Vec<LicenseRow>,
) -> Result<Vec<License>, RepositoryError> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<i32> = rows.iter().map(|r| r.id.as_i32()).collect();
    let member_rows: Vec<MemberRow> = sqlx::query_as(
        r"
        SELECT license_id, user_id
        FROM insider.license_member
        WHERE license_id = ANY($1)
        ORDER BY added_at ASC, user_id ASC
        ",
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut rosters: HashMap<LicenseId, Vec<UserId>> = HashMap::new();
    for m in member_rows {
        rosters.entry(m.license_id).or_default().push(m.user_id);
    }

    Ok(rows
        .into_iter()
        .map(|row| {
            let members = rosters.remove(&row.id).unwrap_or_default();
            row.into_license(members)
        })
        .collect())
}

async fn insert_license(
    conn: &mut PgConnection,
    owner: UserId,
    license_type: LicenseType,
    max_team_size: i32,
) -> Result<License, RepositoryError> {
    let row: LicenseRow = sqlx::query_as(&format!(
        r"
        INSERT INTO insider.license (type, owner_id, max_team_size)
        VALUES ($1, $2, $3)
        RETURNING {LICENSE_COLUMNS}
        "
    ))
    .bind(license_type)
    .bind(owner)
    .bind(max_team_size)
    .fetch_one(&mut *conn)
    .await
    .map_err(map_foreign_key_violation)?;

    sqlx::query(
        r"
        INSERT INTO insider.license_member (license_id, user_id)
        VALUES ($1, $2)
        ",
    )
    .bind(row.id)
    .bind(owner)
    .execute(&mut *conn)
    .await?;

    Ok(row.into_license(vec![owner]))
}

async fn find_payment(
    conn: &mut PgConnection,
    session_id: &str,
) -> Result<Option<Payment>, RepositoryError> {
    let row: Option<PaymentRow> = sqlx::query_as(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM insider.payment WHERE session_id = $1"
    ))
    .bind(session_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(Payment::from))
}

async fn find_user_by_email(
    conn: &mut PgConnection,
    email: &Email,
) -> Result<Option<User>, RepositoryError> {
    let row: Option<UserRow> = sqlx::query_as(&format!(
        "SELECT {USER_COLUMNS} FROM insider.user WHERE email = $1"
    ))
    .bind(email)
    .fetch_optional(&mut *conn)
    .await?;
    row.map(User::try_from).transpose()
}

/// Lock a license row for the rest of the transaction.
async fn lock_license(
    conn: &mut PgConnection,
    license: LicenseId,
) -> Result<Option<LockedLicenseRow>, RepositoryError> {
    Ok(sqlx::query_as(
        r"
        SELECT type AS license_type, owner_id, max_team_size
        FROM insider.license
        WHERE id = $1
        FOR UPDATE
        ",
    )
    .bind(license)
    .fetch_optional(&mut *conn)
    .await?)
}

async fn touch_license(conn: &mut PgConnection, license: LicenseId) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE insider.license SET updated_at = NOW() WHERE id = $1")
        .bind(license)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

// =============================================================================
// Store implementation
// =============================================================================

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn create_user(&self, user: NewUser) -> Result<User, RepositoryError> {
        let row: UserRow = sqlx::query_as(&format!(
            r"
            INSERT INTO insider.user (email, password_hash, stripe_customer_id)
            VALUES ($1, $2, $3)
            RETURNING {USER_COLUMNS}
            "
        ))
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.stripe_customer_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "email"))?;

        User::try_from(row)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM insider.user WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(User::try_from).transpose()
    }

    async fn get_user_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        find_user_by_email(&mut *conn, email).await
    }

    async fn get_users(&self, ids: &[UserId]) -> Result<Vec<User>, RepositoryError> {
        let raw: Vec<i32> = ids.iter().map(UserId::as_i32).collect();
        let rows: Vec<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM insider.user WHERE id = ANY($1)"
        ))
        .bind(&raw)
        .fetch_all(&self.pool)
        .await?;

        let mut by_id = HashMap::with_capacity(rows.len());
        for row in rows {
            let user = User::try_from(row)?;
            by_id.insert(user.id, user);
        }
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    async fn get_credentials(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError> {
        let row: Option<CredentialRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS}, password_hash FROM insider.user WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some((User::try_from(row.user)?, row.password_hash)))
    }

    async fn get_password_hash(&self, id: UserId) -> Result<Option<String>, RepositoryError> {
        Ok(
            sqlx::query_scalar("SELECT password_hash FROM insider.user WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn set_password_hash(&self, id: UserId, hash: &str) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE insider.user
            SET password_hash = $1, updated_at = NOW()
            WHERE id = $2
            ",
        )
        .bind(hash)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn set_name(&self, id: UserId, name: &str) -> Result<User, RepositoryError> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            r"
            UPDATE insider.user
            SET name = $1, updated_at = NOW()
            WHERE id = $2
            RETURNING {USER_COLUMNS}
            "
        ))
        .bind(name)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map_or(Err(RepositoryError::NotFound), User::try_from)
    }

    async fn create_license(
        &self,
        owner: UserId,
        license_type: LicenseType,
        max_team_size: i32,
    ) -> Result<License, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let license = insert_license(&mut *tx, owner, license_type, max_team_size).await?;
        tx.commit().await?;
        Ok(license)
    }

    async fn get_license(&self, id: LicenseId) -> Result<Option<License>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        let row: Option<LicenseRow> = sqlx::query_as(&format!(
            "SELECT {LICENSE_COLUMNS} FROM insider.license WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(with_members(&mut *conn, vec![row]).await?.pop())
    }

    async fn licenses_for_user(&self, user: UserId) -> Result<Vec<License>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        let rows: Vec<LicenseRow> = sqlx::query_as(&format!(
            r"
            SELECT {LICENSE_COLUMNS}
            FROM insider.license
            WHERE id IN (SELECT license_id FROM insider.license_member WHERE user_id = $1)
            ORDER BY created_at DESC, id DESC
            "
        ))
        .bind(user)
        .fetch_all(&mut *conn)
        .await?;

        with_members(&mut *conn, rows).await
    }

    async fn add_member(
        &self,
        license: LicenseId,
        owner: UserId,
        member: UserId,
    ) -> Result<MembershipOutcome, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let Some(locked) = lock_license(&mut *tx, license).await? else {
            return Ok(MembershipOutcome::LicenseMissing);
        };
        if locked.owner_id != owner {
            return Ok(MembershipOutcome::NotOwner);
        }
        if !locked.license_type.is_team() {
            return Ok(MembershipOutcome::NotTeam);
        }

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM insider.license_member WHERE license_id = $1")
                .bind(license)
                .fetch_one(&mut *tx)
                .await?;
        if count >= i64::from(locked.max_team_size) {
            return Ok(MembershipOutcome::Full);
        }

        let inserted = sqlx::query(
            r"
            INSERT INTO insider.license_member (license_id, user_id)
            VALUES ($1, $2)
            ON CONFLICT (license_id, user_id) DO NOTHING
            ",
        )
        .bind(license)
        .bind(member)
        .execute(&mut *tx)
        .await
        .map_err(map_foreign_key_violation)?;

        if inserted.rows_affected() == 0 {
            return Ok(MembershipOutcome::AlreadyMember);
        }

        touch_license(&mut *tx, license).await?;
        tx.commit().await?;
        Ok(MembershipOutcome::Applied)
    }

    async fn remove_member(
        &self,
        license: LicenseId,
        owner: UserId,
        member: UserId,
    ) -> Result<MembershipOutcome, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let Some(locked) = lock_license(&mut *tx, license).await? else {
            return Ok(MembershipOutcome::LicenseMissing);
        };
        if !locked.license_type.is_team() {
            return Ok(MembershipOutcome::NotTeam);
        }
        if locked.owner_id != owner {
            return Ok(MembershipOutcome::NotOwner);
        }
        if locked.owner_id == member {
            return Ok(MembershipOutcome::OwnerImmutable);
        }

        let removed = sqlx::query(
            r"
            DELETE FROM insider.license_member
            WHERE license_id = $1 AND user_id = $2
            ",
        )
        .bind(license)
        .bind(member)
        .execute(&mut *tx)
        .await?;

        if removed.rows_affected() == 0 {
            return Ok(MembershipOutcome::NotMember);
        }

        touch_license(&mut *tx, license).await?;
        tx.commit().await?;
        Ok(MembershipOutcome::Applied)
    }

    async fn get_payment_by_session(
        &self,
        session_id: &str,
    ) -> Result<Option<Payment>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        find_payment(&mut *conn, session_id).await
    }

    async fn payments_for_user(&self, user: UserId) -> Result<Vec<Payment>, RepositoryError> {
        let rows: Vec<PaymentRow> = sqlx::query_as(&format!(
            r"
            SELECT {PAYMENT_COLUMNS}
            FROM insider.payment
            WHERE user_id = $1
            ORDER BY paid_at ASC, id ASC
            "
        ))
        .bind(user)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Payment::from).collect())
    }

    async fn claim_checkout_session(
        &self,
        session_id: &str,
        stale_before: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let claimed: Option<String> = sqlx::query_scalar(
            r"
            INSERT INTO insider.checkout_claim (session_id)
            VALUES ($1)
            ON CONFLICT (session_id) DO UPDATE
                SET claimed_at = NOW()
                WHERE insider.checkout_claim.claimed_at < $2
            RETURNING session_id
            ",
        )
        .bind(session_id)
        .bind(stale_before)
        .fetch_optional(&self.pool)
        .await?;
        Ok(claimed.is_some())
    }

    async fn release_checkout_session(&self, session_id: &str) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM insider.checkout_claim WHERE session_id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn provision_purchase(
        &self,
        purchase: &Purchase,
    ) -> Result<Provisioned, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        if let Some(payment) = find_payment(&mut *tx, &purchase.session_id).await? {
            return Ok(Provisioned::Duplicate { payment });
        }

        let (user, account_created) = match find_user_by_email(&mut *tx, &purchase.email).await? {
            Some(user) => (user, false),
            None => {
                let account = purchase
                    .new_account
                    .as_ref()
                    .ok_or(RepositoryError::NotFound)?;
                let inserted: Option<UserRow> = sqlx::query_as(&format!(
                    r"
                    INSERT INTO insider.user (email, password_hash, stripe_customer_id)
                    VALUES ($1, $2, $3)
                    ON CONFLICT (email) DO NOTHING
                    RETURNING {USER_COLUMNS}
                    "
                ))
                .bind(&purchase.email)
                .bind(&account.password_hash)
                .bind(&account.stripe_customer_id)
                .fetch_optional(&mut *tx)
                .await?;

                match inserted {
                    Some(row) => (User::try_from(row)?, true),
                    // Lost a race with a concurrent signup; use the winner.
                    None => (
                        find_user_by_email(&mut *tx, &purchase.email)
                            .await?
                            .ok_or(RepositoryError::NotFound)?,
                        false,
                    ),
                }
            }
        };

        let payment_id: Option<PaymentId> = sqlx::query_scalar(
            r"
            INSERT INTO insider.payment
                (user_id, amount, currency, product_id, session_id, paid_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (session_id) DO NOTHING
            RETURNING id
            ",
        )
        .bind(user.id)
        .bind(purchase.amount)
        .bind(&purchase.currency)
        .bind(&purchase.product_id)
        .bind(&purchase.session_id)
        .bind(purchase.paid_at)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(payment_id) = payment_id else {
            // A concurrent delivery of the same session committed first.
            tx.rollback().await?;
            let payment = self
                .get_payment_by_session(&purchase.session_id)
                .await?
                .ok_or(RepositoryError::NotFound)?;
            return Ok(Provisioned::Duplicate { payment });
        };

        let license = insert_license(
            &mut *tx,
            user.id,
            purchase.license_type,
            purchase.max_team_size,
        )
        .await?;

        sqlx::query(
            r"
            UPDATE insider.payment
            SET is_paid = TRUE, license_id = $1
            WHERE id = $2 AND is_paid = FALSE
            ",
        )
        .bind(license.id)
        .bind(payment_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Provisioned::Granted {
            user,
            license,
            account_created,
        })
    }
}
