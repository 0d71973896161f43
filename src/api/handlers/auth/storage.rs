//! Database helpers for accounts and ephemeral tokens.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Row, postgres::PgRow};
use tracing::Instrument;
use uuid::Uuid;

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

/// Account role as persisted in `users.role`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Regular,
    Author,
    Admin,
    Suspended,
}

impl Role {
    /// Parse the persisted `users.role` textual value into a typed enum.
    pub(crate) fn from_db(value: &str) -> Result<Self, sqlx::Error> {
        match value {
            "regular" => Ok(Self::Regular),
            "author" => Ok(Self::Author),
            "admin" => Ok(Self::Admin),
            "suspended" => Ok(Self::Suspended),
            _ => Err(sqlx::Error::Decode(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("invalid users.role value: {value}"),
            )))),
        }
    }

    /// Parse user-supplied input into a role, if it names one.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::from_db(value.trim().to_lowercase().as_str()).ok()
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Regular => "regular",
            Self::Author => "author",
            Self::Admin => "admin",
            Self::Suspended => "suspended",
        }
    }
}

/// Purpose tag for an ephemeral token row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPurpose {
    EmailVerification,
    PasswordReset,
    LoginCode,
}

impl TokenPurpose {
    fn from_db(value: &str) -> Result<Self, sqlx::Error> {
        match value {
            "email_verification" => Ok(Self::EmailVerification),
            "password_reset" => Ok(Self::PasswordReset),
            "login_code" => Ok(Self::LoginCode),
            _ => Err(sqlx::Error::Decode(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("invalid ephemeral_tokens.purpose value: {value}"),
            )))),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EmailVerification => "email_verification",
            Self::PasswordReset => "password_reset",
            Self::LoginCode => "login_code",
        }
    }
}

/// Full account row. The password hash never leaves this module's callers;
/// response types drop it on conversion.
#[derive(Debug, Clone)]
pub struct AccountRecord {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub phone: Option<String>,
    pub bio: Option<String>,
    pub photo: Option<String>,
    pub role: Role,
    pub verified: bool,
    pub trusted_agents: Vec<String>,
}

impl<'r> FromRow<'r, PgRow> for AccountRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let role: String = row.try_get("role")?;
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            phone: row.try_get("phone")?,
            bio: row.try_get("bio")?,
            photo: row.try_get("photo")?,
            role: Role::from_db(&role)?,
            verified: row.try_get("verified")?,
            trusted_agents: row.try_get("trusted_agents")?,
        })
    }
}

/// One pending secret for one account, tagged by purpose.
#[derive(Debug, Clone)]
pub struct TokenRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub purpose: TokenPurpose,
    pub payload: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for TokenRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let purpose: String = row.try_get("purpose")?;
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            purpose: TokenPurpose::from_db(&purpose)?,
            payload: row.try_get("payload")?,
            created_at: row.try_get("created_at")?,
            expires_at: row.try_get("expires_at")?,
        })
    }
}

/// Outcome when attempting to create a new account.
#[derive(Debug)]
pub(super) enum SignupOutcome {
    Created(AccountRecord),
    DuplicateEmail,
}

/// Outcome when redeeming a verification link.
#[derive(Debug)]
pub(super) enum VerifyOutcome {
    Verified,
    AlreadyVerified,
    Invalid,
}

const ACCOUNT_COLUMNS: &str = "id, name, email, password_hash, phone, bio, photo, \
                               role, verified, trusted_agents";

pub(crate) async fn find_account_by_email(
    pool: &PgPool,
    email: &str,
) -> Result<Option<AccountRecord>> {
    let query = format!("SELECT {ACCOUNT_COLUMNS} FROM users WHERE email = $1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    sqlx::query_as::<_, AccountRecord>(&query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup account by email")
}

pub(crate) async fn find_account_by_id(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Option<AccountRecord>> {
    let query = format!("SELECT {ACCOUNT_COLUMNS} FROM users WHERE id = $1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    sqlx::query_as::<_, AccountRecord>(&query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup account by id")
}

pub(super) async fn insert_account(
    pool: &PgPool,
    name: &str,
    email: &str,
    password_hash: &str,
) -> Result<SignupOutcome> {
    let query = format!(
        "INSERT INTO users (name, email, password_hash) VALUES ($1, $2, $3) \
         RETURNING {ACCOUNT_COLUMNS}"
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query.as_str()
    );
    let row = sqlx::query_as::<_, AccountRecord>(&query)
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .fetch_one(pool)
        .instrument(span)
        .await;

    match row {
        Ok(account) => Ok(SignupOutcome::Created(account)),
        Err(err) if is_unique_violation(&err) => Ok(SignupOutcome::DuplicateEmail),
        Err(err) => Err(err).context("failed to insert account"),
    }
}

pub(super) async fn update_password(
    pool: &PgPool,
    user_id: Uuid,
    password_hash: &str,
) -> Result<()> {
    let query = "UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(password_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update password")?;
    Ok(())
}

pub(super) async fn update_profile(
    pool: &PgPool,
    user_id: Uuid,
    name: Option<String>,
    phone: Option<String>,
    bio: Option<String>,
    photo: Option<String>,
) -> Result<Option<AccountRecord>> {
    let query = format!(
        "UPDATE users SET \
             name = COALESCE($2, name), \
             phone = COALESCE($3, phone), \
             bio = COALESCE($4, bio), \
             photo = COALESCE($5, photo), \
             updated_at = NOW() \
         WHERE id = $1 \
         RETURNING {ACCOUNT_COLUMNS}"
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query.as_str()
    );
    sqlx::query_as::<_, AccountRecord>(&query)
        .bind(user_id)
        .bind(name)
        .bind(phone)
        .bind(bio)
        .bind(photo)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to update profile")
}

pub(crate) async fn set_role(pool: &PgPool, user_id: Uuid, role: Role) -> Result<bool> {
    let query = "UPDATE users SET role = $2, updated_at = NOW() WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(user_id)
        .bind(role.as_str())
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update role")?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn delete_account(pool: &PgPool, user_id: Uuid) -> Result<bool> {
    // Token rows go with the account via ON DELETE CASCADE.
    let query = "DELETE FROM users WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete account")?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn list_accounts(pool: &PgPool) -> Result<Vec<AccountRecord>> {
    let query = format!("SELECT {ACCOUNT_COLUMNS} FROM users ORDER BY created_at DESC");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    sqlx::query_as::<_, AccountRecord>(&query)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list accounts")
}

/// Add a fingerprint to the account's trusted set.
///
/// The guard keeps the append idempotent when the same agent redeems twice.
pub(super) async fn trust_agent(pool: &PgPool, user_id: Uuid, fingerprint: &str) -> Result<()> {
    let query = "UPDATE users \
                 SET trusted_agents = array_append(trusted_agents, $2), updated_at = NOW() \
                 WHERE id = $1 AND NOT ($2 = ANY(trusted_agents))";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(fingerprint)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to trust agent")?;
    Ok(())
}

/// Persist a new ephemeral token, superseding any live one for the same
/// account and purpose. Delete and insert run in one transaction so the
/// one-live-token invariant holds.
pub(super) async fn issue_token(
    pool: &PgPool,
    user_id: Uuid,
    purpose: TokenPurpose,
    payload: &str,
    ttl_seconds: i64,
) -> Result<()> {
    let mut tx = pool.begin().await.context("begin issue-token transaction")?;

    let query = "DELETE FROM ephemeral_tokens WHERE user_id = $1 AND purpose = $2";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(purpose.as_str())
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to delete superseded token")?;

    let query = "INSERT INTO ephemeral_tokens (user_id, purpose, payload, expires_at) \
                 VALUES ($1, $2, $3, NOW() + ($4 * INTERVAL '1 second'))";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(purpose.as_str())
        .bind(payload)
        .bind(ttl_seconds)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to insert ephemeral token")?;

    tx.commit().await.context("commit issue-token transaction")?;
    Ok(())
}

/// Find the live token for (account, purpose). Expiry is evaluated here, at
/// read time; expired rows simply stop matching.
pub(super) async fn find_live_token(
    pool: &PgPool,
    user_id: Uuid,
    purpose: TokenPurpose,
) -> Result<Option<TokenRecord>> {
    let query = "SELECT id, user_id, purpose, payload, created_at, expires_at \
                 FROM ephemeral_tokens \
                 WHERE user_id = $1 AND purpose = $2 AND expires_at > NOW() \
                 LIMIT 1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    sqlx::query_as::<_, TokenRecord>(query)
        .bind(user_id)
        .bind(purpose.as_str())
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup live token")
}

/// Delete a redeemed token so the same secret cannot be redeemed twice.
pub(super) async fn consume_token(pool: &PgPool, token_id: Uuid) -> Result<()> {
    let query = "DELETE FROM ephemeral_tokens WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to consume token")?;
    Ok(())
}

/// Redeem a verification link by payload digest: flip `verified` once.
///
/// The token row is left behind on purpose. The verified flag is what makes
/// redemption idempotent, so a second redemption of the same link reports
/// "already verified" instead of a token miss; the row ages out lazily.
pub(super) async fn redeem_verification(pool: &PgPool, payload_hash: &str) -> Result<VerifyOutcome> {
    let mut tx = pool.begin().await.context("begin verify transaction")?;

    let query = "SELECT ephemeral_tokens.id, users.id AS user_id, users.verified \
                 FROM ephemeral_tokens \
                 JOIN users ON users.id = ephemeral_tokens.user_id \
                 WHERE ephemeral_tokens.purpose = 'email_verification' \
                   AND ephemeral_tokens.payload = $1 \
                   AND ephemeral_tokens.expires_at > NOW() \
                 LIMIT 1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(payload_hash)
        .fetch_optional(&mut *tx)
        .instrument(span)
        .await
        .context("failed to lookup verification token")?;

    let Some(row) = row else {
        let _ = tx.rollback().await;
        return Ok(VerifyOutcome::Invalid);
    };

    let verified: bool = row.get("verified");
    if verified {
        let _ = tx.rollback().await;
        return Ok(VerifyOutcome::AlreadyVerified);
    }

    let user_id: Uuid = row.get("user_id");

    let query = "UPDATE users SET verified = TRUE, updated_at = NOW() WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to mark account verified")?;

    tx.commit().await.context("commit verify transaction")?;
    Ok(VerifyOutcome::Verified)
}

/// Redeem a reset link by payload digest: set the new password hash and
/// consume the token. Returns false when no live token matches.
pub(super) async fn redeem_password_reset(
    pool: &PgPool,
    payload_hash: &str,
    new_password_hash: &str,
) -> Result<bool> {
    let mut tx = pool.begin().await.context("begin reset transaction")?;

    let query = "SELECT id, user_id \
                 FROM ephemeral_tokens \
                 WHERE purpose = 'password_reset' \
                   AND payload = $1 \
                   AND expires_at > NOW() \
                 LIMIT 1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(payload_hash)
        .fetch_optional(&mut *tx)
        .instrument(span)
        .await
        .context("failed to lookup reset token")?;

    let Some(row) = row else {
        let _ = tx.rollback().await;
        return Ok(false);
    };

    let token_id: Uuid = row.get("id");
    let user_id: Uuid = row.get("user_id");

    let query = "UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(new_password_hash)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to set reset password")?;

    let query = "DELETE FROM ephemeral_tokens WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to consume reset token")?;

    tx.commit().await.context("commit reset transaction")?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips() -> Result<(), sqlx::Error> {
        for role in [Role::Regular, Role::Author, Role::Admin, Role::Suspended] {
            assert_eq!(Role::from_db(role.as_str())?, role);
        }
        Ok(())
    }

    #[test]
    fn role_rejects_unknown() {
        assert!(Role::from_db("root").is_err());
        assert_eq!(Role::parse("root"), None);
    }

    #[test]
    fn role_parse_normalizes_input() {
        assert_eq!(Role::parse(" Admin "), Some(Role::Admin));
        assert_eq!(Role::parse("AUTHOR"), Some(Role::Author));
    }

    #[test]
    fn purpose_round_trips() -> Result<(), sqlx::Error> {
        for purpose in [
            TokenPurpose::EmailVerification,
            TokenPurpose::PasswordReset,
            TokenPurpose::LoginCode,
        ] {
            assert_eq!(TokenPurpose::from_db(purpose.as_str())?, purpose);
        }
        Ok(())
    }

    #[test]
    fn purpose_rejects_unknown() {
        assert!(TokenPurpose::from_db("magic_link").is_err());
    }

    #[derive(Debug)]
    struct TestDbError {
        code: Option<&'static str>,
    }

    impl std::fmt::Display for TestDbError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "test database error")
        }
    }

    impl std::error::Error for TestDbError {}

    impl sqlx::error::DatabaseError for TestDbError {
        fn message(&self) -> &'static str {
            "test database error"
        }

        fn code(&self) -> Option<std::borrow::Cow<'_, str>> {
            self.code.map(std::borrow::Cow::Borrowed)
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            sqlx::error::ErrorKind::UniqueViolation
        }
    }

    #[test]
    fn is_unique_violation_matches_sqlstate() {
        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("23505"),
        }));
        assert!(is_unique_violation(&err));

        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("99999"),
        }));
        assert!(!is_unique_violation(&err));

        let err = sqlx::Error::RowNotFound;
        assert!(!is_unique_violation(&err));
    }

    #[test]
    fn signup_outcome_debug_names() {
        assert_eq!(
            format!("{:?}", SignupOutcome::DuplicateEmail),
            "DuplicateEmail"
        );
    }

    #[test]
    fn verify_outcome_debug_names() {
        assert_eq!(format!("{:?}", VerifyOutcome::Verified), "Verified");
        assert_eq!(
            format!("{:?}", VerifyOutcome::AlreadyVerified),
            "AlreadyVerified"
        );
        assert_eq!(format!("{:?}", VerifyOutcome::Invalid), "Invalid");
    }
}
