//! # User Repository
//!
//! Data access for user accounts: lookup, shell-account creation, setup
//! completion, login bookkeeping and the admin-floor existence checks the
//! identity service builds on.
//!
//! ## Email Normalization
//!
//! `email_normalized` (lowercased, trimmed) is the uniqueness anchor and the
//! lookup key; the raw `email` column is kept for display. Both columns move
//! together through [`normalize_email`].

use shared::errors::ApiError;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::domain::{User, UserWithRoles};

/// Canonical form of an email address: trimmed and lowercased.
///
/// Used for every lookup and every write so the two columns can never drift.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Repository for user-account operations.
#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // LOOKUP
    // =========================================================================

    /// Finds a user by email (any casing).
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, ApiError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE email_normalized = $1",
        )
        .bind(normalize_email(email))
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Finds a user by id.
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, ApiError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Creates a shell user: no password yet, completed later through a
    /// single-use setup token.
    ///
    /// # Errors
    ///
    /// `ApiError::Conflict` when the normalized email is already registered.
    pub async fn create_shell_user(
        &self,
        email: &str,
        display_name: Option<&str>,
    ) -> Result<User, ApiError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, email_normalized, display_name)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(email.trim())
        .bind(normalize_email(email))
        .bind(display_name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                ApiError::Conflict { resource: "email already registered".to_string() }
            }
            _ => ApiError::DatabaseError(e),
        })?;

        Ok(user)
    }

    /// Completes the bootstrap claim: sets email, display name and password
    /// in one statement and marks the address verified.
    ///
    /// # Errors
    ///
    /// `ApiError::Conflict` when the chosen email is already taken.
    pub async fn update_profile_and_password(
        &self,
        user_id: Uuid,
        email: &str,
        display_name: Option<&str>,
        password_hash: &str,
    ) -> Result<User, ApiError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET email = $2,
                email_normalized = $3,
                display_name = $4,
                password_hash = $5,
                email_verified_at = NOW(),
                failed_login_count = 0,
                locked_until = NULL,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(email.trim())
        .bind(normalize_email(email))
        .bind(display_name)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                ApiError::Conflict { resource: "email already registered".to_string() }
            }
            _ => ApiError::DatabaseError(e),
        })?;

        Ok(user)
    }

    /// Sets a user's password after a setup/reset token was consumed.
    ///
    /// Also marks the email verified and clears the failed-login counters.
    pub async fn update_password(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), ApiError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $2,
                email_verified_at = COALESCE(email_verified_at, NOW()),
                failed_login_count = 0,
                locked_until = NULL,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound { resource: format!("user:{}", user_id) });
        }

        Ok(())
    }

    /// Records a successful login: resets the failure counter and stamps
    /// the login time and peer address.
    pub async fn record_login_success(
        &self,
        user_id: Uuid,
        ip: Option<&str>,
    ) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            UPDATE users
            SET failed_login_count = 0,
                last_login_at = NOW(),
                last_login_ip = $2,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(ip)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Records a failed password verification.
    pub async fn record_login_failure(&self, user_id: Uuid) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            UPDATE users
            SET failed_login_count = failed_login_count + 1,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Deletes a user; sessions, tokens and role links cascade. Audit rows
    /// survive with `user_id` nulled.
    pub async fn delete_by_id(&self, user_id: Uuid) -> Result<bool, ApiError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // LISTINGS & EXISTENCE CHECKS
    // =========================================================================

    /// Lists all users joined with their role names, newest first.
    pub async fn list_with_roles(&self) -> Result<Vec<UserWithRoles>, ApiError> {
        let rows = sqlx::query_as::<_, UserRolesRow>(
            r#"
            SELECT u.*,
                   ARRAY_AGG(r.name) FILTER (WHERE r.name IS NOT NULL) AS roles
            FROM users u
            LEFT JOIN user_roles ur ON ur.user_id = u.id
            LEFT JOIN roles r ON r.id = ur.role_id
            GROUP BY u.id
            ORDER BY u.created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| UserWithRoles {
                user: row.user,
                roles: {
                    let mut roles = row.roles.unwrap_or_default();
                    roles.sort_unstable();
                    roles
                },
            })
            .collect())
    }

    /// True when at least one user with a password holds the `admin` role.
    ///
    /// The platform invariant: this holds at all times, or the instance is
    /// in the bootstrap-pending state.
    pub async fn has_credentialed_admin(&self) -> Result<bool, ApiError> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM users u
                JOIN user_roles ur ON ur.user_id = u.id
                JOIN roles r ON r.id = ur.role_id
                WHERE r.name = 'admin' AND u.password_hash IS NOT NULL
            )
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    /// Like [`Self::has_credentialed_admin`] but ignoring one address
    /// (used by the prestart routine to discount the shell admin itself).
    pub async fn has_credentialed_admin_excluding_email(
        &self,
        email: &str,
    ) -> Result<bool, ApiError> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM users u
                JOIN user_roles ur ON ur.user_id = u.id
                JOIN roles r ON r.id = ur.role_id
                WHERE r.name = 'admin'
                  AND u.password_hash IS NOT NULL
                  AND u.email_normalized <> $1
            )
            "#,
        )
        .bind(normalize_email(email))
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }
}

/// Row shape for the users-with-roles listing.
#[derive(FromRow)]
struct UserRolesRow {
    #[sqlx(flatten)]
    user: User,
    roles: Option<Vec<String>>,
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email_lowercases_and_trims() {
        assert_eq!(normalize_email("  Admin@Example.COM  "), "admin@example.com");
        assert_eq!(normalize_email("a@a"), "a@a");
    }

    #[test]
    fn test_normalize_email_is_idempotent() {
        let once = normalize_email("User@Host.Tld");
        assert_eq!(normalize_email(&once), once);
    }
}
