//! # Role & Permission Repository
//!
//! Data access for the authorization model. Both `ensure_*` operations are
//! idempotent upserts so seeding and lazy provisioning of dynamic per-node
//! codes can run unconditionally.

use shared::errors::ApiError;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::domain::{Permission, Role, RoleWithPermissions};

/// Repository for role and permission operations.
#[derive(Debug, Clone)]
pub struct RoleRepository {
    pool: PgPool,
}

impl RoleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // ROLES
    // =========================================================================

    /// Creates a role if missing, returns it either way.
    pub async fn ensure_role(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<Role, ApiError> {
        let role = sqlx::query_as::<_, Role>(
            r#"
            INSERT INTO roles (name, description)
            VALUES ($1, $2)
            ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
            RETURNING *
            "#,
        )
        .bind(name)
        .bind(description)
        .fetch_one(&self.pool)
        .await?;

        Ok(role)
    }

    /// Finds a role by its unique name.
    pub async fn find_by_name(&self, name: &str) -> Result<Option<Role>, ApiError> {
        let role = sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(role)
    }

    /// Resolves a batch of role names. The caller is responsible for
    /// noticing missing names (result may be shorter than the input).
    pub async fn find_roles_by_names(&self, names: &[String]) -> Result<Vec<Role>, ApiError> {
        let roles = sqlx::query_as::<_, Role>(
            "SELECT * FROM roles WHERE name = ANY($1) ORDER BY name",
        )
        .bind(names)
        .fetch_all(&self.pool)
        .await?;

        Ok(roles)
    }

    /// Grants a role to a user. Idempotent.
    pub async fn assign_role(&self, user_id: Uuid, role_id: Uuid) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            INSERT INTO user_roles (user_id, role_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(role_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Replaces a user's role set with exactly `role_ids` (set-equality
    /// semantics), in one transaction.
    ///
    /// # Errors
    ///
    /// `ApiError::BadRequest` when the new set is empty: once roles exist a
    /// user must always hold at least one.
    pub async fn replace_user_roles(
        &self,
        user_id: Uuid,
        role_ids: &[Uuid],
    ) -> Result<(), ApiError> {
        if role_ids.is_empty() {
            return Err(ApiError::BadRequest {
                message: "a user must keep at least one role".to_string(),
            });
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        for role_id in role_ids {
            sqlx::query(
                r#"
                INSERT INTO user_roles (user_id, role_id)
                VALUES ($1, $2)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(user_id)
            .bind(role_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(())
    }

    /// Role names held by a user, sorted.
    pub async fn user_role_names(&self, user_id: Uuid) -> Result<Vec<String>, ApiError> {
        let names: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT r.name
            FROM user_roles ur
            JOIN roles r ON r.id = ur.role_id
            WHERE ur.user_id = $1
            ORDER BY r.name
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(names)
    }

    /// Union of permission codes across all of a user's roles, sorted.
    pub async fn user_permission_codes(&self, user_id: Uuid) -> Result<Vec<String>, ApiError> {
        let codes: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT p.code
            FROM user_roles ur
            JOIN role_permissions rp ON rp.role_id = ur.role_id
            JOIN permissions p ON p.id = rp.permission_id
            WHERE ur.user_id = $1
            ORDER BY p.code
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(codes)
    }

    /// Lists all roles with their permission codes and member counts.
    pub async fn list_roles_with_permissions(
        &self,
    ) -> Result<Vec<RoleWithPermissions>, ApiError> {
        let rows = sqlx::query_as::<_, RolePermissionsRow>(
            r#"
            SELECT r.id, r.name, r.description,
                   ARRAY_AGG(DISTINCT p.code) FILTER (WHERE p.code IS NOT NULL) AS permissions,
                   COUNT(DISTINCT ur.user_id) AS users_count
            FROM roles r
            LEFT JOIN role_permissions rp ON rp.role_id = r.id
            LEFT JOIN permissions p ON p.id = rp.permission_id
            LEFT JOIN user_roles ur ON ur.role_id = r.id
            GROUP BY r.id
            ORDER BY r.name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| RoleWithPermissions {
                role: Role { id: row.id, name: row.name, description: row.description },
                permissions: row.permissions.unwrap_or_default(),
                users_count: row.users_count,
            })
            .collect())
    }

    // =========================================================================
    // PERMISSIONS
    // =========================================================================

    /// Creates a permission code if missing, returns it either way. Also the
    /// lazy provisioning path for dynamic `node:read:<id>` / `node:write:<id>`
    /// codes on first reference.
    pub async fn ensure_permission(
        &self,
        code: &str,
        description: Option<&str>,
    ) -> Result<Permission, ApiError> {
        let permission = sqlx::query_as::<_, Permission>(
            r#"
            INSERT INTO permissions (code, description)
            VALUES ($1, $2)
            ON CONFLICT (code) DO UPDATE SET code = EXCLUDED.code
            RETURNING *
            "#,
        )
        .bind(code)
        .bind(description)
        .fetch_one(&self.pool)
        .await?;

        Ok(permission)
    }

    /// Lists all permission codes.
    pub async fn list_permissions(&self) -> Result<Vec<Permission>, ApiError> {
        let permissions =
            sqlx::query_as::<_, Permission>("SELECT * FROM permissions ORDER BY code")
                .fetch_all(&self.pool)
                .await?;

        Ok(permissions)
    }

    /// Resolves a batch of permission codes (result may be shorter than the
    /// input when codes are unknown).
    pub async fn find_permissions_by_codes(
        &self,
        codes: &[String],
    ) -> Result<Vec<Permission>, ApiError> {
        let permissions = sqlx::query_as::<_, Permission>(
            "SELECT * FROM permissions WHERE code = ANY($1) ORDER BY code",
        )
        .bind(codes)
        .fetch_all(&self.pool)
        .await?;

        Ok(permissions)
    }

    /// Replaces a role's permission set with exactly `permission_ids`, in
    /// one transaction.
    pub async fn replace_role_permissions(
        &self,
        role_id: Uuid,
        permission_ids: &[Uuid],
    ) -> Result<(), ApiError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
            .bind(role_id)
            .execute(&mut *tx)
            .await?;

        for permission_id in permission_ids {
            sqlx::query(
                r#"
                INSERT INTO role_permissions (role_id, permission_id)
                VALUES ($1, $2)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(role_id)
            .bind(permission_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(())
    }

    /// Grants a permission to a role. Idempotent; used by seeding.
    pub async fn grant_permission(
        &self,
        role_id: Uuid,
        permission_id: Uuid,
    ) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            INSERT INTO role_permissions (role_id, permission_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(role_id)
        .bind(permission_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Row shape for the roles-with-permissions listing.
#[derive(FromRow)]
struct RolePermissionsRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    permissions: Option<Vec<String>>,
    users_count: i64,
}
