//! # Request Handlers
//!
//! HTTP request handlers that bridge the API layer with the service layer.
//! Each handler follows this pattern:
//!
//! 1. **Extract** request data (and the caller's [`Identity`] where needed)
//! 2. **Validate** input using the `validator` crate
//! 3. **Authorize** via permission set membership
//! 4. **Call** service layer methods
//! 5. **Transform** and return the HTTP response
//!
//! All handlers return `Result<HttpResponse, ApiError>`; the error type
//! converts itself to the right status code via `ResponseError`.
//!
//! ## Authorization Matrix
//!
//! | Route | Check |
//! |-------|-------|
//! | `/auth/users*`, `/auth/roles*`, `/auth/permissions` | `admin` role |
//! | `GET /nodes` | `nodes:read` or any `node:read:<id>` (filtered subset) |
//! | `GET /nodes/{id}/metrics` | `nodes:read` or `node:read:<id>` |
//! | `POST /nodes/create` | `nodes:create` |
//! | `DELETE`/`PATCH /nodes/{id}` | `nodes:delete` or `node:write:<id>` |
//!
//! Node handlers look the node up before checking the per-node grant, so an
//! authenticated caller sees 404 for a missing node and 403 for a
//! permission failure.

use actix_web::{web, HttpRequest, HttpResponse};
use actix_ws::Message;
use shared::{database, errors::ApiError, validation};
use tracing::warn;
use uuid::Uuid;

use crate::service::{perm, roster};
use crate::AppState;

use super::dto::{
    BootstrapClaimRequest, BootstrapStatusResponse, BrokerCredentialsDto, CreateNodeRequest,
    CreateNodeResponse, CreateRoleRequest, CreateUserRequest, CreatedUserResponse,
    ExchangeRequest, ExchangeResponse, HealthResponse, LoginRequest, LoginResponse, MetricDto,
    MetricsQuery, NodeDto, NodeMetricsResponse, OkResponse, PermissionDto,
    ReplacePermissionsRequest, ReplaceRolesRequest, RoleDto, SetPasswordRequest, UserDto,
};
use super::extractors::{bearer_from_request, Identity};

// =============================================================================
// HEALTH
// =============================================================================

/// `GET /health` - process liveness, no dependencies touched.
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse { ok: true, version: Some(env!("CARGO_PKG_VERSION")) })
}

/// `GET /db/health` - database reachability probe.
pub async fn db_health(state: web::Data<AppState>) -> HttpResponse {
    match database::health_check(&state.db).await {
        Ok(()) => HttpResponse::Ok().json(OkResponse::ok()),
        Err(e) => {
            warn!(error = %e, "database health check failed");
            HttpResponse::InternalServerError().json(serde_json::json!({ "ok": false }))
        }
    }
}

// =============================================================================
// BOOTSTRAP
// =============================================================================

/// `GET /auth/bootstrap/status`
pub async fn bootstrap_status(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let needs_bootstrap = state.identity.needs_bootstrap().await?;

    Ok(HttpResponse::Ok().json(BootstrapStatusResponse { needs_bootstrap }))
}

/// `POST /auth/bootstrap/claim` - one-time conversion of the shell admin
/// into a credentialed admin, using the token from the startup log.
pub async fn bootstrap_claim(
    state: web::Data<AppState>,
    body: web::Json<BootstrapClaimRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    state
        .identity
        .claim_bootstrap(&body.token, &body.email, &body.password, body.display_name.as_deref())
        .await?;

    Ok(HttpResponse::Ok().json(OkResponse::ok()))
}

// =============================================================================
// AUTHENTICATION
// =============================================================================

/// `POST /auth/login`
///
/// Failures are opaque (`INVALID_CREDENTIALS`) whether the account is
/// missing, still a shell, or the password was wrong.
pub async fn login(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    let ip = req.connection_info().peer_addr().map(String::from);
    let user_agent = req
        .headers()
        .get("User-Agent")
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let outcome = state.identity.login(&body.email, &body.password, ip, user_agent).await?;

    Ok(HttpResponse::Ok().json(LoginResponse {
        token: outcome.bearer,
        expires_at: outcome.expires_at,
        user: UserDto::from_user(outcome.user, outcome.roles, Some(outcome.permissions)),
    }))
}

/// `GET /auth/me` - the caller's snapshot including the sorted union of
/// permission codes inherited through their roles.
pub async fn me(identity: Identity) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(UserDto::from(identity.session)))
}

/// `POST /auth/logout` - revokes the presented session. Idempotent.
pub async fn logout(
    req: HttpRequest,
    state: web::Data<AppState>,
    identity: Identity,
) -> Result<HttpResponse, ApiError> {
    let bearer = bearer_from_request(&req)?;
    state.identity.logout(&bearer, identity.user().id).await?;

    Ok(HttpResponse::Ok().json(OkResponse::ok()))
}

// =============================================================================
// USER ADMINISTRATION (admin role)
// =============================================================================

/// `POST /auth/users` - invites a shell user; the setup token plaintext is
/// in this response and nowhere else, ever.
pub async fn create_user(
    state: web::Data<AppState>,
    identity: Identity,
    body: web::Json<CreateUserRequest>,
) -> Result<HttpResponse, ApiError> {
    identity.require_admin()?;

    let body = body.into_inner();
    validation::validate_request(&body)?;

    let created = state.identity.create_user(&body.email, body.display_name.as_deref()).await?;

    Ok(HttpResponse::Created().json(CreatedUserResponse {
        id: created.user.id.to_string(),
        email: created.user.email,
        setup_token: created.setup_token,
        setup_token_expires_at: created.setup_token_expires_at,
    }))
}

/// `GET /auth/users`
pub async fn list_users(
    state: web::Data<AppState>,
    identity: Identity,
) -> Result<HttpResponse, ApiError> {
    identity.require_admin()?;

    let users: Vec<UserDto> =
        state.identity.list_users().await?.into_iter().map(UserDto::from).collect();

    Ok(HttpResponse::Ok().json(users))
}

/// `POST /auth/users/{userId}/roles` - set-equality role replacement,
/// guarded by the admin floor.
pub async fn replace_user_roles(
    state: web::Data<AppState>,
    identity: Identity,
    path: web::Path<Uuid>,
    body: web::Json<ReplaceRolesRequest>,
) -> Result<HttpResponse, ApiError> {
    identity.require_admin()?;

    let body = body.into_inner();
    validation::validate_request(&body)?;

    let updated = state.identity.replace_user_roles(path.into_inner(), &body.role_names).await?;

    Ok(HttpResponse::Ok().json(UserDto::from(updated)))
}

// =============================================================================
// ROLE / PERMISSION ADMINISTRATION (admin role)
// =============================================================================

/// `GET /auth/roles`
pub async fn list_roles(
    state: web::Data<AppState>,
    identity: Identity,
) -> Result<HttpResponse, ApiError> {
    identity.require_admin()?;

    let roles: Vec<RoleDto> =
        state.identity.list_roles().await?.into_iter().map(RoleDto::from).collect();

    Ok(HttpResponse::Ok().json(roles))
}

/// `POST /auth/roles`
pub async fn create_role(
    state: web::Data<AppState>,
    identity: Identity,
    body: web::Json<CreateRoleRequest>,
) -> Result<HttpResponse, ApiError> {
    identity.require_admin()?;

    let body = body.into_inner();
    validation::validate_request(&body)?;

    let role = state
        .identity
        .create_role(&body.name, body.description.as_deref(), &body.permission_codes)
        .await?;

    Ok(HttpResponse::Created().json(RoleDto::from(role)))
}

/// `POST /auth/roles/{roleName}/permissions` - set-equality permission
/// replacement; unknown codes fail unless they are dynamic node grants.
pub async fn replace_role_permissions(
    state: web::Data<AppState>,
    identity: Identity,
    path: web::Path<String>,
    body: web::Json<ReplacePermissionsRequest>,
) -> Result<HttpResponse, ApiError> {
    identity.require_admin()?;

    let body = body.into_inner();
    validation::validate_request(&body)?;

    let role = state
        .identity
        .replace_role_permissions(&path.into_inner(), &body.permission_codes)
        .await?;

    Ok(HttpResponse::Ok().json(RoleDto::from(role)))
}

/// `GET /auth/permissions`
pub async fn list_permissions(
    state: web::Data<AppState>,
    identity: Identity,
) -> Result<HttpResponse, ApiError> {
    identity.require_admin()?;

    let permissions: Vec<PermissionDto> =
        state.identity.list_permissions().await?.into_iter().map(PermissionDto::from).collect();

    Ok(HttpResponse::Ok().json(permissions))
}

/// `POST /auth/set-password` - completes an invite or reset. The token is
/// consumed on success; replays fail with 401.
pub async fn set_password(
    state: web::Data<AppState>,
    body: web::Json<SetPasswordRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    state.identity.set_password(&body.token, &body.password).await?;

    Ok(HttpResponse::Ok().json(OkResponse::ok()))
}

// =============================================================================
// NODES
// =============================================================================

/// `GET /nodes` - the roster. Callers without the broad `nodes:read` grant
/// see only the nodes they hold a per-node read grant for.
pub async fn list_nodes(
    state: web::Data<AppState>,
    identity: Identity,
) -> Result<HttpResponse, ApiError> {
    if !identity.can_read_any_node() {
        return Err(ApiError::InsufficientPermissions);
    }

    let stats = state.nodes.list_with_stats().await?;

    let readable: Vec<roster::NodeSnapshot> = stats
        .into_iter()
        .filter(|s| identity.can_read_node(s.node.id))
        .map(roster::NodeSnapshot::from)
        .collect();

    Ok(HttpResponse::Ok().json(readable))
}

/// `GET /nodes/{nodeId}/metrics?limit=60` - recent samples, oldest first,
/// limit clamped to [1, 300].
pub async fn node_metrics(
    state: web::Data<AppState>,
    identity: Identity,
    path: web::Path<Uuid>,
    query: web::Query<MetricsQuery>,
) -> Result<HttpResponse, ApiError> {
    let node_id = path.into_inner();

    state
        .nodes
        .find_by_id(node_id)
        .await?
        .ok_or_else(|| ApiError::NotFound { resource: format!("node:{}", node_id) })?;

    if !identity.can_read_node(node_id) {
        return Err(ApiError::InsufficientPermissions);
    }

    let limit = query.limit.unwrap_or(60);
    let metrics: Vec<MetricDto> = state
        .nodes
        .list_recent_metrics(node_id, limit)
        .await?
        .into_iter()
        .map(MetricDto::from)
        .collect();

    Ok(HttpResponse::Ok().json(NodeMetricsResponse { node_id: node_id.to_string(), metrics }))
}

/// `POST /nodes/create` - registers a node. The node bearer plaintext and a
/// ready-to-paste env file are in this response and nowhere else, ever.
pub async fn create_node(
    req: HttpRequest,
    state: web::Data<AppState>,
    identity: Identity,
    body: web::Json<CreateNodeRequest>,
) -> Result<HttpResponse, ApiError> {
    identity.require(perm::NODES_CREATE)?;

    let body = body.into_inner();
    validation::validate_request(&body)?;

    let (node, token) = state.node_auth.create_node(body.name.as_deref()).await?;
    state.roster.changed();

    let conn = req.connection_info();
    let api_base = format!("{}://{}", conn.scheme(), conn.host());
    let env_file =
        format!("NODE_ID={}\nNODE_TOKEN={}\nAPI_BASE_URL={}\n", node.id, token, api_base);

    Ok(HttpResponse::Created().json(CreateNodeResponse {
        id: node.id.to_string(),
        name: node.name,
        created_at: node.created_at,
        token,
        env_file,
    }))
}

/// `DELETE /nodes/{nodeId}` - cascades metrics and inventory. 404 before
/// 403: the caller is authenticated, existence is not a secret.
pub async fn delete_node(
    state: web::Data<AppState>,
    identity: Identity,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let node_id = path.into_inner();

    state
        .nodes
        .find_by_id(node_id)
        .await?
        .ok_or_else(|| ApiError::NotFound { resource: format!("node:{}", node_id) })?;

    if !identity.can_delete_node(node_id) {
        return Err(ApiError::InsufficientPermissions);
    }

    state.nodes.delete_by_id(node_id).await?;
    state.roster.changed();

    Ok(HttpResponse::NoContent().finish())
}

/// `PATCH /nodes/{nodeId}` - rename (null clears). Same guard as DELETE.
pub async fn rename_node(
    state: web::Data<AppState>,
    identity: Identity,
    path: web::Path<Uuid>,
    body: web::Json<super::dto::UpdateNodeRequest>,
) -> Result<HttpResponse, ApiError> {
    let node_id = path.into_inner();

    state
        .nodes
        .find_by_id(node_id)
        .await?
        .ok_or_else(|| ApiError::NotFound { resource: format!("node:{}", node_id) })?;

    if !identity.can_delete_node(node_id) {
        return Err(ApiError::InsufficientPermissions);
    }

    let node = state
        .nodes
        .update_name(node_id, body.into_inner().name.as_deref())
        .await?
        .ok_or_else(|| ApiError::NotFound { resource: format!("node:{}", node_id) })?;

    state.roster.changed();

    Ok(HttpResponse::Ok().json(NodeDto::from(node)))
}

/// `POST /nodes/auth/exchange` - unauthenticated agent endpoint trading the
/// node bearer for broker coordinates. Every failure is a plain 401.
pub async fn exchange_node_token(
    state: web::Data<AppState>,
    body: web::Json<ExchangeRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    // A malformed id can't match any node; same opaque failure
    let node_id = Uuid::parse_str(&body.node_id).map_err(|_| ApiError::InvalidToken)?;

    let credentials = state.node_auth.exchange(node_id, &body.node_token).await?;

    Ok(HttpResponse::Ok().json(ExchangeResponse { mqtt: BrokerCredentialsDto::from(credentials) }))
}

// =============================================================================
// DASHBOARD WEBSOCKET
// =============================================================================

/// `GET /ws/nodes` - server-to-client snapshot stream.
///
/// One snapshot immediately on accept, then coalesced snapshots whenever
/// ingest commits a change. The client stream is driven only to answer
/// pings and observe the close event; client frames are never interpreted.
pub async fn ws_nodes(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, actix_web::Error> {
    let (response, mut session, mut msg_stream) = actix_ws::handle(&req, stream)?;
    let state = state.into_inner();

    actix_rt::spawn(async move {
        match roster::build_snapshot_frame(&state.nodes).await {
            Ok(frame) => {
                if session.text(frame).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                // Keep the socket; the first coalesced broadcast catches it up
                warn!(error = %e, "initial roster snapshot failed");
            }
        }

        let socket_id = state.roster.subscribe(session.clone());

        while let Some(Ok(msg)) = msg_stream.recv().await {
            match msg {
                Message::Ping(bytes) => {
                    if session.pong(&bytes).await.is_err() {
                        break;
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }

        state.roster.unsubscribe(socket_id);
        let _ = session.close(None).await;
    });

    Ok(response)
}
