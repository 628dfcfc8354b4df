//! Admin HTTP API.
//!
//! The JSON surface an operator dashboard drives: tenant activation, member
//! records, settings and schema edits, and card pushes. Every write lands in
//! the store that the dispatcher re-reads per event, so changes apply on the
//! next message.
//!
//! No authentication here — the API binds to loopback and trusts whatever is
//! in front of it (see `AdminApiConfig`).

use crate::config::{self, AdminApiConfig, TenantSettings, validate_fields};
use crate::dispatch::Dispatcher;
use crate::store::{Member, Store, Tenant};
use anyhow::{Context, Result};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Json, Router};
use axum::routing::{delete, get, post, put};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AdminState {
    pub store: Arc<Store>,
    pub dispatcher: Arc<Dispatcher>,
}

pub fn router(state: AdminState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/tenants", get(list_tenants))
        .route("/api/tenants/{id}", delete(delete_tenant))
        .route("/api/tenants/{id}/active", post(set_active))
        .route("/api/tenants/{id}/settings", get(get_settings).put(put_settings))
        .route("/api/tenants/{id}/fields", put(put_fields))
        .route("/api/tenants/{id}/members", get(list_members).post(upsert_member))
        .route("/api/tenants/{id}/members/{user_id}", delete(delete_member))
        .route("/api/tenants/{id}/push", post(push_member))
        .with_state(state)
}

/// Bind and serve until the process exits.
pub async fn serve(config: &AdminApiConfig, state: AdminState) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Admin API failed to bind {addr}"))?;
    info!("Admin API listening on {addr}");
    axum::serve(listener, router(state))
        .await
        .context("Admin API server error")
}

type ApiError = (StatusCode, Json<Value>);
type ApiResult = std::result::Result<Json<Value>, ApiError>;

fn err(status: StatusCode, message: impl std::fmt::Display) -> ApiError {
    (status, Json(json!({ "error": message.to_string() })))
}

fn internal(e: anyhow::Error) -> ApiError {
    warn!("Admin API internal error: {e:#}");
    err(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
}

fn require_tenant(store: &Store, id: i64) -> std::result::Result<Tenant, ApiError> {
    store
        .tenant_by_id(id)
        .map_err(internal)?
        .ok_or_else(|| err(StatusCode::NOT_FOUND, format!("no tenant {id}")))
}

fn tenant_json(tenant: &Tenant) -> Value {
    json!({
        "id": tenant.id,
        "chatId": tenant.chat_id,
        "title": tenant.title,
        "active": tenant.active,
        "createdAt": tenant.created_at.to_rfc3339(),
        "updatedAt": tenant.updated_at.to_rfc3339(),
    })
}

fn member_json(member: &Member) -> Value {
    json!({
        "userId": member.user_id,
        "profile": Value::Object(member.profile_map()),
        "expiresAt": member.expires_at.map(|at| at.to_rfc3339()),
        "muted": member.muted,
        "online": member.online,
        "lastCheckin": member.last_checkin.map(|at| at.to_rfc3339()),
    })
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": crate::VERSION }))
}

async fn list_tenants(State(state): State<AdminState>) -> ApiResult {
    let tenants = state.store.list_tenants().map_err(internal)?;
    Ok(Json(Value::Array(tenants.iter().map(tenant_json).collect())))
}

async fn delete_tenant(State(state): State<AdminState>, Path(id): Path<i64>) -> ApiResult {
    if !state.store.delete_tenant(id).map_err(internal)? {
        return Err(err(StatusCode::NOT_FOUND, format!("no tenant {id}")));
    }
    info!("Admin deleted tenant {id}");
    Ok(Json(json!({ "deleted": true })))
}

#[derive(Deserialize)]
struct ActiveBody {
    active: bool,
}

async fn set_active(
    State(state): State<AdminState>,
    Path(id): Path<i64>,
    Json(body): Json<ActiveBody>,
) -> ApiResult {
    if !state.store.set_tenant_active(id, body.active).map_err(internal)? {
        return Err(err(StatusCode::NOT_FOUND, format!("no tenant {id}")));
    }
    info!("Admin set tenant {id} active={}", body.active);
    let tenant = require_tenant(&state.store, id)?;
    Ok(Json(tenant_json(&tenant)))
}

/// Returns both the effective configuration (defaults merged with the
/// override) and the sparse override itself, so an editor can show which
/// keys the tenant has customized.
async fn get_settings(State(state): State<AdminState>, Path(id): Path<i64>) -> ApiResult {
    let tenant = require_tenant(&state.store, id)?;
    let effective = TenantSettings::resolve(tenant.settings.as_deref());
    let overrides = tenant
        .settings
        .as_deref()
        .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
        .unwrap_or_else(|| json!({}));
    Ok(Json(json!({
        "effective": serde_json::to_value(&effective).map_err(|e| internal(e.into()))?,
        "overrides": overrides,
        "fields": config::parse_fields(tenant.fields.as_deref()),
    })))
}

/// Sparse patch: present keys overwrite, explicit nulls revert the key to its
/// default, absent keys stay untouched.
async fn put_settings(
    State(state): State<AdminState>,
    Path(id): Path<i64>,
    Json(patch): Json<serde_json::Map<String, Value>>,
) -> ApiResult {
    let tenant = require_tenant(&state.store, id)?;
    let blob = config::merge_override(tenant.settings.as_deref(), &patch);
    state.store.set_tenant_settings(id, &blob).map_err(internal)?;
    info!("Admin updated settings for tenant {id} ({} keys)", patch.len());
    let effective = TenantSettings::resolve(Some(&blob));
    Ok(Json(
        serde_json::to_value(&effective).map_err(|e| internal(e.into()))?,
    ))
}

async fn put_fields(
    State(state): State<AdminState>,
    Path(id): Path<i64>,
    Json(fields): Json<Vec<config::FieldDefinition>>,
) -> ApiResult {
    require_tenant(&state.store, id)?;
    validate_fields(&fields).map_err(|e| err(StatusCode::UNPROCESSABLE_ENTITY, e))?;
    let blob = serde_json::to_string(&fields).map_err(|e| internal(e.into()))?;
    state.store.set_tenant_fields(id, &blob).map_err(internal)?;
    info!("Admin updated field schema for tenant {id}");
    Ok(Json(json!({ "fields": fields })))
}

#[derive(Deserialize)]
struct ListMembersQuery {
    q: Option<String>,
}

async fn list_members(
    State(state): State<AdminState>,
    Path(id): Path<i64>,
    Query(query): Query<ListMembersQuery>,
) -> ApiResult {
    require_tenant(&state.store, id)?;
    let members = state
        .store
        .list_members(id, query.q.as_deref())
        .map_err(internal)?;
    Ok(Json(Value::Array(members.iter().map(|m| member_json(m)).collect())))
}

#[derive(Deserialize)]
struct UpsertMemberBody {
    #[serde(rename = "userId")]
    user_id: String,
    #[serde(default)]
    profile: serde_json::Map<String, Value>,
    /// Days to add to the expiry, from max(now, current expiry). Negative
    /// values shorten; 0 leaves the expiry alone.
    #[serde(default, rename = "extendDays")]
    extend_days: i64,
}

async fn upsert_member(
    State(state): State<AdminState>,
    Path(id): Path<i64>,
    Json(body): Json<UpsertMemberBody>,
) -> ApiResult {
    require_tenant(&state.store, id)?;
    let member = state
        .store
        .upsert_member(id, &body.user_id, &body.profile, body.extend_days, chrono::Utc::now())
        .map_err(internal)?;
    info!("Admin upserted member {} in tenant {id}", body.user_id);
    Ok(Json(member_json(&member)))
}

async fn delete_member(
    State(state): State<AdminState>,
    Path((id, user_id)): Path<(i64, String)>,
) -> ApiResult {
    require_tenant(&state.store, id)?;
    if !state.store.delete_member(id, &user_id).map_err(internal)? {
        return Err(err(StatusCode::NOT_FOUND, format!("no member {user_id}")));
    }
    Ok(Json(json!({ "deleted": true })))
}

#[derive(Deserialize)]
struct PushBody {
    #[serde(rename = "userId")]
    user_id: String,
}

async fn push_member(
    State(state): State<AdminState>,
    Path(id): Path<i64>,
    Json(body): Json<PushBody>,
) -> ApiResult {
    let tenant = require_tenant(&state.store, id)?;
    let user_id = body.user_id;
    let member = state
        .store
        .member(id, &user_id)
        .map_err(internal)?
        .ok_or_else(|| err(StatusCode::NOT_FOUND, format!("no member {user_id}")))?;
    let message_id = state
        .dispatcher
        .push_member(&tenant, &member)
        .await
        .map_err(|e| err(StatusCode::BAD_GATEWAY, format!("{e:#}")))?;
    Ok(Json(json!({ "messageId": message_id })))
}
