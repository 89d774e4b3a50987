//! Owner-scoped computer routes.
//!
//! Every route requires a bearer token. A computer that does not exist and a computer owned by
//! someone else produce the same empty 403, so callers cannot probe for other owners' ids.

use crate::api::extractors::{AcceptsJson, COMPUTERS_PATH, JsonObject, RequestOrigin};
use crate::api::models::computers::{ComputerCreate, ComputerResponse, ComputerUpdate};
use crate::api::models::pagination::{ListQuery, ListResponse};
use crate::auth::current_subject::AuthenticatedSubject;
use crate::db::errors::StoreError;
use crate::db::handlers::{Computers, Peripherals, Repository, computers::ComputerFilter};
use crate::db::models::computers::{ComputerDBResponse, ComputerUpdateDBRequest};
use crate::errors::{Error, Result};
use crate::relationships::RelationshipManager;
use crate::types::{ComputerId, Operation, RequestContext, parse_id};
use crate::{AppState, db::store::EntityStore};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

fn forbidden(operation: Operation, raw_id: &str) -> Error {
    Error::Forbidden {
        operation,
        resource: format!("computer {raw_id}"),
    }
}

/// Attach the `peripherals` array to a computer
async fn computer_response(store: &dyn EntityStore, computer: ComputerDBResponse, origin: &RequestOrigin) -> Result<ComputerResponse> {
    let peripherals = Peripherals::new(store).list_by_computer(computer.id).await?;
    Ok(ComputerResponse::new(computer, &peripherals, origin))
}

/// Look up a computer visible to the caller, treating absent and foreign alike
async fn owned_computer(
    store: &dyn EntityStore,
    raw_id: &str,
    subject: &AuthenticatedSubject,
    operation: Operation,
) -> Result<ComputerDBResponse> {
    let id: ComputerId = parse_id(raw_id).ok_or_else(|| forbidden(operation, raw_id))?;
    match Computers::new(store).get_by_id(id).await? {
        Some(computer) if computer.is_owned_by(&subject.0) => Ok(computer),
        _ => Err(forbidden(operation, raw_id)),
    }
}

/// Apply an owner-scoped update and render the result
async fn update_owned(
    state: &AppState,
    raw_id: &str,
    request: ComputerUpdateDBRequest,
    origin: &RequestOrigin,
) -> Result<Json<ComputerResponse>> {
    let id = parse_id(raw_id).ok_or_else(|| forbidden(Operation::Update, raw_id))?;
    let store = state.store.as_ref();
    let computer = match Computers::new(store).update(id, &request).await {
        Ok(computer) => computer,
        Err(StoreError::NotFound) => return Err(forbidden(Operation::Update, raw_id)),
        Err(e) => return Err(e.into()),
    };
    Ok(Json(computer_response(store, computer, origin).await?))
}

#[utoipa::path(
    get,
    path = "/computers",
    tag = "computers",
    summary = "List computers",
    description = "Lists the caller's computers, five per page. Follow `next` to fetch the following page.",
    params(ListQuery),
    responses(
        (status = 200, description = "One page of the caller's computers", body = ListResponse<ComputerResponse>),
        (status = 400, description = "Cursor not recognised"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 406, description = "Client does not accept JSON"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(correlation_id = %ctx.correlation_id))]
pub async fn list_computers(
    State(state): State<AppState>,
    subject: AuthenticatedSubject,
    _: AcceptsJson,
    origin: RequestOrigin,
    ctx: RequestContext,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse<ComputerResponse>>> {
    let store = state.store.as_ref();
    let repo = Computers::new(store);
    let owner = subject.0;

    let page = repo.list(&ComputerFilter::new(Some(owner.clone()), query.cursor())).await?;
    let count = repo.count(Some(&owner)).await?;

    let mut items = Vec::with_capacity(page.items.len());
    for computer in page.items {
        items.push(computer_response(store, computer, &origin).await?);
    }
    let next = page.next.map(|cursor| origin.next_page_url(COMPUTERS_PATH, cursor.as_str()));

    Ok(Json(ListResponse::new(items, count, next)))
}

#[utoipa::path(
    get,
    path = "/computers/{computer_id}",
    tag = "computers",
    summary = "Get computer",
    params(("computer_id" = String, Path, description = "Computer ID")),
    responses(
        (status = 200, description = "The computer and its attached peripherals", body = ComputerResponse),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "No such computer, or it belongs to someone else"),
        (status = 406, description = "Client does not accept JSON"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(correlation_id = %ctx.correlation_id, computer_id = %computer_id))]
pub async fn get_computer(
    State(state): State<AppState>,
    subject: AuthenticatedSubject,
    _: AcceptsJson,
    origin: RequestOrigin,
    ctx: RequestContext,
    Path(computer_id): Path<String>,
) -> Result<Json<ComputerResponse>> {
    let store = state.store.as_ref();
    let computer = owned_computer(store, &computer_id, &subject, Operation::Read).await?;
    Ok(Json(computer_response(store, computer, &origin).await?))
}

#[utoipa::path(
    post,
    path = "/computers",
    tag = "computers",
    summary = "Create computer",
    description = "Creates a computer owned by the caller. It starts with no peripherals.",
    request_body = ComputerCreate,
    responses(
        (status = 201, description = "Computer created", body = ComputerResponse),
        (status = 400, description = "Missing attribute, or `id`/`self` supplied"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 406, description = "Client does not accept JSON"),
        (status = 415, description = "Body is not declared as application/json"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(correlation_id = %ctx.correlation_id))]
pub async fn create_computer(
    State(state): State<AppState>,
    subject: AuthenticatedSubject,
    origin: RequestOrigin,
    ctx: RequestContext,
    JsonObject(body): JsonObject,
) -> Result<(StatusCode, Json<ComputerResponse>)> {
    let create = ComputerCreate::from_create_body(&body)?;
    let computer = Computers::new(state.store.as_ref()).create(&create.into_db_request(subject.0)).await?;

    // A new computer cannot have anything attached yet
    Ok((StatusCode::CREATED, Json(ComputerResponse::new(computer, &[], &origin))))
}

#[utoipa::path(
    patch,
    path = "/computers/{computer_id}",
    tag = "computers",
    summary = "Update computer",
    description = "Changes the supplied attributes and keeps the rest.",
    request_body = ComputerUpdate,
    params(("computer_id" = String, Path, description = "Computer ID")),
    responses(
        (status = 200, description = "Computer updated", body = ComputerResponse),
        (status = 400, description = "No modifiable attribute, or `id`/`self` supplied"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "No such computer, or it belongs to someone else"),
        (status = 406, description = "Client does not accept JSON"),
        (status = 415, description = "Body is not declared as application/json"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(correlation_id = %ctx.correlation_id, computer_id = %computer_id))]
pub async fn patch_computer(
    State(state): State<AppState>,
    subject: AuthenticatedSubject,
    origin: RequestOrigin,
    ctx: RequestContext,
    Path(computer_id): Path<String>,
    JsonObject(body): JsonObject,
) -> Result<Json<ComputerResponse>> {
    let update = ComputerUpdate::from_body(&body)?;
    update_owned(&state, &computer_id, update.into_db_request(subject.0), &origin).await
}

#[utoipa::path(
    put,
    path = "/computers/{computer_id}",
    tag = "computers",
    summary = "Replace computer",
    description = "Replaces every attribute of the computer. Attached peripherals are kept.",
    request_body = ComputerCreate,
    params(("computer_id" = String, Path, description = "Computer ID")),
    responses(
        (status = 200, description = "Computer replaced", body = ComputerResponse),
        (status = 400, description = "Missing attribute, or `id`/`self` supplied"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "No such computer, or it belongs to someone else"),
        (status = 406, description = "Client does not accept JSON"),
        (status = 415, description = "Body is not declared as application/json"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(correlation_id = %ctx.correlation_id, computer_id = %computer_id))]
pub async fn put_computer(
    State(state): State<AppState>,
    subject: AuthenticatedSubject,
    origin: RequestOrigin,
    ctx: RequestContext,
    Path(computer_id): Path<String>,
    JsonObject(body): JsonObject,
) -> Result<Json<ComputerResponse>> {
    let replacement = ComputerCreate::from_replace_body(&body)?;
    update_owned(&state, &computer_id, replacement.into_replace_request(subject.0), &origin).await
}

#[utoipa::path(
    delete,
    path = "/computers/{computer_id}",
    tag = "computers",
    summary = "Delete computer",
    description = "Detaches every attached peripheral, then deletes the computer. Peripherals are kept. \
        If some peripherals could not be detached the computer is left in place and the request \
        fails with 500; repeating it is safe.",
    params(("computer_id" = String, Path, description = "Computer ID")),
    responses(
        (status = 204, description = "Computer deleted"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "No such computer, or it belongs to someone else"),
        (status = 500, description = "Cascade did not complete; retry the request"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(correlation_id = %ctx.correlation_id, computer_id = %computer_id))]
pub async fn delete_computer(
    State(state): State<AppState>,
    subject: AuthenticatedSubject,
    ctx: RequestContext,
    Path(computer_id): Path<String>,
) -> Result<StatusCode> {
    let id = parse_id(&computer_id).ok_or_else(|| forbidden(Operation::Delete, &computer_id))?;
    let ctx = ctx.with_subject(subject.0.clone());

    let manager = RelationshipManager::new(state.store.as_ref(), &state.config.relationships);
    manager.cascade_detach_and_delete_computer(&ctx, id, &subject.0).await?;
    Ok(StatusCode::NO_CONTENT)
}
