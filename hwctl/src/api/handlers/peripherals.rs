//! Peripheral routes. Peripherals are shared inventory: no token is required and any caller may
//! read or change them, except for the `computer` attribute.

use crate::AppState;
use crate::api::extractors::{AcceptsJson, JsonObject, PERIPHERALS_PATH, RequestOrigin};
use crate::api::models::pagination::{ListQuery, ListResponse};
use crate::api::models::peripherals::{PeripheralCreate, PeripheralResponse, PeripheralUpdate};
use crate::db::errors::StoreError;
use crate::db::handlers::{Peripherals, Repository, peripherals::PeripheralFilter};
use crate::db::models::peripherals::PeripheralUpdateDBRequest;
use crate::errors::{Error, PERIPHERAL_NOT_FOUND, Result};
use crate::relationships::{RelationshipError, RelationshipManager};
use crate::types::{RequestContext, parse_id};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

fn not_found() -> Error {
    Error::NotFound {
        message: PERIPHERAL_NOT_FOUND.to_string(),
    }
}

async fn update_peripheral(
    state: &AppState,
    raw_id: &str,
    request: PeripheralUpdateDBRequest,
    origin: &RequestOrigin,
) -> Result<Json<PeripheralResponse>> {
    let id = parse_id(raw_id).ok_or_else(not_found)?;
    let peripheral = match Peripherals::new(state.store.as_ref()).update(id, &request).await {
        Ok(peripheral) => peripheral,
        Err(StoreError::NotFound) => return Err(not_found()),
        Err(e) => return Err(e.into()),
    };
    // The update may have written back a reference that a concurrent cascade just cleared
    let peripheral = RelationshipManager::new(state.store.as_ref(), &state.config.relationships)
        .repair_dangling_reference(peripheral)
        .await
        .map_err(|e| match e {
            RelationshipError::PeripheralNotFound => not_found(),
            e => e.into(),
        })?;
    Ok(Json(PeripheralResponse::new(peripheral, origin)))
}

#[utoipa::path(
    get,
    path = "/peripherals",
    tag = "peripherals",
    summary = "List peripherals",
    params(ListQuery),
    responses(
        (status = 200, description = "One page of peripherals", body = ListResponse<PeripheralResponse>),
        (status = 400, description = "Cursor not recognised"),
        (status = 406, description = "Client does not accept JSON"),
    )
)]
#[tracing::instrument(skip_all, fields(correlation_id = %ctx.correlation_id))]
pub async fn list_peripherals(
    State(state): State<AppState>,
    _: AcceptsJson,
    origin: RequestOrigin,
    ctx: RequestContext,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse<PeripheralResponse>>> {
    let repo = Peripherals::new(state.store.as_ref());
    let page = repo.list(&PeripheralFilter::new(query.cursor())).await?;
    let count = repo.count().await?;

    let next = page.next.as_ref().map(|cursor| origin.next_page_url(PERIPHERALS_PATH, cursor.as_str()));
    let items = page.items.into_iter().map(|p| PeripheralResponse::new(p, &origin)).collect();
    Ok(Json(ListResponse::new(items, count, next)))
}

#[utoipa::path(
    get,
    path = "/peripherals/{peripheral_id}",
    tag = "peripherals",
    summary = "Get peripheral",
    params(("peripheral_id" = String, Path, description = "Peripheral ID")),
    responses(
        (status = 200, description = "The peripheral", body = PeripheralResponse),
        (status = 404, description = "No such peripheral"),
        (status = 406, description = "Client does not accept JSON"),
    )
)]
#[tracing::instrument(skip_all, fields(correlation_id = %ctx.correlation_id, peripheral_id = %peripheral_id))]
pub async fn get_peripheral(
    State(state): State<AppState>,
    _: AcceptsJson,
    origin: RequestOrigin,
    ctx: RequestContext,
    Path(peripheral_id): Path<String>,
) -> Result<Json<PeripheralResponse>> {
    let id = parse_id(&peripheral_id).ok_or_else(not_found)?;
    match Peripherals::new(state.store.as_ref()).get_by_id(id).await? {
        Some(peripheral) => Ok(Json(PeripheralResponse::new(peripheral, &origin))),
        None => Err(not_found()),
    }
}

#[utoipa::path(
    post,
    path = "/peripherals",
    tag = "peripherals",
    summary = "Create peripheral",
    description = "Creates an unattached peripheral. Use the computer attach endpoint to attach it.",
    request_body = PeripheralCreate,
    responses(
        (status = 201, description = "Peripheral created", body = PeripheralResponse),
        (status = 400, description = "Missing attribute, or `id`/`self`/`computer` supplied"),
        (status = 406, description = "Client does not accept JSON"),
        (status = 415, description = "Body is not declared as application/json"),
    )
)]
#[tracing::instrument(skip_all, fields(correlation_id = %ctx.correlation_id))]
pub async fn create_peripheral(
    State(state): State<AppState>,
    origin: RequestOrigin,
    ctx: RequestContext,
    JsonObject(body): JsonObject,
) -> Result<(StatusCode, Json<PeripheralResponse>)> {
    let create = PeripheralCreate::from_create_body(&body)?;
    let peripheral = Peripherals::new(state.store.as_ref()).create(&create.into_db_request()).await?;
    Ok((StatusCode::CREATED, Json(PeripheralResponse::new(peripheral, &origin))))
}

#[utoipa::path(
    patch,
    path = "/peripherals/{peripheral_id}",
    tag = "peripherals",
    summary = "Update peripheral",
    request_body = PeripheralUpdate,
    params(("peripheral_id" = String, Path, description = "Peripheral ID")),
    responses(
        (status = 200, description = "Peripheral updated", body = PeripheralResponse),
        (status = 400, description = "No modifiable attribute, or `id`/`self`/`computer` supplied"),
        (status = 404, description = "No such peripheral"),
        (status = 406, description = "Client does not accept JSON"),
        (status = 415, description = "Body is not declared as application/json"),
    )
)]
#[tracing::instrument(skip_all, fields(correlation_id = %ctx.correlation_id, peripheral_id = %peripheral_id))]
pub async fn patch_peripheral(
    State(state): State<AppState>,
    origin: RequestOrigin,
    ctx: RequestContext,
    Path(peripheral_id): Path<String>,
    JsonObject(body): JsonObject,
) -> Result<Json<PeripheralResponse>> {
    let update = PeripheralUpdate::from_body(&body)?;
    update_peripheral(&state, &peripheral_id, update.into_db_request(), &origin).await
}

#[utoipa::path(
    put,
    path = "/peripherals/{peripheral_id}",
    tag = "peripherals",
    summary = "Replace peripheral",
    description = "Replaces the descriptive attributes. The attachment is kept.",
    request_body = PeripheralCreate,
    params(("peripheral_id" = String, Path, description = "Peripheral ID")),
    responses(
        (status = 200, description = "Peripheral replaced", body = PeripheralResponse),
        (status = 400, description = "Missing attribute, or `id`/`self`/`computer` supplied"),
        (status = 404, description = "No such peripheral"),
        (status = 406, description = "Client does not accept JSON"),
        (status = 415, description = "Body is not declared as application/json"),
    )
)]
#[tracing::instrument(skip_all, fields(correlation_id = %ctx.correlation_id, peripheral_id = %peripheral_id))]
pub async fn put_peripheral(
    State(state): State<AppState>,
    origin: RequestOrigin,
    ctx: RequestContext,
    Path(peripheral_id): Path<String>,
    JsonObject(body): JsonObject,
) -> Result<Json<PeripheralResponse>> {
    let replacement = PeripheralCreate::from_replace_body(&body)?;
    update_peripheral(&state, &peripheral_id, replacement.into_replace_request(), &origin).await
}

#[utoipa::path(
    delete,
    path = "/peripherals/{peripheral_id}",
    tag = "peripherals",
    summary = "Delete peripheral",
    description = "Deletes the peripheral. It disappears from its computer's `peripherals` list.",
    params(("peripheral_id" = String, Path, description = "Peripheral ID")),
    responses(
        (status = 204, description = "Peripheral deleted"),
        (status = 404, description = "No such peripheral"),
    )
)]
#[tracing::instrument(skip_all, fields(correlation_id = %ctx.correlation_id, peripheral_id = %peripheral_id))]
pub async fn delete_peripheral(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(peripheral_id): Path<String>,
) -> Result<StatusCode> {
    let id = parse_id(&peripheral_id).ok_or_else(not_found)?;
    if Peripherals::new(state.store.as_ref()).delete(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found())
    }
}
