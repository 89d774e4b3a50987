//! Attach and detach routes: `/computers/{computer_id}/peripherals/{peripheral_id}`.
//!
//! These routes do not require a token unless `relationships.require_owner` is set, in which case
//! the caller must authenticate and own the computer.

use crate::AppState;
use crate::auth::current_subject::MaybeSubject;
use crate::errors::{ATTACH_NOT_FOUND, DETACH_NOT_FOUND, Error, Result, attach_error, detach_error};
use crate::relationships::RelationshipManager;
use crate::types::{RequestContext, parse_id};
use axum::{
    extract::{Path, State},
    http::StatusCode,
};

/// Resolve the optional caller into the request context, enforcing authentication when the
/// relationship endpoints are owner-gated.
fn relationship_context(state: &AppState, ctx: RequestContext, subject: MaybeSubject) -> Result<RequestContext> {
    match subject.0 {
        Some(subject) => Ok(ctx.with_subject(subject)),
        None if state.config.relationships.require_owner => Err(Error::Unauthenticated { message: None }),
        None => Ok(ctx),
    }
}

#[utoipa::path(
    put,
    path = "/computers/{computer_id}/peripherals/{peripheral_id}",
    tag = "relationships",
    summary = "Attach peripheral",
    description = "Attaches an unattached peripheral to a computer. A peripheral attached elsewhere must be detached first.",
    params(
        ("computer_id" = String, Path, description = "Computer ID"),
        ("peripheral_id" = String, Path, description = "Peripheral ID"),
    ),
    responses(
        (status = 204, description = "Peripheral attached"),
        (status = 401, description = "Token required (only when owner checks are enabled)"),
        (status = 403, description = "Peripheral already attached to a computer"),
        (status = 404, description = "Computer or peripheral does not exist"),
    )
)]
#[tracing::instrument(skip_all, fields(correlation_id = %ctx.correlation_id, computer_id = %computer_id, peripheral_id = %peripheral_id))]
pub async fn attach_peripheral(
    State(state): State<AppState>,
    subject: MaybeSubject,
    ctx: RequestContext,
    Path((computer_id, peripheral_id)): Path<(String, String)>,
) -> Result<StatusCode> {
    let ctx = relationship_context(&state, ctx, subject)?;
    let not_found = || Error::NotFound {
        message: ATTACH_NOT_FOUND.to_string(),
    };
    let computer = parse_id(&computer_id).ok_or_else(not_found)?;
    let peripheral = parse_id(&peripheral_id).ok_or_else(not_found)?;

    RelationshipManager::new(state.store.as_ref(), &state.config.relationships)
        .attach(&ctx, computer, peripheral)
        .await
        .map_err(attach_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/computers/{computer_id}/peripherals/{peripheral_id}",
    tag = "relationships",
    summary = "Detach peripheral",
    description = "Detaches a peripheral from the computer it is attached to. The peripheral itself is kept.",
    params(
        ("computer_id" = String, Path, description = "Computer ID"),
        ("peripheral_id" = String, Path, description = "Peripheral ID"),
    ),
    responses(
        (status = 204, description = "Peripheral detached"),
        (status = 401, description = "Token required (only when owner checks are enabled)"),
        (status = 403, description = "Caller does not own the computer (only when owner checks are enabled)"),
        (status = 404, description = "No such computer, or the peripheral is not attached to it"),
    )
)]
#[tracing::instrument(skip_all, fields(correlation_id = %ctx.correlation_id, computer_id = %computer_id, peripheral_id = %peripheral_id))]
pub async fn detach_peripheral(
    State(state): State<AppState>,
    subject: MaybeSubject,
    ctx: RequestContext,
    Path((computer_id, peripheral_id)): Path<(String, String)>,
) -> Result<StatusCode> {
    let ctx = relationship_context(&state, ctx, subject)?;
    let not_found = || Error::NotFound {
        message: DETACH_NOT_FOUND.to_string(),
    };
    let computer = parse_id(&computer_id).ok_or_else(not_found)?;
    let peripheral = parse_id(&peripheral_id).ok_or_else(not_found)?;

    RelationshipManager::new(state.store.as_ref(), &state.config.relationships)
        .detach(&ctx, computer, peripheral)
        .await
        .map_err(detach_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::api::models::computers::ComputerResponse;
    use crate::api::models::peripherals::PeripheralResponse;
    use crate::test_utils::{
        auth_header, create_test_app, create_test_app_with_config, create_test_computer, create_test_config,
        create_test_peripheral,
    };
    use axum::http::{HeaderValue, StatusCode, header};
    use serde_json::json;
    use uuid::Uuid;

    fn link(computer: Uuid, peripheral: Uuid) -> String {
        format!("/computers/{computer}/peripherals/{peripheral}")
    }

    #[test_log::test(tokio::test)]
    async fn test_attach_view_delete_scenario() {
        let (server, state) = create_test_app();
        let (name, value) = auth_header(&state, "U1");

        let computer: ComputerResponse = server
            .post("/computers")
            .add_header(name.clone(), value.clone())
            .json(&json!({"manufacturer": "Dell", "model": "X1", "serial_number": "S1"}))
            .await
            .json();
        let peripheral: PeripheralResponse = server
            .post("/peripherals")
            .json(&json!({"manufacturer": "Logitech", "type": "mouse", "serial_number": "M1"}))
            .await
            .json();
        assert!(peripheral.computer.is_none());

        server
            .put(&link(computer.id, peripheral.id))
            .await
            .assert_status(StatusCode::NO_CONTENT);

        let viewed: ComputerResponse = server
            .get(&format!("/computers/{}", computer.id))
            .add_header(name.clone(), value.clone())
            .await
            .json();
        assert_eq!(viewed.peripherals.iter().map(|p| p.id).collect::<Vec<_>>(), vec![peripheral.id]);

        server
            .delete(&format!("/computers/{}", computer.id))
            .add_header(name.clone(), value.clone())
            .await
            .assert_status(StatusCode::NO_CONTENT);

        let after: PeripheralResponse = server.get(&format!("/peripherals/{}", peripheral.id)).await.json();
        assert!(after.computer.is_none());

        server
            .get(&format!("/computers/{}", computer.id))
            .add_header(name, value)
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }

    #[test_log::test(tokio::test)]
    async fn test_attach_twice_conflicts() {
        let (server, state) = create_test_app();
        let computer = create_test_computer(&state, "u1").await;
        let other = create_test_computer(&state, "u2").await;
        let peripheral = create_test_peripheral(&state, "M1").await;

        server
            .put(&link(computer.id, peripheral.id))
            .await
            .assert_status(StatusCode::NO_CONTENT);

        let response = server.put(&link(computer.id, peripheral.id)).await;
        response.assert_status(StatusCode::FORBIDDEN);
        response.assert_json(&json!({"Error": "The specified peripheral is already assigned to a computer."}));

        server
            .put(&link(other.id, peripheral.id))
            .await
            .assert_status(StatusCode::FORBIDDEN);

        let fetched: PeripheralResponse = server.get(&format!("/peripherals/{}", peripheral.id)).await.json();
        assert_eq!(fetched.computer.map(|c| c.id), Some(computer.id));
    }

    #[test_log::test(tokio::test)]
    async fn test_attach_missing_ids() {
        let (server, state) = create_test_app();
        let computer = create_test_computer(&state, "u1").await;
        let peripheral = create_test_peripheral(&state, "M1").await;

        for path in [
            link(computer.id, Uuid::new_v4()),
            link(Uuid::new_v4(), peripheral.id),
            format!("/computers/{}/peripherals/oops", computer.id),
        ] {
            let response = server.put(&path).await;
            response.assert_status(StatusCode::NOT_FOUND);
            response.assert_json(&json!({"Error": "The specified computer and/or peripheral don\u{2019}t exist"}));
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_detach_then_attach_elsewhere() {
        let (server, state) = create_test_app();
        let first = create_test_computer(&state, "u1").await;
        let second = create_test_computer(&state, "u1").await;
        let peripheral = create_test_peripheral(&state, "M1").await;

        server.put(&link(first.id, peripheral.id)).await.assert_status(StatusCode::NO_CONTENT);

        // Wrong computer is indistinguishable from a missing peripheral
        let response = server.delete(&link(second.id, peripheral.id)).await;
        response.assert_status(StatusCode::NOT_FOUND);
        response.assert_json(&json!({"Error": "No computer with this computer_id has a peripheral with this peripheral_id"}));

        server.delete(&link(first.id, peripheral.id)).await.assert_status(StatusCode::NO_CONTENT);
        server.put(&link(second.id, peripheral.id)).await.assert_status(StatusCode::NO_CONTENT);

        let (name, value) = auth_header(&state, "u1");
        let first_view: ComputerResponse = server
            .get(&format!("/computers/{}", first.id))
            .add_header(name.clone(), value.clone())
            .await
            .json();
        let second_view: ComputerResponse = server
            .get(&format!("/computers/{}", second.id))
            .add_header(name, value)
            .await
            .json();
        assert!(first_view.peripherals.is_empty());
        assert_eq!(second_view.peripherals.len(), 1);
        assert_eq!(second_view.peripherals[0].id, peripheral.id);
    }

    #[test_log::test(tokio::test)]
    async fn test_cascade_delete_detaches_all() {
        let (server, state) = create_test_app();
        let computer = create_test_computer(&state, "u1").await;
        let mut attached = Vec::new();
        for i in 0..8 {
            let p = create_test_peripheral(&state, &format!("M{i}")).await;
            server.put(&link(computer.id, p.id)).await.assert_status(StatusCode::NO_CONTENT);
            attached.push(p.id);
        }

        let (name, value) = auth_header(&state, "u1");
        server
            .delete(&format!("/computers/{}", computer.id))
            .add_header(name, value)
            .await
            .assert_status(StatusCode::NO_CONTENT);

        for id in attached {
            let p: PeripheralResponse = server.get(&format!("/peripherals/{id}")).await.json();
            assert!(p.computer.is_none());
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_require_owner() {
        let mut config = create_test_config();
        config.relationships.require_owner = true;
        let (server, state) = create_test_app_with_config(config);
        let computer = create_test_computer(&state, "u1").await;
        let peripheral = create_test_peripheral(&state, "M1").await;

        server
            .put(&link(computer.id, peripheral.id))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        let (name, value) = auth_header(&state, "u2");
        let response = server
            .put(&link(computer.id, peripheral.id))
            .add_header(name, value)
            .await;
        response.assert_status(StatusCode::FORBIDDEN);
        assert!(response.text().is_empty());

        let (name, value) = auth_header(&state, "u1");
        server
            .put(&link(computer.id, peripheral.id))
            .add_header(name, value)
            .await
            .assert_status(StatusCode::NO_CONTENT);
    }

    #[test_log::test(tokio::test)]
    async fn test_invalid_token_is_anonymous_unless_owner_required() {
        let (server, state) = create_test_app();
        let computer = create_test_computer(&state, "u1").await;
        let peripheral = create_test_peripheral(&state, "M1").await;

        server
            .put(&link(computer.id, peripheral.id))
            .add_header(header::AUTHORIZATION, HeaderValue::from_static("Bearer not.a.token"))
            .await
            .assert_status(StatusCode::NO_CONTENT);
        server
            .delete(&link(computer.id, peripheral.id))
            .add_header(header::AUTHORIZATION, HeaderValue::from_static("Bearer not.a.token"))
            .await
            .assert_status(StatusCode::NO_CONTENT);

        let mut config = create_test_config();
        config.relationships.require_owner = true;
        let (server, state) = create_test_app_with_config(config);
        let computer = create_test_computer(&state, "u1").await;
        let peripheral = create_test_peripheral(&state, "M1").await;

        server
            .put(&link(computer.id, peripheral.id))
            .add_header(header::AUTHORIZATION, HeaderValue::from_static("Bearer not.a.token"))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[test_log::test(tokio::test)]
    async fn test_method_not_allowed() {
        let (server, _state) = create_test_app();
        let response = server.get(&link(Uuid::new_v4(), Uuid::new_v4())).await;
        response.assert_status(StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.header(header::ALLOW), "PUT, DELETE");
    }
}
