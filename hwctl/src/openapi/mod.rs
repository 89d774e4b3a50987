//! OpenAPI documentation for the inventory API.
//!
//! The document is served as JSON at `/api-docs/openapi.json` and rendered with Scalar at
//! `/docs`.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::api;
use crate::api::models::pagination::ListResponse;

/// Bearer scheme for the owner-scoped computer routes.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "BearerAuth".to_string(),
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some(
                            "HS256 token whose `sub` claim identifies the caller:\n\n\
                            ```\nAuthorization: Bearer YOUR_TOKEN\n```\n\n\
                            Tokens can be minted with `hwctl --issue-token <SUBJECT>`.",
                        ))
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "hwctl",
        description = "Inventory of owned computers and the shared peripherals attached to them."
    ),
    modifiers(&SecurityAddon),
    paths(
        api::handlers::computers::list_computers,
        api::handlers::computers::get_computer,
        api::handlers::computers::create_computer,
        api::handlers::computers::patch_computer,
        api::handlers::computers::put_computer,
        api::handlers::computers::delete_computer,
        api::handlers::peripherals::list_peripherals,
        api::handlers::peripherals::get_peripheral,
        api::handlers::peripherals::create_peripheral,
        api::handlers::peripherals::patch_peripheral,
        api::handlers::peripherals::put_peripheral,
        api::handlers::peripherals::delete_peripheral,
        api::handlers::relationships::attach_peripheral,
        api::handlers::relationships::detach_peripheral,
    ),
    components(
        schemas(
            api::models::Link,
            api::models::pagination::ListQuery,
            api::models::computers::ComputerCreate,
            api::models::computers::ComputerUpdate,
            api::models::computers::ComputerResponse,
            api::models::peripherals::PeripheralCreate,
            api::models::peripherals::PeripheralUpdate,
            api::models::peripherals::PeripheralResponse,
            ListResponse<api::models::computers::ComputerResponse>,
            ListResponse<api::models::peripherals::PeripheralResponse>,
        )
    ),
    tags(
        (name = "computers", description = "Computers owned by the authenticated caller. A computer that does not exist and one owned by someone else both answer 403."),
        (name = "peripherals", description = "Shared peripherals. Any caller may manage them; attachment changes only through the relationship routes."),
        (name = "relationships", description = "Attach a peripheral to a computer, or detach it."),
    )
)]
pub struct ApiDoc;
