//! Test utilities: in-memory app state, test server and fixtures.

use crate::auth::token;
use crate::config::{AuthConfig, Config, StoreConfig};
use crate::db::handlers::{Computers, Peripherals, Repository};
use crate::db::models::computers::{ComputerCreateDBRequest, ComputerDBResponse};
use crate::db::models::peripherals::{PeripheralCreateDBRequest, PeripheralDBResponse};
use crate::db::store::MemoryStore;
use crate::types::Subject;
use crate::{AppState, build_router};
use axum::http::{HeaderName, HeaderValue, header};
use axum_test::TestServer;
use std::sync::Arc;
use std::time::Duration;

pub fn create_test_config() -> Config {
    Config {
        store: StoreConfig::Memory,
        auth: AuthConfig {
            secret_key: Some("test-secret-key-for-jwt".to_string()),
            token_expiry: Duration::from_secs(3600),
            ..Default::default()
        },
        // The Prometheus recorder is process-global; tests never install it
        enable_metrics: false,
        enable_otel_export: false,
        ..Default::default()
    }
}

pub fn create_test_state_with_config(config: Config) -> AppState {
    AppState::builder().store(Arc::new(MemoryStore::new())).config(config).build()
}

pub fn create_test_state() -> AppState {
    create_test_state_with_config(create_test_config())
}

pub fn create_test_app_with_config(config: Config) -> (TestServer, AppState) {
    let state = create_test_state_with_config(config);
    let router = build_router(state.clone()).expect("Failed to build router");
    let server = TestServer::new(router.into_make_service()).expect("Failed to create test server");
    (server, state)
}

pub fn create_test_app() -> (TestServer, AppState) {
    create_test_app_with_config(create_test_config())
}

pub fn test_token(state: &AppState, subject: &str) -> String {
    token::issue(&Subject::new(subject), &state.config.auth).expect("Failed to issue test token")
}

pub fn auth_header(state: &AppState, subject: &str) -> (HeaderName, HeaderValue) {
    let value = HeaderValue::from_str(&format!("Bearer {}", test_token(state, subject))).expect("Invalid header value");
    (header::AUTHORIZATION, value)
}

pub async fn create_test_computer(state: &AppState, owner: &str) -> ComputerDBResponse {
    let request = ComputerCreateDBRequest {
        manufacturer: "Dell".to_string(),
        model: "X1".to_string(),
        serial_number: format!("SN-{}", uuid::Uuid::new_v4().simple()),
        owner: Subject::new(owner),
    };
    Computers::new(state.store.as_ref())
        .create(&request)
        .await
        .expect("Failed to create test computer")
}

pub async fn create_test_peripheral(state: &AppState, serial_number: &str) -> PeripheralDBResponse {
    let request = PeripheralCreateDBRequest {
        manufacturer: "Logitech".to_string(),
        peripheral_type: "mouse".to_string(),
        serial_number: serial_number.to_string(),
    };
    Peripherals::new(state.store.as_ref())
        .create(&request)
        .await
        .expect("Failed to create test peripheral")
}
