//! services/api/src/web/mod.rs
//!
//! The HTTP surface: handlers, middleware, shared state, and the master
//! OpenAPI definition.

use axum::http::StatusCode;
use utoipa::OpenApi;

use autofix_core::ports::PortError;

pub mod auth;
pub mod chat;
pub mod diagnostics;
pub mod jwt;
pub mod middleware;
pub mod state;
pub mod vehicles;

pub use middleware::require_auth;

/// Maps a port error onto the HTTP boundary: absence is 404, ownership
/// mismatch is 403, a failing upstream dependency is 502, everything else
/// is a 500 with the error text as detail.
pub fn port_error_response(error: &PortError) -> (StatusCode, String) {
    match error {
        PortError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
        PortError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
        PortError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
        PortError::Unexpected(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
    }
}

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::register_handler,
        auth::login_handler,
        vehicles::create_vehicle_handler,
        vehicles::list_vehicles_handler,
        vehicles::get_vehicle_handler,
        vehicles::resolve_issue_handler,
        diagnostics::diagnose_issue_handler,
        diagnostics::repair_guide_handler,
        chat::upload_documents_handler,
        chat::chat_handler,
    ),
    components(schemas(
        auth::RegisterRequest,
        auth::LoginRequest,
        auth::UserResponse,
        auth::TokenResponse,
        vehicles::CreateVehicleRequest,
        vehicles::CreateVehicleResponse,
        vehicles::VehicleResponse,
        vehicles::IssueResponse,
        vehicles::ResolveIssueRequest,
        diagnostics::DiagnosticRequest,
        diagnostics::DiagnosticResponse,
        chat::UploadResponse,
        chat::FileSummaryResponse,
        chat::ChatRequest,
        chat::ChatResponse,
        chat::RelevantChunk,
    )),
    tags(
        (name = "AutoFix API", description = "Vehicle diagnostics backed by retrieval-augmented generation.")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_errors_map_to_the_expected_status_codes() {
        let (status, _) = port_error_response(&PortError::NotFound("gone".to_string()));
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = port_error_response(&PortError::Forbidden("no".to_string()));
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, detail) = port_error_response(&PortError::Upstream("llm down".to_string()));
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(detail, "llm down");

        let (status, _) = port_error_response(&PortError::Unexpected("boom".to_string()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
