//! services/api/src/web/vehicles.rs
//!
//! Handlers for the owner-scoped vehicle endpoints. Every access compares the
//! vehicle's owner against the authenticated caller; mismatches are 403.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

use crate::web::{middleware::CurrentUser, state::AppState};
use autofix_core::domain::{NewVehicle, Vehicle, VehicleIssue, VehicleType};

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct CreateVehicleRequest {
    pub make: String,
    pub model: String,
    pub year: i32,
    /// One of: sedan, suv, truck, hatchback, van, coupe, convertible, wagon, other.
    #[serde(rename = "type")]
    #[schema(value_type = String)]
    pub vehicle_type: VehicleType,
    pub vin: Option<String>,
    pub mileage: Option<i64>,
    pub last_service_date: Option<DateTime<Utc>>,
}

#[derive(Serialize, ToSchema)]
pub struct CreateVehicleResponse {
    pub id: String,
}

#[derive(Serialize, ToSchema)]
pub struct IssueResponse {
    pub id: String,
    pub title: String,
    pub description: String,
    pub severity: String,
    pub resolved: bool,
    pub resolution: Option<String>,
    pub diagnostic_codes: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl IssueResponse {
    fn from_domain(issue: VehicleIssue) -> Self {
        Self {
            id: issue.id,
            title: issue.title,
            description: issue.description,
            severity: issue.severity.as_str().to_string(),
            resolved: issue.resolved,
            resolution: issue.resolution,
            diagnostic_codes: issue.diagnostic_codes,
            created_at: issue.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct VehicleResponse {
    pub id: String,
    pub user_id: String,
    pub make: String,
    pub model: String,
    pub year: i32,
    #[serde(rename = "type")]
    #[schema(value_type = String)]
    pub vehicle_type: VehicleType,
    pub vin: Option<String>,
    pub mileage: Option<i64>,
    pub last_service_date: Option<DateTime<Utc>>,
    pub issues: Vec<IssueResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VehicleResponse {
    fn from_domain(vehicle: Vehicle) -> Self {
        Self {
            id: vehicle.id,
            user_id: vehicle.user_id,
            make: vehicle.make,
            model: vehicle.model,
            year: vehicle.year,
            vehicle_type: vehicle.vehicle_type,
            vin: vehicle.vin,
            mileage: vehicle.mileage,
            last_service_date: vehicle.last_service_date,
            issues: vehicle
                .issues
                .into_iter()
                .map(IssueResponse::from_domain)
                .collect(),
            created_at: vehicle.created_at,
            updated_at: vehicle.updated_at,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct ResolveIssueRequest {
    pub resolution: String,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /api/vehicles - Register a vehicle for the authenticated caller
#[utoipa::path(
    post,
    path = "/api/vehicles",
    request_body = CreateVehicleRequest,
    responses(
        (status = 201, description = "Vehicle created", body = CreateVehicleResponse),
        (status = 401, description = "Missing or invalid token"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn create_vehicle_handler(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<CreateVehicleRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let vehicle_id = state
        .store
        .create_vehicle(NewVehicle {
            user_id: user.id,
            make: req.make,
            model: req.model,
            year: req.year,
            vehicle_type: req.vehicle_type,
            vin: req.vin,
            mileage: req.mileage,
            last_service_date: req.last_service_date,
        })
        .await
        .map_err(|e| {
            error!("Failed to create vehicle: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to create vehicle".to_string(),
            )
        })?;

    Ok((
        StatusCode::CREATED,
        Json(CreateVehicleResponse { id: vehicle_id }),
    ))
}

/// GET /api/vehicles - List the authenticated caller's vehicles
#[utoipa::path(
    get,
    path = "/api/vehicles",
    responses(
        (status = 200, description = "The caller's vehicles", body = [VehicleResponse]),
        (status = 401, description = "Missing or invalid token"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_vehicles_handler(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let vehicles = state
        .store
        .get_vehicles_by_user(&user.id)
        .await
        .map_err(|e| {
            error!("Failed to list vehicles: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to list vehicles".to_string(),
            )
        })?;

    let response: Vec<VehicleResponse> = vehicles
        .into_iter()
        .map(VehicleResponse::from_domain)
        .collect();
    Ok(Json(response))
}

/// GET /api/vehicles/{vehicle_id} - Fetch one vehicle with its issue history
#[utoipa::path(
    get,
    path = "/api/vehicles/{vehicle_id}",
    params(("vehicle_id" = String, Path, description = "The vehicle to fetch")),
    responses(
        (status = 200, description = "The vehicle", body = VehicleResponse),
        (status = 403, description = "Vehicle belongs to another user"),
        (status = 404, description = "Vehicle not found"),
        (status = 401, description = "Missing or invalid token")
    )
)]
pub async fn get_vehicle_handler(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(vehicle_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let vehicle = fetch_owned_vehicle(&state, &user, &vehicle_id).await?;
    Ok(Json(VehicleResponse::from_domain(vehicle)))
}

/// POST /api/vehicles/{vehicle_id}/issues/{issue_id}/resolve - Mark an issue resolved
#[utoipa::path(
    post,
    path = "/api/vehicles/{vehicle_id}/issues/{issue_id}/resolve",
    params(
        ("vehicle_id" = String, Path, description = "The vehicle owning the issue"),
        ("issue_id" = String, Path, description = "The issue to resolve")
    ),
    request_body = ResolveIssueRequest,
    responses(
        (status = 200, description = "Issue resolved"),
        (status = 403, description = "Vehicle belongs to another user"),
        (status = 404, description = "Vehicle or issue not found"),
        (status = 401, description = "Missing or invalid token")
    )
)]
pub async fn resolve_issue_handler(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path((vehicle_id, issue_id)): Path<(String, String)>,
    Json(req): Json<ResolveIssueRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    fetch_owned_vehicle(&state, &user, &vehicle_id).await?;

    let resolved = state
        .store
        .resolve_issue(&vehicle_id, &issue_id, &req.resolution)
        .await
        .map_err(|e| {
            error!("Failed to resolve issue: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to resolve issue".to_string(),
            )
        })?;

    match resolved {
        Some(()) => Ok(StatusCode::OK),
        None => Err((StatusCode::NOT_FOUND, "Issue not found".to_string())),
    }
}

/// Fetches a vehicle and enforces ownership: 404 when absent, 403 when the
/// caller is not the owner.
pub async fn fetch_owned_vehicle(
    state: &AppState,
    user: &CurrentUser,
    vehicle_id: &str,
) -> Result<Vehicle, (StatusCode, String)> {
    let vehicle = state
        .store
        .get_vehicle(vehicle_id)
        .await
        .map_err(|e| {
            error!("Failed to fetch vehicle: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to fetch vehicle".to_string(),
            )
        })?
        .ok_or((StatusCode::NOT_FOUND, "Vehicle not found".to_string()))?;

    if vehicle.user_id != user.id {
        return Err((
            StatusCode::FORBIDDEN,
            "Not authorized to access this vehicle".to_string(),
        ));
    }
    Ok(vehicle)
}
