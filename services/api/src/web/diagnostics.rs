//! services/api/src/web/diagnostics.rs
//!
//! The diagnosis orchestration: vehicle lookup and ownership check, knowledge
//! retrieval, prompt assembly, generation, parsing, and issue persistence.
//! The orchestration functions take their ports explicitly so tests can
//! substitute fakes; the axum handlers are thin wrappers that map `PortError`
//! to status codes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

use crate::web::{middleware::CurrentUser, port_error_response, state::AppState};
use autofix_core::domain::{NewIssue, Vehicle};
use autofix_core::ports::{
    GenerationService, PortError, PortResult, VectorSearchService, VehicleStore,
};
use autofix_core::{extract, prompts};

/// The knowledge-base collections the service maintains.
pub const KNOWLEDGE_COLLECTION: &str = "automotive_knowledge";
pub const REPAIR_COLLECTION: &str = "repair_procedures";
pub const CODES_COLLECTION: &str = "diagnostic_codes";

/// How many knowledge passages a diagnosis retrieves.
const RETRIEVAL_TOP_N: usize = 5;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct DiagnosticRequest {
    pub vehicle_id: String,
    pub issue_description: String,
    #[serde(default)]
    pub obd_codes: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DiagnosticResponse {
    /// The parsed diagnosis payload, returned verbatim (or the parser's
    /// structured fallback when the model's output was not parseable).
    #[schema(value_type = Object)]
    pub diagnosis: serde_json::Value,
    pub issue_id: String,
}

#[derive(Deserialize, ToSchema)]
pub struct RepairGuideParams {
    pub vehicle_id: String,
}

//=========================================================================================
// Orchestration
//=========================================================================================

/// Resolves a vehicle and enforces ownership at the port level.
async fn owned_vehicle(
    store: &dyn VehicleStore,
    user_id: &str,
    vehicle_id: &str,
) -> PortResult<Vehicle> {
    let vehicle = store
        .get_vehicle(vehicle_id)
        .await?
        .ok_or_else(|| PortError::NotFound("Vehicle not found".to_string()))?;

    if vehicle.user_id != user_id {
        return Err(PortError::Forbidden(
            "Not authorized to access this vehicle".to_string(),
        ));
    }
    Ok(vehicle)
}

/// Runs the full diagnosis pipeline for one request.
pub async fn run_diagnosis(
    store: &dyn VehicleStore,
    vectors: &dyn VectorSearchService,
    llm: &dyn GenerationService,
    user_id: &str,
    request: &DiagnosticRequest,
) -> PortResult<DiagnosticResponse> {
    // 1. Resolve the vehicle and check ownership.
    let vehicle = owned_vehicle(store, user_id, &request.vehicle_id).await?;

    // 2. Retrieve relevant knowledge. An empty result is fine; the prompt
    //    simply carries no technical context.
    let query = format!(
        "{} {} {}",
        vehicle.make, vehicle.model, request.issue_description
    );
    let matches = vectors
        .query(KNOWLEDGE_COLLECTION, &query, RETRIEVAL_TOP_N)
        .await?;
    let context = matches
        .iter()
        .map(|m| m.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    // 3./4. Assemble the prompt, generate, and parse. A transport failure
    //    propagates as Upstream here, before anything is persisted.
    let prompt = prompts::diagnosis_prompt(&vehicle, &request.issue_description, &context);
    let response = llm
        .generate(&prompt, Some(prompts::DIAGNOSIS_SYSTEM_PROMPT))
        .await?;
    let diagnosis = extract::diagnosis_payload(&response);

    // 5./6. Project the payload into an issue: coerced severity, parsed codes
    //    merged with the caller's OBD codes.
    let severity = extract::severity_of(&diagnosis);
    let mut diagnostic_codes = extract::diagnostic_codes_of(&diagnosis);
    diagnostic_codes.extend(request.obd_codes.iter().cloned());

    let issue = NewIssue {
        title: format!("Issue on {}", Utc::now().format("%Y-%m-%d")),
        description: request.issue_description.clone(),
        severity,
        diagnostic_codes,
    };

    let issue_id = store
        .add_issue_to_vehicle(&vehicle.id, issue)
        .await?
        .ok_or_else(|| PortError::NotFound("Vehicle not found".to_string()))?;

    // 7. Return the payload and the new issue id.
    Ok(DiagnosticResponse {
        diagnosis,
        issue_id,
    })
}

/// Produces a repair guide for an existing issue. Reuses the prompt/generate
/// steps of the diagnosis flow with a different prompt; persists nothing.
pub async fn run_repair_guide(
    store: &dyn VehicleStore,
    llm: &dyn GenerationService,
    user_id: &str,
    vehicle_id: &str,
    issue_id: &str,
) -> PortResult<serde_json::Value> {
    let vehicle = owned_vehicle(store, user_id, vehicle_id).await?;

    let issue = vehicle
        .issue(issue_id)
        .ok_or_else(|| PortError::NotFound("Issue not found".to_string()))?;

    let prompt = prompts::repair_guide_prompt(&vehicle, &issue.description, &issue.diagnostic_codes);
    let response = llm
        .generate(&prompt, Some(prompts::REPAIR_GUIDE_SYSTEM_PROMPT))
        .await?;

    Ok(extract::repair_guide_payload(&response))
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /api/diagnostics/ - Diagnose a vehicle issue
#[utoipa::path(
    post,
    path = "/api/diagnostics/",
    request_body = DiagnosticRequest,
    responses(
        (status = 200, description = "Diagnosis produced and issue recorded", body = DiagnosticResponse),
        (status = 403, description = "Vehicle belongs to another user"),
        (status = 404, description = "Vehicle not found"),
        (status = 502, description = "Generation backend failure"),
        (status = 401, description = "Missing or invalid token")
    )
)]
pub async fn diagnose_issue_handler(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(request): Json<DiagnosticRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    run_diagnosis(
        state.store.as_ref(),
        state.vectors.as_ref(),
        state.llm.as_ref(),
        &user.id,
        &request,
    )
    .await
    .map(Json)
    .map_err(|e| {
        error!("Diagnosis failed: {:?}", e);
        port_error_response(&e)
    })
}

/// GET /api/diagnostics/repair-guide/{issue_id} - Generate a repair guide
#[utoipa::path(
    get,
    path = "/api/diagnostics/repair-guide/{issue_id}",
    params(
        ("issue_id" = String, Path, description = "The issue to generate a guide for"),
        ("vehicle_id" = String, Query, description = "The vehicle owning the issue")
    ),
    responses(
        (status = 200, description = "A structured repair guide, or {\"raw_guide\": ...} when the model's output was not parseable"),
        (status = 403, description = "Vehicle belongs to another user"),
        (status = 404, description = "Vehicle or issue not found"),
        (status = 502, description = "Generation backend failure"),
        (status = 401, description = "Missing or invalid token")
    )
)]
pub async fn repair_guide_handler(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(issue_id): Path<String>,
    Query(params): Query<RepairGuideParams>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    run_repair_guide(
        state.store.as_ref(),
        state.llm.as_ref(),
        &user.id,
        &params.vehicle_id,
        &issue_id,
    )
    .await
    .map(Json)
    .map_err(|e| {
        error!("Repair guide generation failed: {:?}", e);
        port_error_response(&e)
    })
}

//=========================================================================================
// Tests
//=========================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use autofix_core::domain::{
        ChunkRecord, IssueSeverity, NewUser, NewVehicle, ScoredChunk, User, UserCredentials,
        VehicleIssue, VehicleType,
    };
    use autofix_core::ports::GenerationStream;
    use std::collections::HashMap;
    use std::sync::Mutex;

    //-----------------------------------------------------------------------------
    // Fakes
    //-----------------------------------------------------------------------------

    struct FakeStore {
        vehicles: Mutex<HashMap<String, Vehicle>>,
        issue_counter: Mutex<u32>,
    }

    impl FakeStore {
        fn with_vehicle(vehicle: Vehicle) -> Self {
            let mut vehicles = HashMap::new();
            vehicles.insert(vehicle.id.clone(), vehicle);
            Self {
                vehicles: Mutex::new(vehicles),
                issue_counter: Mutex::new(0),
            }
        }

        fn vehicle(&self, id: &str) -> Option<Vehicle> {
            self.vehicles.lock().unwrap().get(id).cloned()
        }
    }

    #[async_trait]
    impl VehicleStore for FakeStore {
        async fn create_user(&self, _user: NewUser) -> PortResult<User> {
            Err(PortError::Unexpected("not used in these tests".to_string()))
        }

        async fn get_user_by_email(&self, _email: &str) -> PortResult<Option<UserCredentials>> {
            Ok(None)
        }

        async fn create_vehicle(&self, _vehicle: NewVehicle) -> PortResult<String> {
            Err(PortError::Unexpected("not used in these tests".to_string()))
        }

        async fn get_vehicle(&self, vehicle_id: &str) -> PortResult<Option<Vehicle>> {
            Ok(self.vehicle(vehicle_id))
        }

        async fn get_vehicles_by_user(&self, user_id: &str) -> PortResult<Vec<Vehicle>> {
            Ok(self
                .vehicles
                .lock()
                .unwrap()
                .values()
                .filter(|v| v.user_id == user_id)
                .cloned()
                .collect())
        }

        async fn add_issue_to_vehicle(
            &self,
            vehicle_id: &str,
            issue: NewIssue,
        ) -> PortResult<Option<String>> {
            let mut vehicles = self.vehicles.lock().unwrap();
            let Some(vehicle) = vehicles.get_mut(vehicle_id) else {
                return Ok(None);
            };

            let mut counter = self.issue_counter.lock().unwrap();
            *counter += 1;
            let id = format!("issue-{}", counter);

            vehicle.issues.push(VehicleIssue {
                id: id.clone(),
                title: issue.title,
                description: issue.description,
                severity: issue.severity,
                resolved: false,
                resolution: None,
                diagnostic_codes: issue.diagnostic_codes,
                created_at: Utc::now(),
            });
            Ok(Some(id))
        }

        async fn resolve_issue(
            &self,
            vehicle_id: &str,
            issue_id: &str,
            resolution: &str,
        ) -> PortResult<Option<()>> {
            let mut vehicles = self.vehicles.lock().unwrap();
            let Some(vehicle) = vehicles.get_mut(vehicle_id) else {
                return Ok(None);
            };
            match vehicle.issues.iter_mut().find(|i| i.id == issue_id) {
                Some(issue) => {
                    issue.resolved = true;
                    issue.resolution = Some(resolution.to_string());
                    Ok(Some(()))
                }
                None => Ok(None),
            }
        }
    }

    struct FakeVectors {
        chunks: Vec<ScoredChunk>,
        last_query: Mutex<Option<String>>,
    }

    impl FakeVectors {
        fn empty() -> Self {
            Self {
                chunks: Vec::new(),
                last_query: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl VectorSearchService for FakeVectors {
        async fn ensure_collection(&self, _name: &str) -> PortResult<()> {
            Ok(())
        }

        async fn add(&self, _collection: &str, _chunks: Vec<ChunkRecord>) -> PortResult<()> {
            Ok(())
        }

        async fn query(
            &self,
            _collection: &str,
            text: &str,
            _top_n: usize,
        ) -> PortResult<Vec<ScoredChunk>> {
            *self.last_query.lock().unwrap() = Some(text.to_string());
            Ok(self.chunks.clone())
        }
    }

    struct FakeLlm {
        response: Option<String>,
    }

    impl FakeLlm {
        fn returning(text: &str) -> Self {
            Self {
                response: Some(text.to_string()),
            }
        }

        fn failing() -> Self {
            Self { response: None }
        }
    }

    #[async_trait]
    impl GenerationService for FakeLlm {
        async fn generate(
            &self,
            _prompt: &str,
            _system_prompt: Option<&str>,
        ) -> PortResult<String> {
            match &self.response {
                Some(text) => Ok(text.clone()),
                None => Err(PortError::Upstream("connection refused".to_string())),
            }
        }

        async fn generate_stream(
            &self,
            prompt: &str,
            _temperature: Option<f32>,
        ) -> PortResult<GenerationStream> {
            let text = self.generate(prompt, None).await?;
            Ok(Box::pin(futures::stream::once(async move { Ok(text) })))
        }
    }

    fn camry(owner: &str) -> Vehicle {
        Vehicle {
            id: "veh-1".to_string(),
            user_id: owner.to_string(),
            make: "Toyota".to_string(),
            model: "Camry".to_string(),
            year: 2018,
            vehicle_type: VehicleType::Sedan,
            vin: None,
            mileage: None,
            last_service_date: None,
            issues: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn request(description: &str, obd_codes: Vec<String>) -> DiagnosticRequest {
        DiagnosticRequest {
            vehicle_id: "veh-1".to_string(),
            issue_description: description.to_string(),
            obd_codes,
        }
    }

    //-----------------------------------------------------------------------------
    // Diagnosis
    //-----------------------------------------------------------------------------

    #[tokio::test]
    async fn unknown_vehicle_is_not_found() {
        let store = FakeStore::with_vehicle(camry("user-1"));
        let vectors = FakeVectors::empty();
        let llm = FakeLlm::returning("{}");

        let mut req = request("engine rattles at idle", Vec::new());
        req.vehicle_id = "veh-missing".to_string();

        let result = run_diagnosis(&store, &vectors, &llm, "user-1", &req).await;
        assert!(matches!(result, Err(PortError::NotFound(_))));
    }

    #[tokio::test]
    async fn foreign_vehicle_is_forbidden() {
        let store = FakeStore::with_vehicle(camry("user-b"));
        let vectors = FakeVectors::empty();
        let llm = FakeLlm::returning("{}");

        let result = run_diagnosis(
            &store,
            &vectors,
            &llm,
            "user-a",
            &request("engine rattles at idle", Vec::new()),
        )
        .await;
        assert!(matches!(result, Err(PortError::Forbidden(_))));
        // Nothing may be persisted on a forbidden request.
        assert!(store.vehicle("veh-1").unwrap().issues.is_empty());
    }

    #[tokio::test]
    async fn camry_end_to_end_with_empty_context() {
        let store = FakeStore::with_vehicle(camry("user-1"));
        let vectors = FakeVectors::empty();
        let llm = FakeLlm::returning(
            r#"Here is my analysis: {"likely_causes":["loose heat shield"],"severity":"low","recommended_actions":["inspect heat shield"],"diagnostic_codes":[],"explanation":"..."} Hope this helps!"#,
        );

        let response = run_diagnosis(
            &store,
            &vectors,
            &llm,
            "user-1",
            &request("engine rattles at idle", Vec::new()),
        )
        .await
        .unwrap();

        assert_eq!(response.diagnosis["severity"], "low");
        assert_eq!(response.diagnosis["likely_causes"][0], "loose heat shield");

        // Exactly one issue was appended, and the returned id is the one
        // embedded in the updated record.
        let vehicle = store.vehicle("veh-1").unwrap();
        assert_eq!(vehicle.issues.len(), 1);
        assert_eq!(vehicle.issues[0].id, response.issue_id);
        assert_eq!(vehicle.issues[0].severity, IssueSeverity::Low);
        assert!(vehicle.issues[0].diagnostic_codes.is_empty());
        assert_eq!(vehicle.issues[0].description, "engine rattles at idle");
    }

    #[tokio::test]
    async fn llm_transport_failure_is_upstream_and_persists_nothing() {
        let store = FakeStore::with_vehicle(camry("user-1"));
        let vectors = FakeVectors::empty();
        let llm = FakeLlm::failing();

        let result = run_diagnosis(
            &store,
            &vectors,
            &llm,
            "user-1",
            &request("engine rattles at idle", Vec::new()),
        )
        .await;

        assert!(matches!(result, Err(PortError::Upstream(_))));
        assert!(store.vehicle("veh-1").unwrap().issues.is_empty());
    }

    #[tokio::test]
    async fn unrecognized_severity_is_stored_as_medium() {
        let store = FakeStore::with_vehicle(camry("user-1"));
        let vectors = FakeVectors::empty();
        let llm = FakeLlm::returning(r#"{"severity":"catastrophic","likely_causes":[]}"#);

        let response = run_diagnosis(
            &store,
            &vectors,
            &llm,
            "user-1",
            &request("brake pedal goes to the floor", Vec::new()),
        )
        .await
        .unwrap();

        // The payload keeps what the model said; the stored issue is coerced.
        assert_eq!(response.diagnosis["severity"], "catastrophic");
        let vehicle = store.vehicle("veh-1").unwrap();
        assert_eq!(vehicle.issues[0].severity, IssueSeverity::Medium);
    }

    #[tokio::test]
    async fn caller_obd_codes_are_merged_with_parsed_codes() {
        let store = FakeStore::with_vehicle(camry("user-1"));
        let vectors = FakeVectors::empty();
        let llm =
            FakeLlm::returning(r#"{"severity":"high","diagnostic_codes":["P0300","P0301"]}"#);

        run_diagnosis(
            &store,
            &vectors,
            &llm,
            "user-1",
            &request("misfire under load", vec!["P1234".to_string()]),
        )
        .await
        .unwrap();

        let vehicle = store.vehicle("veh-1").unwrap();
        assert_eq!(
            vehicle.issues[0].diagnostic_codes,
            vec!["P0300", "P0301", "P1234"]
        );
    }

    #[tokio::test]
    async fn unparseable_output_degrades_to_the_fallback_payload() {
        let store = FakeStore::with_vehicle(camry("user-1"));
        let vectors = FakeVectors::empty();
        let llm = FakeLlm::returning("It could be many things, hard to say without a look.");

        let response = run_diagnosis(
            &store,
            &vectors,
            &llm,
            "user-1",
            &request("strange smell", Vec::new()),
        )
        .await
        .unwrap();

        assert_eq!(response.diagnosis["severity"], "unknown");
        assert_eq!(
            response.diagnosis["explanation"],
            "It could be many things, hard to say without a look."
        );
        // "unknown" is outside the taxonomy, so the issue lands as medium.
        let vehicle = store.vehicle("veh-1").unwrap();
        assert_eq!(vehicle.issues[0].severity, IssueSeverity::Medium);
    }

    #[tokio::test]
    async fn retrieval_query_carries_vehicle_facts() {
        let store = FakeStore::with_vehicle(camry("user-1"));
        let vectors = FakeVectors::empty();
        let llm = FakeLlm::returning("{}");

        run_diagnosis(
            &store,
            &vectors,
            &llm,
            "user-1",
            &request("engine rattles at idle", Vec::new()),
        )
        .await
        .unwrap();

        let query = vectors.last_query.lock().unwrap().clone().unwrap();
        assert_eq!(query, "Toyota Camry engine rattles at idle");
    }

    //-----------------------------------------------------------------------------
    // Repair guide
    //-----------------------------------------------------------------------------

    fn camry_with_issue(owner: &str) -> Vehicle {
        let mut vehicle = camry(owner);
        vehicle.issues.push(VehicleIssue {
            id: "issue-1".to_string(),
            title: "Issue on 2024-05-01".to_string(),
            description: "engine rattles at idle".to_string(),
            severity: IssueSeverity::Low,
            resolved: false,
            resolution: None,
            diagnostic_codes: vec!["P0300".to_string()],
            created_at: Utc::now(),
        });
        vehicle
    }

    #[tokio::test]
    async fn repair_guide_returns_structured_payload() {
        let store = FakeStore::with_vehicle(camry_with_issue("user-1"));
        let llm = FakeLlm::returning(
            r#"{"Safety Precautions":["disconnect battery"],"Tools Required":["socket set"]}"#,
        );

        let guide = run_repair_guide(&store, &llm, "user-1", "veh-1", "issue-1")
            .await
            .unwrap();
        assert_eq!(guide["Safety Precautions"][0], "disconnect battery");
    }

    #[tokio::test]
    async fn repair_guide_wraps_unparseable_output() {
        let store = FakeStore::with_vehicle(camry_with_issue("user-1"));
        let llm = FakeLlm::returning("Step one: find the rattle. Step two: stop it.");

        let guide = run_repair_guide(&store, &llm, "user-1", "veh-1", "issue-1")
            .await
            .unwrap();
        assert_eq!(
            guide["raw_guide"],
            "Step one: find the rattle. Step two: stop it."
        );
    }

    #[tokio::test]
    async fn repair_guide_for_unknown_issue_is_not_found() {
        let store = FakeStore::with_vehicle(camry_with_issue("user-1"));
        let llm = FakeLlm::returning("{}");

        let result = run_repair_guide(&store, &llm, "user-1", "veh-1", "issue-404").await;
        assert!(matches!(result, Err(PortError::NotFound(_))));
    }

    #[tokio::test]
    async fn repair_guide_enforces_ownership() {
        let store = FakeStore::with_vehicle(camry_with_issue("user-b"));
        let llm = FakeLlm::returning("{}");

        let result = run_repair_guide(&store, &llm, "user-a", "veh-1", "issue-1").await;
        assert!(matches!(result, Err(PortError::Forbidden(_))));
    }
}
