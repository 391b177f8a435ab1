//! crates/autofix_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use crate::domain::{
    ChunkRecord, NewIssue, NewUser, NewVehicle, ScoredChunk, User, UserCredentials, Vehicle,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Upstream service failure: {0}")]
    Upstream(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// A finite stream of generated text fragments. A failure mid-stream ends
/// the stream; callers keep whatever was accumulated before the error.
pub type GenerationStream = Pin<Box<dyn Stream<Item = PortResult<String>> + Send>>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// The document store: users, vehicles, and the issues embedded in them.
///
/// Identifiers are opaque strings assigned by the store; callers never supply
/// one on create. Reads that find nothing return `Ok(None)`, never an error;
/// the web boundary translates absence into a not-found response.
#[async_trait]
pub trait VehicleStore: Send + Sync {
    // --- User Management ---
    async fn create_user(&self, user: NewUser) -> PortResult<User>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<Option<UserCredentials>>;

    // --- Vehicle Management ---
    async fn create_vehicle(&self, vehicle: NewVehicle) -> PortResult<String>;

    async fn get_vehicle(&self, vehicle_id: &str) -> PortResult<Option<Vehicle>>;

    async fn get_vehicles_by_user(&self, user_id: &str) -> PortResult<Vec<Vehicle>>;

    // --- Vehicle Issue Management ---

    /// Atomically pushes an issue onto the vehicle's embedded issue list.
    /// The store assigns the issue id before insertion and returns it only
    /// if exactly one document was modified; `Ok(None)` means the vehicle
    /// was gone by the time the push ran.
    async fn add_issue_to_vehicle(
        &self,
        vehicle_id: &str,
        issue: NewIssue,
    ) -> PortResult<Option<String>>;

    /// Marks an embedded issue resolved with the given resolution text.
    /// `Ok(None)` when no matching vehicle/issue pair exists.
    async fn resolve_issue(
        &self,
        vehicle_id: &str,
        issue_id: &str,
        resolution: &str,
    ) -> PortResult<Option<()>>;
}

/// Named collections of text chunks indexed for similarity search.
#[async_trait]
pub trait VectorSearchService: Send + Sync {
    /// Creates the collection if it does not exist yet. Idempotent.
    async fn ensure_collection(&self, name: &str) -> PortResult<()>;

    /// Adds chunks to a collection, creating it implicitly if unknown.
    async fn add(&self, collection: &str, chunks: Vec<ChunkRecord>) -> PortResult<()>;

    /// Returns the `top_n` chunks most similar to `text`, best first.
    /// Querying an unknown collection returns an empty result and logs
    /// rather than failing the caller.
    async fn query(
        &self,
        collection: &str,
        text: &str,
        top_n: usize,
    ) -> PortResult<Vec<ScoredChunk>>;
}

/// Turns text into embedding vectors for the vector store.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed(&self, text: &str) -> PortResult<Vec<f32>>;

    async fn embed_batch(&self, texts: &[String]) -> PortResult<Vec<Vec<f32>>>;
}

/// A text-generation backend.
///
/// Transport and HTTP-status failures surface as `PortError::Upstream`, never
/// as text pretending to be model output, so callers can branch on the result
/// without string inspection.
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Generates a single completion for the prompt.
    async fn generate(&self, prompt: &str, system_prompt: Option<&str>) -> PortResult<String>;

    /// Generates a completion as a finite stream of partial fragments.
    /// Not restartable: a failure mid-stream yields whatever was accumulated.
    async fn generate_stream(
        &self,
        prompt: &str,
        temperature: Option<f32>,
    ) -> PortResult<GenerationStream>;
}
