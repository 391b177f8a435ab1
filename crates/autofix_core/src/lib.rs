pub mod chunk;
pub mod domain;
pub mod extract;
pub mod ports;
pub mod prompts;

pub use domain::{
    ChatMessage, ChatRole, ChunkRecord, IssueSeverity, NewIssue, NewUser, NewVehicle, ScoredChunk,
    User, UserCredentials, Vehicle, VehicleIssue, VehicleType,
};
pub use ports::{
    EmbeddingService, GenerationService, GenerationStream, PortError, PortResult,
    VectorSearchService, VehicleStore,
};
