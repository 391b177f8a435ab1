pub mod db;
pub mod embeddings;
pub mod llm;
pub mod vector;

pub use db::MongoVehicleStore;
pub use embeddings::OllamaEmbeddings;
pub use llm::{HuggingFaceGeneration, OllamaGeneration};
pub use vector::QdrantVectorSearch;
