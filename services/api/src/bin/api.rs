//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{
        HuggingFaceGeneration, MongoVehicleStore, OllamaEmbeddings, OllamaGeneration,
        QdrantVectorSearch,
    },
    config::{Config, LlmBackend},
    error::ApiError,
    web::{
        auth::{login_handler, register_handler},
        chat::{chat_handler, upload_documents_handler},
        diagnostics::{
            diagnose_issue_handler, repair_guide_handler, CODES_COLLECTION, KNOWLEDGE_COLLECTION,
            REPAIR_COLLECTION,
        },
        middleware::require_auth,
        state::{AppState, ConversationRegistry},
        vehicles::{
            create_vehicle_handler, get_vehicle_handler, list_vehicles_handler,
            resolve_issue_handler,
        },
        ApiDoc,
    },
};
use autofix_core::ports::{GenerationService, VectorSearchService};
use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use mongodb::bson::doc;
use qdrant_client::Qdrant;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to the Document Store ---
    info!("Connecting to MongoDB...");
    let mongo_client = mongodb::Client::with_uri_str(&config.mongodb_uri).await?;
    let db = mongo_client.database(&config.mongodb_db_name);
    db.run_command(doc! { "ping": 1 }).await?;
    info!("Connected to MongoDB");

    let store = Arc::new(MongoVehicleStore::new(&db));
    store.init_indexes().await?;

    // --- 3. Connect to the Vector Store ---
    let mut qdrant_builder = Qdrant::from_url(&config.qdrant_url);
    if let Some(api_key) = &config.qdrant_api_key {
        qdrant_builder = qdrant_builder.api_key(api_key.clone());
    }
    let qdrant = qdrant_builder.build()?;

    let http = reqwest::Client::new();
    let embedder = Arc::new(OllamaEmbeddings::new(
        http.clone(),
        &config.ollama_base_url,
        config.embedding_model.clone(),
    ));
    let vectors = Arc::new(QdrantVectorSearch::new(
        qdrant,
        embedder,
        config.embedding_dimension,
    ));

    // The knowledge-base collections are created lazily and idempotently.
    for name in [KNOWLEDGE_COLLECTION, REPAIR_COLLECTION, CODES_COLLECTION] {
        vectors.ensure_collection(name).await?;
    }

    // --- 4. Initialize the Generation Backend ---
    let llm: Arc<dyn GenerationService> = match config.llm_backend {
        LlmBackend::Ollama => Arc::new(OllamaGeneration::new(
            http.clone(),
            &config.ollama_base_url,
            config.ollama_model.clone(),
        )),
        LlmBackend::HuggingFace => {
            let api_key = config.huggingface_api_key.clone().ok_or_else(|| {
                ApiError::Internal(
                    "HUGGINGFACE_API_KEY is required when LLM_BACKEND=huggingface".to_string(),
                )
            })?;
            Arc::new(HuggingFaceGeneration::new(
                http.clone(),
                &config.huggingface_model,
                api_key,
            ))
        }
    };

    // --- 5. Build the Shared AppState ---
    let app_state = AppState {
        config: config.clone(),
        store,
        vectors,
        llm,
        conversations: ConversationRegistry::new(),
    };

    let cors = CorsLayer::new()
        .allow_origin("http://localhost:3000".parse::<HeaderValue>().unwrap())
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 6. Create the Web Router ---
    // Public routes (no auth required); the chat prototype is deliberately
    // unauthenticated and non-persistent.
    let public_routes = Router::new()
        .route("/api/auth/register", post(register_handler))
        .route("/api/auth/login", post(login_handler))
        .route("/upload-documents/", post(upload_documents_handler))
        .route("/chat/", post(chat_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route(
            "/api/vehicles",
            post(create_vehicle_handler).get(list_vehicles_handler),
        )
        .route("/api/vehicles/{vehicle_id}", get(get_vehicle_handler))
        .route(
            "/api/vehicles/{vehicle_id}/issues/{issue_id}/resolve",
            post(resolve_issue_handler),
        )
        .route("/api/diagnostics/", post(diagnose_issue_handler))
        .route(
            "/api/diagnostics/repair-guide/{issue_id}",
            get(repair_guide_handler),
        )
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    // Combine API routes
    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024))
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 7. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
