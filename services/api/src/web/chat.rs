//! services/api/src/web/chat.rs
//!
//! The document-chat prototype endpoints. Unlike the rest of the API these
//! are unauthenticated and non-persistent: uploaded documents and chat
//! history live in an in-memory conversation registry, addressed by
//! conversation id on every call.

use axum::{
    extract::{Multipart, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::{port_error_response, state::AppState, state::FileSummary};
use autofix_core::chunk::chunk_text;
use autofix_core::domain::{ChatMessage, ChatRole, ChunkRecord};
use autofix_core::prompts;

/// Chunking parameters for uploaded documents.
const CHUNK_SIZE: usize = 1000;
const CHUNK_OVERLAP: usize = 200;

/// How many chunks a chat turn retrieves.
const CHAT_TOP_N: usize = 4;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct UploadParams {
    /// Continue an existing conversation, or omit to start a new one.
    pub conversation_id: Option<Uuid>,
}

#[derive(Serialize, ToSchema)]
pub struct FileSummaryResponse {
    pub file_name: String,
    pub summary: String,
}

#[derive(Serialize, ToSchema)]
pub struct UploadResponse {
    pub conversation_id: Uuid,
    pub message: String,
    pub summaries: Vec<FileSummaryResponse>,
}

fn default_temperature() -> f32 {
    0.1
}

fn default_memory_size() -> usize {
    3
}

#[derive(Deserialize, ToSchema)]
pub struct ChatRequest {
    pub conversation_id: Uuid,
    pub prompt: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_memory_size")]
    pub memory_size: usize,
}

#[derive(Serialize, ToSchema)]
pub struct RelevantChunk {
    pub text: String,
    pub score: f32,
}

#[derive(Serialize, ToSchema)]
pub struct ChatResponse {
    pub response: String,
    pub relevant_chunks: Vec<RelevantChunk>,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /upload-documents/ - Chunk, embed, and summarize uploaded files
#[utoipa::path(
    post,
    path = "/upload-documents/",
    request_body(content_type = "multipart/form-data", description = "The documents to upload."),
    params(("conversation_id" = Option<Uuid>, Query, description = "Continue an existing conversation")),
    responses(
        (status = 200, description = "Documents processed successfully", body = UploadResponse),
        (status = 400, description = "Bad request (e.g., no file or non-UTF-8 content)"),
        (status = 502, description = "Embedding or generation backend failure")
    )
)]
pub async fn upload_documents_handler(
    State(state): State<AppState>,
    Query(params): Query<UploadParams>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    // 1. Read every uploaded file into memory.
    let mut files: Vec<(String, String)> = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to read multipart data: {}", e),
        )
    })? {
        let name = field.file_name().unwrap_or("untitled.txt").to_string();
        let text = field.text().await.map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                format!("Uploaded file is not valid UTF-8 text: {}", e),
            )
        })?;
        files.push((name, text));
    }
    if files.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Multipart form must include at least one file".to_string(),
        ));
    }

    // 2. Resolve the conversation this upload belongs to.
    let (conversation_id, conversation) =
        state.conversations.get_or_create(params.conversation_id).await;
    let mut conversation = conversation.lock().await;

    // 3. Chunk and index each file, then summarize it.
    for (file_name, text) in &files {
        let records: Vec<ChunkRecord> = chunk_text(text, CHUNK_SIZE, CHUNK_OVERLAP)
            .into_iter()
            .enumerate()
            .map(|(index, chunk)| ChunkRecord {
                id: Uuid::new_v4(),
                text: chunk,
                metadata: json!({ "file_name": file_name, "chunk_index": index }),
            })
            .collect();

        state
            .vectors
            .add(&conversation.collection, records)
            .await
            .map_err(|e| {
                error!("Failed to index uploaded document: {:?}", e);
                port_error_response(&e)
            })?;

        let summary = state
            .llm
            .generate(&prompts::summary_prompt(file_name, text), None)
            .await
            .map_err(|e| {
                error!("Failed to summarize uploaded document: {:?}", e);
                port_error_response(&e)
            })?;

        // Re-uploading a file replaces its previous summary.
        conversation.summaries.retain(|s| &s.file_name != file_name);
        conversation.summaries.push(FileSummary {
            file_name: file_name.clone(),
            summary,
        });
    }
    conversation.has_documents = true;

    // 4. Return the conversation handle and all of its summaries.
    let summaries = conversation
        .summaries
        .iter()
        .map(|s| FileSummaryResponse {
            file_name: s.file_name.clone(),
            summary: s.summary.clone(),
        })
        .collect();

    Ok(Json(UploadResponse {
        conversation_id,
        message: "Documents processed successfully".to_string(),
        summaries,
    }))
}

/// POST /chat/ - Ask a question about a conversation's documents
#[utoipa::path(
    post,
    path = "/chat/",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "The generated answer and the retrieved chunks", body = ChatResponse),
        (status = 400, description = "No documents processed yet"),
        (status = 404, description = "Conversation not found"),
        (status = 502, description = "Retrieval or generation backend failure")
    )
)]
pub async fn chat_handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    // 1. Resolve the conversation.
    let conversation = state
        .conversations
        .get(request.conversation_id)
        .await
        .ok_or((
            StatusCode::NOT_FOUND,
            "Conversation not found".to_string(),
        ))?;
    let mut conversation = conversation.lock().await;

    if !conversation.has_documents {
        return Err((
            StatusCode::BAD_REQUEST,
            "No documents processed yet.".to_string(),
        ));
    }

    // 2. Retrieve the most relevant chunks for the question.
    let matches = state
        .vectors
        .query(&conversation.collection, &request.prompt, CHAT_TOP_N)
        .await
        .map_err(|e| {
            error!("Chat retrieval failed: {:?}", e);
            port_error_response(&e)
        })?;

    // 3. Assemble the prompt from context, summaries, and windowed history.
    let context = matches
        .iter()
        .map(|m| m.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    let summaries = conversation
        .summaries
        .iter()
        .map(|s| format!("{}: {}", s.file_name, s.summary))
        .collect::<Vec<_>>()
        .join("\n\n");
    let memory = prompts::history_window(&conversation.messages, request.memory_size);
    let full_prompt = prompts::chat_prompt(&context, &summaries, &memory, &request.prompt);

    // 4. Stream the completion, concatenating the fragments. A mid-stream
    //    failure keeps whatever was accumulated so far.
    let mut stream = state
        .llm
        .generate_stream(&full_prompt, Some(request.temperature))
        .await
        .map_err(|e| {
            error!("Chat generation failed: {:?}", e);
            port_error_response(&e)
        })?;

    let mut response_text = String::new();
    while let Some(fragment) = stream.next().await {
        match fragment {
            Ok(fragment) => response_text.push_str(&fragment),
            Err(e) => {
                warn!("Generation stream ended early: {:?}", e);
                break;
            }
        }
    }

    // 5. Append the exchange to the conversation history.
    conversation.messages.push(ChatMessage {
        role: ChatRole::User,
        content: request.prompt.clone(),
    });
    conversation.messages.push(ChatMessage {
        role: ChatRole::Assistant,
        content: response_text.clone(),
    });

    Ok(Json(ChatResponse {
        response: response_text,
        relevant_chunks: matches
            .into_iter()
            .map(|m| RelevantChunk {
                text: m.text,
                score: m.score,
            })
            .collect(),
    }))
}
