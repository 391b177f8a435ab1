//! services/api/src/adapters/llm.rs
//!
//! This module contains the two text-generation adapters implementing the
//! `GenerationService` port: a local Ollama endpoint and the hosted Hugging
//! Face inference endpoint. Transport and HTTP-status failures surface as
//! `PortError::Upstream`, never as text masquerading as model output.

use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::error;

use autofix_core::ports::{GenerationService, GenerationStream, PortError, PortResult};

//=========================================================================================
// Ollama
//=========================================================================================

/// An adapter that generates text via Ollama's `/api/generate` endpoint.
#[derive(Clone)]
pub struct OllamaGeneration {
    http: reqwest::Client,
    url: String,
    model: String,
}

impl OllamaGeneration {
    /// Creates a new `OllamaGeneration` for the given base URL and model.
    pub fn new(http: reqwest::Client, base_url: &str, model: String) -> Self {
        Self {
            http,
            url: format!("{}/api/generate", base_url.trim_end_matches('/')),
            model,
        }
    }
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

/// One response object; with `stream: true` the endpoint emits a sequence
/// of these as JSON lines.
#[derive(Deserialize)]
struct OllamaFragment {
    #[serde(default)]
    response: String,
}

#[async_trait]
impl GenerationService for OllamaGeneration {
    async fn generate(&self, prompt: &str, system_prompt: Option<&str>) -> PortResult<String> {
        let response = self
            .http
            .post(&self.url)
            .json(&OllamaRequest {
                model: &self.model,
                prompt,
                stream: false,
                system: system_prompt,
                options: None,
            })
            .send()
            .await
            .map_err(|e| PortError::Upstream(format!("Generation request failed: {}", e)))?
            .error_for_status()
            .map_err(|e| PortError::Upstream(format!("Generation request failed: {}", e)))?;

        let fragment: OllamaFragment = response
            .json()
            .await
            .map_err(|e| PortError::Upstream(format!("Malformed generation response: {}", e)))?;
        Ok(fragment.response)
    }

    async fn generate_stream(
        &self,
        prompt: &str,
        temperature: Option<f32>,
    ) -> PortResult<GenerationStream> {
        let response = self
            .http
            .post(&self.url)
            .json(&OllamaRequest {
                model: &self.model,
                prompt,
                stream: true,
                system: None,
                options: temperature.map(|t| OllamaOptions { temperature: t }),
            })
            .send()
            .await
            .map_err(|e| PortError::Upstream(format!("Generation request failed: {}", e)))?
            .error_for_status()
            .map_err(|e| PortError::Upstream(format!("Generation request failed: {}", e)))?;

        let mut bytes = response.bytes_stream();

        // The endpoint emits one JSON object per line; unparseable lines are
        // skipped so one garbled fragment does not end the stream.
        let stream = try_stream! {
            let mut buffer: Vec<u8> = Vec::new();
            while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(|e| {
                    error!("Generation stream failed mid-flight: {}", e);
                    PortError::Upstream(format!("Generation stream failed: {}", e))
                })?;
                buffer.extend_from_slice(&chunk);

                while let Some(newline) = buffer.iter().position(|&b| b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=newline).collect();
                    if let Ok(fragment) = serde_json::from_slice::<OllamaFragment>(&line) {
                        if !fragment.response.is_empty() {
                            yield fragment.response;
                        }
                    }
                }
            }

            // A final fragment without a trailing newline.
            if let Ok(fragment) = serde_json::from_slice::<OllamaFragment>(&buffer) {
                if !fragment.response.is_empty() {
                    yield fragment.response;
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

//=========================================================================================
// Hugging Face
//=========================================================================================

/// An adapter that generates text via the hosted Hugging Face inference
/// endpoint for a fixed model.
#[derive(Clone)]
pub struct HuggingFaceGeneration {
    http: reqwest::Client,
    url: String,
    api_key: String,
}

impl HuggingFaceGeneration {
    /// Creates a new `HuggingFaceGeneration` for the given model.
    pub fn new(http: reqwest::Client, model: &str, api_key: String) -> Self {
        Self {
            http,
            url: format!("https://api-inference.huggingface.co/models/{}", model),
            api_key,
        }
    }
}

#[derive(Serialize)]
struct HfRequest<'a> {
    inputs: &'a str,
}

/// The known response shapes of the inference endpoint. Each variant is
/// normalized to a single string explicitly rather than duck-typed.
#[derive(Deserialize)]
#[serde(untagged)]
enum HfResponse {
    Outputs(Vec<HfOutput>),
    Single(HfOutput),
    Raw(serde_json::Value),
}

#[derive(Deserialize)]
struct HfOutput {
    generated_text: Option<String>,
    #[serde(flatten)]
    rest: serde_json::Map<String, serde_json::Value>,
}

impl HfOutput {
    fn into_text(self) -> String {
        self.generated_text
            .unwrap_or_else(|| serde_json::Value::Object(self.rest).to_string())
    }
}

impl HfResponse {
    fn into_text(self) -> String {
        match self {
            Self::Outputs(outputs) => outputs
                .into_iter()
                .next()
                .map(HfOutput::into_text)
                .unwrap_or_default(),
            Self::Single(output) => output.into_text(),
            Self::Raw(value) => value.to_string(),
        }
    }
}

#[async_trait]
impl GenerationService for HuggingFaceGeneration {
    // The hosted endpoint takes a bare prompt; a system prompt has no slot
    // in its request shape and is ignored.
    async fn generate(&self, prompt: &str, _system_prompt: Option<&str>) -> PortResult<String> {
        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&HfRequest { inputs: prompt })
            .send()
            .await
            .map_err(|e| PortError::Upstream(format!("Generation request failed: {}", e)))?
            .error_for_status()
            .map_err(|e| PortError::Upstream(format!("Generation request failed: {}", e)))?;

        let body: HfResponse = response
            .json()
            .await
            .map_err(|e| PortError::Upstream(format!("Malformed generation response: {}", e)))?;
        Ok(body.into_text())
    }

    // The hosted endpoint does not stream; the whole completion arrives as
    // a single-item stream.
    async fn generate_stream(
        &self,
        prompt: &str,
        _temperature: Option<f32>,
    ) -> PortResult<GenerationStream> {
        let text = self.generate(prompt, None).await?;
        Ok(Box::pin(futures::stream::once(async move { Ok(text) })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hf_list_response_uses_generated_text() {
        let body = r#"[{"generated_text": "the alternator is failing"}]"#;
        let response: HfResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.into_text(), "the alternator is failing");
    }

    #[test]
    fn hf_list_response_without_generated_text_is_stringified() {
        let body = r#"[{"score": 0.9}]"#;
        let response: HfResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.into_text(), r#"{"score":0.9}"#);
    }

    #[test]
    fn hf_single_object_response_is_normalized() {
        let body = r#"{"generated_text": "check the battery"}"#;
        let response: HfResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.into_text(), "check the battery");
    }

    #[test]
    fn hf_bare_value_response_is_stringified() {
        let body = r#""unexpected""#;
        let response: HfResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.into_text(), r#""unexpected""#);
    }

    #[test]
    fn hf_empty_list_yields_empty_text() {
        let response: HfResponse = serde_json::from_str("[]").unwrap();
        assert_eq!(response.into_text(), "");
    }

    #[test]
    fn ollama_fragments_tolerate_missing_fields() {
        let fragment: OllamaFragment = serde_json::from_str(r#"{"done": true}"#).unwrap();
        assert_eq!(fragment.response, "");

        let fragment: OllamaFragment =
            serde_json::from_str(r#"{"response": "low", "done": false}"#).unwrap();
        assert_eq!(fragment.response, "low");
    }
}
