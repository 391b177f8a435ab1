//! crates/autofix_core/src/prompts.rs
//!
//! Pure prompt assembly for the diagnosis, repair-guide, summary, and chat
//! flows. Every template instructs the model to answer in JSON where the
//! caller parses JSON; compliance is checked by the response parser, not here.

use crate::domain::{ChatMessage, ChatRole, Vehicle};

pub const DIAGNOSIS_SYSTEM_PROMPT: &str = "You are an automotive diagnostic expert. \
Analyze the vehicle information and issue description to provide a diagnosis. \
Classify the severity as low, medium, high, or critical. \
Provide likely causes and recommended actions.";

pub const REPAIR_GUIDE_SYSTEM_PROMPT: &str = "You are an automotive repair expert. \
Create a detailed step-by-step repair guide for the given vehicle issue. \
Include safety precautions, tools needed, and estimated time for each step.";

const DIAGNOSIS_TEMPLATE: &str = r#"Vehicle Information:
- Make: {make}
- Model: {model}
- Year: {year}
- Mileage: {mileage}

Issue Description:
{issue}

Relevant Technical Information:
{context}

Provide a diagnosis in JSON format with the following fields:
- likely_causes: list of potential causes
- severity: severity level (low, medium, high, critical)
- recommended_actions: list of recommended actions
- diagnostic_codes: list of potential OBD-II codes (if applicable)
- explanation: detailed explanation of the diagnosis"#;

const REPAIR_GUIDE_TEMPLATE: &str = r#"Vehicle Information:
- Make: {make}
- Model: {model}
- Year: {year}

Issue Description:
{issue}

Diagnostic Codes:
{codes}

Create a detailed repair guide with the following sections:
1. Safety Precautions
2. Tools Required
3. Parts Required (if applicable)
4. Step-by-Step Instructions
5. Estimated Time
6. Tips and Warnings

Format the response in JSON with these sections as keys."#;

const SUMMARY_TEMPLATE: &str = r#"Summarize the following document in a few sentences, keeping the
technical details a mechanic would care about.

Document name: {file_name}

{text}"#;

const CHAT_TEMPLATE: &str = r#"You are an assistant answering questions about the user's uploaded
vehicle documents. Ground your answer in the context and summaries below; if
they do not cover the question, say so instead of guessing.

Context:
{context}

Document summaries:
{summaries}

Conversation so far:
{memory}

Question:
{question}

Answer:"#;

/// Builds the diagnosis prompt from vehicle facts, the reported issue, and
/// the retrieved knowledge-base context (possibly empty).
pub fn diagnosis_prompt(vehicle: &Vehicle, issue_description: &str, context: &str) -> String {
    let mileage = vehicle
        .mileage
        .map(|m| m.to_string())
        .unwrap_or_else(|| "Unknown".to_string());

    DIAGNOSIS_TEMPLATE
        .replace("{make}", &vehicle.make)
        .replace("{model}", &vehicle.model)
        .replace("{year}", &vehicle.year.to_string())
        .replace("{mileage}", &mileage)
        .replace("{issue}", issue_description)
        .replace("{context}", context)
}

/// Builds the repair-guide prompt for an existing issue on a vehicle.
pub fn repair_guide_prompt(vehicle: &Vehicle, issue_description: &str, codes: &[String]) -> String {
    let codes = if codes.is_empty() {
        "None".to_string()
    } else {
        codes.join(", ")
    };

    REPAIR_GUIDE_TEMPLATE
        .replace("{make}", &vehicle.make)
        .replace("{model}", &vehicle.model)
        .replace("{year}", &vehicle.year.to_string())
        .replace("{issue}", issue_description)
        .replace("{codes}", &codes)
}

/// Builds the per-file summary prompt used during document upload.
pub fn summary_prompt(file_name: &str, text: &str) -> String {
    SUMMARY_TEMPLATE
        .replace("{file_name}", file_name)
        .replace("{text}", text)
}

/// Builds the chat prompt from retrieved context, per-file summaries, the
/// windowed conversation history, and the user's question.
pub fn chat_prompt(context: &str, summaries: &str, memory: &str, question: &str) -> String {
    CHAT_TEMPLATE
        .replace("{context}", context)
        .replace("{summaries}", summaries)
        .replace("{memory}", memory)
        .replace("{question}", question)
}

/// Formats the last `memory_size` exchanges of a conversation verbatim.
/// One exchange is a user message and the assistant reply that follows it;
/// no summarization or token-budget truncation is applied.
pub fn history_window(messages: &[ChatMessage], memory_size: usize) -> String {
    let keep = memory_size.saturating_mul(2);
    let start = messages.len().saturating_sub(keep);

    messages[start..]
        .iter()
        .map(|m| match m.role {
            ChatRole::User => format!("User: {}", m.content),
            ChatRole::Assistant => format!("Assistant: {}", m.content),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
