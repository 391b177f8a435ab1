//! crates/autofix_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format,
//! except for the closed tag enums, which keep their wire spelling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The closed set of vehicle body styles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleType {
    Sedan,
    Suv,
    Truck,
    Hatchback,
    Van,
    Coupe,
    Convertible,
    Wagon,
    Other,
}

/// The closed severity taxonomy for vehicle issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl IssueSeverity {
    /// Parses a severity tag, returning `None` for anything outside the taxonomy.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }

    /// Coerces an arbitrary severity string into the taxonomy.
    /// Anything unrecognized (including the parser's "unknown" fallback)
    /// becomes `Medium`.
    pub fn coerce(tag: &str) -> Self {
        Self::from_tag(tag).unwrap_or(Self::Medium)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

// Represents a user - used throughout app
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Only used internally for login - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub id: String,
    pub email: String,
    pub hashed_password: String,
}

/// Input for creating a user; the store assigns the id and timestamps.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub hashed_password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// A diagnosed problem embedded in a vehicle's issue history.
#[derive(Debug, Clone)]
pub struct VehicleIssue {
    pub id: String,
    pub title: String,
    pub description: String,
    pub severity: IssueSeverity,
    pub resolved: bool,
    pub resolution: Option<String>,
    pub diagnostic_codes: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for appending an issue; the store assigns the id and created_at,
/// and new issues start unresolved.
#[derive(Debug, Clone)]
pub struct NewIssue {
    pub title: String,
    pub description: String,
    pub severity: IssueSeverity,
    pub diagnostic_codes: Vec<String>,
}

/// A vehicle owned by a user. Issues are embedded, not referenced: the
/// vehicle exclusively owns its issue history.
#[derive(Debug, Clone)]
pub struct Vehicle {
    pub id: String,
    pub user_id: String,
    pub make: String,
    pub model: String,
    pub year: i32,
    pub vehicle_type: VehicleType,
    pub vin: Option<String>,
    pub mileage: Option<i64>,
    pub last_service_date: Option<DateTime<Utc>>,
    pub issues: Vec<VehicleIssue>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Vehicle {
    /// Finds an embedded issue by id.
    pub fn issue(&self, issue_id: &str) -> Option<&VehicleIssue> {
        self.issues.iter().find(|i| i.id == issue_id)
    }
}

/// Input for creating a vehicle; the store assigns the id and timestamps.
#[derive(Debug, Clone)]
pub struct NewVehicle {
    pub user_id: String,
    pub make: String,
    pub model: String,
    pub year: i32,
    pub vehicle_type: VehicleType,
    pub vin: Option<String>,
    pub mileage: Option<i64>,
    pub last_service_date: Option<DateTime<Utc>>,
}

/// Who said a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// A single message in a conversation's history.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

/// A text chunk to be indexed in a vector collection.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub id: Uuid,
    pub text: String,
    pub metadata: serde_json::Value,
}

/// A retrieved chunk with its similarity score.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub id: Uuid,
    pub text: String,
    pub score: f32,
    pub metadata: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_coercion_accepts_taxonomy_values() {
        assert_eq!(IssueSeverity::coerce("low"), IssueSeverity::Low);
        assert_eq!(IssueSeverity::coerce("medium"), IssueSeverity::Medium);
        assert_eq!(IssueSeverity::coerce("high"), IssueSeverity::High);
        assert_eq!(IssueSeverity::coerce("critical"), IssueSeverity::Critical);
    }

    #[test]
    fn severity_coercion_defaults_to_medium() {
        assert_eq!(IssueSeverity::coerce("unknown"), IssueSeverity::Medium);
        assert_eq!(IssueSeverity::coerce("SEVERE"), IssueSeverity::Medium);
        assert_eq!(IssueSeverity::coerce(""), IssueSeverity::Medium);
    }
}
