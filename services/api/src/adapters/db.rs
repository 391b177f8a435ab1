//! services/api/src/adapters/db.rs
//!
//! This module contains the document-store adapter, which is the concrete
//! implementation of the `VehicleStore` port from the `core` crate. It handles
//! all interactions with MongoDB: users and vehicles are top-level documents,
//! and a vehicle's issues are embedded in the vehicle document itself.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, to_bson},
    options::IndexOptions,
    Collection, Database, IndexModel,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use autofix_core::domain::{
    IssueSeverity, NewIssue, NewUser, NewVehicle, User, UserCredentials, Vehicle, VehicleIssue,
    VehicleType,
};
use autofix_core::ports::{PortError, PortResult, VehicleStore};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A document-store adapter that implements the `VehicleStore` port.
#[derive(Clone)]
pub struct MongoVehicleStore {
    users: Collection<UserRecord>,
    vehicles: Collection<VehicleRecord>,
}

impl MongoVehicleStore {
    /// Creates a new `MongoVehicleStore` over the given database handle.
    pub fn new(db: &Database) -> Self {
        Self {
            users: db.collection::<UserRecord>("users"),
            vehicles: db.collection::<VehicleRecord>("vehicles"),
        }
    }

    /// Creates the indexes the store relies on. Run once at startup.
    pub async fn init_indexes(&self) -> Result<(), mongodb::error::Error> {
        let email_index = IndexModel::builder()
            .keys(doc! { "email": 1 })
            .options(
                IndexOptions::builder()
                    .unique(true)
                    .name("idx_email_unique".to_string())
                    .build(),
            )
            .build();
        self.users.create_index(email_index).await?;

        let owner_index = IndexModel::builder()
            .keys(doc! { "user_id": 1 })
            .options(IndexOptions::builder().name("idx_user_id".to_string()).build())
            .build();
        self.vehicles.create_index(owner_index).await?;

        info!("Document store indexes ready");
        Ok(())
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(Debug, Serialize, Deserialize)]
struct UserRecord {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    email: String,
    hashed_password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_name: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRecord {
    fn from_new(user: NewUser) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            email: user.email,
            hashed_password: user.hashed_password,
            first_name: user.first_name,
            last_name: user.last_name,
            created_at: now,
            updated_at: now,
        }
    }

    fn to_domain(self, id: ObjectId) -> User {
        User {
            id: id.to_hex(),
            email: self.email,
            first_name: self.first_name,
            last_name: self.last_name,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    fn to_credentials(self) -> Option<UserCredentials> {
        let id = self.id?;
        Some(UserCredentials {
            id: id.to_hex(),
            email: self.email,
            hashed_password: self.hashed_password,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct IssueRecord {
    id: String,
    title: String,
    description: String,
    severity: IssueSeverity,
    resolved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    resolution: Option<String>,
    #[serde(default)]
    diagnostic_codes: Vec<String>,
    created_at: DateTime<Utc>,
}

impl IssueRecord {
    /// Builds a record for insertion, assigning the issue its own id.
    /// New issues always start unresolved.
    fn from_new(issue: NewIssue) -> Self {
        Self {
            id: ObjectId::new().to_hex(),
            title: issue.title,
            description: issue.description,
            severity: issue.severity,
            resolved: false,
            resolution: None,
            diagnostic_codes: issue.diagnostic_codes,
            created_at: Utc::now(),
        }
    }

    fn to_domain(self) -> VehicleIssue {
        VehicleIssue {
            id: self.id,
            title: self.title,
            description: self.description,
            severity: self.severity,
            resolved: self.resolved,
            resolution: self.resolution,
            diagnostic_codes: self.diagnostic_codes,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct VehicleRecord {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    user_id: String,
    make: String,
    model: String,
    year: i32,
    vehicle_type: VehicleType,
    #[serde(skip_serializing_if = "Option::is_none")]
    vin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mileage: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_service_date: Option<DateTime<Utc>>,
    #[serde(default)]
    issues: Vec<IssueRecord>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl VehicleRecord {
    fn from_new(vehicle: NewVehicle) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            user_id: vehicle.user_id,
            make: vehicle.make,
            model: vehicle.model,
            year: vehicle.year,
            vehicle_type: vehicle.vehicle_type,
            vin: vehicle.vin,
            mileage: vehicle.mileage,
            last_service_date: vehicle.last_service_date,
            issues: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn to_domain(self) -> PortResult<Vehicle> {
        let id = self
            .id
            .ok_or_else(|| PortError::Unexpected("Vehicle record is missing its _id".to_string()))?;
        Ok(Vehicle {
            id: id.to_hex(),
            user_id: self.user_id,
            make: self.make,
            model: self.model,
            year: self.year,
            vehicle_type: self.vehicle_type,
            vin: self.vin,
            mileage: self.mileage,
            last_service_date: self.last_service_date,
            issues: self.issues.into_iter().map(IssueRecord::to_domain).collect(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

//=========================================================================================
// `VehicleStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl VehicleStore for MongoVehicleStore {
    async fn create_user(&self, user: NewUser) -> PortResult<User> {
        let record = UserRecord::from_new(user);
        let result = self
            .users
            .insert_one(&record)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let id = result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| PortError::Unexpected("Store returned a non-ObjectId user id".to_string()))?;
        Ok(record.to_domain(id))
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<Option<UserCredentials>> {
        let record = self
            .users
            .find_one(doc! { "email": email })
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(record.and_then(UserRecord::to_credentials))
    }

    async fn create_vehicle(&self, vehicle: NewVehicle) -> PortResult<String> {
        let record = VehicleRecord::from_new(vehicle);
        let result = self
            .vehicles
            .insert_one(&record)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let id = result.inserted_id.as_object_id().ok_or_else(|| {
            PortError::Unexpected("Store returned a non-ObjectId vehicle id".to_string())
        })?;
        info!(vehicle_id = %id, "Vehicle created");
        Ok(id.to_hex())
    }

    async fn get_vehicle(&self, vehicle_id: &str) -> PortResult<Option<Vehicle>> {
        // A malformed id cannot match any stored document.
        let Ok(oid) = ObjectId::parse_str(vehicle_id) else {
            return Ok(None);
        };

        let record = self
            .vehicles
            .find_one(doc! { "_id": oid })
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        record.map(VehicleRecord::to_domain).transpose()
    }

    async fn get_vehicles_by_user(&self, user_id: &str) -> PortResult<Vec<Vehicle>> {
        let cursor = self
            .vehicles
            .find(doc! { "user_id": user_id })
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        let records: Vec<VehicleRecord> = cursor
            .try_collect()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        records.into_iter().map(VehicleRecord::to_domain).collect()
    }

    async fn add_issue_to_vehicle(
        &self,
        vehicle_id: &str,
        issue: NewIssue,
    ) -> PortResult<Option<String>> {
        let Ok(oid) = ObjectId::parse_str(vehicle_id) else {
            return Ok(None);
        };

        let record = IssueRecord::from_new(issue);
        let issue_id = record.id.clone();
        let issue_bson =
            to_bson(&record).map_err(|e| PortError::Unexpected(e.to_string()))?;

        let result = self
            .vehicles
            .update_one(
                doc! { "_id": oid },
                doc! {
                    "$push": { "issues": issue_bson },
                    "$set": { "updated_at": Utc::now().to_rfc3339() },
                },
            )
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        // The push is atomic; anything other than exactly one modified
        // document means the vehicle was gone when the update ran.
        if result.modified_count == 1 {
            info!(vehicle_id, issue_id = %issue_id, "Issue appended to vehicle");
            Ok(Some(issue_id))
        } else {
            Ok(None)
        }
    }

    async fn resolve_issue(
        &self,
        vehicle_id: &str,
        issue_id: &str,
        resolution: &str,
    ) -> PortResult<Option<()>> {
        let Ok(oid) = ObjectId::parse_str(vehicle_id) else {
            return Ok(None);
        };

        let result = self
            .vehicles
            .update_one(
                doc! { "_id": oid, "issues.id": issue_id },
                doc! {
                    "$set": {
                        "issues.$.resolved": true,
                        "issues.$.resolution": resolution,
                        "updated_at": Utc::now().to_rfc3339(),
                    },
                },
            )
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        if result.matched_count == 1 {
            info!(vehicle_id, issue_id, "Issue marked resolved");
            Ok(Some(()))
        } else {
            Ok(None)
        }
    }
}
