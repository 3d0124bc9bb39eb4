//! Tool catalogue
//!
//! The dialogue model may call any tool listed here. Names form a closed
//! set; each tool has a typed argument struct whose JSON schema is sent to
//! the model in the session handshake.

use crate::domain::shared::value_objects::CallId;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    GetOrCreateProfile,
    SearchKnowledgeBase,
    ScheduleRide,
    CheckRideStatus,
    CreatePropertyRequest,
    TransferToHuman,
}

impl ToolName {
    pub const ALL: [ToolName; 6] = [
        ToolName::GetOrCreateProfile,
        ToolName::SearchKnowledgeBase,
        ToolName::ScheduleRide,
        ToolName::CheckRideStatus,
        ToolName::CreatePropertyRequest,
        ToolName::TransferToHuman,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::GetOrCreateProfile => "get_or_create_profile",
            ToolName::SearchKnowledgeBase => "search_knowledge_base",
            ToolName::ScheduleRide => "schedule_ride",
            ToolName::CheckRideStatus => "check_ride_status",
            ToolName::CreatePropertyRequest => "create_property_request",
            ToolName::TransferToHuman => "transfer_to_human",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|name| name.as_str() == s)
    }

    pub fn description(&self) -> &'static str {
        match self {
            ToolName::GetOrCreateProfile => {
                "Get or create the caller's profile by phone number. Use at the start of the call."
            }
            ToolName::SearchKnowledgeBase => {
                "Search the knowledge base for services, FAQs and how-to guides."
            }
            ToolName::ScheduleRide => "Schedule a ride for the caller.",
            ToolName::CheckRideStatus => "Check the status of a previously scheduled ride.",
            ToolName::CreatePropertyRequest => {
                "Record a property search request for the property team to handle."
            }
            ToolName::TransferToHuman => "Transfer the call to a human agent.",
        }
    }

    fn parameters(&self) -> Value {
        let schema = match self {
            ToolName::GetOrCreateProfile => schemars::schema_for!(GetOrCreateProfileArgs),
            ToolName::SearchKnowledgeBase => schemars::schema_for!(SearchKnowledgeBaseArgs),
            ToolName::ScheduleRide => schemars::schema_for!(ScheduleRideArgs),
            ToolName::CheckRideStatus => schemars::schema_for!(CheckRideStatusArgs),
            ToolName::CreatePropertyRequest => schemars::schema_for!(CreatePropertyRequestArgs),
            ToolName::TransferToHuman => schemars::schema_for!(TransferToHumanArgs),
        };
        let mut value = serde_json::to_value(schema).unwrap_or_else(|_| json!({ "type": "object" }));
        // The model API rejects the draft marker and title on function parameters
        if let Some(obj) = value.as_object_mut() {
            obj.remove("$schema");
            obj.remove("title");
        }
        value
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GetOrCreateProfileArgs {
    /// Phone number in E.164 format
    pub phone_number: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SearchKnowledgeBaseArgs {
    /// Search query in natural language
    pub query: String,
    /// Number of results to return
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum VehicleType {
    Moto,
    Car,
    Van,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScheduleRideArgs {
    /// Pickup address or landmark
    pub pickup_location: String,
    /// Dropoff address or landmark
    pub dropoff_location: String,
    /// ISO 8601 time or "now"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pickup_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_type: Option<VehicleType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passengers: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CheckRideStatusArgs {
    pub ride_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PropertyRequestType {
    Buy,
    Rent,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    Land,
    House,
    Apartment,
    Commercial,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CreatePropertyRequestArgs {
    pub request_type: PropertyRequestType,
    pub property_type: PropertyType,
    /// City and area
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bedrooms: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_min: Option<f64>,
    pub budget_max: f64,
    /// ISO 4217 currency code
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_requirements: Option<String>,
    pub contact_phone: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Department {
    Support,
    Sales,
    Billing,
    Technical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TransferToHumanArgs {
    /// Why the transfer is needed
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<Department>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
}

/// A validated tool call
#[derive(Debug, Clone, PartialEq)]
pub enum ToolInvocation {
    GetOrCreateProfile(GetOrCreateProfileArgs),
    SearchKnowledgeBase(SearchKnowledgeBaseArgs),
    ScheduleRide(ScheduleRideArgs),
    CheckRideStatus(CheckRideStatusArgs),
    CreatePropertyRequest(CreatePropertyRequestArgs),
    TransferToHuman(TransferToHumanArgs),
}

impl ToolInvocation {
    /// Validate the serialized arguments the model sent for `name`.
    /// An empty argument string is treated as `{}`.
    pub fn parse(name: ToolName, arguments: &str) -> Result<Self, serde_json::Error> {
        let raw = if arguments.trim().is_empty() { "{}" } else { arguments };
        Ok(match name {
            ToolName::GetOrCreateProfile => Self::GetOrCreateProfile(serde_json::from_str(raw)?),
            ToolName::SearchKnowledgeBase => Self::SearchKnowledgeBase(serde_json::from_str(raw)?),
            ToolName::ScheduleRide => Self::ScheduleRide(serde_json::from_str(raw)?),
            ToolName::CheckRideStatus => Self::CheckRideStatus(serde_json::from_str(raw)?),
            ToolName::CreatePropertyRequest => {
                Self::CreatePropertyRequest(serde_json::from_str(raw)?)
            }
            ToolName::TransferToHuman => Self::TransferToHuman(serde_json::from_str(raw)?),
        })
    }

    pub fn name(&self) -> ToolName {
        match self {
            Self::GetOrCreateProfile(_) => ToolName::GetOrCreateProfile,
            Self::SearchKnowledgeBase(_) => ToolName::SearchKnowledgeBase,
            Self::ScheduleRide(_) => ToolName::ScheduleRide,
            Self::CheckRideStatus(_) => ToolName::CheckRideStatus,
            Self::CreatePropertyRequest(_) => ToolName::CreatePropertyRequest,
            Self::TransferToHuman(_) => ToolName::TransferToHuman,
        }
    }

    /// Normalized arguments, as forwarded to business operations
    pub fn arguments(&self) -> Value {
        let value = match self {
            Self::GetOrCreateProfile(args) => serde_json::to_value(args),
            Self::SearchKnowledgeBase(args) => serde_json::to_value(args),
            Self::ScheduleRide(args) => serde_json::to_value(args),
            Self::CheckRideStatus(args) => serde_json::to_value(args),
            Self::CreatePropertyRequest(args) => serde_json::to_value(args),
            Self::TransferToHuman(args) => serde_json::to_value(args),
        };
        value.unwrap_or(Value::Null)
    }
}

/// Tool definition advertised to the dialogue model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

/// Definitions for every tool in the catalogue
pub fn catalogue() -> Vec<ToolDefinition> {
    ToolName::ALL
        .into_iter()
        .map(|name| ToolDefinition {
            kind: "function",
            name: name.as_str(),
            description: name.description(),
            parameters: name.parameters(),
        })
        .collect()
}

/// Structured result returned to the model: `{success, data?, error?}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolOutcome {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| json!({ "success": false }))
    }

    /// Serialized form carried in the function-call output frame
    pub fn to_output_string(&self) -> String {
        self.to_value().to_string()
    }
}

/// Context a business operation runs in
#[derive(Debug, Clone, PartialEq)]
pub struct ToolContext {
    pub call_id: CallId,
    pub from_address: String,
    pub agent_id: Option<String>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OperationError {
    /// Worth retrying: upstream unavailable, timeouts, 5xx
    #[error("operation unavailable: {0}")]
    Unavailable(String),
    /// The operation ran and refused the request
    #[error("{0}")]
    Rejected(String),
}

impl OperationError {
    pub fn is_transient(&self) -> bool {
        matches!(self, OperationError::Unavailable(_))
    }
}

/// Internal business operations behind the tools.
///
/// Handlers must be idempotent: a tool call may execute more than once.
#[async_trait]
pub trait BusinessOperations: Send + Sync {
    async fn execute(
        &self,
        context: &ToolContext,
        invocation: &ToolInvocation,
    ) -> Result<Value, OperationError>;
}
