use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::parse_timestamp;
use crate::transport::ApiError;

/// A user profile as the legacy API returns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyUser {
    #[serde(rename = "_id")]
    pub id: Value,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub created_at: String,
}

impl LegacyUser {
    /// The id arrives as a decimal string; older responses used a number.
    pub fn numeric_id(&self) -> Option<i64> {
        match &self.id {
            Value::String(id) => id.parse().ok(),
            Value::Number(id) => id.as_i64(),
            _ => None,
        }
    }

    pub fn created_at_seconds(&self) -> Option<f64> {
        parse_timestamp(&self.created_at)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LegacyUsers {
    #[serde(default)]
    pub users: Vec<LegacyUser>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelixStream {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub user_login: String,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HelixStreams {
    #[serde(default)]
    pub data: Vec<HelixStream>,
}

impl HelixStreams {
    /// The live stream, if any. An empty list means the channel is offline.
    pub fn live(&self) -> Option<&HelixStream> {
        self.data.iter().find(|stream| stream.kind == "live")
    }
}

pub fn parse_legacy_users(body: &str) -> Result<LegacyUsers, ApiError> {
    Ok(serde_json::from_str(body)?)
}

pub fn parse_legacy_user(body: &str) -> Result<LegacyUser, ApiError> {
    Ok(serde_json::from_str(body)?)
}

pub fn parse_streams(body: &str) -> Result<HelixStreams, ApiError> {
    Ok(serde_json::from_str(body)?)
}
