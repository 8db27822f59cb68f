use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Leader-only key/value settings of one service.
pub type Settings = HashMap<String, String>;

pub const CODE_NOT_FOUND: &str = "not found";
pub const CODE_UNAUTHORIZED: &str = "unauthorized access";
pub const CODE_LEASE_HELD: &str = "lease held";
pub const CODE_NOT_LEADER: &str = "not leader";
pub const CODE_INVALID: &str = "invalid";
pub const CODE_TRY_AGAIN: &str = "try again";
pub const CODE_NOT_IMPLEMENTED: &str = "not implemented";

/// Error as it travels over the wire. `code` is empty for unclassified
/// errors; `info` carries structured details for some codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Error {
    pub message: String,
    #[serde(default)]
    pub code: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub info: HashMap<String, String>,
}

impl Error {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: code.to_string(),
            info: HashMap::new(),
        }
    }

    pub fn with_info(mut self, key: &str, value: impl Into<String>) -> Self {
        self.info.insert(key.to_string(), value.into());
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for Error {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Entity {
    pub tag: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Entities {
    pub entities: Vec<Entity>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ErrorResult {
    pub error: Option<Error>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ErrorResults {
    pub results: Vec<ErrorResult>,
}

/// Parameters for a bulk leadership claim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClaimLeadershipBulkParams {
    pub params: Vec<ClaimLeadershipParams>,
}

/// One claim: the unit asking to lead the service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClaimLeadershipParams {
    pub service_tag: String,
    pub unit_tag: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClaimLeadershipBulkResults {
    pub results: Vec<ClaimLeadershipResults>,
}

/// Outcome of one claim. `claim_duration_in_sec` is the number of seconds
/// the claim will be held, zero when `error` is set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClaimLeadershipResults {
    pub service_tag: String,
    pub claim_duration_in_sec: f64,
    pub error: Option<Error>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReleaseLeadershipBulkParams {
    pub params: Vec<ReleaseLeadershipParams>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReleaseLeadershipParams {
    pub service_tag: String,
    pub unit_tag: String,
}

pub type ReleaseLeadershipBulkResults = ErrorResults;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetLeadershipSettingsBulkResults {
    pub results: Vec<GetLeadershipSettingsResult>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetLeadershipSettingsResult {
    pub settings: Settings,
    pub error: Option<Error>,
}

/// Parameters for a bulk merge of leadership settings. The merging unit
/// is the authenticated caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MergeLeadershipSettingsBulkParams {
    pub params: Vec<MergeLeadershipSettingsParam>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MergeLeadershipSettingsParam {
    pub service_tag: String,
    pub settings: Settings,
}
