//! Server side of the leadership facade.
//!
//! A [`LeadershipFacade`] serves one authenticated unit agent. Every element
//! of a bulk request is authorized and executed on its own; its error lands
//! in its own result slot.

use crate::{
    lease::LeaseCoordinator,
    rpc::{to_wire, Caller},
    Error, Result,
};
use async_trait::async_trait;
use futures::future::join_all;
use proto::{
    ClaimLeadershipBulkParams, ClaimLeadershipBulkResults, ClaimLeadershipParams, ClaimLeadershipResults,
    Entities, Entity, ErrorResult, ErrorResults, GetLeadershipSettingsBulkResults, GetLeadershipSettingsResult,
    MergeLeadershipSettingsBulkParams, MergeLeadershipSettingsParam, ReleaseLeadershipBulkParams,
    ReleaseLeadershipBulkResults, ReleaseLeadershipParams, ServiceTag, UnitTag, CODE_INVALID,
    CODE_NOT_IMPLEMENTED,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const LEADERSHIP_FACADE: &str = "LeadershipService";

#[derive(Debug, Clone)]
pub struct FacadeConfig {
    /// Lease length requested on behalf of claiming units.
    pub claim_duration: Duration,
}

impl Default for FacadeConfig {
    fn default() -> Self {
        Self {
            claim_duration: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
pub struct LeadershipFacade {
    coordinator: Arc<LeaseCoordinator>,
    authenticated: UnitTag,
    config: FacadeConfig,
}

fn error_result(outcome: Result<()>) -> ErrorResult {
    ErrorResult {
        error: outcome.err().as_ref().map(to_wire),
    }
}

impl LeadershipFacade {
    pub fn new(coordinator: Arc<LeaseCoordinator>, authenticated: UnitTag, config: FacadeConfig) -> Self {
        Self {
            coordinator,
            authenticated,
            config,
        }
    }

    /// Checks that the authenticated unit is the one named, and that it
    /// belongs to the named service.
    fn authorize(&self, service_tag: &str, unit_tag: &str) -> Result<(ServiceTag, UnitTag)> {
        let service: ServiceTag = service_tag.parse()?;
        let unit: UnitTag = unit_tag.parse()?;
        if unit != self.authenticated || unit.service() != service.name() {
            return Err(Error::Unauthorized(format!(
                "{} may not act as {unit} for {service}",
                self.authenticated
            )));
        }
        Ok((service, unit))
    }

    async fn claim_one(&self, param: &ClaimLeadershipParams) -> ClaimLeadershipResults {
        let outcome = match self.authorize(&param.service_tag, &param.unit_tag) {
            Ok((service, unit)) => {
                self.coordinator
                    .claim_leadership(service.name(), unit.name(), self.config.claim_duration)
                    .await
            }
            Err(err) => Err(err),
        };
        match outcome {
            Ok(granted) => ClaimLeadershipResults {
                service_tag: param.service_tag.clone(),
                claim_duration_in_sec: granted.as_secs_f64(),
                error: None,
            },
            Err(err) => ClaimLeadershipResults {
                service_tag: param.service_tag.clone(),
                claim_duration_in_sec: 0.0,
                error: Some(to_wire(&err)),
            },
        }
    }

    async fn release_one(&self, param: &ReleaseLeadershipParams) -> ErrorResult {
        let outcome = match self.authorize(&param.service_tag, &param.unit_tag) {
            Ok((service, unit)) => self.coordinator.release_leadership(service.name(), unit.name()).await,
            Err(err) => Err(err),
        };
        error_result(outcome)
    }

    async fn settings_one(&self, entity: &Entity) -> GetLeadershipSettingsResult {
        let outcome = match entity.tag.parse::<ServiceTag>() {
            Ok(service) => self.coordinator.leadership_settings(service.name()).await,
            Err(err) => Err(err.into()),
        };
        match outcome {
            Ok(settings) => GetLeadershipSettingsResult { settings, error: None },
            Err(err) => GetLeadershipSettingsResult {
                settings: Default::default(),
                error: Some(to_wire(&err)),
            },
        }
    }

    async fn merge_one(&self, param: &MergeLeadershipSettingsParam) -> ErrorResult {
        let unit_tag = self.authenticated.to_string();
        let outcome = match self.authorize(&param.service_tag, &unit_tag) {
            Ok((service, unit)) => {
                self.coordinator
                    .merge_leadership_settings(service.name(), unit.name(), &param.settings)
                    .await
            }
            Err(err) => Err(err),
        };
        error_result(outcome)
    }

    pub async fn claim_leadership(&self, params: ClaimLeadershipBulkParams) -> ClaimLeadershipBulkResults {
        ClaimLeadershipBulkResults {
            results: join_all(params.params.iter().map(|param| self.claim_one(param))).await,
        }
    }

    pub async fn release_leadership(&self, params: ReleaseLeadershipBulkParams) -> ReleaseLeadershipBulkResults {
        ErrorResults {
            results: join_all(params.params.iter().map(|param| self.release_one(param))).await,
        }
    }

    pub async fn get_leadership_settings(&self, entities: Entities) -> GetLeadershipSettingsBulkResults {
        GetLeadershipSettingsBulkResults {
            results: join_all(entities.entities.iter().map(|entity| self.settings_one(entity))).await,
        }
    }

    pub async fn merge_leadership_settings(&self, params: MergeLeadershipSettingsBulkParams) -> ErrorResults {
        ErrorResults {
            results: join_all(params.params.iter().map(|param| self.merge_one(param))).await,
        }
    }
}

/// In-process [`Caller`] routing calls to the facades of one connection.
#[derive(Debug)]
pub struct Dispatcher {
    leadership: LeadershipFacade,
}

fn decode<T: DeserializeOwned>(request: Value) -> std::result::Result<T, proto::Error> {
    serde_json::from_value(request).map_err(|err| proto::Error::new(CODE_INVALID, err.to_string()))
}

fn encode<T: Serialize>(response: &T) -> std::result::Result<Value, proto::Error> {
    serde_json::to_value(response).map_err(|err| proto::Error::new("", err.to_string()))
}

impl Dispatcher {
    pub fn new(leadership: LeadershipFacade) -> Self {
        Self { leadership }
    }
}

#[async_trait]
impl Caller for Dispatcher {
    async fn call(
        &self,
        entity_kind: &str,
        _entity_id: &str,
        method: &str,
        request: Value,
    ) -> std::result::Result<Value, proto::Error> {
        if entity_kind != LEADERSHIP_FACADE {
            return Err(proto::Error::new(
                CODE_NOT_IMPLEMENTED,
                format!("unknown object type {entity_kind:?}"),
            ));
        }
        debug!(facade = entity_kind, method, "dispatching call");
        match method {
            "ClaimLeadership" => encode(&self.leadership.claim_leadership(decode(request)?).await),
            "ReleaseLeadership" => encode(&self.leadership.release_leadership(decode(request)?).await),
            "GetLeadershipSettings" => encode(&self.leadership.get_leadership_settings(decode(request)?).await),
            "MergeLeadershipSettings" => {
                encode(&self.leadership.merge_leadership_settings(decode(request)?).await)
            }
            _ => Err(proto::Error::new(
                CODE_NOT_IMPLEMENTED,
                format!("no such request {method:?} on {entity_kind}"),
            )),
        }
    }
}
