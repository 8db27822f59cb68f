//! Agent side of the leadership facade.

use crate::{
    api::LEADERSHIP_FACADE,
    leader::Claimer,
    rpc::{call, from_wire, Caller},
    Error, Result,
};
use async_trait::async_trait;
use proto::{
    ClaimLeadershipBulkParams, ClaimLeadershipBulkResults, ClaimLeadershipParams, Entities, Entity, ErrorResults,
    GetLeadershipSettingsBulkResults, MergeLeadershipSettingsBulkParams, MergeLeadershipSettingsParam,
    ReleaseLeadershipBulkParams, ReleaseLeadershipParams, ServiceTag, Settings, UnitTag,
};
use std::sync::Arc;
use std::time::Duration;

/// Leadership operations for the unit this agent runs as.
pub struct LeadershipClient {
    caller: Arc<dyn Caller>,
    unit: UnitTag,
}

fn only<T>(results: Vec<T>) -> Result<T> {
    let count = results.len();
    let mut results = results.into_iter();
    match (results.next(), count) {
        (Some(result), 1) => Ok(result),
        _ => Err(Error::Other(format!("expected 1 result, got {count}"))),
    }
}

fn check(results: ErrorResults) -> Result<()> {
    match only(results.results)?.error {
        Some(err) => Err(from_wire(&err)),
        None => Ok(()),
    }
}

impl LeadershipClient {
    pub fn new(caller: Arc<dyn Caller>, unit: UnitTag) -> Self {
        Self { caller, unit }
    }

    pub fn unit(&self) -> &UnitTag {
        &self.unit
    }

    /// Claims or renews leadership; returns how long it is held.
    pub async fn claim(&self, service: &str) -> Result<Duration> {
        let params = ClaimLeadershipBulkParams {
            params: vec![ClaimLeadershipParams {
                service_tag: ServiceTag::new(service)?.to_string(),
                unit_tag: self.unit.to_string(),
            }],
        };
        let results: ClaimLeadershipBulkResults =
            call(self.caller.as_ref(), LEADERSHIP_FACADE, "", "ClaimLeadership", &params).await?;
        let result = only(results.results)?;
        if let Some(err) = result.error {
            return Err(from_wire(&err));
        }
        Duration::try_from_secs_f64(result.claim_duration_in_sec)
            .map_err(|err| Error::Other(format!("bad claim duration: {err}")))
    }

    pub async fn release(&self, service: &str) -> Result<()> {
        let params = ReleaseLeadershipBulkParams {
            params: vec![ReleaseLeadershipParams {
                service_tag: ServiceTag::new(service)?.to_string(),
                unit_tag: self.unit.to_string(),
            }],
        };
        let results: ErrorResults =
            call(self.caller.as_ref(), LEADERSHIP_FACADE, "", "ReleaseLeadership", &params).await?;
        check(results)
    }

    pub async fn settings(&self, service: &str) -> Result<Settings> {
        let entities = Entities {
            entities: vec![Entity {
                tag: ServiceTag::new(service)?.to_string(),
            }],
        };
        let results: GetLeadershipSettingsBulkResults = call(
            self.caller.as_ref(),
            LEADERSHIP_FACADE,
            "",
            "GetLeadershipSettings",
            &entities,
        )
        .await?;
        let result = only(results.results)?;
        match result.error {
            Some(err) => Err(from_wire(&err)),
            None => Ok(result.settings),
        }
    }

    pub async fn merge_settings(&self, service: &str, settings: Settings) -> Result<()> {
        let params = MergeLeadershipSettingsBulkParams {
            params: vec![MergeLeadershipSettingsParam {
                service_tag: ServiceTag::new(service)?.to_string(),
                settings,
            }],
        };
        let results: ErrorResults = call(
            self.caller.as_ref(),
            LEADERSHIP_FACADE,
            "",
            "MergeLeadershipSettings",
            &params,
        )
        .await?;
        check(results)
    }
}

#[async_trait]
impl Claimer for LeadershipClient {
    /// The server picks the lease length; `_duration` is not sent.
    async fn claim_leadership(&self, service: &str, unit: &str, _duration: Duration) -> Result<Duration> {
        if unit != self.unit.name() {
            return Err(Error::Unauthorized(format!("{} cannot claim for {unit}", self.unit)));
        }
        self.claim(service).await
    }

    async fn release_leadership(&self, service: &str, unit: &str) -> Result<()> {
        if unit != self.unit.name() {
            return Err(Error::Unauthorized(format!("{} cannot release for {unit}", self.unit)));
        }
        self.release(service).await
    }
}
