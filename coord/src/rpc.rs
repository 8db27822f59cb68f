//! Remote-call facade as seen by agents.

pub use crate::error::ErrorKind;
use crate::{Error, Result};
use async_trait::async_trait;
use proto::{
    CODE_INVALID, CODE_LEASE_HELD, CODE_NOT_FOUND, CODE_NOT_LEADER, CODE_TRY_AGAIN, CODE_UNAUTHORIZED,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

/// Typed invocation of `method` on a server-side facade. Transport failures
/// come back as wire errors with the `try again` code.
#[async_trait]
pub trait Caller: Send + Sync {
    async fn call(
        &self,
        entity_kind: &str,
        entity_id: &str,
        method: &str,
        request: Value,
    ) -> std::result::Result<Value, proto::Error>;
}

pub fn classify(err: &proto::Error) -> ErrorKind {
    match err.code.as_str() {
        CODE_NOT_FOUND => ErrorKind::NotFound,
        CODE_UNAUTHORIZED => ErrorKind::Unauthorized,
        CODE_TRY_AGAIN => ErrorKind::Transient,
        _ => ErrorKind::Other,
    }
}

/// Serializes `request`, performs the call and decodes the response.
pub async fn call<Req, Resp>(
    caller: &dyn Caller,
    entity_kind: &str,
    entity_id: &str,
    method: &str,
    request: &Req,
) -> Result<Resp>
where
    Req: Serialize + Sync + ?Sized,
    Resp: DeserializeOwned,
{
    let request = serde_json::to_value(request)?;
    let response = caller
        .call(entity_kind, entity_id, method, request)
        .await
        .map_err(|err| from_wire(&err))?;
    Ok(serde_json::from_value(response)?)
}

fn info(err: &proto::Error, key: &str) -> String {
    err.info.get(key).cloned().unwrap_or_default()
}

/// Rebuilds the taxonomy error a server reported.
pub fn from_wire(err: &proto::Error) -> Error {
    let message = err.message.as_str();
    let stripped = |prefix: &str| message.strip_prefix(prefix).unwrap_or(message).to_string();
    match classify(err) {
        ErrorKind::NotFound => Error::NotFound(message.strip_suffix(" not found").unwrap_or(message).to_string()),
        ErrorKind::Unauthorized => Error::Unauthorized(stripped("unauthorized access: ")),
        ErrorKind::Transient => Error::Transient(stripped("transient failure: ")),
        ErrorKind::Other => match err.code.as_str() {
            CODE_LEASE_HELD => Error::LeaseHeld {
                service: info(err, "service"),
                holder: info(err, "holder"),
            },
            CODE_NOT_LEADER => Error::NotLeader {
                service: info(err, "service"),
                unit: info(err, "unit"),
            },
            CODE_INVALID => Error::Invalid(stripped("invalid request: ")),
            _ => Error::Other(message.to_string()),
        },
    }
}

/// Encodes an error for the wire, keeping its classification.
pub fn to_wire(err: &Error) -> proto::Error {
    let message = err.to_string();
    match err {
        Error::LeaseHeld { service, holder } => proto::Error::new(CODE_LEASE_HELD, message)
            .with_info("service", service.as_str())
            .with_info("holder", holder.as_str()),
        Error::NotLeader { service, unit } => proto::Error::new(CODE_NOT_LEADER, message)
            .with_info("service", service.as_str())
            .with_info("unit", unit.as_str()),
        Error::NotFound(_) => proto::Error::new(CODE_NOT_FOUND, message),
        Error::Unauthorized(_) => proto::Error::new(CODE_UNAUTHORIZED, message),
        Error::Transient(_) | Error::Storage(_) => proto::Error::new(CODE_TRY_AGAIN, message),
        Error::Invalid(_) => proto::Error::new(CODE_INVALID, message),
        _ => proto::Error::new("", message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_wire_codes() {
        assert_eq!(classify(&proto::Error::new(CODE_NOT_FOUND, "x")), ErrorKind::NotFound);
        assert_eq!(classify(&proto::Error::new(CODE_UNAUTHORIZED, "x")), ErrorKind::Unauthorized);
        assert_eq!(classify(&proto::Error::new(CODE_TRY_AGAIN, "x")), ErrorKind::Transient);
        assert_eq!(classify(&proto::Error::new(CODE_LEASE_HELD, "x")), ErrorKind::Other);
        assert_eq!(classify(&proto::Error::new("", "x")), ErrorKind::Other);
    }

    #[test]
    fn test_taxonomy_survives_the_wire() {
        let errors = [
            Error::LeaseHeld { service: "foo".into(), holder: "foo/1".into() },
            Error::NotLeader { service: "foo".into(), unit: "foo/0".into() },
            Error::NotFound("unit foo/0".into()),
            Error::Unauthorized("permission denied".into()),
            Error::Transient("connection reset".into()),
            Error::Invalid("claim duration must be positive".into()),
            Error::Other("boom".into()),
        ];
        for err in errors {
            assert_eq!(from_wire(&to_wire(&err)), err);
        }
    }

    #[test]
    fn test_wire_and_local_classification_agree() {
        let errors = [
            Error::NotFound("unit foo/0".into()),
            Error::Unauthorized("permission denied".into()),
            Error::Transient("connection reset".into()),
            Error::Storage("disk full".into()),
            Error::LeaseHeld { service: "foo".into(), holder: "foo/1".into() },
            Error::Invalid("bad tag".into()),
        ];
        for err in errors {
            assert_eq!(classify(&to_wire(&err)), err.kind(), "{err}");
            assert_eq!(from_wire(&to_wire(&err)).kind(), err.kind(), "{err}");
        }
    }

    #[test]
    fn test_gone_entity_terminates() {
        let err = from_wire(&proto::Error::new(CODE_NOT_FOUND, "machine 0 not found"));
        assert!(err.terminate_if_gone().is_terminate());
        let err = from_wire(&proto::Error::new(CODE_TRY_AGAIN, "timeout"));
        assert!(!err.terminate_if_gone().is_terminate());
    }
}
