use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("leadership of service {service:?} is held by {holder:?}")]
    LeaseHeld { service: String, holder: String },

    #[error("unit {unit:?} is not leader of service {service:?}")]
    NotLeader { service: String, unit: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error("unauthorized access: {0}")]
    Unauthorized(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("invalid request: {0}")]
    Invalid(String),

    /// The worker's underlying entity is gone or no longer reachable with our
    /// credentials. Never restart after this.
    #[error("agent should be terminated: {0}")]
    Terminate(String),

    #[error("watcher closed without error")]
    WatcherClosed,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("{0}")]
    Other(String),
}

/// Coarse class of a failure as seen by a remote caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Unauthorized,
    Transient,
    Other,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Unauthorized(_) => ErrorKind::Unauthorized,
            Error::Transient(_) | Error::Storage(_) => ErrorKind::Transient,
            _ => ErrorKind::Other,
        }
    }

    pub fn is_terminate(&self) -> bool {
        matches!(self, Error::Terminate(_))
    }

    pub fn is_not_found_or_unauthorized(&self) -> bool {
        matches!(self.kind(), ErrorKind::NotFound | ErrorKind::Unauthorized)
    }

    /// Converts NotFound/Unauthorized about the caller's own entity into the
    /// terminate signal; everything else passes through.
    pub fn terminate_if_gone(self) -> Self {
        if self.is_not_found_or_unauthorized() {
            Error::Terminate(self.to_string())
        } else {
            self
        }
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<proto::TagError> for Error {
    fn from(err: proto::TagError) -> Self {
        Error::Invalid(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
