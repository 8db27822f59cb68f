use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TagError {
    #[error("{0:?} is not a valid tag")]
    Malformed(String),

    #[error("{tag:?} is not a valid {expected} tag")]
    WrongKind { tag: String, expected: &'static str },
}

/// A service, identified by its name (`service-<name>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceTag(String);

/// A unit, identified by `<service>/<n>` (`unit-<service>-<n>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitTag(String);

/// A machine, identified by its id (`machine-<id>`). Container ids use `/`
/// separators which map to `-` in the tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MachineTag(String);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Tag {
    Service(ServiceTag),
    Unit(UnitTag),
    Machine(MachineTag),
}

fn is_valid_service_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !name.ends_with('-')
        && !name.contains("--")
        && !name
            .rsplit('-')
            .next()
            .is_some_and(|last| last.chars().all(|c| c.is_ascii_digit()))
}

impl ServiceTag {
    pub fn new(name: &str) -> Result<Self, TagError> {
        if is_valid_service_name(name) {
            Ok(Self(name.to_string()))
        } else {
            Err(TagError::Malformed(format!("service-{name}")))
        }
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl UnitTag {
    /// Builds a tag from a unit name such as `wordpress/0`.
    pub fn new(unit_name: &str) -> Result<Self, TagError> {
        let malformed = || TagError::Malformed(format!("unit-{}", unit_name.replace('/', "-")));
        let (service, number) = unit_name.split_once('/').ok_or_else(malformed)?;
        if !is_valid_service_name(service)
            || number.is_empty()
            || !number.chars().all(|c| c.is_ascii_digit())
        {
            return Err(malformed());
        }
        Ok(Self(unit_name.to_string()))
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// Name of the service the unit belongs to.
    pub fn service(&self) -> &str {
        self.0.split_once('/').map_or(self.0.as_str(), |(service, _)| service)
    }
}

impl MachineTag {
    pub fn new(id: &str) -> Result<Self, TagError> {
        let valid = !id.is_empty()
            && id.split('/').all(|part| {
                !part.is_empty() && part.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
            });
        if valid {
            Ok(Self(id.to_string()))
        } else {
            Err(TagError::Malformed(format!("machine-{}", id.replace('/', "-"))))
        }
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "service-{}", self.0)
    }
}

impl fmt::Display for UnitTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit-{}", self.0.replace('/', "-"))
    }
}

impl fmt::Display for MachineTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "machine-{}", self.0.replace('/', "-"))
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tag::Service(tag) => tag.fmt(f),
            Tag::Unit(tag) => tag.fmt(f),
            Tag::Machine(tag) => tag.fmt(f),
        }
    }
}

impl FromStr for Tag {
    type Err = TagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || TagError::Malformed(s.to_string());
        let (kind, id) = s.split_once('-').ok_or_else(malformed)?;
        match kind {
            "service" => ServiceTag::new(id).map(Tag::Service).map_err(|_| malformed()),
            "unit" => {
                let (service, number) = id.rsplit_once('-').ok_or_else(malformed)?;
                UnitTag::new(&format!("{service}/{number}"))
                    .map(Tag::Unit)
                    .map_err(|_| malformed())
            }
            "machine" => MachineTag::new(&id.replace('-', "/"))
                .map(Tag::Machine)
                .map_err(|_| malformed()),
            _ => Err(malformed()),
        }
    }
}

impl FromStr for ServiceTag {
    type Err = TagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<Tag>()? {
            Tag::Service(tag) => Ok(tag),
            _ => Err(TagError::WrongKind { tag: s.to_string(), expected: "service" }),
        }
    }
}

impl FromStr for UnitTag {
    type Err = TagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<Tag>()? {
            Tag::Unit(tag) => Ok(tag),
            _ => Err(TagError::WrongKind { tag: s.to_string(), expected: "unit" }),
        }
    }
}

impl FromStr for MachineTag {
    type Err = TagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<Tag>()? {
            Tag::Machine(tag) => Ok(tag),
            _ => Err(TagError::WrongKind { tag: s.to_string(), expected: "machine" }),
        }
    }
}
