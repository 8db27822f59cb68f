#![forbid(unsafe_code)]

//! Wire shapes exchanged between unit agents and the controller.

pub mod params;
pub mod tag;

pub use params::*;
pub use tag::{MachineTag, ServiceTag, Tag, TagError, UnitTag};
