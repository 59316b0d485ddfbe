//! sheetsync core library: domain types, mapping registry, errors.
//!
//! - [`types`]: identifiers, A1 helpers, [`Table`], [`Mapping`]
//! - [`error`]: [`RegistryError`]
//! - [`registry`]: the mutable set of mappings and its YAML persistence

pub mod error;
pub mod registry;
pub mod types;

pub use error::RegistryError;
pub use registry::MappingRegistry;
pub use types::{
    Fingerprint, Mapping, MappingId, MappingPatch, NewMapping, RangeKey, SheetId, TabName, Table,
};
