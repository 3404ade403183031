//! # Schema Mapping Registry
//!
//! Named translation tables between ontology terms and graph names.
//!
//! | Operation | Failure |
//! |-----------|---------|
//! | `add_schema` | `Conflict` if the name is taken |
//! | `drop_schema` | `NotFound`; drops the schema's entries with it |
//! | `add_mapping` | `Conflict` on an existing `(prefix, kind)` in strict mode, else overwrite |
//! | `drop_mapping` | `NotFound` |
//! | `add_common_schemas` | never on a present schema; idempotent |
//!
//! Every call is all-or-nothing: a failed validation or persist publishes nothing.

pub mod registry;
pub mod schema;

pub use registry::{RegistrySnapshot, SchemaRegistry, SCHEMA_CONFIG_NAMESPACE};
pub use schema::{
    ElementKind, MappingEntry, MappingScope, NamingPolicy, SchemaMapping, SchemaOptions,
    PREFIX_SEPARATOR,
};
