//! # Property Graph Model
//!
//! Clean DTOs for the labeled property graph side of the bridge.
//! These types cross every boundary: storage ↔ ingest ↔ export ↔ user.
//!
//! Pure data. No I/O, no state.

pub mod node;
pub mod relationship;
pub mod value;
pub mod property_map;

pub use node::{Node, NodeId};
pub use relationship::{Relationship, RelId, Direction};
pub use value::Value;
pub use property_map::{PropertyMap, props};
