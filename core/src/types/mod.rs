//! Resource types: the schemaless object model plus the two typed resources
//! the engine reads (`MaasPlatform`, `Tier`).

pub mod meta;
pub mod object;
pub mod platform;
pub mod tier;

pub use meta::{ObjectMeta, OwnerReference};
pub use object::{DynamicObject, ObjectKey, ObjectRef};
pub use platform::MaasPlatform;
pub use tier::Tier;
