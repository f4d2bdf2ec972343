//! Read-only reference data: warehouses, items, employees, departments, units.
//!
//! Workflows only ever read through [`ReferenceData`]; catalog maintenance
//! lives outside this workspace.

pub mod cache;
pub mod gateway;
pub mod memory;
pub mod model;

pub use cache::CachedReferenceData;
pub use gateway::{ReferenceData, require_employee, require_item, require_warehouse};
pub use memory::{InMemoryReferenceData, ReferenceError, ReferenceSeed};
pub use model::{Department, Employee, Item, ItemKind, Unit, Warehouse};
