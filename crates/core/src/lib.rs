//! `stockflow-core`: ids, errors and the aggregate contract shared by every
//! warehouse workflow. Nothing here does I/O.

pub mod aggregate;
pub mod error;
pub mod id;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, DepartmentId, EmployeeId, ItemId, LocalKey, RowKey, WarehouseId};
pub use value_object::ValueObject;
