use stockflow_core::{DepartmentId, DomainError, DomainResult, EmployeeId, ItemId, WarehouseId};

use crate::model::{Department, Employee, Item, Unit, Warehouse};

/// Lookup interface to master data owned by another system.
///
/// Implementations must be cheap to call repeatedly; wrap slow sources in
/// [`crate::CachedReferenceData`].
pub trait ReferenceData: Send + Sync {
    fn warehouse(&self, id: WarehouseId) -> Option<Warehouse>;
    fn item(&self, id: ItemId) -> Option<Item>;
    fn employee(&self, id: EmployeeId) -> Option<Employee>;
    fn department(&self, id: DepartmentId) -> Option<Department>;
    fn unit(&self, code: &str) -> Option<Unit>;
}

impl<T: ReferenceData + ?Sized> ReferenceData for std::sync::Arc<T> {
    fn warehouse(&self, id: WarehouseId) -> Option<Warehouse> {
        (**self).warehouse(id)
    }

    fn item(&self, id: ItemId) -> Option<Item> {
        (**self).item(id)
    }

    fn employee(&self, id: EmployeeId) -> Option<Employee> {
        (**self).employee(id)
    }

    fn department(&self, id: DepartmentId) -> Option<Department> {
        (**self).department(id)
    }

    fn unit(&self, code: &str) -> Option<Unit> {
        (**self).unit(code)
    }
}

/// Resolve a warehouse a command refers to. Unknown or inactive warehouses
/// are a validation failure of the command, not a missing resource.
pub fn require_warehouse(refs: &dyn ReferenceData, id: WarehouseId) -> DomainResult<Warehouse> {
    match refs.warehouse(id) {
        Some(w) if w.active => Ok(w),
        Some(w) => Err(DomainError::validation(format!(
            "warehouse {} is inactive",
            w.code
        ))),
        None => Err(DomainError::validation(format!("unknown warehouse {id}"))),
    }
}

pub fn require_item(refs: &dyn ReferenceData, id: ItemId) -> DomainResult<Item> {
    refs.item(id)
        .ok_or_else(|| DomainError::validation(format!("unknown item {id}")))
}

pub fn require_employee(refs: &dyn ReferenceData, id: EmployeeId) -> DomainResult<Employee> {
    refs.employee(id)
        .ok_or_else(|| DomainError::validation(format!("unknown employee {id}")))
}
