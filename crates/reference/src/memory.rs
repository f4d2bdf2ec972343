use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockflow_core::{DepartmentId, EmployeeId, ItemId, WarehouseId};

use crate::gateway::ReferenceData;
use crate::model::{Department, Employee, Item, Unit, Warehouse};

#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error("failed to read reference seed {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid reference seed: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("item {item} refers to unknown unit {unit}")]
    UnknownUnit { item: String, unit: String },
}

/// JSON document the in-memory gateway is loaded from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceSeed {
    pub warehouses: Vec<Warehouse>,
    pub items: Vec<Item>,
    pub employees: Vec<Employee>,
    pub departments: Vec<Department>,
    pub units: Vec<Unit>,
}

/// Reference data held in memory, loaded once from a seed.
#[derive(Debug, Default)]
pub struct InMemoryReferenceData {
    warehouses: HashMap<WarehouseId, Warehouse>,
    items: HashMap<ItemId, Item>,
    employees: HashMap<EmployeeId, Employee>,
    departments: HashMap<DepartmentId, Department>,
    units: HashMap<String, Unit>,
}

impl InMemoryReferenceData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: ReferenceSeed) -> Result<Self, ReferenceError> {
        let units: HashMap<String, Unit> =
            seed.units.into_iter().map(|u| (u.code.clone(), u)).collect();

        // An empty unit table means the seed does not model units at all.
        if !units.is_empty() {
            if let Some(item) = seed.items.iter().find(|i| !units.contains_key(&i.unit_code)) {
                return Err(ReferenceError::UnknownUnit {
                    item: item.code.clone(),
                    unit: item.unit_code.clone(),
                });
            }
        }

        Ok(Self {
            warehouses: seed.warehouses.into_iter().map(|w| (w.id, w)).collect(),
            items: seed.items.into_iter().map(|i| (i.id, i)).collect(),
            employees: seed.employees.into_iter().map(|e| (e.id, e)).collect(),
            departments: seed.departments.into_iter().map(|d| (d.id, d)).collect(),
            units,
        })
    }

    pub fn from_json_str(json: &str) -> Result<Self, ReferenceError> {
        Self::from_seed(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ReferenceError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ReferenceError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let data = Self::from_json_str(&raw)?;
        tracing::info!(
            path = %path.display(),
            warehouses = data.warehouses.len(),
            items = data.items.len(),
            employees = data.employees.len(),
            "reference data loaded"
        );
        Ok(data)
    }

    pub fn with_warehouse(mut self, warehouse: Warehouse) -> Self {
        self.warehouses.insert(warehouse.id, warehouse);
        self
    }

    pub fn with_item(mut self, item: Item) -> Self {
        self.items.insert(item.id, item);
        self
    }

    pub fn with_employee(mut self, employee: Employee) -> Self {
        self.employees.insert(employee.id, employee);
        self
    }

    pub fn with_department(mut self, department: Department) -> Self {
        self.departments.insert(department.id, department);
        self
    }

    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.units.insert(unit.code.clone(), unit);
        self
    }
}

impl ReferenceData for InMemoryReferenceData {
    fn warehouse(&self, id: WarehouseId) -> Option<Warehouse> {
        self.warehouses.get(&id).cloned()
    }

    fn item(&self, id: ItemId) -> Option<Item> {
        self.items.get(&id).cloned()
    }

    fn employee(&self, id: EmployeeId) -> Option<Employee> {
        self.employees.get(&id).cloned()
    }

    fn department(&self, id: DepartmentId) -> Option<Department> {
        self.departments.get(&id).cloned()
    }

    fn unit(&self, code: &str) -> Option<Unit> {
        self.units.get(code).cloned()
    }
}
