use std::collections::HashMap;
use std::hash::Hash;
use std::sync::RwLock;

use stockflow_core::{DepartmentId, EmployeeId, ItemId, WarehouseId};

use crate::gateway::ReferenceData;
use crate::model::{Department, Employee, Item, Unit, Warehouse};

/// Read-through cache in front of a slower gateway.
///
/// Hits are served under a read lock. Misses are not cached, so a record
/// created upstream becomes visible on the next lookup.
#[derive(Debug)]
pub struct CachedReferenceData<R> {
    inner: R,
    warehouses: Table<WarehouseId, Warehouse>,
    items: Table<ItemId, Item>,
    employees: Table<EmployeeId, Employee>,
    departments: Table<DepartmentId, Department>,
    units: Table<String, Unit>,
}

#[derive(Debug)]
struct Table<K, V>(RwLock<HashMap<K, V>>);

impl<K: Eq + Hash, V: Clone> Table<K, V> {
    fn new() -> Self {
        Self(RwLock::new(HashMap::new()))
    }

    fn get_or_load<Q>(&self, key: &Q, owned: impl FnOnce() -> K, load: impl FnOnce() -> Option<V>) -> Option<V>
    where
        K: std::borrow::Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        if let Some(hit) = self.0.read().ok().and_then(|m| m.get(key).cloned()) {
            return Some(hit);
        }
        let value = load()?;
        if let Ok(mut m) = self.0.write() {
            m.insert(owned(), value.clone());
        }
        Some(value)
    }

    fn clear(&self) {
        if let Ok(mut m) = self.0.write() {
            m.clear();
        }
    }
}

impl<R: ReferenceData> CachedReferenceData<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            warehouses: Table::new(),
            items: Table::new(),
            employees: Table::new(),
            departments: Table::new(),
            units: Table::new(),
        }
    }

    /// Drop every cached entry.
    pub fn invalidate(&self) {
        self.warehouses.clear();
        self.items.clear();
        self.employees.clear();
        self.departments.clear();
        self.units.clear();
        tracing::debug!("reference cache invalidated");
    }
}

impl<R: ReferenceData> ReferenceData for CachedReferenceData<R> {
    fn warehouse(&self, id: WarehouseId) -> Option<Warehouse> {
        self.warehouses
            .get_or_load(&id, || id, || self.inner.warehouse(id))
    }

    fn item(&self, id: ItemId) -> Option<Item> {
        self.items.get_or_load(&id, || id, || self.inner.item(id))
    }

    fn employee(&self, id: EmployeeId) -> Option<Employee> {
        self.employees
            .get_or_load(&id, || id, || self.inner.employee(id))
    }

    fn department(&self, id: DepartmentId) -> Option<Department> {
        self.departments
            .get_or_load(&id, || id, || self.inner.department(id))
    }

    fn unit(&self, code: &str) -> Option<Unit> {
        self.units
            .get_or_load(code, || code.to_string(), || self.inner.unit(code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingGateway {
        warehouse: Warehouse,
        calls: AtomicUsize,
    }

    impl ReferenceData for CountingGateway {
        fn warehouse(&self, id: WarehouseId) -> Option<Warehouse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (id == self.warehouse.id).then(|| self.warehouse.clone())
        }

        fn item(&self, _id: ItemId) -> Option<Item> {
            None
        }

        fn employee(&self, _id: EmployeeId) -> Option<Employee> {
            None
        }

        fn department(&self, _id: DepartmentId) -> Option<Department> {
            None
        }

        fn unit(&self, _code: &str) -> Option<Unit> {
            None
        }
    }

    fn gateway() -> CountingGateway {
        CountingGateway {
            warehouse: Warehouse {
                id: WarehouseId::new(),
                code: "W1".to_string(),
                name: "Main".to_string(),
                active: true,
            },
            calls: AtomicUsize::new(0),
        }
    }

    #[test]
    fn hits_are_served_from_cache() {
        let cached = CachedReferenceData::new(gateway());
        let id = cached.inner.warehouse.id;

        assert_eq!(cached.warehouse(id).unwrap().code, "W1");
        assert_eq!(cached.warehouse(id).unwrap().code, "W1");
        assert_eq!(cached.inner.calls.load(Ordering::SeqCst), 1);

        cached.invalidate();
        cached.warehouse(id).unwrap();
        assert_eq!(cached.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn misses_are_not_cached() {
        let cached = CachedReferenceData::new(gateway());
        let unknown = WarehouseId::new();
        assert!(cached.warehouse(unknown).is_none());
        assert!(cached.warehouse(unknown).is_none());
        assert_eq!(cached.inner.calls.load(Ordering::SeqCst), 2);
    }
}
