//! Sparse storage
//!
//! Components that opt out of columnar storage keep one boxed value per
//! entity. Their ids still take part in an entity's type, but they have no
//! column, so table moves and flattening never touch them

use std::collections::HashMap;

use crate::{
    components::{Component, ComponentType},
    error::DbError,
    type_info::{AnyValue, ColumnHooks, TypeInfo},
    EntityId,
};

pub struct SparseSet {
    ty: ComponentType,
    hooks: ColumnHooks,
    values: HashMap<EntityId, AnyValue>,
    version: u64,
}

impl SparseSet {
    pub(crate) fn new(info: &TypeInfo, tick: u64) -> Self {
        SparseSet {
            ty: info.ty,
            hooks: info.hooks,
            values: HashMap::new(),
            version: tick,
        }
    }

    pub fn component_type(&self) -> ComponentType {
        self.ty
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.values.contains_key(&entity)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn insert(&mut self, entity: EntityId, value: AnyValue, tick: u64) {
        self.version = tick;
        self.values.insert(entity, value);
    }

    pub(crate) fn construct(&mut self, entity: EntityId, tick: u64) {
        let value = (self.hooks.construct)();
        self.insert(entity, value, tick);
    }

    pub(crate) fn remove(&mut self, entity: EntityId) -> Option<AnyValue> {
        self.values.remove(&entity)
    }

    pub(crate) fn copy(&self, entity: EntityId) -> Option<Result<AnyValue, DbError>> {
        self.values
            .get(&entity)
            .map(|value| (self.hooks.copy_value)(value))
    }

    pub fn get<C: Component>(&self, entity: EntityId) -> Option<&C> {
        self.values.get(&entity)?.downcast_ref::<C>()
    }

    pub(crate) fn get_mut<C: Component>(&mut self, entity: EntityId, tick: u64) -> Option<&mut C> {
        let value = self.values.get_mut(&entity)?.downcast_mut::<C>()?;
        self.version = tick;
        Some(value)
    }
}

impl std::fmt::Debug for SparseSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SparseSet<{}> ({} values) @ {}", self.ty, self.len(), self.version)
    }
}
