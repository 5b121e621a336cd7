//! Names
//!
//! [Name] values are unique among the children of a parent. Paths join
//! names from the outermost scope with `.`

use std::collections::HashMap;

use crate::{components::Name, error::DbError, world::World, EntityId, CHILD_OF};

pub const PATH_SEPARATOR: &str = ".";

#[derive(Debug, Default)]
pub struct NameIndex {
    scoped: HashMap<(EntityId, String), EntityId>,
    by_entity: HashMap<EntityId, (EntityId, String)>,
}

impl NameIndex {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn get(&self, scope: EntityId, name: &str) -> Option<EntityId> {
        self.scoped.get(&(scope, name.to_string())).copied()
    }

    /// Scope and name `entity` is indexed under
    pub fn entry(&self, entity: EntityId) -> Option<(EntityId, &str)> {
        self.by_entity
            .get(&entity)
            .map(|(scope, name)| (*scope, name.as_str()))
    }

    pub(crate) fn insert(&mut self, scope: EntityId, name: String, entity: EntityId) -> Result<(), DbError> {
        if let Some(owner) = self.get(scope, &name) {
            if owner != entity {
                return Err(DbError::NameInUse(name, owner));
            }
        }
        self.remove(entity);
        self.scoped.insert((scope, name.clone()), entity);
        self.by_entity.insert(entity, (scope, name));
        Ok(())
    }

    pub(crate) fn remove(&mut self, entity: EntityId) -> Option<(EntityId, String)> {
        let (scope, name) = self.by_entity.remove(&entity)?;
        self.scoped.remove(&(scope, name.clone()));
        Some((scope, name))
    }

    pub fn len(&self) -> usize {
        self.by_entity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_entity.is_empty()
    }
}

impl World {
    /// Names `entity`, failing if a sibling already uses the name
    pub fn set_name(&mut self, entity: EntityId, name: &str) -> Result<(), DbError> {
        if name.is_empty() || name.contains(PATH_SEPARATOR) {
            return Err(DbError::InvalidPath(name.to_string()));
        }
        if !self.is_alive(entity) {
            return Err(DbError::EntityNotAlive(entity));
        }
        if let Some(owner) = self.names.get(self.name_scope(entity), name) {
            if owner != entity {
                return Err(DbError::NameInUse(name.to_string(), owner));
            }
        }
        self.set(entity, Name(name.to_string()))
    }

    pub fn get_name(&self, entity: EntityId) -> Option<String> {
        self.get::<Name>(entity).map(|name| name.0.clone())
    }

    /// Resolves a `.` separated path of names starting at the top scope
    pub fn lookup(&self, path: &str) -> Option<EntityId> {
        let mut scope = EntityId::NULL;
        for segment in path.split(PATH_SEPARATOR) {
            match self.names.get(scope, segment) {
                Some(entity) => scope = entity,
                None => {
                    tracing::debug!(path, segment, "path did not resolve");
                    return None;
                }
            }
        }
        Some(scope)
    }

    /// Full path of `entity`, if it and all of its scopes are named
    pub fn path_of(&self, entity: EntityId) -> Option<String> {
        let mut segments = Vec::new();
        let mut current = entity;
        while !current.is_null() {
            let (scope, name) = self.names.entry(current)?;
            segments.push(name);
            current = scope;
        }
        segments.reverse();
        Some(segments.join(PATH_SEPARATOR))
    }

    /// Returns the entity at `path`, creating it and any missing scopes
    pub fn create_named(&mut self, path: &str) -> Result<EntityId, DbError> {
        if path.is_empty() {
            return Err(DbError::InvalidPath(path.to_string()));
        }
        let mut scope = EntityId::NULL;
        for segment in path.split(PATH_SEPARATOR) {
            scope = match self.names.get(scope, segment) {
                Some(entity) => entity,
                None => {
                    let entity = if scope.is_null() {
                        self.create()
                    } else {
                        self.create_child_of(scope)?
                    };
                    self.set_name(entity, segment)?;
                    entity
                }
            };
        }
        Ok(scope)
    }

    /// Names are scoped by the parent. Flattened entities are scoped by the
    /// root they were flattened under
    pub(crate) fn name_scope(&self, entity: EntityId) -> EntityId {
        let Some(record) = self.entities.record(entity) else {
            return EntityId::NULL;
        };
        match self.tables[record.table.index()].fixed_layout() {
            Some(layout) if layout.relationship == CHILD_OF => layout.root,
            _ => self.get_target(entity, CHILD_OF, 0).unwrap_or(EntityId::NULL),
        }
    }

    /// Brings the index in line with the current name and scope of `entity`
    pub(crate) fn reindex_name(&mut self, entity: EntityId) {
        self.names.remove(entity);
        let Some(name) = self.get_name(entity).filter(|name| !name.is_empty()) else {
            return;
        };
        let scope = self.name_scope(entity);
        if let Err(e) = self.names.insert(scope, name, entity) {
            tracing::warn!(%entity, error = %e, "entity left out of the name index");
        }
    }
}
