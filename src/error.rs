use std::{error::Error, fmt::Display};

use crate::components::Id;
use crate::table::TableId;
use crate::EntityId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbError {
    EntityNotAlive(EntityId),
    TableDoesntExist(TableId),
    ColumnTypeDiscrepancy,
    ColumnAccessOutOfBounds,
    ColumnDoesntExistInTable,
    ComponentNotRegistered(&'static str),
    NotAPair(Id),
    CyclicRelationship { entity: EntityId, target: EntityId },
    RelationshipNotAcyclic(EntityId),
    NameInUse(String, EntityId),
    InvalidPath(String),
}

impl Error for DbError {}

impl Display for DbError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DbError::EntityNotAlive(entity) => {
                write!(f, "entity {} is not alive", entity)
            }
            DbError::TableDoesntExist(table) => {
                write!(f, "table {} doesn't exist", table)
            }
            DbError::ColumnTypeDiscrepancy => {
                write!(f, "column type mismatch")
            }
            DbError::ColumnAccessOutOfBounds => {
                write!(f, "attempted to index a column out of bounds")
            }
            DbError::ColumnDoesntExistInTable => {
                write!(f, "column doesn't exist in the given table")
            }
            DbError::ComponentNotRegistered(name) => {
                write!(f, "component {} was never registered with this world", name)
            }
            DbError::NotAPair(id) => {
                write!(f, "expected a relationship pair, got {}", id)
            }
            DbError::CyclicRelationship { entity, target } => {
                write!(
                    f,
                    "adding {} as a target of {} would create a cycle",
                    target, entity
                )
            }
            DbError::RelationshipNotAcyclic(rel) => {
                write!(f, "relationship {} does not track depth", rel)
            }
            DbError::NameInUse(name, owner) => {
                write!(f, "name '{}' is already used by {} in this scope", name, owner)
            }
            DbError::InvalidPath(path) => {
                write!(f, "invalid entity path '{}'", path)
            }
        }
    }
}
