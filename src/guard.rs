//! Guard
//!
//! The single place structural changes are checked. Violations leave the
//! table invariants unrecoverable, so they abort instead of returning errors

use std::fmt::{self, Display};

use crate::{components::ComponentType, world::World, EntityId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Add,
    Remove,
    Set,
    Delete,
    DeleteWith,
    Clear,
    Clone,
    AddPair,
    RemovePair,
    Flatten,
}

impl Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Add => "add",
            Operation::Remove => "remove",
            Operation::Set => "set",
            Operation::Delete => "delete",
            Operation::DeleteWith => "delete_with",
            Operation::Clear => "clear",
            Operation::Clone => "clone",
            Operation::AddPair => "add pair",
            Operation::RemovePair => "remove pair",
            Operation::Flatten => "flatten",
        };
        write!(f, "{}", name)
    }
}

/// Structural changes are barred while the world is readonly
pub(crate) fn ensure_writable(world: &World, op: Operation) {
    if world.is_readonly() {
        tracing::error!(%op, "structural change while readonly");
        panic!("cannot {} while the world is readonly", op);
    }
}

/// Entities in fixed tables only accept value changes
pub(crate) fn ensure_mutable(world: &World, entity: EntityId, op: Operation) {
    if world.is_fixed(entity) {
        tracing::error!(%op, %entity, "structural change on fixed entity");
        panic!("cannot {} on fixed entity {}", op, entity);
    }
}

pub(crate) fn check_structural(world: &World, entity: EntityId, op: Operation) {
    ensure_writable(world, op);
    ensure_mutable(world, entity, op);
}

/// Operations that own table lifecycles need the world to themselves
pub(crate) fn ensure_exclusive(world: &World, op: Operation) {
    if world.is_deferred() {
        tracing::error!(%op, "operation requires a non deferred world");
        panic!("cannot {} while the world is deferred", op);
    }
    ensure_writable(world, op);
}

pub(crate) fn ensure_readonly(world: &World) {
    if !world.is_readonly() {
        tracing::error!("stage requested outside of readonly mode");
        panic!("stages are only available while the world is readonly");
    }
}

pub(crate) fn aliased(ty: ComponentType) -> ! {
    tracing::error!(component = %ty, "column borrowed mutably and immutably");
    panic!("column {} is already mutably borrowed", ty);
}
