//! Type information
//!
//! Describes how the world stores, constructs, destroys, copies and moves
//! values of a component type without knowing the concrete type. Every
//! [crate::World] owns its own [TypeRegistry]

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use crate::column::ColumnInner;
use crate::components::{Component, ComponentType, Storage};
use crate::error::DbError;

/// A type erased pointer to a [ColumnInner]
pub(crate) type AnyPtr = Box<dyn Any + Send + Sync>;

/// A single type erased component value, used while moving values between
/// columns and for deferred and sparse storage
pub(crate) type AnyValue = Box<dyn Any + Send + Sync>;

/// The capability table for one component type. Each function is
/// monomorphized for its type by [TypeInfo::of]
#[derive(Clone, Copy)]
pub(crate) struct ColumnHooks {
    pub(crate) new_column: fn() -> AnyPtr,
    pub(crate) len: fn(&AnyPtr) -> usize,
    pub(crate) construct: fn() -> AnyValue,
    pub(crate) insert: fn(&mut AnyPtr, usize, AnyValue) -> Result<(), DbError>,
    pub(crate) take: fn(&mut AnyPtr, usize, bool) -> Result<AnyValue, DbError>,
    pub(crate) destroy: fn(&mut AnyPtr, usize, bool) -> Result<(), DbError>,
    pub(crate) copy: fn(&mut AnyPtr, usize) -> Result<AnyValue, DbError>,
    pub(crate) copy_value: fn(&AnyValue) -> Result<AnyValue, DbError>,
    pub(crate) debug: fn(&AnyPtr, usize, &mut fmt::Formatter<'_>) -> fmt::Result,
}

impl fmt::Debug for ColumnHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnHooks").finish_non_exhaustive()
    }
}

/// Everything the storage layer needs to know about a component type
#[derive(Debug, Clone, Copy)]
pub struct TypeInfo {
    pub ty: ComponentType,
    pub size: usize,
    pub align: usize,
    pub storage: Storage,
    pub(crate) hooks: ColumnHooks,
}

impl TypeInfo {
    pub fn of<C: Component>() -> Self {
        TypeInfo {
            ty: ComponentType::of::<C>(),
            size: std::mem::size_of::<C>(),
            align: std::mem::align_of::<C>(),
            storage: C::STORAGE,
            hooks: ColumnHooks {
                new_column: ColumnInner::<C>::dynamic_ctor,
                len: ColumnInner::<C>::dynamic_len,
                construct: construct::<C>,
                insert: ColumnInner::<C>::dynamic_insert,
                take: ColumnInner::<C>::dynamic_take,
                destroy: ColumnInner::<C>::dynamic_destroy,
                copy: ColumnInner::<C>::dynamic_copy,
                copy_value: copy_value::<C>,
                debug: ColumnInner::<C>::dynamic_debug,
            },
        }
    }

    pub fn is_sparse(&self) -> bool {
        self.storage == Storage::Sparse
    }

    /// Tags carry no data
    pub fn is_tag(&self) -> bool {
        self.size == 0
    }
}

fn construct<C: Component>() -> AnyValue {
    Box::new(C::default())
}

fn copy_value<C: Component>(value: &AnyValue) -> Result<AnyValue, DbError> {
    value
        .downcast_ref::<C>()
        .map(|v| Box::new(v.clone()) as AnyValue)
        .ok_or(DbError::ColumnTypeDiscrepancy)
}

/// Per-world registry of [TypeInfo]
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: HashMap<ComponentType, TypeInfo>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Default::default()
    }

    /// Registers `C` if it wasn't already and returns its [TypeInfo]
    pub fn register<C: Component>(&mut self) -> TypeInfo {
        *self
            .types
            .entry(ComponentType::of::<C>())
            .or_insert_with(|| {
                tracing::trace!(component = std::any::type_name::<C>(), "registering component");
                TypeInfo::of::<C>()
            })
    }

    /// Describes a previously registered component type
    pub fn describe(&self, ty: &ComponentType) -> Option<&TypeInfo> {
        self.types.get(ty)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
