use std::{
    cell::UnsafeCell,
    fmt::{self, Display},
    ops::Range,
    sync::atomic::{AtomicU64, Ordering},
};

use crate::{
    borrowed::{BorrowError, BorrowRef, BorrowRefMut, BorrowSentinel, ColumnRef, ColumnRefMut},
    components::{Component, ComponentType},
    error::DbError,
    type_info::{AnyPtr, AnyValue, ColumnHooks, TypeInfo},
};

/// A type erased container for storing a contiguous column of data
pub struct Column {
    ty: ComponentType,
    hooks: ColumnHooks, // function ptrs for the erased type
    data: AnyPtr,       // ColumnInner<C>

    /// World tick of the last write to any row of this column
    version: AtomicU64,
}

impl Column {
    pub(crate) fn new(info: &TypeInfo, tick: u64) -> Column {
        Column {
            ty: info.ty,
            hooks: info.hooks,
            data: (info.hooks.new_column)(),
            version: AtomicU64::new(tick),
        }
    }

    pub fn component_type(&self) -> ComponentType {
        self.ty
    }

    pub fn len(&self) -> usize {
        (self.hooks.len)(&self.data)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Change version of this column, bumped by every write
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    pub(crate) fn mark_changed(&self, tick: u64) {
        self.version.fetch_max(tick, Ordering::AcqRel);
    }

    /// Default constructs a value at `row`
    pub(crate) fn construct_at(&mut self, row: usize, tick: u64) -> Result<(), DbError> {
        let value = (self.hooks.construct)();
        self.insert_at(row, value, tick)
    }

    /// Moves a value into the column at `row`, shifting later rows down
    pub(crate) fn insert_at(&mut self, row: usize, value: AnyValue, tick: u64) -> Result<(), DbError> {
        (self.hooks.insert)(&mut self.data, row, value)?;
        self.mark_changed(tick);
        Ok(())
    }

    /// Moves the value at `row` out of the column. An `ordered` removal keeps
    /// the remaining rows in place, otherwise the last row is swapped in
    pub(crate) fn take(&mut self, row: usize, ordered: bool) -> Result<AnyValue, DbError> {
        (self.hooks.take)(&mut self.data, row, ordered)
    }

    pub(crate) fn destroy(&mut self, row: usize, ordered: bool) -> Result<(), DbError> {
        (self.hooks.destroy)(&mut self.data, row, ordered)
    }

    pub(crate) fn copy(&mut self, row: usize) -> Result<AnyValue, DbError> {
        (self.hooks.copy)(&mut self.data, row)
    }

    fn inner<C: Component>(&self) -> Result<&ColumnInner<C>, DbError> {
        self.data
            .downcast_ref::<ColumnInner<C>>()
            .ok_or(DbError::ColumnTypeDiscrepancy)
    }

    fn inner_mut<C: Component>(&mut self) -> Result<&mut ColumnInner<C>, DbError> {
        self.data
            .downcast_mut::<ColumnInner<C>>()
            .ok_or(DbError::ColumnTypeDiscrepancy)
    }

    /// Borrows `rows` of this column for reading. Fails if the column is
    /// currently mutably borrowed
    pub(crate) fn borrow<C: Component>(&self, rows: Range<usize>) -> Result<Result<ColumnRef<'_, C>, BorrowError>, DbError> {
        Ok(self.inner::<C>()?.try_borrow(rows))
    }

    /// Borrows `rows` of this column for writing and marks the column changed
    pub(crate) fn borrow_mut<C: Component>(
        &self,
        rows: Range<usize>,
        tick: u64,
    ) -> Result<Result<ColumnRefMut<'_, C>, BorrowError>, DbError> {
        let borrowed = self.inner::<C>()?.try_borrow_mut(rows);
        if borrowed.is_ok() {
            self.mark_changed(tick);
        }
        Ok(borrowed)
    }

    pub(crate) fn get_mut<C: Component>(&mut self, row: usize, tick: u64) -> Result<&mut C, DbError> {
        self.mark_changed(tick);
        self.inner_mut::<C>()?
            .values
            .get_mut()
            .get_mut(row)
            .ok_or(DbError::ColumnAccessOutOfBounds)
    }

    pub(crate) fn set<C: Component>(&mut self, row: usize, value: C, tick: u64) -> Result<(), DbError> {
        *self.get_mut::<C>(row, tick)? = value;
        Ok(())
    }

    pub(crate) fn debug_row(&self, row: usize, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (self.hooks.debug)(&self.data, row, f)
    }
}

impl fmt::Debug for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Column<{}> [", self.ty)?;
        for row in 0..self.len() {
            if row > 0 {
                write!(f, ", ")?;
            }
            self.debug_row(row, f)?;
        }
        write!(f, "] @ {}", self.version())
    }
}

impl Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The actual raw data storage for the users data
#[derive(Debug, Default)]
pub(crate) struct ColumnInner<C: Component> {
    /// INVARIANT:
    ///
    /// For an entity in a table, its associated components must
    /// always occupy the same index in each column. Failure to
    /// uphold this invariant will result in undefined behavior
    pub(crate) borrow: BorrowSentinel,
    pub(crate) values: UnsafeCell<Vec<C>>,
}

// SAFETY
// Shared access to `values` only ever happens through `try_borrow` and
// `try_borrow_mut`, which are guarded by the per row borrow counters. All
// other access requires `&mut self`
unsafe impl<C: Component> Sync for ColumnInner<C> {}

impl<C: Component> ColumnInner<C> {
    fn new() -> Self {
        Default::default()
    }

    fn try_borrow(&self, rows: Range<usize>) -> Result<ColumnRef<'_, C>, BorrowError> {
        // SAFETY
        // The length can only change through `&mut` access to the column
        let len = unsafe { (*self.values.get()).len() };
        let rows = clamp(rows, len);
        let borrow = BorrowRef::new(&self.borrow, rows.clone()).ok_or(BorrowError::AlreadyBorrowed)?;
        // SAFETY
        // We hold a shared borrow of every row in `rows`, and the vector can't
        // be resized without exclusive access to the column
        let values = unsafe {
            let base = (*self.values.get()).as_ptr();
            std::slice::from_raw_parts(base.add(rows.start), rows.len())
        };
        Ok(ColumnRef::new(values, borrow))
    }

    fn try_borrow_mut(&self, rows: Range<usize>) -> Result<ColumnRefMut<'_, C>, BorrowError> {
        // SAFETY
        // The length can only change through `&mut` access to the column
        let len = unsafe { (*self.values.get()).len() };
        let rows = clamp(rows, len);
        let borrow = BorrowRefMut::new(&self.borrow, rows.clone()).ok_or(BorrowError::AlreadyBorrowed)?;
        // SAFETY
        // We hold the only borrow of every row in `rows`. Slices handed out
        // for other rows never overlap this one
        let values = unsafe {
            let base = (*self.values.get()).as_mut_ptr();
            std::slice::from_raw_parts_mut(base.add(rows.start), rows.len())
        };
        Ok(ColumnRefMut::new(values, borrow))
    }

    fn downcast(column: &AnyPtr) -> Result<&ColumnInner<C>, DbError> {
        column
            .downcast_ref::<ColumnInner<C>>()
            .ok_or(DbError::ColumnTypeDiscrepancy)
    }

    fn downcast_mut(column: &mut AnyPtr) -> Result<&mut ColumnInner<C>, DbError> {
        column
            .downcast_mut::<ColumnInner<C>>()
            .ok_or(DbError::ColumnTypeDiscrepancy)
    }

    /// Applies a change that may resize the column, keeping one borrow
    /// counter per row
    fn resize_with<R>(&mut self, f: impl FnOnce(&mut Vec<C>) -> R) -> R {
        let values = self.values.get_mut();
        let result = f(values);
        let len = values.len();
        self.borrow.resize(len);
        result
    }

    /// Constructs a [Column] and returns a type erased pointer to it
    pub fn dynamic_ctor() -> AnyPtr {
        Box::new(ColumnInner::<C>::new())
    }

    pub fn dynamic_len(column: &AnyPtr) -> usize {
        match Self::downcast(column) {
            // SAFETY
            // Borrows only ever hand out slices of the vector, its length
            // can only change through `&mut` access to the column
            Ok(inner) => unsafe { (*inner.values.get()).len() },
            Err(_) => 0,
        }
    }

    pub fn dynamic_insert(column: &mut AnyPtr, row: usize, value: AnyValue) -> Result<(), DbError> {
        let value = value
            .downcast::<C>()
            .map_err(|_| DbError::ColumnTypeDiscrepancy)?;
        Self::downcast_mut(column)?.resize_with(|values| {
            if row > values.len() {
                return Err(DbError::ColumnAccessOutOfBounds);
            }
            values.insert(row, *value);
            Ok(())
        })
    }

    pub fn dynamic_take(column: &mut AnyPtr, row: usize, ordered: bool) -> Result<AnyValue, DbError> {
        Self::downcast_mut(column)?.resize_with(|values| {
            if row >= values.len() {
                return Err(DbError::ColumnAccessOutOfBounds);
            }
            let value = if ordered {
                values.remove(row)
            } else {
                values.swap_remove(row)
            };
            Ok(Box::new(value) as AnyValue)
        })
    }

    pub fn dynamic_destroy(column: &mut AnyPtr, row: usize, ordered: bool) -> Result<(), DbError> {
        Self::dynamic_take(column, row, ordered).map(drop)
    }

    pub fn dynamic_copy(column: &mut AnyPtr, row: usize) -> Result<AnyValue, DbError> {
        Self::downcast_mut(column)?
            .values
            .get_mut()
            .get(row)
            .map(|v| Box::new(v.clone()) as AnyValue)
            .ok_or(DbError::ColumnAccessOutOfBounds)
    }

    pub fn dynamic_debug(column: &AnyPtr, row: usize, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Ok(inner) = Self::downcast(column) else {
            return write!(f, "<type mismatch>");
        };
        match inner.try_borrow(row..row + 1) {
            Ok(values) => match values.first() {
                Some(value) => write!(f, "{:?}", value),
                None => write!(f, "<out of bounds>"),
            },
            Err(_) => write!(f, "<borrowed>"),
        }
    }
}

fn clamp(rows: Range<usize>, len: usize) -> Range<usize> {
    let end = rows.end.min(len);
    rows.start.min(end)..end
}
