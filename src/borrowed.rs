//! Borrowed
//!
//! This module is responsible for safe, non-aliased, and concurrent access
//! to table columns while a world is shared between readers. Borrows are
//! tracked per row, so a parent row and its children in the same column can
//! be read and written at once

use std::fmt;
use std::ops::{Deref, DerefMut, Range};
use std::sync::atomic::{AtomicIsize, Ordering};

const NOT_BORROWED: isize = 0isize;
const MUTABLE_BORROW: isize = -1isize;

/// One borrow counter per row of a column. Readers count up, a writer holds
/// `MUTABLE_BORROW`. Borrows over disjoint rows never conflict
#[derive(Default, Debug)]
pub struct BorrowSentinel(Vec<AtomicIsize>);

impl BorrowSentinel {
    pub fn new() -> Self {
        Default::default()
    }

    /// Matches the sentinel to a column of `len` rows. Requires exclusive
    /// access, so no row can be borrowed while it runs
    pub(crate) fn resize(&mut self, len: usize) {
        debug_assert!(!self.is_borrowed());
        self.0.resize_with(len, AtomicIsize::default);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_borrowed(&self) -> bool {
        self.0.iter().any(|row| row.load(Ordering::SeqCst) != NOT_BORROWED)
    }

    fn rows(&self, rows: Range<usize>) -> &[AtomicIsize] {
        let end = rows.end.min(self.0.len());
        &self.0[rows.start.min(end)..end]
    }
}

#[inline]
pub fn is_mut_borrow(value: isize) -> bool {
    value < NOT_BORROWED
}

fn acquire_shared(row: &AtomicIsize) -> bool {
    loop {
        let cur = row.load(Ordering::SeqCst);
        let new = cur + 1;
        if is_mut_borrow(new) {
            return false;
        }
        match row.compare_exchange(cur, new, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => return true,
            Err(_) => continue, // someone else likely interacted with this borrow, try again
        }
    }
}

fn release_shared(row: &AtomicIsize) {
    #[cfg(debug_assertions)]
    {
        let cur = row.load(Ordering::SeqCst);
        debug_assert!(!is_mut_borrow(cur));
    }
    row.fetch_sub(1isize, Ordering::SeqCst);
}

fn acquire_exclusive(row: &AtomicIsize) -> bool {
    row.compare_exchange(NOT_BORROWED, MUTABLE_BORROW, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
}

fn release_exclusive(row: &AtomicIsize) {
    #[cfg(debug_assertions)]
    {
        let cur = row.load(Ordering::SeqCst);
        debug_assert!(is_mut_borrow(cur));
    }
    row.fetch_add(1isize, Ordering::SeqCst);
}

/// Takes every row in order. On the first failure the rows already taken
/// are released again
fn acquire_all(
    rows: &[AtomicIsize],
    acquire: fn(&AtomicIsize) -> bool,
    release: fn(&AtomicIsize),
) -> bool {
    for (taken, row) in rows.iter().enumerate() {
        if !acquire(row) {
            rows[..taken].iter().for_each(release);
            return false;
        }
    }
    true
}

pub struct BorrowRef<'b> {
    rows: &'b [AtomicIsize],
}

impl<'b> BorrowRef<'b> {
    pub fn new(borrow: &'b BorrowSentinel, rows: Range<usize>) -> Option<Self> {
        let rows = borrow.rows(rows);
        if !acquire_all(rows, acquire_shared, release_shared) {
            return None;
        }
        Some(BorrowRef { rows })
    }
}

impl Drop for BorrowRef<'_> {
    fn drop(&mut self) {
        self.rows.iter().for_each(release_shared);
    }
}

pub struct BorrowRefMut<'b> {
    rows: &'b [AtomicIsize],
}

impl<'b> BorrowRefMut<'b> {
    pub fn new(borrow: &'b BorrowSentinel, rows: Range<usize>) -> Option<Self> {
        let rows = borrow.rows(rows);
        if !acquire_all(rows, acquire_exclusive, release_exclusive) {
            return None;
        }
        Some(BorrowRefMut { rows })
    }
}

impl Drop for BorrowRefMut<'_> {
    fn drop(&mut self) {
        self.rows.iter().for_each(release_exclusive);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorrowError {
    AlreadyBorrowed,
}

impl fmt::Display for BorrowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BorrowError::AlreadyBorrowed => write!(f, "column is already borrowed"),
        }
    }
}

impl std::error::Error for BorrowError {}

/// A shared, runtime checked view over a range of rows in a column
pub struct ColumnRef<'b, C> {
    values: &'b [C],
    _borrow: BorrowRef<'b>,
}

impl<'b, C> ColumnRef<'b, C> {
    pub(crate) fn new(values: &'b [C], borrow: BorrowRef<'b>) -> Self {
        Self {
            values,
            _borrow: borrow,
        }
    }
}

impl<C> Deref for ColumnRef<'_, C> {
    type Target = [C];
    fn deref(&self) -> &Self::Target {
        self.values
    }
}

impl<C: fmt::Debug> fmt::Debug for ColumnRef<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.values.iter()).finish()
    }
}

/// An exclusive, runtime checked view over a range of rows in a column
pub struct ColumnRefMut<'b, C> {
    values: &'b mut [C],
    _borrow: BorrowRefMut<'b>,
}

impl<'b, C> ColumnRefMut<'b, C> {
    pub(crate) fn new(values: &'b mut [C], borrow: BorrowRefMut<'b>) -> Self {
        Self {
            values,
            _borrow: borrow,
        }
    }
}

impl<C> Deref for ColumnRefMut<'_, C> {
    type Target = [C];
    fn deref(&self) -> &Self::Target {
        self.values
    }
}

impl<C> DerefMut for ColumnRefMut<'_, C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.values
    }
}

/// A shared reference to a single component value, returned by [crate::World::get]
pub struct ComponentRef<'b, C> {
    value: &'b C,
    _borrow: Option<BorrowRef<'b>>,
}

impl<'b, C> ComponentRef<'b, C> {
    pub(crate) fn from_column(column: ColumnRef<'b, C>) -> Option<Self> {
        let ColumnRef { values, _borrow } = column;
        values.first().map(|value| Self {
            value,
            _borrow: Some(_borrow),
        })
    }

    pub(crate) fn from_sparse(value: &'b C) -> Self {
        Self {
            value,
            _borrow: None,
        }
    }
}

impl<C> Deref for ComponentRef<'_, C> {
    type Target = C;
    fn deref(&self) -> &Self::Target {
        self.value
    }
}

impl<C: fmt::Debug> fmt::Debug for ComponentRef<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentinel(len: usize) -> BorrowSentinel {
        let mut sentinel = BorrowSentinel::new();
        sentinel.resize(len);
        sentinel
    }

    #[test]
    fn shared_borrows_stack() {
        let sentinel = sentinel(4);
        let a = BorrowRef::new(&sentinel, 0..4);
        let b = BorrowRef::new(&sentinel, 1..3);
        assert!(a.is_some() && b.is_some());
        assert!(BorrowRefMut::new(&sentinel, 2..3).is_none());
        drop(a);
        drop(b);
        assert!(!sentinel.is_borrowed());
    }

    #[test]
    fn exclusive_borrow_blocks_overlapping_rows() {
        let sentinel = sentinel(4);
        let m = BorrowRefMut::new(&sentinel, 0..2);
        assert!(m.is_some());
        assert!(BorrowRef::new(&sentinel, 1..3).is_none());
        assert!(BorrowRefMut::new(&sentinel, 0..1).is_none());
        drop(m);
        assert!(BorrowRef::new(&sentinel, 0..4).is_some());
    }

    #[test]
    fn disjoint_rows_borrow_independently() {
        let sentinel = sentinel(4);
        let parent = BorrowRef::new(&sentinel, 0..1);
        let children = BorrowRefMut::new(&sentinel, 1..4);
        assert!(parent.is_some() && children.is_some());
        drop(children);
        drop(parent);
        assert!(!sentinel.is_borrowed());
    }

    #[test]
    fn failed_borrow_releases_taken_rows() {
        let sentinel = sentinel(4);
        let last = BorrowRefMut::new(&sentinel, 3..4);
        assert!(BorrowRef::new(&sentinel, 0..4).is_none());
        drop(last);
        assert!(!sentinel.is_borrowed());
        assert!(BorrowRefMut::new(&sentinel, 0..4).is_some());
    }

    #[test]
    fn ranges_are_clamped() {
        let sentinel = sentinel(2);
        let borrow = BorrowRefMut::new(&sentinel, 1..10);
        assert!(borrow.is_some());
        assert!(BorrowRefMut::new(&sentinel, 0..1).is_some());
        assert!(BorrowRef::new(&sentinel, 5..6).is_some());
    }
}
