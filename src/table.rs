use std::{
    collections::HashMap,
    fmt::{self, Display},
};

use itertools::Itertools;

use crate::{
    column::Column,
    components::{ComponentType, IdSet},
    error::DbError,
    transfer::TransferGraph,
    type_info::{AnyValue, TypeInfo},
    EntityId,
};

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableId(pub(crate) u32);

impl TableId {
    pub(crate) fn index(&self) -> usize {
        self.0 as usize
    }
}

impl Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

impl fmt::Debug for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

/// Shape of a flattened table
///
/// Every row's real parent under `relationship` lives in the table's target
/// column, the id set only carries `(relationship, root)`
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FixedLayout {
    pub relationship: EntityId,
    pub root: EntityId,
    /// Depth below `root`, `None` when flattened with `lose_depth`
    pub depth: Option<u32>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TableState {
    Mutable,
    Fixed(FixedLayout),
}

/// Identifies a table. Two entities share a table iff their keys are equal
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableKey {
    pub ids: IdSet,
    pub state: TableState,
}

impl TableKey {
    pub fn mutable(ids: IdSet) -> Self {
        TableKey {
            ids,
            state: TableState::Mutable,
        }
    }
}

/// A run of rows in a fixed table sharing the same real parent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetGroup {
    pub target: EntityId,
    pub offset: usize,
    pub count: usize,
}

/// How the rows after an insertion or removal moved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RowShift {
    None,
    /// `entity` was swapped into `row`
    Swapped { entity: EntityId, row: usize },
    /// Every row from `from` onward changed index
    Shifted { from: usize },
}

pub struct Table {
    id: TableId,
    key: TableKey,

    columns: Vec<Column>,
    /// Maps component types to their column
    column_map: HashMap<ComponentType, usize>,

    entities: Vec<EntityId>,

    /// Real parent of each row, only populated for fixed tables
    targets: Vec<EntityId>,
    /// Rows per target, so a new target is appended without a scan
    target_rows: HashMap<EntityId, usize>,

    edges: TransferGraph,
}

impl Table {
    /// Creates a new [`Table`] with a column for every table stored type
    pub(crate) fn new(id: TableId, key: TableKey, types: &[TypeInfo], tick: u64) -> Self {
        let columns: Vec<Column> = types
            .iter()
            .filter(|info| !info.is_sparse())
            .map(|info| Column::new(info, tick))
            .collect();
        let column_map = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.component_type(), i))
            .collect();
        Table {
            id,
            key,
            columns,
            column_map,
            entities: Vec::new(),
            targets: Vec::new(),
            target_rows: HashMap::new(),
            edges: TransferGraph::new(),
        }
    }

    pub fn id(&self) -> TableId {
        self.id
    }

    pub fn key(&self) -> &TableKey {
        &self.key
    }

    /// Returns a reference to the ids of this [`Table`].
    pub fn ids(&self) -> &IdSet {
        &self.key.ids
    }

    pub fn state(&self) -> TableState {
        self.key.state
    }

    pub fn is_fixed(&self) -> bool {
        matches!(self.key.state, TableState::Fixed(_))
    }

    pub fn fixed_layout(&self) -> Option<&FixedLayout> {
        match &self.key.state {
            TableState::Fixed(layout) => Some(layout),
            TableState::Mutable => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    /// Real parents of each row, empty for mutable tables
    pub fn targets(&self) -> &[EntityId] {
        &self.targets
    }

    pub fn target(&self, row: usize) -> Option<EntityId> {
        self.targets.get(row).copied()
    }

    /// Whether any row of this table has `target` as its parent
    pub fn has_target(&self, target: EntityId) -> bool {
        self.target_rows.contains_key(&target)
    }

    pub fn has_column(&self, ty: &ComponentType) -> bool {
        self.column_map.contains_key(ty)
    }

    pub fn column(&self, ty: &ComponentType) -> Option<&Column> {
        self.column_map.get(ty).map(|i| &self.columns[*i])
    }

    pub(crate) fn column_mut(&mut self, ty: &ComponentType) -> Option<&mut Column> {
        self.column_map.get(ty).map(|i| &mut self.columns[*i])
    }

    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter()
    }

    pub(crate) fn edges(&self) -> &TransferGraph {
        &self.edges
    }

    /// Splits the table into runs of rows sharing a parent. A mutable table
    /// is a single group with a null target
    pub fn groups(&self) -> Vec<TargetGroup> {
        if self.entities.is_empty() {
            return Vec::new();
        }
        if !self.is_fixed() {
            return vec![TargetGroup {
                target: EntityId::NULL,
                offset: 0,
                count: self.entities.len(),
            }];
        }
        let mut offset = 0;
        self.targets
            .iter()
            .dedup_with_count()
            .map(|(count, target)| {
                let group = TargetGroup {
                    target: *target,
                    offset,
                    count,
                };
                offset += count;
                group
            })
            .collect()
    }

    /// The row a new entity with `target` goes to. Fixed tables keep rows
    /// with the same target contiguous. A new target, or the target of the
    /// last row, appends
    pub(crate) fn insertion_row(&self, target: EntityId) -> usize {
        if !self.is_fixed() || !self.has_target(target) || self.targets.last() == Some(&target) {
            return self.entities.len();
        }
        self.targets
            .iter()
            .rposition(|t| *t == target)
            .map(|i| i + 1)
            .unwrap_or(self.entities.len())
    }

    /// Moves every value of `row` out of the table
    pub(crate) fn take_row(
        &mut self,
        row: usize,
    ) -> Result<(HashMap<ComponentType, AnyValue>, RowShift), DbError> {
        if row >= self.entities.len() {
            return Err(DbError::ColumnAccessOutOfBounds);
        }
        let ordered = self.is_fixed();
        let mut values = HashMap::with_capacity(self.columns.len());
        for column in self.columns.iter_mut() {
            values.insert(column.component_type(), column.take(row, ordered)?);
        }
        Ok((values, self.remove_entity_row(row)))
    }

    /// Drops every value of `row`
    pub(crate) fn destroy_row(&mut self, row: usize) -> Result<RowShift, DbError> {
        if row >= self.entities.len() {
            return Err(DbError::ColumnAccessOutOfBounds);
        }
        let ordered = self.is_fixed();
        for column in self.columns.iter_mut() {
            column.destroy(row, ordered)?;
        }
        Ok(self.remove_entity_row(row))
    }

    /// Inserts `entity` using `values` for the columns it has a value for and
    /// default constructing the rest. Values without a column are dropped
    pub(crate) fn insert_row(
        &mut self,
        entity: EntityId,
        target: EntityId,
        mut values: HashMap<ComponentType, AnyValue>,
        tick: u64,
    ) -> Result<(usize, RowShift), DbError> {
        let row = self.insertion_row(target);
        for column in self.columns.iter_mut() {
            match values.remove(&column.component_type()) {
                Some(value) => column.insert_at(row, value, tick)?,
                None => column.construct_at(row, tick)?,
            }
        }
        self.entities.insert(row, entity);
        if self.is_fixed() {
            self.targets.insert(row, target);
            self.count_target(target, true);
        }

        let shift = if row + 1 < self.entities.len() {
            RowShift::Shifted { from: row + 1 }
        } else {
            RowShift::None
        };
        Ok((row, shift))
    }

    /// Appends an entity to a table without columns
    pub(crate) fn push_entity(&mut self, entity: EntityId) -> usize {
        debug_assert!(self.columns.is_empty() && !self.is_fixed());
        self.entities.push(entity);
        self.entities.len() - 1
    }

    /// Points the row at a new parent
    pub(crate) fn set_target(&mut self, row: usize, target: EntityId) {
        let Some(t) = self.targets.get_mut(row) else {
            return;
        };
        let previous = std::mem::replace(t, target);
        self.count_target(previous, false);
        self.count_target(target, true);
    }

    fn count_target(&mut self, target: EntityId, added: bool) {
        if added {
            *self.target_rows.entry(target).or_default() += 1;
            return;
        }
        if let Some(rows) = self.target_rows.get_mut(&target) {
            *rows -= 1;
            if *rows == 0 {
                self.target_rows.remove(&target);
            }
        }
    }

    fn remove_entity_row(&mut self, row: usize) -> RowShift {
        if self.is_fixed() {
            self.entities.remove(row);
            let target = self.targets.remove(row);
            self.count_target(target, false);
            return RowShift::Shifted { from: row };
        }
        self.entities.swap_remove(row);
        match self.entities.get(row) {
            Some(entity) => RowShift::Swapped {
                entity: *entity,
                row,
            },
            None => RowShift::None,
        }
    }
}

impl Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Table {}", self.id)?;
        writeln!(f, "ids: {}", self.key.ids)?;
        writeln!(f, "state: {:?}", self.key.state)?;
        writeln!(f, "size: {}", self.entities.len())?;
        writeln!(f, "rows:")?;
        for (row, entity) in self.entities.iter().enumerate() {
            match self.targets.get(row) {
                Some(target) => writeln!(f, " ({} : {} -> {})", row, entity, target)?,
                None => writeln!(f, " ({} : {})", row, entity)?,
            }
        }
        for column in self.columns.iter() {
            writeln!(f, " {}", column)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Table({} {} {:?})", self.id, self.key.ids, self.key.state)
    }
}
