//! Query
//!
//! Queries match tables by their ids and hand out column slices per group of
//! rows. Terms sourced from an ancestor resolve once per group: in a
//! flattened table a group is the run of rows sharing a parent, so the
//! ancestor lookup never depends on the depth of the rows. Resolved sources
//! are cached by the world, see [World::source_of]

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::{mapref::entry::Entry, DashMap};

use crate::{
    borrowed::{ColumnRef, ColumnRefMut},
    column::Column,
    components::{Component, ComponentType, Storage},
    guard,
    table::{Table, TableId, TargetGroup},
    world::World,
    EntityId, CHILD_OF,
};

/// Where the value of a term comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// The matched entity
    This,
    /// The nearest ancestor along the relationship that has the component
    Up(EntityId),
    /// The entity itself when it has the component, otherwise [Source::Up]
    SelfOrUp(EntityId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Term {
    pub ty: ComponentType,
    pub storage: Storage,
    pub source: Source,
    /// Visit tables in ascending depth of this term's relationship
    pub cascade: bool,
    /// Matches without a value when no source has the component
    pub optional: bool,
}

impl Term {
    pub fn of<C: Component>() -> Self {
        Term {
            ty: ComponentType::of::<C>(),
            storage: C::STORAGE,
            source: Source::This,
            cascade: false,
            optional: false,
        }
    }

    pub fn relationship(&self) -> Option<EntityId> {
        match self.source {
            Source::This => None,
            Source::Up(rel) | Source::SelfOrUp(rel) => Some(rel),
        }
    }
}

/// Builds a [Query]. Modifiers apply to the most recently added term
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    terms: Vec<Term>,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with<C: Component>(mut self) -> Self {
        self.terms.push(Term::of::<C>());
        self
    }

    /// Sources the last term from the parent
    pub fn parent(self) -> Self {
        self.up(CHILD_OF)
    }

    pub fn up(self, rel: EntityId) -> Self {
        self.modify(|term| term.source = Source::Up(rel))
    }

    pub fn self_or_parent(self) -> Self {
        self.self_or_up(CHILD_OF)
    }

    pub fn self_or_up(self, rel: EntityId) -> Self {
        self.modify(|term| term.source = Source::SelfOrUp(rel))
    }

    /// Orders iteration by depth. A term sourced from the entity itself
    /// becomes sourced from its parent
    pub fn cascade(self) -> Self {
        self.modify(|term| {
            if term.source == Source::This {
                term.source = Source::Up(CHILD_OF);
            }
            term.cascade = true;
        })
    }

    pub fn optional(self) -> Self {
        self.modify(|term| term.optional = true)
    }

    fn modify(mut self, f: impl FnOnce(&mut Term)) -> Self {
        match self.terms.last_mut() {
            Some(term) => f(term),
            None => tracing::warn!("term modifier used before any term was added"),
        }
        self
    }

    pub fn build(self) -> Query {
        Query::new(self.terms)
    }
}

/// Result of populating the current table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Populate {
    /// No further group of the table matched, move to the next table
    Next,
    /// A group matched and it was the table's last
    NextYield,
    /// A group matched and more groups remain in the table
    Yield,
}

pub struct Query {
    terms: Vec<Term>,
    cascade: Option<EntityId>,

    /// `(table, group target)` to the source column versions last seen
    observed: DashMap<(TableId, EntityId), Vec<u64>>,
    /// Id of the world the observations were made on, zero before the
    /// first iteration
    bound: AtomicU64,
    /// Structure version of the world when `observed` was last pruned
    pruned_at: AtomicU64,
}

impl Query {
    pub fn new(terms: Vec<Term>) -> Self {
        let cascade = terms
            .iter()
            .find(|term| term.cascade)
            .and_then(Term::relationship);
        Query {
            terms,
            cascade,
            observed: DashMap::new(),
            bound: AtomicU64::new(0),
            pruned_at: AtomicU64::new(0),
        }
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    pub fn iter<'w, 'q>(&'q self, world: &'w World) -> QueryIter<'w, 'q> {
        QueryIter::new(world, self)
    }

    fn matches_table(&self, table: &Table) -> bool {
        self.terms.iter().all(|term| match term.source {
            Source::This => term.optional || table.ids().has_component(&term.ty),
            Source::Up(_) | Source::SelfOrUp(_) => true,
        })
    }

    /// Flattened tables split into target groups only when a term walks
    /// the flattened relationship
    fn splits(&self, table: &Table) -> bool {
        table.fixed_layout().map_or(false, |layout| {
            self.terms
                .iter()
                .any(|term| term.relationship() == Some(layout.relationship))
        })
    }

    fn groups_for(&self, table: &Table) -> Vec<TargetGroup> {
        if self.splits(table) {
            return table.groups();
        }
        if table.is_empty() {
            return Vec::new();
        }
        vec![TargetGroup {
            target: EntityId::NULL,
            offset: 0,
            count: table.len(),
        }]
    }

    /// Where every term of `group` reads from, `None` when a required term
    /// has no source
    fn resolve(&self, world: &World, table: &Table, group: &TargetGroup) -> Option<Vec<Resolved>> {
        self.terms
            .iter()
            .map(|term| {
                let on_self = table.ids().has_component(&term.ty);
                match term.source {
                    Source::This if on_self => Some(Resolved::This),
                    Source::This => term.optional.then_some(Resolved::Missing),
                    Source::SelfOrUp(_) if on_self => Some(Resolved::This),
                    Source::Up(rel) | Source::SelfOrUp(rel) => {
                        let source = group_parent(table, group, rel)
                            .and_then(|parent| world.source_of(parent, rel, term.ty));
                        match source {
                            Some(source) => Some(Resolved::Up(source)),
                            None => term.optional.then_some(Resolved::Missing),
                        }
                    }
                }
            })
            .collect()
    }

    /// Ties the change observations to `world`. Observations made on another
    /// world are dropped, and after a structural change the ones for groups
    /// that no longer exist are pruned
    fn bind(&self, world: &World) {
        let version = world.structure_version();
        let previous = self.bound.swap(world.id(), Ordering::AcqRel);
        if previous != world.id() {
            if previous != 0 {
                tracing::debug!(world = world.id(), previous, "query moved to another world");
            }
            self.observed.clear();
            self.pruned_at.store(version, Ordering::Release);
            return;
        }
        if self.pruned_at.swap(version, Ordering::AcqRel) == version {
            return;
        }
        self.observed.retain(|(table, target), _| {
            world
                .table(*table)
                .map_or(false, |table| target.is_null() || table.has_target(*target))
        });
    }

    /// Records the versions seen for a group, returning whether they differ
    /// from the previous observation
    fn observe(&self, key: (TableId, EntityId), versions: Vec<u64>) -> bool {
        match self.observed.entry(key) {
            Entry::Occupied(mut seen) => {
                let changed = *seen.get() != versions;
                if changed {
                    seen.insert(versions);
                }
                changed
            }
            Entry::Vacant(slot) => {
                slot.insert(versions);
                true
            }
        }
    }
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("terms", &self.terms)
            .field("cascade", &self.cascade)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolved {
    This,
    Up(EntityId),
    Missing,
}

#[derive(Debug)]
struct Matched {
    group: TargetGroup,
    sources: Vec<Resolved>,
    changed: bool,
}

/// Walks the tables matched by a [Query] one group at a time
pub struct QueryIter<'w, 'q> {
    world: &'w World,
    query: &'q Query,
    tables: Vec<TableId>,
    next: usize,

    table: Option<&'w Table>,
    groups: Vec<TargetGroup>,
    group: usize,
    current: Option<Matched>,
}

impl<'w, 'q> QueryIter<'w, 'q> {
    fn new(world: &'w World, query: &'q Query) -> Self {
        query.bind(world);
        // Tables that don't split into groups resolve their ancestor terms
        // up front, so a table without a source is never visited
        let mut tables: Vec<&Table> = world
            .tables()
            .filter(|table| !table.is_empty() && query.matches_table(table))
            .filter(|table| {
                query.splits(table)
                    || query
                        .groups_for(table)
                        .iter()
                        .any(|group| query.resolve(world, table, group).is_some())
            })
            .collect();
        if let Some(rel) = query.cascade {
            tables.sort_by_key(|table| {
                let depth = table
                    .entities()
                    .first()
                    .and_then(|e| world.get_depth(*e, rel).ok())
                    .unwrap_or(0);
                (depth, table.id())
            });
        }
        QueryIter {
            world,
            query,
            tables: tables.into_iter().map(Table::id).collect(),
            next: 0,
            table: None,
            groups: Vec::new(),
            group: 0,
            current: None,
        }
    }

    /// Advances to the next matched table
    pub fn next_table(&mut self) -> bool {
        self.current = None;
        self.group = 0;
        let Some(id) = self.tables.get(self.next).copied() else {
            self.table = None;
            self.groups.clear();
            return false;
        };
        self.next += 1;
        let table = &self.world.tables[id.index()];
        self.groups = self.query.groups_for(table);
        self.table = Some(table);
        true
    }

    /// Finds the next matching group of the current table. With
    /// `track_changes`, groups whose sources are unchanged since the last
    /// observation are skipped
    pub fn populate(&mut self, track_changes: bool) -> Populate {
        let Some(table) = self.table else {
            return Populate::Next;
        };
        while self.group < self.groups.len() {
            let group = self.groups[self.group];
            self.group += 1;

            let Some(sources) = self.query.resolve(self.world, table, &group) else {
                continue;
            };
            let versions = self.versions(table, &sources);
            let changed = self.query.observe((table.id(), group.target), versions);
            if track_changes && !changed {
                continue;
            }
            self.current = Some(Matched {
                group,
                sources,
                changed,
            });
            return if self.group < self.groups.len() {
                Populate::Yield
            } else {
                Populate::NextYield
            };
        }
        self.current = None;
        Populate::Next
    }

    /// Moves to the next matching group, crossing tables as needed
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> bool {
        loop {
            if self.table.is_some() && self.populate(false) != Populate::Next {
                return true;
            }
            if !self.next_table() {
                return false;
            }
        }
    }

    fn versions(&self, table: &Table, sources: &[Resolved]) -> Vec<u64> {
        self.query
            .terms
            .iter()
            .zip(sources)
            .map(|(term, source)| {
                if term.storage == Storage::Sparse {
                    return self.world.sparse.get(&term.ty).map_or(0, |set| set.version());
                }
                let column = match source {
                    Resolved::This => table.column(&term.ty),
                    Resolved::Up(entity) => self.column_of(*entity, &term.ty).map(|(c, _)| c),
                    Resolved::Missing => None,
                };
                column.map_or(0, Column::version)
            })
            .collect()
    }

    fn column_of(&self, entity: EntityId, ty: &ComponentType) -> Option<(&'w Column, usize)> {
        let record = self.world.entities.record(entity)?;
        let column = self.world.tables[record.table.index()].column(ty)?;
        Some((column, record.row))
    }

    fn term<C: Component>(&self, index: usize) -> Option<&Term> {
        let term = self.query.terms.get(index)?;
        if term.ty != ComponentType::of::<C>() {
            tracing::error!(index, expected = %term.ty, "field accessed with the wrong type");
            panic!(
                "field {} holds {}, not {}",
                index,
                term.ty,
                ComponentType::of::<C>()
            );
        }
        Some(term)
    }

    /// Values of term `index` for the current group: one per row for terms
    /// on the entity itself, a single value for ancestor terms. `None` for
    /// optional terms without a source. Sparse components have no column,
    /// read them with [QueryIter::sparse_field]
    pub fn field<C: Component>(&self, index: usize) -> Option<ColumnRef<'w, C>> {
        let term = self.term::<C>(index)?;
        let current = self.current.as_ref()?;
        if term.storage == Storage::Sparse {
            return None;
        }
        let (column, rows) = match current.sources[index] {
            Resolved::This => {
                let group = current.group;
                (self.table?.column(&term.ty)?, group.offset..group.offset + group.count)
            }
            Resolved::Up(entity) => {
                let (column, row) = self.column_of(entity, &term.ty)?;
                (column, row..row + 1)
            }
            Resolved::Missing => return None,
        };
        match column.borrow::<C>(rows) {
            Ok(Ok(values)) => Some(values),
            Ok(Err(_)) => guard::aliased(term.ty),
            Err(_) => None,
        }
    }

    /// Mutable values of a term sourced from the entity itself. Marks the
    /// column changed
    ///
    /// # Panics
    ///
    /// When the term is sourced from an ancestor
    pub fn field_mut<C: Component>(&self, index: usize) -> Option<ColumnRefMut<'w, C>> {
        let term = self.term::<C>(index)?;
        let current = self.current.as_ref()?;
        if term.storage == Storage::Sparse {
            return None;
        }
        let group = current.group;
        let column = match current.sources[index] {
            Resolved::This => self.table?.column(&term.ty)?,
            Resolved::Up(_) => panic!("field {} is sourced from an ancestor and can't be written", index),
            Resolved::Missing => return None,
        };
        match column.borrow_mut::<C>(group.offset..group.offset + group.count, self.world.next_tick()) {
            Ok(Ok(values)) => Some(values),
            Ok(Err(_)) => guard::aliased(term.ty),
            Err(_) => None,
        }
    }

    /// Values of a sparse term for the current group, laid out like
    /// [QueryIter::field]. `None` for table stored components and for
    /// optional terms without a source
    pub fn sparse_field<C: Component>(&self, index: usize) -> Option<Vec<&'w C>> {
        let term = self.term::<C>(index)?;
        let current = self.current.as_ref()?;
        if term.storage != Storage::Sparse {
            return None;
        }
        let set = self.world.sparse.get(&term.ty)?;
        match current.sources[index] {
            Resolved::This => self.entities().iter().map(|e| set.get::<C>(*e)).collect(),
            Resolved::Up(entity) => set.get::<C>(entity).map(|value| vec![value]),
            Resolved::Missing => None,
        }
    }

    /// Whether any source of the current group changed since the group was
    /// last observed by this query
    pub fn changed(&self) -> bool {
        self.current.as_ref().map_or(false, |current| current.changed)
    }

    pub fn entities(&self) -> &'w [EntityId] {
        match (self.table, self.current.as_ref()) {
            (Some(table), Some(current)) => {
                let group = current.group;
                &table.entities()[group.offset..group.offset + group.count]
            }
            _ => &[],
        }
    }

    pub fn count(&self) -> usize {
        self.current.as_ref().map_or(0, |current| current.group.count)
    }

    /// The entity term `index` is read from, `None` when it is the matched
    /// entity itself or the term has no source
    pub fn source(&self, index: usize) -> Option<EntityId> {
        match self.current.as_ref()?.sources.get(index)? {
            Resolved::Up(entity) => Some(*entity),
            Resolved::This | Resolved::Missing => None,
        }
    }

    pub fn sources(&self) -> Vec<Option<EntityId>> {
        (0..self.query.terms.len()).map(|i| self.source(i)).collect()
    }

    /// Whether term `index` has a value for the current group
    pub fn is_set(&self, index: usize) -> bool {
        self.current
            .as_ref()
            .and_then(|current| current.sources.get(index))
            .map_or(false, |source| *source != Resolved::Missing)
    }

    /// Parent shared by the rows of the current group of a flattened table
    pub fn group_target(&self) -> Option<EntityId> {
        self.current
            .as_ref()
            .map(|current| current.group.target)
            .filter(|target| !target.is_null())
    }

    pub fn table(&self) -> Option<&'w Table> {
        self.table
    }
}

/// The parent along `rel` of the rows of `group`
fn group_parent(table: &Table, group: &TargetGroup, rel: EntityId) -> Option<EntityId> {
    match table.fixed_layout() {
        Some(layout) if layout.relationship == rel => Some(group.target).filter(|t| !t.is_null()),
        _ => table.ids().targets(rel).next(),
    }
}

/// A read only handle on a world in readonly mode, one per worker
#[derive(Debug, Clone, Copy)]
pub struct Stage<'w> {
    world: &'w World,
    id: usize,
}

impl<'w> Stage<'w> {
    pub(crate) fn new(world: &'w World, id: usize) -> Self {
        Stage { world, id }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn world(&self) -> &'w World {
        self.world
    }

    pub fn iter<'q>(&self, query: &'q Query) -> QueryIter<'w, 'q> {
        query.iter(self.world)
    }
}
