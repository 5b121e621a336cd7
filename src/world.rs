//! World
//!
//! Owns every table, entity record and index. All structural changes funnel
//! through [World::move_entity], which relocates a row between tables

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::{
    borrowed::ComponentRef,
    components::{Component, ComponentType, Id, IdSet, Name, Storage},
    entity::{EntityAllocator, EntityRecord},
    error::DbError,
    flatten::FlattenDesc,
    guard::{self, Operation},
    names::NameIndex,
    depth::DepthTracker,
    query::Stage,
    relationship::{logical_pairs, RelationshipGraph},
    sources::SourceCache,
    sparse::SparseSet,
    table::{RowShift, Table, TableId, TableKey},
    transfer::TransferEdge,
    type_info::{TypeInfo, TypeRegistry},
    EntityId,
};

/// The builtin parent relationship. Acyclic, exclusive, and deleting a
/// parent deletes its children
pub const CHILD_OF: EntityId = EntityId::from_parts(1, 0);

/// Table holding entities with an empty type
pub(crate) const ROOT_TABLE: TableId = TableId(0);

static NEXT_WORLD_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) type Command = Box<dyn FnOnce(&mut World) -> Result<(), DbError> + Send + Sync>;

pub struct World {
    id: u64,
    pub(crate) entities: EntityAllocator,
    pub(crate) tables: Vec<Table>,
    table_map: HashMap<TableKey, TableId>,
    types: TypeRegistry,
    pub(crate) sparse: HashMap<ComponentType, SparseSet>,

    pub(crate) graph: RelationshipGraph,
    pub(crate) depths: DepthTracker,
    pub(crate) names: NameIndex,
    pub(crate) source_cache: SourceCache,

    /// Source of column change versions
    tick: AtomicU64,
    /// Bumped whenever any entity changes table or is deleted
    structure_version: u64,

    defer_depth: u32,
    commands: Vec<Command>,
    readonly: bool,
}

impl Default for World {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

impl World {
    pub fn new() -> Self {
        Default::default()
    }

    /// Creates a world with room for `capacity` entities
    pub fn with_capacity(capacity: usize) -> Self {
        let mut world = World {
            id: NEXT_WORLD_ID.fetch_add(1, Ordering::Relaxed),
            entities: EntityAllocator::with_capacity(capacity),
            tables: Vec::new(),
            table_map: HashMap::new(),
            types: TypeRegistry::new(),
            sparse: HashMap::new(),
            graph: RelationshipGraph::new(),
            depths: DepthTracker::new(),
            names: NameIndex::new(),
            source_cache: SourceCache::new(),
            tick: AtomicU64::new(1),
            structure_version: 0,
            defer_depth: 0,
            commands: Vec::new(),
            readonly: false,
        };
        world.types.register::<Name>();
        let root = world.insert_table(TableKey::mutable(IdSet::empty()), &[]);
        debug_assert_eq!(root, ROOT_TABLE);

        let child_of = world.create();
        debug_assert_eq!(child_of, CHILD_OF);
        world.graph.mark_acyclic(CHILD_OF);
        world.graph.mark_exclusive(CHILD_OF);
        world.graph.mark_cascade(CHILD_OF);
        world
    }

    /// Unique for the lifetime of the process
    pub fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn next_tick(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn structure_version(&self) -> u64 {
        self.structure_version
    }

    pub(crate) fn bump_structure(&mut self) {
        self.structure_version += 1;
    }

    // Entities

    pub fn create(&mut self) -> EntityId {
        let entity = self.entities.alloc();
        let row = self.tables[ROOT_TABLE.index()].push_entity(entity);
        self.entities.set_record(
            entity,
            EntityRecord {
                table: ROOT_TABLE,
                row,
            },
        );
        tracing::trace!(%entity, "created entity");
        entity
    }

    pub fn create_child_of(&mut self, parent: EntityId) -> Result<EntityId, DbError> {
        if !self.is_alive(parent) {
            return Err(DbError::EntityNotAlive(parent));
        }
        let child = self.create();
        self.add_pair(child, CHILD_OF, parent)?;
        Ok(child)
    }

    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.entities.is_alive(entity)
    }

    /// Number of live entities, builtins included
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub(crate) fn record(&self, entity: EntityId) -> Result<EntityRecord, DbError> {
        self.entities
            .record(entity)
            .ok_or(DbError::EntityNotAlive(entity))
    }

    /// Whether `entity` lives in a flattened table
    pub fn is_fixed(&self, entity: EntityId) -> bool {
        self.entities
            .record(entity)
            .map(|record| self.tables[record.table.index()].is_fixed())
            .unwrap_or(false)
    }

    // Types and tables

    pub fn register<C: Component>(&mut self) -> TypeInfo {
        let info = self.types.register::<C>();
        if info.is_sparse() {
            let tick = self.next_tick();
            self.sparse
                .entry(info.ty)
                .or_insert_with(|| SparseSet::new(&info, tick));
        }
        info
    }

    pub fn describe(&self, ty: &ComponentType) -> Option<&TypeInfo> {
        self.types.describe(ty)
    }

    pub fn get_table(&self, entity: EntityId) -> Option<TableId> {
        self.entities.record(entity).map(|record| record.table)
    }

    pub fn table(&self, id: TableId) -> Option<&Table> {
        self.tables.get(id.index())
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.iter()
    }

    /// The ids of the table `entity` lives in
    pub fn type_of(&self, entity: EntityId) -> Option<&IdSet> {
        let record = self.entities.record(entity)?;
        Some(self.tables[record.table.index()].ids())
    }

    /// Finds or creates the table for `key`
    pub(crate) fn table_for_key(&mut self, key: TableKey) -> Result<TableId, DbError> {
        if let Some(id) = self.table_map.get(&key) {
            return Ok(*id);
        }
        let infos = key
            .ids
            .components()
            .map(|ty| {
                self.types
                    .describe(&ty)
                    .copied()
                    .ok_or(DbError::ComponentNotRegistered(ty.name()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.insert_table(key, &infos))
    }

    fn insert_table(&mut self, key: TableKey, infos: &[TypeInfo]) -> TableId {
        let id = TableId(self.tables.len() as u32);
        let tick = self.next_tick();
        tracing::debug!(table = %id, ids = %key.ids, state = ?key.state, "created table");
        self.tables.push(Table::new(id, key.clone(), infos, tick));
        self.table_map.insert(key, id);
        id
    }

    /// The table reached from `src` by adding `id`
    pub(crate) fn table_with(&mut self, src: TableId, id: Id) -> Result<TableId, DbError> {
        if self.tables[src.index()].ids().contains(&id) {
            return Ok(src);
        }
        if let Some(TransferEdge::Add(dest)) = self.tables[src.index()].edges().get(&id) {
            return Ok(dest);
        }
        let key = TableKey::mutable(self.tables[src.index()].ids().with(id));
        let dest = self.table_for_key(key)?;
        self.tables[src.index()].edges().set(&id, TransferEdge::Add(dest));
        self.tables[dest.index()].edges().set(&id, TransferEdge::Remove(src));
        Ok(dest)
    }

    /// The table reached from `src` by removing `id`
    pub(crate) fn table_without(&mut self, src: TableId, id: Id) -> Result<TableId, DbError> {
        if !self.tables[src.index()].ids().contains(&id) {
            return Ok(src);
        }
        if let Some(TransferEdge::Remove(dest)) = self.tables[src.index()].edges().get(&id) {
            return Ok(dest);
        }
        let key = TableKey::mutable(self.tables[src.index()].ids().without(&id));
        let dest = self.table_for_key(key)?;
        self.tables[src.index()].edges().set(&id, TransferEdge::Remove(dest));
        self.tables[dest.index()].edges().set(&id, TransferEdge::Add(src));
        Ok(dest)
    }

    /// Relocates the row of `entity` into `dest`. Values whose type has a
    /// column in `dest` move with it, missing ones are default constructed
    /// and the rest are dropped. `target` is the row's parent in fixed tables
    pub(crate) fn move_entity(
        &mut self,
        entity: EntityId,
        dest: TableId,
        target: EntityId,
    ) -> Result<(), DbError> {
        let record = self.record(entity)?;
        if record.table == dest {
            return Ok(());
        }
        if dest.index() >= self.tables.len() {
            return Err(DbError::TableDoesntExist(dest));
        }
        let tick = self.next_tick();

        let (values, shift) = self.tables[record.table.index()].take_row(record.row)?;
        self.apply_shift(record.table, shift);

        let (row, shift) = self.tables[dest.index()].insert_row(entity, target, values, tick)?;
        self.apply_shift(dest, shift);
        self.entities.set_record(entity, EntityRecord { table: dest, row });

        self.source_cache.invalidate(entity);
        self.bump_structure();
        tracing::trace!(%entity, from = %record.table, to = %dest, row, "moved entity");
        Ok(())
    }

    pub(crate) fn apply_shift(&mut self, table: TableId, shift: RowShift) {
        match shift {
            RowShift::None => {}
            RowShift::Swapped { entity, row } => self.entities.set_row(entity, row),
            RowShift::Shifted { from } => {
                let table = &self.tables[table.index()];
                for (offset, entity) in table.entities()[from..].iter().enumerate() {
                    self.entities.set_row(*entity, from + offset);
                }
            }
        }
    }

    /// Moves a mutable entity and keeps the indexes in step with its new type
    pub(crate) fn commit_move(&mut self, entity: EntityId, dest: TableId) -> Result<(), DbError> {
        let record = self.record(entity)?;
        let old = self.tables[record.table.index()].ids().clone();
        self.move_entity(entity, dest, EntityId::NULL)?;
        let new = self.tables[dest.index()].ids().clone();
        self.on_ids_changed(entity, &old, &new);
        Ok(())
    }

    /// Updates the relationship graph, depths and names after the type of
    /// `entity` went from `old` to `new`
    pub(crate) fn on_ids_changed(&mut self, entity: EntityId, old: &IdSet, new: &IdSet) {
        let mut changed = BTreeSet::new();
        for (rel, target) in old.iter().filter(|id| !new.contains(id)).filter_map(Id::as_pair) {
            self.graph.remove(rel, target, entity);
            changed.insert(rel);
        }
        for (rel, target) in new.iter().filter(|id| !old.contains(id)).filter_map(Id::as_pair) {
            self.graph.insert(rel, target, entity);
            changed.insert(rel);
        }
        for rel in changed.iter() {
            if self.graph.is_acyclic(*rel) {
                self.refresh_depth(entity, *rel);
            }
        }
        let name = Id::of::<Name>();
        if changed.contains(&CHILD_OF) || old.contains(&name) != new.contains(&name) {
            self.reindex_name(entity);
        }
    }

    // Components

    /// Adds a default constructed `C` to `entity`
    pub fn add<C: Component>(&mut self, entity: EntityId) -> Result<(), DbError> {
        guard::check_structural(self, entity, Operation::Add);
        if self.is_deferred() {
            self.enqueue(move |world| world.add::<C>(entity));
            return Ok(());
        }
        let record = self.record(entity)?;
        let info = self.register::<C>();
        let id = Id::Component(info.ty);
        if self.tables[record.table.index()].ids().contains(&id) {
            return Ok(());
        }
        let dest = self.table_with(record.table, id)?;
        self.commit_move(entity, dest)?;
        if info.is_sparse() {
            let tick = self.next_tick();
            if let Some(set) = self.sparse.get_mut(&info.ty) {
                set.construct(entity, tick);
            }
        }
        Ok(())
    }

    /// Sets the value of `C` on `entity`, adding it first if absent. Setting
    /// an already present component is allowed on fixed entities
    pub fn set<C: Component>(&mut self, entity: EntityId, value: C) -> Result<(), DbError> {
        guard::ensure_writable(self, Operation::Set);
        let present = self.has::<C>(entity);
        if !present {
            guard::ensure_mutable(self, entity, Operation::Set);
        }
        if self.is_deferred() {
            self.enqueue(move |world| world.set::<C>(entity, value));
            return Ok(());
        }
        if !present {
            self.add::<C>(entity)?;
        }
        let record = self.record(entity)?;
        let ty = ComponentType::of::<C>();
        let tick = self.next_tick();
        match C::STORAGE {
            Storage::Sparse => {
                let slot = self
                    .sparse
                    .get_mut(&ty)
                    .and_then(|set| set.get_mut::<C>(entity, tick))
                    .ok_or(DbError::ComponentNotRegistered(ty.name()))?;
                *slot = value;
            }
            Storage::Table => {
                self.tables[record.table.index()]
                    .column_mut(&ty)
                    .ok_or(DbError::ColumnDoesntExistInTable)?
                    .set(record.row, value, tick)?;
            }
        }
        if ty == ComponentType::of::<Name>() {
            self.reindex_name(entity);
        }
        Ok(())
    }

    pub fn get<C: Component>(&self, entity: EntityId) -> Option<ComponentRef<'_, C>> {
        let record = self.entities.record(entity)?;
        let ty = ComponentType::of::<C>();
        if C::STORAGE == Storage::Sparse {
            return self
                .sparse
                .get(&ty)?
                .get::<C>(entity)
                .map(ComponentRef::from_sparse);
        }
        let column = self.tables[record.table.index()].column(&ty)?;
        match column.borrow::<C>(record.row..record.row + 1) {
            Ok(Ok(values)) => ComponentRef::from_column(values),
            Ok(Err(_)) => guard::aliased(ty),
            Err(_) => None,
        }
    }

    pub fn get_mut<C: Component>(&mut self, entity: EntityId) -> Option<&mut C> {
        let record = self.entities.record(entity)?;
        let ty = ComponentType::of::<C>();
        let tick = self.next_tick();
        if C::STORAGE == Storage::Sparse {
            return self.sparse.get_mut(&ty)?.get_mut::<C>(entity, tick);
        }
        self.tables[record.table.index()]
            .column_mut(&ty)?
            .get_mut::<C>(record.row, tick)
            .ok()
    }

    pub fn has<C: Component>(&self, entity: EntityId) -> bool {
        self.has_id(entity, Id::of::<C>())
    }

    /// Whether `entity` has `id`. Pairs are answered from the relationship
    /// graph, so a flattened entity still has its real parent pair
    pub fn has_id(&self, entity: EntityId, id: Id) -> bool {
        match id {
            Id::Component(_) => self
                .type_of(entity)
                .map(|ids| ids.contains(&id))
                .unwrap_or(false),
            Id::Pair(rel, target) => self.has_pair(entity, rel, target),
        }
    }

    pub fn remove<C: Component>(&mut self, entity: EntityId) -> Result<(), DbError> {
        guard::check_structural(self, entity, Operation::Remove);
        if self.is_deferred() {
            self.enqueue(move |world| world.remove::<C>(entity));
            return Ok(());
        }
        let record = self.record(entity)?;
        let ty = ComponentType::of::<C>();
        let id = Id::Component(ty);
        if !self.tables[record.table.index()].ids().contains(&id) {
            return Ok(());
        }
        let dest = self.table_without(record.table, id)?;
        self.commit_move(entity, dest)?;
        if let Some(set) = self.sparse.get_mut(&ty) {
            set.remove(entity);
        }
        Ok(())
    }

    /// Removes every component and pair from `entity`
    pub fn clear(&mut self, entity: EntityId) -> Result<(), DbError> {
        guard::check_structural(self, entity, Operation::Clear);
        if self.is_deferred() {
            self.enqueue(move |world| world.clear(entity));
            return Ok(());
        }
        self.commit_move(entity, ROOT_TABLE)?;
        for set in self.sparse.values_mut() {
            set.remove(entity);
        }
        Ok(())
    }

    /// Creates a new entity with copies of every value on `entity` except
    /// its name. A clone of a flattened entity lands in an ordinary table
    pub fn clone_entity(&mut self, entity: EntityId) -> Result<EntityId, DbError> {
        guard::ensure_writable(self, Operation::Clone);
        let record = self.record(entity)?;
        let name = Id::of::<Name>();
        let ids: IdSet = logical_pairs(&self.tables, record)
            .into_iter()
            .map(|(rel, target)| Id::pair(rel, target))
            .chain(self.tables[record.table.index()].ids().components().map(Id::Component))
            .filter(|id| *id != name)
            .collect();
        let dest = self.table_for_key(TableKey::mutable(ids.clone()))?;

        let mut values = HashMap::new();
        let source = &mut self.tables[record.table.index()];
        let types: Vec<ComponentType> = ids.components().collect();
        for ty in types.iter() {
            if let Some(column) = source.column_mut(ty) {
                values.insert(*ty, column.copy(record.row)?);
            }
        }

        let clone = self.entities.alloc();
        let tick = self.next_tick();
        let (row, shift) = self.tables[dest.index()].insert_row(clone, EntityId::NULL, values, tick)?;
        self.apply_shift(dest, shift);
        self.entities.set_record(clone, EntityRecord { table: dest, row });

        for ty in types.iter() {
            if let Some(set) = self.sparse.get_mut(ty) {
                if let Some(value) = set.copy(entity).transpose()? {
                    set.insert(clone, value, tick);
                }
            }
        }
        self.bump_structure();
        self.on_ids_changed(clone, &IdSet::empty(), &ids);
        tracing::trace!(%entity, %clone, "cloned entity");
        Ok(clone)
    }

    // Deletion

    /// Deletes `entity` and, through cascading relationships, its children
    pub fn delete(&mut self, entity: EntityId) -> Result<(), DbError> {
        guard::check_structural(self, entity, Operation::Delete);
        if self.is_deferred() {
            self.enqueue(move |world| world.delete(entity));
            return Ok(());
        }
        if !self.is_alive(entity) {
            return Ok(());
        }
        self.delete_unchecked(entity)
    }

    /// Deletes every entity that has `id`. Pair ids match the direct
    /// sources of the pair; flattened descendants go with their parents
    pub fn delete_with(&mut self, id: Id) -> Result<(), DbError> {
        guard::ensure_writable(self, Operation::DeleteWith);
        if self.is_deferred() {
            self.enqueue(move |world| world.delete_with(id));
            return Ok(());
        }
        let doomed: Vec<EntityId> = match id {
            Id::Pair(rel, target) => self.graph.children(rel, target).to_vec(),
            Id::Component(_) => self
                .tables
                .iter()
                .filter(|table| table.ids().contains(&id))
                .flat_map(|table| table.entities().iter().copied())
                .collect(),
        };
        tracing::debug!(%id, count = doomed.len(), "deleting with id");
        for entity in doomed {
            if self.is_alive(entity) {
                self.delete_unchecked(entity)?;
            }
        }
        Ok(())
    }

    /// Deletes without checking whether the entities are fixed
    pub(crate) fn delete_unchecked(&mut self, root: EntityId) -> Result<(), DbError> {
        let mut doomed = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![root];
        while let Some(entity) = stack.pop() {
            if !visited.insert(entity) {
                continue;
            }
            doomed.push(entity);
            for rel in self.graph.relationships_targeting(entity) {
                if self.graph.deletes_with(rel) {
                    stack.extend(self.graph.children(rel, entity).iter().copied());
                }
            }
        }
        for entity in doomed.iter() {
            self.destroy_entity(*entity, &visited)?;
        }
        Ok(())
    }

    fn destroy_entity(&mut self, entity: EntityId, doomed: &HashSet<EntityId>) -> Result<(), DbError> {
        let Some(record) = self.entities.record(entity) else {
            return Ok(());
        };

        // Sources surviving this delete lose their pair on `entity`
        for rel in self.graph.relationships_targeting(entity) {
            let sources: Vec<EntityId> = self.graph.children(rel, entity).to_vec();
            for source in sources.into_iter().filter(|s| !doomed.contains(s)) {
                self.detach(source, rel, entity)?;
            }
        }

        for (rel, target) in logical_pairs(&self.tables, record) {
            self.graph.remove(rel, target, entity);
        }
        self.graph.forget_target(entity);
        self.depths.remove_entity(entity);
        self.names.remove(entity);
        for set in self.sparse.values_mut() {
            set.remove(entity);
        }

        let record = self.record(entity)?;
        let shift = self.tables[record.table.index()].destroy_row(record.row)?;
        self.apply_shift(record.table, shift);
        self.entities.free(entity);
        self.source_cache.invalidate(entity);
        self.bump_structure();
        tracing::trace!(%entity, "deleted entity");
        Ok(())
    }

    /// Removes the pair `(rel, target)` from `source` as part of deleting
    /// `target`. Fixed rows keep their table with a null target
    fn detach(&mut self, source: EntityId, rel: EntityId, target: EntityId) -> Result<(), DbError> {
        let record = self.record(source)?;
        let table = &mut self.tables[record.table.index()];
        match table.fixed_layout().copied() {
            Some(layout)
                if layout.relationship == rel && table.target(record.row) == Some(target) =>
            {
                table.set_target(record.row, EntityId::NULL);
                self.source_cache.invalidate(source);
                self.graph.remove(rel, target, source);
                if self.graph.is_acyclic(rel) {
                    self.refresh_depth(source, rel);
                }
                if rel == CHILD_OF {
                    self.reindex_name(source);
                }
                self.bump_structure();
                Ok(())
            }
            Some(_) => {
                tracing::warn!(%source, %target, "fixed entity keeps a pair on a deleted target");
                self.graph.remove(rel, target, source);
                Ok(())
            }
            None => {
                let dest = self.table_without(record.table, Id::pair(rel, target))?;
                self.commit_move(source, dest)
            }
        }
    }

    // Modes

    pub(crate) fn enqueue<F>(&mut self, command: F)
    where
        F: FnOnce(&mut World) -> Result<(), DbError> + Send + Sync + 'static,
    {
        self.commands.push(Box::new(command));
    }

    /// Structural operations issued until the matching [World::defer_end]
    /// are queued instead of applied
    pub fn defer_begin(&mut self) {
        self.defer_depth += 1;
    }

    /// Leaves deferred mode, applying every queued operation when the
    /// outermost deferred section ends. Operations on entities deleted in
    /// the meantime are skipped, the first other error is returned
    pub fn defer_end(&mut self) -> Result<(), DbError> {
        match self.defer_depth {
            0 => {
                tracing::warn!("defer_end called outside of deferred mode");
                return Ok(());
            }
            1 => self.defer_depth = 0,
            _ => {
                self.defer_depth -= 1;
                return Ok(());
            }
        }

        let commands = std::mem::take(&mut self.commands);
        tracing::debug!(count = commands.len(), "flushing deferred commands");
        let mut first = None;
        for command in commands {
            match command(self) {
                Ok(()) => {}
                Err(DbError::EntityNotAlive(entity)) => {
                    tracing::trace!(%entity, "skipped deferred command on deleted entity");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "deferred command failed");
                    first.get_or_insert(e);
                }
            }
        }
        first.map_or(Ok(()), Err)
    }

    pub fn is_deferred(&self) -> bool {
        self.defer_depth > 0
    }

    /// Bars structural changes until [World::readonly_end] so the world can
    /// be iterated from several [Stage]s at once
    pub fn readonly_begin(&mut self) {
        self.readonly = true;
    }

    pub fn readonly_end(&mut self) {
        self.readonly = false;
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    pub fn stage(&self, id: usize) -> Stage<'_> {
        guard::ensure_readonly(self);
        Stage::new(self, id)
    }

    pub fn flatten(&mut self, pair: Id, desc: FlattenDesc) -> Result<(), DbError> {
        crate::flatten::flatten(self, pair, desc)
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("id", &self.id)
            .field("entities", &self.entities.len())
            .field("tables", &self.tables.len())
            .field("types", &self.types.len())
            .field("structure_version", &self.structure_version)
            .field("cached_sources", &self.source_cache.len())
            .field("deferred", &self.defer_depth)
            .field("readonly", &self.readonly)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default, Debug, Clone, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }
    impl Component for Position {}

    #[derive(Default, Debug, Clone, PartialEq)]
    struct Velocity(f32);
    impl Component for Velocity {}

    #[derive(Default, Debug, Clone, PartialEq)]
    struct Blob(Vec<u8>);
    impl Component for Blob {
        const STORAGE: Storage = Storage::Sparse;
    }

    #[test]
    fn builtins() {
        let world = World::new();
        assert!(world.is_alive(CHILD_OF));
        assert_eq!(world.get_table(CHILD_OF), Some(ROOT_TABLE));
        assert!(!world.is_alive(EntityId::NULL));
    }

    #[test]
    fn add_set_remove_moves_between_tables() {
        let mut world = World::new();
        let e = world.create();
        world.set(e, Position { x: 1.0, y: 2.0 }).unwrap();
        let with_position = world.get_table(e).unwrap();
        world.add::<Velocity>(e).unwrap();
        assert_ne!(world.get_table(e), Some(with_position));
        assert_eq!(*world.get::<Position>(e).unwrap(), Position { x: 1.0, y: 2.0 });
        assert_eq!(*world.get::<Velocity>(e).unwrap(), Velocity(0.0));

        world.remove::<Velocity>(e).unwrap();
        assert_eq!(world.get_table(e), Some(with_position));
        assert!(!world.has::<Velocity>(e));
        assert!(world.get::<Velocity>(e).is_none());
    }

    #[test]
    fn swap_removal_keeps_records_valid() {
        let mut world = World::new();
        let a = world.create();
        let b = world.create();
        world.set(a, Velocity(1.0)).unwrap();
        world.set(b, Velocity(2.0)).unwrap();
        world.delete(a).unwrap();
        assert!(!world.is_alive(a));
        assert_eq!(*world.get::<Velocity>(b).unwrap(), Velocity(2.0));
    }

    #[test]
    fn sparse_components_keep_their_values() {
        let mut world = World::new();
        let e = world.create();
        world.set(e, Blob(vec![1, 2, 3])).unwrap();
        world.set(e, Position::default()).unwrap();
        assert!(world.has::<Blob>(e));
        assert_eq!(world.get::<Blob>(e).unwrap().0, vec![1, 2, 3]);
        let table = world.table(world.get_table(e).unwrap()).unwrap();
        assert!(!table.has_column(&ComponentType::of::<Blob>()));

        let clone = world.clone_entity(e).unwrap();
        assert_eq!(world.get::<Blob>(clone).unwrap().0, vec![1, 2, 3]);
        world.remove::<Blob>(e).unwrap();
        assert!(world.get::<Blob>(e).is_none());
    }

    #[test]
    fn clear_and_clone() {
        let mut world = World::new();
        let parent = world.create();
        let e = world.create_child_of(parent).unwrap();
        world.set(e, Velocity(3.0)).unwrap();

        let clone = world.clone_entity(e).unwrap();
        assert_eq!(world.get_table(clone), world.get_table(e));
        assert_eq!(*world.get::<Velocity>(clone).unwrap(), Velocity(3.0));
        assert!(world.children(parent, CHILD_OF).contains(&clone));

        world.clear(e).unwrap();
        assert_eq!(world.get_table(e), Some(ROOT_TABLE));
        assert!(!world.has_id(e, Id::pair(CHILD_OF, parent)));
        assert_eq!(world.children(parent, CHILD_OF), &[clone]);
    }

    #[test]
    fn deferred_operations_apply_at_end() {
        let mut world = World::new();
        let e = world.create();
        world.defer_begin();
        world.set(e, Velocity(1.0)).unwrap();
        world.add::<Position>(e).unwrap();
        assert!(!world.has::<Velocity>(e));
        world.defer_begin();
        world.defer_end().unwrap();
        assert!(world.is_deferred());
        world.defer_end().unwrap();
        assert!(world.has::<Position>(e));
        assert_eq!(*world.get::<Velocity>(e).unwrap(), Velocity(1.0));
    }

    #[test]
    fn deferred_ops_on_deleted_entities_are_skipped() {
        let mut world = World::new();
        let e = world.create();
        world.defer_begin();
        world.add::<Position>(e).unwrap();
        world.delete(e).unwrap();
        world.add::<Velocity>(e).unwrap();
        assert!(world.defer_end().is_ok());
        assert!(!world.is_alive(e));
    }

    #[test]
    fn cascade_delete() {
        let mut world = World::new();
        let root = world.create();
        let child = world.create_child_of(root).unwrap();
        let grandchild = world.create_child_of(child).unwrap();
        let other = world.create();
        world.delete(root).unwrap();
        assert!(!world.is_alive(child));
        assert!(!world.is_alive(grandchild));
        assert!(world.is_alive(other));
    }

    #[test]
    fn delete_with_component() {
        let mut world = World::new();
        let a = world.create();
        let b = world.create();
        let c = world.create();
        world.add::<Velocity>(a).unwrap();
        world.add::<Velocity>(b).unwrap();
        world.delete_with(Id::of::<Velocity>()).unwrap();
        assert!(!world.is_alive(a));
        assert!(!world.is_alive(b));
        assert!(world.is_alive(c));
    }

    #[test]
    #[should_panic(expected = "readonly")]
    fn structural_change_while_readonly_panics() {
        let mut world = World::new();
        let e = world.create();
        world.readonly_begin();
        let _ = world.add::<Velocity>(e);
    }
}
