//! Flatten
//!
//! Collapses the storage of a hierarchy so every descendant of a root sits in
//! a table keyed by the root instead of its own parent. The real parent of
//! each moved row is kept in the table's target column, so targets, depths
//! and children answer exactly as before. Moved entities become fixed.

use std::collections::HashSet;

use itertools::Itertools;

use crate::{
    components::{Id, Name},
    error::DbError,
    guard::{self, Operation},
    table::{FixedLayout, TableKey, TableState},
    world::World,
    EntityId, CHILD_OF,
};

/// Options for [flatten]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlattenDesc {
    /// Keep the [Name] of moved entities. Kept names are scoped under the
    /// flatten root, so only the shortened path resolves
    pub keep_names: bool,
    /// Merge the tables of every depth, rows no longer carry their depth
    /// in the table layout
    pub lose_depth: bool,
}

impl FlattenDesc {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn keep_names(mut self, keep_names: bool) -> Self {
        self.keep_names = keep_names;
        self
    }

    pub fn lose_depth(mut self, lose_depth: bool) -> Self {
        self.lose_depth = lose_depth;
        self
    }
}

#[derive(Debug, Clone, Copy)]
struct Move {
    entity: EntityId,
    parent: EntityId,
    depth: u32,
}

/// Flattens the hierarchy below the target of `pair` along its relationship.
///
/// The root's direct children keep their tables. Every deeper descendant
/// moves to a fixed table whose ids hold `(relationship, root)` in place of
/// the parent pair. Descendants of one depth with the same components share
/// a table whatever their parent.
///
/// # Panics
///
/// When the world is deferred or readonly.
#[tracing::instrument(skip(world))]
pub fn flatten(world: &mut World, pair: Id, desc: FlattenDesc) -> Result<(), DbError> {
    guard::ensure_exclusive(world, Operation::Flatten);
    let (rel, root) = pair.as_pair().ok_or(DbError::NotAPair(pair))?;
    if !world.is_alive(root) {
        return Err(DbError::EntityNotAlive(root));
    }

    let mut moves = Vec::new();
    let mut visited = HashSet::from([root]);
    let mut level: Vec<(EntityId, EntityId)> =
        world.children(root, rel).iter().map(|child| (*child, root)).collect();
    let mut depth = 1;
    while !level.is_empty() {
        let mut next = Vec::new();
        for (entity, parent) in level {
            if !visited.insert(entity) {
                continue;
            }
            next.extend(world.children(entity, rel).iter().map(|child| (*child, entity)));
            if depth < 2 {
                continue;
            }
            if let Some(key) = destination(world, entity, parent, rel, root, depth, desc)? {
                moves.push((key, Move { entity, parent, depth }));
            }
        }
        level = next;
        depth += 1;
    }

    let mut groups: Vec<(TableKey, Vec<Move>)> = moves.into_iter().into_group_map().into_iter().collect();
    groups.sort_by(|(a_key, a), (b_key, b)| {
        min_depth(a).cmp(&min_depth(b)).then_with(|| a_key.cmp(b_key))
    });

    let moved: usize = groups.iter().map(|(_, group)| group.len()).sum();
    tracing::debug!(%root, tables = groups.len(), moved, "flattening");

    for (key, group) in groups {
        let dest = world.table_for_key(key)?;
        for Move { entity, parent, .. } in group {
            world.move_entity(entity, dest, parent)?;
            if rel == CHILD_OF {
                if desc.keep_names {
                    world.reindex_name(entity);
                } else {
                    world.names.remove(entity);
                }
            }
        }
    }
    world.bump_structure();
    Ok(())
}

/// The fixed table key `entity` moves to, `None` when it has to stay put
fn destination(
    world: &World,
    entity: EntityId,
    parent: EntityId,
    rel: EntityId,
    root: EntityId,
    depth: u32,
    desc: FlattenDesc,
) -> Result<Option<TableKey>, DbError> {
    let record = world.record(entity)?;
    let table = &world.tables[record.table.index()];
    let strip = match table.fixed_layout() {
        None => Id::pair(rel, parent),
        // already flattened under an inner root
        Some(layout) if layout.relationship == rel => Id::pair(rel, layout.root),
        Some(layout) => {
            tracing::warn!(
                %entity,
                relationship = %layout.relationship,
                "entity is fixed along another relationship, leaving it in place"
            );
            return Ok(None);
        }
    };

    let mut ids = table.ids().without(&strip).with(Id::pair(rel, root));
    if rel == CHILD_OF && !desc.keep_names {
        ids = ids.without(&Id::of::<Name>());
    }
    let layout = FixedLayout {
        relationship: rel,
        root,
        depth: (!desc.lose_depth).then_some(depth),
    };
    tracing::trace!(%entity, %parent, depth, "flatten destination");
    Ok(Some(TableKey {
        ids,
        state: TableState::Fixed(layout),
    }))
}

fn min_depth(group: &[Move]) -> u32 {
    group.iter().map(|m| m.depth).min().unwrap_or(0)
}
