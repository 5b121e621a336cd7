//! Entity
//!
//! Allocation of entity ids and the record of where each live entity's row is

use crate::{table::TableId, EntityId};

/// Where an entity's row currently lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityRecord {
    pub table: TableId,
    pub row: usize,
}

#[derive(Debug, Clone, Default)]
struct Slot {
    generation: u32,
    record: Option<EntityRecord>,
}

/// Hands out entity ids and recycles freed slots with a bumped generation.
/// Slot zero is the null entity and is never allocated
#[derive(Debug)]
pub struct EntityAllocator {
    slots: Vec<Slot>,
    free: Vec<u32>,
    alive: usize,
}

impl Default for EntityAllocator {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

impl EntityAllocator {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity + 1);
        slots.push(Slot::default());
        Self {
            slots,
            free: Vec::new(),
            alive: 0,
        }
    }

    /// Allocates an id. The entity isn't alive until it has a record
    pub fn alloc(&mut self) -> EntityId {
        match self.free.pop() {
            Some(index) => EntityId::from_parts(index, self.slots[index as usize].generation),
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot::default());
                EntityId::from_parts(index, 0)
            }
        }
    }

    /// Frees the slot behind `entity`, returning the record it held
    pub fn free(&mut self, entity: EntityId) -> Option<EntityRecord> {
        let slot = self.slot_mut(entity)?;
        let record = slot.record.take()?;
        slot.generation = entity.next_generation().generation();
        self.free.push(entity.index());
        self.alive -= 1;
        Some(record)
    }

    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.record(entity).is_some()
    }

    pub fn record(&self, entity: EntityId) -> Option<EntityRecord> {
        if entity.is_null() {
            return None;
        }
        self.slots
            .get(entity.index() as usize)
            .filter(|slot| slot.generation == entity.generation())
            .and_then(|slot| slot.record)
    }

    pub(crate) fn set_record(&mut self, entity: EntityId, record: EntityRecord) {
        if let Some(slot) = self.slot_mut(entity) {
            if slot.record.replace(record).is_none() {
                self.alive += 1;
            }
        }
    }

    pub(crate) fn set_row(&mut self, entity: EntityId, row: usize) {
        if let Some(record) = self.slot_mut(entity).and_then(|slot| slot.record.as_mut()) {
            record.row = row;
        }
    }

    /// Number of live entities
    pub fn len(&self) -> usize {
        self.alive
    }

    pub fn is_empty(&self) -> bool {
        self.alive == 0
    }

    fn slot_mut(&mut self, entity: EntityId) -> Option<&mut Slot> {
        if entity.is_null() {
            return None;
        }
        self.slots
            .get_mut(entity.index() as usize)
            .filter(|slot| slot.generation == entity.generation())
    }
}
