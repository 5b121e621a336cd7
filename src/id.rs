use std::fmt::{self, Debug, Display};
use std::hash::Hash;

/// An `EntityId` uniquely identifies a single entity
///
/// The low 32 bits hold the entity index, the high 32 bits hold its generation.
/// Index zero is reserved as the null entity and is never handed out
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(u64);

impl EntityId {
    pub const NULL: EntityId = EntityId(0);

    pub(crate) const fn from_parts(index: u32, generation: u32) -> Self {
        EntityId((generation as u64) << 32 | index as u64)
    }

    /// The slot index of this entity
    pub const fn index(&self) -> u32 {
        self.0 as u32
    }

    /// How many times the slot behind this id has been recycled
    pub const fn generation(&self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Returns the stable wire form of this id
    ///
    /// Entity ids never change while an entity is alive, flattening included,
    /// so this value can be serialized and sent elsewhere
    pub const fn to_bits(&self) -> u64 {
        self.0
    }

    pub const fn from_bits(bits: u64) -> Self {
        EntityId(bits)
    }

    pub(crate) fn next_generation(&self) -> Self {
        EntityId::from_parts(self.index(), self.generation().wrapping_add(1))
    }
}

impl Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E[{}v{}]", self.index(), self.generation())
    }
}

impl Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

/// A stable `TypeId` which (should) be common across builds. This isn't a guarantee, especially
/// across different rust versions. Used to generate better errors and as a hashable component key
///
/// StableTypeId's are simply an FNV-1a hash of the type name provided by `std::any::type_name()`
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StableTypeId(pub(crate) u64);

impl StableTypeId {
    pub fn type_name<T>() -> &'static str
    where
        T: ?Sized + 'static,
    {
        std::any::type_name::<T>()
    }

    pub fn of<T>() -> Self
    where
        T: ?Sized + 'static,
    {
        let hash = const_fnv1a_hash::fnv1a_hash_str_64(Self::type_name::<T>());
        debug_assert!(hash & 0xFFFF != 0);
        StableTypeId(hash)
    }

    pub fn raw_id(&self) -> u64 {
        self.0
    }
}

impl Debug for StableTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#018x}]", self.0)
    }
}

// [CommutativeId]

pub(crate) type CommutativeHashValue = u64;

/// An order independent combination of hashes, two sets holding the same members
/// always produce the same [CommutativeId]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct CommutativeId(CommutativeHashValue);
pub(crate) const COMMUTATIVE_ID_INIT: CommutativeId = CommutativeId(COMMUTATIVE_HASH_PRIME);
pub(crate) const COMMUTATIVE_HASH_PRIME: CommutativeHashValue = 0x29233AAB26330D; // 11579208931619597

impl CommutativeId {
    pub fn raw(&self) -> u64 {
        self.0
    }

    fn combine(first: &Self, other: &Self) -> Self {
        CommutativeId(
            first
                .0
                .wrapping_add(other.0)
                .wrapping_add(other.0.wrapping_mul(first.0)),
        )
    }
}

impl FromIterator<CommutativeHashValue> for CommutativeId {
    fn from_iter<T: IntoIterator<Item = CommutativeHashValue>>(iter: T) -> Self {
        iter.into_iter().fold(COMMUTATIVE_ID_INIT, |acc, x| {
            CommutativeId::combine(&acc, &CommutativeId(x))
        })
    }
}
