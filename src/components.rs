use std::{
    collections::BTreeSet,
    fmt::{Debug, Display},
    hash::Hash,
    sync::Arc,
};

use crate::id::{CommutativeId, StableTypeId};
use crate::EntityId;

/// [Component]
///
/// The core component trait
///
/// Users must implement this trait on any struct or enum they wish to
/// store in a [crate::World]. Zero sized components act as tags
pub trait Component: Default + Debug + Clone + Send + Sync + 'static {
    /// Where values of this component live
    const STORAGE: Storage = Storage::Table;
}

/// Storage strategy for a component type
///
/// Table components are stored in a column of the entity's table and move with it.
/// Sparse components are stored per entity and never take part in column moves
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Storage {
    Table,
    Sparse,
}

/// [ComponentType]
///
/// A unique identifier for a component
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentType {
    tyid: StableTypeId,
    name: &'static str,
}

impl ComponentType {
    pub fn of<C: Component>() -> Self {
        Self {
            tyid: StableTypeId::of::<C>(),
            name: StableTypeId::type_name::<C>(),
        }
    }

    pub fn inner(&self) -> StableTypeId {
        self.tyid
    }

    /// The full type name of this component
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn short_name(&self) -> &'static str {
        self.name.rsplit_once("::").map(|(_, n)| n).unwrap_or(self.name)
    }
}

impl Display for ComponentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.short_name())
    }
}

impl Debug for ComponentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.short_name())
    }
}

/// A single member of an entity's type: either a component or a relationship pair
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Id {
    Component(ComponentType),
    /// `(relationship, target)`
    Pair(EntityId, EntityId),
}

impl Id {
    pub fn of<C: Component>() -> Self {
        Id::Component(ComponentType::of::<C>())
    }

    pub fn pair(relationship: EntityId, target: EntityId) -> Self {
        Id::Pair(relationship, target)
    }

    pub fn as_pair(&self) -> Option<(EntityId, EntityId)> {
        match self {
            Id::Pair(rel, target) => Some((*rel, *target)),
            Id::Component(_) => None,
        }
    }

    pub fn as_component(&self) -> Option<ComponentType> {
        match self {
            Id::Component(ty) => Some(*ty),
            Id::Pair(..) => None,
        }
    }

    fn hash_value(&self) -> u64 {
        match self {
            Id::Component(ty) => ty.inner().raw_id(),
            Id::Pair(rel, target) => rel
                .to_bits()
                .rotate_left(29)
                .wrapping_mul(0x9E37_79B9_7F4A_7C15)
                ^ target.to_bits(),
        }
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Id::Component(ty) => write!(f, "{}", ty),
            Id::Pair(rel, target) => write!(f, "({}, {})", rel, target),
        }
    }
}

impl Debug for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

/// [IdSet]
///
/// A unique, canonically ordered set of ids. Every table is keyed by one
#[derive(Clone)]
pub struct IdSet {
    ptr: Arc<BTreeSet<Id>>,
    id: CommutativeId,
}

impl IdSet {
    pub fn empty() -> Self {
        IdSet::from_iter(std::iter::empty())
    }

    pub fn contains(&self, id: &Id) -> bool {
        self.ptr.contains(id)
    }

    pub fn has_component(&self, ty: &ComponentType) -> bool {
        self.ptr.contains(&Id::Component(*ty))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Id> {
        self.ptr.iter()
    }

    pub fn components(&self) -> impl Iterator<Item = ComponentType> + '_ {
        self.ptr.iter().filter_map(Id::as_component)
    }

    /// Targets of every `(relationship, *)` pair in this set, in canonical order
    pub fn targets(&self, relationship: EntityId) -> impl Iterator<Item = EntityId> + '_ {
        self.ptr
            .range(Id::Pair(relationship, EntityId::NULL)..)
            .map_while(move |id| match id {
                Id::Pair(rel, target) if *rel == relationship => Some(*target),
                _ => None,
            })
    }

    /// Returns number of [Id]'s in this [IdSet]
    pub fn len(&self) -> usize {
        self.ptr.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ptr.is_empty()
    }

    pub fn with(&self, id: Id) -> IdSet {
        self.iter().copied().chain([id]).collect()
    }

    pub fn without(&self, id: &Id) -> IdSet {
        self.iter().filter(|i| *i != id).copied().collect()
    }

    pub fn names(&self) -> String {
        let out = self
            .ptr
            .iter()
            .fold(String::new(), |out, c| out + &format!("{}, ", c));
        format!("[{}]", out.trim_end_matches([' ', ',']))
    }
}

impl FromIterator<Id> for IdSet {
    fn from_iter<I: IntoIterator<Item = Id>>(iter: I) -> Self {
        let set: BTreeSet<Id> = iter.into_iter().collect();
        let id = CommutativeId::from_iter(set.iter().map(Id::hash_value));
        IdSet {
            ptr: Arc::new(set),
            id,
        }
    }
}

impl PartialEq for IdSet {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.ptr == other.ptr
    }
}

impl Eq for IdSet {}

impl Hash for IdSet {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.raw().hash(state)
    }
}

impl PartialOrd for IdSet {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IdSet {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.ptr.iter().cmp(other.ptr.iter())
    }
}

impl Display for IdSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.names())
    }
}

impl Debug for IdSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.names())
    }
}

/// The name of an entity, unique among the children of its parent
#[derive(Default, Debug, Clone, PartialEq, Eq, Hash)]
pub struct Name(pub String);

impl Component for Name {}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default, Debug, Clone)]
    struct Position;
    impl Component for Position {}

    #[derive(Default, Debug, Clone)]
    struct Velocity;
    impl Component for Velocity {}

    #[test]
    fn id_sets_are_order_independent() {
        let a: IdSet = [Id::of::<Position>(), Id::of::<Velocity>()].into_iter().collect();
        let b: IdSet = [Id::of::<Velocity>(), Id::of::<Position>()].into_iter().collect();
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
        assert_eq!(a.without(&Id::of::<Velocity>()).len(), 1);
        assert_eq!(a.without(&Id::of::<Velocity>()).with(Id::of::<Velocity>()), b);
    }

    #[test]
    fn targets_of_a_relationship() {
        let rel = EntityId::from_parts(1, 0);
        let other = EntityId::from_parts(2, 0);
        let t1 = EntityId::from_parts(10, 0);
        let t2 = EntityId::from_parts(11, 0);
        let set: IdSet = [
            Id::pair(other, t1),
            Id::pair(rel, t2),
            Id::of::<Position>(),
            Id::pair(rel, t1),
        ]
        .into_iter()
        .collect();

        let targets: Vec<_> = set.targets(rel).collect();
        assert_eq!(targets, vec![t1, t2]);
        assert_eq!(set.targets(other).collect::<Vec<_>>(), vec![t1]);
    }

    #[test]
    fn component_type_display_uses_short_name() {
        assert_eq!(format!("{}", ComponentType::of::<Position>()), "Position");
    }
}
