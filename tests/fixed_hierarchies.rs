use std::collections::HashMap;

use stratum::*;

#[derive(Default, Debug, Clone, PartialEq)]
struct Position {
    x: f32,
    y: f32,
}
impl Component for Position {}

#[derive(Default, Debug, Clone)]
struct TagA;
impl Component for TagA {}

#[derive(Default, Debug, Clone)]
struct TagB;
impl Component for TagB {}

#[derive(Default, Debug, Clone, PartialEq)]
struct Blob(Vec<u8>);
impl Component for Blob {
    const STORAGE: Storage = Storage::Sparse;
}

fn trace() {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .compact()
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// p
/// ├── p_1
/// │   ├── p_1_1
/// │   │   └── p_1_1_1
/// │   └── p_1_2
/// └── p_2
///     ├── p_2_1
///     │   └── p_2_1_1
///     └── p_2_2
struct Tree {
    p: EntityId,
    p_1: EntityId,
    p_2: EntityId,
    p_1_1: EntityId,
    p_1_2: EntityId,
    p_2_1: EntityId,
    p_2_2: EntityId,
    p_1_1_1: EntityId,
    p_2_1_1: EntityId,
}

impl Tree {
    fn new(world: &mut World) -> Self {
        let p = world.create();
        let p_1 = world.create_child_of(p).unwrap();
        let p_2 = world.create_child_of(p).unwrap();
        let p_1_1 = world.create_child_of(p_1).unwrap();
        let p_1_2 = world.create_child_of(p_1).unwrap();
        let p_2_1 = world.create_child_of(p_2).unwrap();
        let p_2_2 = world.create_child_of(p_2).unwrap();
        let p_1_1_1 = world.create_child_of(p_1_1).unwrap();
        let p_2_1_1 = world.create_child_of(p_2_1).unwrap();
        Tree {
            p,
            p_1,
            p_2,
            p_1_1,
            p_1_2,
            p_2_1,
            p_2_2,
            p_1_1_1,
            p_2_1_1,
        }
    }

    fn all(&self) -> Vec<EntityId> {
        vec![
            self.p,
            self.p_1,
            self.p_2,
            self.p_1_1,
            self.p_1_2,
            self.p_2_1,
            self.p_2_2,
            self.p_1_1_1,
            self.p_2_1_1,
        ]
    }
}

fn flatten_children(world: &mut World, root: EntityId) {
    world
        .flatten(Id::pair(CHILD_OF, root), FlattenDesc::default())
        .unwrap();
}

#[test]
fn flatten_empty_hierarchy() {
    trace();
    let mut world = World::new();
    let p = world.create();
    let table = world.get_table(p);
    flatten_children(&mut world, p);
    assert_eq!(world.get_table(p), table);
    assert!(!world.is_fixed(p));
}

#[test]
fn flatten_two_levels() {
    trace();
    let mut world = World::new();
    let t = Tree::new(&mut world);

    assert_eq!(world.get_table(t.p_1), world.get_table(t.p_2));
    assert_eq!(world.get_table(t.p_1_1), world.get_table(t.p_1_2));
    assert_ne!(world.get_table(t.p_1_1), world.get_table(t.p_2_1));

    flatten_children(&mut world, t.p);

    assert_eq!(world.get_table(t.p_1), world.get_table(t.p_2));
    assert_eq!(world.get_table(t.p_1_1), world.get_table(t.p_1_2));
    assert_eq!(world.get_table(t.p_1_1), world.get_table(t.p_2_1));
    assert_eq!(world.get_table(t.p_1_1), world.get_table(t.p_2_2));

    assert_eq!(world.get_target(t.p_1_1, CHILD_OF, 0), Some(t.p_1));
    assert_eq!(world.get_target(t.p_2_1, CHILD_OF, 0), Some(t.p_2));
    assert_eq!(world.get_target(t.p_1_1, CHILD_OF, 1), None);
    assert!(world.has_pair(t.p_1_1, CHILD_OF, t.p_1));
    assert!(!world.has_pair(t.p_1_1, CHILD_OF, t.p));
    assert_eq!(world.get_depth(t.p_1_1, CHILD_OF), Ok(2));
    assert_eq!(world.children(t.p_1, CHILD_OF), &[t.p_1_1, t.p_1_2]);
}

#[test]
fn flatten_keeps_depths_apart() {
    trace();
    let mut world = World::new();
    let t = Tree::new(&mut world);
    flatten_children(&mut world, t.p);

    assert_ne!(world.get_table(t.p_1_1), world.get_table(t.p_1_1_1));
    assert_eq!(world.get_table(t.p_1_1_1), world.get_table(t.p_2_1_1));
    assert_eq!(world.get_target(t.p_1_1_1, CHILD_OF, 0), Some(t.p_1_1));
    assert_eq!(world.get_target(t.p_2_1_1, CHILD_OF, 0), Some(t.p_2_1));
    assert_eq!(world.get_depth(t.p_2_1_1, CHILD_OF), Ok(3));

    let table = world.table(world.get_table(t.p_1_1_1).unwrap()).unwrap();
    assert_eq!(
        table.fixed_layout(),
        Some(&FixedLayout {
            relationship: CHILD_OF,
            root: t.p,
            depth: Some(3)
        })
    );
}

#[test]
fn flatten_lose_depth() {
    trace();
    let mut world = World::new();
    let t = Tree::new(&mut world);
    world
        .flatten(
            Id::pair(CHILD_OF, t.p),
            FlattenDesc::default().lose_depth(true),
        )
        .unwrap();

    assert_eq!(world.get_table(t.p_1_1), world.get_table(t.p_1_1_1));
    assert_eq!(world.get_table(t.p_2_2), world.get_table(t.p_2_1_1));
    assert_ne!(world.get_table(t.p_1), world.get_table(t.p_1_1));
    assert_eq!(world.get_depth(t.p_1_1_1, CHILD_OF), Ok(3));
    assert_eq!(world.get_target(t.p_1_1_1, CHILD_OF, 0), Some(t.p_1_1));
}

#[test]
fn flatten_preserves_targets_and_depths() {
    trace();
    let mut world = World::new();
    let t = Tree::new(&mut world);
    let snapshot = |world: &World| -> HashMap<EntityId, (Option<EntityId>, u32)> {
        t.all()
            .into_iter()
            .map(|e| {
                (
                    e,
                    (
                        world.get_target(e, CHILD_OF, 0),
                        world.get_depth(e, CHILD_OF).unwrap(),
                    ),
                )
            })
            .collect()
    };

    let before = snapshot(&world);
    flatten_children(&mut world, t.p);
    assert_eq!(before, snapshot(&world));
}

#[test]
fn flatten_keeps_component_shapes_apart() {
    trace();
    let mut world = World::new();
    let t = Tree::new(&mut world);
    world.add::<TagA>(t.p_1_1).unwrap();
    world.add::<TagA>(t.p_2_1).unwrap();
    world.add::<TagB>(t.p_1_2).unwrap();
    world.add::<TagB>(t.p_2_2).unwrap();

    flatten_children(&mut world, t.p);

    assert_eq!(world.get_table(t.p_1_1), world.get_table(t.p_2_1));
    assert_eq!(world.get_table(t.p_1_2), world.get_table(t.p_2_2));
    assert_ne!(world.get_table(t.p_1_1), world.get_table(t.p_1_2));
    assert!(world.has::<TagA>(t.p_1_1));
    assert!(world.has::<TagB>(t.p_2_2));
}

#[test]
fn flatten_preserves_values() {
    trace();
    let mut world = World::new();
    let t = Tree::new(&mut world);
    for (i, e) in t.all().into_iter().enumerate() {
        world
            .set(e, Position { x: i as f32, y: -(i as f32) })
            .unwrap();
    }

    flatten_children(&mut world, t.p);

    for (i, e) in t.all().into_iter().enumerate() {
        assert_eq!(
            *world.get::<Position>(e).unwrap(),
            Position { x: i as f32, y: -(i as f32) }
        );
    }
}

#[test]
fn sparse_components_stay_out_of_columns() {
    trace();
    let mut world = World::new();
    let t = Tree::new(&mut world);
    world.set(t.p_1_1, Blob(vec![4, 2])).unwrap();

    flatten_children(&mut world, t.p);

    assert!(world.is_fixed(t.p_1_1));
    assert_eq!(*world.get::<Blob>(t.p_1_1).unwrap(), Blob(vec![4, 2]));
    let table = world.table(world.get_table(t.p_1_1).unwrap()).unwrap();
    assert!(table.ids().contains(&Id::of::<Blob>()));
    assert!(!table.has_column(&ComponentType::of::<Blob>()));
}

#[test]
fn delete_before_flatten() {
    trace();
    let mut world = World::new();
    let t = Tree::new(&mut world);
    world.delete(t.p_1_1).unwrap();
    assert!(!world.is_alive(t.p_1_1_1));

    flatten_children(&mut world, t.p);

    assert!(!world.is_alive(t.p_1_1));
    assert!(world.is_fixed(t.p_2_1));
    assert_eq!(world.get_table(t.p_1_2), world.get_table(t.p_2_1));
    assert_eq!(world.get_target(t.p_2_1, CHILD_OF, 0), Some(t.p_2));
}

#[test]
fn delete_root_after_flatten() {
    trace();
    let mut world = World::new();
    let t = Tree::new(&mut world);
    flatten_children(&mut world, t.p);
    world.delete(t.p).unwrap();
    for e in t.all() {
        assert!(!world.is_alive(e));
    }
}

#[test]
fn delete_with_root_pair_after_flatten() {
    trace();
    let mut world = World::new();
    let t = Tree::new(&mut world);
    flatten_children(&mut world, t.p);
    world.delete_with(Id::pair(CHILD_OF, t.p)).unwrap();
    assert!(world.is_alive(t.p));
    for e in t.all().into_iter().skip(1) {
        assert!(!world.is_alive(e));
    }
}

#[test]
fn delete_mutable_child_after_flatten() {
    trace();
    let mut world = World::new();
    let t = Tree::new(&mut world);
    for e in t.all() {
        world.set(e, Position { x: e.index() as f32, y: 0.0 }).unwrap();
    }
    flatten_children(&mut world, t.p);

    world.delete(t.p_1).unwrap();
    assert!(!world.is_alive(t.p_1_1));
    assert!(!world.is_alive(t.p_1_1_1));

    for e in [t.p_2_1, t.p_2_2, t.p_2_1_1] {
        assert!(world.is_fixed(e));
        assert_eq!(world.get::<Position>(e).unwrap().x, e.index() as f32);
    }
    let table = world.table(world.get_table(t.p_2_1).unwrap()).unwrap();
    assert_eq!(table.entities(), &[t.p_2_1, t.p_2_2]);
}

#[test]
fn set_existing_component_on_fixed_entity() {
    trace();
    let mut world = World::new();
    let t = Tree::new(&mut world);
    world.set(t.p_1_1, Position { x: 1.0, y: 1.0 }).unwrap();
    flatten_children(&mut world, t.p);

    world.set(t.p_1_1, Position { x: 5.0, y: 5.0 }).unwrap();
    assert_eq!(*world.get::<Position>(t.p_1_1).unwrap(), Position { x: 5.0, y: 5.0 });

    world.get_mut::<Position>(t.p_1_1).unwrap().x = 6.0;
    assert_eq!(world.get::<Position>(t.p_1_1).unwrap().x, 6.0);
}

#[test]
#[should_panic(expected = "fixed entity")]
fn add_to_fixed_entity() {
    let mut world = World::new();
    let t = Tree::new(&mut world);
    flatten_children(&mut world, t.p);
    let _ = world.add::<TagA>(t.p_1_1);
}

#[test]
#[should_panic(expected = "fixed entity")]
fn set_new_component_on_fixed_entity() {
    let mut world = World::new();
    let t = Tree::new(&mut world);
    flatten_children(&mut world, t.p);
    let _ = world.set(t.p_1_1, Position::default());
}

#[test]
#[should_panic(expected = "fixed entity")]
fn remove_from_fixed_entity() {
    let mut world = World::new();
    let t = Tree::new(&mut world);
    world.add::<TagA>(t.p_1_1).unwrap();
    flatten_children(&mut world, t.p);
    let _ = world.remove::<TagA>(t.p_1_1);
}

#[test]
#[should_panic(expected = "fixed entity")]
fn delete_fixed_entity() {
    let mut world = World::new();
    let t = Tree::new(&mut world);
    flatten_children(&mut world, t.p);
    let _ = world.delete(t.p_2_1_1);
}

#[test]
#[should_panic(expected = "fixed entity")]
fn clear_fixed_entity() {
    let mut world = World::new();
    let t = Tree::new(&mut world);
    flatten_children(&mut world, t.p);
    let _ = world.clear(t.p_2_1);
}

#[test]
#[should_panic(expected = "fixed entity")]
fn reparent_fixed_entity() {
    let mut world = World::new();
    let t = Tree::new(&mut world);
    flatten_children(&mut world, t.p);
    let _ = world.add_pair(t.p_1_1, CHILD_OF, t.p_2);
}

#[test]
#[should_panic(expected = "fixed entity")]
fn deferred_add_to_fixed_entity() {
    let mut world = World::new();
    let t = Tree::new(&mut world);
    flatten_children(&mut world, t.p);
    world.defer_begin();
    let _ = world.add::<TagA>(t.p_1_1);
}

#[test]
#[should_panic(expected = "readonly")]
fn flatten_while_readonly() {
    let mut world = World::new();
    let t = Tree::new(&mut world);
    world.readonly_begin();
    flatten_children(&mut world, t.p);
}

#[test]
fn flatten_dead_root() {
    let mut world = World::new();
    let p = world.create();
    world.delete(p).unwrap();
    assert_eq!(
        world.flatten(Id::pair(CHILD_OF, p), FlattenDesc::default()),
        Err(DbError::EntityNotAlive(p))
    );
}

#[test]
fn reparent_root_after_flatten() {
    trace();
    let mut world = World::new();
    let t = Tree::new(&mut world);
    flatten_children(&mut world, t.p);

    let q = world.create();
    let q_1 = world.create_child_of(q).unwrap();
    world.add_pair(t.p, CHILD_OF, q_1).unwrap();

    assert_eq!(world.get_depth(t.p, CHILD_OF), Ok(2));
    assert_eq!(world.get_depth(t.p_1_1, CHILD_OF), Ok(4));
    assert_eq!(world.get_depth(t.p_2_1_1, CHILD_OF), Ok(5));
    assert!(world.is_fixed(t.p_1_1));
}

#[test]
fn nested_flatten_composes() {
    trace();
    let mut world = World::new();
    let t = Tree::new(&mut world);
    let p_1_1_1_1 = world.create_child_of(t.p_1_1_1).unwrap();
    let p_2_1_1_1 = world.create_child_of(t.p_2_1_1).unwrap();

    flatten_children(&mut world, t.p_1);
    assert!(!world.is_fixed(t.p_1_1));
    assert!(world.is_fixed(t.p_1_1_1));
    assert!(!world.is_fixed(t.p_2_1_1));
    assert_ne!(world.get_table(t.p_1_1_1), world.get_table(t.p_2_1_1));

    flatten_children(&mut world, t.p);

    assert_eq!(world.get_table(t.p_1_1), world.get_table(t.p_2_1));
    assert_eq!(world.get_table(t.p_1_1_1), world.get_table(t.p_2_1_1));
    assert_eq!(world.get_table(p_1_1_1_1), world.get_table(p_2_1_1_1));

    let table = world.table(world.get_table(t.p_1_1_1).unwrap()).unwrap();
    assert!(table.ids().contains(&Id::pair(CHILD_OF, t.p)));
    assert!(!table.ids().contains(&Id::pair(CHILD_OF, t.p_1)));
    assert_eq!(table.fixed_layout().map(|l| l.root), Some(t.p));

    assert_eq!(world.get_target(t.p_1_1_1, CHILD_OF, 0), Some(t.p_1_1));
    assert_eq!(world.get_target(p_1_1_1_1, CHILD_OF, 0), Some(t.p_1_1_1));
    assert_eq!(world.get_depth(p_1_1_1_1, CHILD_OF), Ok(4));
}

#[test]
fn flatten_twice_is_stable() {
    trace();
    let mut world = World::new();
    let t = Tree::new(&mut world);
    flatten_children(&mut world, t.p);
    let tables: Vec<_> = t.all().into_iter().map(|e| world.get_table(e)).collect();
    flatten_children(&mut world, t.p);
    let again: Vec<_> = t.all().into_iter().map(|e| world.get_table(e)).collect();
    assert_eq!(tables, again);
}

#[test]
fn clone_fixed_entity() {
    trace();
    let mut world = World::new();
    let t = Tree::new(&mut world);
    world.set(t.p_1_1, Position { x: 3.0, y: 4.0 }).unwrap();
    flatten_children(&mut world, t.p);

    let clone = world.clone_entity(t.p_1_1).unwrap();
    assert!(!world.is_fixed(clone));
    assert_eq!(world.get_target(clone, CHILD_OF, 0), Some(t.p_1));
    assert_eq!(world.get_depth(clone, CHILD_OF), Ok(2));
    assert_eq!(*world.get::<Position>(clone).unwrap(), Position { x: 3.0, y: 4.0 });
    assert!(world.children(t.p_1, CHILD_OF).contains(&clone));
}

#[test]
fn flatten_strips_names() {
    trace();
    let mut world = World::new();
    let child_1 = world.create_named("p.name_1.child_1").unwrap();
    let name_1 = world.lookup("p.name_1").unwrap();
    let p = world.lookup("p").unwrap();

    flatten_children(&mut world, p);

    assert_eq!(world.lookup("p.name_1"), Some(name_1));
    assert_eq!(world.lookup("p.name_1.child_1"), None);
    assert_eq!(world.lookup("p.child_1"), None);
    assert_eq!(world.get_name(child_1), None);
    assert_eq!(world.get_target(child_1, CHILD_OF, 0), Some(name_1));
}

#[test]
fn flatten_keep_names() {
    trace();
    let mut world = World::new();
    let child_1 = world.create_named("p.name_1.child_1").unwrap();
    let name_1 = world.lookup("p.name_1").unwrap();
    let p = world.lookup("p").unwrap();

    world
        .flatten(Id::pair(CHILD_OF, p), FlattenDesc::default().keep_names(true))
        .unwrap();

    assert_eq!(world.lookup("p.name_1"), Some(name_1));
    assert_eq!(world.lookup("p.name_1.child_1"), None);
    assert_eq!(world.lookup("p.child_1"), Some(child_1));
    assert_eq!(world.get_name(child_1).as_deref(), Some("child_1"));
    assert_eq!(world.path_of(child_1).as_deref(), Some("p.child_1"));
}

#[test]
fn flatten_keep_names_clash() {
    trace();
    let mut world = World::new();
    let a_x = world.create_named("p.a.x").unwrap();
    let b_x = world.create_named("p.b.x").unwrap();
    let p = world.lookup("p").unwrap();

    world
        .flatten(Id::pair(CHILD_OF, p), FlattenDesc::default().keep_names(true))
        .unwrap();

    assert_eq!(world.get_table(a_x), world.get_table(b_x));
    assert_eq!(world.lookup("p.x"), Some(a_x));
    assert_eq!(world.get_name(b_x).as_deref(), Some("x"));
}

#[test]
fn flatten_custom_relationship() {
    trace();
    let mut world = World::new();
    let contains = world.create();
    world.mark_acyclic(contains);

    let root = world.create();
    let a = world.create();
    let b = world.create();
    let a_1 = world.create();
    let b_1 = world.create();
    world.add_pair(a, contains, root).unwrap();
    world.add_pair(b, contains, root).unwrap();
    world.add_pair(a_1, contains, a).unwrap();
    world.add_pair(b_1, contains, b).unwrap();
    world.set_name(a_1, "item_a").unwrap();
    world.set_name(b_1, "item_b").unwrap();
    assert_ne!(world.get_table(a_1), world.get_table(b_1));

    world
        .flatten(Id::pair(contains, root), FlattenDesc::default())
        .unwrap();

    assert_eq!(world.get_table(a_1), world.get_table(b_1));
    assert_eq!(world.get_target(a_1, contains, 0), Some(a));
    assert_eq!(world.get_target(b_1, contains, 0), Some(b));
    assert_eq!(world.get_depth(b_1, contains), Ok(2));
    assert_eq!(world.get_name(a_1).as_deref(), Some("item_a"));
    assert_eq!(world.lookup("item_b"), Some(b_1));
}

#[test]
fn flatten_keeps_target_order_of_multi_target_relationships() {
    trace();
    let mut world = World::new();
    let likes = world.create();
    world.mark_acyclic(likes);

    let other = world.create();
    let root = world.create();
    let c = world.create();
    let e = world.create();
    world.add_pair(c, likes, root).unwrap();
    world.add_pair(e, likes, c).unwrap();
    world.add_pair(e, likes, other).unwrap();

    let before: Vec<_> = (0..3).map(|i| world.get_target(e, likes, i)).collect();
    assert_eq!(before, vec![Some(other), Some(c), None]);

    world
        .flatten(Id::pair(likes, root), FlattenDesc::default())
        .unwrap();
    assert!(world.is_fixed(e));

    let after: Vec<_> = (0..3).map(|i| world.get_target(e, likes, i)).collect();
    assert_eq!(after, before);
    assert!(world.has_pair(e, likes, other));
    assert!(world.has_pair(e, likes, c));
    assert!(!world.has_pair(e, likes, root));
}
