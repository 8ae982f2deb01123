use super::*;

#[test]
fn new_arena_has_empty_unallocated_slots() {
    let arena = Arena::new(4, 8, false);
    assert_eq!(arena.capacity().unwrap(), 4);
    assert_eq!(arena.allocated_count().unwrap(), 0);
    assert_eq!(arena.live_count().unwrap(), 0);
}

#[test]
fn set_vector_and_read_back() {
    let arena = Arena::new(2, 3, false);
    arena.set_vector(0, vec![1.0, 2.0, 3.0], None).unwrap();
    assert_eq!(arena.vector(0).unwrap(), vec![1.0, 2.0, 3.0]);
    assert_eq!(arena.original(0).unwrap(), None);
}

#[test]
fn store_original_round_trips() {
    let arena = Arena::new(1, 2, true);
    arena.set_vector(0, vec![0.6, 0.8], Some(vec![3.0, 4.0])).unwrap();
    assert_eq!(arena.original(0).unwrap(), Some(vec![3.0, 4.0]));
}

#[test]
fn meta_mutation_is_visible() {
    let arena = Arena::new(1, 2, false);
    arena
        .with_meta_mut(0, |m| {
            m.allocated = true;
            m.label = 42;
            m.level = 3;
        })
        .unwrap();
    let meta = arena.meta(0).unwrap();
    assert!(meta.allocated);
    assert_eq!(meta.label, 42);
    assert_eq!(meta.level, 3);
    assert!(!meta.tombstone);
}

#[test]
fn resize_preserves_existing_slots_and_adds_empty_ones() {
    let arena = Arena::new(2, 2, false);
    arena.set_vector(0, vec![1.0, 1.0], None).unwrap();
    arena.with_meta_mut(0, |m| m.allocated = true).unwrap();
    arena.resize(5).unwrap();
    assert_eq!(arena.capacity().unwrap(), 5);
    assert_eq!(arena.vector(0).unwrap(), vec![1.0, 1.0]);
    assert!(arena.meta(0).unwrap().allocated);
    assert!(!arena.meta(4).unwrap().allocated);
}

#[test]
fn resize_rejects_shrink() {
    let arena = Arena::new(4, 2, false);
    assert!(arena.resize(2).is_err());
}

#[test]
fn resize_to_same_capacity_is_a_no_op() {
    let arena = Arena::new(3, 2, false);
    arena.resize(3).unwrap();
    assert_eq!(arena.capacity().unwrap(), 3);
}

#[test]
fn links_default_to_empty_and_can_be_mutated_via_slot_handle() {
    let arena = Arena::new(1, 2, false);
    assert!(arena.links(0).unwrap().is_empty());
    let handle = arena.slot_handle(0).unwrap();
    {
        let mut guard = handle.links.write().unwrap();
        guard.push(vec![1, 2, 3]);
    }
    assert_eq!(arena.links(0).unwrap(), vec![vec![1, 2, 3]]);
}

#[test]
fn live_count_excludes_tombstoned_slots() {
    let arena = Arena::new(2, 2, false);
    arena.with_meta_mut(0, |m| m.allocated = true).unwrap();
    arena
        .with_meta_mut(1, |m| {
            m.allocated = true;
            m.tombstone = true;
        })
        .unwrap();
    assert_eq!(arena.allocated_count().unwrap(), 2);
    assert_eq!(arena.live_count().unwrap(), 1);
}
