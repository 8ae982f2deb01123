use super::*;
use crate::config::{PersistenceMode, SpaceKind};

fn config(dim: usize) -> IndexConfig {
    IndexConfig {
        dim,
        space: SpaceKind::L2,
        m: 4,
        ef_construction: 32,
        seed: 7,
        allow_replace_deleted: true,
        store_original: false,
        persistence: PersistenceMode::InMemory,
    }
}

fn graph_with_capacity(cfg: &IndexConfig, capacity: usize) -> Graph {
    let g = Graph::new(cfg);
    g.resize(capacity).unwrap();
    g
}

#[test]
fn add_then_knn_finds_self() {
    let cfg = config(2);
    let g = graph_with_capacity(&cfg, 16);
    g.add_point(1, &[0.0, 0.0], false).unwrap();
    g.add_point(2, &[10.0, 10.0], false).unwrap();
    g.add_point(3, &[0.1, 0.1], false).unwrap();

    let results = g.knn(&[0.0, 0.0], 2, &NoFilter).unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].0, 1);
    assert_eq!(results[1].0, 3);
}

#[test]
fn knn_on_empty_graph_returns_empty() {
    let cfg = config(3);
    let g = graph_with_capacity(&cfg, 4);
    let results = g.knn(&[1.0, 2.0, 3.0], 5, &NoFilter).unwrap();
    assert!(results.is_empty());
}

#[test]
fn knn_never_fabricates_beyond_available_points() {
    let cfg = config(2);
    let g = graph_with_capacity(&cfg, 8);
    g.add_point(1, &[0.0, 0.0], false).unwrap();
    g.add_point(2, &[1.0, 1.0], false).unwrap();

    let results = g.knn(&[0.0, 0.0], 10, &NoFilter).unwrap();
    assert_eq!(results.len(), 2);
}

#[test]
fn dimension_mismatch_is_rejected() {
    let cfg = config(2);
    let g = graph_with_capacity(&cfg, 4);
    let err = g.add_point(1, &[1.0, 2.0, 3.0], false).unwrap_err();
    assert!(matches!(err, IndexError::InvalidArgument(_)));
}

#[test]
fn capacity_exceeded_on_full_arena() {
    let cfg = config(1);
    let g = graph_with_capacity(&cfg, 1);
    g.add_point(1, &[0.0], false).unwrap();
    let err = g.add_point(2, &[1.0], false).unwrap_err();
    assert!(matches!(err, IndexError::CapacityExceeded { .. }));
}

#[test]
fn update_existing_label_preserves_level_and_moves_vector() {
    let cfg = config(2);
    let g = graph_with_capacity(&cfg, 8);
    let slot = g.add_point(1, &[0.0, 0.0], false).unwrap();
    let level_before = g.arena.meta(slot).unwrap().level;
    g.add_point(1, &[5.0, 5.0], false).unwrap();
    let meta = g.arena.meta(slot).unwrap();
    assert_eq!(meta.level, level_before);
    assert_eq!(g.get_data_by_label(1).unwrap(), vec![5.0, 5.0]);
}

#[test]
fn mark_deleted_then_get_returns_label_deleted() {
    let cfg = config(2);
    let g = graph_with_capacity(&cfg, 8);
    g.add_point(1, &[0.0, 0.0], false).unwrap();
    g.mark_deleted(1).unwrap();
    let err = g.get_data_by_label(1).unwrap_err();
    assert!(matches!(err, IndexError::LabelDeleted(1)));
}

#[test]
fn mark_deleted_excludes_from_knn() {
    let cfg = config(2);
    let g = graph_with_capacity(&cfg, 8);
    g.add_point(1, &[0.0, 0.0], false).unwrap();
    g.add_point(2, &[0.1, 0.1], false).unwrap();
    g.mark_deleted(1).unwrap();
    let results = g.knn(&[0.0, 0.0], 2, &NoFilter).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].0, 2);
}

#[test]
fn mark_deleted_unknown_label_errors() {
    let cfg = config(2);
    let g = graph_with_capacity(&cfg, 8);
    let err = g.mark_deleted(99).unwrap_err();
    assert!(matches!(err, IndexError::LabelNotFound(99)));
}

#[test]
fn unmark_deleted_restores_visibility() {
    let cfg = config(2);
    let g = graph_with_capacity(&cfg, 8);
    g.add_point(1, &[0.0, 0.0], false).unwrap();
    g.mark_deleted(1).unwrap();
    g.unmark_deleted(1).unwrap();
    assert!(g.get_data_by_label(1).is_ok());
}

#[test]
fn replace_deleted_reuses_tombstoned_slot() {
    let cfg = config(2);
    let g = graph_with_capacity(&cfg, 2);
    let slot1 = g.add_point(1, &[0.0, 0.0], false).unwrap();
    g.add_point(2, &[1.0, 1.0], false).unwrap();
    g.mark_deleted(1).unwrap();

    let reused = g.add_point(3, &[0.2, 0.2], true).unwrap();
    assert_eq!(reused, slot1);
    assert!(g.get_data_by_label(1).is_err());
    assert_eq!(g.get_data_by_label(3).unwrap(), vec![0.2, 0.2]);
}

#[test]
fn entry_point_replaced_when_tombstoned() {
    let cfg = config(2);
    let g = graph_with_capacity(&cfg, 8);
    g.add_point(1, &[0.0, 0.0], false).unwrap();
    g.add_point(2, &[1.0, 1.0], false).unwrap();
    g.add_point(3, &[2.0, 2.0], false).unwrap();

    let entry_label_before = g.arena.meta(g.entry_point().unwrap().unwrap().slot).unwrap().label;
    g.mark_deleted(entry_label_before).unwrap();

    let entry_after = g.entry_point().unwrap();
    if let Some(ep) = entry_after {
        assert!(!g.arena.meta(ep.slot).unwrap().tombstone);
    }
    let results = g.knn(&[0.0, 0.0], 2, &NoFilter).unwrap();
    assert_eq!(results.len(), 2);
}

#[test]
fn all_points_deleted_clears_entry_point() {
    let cfg = config(2);
    let g = graph_with_capacity(&cfg, 4);
    g.add_point(1, &[0.0, 0.0], false).unwrap();
    g.mark_deleted(1).unwrap();
    assert!(g.entry_point().unwrap().is_none());
    assert!(g.knn(&[0.0, 0.0], 1, &NoFilter).unwrap().is_empty());
}

#[test]
fn allow_deny_filter_restricts_results() {
    let cfg = config(2);
    let g = graph_with_capacity(&cfg, 8);
    g.add_point(1, &[0.0, 0.0], false).unwrap();
    g.add_point(2, &[0.1, 0.1], false).unwrap();
    g.add_point(3, &[0.2, 0.2], false).unwrap();

    let deny: HashSet<u64> = [1].into_iter().collect();
    let filter = AllowDenyFilter { allow: None, deny: Some(&deny) };
    let results = g.knn(&[0.0, 0.0], 3, &filter).unwrap();
    assert!(results.iter().all(|(label, _)| *label != 1));
}

#[test]
fn larger_graph_returns_k_nearest_in_order() {
    let cfg = config(1);
    let g = graph_with_capacity(&cfg, 64);
    for i in 0..50u64 {
        g.add_point(i, &[i as f32], false).unwrap();
    }
    let results = g.knn(&[25.4], 3, &NoFilter).unwrap();
    assert_eq!(results.len(), 3);
    let labels: Vec<u64> = results.iter().map(|(l, _)| *l).collect();
    assert!(labels.contains(&25));
}

#[test]
fn check_integrity_passes_on_healthy_graph() {
    let cfg = config(2);
    let g = graph_with_capacity(&cfg, 32);
    for i in 0..20u64 {
        let v = [(i as f32) * 0.1, (i as f32) * 0.2];
        g.add_point(i, &v, false).unwrap();
    }
    g.mark_deleted(5).unwrap();
    g.check_integrity().unwrap();
}

#[test]
fn set_ef_rejects_zero() {
    let cfg = config(2);
    let g = graph_with_capacity(&cfg, 4);
    assert!(g.set_ef(0).is_err());
    assert!(g.set_ef(50).is_ok());
    assert_eq!(g.get_ef(), 50);
}

#[test]
fn updating_the_entry_point_does_not_introduce_a_self_loop() {
    let cfg = config(2);
    let g = graph_with_capacity(&cfg, 16);
    // The very first point always becomes the entry point.
    g.add_point(1, &[0.0, 0.0], false).unwrap();
    for i in 2..10u64 {
        g.add_point(i, &[i as f32, i as f32], false).unwrap();
    }
    let entry_label = g.arena.meta(g.entry_point().unwrap().unwrap().slot).unwrap().label;

    // Update whichever label currently sits at the entry point in place.
    g.add_point(entry_label, &[-1.0, -1.0], false).unwrap();

    g.check_integrity().unwrap();
    assert_eq!(g.get_data_by_label(entry_label).unwrap(), vec![-1.0, -1.0]);
}

#[test]
fn updating_the_sole_point_in_the_graph_keeps_it_as_its_own_entry() {
    let cfg = config(2);
    let g = graph_with_capacity(&cfg, 4);
    let slot = g.add_point(1, &[0.0, 0.0], false).unwrap();
    g.add_point(1, &[3.0, 4.0], false).unwrap();

    g.check_integrity().unwrap();
    assert_eq!(g.entry_point().unwrap().unwrap().slot, slot);
    assert_eq!(g.get_data_by_label(1).unwrap(), vec![3.0, 4.0]);
}

#[test]
fn resize_then_insert_beyond_old_capacity_succeeds() {
    let cfg = config(2);
    let g = graph_with_capacity(&cfg, 1);
    g.add_point(1, &[0.0, 0.0], false).unwrap();
    g.resize(4).unwrap();
    g.add_point(2, &[1.0, 1.0], false).unwrap();
    assert_eq!(g.len().unwrap(), 2);
}
